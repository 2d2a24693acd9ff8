use chrono::NaiveDate;

/// Length of the code derived from a supplier name.
const DERIVED_CODE_LEN: usize = 4;

/// Short code used as the order-number prefix for a supplier.
///
/// An explicit identifier wins; otherwise the first four letters of the
/// name, uppercased.
pub fn supplier_code(nombre: &str, identificador: Option<&str>) -> String {
    match identificador.map(str::trim).filter(|s| !s.is_empty()) {
        Some(explicit) => explicit.to_uppercase(),
        None => nombre
            .chars()
            .filter(|c| c.is_alphabetic())
            .take(DERIVED_CODE_LEN)
            .collect::<String>()
            .to_uppercase(),
    }
}

/// Sequence number following `previous`, the number of the supplier's most
/// recently created order. Anything unparseable restarts at 1.
pub fn next_sequence(previous: Option<&str>) -> u32 {
    let Some(previous) = previous else {
        return 1;
    };

    let chars: Vec<char> = previous.chars().collect();
    if chars.len() < 2 {
        return 1;
    }

    chars[chars.len() - 2..]
        .iter()
        .collect::<String>()
        .parse::<u32>()
        .map(|n| n + 1)
        .unwrap_or(1)
}

/// `<code><DDMMYY><seq:02>`, e.g. `NORT01062501`.
pub fn order_number(code: &str, fecha_pedido: NaiveDate, sequence: u32) -> String {
    format!("{}{}{:02}", code, fecha_pedido.format("%d%m%y"), sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_supplier_code_from_name() {
        assert_eq!(supplier_code("Norton", None), "NORT");
        assert_eq!(supplier_code("Vowh", None), "VOWH");
        assert_eq!(supplier_code("3M Peru", None), "MPER");
    }

    #[test]
    fn test_supplier_code_short_name() {
        assert_eq!(supplier_code("Ab", None), "AB");
    }

    #[test]
    fn test_explicit_identifier_wins() {
        assert_eq!(supplier_code("Norton", Some("nrt")), "NRT");
        assert_eq!(supplier_code("Norton", Some("   ")), "NORT");
    }

    #[test]
    fn test_first_order_of_the_day() {
        let code = supplier_code("Norton", None);
        let seq = next_sequence(None);
        assert_eq!(order_number(&code, date(2025, 6, 1), seq), "NORT01062501");
    }

    #[test]
    fn test_second_order_increments() {
        let seq = next_sequence(Some("NORT01062501"));
        assert_eq!(seq, 2);
        assert_eq!(order_number("NORT", date(2025, 6, 1), seq), "NORT01062502");
    }

    #[test]
    fn test_unparseable_previous_restarts() {
        assert_eq!(next_sequence(Some("NORT0106XX")), 1);
        assert_eq!(next_sequence(Some("")), 1);
        assert_eq!(next_sequence(Some("7")), 1);
    }

    #[test]
    fn test_sequence_past_99_widens() {
        assert_eq!(next_sequence(Some("NORT01062599")), 100);
        assert_eq!(order_number("NORT", date(2025, 6, 1), 100), "NORT010625100");
    }
}
