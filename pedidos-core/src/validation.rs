//! Field rules applied to request bodies before anything is written.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::error::FieldErrors;

pub const MSG_MONTO_POSITIVO: &str = "El monto debe ser mayor que cero";

/// 11 ASCII digits.
pub fn check_ruc(errors: &mut FieldErrors, field: &str, ruc: &str) {
    if ruc.len() != 11 || !ruc.chars().all(|c| c.is_ascii_digit()) {
        errors.add(field, "El RUC debe tener 11 dígitos numéricos");
    }
}

/// Digits only, at least seven of them.
pub fn check_telefono(errors: &mut FieldErrors, field: &str, telefono: &str) {
    if telefono.len() < 7 || !telefono.chars().all(|c| c.is_ascii_digit()) {
        errors.add(field, "Ingrese un número de teléfono válido");
    }
}

/// `#RRGGBB`
pub fn check_color(errors: &mut FieldErrors, field: &str, color: &str) {
    let valid = color.len() == 7
        && color.starts_with('#')
        && color[1..].chars().all(|c| c.is_ascii_hexdigit());
    if !valid {
        errors.add(field, "El color debe estar en formato HEX (ej: #1976d2)");
    }
}

pub fn check_positive(errors: &mut FieldErrors, field: &str, monto: Decimal) {
    if monto <= Decimal::ZERO {
        errors.add(field, MSG_MONTO_POSITIVO);
    }
}

pub fn check_not_blank(errors: &mut FieldErrors, field: &str, value: &str) {
    if value.trim().is_empty() {
        errors.add(field, "Este campo no puede estar vacío");
    }
}

/// Installment due dates may not be in the past.
pub fn check_fecha_pago(errors: &mut FieldErrors, field: &str, fecha: NaiveDate, today: NaiveDate) {
    if fecha < today {
        errors.add(field, "La fecha de pago no puede ser en el pasado");
    }
}

pub fn check_numero_guia(errors: &mut FieldErrors, numero: &str) {
    if !numero.starts_with('G') {
        errors.add("numero_guia", "El número de guía debe comenzar con G");
    }
}

pub fn check_numero_factura(errors: &mut FieldErrors, numero: &str) {
    if !(numero.starts_with('F') || numero.starts_with('E')) {
        errors.add("numero_factura", "El número de factura debe comenzar con F o E");
    }
}

/// `later` may not precede `emision`.
pub fn check_not_before_emision(
    errors: &mut FieldErrors,
    field: &str,
    later: Option<NaiveDate>,
    emision: NaiveDate,
    message: &str,
) {
    if let Some(later) = later {
        if later < emision {
            errors.add(field, message);
        }
    }
}

pub fn check_monto_pagado(errors: &mut FieldErrors, pagado: Decimal, total: Decimal) {
    if pagado > total {
        errors.add(
            "monto_pagado",
            "El monto pagado no puede ser mayor que el monto total",
        );
    }
}

/// New installments must fit in what the distribution still has available.
pub fn check_allocation(errors: &mut FieldErrors, field: &str, requested: Decimal, disponible: Decimal) {
    if requested > disponible {
        errors.add(
            field,
            format!(
                "La suma de los montos ({}) excede el monto disponible ({})",
                requested, disponible
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_ruc() {
        let mut errors = FieldErrors::new();
        check_ruc(&mut errors, "ruc", "20123456789");
        assert!(errors.is_empty());

        check_ruc(&mut errors, "ruc", "2012345678");
        check_ruc(&mut errors, "ruc", "2012345678A");
        assert_eq!(errors.get("ruc").map(|m| m.len()), Some(2));
    }

    #[test]
    fn test_telefono() {
        let mut errors = FieldErrors::new();
        check_telefono(&mut errors, "telefono", "9876543");
        assert!(errors.is_empty());

        check_telefono(&mut errors, "telefono", "98765");
        check_telefono(&mut errors, "telefono", "987-654-321");
        assert_eq!(errors.get("telefono").map(|m| m.len()), Some(2));
    }

    #[test]
    fn test_color() {
        let mut errors = FieldErrors::new();
        check_color(&mut errors, "color", "#1976d2");
        assert!(errors.is_empty());

        check_color(&mut errors, "color", "1976d2");
        check_color(&mut errors, "color", "#1976d");
        check_color(&mut errors, "color", "#zz76d2");
        assert_eq!(errors.get("color").map(|m| m.len()), Some(3));
    }

    #[test]
    fn test_positive_amounts() {
        let mut errors = FieldErrors::new();
        check_positive(&mut errors, "monto", Decimal::new(1, 2));
        assert!(errors.is_empty());

        check_positive(&mut errors, "monto", Decimal::ZERO);
        check_positive(&mut errors, "monto", Decimal::new(-5, 0));
        assert_eq!(errors.get("monto").map(|m| m.len()), Some(2));
    }

    #[test]
    fn test_fecha_pago_today_is_allowed() {
        let today = date(2025, 6, 10);
        let mut errors = FieldErrors::new();
        check_fecha_pago(&mut errors, "fecha_pago", today, today);
        assert!(errors.is_empty());

        check_fecha_pago(&mut errors, "fecha_pago", date(2025, 6, 9), today);
        assert!(errors.contains("fecha_pago"));
    }

    #[test]
    fn test_document_prefixes() {
        let mut errors = FieldErrors::new();
        check_numero_guia(&mut errors, "G001-123");
        check_numero_factura(&mut errors, "F001-1");
        check_numero_factura(&mut errors, "E001-1");
        assert!(errors.is_empty());

        check_numero_guia(&mut errors, "T001-123");
        check_numero_factura(&mut errors, "B001-1");
        assert!(errors.contains("numero_guia"));
        assert!(errors.contains("numero_factura"));
    }

    #[test]
    fn test_date_ordering() {
        let mut errors = FieldErrors::new();
        let emision = date(2025, 6, 10);
        check_not_before_emision(&mut errors, "fecha_recepcion", Some(emision), emision, "x");
        check_not_before_emision(&mut errors, "fecha_recepcion", None, emision, "x");
        assert!(errors.is_empty());

        check_not_before_emision(&mut errors, "fecha_recepcion", Some(date(2025, 6, 9)), emision, "x");
        assert!(errors.contains("fecha_recepcion"));
    }

    #[test]
    fn test_monto_pagado_not_above_total() {
        let mut errors = FieldErrors::new();
        check_monto_pagado(&mut errors, Decimal::new(100, 0), Decimal::new(100, 0));
        assert!(errors.is_empty());
        check_monto_pagado(&mut errors, Decimal::new(101, 0), Decimal::new(100, 0));
        assert!(errors.contains("monto_pagado"));
    }

    #[test]
    fn test_bulk_over_allocation_rejected() {
        // final 1000, allocated 600, request 300 + 200
        let disponible = Decimal::new(1000, 0) - Decimal::new(600, 0);
        let requested = Decimal::new(300, 0) + Decimal::new(200, 0);

        let mut errors = FieldErrors::new();
        check_allocation(&mut errors, "montos", requested, disponible);
        assert!(errors.contains("montos"));

        let mut errors = FieldErrors::new();
        check_allocation(&mut errors, "montos", Decimal::new(400, 0), disponible);
        assert!(errors.is_empty());
    }
}
