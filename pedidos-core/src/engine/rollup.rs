use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::letra::EstadoLetra;
use crate::models::pedido::EstadoPedido;

/// Recomputed derived fields of a distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistributionTotals {
    pub monto_en_letras: Decimal,
    pub monto_disponible: Decimal,
    pub completado: bool,
}

/// Allocated = sum of installment amounts, available = final - allocated,
/// completed iff available <= 0.
pub fn distribution_totals<I>(monto_final: Decimal, montos: I) -> DistributionTotals
where
    I: IntoIterator<Item = Decimal>,
{
    let monto_en_letras: Decimal = montos.into_iter().sum();
    let monto_disponible = monto_final - monto_en_letras;

    DistributionTotals {
        monto_en_letras,
        monto_disponible,
        completado: monto_disponible <= Decimal::ZERO,
    }
}

/// A credit order is complete once every one of its distributions is.
/// An order without distributions never is.
pub fn credit_order_complete<I>(completados: I) -> bool
where
    I: IntoIterator<Item = bool>,
{
    let mut any = false;
    for completado in completados {
        if !completado {
            return false;
        }
        any = true;
    }
    any
}

/// Whether a write would leave a completed credit order with an open
/// distribution. Orders have no way back from completado.
pub fn reopens_credit_order<I>(estado: EstadoPedido, es_contado: bool, completados: I) -> bool
where
    I: IntoIterator<Item = bool>,
{
    estado == EstadoPedido::Completado
        && !es_contado
        && completados.into_iter().any(|completado| !completado)
}

/// A cash order is complete once its distributions cover the order total.
pub fn cash_order_complete<I>(monto_total: Decimal, montos_finales: I) -> bool
where
    I: IntoIterator<Item = Decimal>,
{
    montos_finales.into_iter().sum::<Decimal>() >= monto_total
}

/// Total paid on an order: sum of the amounts of its paid installments.
pub fn paid_total<I>(letras: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, EstadoLetra)>,
{
    letras
        .into_iter()
        .filter(|(_, estado)| *estado == EstadoLetra::Pagado)
        .map(|(monto, _)| monto)
        .sum()
}

/// Order state after a distribution is attached to it.
pub fn state_after_distribution(current: EstadoPedido) -> EstadoPedido {
    match current {
        EstadoPedido::Pendiente => EstadoPedido::Asignado,
        other => other,
    }
}

/// Whole days past the grace date, never negative.
pub fn days_late(grace: NaiveDate, today: NaiveDate) -> i32 {
    let days = (today - grace).num_days();
    days.clamp(0, i32::MAX as i64) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn test_distribution_with_no_installments_is_fully_available() {
        let totals = distribution_totals(dec(1000), Vec::new());
        assert_eq!(totals.monto_en_letras, dec(0));
        assert_eq!(totals.monto_disponible, dec(1000));
        assert!(!totals.completado);
    }

    #[test]
    fn test_distribution_partially_allocated() {
        let totals = distribution_totals(dec(1000), vec![dec(400), dec(200)]);
        assert_eq!(totals.monto_en_letras, dec(600));
        assert_eq!(totals.monto_disponible, dec(400));
        assert!(!totals.completado);
    }

    #[test]
    fn test_distribution_exactly_allocated_is_complete() {
        let totals = distribution_totals(dec(1000), vec![dec(600), dec(400)]);
        assert_eq!(totals.monto_disponible, dec(0));
        assert!(totals.completado);
    }

    #[test]
    fn test_distribution_over_allocated_is_complete() {
        let totals = distribution_totals(dec(1000), vec![dec(1200)]);
        assert_eq!(totals.monto_disponible, dec(-200));
        assert!(totals.completado);
    }

    #[test]
    fn test_distribution_with_cents() {
        let totals = distribution_totals(
            Decimal::new(100_050, 2),
            vec![Decimal::new(50_025, 2), Decimal::new(50_025, 2)],
        );
        assert!(totals.completado);
        assert_eq!(totals.monto_disponible, Decimal::ZERO);
    }

    #[test]
    fn test_credit_order_requires_all_distributions() {
        assert!(credit_order_complete(vec![true, true]));
        assert!(!credit_order_complete(vec![true, false]));
        assert!(!credit_order_complete(Vec::new()));
    }

    #[test]
    fn test_open_distribution_reopens_completed_credit_order() {
        assert!(reopens_credit_order(EstadoPedido::Completado, false, vec![true, false]));
        assert!(!reopens_credit_order(EstadoPedido::Completado, false, vec![true, true]));
        assert!(!reopens_credit_order(EstadoPedido::Completado, false, Vec::new()));
        assert!(!reopens_credit_order(EstadoPedido::Completado, true, vec![false]));
        assert!(!reopens_credit_order(EstadoPedido::Asignado, false, vec![false]));
    }

    #[test]
    fn test_cash_order_completes_on_sum() {
        assert!(cash_order_complete(dec(1000), vec![dec(600), dec(400)]));
        assert!(cash_order_complete(dec(1000), vec![dec(1500)]));
        assert!(!cash_order_complete(dec(1000), vec![dec(999)]));
    }

    #[test]
    fn test_paid_total_ignores_unpaid() {
        let total = paid_total(vec![
            (dec(100), EstadoLetra::Pagado),
            (dec(200), EstadoLetra::Pendiente),
            (dec(300), EstadoLetra::Atrasado),
            (dec(50), EstadoLetra::Pagado),
        ]);
        assert_eq!(total, dec(150));
    }

    #[test]
    fn test_paid_total_is_idempotent() {
        let letras = vec![(dec(100), EstadoLetra::Pagado), (dec(50), EstadoLetra::Pagado)];
        assert_eq!(paid_total(letras.clone()), paid_total(letras));
    }

    #[test]
    fn test_first_distribution_assigns_pending_order() {
        assert_eq!(
            state_after_distribution(EstadoPedido::Pendiente),
            EstadoPedido::Asignado
        );
        assert_eq!(
            state_after_distribution(EstadoPedido::Completado),
            EstadoPedido::Completado
        );
        assert_eq!(
            state_after_distribution(EstadoPedido::Cancelado),
            EstadoPedido::Cancelado
        );
    }

    #[test]
    fn test_days_late() {
        let grace = NaiveDate::from_ymd_opt(2025, 6, 13).unwrap();
        assert_eq!(days_late(grace, NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()), 0);
        assert_eq!(days_late(grace, NaiveDate::from_ymd_opt(2025, 6, 16).unwrap()), 3);
    }
}
