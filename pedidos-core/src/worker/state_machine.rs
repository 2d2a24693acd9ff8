use chrono::NaiveDate;
use std::fmt;

use crate::engine::{days_late, grace_date};
use crate::models::{EstadoFactura, EstadoLetra};

/// Action to take for a document during an overdue sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    /// Move the document to its overdue state
    MarkOverdue { dias_retraso: i32 },

    /// Already overdue; store the new delay
    RefreshDelay { dias_retraso: i32 },

    /// Nothing to change
    NoAction,
}

impl fmt::Display for SweepAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepAction::MarkOverdue { dias_retraso } => {
                write!(f, "mark_overdue ({} days)", dias_retraso)
            }
            SweepAction::RefreshDelay { dias_retraso } => {
                write!(f, "refresh_delay ({} days)", dias_retraso)
            }
            SweepAction::NoAction => write!(f, "no_action"),
        }
    }
}

/// Overdue transitions of a document type.
pub trait Transition {
    type State: Copy + PartialEq + fmt::Debug;
    type Document;

    /// Next state and action for `document` as of `today`.
    fn transition(document: &Self::Document, today: NaiveDate) -> (Self::State, SweepAction);

    /// States the sweep never leaves.
    fn is_terminal(state: Self::State) -> bool;
}

/// The fields of an installment the sweep looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LetraSnapshot {
    pub estado: EstadoLetra,
    pub fecha_pago: NaiveDate,
    pub fecha_vencimiento_gracia: Option<NaiveDate>,
    pub dias_retraso: i32,
}

impl LetraSnapshot {
    fn grace(&self) -> Option<NaiveDate> {
        self.fecha_vencimiento_gracia
            .or_else(|| grace_date(self.fecha_pago))
    }
}

/// `pendiente -> atrasado` once the grace date has passed.
/// `atrasado` keeps its delay current; `pagado` is terminal.
pub struct LetraStateMachine;

impl Transition for LetraStateMachine {
    type State = EstadoLetra;
    type Document = LetraSnapshot;

    fn transition(letra: &LetraSnapshot, today: NaiveDate) -> (EstadoLetra, SweepAction) {
        let Some(grace) = letra.grace() else {
            return (letra.estado, SweepAction::NoAction);
        };

        match letra.estado {
            EstadoLetra::Pendiente if grace < today => (
                EstadoLetra::Atrasado,
                SweepAction::MarkOverdue {
                    dias_retraso: days_late(grace, today),
                },
            ),
            EstadoLetra::Atrasado => {
                let dias_retraso = days_late(grace, today);
                if dias_retraso == letra.dias_retraso {
                    (EstadoLetra::Atrasado, SweepAction::NoAction)
                } else {
                    (EstadoLetra::Atrasado, SweepAction::RefreshDelay { dias_retraso })
                }
            }
            estado => (estado, SweepAction::NoAction),
        }
    }

    fn is_terminal(state: EstadoLetra) -> bool {
        state == EstadoLetra::Pagado
    }
}

/// The fields of an invoice the sweep looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FacturaSnapshot {
    pub estado: EstadoFactura,
    pub fecha_vencimiento: Option<NaiveDate>,
}

/// `emitida -> vencida` once the due date has passed.
pub struct FacturaStateMachine;

impl Transition for FacturaStateMachine {
    type State = EstadoFactura;
    type Document = FacturaSnapshot;

    fn transition(factura: &FacturaSnapshot, today: NaiveDate) -> (EstadoFactura, SweepAction) {
        match (factura.estado, factura.fecha_vencimiento) {
            (EstadoFactura::Emitida, Some(vencimiento)) if vencimiento < today => (
                EstadoFactura::Vencida,
                SweepAction::MarkOverdue {
                    dias_retraso: days_late(vencimiento, today),
                },
            ),
            (estado, _) => (estado, SweepAction::NoAction),
        }
    }

    fn is_terminal(state: EstadoFactura) -> bool {
        matches!(state, EstadoFactura::Pagada | EstadoFactura::Anulada)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn letra(estado: EstadoLetra, dias_retraso: i32) -> LetraSnapshot {
        // Mon 2025-06-02, grace date Fri 2025-06-13
        LetraSnapshot {
            estado,
            fecha_pago: date(2025, 6, 2),
            fecha_vencimiento_gracia: Some(date(2025, 6, 13)),
            dias_retraso,
        }
    }

    #[test]
    fn test_pending_letra_within_grace_is_untouched() {
        let (state, action) =
            LetraStateMachine::transition(&letra(EstadoLetra::Pendiente, 0), date(2025, 6, 13));
        assert_eq!(state, EstadoLetra::Pendiente);
        assert_eq!(action, SweepAction::NoAction);
    }

    #[test]
    fn test_pending_letra_past_grace_becomes_late() {
        let (state, action) =
            LetraStateMachine::transition(&letra(EstadoLetra::Pendiente, 0), date(2025, 6, 16));
        assert_eq!(state, EstadoLetra::Atrasado);
        assert_eq!(action, SweepAction::MarkOverdue { dias_retraso: 3 });
    }

    #[test]
    fn test_late_letra_refreshes_delay() {
        let (_, action) =
            LetraStateMachine::transition(&letra(EstadoLetra::Atrasado, 3), date(2025, 6, 20));
        assert_eq!(action, SweepAction::RefreshDelay { dias_retraso: 7 });

        let (_, action) =
            LetraStateMachine::transition(&letra(EstadoLetra::Atrasado, 7), date(2025, 6, 20));
        assert_eq!(action, SweepAction::NoAction);
    }

    #[test]
    fn test_paid_letra_is_terminal() {
        let (state, action) =
            LetraStateMachine::transition(&letra(EstadoLetra::Pagado, 0), date(2025, 9, 1));
        assert_eq!(state, EstadoLetra::Pagado);
        assert_eq!(action, SweepAction::NoAction);
        assert!(LetraStateMachine::is_terminal(EstadoLetra::Pagado));
    }

    #[test]
    fn test_missing_grace_date_is_computed() {
        let snapshot = LetraSnapshot {
            fecha_vencimiento_gracia: None,
            ..letra(EstadoLetra::Pendiente, 0)
        };
        let (state, _) = LetraStateMachine::transition(&snapshot, date(2025, 6, 14));
        assert_eq!(state, EstadoLetra::Atrasado);
    }

    #[test]
    fn test_factura_expires_after_due_date() {
        let factura = FacturaSnapshot {
            estado: EstadoFactura::Emitida,
            fecha_vencimiento: Some(date(2025, 6, 30)),
        };
        assert_eq!(
            FacturaStateMachine::transition(&factura, date(2025, 6, 30)).0,
            EstadoFactura::Emitida
        );
        assert_eq!(
            FacturaStateMachine::transition(&factura, date(2025, 7, 1)),
            (EstadoFactura::Vencida, SweepAction::MarkOverdue { dias_retraso: 1 })
        );
    }

    #[test]
    fn test_factura_without_due_date_or_paid_is_untouched() {
        let sin_vencimiento = FacturaSnapshot {
            estado: EstadoFactura::Emitida,
            fecha_vencimiento: None,
        };
        assert_eq!(
            FacturaStateMachine::transition(&sin_vencimiento, date(2030, 1, 1)).1,
            SweepAction::NoAction
        );

        let pagada = FacturaSnapshot {
            estado: EstadoFactura::Pagada,
            fecha_vencimiento: Some(date(2025, 1, 1)),
        };
        assert_eq!(
            FacturaStateMachine::transition(&pagada, date(2025, 6, 1)).0,
            EstadoFactura::Pagada
        );
        assert!(FacturaStateMachine::is_terminal(EstadoFactura::Anulada));
    }
}
