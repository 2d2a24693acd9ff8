use chrono::NaiveDate;
use sqlx::{FromRow, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::models::{EstadoFactura, EstadoLetra};
use crate::worker::state_machine::{
    FacturaSnapshot, FacturaStateMachine, LetraSnapshot, LetraStateMachine, SweepAction,
    Transition,
};

/// An installment that may be overdue.
#[derive(Debug, Clone, FromRow)]
pub struct LetraCandidate {
    pub id: Uuid,
    pub estado: EstadoLetra,
    pub fecha_pago: NaiveDate,
    pub fecha_vencimiento_gracia: Option<NaiveDate>,
    pub dias_retraso: i32,
}

impl LetraCandidate {
    fn snapshot(&self) -> LetraSnapshot {
        LetraSnapshot {
            estado: self.estado,
            fecha_pago: self.fecha_pago,
            fecha_vencimiento_gracia: self.fecha_vencimiento_gracia,
            dias_retraso: self.dias_retraso,
        }
    }
}

/// An invoice that may be overdue.
#[derive(Debug, Clone, FromRow)]
pub struct FacturaCandidate {
    pub id: Uuid,
    pub numero_factura: String,
    pub estado: EstadoFactura,
    pub fecha_vencimiento: Option<NaiveDate>,
}

/// Applies sweep transitions to single documents.
///
/// Every update is guarded on the state the decision was made from, so a
/// concurrent payment wins over the sweep.
pub struct OverdueExecutor {
    pool: PgPool,
}

impl OverdueExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns the action that was applied.
    pub async fn process_letra(
        &self,
        letra: &LetraCandidate,
        today: NaiveDate,
    ) -> Result<SweepAction, anyhow::Error> {
        let (next_state, action) = LetraStateMachine::transition(&letra.snapshot(), today);

        let dias_retraso = match action {
            SweepAction::MarkOverdue { dias_retraso }
            | SweepAction::RefreshDelay { dias_retraso } => dias_retraso,
            SweepAction::NoAction => return Ok(action),
        };

        let result = sqlx::query(
            r#"
            UPDATE letras
            SET estado = $2,
                dias_retraso = $3,
                fecha_vencimiento_gracia = COALESCE(fecha_vencimiento_gracia, $4),
                updated_at = NOW()
            WHERE id = $1 AND estado = $5
            "#,
        )
        .bind(letra.id)
        .bind(next_state)
        .bind(dias_retraso)
        .bind(crate::engine::grace_date(letra.fecha_pago))
        .bind(letra.estado)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Changed since it was loaded
            return Ok(SweepAction::NoAction);
        }

        info!("Letra {}: {} -> {} ({})", letra.id, letra.estado, next_state, action);
        Ok(action)
    }

    /// Returns the action that was applied.
    pub async fn process_factura(
        &self,
        factura: &FacturaCandidate,
        today: NaiveDate,
    ) -> Result<SweepAction, anyhow::Error> {
        let snapshot = FacturaSnapshot {
            estado: factura.estado,
            fecha_vencimiento: factura.fecha_vencimiento,
        };
        let (next_state, action) = FacturaStateMachine::transition(&snapshot, today);

        if action == SweepAction::NoAction {
            return Ok(action);
        }

        let result = sqlx::query(
            "UPDATE facturas SET estado = $2, updated_at = NOW() WHERE id = $1 AND estado = $3",
        )
        .bind(factura.id)
        .bind(next_state)
        .bind(factura.estado)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(SweepAction::NoAction);
        }

        info!(
            "Factura {}: {} -> {}",
            factura.numero_factura, factura.estado, next_state
        );
        Ok(action)
    }
}
