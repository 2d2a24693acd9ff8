//! Roll-ups from installments up through distributions to orders.
//!
//! Every function takes the caller's transaction, so a failure at any step
//! rolls back the write that triggered it. Locks are always taken in the
//! order distribution, then order.

use rust_decimal::Decimal;
use sqlx::{Postgres, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{
    cash_order_complete, credit_order_complete, distribution_totals, paid_total,
    reopens_credit_order, state_after_distribution,
};
use crate::error::{AppError, AppResult};
use crate::models::{DistribucionFinal, EstadoLetra, EstadoPedido, Pedido};

pub async fn lock_distribucion(
    tx: &mut Transaction<'_, Postgres>,
    id: i64,
) -> AppResult<DistribucionFinal> {
    sqlx::query_as::<_, DistribucionFinal>(
        "SELECT * FROM distribuciones_finales WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(AppError::NotFound("distribución"))
}

pub async fn lock_pedido(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<Pedido> {
    sqlx::query_as::<_, Pedido>("SELECT * FROM pedidos WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::NotFound("pedido"))
}

pub fn completed_credit_conflict() -> AppError {
    AppError::Conflict(
        "el pedido a crédito está completado; sus distribuciones no pueden reabrirse".into(),
    )
}

/// Recomputes allocated/available/completed of a distribution from all of
/// its installments. The row must already be locked by the caller.
pub async fn recompute_distribucion(
    tx: &mut Transaction<'_, Postgres>,
    distribucion: &DistribucionFinal,
) -> AppResult<DistribucionFinal> {
    let montos: Vec<Decimal> =
        sqlx::query_scalar("SELECT monto FROM letras WHERE distribucion_id = $1")
            .bind(distribucion.id)
            .fetch_all(&mut **tx)
            .await?;

    let totals = distribution_totals(distribucion.monto_final, montos);

    let updated = sqlx::query_as::<_, DistribucionFinal>(
        r#"
        UPDATE distribuciones_finales
        SET monto_en_letras = $2, monto_disponible = $3, completado = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(distribucion.id)
    .bind(totals.monto_en_letras)
    .bind(totals.monto_disponible)
    .bind(totals.completado)
    .fetch_one(&mut **tx)
    .await?;

    debug!(
        "Distribución {}: en letras {}, disponible {}, completado {}",
        updated.id, updated.monto_en_letras, updated.monto_disponible, updated.completado
    );
    Ok(updated)
}

/// Re-derives an order's final amount and status from its distributions.
///
/// - pendiente becomes asignado once a distribution exists
/// - asignado becomes completado when every distribution is complete (credit)
///   or when the distribution finals cover the order total (cash)
/// - completado and cancelado are left alone
///
/// Fails with a conflict, rolling back the caller's write, when a completed
/// credit order would be left with an incomplete distribution.
pub async fn refresh_pedido(tx: &mut Transaction<'_, Postgres>, pedido_id: Uuid) -> AppResult<Pedido> {
    let pedido = lock_pedido(tx, pedido_id).await?;

    let distribuciones: Vec<(Decimal, bool)> = sqlx::query_as(
        "SELECT monto_final, completado FROM distribuciones_finales WHERE pedido_id = $1",
    )
    .bind(pedido_id)
    .fetch_all(&mut **tx)
    .await?;

    if reopens_credit_order(
        pedido.estado,
        pedido.es_contado,
        distribuciones.iter().map(|(_, completado)| *completado),
    ) {
        return Err(completed_credit_conflict());
    }

    let monto_final_pedido = if distribuciones.is_empty() {
        None
    } else {
        Some(distribuciones.iter().map(|(monto, _)| *monto).sum::<Decimal>())
    };

    let mut estado = pedido.estado;
    if !distribuciones.is_empty() {
        estado = state_after_distribution(estado);
    }
    if estado == EstadoPedido::Asignado {
        let complete = if pedido.es_contado {
            cash_order_complete(
                pedido.monto_total_pedido,
                distribuciones.iter().map(|(monto, _)| *monto),
            )
        } else {
            credit_order_complete(distribuciones.iter().map(|(_, completado)| *completado))
        };
        if complete {
            estado = EstadoPedido::Completado;
        }
    }

    if estado == pedido.estado && monto_final_pedido == pedido.monto_final_pedido {
        return Ok(pedido);
    }

    if estado != pedido.estado {
        info!(
            "Pedido {} {} -> {}",
            pedido.numero_pedido.as_deref().unwrap_or("(sin número)"),
            pedido.estado,
            estado
        );
    }

    let updated = sqlx::query_as::<_, Pedido>(
        r#"
        UPDATE pedidos
        SET estado = $2, completado = $3, monto_final_pedido = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(pedido_id)
    .bind(estado)
    .bind(pedido.completado || estado == EstadoPedido::Completado)
    .bind(monto_final_pedido)
    .fetch_one(&mut **tx)
    .await?;

    Ok(updated)
}

/// Sets `monto_pagado` to the sum of the order's paid installments,
/// recomputed from scratch.
pub async fn recompute_pagado(tx: &mut Transaction<'_, Postgres>, pedido_id: Uuid) -> AppResult<Decimal> {
    let letras: Vec<(Decimal, EstadoLetra)> =
        sqlx::query_as("SELECT monto, estado FROM letras WHERE pedido_id = $1")
            .bind(pedido_id)
            .fetch_all(&mut **tx)
            .await?;

    let total = paid_total(letras);

    sqlx::query("UPDATE pedidos SET monto_pagado = $2, updated_at = NOW() WHERE id = $1")
        .bind(pedido_id)
        .bind(total)
        .execute(&mut **tx)
        .await?;

    Ok(total)
}

/// Full cascade after any installment write on `distribucion`.
pub async fn after_letra_write(
    tx: &mut Transaction<'_, Postgres>,
    distribucion: &DistribucionFinal,
    paid_changed: bool,
) -> AppResult<DistribucionFinal> {
    let updated = recompute_distribucion(tx, distribucion).await?;
    if paid_changed {
        recompute_pagado(tx, updated.pedido_id).await?;
    }
    refresh_pedido(tx, updated.pedido_id).await?;
    Ok(updated)
}
