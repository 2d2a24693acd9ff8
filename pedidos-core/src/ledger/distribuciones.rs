use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::info;

use super::cascade;
use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::distribucion::{
    CreateDistribucion, DistribucionFilter, DistribucionResponse, UpdateDistribucion,
};
use crate::models::{DistribucionFinal, EstadoPedido};
use crate::pagination::{PageParams, Paginated};
use crate::validation;

const SELECT_DISTRIBUCION: &str = r#"
    SELECT d.*,
        e.nombre AS empresa_nombre,
        pr.nombre AS proveedor_nombre,
        p.numero_pedido,
        (SELECT COUNT(*) FROM letras l
            WHERE l.distribucion_id = d.id AND l.estado <> 'pagado') AS letras_pendientes
    FROM distribuciones_finales d
    JOIN empresas e ON e.id = d.empresa_id
    JOIN pedidos p ON p.id = d.pedido_id
    JOIN proveedores pr ON pr.id = p.proveedor_id
"#;

const FILTER: &str = r#"
    WHERE ($1::uuid IS NULL OR d.pedido_id = $1)
      AND ($2::bigint IS NULL OR d.empresa_id = $2)
      AND ($3::boolean IS NULL OR d.completado = $3)
"#;

pub async fn list(
    pool: &PgPool,
    filter: DistribucionFilter,
    page: PageParams,
) -> AppResult<Paginated<DistribucionResponse>> {
    let count: i64 = sqlx::query_scalar(&format!(
        "SELECT COUNT(*) FROM distribuciones_finales d {}",
        FILTER
    ))
    .bind(filter.pedido)
    .bind(filter.empresa)
    .bind(filter.completado)
    .fetch_one(pool)
    .await?;

    let rows = sqlx::query_as::<_, DistribucionResponse>(&format!(
        "{} {} ORDER BY d.fecha_distribucion DESC, d.id DESC LIMIT $4 OFFSET $5",
        SELECT_DISTRIBUCION, FILTER
    ))
    .bind(filter.pedido)
    .bind(filter.empresa)
    .bind(filter.completado)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Paginated::new(rows, count, page))
}

/// Distributions with amount still available for installments.
pub async fn pendientes(pool: &PgPool) -> AppResult<Vec<DistribucionResponse>> {
    let rows = sqlx::query_as::<_, DistribucionResponse>(&format!(
        "{} WHERE d.monto_disponible > 0 ORDER BY d.fecha_distribucion, d.id",
        SELECT_DISTRIBUCION
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<DistribucionResponse> {
    sqlx::query_as::<_, DistribucionResponse>(&format!("{} WHERE d.id = $1", SELECT_DISTRIBUCION))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("distribución"))
}

/// Creates a distribution with its full amount available, then moves the
/// order forward (pendiente to asignado, cash completion).
pub async fn create(
    pool: &PgPool,
    input: CreateDistribucion,
    today: NaiveDate,
) -> AppResult<DistribucionFinal> {
    let mut errors = FieldErrors::new();
    validation::check_positive(&mut errors, "monto_final", input.monto_final);
    errors.into_result()?;

    let mut tx = pool.begin().await?;

    let pedido = cascade::lock_pedido(&mut tx, input.pedido_id).await?;
    if pedido.estado == EstadoPedido::Cancelado {
        return Err(AppError::Conflict(
            "no se puede distribuir un pedido cancelado".into(),
        ));
    }
    if pedido.estado == EstadoPedido::Completado && !pedido.es_contado {
        return Err(cascade::completed_credit_conflict());
    }

    let distribucion = sqlx::query_as::<_, DistribucionFinal>(
        r#"
        INSERT INTO distribuciones_finales
            (pedido_id, empresa_id, monto_final, monto_en_letras, monto_disponible,
             completado, fecha_distribucion, notas)
        VALUES ($1, $2, $3, 0, $3, FALSE, $4, $5)
        RETURNING *
        "#,
    )
    .bind(input.pedido_id)
    .bind(input.empresa_id)
    .bind(input.monto_final)
    .bind(input.fecha_distribucion.unwrap_or(today))
    .bind(input.notas.unwrap_or_default())
    .fetch_one(&mut *tx)
    .await?;

    cascade::refresh_pedido(&mut tx, distribucion.pedido_id).await?;
    tx.commit().await?;

    info!(
        "Distribución {} of {} created for pedido {}",
        distribucion.id, distribucion.monto_final, distribucion.pedido_id
    );
    Ok(distribucion)
}

/// A distribution's final amount may not drop below what its installments
/// already allocate.
pub fn check_covers_letras(monto_final: Decimal, monto_en_letras: Decimal) -> AppResult<()> {
    if monto_final < monto_en_letras {
        return Err(AppError::validation(
            "monto_final",
            format!(
                "El monto final no puede ser menor al monto ya asignado en letras ({})",
                monto_en_letras
            ),
        ));
    }
    Ok(())
}

/// Updates a distribution, recomputes it from its installments, keeps the
/// installments' company in step and re-evaluates the order.
pub async fn update(pool: &PgPool, id: i64, input: UpdateDistribucion) -> AppResult<DistribucionFinal> {
    if let Some(monto) = input.monto_final {
        let mut errors = FieldErrors::new();
        validation::check_positive(&mut errors, "monto_final", monto);
        errors.into_result()?;
    }

    let mut tx = pool.begin().await?;
    let current = cascade::lock_distribucion(&mut tx, id).await?;

    if let Some(monto) = input.monto_final {
        let asignado: Decimal =
            sqlx::query_scalar("SELECT COALESCE(SUM(monto), 0) FROM letras WHERE distribucion_id = $1")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        check_covers_letras(monto, asignado)?;
    }

    let updated = sqlx::query_as::<_, DistribucionFinal>(
        r#"
        UPDATE distribuciones_finales SET
            empresa_id = COALESCE($2, empresa_id),
            monto_final = COALESCE($3, monto_final),
            fecha_distribucion = COALESCE($4, fecha_distribucion),
            notas = COALESCE($5, notas),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(input.empresa_id)
    .bind(input.monto_final)
    .bind(input.fecha_distribucion)
    .bind(input.notas)
    .fetch_one(&mut *tx)
    .await?;

    if updated.empresa_id != current.empresa_id {
        sqlx::query("UPDATE letras SET empresa_id = $2, updated_at = NOW() WHERE distribucion_id = $1")
            .bind(id)
            .bind(updated.empresa_id)
            .execute(&mut *tx)
            .await?;
    }

    let updated = cascade::recompute_distribucion(&mut tx, &updated).await?;
    cascade::refresh_pedido(&mut tx, updated.pedido_id).await?;
    tx.commit().await?;

    Ok(updated)
}

/// Installments are deleted with the distribution; the order's paid and
/// final amounts are recomputed.
pub async fn delete(pool: &PgPool, id: i64) -> AppResult<()> {
    let mut tx = pool.begin().await?;
    let distribucion = cascade::lock_distribucion(&mut tx, id).await?;

    sqlx::query("DELETE FROM distribuciones_finales WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    cascade::recompute_pagado(&mut tx, distribucion.pedido_id).await?;
    cascade::refresh_pedido(&mut tx, distribucion.pedido_id).await?;
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_final_amount_must_cover_installments() {
        let asignado = Decimal::new(600, 0);
        assert!(check_covers_letras(Decimal::new(600, 0), asignado).is_ok());
        assert!(check_covers_letras(Decimal::new(900, 0), asignado).is_ok());
        match check_covers_letras(Decimal::ONE, asignado) {
            Err(AppError::Validation(fields)) => assert!(fields.contains("monto_final")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
