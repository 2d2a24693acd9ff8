use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use super::cascade;
use crate::engine::{next_sequence, order_number};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::pedido::{
    CreatePedido, PedidoFilter, PedidoResponse, PedidoResumen, UpdatePedido,
};
use crate::models::proveedor::DEFAULT_PLAZO_DIAS;
use crate::models::{EstadoPedido, Pedido, Proveedor};
use crate::pagination::{PageParams, Paginated};
use crate::validation;

const SELECT_PEDIDO: &str = r#"
    SELECT p.*,
        pr.nombre AS proveedor_nombre,
        (SELECT COUNT(*) FROM distribuciones_finales d WHERE d.pedido_id = p.id)
            AS distribuciones_count,
        (SELECT COUNT(*) FROM letras l WHERE l.pedido_id = p.id) AS letras_count
    FROM pedidos p
    JOIN proveedores pr ON pr.id = p.proveedor_id
"#;

const FILTER: &str = r#"
    WHERE ($1::bigint IS NULL OR p.proveedor_id = $1)
      AND ($2::varchar IS NULL OR p.estado = $2)
      AND ($3::boolean IS NULL OR p.es_contado = $3)
      AND ($4::date IS NULL OR p.fecha_pedido >= $4)
      AND ($5::date IS NULL OR p.fecha_pedido <= $5)
"#;

fn validate_amounts(
    errors: &mut FieldErrors,
    monto_total: Decimal,
    monto_pagado: Decimal,
    plazo_dias: Option<i32>,
) {
    validation::check_positive(errors, "monto_total_pedido", monto_total);
    validation::check_monto_pagado(errors, monto_pagado, monto_total);
    if monto_pagado < Decimal::ZERO {
        errors.add("monto_pagado", "El monto pagado no puede ser negativo");
    }
    if plazo_dias.is_some_and(|p| p < 0) {
        errors.add("plazo_dias", "El plazo no puede ser negativo");
    }
}

/// Number for the next order of `proveedor` on `fecha`, based on the
/// supplier's most recently created order.
async fn generate_numero(
    pool: &PgPool,
    proveedor: &Proveedor,
    fecha: NaiveDate,
) -> Result<String, sqlx::Error> {
    let previous = sqlx::query_scalar::<_, Option<String>>(
        r#"
        SELECT numero_pedido FROM pedidos
        WHERE proveedor_id = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(proveedor.id)
    .fetch_optional(pool)
    .await?
    .flatten();

    Ok(order_number(
        &proveedor.codigo(),
        fecha,
        next_sequence(previous.as_deref()),
    ))
}

pub async fn list(
    pool: &PgPool,
    filter: PedidoFilter,
    page: PageParams,
) -> AppResult<Paginated<PedidoResponse>> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM pedidos p {}", FILTER))
        .bind(filter.proveedor)
        .bind(filter.estado)
        .bind(filter.es_contado)
        .bind(filter.fecha_desde)
        .bind(filter.fecha_hasta)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, PedidoResponse>(&format!(
        "{} {} ORDER BY p.fecha_pedido DESC, p.created_at DESC LIMIT $6 OFFSET $7",
        SELECT_PEDIDO, FILTER
    ))
    .bind(filter.proveedor)
    .bind(filter.estado)
    .bind(filter.es_contado)
    .bind(filter.fecha_desde)
    .bind(filter.fecha_hasta)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let rows = rows.into_iter().map(PedidoResponse::with_derived).collect();
    Ok(Paginated::new(rows, count, page))
}

pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<PedidoResponse> {
    sqlx::query_as::<_, PedidoResponse>(&format!("{} WHERE p.id = $1", SELECT_PEDIDO))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(PedidoResponse::with_derived)
        .ok_or(AppError::NotFound("pedido"))
}

/// Creates an order. Number generation failures are logged and the order is
/// saved without a number.
pub async fn create(pool: &PgPool, input: CreatePedido) -> AppResult<Pedido> {
    let monto_pagado = input.monto_pagado.unwrap_or(Decimal::ZERO);
    let mut errors = FieldErrors::new();
    validate_amounts(&mut errors, input.monto_total_pedido, monto_pagado, input.plazo_dias);
    errors.into_result()?;

    let proveedor = sqlx::query_as::<_, Proveedor>("SELECT * FROM proveedores WHERE id = $1")
        .bind(input.proveedor_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::validation("proveedor_id", "El proveedor no existe"))?;

    let numero_pedido = match input.numero_pedido.filter(|n| !n.trim().is_empty()) {
        Some(numero) => Some(numero),
        None => match generate_numero(pool, &proveedor, input.fecha_pedido).await {
            Ok(numero) => Some(numero),
            Err(e) => {
                warn!(
                    "Could not generate order number for proveedor {}: {}",
                    proveedor.id, e
                );
                None
            }
        },
    };

    let plazo_dias = input.plazo_dias.unwrap_or(if proveedor.plazo_credito_default > 0 {
        proveedor.plazo_credito_default
    } else {
        DEFAULT_PLAZO_DIAS
    });

    let pedido = sqlx::query_as::<_, Pedido>(
        r#"
        INSERT INTO pedidos
            (id, proveedor_id, numero_pedido, monto_total_pedido, monto_pagado, estado,
             es_contado, fecha_pedido, plazo_dias, descripcion, notas_internas)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(proveedor.id)
    .bind(numero_pedido)
    .bind(input.monto_total_pedido)
    .bind(monto_pagado)
    .bind(EstadoPedido::Pendiente)
    .bind(input.es_contado.unwrap_or(false))
    .bind(input.fecha_pedido)
    .bind(plazo_dias)
    .bind(input.descripcion)
    .bind(input.notas_internas.unwrap_or_default())
    .fetch_one(pool)
    .await?;

    info!(
        "Pedido {} created for proveedor {}",
        pedido.numero_pedido.as_deref().unwrap_or("(sin número)"),
        proveedor.nombre
    );
    Ok(pedido)
}

/// Updates an order and re-evaluates its status, since the total affects
/// cash-sale completion.
pub async fn update(pool: &PgPool, id: Uuid, input: UpdatePedido) -> AppResult<Pedido> {
    let mut tx = pool.begin().await?;
    let current = cascade::lock_pedido(&mut tx, id).await?;

    let monto_total = input.monto_total_pedido.unwrap_or(current.monto_total_pedido);
    let monto_pagado = input.monto_pagado.unwrap_or(current.monto_pagado);
    let mut errors = FieldErrors::new();
    validate_amounts(&mut errors, monto_total, monto_pagado, input.plazo_dias);
    errors.into_result()?;

    sqlx::query(
        r#"
        UPDATE pedidos SET
            proveedor_id = COALESCE($2, proveedor_id),
            monto_total_pedido = $3,
            monto_pagado = $4,
            es_contado = COALESCE($5, es_contado),
            fecha_pedido = COALESCE($6, fecha_pedido),
            plazo_dias = COALESCE($7, plazo_dias),
            descripcion = COALESCE($8, descripcion),
            notas_internas = COALESCE($9, notas_internas),
            numero_pedido = COALESCE($10, numero_pedido),
            updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(input.proveedor_id)
    .bind(monto_total)
    .bind(monto_pagado)
    .bind(input.es_contado)
    .bind(input.fecha_pedido)
    .bind(input.plazo_dias)
    .bind(input.descripcion)
    .bind(input.notas_internas)
    .bind(input.numero_pedido)
    .execute(&mut *tx)
    .await?;

    let pedido = cascade::refresh_pedido(&mut tx, id).await?;
    tx.commit().await?;
    Ok(pedido)
}

/// Distributions, installments and guides are deleted with the order.
///
/// The distributions are locked before the order so the delete waits behind
/// installment writes instead of deadlocking with them.
pub async fn delete(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM distribuciones_finales WHERE pedido_id = $1 ORDER BY id FOR UPDATE")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    cascade::lock_pedido(&mut tx, id).await?;

    sqlx::query("DELETE FROM pedidos WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!("Pedido {} deleted", id);
    Ok(())
}

/// Explicit mark-assigned action.
pub async fn asignar(pool: &PgPool, id: Uuid) -> AppResult<Pedido> {
    let mut tx = pool.begin().await?;
    let pedido = cascade::lock_pedido(&mut tx, id).await?;

    let pedido = match pedido.estado {
        EstadoPedido::Asignado => pedido,
        EstadoPedido::Pendiente => {
            sqlx::query_as::<_, Pedido>(
                "UPDATE pedidos SET estado = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .bind(EstadoPedido::Asignado)
            .fetch_one(&mut *tx)
            .await?
        }
        estado => {
            return Err(AppError::Conflict(format!(
                "no se puede asignar un pedido en estado {}",
                estado
            )))
        }
    };

    tx.commit().await?;
    Ok(pedido)
}

/// Cancels an order that is not yet completed. Cancelling twice is a no-op.
pub async fn cancelar(pool: &PgPool, id: Uuid) -> AppResult<Pedido> {
    let mut tx = pool.begin().await?;
    let pedido = cascade::lock_pedido(&mut tx, id).await?;

    let pedido = match pedido.estado {
        EstadoPedido::Completado => {
            return Err(AppError::Conflict(
                "no se puede cancelar un pedido completado".into(),
            ))
        }
        EstadoPedido::Cancelado => pedido,
        _ => {
            sqlx::query_as::<_, Pedido>(
                "UPDATE pedidos SET estado = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .bind(EstadoPedido::Cancelado)
            .fetch_one(&mut *tx)
            .await?
        }
    };

    tx.commit().await?;
    info!("Pedido {} cancelled", id);
    Ok(pedido)
}

pub async fn resumen(pool: &PgPool, id: Uuid) -> AppResult<PedidoResumen> {
    let detail = get(pool, id).await?;
    let pedido = &detail.pedido;

    let (monto_distribuido, monto_en_letras, distribuciones_count, distribuciones_completadas): (
        Decimal,
        Decimal,
        i64,
        i64,
    ) = sqlx::query_as(
        r#"
        SELECT COALESCE(SUM(monto_final), 0),
               COALESCE(SUM(monto_en_letras), 0),
               COUNT(*),
               COUNT(*) FILTER (WHERE completado)
        FROM distribuciones_finales
        WHERE pedido_id = $1
        "#,
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    let (letras_count, letras_pagadas): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE estado = 'pagado') FROM letras WHERE pedido_id = $1",
    )
    .bind(id)
    .fetch_one(pool)
    .await?;

    let guias_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM guias_remision WHERE pedido_id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;

    Ok(PedidoResumen {
        id: pedido.id,
        numero_pedido: pedido.numero_pedido.clone(),
        proveedor_nombre: detail.proveedor_nombre.clone(),
        estado: pedido.estado,
        tipo_pedido: pedido.tipo_pedido().to_string(),
        monto_total_pedido: pedido.monto_total_pedido,
        monto_final_pedido: pedido.monto_final_pedido,
        monto_distribuido,
        monto_en_letras,
        monto_pagado: pedido.monto_pagado,
        porcentaje_pagado: pedido.porcentaje_pagado(),
        distribuciones_count,
        distribuciones_completadas,
        letras_count,
        letras_pagadas,
        guias_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagado_above_total_rejected() {
        let mut errors = FieldErrors::new();
        validate_amounts(&mut errors, Decimal::new(100, 0), Decimal::new(150, 0), None);
        assert!(errors.contains("monto_pagado"));
    }

    #[test]
    fn test_non_positive_total_rejected() {
        let mut errors = FieldErrors::new();
        validate_amounts(&mut errors, Decimal::ZERO, Decimal::ZERO, Some(-3));
        assert!(errors.contains("monto_total_pedido"));
        assert!(errors.contains("plazo_dias"));
    }

    #[test]
    fn test_valid_amounts() {
        let mut errors = FieldErrors::new();
        validate_amounts(&mut errors, Decimal::new(100, 0), Decimal::new(100, 0), Some(30));
        assert!(errors.is_empty());
    }
}
