use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, warn};
use uuid::Uuid;

use super::cascade;
use crate::engine::grace_date;
use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::letra::{
    BulkLetras, CreateLetra, LetraFilter, LetraResponse, MarcarPagada, UpdateLetra,
};
use crate::models::{DistribucionFinal, EstadoLetra, Letra};
use crate::pagination::{PageParams, Paginated};
use crate::validation;

pub const DEFAULT_PROXIMAS_DIAS: u64 = 7;

const SELECT_LETRA: &str = r#"
    SELECT l.*,
        e.nombre AS empresa_nombre,
        pr.nombre AS proveedor,
        p.numero_pedido
    FROM letras l
    JOIN empresas e ON e.id = l.empresa_id
    JOIN pedidos p ON p.id = l.pedido_id
    JOIN proveedores pr ON pr.id = p.proveedor_id
"#;

const FILTER: &str = r#"
    WHERE ($1::varchar IS NULL OR l.estado = $1)
      AND ($2::bigint IS NULL OR l.empresa_id = $2)
      AND ($3::bigint IS NULL OR l.distribucion_id = $3)
      AND ($4::date IS NULL OR l.fecha_pago >= $4)
      AND ($5::date IS NULL OR l.fecha_pago <= $5)
"#;

/// Grace date for `fecha_pago`; left empty if it cannot be computed.
fn grace_or_none(fecha_pago: NaiveDate) -> Option<NaiveDate> {
    let grace = grace_date(fecha_pago);
    if grace.is_none() {
        warn!("Could not compute grace date for {}", fecha_pago);
    }
    grace
}

/// Validation of a bulk request, before the distribution is looked at.
pub fn validate_bulk(input: &BulkLetras, today: NaiveDate) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    if input.montos.is_empty() {
        errors.add("montos", "Debe indicar al menos un monto");
    }
    if input.montos.len() != input.fechas.len() {
        errors.add(
            "fechas",
            "La cantidad de fechas debe coincidir con la cantidad de montos",
        );
    }
    if input.montos.iter().any(|m| *m <= Decimal::ZERO) {
        errors.add("montos", validation::MSG_MONTO_POSITIVO);
    }
    if input.fechas.iter().any(|f| *f < today) {
        errors.add("fechas", "La fecha de pago no puede ser en el pasado");
    }
    errors.into_result()
}

pub async fn list(
    pool: &PgPool,
    filter: LetraFilter,
    page: PageParams,
    today: NaiveDate,
) -> AppResult<Paginated<LetraResponse>> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM letras l {}", FILTER))
        .bind(filter.estado)
        .bind(filter.empresa)
        .bind(filter.distribucion)
        .bind(filter.fecha_desde)
        .bind(filter.fecha_hasta)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, LetraResponse>(&format!(
        "{} {} ORDER BY l.fecha_pago, l.created_at LIMIT $6 OFFSET $7",
        SELECT_LETRA, FILTER
    ))
    .bind(filter.estado)
    .bind(filter.empresa)
    .bind(filter.distribucion)
    .bind(filter.fecha_desde)
    .bind(filter.fecha_hasta)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let rows = rows
        .into_iter()
        .map(|row| row.with_dias_restantes(today))
        .collect();
    Ok(Paginated::new(rows, count, page))
}

pub async fn get(pool: &PgPool, id: Uuid, today: NaiveDate) -> AppResult<LetraResponse> {
    sqlx::query_as::<_, LetraResponse>(&format!("{} WHERE l.id = $1", SELECT_LETRA))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(|row| row.with_dias_restantes(today))
        .ok_or(AppError::NotFound("letra"))
}

/// Pending installments due between today and `dias` days from now.
pub async fn proximas(pool: &PgPool, dias: u64, today: NaiveDate) -> AppResult<Vec<LetraResponse>> {
    let hasta = today.checked_add_days(Days::new(dias)).unwrap_or(NaiveDate::MAX);

    let rows = sqlx::query_as::<_, LetraResponse>(&format!(
        "{} WHERE l.estado = 'pendiente' AND l.fecha_pago BETWEEN $1 AND $2 ORDER BY l.fecha_pago",
        SELECT_LETRA
    ))
    .bind(today)
    .bind(hasta)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.with_dias_restantes(today))
        .collect())
}

/// The next `limit` pending installments from today on.
pub async fn siguientes(pool: &PgPool, limit: i64, today: NaiveDate) -> AppResult<Vec<LetraResponse>> {
    let rows = sqlx::query_as::<_, LetraResponse>(&format!(
        "{} WHERE l.estado = 'pendiente' AND l.fecha_pago >= $1 ORDER BY l.fecha_pago LIMIT $2",
        SELECT_LETRA
    ))
    .bind(today)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| row.with_dias_restantes(today))
        .collect())
}

async fn insert_letra(
    tx: &mut Transaction<'_, Postgres>,
    distribucion: &DistribucionFinal,
    monto: Decimal,
    fecha_pago: NaiveDate,
    numero_unico: Option<String>,
    notas: String,
) -> AppResult<Letra> {
    let letra = sqlx::query_as::<_, Letra>(
        r#"
        INSERT INTO letras
            (id, distribucion_id, pedido_id, empresa_id, numero_unico, monto, fecha_pago,
             estado, fecha_vencimiento_gracia, notas)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(distribucion.id)
    .bind(distribucion.pedido_id)
    .bind(distribucion.empresa_id)
    .bind(numero_unico.filter(|n| !n.trim().is_empty()))
    .bind(monto)
    .bind(fecha_pago)
    .bind(EstadoLetra::Pendiente)
    .bind(grace_or_none(fecha_pago))
    .bind(notas)
    .fetch_one(&mut **tx)
    .await?;
    Ok(letra)
}

/// Creates one installment; it must fit in the distribution's available amount.
pub async fn create(pool: &PgPool, input: CreateLetra, today: NaiveDate) -> AppResult<Letra> {
    let mut errors = FieldErrors::new();
    validation::check_positive(&mut errors, "monto", input.monto);
    validation::check_fecha_pago(&mut errors, "fecha_pago", input.fecha_pago, today);
    errors.into_result()?;

    let mut tx = pool.begin().await?;
    let distribucion = cascade::lock_distribucion(&mut tx, input.distribucion_id).await?;

    let mut errors = FieldErrors::new();
    validation::check_allocation(&mut errors, "monto", input.monto, distribucion.monto_disponible);
    errors.into_result()?;

    let letra = insert_letra(
        &mut tx,
        &distribucion,
        input.monto,
        input.fecha_pago,
        input.numero_unico,
        input.notas.unwrap_or_default(),
    )
    .await?;

    cascade::after_letra_write(&mut tx, &distribucion, false).await?;
    tx.commit().await?;

    Ok(letra)
}

/// Creates several installments at once. The whole batch is rejected when
/// its sum exceeds what the distribution has available.
pub async fn bulk_create(pool: &PgPool, input: BulkLetras, today: NaiveDate) -> AppResult<Vec<Letra>> {
    validate_bulk(&input, today)?;

    let mut tx = pool.begin().await?;
    let distribucion = cascade::lock_distribucion(&mut tx, input.distribucion_id).await?;

    let total: Decimal = input.montos.iter().copied().sum();
    let mut errors = FieldErrors::new();
    validation::check_allocation(&mut errors, "montos", total, distribucion.monto_disponible);
    errors.into_result()?;

    let mut letras = Vec::with_capacity(input.montos.len());
    for (monto, fecha_pago) in input.montos.iter().zip(input.fechas.iter()) {
        letras.push(insert_letra(&mut tx, &distribucion, *monto, *fecha_pago, None, String::new()).await?);
    }

    cascade::after_letra_write(&mut tx, &distribucion, false).await?;
    tx.commit().await?;

    info!(
        "{} letras totalling {} created on distribución {}",
        letras.len(),
        total,
        distribucion.id
    );
    Ok(letras)
}

async fn distribucion_of(pool: &PgPool, letra_id: Uuid) -> AppResult<i64> {
    sqlx::query_scalar("SELECT distribucion_id FROM letras WHERE id = $1")
        .bind(letra_id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("letra"))
}

async fn lock_letra(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> AppResult<Letra> {
    sqlx::query_as::<_, Letra>("SELECT * FROM letras WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(AppError::NotFound("letra"))
}

pub async fn update(pool: &PgPool, id: Uuid, input: UpdateLetra, today: NaiveDate) -> AppResult<Letra> {
    let mut errors = FieldErrors::new();
    if let Some(monto) = input.monto {
        validation::check_positive(&mut errors, "monto", monto);
    }
    errors.into_result()?;

    let distribucion_id = distribucion_of(pool, id).await?;
    let mut tx = pool.begin().await?;
    let distribucion = cascade::lock_distribucion(&mut tx, distribucion_id).await?;
    let current = lock_letra(&mut tx, id).await?;

    let mut errors = FieldErrors::new();
    if let Some(monto) = input.monto {
        validation::check_allocation(
            &mut errors,
            "monto",
            monto,
            distribucion.monto_disponible + current.monto,
        );
    }
    let fecha_pago = match input.fecha_pago {
        Some(fecha) if fecha != current.fecha_pago => {
            validation::check_fecha_pago(&mut errors, "fecha_pago", fecha, today);
            fecha
        }
        _ => current.fecha_pago,
    };
    errors.into_result()?;

    let grace = if fecha_pago != current.fecha_pago || current.fecha_vencimiento_gracia.is_none() {
        grace_or_none(fecha_pago)
    } else {
        current.fecha_vencimiento_gracia
    };
    let estado = input.estado.unwrap_or(current.estado);
    let fecha_pago_real = match estado {
        EstadoLetra::Pagado => input.fecha_pago_real.or(current.fecha_pago_real).or(Some(today)),
        _ => input.fecha_pago_real.or(current.fecha_pago_real),
    };

    let letra = sqlx::query_as::<_, Letra>(
        r#"
        UPDATE letras SET
            monto = COALESCE($2, monto),
            fecha_pago = $3,
            fecha_vencimiento_gracia = $4,
            estado = $5,
            numero_unico = COALESCE($6, numero_unico),
            fecha_pago_real = $7,
            banco = COALESCE($8, banco),
            numero_operacion = COALESCE($9, numero_operacion),
            notas = COALESCE($10, notas),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(input.monto)
    .bind(fecha_pago)
    .bind(grace)
    .bind(estado)
    .bind(input.numero_unico)
    .bind(fecha_pago_real)
    .bind(input.banco)
    .bind(input.numero_operacion)
    .bind(input.notas)
    .fetch_one(&mut *tx)
    .await?;

    let paid_changed = current.estado == EstadoLetra::Pagado || letra.estado == EstadoLetra::Pagado;
    cascade::after_letra_write(&mut tx, &distribucion, paid_changed).await?;
    tx.commit().await?;

    Ok(letra)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let distribucion_id = distribucion_of(pool, id).await?;
    let mut tx = pool.begin().await?;
    let distribucion = cascade::lock_distribucion(&mut tx, distribucion_id).await?;
    let letra = lock_letra(&mut tx, id).await?;

    sqlx::query("DELETE FROM letras WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    cascade::after_letra_write(&mut tx, &distribucion, letra.estado == EstadoLetra::Pagado).await?;
    tx.commit().await?;
    Ok(())
}

/// Marks an installment paid and accrues the payment on its order.
///
/// Concurrent calls on the same distribution serialise on the distribution
/// row lock, so each one recomputes from the committed state of the other.
pub async fn marcar_pagada(
    pool: &PgPool,
    id: Uuid,
    input: MarcarPagada,
    today: NaiveDate,
) -> AppResult<Letra> {
    let distribucion_id = distribucion_of(pool, id).await?;
    let mut tx = pool.begin().await?;
    let distribucion = cascade::lock_distribucion(&mut tx, distribucion_id).await?;
    lock_letra(&mut tx, id).await?;

    let letra = sqlx::query_as::<_, Letra>(
        r#"
        UPDATE letras SET
            estado = $2,
            fecha_pago_real = $3,
            banco = COALESCE($4, banco),
            numero_operacion = COALESCE($5, numero_operacion),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(EstadoLetra::Pagado)
    .bind(input.fecha_pago_real.unwrap_or(today))
    .bind(input.banco)
    .bind(input.numero_operacion)
    .fetch_one(&mut *tx)
    .await?;

    cascade::after_letra_write(&mut tx, &distribucion, true).await?;
    tx.commit().await?;

    info!("Letra {} marked as paid ({})", letra.id, letra.monto);
    Ok(letra)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn dec(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    #[test]
    fn test_bulk_lengths_must_match() {
        let input = BulkLetras {
            distribucion_id: 1,
            montos: vec![dec(300), dec(200)],
            fechas: vec![date(2025, 7, 1)],
        };
        match validate_bulk(&input, date(2025, 6, 1)) {
            Err(AppError::Validation(fields)) => assert!(fields.contains("fechas")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_bulk_rejects_past_dates_and_zero_amounts() {
        let input = BulkLetras {
            distribucion_id: 1,
            montos: vec![dec(0), dec(200)],
            fechas: vec![date(2025, 5, 1), date(2025, 7, 1)],
        };
        match validate_bulk(&input, date(2025, 6, 1)) {
            Err(AppError::Validation(fields)) => {
                assert!(fields.contains("montos"));
                assert!(fields.contains("fechas"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_bulk_empty_rejected() {
        let input = BulkLetras {
            distribucion_id: 1,
            montos: vec![],
            fechas: vec![],
        };
        assert!(validate_bulk(&input, date(2025, 6, 1)).is_err());
    }

    #[test]
    fn test_bulk_valid() {
        let input = BulkLetras {
            distribucion_id: 1,
            montos: vec![dec(300), dec(200)],
            fechas: vec![date(2025, 7, 1), date(2025, 8, 1)],
        };
        assert!(validate_bulk(&input, date(2025, 6, 1)).is_ok());
    }
}
