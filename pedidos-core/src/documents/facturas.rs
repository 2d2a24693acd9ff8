use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::factura::{CreateFactura, DocumentoFilter, FacturaResponse, UpdateFactura};
use crate::models::{EstadoFactura, Factura};
use crate::pagination::{PageParams, Paginated};
use crate::validation;

const MSG_VENCIMIENTO: &str =
    "La fecha de vencimiento no puede ser anterior a la fecha de emisión";

const SELECT_FACTURA: &str = r#"
    SELECT f.*,
        e.nombre AS empresa,
        g.numero_guia AS guia,
        pr.nombre AS proveedor
    FROM facturas f
    JOIN empresas e ON e.id = f.empresa_id
    JOIN guias_remision g ON g.id = f.guia_id
    JOIN pedidos p ON p.id = g.pedido_id
    JOIN proveedores pr ON pr.id = p.proveedor_id
"#;

const FILTER: &str = r#"
    WHERE ($1::bigint IS NULL OR f.empresa_id = $1)
      AND ($2::varchar IS NULL OR f.estado = $2)
      AND ($3::date IS NULL OR f.fecha_emision >= $3)
      AND ($4::date IS NULL OR f.fecha_emision <= $4)
"#;

pub fn validate_create(input: &CreateFactura) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    validation::check_numero_factura(&mut errors, &input.numero_factura);
    validation::check_positive(&mut errors, "monto_factura", input.monto_factura);
    validation::check_not_before_emision(
        &mut errors,
        "fecha_vencimiento",
        input.fecha_vencimiento,
        input.fecha_emision,
        MSG_VENCIMIENTO,
    );
    errors.into_result()
}

pub async fn list(
    pool: &PgPool,
    filter: DocumentoFilter,
    page: PageParams,
    today: NaiveDate,
) -> AppResult<Paginated<FacturaResponse>> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM facturas f {}", FILTER))
        .bind(filter.empresa)
        .bind(filter.estado.as_deref())
        .bind(filter.fecha_desde)
        .bind(filter.fecha_hasta)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, FacturaResponse>(&format!(
        "{} {} ORDER BY f.fecha_emision DESC LIMIT $5 OFFSET $6",
        SELECT_FACTURA, FILTER
    ))
    .bind(filter.empresa)
    .bind(filter.estado.as_deref())
    .bind(filter.fecha_desde)
    .bind(filter.fecha_hasta)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    let rows = rows
        .into_iter()
        .map(|row| row.with_dias_vencimiento(today))
        .collect();
    Ok(Paginated::new(rows, count, page))
}

pub async fn get(pool: &PgPool, id: Uuid, today: NaiveDate) -> AppResult<FacturaResponse> {
    sqlx::query_as::<_, FacturaResponse>(&format!("{} WHERE f.id = $1", SELECT_FACTURA))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .map(|row| row.with_dias_vencimiento(today))
        .ok_or(AppError::NotFound("factura"))
}

/// The invoice takes its company from the guide.
pub async fn create(pool: &PgPool, input: CreateFactura) -> AppResult<Factura> {
    validate_create(&input)?;

    let empresa_id: i64 = sqlx::query_scalar("SELECT empresa_id FROM guias_remision WHERE id = $1")
        .bind(input.guia_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::validation("guia_id", "La guía no existe"))?;

    let factura = sqlx::query_as::<_, Factura>(
        r#"
        INSERT INTO facturas
            (id, guia_id, empresa_id, numero_factura, monto_factura, fecha_emision,
             fecha_vencimiento, estado, condicion_pago, notas)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.guia_id)
    .bind(empresa_id)
    .bind(input.numero_factura.trim())
    .bind(input.monto_factura)
    .bind(input.fecha_emision)
    .bind(input.fecha_vencimiento)
    .bind(input.estado.unwrap_or(EstadoFactura::Emitida))
    .bind(input.condicion_pago.unwrap_or_default())
    .bind(input.notas.unwrap_or_default())
    .fetch_one(pool)
    .await?;

    Ok(factura)
}

pub async fn update(pool: &PgPool, id: Uuid, input: UpdateFactura) -> AppResult<Factura> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, Factura>("SELECT * FROM facturas WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("factura"))?;

    let mut errors = FieldErrors::new();
    if let Some(numero) = &input.numero_factura {
        validation::check_numero_factura(&mut errors, numero);
    }
    if let Some(monto) = input.monto_factura {
        validation::check_positive(&mut errors, "monto_factura", monto);
    }
    validation::check_not_before_emision(
        &mut errors,
        "fecha_vencimiento",
        input.fecha_vencimiento.or(current.fecha_vencimiento),
        input.fecha_emision.unwrap_or(current.fecha_emision),
        MSG_VENCIMIENTO,
    );
    errors.into_result()?;

    let factura = sqlx::query_as::<_, Factura>(
        r#"
        UPDATE facturas SET
            numero_factura = COALESCE($2, numero_factura),
            monto_factura = COALESCE($3, monto_factura),
            fecha_emision = COALESCE($4, fecha_emision),
            fecha_vencimiento = COALESCE($5, fecha_vencimiento),
            estado = COALESCE($6, estado),
            condicion_pago = COALESCE($7, condicion_pago),
            notas = COALESCE($8, notas),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(input.numero_factura)
    .bind(input.monto_factura)
    .bind(input.fecha_emision)
    .bind(input.fecha_vencimiento)
    .bind(input.estado)
    .bind(input.condicion_pago)
    .bind(input.notas)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(factura)
}

pub async fn delete(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM facturas WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("factura"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn input(numero: &str, monto: i64, vence: Option<NaiveDate>) -> CreateFactura {
        CreateFactura {
            guia_id: Uuid::new_v4(),
            numero_factura: numero.into(),
            monto_factura: Decimal::new(monto, 0),
            fecha_emision: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            fecha_vencimiento: vence,
            estado: None,
            condicion_pago: None,
            notas: None,
        }
    }

    #[test]
    fn test_valid_invoice() {
        assert!(validate_create(&input("F001-12", 100, None)).is_ok());
        assert!(validate_create(&input("E001-12", 100, NaiveDate::from_ymd_opt(2025, 7, 10))).is_ok());
    }

    #[test]
    fn test_invalid_invoice_reports_all_fields() {
        let bad = input("B001-12", 0, NaiveDate::from_ymd_opt(2025, 6, 1));
        match validate_create(&bad) {
            Err(AppError::Validation(fields)) => {
                assert!(fields.contains("numero_factura"));
                assert!(fields.contains("monto_factura"));
                assert!(fields.contains("fecha_vencimiento"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
