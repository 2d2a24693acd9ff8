use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::factura::DocumentoFilter;
use crate::models::guia::{CreateGuia, GuiaResponse, UpdateGuia};
use crate::models::{EstadoGuia, GuiaDeRemision};
use crate::pagination::{PageParams, Paginated};
use crate::validation;

const MSG_RECEPCION: &str = "La fecha de recepción no puede ser anterior a la fecha de emisión";

const SELECT_GUIA: &str = r#"
    SELECT g.*,
        e.nombre AS empresa,
        pr.nombre AS proveedor,
        (SELECT COUNT(*) FROM facturas f WHERE f.guia_id = g.id) AS facturas_count,
        COALESCE((SELECT SUM(f.monto_factura) FROM facturas f WHERE f.guia_id = g.id), 0)
            AS monto_total_facturas
    FROM guias_remision g
    JOIN empresas e ON e.id = g.empresa_id
    JOIN pedidos p ON p.id = g.pedido_id
    JOIN proveedores pr ON pr.id = p.proveedor_id
"#;

const FILTER: &str = r#"
    WHERE ($1::bigint IS NULL OR g.empresa_id = $1)
      AND ($2::varchar IS NULL OR g.estado = $2)
      AND ($3::date IS NULL OR g.fecha_emision >= $3)
      AND ($4::date IS NULL OR g.fecha_emision <= $4)
"#;

pub async fn list(
    pool: &PgPool,
    filter: DocumentoFilter,
    page: PageParams,
) -> AppResult<Paginated<GuiaResponse>> {
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM guias_remision g {}", FILTER))
        .bind(filter.empresa)
        .bind(filter.estado.as_deref())
        .bind(filter.fecha_desde)
        .bind(filter.fecha_hasta)
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, GuiaResponse>(&format!(
        "{} {} ORDER BY g.fecha_emision DESC LIMIT $5 OFFSET $6",
        SELECT_GUIA, FILTER
    ))
    .bind(filter.empresa)
    .bind(filter.estado.as_deref())
    .bind(filter.fecha_desde)
    .bind(filter.fecha_hasta)
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Paginated::new(rows, count, page))
}

pub async fn get(pool: &PgPool, id: Uuid) -> AppResult<GuiaResponse> {
    sqlx::query_as::<_, GuiaResponse>(&format!("{} WHERE g.id = $1", SELECT_GUIA))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("guía"))
}

pub fn validate_create(input: &CreateGuia) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    validation::check_numero_guia(&mut errors, &input.numero_guia);
    validation::check_not_before_emision(
        &mut errors,
        "fecha_recepcion",
        input.fecha_recepcion,
        input.fecha_emision,
        MSG_RECEPCION,
    );
    errors.into_result()
}

pub async fn create(pool: &PgPool, input: CreateGuia) -> AppResult<GuiaDeRemision> {
    validate_create(&input)?;

    let guia = sqlx::query_as::<_, GuiaDeRemision>(
        r#"
        INSERT INTO guias_remision
            (id, pedido_id, empresa_id, numero_guia, fecha_emision, fecha_recepcion,
             estado, transportista, notas)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(input.pedido_id)
    .bind(input.empresa_id)
    .bind(input.numero_guia.trim())
    .bind(input.fecha_emision)
    .bind(input.fecha_recepcion)
    .bind(input.estado.unwrap_or(EstadoGuia::Emitida))
    .bind(input.transportista.unwrap_or_default())
    .bind(input.notas.unwrap_or_default())
    .fetch_one(pool)
    .await?;

    info!("Guía {} created", guia.numero_guia);
    Ok(guia)
}

/// Updates a guide; its invoices follow a change of company.
pub async fn update(pool: &PgPool, id: Uuid, input: UpdateGuia) -> AppResult<GuiaDeRemision> {
    let mut tx = pool.begin().await?;

    let current = sqlx::query_as::<_, GuiaDeRemision>(
        "SELECT * FROM guias_remision WHERE id = $1 FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("guía"))?;

    let mut errors = FieldErrors::new();
    if let Some(numero) = &input.numero_guia {
        validation::check_numero_guia(&mut errors, numero);
    }
    validation::check_not_before_emision(
        &mut errors,
        "fecha_recepcion",
        input.fecha_recepcion.or(current.fecha_recepcion),
        input.fecha_emision.unwrap_or(current.fecha_emision),
        MSG_RECEPCION,
    );
    errors.into_result()?;

    let guia = sqlx::query_as::<_, GuiaDeRemision>(
        r#"
        UPDATE guias_remision SET
            empresa_id = COALESCE($2, empresa_id),
            numero_guia = COALESCE($3, numero_guia),
            fecha_emision = COALESCE($4, fecha_emision),
            fecha_recepcion = COALESCE($5, fecha_recepcion),
            estado = COALESCE($6, estado),
            transportista = COALESCE($7, transportista),
            notas = COALESCE($8, notas),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(input.empresa_id)
    .bind(input.numero_guia)
    .bind(input.fecha_emision)
    .bind(input.fecha_recepcion)
    .bind(input.estado)
    .bind(input.transportista)
    .bind(input.notas)
    .fetch_one(&mut *tx)
    .await?;

    if guia.empresa_id != current.empresa_id {
        let synced = sqlx::query(
            "UPDATE facturas SET empresa_id = $2, updated_at = NOW() WHERE guia_id = $1",
        )
        .bind(id)
        .bind(guia.empresa_id)
        .execute(&mut *tx)
        .await?;
        info!(
            "Guía {} moved to empresa {}, {} facturas re-synced",
            guia.numero_guia,
            guia.empresa_id,
            synced.rows_affected()
        );
    }

    tx.commit().await?;
    Ok(guia)
}

/// Invoices are deleted with the guide.
pub async fn delete(pool: &PgPool, id: Uuid) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM guias_remision WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("guía"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn input(numero: &str, recepcion: Option<NaiveDate>) -> CreateGuia {
        CreateGuia {
            pedido_id: Uuid::new_v4(),
            empresa_id: 1,
            numero_guia: numero.into(),
            fecha_emision: NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
            fecha_recepcion: recepcion,
            estado: None,
            transportista: None,
            notas: None,
        }
    }

    #[test]
    fn test_guide_number_prefix() {
        assert!(validate_create(&input("G001-0001", None)).is_ok());
        assert!(validate_create(&input("T001-0001", None)).is_err());
    }

    #[test]
    fn test_reception_before_issue_rejected() {
        let early = NaiveDate::from_ymd_opt(2025, 6, 9);
        match validate_create(&input("G001", early)) {
            Err(AppError::Validation(fields)) => assert!(fields.contains("fecha_recepcion")),
            other => panic!("expected validation error, got {:?}", other),
        }
    }
}
