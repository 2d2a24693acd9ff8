use sqlx::PgPool;

use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::proveedor::{
    CreateProveedor, ProveedorResponse, UpdateProveedor, DEFAULT_PLAZO_DIAS,
};
use crate::models::Proveedor;
use crate::pagination::{PageParams, Paginated};
use crate::validation;

pub const DEFAULT_COLOR: &str = "#1976d2";

const SELECT_PROVEEDOR: &str = r#"
    SELECT p.*,
        v.nombre AS vendedor_nombre,
        (SELECT COUNT(*) FROM pedidos o WHERE o.proveedor_id = p.id) AS pedidos_count,
        (SELECT COUNT(*) FROM pedidos o
            WHERE o.proveedor_id = p.id AND o.estado = 'pendiente') AS pedidos_pendientes,
        COALESCE((SELECT SUM(o.monto_total_pedido) FROM pedidos o WHERE o.proveedor_id = p.id), 0)
            AS monto_total_pedidos
    FROM proveedores p
    LEFT JOIN vendedores v ON v.id = p.vendedor_id
"#;

struct Fields<'a> {
    nombre: Option<&'a str>,
    color: Option<&'a str>,
    ruc: Option<&'a str>,
    plazo: Option<i32>,
}

fn validate(fields: Fields<'_>) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    if let Some(nombre) = fields.nombre {
        validation::check_not_blank(&mut errors, "nombre", nombre);
    }
    if let Some(color) = fields.color {
        validation::check_color(&mut errors, "color", color);
    }
    // An empty RUC means none.
    if let Some(ruc) = fields.ruc.filter(|r| !r.is_empty()) {
        validation::check_ruc(&mut errors, "ruc", ruc);
    }
    if fields.plazo.is_some_and(|p| p < 0) {
        errors.add("plazo_credito_default", "El plazo no puede ser negativo");
    }
    errors.into_result()
}

pub async fn list(pool: &PgPool, page: PageParams) -> AppResult<Paginated<ProveedorResponse>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM proveedores")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, ProveedorResponse>(&format!(
        "{} ORDER BY p.nombre LIMIT $1 OFFSET $2",
        SELECT_PROVEEDOR
    ))
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Paginated::new(rows, count, page))
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<ProveedorResponse> {
    sqlx::query_as::<_, ProveedorResponse>(&format!("{} WHERE p.id = $1", SELECT_PROVEEDOR))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("proveedor"))
}

/// Identifier is stored as given; the order-number prefix falls back to the
/// name when it is absent.
pub async fn create(pool: &PgPool, input: CreateProveedor) -> AppResult<Proveedor> {
    validate(Fields {
        nombre: Some(&input.nombre),
        color: input.color.as_deref(),
        ruc: input.ruc.as_deref(),
        plazo: input.plazo_credito_default,
    })?;

    let proveedor = sqlx::query_as::<_, Proveedor>(
        r#"
        INSERT INTO proveedores
            (nombre, identificador, color, ruc, direccion, telefono, email,
             plazo_credito_default, activo, vendedor_id, notas)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(input.nombre.trim())
    .bind(
        input
            .identificador
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty()),
    )
    .bind(input.color.unwrap_or_else(|| DEFAULT_COLOR.to_string()))
    .bind(input.ruc.filter(|r| !r.is_empty()))
    .bind(input.direccion.unwrap_or_default())
    .bind(input.telefono.unwrap_or_default())
    .bind(input.email.unwrap_or_default())
    .bind(input.plazo_credito_default.unwrap_or(DEFAULT_PLAZO_DIAS))
    .bind(input.activo.unwrap_or(true))
    .bind(input.vendedor_id)
    .bind(input.notas.unwrap_or_default())
    .fetch_one(pool)
    .await?;

    Ok(proveedor)
}

pub async fn update(pool: &PgPool, id: i64, input: UpdateProveedor) -> AppResult<Proveedor> {
    validate(Fields {
        nombre: input.nombre.as_deref(),
        color: input.color.as_deref(),
        ruc: input.ruc.as_deref(),
        plazo: input.plazo_credito_default,
    })?;

    sqlx::query_as::<_, Proveedor>(
        r#"
        UPDATE proveedores SET
            nombre = COALESCE($2, nombre),
            identificador = COALESCE($3, identificador),
            color = COALESCE($4, color),
            ruc = COALESCE($5, ruc),
            direccion = COALESCE($6, direccion),
            telefono = COALESCE($7, telefono),
            email = COALESCE($8, email),
            plazo_credito_default = COALESCE($9, plazo_credito_default),
            activo = COALESCE($10, activo),
            vendedor_id = COALESCE($11, vendedor_id),
            notas = COALESCE($12, notas),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(input.nombre.as_deref().map(str::trim))
    .bind(input.identificador.map(|s| s.trim().to_uppercase()))
    .bind(input.color)
    .bind(input.ruc)
    .bind(input.direccion)
    .bind(input.telefono)
    .bind(input.email)
    .bind(input.plazo_credito_default)
    .bind(input.activo)
    .bind(input.vendedor_id)
    .bind(input.notas)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("proveedor"))
}

/// Rejected with a conflict while orders reference the supplier.
pub async fn delete(pool: &PgPool, id: i64) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM proveedores WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("proveedor"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields<'a>(color: Option<&'a str>, ruc: Option<&'a str>) -> Fields<'a> {
        Fields {
            nombre: Some("Norton"),
            color,
            ruc,
            plazo: Some(60),
        }
    }

    #[test]
    fn test_optional_ruc() {
        assert!(validate(fields(None, None)).is_ok());
        assert!(validate(fields(None, Some(""))).is_ok());
        assert!(validate(fields(None, Some("20123456789"))).is_ok());
        assert!(validate(fields(None, Some("201"))).is_err());
    }

    #[test]
    fn test_color_format() {
        assert!(validate(fields(Some(DEFAULT_COLOR), None)).is_ok());
        assert!(validate(fields(Some("red"), None)).is_err());
    }

    #[test]
    fn test_negative_plazo_rejected() {
        let f = Fields {
            plazo: Some(-1),
            ..fields(None, None)
        };
        assert!(validate(f).is_err());
    }
}
