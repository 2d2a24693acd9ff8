use sqlx::PgPool;

use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::vendedor::{CreateVendedor, UpdateVendedor, VendedorResponse};
use crate::models::Vendedor;
use crate::pagination::{PageParams, Paginated};
use crate::validation;

const SELECT_VENDEDOR: &str = r#"
    SELECT v.*,
        (SELECT COUNT(*) FROM proveedores p WHERE p.vendedor_id = v.id) AS proveedores_count
    FROM vendedores v
"#;

fn validate(nombre: Option<&str>, telefono: Option<&str>) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    if let Some(nombre) = nombre {
        validation::check_not_blank(&mut errors, "nombre", nombre);
    }
    if let Some(telefono) = telefono {
        validation::check_telefono(&mut errors, "telefono", telefono);
    }
    errors.into_result()
}

pub async fn list(pool: &PgPool, page: PageParams) -> AppResult<Paginated<VendedorResponse>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM vendedores")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, VendedorResponse>(&format!(
        "{} ORDER BY v.nombre LIMIT $1 OFFSET $2",
        SELECT_VENDEDOR
    ))
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Paginated::new(rows, count, page))
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<VendedorResponse> {
    sqlx::query_as::<_, VendedorResponse>(&format!("{} WHERE v.id = $1", SELECT_VENDEDOR))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("vendedor"))
}

pub async fn create(pool: &PgPool, input: CreateVendedor) -> AppResult<Vendedor> {
    validate(Some(&input.nombre), Some(&input.telefono))?;

    let vendedor = sqlx::query_as::<_, Vendedor>(
        r#"
        INSERT INTO vendedores (nombre, telefono, contacto_opcional, email, notas, activo)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(input.nombre.trim())
    .bind(&input.telefono)
    .bind(input.contacto_opcional)
    .bind(input.email.unwrap_or_default())
    .bind(input.notas.unwrap_or_default())
    .bind(input.activo.unwrap_or(true))
    .fetch_one(pool)
    .await?;

    Ok(vendedor)
}

pub async fn update(pool: &PgPool, id: i64, input: UpdateVendedor) -> AppResult<Vendedor> {
    validate(input.nombre.as_deref(), input.telefono.as_deref())?;

    sqlx::query_as::<_, Vendedor>(
        r#"
        UPDATE vendedores SET
            nombre = COALESCE($2, nombre),
            telefono = COALESCE($3, telefono),
            contacto_opcional = COALESCE($4, contacto_opcional),
            email = COALESCE($5, email),
            notas = COALESCE($6, notas),
            activo = COALESCE($7, activo),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(input.nombre.as_deref().map(str::trim))
    .bind(input.telefono)
    .bind(input.contacto_opcional)
    .bind(input.email)
    .bind(input.notas)
    .bind(input.activo)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("vendedor"))
}

/// Suppliers keep existing with no representative.
pub async fn delete(pool: &PgPool, id: i64) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM vendedores WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("vendedor"));
    }
    Ok(())
}
