use sqlx::PgPool;
use tracing::info;

use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::empresa::{CreateEmpresa, EmpresaResponse, UpdateEmpresa};
use crate::models::Empresa;
use crate::pagination::{PageParams, Paginated};
use crate::validation;

const SELECT_EMPRESA: &str = r#"
    SELECT e.*,
        COALESCE((SELECT SUM(l.monto) FROM letras l WHERE l.empresa_id = e.id), 0) AS total_letras,
        (SELECT COUNT(*) FROM letras l
            WHERE l.empresa_id = e.id AND l.estado = 'pendiente') AS letras_pendientes,
        COALESCE((SELECT SUM(f.monto_factura) FROM facturas f WHERE f.empresa_id = e.id), 0)
            AS total_facturado,
        (SELECT COUNT(*) FROM facturas f
            WHERE f.empresa_id = e.id AND f.estado = 'emitida') AS facturas_emitidas
    FROM empresas e
"#;

pub fn validate_create(input: &CreateEmpresa) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    validation::check_not_blank(&mut errors, "nombre", &input.nombre);
    validation::check_ruc(&mut errors, "ruc", &input.ruc);
    errors.into_result()
}

pub fn validate_update(input: &UpdateEmpresa) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    if let Some(nombre) = &input.nombre {
        validation::check_not_blank(&mut errors, "nombre", nombre);
    }
    if let Some(ruc) = &input.ruc {
        validation::check_ruc(&mut errors, "ruc", ruc);
    }
    errors.into_result()
}

pub async fn list(pool: &PgPool, page: PageParams) -> AppResult<Paginated<EmpresaResponse>> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM empresas")
        .fetch_one(pool)
        .await?;

    let rows = sqlx::query_as::<_, EmpresaResponse>(&format!(
        "{} ORDER BY e.nombre LIMIT $1 OFFSET $2",
        SELECT_EMPRESA
    ))
    .bind(page.limit())
    .bind(page.offset())
    .fetch_all(pool)
    .await?;

    Ok(Paginated::new(rows, count, page))
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<EmpresaResponse> {
    sqlx::query_as::<_, EmpresaResponse>(&format!("{} WHERE e.id = $1", SELECT_EMPRESA))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("empresa"))
}

pub async fn create(pool: &PgPool, input: CreateEmpresa) -> AppResult<Empresa> {
    validate_create(&input)?;

    let empresa = sqlx::query_as::<_, Empresa>(
        r#"
        INSERT INTO empresas (nombre, ruc, direccion, telefono, email_contacto, activo)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(input.nombre.trim())
    .bind(&input.ruc)
    .bind(input.direccion.unwrap_or_default())
    .bind(input.telefono.unwrap_or_default())
    .bind(input.email_contacto.unwrap_or_default())
    .bind(input.activo.unwrap_or(true))
    .fetch_one(pool)
    .await?;

    info!("Empresa {} created", empresa.nombre);
    Ok(empresa)
}

pub async fn update(pool: &PgPool, id: i64, input: UpdateEmpresa) -> AppResult<Empresa> {
    validate_update(&input)?;

    sqlx::query_as::<_, Empresa>(
        r#"
        UPDATE empresas SET
            nombre = COALESCE($2, nombre),
            ruc = COALESCE($3, ruc),
            direccion = COALESCE($4, direccion),
            telefono = COALESCE($5, telefono),
            email_contacto = COALESCE($6, email_contacto),
            activo = COALESCE($7, activo),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(input.nombre.as_deref().map(str::trim))
    .bind(input.ruc)
    .bind(input.direccion)
    .bind(input.telefono)
    .bind(input.email_contacto)
    .bind(input.activo)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("empresa"))
}

/// Rejected with a conflict while distributions, installments or documents
/// reference the company.
pub async fn delete(pool: &PgPool, id: i64) -> AppResult<()> {
    let result = sqlx::query("DELETE FROM empresas WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("empresa"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_create_reports_every_field() {
        let input = CreateEmpresa {
            nombre: " ".into(),
            ruc: "123".into(),
            direccion: None,
            telefono: None,
            email_contacto: None,
            activo: None,
        };
        match validate_create(&input) {
            Err(AppError::Validation(fields)) => {
                assert!(fields.contains("nombre"));
                assert!(fields.contains("ruc"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_update_only_checks_present_fields() {
        assert!(validate_update(&UpdateEmpresa::default()).is_ok());
        assert!(validate_update(&UpdateEmpresa {
            ruc: Some("20123456789".into()),
            ..Default::default()
        })
        .is_ok());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_empresa_lifecycle() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL not set for tests");
        let pool = PgPool::connect(&url).await.expect("Failed to connect");
        crate::db::run_migrations(&pool).await.expect("migrations");

        let empresa = create(
            &pool,
            CreateEmpresa {
                nombre: format!("Empresa {}", uuid::Uuid::new_v4()),
                ruc: format!("{:011}", rand_suffix()),
                direccion: None,
                telefono: None,
                email_contacto: None,
                activo: None,
            },
        )
        .await
        .expect("create");

        let fetched = get(&pool, empresa.id).await.expect("get");
        assert_eq!(fetched.letras_pendientes, 0);

        delete(&pool, empresa.id).await.expect("delete");
        assert!(matches!(get(&pool, empresa.id).await, Err(AppError::NotFound(_))));
    }

    fn rand_suffix() -> u64 {
        (uuid::Uuid::new_v4().as_u128() % 100_000_000_000) as u64
    }
}
