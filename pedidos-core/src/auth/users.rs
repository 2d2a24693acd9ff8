//! User administration under `/api/admin/usuarios`.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use tracing::{info, warn};

use super::handlers::MIN_PASSWORD_LEN;
use super::permissions::{assign_role, reconcile_role};
use super::{hash_password, require, Action, Principal};
use crate::activity::{self, RequestMeta};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::user::{CreateUser, UpdateUser, UserResponse};
use crate::models::{ActionType, Rol, User};
use crate::router::AppState;

fn validate_create(body: &CreateUser) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    if body.username.trim().is_empty() {
        errors.add("username", "Este campo es requerido");
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        errors.add(
            "password",
            format!("La contraseña debe tener al menos {} caracteres", MIN_PASSWORD_LEN),
        );
    }
    errors.into_result()
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<Vec<UserResponse>>> {
    require(&principal, Action::ManageUsers)?;

    let users = sqlx::query_as::<_, User>("SELECT * FROM users ORDER BY username")
        .fetch_all(&state.db)
        .await?;

    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// New accounts always start read-only; roles are granted by a later update.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateUser>,
) -> AppResult<(StatusCode, Json<UserResponse>)> {
    require(&principal, Action::ManageUsers)?;
    validate_create(&body)?;

    let flags = reconcile_role(Rol::Lectura, false, false);
    let password_hash = hash_password(&body.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users
            (username, password_hash, email, first_name, last_name, telefono, notas,
             rol, is_staff, is_superuser)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        RETURNING *
        "#,
    )
    .bind(body.username.trim())
    .bind(&password_hash)
    .bind(body.email.unwrap_or_default())
    .bind(body.first_name.unwrap_or_default())
    .bind(body.last_name.unwrap_or_default())
    .bind(body.telefono.unwrap_or_default())
    .bind(body.notas.unwrap_or_default())
    .bind(flags.rol)
    .bind(flags.is_staff)
    .bind(flags.is_superuser)
    .fetch_one(&state.db)
    .await?;

    info!("User {} created by {}", user.username, principal.username);
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<Json<UserResponse>> {
    if id != principal.id {
        require(&principal, Action::ManageUsers)?;
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("usuario"))?;

    Ok(Json(user.into()))
}

/// Profile fields need `UpdateProfile`; role, activation and password
/// changes need `ManageUsers`. Role flags are reconciled before writing.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateUser>,
) -> AppResult<Json<UserResponse>> {
    require(&principal, Action::UpdateProfile { target_user_id: id })?;
    if body.rol.is_some() || body.is_active.is_some() || body.password.is_some() {
        require(&principal, Action::ManageUsers)?;
    }

    let mut tx = state.db.begin().await?;

    let current = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("usuario"))?;

    let flags = match body.rol {
        Some(rol) => assign_role(rol),
        None => reconcile_role(current.rol, current.is_superuser, current.is_staff),
    };

    let password_hash = match body.password.as_deref() {
        Some(p) if p.len() < MIN_PASSWORD_LEN => {
            return Err(AppError::validation(
                "password",
                format!("La contraseña debe tener al menos {} caracteres", MIN_PASSWORD_LEN),
            ));
        }
        Some(p) => Some(hash_password(p)?),
        None => None,
    };

    let user = sqlx::query_as::<_, User>(
        r#"
        UPDATE users SET
            email = COALESCE($2, email),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            is_active = COALESCE($5, is_active),
            telefono = COALESCE($6, telefono),
            notas = COALESCE($7, notas),
            rol = $8,
            is_staff = $9,
            is_superuser = $10,
            password_hash = COALESCE($11, password_hash),
            token_version = CASE WHEN $11 IS NULL THEN token_version ELSE token_version + 1 END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(body.email)
    .bind(body.first_name)
    .bind(body.last_name)
    .bind(body.is_active)
    .bind(body.telefono)
    .bind(body.notas)
    .bind(flags.rol)
    .bind(flags.is_staff)
    .bind(flags.is_superuser)
    .bind(password_hash)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    if current.rol == Rol::Superadmin && user.rol != Rol::Superadmin {
        warn!(
            "{} downgraded {} from superadmin to {}",
            principal.username, user.username, user.rol
        );
        let description = format!(
            "ATENCIÓN: Cambio de rol {} a {} en usuario: {}",
            current.rol, user.rol, user.username
        );
        if let Err(e) = activity::record(
            &state.db,
            principal.id,
            ActionType::PermissionChange,
            "usuarios",
            Some(&id.to_string()),
            &description,
            &RequestMeta::from_headers(&headers),
        )
        .await
        {
            warn!("Failed to record permission change: {}", e);
        }
    }

    Ok(Json(user.into()))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    require(&principal, Action::ManageUsers)?;
    if id == principal.id {
        return Err(AppError::Conflict("cannot delete your own account".into()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("usuario"));
    }

    info!("User {} deleted by {}", id, principal.username);
    Ok(StatusCode::NO_CONTENT)
}
