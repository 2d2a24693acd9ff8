use axum::{extract::State, http::HeaderMap, Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::{hash_password, issue_token, require, verify_password, Action, Principal};
use crate::activity::{self, RequestMeta};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::user::UserResponse;
use crate::models::{ActionType, User};
use crate::router::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: Option<String>,
    pub new_password: String,
    /// Another user's id; user managers may reset it without the old password
    pub user_id: Option<i64>,
}

/// `POST /api/auth/login`
///
/// Attempts against existing usernames are written to the access log,
/// failed ones included.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let mut errors = FieldErrors::new();
    if body.username.trim().is_empty() {
        errors.add("username", "Este campo es requerido");
    }
    if body.password.is_empty() {
        errors.add("password", "Este campo es requerido");
    }
    errors.into_result()?;

    let meta = RequestMeta::from_headers(&headers);

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(body.username.trim())
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.is_active || !verify_password(&body.password, &user.password_hash) {
        warn!("Failed login for {}", user.username);
        if let Err(e) = activity::record_access(&state.db, user.id, false, &meta).await {
            warn!("Failed to record access for {}: {}", user.username, e);
        }
        return Err(AppError::Unauthorized);
    }

    let user = sqlx::query_as::<_, User>(
        "UPDATE users SET ultimo_acceso = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(user.id)
    .fetch_one(&state.db)
    .await?;

    activity::record_access(&state.db, user.id, true, &meta).await?;
    if let Err(e) = activity::record(
        &state.db,
        user.id,
        ActionType::Login,
        "auth",
        None,
        "Inicio de sesión",
        &meta,
    )
    .await
    {
        warn!("Failed to record login activity: {}", e);
    }

    let token = issue_token(&user, &state.config.jwt_secret, state.config.jwt_ttl_hours)?;
    info!("User {} logged in", user.username);

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
        message: "Inicio de sesión exitoso".to_string(),
    }))
}

/// `POST /api/auth/logout`
///
/// Bumping `token_version` invalidates every token issued so far.
pub async fn logout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<Value>> {
    sqlx::query("UPDATE users SET token_version = token_version + 1 WHERE id = $1")
        .bind(principal.id)
        .execute(&state.db)
        .await?;

    info!("User {} logged out", principal.username);
    Ok(Json(json!({ "message": "Sesión cerrada correctamente" })))
}

/// `GET /api/auth/me`
pub async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<UserResponse>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(principal.id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::NotFound("usuario"))?;

    Ok(Json(user.into()))
}

/// `POST /api/auth/change-password`
///
/// Changing one's own password requires the current one and returns a fresh
/// token, since older tokens stop working.
pub async fn change_password(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    if body.new_password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::validation(
            "new_password",
            format!("La contraseña debe tener al menos {} caracteres", MIN_PASSWORD_LEN),
        ));
    }

    let target_id = body.user_id.filter(|id| *id != principal.id);
    if target_id.is_some() {
        require(&principal, Action::ManageUsers)?;
    }
    let new_hash = hash_password(&body.new_password)?;

    match target_id {
        Some(target_id) => {
            let target = sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET password_hash = $2, token_version = token_version + 1, updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(target_id)
            .bind(&new_hash)
            .fetch_optional(&state.db)
            .await?
            .ok_or(AppError::NotFound("usuario"))?;

            info!("{} reset the password of {}", principal.username, target.username);
            Ok(Json(json!({
                "message": format!("Contraseña de {} actualizada correctamente", target.username)
            })))
        }
        None => {
            let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(principal.id)
                .fetch_one(&state.db)
                .await?;

            let old = body.old_password.as_deref().unwrap_or_default();
            if !verify_password(old, &user.password_hash) {
                return Err(AppError::validation(
                    "old_password",
                    "La contraseña actual es incorrecta",
                ));
            }

            let user = sqlx::query_as::<_, User>(
                r#"
                UPDATE users
                SET password_hash = $2, token_version = token_version + 1, updated_at = NOW()
                WHERE id = $1
                RETURNING *
                "#,
            )
            .bind(user.id)
            .bind(&new_hash)
            .fetch_one(&state.db)
            .await?;

            let token = issue_token(&user, &state.config.jwt_secret, state.config.jwt_ttl_hours)?;
            Ok(Json(json!({
                "message": "Contraseña actualizada correctamente",
                "token": token,
            })))
        }
    }
}
