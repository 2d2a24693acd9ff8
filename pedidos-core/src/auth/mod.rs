//! Bearer-token authentication.

pub mod handlers;
pub mod permissions;
pub mod users;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::router::AppState;

pub use permissions::{evaluate, reconcile_role, require, Action, Decision, Role};

/// Authenticated caller, inserted into request extensions by [`auth_middleware`].
#[derive(Clone, Debug)]
pub struct Principal {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl Principal {
    pub fn from_user(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            role: Role::resolve(user.rol, user.is_staff, user.is_superuser),
        }
    }
}

/// Claims carried inside the JWT.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user's id as a string.
    pub sub: String,
    /// `users.token_version` at issue time.
    pub ver: i32,
    pub exp: usize,
}

/// Signs a token for `user` valid for `ttl_hours`.
pub fn issue_token(user: &User, secret: &str, ttl_hours: i64) -> AppResult<String> {
    let exp = (Utc::now() + Duration::hours(ttl_hours)).timestamp();
    let claims = Claims {
        sub: user.id.to_string(),
        ver: user.token_version,
        exp: exp.max(0) as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to sign token: {}", e)))
}

/// Verifies signature and expiry.
pub fn decode_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        debug!("Rejected token: {}", e);
        AppError::Unauthorized
    })
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Middleware validating the `Authorization: Bearer` header.
///
/// Loads the user, rejects inactive accounts and tokens issued before the
/// last logout or password change, then forwards with a [`Principal`].
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req).ok_or(AppError::Unauthorized)?;
    let claims = decode_token(token, &state.config.jwt_secret)?;
    let user_id: i64 = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.is_active {
        warn!("Token presented for inactive user {}", user.username);
        return Err(AppError::Unauthorized);
    }
    if user.token_version != claims.ver {
        debug!("Stale token for user {}", user.username);
        return Err(AppError::Unauthorized);
    }

    req.extensions_mut().insert(Principal::from_user(&user));
    Ok(next.run(req).await)
}

pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("failed to hash password: {}", e)))
}

/// A malformed stored hash counts as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rol;

    fn user() -> User {
        User {
            id: 7,
            username: "ana".into(),
            email: String::new(),
            first_name: "Ana".into(),
            last_name: "Quispe".into(),
            password_hash: String::new(),
            is_active: true,
            is_staff: false,
            is_superuser: false,
            rol: Rol::Admin,
            telefono: String::new(),
            notas: String::new(),
            token_version: 3,
            ultimo_acceso: None,
            date_joined: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_token_roundtrip_carries_version() {
        let token = issue_token(&user(), "s3cret", 1).unwrap();
        let claims = decode_token(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, "7");
        assert_eq!(claims.ver, 3);
    }

    #[test]
    fn test_wrong_secret_is_unauthorized() {
        let token = issue_token(&user(), "s3cret", 1).unwrap();
        assert!(matches!(
            decode_token(&token, "other"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_expired_token_is_unauthorized() {
        let token = issue_token(&user(), "s3cret", -2).unwrap();
        assert!(matches!(
            decode_token(&token, "s3cret"),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_principal_resolves_role() {
        let principal = Principal::from_user(&user());
        assert_eq!(principal.role, Role::Admin);
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("clave-segura").unwrap();
        assert!(verify_password("clave-segura", &hash));
        assert!(!verify_password("otra", &hash));
        assert!(!verify_password("clave-segura", "not-a-hash"));
    }
}
