//! Activity and access logging.

pub mod handlers;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;

use crate::auth::Principal;
use crate::models::ActionType;
use crate::router::AppState;

/// Paths never recorded, so that reading the log does not write to it.
const EXEMPT_PREFIXES: &[&str] = &["/api/admin/logs"];

/// Paths recorded for every method, reads included.
const IMPORTANT_PREFIXES: &[&str] = &["/api/auth/", "/api/admin/"];

/// Caller address and agent taken from request headers.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: String,
}

impl RequestMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        };

        let ip_address = header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .map(|ip| ip.trim().to_string())
            .or_else(|| header("x-real-ip").map(str::to_string));

        Self {
            ip_address,
            user_agent: header("user-agent").unwrap_or_default().to_string(),
        }
    }
}

/// What a request amounts to in the activity log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub action_type: ActionType,
    pub entity_type: String,
    pub entity_id: Option<String>,
}

/// Decides whether `method path` is recorded and how.
pub fn classify(method: &Method, path: &str) -> Option<Classified> {
    if *method == Method::OPTIONS || EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return None;
    }

    let mutating = matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    );
    let important = IMPORTANT_PREFIXES.iter().any(|p| path.starts_with(p));
    if !mutating && !important {
        return None;
    }

    let mut segments = path
        .trim_matches('/')
        .split('/')
        .skip_while(|s| *s == "api")
        .peekable();
    if segments.peek() == Some(&"admin") {
        segments.next();
    }
    let segments: Vec<&str> = segments.collect();

    let entity_type = segments.first().copied().unwrap_or("desconocido").to_string();
    let entity_id = segments
        .get(1)
        .filter(|s| s.chars().all(|c| c.is_ascii_digit()) || Uuid::parse_str(s).is_ok())
        .map(|s| s.to_string());

    let action_type = match (entity_type.as_str(), segments.last().copied()) {
        ("auth", Some("logout")) => ActionType::Logout,
        ("auth", Some("login")) => ActionType::Login,
        ("backups", Some("restore")) => ActionType::Restore,
        _ => match *method {
            Method::GET => ActionType::View,
            Method::POST => ActionType::Create,
            Method::PUT | Method::PATCH => ActionType::Update,
            Method::DELETE => ActionType::Delete,
            _ => ActionType::Other,
        },
    };

    Some(Classified {
        action_type,
        entity_type,
        entity_id,
    })
}

pub async fn record(
    pool: &PgPool,
    user_id: i64,
    action_type: ActionType,
    entity_type: &str,
    entity_id: Option<&str>,
    description: &str,
    meta: &RequestMeta,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_activities
            (user_id, action_type, entity_type, entity_id, description, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(user_id)
    .bind(action_type)
    .bind(entity_type)
    .bind(entity_id)
    .bind(description)
    .bind(&meta.ip_address)
    .bind(&meta.user_agent)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_access(
    pool: &PgPool,
    user_id: i64,
    exitoso: bool,
    meta: &RequestMeta,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO access_logs (user_id, ip_address, user_agent, exitoso) VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(&meta.ip_address)
    .bind(&meta.user_agent)
    .bind(exitoso)
    .execute(pool)
    .await?;
    Ok(())
}

/// Records authenticated requests after the handler ran. Must sit inside
/// the auth middleware so the [`Principal`] is available.
///
/// A failure to record is logged and never changes the response.
pub async fn activity_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let principal = req.extensions().get::<Principal>().cloned();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let meta = RequestMeta::from_headers(req.headers());

    let response = next.run(req).await;

    if let (Some(principal), Some(classified)) = (principal, classify(&method, &path)) {
        let description = format!("{} {} ({})", method, path, response.status().as_u16());
        if let Err(e) = record(
            &state.db,
            principal.id,
            classified.action_type,
            &classified.entity_type,
            classified.entity_id.as_deref(),
            &description,
            &meta,
        )
        .await
        {
            warn!("Failed to record activity for {}: {}", principal.username, e);
        }
    }

    response
}
