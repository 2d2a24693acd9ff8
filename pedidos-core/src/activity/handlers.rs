use axum::{
    extract::{Query, State},
    Extension, Json,
};

use crate::auth::{require, Action, Principal};
use crate::error::AppResult;
use crate::models::activity::{ActivityFilter, UserActivityResponse};
use crate::router::AppState;

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

/// `GET /api/admin/logs`
pub async fn list_logs(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(filter): Query<ActivityFilter>,
) -> AppResult<Json<Vec<UserActivityResponse>>> {
    require(&principal, Action::ViewLogs)?;

    let limit = filter.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let logs = sqlx::query_as::<_, UserActivityResponse>(
        r#"
        SELECT a.*, u.username
        FROM user_activities a
        JOIN users u ON u.id = a.user_id
        WHERE ($1::varchar IS NULL OR a.action_type = $1)
          AND ($2::varchar IS NULL OR a.entity_type ILIKE '%' || $2 || '%')
          AND ($3::bigint IS NULL OR a.user_id = $3)
          AND ($4::date IS NULL OR a."timestamp"::date >= $4)
          AND ($5::date IS NULL OR a."timestamp"::date <= $5)
        ORDER BY a."timestamp" DESC
        LIMIT $6
        "#,
    )
    .bind(filter.action_type)
    .bind(filter.entity_type)
    .bind(filter.user)
    .bind(filter.date_from)
    .bind(filter.date_to)
    .bind(limit)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(logs))
}
