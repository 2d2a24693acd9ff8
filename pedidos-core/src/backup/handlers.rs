use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde_json::{json, Value};

use super::queue;
use super::runner;
use crate::auth::{require, Action, Principal};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::models::{BackupStatus, CreateBackup, SystemBackup};
use crate::router::AppState;
use crate::validation::check_not_blank;

const MAX_NAME_LEN: usize = 100;

fn validate_create(body: &CreateBackup) -> AppResult<()> {
    let mut errors = FieldErrors::new();
    check_not_blank(&mut errors, "name", &body.name);
    if body.name.trim().chars().count() > MAX_NAME_LEN {
        errors.add("name", format!("Máximo {} caracteres.", MAX_NAME_LEN));
    }
    if let Some(carpeta) = body.carpeta.as_deref() {
        if runner::target_dir(std::path::Path::new(""), Some(carpeta)).is_err() {
            errors.add("carpeta", "Debe ser una ruta relativa sin '..'.");
        }
    }
    errors.into_result()
}

/// `GET /api/admin/backups`
pub async fn list_backups(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<Vec<SystemBackup>>> {
    require(&principal, Action::ManageBackups)?;
    Ok(Json(queue::list(&state.db).await?))
}

/// `POST /api/admin/backups`: the job runs in the background.
pub async fn create_backup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(body): Json<CreateBackup>,
) -> AppResult<(StatusCode, Json<SystemBackup>)> {
    require(&principal, Action::ManageBackups)?;
    validate_create(&body)?;

    let carpeta = body
        .carpeta
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty());
    let backup = queue::insert(
        &state.db,
        body.name.trim(),
        body.backup_type,
        carpeta,
        body.notes.as_deref().unwrap_or(""),
        principal.id,
    )
    .await?;

    state.backups.enqueue_backup(backup.clone()).await;
    Ok((StatusCode::ACCEPTED, Json(backup)))
}

pub async fn get_backup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<Json<SystemBackup>> {
    require(&principal, Action::ManageBackups)?;
    Ok(Json(queue::get(&state.db, id).await?))
}

pub async fn delete_backup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<StatusCode> {
    require(&principal, Action::ManageBackups)?;
    queue::delete(&state.db, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/admin/backups/:id/restore`
pub async fn restore_backup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<(StatusCode, Json<Value>)> {
    require(&principal, Action::ManageBackups)?;

    let backup = state.backups.enqueue_restore(id, principal.id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "message": format!("Restauración desde '{}' en cola", backup.name),
            "backup_id": id,
            "restore_status": backup.restore_status,
        })),
    ))
}

/// `POST /api/admin/backups/:id/cancel`
///
/// Cancels the backup job itself or, for a completed backup, the restore in
/// flight from it.
pub async fn cancel_backup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<Json<SystemBackup>> {
    require(&principal, Action::ManageBackups)?;
    Ok(Json(state.backups.cancel(id).await?))
}

/// `GET /api/admin/backups/:id/download`
pub async fn download_backup(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<i64>,
) -> AppResult<Response> {
    require(&principal, Action::ManageBackups)?;

    let backup = queue::get(&state.db, id).await?;
    if backup.status != BackupStatus::Completed {
        return Err(AppError::Conflict("backup is not completed".to_string()));
    }
    let path = backup
        .file_path
        .ok_or_else(|| AppError::Conflict("backup has no downloadable archive".to_string()))?;

    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            AppError::NotFound("backup file")
        } else {
            AppError::Internal(e.into())
        }
    })?;

    let filename = std::path::Path::new(&path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| format!("backup_{}.sql.gz", id));
    let content_type = if filename.ends_with(".gz") {
        "application/gzip"
    } else {
        "application/sql"
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}
