use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tokio::sync::{watch, Mutex, Semaphore};
use tracing::{error, info, warn};

use crate::activity::{self, RequestMeta};
use crate::backup::runner::{self, BackupError, BackupOutput, BackupSettings};
use crate::error::{AppError, AppResult};
use crate::models::{ActionType, BackupStatus, SystemBackup};

const BACKUP_COLUMNS: &str = r#"
    id, name, backup_type, status, file_path, media_path, carpeta,
    size_bytes, notes, created_by, created_at, completed_at,
    restore_status, restore_requested_by, restore_notes,
    restore_started_at, restore_completed_at
"#;

/// In-flight job handle key. A backup row can have a backup job and, once
/// completed, restore jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKey {
    Backup(i64),
    Restore(i64),
}

impl JobKey {
    /// The job a cancel request for `backup` is aimed at, if it can still
    /// be cancelled.
    pub fn cancellable(backup: &SystemBackup) -> Option<JobKey> {
        if !backup.status.is_terminal() {
            Some(JobKey::Backup(backup.id))
        } else if backup.restore_in_flight() {
            Some(JobKey::Restore(backup.id))
        } else {
            None
        }
    }
}

const INTERRUPTED: &str = "Error: interrupted by a server restart";

/// Serialised queue of backup and restore jobs.
///
/// Job state lives in `system_backups` (restores in its `restore_*`
/// columns); the queue only keeps a cancellation handle for every job still
/// in flight.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

struct Inner {
    pool: PgPool,
    settings: BackupSettings,
    permits: Semaphore,
    jobs: Mutex<HashMap<JobKey, watch::Sender<bool>>>,
}

impl JobQueue {
    pub fn new(pool: PgPool, settings: BackupSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                pool,
                settings,
                permits: Semaphore::new(1),
                jobs: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.inner.settings
    }

    /// Fails jobs left queued or running by a previous process.
    pub async fn recover(&self) -> AppResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE system_backups
            SET status = 'failed',
                notes = CASE WHEN notes = '' THEN $1 ELSE notes || E'\n' || $1 END,
                completed_at = NOW()
            WHERE status IN ('queued', 'running')
            "#,
        )
        .bind(INTERRUPTED)
        .execute(&self.inner.pool)
        .await?;

        let restores = sqlx::query(
            r#"
            UPDATE system_backups
            SET restore_status = 'failed',
                restore_notes = $1,
                restore_completed_at = NOW()
            WHERE restore_status IN ('queued', 'running')
            "#,
        )
        .bind(INTERRUPTED)
        .execute(&self.inner.pool)
        .await?;

        let total = result.rows_affected() + restores.rows_affected();
        if total > 0 {
            warn!("Marked {} interrupted backup/restore job(s) as failed", total);
        }
        Ok(total)
    }

    /// Queues a new backup; the row starts out `queued`.
    pub async fn enqueue_backup(&self, backup: SystemBackup) {
        let (tx, mut rx) = watch::channel(false);
        self.inner.jobs.lock().await.insert(JobKey::Backup(backup.id), tx);

        let queue = self.clone();
        tokio::spawn(async move {
            queue.process_backup(&backup, &mut rx).await;
            queue.inner.jobs.lock().await.remove(&JobKey::Backup(backup.id));
        });
    }

    async fn process_backup(&self, backup: &SystemBackup, rx: &mut watch::Receiver<bool>) {
        let pool = &self.inner.pool;

        let _permit = tokio::select! {
            permit = self.inner.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Backup queue closed: {}", e);
                    log_status(fail(pool, backup.id, "Error: backup queue closed").await, backup.id);
                    return;
                }
            },
            _ = runner::cancelled(rx) => {
                log_status(set_status(pool, backup.id, BackupStatus::Cancelled).await, backup.id);
                return;
            }
        };

        if let Err(e) = set_status(pool, backup.id, BackupStatus::Running).await {
            error!("Could not start backup {}: {}", backup.id, e);
            return;
        }
        info!("Backup {} ({}) started", backup.id, backup.name);

        match runner::run_backup(&self.inner.settings, backup, rx).await {
            Ok(output) => {
                info!(
                    "Backup {} completed, {} bytes",
                    backup.id, output.size_bytes
                );
                log_status(complete(pool, backup.id, &output).await, backup.id);
            }
            Err(BackupError::Cancelled) => {
                info!("Backup {} cancelled", backup.id);
                log_status(set_status(pool, backup.id, BackupStatus::Cancelled).await, backup.id);
            }
            Err(e) => {
                error!("Backup {} failed: {}", backup.id, e);
                log_status(fail(pool, backup.id, &format!("Error: {}", e)).await, backup.id);
            }
        }
    }

    /// Queues a restore from completed backup `id` on behalf of `user_id`.
    ///
    /// Only one restore per backup may be in flight. The outcome is kept in
    /// the row's `restore_*` columns and written to the activity log.
    pub async fn enqueue_restore(&self, id: i64, user_id: i64) -> AppResult<SystemBackup> {
        let backup = get(&self.inner.pool, id).await?;
        if backup.status != BackupStatus::Completed {
            return Err(AppError::Conflict(
                "only completed backups can be restored".to_string(),
            ));
        }

        let backup = sqlx::query_as::<_, SystemBackup>(&format!(
            r#"
            UPDATE system_backups
            SET restore_status = 'queued', restore_requested_by = $2, restore_notes = '',
                restore_started_at = NULL, restore_completed_at = NULL
            WHERE id = $1 AND status = 'completed'
              AND (restore_status IS NULL OR restore_status NOT IN ('queued', 'running'))
            RETURNING {}
            "#,
            BACKUP_COLUMNS
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.inner.pool)
        .await?
        .ok_or_else(|| {
            AppError::Conflict("a restore from this backup is already in progress".to_string())
        })?;

        let (tx, mut rx) = watch::channel(false);
        self.inner.jobs.lock().await.insert(JobKey::Restore(id), tx);

        let queue = self.clone();
        let job = backup.clone();
        tokio::spawn(async move {
            queue.process_restore(&job, user_id, &mut rx).await;
            queue.inner.jobs.lock().await.remove(&JobKey::Restore(job.id));
        });

        info!("Restore from backup {} ({}) queued", backup.id, backup.name);
        Ok(backup)
    }

    async fn process_restore(
        &self,
        backup: &SystemBackup,
        user_id: i64,
        rx: &mut watch::Receiver<bool>,
    ) {
        let pool = &self.inner.pool;

        let _permit = tokio::select! {
            permit = self.inner.permits.acquire() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Backup queue closed: {}", e);
                    let message = "Error: backup queue closed";
                    log_status(
                        finish_restore(pool, backup, BackupStatus::Failed, message, None).await,
                        backup.id,
                    );
                    return;
                }
            },
            _ = runner::cancelled(rx) => {
                info!("Restore from backup {} cancelled before it started", backup.id);
                log_status(
                    finish_restore(pool, backup, BackupStatus::Cancelled, "", None).await,
                    backup.id,
                );
                return;
            }
        };

        if let Err(e) = set_restore_status(pool, backup.id, BackupStatus::Running).await {
            error!("Could not start restore from backup {}: {}", backup.id, e);
            return;
        }
        let started_at = Utc::now();
        info!("Restore from backup {} ({}) started", backup.id, backup.name);

        let (status, action, description, notes) =
            match runner::run_restore(&self.inner.settings, backup, rx).await {
                Ok(()) => {
                    info!("Restore from backup {} completed", backup.id);
                    (
                        BackupStatus::Completed,
                        ActionType::Restore,
                        format!("Restauración del sistema desde respaldo: {}", backup.name),
                        String::new(),
                    )
                }
                Err(BackupError::Cancelled) => {
                    info!("Restore from backup {} cancelled", backup.id);
                    (
                        BackupStatus::Cancelled,
                        ActionType::Other,
                        format!("Restauración desde respaldo {} cancelada", backup.name),
                        String::new(),
                    )
                }
                Err(e) => {
                    error!("Restore from backup {} failed: {}", backup.id, e);
                    (
                        BackupStatus::Failed,
                        ActionType::Other,
                        format!("Error al restaurar desde respaldo {}: {}", backup.name, e),
                        format!("Error: {}", e),
                    )
                }
            };

        log_status(
            finish_restore(pool, backup, status, &notes, Some(started_at)).await,
            backup.id,
        );

        let meta = RequestMeta {
            ip_address: None,
            user_agent: "backup-queue".to_string(),
        };
        let entity_id = backup.id.to_string();
        if let Err(e) = activity::record(
            pool,
            user_id,
            action,
            "system_backup",
            Some(&entity_id),
            &description,
            &meta,
        )
        .await
        {
            warn!("Could not record restore outcome: {}", e);
        }
    }

    /// Requests cancellation of an unfinished backup, or of a restore in
    /// flight from a completed one.
    pub async fn cancel(&self, id: i64) -> AppResult<SystemBackup> {
        let backup = get(&self.inner.pool, id).await?;
        let key = JobKey::cancellable(&backup).ok_or_else(|| {
            AppError::Conflict(format!("backup is already {}", backup.status))
        })?;

        let signalled = match self.inner.jobs.lock().await.get(&key) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        };

        if !signalled {
            // No live job behind the row
            match key {
                JobKey::Backup(_) => set_status(&self.inner.pool, id, BackupStatus::Cancelled).await?,
                JobKey::Restore(_) => {
                    set_restore_status(&self.inner.pool, id, BackupStatus::Cancelled).await?
                }
            }
        }

        info!("Cancellation requested for {:?}", key);
        get(&self.inner.pool, id).await
    }
}

fn log_status(result: Result<(), sqlx::Error>, id: i64) {
    if let Err(e) = result {
        error!("Could not update status of backup {}: {}", id, e);
    }
}

pub async fn get(pool: &PgPool, id: i64) -> AppResult<SystemBackup> {
    sqlx::query_as::<_, SystemBackup>(&format!(
        "SELECT {} FROM system_backups WHERE id = $1",
        BACKUP_COLUMNS
    ))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(AppError::NotFound("backup"))
}

pub async fn list(pool: &PgPool) -> AppResult<Vec<SystemBackup>> {
    let rows = sqlx::query_as::<_, SystemBackup>(&format!(
        "SELECT {} FROM system_backups ORDER BY created_at DESC, id DESC",
        BACKUP_COLUMNS
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn insert(
    pool: &PgPool,
    name: &str,
    backup_type: crate::models::BackupType,
    carpeta: Option<&str>,
    notes: &str,
    created_by: i64,
) -> AppResult<SystemBackup> {
    let row = sqlx::query_as::<_, SystemBackup>(&format!(
        r#"
        INSERT INTO system_backups (name, backup_type, status, carpeta, notes, created_by)
        VALUES ($1, $2, 'queued', $3, $4, $5)
        RETURNING {}
        "#,
        BACKUP_COLUMNS
    ))
    .bind(name)
    .bind(backup_type)
    .bind(carpeta)
    .bind(notes)
    .bind(created_by)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

async fn set_status(pool: &PgPool, id: i64, status: BackupStatus) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE system_backups
        SET status = $2,
            completed_at = CASE WHEN $2 IN ('completed', 'failed', 'cancelled') THEN NOW() ELSE completed_at END
        WHERE id = $1 AND status IN ('queued', 'running')
        "#,
    )
    .bind(id)
    .bind(status)
    .execute(pool)
    .await?;
    Ok(())
}

async fn set_restore_status(pool: &PgPool, id: i64, status: BackupStatus) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE system_backups
        SET restore_status = $2,
            restore_started_at = CASE WHEN $2 = 'running' THEN NOW() ELSE restore_started_at END,
            restore_completed_at = CASE WHEN $2 IN ('completed', 'failed', 'cancelled') THEN NOW() ELSE restore_completed_at END
        WHERE id = $1 AND restore_status IN ('queued', 'running')
        "#,
    )
    .bind(id)
    .bind(status)
    .execute(pool)
    .await?;
    Ok(())
}

/// Records the end of a restore job.
///
/// A database restore replaces `system_backups` with its contents at dump
/// time, so the row is rewritten from the job's copy of it and upserted if
/// the dump predates it.
async fn finish_restore(
    pool: &PgPool,
    backup: &SystemBackup,
    status: BackupStatus,
    notes: &str,
    started_at: Option<DateTime<Utc>>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO system_backups
            (id, name, backup_type, status, file_path, media_path, carpeta, size_bytes,
             notes, created_by, created_at, completed_at,
             restore_status, restore_requested_by, restore_notes,
             restore_started_at, restore_completed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9,
                (SELECT id FROM users WHERE id = $10), $11, $12,
                $13, (SELECT id FROM users WHERE id = $14), $15, $16, NOW())
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            file_path = EXCLUDED.file_path,
            media_path = EXCLUDED.media_path,
            size_bytes = EXCLUDED.size_bytes,
            completed_at = EXCLUDED.completed_at,
            restore_status = EXCLUDED.restore_status,
            restore_requested_by = EXCLUDED.restore_requested_by,
            restore_notes = EXCLUDED.restore_notes,
            restore_started_at = EXCLUDED.restore_started_at,
            restore_completed_at = EXCLUDED.restore_completed_at
        "#,
    )
    .bind(backup.id)
    .bind(&backup.name)
    .bind(backup.backup_type)
    .bind(backup.status)
    .bind(&backup.file_path)
    .bind(&backup.media_path)
    .bind(&backup.carpeta)
    .bind(backup.size_bytes)
    .bind(&backup.notes)
    .bind(backup.created_by)
    .bind(backup.created_at)
    .bind(backup.completed_at)
    .bind(status)
    .bind(backup.restore_requested_by)
    .bind(notes)
    .bind(started_at)
    .execute(pool)
    .await?;

    sqlx::query(
        "SELECT setval(pg_get_serial_sequence('system_backups', 'id'), (SELECT MAX(id) FROM system_backups))",
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn complete(pool: &PgPool, id: i64, output: &BackupOutput) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE system_backups
        SET status = 'completed', file_path = $2, media_path = $3, size_bytes = $4,
            completed_at = NOW()
        WHERE id = $1 AND status = 'running'
        "#,
    )
    .bind(id)
    .bind(output.file_path.as_ref().map(|p| p.display().to_string()))
    .bind(output.media_path.as_ref().map(|p| p.display().to_string()))
    .bind(output.size_bytes)
    .execute(pool)
    .await?;
    Ok(())
}

async fn fail(pool: &PgPool, id: i64, message: &str) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE system_backups
        SET status = 'failed',
            notes = CASE WHEN notes = '' THEN $2 ELSE notes || E'\n' || $2 END,
            completed_at = NOW()
        WHERE id = $1 AND status IN ('queued', 'running')
        "#,
    )
    .bind(id)
    .bind(message)
    .execute(pool)
    .await?;
    Ok(())
}

/// Deletes a finished backup row and its files.
pub async fn delete(pool: &PgPool, id: i64) -> AppResult<()> {
    let backup = get(pool, id).await?;
    if !backup.status.is_terminal() {
        return Err(AppError::Conflict(
            "cancel the backup before deleting it".to_string(),
        ));
    }
    if backup.restore_in_flight() {
        return Err(AppError::Conflict(
            "a restore from this backup is in progress".to_string(),
        ));
    }

    if let Some(path) = &backup.file_path {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!("Could not remove backup file {}: {}", path, e);
        }
    }
    if let Some(path) = &backup.media_path {
        if let Err(e) = tokio::fs::remove_dir_all(path).await {
            warn!("Could not remove media copy {}: {}", path, e);
        }
    }

    sqlx::query("DELETE FROM system_backups WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BackupType;
    use std::path::PathBuf;

    fn settings(dir: &std::path::Path) -> BackupSettings {
        BackupSettings {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/pedidos_test".to_string()),
            backup_dir: dir.join("backups"),
            media_root: dir.join("media"),
        }
    }

    fn backup(status: BackupStatus, restore_status: Option<BackupStatus>) -> SystemBackup {
        SystemBackup {
            id: 7,
            name: "semanal".to_string(),
            backup_type: BackupType::Full,
            status,
            file_path: None,
            media_path: None,
            carpeta: None,
            size_bytes: None,
            notes: String::new(),
            created_by: None,
            created_at: chrono::Utc::now(),
            completed_at: None,
            restore_status,
            restore_requested_by: None,
            restore_notes: String::new(),
            restore_started_at: None,
            restore_completed_at: None,
        }
    }

    #[test]
    fn test_cancel_targets_backup_then_restore() {
        assert_eq!(
            JobKey::cancellable(&backup(BackupStatus::Running, None)),
            Some(JobKey::Backup(7))
        );
        assert_eq!(
            JobKey::cancellable(&backup(BackupStatus::Completed, Some(BackupStatus::Queued))),
            Some(JobKey::Restore(7))
        );
        assert_eq!(
            JobKey::cancellable(&backup(BackupStatus::Completed, Some(BackupStatus::Running))),
            Some(JobKey::Restore(7))
        );
        assert_eq!(
            JobKey::cancellable(&backup(BackupStatus::Completed, Some(BackupStatus::Failed))),
            None
        );
        assert_eq!(JobKey::cancellable(&backup(BackupStatus::Cancelled, None)), None);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_media_backup_completes() {
        let pool = PgPool::connect(&std::env::var("DATABASE_URL").unwrap())
            .await
            .unwrap();
        let work = tempfile::tempdir().unwrap();
        let settings = settings(work.path());
        std::fs::create_dir_all(&settings.media_root).unwrap();
        std::fs::write(settings.media_root.join("logo.png"), [1u8; 16]).unwrap();

        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, password_hash) VALUES ($1, 'x') RETURNING id",
        )
        .bind(format!("backup_test_{}", uuid::Uuid::new_v4()))
        .fetch_one(&pool)
        .await
        .unwrap();

        let queue = JobQueue::new(pool.clone(), settings);
        let backup = insert(&pool, "media prueba", BackupType::Media, Some("tests"), "", user_id)
            .await
            .unwrap();
        queue.enqueue_backup(backup.clone()).await;

        let mut finished = None;
        for _ in 0..50 {
            let row = get(&pool, backup.id).await.unwrap();
            if row.status.is_terminal() {
                finished = Some(row);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }

        let row = finished.expect("backup did not finish");
        assert_eq!(row.status, BackupStatus::Completed);
        assert_eq!(row.size_bytes, Some(16));
        let media = PathBuf::from(row.media_path.clone().unwrap());
        assert!(media.join("logo.png").is_file());
        assert!(media.starts_with(work.path().join("backups/tests")));

        // Restore brings the media folder back and is tracked on the row
        let media_root = queue.settings().media_root.clone();
        std::fs::write(media_root.join("logo.png"), [9u8; 4]).unwrap();
        let queued = queue.enqueue_restore(backup.id, user_id).await.unwrap();
        assert_eq!(queued.restore_status, Some(BackupStatus::Queued));

        let restored = wait_for_restore(&pool, backup.id).await;
        assert_eq!(restored.restore_status, Some(BackupStatus::Completed));
        assert_eq!(restored.restore_requested_by, Some(user_id));
        assert!(restored.restore_started_at.is_some());
        assert_eq!(std::fs::read(media_root.join("logo.png")).unwrap(), vec![1u8; 16]);

        delete(&pool, backup.id).await.unwrap();
        assert!(!media.exists());
    }

    async fn wait_for_restore(pool: &PgPool, id: i64) -> SystemBackup {
        for _ in 0..50 {
            let row = get(pool, id).await.unwrap();
            if !row.restore_in_flight() {
                return row;
            }
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        }
        panic!("restore did not finish");
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_queued_restore_can_be_cancelled() {
        let pool = PgPool::connect(&std::env::var("DATABASE_URL").unwrap())
            .await
            .unwrap();
        let work = tempfile::tempdir().unwrap();
        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, password_hash) VALUES ($1, 'x') RETURNING id",
        )
        .bind(format!("backup_test_{}", uuid::Uuid::new_v4()))
        .fetch_one(&pool)
        .await
        .unwrap();

        let queue = JobQueue::new(pool.clone(), settings(work.path()));
        let backup = insert(&pool, "para restaurar", BackupType::Media, None, "", user_id)
            .await
            .unwrap();
        sqlx::query(
            "UPDATE system_backups SET status = 'completed', media_path = $2, completed_at = NOW() WHERE id = $1",
        )
        .bind(backup.id)
        .bind(work.path().join("copia").display().to_string())
        .execute(&pool)
        .await
        .unwrap();

        // Keep the queue busy so the restore stays queued
        let busy = queue.inner.permits.acquire().await.unwrap();

        let queued = queue.enqueue_restore(backup.id, user_id).await.unwrap();
        assert_eq!(queued.restore_status, Some(BackupStatus::Queued));
        assert!(matches!(
            queue.enqueue_restore(backup.id, user_id).await,
            Err(AppError::Conflict(_))
        ));

        queue.cancel(backup.id).await.unwrap();
        let row = wait_for_restore(&pool, backup.id).await;
        assert_eq!(row.restore_status, Some(BackupStatus::Cancelled));
        assert_eq!(row.status, BackupStatus::Completed);
        assert!(row.restore_completed_at.is_some());
        drop(busy);

        assert!(matches!(queue.cancel(backup.id).await, Err(AppError::Conflict(_))));
        delete(&pool, backup.id).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_cancel_orphaned_row() {
        let pool = PgPool::connect(&std::env::var("DATABASE_URL").unwrap())
            .await
            .unwrap();
        let work = tempfile::tempdir().unwrap();
        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, password_hash) VALUES ($1, 'x') RETURNING id",
        )
        .bind(format!("backup_test_{}", uuid::Uuid::new_v4()))
        .fetch_one(&pool)
        .await
        .unwrap();

        let queue = JobQueue::new(pool.clone(), settings(work.path()));
        let backup = insert(&pool, "huerfano", BackupType::Data, None, "", user_id)
            .await
            .unwrap();

        let cancelled = queue.cancel(backup.id).await.unwrap();
        assert_eq!(cancelled.status, BackupStatus::Cancelled);
        assert!(queue.cancel(backup.id).await.is_err());
    }
}
