use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// What a backup contains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    /// Database dump and media folder
    Full,
    /// Database dump only
    Data,
    /// Media folder only
    Media,
}

impl BackupType {
    pub fn includes_database(&self) -> bool {
        matches!(self, BackupType::Full | BackupType::Data)
    }

    pub fn includes_media(&self) -> bool {
        matches!(self, BackupType::Full | BackupType::Media)
    }
}

/// Job status of a backup or restore.
///
/// `Queued -> Running -> Completed | Failed | Cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BackupStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BackupStatus::Completed | BackupStatus::Failed | BackupStatus::Cancelled
        )
    }
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackupStatus::Queued => "queued",
            BackupStatus::Running => "running",
            BackupStatus::Completed => "completed",
            BackupStatus::Failed => "failed",
            BackupStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Backup record in `system_backups`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SystemBackup {
    pub id: i64,
    pub name: String,
    pub backup_type: BackupType,
    pub status: BackupStatus,

    /// Archive path (`.sql.gz`) for database backups
    pub file_path: Option<String>,

    /// Copied media folder for `full`/`media` backups
    pub media_path: Option<String>,

    /// Optional sub-folder of the backup root
    pub carpeta: Option<String>,

    pub size_bytes: Option<i64>,
    pub notes: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,

    /// State of the latest restore from this backup, if one was requested
    pub restore_status: Option<BackupStatus>,
    pub restore_requested_by: Option<i64>,
    pub restore_notes: String,
    pub restore_started_at: Option<DateTime<Utc>>,
    pub restore_completed_at: Option<DateTime<Utc>>,
}

impl SystemBackup {
    /// A restore from this backup is queued or running.
    pub fn restore_in_flight(&self) -> bool {
        self.restore_status.map_or(false, |status| !status.is_terminal())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBackup {
    pub name: String,
    pub backup_type: BackupType,
    pub carpeta: Option<String>,
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_type_contents() {
        assert!(BackupType::Full.includes_database());
        assert!(BackupType::Full.includes_media());
        assert!(BackupType::Data.includes_database());
        assert!(!BackupType::Data.includes_media());
        assert!(!BackupType::Media.includes_database());
        assert!(BackupType::Media.includes_media());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!BackupStatus::Queued.is_terminal());
        assert!(!BackupStatus::Running.is_terminal());
        assert!(BackupStatus::Completed.is_terminal());
        assert!(BackupStatus::Cancelled.is_terminal());
    }

    #[test]
    fn test_restore_in_flight() {
        let mut backup = SystemBackup {
            id: 1,
            name: "mensual".to_string(),
            backup_type: BackupType::Full,
            status: BackupStatus::Completed,
            file_path: None,
            media_path: None,
            carpeta: None,
            size_bytes: None,
            notes: String::new(),
            created_by: None,
            created_at: Utc::now(),
            completed_at: None,
            restore_status: None,
            restore_requested_by: None,
            restore_notes: String::new(),
            restore_started_at: None,
            restore_completed_at: None,
        };
        assert!(!backup.restore_in_flight());

        backup.restore_status = Some(BackupStatus::Queued);
        assert!(backup.restore_in_flight());
        backup.restore_status = Some(BackupStatus::Running);
        assert!(backup.restore_in_flight());
        backup.restore_status = Some(BackupStatus::Failed);
        assert!(!backup.restore_in_flight());
    }
}
