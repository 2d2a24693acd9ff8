use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;

use chrono::{DateTime, Local};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::models::{BackupType, SystemBackup};

/// Where archives are written and what gets dumped.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub database_url: String,
    pub backup_dir: PathBuf,
    pub media_root: PathBuf,
}

/// Artifacts of a finished backup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackupOutput {
    pub file_path: Option<PathBuf>,
    pub media_path: Option<PathBuf>,
    pub size_bytes: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("job cancelled")]
    Cancelled,

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Command {
        program: &'static str,
        status: String,
        stderr: String,
    },

    #[error("{0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Resolves once `cancel` has been set. A dropped sender never cancels.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Folder for a backup: the root, or a relative sub-folder of it.
pub fn target_dir(root: &Path, carpeta: Option<&str>) -> Result<PathBuf, BackupError> {
    let Some(carpeta) = carpeta.map(str::trim).filter(|c| !c.is_empty()) else {
        return Ok(root.to_path_buf());
    };

    let relative = Path::new(carpeta);
    let safe = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    if !safe {
        return Err(BackupError::Unavailable(format!(
            "invalid backup folder: {}",
            carpeta
        )));
    }

    Ok(root.join(relative))
}

/// `<name>_<YYYYmmdd_HHMMSS>` with anything but letters, digits, `-` and `_`
/// replaced by `_`.
pub fn archive_stem(name: &str, at: DateTime<Local>) -> String {
    let clean: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}_{}", clean, timestamp(at))
}

fn timestamp(at: DateTime<Local>) -> String {
    at.format("%Y%m%d_%H%M%S").to_string()
}

/// Runs a backup job to completion.
///
/// Partial artifacts are removed when the job fails or is cancelled.
pub async fn run_backup(
    settings: &BackupSettings,
    backup: &SystemBackup,
    cancel: &mut watch::Receiver<bool>,
) -> Result<BackupOutput, BackupError> {
    let dir = target_dir(&settings.backup_dir, backup.carpeta.as_deref())?;
    tokio::fs::create_dir_all(&dir).await?;

    let now = Local::now();
    let mut output = BackupOutput::default();

    let result = write_artifacts(settings, backup, &dir, now, cancel, &mut output).await;
    if result.is_err() {
        discard(&dir, backup, now, &output).await;
    }
    result.map(|_| output)
}

async fn write_artifacts(
    settings: &BackupSettings,
    backup: &SystemBackup,
    dir: &Path,
    now: DateTime<Local>,
    cancel: &mut watch::Receiver<bool>,
    output: &mut BackupOutput,
) -> Result<(), BackupError> {
    if backup.backup_type.includes_database() {
        let sql_path = dir.join(format!("{}.sql", archive_stem(&backup.name, now)));

        let mut cmd = Command::new("pg_dump");
        cmd.arg("--clean")
            .arg("--if-exists")
            .arg("--format=plain")
            .arg(format!("--file={}", sql_path.display()))
            .arg(format!("--dbname={}", settings.database_url));
        run_command("pg_dump", cmd, cancel).await?;

        let gz_path = blocking(move || gzip_file(&sql_path)).await?;
        output.size_bytes += tokio::fs::metadata(&gz_path).await?.len() as i64;
        output.file_path = Some(gz_path);
    }

    if backup.backup_type.includes_media() {
        if has_entries(&settings.media_root) {
            let source = settings.media_root.clone();
            let dest = dir.join(format!("media_{}", timestamp(now)));
            let copied = dest.clone();
            let size = blocking(move || {
                copy_dir(&source, &copied)?;
                dir_size(&copied)
            })
            .await?;

            output.size_bytes += size as i64;
            output.media_path = Some(dest);
        } else if backup.backup_type == BackupType::Media {
            return Err(BackupError::Unavailable(format!(
                "media folder {} is empty",
                settings.media_root.display()
            )));
        } else {
            info!("Media folder empty, backup {} holds the database only", backup.id);
        }
    }

    if *cancel.borrow() {
        return Err(BackupError::Cancelled);
    }

    Ok(())
}

async fn discard(dir: &Path, backup: &SystemBackup, now: DateTime<Local>, output: &BackupOutput) {
    let sql_path = dir.join(format!("{}.sql", archive_stem(&backup.name, now)));
    let mut leftovers = vec![sql_path.clone(), sql_path.with_extension("sql.gz")];
    leftovers.extend(output.file_path.clone());

    for path in leftovers {
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                warn!("Could not remove partial backup file {}: {}", path.display(), e);
            }
        }
    }

    let media_dir = output
        .media_path
        .clone()
        .unwrap_or_else(|| dir.join(format!("media_{}", timestamp(now))));
    if tokio::fs::try_exists(&media_dir).await.unwrap_or(false) {
        if let Err(e) = tokio::fs::remove_dir_all(&media_dir).await {
            warn!("Could not remove partial media copy {}: {}", media_dir.display(), e);
        }
    }
}

/// Restores the database and/or media folder from a completed backup.
pub async fn run_restore(
    settings: &BackupSettings,
    backup: &SystemBackup,
    cancel: &mut watch::Receiver<bool>,
) -> Result<(), BackupError> {
    let archive = backup.file_path.as_deref().map(PathBuf::from);
    let media = backup.media_path.as_deref().map(PathBuf::from);

    if archive.is_none() && media.is_none() {
        return Err(BackupError::Unavailable(
            "backup has no files to restore".to_string(),
        ));
    }

    if let Some(archive) = archive {
        if !tokio::fs::try_exists(&archive).await.unwrap_or(false) {
            return Err(BackupError::Unavailable(format!(
                "backup file {} not found",
                archive.display()
            )));
        }

        let plain = blocking(move || gunzip_to_temp(&archive)).await?;

        // A cancelled or failing restore rolls back as a whole
        let mut cmd = Command::new("psql");
        cmd.arg("--quiet")
            .arg("--single-transaction")
            .arg("--set=ON_ERROR_STOP=1")
            .arg(format!("--file={}", plain.path().display()))
            .arg(format!("--dbname={}", settings.database_url));
        run_command("psql", cmd, cancel).await?;
    }

    if let Some(media) = media {
        if !tokio::fs::try_exists(&media).await.unwrap_or(false) {
            return Err(BackupError::Unavailable(format!(
                "media copy {} not found",
                media.display()
            )));
        }
        let media_root = settings.media_root.clone();
        blocking(move || restore_media(&media, &media_root)).await?;
    }

    Ok(())
}

/// Spawns `cmd`, killing it if the job is cancelled first.
async fn run_command(
    program: &'static str,
    mut cmd: Command,
    cancel: &mut watch::Receiver<bool>,
) -> Result<(), BackupError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|source| BackupError::Spawn { program, source })?;

    let stderr = child.stderr.take();
    let stderr_task = tokio::spawn(async move {
        let mut buf = String::new();
        if let Some(mut stderr) = stderr {
            let _ = stderr.read_to_string(&mut buf).await;
        }
        buf
    });

    let status = tokio::select! {
        status = child.wait() => status?,
        _ = cancelled(cancel) => {
            warn!("Killing {} after cancellation", program);
            child.kill().await?;
            return Err(BackupError::Cancelled);
        }
    };

    if !status.success() {
        let stderr = stderr_task.await.unwrap_or_default();
        return Err(BackupError::Command {
            program,
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        });
    }

    Ok(())
}

async fn blocking<T, F>(f: F) -> Result<T, BackupError>
where
    F: FnOnce() -> io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| BackupError::Io(io::Error::new(io::ErrorKind::Other, e)))?
        .map_err(BackupError::from)
}

/// Compresses `path` into `<path>.gz` and removes the original.
pub fn gzip_file(path: &Path) -> io::Result<PathBuf> {
    let mut gz_name = path.as_os_str().to_owned();
    gz_name.push(".gz");
    let gz_path = PathBuf::from(gz_name);

    let mut input = BufReader::new(File::open(path)?);
    let mut encoder = GzEncoder::new(BufWriter::new(File::create(&gz_path)?), Compression::default());
    io::copy(&mut input, &mut encoder)?;
    encoder.finish()?.flush()?;

    fs::remove_file(path)?;
    Ok(gz_path)
}

/// Decompresses a `.gz` archive into a temporary file, removed on drop.
pub fn gunzip_to_temp(path: &Path) -> io::Result<tempfile::NamedTempFile> {
    let mut decoder = GzDecoder::new(BufReader::new(File::open(path)?));
    let mut temp = tempfile::Builder::new().suffix(".sql").tempfile()?;
    io::copy(&mut decoder, temp.as_file_mut())?;
    Ok(temp)
}

fn has_entries(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// Recursively copies the contents of `from` into `to`.
pub fn copy_dir(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Total size in bytes of the files under `dir`.
pub fn dir_size(dir: &Path) -> io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        total += if meta.is_dir() {
            dir_size(&entry.path())?
        } else {
            meta.len()
        };
    }
    Ok(total)
}

fn move_contents(from: &Path, to: &Path) -> io::Result<()> {
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        fs::rename(entry.path(), to.join(entry.file_name()))?;
    }
    Ok(())
}

fn clear_dir(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(entry.path())?;
        } else {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

/// Replaces the contents of `media_root` with `source`.
///
/// The current contents are moved aside first and put back if the copy fails.
pub fn restore_media(source: &Path, media_root: &Path) -> io::Result<()> {
    fs::create_dir_all(media_root)?;

    let parent = match media_root.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let aside = tempfile::Builder::new()
        .prefix(".media_aside_")
        .tempdir_in(parent)?;

    move_contents(media_root, aside.path())?;

    if let Err(e) = copy_dir(source, media_root) {
        warn!("Media restore failed, rolling back: {}", e);
        clear_dir(media_root)?;
        move_contents(aside.path(), media_root)?;
        return Err(e);
    }

    Ok(())
}
