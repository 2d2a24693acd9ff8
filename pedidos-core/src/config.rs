use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

/// Runtime configuration read from the environment (and `.env` via `dotenv`).
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Interface the API server binds to
    pub server_host: String,

    /// Port the API server listens on
    pub server_port: u16,

    /// HMAC secret used to sign bearer tokens
    pub jwt_secret: String,

    /// Token lifetime in hours
    pub jwt_ttl_hours: i64,

    /// Root folder for backup archives
    pub backup_dir: PathBuf,

    /// Uploaded media folder included in `full`/`media` backups
    pub media_root: PathBuf,

    /// Maximum number of pooled database connections
    pub db_max_connections: u32,

    /// How often the worker sweeps for overdue documents
    pub worker_poll_seconds: u64,
}

impl Config {
    /// Builds the configuration from environment variables.
    ///
    /// `DATABASE_URL` is required; everything else has a default.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;

        Ok(Self {
            database_url,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: parse_var("SERVER_PORT", 3000)?,
            jwt_secret: env::var("JWT_SECRET").unwrap_or_else(|_| "secret".to_string()),
            jwt_ttl_hours: parse_var("JWT_TTL_HOURS", 24)?,
            backup_dir: env::var("BACKUP_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("backups")),
            media_root: env::var("MEDIA_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("media")),
            db_max_connections: parse_var("DB_MAX_CONNECTIONS", 10)?,
            worker_poll_seconds: parse_var("WORKER_POLL_SECONDS", 3600)?,
        })
    }

    /// Configuration suitable for tests: no environment access.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/pedidos_test".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            jwt_ttl_hours: 1,
            backup_dir: env::temp_dir().join("pedidos-backups"),
            media_root: env::temp_dir().join("pedidos-media"),
            db_max_connections: 1,
            worker_poll_seconds: 60,
        }
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> anyhow::Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("Invalid {}: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let value: u16 = parse_var("PEDIDOS_TEST_UNSET_VARIABLE", 3000).unwrap();
        assert_eq!(value, 3000);
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("PEDIDOS_TEST_BAD_PORT", "not-a-port");
        let result: anyhow::Result<u16> = parse_var("PEDIDOS_TEST_BAD_PORT", 3000);
        assert!(result.is_err());
        env::remove_var("PEDIDOS_TEST_BAD_PORT");
    }
}
