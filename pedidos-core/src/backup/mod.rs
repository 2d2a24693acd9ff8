//! Database and media backups run as serialised background jobs.

pub mod handlers;
pub mod queue;
pub mod runner;

pub use queue::JobQueue;
pub use runner::{BackupError, BackupSettings};
