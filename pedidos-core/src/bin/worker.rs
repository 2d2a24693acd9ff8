use dotenv::dotenv;
use pedidos_core::config::Config;
use pedidos_core::db;
use pedidos_core::worker::JobScheduler;
use tokio::signal;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Worker binary entry point for the overdue sweep.
///
/// Marks installments past their grace date as late and invoices past their
/// due date as expired, once per `WORKER_POLL_SECONDS`.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive(LevelFilter::INFO.into());

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .init();

    info!("Starting overdue sweep worker...");

    let config = Config::from_env()?;
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&pool).await?;

    let mut scheduler = JobScheduler::new(pool, config.worker_poll_seconds);
    let running = scheduler.stop_handle();

    let scheduler_handle = tokio::spawn(async move {
        if let Err(e) = scheduler.start().await {
            tracing::error!("Scheduler error: {}", e);
        }
    });

    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
            *running.write().await = false;
        }
        _ = scheduler_handle => {
            info!("Scheduler task completed");
        }
    }

    info!("Overdue sweep worker stopped");
    Ok(())
}
