use anyhow::Context;
use dotenv::dotenv;
use pedidos_core::auth::{hash_password, reconcile_role};
use pedidos_core::config::Config;
use pedidos_core::db;
use pedidos_core::models::Rol;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Creates the superadmin account, or resets its password and role when the
/// username already exists.
///
/// Usage: `create-superuser <username> <password> [email]`, or the
/// `SUPERUSER_USERNAME` / `SUPERUSER_PASSWORD` / `SUPERUSER_EMAIL` variables.
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

    let mut args = std::env::args().skip(1);
    let username = args
        .next()
        .or_else(|| std::env::var("SUPERUSER_USERNAME").ok())
        .context("username required: create-superuser <username> <password> [email]")?;
    let password = args
        .next()
        .or_else(|| std::env::var("SUPERUSER_PASSWORD").ok())
        .context("password required: create-superuser <username> <password> [email]")?;
    let email = args
        .next()
        .or_else(|| std::env::var("SUPERUSER_EMAIL").ok())
        .unwrap_or_default();

    if password.chars().count() < pedidos_core::auth::handlers::MIN_PASSWORD_LEN {
        anyhow::bail!(
            "password must have at least {} characters",
            pedidos_core::auth::handlers::MIN_PASSWORD_LEN
        );
    }

    let config = Config::from_env()?;
    let pool = db::create_pool(&config.database_url, 1).await?;
    db::run_migrations(&pool).await?;

    let flags = reconcile_role(Rol::Superadmin, true, true);
    let password_hash = hash_password(&password).map_err(|e| anyhow::anyhow!("{}", e))?;

    let created: bool = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, password_hash, rol, is_staff, is_superuser, is_active)
        VALUES ($1, $2, $3, $4, $5, $6, TRUE)
        ON CONFLICT (username) DO UPDATE
        SET password_hash = EXCLUDED.password_hash,
            rol = EXCLUDED.rol,
            is_staff = EXCLUDED.is_staff,
            is_superuser = EXCLUDED.is_superuser,
            is_active = TRUE,
            email = CASE WHEN EXCLUDED.email = '' THEN users.email ELSE EXCLUDED.email END,
            token_version = users.token_version + 1,
            updated_at = NOW()
        RETURNING (xmax = 0)
        "#,
    )
    .bind(&username)
    .bind(&email)
    .bind(&password_hash)
    .bind(flags.rol)
    .bind(flags.is_staff)
    .bind(flags.is_superuser)
    .fetch_one(&pool)
    .await?;

    if created {
        info!("Superuser {} created", username);
    } else {
        info!("Superuser {} already existed; password and role reset", username);
    }
    Ok(())
}
