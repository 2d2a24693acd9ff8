use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::activity::{self, activity_middleware};
use crate::auth::{self, auth_middleware, users};
use crate::backup::{self, BackupSettings, JobQueue};
use crate::catalog::handlers as catalog;
use crate::config::Config;
use crate::dashboard;
use crate::documents::handlers as documents;
use crate::ledger::handlers as ledger;

/// Application state containing shared resources.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub db: PgPool,

    pub config: Arc<Config>,

    /// Backup and restore jobs
    pub backups: JobQueue,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        let backups = JobQueue::new(
            db.clone(),
            BackupSettings {
                database_url: config.database_url.clone(),
                backup_dir: config.backup_dir.clone(),
                media_root: config.media_root.clone(),
            },
        );

        Self {
            db,
            config: Arc::new(config),
            backups,
        }
    }
}

/// Health check endpoint.
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pedidos-core",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Database health check endpoint.
///
/// Verifies that the database connection is working by executing
/// a simple query.
async fn db_health_check(State(state): State<AppState>) -> Result<Json<serde_json::Value>, StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.db)
        .await
        .map_err(|e| {
            tracing::error!("Database health check failed: {}", e);
            StatusCode::SERVICE_UNAVAILABLE
        })?;

    Ok(Json(serde_json::json!({
        "status": "ok",
        "database": "connected"
    })))
}

fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/empresas", get(catalog::list_empresas).post(catalog::create_empresa))
        .route(
            "/empresas/:id",
            get(catalog::get_empresa)
                .put(catalog::update_empresa)
                .delete(catalog::delete_empresa),
        )
        .route("/vendedores", get(catalog::list_vendedores).post(catalog::create_vendedor))
        .route(
            "/vendedores/:id",
            get(catalog::get_vendedor)
                .put(catalog::update_vendedor)
                .delete(catalog::delete_vendedor),
        )
        .route(
            "/proveedores",
            get(catalog::list_proveedores).post(catalog::create_proveedor),
        )
        .route(
            "/proveedores/:id",
            get(catalog::get_proveedor)
                .put(catalog::update_proveedor)
                .delete(catalog::delete_proveedor),
        )
}

fn ledger_routes() -> Router<AppState> {
    Router::new()
        .route("/pedidos", get(ledger::list_pedidos).post(ledger::create_pedido))
        .route(
            "/pedidos/:id",
            get(ledger::get_pedido)
                .put(ledger::update_pedido)
                .delete(ledger::delete_pedido),
        )
        .route("/pedidos/:id/asignar", post(ledger::asignar_pedido))
        .route("/pedidos/:id/cancelar", post(ledger::cancelar_pedido))
        .route("/pedidos/:id/resumen", get(ledger::resumen_pedido))
        .route(
            "/distribuciones",
            get(ledger::list_distribuciones).post(ledger::create_distribucion),
        )
        .route("/distribuciones/pendientes", get(ledger::distribuciones_pendientes))
        .route(
            "/distribuciones/:id",
            get(ledger::get_distribucion)
                .put(ledger::update_distribucion)
                .delete(ledger::delete_distribucion),
        )
        .route("/letras", get(ledger::list_letras).post(ledger::create_letra))
        .route("/letras/proximas", get(ledger::letras_proximas))
        .route("/letras/bulk", post(ledger::bulk_letras))
        .route(
            "/letras/:id",
            get(ledger::get_letra)
                .put(ledger::update_letra)
                .delete(ledger::delete_letra),
        )
        .route("/letras/:id/pagar", post(ledger::pagar_letra))
}

fn document_routes() -> Router<AppState> {
    Router::new()
        .route("/guias", get(documents::list_guias).post(documents::create_guia))
        .route(
            "/guias/:id",
            get(documents::get_guia)
                .put(documents::update_guia)
                .delete(documents::delete_guia),
        )
        .route("/facturas", get(documents::list_facturas).post(documents::create_factura))
        .route(
            "/facturas/:id",
            get(documents::get_factura)
                .put(documents::update_factura)
                .delete(documents::delete_factura),
        )
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/usuarios", get(users::list_users).post(users::create_user))
        .route(
            "/usuarios/:id",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/logs", get(activity::handlers::list_logs))
        .route(
            "/backups",
            get(backup::handlers::list_backups).post(backup::handlers::create_backup),
        )
        .route(
            "/backups/:id",
            get(backup::handlers::get_backup).delete(backup::handlers::delete_backup),
        )
        .route("/backups/:id/restore", post(backup::handlers::restore_backup))
        .route("/backups/:id/cancel", post(backup::handlers::cancel_backup))
        .route("/backups/:id/download", get(backup::handlers::download_backup))
}

/// Creates the main application router.
///
/// Everything under `/api` except login requires a bearer token; authenticated
/// requests then pass through the activity log.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(auth::handlers::logout))
        .route("/auth/me", get(auth::handlers::me))
        .route("/auth/change-password", post(auth::handlers::change_password))
        .route("/dashboard/estadisticas", get(dashboard::estadisticas_handler))
        .merge(catalog_routes())
        .merge(ledger_routes())
        .merge(document_routes())
        .nest("/admin", admin_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), activity_middleware))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let api = Router::new()
        .route("/auth/login", post(auth::handlers::login))
        .merge(protected);

    Router::new()
        .route("/health", get(health_check))
        .route("/health/db", get(db_health_check))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
