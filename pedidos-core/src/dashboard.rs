//! `GET /api/dashboard/estadisticas`

use axum::{extract::State, Extension, Json};
use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};

use crate::auth::{require, Action, Principal};
use crate::error::AppResult;
use crate::ledger::{letras, today};
use crate::models::letra::LetraResponse;
use crate::router::AppState;

const WINDOW_DAYS: u64 = 7;
const NEXT_DUE_LIMIT: i64 = 10;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct LetrasStats {
    pub pendientes: i64,
    pub proximas: i64,
    pub atrasadas: i64,
    pub pagadas_ultimos_dias: i64,
    pub monto_pendiente: Decimal,
    pub monto_proximo: Decimal,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PedidosStats {
    pub pendientes: i64,
    pub recientes: i64,
    pub contado: i64,
    pub credito: i64,
    pub monto_contado: Decimal,
    pub monto_credito: Decimal,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct EmpresaStats {
    pub id: i64,
    pub nombre: String,
    pub total_letras: Decimal,
    pub letras_pendientes: i64,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ProveedorStats {
    pub id: i64,
    pub nombre: String,
    pub pedidos_count: i64,
    pub monto_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct Estadisticas {
    pub letras: LetrasStats,
    pub pedidos: PedidosStats,
    pub empresas: Vec<EmpresaStats>,
    pub proveedores: Vec<ProveedorStats>,
    pub proximas_letras: Vec<LetraResponse>,
}

pub async fn estadisticas(pool: &PgPool, today: NaiveDate) -> AppResult<Estadisticas> {
    let ahead = today.checked_add_days(Days::new(WINDOW_DAYS)).unwrap_or(NaiveDate::MAX);
    let behind = today.checked_sub_days(Days::new(WINDOW_DAYS)).unwrap_or(NaiveDate::MIN);

    let letras_stats = sqlx::query_as::<_, LetrasStats>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE estado = 'pendiente') AS pendientes,
            COUNT(*) FILTER (WHERE estado = 'pendiente' AND fecha_pago BETWEEN $1 AND $2)
                AS proximas,
            COUNT(*) FILTER (WHERE estado = 'atrasado') AS atrasadas,
            COUNT(*) FILTER (WHERE estado = 'pagado' AND fecha_pago_real BETWEEN $3 AND $1)
                AS pagadas_ultimos_dias,
            COALESCE(SUM(monto) FILTER (WHERE estado <> 'pagado'), 0) AS monto_pendiente,
            COALESCE(SUM(monto) FILTER (WHERE estado = 'pendiente' AND fecha_pago BETWEEN $1 AND $2), 0)
                AS monto_proximo
        FROM letras
        "#,
    )
    .bind(today)
    .bind(ahead)
    .bind(behind)
    .fetch_one(pool)
    .await?;

    let pedidos_stats = sqlx::query_as::<_, PedidosStats>(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE estado = 'pendiente') AS pendientes,
            COUNT(*) FILTER (WHERE fecha_pedido >= $1) AS recientes,
            COUNT(*) FILTER (WHERE es_contado) AS contado,
            COUNT(*) FILTER (WHERE NOT es_contado) AS credito,
            COALESCE(SUM(monto_total_pedido) FILTER (WHERE es_contado), 0) AS monto_contado,
            COALESCE(SUM(monto_total_pedido) FILTER (WHERE NOT es_contado), 0) AS monto_credito
        FROM pedidos
        WHERE estado <> 'cancelado'
        "#,
    )
    .bind(behind)
    .fetch_one(pool)
    .await?;

    let empresas = sqlx::query_as::<_, EmpresaStats>(
        r#"
        SELECT e.id, e.nombre,
            COALESCE(SUM(l.monto), 0) AS total_letras,
            COUNT(l.id) FILTER (WHERE l.estado = 'pendiente') AS letras_pendientes
        FROM empresas e
        LEFT JOIN letras l ON l.empresa_id = e.id
        WHERE e.activo
        GROUP BY e.id, e.nombre
        ORDER BY e.nombre
        "#,
    )
    .fetch_all(pool)
    .await?;

    let proveedores = sqlx::query_as::<_, ProveedorStats>(
        r#"
        SELECT pr.id, pr.nombre,
            COUNT(p.id) AS pedidos_count,
            COALESCE(SUM(p.monto_total_pedido), 0) AS monto_total
        FROM proveedores pr
        LEFT JOIN pedidos p ON p.proveedor_id = pr.id
        WHERE pr.activo
        GROUP BY pr.id, pr.nombre
        ORDER BY monto_total DESC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let proximas_letras = letras::siguientes(pool, NEXT_DUE_LIMIT, today).await?;

    Ok(Estadisticas {
        letras: letras_stats,
        pedidos: pedidos_stats,
        empresas,
        proveedores,
        proximas_letras,
    })
}

pub async fn estadisticas_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<Estadisticas>> {
    require(&principal, Action::Read)?;
    Ok(Json(estadisticas(&state.db, today()).await?))
}
