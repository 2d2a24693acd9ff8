use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::engine::supplier_code;

/// Default credit term, in days, for suppliers and their orders.
pub const DEFAULT_PLAZO_DIAS: i32 = 60;

/// Supplier model. Orders reference it; deleting a supplier with orders is rejected.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Proveedor {
    pub id: i64,
    pub nombre: String,

    /// Explicit order-number prefix; derived from `nombre` when absent
    pub identificador: Option<String>,

    /// HEX colour used by the calendar UI
    pub color: String,

    pub ruc: Option<String>,
    pub direccion: String,
    pub telefono: String,
    pub email: String,

    /// Credit term copied onto new orders
    pub plazo_credito_default: i32,

    pub activo: bool,
    pub vendedor_id: Option<i64>,
    pub notas: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Proveedor {
    /// Prefix used for this supplier's order numbers.
    pub fn codigo(&self) -> String {
        supplier_code(&self.nombre, self.identificador.as_deref())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateProveedor {
    pub nombre: String,
    pub identificador: Option<String>,
    pub color: Option<String>,
    pub ruc: Option<String>,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub plazo_credito_default: Option<i32>,
    pub activo: Option<bool>,
    pub vendedor_id: Option<i64>,
    pub notas: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateProveedor {
    pub nombre: Option<String>,
    pub identificador: Option<String>,
    pub color: Option<String>,
    pub ruc: Option<String>,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub email: Option<String>,
    pub plazo_credito_default: Option<i32>,
    pub activo: Option<bool>,
    pub vendedor_id: Option<i64>,
    pub notas: Option<String>,
}

/// Supplier with order aggregates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProveedorResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub proveedor: Proveedor,
    pub vendedor_nombre: Option<String>,
    pub pedidos_count: i64,
    pub pedidos_pendientes: i64,
    pub monto_total_pedidos: Decimal,
}
