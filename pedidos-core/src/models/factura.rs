use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EstadoFactura {
    Emitida,
    Pagada,
    Anulada,
    Vencida,
}

impl fmt::Display for EstadoFactura {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EstadoFactura::Emitida => write!(f, "emitida"),
            EstadoFactura::Pagada => write!(f, "pagada"),
            EstadoFactura::Anulada => write!(f, "anulada"),
            EstadoFactura::Vencida => write!(f, "vencida"),
        }
    }
}

/// Invoice issued against a shipping guide. `empresa_id` mirrors the guide's.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Factura {
    pub id: Uuid,
    pub guia_id: Uuid,
    pub empresa_id: i64,

    /// Unique, starts with `F` or `E`
    pub numero_factura: String,

    pub monto_factura: Decimal,
    pub fecha_emision: NaiveDate,
    pub fecha_vencimiento: Option<NaiveDate>,
    pub estado: EstadoFactura,

    /// e.g. "Contado", "Crédito 30 días"
    pub condicion_pago: String,

    pub notas: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFactura {
    pub guia_id: Uuid,
    pub numero_factura: String,
    pub monto_factura: Decimal,
    pub fecha_emision: NaiveDate,
    pub fecha_vencimiento: Option<NaiveDate>,
    pub estado: Option<EstadoFactura>,
    pub condicion_pago: Option<String>,
    pub notas: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateFactura {
    pub numero_factura: Option<String>,
    pub monto_factura: Option<Decimal>,
    pub fecha_emision: Option<NaiveDate>,
    pub fecha_vencimiento: Option<NaiveDate>,
    pub estado: Option<EstadoFactura>,
    pub condicion_pago: Option<String>,
    pub notas: Option<String>,
}

/// Filters shared by guide and invoice listings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentoFilter {
    pub empresa: Option<i64>,
    pub estado: Option<String>,
    pub fecha_desde: Option<NaiveDate>,
    pub fecha_hasta: Option<NaiveDate>,
}

/// Invoice with display fields.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FacturaResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub factura: Factura,
    pub empresa: String,
    pub guia: String,
    pub proveedor: String,
    #[sqlx(skip)]
    pub dias_vencimiento: Option<i64>,
}

impl FacturaResponse {
    pub fn with_dias_vencimiento(mut self, today: NaiveDate) -> Self {
        self.dias_vencimiento = self
            .factura
            .fecha_vencimiento
            .map(|vence| (vence - today).num_days());
        self
    }
}
