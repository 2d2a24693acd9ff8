use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EstadoGuia {
    Emitida,
    EnTransito,
    Recibida,
    Anulada,
}

/// Shipment receipt for an order delivered to a company.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GuiaDeRemision {
    pub id: Uuid,
    pub pedido_id: Uuid,
    pub empresa_id: i64,

    /// Unique, starts with `G`
    pub numero_guia: String,

    pub fecha_emision: NaiveDate,
    pub fecha_recepcion: Option<NaiveDate>,
    pub estado: EstadoGuia,
    pub transportista: String,
    pub notas: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateGuia {
    pub pedido_id: Uuid,
    pub empresa_id: i64,
    pub numero_guia: String,
    pub fecha_emision: NaiveDate,
    pub fecha_recepcion: Option<NaiveDate>,
    pub estado: Option<EstadoGuia>,
    pub transportista: Option<String>,
    pub notas: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateGuia {
    pub empresa_id: Option<i64>,
    pub numero_guia: Option<String>,
    pub fecha_emision: Option<NaiveDate>,
    pub fecha_recepcion: Option<NaiveDate>,
    pub estado: Option<EstadoGuia>,
    pub transportista: Option<String>,
    pub notas: Option<String>,
}

/// Guide with company/supplier names and invoice totals.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GuiaResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub guia: GuiaDeRemision,
    pub empresa: String,
    pub proveedor: String,
    pub facturas_count: i64,
    pub monto_total_facturas: Decimal,
}
