use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Share of an order assigned to a company, paid off through installments.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DistribucionFinal {
    pub id: i64,
    pub pedido_id: Uuid,
    pub empresa_id: i64,

    /// Fixed amount assigned to the company
    pub monto_final: Decimal,

    /// Sum of installment amounts (derived)
    pub monto_en_letras: Decimal,

    /// `monto_final - monto_en_letras` (derived)
    pub monto_disponible: Decimal,

    /// `monto_disponible <= 0` (derived)
    pub completado: bool,

    pub fecha_distribucion: NaiveDate,
    pub notas: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDistribucion {
    pub pedido_id: Uuid,
    pub empresa_id: i64,
    pub monto_final: Decimal,
    pub fecha_distribucion: Option<NaiveDate>,
    pub notas: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateDistribucion {
    pub empresa_id: Option<i64>,
    pub monto_final: Option<Decimal>,
    pub fecha_distribucion: Option<NaiveDate>,
    pub notas: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistribucionFilter {
    pub pedido: Option<Uuid>,
    pub empresa: Option<i64>,
    pub completado: Option<bool>,
}

/// Distribution with display fields.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DistribucionResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub distribucion: DistribucionFinal,
    pub empresa_nombre: String,
    pub proveedor_nombre: String,
    pub numero_pedido: Option<String>,
    pub letras_pendientes: i64,
}
