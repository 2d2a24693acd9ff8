use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Company that receives distributions, installments and shipping documents.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Empresa {
    pub id: i64,

    /// Unique display name
    pub nombre: String,

    /// Tax id, 11 digits
    pub ruc: String,

    pub direccion: String,
    pub telefono: String,
    pub email_contacto: String,
    pub activo: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Company creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEmpresa {
    pub nombre: String,
    pub ruc: String,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub email_contacto: Option<String>,
    pub activo: Option<bool>,
}

/// Company update request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEmpresa {
    pub nombre: Option<String>,
    pub ruc: Option<String>,
    pub direccion: Option<String>,
    pub telefono: Option<String>,
    pub email_contacto: Option<String>,
    pub activo: Option<bool>,
}

/// Company with installment and invoice aggregates.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmpresaResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub empresa: Empresa,
    pub total_letras: Decimal,
    pub letras_pendientes: i64,
    pub total_facturado: Decimal,
    pub facturas_emitidas: i64,
}
