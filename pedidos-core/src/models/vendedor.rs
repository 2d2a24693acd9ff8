use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Sales representative attached to one or more suppliers.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vendedor {
    pub id: i64,
    pub nombre: String,
    pub telefono: String,
    pub contacto_opcional: Option<String>,
    pub email: String,
    pub notas: String,
    pub activo: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVendedor {
    pub nombre: String,
    pub telefono: String,
    pub contacto_opcional: Option<String>,
    pub email: Option<String>,
    pub notas: Option<String>,
    pub activo: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateVendedor {
    pub nombre: Option<String>,
    pub telefono: Option<String>,
    pub contacto_opcional: Option<String>,
    pub email: Option<String>,
    pub notas: Option<String>,
    pub activo: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct VendedorResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub vendedor: Vendedor,
    pub proveedores_count: i64,
}
