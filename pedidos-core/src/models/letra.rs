use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EstadoLetra {
    Pendiente,
    Pagado,
    Atrasado,
}

impl EstadoLetra {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoLetra::Pendiente => "pendiente",
            EstadoLetra::Pagado => "pagado",
            EstadoLetra::Atrasado => "atrasado",
        }
    }
}

impl fmt::Display for EstadoLetra {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Installment note drawn against a distribution.
///
/// `pedido_id` and `empresa_id` are copied from the distribution so that
/// listings and roll-ups do not need to join through it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Letra {
    pub id: Uuid,
    pub distribucion_id: i64,
    pub pedido_id: Uuid,
    pub empresa_id: i64,
    pub numero_unico: Option<String>,
    pub monto: Decimal,

    /// Due date
    pub fecha_pago: NaiveDate,

    pub estado: EstadoLetra,

    /// Due date plus nine business days
    pub fecha_vencimiento_gracia: Option<NaiveDate>,

    pub dias_retraso: i32,

    /// Settlement fields, filled when the installment is paid
    pub fecha_pago_real: Option<NaiveDate>,
    pub banco: String,
    pub numero_operacion: String,

    pub notas: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Letra {
    /// Days until the due date; zero once paid.
    pub fn dias_restantes(&self, today: NaiveDate) -> i64 {
        if self.estado == EstadoLetra::Pagado {
            return 0;
        }
        (self.fecha_pago - today).num_days()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLetra {
    pub distribucion_id: i64,
    pub monto: Decimal,
    pub fecha_pago: NaiveDate,
    pub numero_unico: Option<String>,
    pub notas: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateLetra {
    pub monto: Option<Decimal>,
    pub fecha_pago: Option<NaiveDate>,
    pub estado: Option<EstadoLetra>,
    pub numero_unico: Option<String>,
    pub fecha_pago_real: Option<NaiveDate>,
    pub banco: Option<String>,
    pub numero_operacion: Option<String>,
    pub notas: Option<String>,
}

/// Settlement details for `POST /api/letras/:id/pagar`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarcarPagada {
    pub fecha_pago_real: Option<NaiveDate>,
    pub banco: Option<String>,
    pub numero_operacion: Option<String>,
}

/// Bulk creation: one installment per (amount, date) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkLetras {
    pub distribucion_id: i64,
    pub montos: Vec<Decimal>,
    pub fechas: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LetraFilter {
    pub estado: Option<EstadoLetra>,
    pub empresa: Option<i64>,
    pub distribucion: Option<i64>,
    pub fecha_desde: Option<NaiveDate>,
    pub fecha_hasta: Option<NaiveDate>,
}

/// Installment with display fields.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LetraResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub letra: Letra,
    pub empresa_nombre: String,
    pub proveedor: String,
    pub numero_pedido: Option<String>,
    #[sqlx(skip)]
    pub dias_restantes: i64,
}

impl LetraResponse {
    pub fn with_dias_restantes(mut self, today: NaiveDate) -> Self {
        self.dias_restantes = self.letra.dias_restantes(today);
        self
    }
}
