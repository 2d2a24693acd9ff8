use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Order lifecycle.
///
/// - Pendiente: created, no distribution yet
/// - Asignado: at least one distribution exists
/// - Completado: all distributions complete (credit) or covered (cash)
/// - Cancelado: explicit action, terminal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EstadoPedido {
    Pendiente,
    Asignado,
    Completado,
    Cancelado,
}

impl EstadoPedido {
    pub fn as_str(&self) -> &'static str {
        match self {
            EstadoPedido::Pendiente => "pendiente",
            EstadoPedido::Asignado => "asignado",
            EstadoPedido::Completado => "completado",
            EstadoPedido::Cancelado => "cancelado",
        }
    }
}

impl fmt::Display for EstadoPedido {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purchase order placed with a supplier.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Pedido {
    pub id: Uuid,
    pub proveedor_id: i64,

    /// Generated on first save, e.g. `NORT01062501`; may stay empty if generation failed
    pub numero_pedido: Option<String>,

    /// Initial total amount
    pub monto_total_pedido: Decimal,

    /// Sum of distribution final amounts, filled once distributions exist
    pub monto_final_pedido: Option<Decimal>,

    /// Sum of paid installments
    pub monto_pagado: Decimal,

    pub estado: EstadoPedido,

    /// Cash sale: completes on distribution coverage instead of installments
    pub es_contado: bool,

    pub completado: bool,
    pub fecha_pedido: NaiveDate,
    pub plazo_dias: i32,
    pub descripcion: Option<String>,
    pub notas_internas: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pedido {
    pub fn tipo_pedido(&self) -> &'static str {
        if self.es_contado {
            "Contado"
        } else {
            "Crédito"
        }
    }

    /// Paid share of the total, rounded to two decimals.
    pub fn porcentaje_pagado(&self) -> Decimal {
        if self.monto_total_pedido.is_zero() {
            return Decimal::ZERO;
        }
        (self.monto_pagado / self.monto_total_pedido * Decimal::ONE_HUNDRED).round_dp(2)
    }
}

/// Order creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePedido {
    pub proveedor_id: i64,
    pub monto_total_pedido: Decimal,
    pub monto_pagado: Option<Decimal>,
    pub es_contado: Option<bool>,
    pub fecha_pedido: NaiveDate,
    pub plazo_dias: Option<i32>,
    pub descripcion: Option<String>,
    pub notas_internas: Option<String>,

    /// Explicit number; generated when absent
    pub numero_pedido: Option<String>,
}

/// Order update request. State changes go through the assign/cancel actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdatePedido {
    pub proveedor_id: Option<i64>,
    pub monto_total_pedido: Option<Decimal>,
    pub monto_pagado: Option<Decimal>,
    pub es_contado: Option<bool>,
    pub fecha_pedido: Option<NaiveDate>,
    pub plazo_dias: Option<i32>,
    pub descripcion: Option<String>,
    pub notas_internas: Option<String>,
    pub numero_pedido: Option<String>,
}

/// Order list filters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PedidoFilter {
    pub proveedor: Option<i64>,
    pub estado: Option<EstadoPedido>,
    pub es_contado: Option<bool>,
    pub fecha_desde: Option<NaiveDate>,
    pub fecha_hasta: Option<NaiveDate>,
}

/// Order with supplier name and child counts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PedidoResponse {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub pedido: Pedido,
    pub proveedor_nombre: String,
    pub distribuciones_count: i64,
    pub letras_count: i64,
    #[sqlx(skip)]
    pub tipo_pedido: String,
    #[sqlx(skip)]
    pub porcentaje_pagado: Decimal,
}

impl PedidoResponse {
    pub fn with_derived(mut self) -> Self {
        self.tipo_pedido = self.pedido.tipo_pedido().to_string();
        self.porcentaje_pagado = self.pedido.porcentaje_pagado();
        self
    }
}

/// Order summary returned by `GET /api/pedidos/:id/resumen`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PedidoResumen {
    pub id: Uuid,
    pub numero_pedido: Option<String>,
    pub proveedor_nombre: String,
    pub estado: EstadoPedido,
    pub tipo_pedido: String,
    pub monto_total_pedido: Decimal,
    pub monto_final_pedido: Option<Decimal>,
    pub monto_distribuido: Decimal,
    pub monto_en_letras: Decimal,
    pub monto_pagado: Decimal,
    pub porcentaje_pagado: Decimal,
    pub distribuciones_count: i64,
    pub distribuciones_completadas: i64,
    pub letras_count: i64,
    pub letras_pagadas: i64,
    pub guias_count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pedido(total: i64, pagado: i64) -> Pedido {
        Pedido {
            id: Uuid::new_v4(),
            proveedor_id: 1,
            numero_pedido: None,
            monto_total_pedido: Decimal::new(total, 0),
            monto_final_pedido: None,
            monto_pagado: Decimal::new(pagado, 0),
            estado: EstadoPedido::Pendiente,
            es_contado: false,
            completado: false,
            fecha_pedido: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            plazo_dias: 60,
            descripcion: None,
            notas_internas: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_porcentaje_pagado() {
        assert_eq!(pedido(300, 100).porcentaje_pagado(), Decimal::new(3333, 2));
        assert_eq!(pedido(0, 0).porcentaje_pagado(), Decimal::ZERO);
    }

    #[test]
    fn test_estado_serializes_snake_case() {
        let json = serde_json::to_string(&EstadoPedido::Asignado).unwrap();
        assert_eq!(json, "\"asignado\"");
    }
}
