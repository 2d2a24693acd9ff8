//! Companies, sales representatives and suppliers.

pub mod empresas;
pub mod handlers;
pub mod proveedores;
pub mod vendedores;
