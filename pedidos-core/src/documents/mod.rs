//! Shipping guides and the invoices issued against them.

pub mod facturas;
pub mod guias;
pub mod handlers;
