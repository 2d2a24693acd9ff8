pub mod activity;
pub mod backup;
pub mod distribucion;
pub mod empresa;
pub mod factura;
pub mod guia;
pub mod letra;
pub mod pedido;
pub mod proveedor;
pub mod user;
pub mod vendedor;

pub use activity::{AccessLog, ActionType, UserActivity};
pub use backup::{BackupStatus, BackupType, CreateBackup, SystemBackup};
pub use distribucion::DistribucionFinal;
pub use empresa::Empresa;
pub use factura::{EstadoFactura, Factura};
pub use guia::{EstadoGuia, GuiaDeRemision};
pub use letra::{EstadoLetra, Letra};
pub use pedido::{EstadoPedido, Pedido};
pub use proveedor::Proveedor;
pub use user::{Rol, User};
pub use vendedor::Vendedor;
