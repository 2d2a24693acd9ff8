//! Background sweep that moves installments and invoices to their overdue
//! states.

pub mod executor;
pub mod scheduler;
pub mod state_machine;

pub use executor::OverdueExecutor;
pub use scheduler::{JobScheduler, SweepReport};
pub use state_machine::{FacturaStateMachine, LetraStateMachine, SweepAction, Transition};
