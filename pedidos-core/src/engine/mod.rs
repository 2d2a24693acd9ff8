//! Derived-field rules for orders, distributions and installments.
//!
//! Everything in here is pure: callers load the rows, call these functions
//! and persist the results inside their own transaction.

pub mod grace;
pub mod numbering;
pub mod rollup;

pub use grace::{add_business_days, grace_date, GRACE_BUSINESS_DAYS};
pub use numbering::{next_sequence, order_number, supplier_code};
pub use rollup::{
    cash_order_complete, credit_order_complete, days_late, distribution_totals, paid_total,
    reopens_credit_order, state_after_distribution, DistributionTotals,
};
