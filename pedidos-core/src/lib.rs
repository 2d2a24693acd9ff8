//! Supplier order ledger: orders, their distribution across companies,
//! installment plans and shipping documents, served as a JSON API.

pub mod activity;
pub mod auth;
pub mod backup;
pub mod catalog;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod documents;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod models;
pub mod pagination;
pub mod router;
pub mod validation;
pub mod worker;
