//! Reconciliation engine: matches bank statement activity against ledger
//! records with a cleared-balance equation.

pub mod error;
pub mod models;
pub mod services;
pub mod store;
