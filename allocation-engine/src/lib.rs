//! Allocation engine: applies payments, customer deposits, and credit
//! memos against outstanding invoices and bills.

pub mod error;
pub mod models;
pub mod services;
pub mod store;
