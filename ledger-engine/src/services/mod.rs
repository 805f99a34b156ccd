//! Engine services for the ledger crate.

pub mod balances;
pub mod closing;
pub mod ledger;
pub mod metrics;

pub use balances::{AccountBalance, BalanceCalculator, NetIncome};
pub use closing::{CloseOptions, ClosePreview, ClosePreviewLine, ClosingEngine};
pub use ledger::Ledger;
