//! Engine services for the reconciliation crate.

pub mod metrics;
pub mod reconciler;

pub use reconciler::Reconciler;
