//! accounting-core: Shared infrastructure for the minibooks engines.
pub mod config;
pub mod error;
pub mod money;
pub mod observability;

pub use async_trait;
