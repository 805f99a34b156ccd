//! Engine services for the allocation crate.

pub mod allocator;
pub mod metrics;

pub use allocator::Allocator;
