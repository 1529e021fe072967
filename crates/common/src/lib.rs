//! Shared identifier types for the order processing system.

pub mod types;

pub use types::{CustomerId, OrderId};
