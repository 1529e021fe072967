//! Order model and order store for the order processing system.
//!
//! This crate provides:
//! - [`Order`], [`LineItem`] and the [`OrderStatus`] lifecycle
//! - [`OrderStore`] trait with the conditional bulk status transition
//! - In-memory and PostgreSQL store implementations

pub mod error;
pub mod order;
pub mod store;

pub use common::{CustomerId, OrderId};
pub use error::{Result, StoreError};
pub use order::{LineItem, Order, OrderError, OrderStatus};
pub use store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
