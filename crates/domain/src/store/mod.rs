//! Order store trait and implementations.

mod memory;
mod postgres;

pub use memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;

use crate::{Order, OrderStatus, Result};

/// Document store holding order records.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a new order.
    ///
    /// Fails with `DuplicateOrder` if an order with the same id exists.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Retrieves an order by id.
    ///
    /// Returns None if the order doesn't exist.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Conditional bulk update.
    ///
    /// Sets `status = to` and `updated_at = at` on every order whose id is in
    /// `ids` and whose current status equals `from`, in a single operation.
    /// Orders in any other status are left untouched, so re-applying the same
    /// transition is a no-op.
    ///
    /// Returns the number of orders actually changed.
    async fn transition_status(
        &self,
        ids: &[OrderId],
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<u64>;
}
