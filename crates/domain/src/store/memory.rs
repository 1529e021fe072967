use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::OrderId;
use tokio::sync::RwLock;

use crate::{Order, OrderStatus, Result, StoreError, store::OrderStore};

/// In-memory order store implementation for testing.
///
/// Provides the same interface and the same conditional-update semantics as
/// the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the status of an order, if it exists.
    pub async fn status_of(&self, id: OrderId) -> Option<OrderStatus> {
        self.orders.read().await.get(&id).map(|order| order.status)
    }

    /// Clears all orders.
    pub async fn clear(&self) {
        self.orders.write().await.clear();
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(StoreError::DuplicateOrder(order.id));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn transition_status(
        &self,
        ids: &[OrderId],
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<u64> {
        let mut orders = self.orders.write().await;
        let mut changed = 0;

        for id in ids {
            if let Some(order) = orders.get_mut(id)
                && order.status == from
            {
                order.status = to;
                order.updated_at = at;
                changed += 1;
            }
        }

        Ok(changed)
    }
}
