//! Order record as held in the order store.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderStatus};

/// A single product line on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: String,
    pub quantity: u32,
}

impl LineItem {
    pub fn new(product_id: impl Into<String>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// A customer order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier, assigned when the order is first built.
    pub id: OrderId,

    /// Customer who placed the order.
    pub customer_id: CustomerId,

    /// Ordered product lines.
    pub items: Vec<LineItem>,

    /// Current lifecycle status.
    pub status: OrderStatus,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Builds a new `Pending` order after validating its contents.
    ///
    /// Every order needs a customer and at least one line item, and each
    /// line item needs a product id and a quantity above zero.
    pub fn new(customer_id: CustomerId, items: Vec<LineItem>) -> Result<Self, OrderError> {
        if customer_id.as_str().trim().is_empty() {
            return Err(OrderError::CustomerIdRequired);
        }
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        for item in &items {
            if item.product_id.trim().is_empty() {
                return Err(OrderError::ProductIdRequired);
            }
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    product_id: item.product_id.clone(),
                    quantity: item.quantity,
                });
            }
        }

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            customer_id,
            items,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }
}
