//! Order record and its status lifecycle.

mod model;
mod status;

pub use model::{LineItem, Order};
pub use status::OrderStatus;

use thiserror::Error;

/// Errors raised when building an order record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum OrderError {
    /// Customer ID is required.
    #[error("Customer ID is required")]
    CustomerIdRequired,

    /// Product ID is required on every line item.
    #[error("Product ID is required")]
    ProductIdRequired,

    /// Invalid quantity.
    #[error("Invalid quantity for {product_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { product_id: String, quantity: u32 },

    /// Order has no items.
    #[error("Order must contain at least one item")]
    NoItems,
}
