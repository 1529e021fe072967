//! Producer side: persist an order, then enqueue it for processing.

use domain::{Order, OrderStore};
use order_stream::{EntryId, OrderStream, OrderStreamExt};

use crate::Result;

/// Stores new orders and appends a work item for each.
///
/// The order is written before the work item is appended, so a processor
/// never sees an entry for an order that does not exist yet. If the append
/// fails the order stays `PENDING` without a work item and the error is
/// returned to the caller.
pub struct OrderIntake<S, O> {
    stream: S,
    store: O,
    stream_key: String,
}

impl<S, O> OrderIntake<S, O>
where
    S: OrderStream,
    O: OrderStore,
{
    pub fn new(stream: S, store: O, stream_key: impl Into<String>) -> Self {
        Self {
            stream,
            store,
            stream_key: stream_key.into(),
        }
    }

    /// Persists `order` and appends a work item referencing it.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn submit(&self, order: &Order) -> Result<EntryId> {
        self.store.insert(order).await?;
        let entry_id = self
            .stream
            .append_order(&self.stream_key, &order.id.to_string())
            .await?;

        tracing::info!(%entry_id, "order submitted");
        Ok(entry_id)
    }
}
