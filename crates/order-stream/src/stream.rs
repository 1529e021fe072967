use std::time::Duration;

use async_trait::async_trait;

use crate::{EntryId, EntryRange, PendingEntry, Result, StreamEntry};

/// Where a newly created consumer group starts delivering from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GroupStart {
    /// Deliver every entry already in the stream (`0`).
    #[default]
    Beginning,

    /// Deliver only entries appended after the group is created (`$`).
    Latest,
}

impl GroupStart {
    pub(crate) fn as_redis_id(&self) -> &'static str {
        match self {
            GroupStart::Beginning => "0",
            GroupStart::Latest => "$",
        }
    }
}

/// Core trait for durable work stream implementations.
///
/// A stream is an append-only log with consumer groups. Delivery within a
/// group is at-least-once: an entry handed to a consumer stays on the group's
/// pending list until it is acknowledged, and can be claimed by another
/// consumer in the meantime. All implementations must be thread-safe.
#[async_trait]
pub trait OrderStream: Send + Sync {
    /// Appends an entry with the given field/value payload.
    ///
    /// Returns the id the stream assigned to the new entry.
    async fn append(&self, stream: &str, fields: &[(&str, &str)]) -> Result<EntryId>;

    /// Creates a consumer group, creating the stream too if it is missing.
    ///
    /// Creating a group that already exists is not an error.
    async fn create_group(&self, stream: &str, group: &str, start: GroupStart) -> Result<()>;

    /// Reads entries the group has not delivered to anyone yet.
    ///
    /// Waits up to `block` for new entries; a zero duration does not wait.
    /// Returns an empty vector on timeout. Every returned entry is added to
    /// the group's pending list under `consumer`.
    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>>;

    /// Lists delivered-but-unacknowledged entries in `range`, oldest first.
    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        range: EntryRange,
        limit: usize,
    ) -> Result<Vec<PendingEntry>>;

    /// Transfers ownership of pending entries to `consumer`.
    ///
    /// Only entries idle for at least `min_idle` are transferred. Ids that are
    /// no longer pending, or whose entry has been deleted, are skipped.
    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<StreamEntry>>;

    /// Removes an entry from the group's pending list.
    ///
    /// Returns `false` if the entry was not pending.
    async fn acknowledge(&self, stream: &str, group: &str, id: &EntryId) -> Result<bool>;

    /// Deletes an entry from the stream.
    ///
    /// Returns `false` if the entry did not exist.
    async fn delete(&self, stream: &str, id: &EntryId) -> Result<bool>;

    /// Returns the number of entries currently in the stream.
    async fn len(&self, stream: &str) -> Result<u64>;
}

/// Extension trait providing convenience methods for streams.
#[async_trait]
pub trait OrderStreamExt: OrderStream {
    /// Appends a work item for a single order.
    async fn append_order(&self, stream: &str, order_id: &str) -> Result<EntryId> {
        self.append(stream, &[("order_id", order_id)]).await
    }

    /// Returns true if the stream holds no entries.
    async fn is_empty(&self, stream: &str) -> Result<bool> {
        Ok(self.len(stream).await? == 0)
    }

    /// Returns true if `id` is on the group's pending list.
    async fn is_pending(&self, stream: &str, group: &str, id: &EntryId) -> Result<bool> {
        let range = EntryRange { start: *id, end: *id };
        Ok(!self.list_pending(stream, group, range, 1).await?.is_empty())
    }
}

// Blanket implementation for all OrderStream implementations
impl<T: OrderStream + ?Sized> OrderStreamExt for T {}
