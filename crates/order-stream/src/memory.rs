use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;

use crate::{
    EntryId, EntryRange, PendingEntry, Result, StreamEntry, StreamError,
    stream::{GroupStart, OrderStream},
};

#[derive(Debug, Clone)]
struct PendingRecord {
    consumer: String,
    delivered_at: Instant,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct GroupState {
    last_delivered: Option<EntryId>,
    pending: BTreeMap<EntryId, PendingRecord>,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: BTreeMap<EntryId, BTreeMap<String, String>>,
    last_id: Option<EntryId>,
    groups: HashMap<String, GroupState>,
}

impl StreamState {
    fn group_mut(&mut self, stream: &str, group: &str) -> Result<&mut GroupState> {
        self.groups
            .get_mut(group)
            .ok_or_else(|| StreamError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })
    }
}

/// In-memory stream implementation for testing.
///
/// Mirrors the consumer-group semantics of the Redis implementation: a
/// per-group delivery cursor, a pending list tracking owner, delivery time
/// and delivery count, and blocking reads that wake up on append.
#[derive(Clone, Default)]
pub struct InMemoryOrderStream {
    streams: Arc<RwLock<HashMap<String, StreamState>>>,
    appended: Arc<Notify>,
}

impl InMemoryOrderStream {
    /// Creates a new empty in-memory stream store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every entry currently in `stream`, oldest first.
    pub async fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        let streams = self.streams.read().await;
        streams
            .get(stream)
            .map(|state| {
                state
                    .entries
                    .iter()
                    .map(|(id, fields)| StreamEntry::new(*id, fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the number of entries pending for `group`.
    pub async fn pending_count(&self, stream: &str, group: &str) -> usize {
        let streams = self.streams.read().await;
        streams
            .get(stream)
            .and_then(|state| state.groups.get(group))
            .map(|group| group.pending.len())
            .unwrap_or(0)
    }

    /// Clears all streams and groups.
    pub async fn clear(&self) {
        self.streams.write().await.clear();
    }

    fn next_id(last: Option<EntryId>) -> EntryId {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        match last {
            Some(last) if last.millis() >= now => last.next(),
            _ => EntryId::new(now, 0),
        }
    }

    /// Delivers up to `count` undelivered entries to `consumer`.
    async fn try_deliver(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>> {
        let mut streams = self.streams.write().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| StreamError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let cursor = state.group_mut(stream, group)?.last_delivered;
        let delivered: Vec<StreamEntry> = state
            .entries
            .iter()
            .filter(|(id, _)| cursor.is_none_or(|cursor| **id > cursor))
            .take(count)
            .map(|(id, fields)| StreamEntry::new(*id, fields.clone()))
            .collect();

        let group_state = state.group_mut(stream, group)?;
        let now = Instant::now();
        for entry in &delivered {
            group_state.last_delivered = Some(entry.id);
            group_state.pending.insert(
                entry.id,
                PendingRecord {
                    consumer: consumer.to_string(),
                    delivered_at: now,
                    delivery_count: 1,
                },
            );
        }

        Ok(delivered)
    }
}

#[async_trait]
impl OrderStream for InMemoryOrderStream {
    async fn append(&self, stream: &str, fields: &[(&str, &str)]) -> Result<EntryId> {
        let mut streams = self.streams.write().await;
        let state = streams.entry(stream.to_string()).or_default();

        let id = Self::next_id(state.last_id);
        let fields = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        state.entries.insert(id, fields);
        state.last_id = Some(id);
        drop(streams);

        self.appended.notify_waiters();
        Ok(id)
    }

    async fn create_group(&self, stream: &str, group: &str, start: GroupStart) -> Result<()> {
        let mut streams = self.streams.write().await;
        let state = streams.entry(stream.to_string()).or_default();
        if state.groups.contains_key(group) {
            return Ok(());
        }

        let last_delivered = match start {
            GroupStart::Beginning => None,
            GroupStart::Latest => state.last_id,
        };
        state.groups.insert(
            group.to_string(),
            GroupState {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        let deadline = Instant::now() + block;

        loop {
            // Register interest before checking so an append between the
            // check and the wait is not missed.
            let notified = self.appended.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let delivered = self.try_deliver(stream, group, consumer, count).await?;
            if !delivered.is_empty() || block.is_zero() {
                return Ok(delivered);
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        range: EntryRange,
        limit: usize,
    ) -> Result<Vec<PendingEntry>> {
        let streams = self.streams.read().await;
        let group_state = streams
            .get(stream)
            .and_then(|state| state.groups.get(group))
            .ok_or_else(|| StreamError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        if range.start > range.end {
            return Ok(Vec::new());
        }

        let now = Instant::now();
        let pending = group_state
            .pending
            .range(range.start..=range.end)
            .take(limit)
            .map(|(id, record)| PendingEntry {
                id: *id,
                consumer: record.consumer.clone(),
                idle: now.saturating_duration_since(record.delivered_at),
                delivery_count: record.delivery_count,
            })
            .collect();
        Ok(pending)
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<StreamEntry>> {
        let mut streams = self.streams.write().await;
        let state = streams
            .get_mut(stream)
            .ok_or_else(|| StreamError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;
        let StreamState {
            entries, groups, ..
        } = state;
        let group_state = groups
            .get_mut(group)
            .ok_or_else(|| StreamError::GroupNotFound {
                stream: stream.to_string(),
                group: group.to_string(),
            })?;

        let now = Instant::now();
        let mut claimed = Vec::with_capacity(ids.len());
        for id in ids {
            if !group_state.pending.contains_key(id) {
                continue;
            }

            // A deleted entry cannot be delivered again; drop it from the
            // pending list the way Redis 7 does.
            let Some(fields) = entries.get(id) else {
                group_state.pending.remove(id);
                continue;
            };
            let Some(record) = group_state.pending.get_mut(id) else {
                continue;
            };

            if now.saturating_duration_since(record.delivered_at) < min_idle {
                continue;
            }

            record.consumer = consumer.to_string();
            record.delivered_at = now;
            record.delivery_count += 1;
            claimed.push(StreamEntry::new(*id, fields.clone()));
        }

        Ok(claimed)
    }

    async fn acknowledge(&self, stream: &str, group: &str, id: &EntryId) -> Result<bool> {
        let mut streams = self.streams.write().await;
        let Some(state) = streams.get_mut(stream) else {
            return Ok(false);
        };
        let group_state = state.group_mut(stream, group)?;
        Ok(group_state.pending.remove(id).is_some())
    }

    async fn delete(&self, stream: &str, id: &EntryId) -> Result<bool> {
        let mut streams = self.streams.write().await;
        let Some(state) = streams.get_mut(stream) else {
            return Ok(false);
        };
        Ok(state.entries.remove(id).is_some())
    }

    async fn len(&self, stream: &str) -> Result<u64> {
        let streams = self.streams.read().await;
        Ok(streams
            .get(stream)
            .map(|state| state.entries.len() as u64)
            .unwrap_or(0))
    }
}
