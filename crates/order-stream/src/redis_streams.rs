use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client, Value};

use crate::{
    EntryId, EntryRange, PendingEntry, Result, StreamEntry, StreamError,
    stream::{GroupStart, OrderStream},
};

/// Redis Streams backed implementation.
///
/// Uses two connection managers: one shared by the short commands
/// (`XADD`, `XCLAIM`, `XACK`, `XDEL`, ...) and one reserved for blocking
/// `XREADGROUP` calls, so a read waiting on its block timeout never holds up
/// acknowledgments queued behind it on a multiplexed connection.
#[derive(Clone)]
pub struct RedisOrderStream {
    commands: ConnectionManager,
    reader: ConnectionManager,
}

impl RedisOrderStream {
    /// Connects to Redis at `redis_url` (e.g. `redis://127.0.0.1:6379`).
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let commands = ConnectionManager::new(client.clone()).await?;
        let reader = ConnectionManager::new(client).await?;

        tracing::info!("connected to redis");
        Ok(Self { commands, reader })
    }

    /// Sends a `PING` to verify the connection is usable.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.commands.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn parse_id(raw: &str) -> Result<EntryId> {
        raw.parse()
            .map_err(|_| StreamError::MalformedReply(format!("unexpected entry id {raw:?}")))
    }

    fn to_entry(stream_id: &StreamId) -> Result<StreamEntry> {
        let id = Self::parse_id(&stream_id.id)?;
        let mut fields = BTreeMap::new();
        for (name, value) in &stream_id.map {
            let value = match value {
                Value::BulkString(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                Value::SimpleString(s) => s.clone(),
                Value::Int(n) => n.to_string(),
                other => {
                    return Err(StreamError::MalformedReply(format!(
                        "unexpected value for field {name:?} on entry {id}: {other:?}"
                    )));
                }
            };
            fields.insert(name.clone(), value);
        }
        Ok(StreamEntry::new(id, fields))
    }

    fn millis(duration: Duration) -> usize {
        usize::try_from(duration.as_millis()).unwrap_or(usize::MAX)
    }
}

fn is_busy_group(err: &redis::RedisError) -> bool {
    err.code() == Some("BUSYGROUP")
}

fn is_no_group(err: &redis::RedisError) -> bool {
    err.code() == Some("NOGROUP")
}

#[async_trait]
impl OrderStream for RedisOrderStream {
    async fn append(&self, stream: &str, fields: &[(&str, &str)]) -> Result<EntryId> {
        let mut conn = self.commands.clone();
        let id: String = conn.xadd(stream, "*", fields).await?;
        Self::parse_id(&id)
    }

    async fn create_group(&self, stream: &str, group: &str, start: GroupStart) -> Result<()> {
        let mut conn = self.commands.clone();
        let result: redis::RedisResult<()> = conn
            .xgroup_create_mkstream(stream, group, start.as_redis_id())
            .await;

        match result {
            Ok(()) => {
                tracing::info!(stream, group, "created consumer group");
                Ok(())
            }
            Err(e) if is_busy_group(&e) => {
                tracing::debug!(stream, group, "consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>> {
        let mut conn = self.reader.clone();
        let mut options = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);
        if !block.is_zero() {
            options = options.block(Self::millis(block));
        }

        // A block timeout comes back as a nil reply.
        let reply: Option<StreamReadReply> = conn
            .xread_options(&[stream], &[">"], &options)
            .await
            .map_err(|e| {
                if is_no_group(&e) {
                    StreamError::GroupNotFound {
                        stream: stream.to_string(),
                        group: group.to_string(),
                    }
                } else {
                    StreamError::Redis(e)
                }
            })?;

        let Some(reply) = reply else {
            return Ok(Vec::new());
        };
        reply
            .keys
            .iter()
            .flat_map(|key| key.ids.iter())
            .map(Self::to_entry)
            .collect()
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        range: EntryRange,
        limit: usize,
    ) -> Result<Vec<PendingEntry>> {
        let mut conn = self.commands.clone();
        let (start, end) = range.bounds();
        let reply: StreamPendingCountReply = conn
            .xpending_count(stream, group, start, end, limit)
            .await
            .map_err(|e| {
                if is_no_group(&e) {
                    StreamError::GroupNotFound {
                        stream: stream.to_string(),
                        group: group.to_string(),
                    }
                } else {
                    StreamError::Redis(e)
                }
            })?;

        reply
            .ids
            .into_iter()
            .map(|pending| {
                Ok(PendingEntry {
                    id: Self::parse_id(&pending.id)?,
                    consumer: pending.consumer,
                    idle: Duration::from_millis(pending.last_delivered_ms as u64),
                    delivery_count: pending.times_delivered as u64,
                })
            })
            .collect()
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<StreamEntry>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.commands.clone();
        let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let reply: StreamClaimReply = conn
            .xclaim(stream, group, consumer, Self::millis(min_idle), ids.as_slice())
            .await?;

        reply.ids.iter().map(Self::to_entry).collect()
    }

    async fn acknowledge(&self, stream: &str, group: &str, id: &EntryId) -> Result<bool> {
        let mut conn = self.commands.clone();
        let acked: i64 = conn.xack(stream, group, &[id.to_string()]).await?;
        Ok(acked > 0)
    }

    async fn delete(&self, stream: &str, id: &EntryId) -> Result<bool> {
        let mut conn = self.commands.clone();
        let deleted: i64 = conn.xdel(stream, &[id.to_string()]).await?;
        Ok(deleted > 0)
    }

    async fn len(&self, stream: &str) -> Result<u64> {
        let mut conn = self.commands.clone();
        let len: u64 = conn.xlen(stream).await?;
        Ok(len)
    }
}
