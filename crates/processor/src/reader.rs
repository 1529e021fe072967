//! Reads newly appended entries for this consumer.

use std::time::Duration;

use order_stream::{EntryId, OrderStream, StreamEntry};

use crate::Result;
use crate::config::ProcessorConfig;
use crate::error::within;

/// Reads up to `config.read_batch_size` new entries into this consumer's
/// pending list, then claims them explicitly.
///
/// The read itself already makes this consumer the owner; the follow-up claim
/// resets the idle clock right before digestion so a slow read does not make
/// the entries look abandoned to other consumers. An empty read returns an
/// empty batch without claiming.
#[tracing::instrument(skip_all, fields(stream = %config.stream, consumer = %config.consumer))]
pub async fn read_new<S>(stream: &S, config: &ProcessorConfig) -> Result<Vec<StreamEntry>>
where
    S: OrderStream + ?Sized,
{
    // The read may legitimately block for read_block, so its deadline is
    // stretched by that much.
    let read_deadline = config.read_block + config.call_timeout;
    let read = within(
        "read new",
        read_deadline,
        stream.read_new(
            &config.stream,
            &config.group,
            &config.consumer,
            config.read_batch_size,
            config.read_block,
        ),
    )
    .await?;

    if read.is_empty() {
        tracing::debug!("no new entries");
        return Ok(read);
    }

    let ids: Vec<EntryId> = read.iter().map(|entry| entry.id).collect();
    let claimed = within(
        "claim",
        config.call_timeout,
        stream.claim(
            &config.stream,
            &config.group,
            &config.consumer,
            Duration::ZERO,
            &ids,
        ),
    )
    .await?;

    tracing::info!(read = read.len(), claimed = claimed.len(), "read new entries");
    metrics::counter!("processor_entries_read_total").increment(claimed.len() as u64);
    Ok(claimed)
}
