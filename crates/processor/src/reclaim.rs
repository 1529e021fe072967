//! Takes over entries abandoned on other consumers' pending lists.

use order_stream::{EntryId, EntryRange, OrderStream, PendingEntry, StreamEntry};

use crate::Result;
use crate::config::ProcessorConfig;
use crate::error::within;

/// Claims pending entries that have been idle for at least
/// `config.reclaim_min_idle` and returns them for digestion.
///
/// At most `config.reclaim_batch_size` entries are claimed per call.
/// A failure to list the pending entries is an error; a failure to claim one
/// entry is logged and the remaining entries are still attempted. Entries
/// another consumer acknowledged or claimed in the meantime are skipped.
#[tracing::instrument(skip_all, fields(stream = %config.stream, consumer = %config.consumer))]
pub async fn reclaim<S>(stream: &S, config: &ProcessorConfig) -> Result<Vec<StreamEntry>>
where
    S: OrderStream + ?Sized,
{
    let candidates = idle_pending(stream, config).await?;

    let mut reclaimed = Vec::new();
    for entry in candidates {
        let claimed = within(
            "claim",
            config.call_timeout,
            stream.claim(
                &config.stream,
                &config.group,
                &config.consumer,
                config.reclaim_min_idle,
                std::slice::from_ref(&entry.id),
            ),
        )
        .await;

        match claimed {
            Ok(claimed) if claimed.is_empty() => {
                tracing::debug!(entry_id = %entry.id, "entry no longer claimable");
            }
            Ok(claimed) => {
                tracing::info!(
                    entry_id = %entry.id,
                    previous_owner = %entry.consumer,
                    idle_ms = entry.idle.as_millis() as u64,
                    delivery_count = entry.delivery_count,
                    "reclaimed entry"
                );
                reclaimed.extend(claimed);
            }
            Err(e) => {
                tracing::warn!(entry_id = %entry.id, error = %e, "failed to claim pending entry");
            }
        }
    }

    metrics::counter!("processor_entries_reclaimed_total").increment(reclaimed.len() as u64);
    Ok(reclaimed)
}

/// Pages through the pending list, oldest first, collecting up to
/// `config.reclaim_batch_size` entries idle for at least
/// `config.reclaim_min_idle`.
///
/// Young entries at the head of the list do not hide idle ones behind them:
/// the scan continues past each page until enough idle entries are found or
/// the list is exhausted.
async fn idle_pending<S>(stream: &S, config: &ProcessorConfig) -> Result<Vec<PendingEntry>>
where
    S: OrderStream + ?Sized,
{
    let limit = config.reclaim_batch_size;
    let mut range = EntryRange::full();
    let mut idle = Vec::with_capacity(limit);

    loop {
        let page = within(
            "list pending",
            config.call_timeout,
            stream.list_pending(&config.stream, &config.group, range, limit),
        )
        .await?;

        let exhausted = page.len() < limit;
        let Some(last) = page.last().map(|entry| entry.id) else {
            break;
        };
        idle.extend(
            page.into_iter()
                .filter(|entry| entry.idle >= config.reclaim_min_idle),
        );

        if idle.len() >= limit || exhausted || last == EntryId::max() {
            break;
        }
        range.start = last.next();
    }

    idle.truncate(limit);
    Ok(idle)
}
