//! Turns a batch of stream entries into order status transitions.

use std::collections::BTreeSet;

use chrono::Utc;
use common::OrderId;
use domain::{OrderStatus, OrderStore};
use order_stream::{OrderStream, StreamEntry};

use crate::Result;
use crate::config::ProcessorConfig;
use crate::error::within;

/// Field carrying the order id on every work item.
pub const ORDER_ID_FIELD: &str = "order_id";

/// Extracts the order id an entry refers to.
///
/// Returns `None` if the field is missing or is not a valid id.
pub fn extract_order_id(entry: &StreamEntry) -> Option<OrderId> {
    entry.field(ORDER_ID_FIELD)?.parse().ok()
}

/// Outcome of digesting one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigestReport {
    /// Entries in the batch.
    pub entries: usize,
    /// Orders actually moved from `PENDING` to `PROCESSING` by this batch.
    pub matched: u64,
    /// Entries without a usable order id.
    pub poison: usize,
    /// Entries removed from the pending list.
    pub acknowledged: usize,
    /// Entries removed from the stream.
    pub deleted: usize,
    /// Acknowledgments that failed; those entries stay pending for reclaim.
    pub ack_failures: usize,
    /// Deletions that failed after a successful acknowledgment.
    pub delete_failures: usize,
}

impl DigestReport {
    /// Adds another batch's counts to this one.
    pub fn merge(&mut self, other: &DigestReport) {
        self.entries += other.entries;
        self.matched += other.matched;
        self.poison += other.poison;
        self.acknowledged += other.acknowledged;
        self.deleted += other.deleted;
        self.ack_failures += other.ack_failures;
        self.delete_failures += other.delete_failures;
    }
}

/// Processes a batch of entries owned by this consumer.
///
/// 1. Collects the distinct order ids the batch refers to. Entries without a
///    valid id are poison: they are logged and retired with the rest.
/// 2. Moves all referenced `PENDING` orders to `PROCESSING` in one store call.
///    If that call fails the whole batch is left pending and the error is
///    returned, so reclamation retries it later.
/// 3. Acknowledges each entry, then deletes it. An entry whose acknowledgment
///    fails is not deleted.
///
/// Per-entry acknowledgment and deletion failures are counted in the report,
/// not returned as errors.
#[tracing::instrument(skip_all, fields(stream = %config.stream, batch = entries.len()))]
pub async fn digest<S, O>(
    stream: &S,
    store: &O,
    config: &ProcessorConfig,
    entries: &[StreamEntry],
) -> Result<DigestReport>
where
    S: OrderStream + ?Sized,
    O: OrderStore + ?Sized,
{
    let mut report = DigestReport {
        entries: entries.len(),
        ..DigestReport::default()
    };
    if entries.is_empty() {
        return Ok(report);
    }

    let mut order_ids = BTreeSet::new();
    for entry in entries {
        match extract_order_id(entry) {
            Some(id) => {
                order_ids.insert(id);
            }
            None => {
                report.poison += 1;
                tracing::warn!(
                    entry_id = %entry.id,
                    order_id = entry.field(ORDER_ID_FIELD).unwrap_or_default(),
                    "discarding entry without a valid order id"
                );
            }
        }
    }

    debug_assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Processing));
    if !order_ids.is_empty() {
        let ids: Vec<OrderId> = order_ids.into_iter().collect();
        let transitioned = within(
            "transition status",
            config.call_timeout,
            store.transition_status(
                &ids,
                OrderStatus::Pending,
                OrderStatus::Processing,
                Utc::now(),
            ),
        )
        .await;

        match transitioned {
            Ok(count) => report.matched = count,
            Err(e) => {
                metrics::counter!("processor_update_failures_total").increment(1);
                tracing::error!(error = %e, orders = ids.len(), "order status update failed");
                return Err(e);
            }
        }
    }

    for entry in entries {
        let acked = within(
            "acknowledge",
            config.call_timeout,
            stream.acknowledge(&config.stream, &config.group, &entry.id),
        )
        .await;

        match acked {
            Ok(true) => report.acknowledged += 1,
            Ok(false) => {
                tracing::debug!(entry_id = %entry.id, "entry was already acknowledged");
            }
            Err(e) => {
                report.ack_failures += 1;
                tracing::warn!(entry_id = %entry.id, error = %e, "failed to acknowledge entry");
                continue;
            }
        }

        match within(
            "delete",
            config.call_timeout,
            stream.delete(&config.stream, &entry.id),
        )
        .await
        {
            Ok(true) => report.deleted += 1,
            Ok(false) => {}
            Err(e) => {
                report.delete_failures += 1;
                tracing::warn!(entry_id = %entry.id, error = %e, "failed to delete entry");
            }
        }
    }

    metrics::counter!("processor_orders_transitioned_total").increment(report.matched);
    metrics::counter!("processor_poison_entries_total").increment(report.poison as u64);
    metrics::counter!("processor_ack_failures_total").increment(report.ack_failures as u64);
    metrics::counter!("processor_delete_failures_total").increment(report.delete_failures as u64);

    tracing::info!(
        matched = report.matched,
        acknowledged = report.acknowledged,
        deleted = report.deleted,
        poison = report.poison,
        "digested batch"
    );

    Ok(report)
}
