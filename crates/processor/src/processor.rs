//! One consumer of the order stream.

use std::time::Instant;

use domain::OrderStore;
use order_stream::{GroupStart, OrderStream, StreamEntry};

use crate::config::ProcessorConfig;
use crate::digest::{DigestReport, digest};
use crate::error::within;
use crate::{Result, reader, reclaim};

/// Outcome of one scheduler tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Entries taken over from other consumers' pending lists.
    pub reclaimed: usize,
    /// New entries read and claimed.
    pub read: usize,
    /// Combined digest counts for both batches.
    pub digest: DigestReport,
    /// Phases that failed this tick, in the order they ran.
    pub failed_phases: Vec<&'static str>,
}

impl TickReport {
    /// Returns true if every phase succeeded.
    pub fn is_clean(&self) -> bool {
        self.failed_phases.is_empty()
            && self.digest.ack_failures == 0
            && self.digest.delete_failures == 0
    }
}

/// Drives reclamation, reading and digestion for one consumer.
///
/// Owns its stream and store clients; both are constructed by the caller and
/// released when the processor is dropped.
pub struct OrderProcessor<S, O> {
    stream: S,
    store: O,
    config: ProcessorConfig,
}

impl<S, O> OrderProcessor<S, O>
where
    S: OrderStream,
    O: OrderStore,
{
    /// Creates a processor, rejecting an invalid configuration.
    pub fn new(stream: S, store: O, config: ProcessorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            stream,
            store,
            config,
        })
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn stream(&self) -> &S {
        &self.stream
    }

    pub fn store(&self) -> &O {
        &self.store
    }

    /// Creates the consumer group, starting from the beginning of the stream.
    ///
    /// Succeeds if the group already exists.
    pub async fn ensure_group(&self) -> Result<()> {
        within(
            "create group",
            self.config.call_timeout,
            self.stream.create_group(
                &self.config.stream,
                &self.config.group,
                GroupStart::Beginning,
            ),
        )
        .await
    }

    pub async fn reclaim(&self) -> Result<Vec<StreamEntry>> {
        reclaim::reclaim(&self.stream, &self.config).await
    }

    pub async fn read_new(&self) -> Result<Vec<StreamEntry>> {
        reader::read_new(&self.stream, &self.config).await
    }

    pub async fn digest(&self, entries: &[StreamEntry]) -> Result<DigestReport> {
        digest(&self.stream, &self.store, &self.config, entries).await
    }

    /// Runs one cycle: reclaim and digest, then read and digest.
    ///
    /// A failing phase is logged and recorded in the report; it never stops
    /// the later phases or the scheduler.
    #[tracing::instrument(skip(self), fields(consumer = %self.config.consumer))]
    pub async fn tick(&self) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::default();

        match self.reclaim().await {
            Ok(entries) => {
                report.reclaimed = entries.len();
                self.digest_into(&mut report, &entries, "digest reclaimed")
                    .await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "reclaim failed");
                report.failed_phases.push("reclaim");
            }
        }

        match self.read_new().await {
            Ok(entries) => {
                report.read = entries.len();
                self.digest_into(&mut report, &entries, "digest read").await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "reading new entries failed");
                report.failed_phases.push("read");
            }
        }

        metrics::counter!("processor_ticks_total").increment(1);
        metrics::histogram!("processor_tick_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        tracing::info!(
            reclaimed = report.reclaimed,
            read = report.read,
            matched = report.digest.matched,
            poison = report.digest.poison,
            failed_phases = report.failed_phases.len(),
            "tick complete"
        );
        report
    }

    async fn digest_into(
        &self,
        report: &mut TickReport,
        entries: &[StreamEntry],
        phase: &'static str,
    ) {
        if entries.is_empty() {
            return;
        }
        match self.digest(entries).await {
            Ok(digested) => report.digest.merge(&digested),
            Err(e) => {
                tracing::warn!(error = %e, phase, "digest failed, entries stay pending");
                report.failed_phases.push(phase);
            }
        }
    }
}
