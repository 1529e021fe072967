//! Fixed-interval driver for an [`OrderProcessor`].

use std::sync::Arc;
use std::time::Duration;

use domain::OrderStore;
use order_stream::OrderStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::processor::{OrderProcessor, TickReport};

/// Runs processor ticks on the configured interval until told to stop.
///
/// The first tick runs immediately. A tick that overruns the interval delays
/// the next one instead of triggering a burst of catch-up ticks. Shutdown is
/// only observed between ticks; a tick in progress always runs to completion.
pub struct Scheduler<S, O> {
    processor: Arc<OrderProcessor<S, O>>,
}

impl<S, O> Clone for Scheduler<S, O> {
    fn clone(&self) -> Self {
        Self {
            processor: Arc::clone(&self.processor),
        }
    }
}

impl<S, O> Scheduler<S, O>
where
    S: OrderStream + 'static,
    O: OrderStore + 'static,
{
    pub fn new(processor: OrderProcessor<S, O>) -> Self {
        Self {
            processor: Arc::new(processor),
        }
    }

    pub fn processor(&self) -> &OrderProcessor<S, O> {
        &self.processor
    }

    /// Runs a single cycle.
    pub async fn tick(&self) -> TickReport {
        self.processor.tick().await
    }

    /// Ticks until `shutdown` carries `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let period = self.processor.config().tick_interval;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_secs = period.as_secs(), "scheduler started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    self.processor.tick().await;
                }
            }
        }

        tracing::info!("scheduler stopped");
    }

    /// Starts the scheduler on its own task.
    pub fn spawn(self) -> SchedulerHandle {
        let (shutdown, receiver) = watch::channel(false);
        let task = tokio::spawn(async move { self.run(receiver).await });
        SchedulerHandle { shutdown, task }
    }
}

/// Handle to a spawned [`Scheduler`].
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stops the scheduler, waiting up to `grace` for an in-flight tick.
    ///
    /// Returns `true` if the scheduler stopped on its own, `false` if it was
    /// aborted after the grace period.
    pub async fn shutdown(mut self, grace: Duration) -> bool {
        let _ = self.shutdown.send(true);

        match tokio::time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "scheduler task failed");
                true
            }
            Err(_) => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "scheduler did not stop in time, aborting"
                );
                self.task.abort();
                false
            }
        }
    }

    /// Returns true once the scheduler task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
