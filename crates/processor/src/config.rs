//! Processor configuration.

use std::time::Duration;

use thiserror::Error;

/// Shortest tick interval the scheduler accepts.
///
/// Keeps a misconfigured deployment from hammering the stream and the store.
pub const MIN_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// Errors raised when validating a [`ProcessorConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required setting is missing or blank.
    #[error("{0} must be set")]
    Missing(&'static str),

    /// A setting could not be parsed.
    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// The tick interval is below the enforced minimum.
    #[error("tick interval {interval:?} is below the minimum of {minimum:?}")]
    IntervalTooShort {
        interval: Duration,
        minimum: Duration,
    },

    /// A batch size or timeout that must be positive is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Settings for one consumer of the order stream.
///
/// `stream`, `group` and `consumer` identify where entries come from and who
/// owns them once delivered; the rest bound how much work a single tick does.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Stream key the work items are appended to.
    pub stream: String,

    /// Consumer group shared by all processor instances.
    pub group: String,

    /// This instance's consumer name within the group.
    pub consumer: String,

    /// Time between scheduler ticks.
    pub tick_interval: Duration,

    /// Maximum pending entries inspected per reclamation pass.
    pub reclaim_batch_size: usize,

    /// Minimum time an entry must sit unacknowledged before another consumer
    /// may reclaim it.
    pub reclaim_min_idle: Duration,

    /// Maximum new entries read per tick.
    pub read_batch_size: usize,

    /// How long a read waits for new entries.
    pub read_block: Duration,

    /// Deadline for each individual stream or store call.
    pub call_timeout: Duration,

    /// How long shutdown waits for an in-flight tick before aborting it.
    pub shutdown_grace: Duration,
}

impl ProcessorConfig {
    /// Creates a configuration with default tuning for the given consumer.
    pub fn new(
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
    ) -> Self {
        Self {
            stream: stream.into(),
            group: group.into(),
            consumer: consumer.into(),
            tick_interval: MIN_TICK_INTERVAL,
            reclaim_batch_size: 10,
            reclaim_min_idle: Duration::from_secs(30),
            read_batch_size: 100,
            read_block: Duration::from_secs(5),
            call_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(10),
        }
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_reclaim_batch_size(mut self, size: usize) -> Self {
        self.reclaim_batch_size = size;
        self
    }

    pub fn with_reclaim_min_idle(mut self, idle: Duration) -> Self {
        self.reclaim_min_idle = idle;
        self
    }

    pub fn with_read_batch_size(mut self, size: usize) -> Self {
        self.read_batch_size = size;
        self
    }

    pub fn with_read_block(mut self, block: Duration) -> Self {
        self.read_block = block;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Checks that the configuration is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stream.trim().is_empty() {
            return Err(ConfigError::Missing("stream"));
        }
        if self.group.trim().is_empty() {
            return Err(ConfigError::Missing("group"));
        }
        if self.consumer.trim().is_empty() {
            return Err(ConfigError::Missing("consumer"));
        }
        if self.tick_interval < MIN_TICK_INTERVAL {
            return Err(ConfigError::IntervalTooShort {
                interval: self.tick_interval,
                minimum: MIN_TICK_INTERVAL,
            });
        }
        if self.reclaim_batch_size == 0 {
            return Err(ConfigError::Zero("reclaim batch size"));
        }
        if self.read_batch_size == 0 {
            return Err(ConfigError::Zero("read batch size"));
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::Zero("call timeout"));
        }
        Ok(())
    }
}
