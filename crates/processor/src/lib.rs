//! Consumer-side order pipeline.
//!
//! This crate turns stream entries into order status transitions:
//! - [`reclaim`] takes over entries stuck on other consumers' pending lists
//! - [`read_new`] reads and claims freshly appended entries
//! - [`digest`] moves the referenced orders from `PENDING` to `PROCESSING`,
//!   then acknowledges and deletes the entries
//! - [`Scheduler`] runs the three on a fixed interval
//!
//! The store update for a batch always completes before any entry in that
//! batch is acknowledged, and acknowledgment always precedes deletion.

pub mod config;
pub mod digest;
pub mod error;
pub mod intake;
pub mod processor;
pub mod reader;
pub mod reclaim;
pub mod scheduler;

pub use config::{ConfigError, MIN_TICK_INTERVAL, ProcessorConfig};
pub use digest::{DigestReport, ORDER_ID_FIELD, digest, extract_order_id};
pub use error::{ProcessorError, Result};
pub use intake::OrderIntake;
pub use processor::{OrderProcessor, TickReport};
pub use reader::read_new;
pub use reclaim::reclaim;
pub use scheduler::{Scheduler, SchedulerHandle};
