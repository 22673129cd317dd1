//! Job queue worker pool and producer.
//!
//! The queue is durable in Postgres (the `transcoding_jobs` table); this
//! crate adds dispatch on top: LISTEN/NOTIFY wake-up with polling fallback,
//! a bounded worker pool, retry scheduling with exponential backoff, and the
//! stale reaper that realizes the visibility-timeout contract.

pub mod context;
pub mod producer;
pub mod queue;

pub use context::{empty_context_weak, JobHandlerContext};
pub use producer::Producer;
pub use queue::{compute_retry_backoff_seconds, JobQueue, JobQueueConfig};
