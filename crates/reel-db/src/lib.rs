//! Relational persistence for videos, renditions, and transcoding jobs.
//!
//! Repositories own raw SQL against Postgres. The job table doubles as the
//! durable queue substrate: `JobRepository::claim_next` hands out work with
//! `FOR UPDATE SKIP LOCKED`, and `pg_notify` wakes workers on enqueue.

pub mod jobs;
pub mod outputs;
pub mod videos;

pub use jobs::{JobRepository, QueueStats, JOB_NOTIFY_CHANNEL};
pub use outputs::{NewOutput, OutputRepository};
pub use videos::{NewVideo, VideoRepository};
