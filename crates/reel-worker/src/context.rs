//! Job handler context trait
//!
//! The API process implements this trait for its application state. The
//! worker pool calls `dispatch_job` for each claimed job; the implementation
//! routes to the transcoding pipeline.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::{Arc, Weak};
use tokio_util::sync::CancellationToken;

use reel_core::models::{JobResult, TranscodingJob};

/// Context for job dispatch.
///
/// The worker pool holds a weak reference so the queue never keeps the
/// application state alive on its own.
#[async_trait]
pub trait JobHandlerContext: Send + Sync {
    /// Execute a claimed job to completion and return its result. Cancellation
    /// must abort the underlying FFmpeg subprocess.
    async fn dispatch_job(
        self: Arc<Self>,
        job: &TranscodingJob,
        cancel: CancellationToken,
    ) -> Result<JobResult>;
}

/// Placeholder context used when no real context exists yet (e.g. during
/// startup wiring). Dispatch always errors.
struct NoopContext;

#[async_trait]
impl JobHandlerContext for NoopContext {
    async fn dispatch_job(
        self: Arc<Self>,
        _job: &TranscodingJob,
        _cancel: CancellationToken,
    ) -> Result<JobResult> {
        Err(anyhow!("NoopContext: no handler context available"))
    }
}

/// Returns a weak reference to a no-op context for use before the real
/// application state exists.
pub fn empty_context_weak() -> Weak<dyn JobHandlerContext> {
    let n: Arc<dyn JobHandlerContext> = Arc::new(NoopContext);
    Arc::downgrade(&n)
}
