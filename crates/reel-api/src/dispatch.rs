//! Job dispatch: routes claimed queue jobs into the transcoding pipeline.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use reel_core::models::{JobResult, JobType, TranscodingJob};
use reel_worker::JobHandlerContext;

use crate::state::AppState;

#[async_trait]
impl JobHandlerContext for AppState {
    async fn dispatch_job(
        self: Arc<Self>,
        job: &TranscodingJob,
        cancel: CancellationToken,
    ) -> Result<JobResult> {
        match job.job_type {
            JobType::HlsTranscode => self.pipeline.run(job, cancel).await,
            // Queue name reserved; nothing produces these jobs today.
            JobType::Thumbnail => Err(anyhow!("Thumbnail jobs are not dispatched")),
        }
    }
}
