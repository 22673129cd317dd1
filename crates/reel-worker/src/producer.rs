//! Transcode job submission.

use anyhow::{Context, Result};
use uuid::Uuid;

use reel_core::models::{JobData, JobType, Priority, TranscodingJob};
use reel_db::JobRepository;

/// Enqueues transcode jobs with deterministic de-duplication.
///
/// Fresh uploads create their job inside the upload transaction
/// (`VideoRepository::create_video_and_job`); this producer covers explicit
/// re-submissions, where the deterministic `transcode-{video_id}` key makes a
/// duplicate submission return the existing live job instead of scheduling a
/// second one.
#[derive(Clone)]
pub struct Producer {
    jobs: JobRepository,
    max_attempts: i32,
}

impl Producer {
    pub fn new(jobs: JobRepository, max_attempts: i32) -> Self {
        Self { jobs, max_attempts }
    }

    /// Submit a transcode for a video. Returns the job and whether it was
    /// newly created; `false` means an identical live job already existed.
    #[tracing::instrument(skip(self))]
    pub async fn submit_transcode(
        &self,
        video_id: Uuid,
        input_path: String,
        resolutions: Vec<String>,
        priority: Priority,
    ) -> Result<(TranscodingJob, bool)> {
        let data = JobData {
            input_path,
            requested_resolutions: resolutions,
            progress: None,
        };

        let (job, created) = self
            .jobs
            .enqueue(video_id, JobType::HlsTranscode, &data, priority, self.max_attempts)
            .await
            .context("Queue unavailable")?;

        if created {
            tracing::info!(video_id = %video_id, job_id = %job.id, "Transcode job submitted");
        }

        Ok((job, created))
    }
}
