//! Job queue: worker pool, LISTEN/NOTIFY or polling, retry, stale reaping.
//!
//! Shutdown: [`JobQueue::shutdown`] cancels the shared token and signals the
//! pool to stop claiming. In-flight FFmpeg subprocesses observe the token and
//! abort; their jobs reappear after the visibility timeout.

use anyhow::Result;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use reel_core::models::{TranscodingJob, VideoStatus};
use reel_db::{JobRepository, QueueStats, VideoRepository, JOB_NOTIFY_CHANNEL};

use crate::context::JobHandlerContext;

/// Maximum delay in seconds before retrying a failed job. Caps exponential
/// backoff so that high attempt counts do not produce excessively long delays.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 300;

/// Computes backoff in seconds for the attempt that just failed
/// (exponential with cap). `attempt` is 1-based.
#[inline]
pub fn compute_retry_backoff_seconds(base_delay_secs: u64, attempt: i32) -> u64 {
    let exponent = attempt.max(1) as u32 - 1;
    base_delay_secs
        .saturating_mul(2_u64.saturating_pow(exponent))
        .min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Clone)]
pub struct JobQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    /// Base of the exponential retry backoff, in seconds.
    pub retry_base_delay_secs: u64,
    /// PROCESSING jobs older than this are reaped as abandoned.
    pub visibility_timeout_secs: i64,
    /// Interval between runs of the retry pump and the stale reaper.
    pub housekeeping_interval_secs: u64,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 2,
            poll_interval_ms: 1000,
            retry_base_delay_secs: 2,
            visibility_timeout_secs: 1800,
            housekeeping_interval_secs: 5,
        }
    }
}

pub struct JobQueue {
    jobs: JobRepository,
    shutdown_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
}

impl JobQueue {
    /// Create a queue and spawn its worker pool.
    ///
    /// If `pool` is `Some`, workers wake via PostgreSQL LISTEN/NOTIFY when a
    /// job is enqueued, in addition to polling at `poll_interval_ms`.
    pub fn new(
        jobs: JobRepository,
        videos: VideoRepository,
        config: JobQueueConfig,
        context: Weak<dyn JobHandlerContext>,
        pool: Option<sqlx::PgPool>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let jobs_clone = jobs.clone();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            Self::worker_pool(
                jobs_clone,
                videos,
                config,
                context,
                shutdown_rx,
                pool,
                cancel_clone,
            )
            .await;
        });

        Self {
            jobs,
            shutdown_tx,
            cancel,
        }
    }

    /// Queue observability counters.
    pub async fn stats(&self) -> Result<QueueStats> {
        self.jobs.stats().await
    }

    #[allow(clippy::too_many_arguments)]
    async fn worker_pool(
        jobs: JobRepository,
        videos: VideoRepository,
        config: JobQueueConfig,
        context: Weak<dyn JobHandlerContext>,
        mut shutdown_rx: mpsc::Receiver<()>,
        pool: Option<sqlx::PgPool>,
        cancel: CancellationToken,
    ) {
        let worker_id = format!("worker-{}", Uuid::new_v4());
        let use_listen = pool.is_some();
        tracing::info!(
            worker_id = %worker_id,
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = use_listen,
            "Job queue worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers));
        let poll_interval = Duration::from_millis(config.poll_interval_ms);

        // Channel to wake the main loop when LISTEN receives a NOTIFY
        // (avoids blocking on recv when no pool is configured).
        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            let tx = notify_tx.clone();
            let listener_cancel = cancel.clone();
            tokio::spawn(async move {
                loop {
                    if listener_cancel.is_cancelled() {
                        break;
                    }
                    match sqlx::postgres::PgListener::connect_with(&pool).await {
                        Ok(mut listener) => {
                            if let Err(e) = listener.listen(JOB_NOTIFY_CHANNEL).await {
                                tracing::warn!(error = %e, "LISTEN failed, will retry");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                                continue;
                            }
                            while listener.recv().await.is_ok() {
                                let _ = tx.send(()).await;
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "PgListener connect failed, will retry");
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            });
        }

        // Housekeeping: move due retries back to the ready set and reap jobs
        // whose worker died past the visibility timeout.
        let (housekeeping_shutdown_tx, mut housekeeping_shutdown_rx) = mpsc::channel::<()>(1);
        {
            let jobs_for_housekeeping = jobs.clone();
            let interval_secs = config.housekeeping_interval_secs.max(1);
            let visibility_timeout = config.visibility_timeout_secs;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
                interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            if let Err(e) = jobs_for_housekeeping.requeue_due_retries().await {
                                tracing::error!(error = %e, "Retry pump failed");
                            }
                            if let Err(e) = jobs_for_housekeeping.reap_stale(visibility_timeout).await {
                                tracing::error!(error = %e, "Stale job reaper failed");
                            }
                        }
                        _ = housekeeping_shutdown_rx.recv() => break,
                    }
                }
            });
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Job queue worker pool shutting down");
                    let _ = housekeeping_shutdown_tx.send(()).await;
                    break;
                }
                _ = notify_rx.recv() => {
                    Self::claim_and_dispatch_one(
                        &jobs, &videos, &config, &worker_id, &semaphore, &context, &cancel,
                    ).await;
                }
                _ = sleep(poll_interval) => {
                    Self::claim_and_dispatch_one(
                        &jobs, &videos, &config, &worker_id, &semaphore, &context, &cancel,
                    ).await;
                }
            }
        }

        tracing::info!("Job queue worker pool stopped");
    }

    #[allow(clippy::too_many_arguments)]
    async fn claim_and_dispatch_one(
        jobs: &JobRepository,
        videos: &VideoRepository,
        config: &JobQueueConfig,
        worker_id: &str,
        semaphore: &Arc<Semaphore>,
        context: &Weak<dyn JobHandlerContext>,
        cancel: &CancellationToken,
    ) {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match jobs.claim_next(worker_id).await {
            Ok(Some(job)) => {
                let jobs = jobs.clone();
                let videos = videos.clone();
                let context = context.clone();
                let config = config.clone();
                let job_cancel = cancel.child_token();

                tokio::spawn(async move {
                    let _permit = permit;
                    Self::process_job(job, jobs, videos, config, context, job_cancel).await;
                });
            }
            Ok(None) => {
                drop(permit);
                tracing::trace!("No jobs available in queue");
            }
            Err(e) => {
                drop(permit);
                tracing::error!(error = %e, "Failed to claim job from queue");
            }
        }
    }

    /// Execute one claimed job and drive the retry state machine on failure.
    #[tracing::instrument(skip_all, fields(job_id = %job.id, video_id = %job.video_id, attempt = job.attempt_count))]
    async fn process_job(
        job: TranscodingJob,
        jobs: JobRepository,
        videos: VideoRepository,
        config: JobQueueConfig,
        context: Weak<dyn JobHandlerContext>,
        cancel: CancellationToken,
    ) {
        let Some(ctx) = context.upgrade() else {
            tracing::error!("Handler context dropped, releasing job to visibility timeout");
            return;
        };

        // Stay under the visibility timeout so the worker's own failure
        // handling always runs before the reaper can requeue the job.
        let budget_secs = (config.visibility_timeout_secs - 60).max(60) as u64;
        let timeout = Duration::from_secs(budget_secs);
        let outcome =
            tokio::time::timeout(timeout, ctx.dispatch_job(&job, cancel.clone())).await;

        // Shutdown: the subprocess was aborted mid-flight. Perform no writes;
        // the stale reaper makes the job visible again.
        if cancel.is_cancelled() {
            tracing::info!("Job cancelled during shutdown, leaving for redelivery");
            return;
        }

        let error = match outcome {
            Ok(Ok(result)) => {
                tracing::info!(
                    outputs = result.outputs.len(),
                    failed_resolutions = result.failed_resolutions.len(),
                    "Job processed successfully"
                );
                return;
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(_) => format!("Job exceeded {}s processing budget", timeout.as_secs()),
        };

        tracing::error!(
            error = %error,
            attempt = job.attempt_count,
            max_attempts = job.max_attempts,
            "Job attempt failed"
        );

        if let Err(e) = videos
            .update_status(job.video_id, VideoStatus::Failed)
            .await
        {
            tracing::error!(error = %e, "Failed to mark video failed");
        }

        if job.can_retry() {
            let delay =
                compute_retry_backoff_seconds(config.retry_base_delay_secs, job.attempt_count);
            match jobs.schedule_retry(job.video_id, &error, delay).await {
                Ok(_) => {
                    // The scheduled retry is the explicit reset back to
                    // PENDING; the next attempt moves it to PROCESSING again.
                    if let Err(e) = videos
                        .update_status(job.video_id, VideoStatus::Pending)
                        .await
                    {
                        tracing::error!(error = %e, "Failed to reset video for retry");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to schedule retry, failing job");
                    if let Err(e) = jobs.mark_failed(job.video_id, &error).await {
                        tracing::error!(error = %e, "Failed to mark job failed");
                    }
                }
            }
        } else if let Err(e) = jobs.mark_failed(job.video_id, &error).await {
            tracing::error!(error = %e, "Failed to mark job failed");
        }
    }

    /// Signal the pool to stop claiming and abort in-flight subprocesses.
    /// Returns immediately; it does not wait for in-flight jobs to unwind.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating job queue shutdown");
        self.cancel.cancel();
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl Clone for JobQueue {
    fn clone(&self) -> Self {
        Self {
            jobs: self.jobs.clone(),
            shutdown_tx: self.shutdown_tx.clone(),
            cancel: self.cancel.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_exponential_then_capped() {
        assert_eq!(compute_retry_backoff_seconds(2, 1), 2);
        assert_eq!(compute_retry_backoff_seconds(2, 2), 4);
        assert_eq!(compute_retry_backoff_seconds(2, 3), 8);
        assert_eq!(compute_retry_backoff_seconds(2, 8), 256);
        assert_eq!(compute_retry_backoff_seconds(2, 9), MAX_RETRY_BACKOFF_SECS);
        assert_eq!(compute_retry_backoff_seconds(2, 20), MAX_RETRY_BACKOFF_SECS);
    }

    #[test]
    fn retry_backoff_respects_base_delay() {
        assert_eq!(compute_retry_backoff_seconds(5, 1), 5);
        assert_eq!(compute_retry_backoff_seconds(5, 2), 10);
        assert_eq!(compute_retry_backoff_seconds(5, 3), 20);
    }

    #[test]
    fn retry_backoff_handles_degenerate_attempts() {
        assert_eq!(compute_retry_backoff_seconds(2, 0), 2);
        assert_eq!(compute_retry_backoff_seconds(2, -3), 2);
    }

    #[test]
    fn default_config_is_sane() {
        let config = JobQueueConfig::default();
        assert!(config.max_workers >= 1);
        assert!(config.visibility_timeout_secs > 0);
        assert!(config.retry_base_delay_secs > 0);
    }
}
