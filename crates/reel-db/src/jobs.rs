use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use reel_core::models::{job_key, JobData, JobProgress, JobResult, JobType, Priority, TranscodingJob};

/// Channel name for PostgreSQL LISTEN/NOTIFY when a job is enqueued.
pub const JOB_NOTIFY_CHANNEL: &str = "reel_new_job";

pub(crate) const JOB_COLUMNS: &str = r#"
    id,
    video_id,
    job_key,
    job_type,
    status,
    priority,
    progress_percentage,
    attempt_count,
    max_attempts,
    job_data,
    result_data,
    error_message,
    worker_id,
    created_at,
    started_at,
    completed_at,
    next_retry_at
"#;

/// Queue observability counters.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub delayed: i64,
}

#[derive(Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Enqueue a transcode job for a video. De-duplicates on the deterministic
    /// job key: if a non-terminal job already exists the existing row is
    /// returned and the boolean is false.
    #[tracing::instrument(skip(self, data))]
    pub async fn enqueue(
        &self,
        video_id: Uuid,
        job_type: JobType,
        data: &JobData,
        priority: Priority,
        max_attempts: i32,
    ) -> Result<(TranscodingJob, bool)> {
        let key = job_key(video_id);

        let existing: Option<TranscodingJob> = sqlx::query_as::<Postgres, TranscodingJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM transcoding_jobs
            WHERE job_key = $1 AND status IN ('queued', 'processing', 'retrying')
            "#
        ))
        .bind(&key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to check for existing job")?;

        if let Some(job) = existing {
            tracing::info!(video_id = %video_id, job_id = %job.id, "Duplicate enqueue, returning existing job");
            return Ok((job, false));
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for enqueue")?;

        let inserted = sqlx::query_as::<Postgres, TranscodingJob>(&format!(
            r#"
            INSERT INTO transcoding_jobs (
                video_id, job_key, job_type, status, priority, max_attempts, job_data
            )
            VALUES ($1, $2, $3, 'queued', $4, $5, $6)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(video_id)
        .bind(&key)
        .bind(&job_type)
        .bind(priority.as_i32())
        .bind(max_attempts)
        .bind(serde_json::to_value(data).context("Failed to serialize job data")?)
        .fetch_one(&mut *tx)
        .await;

        let job = match inserted {
            Ok(job) => job,
            // A concurrent enqueue won the partial unique index race; hand
            // back its row.
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tx.rollback().await.ok();
                let job: Option<TranscodingJob> =
                    sqlx::query_as::<Postgres, TranscodingJob>(&format!(
                        r#"
                        SELECT {JOB_COLUMNS}
                        FROM transcoding_jobs
                        WHERE job_key = $1 AND status IN ('queued', 'processing', 'retrying')
                        "#
                    ))
                    .bind(&key)
                    .fetch_optional(&self.pool)
                    .await
                    .context("Failed to fetch job after unique violation")?;
                let job = job.ok_or_else(|| {
                    anyhow::anyhow!("Concurrent job for {} finished before it could be returned", key)
                })?;
                return Ok((job, false));
            }
            Err(e) => return Err(e).context("Failed to insert transcoding job"),
        };

        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(JOB_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(error = %e, job_id = %job.id, "Failed to notify workers of new job");
        }

        tx.commit().await.context("Failed to commit enqueue")?;

        tracing::info!(
            video_id = %video_id,
            job_id = %job.id,
            priority = priority.as_i32(),
            "Job enqueued"
        );

        Ok((job, true))
    }

    /// Atomically claim the next eligible job: lowest priority number first,
    /// then FIFO. The claim transitions the row to PROCESSING and increments
    /// `attempt_count`, so each dequeue is one attempt.
    #[tracing::instrument(skip(self))]
    pub async fn claim_next(&self, worker_id: &str) -> Result<Option<TranscodingJob>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for claim")?;

        let candidate: Option<Uuid> = sqlx::query_scalar::<Postgres, Uuid>(
            r#"
            SELECT id
            FROM transcoding_jobs
            WHERE status = 'queued'
            ORDER BY priority ASC, created_at ASC
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to select next job")?;

        let Some(id) = candidate else {
            tx.rollback().await.ok();
            return Ok(None);
        };

        let job: TranscodingJob = sqlx::query_as::<Postgres, TranscodingJob>(&format!(
            r#"
            UPDATE transcoding_jobs
            SET status = 'processing',
                started_at = NOW(),
                attempt_count = attempt_count + 1,
                progress_percentage = 0,
                worker_id = $2,
                next_retry_at = NULL
            WHERE id = $1
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(worker_id)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to mark job processing")?;

        tx.commit().await.context("Failed to commit claim")?;

        tracing::debug!(
            job_id = %job.id,
            video_id = %job.video_id,
            attempt = job.attempt_count,
            "Job claimed"
        );

        Ok(Some(job))
    }

    /// Persist a progress snapshot. The percentage is monotonic within an
    /// attempt: writes below the stored value are ignored.
    #[tracing::instrument(skip(self, progress))]
    pub async fn update_progress(&self, video_id: Uuid, progress: &JobProgress) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE transcoding_jobs
            SET progress_percentage = GREATEST(progress_percentage, $2),
                job_data = jsonb_set(job_data, '{progress}', $3)
            WHERE video_id = $1 AND status = 'processing'
            "#,
        )
        .bind(video_id)
        .bind(progress.percent)
        .bind(serde_json::to_value(progress).context("Failed to serialize progress")?)
        .execute(&self.pool)
        .await
        .context("Failed to update job progress")?;

        Ok(())
    }

    #[tracing::instrument(skip(self, result))]
    pub async fn mark_completed(&self, video_id: Uuid, result: &JobResult) -> Result<TranscodingJob> {
        let job: TranscodingJob = sqlx::query_as::<Postgres, TranscodingJob>(&format!(
            r#"
            UPDATE transcoding_jobs
            SET status = 'completed',
                progress_percentage = 100,
                result_data = $2,
                error_message = NULL,
                completed_at = NOW()
            WHERE video_id = $1 AND status = 'processing'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(video_id)
        .bind(serde_json::to_value(result).context("Failed to serialize job result")?)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job completed")?;

        tracing::info!(
            job_id = %job.id,
            video_id = %video_id,
            attempts = job.attempt_count,
            "Job completed"
        );

        Ok(job)
    }

    /// Schedule the next attempt after a recoverable failure. The job parks
    /// in RETRYING until `next_retry_at`, when the retry pump requeues it.
    #[tracing::instrument(skip(self))]
    pub async fn schedule_retry(
        &self,
        video_id: Uuid,
        error: &str,
        delay_secs: u64,
    ) -> Result<TranscodingJob> {
        let job: TranscodingJob = sqlx::query_as::<Postgres, TranscodingJob>(&format!(
            r#"
            UPDATE transcoding_jobs
            SET status = 'retrying',
                error_message = $2,
                next_retry_at = NOW() + ($3 * interval '1 second'),
                worker_id = NULL
            WHERE video_id = $1 AND status = 'processing'
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(video_id)
        .bind(error)
        .bind(delay_secs as i64)
        .fetch_one(&self.pool)
        .await
        .context("Failed to schedule retry")?;

        tracing::info!(
            job_id = %job.id,
            video_id = %video_id,
            attempt = job.attempt_count,
            delay_secs = delay_secs,
            "Job retry scheduled"
        );

        Ok(job)
    }

    /// Terminal failure: retries exhausted or unrecoverable error.
    #[tracing::instrument(skip(self))]
    pub async fn mark_failed(&self, video_id: Uuid, error: &str) -> Result<TranscodingJob> {
        let job: TranscodingJob = sqlx::query_as::<Postgres, TranscodingJob>(&format!(
            r#"
            UPDATE transcoding_jobs
            SET status = 'failed',
                error_message = $2,
                completed_at = NOW()
            WHERE video_id = $1 AND status IN ('processing', 'retrying', 'queued')
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(video_id)
        .bind(error)
        .fetch_one(&self.pool)
        .await
        .context("Failed to mark job failed")?;

        tracing::error!(
            job_id = %job.id,
            video_id = %video_id,
            attempts = job.attempt_count,
            error = %error,
            "Job failed"
        );

        Ok(job)
    }

    /// Move RETRYING jobs whose backoff has elapsed back to QUEUED.
    /// Returns the number of jobs requeued.
    #[tracing::instrument(skip(self))]
    pub async fn requeue_due_retries(&self) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for retry requeue")?;

        let result = sqlx::query(
            r#"
            UPDATE transcoding_jobs
            SET status = 'queued',
                next_retry_at = NULL,
                progress_percentage = 0
            WHERE status = 'retrying' AND next_retry_at <= NOW()
            "#,
        )
        .execute(&mut *tx)
        .await
        .context("Failed to requeue due retries")?;

        let count = result.rows_affected();
        if count > 0 {
            if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
                .bind(JOB_NOTIFY_CHANNEL)
                .execute(&mut *tx)
                .await
            {
                tracing::warn!(error = %e, "Failed to notify workers after retry requeue");
            }
        }

        tx.commit().await.context("Failed to commit retry requeue")?;

        if count > 0 {
            tracing::info!(count = count, "Requeued jobs due for retry");
        }

        Ok(count)
    }

    /// Visibility timeout: PROCESSING jobs whose `started_at` is older than
    /// the timeout belong to a dead worker. Jobs with attempts left are
    /// requeued; exhausted ones are failed terminally, and their videos are
    /// marked FAILED in the same transaction so the two stores stay
    /// consistent when no worker is alive to do it.
    #[tracing::instrument(skip(self))]
    pub async fn reap_stale(&self, visibility_timeout_secs: i64) -> Result<(u64, u64)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for stale reap")?;

        let requeued = sqlx::query(
            r#"
            UPDATE transcoding_jobs
            SET status = 'queued',
                worker_id = NULL,
                started_at = NULL,
                progress_percentage = 0
            WHERE status = 'processing'
                AND started_at < NOW() - ($1 * interval '1 second')
                AND attempt_count < max_attempts
            "#,
        )
        .bind(visibility_timeout_secs)
        .execute(&mut *tx)
        .await
        .context("Failed to requeue stale jobs")?
        .rows_affected();

        let failed_video_ids: Vec<Uuid> = sqlx::query_scalar::<Postgres, Uuid>(
            r#"
            UPDATE transcoding_jobs
            SET status = 'failed',
                error_message = 'Worker abandoned job (visibility timeout)',
                completed_at = NOW()
            WHERE status = 'processing'
                AND started_at < NOW() - ($1 * interval '1 second')
                AND attempt_count >= max_attempts
            RETURNING video_id
            "#,
        )
        .bind(visibility_timeout_secs)
        .fetch_all(&mut *tx)
        .await
        .context("Failed to fail exhausted stale jobs")?;

        if !failed_video_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE videos
                SET status = 'failed',
                    updated_at = NOW()
                WHERE id = ANY($1)
                    AND status IN ('pending', 'processing')
                "#,
            )
            .bind(&failed_video_ids)
            .execute(&mut *tx)
            .await
            .context("Failed to mark videos of abandoned jobs failed")?;
        }

        tx.commit().await.context("Failed to commit stale reap")?;

        let failed = failed_video_ids.len() as u64;
        if requeued > 0 || failed > 0 {
            tracing::warn!(
                requeued = requeued,
                failed = failed,
                "Reaped stale jobs past visibility timeout"
            );
        }

        Ok((requeued, failed))
    }

    /// Latest job for a video (there is at most one non-terminal at any time).
    #[tracing::instrument(skip(self))]
    pub async fn find_by_video(&self, video_id: Uuid) -> Result<Option<TranscodingJob>> {
        let job: Option<TranscodingJob> = sqlx::query_as::<Postgres, TranscodingJob>(&format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM transcoding_jobs
            WHERE video_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(video_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch job for video")?;

        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    pub async fn stats(&self) -> Result<QueueStats> {
        use sqlx::Row;
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE status = 'queued') as waiting,
                COUNT(*) FILTER (WHERE status = 'processing') as active,
                COUNT(*) FILTER (WHERE status = 'completed') as completed,
                COUNT(*) FILTER (WHERE status = 'failed') as failed,
                COUNT(*) FILTER (WHERE status = 'retrying') as delayed
            FROM transcoding_jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .context("Failed to fetch queue stats")?;

        Ok(QueueStats {
            waiting: row.get::<Option<i64>, _>("waiting").unwrap_or(0),
            active: row.get::<Option<i64>, _>("active").unwrap_or(0),
            completed: row.get::<Option<i64>, _>("completed").unwrap_or(0),
            failed: row.get::<Option<i64>, _>("failed").unwrap_or(0),
            delayed: row.get::<Option<i64>, _>("delayed").unwrap_or(0),
        })
    }
}
