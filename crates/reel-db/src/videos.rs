use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use crate::jobs::JOB_COLUMNS;
use reel_core::models::{
    job_key, JobData, JobType, Paginated, Priority, TranscodingJob, Video, VideoListQuery,
    VideoStatus,
};

const VIDEO_COLUMNS: &str = r#"
    id,
    title,
    description,
    tags,
    original_filename,
    file_extension,
    file_size,
    mime_type,
    upload_path,
    duration_seconds,
    thumbnail_path,
    status,
    created_at,
    updated_at,
    processed_at
"#;

/// Input for inserting a new video row.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub original_filename: String,
    pub file_extension: String,
    pub file_size: i64,
    pub mime_type: String,
    pub upload_path: String,
}

#[derive(Clone)]
pub struct VideoRepository {
    pool: PgPool,
}

impl VideoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert the video and its transcoding job in one transaction, then
    /// notify workers. The video starts PENDING, the job QUEUED.
    #[tracing::instrument(skip(self, video, requested_resolutions))]
    pub async fn create_video_and_job(
        &self,
        video: NewVideo,
        requested_resolutions: Vec<String>,
        priority: Priority,
        max_attempts: i32,
    ) -> Result<(Video, TranscodingJob)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for video creation")?;

        let inserted: Video = sqlx::query_as::<Postgres, Video>(&format!(
            r#"
            INSERT INTO videos (
                id, title, description, tags, original_filename, file_extension,
                file_size, mime_type, upload_path, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'pending')
            RETURNING {VIDEO_COLUMNS}
            "#
        ))
        .bind(video.id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.tags)
        .bind(&video.original_filename)
        .bind(&video.file_extension)
        .bind(video.file_size)
        .bind(&video.mime_type)
        .bind(&video.upload_path)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert video")?;

        let data = JobData {
            input_path: video.upload_path.clone(),
            requested_resolutions,
            progress: None,
        };

        let job: TranscodingJob = sqlx::query_as::<Postgres, TranscodingJob>(&format!(
            r#"
            INSERT INTO transcoding_jobs (
                video_id, job_key, job_type, status, priority, max_attempts, job_data
            )
            VALUES ($1, $2, $3, 'queued', $4, $5, $6)
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(video.id)
        .bind(job_key(video.id))
        .bind(JobType::HlsTranscode)
        .bind(priority.as_i32())
        .bind(max_attempts)
        .bind(serde_json::to_value(&data).context("Failed to serialize job data")?)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert transcoding job")?;

        // Wake workers immediately instead of waiting for the poll interval.
        // Non-fatal: workers discover the job via polling if NOTIFY fails.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, '')")
            .bind(crate::jobs::JOB_NOTIFY_CHANNEL)
            .execute(&mut *tx)
            .await
        {
            tracing::warn!(error = %e, video_id = %inserted.id, "Failed to notify workers of new job");
        }

        tx.commit()
            .await
            .context("Failed to commit video creation")?;

        tracing::info!(
            video_id = %inserted.id,
            job_id = %job.id,
            "Video and transcoding job created"
        );

        Ok((inserted, job))
    }

    #[tracing::instrument(skip(self))]
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Video>> {
        let video: Option<Video> = sqlx::query_as::<Postgres, Video>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch video")?;

        Ok(video)
    }

    /// Update the video status, enforcing transition legality.
    /// `processed_at` is stamped iff the new status is READY.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, id: Uuid, status: VideoStatus) -> Result<Video> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for status update")?;

        let current: VideoStatus = sqlx::query_scalar::<Postgres, VideoStatus>(
            "SELECT status FROM videos WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to fetch current video status")?
        .ok_or_else(|| anyhow::anyhow!("Video not found: {}", id))?;

        if !current.can_transition(status) {
            return Err(anyhow::anyhow!(
                "Illegal video status transition {} -> {} for {}",
                current,
                status,
                id
            ));
        }

        let video: Video = sqlx::query_as::<Postgres, Video>(&format!(
            r#"
            UPDATE videos
            SET status = $2,
                updated_at = NOW(),
                processed_at = CASE WHEN $2 = 'ready'::video_status THEN NOW() ELSE processed_at END
            WHERE id = $1
            RETURNING {VIDEO_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(status)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to update video status")?;

        tx.commit().await.context("Failed to commit status update")?;

        tracing::info!(video_id = %id, status = %status, "Video status updated");

        Ok(video)
    }

    /// Store probed source duration, rounded to whole seconds.
    #[tracing::instrument(skip(self))]
    pub async fn update_metadata(&self, id: Uuid, duration_secs: f64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE videos
            SET duration_seconds = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(duration_secs.round() as i32)
        .execute(&self.pool)
        .await
        .context("Failed to update video metadata")?;

        Ok(())
    }

    /// List videos with filters, newest first by default.
    #[tracing::instrument(skip(self, query))]
    pub async fn list(&self, query: &VideoListQuery) -> Result<Paginated<Video>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut bind_count = 0;

        if query.status.is_some() {
            bind_count += 1;
            conditions.push(format!("status = ${}", bind_count));
        }
        if query.search.is_some() {
            bind_count += 1;
            conditions.push(format!(
                "(title ILIKE ${n} OR description ILIKE ${n})",
                n = bind_count
            ));
        }
        let tags = query.tag_list();
        if !tags.is_empty() {
            bind_count += 1;
            conditions.push(format!("tags && ${}", bind_count));
        }
        if query.date_from.is_some() {
            bind_count += 1;
            conditions.push(format!("created_at >= ${}", bind_count));
        }
        if query.date_to.is_some() {
            bind_count += 1;
            conditions.push(format!("created_at <= ${}", bind_count));
        }
        if query.resolution.is_some() {
            bind_count += 1;
            conditions.push(format!(
                "EXISTS (SELECT 1 FROM video_outputs o WHERE o.video_id = videos.id \
                 AND o.resolution = ${} AND o.status = 'ready')",
                bind_count
            ));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let list_sql = format!(
            "SELECT {VIDEO_COLUMNS} FROM videos {where_clause} ORDER BY {} {} LIMIT ${} OFFSET ${}",
            query.sort_column(),
            query.sort_order.unwrap_or_default().as_sql(),
            bind_count + 1,
            bind_count + 2,
        );
        let count_sql = format!("SELECT COUNT(*) FROM videos {where_clause}");

        let mut list_query = sqlx::query_as::<Postgres, Video>(&list_sql);
        let mut count_query = sqlx::query_scalar::<Postgres, i64>(&count_sql);

        if let Some(status) = query.status {
            list_query = list_query.bind(status);
            count_query = count_query.bind(status);
        }
        if let Some(search) = &query.search {
            let pattern = format!("%{}%", search);
            list_query = list_query.bind(pattern.clone());
            count_query = count_query.bind(pattern);
        }
        if !tags.is_empty() {
            list_query = list_query.bind(tags.clone());
            count_query = count_query.bind(tags);
        }
        if let Some(from) = query.date_from {
            list_query = list_query.bind::<DateTime<Utc>>(from);
            count_query = count_query.bind::<DateTime<Utc>>(from);
        }
        if let Some(to) = query.date_to {
            list_query = list_query.bind::<DateTime<Utc>>(to);
            count_query = count_query.bind::<DateTime<Utc>>(to);
        }
        if let Some(resolution) = &query.resolution {
            list_query = list_query.bind(resolution.clone());
            count_query = count_query.bind(resolution.clone());
        }

        let items = list_query
            .bind(query.limit())
            .bind(query.offset())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list videos")?;

        let total = count_query
            .fetch_one(&self.pool)
            .await
            .context("Failed to count videos")?;

        Ok(Paginated::new(items, query.page(), query.limit(), total))
    }

    /// Remove a video with its outputs and jobs in one transaction.
    /// Returns the deleted row, or None when the video did not exist.
    /// Blob cleanup is the caller's responsibility (best-effort).
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<Option<Video>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for video delete")?;

        sqlx::query("DELETE FROM video_outputs WHERE video_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete video outputs")?;

        sqlx::query("DELETE FROM transcoding_jobs WHERE video_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete transcoding jobs")?;

        let video: Option<Video> = sqlx::query_as::<Postgres, Video>(&format!(
            "DELETE FROM videos WHERE id = $1 RETURNING {VIDEO_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to delete video")?;

        tx.commit().await.context("Failed to commit video delete")?;

        if video.is_some() {
            tracing::info!(video_id = %id, "Video deleted with outputs and jobs");
        }

        Ok(video)
    }
}
