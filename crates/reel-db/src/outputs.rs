use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use reel_core::models::VideoOutput;

const OUTPUT_COLUMNS: &str = r#"
    id,
    video_id,
    resolution,
    width,
    height,
    bitrate_kbps,
    playlist_path,
    segment_dir,
    file_size,
    segment_count,
    segment_duration,
    status,
    completed_at,
    created_at
"#;

/// One finalized rendition ready to be persisted.
#[derive(Debug, Clone)]
pub struct NewOutput {
    pub resolution: String,
    pub width: i32,
    pub height: i32,
    pub bitrate_kbps: i32,
    pub playlist_path: String,
    pub segment_dir: String,
    pub file_size: i64,
    pub segment_count: i32,
    pub segment_duration: f64,
}

#[derive(Clone)]
pub struct OutputRepository {
    pool: PgPool,
}

impl OutputRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist the finished renditions and the video's thumbnail path in one
    /// transaction. Rows are inserted READY with `completed_at = now`; the
    /// `(video_id, resolution)` unique constraint rejects duplicates.
    #[tracing::instrument(skip(self, outputs))]
    pub async fn save_outputs(
        &self,
        video_id: Uuid,
        outputs: &[NewOutput],
        thumbnail_path: &str,
    ) -> Result<Vec<VideoOutput>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin transaction for outputs")?;

        let mut saved = Vec::with_capacity(outputs.len());
        for output in outputs {
            let row: VideoOutput = sqlx::query_as::<Postgres, VideoOutput>(&format!(
                r#"
                INSERT INTO video_outputs (
                    video_id, resolution, width, height, bitrate_kbps,
                    playlist_path, segment_dir, file_size, segment_count,
                    segment_duration, status, completed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'ready', NOW())
                RETURNING {OUTPUT_COLUMNS}
                "#
            ))
            .bind(video_id)
            .bind(&output.resolution)
            .bind(output.width)
            .bind(output.height)
            .bind(output.bitrate_kbps)
            .bind(&output.playlist_path)
            .bind(&output.segment_dir)
            .bind(output.file_size)
            .bind(output.segment_count)
            .bind(output.segment_duration)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert output {}", output.resolution))?;
            saved.push(row);
        }

        sqlx::query(
            r#"
            UPDATE videos
            SET thumbnail_path = $2,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(video_id)
        .bind(thumbnail_path)
        .execute(&mut *tx)
        .await
        .context("Failed to update thumbnail path")?;

        tx.commit().await.context("Failed to commit outputs")?;

        tracing::info!(
            video_id = %video_id,
            output_count = saved.len(),
            "Video outputs saved"
        );

        Ok(saved)
    }

    /// All READY renditions for a video, ascending bitrate.
    #[tracing::instrument(skip(self))]
    pub async fn find_ready(&self, video_id: Uuid) -> Result<Vec<VideoOutput>> {
        let outputs: Vec<VideoOutput> = sqlx::query_as::<Postgres, VideoOutput>(&format!(
            r#"
            SELECT {OUTPUT_COLUMNS}
            FROM video_outputs
            WHERE video_id = $1 AND status = 'ready'
            ORDER BY bitrate_kbps ASC
            "#
        ))
        .bind(video_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch outputs")?;

        Ok(outputs)
    }

    /// The READY rendition at a specific resolution, if any.
    #[tracing::instrument(skip(self))]
    pub async fn find_ready_by_resolution(
        &self,
        video_id: Uuid,
        resolution: &str,
    ) -> Result<Option<VideoOutput>> {
        let output: Option<VideoOutput> = sqlx::query_as::<Postgres, VideoOutput>(&format!(
            r#"
            SELECT {OUTPUT_COLUMNS}
            FROM video_outputs
            WHERE video_id = $1 AND resolution = $2 AND status = 'ready'
            "#
        ))
        .bind(video_id)
        .bind(resolution)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch output by resolution")?;

        Ok(output)
    }
}
