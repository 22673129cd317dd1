//! Video management: listing, details, processing status, delete.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use reel_core::models::{
    JobProgress, JobResult, JobStatus, Paginated, Video, VideoListQuery, VideoStatus,
};
use reel_core::AppError;
use reel_storage::paths;

use crate::error::{success, HttpError};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoView {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub original_filename: String,
    pub file_size: i64,
    pub mime_type: String,
    pub duration_seconds: Option<i32>,
    pub status: VideoStatus,
    pub has_thumbnail: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl From<Video> for VideoView {
    fn from(v: Video) -> Self {
        Self {
            id: v.id,
            title: v.title,
            description: v.description,
            tags: v.tags,
            original_filename: v.original_filename,
            file_size: v.file_size,
            mime_type: v.mime_type,
            duration_seconds: v.duration_seconds,
            status: v.status,
            has_thumbnail: v.thumbnail_path.is_some(),
            created_at: v.created_at,
            updated_at: v.updated_at,
            processed_at: v.processed_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputView {
    pub resolution: String,
    pub width: i32,
    pub height: i32,
    pub bitrate_kbps: i32,
    pub segment_count: i32,
    pub file_size: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoDetailsView {
    #[serde(flatten)]
    pub video: VideoView,
    pub outputs: Vec<OutputView>,
    /// Absolute playback URL, present once the video is READY and a public
    /// root is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playback_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub id: Uuid,
    pub status: VideoStatus,
    pub job_status: Option<JobStatus>,
    pub progress: Option<JobProgress>,
    pub progress_percentage: i32,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub completed_resolutions: Vec<String>,
    pub failed_resolutions: Vec<String>,
    pub error: Option<String>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

/// GET /api/v1/videos
pub async fn list_videos(
    State(state): State<Arc<AppState>>,
    Query(query): Query<VideoListQuery>,
) -> Result<Response, HttpError> {
    let page = state.videos.list(&query).await?;
    let view = Paginated::new(
        page.items.into_iter().map(VideoView::from).collect(),
        page.page,
        page.limit,
        page.total,
    );
    Ok(success(StatusCode::OK, view))
}

/// GET /api/v1/videos/{id}
pub async fn get_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpError> {
    let video = state
        .videos
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::video_not_found(id))?;

    let outputs = state
        .outputs
        .find_ready(id)
        .await?
        .into_iter()
        .map(|o| OutputView {
            resolution: o.resolution,
            width: o.width,
            height: o.height,
            bitrate_kbps: o.bitrate_kbps,
            segment_count: o.segment_count,
            file_size: o.file_size,
        })
        .collect();

    let playback_url = match (&state.config.public_root, video.status) {
        (Some(root), VideoStatus::Ready) => Some(format!(
            "{}/api/v1/stream/{}/master.m3u8",
            root.trim_end_matches('/'),
            id
        )),
        _ => None,
    };

    Ok(success(
        StatusCode::OK,
        VideoDetailsView {
            video: VideoView::from(video),
            outputs,
            playback_url,
        },
    ))
}

/// GET /api/v1/videos/{id}/status
pub async fn get_video_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpError> {
    let video = state
        .videos
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::video_not_found(id))?;

    let job = state.jobs.find_by_video(id).await?;

    let completed_resolutions: Vec<String> = state
        .outputs
        .find_ready(id)
        .await?
        .into_iter()
        .map(|o| o.resolution)
        .collect();

    let failed_resolutions = job
        .as_ref()
        .and_then(|j| j.result_as::<JobResult>())
        .map(|r| r.failed_resolutions)
        .unwrap_or_default();

    let view = StatusView {
        id,
        status: video.status,
        job_status: job.as_ref().map(|j| j.status),
        progress: job
            .as_ref()
            .and_then(|j| j.data_as::<reel_core::models::JobData>())
            .and_then(|d| d.progress),
        progress_percentage: job.as_ref().map(|j| j.progress_percentage).unwrap_or(0),
        attempt_count: job.as_ref().map(|j| j.attempt_count).unwrap_or(0),
        max_attempts: job.as_ref().map(|j| j.max_attempts).unwrap_or(0),
        completed_resolutions,
        failed_resolutions,
        error: job.as_ref().and_then(|j| j.error_message.clone()),
        next_retry_at: job.as_ref().and_then(|j| j.next_retry_at),
    };

    Ok(success(StatusCode::OK, view))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryView {
    pub id: Uuid,
    pub job_id: Uuid,
    pub resubmitted: bool,
}

/// POST /api/v1/videos/{id}/retry
///
/// Explicit retry of a terminally failed video: resets it to PENDING and
/// re-submits the transcode. The deterministic job key means a concurrent
/// submission returns the already-live job instead of a second one.
pub async fn retry_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpError> {
    let video = state
        .videos
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::video_not_found(id))?;

    if video.status != VideoStatus::Failed {
        return Err(HttpError(AppError::Validation {
            code: "VIDEO_NOT_FAILED",
            message: format!("Video {} is {}, only failed videos can be retried", id, video.status),
        }));
    }

    state
        .videos
        .update_status(id, VideoStatus::Pending)
        .await?;

    let resolutions: Vec<String> = reel_core::models::ResolutionProfile::LADDER
        .iter()
        .map(|p| p.label.to_string())
        .collect();

    let (job, created) = state
        .producer
        .submit_transcode(id, video.upload_path, resolutions, Default::default())
        .await
        .map_err(|e| HttpError(AppError::Queue(format!("{:#}", e))))?;

    Ok(success(
        StatusCode::OK,
        RetryView {
            id,
            job_id: job.id,
            resubmitted: created,
        },
    ))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteView {
    pub id: Uuid,
    pub deleted: bool,
}

/// DELETE /api/v1/videos/{id}
///
/// Rows go in one transaction; blobs are best-effort. Storage failures are
/// logged, not surfaced: the video is gone either way.
pub async fn delete_video(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpError> {
    let video = state
        .videos
        .delete(id)
        .await?
        .ok_or_else(|| AppError::video_not_found(id))?;

    if let Err(e) = state.storage.delete(&video.upload_path).await {
        tracing::warn!(video_id = %id, error = %e, "Failed to delete source blob");
    }
    if let Err(e) = state.storage.rmdir(&paths::hls_prefix(id)).await {
        tracing::warn!(video_id = %id, error = %e, "Failed to delete HLS artifacts");
    }
    if let Err(e) = state.storage.rmdir(&paths::thumbnail_prefix(id)).await {
        tracing::warn!(video_id = %id, error = %e, "Failed to delete thumbnail");
    }

    Ok(success(StatusCode::OK, DeleteView { id, deleted: true }))
}
