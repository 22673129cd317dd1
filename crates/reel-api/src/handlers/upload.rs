//! Multipart video upload.

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::Response,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use reel_core::models::{Priority, ResolutionProfile, VideoStatus};
use reel_core::AppError;
use reel_db::NewVideo;
use reel_storage::paths;

use crate::error::{success, HttpError};
use crate::state::AppState;
use crate::validation::UploadFields;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub id: Uuid,
    pub title: String,
    pub status: VideoStatus,
    pub file_size: i64,
    pub requested_resolutions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// POST /api/v1/videos/upload
///
/// Persists the source blob, creates the video row and its queued transcode
/// job in one transaction, and returns 201. Transcoding happens
/// asynchronously; poll `/videos/{id}/status` for progress.
pub async fn upload_video(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, HttpError> {
    let mut fields = UploadFields::default();
    let mut file_bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        HttpError(AppError::Validation {
            code: "INVALID_MULTIPART",
            message: format!("Malformed multipart body: {}", e),
        })
    })? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                fields.filename = field.file_name().map(String::from);
                fields.content_type = field.content_type().map(String::from);
                let data = field.bytes().await.map_err(|e| {
                    HttpError(AppError::PayloadTooLarge(format!(
                        "Failed to read file field: {}",
                        e
                    )))
                })?;
                fields.file_size = data.len();
                fields.has_file = true;
                file_bytes = Some(data.to_vec());
            }
            "title" => {
                fields.title = field.text().await.ok();
            }
            "description" => {
                fields.description = field.text().await.ok();
            }
            "tags" => {
                fields.tags = field.text().await.ok();
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    let validated = state.upload_validator.validate(&fields)?;
    let file_bytes = file_bytes.ok_or_else(AppError::file_required)?;

    let video_id = Uuid::new_v4();
    let upload_path = paths::upload_path(video_id, &validated.file_extension);
    let file_size = file_bytes.len() as i64;

    state
        .storage
        .save(&upload_path, file_bytes)
        .await
        .map_err(|e| HttpError(AppError::Storage(e.to_string())))?;

    let requested_resolutions: Vec<String> = ResolutionProfile::LADDER
        .iter()
        .map(|p| p.label.to_string())
        .collect();

    let result = state
        .videos
        .create_video_and_job(
            NewVideo {
                id: video_id,
                title: validated.title,
                description: validated.description,
                tags: validated.tags,
                original_filename: validated.original_filename,
                file_extension: validated.file_extension,
                file_size,
                mime_type: validated.content_type,
                upload_path: upload_path.clone(),
            },
            requested_resolutions.clone(),
            Priority::Normal,
            state.config.queue_retry_attempts,
        )
        .await;

    let (video, _job) = match result {
        Ok(pair) => pair,
        Err(e) => {
            // The DB rejected the row; don't leave the blob orphaned.
            if let Err(cleanup) = state.storage.delete(&upload_path).await {
                tracing::warn!(error = %cleanup, path = %upload_path, "Failed to clean up orphaned upload");
            }
            return Err(HttpError(AppError::Internal(format!("{:#}", e))));
        }
    };

    tracing::info!(video_id = %video.id, size_bytes = file_size, "Video uploaded");

    Ok(success(
        StatusCode::CREATED,
        UploadResponse {
            id: video.id,
            title: video.title,
            status: video.status,
            file_size: video.file_size,
            requested_resolutions,
            created_at: video.created_at,
        },
    ))
}
