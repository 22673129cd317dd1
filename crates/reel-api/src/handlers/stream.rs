//! HLS read path: master playlist, variant playlists, segments, thumbnails.
//!
//! Every route gates on database state first (video READY, output READY) and
//! only then touches storage, so readers never observe a partially-written
//! `hls/{id}/` prefix.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};
use futures::StreamExt;
use regex::Regex;
use std::sync::Arc;
use std::sync::OnceLock;
use uuid::Uuid;

use reel_core::models::{Video, VideoStatus};
use reel_core::AppError;
use reel_storage::{paths, ByteStream, StorageError};

use crate::error::HttpError;
use crate::state::AppState;

const CONTENT_TYPE_M3U8: &str = "application/vnd.apple.mpegurl";
const CONTENT_TYPE_TS: &str = "video/mp2t";
const CONTENT_TYPE_JPEG: &str = "image/jpeg";

const CACHE_PLAYLIST: &str = "public, max-age=300";
const CACHE_SEGMENT: &str = "public, max-age=31536000";
const CACHE_THUMBNAIL: &str = "public, max-age=86400";

fn segment_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^segment_\d{3}\.ts$").expect("static regex"))
}

/// Strict segment name gate; anything else is a 400.
pub fn is_valid_segment_name(name: &str) -> bool {
    segment_name_re().is_match(name)
}

/// Fetch the video and require READY.
async fn ready_video(
    state: &AppState,
    id: Uuid,
    not_ready: impl FnOnce() -> AppError,
) -> Result<Video, HttpError> {
    let video = state
        .videos
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::video_not_found(id))?;

    if video.status != VideoStatus::Ready {
        return Err(HttpError(not_ready()));
    }

    Ok(video)
}

fn stream_response(
    stream: ByteStream,
    content_type: &'static str,
    cache_control: &'static str,
    accept_ranges: bool,
) -> Result<Response, HttpError> {
    let body_stream =
        stream.map(|result| result.map_err(|e| std::io::Error::other(e.to_string())));

    // CORS headers (allow-origin *, allow-headers Range) come from the
    // CorsLayer wrapping the streaming routes.
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CACHE_CONTROL, cache_control);

    if accept_ranges {
        builder = builder.header(header::ACCEPT_RANGES, "bytes");
    }

    builder
        .body(Body::from_stream(body_stream))
        .map_err(|e| HttpError(AppError::Internal(format!("Failed to build response: {}", e))))
}

fn map_blob_error(err: StorageError, missing: impl FnOnce() -> AppError) -> HttpError {
    match err {
        StorageError::NotFound(_) => HttpError(missing()),
        other => HttpError(AppError::Storage(other.to_string())),
    }
}

/// GET /api/v1/stream/{id}/master.m3u8
///
/// Serves the stored master playlist verbatim, so clients see exactly what
/// the transcoder composed.
pub async fn master_playlist(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpError> {
    ready_video(&state, id, || AppError::master_playlist_not_found(id)).await?;

    let outputs = state.outputs.find_ready(id).await?;
    if outputs.is_empty() {
        return Err(HttpError(AppError::master_playlist_not_found(id)));
    }

    let stream = state
        .storage
        .get_stream(&paths::master_playlist_path(id))
        .await
        .map_err(|e| map_blob_error(e, || AppError::master_playlist_not_found(id)))?;

    stream_response(stream, CONTENT_TYPE_M3U8, CACHE_PLAYLIST, false)
}

/// GET /api/v1/stream/{id}/{resolution}/playlist.m3u8
pub async fn variant_playlist(
    State(state): State<Arc<AppState>>,
    Path((id, resolution)): Path<(Uuid, String)>,
) -> Result<Response, HttpError> {
    ready_video(&state, id, || AppError::playlist_not_found(id, &resolution)).await?;

    state
        .outputs
        .find_ready_by_resolution(id, &resolution)
        .await?
        .ok_or_else(|| AppError::playlist_not_found(id, &resolution))?;

    let stream = state
        .storage
        .get_stream(&paths::variant_playlist_path(id, &resolution))
        .await
        .map_err(|e| map_blob_error(e, || AppError::playlist_not_found(id, &resolution)))?;

    stream_response(stream, CONTENT_TYPE_M3U8, CACHE_PLAYLIST, false)
}

/// GET /api/v1/stream/{id}/{resolution}/{segment}
pub async fn segment(
    State(state): State<Arc<AppState>>,
    Path((id, resolution, segment)): Path<(Uuid, String, String)>,
) -> Result<Response, HttpError> {
    if !is_valid_segment_name(&segment) {
        return Err(HttpError(AppError::invalid_segment_name(&segment)));
    }

    ready_video(&state, id, || AppError::segment_not_found(id, &segment)).await?;

    state
        .outputs
        .find_ready_by_resolution(id, &resolution)
        .await?
        .ok_or_else(|| AppError::segment_not_found(id, &segment))?;

    let stream = state
        .storage
        .get_stream(&paths::segment_path(id, &resolution, &segment))
        .await
        .map_err(|e| map_blob_error(e, || AppError::segment_not_found(id, &segment)))?;

    stream_response(stream, CONTENT_TYPE_TS, CACHE_SEGMENT, true)
}

/// GET /api/v1/videos/{id}/thumbnail
pub async fn thumbnail(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Response, HttpError> {
    let video = ready_video(&state, id, || AppError::thumbnail_not_found(id)).await?;

    let thumbnail_path = video
        .thumbnail_path
        .ok_or_else(|| AppError::thumbnail_not_found(id))?;

    let stream = state
        .storage
        .get_stream(&thumbnail_path)
        .await
        .map_err(|e| map_blob_error(e, || AppError::thumbnail_not_found(id)))?;

    stream_response(stream, CONTENT_TYPE_JPEG, CACHE_THUMBNAIL, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_name_gate_accepts_canonical_names() {
        assert!(is_valid_segment_name("segment_000.ts"));
        assert!(is_valid_segment_name("segment_042.ts"));
        assert!(is_valid_segment_name("segment_999.ts"));
    }

    #[test]
    fn segment_name_gate_rejects_everything_else() {
        assert!(!is_valid_segment_name("segment_1.ts"));
        assert!(!is_valid_segment_name("Segment_001.ts"));
        assert!(!is_valid_segment_name("segment_001.tsx"));
        assert!(!is_valid_segment_name("../segment_001.ts"));
        assert!(!is_valid_segment_name("segment_0001.ts"));
        assert!(!is_valid_segment_name("segment_001.ts "));
        assert!(!is_valid_segment_name(""));
    }
}
