//! Unified application error type.
//!
//! Every error carries a stable machine-readable code and an HTTP status so
//! the API edge can render the response envelope from a single mapping.
//! Worker-internal failures never surface over HTTP; they are recorded on the
//! job row and drive the retry state machine instead.

use sqlx::Error as SqlxError;
use uuid::Uuid;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Request-level validation failure (400 unless the code says otherwise).
    #[error("{message}")]
    Validation {
        code: &'static str,
        message: String,
    },

    #[error("File too large: {0}")]
    PayloadTooLarge(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("{message}")]
    NotFound {
        code: &'static str,
        message: String,
    },

    #[error("Database error: {0}")]
    Database(#[source] SqlxError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Transcoding failed: {0}")]
    Transcoding(String),

    #[error("All renditions failed: {0}")]
    AllRenditionsFailed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn title_required() -> Self {
        AppError::Validation {
            code: codes::TITLE_REQUIRED,
            message: "Title is required".to_string(),
        }
    }

    pub fn title_too_long(max: usize) -> Self {
        AppError::Validation {
            code: codes::TITLE_TOO_LONG,
            message: format!("Title must be at most {} characters", max),
        }
    }

    pub fn file_required() -> Self {
        AppError::Validation {
            code: codes::FILE_REQUIRED,
            message: "A video file is required".to_string(),
        }
    }

    pub fn too_many_tags(max: usize) -> Self {
        AppError::Validation {
            code: codes::TOO_MANY_TAGS,
            message: format!("At most {} tags are allowed", max),
        }
    }

    pub fn invalid_tag(tag: &str) -> Self {
        AppError::Validation {
            code: codes::INVALID_TAG,
            message: format!("Invalid tag: {}", tag),
        }
    }

    pub fn invalid_segment_name(name: &str) -> Self {
        AppError::Validation {
            code: codes::INVALID_SEGMENT_NAME,
            message: format!("Invalid segment name: {}", name),
        }
    }

    pub fn video_not_found(id: Uuid) -> Self {
        AppError::NotFound {
            code: codes::VIDEO_NOT_FOUND,
            message: format!("Video not found: {}", id),
        }
    }

    pub fn playlist_not_found(id: Uuid, resolution: &str) -> Self {
        AppError::NotFound {
            code: codes::PLAYLIST_NOT_FOUND,
            message: format!("Playlist not available for video {} at {}", id, resolution),
        }
    }

    pub fn master_playlist_not_found(id: Uuid) -> Self {
        AppError::NotFound {
            code: codes::MASTER_PLAYLIST_NOT_FOUND,
            message: format!("Master playlist not available for video {}", id),
        }
    }

    pub fn segment_not_found(id: Uuid, name: &str) -> Self {
        AppError::NotFound {
            code: codes::SEGMENT_NOT_FOUND,
            message: format!("Segment {} not available for video {}", name, id),
        }
    }

    pub fn thumbnail_not_found(id: Uuid) -> Self {
        AppError::NotFound {
            code: codes::THUMBNAIL_NOT_FOUND,
            message: format!("Thumbnail not available for video {}", id),
        }
    }

    /// Stable machine-readable code for the response envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation { code, .. } => code,
            AppError::PayloadTooLarge(_) => codes::FILE_TOO_LARGE,
            AppError::UnsupportedFormat(_) => codes::INVALID_FILE_FORMAT,
            AppError::NotFound { code, .. } => code,
            AppError::Database(_) => codes::DB_UNAVAILABLE,
            AppError::Storage(_) => codes::STORAGE_UNAVAILABLE,
            AppError::Queue(_) => codes::QUEUE_UNAVAILABLE,
            AppError::Transcoding(_) => codes::TRANSCODING_FAILED,
            AppError::AllRenditionsFailed(_) => codes::ALL_RENDITIONS_FAILED,
            AppError::Internal(_) => codes::INTERNAL_SERVER_ERROR,
        }
    }

    /// HTTP status for the API edge. Worker paths ignore this.
    pub fn http_status(&self) -> u16 {
        match self {
            AppError::Validation { .. } => 400,
            AppError::PayloadTooLarge(_) => 413,
            AppError::UnsupportedFormat(_) => 415,
            AppError::NotFound { .. } => 404,
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Queue(_)
            | AppError::Transcoding(_)
            | AppError::AllRenditionsFailed(_)
            | AppError::Internal(_) => 500,
        }
    }
}

impl From<SqlxError> for AppError {
    fn from(err: SqlxError) -> Self {
        AppError::Database(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(format!("JSON error: {}", err))
    }
}

/// Stable error code strings exposed over the HTTP envelope.
pub mod codes {
    pub const FILE_REQUIRED: &str = "FILE_REQUIRED";
    pub const INVALID_FILE_FORMAT: &str = "INVALID_FILE_FORMAT";
    pub const FILE_TOO_LARGE: &str = "FILE_TOO_LARGE";
    pub const TITLE_REQUIRED: &str = "TITLE_REQUIRED";
    pub const TITLE_TOO_LONG: &str = "TITLE_TOO_LONG";
    pub const INVALID_TAGS_FORMAT: &str = "INVALID_TAGS_FORMAT";
    pub const TOO_MANY_TAGS: &str = "TOO_MANY_TAGS";
    pub const INVALID_TAG: &str = "INVALID_TAG";
    pub const INVALID_SEGMENT_NAME: &str = "INVALID_SEGMENT_NAME";

    pub const VIDEO_NOT_FOUND: &str = "VIDEO_NOT_FOUND";
    pub const PLAYLIST_NOT_FOUND: &str = "PLAYLIST_NOT_FOUND";
    pub const MASTER_PLAYLIST_NOT_FOUND: &str = "MASTER_PLAYLIST_NOT_FOUND";
    pub const SEGMENT_NOT_FOUND: &str = "SEGMENT_NOT_FOUND";
    pub const THUMBNAIL_NOT_FOUND: &str = "THUMBNAIL_NOT_FOUND";

    pub const VIDEO_PROCESSING_ERROR: &str = "VIDEO_PROCESSING_ERROR";
    pub const TRANSCODING_FAILED: &str = "TRANSCODING_FAILED";
    pub const ALL_RENDITIONS_FAILED: &str = "ALL_RENDITIONS_FAILED";

    pub const QUEUE_UNAVAILABLE: &str = "QUEUE_UNAVAILABLE";
    pub const STORAGE_UNAVAILABLE: &str = "STORAGE_UNAVAILABLE";
    pub const DB_UNAVAILABLE: &str = "DB_UNAVAILABLE";
    pub const INTERNAL_SERVER_ERROR: &str = "INTERNAL_SERVER_ERROR";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(AppError::title_required().http_status(), 400);
        assert_eq!(
            AppError::PayloadTooLarge("5GB".to_string()).http_status(),
            413
        );
        assert_eq!(
            AppError::UnsupportedFormat("text/plain".to_string()).http_status(),
            415
        );
        assert_eq!(AppError::video_not_found(Uuid::new_v4()).http_status(), 404);
        assert_eq!(
            AppError::Storage("backend down".to_string()).http_status(),
            500
        );
    }

    #[test]
    fn code_mapping() {
        assert_eq!(AppError::title_required().code(), codes::TITLE_REQUIRED);
        assert_eq!(
            AppError::invalid_segment_name("seg.ts").code(),
            codes::INVALID_SEGMENT_NAME
        );
        assert_eq!(
            AppError::master_playlist_not_found(Uuid::new_v4()).code(),
            codes::MASTER_PLAYLIST_NOT_FOUND
        );
        assert_eq!(
            AppError::AllRenditionsFailed("no outputs".to_string()).code(),
            codes::ALL_RENDITIONS_FAILED
        );
    }
}
