use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "video_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum VideoStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl VideoStatus {
    /// Whether the transition `self -> next` is legal.
    ///
    /// READY and FAILED are terminal except for an explicit retry reset to
    /// PENDING. Same-state writes are allowed (idempotent updates).
    pub fn can_transition(self, next: VideoStatus) -> bool {
        use VideoStatus::*;
        match (self, next) {
            (a, b) if a == b => true,
            (Pending, Processing) => true,
            (Processing, Ready) | (Processing, Failed) => true,
            // Direct failure before a worker picks the job up (e.g. enqueue error).
            (Pending, Failed) => true,
            // Explicit retry resets.
            (Failed, Pending) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, VideoStatus::Ready | VideoStatus::Failed)
    }
}

impl Display for VideoStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            VideoStatus::Pending => write!(f, "pending"),
            VideoStatus::Processing => write!(f, "processing"),
            VideoStatus::Ready => write!(f, "ready"),
            VideoStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for VideoStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(VideoStatus::Pending),
            "processing" => Ok(VideoStatus::Processing),
            "ready" => Ok(VideoStatus::Ready),
            "failed" => Ok(VideoStatus::Failed),
            _ => Err(anyhow::anyhow!("Invalid video status: {}", s)),
        }
    }
}

/// A logical video asset: the uploaded source plus everything derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Video {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub original_filename: String,
    /// Lowercased, with leading dot (".mp4").
    pub file_extension: String,
    pub file_size: i64,
    pub mime_type: String,
    /// Storage path of the uploaded source blob (relative, POSIX separators).
    pub upload_path: String,
    pub duration_seconds: Option<i32>,
    pub thumbnail_path: Option<String>,
    pub status: VideoStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Listing filter for `GET /api/v1/videos`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct VideoListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    pub status: Option<VideoStatus>,
    pub search: Option<String>,
    pub tags: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub resolution: Option<String>,
}

impl VideoListQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(20).clamp(1, 100)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.limit()
    }

    /// Sort column restricted to an allowlist so user input never reaches SQL.
    pub fn sort_column(&self) -> &'static str {
        match self.sort_by.as_deref() {
            Some("title") => "title",
            Some("updated_at") => "updated_at",
            Some("file_size") => "file_size",
            Some("duration_seconds") => "duration_seconds",
            _ => "created_at",
        }
    }

    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .map(|t| {
                t.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One page of results with pagination metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Paginated<T> {
    pub fn new(items: Vec<T>, page: i64, limit: i64, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + limit - 1) / limit
        };
        Self {
            items,
            page,
            limit,
            total,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display_roundtrip() {
        for status in [
            VideoStatus::Pending,
            VideoStatus::Processing,
            VideoStatus::Ready,
            VideoStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<VideoStatus>().unwrap(), status);
        }
        assert!("bogus".parse::<VideoStatus>().is_err());
    }

    #[test]
    fn legal_transitions() {
        use VideoStatus::*;
        assert!(Pending.can_transition(Processing));
        assert!(Processing.can_transition(Ready));
        assert!(Processing.can_transition(Failed));
        assert!(Pending.can_transition(Failed));
        assert!(Failed.can_transition(Pending));
        assert!(Ready.can_transition(Ready));
    }

    #[test]
    fn illegal_transitions() {
        use VideoStatus::*;
        assert!(!Ready.can_transition(Processing));
        assert!(!Ready.can_transition(Pending));
        assert!(!Failed.can_transition(Processing));
        assert!(!Pending.can_transition(Ready));
        assert!(!Processing.can_transition(Pending));
    }

    #[test]
    fn list_query_defaults_and_clamps() {
        let query = VideoListQuery::default();
        assert_eq!(query.page(), 1);
        assert_eq!(query.limit(), 20);
        assert_eq!(query.offset(), 0);
        assert_eq!(query.sort_column(), "created_at");

        let query = VideoListQuery {
            page: Some(0),
            limit: Some(1000),
            sort_by: Some("file_size; DROP TABLE videos".to_string()),
            ..Default::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.limit(), 100);
        assert_eq!(query.sort_column(), "created_at");
    }

    #[test]
    fn tag_list_splits_and_trims() {
        let query = VideoListQuery {
            tags: Some(" rust, video ,, hls ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.tag_list(), vec!["rust", "video", "hls"]);
    }

    #[test]
    fn pagination_math() {
        let page: Paginated<i32> = Paginated::new(vec![1, 2, 3], 1, 3, 10);
        assert_eq!(page.total_pages, 4);
        let empty: Paginated<i32> = Paginated::new(vec![], 1, 20, 0);
        assert_eq!(empty.total_pages, 0);
    }
}
