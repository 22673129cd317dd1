use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "output_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputStatus {
    Pending,
    Processing,
    Ready,
    Failed,
}

impl Display for OutputStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OutputStatus::Pending => write!(f, "pending"),
            OutputStatus::Processing => write!(f, "processing"),
            OutputStatus::Ready => write!(f, "ready"),
            OutputStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One entry of the encoding ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResolutionProfile {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    pub bitrate_kbps: u32,
}

impl ResolutionProfile {
    /// The fixed ladder, lowest rung first.
    pub const LADDER: [ResolutionProfile; 3] = [
        ResolutionProfile {
            label: "480p",
            width: 854,
            height: 480,
            bitrate_kbps: 1200,
        },
        ResolutionProfile {
            label: "720p",
            width: 1280,
            height: 720,
            bitrate_kbps: 2500,
        },
        ResolutionProfile {
            label: "1080p",
            width: 1920,
            height: 1080,
            bitrate_kbps: 5000,
        },
    ];

    pub fn by_label(label: &str) -> Option<ResolutionProfile> {
        Self::LADDER.iter().copied().find(|p| p.label == label)
    }

    /// Whether a source of the given height can carry this rendition
    /// without upscaling.
    pub fn fits_source_height(&self, source_height: u32) -> bool {
        source_height >= self.height
    }
}

/// One finished HLS rendition of a video.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VideoOutput {
    pub id: Uuid,
    pub video_id: Uuid,
    pub resolution: String,
    pub width: i32,
    pub height: i32,
    pub bitrate_kbps: i32,
    pub playlist_path: String,
    pub segment_dir: String,
    /// Sum of all segment sizes plus the playlist, in bytes.
    pub file_size: i64,
    pub segment_count: i32,
    pub segment_duration: f64,
    pub status: OutputStatus,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ladder_lookup_by_label() {
        let p = ResolutionProfile::by_label("720p").unwrap();
        assert_eq!((p.width, p.height, p.bitrate_kbps), (1280, 720, 2500));
        assert!(ResolutionProfile::by_label("240p").is_none());
    }

    #[test]
    fn ladder_is_sorted_ascending() {
        let heights: Vec<u32> = ResolutionProfile::LADDER.iter().map(|p| p.height).collect();
        assert_eq!(heights, vec![480, 720, 1080]);
    }

    #[test]
    fn never_upscale_gate() {
        let p1080 = ResolutionProfile::by_label("1080p").unwrap();
        assert!(p1080.fits_source_height(1080));
        assert!(!p1080.fits_source_height(720));
        let p480 = ResolutionProfile::by_label("480p").unwrap();
        assert!(!p480.fits_source_height(360));
        assert!(!p480.fits_source_height(0));
    }
}
