use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "job_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    HlsTranscode,
    /// Reserved for standalone thumbnail regeneration; not dispatched today.
    Thumbnail,
}

impl Display for JobType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobType::HlsTranscode => write!(f, "hls_transcode"),
            JobType::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

impl FromStr for JobType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hls_transcode" => Ok(JobType::HlsTranscode),
            "thumbnail" => Ok(JobType::Thumbnail),
            _ => Err(anyhow::anyhow!("Invalid job type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            JobStatus::Queued => write!(f, "queued"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
            JobStatus::Retrying => write!(f, "retrying"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "retrying" => Ok(JobStatus::Retrying),
            _ => Err(anyhow::anyhow!("Invalid job status: {}", s)),
        }
    }
}

/// Lower number dispatches first; FIFO within the same priority.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High = 1,
    #[default]
    Normal = 2,
    Low = 3,
}

impl Priority {
    pub fn as_i32(&self) -> i32 {
        *self as i32
    }

    pub fn from_i32(value: i32) -> Self {
        match value {
            i32::MIN..=1 => Priority::High,
            2 => Priority::Normal,
            _ => Priority::Low,
        }
    }
}

/// Deterministic queue key: at most one non-terminal job per video.
pub fn job_key(video_id: Uuid) -> String {
    format!("transcode-{}", video_id)
}

/// The durable unit of work a transcoding worker claims and runs.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TranscodingJob {
    pub id: Uuid,
    pub video_id: Uuid,
    /// External de-duplication key, `transcode-{video_id}`.
    pub job_key: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub progress_percentage: i32,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub job_data: serde_json::Value,
    pub result_data: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl TranscodingJob {
    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_attempts
    }

    pub fn data_as<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        serde_json::from_value(self.job_data.clone()).ok()
    }

    pub fn result_as<T: for<'de> Deserialize<'de>>(&self) -> Option<T> {
        self.result_data
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

/// Typed payload stored in `job_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobData {
    pub input_path: String,
    pub requested_resolutions: Vec<String>,
    /// Last progress snapshot, refreshed while the job runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
}

/// Progress detail persisted alongside `progress_percentage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobProgress {
    pub percent: i32,
    pub current_resolution: Option<String>,
    pub completed_resolutions: Vec<String>,
    pub current_task: Option<String>,
    #[serde(rename = "estimatedTimeRemaining")]
    pub estimated_time_remaining_secs: Option<u64>,
}

/// One successfully finished rendition, recorded in `result_data`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenditionResult {
    pub resolution: String,
    pub playlist_path: String,
    pub segment_count: u32,
    pub file_size: u64,
}

/// Typed payload stored in `result_data` on completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    pub outputs: Vec<RenditionResult>,
    pub thumbnail_path: String,
    pub failed_resolutions: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_key_is_deterministic() {
        let id = Uuid::new_v4();
        assert_eq!(job_key(id), format!("transcode-{}", id));
        assert_eq!(job_key(id), job_key(id));
    }

    #[test]
    fn priority_ordering_low_number_first() {
        assert!(Priority::High.as_i32() < Priority::Normal.as_i32());
        assert!(Priority::Normal.as_i32() < Priority::Low.as_i32());
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Priority::from_i32(1), Priority::High);
        assert_eq!(Priority::from_i32(2), Priority::Normal);
        assert_eq!(Priority::from_i32(7), Priority::Low);
    }

    #[test]
    fn status_terminality() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(!JobStatus::Retrying.is_terminal());
    }

    #[test]
    fn job_data_roundtrip() {
        let data = JobData {
            input_path: "uploads/raw/abc.mp4".to_string(),
            requested_resolutions: vec!["480p".to_string(), "720p".to_string()],
            progress: Some(JobProgress {
                percent: 42,
                current_resolution: Some("720p".to_string()),
                completed_resolutions: vec!["480p".to_string()],
                current_task: Some("transcoding".to_string()),
                estimated_time_remaining_secs: Some(120),
            }),
        };
        let value = serde_json::to_value(&data).unwrap();
        let back: JobData = serde_json::from_value(value).unwrap();
        assert_eq!(back.input_path, data.input_path);
        assert_eq!(back.requested_resolutions, data.requested_resolutions);
        assert_eq!(back.progress, data.progress);
    }

    #[test]
    fn can_retry_respects_max_attempts() {
        let mut job = TranscodingJob {
            id: Uuid::new_v4(),
            video_id: Uuid::new_v4(),
            job_key: "transcode-x".to_string(),
            job_type: JobType::HlsTranscode,
            status: JobStatus::Failed,
            priority: Priority::Normal.as_i32(),
            progress_percentage: 0,
            attempt_count: 2,
            max_attempts: 3,
            job_data: serde_json::json!({}),
            result_data: None,
            error_message: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            next_retry_at: None,
        };
        assert!(job.can_retry());
        job.attempt_count = 3;
        assert!(!job.can_retry());
    }
}
