//! End-to-end execution of one transcoding job attempt:
//! download -> probe -> transcode -> thumbnail -> persist outputs -> statuses.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use reel_core::models::{
    JobProgress, JobResult, RenditionResult, TranscodingJob, VideoStatus,
};
use reel_db::{JobRepository, NewOutput, OutputRepository, VideoRepository};
use reel_storage::Storage;

use crate::hls::{HlsTranscoder, TranscodeError, SEGMENT_DURATION_SECS};
use crate::probe::MediaProber;

#[derive(Clone)]
pub struct PipelineConfig {
    /// Remove the uploaded source blob after a successful transcode.
    pub delete_source_after_transcode: bool,
}

/// Orchestrates the full pipeline for a claimed job. Failure handling and the
/// retry state machine live in the worker; this type reports errors upward
/// and performs no status writes after cancellation.
pub struct TranscodePipeline {
    videos: VideoRepository,
    outputs: OutputRepository,
    jobs: JobRepository,
    storage: Arc<dyn Storage>,
    prober: MediaProber,
    transcoder: HlsTranscoder,
    config: PipelineConfig,
}

impl TranscodePipeline {
    pub fn new(
        videos: VideoRepository,
        outputs: OutputRepository,
        jobs: JobRepository,
        storage: Arc<dyn Storage>,
        prober: MediaProber,
        transcoder: HlsTranscoder,
        config: PipelineConfig,
    ) -> Self {
        Self {
            videos,
            outputs,
            jobs,
            storage,
            prober,
            transcoder,
            config,
        }
    }

    /// Run one attempt for a claimed job. The job row is already PROCESSING.
    #[tracing::instrument(skip(self, job, cancel), fields(video_id = %job.video_id, attempt = job.attempt_count))]
    pub async fn run(&self, job: &TranscodingJob, cancel: CancellationToken) -> Result<JobResult> {
        let video_id = job.video_id;
        let data: reel_core::models::JobData = job
            .data_as()
            .context("Job data is missing or malformed")?;

        self.videos
            .update_status(video_id, VideoStatus::Processing)
            .await
            .context("Failed to mark video processing")?;

        let work_dir = TempDir::new().context("Failed to create temp workspace")?;
        let work_path = work_dir.path();

        // Local backends expose the upload in place; object stores are
        // fetched into the temp workspace first.
        let resolved = self
            .storage
            .local_path(&data.input_path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to resolve source blob: {}", e))?;

        let input_local = match resolved {
            Some(path) => {
                tracing::info!(input = %data.input_path, "Reading source in place");
                path
            }
            None => {
                tracing::info!(input = %data.input_path, "Localizing source");
                let source_bytes = self
                    .storage
                    .get(&data.input_path)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to fetch source blob: {}", e))?;

                let ext = std::path::Path::new(&data.input_path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("mp4");
                let local = work_path.join(format!("source.{}", ext));
                tokio::fs::write(&local, source_bytes)
                    .await
                    .context("Failed to write source to temp workspace")?;
                local
            }
        };

        let metadata = self
            .prober
            .probe(&input_local)
            .await
            .context("Failed to probe source")?;

        tracing::info!(
            duration = metadata.duration_secs,
            width = metadata.width,
            height = metadata.height,
            codec = %metadata.codec,
            "Source metadata extracted"
        );

        self.videos
            .update_metadata(video_id, metadata.duration_secs)
            .await
            .context("Failed to store source metadata")?;

        // Progress writes go through a channel so the encode loop never
        // blocks on the database; the writer debounces to 1% granularity.
        let (tx, rx) = mpsc::unbounded_channel::<(f64, String)>();
        let writer = spawn_progress_writer(self.jobs.clone(), video_id, rx);

        let mut on_progress = move |percent: f64, resolution: &str| {
            let _ = tx.send((percent, resolution.to_string()));
        };

        let outcome = self
            .transcoder
            .transcode_to_hls(
                video_id,
                &input_local,
                work_path,
                &data.requested_resolutions,
                &metadata,
                &cancel,
                &mut on_progress,
            )
            .await;

        drop(on_progress);
        let _ = writer.await;

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(TranscodeError::Cancelled) => {
                return Err(TranscodeError::Cancelled.into());
            }
            Err(e) => return Err(e).context("Transcode failed"),
        };

        let thumbnail_path = self
            .transcoder
            .thumbnail(video_id, &input_local, work_path, metadata.duration_secs)
            .await
            .context("Failed to generate thumbnail")?;

        let new_outputs: Vec<NewOutput> = outcome
            .outputs
            .iter()
            .map(|o| NewOutput {
                resolution: o.profile.label.to_string(),
                width: o.profile.width as i32,
                height: o.profile.height as i32,
                bitrate_kbps: o.profile.bitrate_kbps as i32,
                playlist_path: o.playlist_path.clone(),
                segment_dir: reel_storage::paths::variant_prefix(video_id, o.profile.label),
                file_size: o.file_size as i64,
                segment_count: o.segment_paths.len() as i32,
                segment_duration: SEGMENT_DURATION_SECS as f64,
            })
            .collect();

        self.outputs
            .save_outputs(video_id, &new_outputs, &thumbnail_path)
            .await
            .context("Failed to persist outputs")?;

        self.videos
            .update_status(video_id, VideoStatus::Ready)
            .await
            .context("Failed to mark video ready")?;

        let result = JobResult {
            outputs: outcome
                .outputs
                .iter()
                .map(|o| RenditionResult {
                    resolution: o.profile.label.to_string(),
                    playlist_path: o.playlist_path.clone(),
                    segment_count: o.segment_paths.len() as u32,
                    file_size: o.file_size,
                })
                .collect(),
            thumbnail_path,
            failed_resolutions: outcome.failed_resolutions.clone(),
        };

        self.jobs
            .mark_completed(video_id, &result)
            .await
            .context("Failed to mark job completed")?;

        if self.config.delete_source_after_transcode {
            if let Err(e) = self.storage.delete(&data.input_path).await {
                tracing::warn!(
                    video_id = %video_id,
                    input = %data.input_path,
                    error = %e,
                    "Failed to delete source after transcode"
                );
            }
        }

        tracing::info!(
            video_id = %video_id,
            outputs = result.outputs.len(),
            failed = result.failed_resolutions.len(),
            "Transcode pipeline completed"
        );

        Ok(result)
    }
}

/// Drain progress events, translate them into `JobProgress` snapshots, and
/// write at most one row update per 1% step.
fn spawn_progress_writer(
    jobs: JobRepository,
    video_id: Uuid,
    mut rx: mpsc::UnboundedReceiver<(f64, String)>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let started = Instant::now();
        let mut last_written: i32 = -1;
        let mut current_resolution: Option<String> = None;
        let mut completed: Vec<String> = Vec::new();

        while let Some((percent, resolution)) = rx.recv().await {
            if current_resolution.as_deref() != Some(resolution.as_str()) {
                if let Some(prev) = current_resolution.take() {
                    completed.push(prev);
                }
                current_resolution = Some(resolution.clone());
            }

            let whole = percent.floor() as i32;
            if whole <= last_written {
                continue;
            }
            last_written = whole;

            let progress = JobProgress {
                percent: whole.clamp(0, 100),
                current_resolution: current_resolution.clone(),
                completed_resolutions: completed.clone(),
                current_task: Some("transcoding".to_string()),
                estimated_time_remaining_secs: estimate_remaining(started.elapsed().as_secs_f64(), percent),
            };

            if let Err(e) = jobs.update_progress(video_id, &progress).await {
                tracing::warn!(video_id = %video_id, error = %e, "Failed to write job progress");
            }
        }
    })
}

/// Advisory ETA: extrapolate from measured throughput once enough of the job
/// has completed to make the estimate meaningful.
fn estimate_remaining(elapsed_secs: f64, percent: f64) -> Option<u64> {
    if percent < 5.0 || percent >= 100.0 {
        return None;
    }
    let rate = elapsed_secs / percent;
    Some((rate * (100.0 - percent)).round() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eta_requires_minimum_progress() {
        assert_eq!(estimate_remaining(10.0, 0.0), None);
        assert_eq!(estimate_remaining(10.0, 4.9), None);
        assert_eq!(estimate_remaining(10.0, 100.0), None);
    }

    #[test]
    fn eta_extrapolates_measured_rate() {
        // 50% done in 60s -> another 60s to go.
        assert_eq!(estimate_remaining(60.0, 50.0), Some(60));
        // 25% done in 30s -> 90s remaining.
        assert_eq!(estimate_remaining(30.0, 25.0), Some(90));
    }
}
