//! HLS ladder transcoding: per-resolution encodes, master playlist
//! composition, and thumbnail extraction.

use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use reel_core::models::ResolutionProfile;
use reel_storage::{paths, Storage};

use crate::ffmpeg::{path_arg, FfmpegRunner};
use crate::probe::SourceMetadata;

/// HLS segment duration in seconds.
pub const SEGMENT_DURATION_SECS: u32 = 10;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("Failed to spawn ffmpeg: {0}")]
    Spawn(String),

    #[error("FFmpeg encode failed: {0}")]
    EncodeFailed(String),

    #[error("FFmpeg timed out after {0}s")]
    Timeout(u64),

    #[error("All renditions failed")]
    AllRenditionsFailed,

    #[error("Transcode cancelled")]
    Cancelled,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One successfully produced rendition.
#[derive(Debug, Clone)]
pub struct RenditionOutput {
    pub profile: ResolutionProfile,
    pub playlist_path: String,
    pub segment_paths: Vec<String>,
    /// Sum of segment sizes plus the playlist, in bytes.
    pub file_size: u64,
    pub duration_secs: f64,
}

/// Result of a full ladder run.
#[derive(Debug, Clone)]
pub struct TranscodeOutcome {
    pub outputs: Vec<RenditionOutput>,
    pub failed_resolutions: Vec<String>,
    pub master_playlist_path: String,
}

pub struct HlsTranscoder {
    runner: FfmpegRunner,
    storage: Arc<dyn Storage>,
}

impl HlsTranscoder {
    pub fn new(runner: FfmpegRunner, storage: Arc<dyn Storage>) -> Self {
        Self { runner, storage }
    }

    /// Transcode a local source into HLS renditions and upload them.
    ///
    /// Renditions that fail to encode are logged and skipped; the call only
    /// fails outright when nothing survives (`AllRenditionsFailed`), on
    /// cancellation, or when an upload of a finished rendition fails.
    #[tracing::instrument(skip(self, input_path, work_dir, metadata, cancel, on_progress))]
    pub async fn transcode_to_hls(
        &self,
        video_id: Uuid,
        input_path: &Path,
        work_dir: &Path,
        requested_resolutions: &[String],
        metadata: &SourceMetadata,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(f64, &str) + Send),
    ) -> Result<TranscodeOutcome, TranscodeError> {
        let ladder = filter_ladder(requested_resolutions, metadata.height);
        if ladder.is_empty() {
            tracing::warn!(
                video_id = %video_id,
                source_height = metadata.height,
                requested = ?requested_resolutions,
                "No renditions applicable to source"
            );
            return Err(TranscodeError::AllRenditionsFailed);
        }

        let total = ladder.len();
        let mut outputs: Vec<RenditionOutput> = Vec::with_capacity(total);
        let mut failed: Vec<String> = Vec::new();

        for (index, profile) in ladder.iter().enumerate() {
            let variant_dir = work_dir.join(profile.label);
            tokio::fs::create_dir_all(&variant_dir).await?;

            let args = build_encode_args(input_path, &variant_dir, *profile);

            let mut inner_progress = |inner: f64| {
                let overall = ((index as f64 + inner / 100.0) / total as f64) * 100.0;
                on_progress(overall, profile.label);
            };

            let encode = self
                .runner
                .run_encode(&args, metadata.duration_secs, cancel, &mut inner_progress)
                .await;

            match encode {
                Ok(()) => {}
                Err(TranscodeError::Cancelled) => return Err(TranscodeError::Cancelled),
                Err(e) => {
                    tracing::warn!(
                        video_id = %video_id,
                        resolution = profile.label,
                        error = %e,
                        "Rendition failed, continuing with remaining ladder"
                    );
                    failed.push(profile.label.to_string());
                    continue;
                }
            }

            let output = self
                .upload_rendition(video_id, &variant_dir, *profile, metadata.duration_secs)
                .await?;
            tracing::info!(
                video_id = %video_id,
                resolution = profile.label,
                segments = output.segment_paths.len(),
                file_size = output.file_size,
                "Rendition uploaded"
            );
            outputs.push(output);
        }

        if outputs.is_empty() {
            return Err(TranscodeError::AllRenditionsFailed);
        }

        let master = build_master_playlist(&outputs);
        let master_path = paths::master_playlist_path(video_id);
        self.storage
            .save(&master_path, master.into_bytes())
            .await
            .map_err(|e| TranscodeError::Storage(e.to_string()))?;

        Ok(TranscodeOutcome {
            outputs,
            failed_resolutions: failed,
            master_playlist_path: master_path,
        })
    }

    /// Upload one encoded rendition from the temp workspace to storage.
    async fn upload_rendition(
        &self,
        video_id: Uuid,
        variant_dir: &Path,
        profile: ResolutionProfile,
        duration_secs: f64,
    ) -> Result<RenditionOutput, TranscodeError> {
        let playlist_local = variant_dir.join("playlist.m3u8");
        let playlist_bytes = tokio::fs::read(&playlist_local).await?;
        let mut file_size = playlist_bytes.len() as u64;

        let playlist_path = paths::variant_playlist_path(video_id, profile.label);
        self.storage
            .save(&playlist_path, playlist_bytes)
            .await
            .map_err(|e| TranscodeError::Storage(e.to_string()))?;

        let mut segment_names: Vec<String> = Vec::new();
        let mut entries = tokio::fs::read_dir(variant_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("ts") {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    segment_names.push(name.to_string());
                }
            }
        }
        segment_names.sort();

        let mut segment_paths = Vec::with_capacity(segment_names.len());
        for name in &segment_names {
            let data = tokio::fs::read(variant_dir.join(name)).await?;
            file_size += data.len() as u64;
            let segment_path = paths::segment_path(video_id, profile.label, name);
            self.storage
                .save(&segment_path, data)
                .await
                .map_err(|e| TranscodeError::Storage(e.to_string()))?;
            segment_paths.push(segment_path);
        }

        Ok(RenditionOutput {
            profile,
            playlist_path,
            segment_paths,
            file_size,
            duration_secs,
        })
    }

    /// Extract a thumbnail frame and store it at the canonical path.
    /// Seeks to `min(10, duration/2)` and letterboxes into exactly 320x240.
    #[tracing::instrument(skip(self, input_path, work_dir))]
    pub async fn thumbnail(
        &self,
        video_id: Uuid,
        input_path: &Path,
        work_dir: &Path,
        duration_secs: f64,
    ) -> Result<String, TranscodeError> {
        let out_local = work_dir.join("thumbnail.jpg");
        let args = build_thumbnail_args(input_path, &out_local, thumbnail_timestamp(duration_secs));

        self.runner.run(&args).await?;

        let data = tokio::fs::read(&out_local).await?;
        let storage_path = paths::thumbnail_path(video_id);
        self.storage
            .save(&storage_path, data)
            .await
            .map_err(|e| TranscodeError::Storage(e.to_string()))?;

        tracing::info!(video_id = %video_id, path = %storage_path, "Thumbnail generated");

        Ok(storage_path)
    }
}

/// Intersect the requested labels with the ladder, drop anything the source
/// cannot carry without upscaling, and preserve the requested order.
/// Unknown labels are skipped with a warning.
pub fn filter_ladder(requested: &[String], source_height: u32) -> Vec<ResolutionProfile> {
    let mut result = Vec::new();
    for label in requested {
        let Some(profile) = ResolutionProfile::by_label(label) else {
            tracing::warn!(resolution = %label, "Unknown resolution label, skipping");
            continue;
        };
        if !profile.fits_source_height(source_height) {
            tracing::info!(
                resolution = %label,
                source_height = source_height,
                "Source too small for rendition, skipping"
            );
            continue;
        }
        if !result.contains(&profile) {
            result.push(profile);
        }
    }
    result
}

/// Argument list for one HLS rendition encode.
pub fn build_encode_args(
    input: &Path,
    variant_dir: &Path,
    profile: ResolutionProfile,
) -> Vec<String> {
    let playlist = variant_dir.join("playlist.m3u8");
    let segments = variant_dir.join("segment_%03d.ts");

    vec![
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-progress".to_string(),
        "pipe:2".to_string(),
        "-y".to_string(),
        "-i".to_string(),
        path_arg(input),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-preset".to_string(),
        "fast".to_string(),
        "-profile:v".to_string(),
        "main".to_string(),
        "-level".to_string(),
        "3.1".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-vf".to_string(),
        format!(
            "scale=-2:{}:force_original_aspect_ratio=decrease",
            profile.height
        ),
        "-b:v".to_string(),
        format!("{}k", profile.bitrate_kbps),
        "-maxrate".to_string(),
        format!("{}k", (profile.bitrate_kbps as f64 * 1.2) as u32),
        "-bufsize".to_string(),
        format!("{}k", profile.bitrate_kbps * 2),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
        "-ac".to_string(),
        "2".to_string(),
        "-ar".to_string(),
        "44100".to_string(),
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        SEGMENT_DURATION_SECS.to_string(),
        "-hls_playlist_type".to_string(),
        "vod".to_string(),
        "-hls_list_size".to_string(),
        "0".to_string(),
        "-hls_segment_filename".to_string(),
        path_arg(&segments),
        path_arg(&playlist),
    ]
}

/// Argument list for single-frame thumbnail extraction.
pub fn build_thumbnail_args(input: &Path, output: &Path, timestamp_secs: f64) -> Vec<String> {
    vec![
        "-hide_banner".to_string(),
        "-y".to_string(),
        "-ss".to_string(),
        format!("{:.3}", timestamp_secs),
        "-i".to_string(),
        path_arg(input),
        "-vframes".to_string(),
        "1".to_string(),
        "-vf".to_string(),
        "scale=320:240:force_original_aspect_ratio=decrease,pad=320:240:(ow-iw)/2:(oh-ih)/2"
            .to_string(),
        "-q:v".to_string(),
        "2".to_string(),
        path_arg(output),
    ]
}

/// Seek point for the thumbnail: 10s in, or the midpoint of short sources.
pub fn thumbnail_timestamp(duration_secs: f64) -> f64 {
    (duration_secs / 2.0).min(10.0).max(0.0)
}

/// Compose the master playlist, variants sorted by descending height.
pub fn build_master_playlist(outputs: &[RenditionOutput]) -> String {
    let mut sorted: Vec<&RenditionOutput> = outputs.iter().collect();
    sorted.sort_by(|a, b| b.profile.height.cmp(&a.profile.height));

    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n\n");
    for output in sorted {
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}x{}\n{}/playlist.m3u8\n",
            output.profile.bitrate_kbps as u64 * 1000,
            output.profile.width,
            output.profile.height,
            output.profile.label,
        ));
    }
    playlist
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(label: &str) -> ResolutionProfile {
        ResolutionProfile::by_label(label).unwrap()
    }

    fn rendition(label: &str) -> RenditionOutput {
        RenditionOutput {
            profile: profile(label),
            playlist_path: format!("hls/v/{}/playlist.m3u8", label),
            segment_paths: vec![],
            file_size: 0,
            duration_secs: 60.0,
        }
    }

    #[test]
    fn ladder_filter_drops_upscales_and_unknowns() {
        let requested = vec![
            "480p".to_string(),
            "720p".to_string(),
            "1080p".to_string(),
            "4k".to_string(),
        ];
        let surviving = filter_ladder(&requested, 720);
        let labels: Vec<&str> = surviving.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec!["480p", "720p"]);
    }

    #[test]
    fn ladder_filter_preserves_requested_order() {
        let requested = vec!["1080p".to_string(), "480p".to_string()];
        let surviving = filter_ladder(&requested, 1080);
        let labels: Vec<&str> = surviving.iter().map(|p| p.label).collect();
        assert_eq!(labels, vec!["1080p", "480p"]);
    }

    #[test]
    fn ladder_filter_zero_height_source_yields_nothing() {
        let requested = vec!["480p".to_string(), "720p".to_string()];
        assert!(filter_ladder(&requested, 0).is_empty());
    }

    #[test]
    fn ladder_filter_dedupes_repeated_labels() {
        let requested = vec!["480p".to_string(), "480p".to_string()];
        assert_eq!(filter_ladder(&requested, 480).len(), 1);
    }

    #[test]
    fn encode_args_carry_hls_and_rate_settings() {
        let args = build_encode_args(
            Path::new("/tmp/in.mp4"),
            Path::new("/tmp/work/720p"),
            profile("720p"),
        );
        let joined = args.join(" ");

        assert!(joined.contains("-c:v libx264"));
        assert!(joined.contains("-preset fast"));
        assert!(joined.contains("-profile:v main"));
        assert!(joined.contains("-level 3.1"));
        assert!(joined.contains("-pix_fmt yuv420p"));
        assert!(joined.contains("scale=-2:720:force_original_aspect_ratio=decrease"));
        assert!(joined.contains("-b:v 2500k"));
        assert!(joined.contains("-maxrate 3000k"));
        assert!(joined.contains("-bufsize 5000k"));
        assert!(joined.contains("-b:a 128k"));
        assert!(joined.contains("-ac 2"));
        assert!(joined.contains("-ar 44100"));
        assert!(joined.contains("-f hls"));
        assert!(joined.contains("-hls_time 10"));
        assert!(joined.contains("-hls_playlist_type vod"));
        assert!(joined.contains("-hls_list_size 0"));
        assert!(joined.contains("segment_%03d.ts"));
        assert!(joined.ends_with("playlist.m3u8"));
    }

    #[test]
    fn thumbnail_args_letterbox_to_exact_size() {
        let args = build_thumbnail_args(Path::new("/tmp/in.mp4"), Path::new("/tmp/t.jpg"), 10.0);
        let joined = args.join(" ");
        assert!(joined.contains("-ss 10.000"));
        assert!(joined.contains("-vframes 1"));
        assert!(joined.contains(
            "scale=320:240:force_original_aspect_ratio=decrease,pad=320:240:(ow-iw)/2:(oh-ih)/2"
        ));
        assert!(joined.contains("-q:v 2"));
    }

    #[test]
    fn thumbnail_seek_point() {
        assert_eq!(thumbnail_timestamp(60.0), 10.0);
        assert_eq!(thumbnail_timestamp(8.0), 4.0);
        assert_eq!(thumbnail_timestamp(0.0), 0.0);
    }

    #[test]
    fn master_playlist_sorted_descending_with_bandwidth() {
        let outputs = vec![rendition("480p"), rendition("1080p"), rendition("720p")];
        let playlist = build_master_playlist(&outputs);

        assert!(playlist.starts_with("#EXTM3U\n#EXT-X-VERSION:3\n\n"));

        let p1080 = playlist.find("1080p/playlist.m3u8").unwrap();
        let p720 = playlist.find("720p/playlist.m3u8").unwrap();
        let p480 = playlist.find("480p/playlist.m3u8").unwrap();
        assert!(p1080 < p720 && p720 < p480);

        assert!(playlist.contains("BANDWIDTH=5000000,RESOLUTION=1920x1080"));
        assert!(playlist.contains("BANDWIDTH=2500000,RESOLUTION=1280x720"));
        assert!(playlist.contains("BANDWIDTH=1200000,RESOLUTION=854x480"));
    }

    #[test]
    fn master_playlist_is_deterministic() {
        let outputs = vec![rendition("720p"), rendition("480p")];
        assert_eq!(build_master_playlist(&outputs), build_master_playlist(&outputs));
    }
}
