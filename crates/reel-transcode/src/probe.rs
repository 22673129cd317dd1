//! Source media probing via ffprobe.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Source unreadable: {0}")]
    SourceUnreadable(String),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),
}

/// Metadata extracted from a source blob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMetadata {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    /// Container bitrate in bits per second, when reported.
    pub bitrate: Option<u64>,
    pub fps: f64,
    pub codec: String,
    pub aspect_ratio: String,
}

pub struct MediaProber {
    ffprobe_path: String,
}

impl MediaProber {
    pub fn new(ffprobe_path: String) -> Self {
        Self { ffprobe_path }
    }

    /// Probe a local file. Object-store sources are localized into the job's
    /// temp workspace before this is called.
    #[tracing::instrument(skip(self), fields(
        process.command = "ffprobe",
        ffmpeg.operation = "probe"
    ))]
    pub async fn probe(&self, source_path: &Path) -> Result<SourceMetadata, ProbeError> {
        let start = std::time::Instant::now();

        let output = Command::new(&self.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
                "-select_streams",
                "v:0",
            ])
            .arg(source_path)
            .output()
            .await
            .map_err(|e| ProbeError::SourceUnreadable(format!("Failed to execute ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(ProbeError::SourceUnreadable(
                String::from_utf8_lossy(&output.stderr).to_string(),
            ));
        }

        let probe_data: serde_json::Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| ProbeError::InvalidMetadata(format!("Failed to parse ffprobe output: {}", e)))?;

        let metadata = parse_probe_output(&probe_data)?;

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            video_duration = metadata.duration_secs,
            width = metadata.width,
            height = metadata.height,
            codec = %metadata.codec,
            "Video probe completed"
        );

        Ok(metadata)
    }
}

/// Parse `r_frame_rate` of the form `num/den`. A zero denominator yields 0.
fn parse_frame_rate(raw: &str) -> f64 {
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() != 2 {
        return 0.0;
    }
    let num: f64 = match parts[0].parse() {
        Ok(n) => n,
        Err(_) => return 0.0,
    };
    let den: f64 = match parts[1].parse() {
        Ok(d) => d,
        Err(_) => return 0.0,
    };
    if den == 0.0 {
        0.0
    } else {
        num / den
    }
}

fn parse_probe_output(probe_data: &serde_json::Value) -> Result<SourceMetadata, ProbeError> {
    let stream = probe_data["streams"]
        .get(0)
        .ok_or(ProbeError::NoVideoStream)?;

    let format = &probe_data["format"];

    let duration_secs = format["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            stream["duration"]
                .as_str()
                .and_then(|d| d.parse::<f64>().ok())
        })
        .ok_or_else(|| ProbeError::InvalidMetadata("Could not parse duration".to_string()))?;

    let width = stream["width"]
        .as_u64()
        .ok_or_else(|| ProbeError::InvalidMetadata("Could not parse width".to_string()))?
        as u32;

    let height = stream["height"]
        .as_u64()
        .ok_or_else(|| ProbeError::InvalidMetadata("Could not parse height".to_string()))?
        as u32;

    let codec = stream["codec_name"]
        .as_str()
        .unwrap_or("unknown")
        .to_string();

    let bitrate = format["bit_rate"]
        .as_str()
        .and_then(|b| b.parse::<u64>().ok());

    let fps = stream["r_frame_rate"]
        .as_str()
        .map(parse_frame_rate)
        .unwrap_or(0.0);

    let aspect_ratio = stream["display_aspect_ratio"]
        .as_str()
        .map(String::from)
        .unwrap_or_else(|| format!("{}:{}", width, height));

    Ok(SourceMetadata {
        duration_secs,
        width,
        height,
        bitrate,
        fps,
        codec,
        aspect_ratio,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_rate_num_den() {
        assert_eq!(parse_frame_rate("30/1"), 30.0);
        assert_eq!(parse_frame_rate("30000/1001"), 30000.0 / 1001.0);
        assert_eq!(parse_frame_rate("25/0"), 0.0);
        assert_eq!(parse_frame_rate("garbage"), 0.0);
        assert_eq!(parse_frame_rate("30"), 0.0);
    }

    #[test]
    fn parses_full_probe_output() {
        let data = json!({
            "streams": [{
                "codec_name": "h264",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30/1",
                "display_aspect_ratio": "16:9"
            }],
            "format": {
                "duration": "60.500000",
                "bit_rate": "5000000"
            }
        });

        let metadata = parse_probe_output(&data).unwrap();
        assert_eq!(metadata.duration_secs, 60.5);
        assert_eq!(metadata.width, 1920);
        assert_eq!(metadata.height, 1080);
        assert_eq!(metadata.bitrate, Some(5_000_000));
        assert_eq!(metadata.fps, 30.0);
        assert_eq!(metadata.codec, "h264");
        assert_eq!(metadata.aspect_ratio, "16:9");
    }

    #[test]
    fn aspect_ratio_falls_back_to_dimensions() {
        let data = json!({
            "streams": [{
                "codec_name": "vp9",
                "width": 640,
                "height": 360,
                "r_frame_rate": "24/1"
            }],
            "format": { "duration": "10.0" }
        });

        let metadata = parse_probe_output(&data).unwrap();
        assert_eq!(metadata.aspect_ratio, "640:360");
        assert_eq!(metadata.bitrate, None);
    }

    #[test]
    fn missing_video_stream_is_an_error() {
        let data = json!({ "streams": [], "format": { "duration": "10.0" } });
        assert!(matches!(
            parse_probe_output(&data),
            Err(ProbeError::NoVideoStream)
        ));
    }

    #[test]
    fn missing_duration_is_invalid_metadata() {
        let data = json!({
            "streams": [{ "codec_name": "h264", "width": 100, "height": 100, "r_frame_rate": "30/1" }],
            "format": {}
        });
        assert!(matches!(
            parse_probe_output(&data),
            Err(ProbeError::InvalidMetadata(_))
        ));
    }

    #[tokio::test]
    async fn probing_missing_file_is_unreadable() {
        let prober = MediaProber::new("ffprobe".to_string());
        let result = prober.probe(Path::new("/nonexistent/video.mp4")).await;
        assert!(matches!(result, Err(ProbeError::SourceUnreadable(_))));
    }
}
