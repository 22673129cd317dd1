//! FFmpeg subprocess wrapper.
//!
//! The one dirty integration point: spawning ffmpeg, feeding it argument
//! lists, parsing progress off stderr, and enforcing wall-clock limits.
//! Callers pass `-progress pipe:2 -nostats` style invocations built by
//! [`crate::hls`]; this module never decides *what* to encode.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::hls::TranscodeError;

/// Number of trailing stderr lines kept for error reporting.
const STDERR_TAIL_LINES: usize = 40;

/// Minimum wall-clock budget for any encode, regardless of source duration.
const MIN_ENCODE_TIMEOUT_SECS: u64 = 60;

/// Encodes get `30 x` the source duration before they are killed.
const ENCODE_TIMEOUT_MULTIPLIER: f64 = 30.0;

pub struct FfmpegRunner {
    ffmpeg_path: String,
}

impl FfmpegRunner {
    pub fn new(ffmpeg_path: String) -> Self {
        Self { ffmpeg_path }
    }

    /// Wall-clock limit for an encode of a source with the given duration.
    pub fn encode_timeout(source_duration_secs: f64) -> Duration {
        let secs = (source_duration_secs * ENCODE_TIMEOUT_MULTIPLIER).ceil() as u64;
        Duration::from_secs(secs.max(MIN_ENCODE_TIMEOUT_SECS))
    }

    /// Run an encode, reporting progress as a percentage of
    /// `total_duration_secs`. Progress callbacks are debounced at 1%.
    ///
    /// The child is killed on timeout and on cancellation; no callback fires
    /// after either.
    #[tracing::instrument(skip(self, args, on_progress, cancel), fields(process.command = "ffmpeg"))]
    pub async fn run_encode(
        &self,
        args: &[String],
        total_duration_secs: f64,
        cancel: &CancellationToken,
        on_progress: &mut (dyn FnMut(f64) + Send),
    ) -> Result<(), TranscodeError> {
        let start = std::time::Instant::now();
        let timeout = Self::encode_timeout(total_duration_secs);

        let mut child = Command::new(&self.ffmpeg_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscodeError::Spawn(format!("Failed to spawn ffmpeg: {}", e)))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TranscodeError::Spawn("ffmpeg stderr not captured".to_string()))?;
        let mut lines = BufReader::new(stderr).lines();

        let mut tail: Vec<String> = Vec::with_capacity(STDERR_TAIL_LINES);
        let mut last_reported: f64 = -1.0;

        let drive = async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Some(out_secs) = parse_progress_line(&line) {
                    if total_duration_secs > 0.0 {
                        let percent = (out_secs / total_duration_secs * 100.0).clamp(0.0, 100.0);
                        if percent - last_reported >= 1.0 {
                            last_reported = percent;
                            on_progress(percent);
                        }
                    }
                } else if !line.trim().is_empty() && !line.contains('=') {
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            }
            child.wait().await
        };

        let status = tokio::select! {
            status = drive => status.map_err(|e| {
                TranscodeError::Spawn(format!("Failed to wait for ffmpeg: {}", e))
            })?,
            _ = tokio::time::sleep(timeout) => {
                tracing::error!(timeout_secs = timeout.as_secs(), "FFmpeg encode timed out, killing");
                return Err(TranscodeError::Timeout(timeout.as_secs()));
            }
            _ = cancel.cancelled() => {
                tracing::info!("FFmpeg encode cancelled, killing");
                return Err(TranscodeError::Cancelled);
            }
        };

        if !status.success() {
            return Err(TranscodeError::EncodeFailed(tail.join("\n")));
        }

        tracing::info!(
            duration_ms = start.elapsed().as_millis() as u64,
            "FFmpeg encode completed"
        );

        Ok(())
    }

    /// Run a short, non-progress invocation (thumbnail extraction).
    #[tracing::instrument(skip(self, args), fields(process.command = "ffmpeg"))]
    pub async fn run(&self, args: &[String]) -> Result<(), TranscodeError> {
        let result = tokio::time::timeout(
            Duration::from_secs(MIN_ENCODE_TIMEOUT_SECS),
            Command::new(&self.ffmpeg_path)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| TranscodeError::Timeout(MIN_ENCODE_TIMEOUT_SECS))?
        .map_err(|e| TranscodeError::Spawn(format!("Failed to execute ffmpeg: {}", e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            let tail: Vec<&str> = stderr.lines().rev().take(STDERR_TAIL_LINES).collect();
            return Err(TranscodeError::EncodeFailed(
                tail.into_iter().rev().collect::<Vec<_>>().join("\n"),
            ));
        }

        Ok(())
    }
}

/// Extract the output position in seconds from a `-progress pipe:2` line
/// (`out_time_ms=` / `out_time=`) or a stats line (`time=HH:MM:SS.cc`).
fn parse_progress_line(line: &str) -> Option<f64> {
    let line = line.trim();

    // Despite the name, out_time_ms is in microseconds.
    if let Some(raw) = line.strip_prefix("out_time_ms=") {
        return raw.parse::<i64>().ok().map(|us| us.max(0) as f64 / 1_000_000.0);
    }

    if let Some(raw) = line.strip_prefix("out_time=") {
        return parse_clock(raw);
    }

    if let Some(idx) = line.find("time=") {
        let rest = &line[idx + 5..];
        let token = rest.split_whitespace().next()?;
        return parse_clock(token);
    }

    None
}

/// Parse `HH:MM:SS.fraction` into seconds.
fn parse_clock(raw: &str) -> Option<f64> {
    let mut parts = raw.split(':');
    let hours: f64 = parts.next()?.parse().ok()?;
    let minutes: f64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Validate an executable path: no shell metacharacters, no traversal.
pub fn validate_tool_path(path: &str) -> Result<(), anyhow::Error> {
    let dangerous = [';', '|', '&', '$', '`', '(', ')', '<', '>', '\n', '\r'];
    if path.chars().any(|c| dangerous.contains(&c)) {
        return Err(anyhow::anyhow!("Path contains dangerous characters: {}", path));
    }
    if path.contains("..") {
        return Err(anyhow::anyhow!("Path contains directory traversal: {}", path));
    }
    Ok(())
}

/// Render a local path for an argument list.
pub(crate) fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_from_out_time_ms() {
        assert_eq!(parse_progress_line("out_time_ms=5000000"), Some(5.0));
        assert_eq!(parse_progress_line("out_time_ms=-9223372036854775808"), Some(0.0));
    }

    #[test]
    fn progress_from_out_time() {
        assert_eq!(parse_progress_line("out_time=00:01:30.500000"), Some(90.5));
    }

    #[test]
    fn progress_from_stats_line() {
        let line = "frame= 120 fps= 30 q=28.0 size= 512kB time=00:00:04.00 bitrate=1048.6kbits/s";
        assert_eq!(parse_progress_line(line), Some(4.0));
    }

    #[test]
    fn non_progress_lines_ignored() {
        assert_eq!(parse_progress_line("speed=1.02x"), None);
        assert_eq!(parse_progress_line("Press [q] to stop"), None);
        assert_eq!(parse_progress_line(""), None);
    }

    #[test]
    fn clock_parse_rejects_malformed() {
        assert_eq!(parse_clock("00:00"), None);
        assert_eq!(parse_clock("a:b:c"), None);
        assert_eq!(parse_clock("00:00:01:00"), None);
        assert_eq!(parse_clock("01:02:03.5"), Some(3723.5));
    }

    #[test]
    fn encode_timeout_is_proportional_with_floor() {
        assert_eq!(FfmpegRunner::encode_timeout(60.0).as_secs(), 1800);
        assert_eq!(FfmpegRunner::encode_timeout(0.5).as_secs(), 60);
        assert_eq!(FfmpegRunner::encode_timeout(0.0).as_secs(), 60);
    }

    #[test]
    fn tool_path_validation() {
        assert!(validate_tool_path("/usr/bin/ffmpeg").is_ok());
        assert!(validate_tool_path("ffmpeg").is_ok());
        assert!(validate_tool_path("ffmpeg; rm -rf /").is_err());
        assert!(validate_tool_path("../ffmpeg").is_err());
    }
}
