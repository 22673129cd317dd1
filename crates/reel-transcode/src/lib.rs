//! FFmpeg integration: probing, HLS ladder transcoding, thumbnails, and the
//! end-to-end pipeline for one transcoding job attempt.
//!
//! The subprocess boundary is isolated in [`ffmpeg::FfmpegRunner`]; everything
//! else builds argument lists, composes playlists, and moves bytes between the
//! temp workspace and [`reel_storage::Storage`].

pub mod ffmpeg;
pub mod hls;
pub mod pipeline;
pub mod probe;

pub use ffmpeg::FfmpegRunner;
pub use hls::{HlsTranscoder, RenditionOutput, TranscodeError, TranscodeOutcome};
pub use pipeline::{PipelineConfig, TranscodePipeline};
pub use probe::{MediaProber, ProbeError, SourceMetadata};
