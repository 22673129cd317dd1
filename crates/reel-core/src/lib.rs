//! Core domain types for the video ingestion and streaming service.
//!
//! This crate holds the entity models (videos, renditions, transcoding jobs),
//! the unified error type, and the environment-driven configuration. It has no
//! I/O of its own; storage, database, and FFmpeg integrations live in the
//! sibling crates.

pub mod config;
pub mod error;
pub mod models;

pub use config::{AppEnv, Config, StorageDriver};
pub use error::{AppError, AppResult};
