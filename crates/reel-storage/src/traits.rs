//! Storage abstraction trait
//!
//! This module defines the Storage trait that all storage backends must
//! implement.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::path::PathBuf;
use std::pin::Pin;
use thiserror::Error;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Chunked download stream.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Storage abstraction trait.
///
/// Paths are logical: relative, forward-slash separated, as produced by
/// [`crate::paths`]. They round-trip through the database unchanged
/// regardless of which backend resolved them.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Write a blob, creating intermediate directories/prefixes as needed.
    /// Returns the logical path that was written.
    async fn save(&self, path: &str, data: Vec<u8>) -> StorageResult<String>;

    /// Read a whole blob into memory.
    async fn get(&self, path: &str) -> StorageResult<Vec<u8>>;

    /// Read a blob as a stream of chunks (for the serving path).
    async fn get_stream(&self, path: &str) -> StorageResult<ByteStream>;

    /// Delete a single blob. Fails with `NotFound` when it does not exist.
    async fn delete(&self, path: &str) -> StorageResult<()>;

    /// Whether a blob exists at the given path.
    async fn exists(&self, path: &str) -> StorageResult<bool>;

    /// Create a directory (no-op on object stores, where prefixes are
    /// implicit).
    async fn mkdir(&self, path: &str) -> StorageResult<()>;

    /// Recursively delete everything under a prefix. Idempotent: succeeds
    /// when nothing exists there.
    async fn rmdir(&self, path: &str) -> StorageResult<()>;

    /// Resolved on-disk location of a blob, for backends that keep blobs on
    /// the local filesystem. Object stores return `None`; callers fall back
    /// to fetching the bytes.
    async fn local_path(&self, path: &str) -> StorageResult<Option<PathBuf>> {
        let _ = path;
        Ok(None)
    }
}
