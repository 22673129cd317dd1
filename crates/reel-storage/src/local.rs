use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Local filesystem storage implementation
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    /// Cached canonical base path to avoid blocking canonicalize() on every
    /// resolve_path call.
    base_path_canonical: PathBuf,
}

impl LocalStorage {
    /// # Arguments
    /// * `base_path` - Root directory for blob storage (e.g., "/var/lib/reel/storage")
    pub async fn new(base_path: impl Into<PathBuf>) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        let base_path_canonical = tokio::task::spawn_blocking({
            let p = base_path.clone();
            move || p.canonicalize()
        })
        .await
        .map_err(|e| StorageError::ConfigError(format!("spawn_blocking failed: {}", e)))?
        .map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        Ok(LocalStorage {
            base_path,
            base_path_canonical,
        })
    }

    /// Converts a logical path to a filesystem path. Rejects path traversal
    /// and uses the cached canonical base plus spawn_blocking for
    /// canonicalization to avoid blocking the async runtime.
    async fn resolve_path(&self, logical: &str) -> StorageResult<PathBuf> {
        if logical.is_empty() || logical.contains("..") || logical.starts_with('/') {
            return Err(StorageError::InvalidPath(
                "Storage path contains invalid characters".to_string(),
            ));
        }

        let path = self.base_path.join(logical);

        if fs::try_exists(&path).await.unwrap_or(false) {
            let path_clone = path.clone();
            let base_canonical = self.base_path_canonical.clone();
            let canonical = tokio::task::spawn_blocking(move || path_clone.canonicalize())
                .await
                .map_err(|e| StorageError::ConfigError(format!("spawn_blocking failed: {}", e)))?
                .map_err(|e| {
                    StorageError::ConfigError(format!("Failed to canonicalize path: {}", e))
                })?;
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidPath(
                    "Storage path resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn save(&self, logical: &str, data: Vec<u8>) -> StorageResult<String> {
        let path = self.resolve_path(logical).await?;
        let size = data.len();

        self.ensure_parent_dir(&path).await?;

        let start = std::time::Instant::now();

        let mut file = fs::File::create(&path).await.map_err(|e| {
            tracing::error!(path = %path.display(), logical = %logical, error = %e, "Local storage save create failed");
            StorageError::UploadFailed(format!("Failed to create file {}: {}", path.display(), e))
        })?;

        file.write_all(&data).await.map_err(|e| {
            tracing::error!(path = %path.display(), logical = %logical, error = %e, "Local storage save write failed");
            StorageError::UploadFailed(format!("Failed to write file {}: {}", path.display(), e))
        })?;

        file.sync_all().await.map_err(|e| {
            tracing::error!(path = %path.display(), logical = %logical, error = %e, "Local storage save sync failed");
            StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
        })?;

        tracing::info!(
            path = %path.display(),
            logical = %logical,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage save successful"
        );

        Ok(logical.to_string())
    }

    async fn get(&self, logical: &str) -> StorageResult<Vec<u8>> {
        let path = self.resolve_path(logical).await?;
        let start = std::time::Instant::now();

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(logical.to_string()));
        }

        let data = fs::read(&path).await.map_err(|e| {
            tracing::error!(path = %path.display(), logical = %logical, error = %e, "Local storage get read failed");
            StorageError::DownloadFailed(format!("Failed to read file {}: {}", path.display(), e))
        })?;

        tracing::debug!(
            logical = %logical,
            size_bytes = data.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage get successful"
        );

        Ok(data)
    }

    async fn get_stream(&self, logical: &str) -> StorageResult<ByteStream> {
        let path = self.resolve_path(logical).await?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(logical.to_string()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            tracing::error!(path = %path.display(), logical = %logical, error = %e, "Local storage stream open failed");
            StorageError::DownloadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let reader = tokio_util::io::ReaderStream::new(file);
        let stream = reader.map(|result| {
            result.map_err(|e| StorageError::DownloadFailed(format!("Failed to read chunk: {}", e)))
        });

        Ok(Box::pin(stream))
    }

    async fn delete(&self, logical: &str) -> StorageResult<()> {
        let path = self.resolve_path(logical).await?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::NotFound(logical.to_string()));
        }

        fs::remove_file(&path).await.map_err(|e| {
            tracing::error!(path = %path.display(), logical = %logical, error = %e, "Local storage delete failed");
            StorageError::DeleteFailed(format!("Failed to delete file {}: {}", path.display(), e))
        })?;

        tracing::debug!(logical = %logical, "Local storage delete successful");

        Ok(())
    }

    async fn exists(&self, logical: &str) -> StorageResult<bool> {
        let path = self.resolve_path(logical).await?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn mkdir(&self, logical: &str) -> StorageResult<()> {
        let path = self.resolve_path(logical).await?;
        fs::create_dir_all(&path).await.map_err(|e| {
            StorageError::BackendError(format!(
                "Failed to create directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(())
    }

    /// Uploads already live on local disk, so jobs can read them in place
    /// instead of copying through the trait.
    async fn local_path(&self, logical: &str) -> StorageResult<Option<PathBuf>> {
        let path = self.resolve_path(logical).await?;
        if fs::try_exists(&path).await.unwrap_or(false) {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    async fn rmdir(&self, logical: &str) -> StorageResult<()> {
        let path = self.resolve_path(logical).await?;

        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }

        fs::remove_dir_all(&path).await.map_err(|e| {
            tracing::error!(path = %path.display(), logical = %logical, error = %e, "Local storage rmdir failed");
            StorageError::DeleteFailed(format!(
                "Failed to remove directory {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(logical = %logical, "Local storage rmdir successful");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tempfile::tempdir;

    #[tokio::test]
    async fn save_then_get_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let data = b"test data".to_vec();
        let path = storage
            .save("uploads/raw/test.mp4", data.clone())
            .await
            .unwrap();

        assert_eq!(path, "uploads/raw/test.mp4");
        assert_eq!(storage.get(&path).await.unwrap(), data);
    }

    #[tokio::test]
    async fn returned_paths_are_logical_not_absolute() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let path = storage.save("hls/v/480p/playlist.m3u8", b"#EXTM3U".to_vec())
            .await
            .unwrap();
        assert!(!path.starts_with('/'));
        assert!(!path.contains('\\'));
    }

    #[tokio::test]
    async fn path_traversal_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let result = storage.get("../../../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));

        let result = storage.delete("../etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));

        let result = storage.exists("/etc/passwd").await;
        assert!(matches!(result, Err(StorageError::InvalidPath(_))));
    }

    #[tokio::test]
    async fn get_and_delete_missing_report_not_found() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        assert!(matches!(
            storage.get("nonexistent/file.ts").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.delete("nonexistent/file.ts").await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rmdir_is_recursive_and_idempotent() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .save("hls/vid/480p/segment_000.ts", b"a".to_vec())
            .await
            .unwrap();
        storage
            .save("hls/vid/720p/segment_000.ts", b"b".to_vec())
            .await
            .unwrap();

        storage.rmdir("hls/vid").await.unwrap();
        assert!(!storage.exists("hls/vid/480p/segment_000.ts").await.unwrap());

        // Second removal of a now-missing tree succeeds.
        storage.rmdir("hls/vid").await.unwrap();
    }

    #[tokio::test]
    async fn local_path_resolves_existing_blobs_only() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        storage
            .save("uploads/raw/v.mp4", b"data".to_vec())
            .await
            .unwrap();

        let resolved = storage.local_path("uploads/raw/v.mp4").await.unwrap();
        assert_eq!(
            tokio::fs::read(resolved.unwrap()).await.unwrap(),
            b"data".to_vec()
        );

        assert!(storage.local_path("uploads/raw/missing.mp4").await.unwrap().is_none());
        assert!(storage.local_path("../escape.mp4").await.is_err());
    }

    #[tokio::test]
    async fn get_stream_yields_full_content() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).await.unwrap();

        let data = vec![7u8; 64 * 1024];
        storage.save("hls/v/seg.ts", data.clone()).await.unwrap();

        let mut stream = storage.get_stream("hls/v/seg.ts").await.unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, data);
    }
}
