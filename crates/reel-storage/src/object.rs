use crate::traits::{ByteStream, Storage, StorageError, StorageResult};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::Error as ObjectStoreError;
use object_store::{ClientOptions, ObjectStore, ObjectStoreExt, PutPayload};
use std::time::Duration;

/// Per-call timeout for blob transfers.
const BLOB_TIMEOUT_SECS: u64 = 300;

/// Credentials for an S3-compatible endpoint (R2, MinIO, DigitalOcean
/// Spaces, AWS itself).
#[derive(Debug, Clone)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket: String,
    /// Optional base key all logical paths are nested under.
    pub base_prefix: Option<String>,
}

/// S3-compatible object storage implementation
#[derive(Clone)]
pub struct ObjectStorage {
    store: AmazonS3,
    bucket: String,
    base_prefix: Option<String>,
}

impl ObjectStorage {
    pub fn new(config: ObjectStorageConfig) -> StorageResult<Self> {
        let allow_http = config.endpoint.starts_with("http://");

        let store = AmazonS3Builder::new()
            .with_bucket_name(config.bucket.clone())
            .with_endpoint(config.endpoint.clone())
            .with_access_key_id(config.access_key_id.clone())
            .with_secret_access_key(config.secret_access_key.clone())
            .with_region("auto")
            .with_allow_http(allow_http)
            .with_client_options(
                ClientOptions::new().with_timeout(Duration::from_secs(BLOB_TIMEOUT_SECS)),
            )
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))?;

        let base_prefix = config
            .base_prefix
            .map(|p| p.trim_matches('/').to_string())
            .filter(|p| !p.is_empty());

        Ok(ObjectStorage {
            store,
            bucket: config.bucket,
            base_prefix,
        })
    }

    /// Join the configured base prefix with a logical path, POSIX semantics.
    fn object_path(&self, logical: &str) -> StorageResult<Path> {
        if logical.is_empty() || logical.contains("..") || logical.starts_with('/') {
            return Err(StorageError::InvalidPath(
                "Storage path contains invalid characters".to_string(),
            ));
        }
        let key = match &self.base_prefix {
            Some(prefix) => format!("{}/{}", prefix, logical),
            None => logical.to_string(),
        };
        Ok(Path::from(key))
    }
}

#[async_trait]
impl Storage for ObjectStorage {
    async fn save(&self, logical: &str, data: Vec<u8>) -> StorageResult<String> {
        let location = self.object_path(logical)?;
        let size = data.len() as u64;
        let start = std::time::Instant::now();

        self.store
            .put(&location, PutPayload::from(Bytes::from(data)))
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    bucket = %self.bucket,
                    key = %location,
                    size_bytes = size,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Object storage save failed"
                );
                StorageError::UploadFailed(e.to_string())
            })?;

        tracing::info!(
            bucket = %self.bucket,
            key = %location,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object storage save successful"
        );

        Ok(logical.to_string())
    }

    async fn get(&self, logical: &str) -> StorageResult<Vec<u8>> {
        let location = self.object_path(logical)?;
        let start = std::time::Instant::now();

        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(logical.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %location,
                    "Object storage get failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bytes = result
            .bytes()
            .await
            .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %location,
            size_bytes = bytes.len(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object storage get successful"
        );

        Ok(bytes.to_vec())
    }

    async fn get_stream(&self, logical: &str) -> StorageResult<ByteStream> {
        let location = self.object_path(logical)?;

        let result = self.store.get(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(logical.to_string()),
            other => StorageError::DownloadFailed(other.to_string()),
        })?;

        let bucket = self.bucket.clone();
        let key = logical.to_string();
        let stream = result.into_stream().map(move |res| {
            res.map_err(|e| {
                tracing::error!(bucket = %bucket, key = %key, error = %e, "Object storage stream error");
                StorageError::DownloadFailed(e.to_string())
            })
        });

        Ok(Box::pin(stream))
    }

    async fn delete(&self, logical: &str) -> StorageResult<()> {
        let location = self.object_path(logical)?;
        let start = std::time::Instant::now();

        self.store.delete(&location).await.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(logical.to_string()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %self.bucket,
                    key = %location,
                    "Object storage delete failed"
                );
                StorageError::DeleteFailed(other.to_string())
            }
        })?;

        tracing::debug!(
            bucket = %self.bucket,
            key = %location,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object storage delete successful"
        );

        Ok(())
    }

    async fn exists(&self, logical: &str) -> StorageResult<bool> {
        let location = self.object_path(logical)?;
        match self.store.head(&location).await {
            Ok(_) => Ok(true),
            Err(ObjectStoreError::NotFound { .. }) => Ok(false),
            Err(e) => Err(StorageError::BackendError(e.to_string())),
        }
    }

    /// Prefixes are implicit on object stores.
    async fn mkdir(&self, logical: &str) -> StorageResult<()> {
        self.object_path(logical)?;
        Ok(())
    }

    async fn rmdir(&self, logical: &str) -> StorageResult<()> {
        let prefix = self.object_path(logical)?;
        let start = std::time::Instant::now();

        // The listing is paginated by object_store internally; drain it and
        // delete each key. Missing prefixes yield an empty listing, which
        // keeps this idempotent.
        let locations: Vec<Path> = self
            .store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location)
            .try_collect()
            .await
            .map_err(|e| {
                tracing::error!(bucket = %self.bucket, prefix = %prefix, error = %e, "Object storage rmdir list failed");
                StorageError::BackendError(e.to_string())
            })?;

        let count = locations.len();
        for location in locations {
            match self.store.delete(&location).await {
                Ok(()) => {}
                Err(ObjectStoreError::NotFound { .. }) => {}
                Err(e) => {
                    tracing::error!(bucket = %self.bucket, key = %location, error = %e, "Object storage rmdir delete failed");
                    return Err(StorageError::DeleteFailed(e.to_string()));
                }
            }
        }

        tracing::info!(
            bucket = %self.bucket,
            prefix = %prefix,
            deleted = count,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Object storage rmdir successful"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_with_prefix(prefix: Option<&str>) -> ObjectStorage {
        ObjectStorage::new(ObjectStorageConfig {
            endpoint: "http://localhost:9000".to_string(),
            access_key_id: "test".to_string(),
            secret_access_key: "test".to_string(),
            bucket: "videos".to_string(),
            base_prefix: prefix.map(String::from),
        })
        .unwrap()
    }

    #[test]
    fn object_path_joins_base_prefix() {
        let storage = storage_with_prefix(Some("/media/"));
        let path = storage.object_path("hls/v/master.m3u8").unwrap();
        assert_eq!(path.as_ref(), "media/hls/v/master.m3u8");
    }

    #[test]
    fn object_path_without_prefix_is_logical_path() {
        let storage = storage_with_prefix(None);
        let path = storage.object_path("uploads/raw/v.mp4").unwrap();
        assert_eq!(path.as_ref(), "uploads/raw/v.mp4");
    }

    #[test]
    fn object_path_rejects_traversal_and_absolute() {
        let storage = storage_with_prefix(None);
        assert!(matches!(
            storage.object_path("../secrets"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.object_path("/absolute"),
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.object_path(""),
            Err(StorageError::InvalidPath(_))
        ));
    }
}
