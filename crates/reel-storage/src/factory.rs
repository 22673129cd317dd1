use crate::object::ObjectStorageConfig;
use crate::{LocalStorage, ObjectStorage, Storage, StorageError, StorageResult};
use reel_core::{Config, StorageDriver};
use std::sync::Arc;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &Config) -> StorageResult<Arc<dyn Storage>> {
    match config.storage_driver {
        StorageDriver::Local => {
            let storage = LocalStorage::new(config.storage_path.clone()).await?;
            Ok(Arc::new(storage))
        }
        StorageDriver::S3 => {
            let endpoint = config
                .r2_endpoint
                .clone()
                .ok_or_else(|| StorageError::ConfigError("R2_ENDPOINT not configured".to_string()))?;
            let access_key_id = config.r2_access_key_id.clone().ok_or_else(|| {
                StorageError::ConfigError("R2_ACCESS_KEY_ID not configured".to_string())
            })?;
            let secret_access_key = config.r2_secret_access_key.clone().ok_or_else(|| {
                StorageError::ConfigError("R2_SECRET_ACCESS_KEY not configured".to_string())
            })?;
            let bucket = config.r2_bucket_name.clone().ok_or_else(|| {
                StorageError::ConfigError("R2_BUCKET_NAME not configured".to_string())
            })?;

            let storage = ObjectStorage::new(ObjectStorageConfig {
                endpoint,
                access_key_id,
                secret_access_key,
                bucket,
                base_prefix: None,
            })?;
            Ok(Arc::new(storage))
        }
    }
}
