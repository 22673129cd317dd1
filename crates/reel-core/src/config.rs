//! Environment-driven configuration.
//!
//! `Config::from_env()` reads process environment (after an optional `.env`
//! load) and `validate()` enforces the deployment rules: production requires
//! the S3 driver, and the S3 driver requires the full R2 credential set.

use std::env;
use std::str::FromStr;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_QUEUE_RETRY_ATTEMPTS: i32 = 3;
const DEFAULT_QUEUE_RETRY_DELAY_SECS: u64 = 2;
const DEFAULT_QUEUE_MAX_WORKERS: usize = 2;
const DEFAULT_QUEUE_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS: i64 = 1800;
const DEFAULT_MAX_UPLOAD_SIZE_BYTES: usize = 2 * 1024 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
    Test,
}

impl FromStr for AppEnv {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(AppEnv::Development),
            "production" | "prod" => Ok(AppEnv::Production),
            "test" => Ok(AppEnv::Test),
            _ => Err(anyhow::anyhow!("Invalid APP_ENV: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageDriver {
    Local,
    S3,
}

impl FromStr for StorageDriver {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageDriver::Local),
            "s3" => Ok(StorageDriver::S3),
            _ => Err(anyhow::anyhow!("Invalid STORAGE_DRIVER: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub app_name: String,
    pub port: u16,
    pub env: AppEnv,
    pub database_url: String,
    pub cors_origin: Option<String>,

    pub storage_driver: StorageDriver,
    /// Base directory for local storage.
    pub storage_path: String,
    /// Staging directory for in-flight uploads.
    pub upload_dir: String,
    /// Public base URL the service is reachable under.
    pub public_root: Option<String>,

    pub r2_endpoint: Option<String>,
    pub r2_access_key_id: Option<String>,
    pub r2_secret_access_key: Option<String>,
    pub r2_bucket_name: Option<String>,

    pub queue_retry_attempts: i32,
    /// Base of the exponential backoff, in seconds.
    pub queue_retry_delay_secs: u64,
    pub queue_max_workers: usize,
    pub queue_poll_interval_ms: u64,
    /// Running jobs older than this are considered abandoned and requeued.
    pub queue_visibility_timeout_secs: i64,

    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    pub max_upload_size_bytes: usize,
    pub delete_source_after_transcode: bool,
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> Result<T, anyhow::Error> {
    match env_opt(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let env: AppEnv = env_or("APP_ENV", "development").parse()?;
        let storage_driver: StorageDriver = env_or("STORAGE_DRIVER", "local").parse()?;

        let config = Config {
            app_name: env_or("APP_NAME", "reel"),
            port: env_parse("PORT", DEFAULT_PORT)?,
            env,
            database_url: env_opt("DATABASE_URL")
                .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required"))?,
            cors_origin: env_opt("CORS_ORIGIN"),
            storage_driver,
            storage_path: env_or("STORAGE_PATH", "./storage"),
            upload_dir: env_or("UPLOAD_DIR", "./uploads"),
            public_root: env_opt("PUBLIC_ROOT"),
            r2_endpoint: env_opt("R2_ENDPOINT"),
            r2_access_key_id: env_opt("R2_ACCESS_KEY_ID"),
            r2_secret_access_key: env_opt("R2_SECRET_ACCESS_KEY"),
            r2_bucket_name: env_opt("R2_BUCKET_NAME"),
            queue_retry_attempts: env_parse("QUEUE_RETRY_ATTEMPTS", DEFAULT_QUEUE_RETRY_ATTEMPTS)?,
            queue_retry_delay_secs: env_parse(
                "QUEUE_RETRY_DELAY",
                DEFAULT_QUEUE_RETRY_DELAY_SECS,
            )?,
            queue_max_workers: env_parse("QUEUE_MAX_WORKERS", DEFAULT_QUEUE_MAX_WORKERS)?,
            queue_poll_interval_ms: env_parse(
                "QUEUE_POLL_INTERVAL_MS",
                DEFAULT_QUEUE_POLL_INTERVAL_MS,
            )?,
            queue_visibility_timeout_secs: env_parse(
                "QUEUE_VISIBILITY_TIMEOUT_SECS",
                DEFAULT_QUEUE_VISIBILITY_TIMEOUT_SECS,
            )?,
            ffmpeg_path: env_or("FFMPEG_PATH", "ffmpeg"),
            ffprobe_path: env_or("FFPROBE_PATH", "ffprobe"),
            max_upload_size_bytes: env_parse(
                "MAX_UPLOAD_SIZE_BYTES",
                DEFAULT_MAX_UPLOAD_SIZE_BYTES,
            )?,
            delete_source_after_transcode: env_parse("DELETE_SOURCE_AFTER_TRANSCODE", false)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.env == AppEnv::Production
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.is_production() && self.storage_driver != StorageDriver::S3 {
            return Err(anyhow::anyhow!(
                "STORAGE_DRIVER must be 's3' in production"
            ));
        }

        if self.storage_driver == StorageDriver::S3 {
            for (key, value) in [
                ("R2_ENDPOINT", &self.r2_endpoint),
                ("R2_ACCESS_KEY_ID", &self.r2_access_key_id),
                ("R2_SECRET_ACCESS_KEY", &self.r2_secret_access_key),
                ("R2_BUCKET_NAME", &self.r2_bucket_name),
            ] {
                if value.is_none() {
                    return Err(anyhow::anyhow!(
                        "{} is required when STORAGE_DRIVER=s3",
                        key
                    ));
                }
            }
        }

        if self.queue_retry_attempts < 1 {
            return Err(anyhow::anyhow!("QUEUE_RETRY_ATTEMPTS must be >= 1"));
        }
        if self.queue_max_workers == 0 {
            return Err(anyhow::anyhow!("QUEUE_MAX_WORKERS must be >= 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            app_name: "reel".to_string(),
            port: 3000,
            env: AppEnv::Development,
            database_url: "postgres://localhost/reel".to_string(),
            cors_origin: None,
            storage_driver: StorageDriver::Local,
            storage_path: "./storage".to_string(),
            upload_dir: "./uploads".to_string(),
            public_root: None,
            r2_endpoint: None,
            r2_access_key_id: None,
            r2_secret_access_key: None,
            r2_bucket_name: None,
            queue_retry_attempts: 3,
            queue_retry_delay_secs: 2,
            queue_max_workers: 2,
            queue_poll_interval_ms: 1000,
            queue_visibility_timeout_secs: 1800,
            ffmpeg_path: "ffmpeg".to_string(),
            ffprobe_path: "ffprobe".to_string(),
            max_upload_size_bytes: 1024,
            delete_source_after_transcode: false,
        }
    }

    #[test]
    fn app_env_parsing() {
        assert_eq!("development".parse::<AppEnv>().unwrap(), AppEnv::Development);
        assert_eq!("PROD".parse::<AppEnv>().unwrap(), AppEnv::Production);
        assert_eq!("test".parse::<AppEnv>().unwrap(), AppEnv::Test);
        assert!("staging".parse::<AppEnv>().is_err());
    }

    #[test]
    fn storage_driver_parsing() {
        assert_eq!("local".parse::<StorageDriver>().unwrap(), StorageDriver::Local);
        assert_eq!("S3".parse::<StorageDriver>().unwrap(), StorageDriver::S3);
        assert!("nfs".parse::<StorageDriver>().is_err());
    }

    #[test]
    fn local_driver_valid_in_development() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn production_requires_s3() {
        let mut config = base_config();
        config.env = AppEnv::Production;
        assert!(config.validate().is_err());
    }

    #[test]
    fn s3_requires_full_credential_set() {
        let mut config = base_config();
        config.storage_driver = StorageDriver::S3;
        config.r2_endpoint = Some("https://acc.r2.cloudflarestorage.com".to_string());
        config.r2_access_key_id = Some("key".to_string());
        config.r2_secret_access_key = Some("secret".to_string());
        assert!(config.validate().is_err());

        config.r2_bucket_name = Some("videos".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn queue_bounds_enforced() {
        let mut config = base_config();
        config.queue_retry_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.queue_max_workers = 0;
        assert!(config.validate().is_err());
    }
}
