//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::net::IpAddr;

/// Default maximum media upload size (50 MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub storage: StorageConfig,
    pub feed: FeedConfig,
    pub media: MediaConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
}

/// Remote backend (table store + identity + object API)
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Project base URL (e.g., "https://abc.example.co")
    pub url: String,
    /// Public API key sent with every request
    pub api_key: String,
    /// Access token of the signed-in user, if any
    pub access_token: Option<String>,
}

impl BackendConfig {
    fn base(&self) -> &str {
        self.url.trim_end_matches('/')
    }

    /// Table endpoint root
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.base())
    }

    /// Identity endpoint root
    pub fn auth_url(&self) -> String {
        format!("{}/auth/v1", self.base())
    }

    /// Object API root
    pub fn storage_url(&self) -> String {
        format!("{}/storage/v1", self.base())
    }
}

/// Blob storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Which object API to talk to
    #[serde(default)]
    pub backend: StorageBackend,
    /// Bucket for uploaded media
    pub bucket: String,
    /// Public URL base for the S3 backend (Custom Domain)
    /// e.g., "https://media.example.com"
    pub public_url: Option<String>,
    /// S3-compatible credentials
    #[serde(default)]
    pub s3: S3Config,
}

/// Blob storage backend selector
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Object API of the same backend as the tables
    #[default]
    Rest,
    /// Any S3-compatible bucket
    S3,
}

/// S3-compatible storage credentials
#[derive(Debug, Clone, Deserialize, Default)]
pub struct S3Config {
    /// Endpoint URL (e.g. https://{account_id}.r2.cloudflarestorage.com)
    pub endpoint: Option<String>,
    /// Region name ("auto" for R2)
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

/// Feed configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    /// Optional cap on posts fetched per batch (unset = all)
    pub post_batch_size: Option<usize>,
    /// Maximum active statuses listed (default: 20)
    pub status_limit: usize,
    /// Lifetime of a new status in hours (default: 24)
    pub status_ttl_hours: i64,
}

/// Media upload configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MediaConfig {
    /// Largest accepted upload in bytes (default: 50 MB)
    pub max_upload_bytes: u64,
}

/// Cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Profile cache TTL in seconds (default: 300)
    pub profile_ttl: u64,
    /// Maximum profiles kept (default: 10000)
    pub profile_max_items: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (MOODFEED__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            .set_default("storage.backend", "rest")?
            .set_default("storage.bucket", "media")?
            .set_default("feed.status_limit", 20)?
            .set_default("feed.status_ttl_hours", 24)?
            .set_default("media.max_upload_bytes", DEFAULT_MAX_UPLOAD_BYTES)?
            .set_default("cache.profile_ttl", 300)?
            .set_default("cache.profile_max_items", 10_000)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("MOODFEED")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        let parsed = url::Url::parse(&self.backend.url)
            .map_err(|e| AppError::Config(format!("backend.url is not a valid URL: {e}")))?;

        match parsed.scheme() {
            "https" => {}
            "http" => {
                let host = parsed.host_str().unwrap_or_default();
                if !is_local_host(host) {
                    return Err(AppError::Config(
                        "backend.url must use https for non-local hosts".to_string(),
                    ));
                }
                tracing::warn!(host = %host, "Using plain http backend for local development");
            }
            other => {
                return Err(AppError::Config(format!(
                    "backend.url has unsupported scheme: {other}"
                )));
            }
        }

        if self.backend.api_key.trim().is_empty() {
            return Err(AppError::Config(
                "backend.api_key must not be empty".to_string(),
            ));
        }

        if self.feed.status_limit == 0 {
            return Err(AppError::Config(
                "feed.status_limit must be greater than 0".to_string(),
            ));
        }

        if self.feed.status_ttl_hours <= 0 {
            return Err(AppError::Config(
                "feed.status_ttl_hours must be greater than 0".to_string(),
            ));
        }

        if self.storage.backend == StorageBackend::S3 {
            let s3 = &self.storage.s3;
            if s3.endpoint.is_none() || s3.access_key_id.is_none() || s3.secret_access_key.is_none()
            {
                return Err(AppError::Config(
                    "storage.s3.endpoint, access_key_id and secret_access_key are required when storage.backend=s3"
                        .to_string(),
                ));
            }
            if self.storage.public_url.is_none() {
                return Err(AppError::Config(
                    "storage.public_url is required when storage.backend=s3".to_string(),
                ));
            }
        }

        Ok(())
    }
}

fn is_local_host(host: &str) -> bool {
    let host = host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .trim_end_matches('.')
        .to_ascii_lowercase();
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
