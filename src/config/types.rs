use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "https://api.fly.io";
pub const DEFAULT_ARCHIVE_BUCKET: &str = "fly-app-logs";
pub const DEFAULT_ARCHIVE_REGION: &str = "us-east-1";
pub const DEFAULT_TARGET_CONCURRENCY: usize = 100;
pub const DEFAULT_OBJECT_BUFFER: usize = 16;
pub const DEFAULT_MAX_CONSECUTIVE_ERRORS: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub polling: PollingConfig,
    pub archive: ArchiveConfig,
}

/// Live-tail HTTP API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub access_token: Option<String>,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            access_token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    #[serde(with = "humantime_serde")]
    pub min_wait: Duration,
    /// Used when a request does not carry its own `max_backoff`.
    #[serde(with = "humantime_serde")]
    pub max_backoff: Duration,
    pub max_consecutive_errors: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            min_wait: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            max_consecutive_errors: DEFAULT_MAX_CONSECUTIVE_ERRORS,
        }
    }
}

/// Historical archive bucket and merge budget.
///
/// Credentials are short-lived and issued out of band; they are plain
/// strings here so they can be injected through `$env{...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub target_concurrency: usize,
    pub object_buffer: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            bucket: DEFAULT_ARCHIVE_BUCKET.to_string(),
            region: DEFAULT_ARCHIVE_REGION.to_string(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            target_concurrency: DEFAULT_TARGET_CONCURRENCY,
            object_buffer: DEFAULT_OBJECT_BUFFER,
        }
    }
}
