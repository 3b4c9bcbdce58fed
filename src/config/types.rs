use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Sumi-Mirror
///
/// Every section has defaults, so an empty file (or no file at all) yields a
/// usable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub fetcher: FetcherConfig,
    #[serde(rename = "user-agent", default)]
    pub user_agent: UserAgentConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

/// Artifact store and retention configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding working directories and finished archives
    #[serde(rename = "artifact-dir", default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,

    /// Archives older than this are deleted unconditionally
    #[serde(rename = "retention-minutes", default = "default_retention_minutes")]
    pub retention_minutes: u64,

    /// Total artifact store ceiling in megabytes
    #[serde(rename = "max-storage-mb", default = "default_max_storage_mb")]
    pub max_storage_mb: u64,

    /// Fraction of the ceiling the capacity pass reduces usage to
    #[serde(rename = "low-watermark", default = "default_low_watermark")]
    pub low_watermark: f64,

    /// Seconds between two steward sweeps
    #[serde(rename = "sweep-interval-secs", default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

/// HTTP fetcher configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetcherConfig {
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(rename = "connect-timeout-secs", default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Asset downloads allowed in flight across all jobs
    #[serde(rename = "max-concurrent-assets", default = "default_max_concurrent_assets")]
    pub max_concurrent_assets: u32,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Headless browser configuration for the rendering strategy
#[derive(Debug, Clone, Deserialize)]
pub struct RenderConfig {
    /// Upper bound for one page navigation, including the settle delay
    #[serde(rename = "navigation-timeout-secs", default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,

    /// Extra wait after the network goes quiet, for late dynamic content
    #[serde(rename = "settle-millis", default = "default_settle_millis")]
    pub settle_millis: u64,

    /// Explicit Chrome/Chromium binary; auto-detected when absent
    #[serde(rename = "chrome-executable", default)]
    pub chrome_executable: Option<PathBuf>,
}

impl StorageConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_minutes * 60)
    }

    pub fn max_storage_bytes(&self) -> u64 {
        self.max_storage_mb * 1024 * 1024
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl FetcherConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl UserAgentConfig {
    /// Formats the header value: `CrawlerName/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

impl RenderConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_millis)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            artifact_dir: default_artifact_dir(),
            retention_minutes: default_retention_minutes(),
            max_storage_mb: default_max_storage_mb(),
            low_watermark: default_low_watermark(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            max_concurrent_assets: default_max_concurrent_assets(),
        }
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "SumiMirror".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: default_navigation_timeout_secs(),
            settle_millis: default_settle_millis(),
            chrome_executable: None,
        }
    }
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("./downloads")
}

fn default_retention_minutes() -> u64 {
    60
}

fn default_max_storage_mb() -> u64 {
    1024
}

fn default_low_watermark() -> f64 {
    0.8
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_max_concurrent_assets() -> u32 {
    6
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

fn default_settle_millis() -> u64 {
    1500
}
