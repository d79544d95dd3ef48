use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Org-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    pub output: OutputConfig,
    #[serde(default, rename = "credential")]
    pub credentials: Vec<CredentialEntry>,
}

/// Remote API behavior
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Root of the REST API, without a trailing slash
    #[serde(rename = "base-url", default = "default_base_url")]
    pub base_url: String,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,

    /// Items requested per page
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound on pages fetched for a single query
    #[serde(rename = "max-pages", default = "default_max_pages")]
    pub max_pages: u32,

    /// Cool-down after a secondary (abuse) rate limit (milliseconds)
    #[serde(rename = "secondary-cooldown-ms", default = "default_secondary_cooldown_ms")]
    pub secondary_cooldown_ms: u64,

    /// How many times the same page may be throttled before the query gives up
    #[serde(rename = "max-rate-limit-retries", default = "default_max_rate_limit_retries")]
    pub max_rate_limit_retries: u32,

    /// Per-request timeout (milliseconds)
    #[serde(rename = "request-timeout-ms", default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

/// Fan-out and deadline settings
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// In-flight tasks allowed per configured credential
    #[serde(
        rename = "concurrency-per-credential",
        default = "default_concurrency_per_credential"
    )]
    pub concurrency_per_credential: u32,

    /// Maximum wall time for one work unit (milliseconds)
    #[serde(rename = "task-timeout-ms", default = "default_task_timeout_ms")]
    pub task_timeout_ms: u64,

    /// Optional deadline for the whole run (milliseconds)
    #[serde(rename = "run-deadline-ms", default)]
    pub run_deadline_ms: Option<u64>,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Directory under which each run creates a timestamped folder
    #[serde(rename = "data-dir", default = "default_data_dir")]
    pub data_dir: String,
}

/// One API identity
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialEntry {
    #[serde(rename = "user-name", default)]
    pub user_name: String,

    #[serde(rename = "api-token", default)]
    pub api_token: String,
}

impl ApiConfig {
    pub fn secondary_cooldown(&self) -> Duration {
        Duration::from_millis(self.secondary_cooldown_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl HarvestConfig {
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    pub fn run_deadline(&self) -> Option<Duration> {
        self.run_deadline_ms.map(Duration::from_millis)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
            secondary_cooldown_ms: default_secondary_cooldown_ms(),
            max_rate_limit_retries: default_max_rate_limit_retries(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            concurrency_per_credential: default_concurrency_per_credential(),
            task_timeout_ms: default_task_timeout_ms(),
            run_deadline_ms: None,
        }
    }
}

fn default_base_url() -> String {
    "https://api.github.com".to_string()
}

fn default_user_agent() -> String {
    format!("org-harvest/{}", env!("CARGO_PKG_VERSION"))
}

fn default_page_size() -> u32 {
    100
}

fn default_max_pages() -> u32 {
    100
}

fn default_secondary_cooldown_ms() -> u64 {
    2 * 60 * 1000
}

fn default_max_rate_limit_retries() -> u32 {
    5
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_concurrency_per_credential() -> u32 {
    4
}

fn default_task_timeout_ms() -> u64 {
    60 * 60 * 1000
}

fn default_data_dir() -> String {
    "data".to_string()
}
