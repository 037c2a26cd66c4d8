//! Application configuration
//!
//! Configuration loaded from `.glchain.toml`. Every field has a default, so
//! an empty file (or no file at all) yields a usable configuration apart
//! from the list of monitored projects.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Application configuration loaded from `.glchain.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gitlab: GitLabConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub tracer: TracerConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub processor: ProcessorConfig,
}

/// `[gitlab]` - API access
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabConfig {
    /// GitLab host, used for token lookup and the default API URL
    #[serde(default = "default_host")]
    pub host: String,

    /// API root; defaults to `https://{host}/api/v4`
    #[serde(default)]
    pub base_url: Option<String>,

    /// Access token; usually left out in favour of env vars
    #[serde(default)]
    pub token: Option<String>,

    /// Project used when a trace request names none
    #[serde(default)]
    pub default_project: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_api_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,

    /// Wait for the quota reset once fewer requests than this remain
    #[serde(default = "default_rate_limit_low_water")]
    pub rate_limit_low_water: u32,
}

fn default_host() -> String {
    "gitlab.com".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_api_max_retries() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_min_request_interval_ms() -> u64 {
    100
}

fn default_rate_limit_low_water() -> u32 {
    10
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            base_url: None,
            token: None,
            default_project: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_api_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            min_request_interval_ms: default_min_request_interval_ms(),
            rate_limit_low_water: default_rate_limit_low_water(),
        }
    }
}

impl GitLabConfig {
    /// Effective API root
    pub fn api_url(&self) -> String {
        self.base_url
            .clone()
            .unwrap_or_else(|| format!("https://{}/api/v4", self.host))
    }
}

/// `[cache]` - response cache
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_cache_ttl_secs() -> u64 {
    300
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

/// `[tracer]` - chain tracing behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TracerConfig {
    /// Downgrade per-step failures to warnings
    #[serde(default = "default_true")]
    pub continue_on_error: bool,

    /// Also pull in each issue's related merge requests
    #[serde(default = "default_true")]
    pub follow_related_mrs: bool,

    /// Resolve epics of the discovered issues
    #[serde(default = "default_true")]
    pub include_epics: bool,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            follow_related_mrs: true,
            include_epics: true,
        }
    }
}

/// `[monitor]` - commit feed polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Commits requested per poll
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Commits emitted when a branch is seen for the first time
    #[serde(default = "default_bulk_load_limit")]
    pub bulk_load_limit: usize,

    #[serde(default)]
    pub projects: Vec<MonitorProject>,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_page_size() -> u32 {
    100
}

fn default_bulk_load_limit() -> usize {
    50
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            page_size: default_page_size(),
            bulk_load_limit: default_bulk_load_limit(),
            projects: Vec::new(),
        }
    }
}

/// `[[monitor.projects]]` - one watched project
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorProject {
    /// Numeric id or full path (`group/project`)
    pub id: String,

    #[serde(default = "default_branches")]
    pub branches: Vec<String>,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Only emit commits by these authors (name or email); empty = everyone
    #[serde(default)]
    pub author_allow: Vec<String>,

    /// Never emit commits by these authors (name or email)
    #[serde(default)]
    pub author_deny: Vec<String>,
}

fn default_branches() -> Vec<String> {
    vec!["main".to_string()]
}

impl MonitorProject {
    pub fn new(id: impl Into<String>, branches: &[&str]) -> Self {
        Self {
            id: id.into(),
            branches: branches.iter().map(|b| b.to_string()).collect(),
            enabled: true,
            author_allow: Vec::new(),
            author_deny: Vec::new(),
        }
    }
}

/// `[processor]` - commit processing queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    /// Commits traced at the same time
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Attempts before a commit is marked failed
    #[serde(default = "default_processor_max_retries")]
    pub max_retries: u32,

    /// Fixed delay before a failed commit is attempted again
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

fn default_concurrency() -> usize {
    3
}

fn default_processor_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5000
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_processor_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl AppConfig {
    /// Load `.env`, then the config file, or fall back to defaults
    pub fn load() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }

        if let Some(content) = crate::load_config_file() {
            match Self::from_toml_str(&content) {
                Ok(config) => {
                    log::info!("Loaded app config from file");
                    return config;
                }
                Err(e) => {
                    log::warn!("Failed to load config file: {}", e);
                }
            }
        }

        log::debug!("Using default app config");
        Self::default()
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processor.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "processor.concurrency must be at least 1".to_string(),
            ));
        }
        if !(1..=100).contains(&self.monitor.page_size) {
            return Err(ConfigError::Invalid(
                "monitor.page_size must be between 1 and 100".to_string(),
            ));
        }
        if self.monitor.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "monitor.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        for project in &self.monitor.projects {
            if project.id.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "monitor.projects entries need an id".to_string(),
                ));
            }
            if project.branches.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "project '{}' has no branches to monitor",
                    project.id
                )));
            }
        }
        Ok(())
    }
}
