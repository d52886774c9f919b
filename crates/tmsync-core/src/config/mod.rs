//! Configuration management for tmsync.
//!
//! Configuration is loaded from multiple sources with the following priority:
//! 1. Command-line flags (applied by the binary)
//! 2. Environment variables
//! 3. Project-local `tmsync.toml` file
//! 4. User config `~/.config/tmsync/config.toml`
//! 5. Built-in defaults (lowest priority)

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use thiserror::Error;

mod defaults;

pub use defaults::*;

use crate::matcher::MatcherKind;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote service connection settings.
    pub server: ServerConfig,

    /// What to upload and where.
    pub upload: UploadConfig,

    /// Concurrency limits.
    pub workers: WorkerConfig,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// Searches for config in order:
    /// 1. `./tmsync.toml` (project local)
    /// 2. `~/.config/tmsync/config.toml` (user config)
    /// 3. Falls back to defaults
    ///
    /// Environment overrides are applied in every case.
    pub fn load() -> Result<Self, ConfigError> {
        if Path::new(LOCAL_CONFIG_FILE).exists() {
            return Self::from_file(LOCAL_CONFIG_FILE);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tmsync").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("TMSYNC_HOST") {
            self.server.host = Some(host);
        }
        if let Ok(username) = std::env::var("TMSYNC_USERNAME") {
            self.server.username = Some(username);
        }
        if let Ok(password) = std::env::var("TMSYNC_PASSWORD") {
            self.server.password = Some(password);
        }
        if let Ok(key) = std::env::var("TMSYNC_KEY") {
            self.server.key = Some(key);
        }

        if let Ok(project) = std::env::var("TMSYNC_PROJECT") {
            self.upload.project = Some(project);
        }
        if let Ok(size) = std::env::var("TMSYNC_BATCH_SIZE") {
            if let Ok(n) = size.parse() {
                self.upload.batch_size = n;
            }
        }
    }

    /// Check that the settings required to talk to the remote service are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.host.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Invalid("host is required".to_string()));
        }
        if self.server.username.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Invalid("username is required".to_string()));
        }
        if self.server.secret().is_none() {
            return Err(ConfigError::Invalid(
                "either a password or an API key is required".to_string(),
            ));
        }
        if self.upload.project.is_none() && self.upload.project_id.is_none() {
            return Err(ConfigError::Invalid(
                "a project name or project id is required".to_string(),
            ));
        }
        if self.upload.batch_size == 0 {
            return Err(ConfigError::Invalid("batch size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Create a default config file content as a string.
    pub fn default_config_string() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Remote service connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL of the service, e.g. `https://example.testrail.io`.
    pub host: Option<String>,

    pub username: Option<String>,

    #[serde(skip_serializing)]
    pub password: Option<String>,

    /// API key, preferred over the password when both are set.
    #[serde(skip_serializing)]
    pub key: Option<String>,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Retries for throttled (429) and transient (500, 502) responses.
    pub retries: u32,

    /// Accept invalid TLS certificates.
    pub insecure: bool,

    /// Proxy URL for all requests.
    pub proxy: Option<String>,

    /// Proxy credentials in `user:password` form.
    #[serde(skip_serializing)]
    pub proxy_user: Option<String>,

    /// Comma-separated hosts that bypass the proxy.
    pub noproxy: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            username: None,
            password: None,
            key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            retries: DEFAULT_RETRIES,
            insecure: false,
            proxy: None,
            proxy_user: None,
            noproxy: None,
        }
    }
}

impl ServerConfig {
    /// The credential used for basic authentication.
    pub fn secret(&self) -> Option<&str> {
        self.key
            .as_deref()
            .or(self.password.as_deref())
            .filter(|s| !s.is_empty())
    }
}

/// Upload behaviour: target project, suite, run and matching strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Project name.
    pub project: Option<String>,

    /// Project ID, takes precedence over the name.
    pub project_id: Option<i64>,

    /// Run title.
    pub title: Option<String>,

    /// Existing suite to use.
    pub suite_id: Option<i64>,

    /// Suite name, overrides the name taken from the report.
    pub suite_name: Option<String>,

    /// Parent section for the report's top-level sections.
    pub section_id: Option<i64>,

    /// Existing run to add results to.
    pub run_id: Option<i64>,

    /// Plan to add the run to.
    pub plan_id: Option<i64>,

    /// Configuration IDs for a run added to a plan.
    pub config_ids: Vec<i64>,

    pub milestone_id: Option<i64>,

    pub run_description: Option<String>,

    pub run_refs: Option<String>,

    pub run_assigned_to_id: Option<i64>,

    /// Include every case of the suite in the run.
    pub run_include_all: bool,

    /// Case IDs for a run created with `add_run`.
    pub run_case_ids: Vec<i64>,

    pub run_start_date: Option<String>,

    pub run_end_date: Option<String>,

    /// How local cases are matched to remote ones.
    pub case_matcher: MatcherKind,

    /// Update existing cases with the data from the report.
    pub update_cases: bool,

    /// Close the run after results are submitted.
    pub close_run: bool,

    /// Only reconcile the suite, sections and cases.
    pub skip_run: bool,

    /// Compare created entities with what the service echoes back.
    pub verify: bool,

    /// Number of results per submission.
    pub batch_size: usize,

    /// Keep millisecond precision in elapsed times.
    pub allow_ms: bool,

    /// Fields added to every case that does not already set them.
    pub case_fields: Map<String, Value>,

    /// Fields added to every result that does not already set them.
    pub result_fields: Map<String, Value>,

    /// Answer to every confirmation: `Some(true)` for yes, `Some(false)` for no,
    /// `None` to ask interactively.
    pub auto_response: Option<bool>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            project: None,
            project_id: None,
            title: None,
            suite_id: None,
            suite_name: None,
            section_id: None,
            run_id: None,
            plan_id: None,
            config_ids: Vec::new(),
            milestone_id: None,
            run_description: None,
            run_refs: None,
            run_assigned_to_id: None,
            run_include_all: false,
            run_case_ids: Vec::new(),
            run_start_date: None,
            run_end_date: None,
            case_matcher: MatcherKind::default(),
            update_cases: false,
            close_run: false,
            skip_run: false,
            verify: false,
            batch_size: DEFAULT_BATCH_SIZE,
            allow_ms: false,
            case_fields: Map::new(),
            result_fields: Map::new(),
            auto_response: None,
        }
    }
}

/// Concurrency limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Concurrent case add/update requests.
    pub case_workers: usize,

    /// Concurrent result batch submissions.
    pub result_workers: usize,

    /// Case count from which ID validation uses a bulk fetch.
    pub bulk_validation_threshold: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            case_workers: DEFAULT_CASE_WORKERS,
            result_workers: DEFAULT_RESULT_WORKERS,
            bulk_validation_threshold: BULK_VALIDATION_THRESHOLD,
        }
    }
}
