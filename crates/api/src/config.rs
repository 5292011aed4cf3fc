use serde::Deserialize;
use std::net::SocketAddr;
use std::time::Duration;

use crate::services::dispatcher::DispatcherConfig;
use crate::services::ingestor::{EnqueueFailurePolicy, IngestorConfig};
use crate::services::oauth2::OAuth2Config;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub oauth2: OAuth2Settings,
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// SHA-256 hex digests of accepted `X-API-Key` values. Empty disables auth.
    #[serde(default)]
    pub api_key_hashes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Debounce applied to retry and force-resend jobs.
    #[serde(default = "default_retry_debounce_ms")]
    pub retry_debounce_ms: u64,

    #[serde(default = "default_batch_page_size")]
    pub batch_page_size: usize,

    #[serde(default)]
    pub enqueue_failure_policy: EnqueueFailurePolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            retry_debounce_ms: default_retry_debounce_ms(),
            batch_page_size: default_batch_page_size(),
            enqueue_failure_policy: EnqueueFailurePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuth2Settings {
    #[serde(default = "default_oauth2_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Upper bound on how long an exchanged token stays cached.
    #[serde(default = "default_max_cache_ttl_secs")]
    pub max_cache_ttl_secs: u64,

    /// Upper bound on the refresh-ahead window.
    #[serde(default = "default_max_refresh_buffer_secs")]
    pub max_refresh_buffer_secs: u64,
}

impl Default for OAuth2Settings {
    fn default() -> Self {
        Self {
            http_timeout_ms: default_oauth2_http_timeout_ms(),
            max_cache_ttl_secs: default_max_cache_ttl_secs(),
            max_refresh_buffer_secs: default_max_refresh_buffer_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobsConfig {
    /// Deliveries left `Scheduled` longer than this are re-enqueued.
    #[serde(default = "default_stuck_delivery_threshold")]
    pub stuck_delivery_threshold_secs: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: usize,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            stuck_delivery_threshold_secs: default_stuck_delivery_threshold(),
            sweep_interval_secs: default_sweep_interval(),
            sweep_batch_size: default_sweep_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    /// JSON fixture with projects and endpoints to preload.
    #[serde(default)]
    pub seed_file: Option<String>,
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_retry_debounce_ms() -> u64 {
    1000
}
fn default_batch_page_size() -> usize {
    100
}
fn default_oauth2_http_timeout_ms() -> u64 {
    10_000
}
fn default_max_cache_ttl_secs() -> u64 {
    3600
}
fn default_max_refresh_buffer_secs() -> u64 {
    60
}
fn default_stuck_delivery_threshold() -> u64 {
    300
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_sweep_batch_size() -> usize {
    100
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml - base configuration with defaults
    /// 2. config/local.toml - local overrides (optional, not in git)
    /// 3. Environment variables with HOOKRELAY__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("HOOKRELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("security.api_key_hashes")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Load configuration for testing with custom overrides.
    ///
    /// Builds from embedded defaults so tests never depend on config files.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "0.0.0.0"
            port = 8080
            request_timeout_secs = 30

            [logging]
            level = "info"
            format = "json"

            [security]
            api_key_hashes = []

            [dispatch]
            retry_debounce_ms = 1000
            batch_page_size = 100
            enqueue_failure_policy = "propagate"

            [oauth2]
            http_timeout_ms = 10000
            max_cache_ttl_secs = 3600
            max_refresh_buffer_secs = 60

            [jobs]
            stuck_delivery_threshold_secs = 300
            sweep_interval_secs = 60
            sweep_batch_size = 100
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.dispatch.batch_page_size == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "dispatch.batch_page_size must be greater than 0".to_string(),
            ));
        }

        if self.jobs.sweep_interval_secs == 0 || self.jobs.sweep_batch_size == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "jobs.sweep_interval_secs and jobs.sweep_batch_size must be greater than 0"
                    .to_string(),
            ));
        }

        if self.oauth2.http_timeout_ms == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "oauth2.http_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(hash) = self
            .security
            .api_key_hashes
            .iter()
            .find(|h| h.len() != 64 || !h.chars().all(|c| c.is_ascii_hexdigit()))
        {
            return Err(ConfigValidationError::InvalidValue(format!(
                "security.api_key_hashes entry '{}' is not a SHA-256 hex digest",
                hash
            )));
        }

        if matches!(self.store.seed_file.as_deref(), Some(path) if path.trim().is_empty()) {
            return Err(ConfigValidationError::MissingRequired(
                "store.seed_file is set but empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigValidationError> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| {
                ConfigValidationError::InvalidValue(format!(
                    "Invalid socket address {}:{}",
                    self.server.host, self.server.port
                ))
            })
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            retry_debounce: Duration::from_millis(self.dispatch.retry_debounce_ms),
            batch_page_size: self.dispatch.batch_page_size,
        }
    }

    pub fn ingestor_config(&self) -> IngestorConfig {
        IngestorConfig {
            enqueue_failure_policy: self.dispatch.enqueue_failure_policy,
        }
    }

    pub fn oauth2_config(&self) -> OAuth2Config {
        OAuth2Config {
            http_timeout: Duration::from_millis(self.oauth2.http_timeout_ms),
            max_cache_ttl: Duration::from_secs(self.oauth2.max_cache_ttl_secs),
            max_refresh_buffer: Duration::from_secs(self.oauth2.max_refresh_buffer_secs),
        }
    }
}
