//! TOML Configuration File Support
//!
//! Client configuration lives in `$XDG_CONFIG_HOME/thinkstream/client.toml`.
//!
//! # Configuration Priority
//!
//! Highest first:
//! 1. CLI arguments (applied by the caller through [`ConfigOverrides`])
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! # Example Configuration
//!
//! ```toml
//! [api]
//! base_url = "http://localhost:3001"
//! request_timeout_secs = 120
//!
//! [transport]
//! endpoint = "ws://localhost:3001"
//! max_reconnect_attempts = 5
//! reconnect_delay_ms = 3000
//! subscriber_capacity = 256
//!
//! [display]
//! tick_interval_ms = 100
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Overrides |
//! |----------|-----------|
//! | `THINKSTREAM_API_URL` | `api.base_url` |
//! | `THINKSTREAM_WS_URL` | `transport.endpoint` |
//! | `THINKSTREAM_RECONNECT_ATTEMPTS` | `transport.max_reconnect_attempts` |
//! | `THINKSTREAM_RECONNECT_DELAY` | `transport.reconnect_delay_ms` |
//! | `THINKSTREAM_TICK_INTERVAL` | `display.tick_interval_ms` |
//! | `THINKSTREAM_REQUEST_TIMEOUT` | `api.request_timeout_secs` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::correlator::DEFAULT_TICK_INTERVAL;
use crate::transport::TransportConfig;

/// Default API base URL
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001";

/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const ENV_API_URL: &str = "THINKSTREAM_API_URL";
const ENV_WS_URL: &str = "THINKSTREAM_WS_URL";
const ENV_RECONNECT_ATTEMPTS: &str = "THINKSTREAM_RECONNECT_ATTEMPTS";
const ENV_RECONNECT_DELAY: &str = "THINKSTREAM_RECONNECT_DELAY";
const ENV_TICK_INTERVAL: &str = "THINKSTREAM_TICK_INTERVAL";
const ENV_REQUEST_TIMEOUT: &str = "THINKSTREAM_REQUEST_TIMEOUT";

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted
        path: PathBuf,
        /// The underlying IO error
        source: std::io::Error,
    },

    /// Failed to parse TOML
    #[error("Failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

// =============================================================================
// Configuration Source Tracking
// =============================================================================

/// Tracks where configuration values came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Value from command-line argument
    Cli,
    /// Value from environment variable
    Env,
    /// Value from TOML configuration file
    File,
    /// Default value
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI"),
            Self::Env => write!(f, "environment"),
            Self::File => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

// =============================================================================
// TOML Configuration Structures
// =============================================================================

/// `[api]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiToml {
    /// Base URL of the chat API
    pub base_url: Option<String>,
    /// HTTP request timeout in seconds
    pub request_timeout_secs: Option<u64>,
}

/// `[transport]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportToml {
    /// Push channel URL
    pub endpoint: Option<String>,
    /// Reconnect attempts before giving up
    pub max_reconnect_attempts: Option<u32>,
    /// Delay between reconnect attempts in milliseconds
    pub reconnect_delay_ms: Option<u64>,
    /// Per-subscriber queue size
    pub subscriber_capacity: Option<usize>,
}

/// `[display]` section
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayToml {
    /// Live duration refresh interval in milliseconds
    pub tick_interval_ms: Option<u64>,
}

/// Top-level TOML configuration structure
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientToml {
    /// API section
    pub api: ApiToml,
    /// Transport section
    pub transport: TransportToml,
    /// Display section
    pub display: DisplayToml,
}

// =============================================================================
// Main Configuration Struct
// =============================================================================

/// Resolved client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the chat API
    pub api_base_url: String,

    /// HTTP request timeout
    pub request_timeout: Duration,

    /// Push channel configuration
    pub transport: TransportConfig,

    /// Live duration refresh interval
    pub tick_interval: Duration,

    /// Path to the config file that was loaded (if any)
    pub config_file_path: Option<PathBuf>,

    source: ConfigSource,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transport: TransportConfig::default(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            config_file_path: None,
            source: ConfigSource::Default,
        }
    }
}

impl ClientConfig {
    /// Create a new configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest-priority source that contributed a value
    #[must_use]
    pub fn source(&self) -> ConfigSource {
        self.source
    }

    /// Set the configuration source
    pub fn set_source(&mut self, source: ConfigSource) {
        self.source = source;
    }

    /// Check that every value is usable
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let api = self.api_base_url.trim();
        if api.is_empty() {
            return Err(invalid("api.base_url must not be empty"));
        }
        if !(api.starts_with("http://") || api.starts_with("https://")) {
            return Err(invalid(format!(
                "api.base_url must be an http(s) URL, got {api:?}"
            )));
        }

        let endpoint = self.transport.endpoint.trim();
        if endpoint.is_empty() {
            return Err(invalid("transport.endpoint must not be empty"));
        }
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(invalid(format!(
                "transport.endpoint must be a ws(s) URL, got {endpoint:?}"
            )));
        }

        if self.transport.subscriber_capacity == 0 {
            return Err(invalid("transport.subscriber_capacity must be at least 1"));
        }
        if self.tick_interval.is_zero() {
            return Err(invalid("display.tick_interval_ms must be at least 1"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("api.request_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

// =============================================================================
// Configuration Loading
// =============================================================================

/// Get the default configuration file path
///
/// Returns `$XDG_CONFIG_HOME/thinkstream/client.toml` or
/// `~/.config/thinkstream/client.toml` if `XDG_CONFIG_HOME` is not set.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("thinkstream").join("client.toml"))
}

/// Load configuration from the default path, the environment and defaults
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be parsed, or if
/// the resolved values do not validate. A missing file is not an error.
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from_path(default_config_path())
}

/// Load configuration from a specific path
///
/// With `None`, only defaults and environment variables are used.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or if the
/// resolved values do not validate.
pub fn load_config_from_path(path: Option<PathBuf>) -> Result<ClientConfig, ConfigError> {
    load_with_env(path, |key| std::env::var(key).ok())
}

fn load_with_env(
    path: Option<PathBuf>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ClientConfig, ConfigError> {
    let mut config = ClientConfig::default();

    if let Some(config_path) = path {
        match read_config_file(&config_path)? {
            Some(content) => {
                let toml_config: ClientToml = toml::from_str(&content)?;
                apply_toml_config(&mut config, &toml_config);
                config.source = ConfigSource::File;
                tracing::info!(path = %config_path.display(), "Loaded configuration from file");
                config.config_file_path = Some(config_path);
            }
            None => {
                tracing::debug!(
                    path = %config_path.display(),
                    "Config file not found, using defaults"
                );
            }
        }
    }

    apply_env_config(&mut config, env);
    config.validate()?;
    Ok(config)
}

/// Read the config file, `None` if it does not exist
///
/// Runs once at startup before the runtime does any I/O of its own.
fn read_config_file(path: &Path) -> Result<Option<String>, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Apply TOML configuration values to the config struct
fn apply_toml_config(config: &mut ClientConfig, toml: &ClientToml) {
    if let Some(url) = &toml.api.base_url {
        config.api_base_url = url.clone();
    }
    if let Some(secs) = toml.api.request_timeout_secs {
        config.request_timeout = Duration::from_secs(secs);
    }

    if let Some(endpoint) = &toml.transport.endpoint {
        config.transport.endpoint = endpoint.clone();
    }
    if let Some(attempts) = toml.transport.max_reconnect_attempts {
        config.transport.max_reconnect_attempts = attempts;
    }
    if let Some(delay) = toml.transport.reconnect_delay_ms {
        config.transport.reconnect_delay_ms = delay;
    }
    if let Some(capacity) = toml.transport.subscriber_capacity {
        config.transport.subscriber_capacity = capacity;
    }

    if let Some(ms) = toml.display.tick_interval_ms {
        config.tick_interval = Duration::from_millis(ms);
    }
}

/// Parse a numeric environment value, ignoring (and logging) garbage
fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value, "Ignoring unparseable environment value");
    }
    parsed
}

/// Apply environment variable overrides to the config
fn apply_env_config(config: &mut ClientConfig, env: impl Fn(&str) -> Option<String>) {
    if let Some(url) = env(ENV_API_URL) {
        config.api_base_url = url;
        config.source = ConfigSource::Env;
    }
    if let Some(url) = env(ENV_WS_URL) {
        config.transport.endpoint = url;
        config.source = ConfigSource::Env;
    }
    if let Some(n) = env(ENV_RECONNECT_ATTEMPTS).and_then(|v| parse_env(ENV_RECONNECT_ATTEMPTS, &v)) {
        config.transport.max_reconnect_attempts = n;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env(ENV_RECONNECT_DELAY).and_then(|v| parse_env(ENV_RECONNECT_DELAY, &v)) {
        config.transport.reconnect_delay_ms = ms;
        config.source = ConfigSource::Env;
    }
    if let Some(ms) = env(ENV_TICK_INTERVAL).and_then(|v| parse_env(ENV_TICK_INTERVAL, &v)) {
        config.tick_interval = Duration::from_millis(ms);
        config.source = ConfigSource::Env;
    }
    if let Some(secs) = env(ENV_REQUEST_TIMEOUT).and_then(|v| parse_env(ENV_REQUEST_TIMEOUT, &v)) {
        config.request_timeout = Duration::from_secs(secs);
        config.source = ConfigSource::Env;
    }
}

// =============================================================================
// CLI Override Support
// =============================================================================

/// Builder for applying CLI overrides to configuration
///
/// Use this after [`load_config`], then call [`ClientConfig::validate`].
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// API base URL override
    pub api_base_url: Option<String>,

    /// Push channel URL override
    pub endpoint: Option<String>,
}

impl ConfigOverrides {
    /// Create an empty set of overrides
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the API base URL
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Override the push channel URL
    #[must_use]
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(url.into());
        self
    }

    /// Apply overrides to a configuration
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.api_base_url {
            config.api_base_url = url.clone();
            config.source = ConfigSource::Cli;
        }
        if let Some(url) = &self.endpoint {
            config.transport.endpoint = url.clone();
            config.source = ConfigSource::Cli;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
