use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Joins all errors into one line for logs and `bail!`.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Location lookup, caching and history settings
    #[serde(default)]
    pub location: LocationConfig,

    /// Geocoding and weather API settings
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Ask the platform for a high-accuracy fix
    #[serde(default = "default_high_accuracy")]
    pub high_accuracy: bool,

    /// Give up on the device position after this many milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Accept a previous device fix younger than this (0 = always ask)
    #[serde(default)]
    pub max_cache_age_ms: u64,

    /// Seconds before a cached lookup is considered stale
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Minimum characters before a search reaches the network
    #[serde(default = "default_search_min_len")]
    pub search_min_len: usize,

    /// Quiet window before typed text is searched
    #[serde(default = "default_search_debounce_ms")]
    pub search_debounce_ms: u64,

    /// Number of suggestions kept from the geocoder
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,

    /// Number of recent selections remembered
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

fn default_high_accuracy() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_cache_ttl_secs() -> u64 {
    300
}

fn default_search_min_len() -> usize {
    3
}

fn default_search_debounce_ms() -> u64 {
    300
}

fn default_search_limit() -> usize {
    5
}

fn default_history_capacity() -> usize {
    10
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: default_high_accuracy(),
            timeout_ms: default_timeout_ms(),
            max_cache_age_ms: 0,
            cache_ttl_secs: default_cache_ttl_secs(),
            search_min_len: default_search_min_len(),
            search_debounce_ms: default_search_debounce_ms(),
            search_limit: default_search_limit(),
            history_capacity: default_history_capacity(),
        }
    }
}

impl LocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn max_cache_age(&self) -> Duration {
        Duration::from_millis(self.max_cache_age_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the OpenWeather-compatible API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key (can also be set via OPENWEATHER_API_KEY)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Endpoint answering with the caller's approximate position
    #[serde(default = "default_ip_locate_url")]
    pub ip_locate_url: String,
}

fn default_base_url() -> String {
    "https://api.openweathermap.org".to_string()
}

fn default_ip_locate_url() -> String {
    "https://ipinfo.io/json".to_string()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            ip_locate_url: default_ip_locate_url(),
        }
    }
}

impl ApiConfig {
    /// Configured key, falling back to the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("OPENWEATHER_API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("climate");

        Self {
            config_dir,
            location: LocationConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default path, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from a specific file, creating it if missing
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            if let Some(parent) = path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(path)?;
            return Ok(config);
        }

        let contents = std::fs::read_to_string(path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&contents).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Warnings are logged; errors fail the load.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            anyhow::bail!(
                "Configuration validation failed: {}",
                validation.error_summary()
            );
        }

        for warning in &validation.warnings {
            tracing::warn!("Config warning: {}", warning);
        }

        Ok((config, validation))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_url(&self.api.base_url, "api.base_url", &mut result);
        Self::validate_url(&self.api.ip_locate_url, "api.ip_locate_url", &mut result);

        if self.api.resolved_api_key().is_none() {
            result.add_warning(
                "api.api_key",
                "No API key configured - search and weather lookups will fail",
            );
        }

        let location = &self.location;
        if location.timeout_ms == 0 {
            result.add_error("location.timeout_ms", "Timeout must be greater than 0");
        }

        if location.search_min_len == 0 {
            result.add_warning(
                "location.search_min_len",
                "Every keystroke will be sent to the geocoder",
            );
        }

        if !(250..=400).contains(&location.search_debounce_ms) {
            result.add_warning(
                "location.search_debounce_ms",
                format!(
                    "Debounce of {}ms is outside the usual 250-400ms window",
                    location.search_debounce_ms
                ),
            );
        }

        if location.search_limit == 0 {
            result.add_error("location.search_limit", "Search limit must be greater than 0");
        }

        if location.history_capacity == 0 {
            result.add_error(
                "location.history_capacity",
                "History capacity must be greater than 0",
            );
        }

        if location.cache_ttl_secs == 0 {
            result.add_warning(
                "location.cache_ttl_secs",
                "Cache disabled (every read refetches)",
            );
        }

        result
    }

    fn validate_url(url_str: &str, field_name: &str, result: &mut ValidationResult) {
        match Url::parse(url_str) {
            Ok(url) => {
                if url.scheme() != "http" && url.scheme() != "https" {
                    result.add_error(
                        field_name,
                        format!("URL must use http or https scheme, got: {}", url.scheme()),
                    );
                }

                if url.host().is_none() {
                    result.add_error(field_name, "URL must have a host");
                }
            }
            Err(e) => {
                result.add_error(field_name, format!("Invalid URL: {}", e));
            }
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Directory holding persisted history and favorites
    pub fn store_dir(&self) -> PathBuf {
        self.config_dir.join("store")
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("climate");

        Ok(config_dir.join("config.toml"))
    }
}
