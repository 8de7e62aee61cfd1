//! Storefront configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! All variables are optional; defaults target a backend running locally.
//!
//! - `SOKO_API_BASE_URL` - Marketplace API base URL (default: `http://localhost:5000/api`)
//! - `SOKO_DATA_DIR` - Directory for local storage (default: `$HOME/.soko`)
//! - `SOKO_REQUEST_TIMEOUT_SECS` - Per-request timeout (default: 30)
//! - `SOKO_CATALOG_CACHE_TTL_SECS` - Product cache lifetime (default: 300)
//! - `SOKO_POLL_MAX_ATTEMPTS` - M-Pesa status checks before giving up (default: 24)
//! - `SOKO_POLL_INTERVAL_MS` - Delay between status checks (default: 5000)
//! - `SOKO_CARD_CALLBACK_URL` - Return URL handed to the card gateway
//! - `SOKO_LOG_FORMAT` - `pretty` (default) or `json`
//! - `SENTRY_DSN` - Sentry error tracking DSN
//! - `SENTRY_ENVIRONMENT` - Sentry environment name

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::services::payments::PollConfig;

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CATALOG_CACHE_TTL_SECS: u64 = 300;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Storefront client configuration.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Marketplace API base URL (always ends with a slash)
    pub api_base_url: Url,
    /// Directory holding `storage.json`
    pub data_dir: PathBuf,
    /// Timeout applied to every API request
    pub request_timeout: Duration,
    /// How long product listings and details stay cached
    pub catalog_cache_ttl: Duration,
    /// M-Pesa payment status polling budget
    pub payment_poll: PollConfig,
    /// Where the card gateway sends the customer after payment
    pub card_callback_url: Option<Url>,
    /// Log output format
    pub log_format: LogFormat,
    /// Sentry error tracking configuration
    pub sentry: SentryConfig,
}

/// Sentry configuration.
#[derive(Debug, Clone, Default)]
pub struct SentryConfig {
    /// Sentry DSN; tracking is disabled when unset
    pub dsn: Option<String>,
    /// Environment tag attached to events
    pub environment: Option<String>,
}

impl StorefrontConfig {
    /// Build a configuration with defaults for everything except the API
    /// location and data directory.
    #[must_use]
    pub fn new(api_base_url: Url, data_dir: PathBuf) -> Self {
        Self {
            api_base_url: with_trailing_slash(api_base_url),
            data_dir,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            catalog_cache_ttl: Duration::from_secs(DEFAULT_CATALOG_CACHE_TTL_SECS),
            payment_poll: PollConfig::default(),
            card_callback_url: None,
            log_format: LogFormat::default(),
            sentry: SentryConfig::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is present but malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = parse_url(
            "SOKO_API_BASE_URL",
            &get_env_or_default("SOKO_API_BASE_URL", DEFAULT_API_BASE_URL),
        )?;
        let data_dir = get_optional_env("SOKO_DATA_DIR").map_or_else(default_data_dir, PathBuf::from);

        let mut config = Self::new(api_base_url, data_dir);
        config.request_timeout = Duration::from_secs(parse_positive(
            "SOKO_REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT_SECS,
        )?);
        config.catalog_cache_ttl = Duration::from_secs(parse_positive(
            "SOKO_CATALOG_CACHE_TTL_SECS",
            DEFAULT_CATALOG_CACHE_TTL_SECS,
        )?);

        let defaults = PollConfig::default();
        let max_attempts = parse_positive(
            "SOKO_POLL_MAX_ATTEMPTS",
            u64::from(defaults.max_attempts),
        )?;
        let max_attempts = u32::try_from(max_attempts).map_err(|e| {
            ConfigError::InvalidEnvVar("SOKO_POLL_MAX_ATTEMPTS".to_string(), e.to_string())
        })?;
        let interval_ms = parse_positive(
            "SOKO_POLL_INTERVAL_MS",
            u64::try_from(defaults.interval.as_millis()).unwrap_or(5_000),
        )?;
        config.payment_poll = PollConfig::new(max_attempts, Duration::from_millis(interval_ms));

        config.card_callback_url = get_optional_env("SOKO_CARD_CALLBACK_URL")
            .map(|raw| parse_url("SOKO_CARD_CALLBACK_URL", &raw))
            .transpose()?;

        config.log_format = match get_env_or_default("SOKO_LOG_FORMAT", "pretty").as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::InvalidEnvVar(
                    "SOKO_LOG_FORMAT".to_string(),
                    format!("expected 'pretty' or 'json', got '{other}'"),
                ));
            }
        };

        config.sentry = SentryConfig {
            dsn: get_optional_env("SENTRY_DSN"),
            environment: get_optional_env("SENTRY_ENVIRONMENT"),
        };

        Ok(config)
    }

    /// Path of the local storage file.
    #[must_use]
    pub fn storage_path(&self) -> PathBuf {
        self.data_dir.join(crate::storage::STORAGE_FILE)
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get an optional environment variable, treating empty values as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse a positive integer variable, falling back to `default` when unset.
fn parse_positive(key: &str, default: u64) -> Result<u64, ConfigError> {
    let Some(raw) = get_optional_env(key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if value == 0 {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

/// Parse an absolute http(s) URL.
fn parse_url(key: &str, raw: &str) -> Result<Url, ConfigError> {
    let url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            format!("unsupported scheme '{}'", url.scheme()),
        ));
    }
    Ok(url)
}

/// `Url::join` drops the last path segment unless the base ends with `/`.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(|| PathBuf::from(".soko"), |home| PathBuf::from(home).join(".soko"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_new_appends_trailing_slash() {
        let config = StorefrontConfig::new(
            Url::parse("https://api.soko.co.ke/api").unwrap(),
            PathBuf::from("/tmp/soko"),
        );
        assert_eq!(config.api_base_url.as_str(), "https://api.soko.co.ke/api/");
        assert_eq!(
            config.api_base_url.join("products").unwrap().as_str(),
            "https://api.soko.co.ke/api/products"
        );
    }

    #[test]
    fn test_new_uses_default_poll_budget() {
        let config = StorefrontConfig::new(
            Url::parse("http://localhost:5000/api/").unwrap(),
            PathBuf::from("data"),
        );
        assert_eq!(config.payment_poll.max_attempts, 24);
        assert_eq!(config.payment_poll.interval, Duration::from_secs(5));
        assert_eq!(config.storage_path(), PathBuf::from("data/storage.json"));
    }

    #[test]
    fn test_parse_url_rejects_other_schemes() {
        let result = parse_url("TEST_URL", "ftp://files.example.com");
        assert!(matches!(result, Err(ConfigError::InvalidEnvVar(_, _))));
        assert!(parse_url("TEST_URL", "not a url").is_err());
        assert!(parse_url("TEST_URL", "https://pay.example.com/return").is_ok());
    }

    #[test]
    fn test_parse_positive_default_when_unset() {
        let value = parse_positive("SOKO_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
