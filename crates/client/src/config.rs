//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `DELIVERLY_API_BASE_URL` - Backend REST API base URL
//! - `DELIVERLY_API_TOKEN` - Bearer credential issued by the auth service
//!
//! ## Optional
//! - `DELIVERLY_DELIVERY_FEE` - Storefront delivery fee (default: 200)
//! - `DELIVERLY_COURIER_MIN_PRICE` - Courier price floor (default: 150)
//! - `DELIVERLY_POLL_INTERVAL_MS` - Payment status poll interval (default: 3000)
//! - `DELIVERLY_PAYMENT_TIMEOUT_SECS` - Max payment polling duration (default: 900)
//! - `DELIVERLY_REQUEST_TIMEOUT_SECS` - Per-request HTTP timeout (default: 10)
//! - `DELIVERLY_PROMO_CACHE_TTL_SECS` - Promo catalog cache TTL (default: 300)
//! - `DELIVERLY_NOTIFICATIONS_ENABLED` - Send order notifications (default: false)
//! - `SENTRY_DSN` - Sentry error tracking DSN

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use deliverly_core::Money;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use url::Url;

/// Storefront delivery fee used when nothing else is configured.
pub const DEFAULT_DELIVERY_FEE: Money = Money::new(200);

/// Lowest price a courier order may be submitted with.
pub const DEFAULT_COURIER_MIN_PRICE: Money = Money::new(150);

/// Gateway status poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Upper bound on how long a payment session is polled.
pub const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_secs(15 * 60);

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_PROMO_CACHE_TTL: Duration = Duration::from_secs(300);

const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.0;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Client configuration.
///
/// Implements `Debug` manually to redact the bearer token.
#[derive(Clone)]
pub struct ClientConfig {
    /// Backend REST API base URL.
    pub api_base_url: Url,
    /// Bearer credential sent with every request.
    pub api_token: SecretString,
    /// Fixed delivery fee for storefront orders.
    pub delivery_fee: Money,
    /// Minimum user-entered price for courier orders.
    pub courier_min_price: Money,
    /// Interval between payment status polls.
    pub poll_interval: Duration,
    /// Maximum time a payment session is polled before giving up.
    pub payment_timeout: Duration,
    /// Per-request HTTP timeout.
    pub request_timeout: Duration,
    /// How long a fetched promo catalog stays fresh.
    pub promo_cache_ttl: Duration,
    /// Whether the user opted into order notifications.
    pub notifications_enabled: bool,
    /// Sentry DSN for error tracking.
    pub sentry_dsn: Option<String>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url.as_str())
            .field("api_token", &"[REDACTED]")
            .field("delivery_fee", &self.delivery_fee)
            .field("courier_min_price", &self.courier_min_price)
            .field("poll_interval", &self.poll_interval)
            .field("payment_timeout", &self.payment_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("promo_cache_ttl", &self.promo_cache_ttl)
            .field("notifications_enabled", &self.notifications_enabled)
            .field("sentry_dsn", &self.sentry_dsn.as_ref().map(|_| "[SET]"))
            .finish()
    }
}

impl ClientConfig {
    /// Build a configuration with default settings.
    #[must_use]
    pub fn new(api_base_url: Url, api_token: SecretString) -> Self {
        Self {
            api_base_url,
            api_token,
            delivery_fee: DEFAULT_DELIVERY_FEE,
            courier_min_price: DEFAULT_COURIER_MIN_PRICE,
            poll_interval: DEFAULT_POLL_INTERVAL,
            payment_timeout: DEFAULT_PAYMENT_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            promo_cache_ttl: DEFAULT_PROMO_CACHE_TTL,
            notifications_enabled: false,
            sentry_dsn: None,
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if the token fails validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_base_url = get_required_env("DELIVERLY_API_BASE_URL")?;
        let api_base_url = parse_base_url(&api_base_url).map_err(|e| {
            ConfigError::InvalidEnvVar("DELIVERLY_API_BASE_URL".to_string(), e)
        })?;
        let api_token = get_validated_secret("DELIVERLY_API_TOKEN")?;

        Ok(Self {
            api_base_url,
            api_token,
            delivery_fee: get_parsed_env("DELIVERLY_DELIVERY_FEE", DEFAULT_DELIVERY_FEE)?,
            courier_min_price: get_parsed_env(
                "DELIVERLY_COURIER_MIN_PRICE",
                DEFAULT_COURIER_MIN_PRICE,
            )?,
            poll_interval: non_zero(
                "DELIVERLY_POLL_INTERVAL_MS",
                Duration::from_millis(get_parsed_env(
                    "DELIVERLY_POLL_INTERVAL_MS",
                    duration_millis(DEFAULT_POLL_INTERVAL),
                )?),
            )?,
            payment_timeout: non_zero(
                "DELIVERLY_PAYMENT_TIMEOUT_SECS",
                Duration::from_secs(get_parsed_env(
                    "DELIVERLY_PAYMENT_TIMEOUT_SECS",
                    DEFAULT_PAYMENT_TIMEOUT.as_secs(),
                )?),
            )?,
            request_timeout: Duration::from_secs(get_parsed_env(
                "DELIVERLY_REQUEST_TIMEOUT_SECS",
                DEFAULT_REQUEST_TIMEOUT.as_secs(),
            )?),
            promo_cache_ttl: Duration::from_secs(get_parsed_env(
                "DELIVERLY_PROMO_CACHE_TTL_SECS",
                DEFAULT_PROMO_CACHE_TTL.as_secs(),
            )?),
            notifications_enabled: get_parsed_env("DELIVERLY_NOTIFICATIONS_ENABLED", false)?,
            sentry_dsn: get_optional_env("SENTRY_DSN"),
        })
    }

    /// Expose the bearer token for the HTTP layer.
    pub(crate) fn bearer_token(&self) -> &str {
        self.api_token.expose_secret()
    }
}

/// Parse a base URL, making sure it ends with a slash so relative endpoint
/// paths join below it instead of replacing its last segment.
fn parse_base_url(raw: &str) -> Result<Url, String> {
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    let url = Url::parse(&normalized).map_err(|e| e.to_string())?;
    if url.cannot_be_a_base() {
        return Err("URL cannot be used as a base".to_string());
    }
    Ok(url)
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable parsed into `T`, or a default when unset.
fn get_parsed_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get_optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
        None => Ok(default),
    }
}

/// Reject a zero duration for `key`.
fn non_zero(key: &str, duration: Duration) -> Result<Duration, ConfigError> {
    if duration.is_zero() {
        return Err(ConfigError::InvalidEnvVar(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(duration)
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)] // Character count will never exceed f64 precision
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    if secret.trim().is_empty() {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            "must not be empty".to_string(),
        ));
    }

    let lower = secret.to_lowercase();

    // Check blocklist
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    // Real bearer tokens are long random strings
    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1})"
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}
