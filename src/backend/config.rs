//! Server configuration.
//!
//! A single source of truth for tunables, loadable from environment
//! variables with sensible defaults and validation.

use std::time::Duration;

use snafu::Snafu;
use snafu::ensure;

/// Default number of missing changes above which a pull answers with a
/// snapshot instead of an incremental change list.
pub const DEFAULT_SNAPSHOT_THRESHOLD: u64 = 500;

/// Default number of changes between stored snapshots.
pub const DEFAULT_SNAPSHOT_INTERVAL: u64 = 1000;

/// Configuration error types.
#[derive(Debug, Snafu)]
pub enum ConfigError {
    /// A configuration value is invalid.
    #[snafu(display("invalid configuration for {key}: '{value}' ({reason})"))]
    InvalidValue {
        /// The offending key.
        key: String,
        /// The raw value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

/// Authorization webhook settings.
#[derive(Debug, Clone)]
pub struct AuthWebhookConfig {
    /// Decision service URL; unset disables authorization entirely.
    pub url: Option<String>,
    /// Methods requiring authorization; empty means all methods.
    pub methods: Vec<String>,
    /// Retries after the initial attempt.
    pub max_retries: u64,
    /// Upper bound on a single backoff wait.
    pub max_wait_interval: Duration,
    /// How long an allow decision stays cached.
    pub cache_auth_ttl: Duration,
    /// How long a deny decision stays cached.
    pub cache_unauth_ttl: Duration,
    /// Decision cache capacity in fingerprints.
    pub cache_size: usize,
}

impl Default for AuthWebhookConfig {
    fn default() -> Self {
        AuthWebhookConfig {
            url: None,
            methods: Vec::new(),
            max_retries: 10,
            max_wait_interval: Duration::from_millis(3000),
            cache_auth_ttl: Duration::from_secs(10),
            cache_unauth_ttl: Duration::from_secs(10),
            cache_size: 5000,
        }
    }
}

impl AuthWebhookConfig {
    /// Whether calls to `method` must be verified.
    pub fn require_auth(&self, method: &str) -> bool {
        if self.url.is_none() {
            return false;
        }
        self.methods.is_empty() || self.methods.iter().any(|m| m == method)
    }
}

/// Top-level configuration of the synchronization core.
#[derive(Debug, Clone)]
pub struct Config {
    /// Missing-change count above which a pull returns a snapshot.
    pub snapshot_threshold: u64,
    /// Minimum change count between stored snapshots.
    pub snapshot_interval: u64,
    /// Authorization webhook settings.
    pub auth_webhook: AuthWebhookConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            snapshot_threshold: DEFAULT_SNAPSHOT_THRESHOLD,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            auth_webhook: AuthWebhookConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to
    /// defaults for unset keys.
    pub fn load() -> Result<Self, ConfigError> {
        let snapshot_threshold =
            parse_env_u64("LARCH_SNAPSHOT_THRESHOLD", DEFAULT_SNAPSHOT_THRESHOLD)?;
        let snapshot_interval =
            parse_env_u64("LARCH_SNAPSHOT_INTERVAL", DEFAULT_SNAPSHOT_INTERVAL)?;

        let defaults = AuthWebhookConfig::default();
        let auth_webhook = AuthWebhookConfig {
            url: std::env::var("LARCH_AUTH_WEBHOOK_URL").ok().filter(|url| !url.is_empty()),
            methods: std::env::var("LARCH_AUTH_WEBHOOK_METHODS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|m| !m.is_empty())
                        .map(str::to_owned)
                        .collect()
                })
                .unwrap_or_default(),
            max_retries: parse_env_u64("LARCH_AUTH_WEBHOOK_MAX_RETRIES", defaults.max_retries)?,
            max_wait_interval: parse_env_ms(
                "LARCH_AUTH_WEBHOOK_MAX_WAIT_INTERVAL_MS",
                defaults.max_wait_interval,
            )?,
            cache_auth_ttl: parse_env_ms("LARCH_AUTH_WEBHOOK_CACHE_AUTH_TTL_MS", defaults.cache_auth_ttl)?,
            cache_unauth_ttl: parse_env_ms(
                "LARCH_AUTH_WEBHOOK_CACHE_UNAUTH_TTL_MS",
                defaults.cache_unauth_ttl,
            )?,
            cache_size: parse_env_u64("LARCH_AUTH_WEBHOOK_CACHE_SIZE", defaults.cache_size as u64)?
                as usize,
        };

        let config = Config {
            snapshot_threshold,
            snapshot_interval,
            auth_webhook,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.snapshot_threshold > 0,
            InvalidValueSnafu {
                key: "snapshot_threshold",
                value: self.snapshot_threshold.to_string(),
                reason: "must be positive",
            }
        );
        ensure!(
            self.snapshot_interval > 0,
            InvalidValueSnafu {
                key: "snapshot_interval",
                value: self.snapshot_interval.to_string(),
                reason: "must be positive",
            }
        );
        ensure!(
            self.auth_webhook.cache_size > 0,
            InvalidValueSnafu {
                key: "auth_webhook.cache_size",
                value: self.auth_webhook.cache_size.to_string(),
                reason: "must be positive",
            }
        );
        Ok(())
    }
}

fn parse_env_u64(key: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_ms(key: &str, default: Duration) -> Result<Duration, ConfigError> {
    Ok(Duration::from_millis(parse_env_u64(
        key,
        default.as_millis() as u64,
    )?))
}
