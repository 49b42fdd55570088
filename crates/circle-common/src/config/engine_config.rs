//! Engine configuration
//!
//! Loaded from environment variables (after reading `.env` when present).
//! Database and Redis groups are optional: without `DATABASE_URL` the engine
//! runs on the in-memory store, without `REDIS_URL` notifications and
//! presence stay in-process.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// Main engine configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub app: AppSettings,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub messaging: MessagingConfig,
    pub invites: InviteConfig,
    pub moderation: ModerationConfig,
    pub engine: RuntimeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub env: Environment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: u32,
}

/// Message sending and history limits
#[derive(Debug, Clone, Deserialize)]
pub struct MessagingConfig {
    pub history_limit: usize,
    pub max_history_limit: usize,
    pub max_content_length: usize,
    pub enforce_slow_mode: bool,
}

impl MessagingConfig {
    /// Requested page size, defaulted and capped
    pub fn clamp_history(&self, requested: Option<usize>) -> usize {
        requested
            .unwrap_or(self.history_limit)
            .clamp(1, self.max_history_limit.max(1))
    }
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            max_history_limit: 500,
            max_content_length: 4000,
            enforce_slow_mode: true,
        }
    }
}

/// Longest default invite lifetime accepted from the environment (one year)
pub const MAX_INVITE_EXPIRY_HOURS: i64 = 8_760;
/// Longest mute ceiling accepted from the environment (one year)
pub const MAX_MUTE_MINUTES_LIMIT: i64 = 525_600;

/// Defaults applied when an invite is generated without explicit limits
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InviteConfig {
    pub default_expiry_hours: Option<i64>,
    /// Zero means unlimited
    pub default_usage_limit: u32,
}

impl InviteConfig {
    pub fn default_expiry(&self) -> Option<chrono::Duration> {
        self.default_expiry_hours
            .filter(|hours| *hours > 0)
            .and_then(chrono::Duration::try_hours)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModerationConfig {
    pub max_mute_minutes: i64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            max_mute_minutes: 43_200,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Upper bound on any single store call
    pub store_timeout_ms: u64,
    pub worker_id: u16,
}

impl RuntimeConfig {
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 10_000,
            worker_id: 0,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app: AppSettings {
                name: default_app_name(),
                env: Environment::default(),
            },
            database: None,
            redis: None,
            messaging: MessagingConfig::default(),
            invites: InviteConfig::default(),
            moderation: ModerationConfig::default(),
            engine: RuntimeConfig::default(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "circle-engine".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_redis_max_connections() -> u32 {
    10
}

impl EngineConfig {
    /// Load configuration from `.env` and the process environment
    ///
    /// # Errors
    /// Returns an error if a variable is present but cannot be parsed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Database settings, for callers that cannot run without Postgres
    pub fn require_database(&self) -> Result<&DatabaseConfig, ConfigError> {
        self.database
            .as_ref()
            .ok_or(ConfigError::MissingVar("DATABASE_URL"))
    }

    pub fn require_redis(&self) -> Result<&RedisConfig, ConfigError> {
        self.redis.as_ref().ok_or(ConfigError::MissingVar("REDIS_URL"))
    }

    /// Build from any key/value source; unset keys take their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let defaults = Self::default();

        let database = match vars.get("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: vars
                    .parse("DATABASE_MAX_CONNECTIONS")?
                    .unwrap_or_else(default_max_connections),
                min_connections: vars
                    .parse("DATABASE_MIN_CONNECTIONS")?
                    .unwrap_or_else(default_min_connections),
            }),
            None => None,
        };

        let redis = match vars.get("REDIS_URL") {
            Some(url) => Some(RedisConfig {
                url,
                max_connections: vars
                    .parse("REDIS_MAX_CONNECTIONS")?
                    .unwrap_or_else(default_redis_max_connections),
            }),
            None => None,
        };

        let env = match vars.get("APP_ENV") {
            Some(raw) => Environment::parse(&raw)
                .ok_or(ConfigError::InvalidValue("APP_ENV", raw))?,
            None => Environment::default(),
        };

        let worker_id: u16 = vars
            .parse("WORKER_ID")?
            .unwrap_or(defaults.engine.worker_id);
        if worker_id >= 1024 {
            return Err(ConfigError::InvalidValue("WORKER_ID", worker_id.to_string()));
        }

        let default_expiry_hours: Option<i64> = vars.parse("INVITE_DEFAULT_EXPIRY_HOURS")?;
        if let Some(hours) = default_expiry_hours.filter(|h| !(1..=MAX_INVITE_EXPIRY_HOURS).contains(h)) {
            return Err(ConfigError::InvalidValue("INVITE_DEFAULT_EXPIRY_HOURS", hours.to_string()));
        }
        let max_mute_minutes = vars
            .parse("MAX_MUTE_MINUTES")?
            .unwrap_or(defaults.moderation.max_mute_minutes);
        if !(1..=MAX_MUTE_MINUTES_LIMIT).contains(&max_mute_minutes) {
            return Err(ConfigError::InvalidValue("MAX_MUTE_MINUTES", max_mute_minutes.to_string()));
        }

        Ok(Self {
            app: AppSettings {
                name: vars.get("APP_NAME").unwrap_or_else(default_app_name),
                env,
            },
            database,
            redis,
            messaging: MessagingConfig {
                history_limit: vars
                    .parse("MESSAGE_HISTORY_LIMIT")?
                    .unwrap_or(defaults.messaging.history_limit),
                max_history_limit: vars
                    .parse("MESSAGE_MAX_HISTORY_LIMIT")?
                    .unwrap_or(defaults.messaging.max_history_limit),
                max_content_length: vars
                    .parse("MESSAGE_MAX_LENGTH")?
                    .unwrap_or(defaults.messaging.max_content_length),
                enforce_slow_mode: vars
                    .parse("ENFORCE_SLOW_MODE")?
                    .unwrap_or(defaults.messaging.enforce_slow_mode),
            },
            invites: InviteConfig {
                default_expiry_hours,
                default_usage_limit: vars
                    .parse("INVITE_DEFAULT_USAGE_LIMIT")?
                    .unwrap_or(defaults.invites.default_usage_limit),
            },
            moderation: ModerationConfig { max_mute_minutes },
            engine: RuntimeConfig {
                store_timeout_ms: vars
                    .parse("STORE_TIMEOUT_MS")?
                    .unwrap_or(defaults.engine.store_timeout_ms),
                worker_id,
            },
        })
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Unset is `Ok(None)`; set but unparsable is an error
    fn parse<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        self.get(key)
            .map(|raw| raw.parse().map_err(|_| ConfigError::InvalidValue(key, raw)))
            .transpose()
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
