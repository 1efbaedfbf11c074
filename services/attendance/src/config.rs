//! Service configuration
//!
//! Built-in defaults, then `attendance.toml` (or the file named by
//! `ATTENDANCE_CONFIG`), then `ATTENDANCE__*` environment variables with `__`
//! between nesting levels, e.g. `ATTENDANCE__STORE__BACKEND=postgres`.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::rate_limiter::RateLimiterConfig;
use crate::sessions::MAX_DURATION_MINUTES;

const CONFIG_PATH_VAR: &str = "ATTENDANCE_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "attendance";

/// Upper bound for the second-valued settings that are added to `Instant::now()`
pub const MAX_INTERVAL_SECONDS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
    pub store: StoreConfig,
    pub tokens: TokensConfig,
    pub session: SessionConfig,
    pub bootstrap: BootstrapConfig,
    pub login: LoginConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Document path for the file backend
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Row id of the document for the postgres backend
    pub document_id: String,
    /// Compare-and-swap attempts before a slot write reports contention
    pub max_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: "db.json".to_string(),
            database_url: None,
            max_connections: 5,
            document_id: "attendance".to_string(),
            max_retries: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokensConfig {
    pub backend: TokenBackend,
    pub redis_url: String,
    pub ttl_seconds: u64,
    /// Interval of the expired-token sweep for the memory backend
    pub sweep_seconds: u64,
}

impl TokensConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_seconds)
    }
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            backend: TokenBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            ttl_seconds: 12 * 60 * 60,
            sweep_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub default_duration_minutes: i64,
    /// Whether a start on a slot with a live session replaces it
    pub replace_active: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_duration_minutes: 90,
            replace_active: true,
        }
    }
}

/// Developer account seeded into an empty store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginConfig {
    pub max_attempts: u32,
    pub window_seconds: u64,
    pub ban_seconds: u64,
}

impl Default for LoginConfig {
    fn default() -> Self {
        let limits = RateLimiterConfig::default();
        Self {
            max_attempts: limits.max_attempts,
            window_seconds: limits.window_seconds,
            ban_seconds: limits.ban_duration_seconds,
        }
    }
}

impl From<&LoginConfig> for RateLimiterConfig {
    fn from(login: &LoginConfig) -> Self {
        RateLimiterConfig {
            max_attempts: login.max_attempts,
            window_seconds: login.window_seconds,
            ban_duration_seconds: login.ban_seconds,
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let file = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => File::with_name(&path).required(true),
            Err(_) => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("ATTENDANCE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Postgres && self.store.database_url.is_none() {
            return Err(ConfigError::Message(
                "store.database_url is required for the postgres backend".to_string(),
            ));
        }
        if !(1..=MAX_DURATION_MINUTES).contains(&self.session.default_duration_minutes) {
            return Err(ConfigError::Message(format!(
                "session.default_duration_minutes must be between 1 and {MAX_DURATION_MINUTES}"
            )));
        }
        for (key, seconds) in [
            ("tokens.ttl_seconds", self.tokens.ttl_seconds),
            ("tokens.sweep_seconds", self.tokens.sweep_seconds),
            ("login.window_seconds", self.login.window_seconds),
            ("login.ban_seconds", self.login.ban_seconds),
        ] {
            if !(1..=MAX_INTERVAL_SECONDS).contains(&seconds) {
                return Err(ConfigError::Message(format!(
                    "{key} must be between 1 and {MAX_INTERVAL_SECONDS}"
                )));
            }
        }
        if self.bootstrap.username.is_some() != self.bootstrap.password.is_some() {
            return Err(ConfigError::Message(
                "bootstrap.username and bootstrap.password must be set together".to_string(),
            ));
        }
        Ok(())
    }
}
