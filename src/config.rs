use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

use crate::idle::ActivityKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub idle: IdleConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Scheme and authority of the REST service, without a trailing slash
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct IdleConfig {
    pub activity_events: BTreeSet<ActivityKind>,
    pub debounce_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Capacity of the origin-wide broadcast bus
    pub channel_capacity: usize,
    pub countdown_seconds: u32,
    pub login_route: String,
    pub redirect_delay_ms: u64,
    pub tick_interval_ms: u64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            activity_events: ActivityKind::ALL.into_iter().collect(),
            debounce_ms: 250,
            timeout_ms: 30 * 60 * 1000, // 30 minutes
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            countdown_seconds: 15,
            login_route: "/login".to_string(),
            redirect_delay_ms: 100,
            tick_interval_ms: 1000,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

impl IdleConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl SessionConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        let base_url = std::env::var("API_BASE_URL")
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|_| ApiConfig::default().base_url);

        let activity_events = match std::env::var("ACTIVITY_EVENTS") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<ActivityKind>()
                        .map_err(|e| ConfigError::ValidationError(e.to_string()))
                })
                .collect::<Result<BTreeSet<_>, _>>()?,
            Err(_) => IdleConfig::default().activity_events,
        };

        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let config = Config {
            api: ApiConfig {
                base_url,
                request_timeout_seconds: env_parse("API_TIMEOUT_SECONDS").unwrap_or(10),
            },
            idle: IdleConfig {
                activity_events,
                debounce_ms: env_parse("IDLE_DEBOUNCE_MS").unwrap_or(250),
                timeout_ms: env_parse::<u64>("IDLE_TIMEOUT_SECONDS")
                    .map(|s| s.saturating_mul(1000))
                    .unwrap_or(30 * 60 * 1000),
            },
            session: SessionConfig {
                countdown_seconds: env_parse("LOGOUT_COUNTDOWN_SECONDS").unwrap_or(15),
                ..Default::default()
            },
            storage: StorageConfig { data_dir },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "IDLE_TIMEOUT_SECONDS must be greater than zero".to_string(),
            ));
        }
        if self.idle.debounce_ms >= self.idle.timeout_ms {
            return Err(ConfigError::ValidationError(format!(
                "IDLE_DEBOUNCE_MS ({}) must be shorter than the idle timeout ({} ms)",
                self.idle.debounce_ms, self.idle.timeout_ms
            )));
        }
        if self.idle.activity_events.is_empty() {
            return Err(ConfigError::ValidationError(
                "ACTIVITY_EVENTS cannot be empty".to_string(),
            ));
        }
        if self.session.countdown_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "LOGOUT_COUNTDOWN_SECONDS must be greater than zero".to_string(),
            ));
        }

        if self.api.request_timeout_seconds == 0 {
            tracing::warn!("API_TIMEOUT_SECONDS is 0; logout requests will fail immediately");
        }

        Ok(())
    }
}
