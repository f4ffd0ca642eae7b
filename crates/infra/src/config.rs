//! Configuration loading and representation.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

/// Used when `CALLBACK_API_KEY` is absent. Only fit for local development.
pub const DEV_CALLBACK_API_KEY: &str = "dev-callback-key";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Process-level configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub bind_addr: SocketAddr,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub callback_api_key: String,
    /// Pause between two outbound calls of the same campaign.
    pub dispatch_delay: Duration,
    pub outbound_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            callback_api_key: DEV_CALLBACK_API_KEY.to_string(),
            dispatch_delay: Duration::from_millis(1000),
            outbound_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup` (the environment, or a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr = match lookup("BIND_ADDR") {
            Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
                name: "BIND_ADDR",
                value: v,
            })?,
            None => defaults.bind_addr,
        };

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());

        let callback_api_key = match lookup("CALLBACK_API_KEY").filter(|v| !v.is_empty()) {
            Some(key) => key,
            None => {
                warn!("CALLBACK_API_KEY not set, using the development key");
                defaults.callback_api_key
            }
        };

        let dispatch_delay = match lookup("DISPATCH_DELAY_MS") {
            Some(v) => Duration::from_millis(parse_number("DISPATCH_DELAY_MS", v)?),
            None => defaults.dispatch_delay,
        };

        let outbound_timeout = match lookup("OUTBOUND_TIMEOUT_SECS") {
            Some(v) => {
                let secs = parse_number("OUTBOUND_TIMEOUT_SECS", v.clone())?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        name: "OUTBOUND_TIMEOUT_SECS",
                        value: v,
                    });
                }
                Duration::from_secs(secs)
            }
            None => defaults.outbound_timeout,
        };

        Ok(Self {
            bind_addr,
            database_url,
            callback_api_key,
            dispatch_delay,
            outbound_timeout,
        })
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_callback_api_key(mut self, key: impl Into<String>) -> Self {
        self.callback_api_key = key.into();
        self
    }

    pub fn with_dispatch_delay(mut self, delay: Duration) -> Self {
        self.dispatch_delay = delay;
        self
    }

    pub fn with_outbound_timeout(mut self, timeout: Duration) -> Self {
        self.outbound_timeout = timeout;
        self
    }
}

fn parse_number(name: &'static str, value: String) -> Result<u64, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}
