//! Service configuration
//!
//! Only the listening port and the data path come from the environment.
//! Feed tuning lives in `FeedConfig` and is set in code.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use types::errors::ConfigError;

use crate::backpressure::DropPolicy;
use crate::ranking::DEFAULT_TOP_N;

pub const PORT_ENV: &str = "PORT";
pub const DATA_PATH_ENV: &str = "DATA_PATH";

/// Process-level settings read at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub data_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            data_path: PathBuf::from("data/sites.json"),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys use defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let port = match set(PORT_ENV) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: PORT_ENV.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => defaults.port,
        };

        let data_path = set(DATA_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or(defaults.data_path);

        Ok(Self { port, data_path })
    }

    /// Listen on all interfaces.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }
}

/// Feed tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Time between ticks of one subscription.
    pub tick_interval: Duration,
    /// Sites per snapshot.
    pub top_n: usize,
    /// Outbound snapshots buffered per subscription.
    pub channel_capacity: usize,
    pub drop_policy: DropPolicy,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            top_n: DEFAULT_TOP_N,
            channel_capacity: 4,
            drop_policy: DropPolicy::SkipTick,
        }
    }
}
