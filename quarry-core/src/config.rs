//! Pool and connection configuration

use crate::{Dialect, Error, Result};
use serde::Deserialize;
use std::time::Duration;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "QUARRY_MAX_CONNECTIONS";
pub const MAX_IDLE: &str = "QUARRY_MAX_IDLE";
pub const ACQUIRE_TIMEOUT_MS: &str = "QUARRY_ACQUIRE_TIMEOUT_MS";

fn default_max_connections() -> usize {
    10
}

/// Settings for a connection [`Pool`](crate::Pool)
///
/// Deserializes from any serde format; missing fields take their defaults.
///
/// ```
/// use quarry_core::{Dialect, PoolConfig};
///
/// let config: PoolConfig = serde_json::from_str(r#"{"url": "mysql://localhost/app"}"#).unwrap();
/// assert_eq!(config.max_connections, 10);
/// assert_eq!(config.dialect().unwrap(), Dialect::Mysql);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PoolConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Idle connections kept on release; defaults to `max_connections`
    #[serde(default)]
    pub max_idle: Option<usize>,
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
}

impl PoolConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            max_idle: None,
            acquire_timeout_ms: None,
        }
    }

    pub fn max_connections(mut self, n: usize) -> Self {
        self.max_connections = n;
        self
    }

    pub fn max_idle(mut self, n: usize) -> Self {
        self.max_idle = Some(n);
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Read `DATABASE_URL` and the `QUARRY_*` pool settings
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`PoolConfig::from_env`] with a custom variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup(DATABASE_URL)
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| Error::config(format!("{DATABASE_URL} must be set")))?;

        let mut config = Self::new(url);
        if let Some(n) = parse_var(&lookup, MAX_CONNECTIONS)? {
            config.max_connections = n;
        }
        config.max_idle = parse_var(&lookup, MAX_IDLE)?;
        config.acquire_timeout_ms = parse_var(&lookup, ACQUIRE_TIMEOUT_MS)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::config("max_connections must be at least 1"));
        }
        Ok(())
    }

    pub fn effective_max_idle(&self) -> usize {
        self.max_idle
            .unwrap_or(self.max_connections)
            .min(self.max_connections)
    }

    pub fn acquire_timeout_duration(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }

    /// Dialect implied by the URL scheme (`postgres://`, `mysql://`, `sqlite:`)
    pub fn dialect(&self) -> Result<Dialect> {
        Dialect::from_url(&self.url)
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::config(format!("{key} is not a valid number: '{raw}'"))),
        None => Ok(None),
    }
}
