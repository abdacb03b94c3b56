//! Relay configuration
//!
//! Every tunable is read from the environment with a typed default, so a
//! bare `cargo run` starts a relay against a local agent.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use relay_core::{RelayError, RelayResult};
use relay_kalshi::KALSHI_API_BASE;

use crate::agent_client::AgentClientConfig;
use crate::event_hub::EventHubConfig;
use crate::poller::PollerConfig;
use crate::trade_cache::TradeCacheConfig;

/// Default HTTP port (matches the frontend's expectations)
pub const DEFAULT_SERVER_PORT: u16 = 3001;

/// Upper bound on a single provider attempt inside the fallback chain
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Number of fills requested from Kalshi per fallback fetch
pub const DEFAULT_KALSHI_FILLS_LIMIT: u32 = 100;

/// Upstream (Kalshi) fallback settings
#[derive(Debug, Clone)]
pub struct KalshiSourceConfig {
    pub base_url: String,
    pub fills_limit: u32,
    pub timeout: Duration,
}

impl Default for KalshiSourceConfig {
    fn default() -> Self {
        Self {
            base_url: KALSHI_API_BASE.to_string(),
            fills_limit: DEFAULT_KALSHI_FILLS_LIMIT,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Complete relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub server_port: u16,
    pub agent: AgentClientConfig,
    pub poller: PollerConfig,
    pub provider_timeout: Duration,
    pub hub: EventHubConfig,
    pub heartbeat_interval: Duration,
    pub cache: TradeCacheConfig,
    pub kalshi: KalshiSourceConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_SERVER_PORT,
            agent: AgentClientConfig::default(),
            poller: PollerConfig::default(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            hub: EventHubConfig::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            cache: TradeCacheConfig::default(),
            kalshi: KalshiSourceConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from process environment variables
    ///
    /// Recognised variables:
    /// - `SERVER_PORT`
    /// - `AGENT_URL`, `AGENT_TIMEOUT_MS`
    /// - `POLL_INTERVAL_MS`, `PROVIDER_TIMEOUT_MS`, `HEARTBEAT_INTERVAL_SECS`
    /// - `RING_CAPACITY`, `SEEN_CAPACITY`, `SUBSCRIBER_QUEUE_CAPACITY`, `MAX_SUBSCRIBERS`
    /// - `CACHE_DB_PATH` (empty disables persistence), `CACHE_KEY_PREFIX`
    /// - `KALSHI_BASE_URL`, `KALSHI_FILLS_LIMIT`
    pub fn from_env() -> RelayResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> RelayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let agent = AgentClientConfig {
            base_url: lookup("AGENT_URL").unwrap_or(defaults.agent.base_url),
            timeout: millis(&lookup, "AGENT_TIMEOUT_MS", defaults.agent.timeout)?,
        };

        let poller = PollerConfig {
            interval: millis(&lookup, "POLL_INTERVAL_MS", defaults.poller.interval)?,
        };

        let hub = EventHubConfig {
            ring_capacity: parse(&lookup, "RING_CAPACITY", defaults.hub.ring_capacity)?,
            seen_capacity: parse(&lookup, "SEEN_CAPACITY", defaults.hub.seen_capacity)?,
            queue_capacity: parse(
                &lookup,
                "SUBSCRIBER_QUEUE_CAPACITY",
                defaults.hub.queue_capacity,
            )?,
            max_subscribers: match lookup("MAX_SUBSCRIBERS") {
                Some(raw) => Some(parse_value("MAX_SUBSCRIBERS", &raw)?),
                None => defaults.hub.max_subscribers,
            },
        };

        let cache = TradeCacheConfig {
            db_path: match lookup("CACHE_DB_PATH") {
                Some(path) if path.trim().is_empty() => None,
                Some(path) => Some(PathBuf::from(path)),
                None => defaults.cache.db_path,
            },
            key_prefix: lookup("CACHE_KEY_PREFIX").unwrap_or(defaults.cache.key_prefix),
        };

        let kalshi = KalshiSourceConfig {
            base_url: lookup("KALSHI_BASE_URL").unwrap_or(defaults.kalshi.base_url),
            fills_limit: parse(&lookup, "KALSHI_FILLS_LIMIT", defaults.kalshi.fills_limit)?,
            timeout: defaults.kalshi.timeout,
        };

        let config = Self {
            server_port: parse(&lookup, "SERVER_PORT", defaults.server_port)?,
            agent,
            poller,
            provider_timeout: millis(&lookup, "PROVIDER_TIMEOUT_MS", defaults.provider_timeout)?,
            hub,
            heartbeat_interval: Duration::from_secs(parse(
                &lookup,
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval.as_secs(),
            )?),
            cache,
            kalshi,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> RelayResult<()> {
        if self.poller.interval.is_zero() {
            return Err(RelayError::config("POLL_INTERVAL_MS must be positive"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(RelayError::config("HEARTBEAT_INTERVAL_SECS must be positive"));
        }
        if self.hub.ring_capacity == 0 {
            return Err(RelayError::config("RING_CAPACITY must be positive"));
        }
        if self.hub.queue_capacity == 0 {
            return Err(RelayError::config(
                "SUBSCRIBER_QUEUE_CAPACITY must be positive",
            ));
        }
        if self.agent.base_url.trim().is_empty() {
            return Err(RelayError::config("AGENT_URL must not be empty"));
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &str, default: T) -> RelayResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> RelayResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| RelayError::config(format!("Invalid {} '{}': {}", key, raw, e)))
}

fn millis<F>(lookup: &F, key: &str, default: Duration) -> RelayResult<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let ms: u64 = parse(lookup, key, default.as_millis() as u64)?;
    Ok(Duration::from_millis(ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RelayConfig::from_lookup(lookup_from(&[])).unwrap();

        assert_eq!(config.server_port, 3001);
        assert_eq!(config.poller.interval, Duration::from_secs(3));
        assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.agent.timeout, Duration::from_secs(2));
        assert_eq!(config.hub.ring_capacity, 100);
        assert_eq!(config.hub.seen_capacity, 1000);
        assert_eq!(config.hub.queue_capacity, 1000);
        assert_eq!(config.hub.max_subscribers, None);
        assert_eq!(config.cache.key_prefix, "relay:");
    }

    #[test]
    fn test_overrides() {
        let config = RelayConfig::from_lookup(lookup_from(&[
            ("AGENT_URL", "http://bot:9000"),
            ("POLL_INTERVAL_MS", "500"),
            ("MAX_SUBSCRIBERS", "25"),
            ("CACHE_DB_PATH", ""),
            ("HEARTBEAT_INTERVAL_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.agent.base_url, "http://bot:9000");
        assert_eq!(config.poller.interval, Duration::from_millis(500));
        assert_eq!(config.hub.max_subscribers, Some(25));
        assert_eq!(config.cache.db_path, None);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = RelayConfig::from_lookup(lookup_from(&[("RING_CAPACITY", "lots")])).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));

        let err = RelayConfig::from_lookup(lookup_from(&[("POLL_INTERVAL_MS", "0")])).unwrap_err();
        assert!(matches!(err, RelayError::Config(_)));
    }
}
