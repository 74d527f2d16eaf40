//! Configuration Module
//!
//! Handles loading and managing server configuration from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ServerError;

/// Which transport serves the cache protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Readiness reactor threads, many connections per thread
    NonBlocking,
    /// One OS thread per connection
    Blocking,
}

impl FromStr for Transport {
    type Err = ServerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nonblocking" | "non-blocking" | "reactor" => Ok(Transport::NonBlocking),
            "blocking" | "threads" => Ok(Transport::Blocking),
            other => Err(ServerError::Config(format!("unknown transport '{}'", other))),
        }
    }
}

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache capacity in bytes (sum of key and value sizes)
    pub cache_capacity: usize,
    /// Memcached protocol port
    pub server_port: u16,
    /// HTTP admin port, None = disabled
    pub admin_port: Option<u16>,
    /// Transport used for the cache protocol
    pub transport: Transport,
    /// Reactor threads for the non-blocking transport
    pub workers: usize,
    /// Connection cap for the blocking transport
    pub max_connections: usize,
    /// Bounded readiness wait in milliseconds
    pub poll_interval_ms: u64,
    /// Upper bound on shutdown draining in milliseconds
    pub drain_timeout_ms: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_CAPACITY` - Cache capacity in bytes (default: 64 MiB)
    /// - `SERVER_PORT` - Memcached port (default: 11211)
    /// - `ADMIN_PORT` - HTTP admin port, 0 disables (default: 3000)
    /// - `TRANSPORT` - `nonblocking` or `blocking` (default: nonblocking)
    /// - `WORKERS` - Reactor threads (default: 4)
    /// - `MAX_CONNECTIONS` - Blocking transport connection cap (default: 128)
    /// - `POLL_INTERVAL_MS` - Readiness wait bound (default: 100)
    /// - `DRAIN_TIMEOUT_MS` - Shutdown drain bound (default: 5000)
    ///
    /// Unparseable values fall back to their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let admin_port = env_or("ADMIN_PORT", defaults.admin_port.unwrap_or(0));

        Self {
            cache_capacity: env_or("CACHE_CAPACITY", defaults.cache_capacity),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            admin_port: (admin_port != 0).then_some(admin_port),
            transport: env::var("TRANSPORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.transport),
            workers: env_or("WORKERS", defaults.workers).max(1),
            max_connections: env_or("MAX_CONNECTIONS", defaults.max_connections).max(1),
            poll_interval_ms: env_or("POLL_INTERVAL_MS", defaults.poll_interval_ms).max(1),
            drain_timeout_ms: env_or("DRAIN_TIMEOUT_MS", defaults.drain_timeout_ms),
        }
    }

    /// Bounded readiness wait.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on shutdown draining.
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_capacity: 64 * 1024 * 1024,
            server_port: 11211,
            admin_port: Some(3000),
            transport: Transport::NonBlocking,
            workers: 4,
            max_connections: 128,
            poll_interval_ms: 100,
            drain_timeout_ms: 5000,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.cache_capacity, 64 * 1024 * 1024);
        assert_eq!(config.server_port, 11211);
        assert_eq!(config.admin_port, Some(3000));
        assert_eq!(config.transport, Transport::NonBlocking);
        assert_eq!(config.workers, 4);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "CACHE_CAPACITY",
            "SERVER_PORT",
            "ADMIN_PORT",
            "TRANSPORT",
            "WORKERS",
            "MAX_CONNECTIONS",
            "POLL_INTERVAL_MS",
            "DRAIN_TIMEOUT_MS",
        ] {
            env::remove_var(name);
        }

        let config = Config::from_env();
        assert_eq!(config.cache_capacity, 64 * 1024 * 1024);
        assert_eq!(config.server_port, 11211);
        assert_eq!(config.admin_port, Some(3000));
        assert_eq!(config.transport, Transport::NonBlocking);
        assert_eq!(config.max_connections, 128);
        assert_eq!(config.drain_timeout(), Duration::from_millis(5000));
    }

    #[test]
    fn test_transport_from_str() {
        assert_eq!("blocking".parse::<Transport>().unwrap(), Transport::Blocking);
        assert_eq!(
            "NonBlocking".parse::<Transport>().unwrap(),
            Transport::NonBlocking
        );
        assert!(matches!(
            "carrier-pigeon".parse::<Transport>(),
            Err(ServerError::Config(_))
        ));
    }
}
