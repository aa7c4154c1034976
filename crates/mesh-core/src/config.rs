//! Centralized configuration for the mesh runtime.
//!
//! Constant holders follow the same layout as the rest of the crate's
//! configuration: grouped per concern, overridable at runtime through
//! [`RuntimeConfig`].

use crate::runtime::connect::RetryPolicy;
use crate::{MeshError, Result};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// Transport and protocol constants.
pub struct TransportConfig;

impl TransportConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 6142;
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB
    pub const POLL_INTERVAL: Duration = Duration::from_millis(300);
    pub const FRAME_STALL_TIMEOUT: Duration = Duration::from_secs(30);
    pub const READ_CHUNK_SIZE: usize = 8192;

    /// Role name the coordinator answers to.
    pub const MANAGER_ROLE: &'static str = "manager";
}

/// Plugin loop and lifecycle constants.
pub struct LifecycleConfig;

impl LifecycleConfig {
    pub const TICK_INTERVAL: Duration = Duration::from_secs(1);
    pub const DEFAULT_TICK_SLEEP: Duration = Duration::from_secs(5);
    pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
    pub const JOIN_TIMEOUT: Duration = Duration::from_secs(5);
    pub const MAX_RETRIES: u32 = 5;
    pub const RETRY_DELAY: Duration = Duration::from_secs(2);
}

/// Runtime settings for one plugin process.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Coordinator address.
    pub addr: SocketAddr,
    /// Connection retry behaviour.
    pub retry: RetryPolicy,
    /// Bounded wait for the reader's socket read and the writer's queue pop.
    pub poll_interval: Duration,
    /// Pause between two tick cycles.
    pub tick_interval: Duration,
    pub handshake_timeout: Duration,
    /// Bounded join for each transport thread during shutdown.
    pub join_timeout: Duration,
    /// How long a partially received frame may sit without progress.
    pub frame_stall_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], TransportConfig::DEFAULT_PORT)),
            retry: RetryPolicy::default(),
            poll_interval: TransportConfig::POLL_INTERVAL,
            tick_interval: LifecycleConfig::TICK_INTERVAL,
            handshake_timeout: LifecycleConfig::HANDSHAKE_TIMEOUT,
            join_timeout: LifecycleConfig::JOIN_TIMEOUT,
            frame_stall_timeout: TransportConfig::FRAME_STALL_TIMEOUT,
        }
    }
}

impl RuntimeConfig {
    /// Create a config targeting the given coordinator address.
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            ..Self::default()
        }
    }

    /// Resolve `host:port` into a config.
    pub fn for_host(host: &str, port: u16) -> Result<Self> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| MeshError::InvalidAddress {
                addr: format!("{}:{}", host, port),
                message: e.to_string(),
            })?
            .next()
            .ok_or_else(|| MeshError::InvalidAddress {
                addr: format!("{}:{}", host, port),
                message: "no addresses resolved".to_string(),
            })?;
        Ok(Self::new(addr))
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    pub fn with_frame_stall_timeout(mut self, timeout: Duration) -> Self {
        self.frame_stall_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_targets_local_coordinator() {
        let config = RuntimeConfig::default();
        assert_eq!(config.addr.port(), TransportConfig::DEFAULT_PORT);
        assert!(config.addr.ip().is_loopback());
    }

    #[test]
    fn test_for_host_resolves_loopback() {
        let config = RuntimeConfig::for_host("127.0.0.1", 7000).unwrap();
        assert_eq!(config.addr.port(), 7000);
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(TransportConfig::POLL_INTERVAL < LifecycleConfig::JOIN_TIMEOUT);
        assert!(TransportConfig::MAX_FRAME_SIZE > TransportConfig::READ_CHUNK_SIZE);
    }
}
