//! Connection establishment with fixed-delay retry.
//!
//! The coordinator may still be starting when a plugin process launches, so
//! the first connection is retried a bounded number of times before giving up.

use crate::config::LifecycleConfig;
use crate::error::{MeshError, Result};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first one).
    pub max_retries: u32,
    /// Delay between two attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: LifecycleConfig::MAX_RETRIES,
            retry_delay: LifecycleConfig::RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Attempts actually made; zero is treated as a single attempt.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }
}

/// Statistics about a retry operation.
#[derive(Debug, Clone, Default)]
pub struct RetryStats {
    /// Number of attempts made.
    pub attempts: u32,
    /// Total delay accumulated.
    pub total_delay: Duration,
    /// Last error message if any attempt failed.
    pub last_error: Option<String>,
}

/// Retry a blocking operation with a fixed delay.
///
/// `operation` receives the 1-based attempt number. Errors for which
/// `should_retry` returns false end the loop immediately.
pub fn retry_blocking<T, E, F>(
    policy: &RetryPolicy,
    mut operation: F,
    should_retry: impl Fn(&E) -> bool,
) -> (std::result::Result<T, E>, RetryStats)
where
    F: FnMut(u32) -> std::result::Result<T, E>,
    E: std::fmt::Display,
{
    let mut stats = RetryStats::default();
    let max = policy.attempts();

    loop {
        stats.attempts += 1;
        let attempt = stats.attempts;

        match operation(attempt) {
            Ok(value) => {
                if attempt > 1 {
                    debug!("Operation succeeded after {} attempts", attempt);
                }
                return (Ok(value), stats);
            }
            Err(e) => {
                stats.last_error = Some(e.to_string());

                if !should_retry(&e) {
                    debug!("Error is not retryable: {}", e);
                    return (Err(e), stats);
                }

                if attempt >= max {
                    warn!("All {} attempts exhausted. Last error: {}", max, e);
                    return (Err(e), stats);
                }

                warn!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}",
                    attempt, max, e, policy.retry_delay
                );
                stats.total_delay += policy.retry_delay;
                std::thread::sleep(policy.retry_delay);
            }
        }
    }
}

/// Open a TCP connection to the coordinator, retrying per `policy`.
pub fn connect_with_retry(
    addr: SocketAddr,
    policy: &RetryPolicy,
) -> Result<(TcpStream, RetryStats)> {
    let (result, stats) = retry_blocking(
        policy,
        |attempt| {
            debug!("Connecting to {} (attempt {})", addr, attempt);
            TcpStream::connect(addr).map_err(MeshError::from)
        },
        MeshError::is_retryable,
    );

    match result {
        Ok(stream) => {
            info!("Connected to coordinator at {}", addr);
            Ok((stream, stats))
        }
        Err(MeshError::Io {
            source: Some(err), ..
        }) => Err(MeshError::connect(addr, stats.attempts, err)),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn quick(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_retries(max_retries)
            .with_retry_delay(Duration::from_millis(5))
    }

    /// An address with nothing listening on it.
    fn closed_addr() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        addr
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.retry_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_exhausts_after_exactly_max_retries() {
        let mut calls = 0;
        let (result, stats) = retry_blocking(
            &quick(3),
            |_| {
                calls += 1;
                Err::<(), _>("refused".to_string())
            },
            |_| true,
        );

        assert!(result.is_err());
        assert_eq!(calls, 3);
        assert_eq!(stats.attempts, 3);
        assert_eq!(stats.total_delay, Duration::from_millis(10));
        assert_eq!(stats.last_error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_zero_retries_means_one_attempt() {
        let (_, stats) = retry_blocking(&quick(0), |_| Err::<(), _>("nope"), |_| true);
        assert_eq!(stats.attempts, 1);
    }

    #[test]
    fn test_succeeds_after_failures() {
        let (result, stats) = retry_blocking(
            &quick(5),
            |attempt| if attempt < 3 { Err("not yet") } else { Ok(attempt) },
            |_| true,
        );
        assert_eq!(result.unwrap(), 3);
        assert_eq!(stats.attempts, 3);
    }

    #[test]
    fn test_non_retryable_stops_immediately() {
        let (result, stats) = retry_blocking(
            &quick(5),
            |_| Err::<(), _>("permanent failure"),
            |e| !e.contains("permanent"),
        );
        assert!(result.is_err());
        assert_eq!(stats.attempts, 1);
    }

    #[test]
    fn test_connect_failure_reports_attempts() {
        let addr = closed_addr();

        let err = connect_with_retry(addr, &quick(3)).unwrap_err();

        match err {
            MeshError::Connect {
                addr: reported,
                attempts,
                ..
            } => {
                assert_eq!(reported, addr.to_string());
                assert_eq!(attempts, 3);
            }
            other => panic!("expected connect error, got {other:?}"),
        }
    }

    #[test]
    fn test_connect_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let (stream, stats) =
            connect_with_retry(listener.local_addr().unwrap(), &quick(3)).unwrap();
        assert_eq!(stats.attempts, 1);
        assert!(stream.peer_addr().is_ok());
    }
}
