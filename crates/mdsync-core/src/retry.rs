//! Retry with exponential backoff
//!
//! Wraps a single remote call. Only transient errors are retried; anything
//! else is returned immediately.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::SyncResult;

/// Backoff settings for remote calls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Multiplier applied after each retry
    #[serde(default = "default_factor")]
    pub factor: u32,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_factor() -> u32 {
    2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            factor: default_factor(),
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let multiplier = u64::from(self.factor.max(1)).saturating_pow(retry);
        Duration::from_millis(self.base_delay_ms.saturating_mul(multiplier))
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
///
/// A server-provided `Retry-After` wins over the computed delay when it is
/// longer.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> SyncResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SyncResult<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut retry_index = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && retry_index + 1 < attempts => {
                let mut delay = policy.delay_for(retry_index);
                if let Some(server_delay) = e.retry_after() {
                    delay = delay.max(server_delay);
                }
                warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    label,
                    retry_index + 1,
                    attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                retry_index += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            factor: 2,
        }
    }

    #[test]
    fn test_default_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_for(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(4000));
    }

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry(&fast_policy(), "op", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(SyncError::RateLimited { retry_after: None })
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<()> = retry(&fast_policy(), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::Transient("connection reset".to_string()))
        })
        .await;

        assert!(matches!(result, Err(SyncError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_permanent() {
        let calls = AtomicU32::new(0);
        let result: SyncResult<()> = retry(&fast_policy(), "op", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SyncError::Permanent("unauthorized".to_string()))
        })
        .await;

        assert!(result.unwrap_err().is_fatal());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
