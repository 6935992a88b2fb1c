// SPDX-License-Identifier: MIT

//! Bounded retry with exponential backoff and jitter
//!
//! Wraps one fallible async operation. The delay before the retry that still
//! has `n` attempts left is `base_delay * 2^(n-1)`, jittered by +/-20%, so the
//! first retry waits longest. A zero base delay retries immediately.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Fraction of the backoff used as jitter range in both directions
const JITTER_FACTOR: f64 = 0.2;

/// Retry policy for collaborator calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay in milliseconds; 0 disables backoff
    #[serde(default)]
    pub base_delay_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: 0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Un-jittered backoff before the retry that has `remaining` attempts left
    pub fn backoff(&self, remaining: u32) -> Duration {
        if remaining == 0 || self.base_delay_ms == 0 {
            return Duration::ZERO;
        }
        let factor = 2u64.saturating_pow(remaining - 1);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }

    /// Jittered delay before the retry that has `remaining` attempts left
    pub fn delay(&self, remaining: u32) -> Duration {
        let backoff = self.backoff(remaining);
        if backoff.is_zero() {
            return backoff;
        }
        let millis = backoff.as_millis() as f64;
        let jitter = millis * JITTER_FACTOR * rand::thread_rng().gen_range(-1.0..=1.0);
        Duration::from_millis((millis + jitter).max(0.0) as u64)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are exhausted.
///
/// Retries on any error. The last error is returned unchanged.
pub async fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut remaining = policy.max_retries;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if remaining > 0 => {
                let delay = policy.delay(remaining);
                log::warn!(
                    "[Retry] {} failed ({} retries left, waiting {:?}): {}",
                    label,
                    remaining,
                    delay,
                    e
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                remaining -= 1;
            }
            Err(e) => {
                log::error!(
                    "[Retry] {} failed after {} attempts: {}",
                    label,
                    policy.max_retries + 1,
                    e
                );
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, String> = retry(RetryPolicy::new(3, 0), "flaky", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(format!("failure {}", n))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_always_failing_runs_max_retries_plus_one() {
        for max_retries in 0..4 {
            let calls = AtomicU32::new(0);
            let result: Result<(), String> =
                retry(RetryPolicy::new(max_retries, 0), "broken", || {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    async move { Err(format!("failure {}", n)) }
                })
                .await;

            assert_eq!(calls.load(Ordering::SeqCst), max_retries + 1);
            // Last error is surfaced unchanged
            assert_eq!(result.unwrap_err(), format!("failure {}", max_retries));
        }
    }

    #[tokio::test]
    async fn test_first_success_makes_one_call() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = retry(RetryPolicy::default(), "ok", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(7) }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_doubles_per_remaining_attempt() {
        let policy = RetryPolicy::new(3, 100);
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_stays_within_jitter_bounds() {
        let policy = RetryPolicy::new(3, 1000);
        for _ in 0..50 {
            let delay = policy.delay(2).as_millis();
            assert!((1600..=2400).contains(&delay), "delay {} out of range", delay);
        }
    }

    #[test]
    fn test_zero_base_delay_disables_backoff() {
        let policy = RetryPolicy::new(2, 0);
        assert_eq!(policy.delay(2), Duration::ZERO);
        assert_eq!(RetryPolicy::default().delay(1), Duration::ZERO);
    }

    #[test]
    fn test_policy_deserialize_defaults() {
        let policy: RetryPolicy = serde_yaml::from_str("base_delay_ms: 250").unwrap();
        assert_eq!(policy.max_retries, 2);
        assert_eq!(policy.base_delay_ms, 250);
    }
}
