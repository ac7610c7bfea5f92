//! Retry with exponential, jittered backoff for transport calls.
//!
//! Only errors marked [`AccessError::Retriable`] are repeated. Everything
//! else, including digest mismatches, is returned immediately.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AccessError, Result};

/// Bounds for repeating a transient failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RetryPolicy {
    /// Total number of calls, including the first one.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 5000,
        }
    }
}

impl RetryPolicy {
    /// A policy that calls the operation exactly once.
    pub fn no_retry() -> Self {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Base delay before retry number `attempt` (0 based), without jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    fn jittered(&self, attempt: u32) -> Duration {
        let base = self.backoff(attempt).as_millis() as u64;
        // Jitter is bounded to half the backoff + 1.
        let max_jitter = base / 2 + 1;
        let jitter = rand::thread_rng().gen_range(0..max_jitter);
        Duration::from_millis(base.saturating_add(jitter).min(self.max_backoff_ms.max(base)))
    }
}

/// Call `op` until it succeeds, fails permanently, or attempts run out.
///
/// On exhaustion the last error is returned without its retriable marker.
pub fn retry<T>(policy: &RetryPolicy, mut op: impl FnMut() -> Result<T>) -> Result<T> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(AccessError::Retriable(inner)) if attempt + 1 < attempts => {
                let delay = policy.jittered(attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    "transient failure, retrying in {delay:?}: {inner}"
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                attempt += 1;
            }
            Err(err) => return Err(err.into_permanent()),
        }
    }
}
