//! Retry policy for `APIHandler` calls: exponential backoff with
//! jitter, honoring an adapter's advisory `retry_after_s` when present.
//! Jitter uses the same dependency-free generator the rest of the stack
//! uses for backoff randomization rather than pulling in a `rand` crate
//! for one call site.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use batch_core::error::ApiError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub initial_backoff: Duration,
  pub backoff_multiplier: f64,
  pub jitter_fraction: f64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      initial_backoff: Duration::from_millis(500),
      backoff_multiplier: 2.0,
      jitter_fraction: 0.2,
    }
  }
}

impl RetryPolicy {
  /// Backoff before retry attempt `attempt` (0-indexed: the delay before
  /// the *second* try), honoring `retry_after_s` verbatim when present.
  pub fn backoff_for(&self, attempt: u32, retry_after_s: Option<f64>) -> Duration {
    if let Some(seconds) = retry_after_s {
      return Duration::from_secs_f64(seconds.max(0.0));
    }
    let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
    let jitter = 1.0 + ((rand_f64() * 2.0 - 1.0) * self.jitter_fraction);
    Duration::from_secs_f64((base * jitter).max(0.0))
  }

  pub fn should_retry(&self, attempt: u32, error: &ApiError) -> bool {
    attempt + 1 < self.max_attempts && error.is_retryable()
  }
}

fn rand_f64() -> f64 {
  let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().subsec_nanos();
  (nanos as f64 / u32::MAX as f64).fract()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn retry_after_is_honored_verbatim() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff_for(0, Some(2.5)), Duration::from_secs_f64(2.5));
  }

  #[test]
  fn backoff_grows_with_attempt() {
    let policy = RetryPolicy::default();
    let first = policy.backoff_for(0, None).as_secs_f64();
    let second = policy.backoff_for(1, None).as_secs_f64();
    assert!(second > first * 1.3);
  }

  #[test]
  fn exhausted_attempts_stop_retrying() {
    let policy = RetryPolicy { max_attempts: 2, ..Default::default() };
    let retryable = ApiError::new("x").with_retryable(true).with_status_code(503);
    assert!(policy.should_retry(0, &retryable));
    assert!(!policy.should_retry(1, &retryable));
  }

  #[test]
  fn non_retryable_error_is_not_retried() {
    let policy = RetryPolicy::default();
    let non_retryable = ApiError::new("bad request").with_status_code(400);
    assert!(!policy.should_retry(0, &non_retryable));
  }
}
