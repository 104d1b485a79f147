//! Exponential backoff with jitter, shared by every retriable suspension point (§7): the
//! Fetcher's network calls, the Embedder/VectorStore/RelationalStore adapters, and the OCR
//! subprocess call. Each retry loop lives next to the call it wraps (worker pool, adapters);
//! this module only owns the backoff math, generalized from a provider-specific wrapper.

use std::time::Duration;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
  pub backoff_multiplier: f64,
  pub jitter_pct: f64,
}

impl Default for RetryConfig {
  /// §7 defaults: `retries_max=2`, backoff 500ms -> 8s, ±20% jitter.
  fn default() -> Self {
    Self {
      max_retries: 2,
      initial_backoff: Duration::from_millis(500),
      max_backoff: Duration::from_secs(8),
      backoff_multiplier: 2.0,
      jitter_pct: 0.20,
    }
  }
}

impl RetryConfig {
  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    backoff_for_attempt(self, attempt)
  }
}

/// Compute the backoff duration for the given (0-indexed) retry attempt, jittered by
/// up to `±jitter_pct` of the unjittered value, then capped at `max_backoff`.
pub fn backoff_for_attempt(config: &RetryConfig, attempt: u32) -> Duration {
  let base = config.initial_backoff.as_secs_f64() * config.backoff_multiplier.powi(attempt as i32);
  let capped = base.min(config.max_backoff.as_secs_f64());

  // jitter in [-jitter_pct, +jitter_pct], no external `rand` dependency needed for this.
  let jitter_factor = 1.0 + (rand_unit() * 2.0 - 1.0) * config.jitter_pct;
  let jittered = capped * jitter_factor;

  Duration::from_secs_f64(jittered.clamp(0.0, config.max_backoff.as_secs_f64()))
}

/// A pseudo-random value in `[0.0, 1.0)`, seeded from the clock. Good enough for jitter;
/// not suitable for anything that needs real randomness.
fn rand_unit() -> f64 {
  use std::time::{SystemTime, UNIX_EPOCH};

  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .subsec_nanos();

  (nanos as f64 / u32::MAX as f64).fract()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn backoff_grows_exponentially_without_jitter() {
    let config = RetryConfig {
      jitter_pct: 0.0,
      ..RetryConfig::default()
    };
    assert_eq!(backoff_for_attempt(&config, 0), Duration::from_millis(500));
    assert_eq!(backoff_for_attempt(&config, 1), Duration::from_secs(1));
    assert_eq!(backoff_for_attempt(&config, 2), Duration::from_secs(2));
    assert_eq!(backoff_for_attempt(&config, 3), Duration::from_secs(4));
  }

  #[test]
  fn backoff_respects_cap() {
    let config = RetryConfig {
      jitter_pct: 0.0,
      ..RetryConfig::default()
    };
    // attempt 5 would be 500ms * 2^5 = 16s, capped at 8s.
    assert_eq!(backoff_for_attempt(&config, 5), Duration::from_secs(8));
  }

  #[test]
  fn jitter_stays_within_twenty_percent() {
    let config = RetryConfig::default();
    for _ in 0..200 {
      let d = backoff_for_attempt(&config, 0).as_secs_f64();
      assert!((0.5 * 0.8..=0.5 * 1.2 + 1e-9).contains(&d), "backoff {d} out of jitter range");
    }
  }

  #[test]
  fn default_matches_spec_policy() {
    let config = RetryConfig::default();
    assert_eq!(config.max_retries, 2);
    assert_eq!(config.initial_backoff, Duration::from_millis(500));
    assert_eq!(config.max_backoff, Duration::from_secs(8));
  }
}
