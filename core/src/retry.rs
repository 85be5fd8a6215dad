// Copyright (c) 2026 PrismQ Contributors
// Licensed and distributed under either of
//   * MIT license (license terms in the root directory or at http://opensource.org/licenses/MIT).
//   * Apache v2 license (license terms in the root directory or at http://www.apache.org/licenses/LICENSE-2.0).
// at your option. This file may not be copied, modified, or distributed except according to those terms.

//! Exponential backoff with jitter, and the dead-letter threshold decision.

use std::{collections::HashMap, time::Duration};

use rand::Rng;

/// Backoff parameters for one task type (or the global default).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub base: Duration,
    pub factor: f64,
    pub cap: Duration,
    pub dead_letter_enabled: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            factor: 2.0,
            cap: Duration::from_secs(300),
            dead_letter_enabled: true,
        }
    }
}

impl RetryPolicy {
    /// `attempts` is 1-indexed: the attempt that just failed.
    pub fn backoff(&self, attempts: u32) -> Duration {
        self.backoff_with_rng(attempts, &mut rand::thread_rng())
    }

    /// Deterministic variant for tests: pass in an RNG instead of the thread one.
    pub fn backoff_with_rng(&self, attempts: u32, rng: &mut impl Rng) -> Duration {
        let exponent = attempts.saturating_sub(1) as i32;
        let scaled = self.base.as_secs_f64() * self.factor.powi(exponent);
        let capped = scaled.min(self.cap.as_secs_f64());
        let jitter = rng.gen_range(0.0..=self.base.as_secs_f64());
        Duration::from_secs_f64(capped + jitter)
    }

    pub fn should_dead_letter(&self, attempts: u32, max_attempts: u32) -> bool {
        attempts >= max_attempts && self.dead_letter_enabled
    }
}

/// Resolves a [`RetryPolicy`] by task type, falling back to a default.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicyResolver {
    default: RetryPolicy,
    by_type: HashMap<String, RetryPolicy>,
}

impl RetryPolicyResolver {
    pub fn new(default: RetryPolicy) -> Self {
        Self {
            default,
            by_type: HashMap::new(),
        }
    }

    pub fn with_policy(mut self, task_type: impl Into<String>, policy: RetryPolicy) -> Self {
        self.by_type.insert(task_type.into(), policy);
        self
    }

    pub fn resolve(&self, task_type: &str) -> RetryPolicy {
        self.by_type.get(task_type).copied().unwrap_or(self.default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn backoff_grows_exponentially_and_saturates_at_cap() {
        let policy = RetryPolicy {
            base: Duration::from_millis(50),
            factor: 2.0,
            cap: Duration::from_secs(1),
            dead_letter_enabled: true,
        };
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        let d1 = policy.backoff_with_rng(1, &mut rng);
        let d2 = policy.backoff_with_rng(2, &mut rng);
        let d3 = policy.backoff_with_rng(3, &mut rng);

        assert!(d1.as_secs_f64() >= 0.050 && d1.as_secs_f64() < 0.050 + 0.050 + 0.001);
        assert!(d2.as_secs_f64() >= 0.100);
        assert!(d3.as_secs_f64() >= 0.200);

        // far past the cap: result must still be bounded by cap + max jitter
        let d_big = policy.backoff_with_rng(20, &mut rng);
        assert!(d_big.as_secs_f64() <= 1.050);
    }

    #[test]
    fn dead_letter_requires_threshold_and_flag() {
        let enabled = RetryPolicy {
            dead_letter_enabled: true,
            ..Default::default()
        };
        let disabled = RetryPolicy {
            dead_letter_enabled: false,
            ..Default::default()
        };

        assert!(enabled.should_dead_letter(3, 3));
        assert!(!enabled.should_dead_letter(2, 3));
        assert!(!disabled.should_dead_letter(3, 3));
    }

    #[test]
    fn resolver_falls_back_to_default() {
        let resolver = RetryPolicyResolver::new(RetryPolicy::default()).with_policy(
            "sources.youtube",
            RetryPolicy {
                base: Duration::from_millis(10),
                ..Default::default()
            },
        );

        assert_eq!(
            resolver.resolve("sources.youtube").base,
            Duration::from_millis(10)
        );
        assert_eq!(resolver.resolve("unknown.type").base, Duration::from_secs(1));
    }
}
