//! Retry Policies and the policy registry that resolves one
//! for a given handler id.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use outbox_config::{RetryConfig, RetryPolicyKind};
use rand::Rng;

/// A value that, given an attempt count and an error, yields a next-delay
/// and a retryability verdict.
pub trait RetryPolicy: Send + Sync {
    /// Delay before the `attempt`-th retry (1-indexed: `attempt=1` is the
    /// delay after the first failure).
    fn next_delay(&self, attempt: u32) -> Duration;

    /// `false` excludes the error from retry regardless of attempt count.
    fn should_retry(&self, error_type_name: &str) -> bool;

    fn max_retries(&self) -> u32;
}

#[derive(Debug, Clone)]
struct IncludeExclude {
    include: Vec<String>,
    exclude: Vec<String>,
}

impl IncludeExclude {
    fn evaluate(&self, error_type_name: &str) -> bool {
        if self.exclude.iter().any(|t| t == error_type_name) {
            return false;
        }
        if !self.include.is_empty() && !self.include.iter().any(|t| t == error_type_name) {
            return false;
        }
        true
    }
}

struct FixedPolicy {
    delay: Duration,
    max_retries: u32,
    filters: IncludeExclude,
}

impl RetryPolicy for FixedPolicy {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }

    fn should_retry(&self, error_type_name: &str) -> bool {
        self.filters.evaluate(error_type_name)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

struct LinearPolicy {
    initial: Duration,
    increment: Duration,
    max: Duration,
    max_retries: u32,
    filters: IncludeExclude,
}

impl RetryPolicy for LinearPolicy {
    fn next_delay(&self, attempt: u32) -> Duration {
        let n = attempt.saturating_sub(1);
        let grown = self.initial + self.increment.saturating_mul(n);
        grown.min(self.max)
    }

    fn should_retry(&self, error_type_name: &str) -> bool {
        self.filters.evaluate(error_type_name)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

struct ExponentialPolicy {
    initial: Duration,
    multiplier: f64,
    max: Duration,
    max_retries: u32,
    filters: IncludeExclude,
}

impl RetryPolicy for ExponentialPolicy {
    fn next_delay(&self, attempt: u32) -> Duration {
        let n = attempt.saturating_sub(1);
        let factor = self.multiplier.powi(n as i32);
        let millis = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }

    fn should_retry(&self, error_type_name: &str) -> bool {
        self.filters.evaluate(error_type_name)
    }

    fn max_retries(&self) -> u32 {
        self.max_retries
    }
}

/// Wraps another policy, adding a symmetric random jitter in
/// `[-jitter, +jitter]` milliseconds, clamped to a non-negative duration.
struct JitterPolicy {
    inner: Box<dyn RetryPolicy>,
    jitter_ms: i64,
}

impl RetryPolicy for JitterPolicy {
    fn next_delay(&self, attempt: u32) -> Duration {
        let base = self.inner.next_delay(attempt).as_millis() as i64;
        if self.jitter_ms == 0 {
            return Duration::from_millis(base as u64);
        }
        let offset = rand::thread_rng().gen_range(-self.jitter_ms..=self.jitter_ms);
        Duration::from_millis((base + offset).max(0) as u64)
    }

    fn should_retry(&self, error_type_name: &str) -> bool {
        self.inner.should_retry(error_type_name)
    }

    fn max_retries(&self) -> u32 {
        self.inner.max_retries()
    }
}

/// Build a boxed policy from a [`RetryConfig`], matching its
/// table of shapes and defaults.
pub fn policy_from_config(cfg: &RetryConfig) -> Arc<dyn RetryPolicy> {
    let filters = IncludeExclude {
        include: cfg.include_exceptions.clone(),
        exclude: cfg.exclude_exceptions.clone(),
    };

    let base: Box<dyn RetryPolicy> = match cfg.policy {
        RetryPolicyKind::Fixed => Box::new(FixedPolicy {
            delay: Duration::from_millis(cfg.fixed.delay_ms),
            max_retries: cfg.max_retries,
            filters,
        }),
        RetryPolicyKind::Linear => Box::new(LinearPolicy {
            initial: Duration::from_millis(cfg.linear.initial_ms),
            increment: Duration::from_millis(cfg.linear.increment_ms),
            max: Duration::from_millis(cfg.linear.max_ms),
            max_retries: cfg.max_retries,
            filters,
        }),
        RetryPolicyKind::Exponential => Box::new(ExponentialPolicy {
            initial: Duration::from_millis(cfg.exponential.initial_ms),
            multiplier: cfg.exponential.multiplier,
            max: Duration::from_millis(cfg.exponential.max_ms),
            max_retries: cfg.max_retries,
            filters,
        }),
    };

    if cfg.jitter_ms == 0 {
        Arc::from(base)
    } else {
        Arc::new(JitterPolicy {
            inner: base,
            jitter_ms: cfg.jitter_ms as i64,
        })
    }
}

/// Resolves the policy for a handler id: an explicit per-handler binding if
/// one was registered, else the default. Built once at startup in
/// [`PolicyRegistry::new`]; lookups afterward never take a lock — the map
/// itself is never mutated again.
pub struct PolicyRegistry {
    default: Arc<dyn RetryPolicy>,
    overrides: HashMap<String, Arc<dyn RetryPolicy>>,
}

impl PolicyRegistry {
    pub fn new(default: Arc<dyn RetryPolicy>, overrides: HashMap<String, Arc<dyn RetryPolicy>>) -> Self {
        Self { default, overrides }
    }

    pub fn resolve(&self, handler_id: &str) -> Arc<dyn RetryPolicy> {
        self.overrides
            .get(handler_id)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.default))
    }
}
