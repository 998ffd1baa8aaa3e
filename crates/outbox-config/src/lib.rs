//! Configuration surface for the outbox subsystem.
//!
//! `Config` and its nested groups are plain data with `Default` impls that
//! produce a working configuration out of the box — no file or
//! environment access is required. [`loader::load_layered_yaml`] is an
//! optional convenience for operators who do want to load one from disk.

pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One of the three retry-delay shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyKind {
    Fixed,
    Linear,
    Exponential,
}

impl Default for RetryPolicyKind {
    fn default() -> Self {
        RetryPolicyKind::Exponential
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedPolicyConfig {
    pub delay_ms: u64,
}

impl Default for FixedPolicyConfig {
    fn default() -> Self {
        Self { delay_ms: 5_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearPolicyConfig {
    pub initial_ms: u64,
    pub increment_ms: u64,
    pub max_ms: u64,
}

impl Default for LinearPolicyConfig {
    fn default() -> Self {
        Self {
            initial_ms: 2_000,
            increment_ms: 2_000,
            max_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialPolicyConfig {
    pub initial_ms: u64,
    pub multiplier: f64,
    pub max_ms: u64,
}

impl Default for ExponentialPolicyConfig {
    fn default() -> Self {
        Self {
            initial_ms: 2_000,
            multiplier: 2.0,
            max_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub policy: RetryPolicyKind,
    pub jitter_ms: u64,
    pub include_exceptions: Vec<String>,
    pub exclude_exceptions: Vec<String>,
    pub fixed: FixedPolicyConfig,
    pub linear: LinearPolicyConfig,
    pub exponential: ExponentialPolicyConfig,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            policy: RetryPolicyKind::default(),
            jitter_ms: 0,
            include_exceptions: Vec::new(),
            exclude_exceptions: Vec::new(),
            fixed: FixedPolicyConfig::default(),
            linear: LinearPolicyConfig::default(),
            exponential: ExponentialPolicyConfig::default(),
        }
    }
}

/// Key-selection strategy for a poll tick, selected by config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyBatchMode {
    SkipKeysWithOpenOlderRecords,
    AllPendingKeys,
}

impl Default for KeyBatchMode {
    fn default() -> Self {
        KeyBatchMode::SkipKeysWithOpenOlderRecords
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    pub stop_on_first_failure: bool,
    pub delete_on_complete: bool,
    pub worker_core: usize,
    pub worker_max: usize,
    /// -1 means unlimited.
    pub concurrency_limit: i64,
    pub key_batch_mode: KeyBatchMode,
    /// Opt-in housekeeping sweep (see SPEC_FULL.md §C); 0 disables it.
    pub housekeeping_interval_ms: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            stop_on_first_failure: true,
            delete_on_complete: false,
            worker_core: 4,
            worker_max: 8,
            concurrency_limit: -1,
            key_batch_mode: KeyBatchMode::default(),
            housekeeping_interval_ms: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub heartbeat_interval_ms: u64,
    pub stale_timeout_ms: u64,
    pub graceful_shutdown_timeout_ms: u64,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 5_000,
            stale_timeout_ms: 30_000,
            graceful_shutdown_timeout_ms: 15_000,
        }
    }
}

impl InstanceConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn stale_timeout(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.stale_timeout_ms as i64)
    }

    pub fn graceful_shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_shutdown_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub rebalance_interval_ms: u64,
    pub batch_size: usize,
    pub retry: RetryConfig,
    pub processing: ProcessingConfig,
    pub instance: InstanceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: 2_000,
            rebalance_interval_ms: 10_000,
            batch_size: 10,
            retry: RetryConfig::default(),
            processing: ProcessingConfig::default(),
            instance: InstanceConfig::default(),
        }
    }
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rebalance_interval(&self) -> Duration {
        Duration::from_millis(self.rebalance_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable() {
        let cfg = Config::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.poll_interval_ms, 2_000);
        assert_eq!(cfg.rebalance_interval_ms, 10_000);
        assert_eq!(cfg.batch_size, 10);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.retry.policy, RetryPolicyKind::Exponential);
        assert_eq!(cfg.retry.jitter_ms, 0);
        assert_eq!(cfg.retry.fixed.delay_ms, 5_000);
        assert_eq!(cfg.retry.linear.initial_ms, 2_000);
        assert_eq!(cfg.retry.linear.increment_ms, 2_000);
        assert_eq!(cfg.retry.linear.max_ms, 60_000);
        assert_eq!(cfg.retry.exponential.initial_ms, 2_000);
        assert_eq!(cfg.retry.exponential.multiplier, 2.0);
        assert_eq!(cfg.retry.exponential.max_ms, 60_000);
        assert!(cfg.processing.stop_on_first_failure);
        assert!(!cfg.processing.delete_on_complete);
        assert_eq!(cfg.processing.worker_core, 4);
        assert_eq!(cfg.processing.worker_max, 8);
        assert_eq!(cfg.processing.concurrency_limit, -1);
        assert_eq!(cfg.processing.key_batch_mode, KeyBatchMode::SkipKeysWithOpenOlderRecords);
        assert_eq!(cfg.processing.housekeeping_interval_ms, 0);
        assert_eq!(cfg.instance.heartbeat_interval_ms, 5_000);
        assert_eq!(cfg.instance.stale_timeout_ms, 30_000);
        assert_eq!(cfg.instance.graceful_shutdown_timeout_ms, 15_000);
    }
}
