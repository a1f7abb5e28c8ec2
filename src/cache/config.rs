//! Cache timing configuration.
//!
//! Controls how long "missing" markers and fingerprint-checked views live, how
//! often partial folders are polled, and the background sweep cadence.

use std::time::Duration;

use serde::Deserialize;

// Default values for cache timings
const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;
const DEFAULT_MISSING_RETRY_MS: u64 = 3_000;
const DEFAULT_MISSING_SLIDING_SECS: u64 = 15 * 60;
const DEFAULT_VIEW_RECHECK_MS: u64 = 30_000;
const DEFAULT_COMPILE_FAILURE_RETRY_MS: u64 = 2_000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 1_000;

/// Cache timing configuration from `vellum.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Interval between partial-folder polls when the store cannot push changes.
    pub poll_interval_ms: u64,
    /// Lifetime of a "missing" marker when the store cannot push changes.
    pub missing_retry_ms: u64,
    /// Sliding lifetime of a "missing" marker backed by a change token.
    pub missing_sliding_secs: u64,
    /// Lifetime of a fingerprint-checked compiled view.
    pub view_recheck_ms: u64,
    /// How long a file that failed to compile is treated as missing.
    pub compile_failure_retry_ms: u64,
    /// Cadence of the background sweeper.
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            missing_retry_ms: DEFAULT_MISSING_RETRY_MS,
            missing_sliding_secs: DEFAULT_MISSING_SLIDING_SECS,
            view_recheck_ms: DEFAULT_VIEW_RECHECK_MS,
            compile_failure_retry_ms: DEFAULT_COMPILE_FAILURE_RETRY_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            poll_interval_ms: settings.poll_interval_ms.get(),
            missing_retry_ms: settings.missing_retry_ms.get(),
            missing_sliding_secs: settings.missing_sliding_secs.get(),
            view_recheck_ms: settings.view_recheck_ms.get(),
            compile_failure_retry_ms: settings.compile_failure_retry_ms.get(),
            sweep_interval_ms: settings.sweep_interval_ms.get(),
        }
    }
}

impl CacheConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn missing_retry(&self) -> Duration {
        Duration::from_millis(self.missing_retry_ms)
    }

    pub fn missing_sliding(&self) -> Duration {
        Duration::from_secs(self.missing_sliding_secs)
    }

    pub fn view_recheck(&self) -> Duration {
        Duration::from_millis(self.view_recheck_ms)
    }

    pub fn compile_failure_retry(&self) -> Duration {
        Duration::from_millis(self.compile_failure_retry_ms)
    }

    /// Sweep cadence, clamped to at least one millisecond.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms.max(1))
    }
}
