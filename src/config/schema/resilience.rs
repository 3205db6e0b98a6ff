use crate::classifier::ApiErrorType;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use super::default_true;

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_jitter() -> f64 {
    0.5
}

fn default_retryable_errors() -> HashSet<ApiErrorType> {
    HashSet::from([
        ApiErrorType::Network,
        ApiErrorType::Timeout,
        ApiErrorType::Server,
    ])
}

/// Retry policy for `RetryController::execute_with_retry`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts", rename = "maxAttempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms", rename = "baseDelayMs")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms", rename = "maxDelayMs")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier", rename = "backoffMultiplier")]
    pub backoff_multiplier: f64,
    /// Per-attempt budget. Zero disables the timeout.
    #[serde(default = "default_timeout_ms", rename = "timeoutMs")]
    pub timeout_ms: u64,
    #[serde(default = "default_retryable_errors", rename = "retryableErrors")]
    pub retryable_errors: HashSet<ApiErrorType>,
    /// Fraction of the computed delay used as a symmetric random spread.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            timeout_ms: default_timeout_ms(),
            retryable_errors: default_retryable_errors(),
            jitter: default_jitter(),
        }
    }
}

impl RetryConfig {
    /// Short delays and fewer attempts, used when `HAULGUARD_ENV=test`.
    pub fn test_profile() -> Self {
        Self {
            max_attempts: 2,
            base_delay_ms: 10,
            max_delay_ms: 100,
            timeout_ms: 1000,
            ..Self::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }

    pub fn is_retryable(&self, error_type: ApiErrorType) -> bool {
        self.retryable_errors.contains(&error_type)
    }
}

// ---------------------------------------------------------------------------
// Circuit breaker
// ---------------------------------------------------------------------------

fn default_failure_threshold() -> u32 {
    5
}

fn default_cool_down_ms() -> u64 {
    30_000
}

fn default_half_open_probes() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_failure_threshold", rename = "failureThreshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cool_down_ms", rename = "coolDownMs")]
    pub cool_down_ms: u64,
    #[serde(default = "default_half_open_probes", rename = "halfOpenProbes")]
    pub half_open_probes: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: default_failure_threshold(),
            cool_down_ms: default_cool_down_ms(),
            half_open_probes: default_half_open_probes(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cool_down(&self) -> Duration {
        Duration::from_millis(self.cool_down_ms)
    }
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

fn default_stale_after_secs() -> u64 {
    300
}

fn default_max_cached_entries() -> u64 {
    256
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FallbackConfig {
    #[serde(default = "default_true", rename = "enableCache")]
    pub enable_cache: bool,
    #[serde(default = "default_true", rename = "enableMockData")]
    pub enable_mock_data: bool,
    /// Cached payloads older than this are treated as absent.
    #[serde(default = "default_stale_after_secs", rename = "staleAfterSecs")]
    pub stale_after_secs: u64,
    #[serde(default = "default_max_cached_entries", rename = "maxCachedEntries")]
    pub max_cached_entries: u64,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enable_cache: true,
            enable_mock_data: true,
            stale_after_secs: default_stale_after_secs(),
            max_cached_entries: default_max_cached_entries(),
        }
    }
}

// ---------------------------------------------------------------------------
// Error handler
// ---------------------------------------------------------------------------

fn default_history_capacity() -> usize {
    1000
}

fn default_auth_refresh_attempts() -> u32 {
    1
}

fn default_metrics_window_secs() -> u64 {
    3600
}

/// Raise an alert when `threshold` errors of `error_type` land within
/// `window_secs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AlertRule {
    #[serde(rename = "errorType")]
    pub error_type: ApiErrorType,
    pub threshold: usize,
    #[serde(rename = "windowSecs")]
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HandlerConfig {
    #[serde(default = "default_history_capacity", rename = "historyCapacity")]
    pub history_capacity: usize,
    /// Token refreshes allowed per request, independent of the retry budget.
    #[serde(
        default = "default_auth_refresh_attempts",
        rename = "authRefreshAttempts"
    )]
    pub auth_refresh_attempts: u32,
    #[serde(default = "default_metrics_window_secs", rename = "metricsWindowSecs")]
    pub metrics_window_secs: u64,
    #[serde(default, rename = "alertRules")]
    pub alert_rules: Vec<AlertRule>,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            auth_refresh_attempts: default_auth_refresh_attempts(),
            metrics_window_secs: default_metrics_window_secs(),
            alert_rules: Vec::new(),
        }
    }
}
