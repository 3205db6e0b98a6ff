//! Retry with exponential backoff, jitter, per-attempt timeouts and
//! per-operation circuit breaking.

use crate::circuit_breaker::{CircuitBreakerRegistry, CircuitBreakerState};
use crate::classifier::{ApiError, RawFailure, classify};
use crate::config::{CircuitBreakerConfig, RetryConfig};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Unjittered backoff for the delay that follows failed attempt `attempt`
/// (1-based): `min(base * multiplier^(attempt-1), max)`.
pub fn base_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let raw = config.base_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let max = config.max_delay_ms as f64;
    let capped = if raw.is_finite() { raw.min(max) } else { max };
    Duration::from_millis(capped.max(0.0) as u64)
}

/// Backoff with a symmetric random spread of `jitter` around `base_delay`,
/// clamped to `[0, max_delay]`.
pub fn calculate_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base = base_delay(attempt, config).as_millis() as f64;
    let jitter = config.jitter.clamp(0.0, 1.0);
    let factor = 1.0 - jitter + 2.0 * jitter * fastrand::f64();
    let delay = (base * factor).clamp(0.0, config.max_delay_ms as f64);
    Duration::from_millis(delay as u64)
}

/// Outcome of a retried operation together with how many attempts ran.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub result: Result<T, ApiError>,
    /// Attempts that actually invoked the operation.
    pub attempts: u32,
    /// Set when the circuit breaker refused an attempt, either before the
    /// first call or after opening mid-loop.
    pub circuit_open: bool,
}

pub struct RetryController {
    config: RetryConfig,
    breakers: CircuitBreakerRegistry,
}

impl RetryController {
    pub fn new(config: RetryConfig, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            breakers: CircuitBreakerRegistry::new(breaker_config),
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Whether a request that has already been retried `retry_count` times
    /// should be tried again after `error`.
    pub fn should_retry(&self, error: &ApiError, retry_count: u32) -> bool {
        retry_count.saturating_add(1) < self.config.max_attempts
            && self.config.is_retryable(error.error_type())
    }

    pub fn circuit_breaker_state(&self, key: &str) -> Option<CircuitBreakerState> {
        self.breakers.state(key)
    }

    pub fn reset_circuit(&self, key: &str) {
        self.breakers.reset(key);
    }

    /// Run `operation` under the retry policy and the circuit breaker for `key`.
    ///
    /// `config` overrides the controller's default policy for this call. The
    /// returned error is the classified error of the last attempt, or the
    /// breaker's last known error when the circuit rejects the call.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        key: &str,
        operation: F,
        config: Option<&RetryConfig>,
    ) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RawFailure>>,
    {
        self.execute_with_report(key, operation, config).await.result
    }

    /// Like `execute_with_retry`, also reporting the number of attempts made.
    pub async fn execute_with_report<T, F, Fut>(
        &self,
        key: &str,
        mut operation: F,
        config: Option<&RetryConfig>,
    ) -> RetryReport<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RawFailure>>,
    {
        let config = config.unwrap_or(&self.config);
        let max_attempts = config.max_attempts.max(1);
        let mut attempts = 0;

        loop {
            let permit = match self.breakers.try_acquire(key) {
                Ok(permit) => permit,
                Err(error) => {
                    debug!(key, attempts, "circuit rejected attempt");
                    return RetryReport {
                        result: Err(error),
                        attempts,
                        circuit_open: true,
                    };
                }
            };

            attempts += 1;
            metrics::counter!("haulguard_retry_attempts_total", "key" => key.to_string())
                .increment(1);
            debug!(
                key,
                attempt = attempts,
                max_attempts,
                half_open_trial = permit.is_probe(),
                "running operation"
            );

            let outcome = match config.timeout() {
                Some(limit) => match tokio::time::timeout(limit, operation()).await {
                    Ok(result) => result,
                    Err(_) => Err(RawFailure::Timeout {
                        after_ms: config.timeout_ms,
                    }),
                },
                None => operation().await,
            };

            let error = match outcome {
                Ok(value) => {
                    permit.record_success();
                    if attempts > 1 {
                        debug!(key, attempt = attempts, "operation succeeded after retry");
                    }
                    return RetryReport {
                        result: Ok(value),
                        attempts,
                        circuit_open: false,
                    };
                }
                Err(raw) => classify(raw),
            };
            permit.record_failure(&error);

            if !config.is_retryable(error.error_type()) {
                debug!(key, error = %error, "error type is not retryable");
                return RetryReport {
                    result: Err(error),
                    attempts,
                    circuit_open: false,
                };
            }
            if attempts >= max_attempts {
                warn!(key, attempts, error = %error, "retry attempts exhausted");
                return RetryReport {
                    result: Err(error),
                    attempts,
                    circuit_open: false,
                };
            }

            let delay = calculate_delay(attempts, config);
            warn!(
                key,
                attempt = attempts,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after error"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests;
