use crate::errors::HaulguardError;
use serde::{Deserialize, Serialize};

mod resilience;

pub use resilience::*;

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default, rename = "circuitBreaker")]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub handler: HandlerConfig,
}

impl Config {
    /// Settings used under `HAULGUARD_ENV=test`.
    pub fn test_profile() -> Self {
        Self {
            retry: RetryConfig::test_profile(),
            circuit_breaker: CircuitBreakerConfig {
                cool_down_ms: 100,
                ..CircuitBreakerConfig::default()
            },
            ..Self::default()
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), HaulguardError> {
        self.validate_retry()?;
        self.validate_circuit_breaker()?;
        self.validate_handler()?;
        Ok(())
    }

    fn validate_retry(&self) -> Result<(), HaulguardError> {
        let r = &self.retry;

        if r.max_attempts == 0 {
            return Err(HaulguardError::Config(
                "retry.maxAttempts must be >= 1".into(),
            ));
        }
        if r.max_delay_ms < r.base_delay_ms {
            return Err(HaulguardError::Config(
                "retry.maxDelayMs must be >= retry.baseDelayMs".into(),
            ));
        }
        if !r.backoff_multiplier.is_finite() || r.backoff_multiplier <= 1.0 {
            return Err(HaulguardError::Config(
                "retry.backoffMultiplier must be a finite number > 1.0".into(),
            ));
        }
        if !r.jitter.is_finite() || !(0.0..=1.0).contains(&r.jitter) {
            return Err(HaulguardError::Config(
                "retry.jitter must be a finite number between 0.0 and 1.0".into(),
            ));
        }
        Ok(())
    }

    fn validate_circuit_breaker(&self) -> Result<(), HaulguardError> {
        let c = &self.circuit_breaker;

        if c.enabled {
            if c.failure_threshold == 0 {
                return Err(HaulguardError::Config(
                    "circuitBreaker.failureThreshold must be >= 1 when enabled".into(),
                ));
            }
            if c.half_open_probes == 0 {
                return Err(HaulguardError::Config(
                    "circuitBreaker.halfOpenProbes must be >= 1 when enabled".into(),
                ));
            }
        }
        Ok(())
    }

    fn validate_handler(&self) -> Result<(), HaulguardError> {
        let h = &self.handler;

        if h.history_capacity == 0 {
            return Err(HaulguardError::Config(
                "handler.historyCapacity must be >= 1".into(),
            ));
        }
        if h.metrics_window_secs == 0 {
            return Err(HaulguardError::Config(
                "handler.metricsWindowSecs must be >= 1".into(),
            ));
        }
        for (idx, rule) in h.alert_rules.iter().enumerate() {
            if rule.threshold == 0 || rule.window_secs == 0 {
                return Err(HaulguardError::Config(format!(
                    "handler.alertRules[{}] needs threshold >= 1 and windowSecs >= 1",
                    idx
                )));
            }
        }
        Ok(())
    }
}
