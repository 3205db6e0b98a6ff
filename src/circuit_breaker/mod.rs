use crate::classifier::{ApiError, RawFailure, classify};
use crate::config::CircuitBreakerConfig;
use crate::utils::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "Closed"),
            Self::Open => write!(f, "Open"),
            Self::HalfOpen => write!(f, "HalfOpen"),
        }
    }
}

/// Read-only snapshot of one operation key's breaker.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    #[serde(rename = "failureCount")]
    pub failure_count: u32,
    #[serde(rename = "lastFailureAt")]
    pub last_failure_at: Option<DateTime<Utc>>,
    #[serde(rename = "lastError")]
    pub last_error: Option<ApiError>,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Closed,
    Open { since: Instant },
    /// Number of probes currently in flight.
    HalfOpen { active_probes: u32 },
}

#[derive(Debug)]
struct BreakerRecord {
    phase: Phase,
    failure_count: u32,
    last_failure_at: Option<DateTime<Utc>>,
    last_error: Option<ApiError>,
}

impl BreakerRecord {
    fn new() -> Self {
        Self {
            phase: Phase::Closed,
            failure_count: 0,
            last_failure_at: None,
            last_error: None,
        }
    }

    fn snapshot(&self) -> CircuitBreakerState {
        CircuitBreakerState {
            state: match self.phase {
                Phase::Closed => CircuitState::Closed,
                Phase::Open { .. } => CircuitState::Open,
                Phase::HalfOpen { .. } => CircuitState::HalfOpen,
            },
            failure_count: self.failure_count,
            last_failure_at: self.last_failure_at,
            last_error: self.last_error.clone(),
        }
    }

    fn rejection(&self, key: &str) -> ApiError {
        self.last_error.clone().unwrap_or_else(|| {
            classify(RawFailure::Other(format!(
                "Circuit breaker is open for '{}'",
                key
            )))
        })
    }
}

/// Per-operation-key circuit breakers.
///
/// Records are created lazily on the first failure for a key and live for the
/// lifetime of the registry. Each record has its own lock, so keys never
/// contend with each other beyond the brief map lookup.
pub struct CircuitBreakerRegistry {
    config: CircuitBreakerConfig,
    records: Mutex<HashMap<String, Arc<Mutex<BreakerRecord>>>>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn existing(&self, key: &str) -> Option<Arc<Mutex<BreakerRecord>>> {
        lock(&self.records).get(key).cloned()
    }

    fn get_or_create(&self, key: &str) -> Arc<Mutex<BreakerRecord>> {
        lock(&self.records)
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(BreakerRecord::new())))
            .clone()
    }

    /// Ask permission to run one attempt for `key`.
    ///
    /// Fails fast with the last recorded error while the circuit is open and
    /// cooling down, or while every half-open probe slot is taken.
    pub fn try_acquire(&self, key: &str) -> Result<CircuitPermit<'_>, ApiError> {
        let mut permit = CircuitPermit {
            registry: self,
            key: key.to_string(),
            probe: false,
            settled: false,
        };
        if !self.config.enabled {
            return Ok(permit);
        }
        let Some(record) = self.existing(key) else {
            return Ok(permit);
        };

        let mut breaker = lock(&record);
        match breaker.phase {
            Phase::Closed => Ok(permit),
            Phase::HalfOpen { active_probes } => {
                if active_probes >= self.config.half_open_probes {
                    debug!(key, active_probes, "circuit half-open, probe slots busy");
                    Err(breaker.rejection(key))
                } else {
                    breaker.phase = Phase::HalfOpen {
                        active_probes: active_probes + 1,
                    };
                    permit.probe = true;
                    Ok(permit)
                }
            }
            Phase::Open { since } => {
                let elapsed = since.elapsed();
                if elapsed >= self.config.cool_down() {
                    info!(
                        key,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "circuit breaker transitioning Open -> HalfOpen"
                    );
                    breaker.phase = Phase::HalfOpen { active_probes: 1 };
                    permit.probe = true;
                    Ok(permit)
                } else {
                    debug!(
                        key,
                        remaining_ms = (self.config.cool_down() - elapsed).as_millis() as u64,
                        "circuit open, failing fast"
                    );
                    Err(breaker.rejection(key))
                }
            }
        }
    }

    fn on_success(&self, key: &str) {
        let Some(record) = self.existing(key) else {
            return;
        };
        let mut breaker = lock(&record);
        if matches!(breaker.phase, Phase::HalfOpen { .. }) {
            info!(key, "circuit breaker probe succeeded: HalfOpen -> Closed");
        }
        breaker.phase = Phase::Closed;
        breaker.failure_count = 0;
    }

    fn on_failure(&self, key: &str, error: &ApiError, probe: bool) {
        if !error.counts_against_circuit() {
            if probe {
                self.release_probe(key);
            }
            return;
        }

        let record = self.get_or_create(key);
        let mut breaker = lock(&record);
        breaker.failure_count = breaker.failure_count.saturating_add(1);
        breaker.last_failure_at = Some(Utc::now());
        breaker.last_error = Some(error.clone());

        match breaker.phase {
            Phase::Closed => {
                if breaker.failure_count >= self.config.failure_threshold {
                    warn!(
                        key,
                        failures = breaker.failure_count,
                        "circuit breaker tripped: Closed -> Open"
                    );
                    metrics::counter!("haulguard_circuit_opened_total", "key" => key.to_string())
                        .increment(1);
                    breaker.phase = Phase::Open {
                        since: Instant::now(),
                    };
                }
            }
            Phase::HalfOpen { .. } => {
                warn!(key, "circuit breaker probe failed: HalfOpen -> Open");
                metrics::counter!("haulguard_circuit_opened_total", "key" => key.to_string())
                    .increment(1);
                breaker.phase = Phase::Open {
                    since: Instant::now(),
                };
            }
            Phase::Open { .. } => {}
        }
    }

    fn release_probe(&self, key: &str) {
        let Some(record) = self.existing(key) else {
            return;
        };
        let mut breaker = lock(&record);
        if let Phase::HalfOpen { active_probes } = breaker.phase {
            breaker.phase = Phase::HalfOpen {
                active_probes: active_probes.saturating_sub(1),
            };
        }
    }

    /// Snapshot of the breaker for `key`, `None` before its first failure.
    pub fn state(&self, key: &str) -> Option<CircuitBreakerState> {
        self.existing(key).map(|record| lock(&record).snapshot())
    }

    /// Forget everything recorded for `key`, closing its circuit.
    pub fn reset(&self, key: &str) {
        if lock(&self.records).remove(key).is_some() {
            info!(key, "circuit breaker reset");
        }
    }
}

/// Admission for a single attempt. Settle it with `record_success` or
/// `record_failure`; dropping it unsettled frees a half-open probe slot so a
/// cancelled caller cannot wedge the breaker.
pub struct CircuitPermit<'a> {
    registry: &'a CircuitBreakerRegistry,
    key: String,
    probe: bool,
    settled: bool,
}

impl CircuitPermit<'_> {
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn record_success(mut self) {
        self.settled = true;
        if self.registry.config.enabled {
            self.registry.on_success(&self.key);
        }
    }

    pub fn record_failure(mut self, error: &ApiError) {
        self.settled = true;
        if self.registry.config.enabled {
            self.registry.on_failure(&self.key, error, self.probe);
        }
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if self.probe && !self.settled {
            self.registry.release_probe(&self.key);
        }
    }
}
