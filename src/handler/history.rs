use super::ErrorContext;
use crate::classifier::{ApiError, ApiErrorType, ErrorSeverity};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub error: ApiError,
    pub context: ErrorContext,
    pub timestamp: DateTime<Utc>,
}

/// Rolling aggregates over the recent slice of the history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorMetrics {
    #[serde(rename = "totalErrors")]
    pub total_errors: usize,
    #[serde(rename = "errorsByType")]
    pub errors_by_type: HashMap<ApiErrorType, usize>,
    #[serde(rename = "errorsBySeverity")]
    pub errors_by_severity: HashMap<ErrorSeverity, usize>,
    /// Fraction of errors that were recoverable; 0.0 when there are none.
    #[serde(rename = "recoveryRate")]
    pub recovery_rate: f64,
    /// Severity-weighted sum (LOW=1, MEDIUM=2, HIGH=4, CRITICAL=8).
    #[serde(rename = "userImpactScore")]
    pub user_impact_score: u64,
    #[serde(rename = "windowStart")]
    pub window_start: DateTime<Utc>,
}

/// Fixed-capacity FIFO of handled errors. The oldest entry is evicted on
/// overflow, so `len() <= capacity()` always holds.
#[derive(Debug)]
pub struct ErrorHistory {
    entries: VecDeque<ErrorRecord>,
    capacity: usize,
}

impl ErrorHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn push(&mut self, record: ErrorRecord) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.entries.iter()
    }

    /// Errors of `error_type` recorded at or after `since`.
    pub fn count_since(&self, error_type: ApiErrorType, since: DateTime<Utc>) -> usize {
        self.entries
            .iter()
            .rev()
            .take_while(|r| r.timestamp >= since)
            .filter(|r| r.error.error_type() == error_type)
            .count()
    }

    pub fn metrics(&self, now: DateTime<Utc>, window: Duration) -> ErrorMetrics {
        let window_start = now - window;
        let mut errors_by_type = HashMap::new();
        let mut errors_by_severity = HashMap::new();
        let mut recoverable = 0usize;
        let mut user_impact_score = 0u64;
        let mut total_errors = 0usize;

        for record in self.entries.iter().filter(|r| r.timestamp >= window_start) {
            total_errors += 1;
            *errors_by_type.entry(record.error.error_type()).or_insert(0) += 1;
            *errors_by_severity
                .entry(record.error.severity())
                .or_insert(0) += 1;
            if record.error.is_recoverable() {
                recoverable += 1;
            }
            user_impact_score += record.error.severity().weight();
        }

        let recovery_rate = if total_errors == 0 {
            0.0
        } else {
            recoverable as f64 / total_errors as f64
        };

        ErrorMetrics {
            total_errors,
            errors_by_type,
            errors_by_severity,
            recovery_rate,
            user_impact_score,
            window_start,
        }
    }
}
