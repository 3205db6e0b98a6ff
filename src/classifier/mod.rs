//! Maps raw failures (transport errors, non-2xx statuses, unparseable bodies)
//! onto the typed `ApiError` taxonomy used by the rest of the crate.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiErrorType {
    Network,
    Auth,
    Parsing,
    Timeout,
    Server,
    Validation,
    Unknown,
}

impl ApiErrorType {
    pub const ALL: [Self; 7] = [
        Self::Network,
        Self::Auth,
        Self::Parsing,
        Self::Timeout,
        Self::Server,
        Self::Validation,
        Self::Unknown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "NETWORK",
            Self::Auth => "AUTH",
            Self::Parsing => "PARSING",
            Self::Timeout => "TIMEOUT",
            Self::Server => "SERVER",
            Self::Validation => "VALIDATION",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for ApiErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ErrorSeverity {
    /// Weight used for the user-impact score.
    pub fn weight(self) -> u64 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 4,
            Self::Critical => 8,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// A classified failure. Fields are private so an error cannot be altered
/// once `classify` has produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type")]
    error_type: ApiErrorType,
    severity: ErrorSeverity,
    message: String,
    #[serde(rename = "statusCode", skip_serializing_if = "Option::is_none")]
    status_code: Option<u16>,
    #[serde(rename = "isRecoverable")]
    is_recoverable: bool,
}

impl ApiError {
    pub fn error_type(&self) -> ApiErrorType {
        self.error_type
    }

    pub fn severity(&self) -> ErrorSeverity {
        self.severity
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn is_recoverable(&self) -> bool {
        self.is_recoverable
    }

    /// Synthesized when an attempt does not settle within its budget.
    pub fn timeout(after_ms: u64) -> Self {
        classify(RawFailure::Timeout { after_ms })
    }

    /// A well-formed response whose payload fails the caller's contract.
    pub fn validation(message: impl Into<String>) -> Self {
        build(ApiErrorType::Validation, None, message.into())
    }

    /// Whether a failure of this kind says something about backend health.
    /// Caller-side problems (bad input, bad credentials) do not.
    pub(crate) fn counts_against_circuit(&self) -> bool {
        !matches!(
            self.error_type,
            ApiErrorType::Validation | ApiErrorType::Auth
        )
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.error_type, self.severity, self.message)
    }
}

impl std::error::Error for ApiError {}

/// A failure as observed by the caller, before classification.
#[derive(Debug, Clone)]
pub enum RawFailure {
    /// A response arrived but its status was not successful.
    Status { status: u16, body: Option<String> },
    /// The attempt was aborted because it ran out of time.
    Timeout { after_ms: u64 },
    /// No response was received at all.
    Network(String),
    /// A response body arrived but could not be parsed.
    Parse(String),
    Other(String),
    /// Already classified upstream; passes through unchanged.
    Classified(ApiError),
}

impl From<ApiError> for RawFailure {
    fn from(err: ApiError) -> Self {
        Self::Classified(err)
    }
}

impl From<reqwest::Error> for RawFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout { after_ms: 0 };
        }
        if let Some(status) = err.status() {
            return Self::Status {
                status: status.as_u16(),
                body: None,
            };
        }
        if err.is_decode() || err.is_body() {
            return Self::Parse(err.to_string());
        }
        if err.is_connect() || err.is_request() {
            return Self::Network(err.to_string());
        }
        Self::Other(err.to_string())
    }
}

/// Classify a raw failure. Pure and total.
pub fn classify(raw: RawFailure) -> ApiError {
    match raw {
        RawFailure::Classified(err) => err,
        RawFailure::Status { status, body } => classify_status(status, body.as_deref()),
        RawFailure::Timeout { after_ms } => {
            let message = if after_ms > 0 {
                format!("Operation timed out after {}ms", after_ms)
            } else {
                "Operation timed out".to_string()
            };
            build(ApiErrorType::Timeout, None, message)
        }
        RawFailure::Network(detail) => build(
            ApiErrorType::Network,
            None,
            format!("Network request failed: {}", detail),
        ),
        RawFailure::Parse(detail) => build(
            ApiErrorType::Parsing,
            None,
            format!("Failed to parse response: {}", detail),
        ),
        RawFailure::Other(detail) => build(ApiErrorType::Unknown, None, detail),
    }
}

fn classify_status(status: u16, body: Option<&str>) -> ApiError {
    let error_type = match status {
        401 | 403 => ApiErrorType::Auth,
        s if s >= 500 => ApiErrorType::Server,
        400 | 422 => ApiErrorType::Validation,
        _ => ApiErrorType::Unknown,
    };
    let message = match body.map(str::trim).filter(|b| !b.is_empty()) {
        Some(detail) => format!("HTTP {}: {}", status, truncate(detail, 200)),
        None => format!("HTTP {}", status),
    };
    build(error_type, Some(status), message)
}

fn build(error_type: ApiErrorType, status_code: Option<u16>, message: String) -> ApiError {
    ApiError {
        error_type,
        severity: severity_for(error_type, status_code),
        message,
        status_code,
        is_recoverable: !matches!(
            error_type,
            ApiErrorType::Validation | ApiErrorType::Parsing
        ),
    }
}

fn severity_for(error_type: ApiErrorType, status: Option<u16>) -> ErrorSeverity {
    match error_type {
        ApiErrorType::Auth => ErrorSeverity::High,
        ApiErrorType::Server => match status {
            Some(502..=504) => ErrorSeverity::High,
            _ => ErrorSeverity::Critical,
        },
        ApiErrorType::Network | ApiErrorType::Timeout | ApiErrorType::Parsing => {
            ErrorSeverity::Medium
        }
        ApiErrorType::Validation => match status {
            Some(422) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        },
        ApiErrorType::Unknown => match status {
            Some(400..=499) => ErrorSeverity::Low,
            _ => ErrorSeverity::Medium,
        },
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests;
