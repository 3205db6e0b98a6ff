//! Turns classified API failures into user-facing responses.
//!
//! Every failure is recorded, offered to the registered per-type handler,
//! and otherwise resolved by the built-in policy for its type: token
//! refresh for AUTH, retry or fallback for transient failures, user action
//! for VALIDATION.

mod history;
mod table;

pub use history::{ErrorHistory, ErrorMetrics, ErrorRecord};
pub use table::{ErrorTypeHandler, HandlerOutcome, HandlerTable, HandlerTableBuilder};

use crate::alerts::{Alert, AlertSink, TracingAlertSink};
use crate::auth::{NoTokenRefresher, TokenRefresher};
use crate::classifier::{ApiError, ApiErrorType, ErrorSeverity};
use crate::config::HandlerConfig;
use crate::fallback::{DEFAULT_VARIANT, FallbackManager, FallbackPayload};
use crate::retry::RetryController;
use crate::utils::lock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

const SUPPORT_HINT: &str = "If the problem persists, please contact support.";

/// Where a failure happened, supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext {
    pub endpoint: String,
    pub component: String,
    /// Retries already made for this request.
    #[serde(rename = "retryCount")]
    pub retry_count: u32,
    /// Token refreshes already made for this request, counted apart from
    /// `retry_count`.
    #[serde(rename = "authRefreshes")]
    pub auth_refreshes: u32,
    /// The circuit breaker refused the last attempt.
    #[serde(rename = "circuitOpen")]
    pub circuit_open: bool,
    #[serde(rename = "requestId")]
    pub request_id: Uuid,
    /// Fallback resource key; defaults to the endpoint.
    #[serde(rename = "fallbackKey", skip_serializing_if = "Option::is_none")]
    pub fallback_key: Option<String>,
    #[serde(rename = "fallbackVariant", skip_serializing_if = "Option::is_none")]
    pub fallback_variant: Option<String>,
}

impl ErrorContext {
    pub fn new(endpoint: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            component: component.into(),
            retry_count: 0,
            auth_refreshes: 0,
            circuit_open: false,
            request_id: Uuid::new_v4(),
            fallback_key: None,
            fallback_variant: None,
        }
    }

    #[must_use]
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    #[must_use]
    pub fn with_auth_refreshes(mut self, auth_refreshes: u32) -> Self {
        self.auth_refreshes = auth_refreshes;
        self
    }

    #[must_use]
    pub fn with_circuit_open(mut self, circuit_open: bool) -> Self {
        self.circuit_open = circuit_open;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, key: impl Into<String>, variant: impl Into<String>) -> Self {
        self.fallback_key = Some(key.into());
        self.fallback_variant = Some(variant.into());
        self
    }

    pub fn fallback_key(&self) -> &str {
        self.fallback_key.as_deref().unwrap_or(&self.endpoint)
    }

    pub fn fallback_variant(&self) -> &str {
        self.fallback_variant.as_deref().unwrap_or(DEFAULT_VARIANT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorResponse {
    pub handled: bool,
    #[serde(rename = "userMessage")]
    pub user_message: String,
    #[serde(rename = "shouldRetry")]
    pub should_retry: bool,
    #[serde(rename = "requiresUserAction")]
    pub requires_user_action: bool,
    #[serde(rename = "fallbackData", skip_serializing_if = "Option::is_none")]
    pub fallback_data: Option<FallbackPayload>,
}

impl ErrorResponse {
    pub fn new(user_message: impl Into<String>) -> Self {
        Self {
            handled: true,
            user_message: user_message.into(),
            should_retry: false,
            requires_user_action: false,
            fallback_data: None,
        }
    }

    #[must_use]
    pub fn retry(mut self) -> Self {
        self.should_retry = true;
        self
    }

    #[must_use]
    pub fn user_action(mut self) -> Self {
        self.requires_user_action = true;
        self
    }

    #[must_use]
    pub fn with_fallback(mut self, fallback: Option<FallbackPayload>) -> Self {
        self.fallback_data = fallback;
        self
    }
}

pub struct ApiErrorHandler {
    config: HandlerConfig,
    handlers: HandlerTable,
    retry: Arc<RetryController>,
    fallback: Arc<FallbackManager>,
    tokens: Arc<dyn TokenRefresher>,
    alerts: Arc<dyn AlertSink>,
    history: Mutex<ErrorHistory>,
    /// Last time each alert rule fired, by rule index.
    rule_fired_at: Mutex<HashMap<usize, DateTime<Utc>>>,
}

impl ApiErrorHandler {
    pub fn new(
        config: HandlerConfig,
        retry: Arc<RetryController>,
        fallback: Arc<FallbackManager>,
    ) -> Self {
        let history = ErrorHistory::new(config.history_capacity);
        Self {
            config,
            handlers: HandlerTable::default(),
            retry,
            fallback,
            tokens: Arc::new(NoTokenRefresher),
            alerts: Arc::new(TracingAlertSink),
            history: Mutex::new(history),
            rule_fired_at: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_handlers(mut self, handlers: HandlerTable) -> Self {
        self.handlers = handlers;
        self
    }

    #[must_use]
    pub fn with_token_refresher(mut self, tokens: Arc<dyn TokenRefresher>) -> Self {
        self.tokens = tokens;
        self
    }

    #[must_use]
    pub fn with_alert_sink(mut self, alerts: Arc<dyn AlertSink>) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    /// Record `error`, raise any alerts, and produce the response the caller
    /// should act on. Never fails.
    pub async fn handle_error(&self, error: &ApiError, context: &ErrorContext) -> ErrorResponse {
        let now = Utc::now();
        self.record(error, context, now);
        metrics::counter!(
            "haulguard_errors_total",
            "type" => error.error_type().as_str(),
            "severity" => error.severity().to_string()
        )
        .increment(1);
        self.raise_alerts(error, context, now);

        let response = match self.dispatch(error, context).await {
            Some(response) => response,
            None => self.default_response(error, context).await,
        };
        finish(error, response)
    }

    /// Aggregates over the configured window (one hour by default).
    pub fn error_metrics(&self) -> ErrorMetrics {
        let span = window(self.config.metrics_window_secs);
        lock(&self.history).metrics(Utc::now(), span)
    }

    pub fn history_len(&self) -> usize {
        lock(&self.history).len()
    }

    pub fn clear_history(&self) {
        lock(&self.history).clear();
        lock(&self.rule_fired_at).clear();
    }

    fn record(&self, error: &ApiError, context: &ErrorContext, now: DateTime<Utc>) {
        debug!(
            error_type = %error.error_type(),
            severity = %error.severity(),
            endpoint = %context.endpoint,
            component = %context.component,
            request_id = %context.request_id,
            retry_count = context.retry_count,
            auth_refreshes = context.auth_refreshes,
            circuit_open = context.circuit_open,
            "handling api error: {}",
            error.message()
        );
        lock(&self.history).push(ErrorRecord {
            error: error.clone(),
            context: context.clone(),
            timestamp: now,
        });
    }

    fn raise_alerts(&self, error: &ApiError, context: &ErrorContext, now: DateTime<Utc>) {
        if error.severity() == ErrorSeverity::Critical {
            self.emit_alert(
                error.error_type(),
                format!("critical {} error: {}", error.error_type(), error.message()),
                context,
                now,
            );
        }

        for (index, rule) in self.config.alert_rules.iter().enumerate() {
            if rule.error_type != error.error_type() {
                continue;
            }
            let since = now - window(rule.window_secs);
            let count = lock(&self.history).count_since(rule.error_type, since);
            if count < rule.threshold {
                continue;
            }
            // One alert per rule per window.
            {
                let mut fired = lock(&self.rule_fired_at);
                if fired.get(&index).is_some_and(|at| *at >= since) {
                    continue;
                }
                fired.insert(index, now);
            }
            self.emit_alert(
                rule.error_type,
                format!(
                    "{} {} errors within {}s (threshold {})",
                    count, rule.error_type, rule.window_secs, rule.threshold
                ),
                context,
                now,
            );
        }
    }

    fn emit_alert(
        &self,
        error_type: ApiErrorType,
        message: String,
        context: &ErrorContext,
        now: DateTime<Utc>,
    ) {
        self.alerts.emit(Alert {
            error_type,
            message,
            endpoint: context.endpoint.clone(),
            component: context.component.clone(),
            timestamp: now,
        });
    }

    async fn dispatch(&self, error: &ApiError, context: &ErrorContext) -> Option<ErrorResponse> {
        let handler = self.handlers.get(error.error_type())?;
        if !handler.accepts(error) {
            return None;
        }
        match handler.handle(error, context).await {
            HandlerOutcome::Handled(response) if response.handled => Some(response),
            HandlerOutcome::Handled(_) | HandlerOutcome::Declined => None,
            HandlerOutcome::HandlerFailed(cause) => {
                warn!(
                    error_type = %error.error_type(),
                    endpoint = %context.endpoint,
                    "registered handler failed, using default handling: {:#}",
                    cause
                );
                None
            }
        }
    }

    async fn default_response(&self, error: &ApiError, context: &ErrorContext) -> ErrorResponse {
        match error.error_type() {
            ApiErrorType::Auth => self.handle_auth(error, context).await,
            ApiErrorType::Network | ApiErrorType::Timeout | ApiErrorType::Server => {
                let lead = match error.error_type() {
                    ApiErrorType::Network => "We couldn't reach the server.",
                    ApiErrorType::Timeout => "The server took too long to respond.",
                    _ => "The server encountered an error.",
                };
                if !context.circuit_open && self.retry.should_retry(error, context.retry_count) {
                    ErrorResponse::new(format!("{} Retrying...", lead)).retry()
                } else {
                    self.with_fallback(lead, context)
                }
            }
            ApiErrorType::Parsing => {
                self.with_fallback("The server returned data in an unexpected format.", context)
            }
            ApiErrorType::Validation => ErrorResponse::new(
                "Some of the submitted information is invalid. Please check your input and try again.",
            )
            .user_action(),
            ApiErrorType::Unknown => {
                let response = self.with_fallback("An unexpected error occurred.", context);
                if context.circuit_open {
                    response
                } else {
                    response.retry()
                }
            }
        }
    }

    async fn handle_auth(&self, error: &ApiError, context: &ErrorContext) -> ErrorResponse {
        let expired = || {
            ErrorResponse::new("Your session has expired. Please sign in again.").user_action()
        };
        if context.auth_refreshes >= self.config.auth_refresh_attempts {
            debug!(endpoint = %context.endpoint, "token refresh budget exhausted");
            return expired();
        }
        match self.tokens.handle_token_error(error).await {
            Ok(()) => {
                info!(endpoint = %context.endpoint, "session refreshed after auth error");
                ErrorResponse::new("Your session was refreshed. Retrying your request.").retry()
            }
            Err(e) => {
                warn!(endpoint = %context.endpoint, "token refresh failed: {:#}", e);
                expired()
            }
        }
    }

    fn with_fallback(&self, lead: &str, context: &ErrorContext) -> ErrorResponse {
        let fallback = self
            .fallback
            .get_fallback_data(context.fallback_key(), context.fallback_variant());
        let tail = if fallback.is_some() {
            "Using cached data for now."
        } else {
            "The service is temporarily unavailable. Please try again later."
        };
        ErrorResponse::new(format!("{} {}", lead, tail)).with_fallback(fallback)
    }
}

/// Windows are capped at ten years so timestamp arithmetic cannot overflow.
fn window(secs: u64) -> chrono::Duration {
    const MAX_WINDOW_SECS: u64 = 10 * 365 * 24 * 3600;
    chrono::Duration::seconds(secs.min(MAX_WINDOW_SECS) as i64)
}

fn finish(error: &ApiError, mut response: ErrorResponse) -> ErrorResponse {
    if response.user_message.trim().is_empty() {
        response.user_message = "Something went wrong.".to_string();
    }
    if error.severity() == ErrorSeverity::Critical && !response.user_message.contains(SUPPORT_HINT)
    {
        response.user_message = format!("{} {}", response.user_message, SUPPORT_HINT);
    }
    response
}
