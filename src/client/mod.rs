use crate::alerts::AlertSink;
use crate::auth::TokenRefresher;
use crate::classifier::{ApiErrorType, RawFailure};
use crate::config::Config;
use crate::fallback::FallbackManager;
use crate::handler::{ApiErrorHandler, ErrorContext, ErrorResponse};
use crate::http::{default_http_client, fetch_json};
use crate::retry::RetryController;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Facade that runs calls through retry, circuit breaking, error handling
/// and fallback in one place.
pub struct ResilientClient {
    retry: Arc<RetryController>,
    handler: Arc<ApiErrorHandler>,
    fallback: Arc<FallbackManager>,
    http: reqwest::Client,
}

impl ResilientClient {
    pub fn new(
        retry: Arc<RetryController>,
        handler: Arc<ApiErrorHandler>,
        fallback: Arc<FallbackManager>,
    ) -> Self {
        Self {
            retry,
            handler,
            fallback,
            http: default_http_client(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::build(config, None, None)
    }

    /// Like `from_config` with explicit token and alert collaborators.
    pub fn from_config_with(
        config: &Config,
        tokens: Arc<dyn TokenRefresher>,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self::build(config, Some(tokens), Some(alerts))
    }

    fn build(
        config: &Config,
        tokens: Option<Arc<dyn TokenRefresher>>,
        alerts: Option<Arc<dyn AlertSink>>,
    ) -> Self {
        let retry = Arc::new(RetryController::new(
            config.retry.clone(),
            config.circuit_breaker.clone(),
        ));
        let fallback = Arc::new(FallbackManager::new(config.fallback.clone()));
        let mut handler =
            ApiErrorHandler::new(config.handler.clone(), retry.clone(), fallback.clone());
        if let Some(tokens) = tokens {
            handler = handler.with_token_refresher(tokens);
        }
        if let Some(alerts) = alerts {
            handler = handler.with_alert_sink(alerts);
        }
        Self::new(retry, Arc::new(handler), fallback)
    }

    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn retry(&self) -> &Arc<RetryController> {
        &self.retry
    }

    pub fn handler(&self) -> &Arc<ApiErrorHandler> {
        &self.handler
    }

    pub fn fallback(&self) -> &Arc<FallbackManager> {
        &self.fallback
    }

    /// Run `operation` under the retry policy for `key`. On final failure the
    /// error handler decides the response; a successful token refresh
    /// re-runs the operation while the AUTH budget lasts.
    pub async fn call<T, F, Fut>(
        &self,
        key: &str,
        context: &ErrorContext,
        mut operation: F,
    ) -> Result<T, ErrorResponse>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RawFailure>>,
    {
        let auth_budget = self.handler.config().auth_refresh_attempts;
        let mut auth_refreshes = 0u32;

        loop {
            let report = self
                .retry
                .execute_with_report(key, &mut operation, None)
                .await;
            let error = match report.result {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            let ctx = context
                .clone()
                .with_retry_count(report.attempts.saturating_sub(1))
                .with_auth_refreshes(auth_refreshes)
                .with_circuit_open(report.circuit_open);
            let response = self.handler.handle_error(&error, &ctx).await;

            if error.error_type() == ApiErrorType::Auth
                && response.should_retry
                && auth_refreshes < auth_budget
            {
                auth_refreshes += 1;
                info!(key, auth_refreshes, "retrying after token refresh");
                continue;
            }

            debug!(
                key,
                attempts = report.attempts,
                circuit_open = report.circuit_open,
                error_type = %error.error_type(),
                fallback = response.fallback_data.is_some(),
                "call failed"
            );
            return Err(response);
        }
    }

    /// GET `url` as JSON. The circuit is keyed by the context's endpoint and
    /// successful payloads refresh the fallback cache.
    pub async fn get_json(
        &self,
        url: &str,
        context: &ErrorContext,
        required: &[&str],
    ) -> Result<Value, ErrorResponse> {
        let http = &self.http;
        let value = self
            .call(&context.endpoint, context, move || {
                fetch_json(http, url, required)
            })
            .await?;
        self.fallback.store(
            context.fallback_key(),
            context.fallback_variant(),
            value.clone(),
        );
        Ok(value)
    }
}
