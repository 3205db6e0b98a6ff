//! Minimal reqwest adapter that reports failures as [`RawFailure`]s.

use crate::classifier::{ApiError, RawFailure};
use crate::validator::{RawResponse, validate_required_fields, validate_response};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Client with a connect timeout only; per-attempt deadlines come from the
/// retry policy.
pub fn default_http_client() -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// GET `url` and return its validated, sanitized payload.
///
/// Non-2xx statuses become [`RawFailure::Status`] carrying the body; an
/// unparseable body becomes [`RawFailure::Parse`]; a payload missing any of
/// `required` fields is a VALIDATION error.
pub async fn fetch_json(
    client: &Client,
    url: &str,
    required: &[&str],
) -> Result<Value, RawFailure> {
    let resp = client.get(url).send().await?;
    let response = RawResponse::from_reqwest(resp).await?;
    debug!(url, status = response.status, "received response");
    into_payload(&response, required)
}

/// Map an already-received response to a payload or a raw failure.
pub fn into_payload(response: &RawResponse, required: &[&str]) -> Result<Value, RawFailure> {
    if !(200..300).contains(&response.status) {
        return Err(RawFailure::Status {
            status: response.status,
            body: Some(response.body.clone()),
        });
    }

    let result = validate_response(response);
    if !result.is_valid {
        let detail = result
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(RawFailure::Parse(detail));
    }

    let missing = validate_required_fields(&result.sanitized_data, required);
    if !missing.is_empty() {
        let fields = missing
            .iter()
            .filter_map(|e| e.field.as_deref())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(ApiError::validation(format!(
            "Response is missing required fields: {}",
            fields
        ))
        .into());
    }

    Ok(result.sanitized_data)
}
