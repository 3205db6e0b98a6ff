//! Response inspection: content-type detection, body parsing, required-field
//! checks, default merging and sanitizing into JSON-safe values.

use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::debug;

/// Containers nested deeper than this are cut to `null` by `sanitize_data`.
pub const MAX_SANITIZE_DEPTH: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Json,
    Html,
    Plain,
    Xml,
    Unknown,
}

impl ContentType {
    pub fn as_mime(self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Html => "text/html",
            Self::Plain => "text/plain",
            Self::Xml => "application/xml",
            Self::Unknown => "unknown",
        }
    }
}

/// A received response reduced to what validation needs.
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    /// Header names are stored lower-cased.
    headers: HashMap<String, String>,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Drain a `reqwest` response. Headers that are not valid UTF-8 are skipped.
    pub async fn from_reqwest(resp: reqwest::Response) -> Result<Self, reqwest::Error> {
        let status = resp.status().as_u16();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = resp.text().await?;
        Ok(Self {
            status,
            headers,
            body,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorCode {
    JsonParseError,
    XmlParseError,
    MissingRequiredField,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationError {
    pub code: ValidationErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl ValidationError {
    fn missing(field: &str) -> Self {
        Self {
            code: ValidationErrorCode::MissingRequiredField,
            field: Some(field.to_string()),
            message: format!("Missing required field: {}", field),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    #[serde(rename = "isValid")]
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
    #[serde(rename = "sanitizedData")]
    pub sanitized_data: Value,
}

impl ValidationResult {
    fn valid(data: Value) -> Self {
        Self {
            is_valid: true,
            errors: Vec::new(),
            sanitized_data: data,
        }
    }

    fn invalid(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: false,
            errors,
            sanitized_data: Value::Null,
        }
    }
}

pub fn detect_content_type(response: &RawResponse) -> ContentType {
    let Some(header) = response.header("content-type") else {
        return ContentType::Unknown;
    };
    let header = header.to_ascii_lowercase();
    if header.contains("json") {
        ContentType::Json
    } else if header.contains("html") {
        ContentType::Html
    } else if header.contains("plain") {
        ContentType::Plain
    } else if header.contains("xml") {
        ContentType::Xml
    } else {
        ContentType::Unknown
    }
}

/// Parse the body according to its declared content type.
pub fn validate_response(response: &RawResponse) -> ValidationResult {
    let body = response.body.trim();
    if body.is_empty() {
        return ValidationResult::valid(Value::Null);
    }

    let content_type = detect_content_type(response);
    match content_type {
        ContentType::Json => match serde_json::from_str::<Value>(body) {
            Ok(parsed) => ValidationResult::valid(sanitize_data(&parsed)),
            Err(e) => {
                debug!(error = %e, "response body is not valid JSON");
                ValidationResult::invalid(vec![ValidationError {
                    code: ValidationErrorCode::JsonParseError,
                    field: None,
                    message: format!("Response declared JSON but could not be parsed: {}", e),
                }])
            }
        },
        ContentType::Xml => {
            if body.starts_with('<') && body.ends_with('>') {
                ValidationResult::valid(Value::String(body.to_string()))
            } else {
                ValidationResult::invalid(vec![ValidationError {
                    code: ValidationErrorCode::XmlParseError,
                    field: None,
                    message: "Response declared XML but is not a markup document".to_string(),
                }])
            }
        }
        ContentType::Html | ContentType::Plain => {
            ValidationResult::valid(Value::String(body.to_string()))
        }
        ContentType::Unknown => match serde_json::from_str::<Value>(body) {
            Ok(parsed) => ValidationResult::valid(sanitize_data(&parsed)),
            Err(_) => ValidationResult::valid(Value::String(body.to_string())),
        },
    }
}

/// Validate, then check `required` fields and merge `defaults` under the
/// payload. Required-field errors make the result invalid but keep the
/// sanitized data so callers can still inspect it.
pub fn validate_with_schema(
    response: &RawResponse,
    required: &[&str],
    defaults: &Map<String, Value>,
) -> ValidationResult {
    let mut result = validate_response(response);
    if !result.is_valid {
        return result;
    }

    let missing = validate_required_fields(&result.sanitized_data, required);
    if !missing.is_empty() {
        result.is_valid = false;
        result.errors = missing;
        return result;
    }

    if let Value::Object(map) = &result.sanitized_data {
        result.sanitized_data = Value::Object(apply_defaults(map, defaults));
    }
    result
}

/// Convert anything serializable into a value that always re-serializes.
///
/// Non-finite floats become `null`; `None`/`null` stay `null`; containers are
/// walked element-wise. Input that cannot be represented at all (for example
/// a map with non-string keys) becomes `null`.
pub fn sanitize_data<T: Serialize + ?Sized>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(v) => sanitize_value(v, 0),
        Err(e) => {
            debug!(error = %e, "value could not be represented as JSON");
            Value::Null
        }
    }
}

fn sanitize_value(value: Value, depth: usize) -> Value {
    if depth >= MAX_SANITIZE_DEPTH && matches!(value, Value::Array(_) | Value::Object(_)) {
        return Value::Null;
    }
    match value {
        Value::Number(n) => match n.as_f64() {
            Some(f) if !f.is_finite() => Value::Null,
            _ => Value::Number(n),
        },
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| sanitize_value(item, depth + 1))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, sanitize_value(v, depth + 1)))
                .collect(),
        ),
        other => other,
    }
}

/// One `MissingRequiredField` error per field absent from `data`.
/// Non-object data is missing every field.
pub fn validate_required_fields(data: &Value, fields: &[&str]) -> Vec<ValidationError> {
    let object = data.as_object();
    fields
        .iter()
        .filter(|field| object.is_none_or(|map| !map.contains_key(**field)))
        .map(|field| ValidationError::missing(field))
        .collect()
}

/// Shallow merge where keys from `partial` win over `defaults`.
pub fn apply_defaults(
    partial: &Map<String, Value>,
    defaults: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged = defaults.clone();
    for (key, value) in partial {
        merged.insert(key.clone(), value.clone());
    }
    merged
}
