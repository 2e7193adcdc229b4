//! API-specific error mapping
//!
//! Turns non-success responses into [`MyInvoisError`] values. The API reports
//! errors in two shapes:
//!
//! - `{"message": "...", "errors": {"field": ["..."]}}`
//! - `{"error": {"errorCode": "...", "error": "...", "details": [{"target": "...", "message": "..."}]}}`
//!
//! Both are understood; anything else falls back to the raw body.

use std::collections::BTreeMap;

use myinvois_domain::{FieldErrors, MyInvoisError};
use reqwest::StatusCode;
use serde_json::Value;

/// Message used for 429 responses
pub const RATE_LIMIT_MESSAGE: &str = "Rate limit exceeded";
/// Message used when a response body is not JSON
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON response from API";
/// Message used when JSON does not have the expected shape
pub const INVALID_FORMAT_MESSAGE: &str = "Invalid response format";

/// Longest raw body echoed back in an error message
const MAX_ERROR_BODY: usize = 512;

/// Categories of API errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// 401 - the token is dropped, the call is not retried
    Authentication,
    /// 422 - field-level validation failure, non-retryable
    Validation,
    /// 429 - retry with backoff or the server's `Retry-After`
    RateLimit,
    /// 5xx - retryable
    Server,
    /// Other 4xx - non-retryable
    Client,
}

impl ApiErrorCategory {
    /// Category for a non-success status
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            401 => Self::Authentication,
            422 => Self::Validation,
            429 => Self::RateLimit,
            500..=599 => Self::Server,
            _ => Self::Client,
        }
    }

    /// Check if errors in this category should be retried
    pub fn should_retry(self) -> bool {
        matches!(self, Self::RateLimit | Self::Server)
    }
}

/// Map a non-success response to a typed error
///
/// `retry_after` is the parsed `Retry-After` header, in seconds.
pub fn error_from_response(status: StatusCode, retry_after: Option<u64>, body: &str) -> MyInvoisError {
    let code = status.as_u16();
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    match ApiErrorCategory::from_status(status) {
        ApiErrorCategory::Authentication => MyInvoisError::authentication(
            Some(code),
            parsed
                .as_ref()
                .and_then(extract_message)
                .unwrap_or_else(|| "Unauthorized".to_string()),
        ),
        ApiErrorCategory::Validation => {
            let errors = parsed.as_ref().map(extract_field_errors).unwrap_or_default();
            let message = parsed
                .as_ref()
                .and_then(extract_message)
                .unwrap_or_else(|| "The given data was invalid".to_string());
            MyInvoisError::Validation { message, errors }
        }
        ApiErrorCategory::RateLimit => MyInvoisError::Api {
            status: Some(code),
            message: RATE_LIMIT_MESSAGE.to_string(),
            code: parsed.as_ref().and_then(extract_code),
            retry_after,
        },
        ApiErrorCategory::Server | ApiErrorCategory::Client => MyInvoisError::Api {
            status: Some(code),
            message: parsed
                .as_ref()
                .and_then(extract_message)
                .unwrap_or_else(|| fallback_message(status, body)),
            code: parsed.as_ref().and_then(extract_code),
            retry_after: None,
        },
    }
}

/// Parse a success body; an empty body is `null`
pub fn parse_json_body(status: StatusCode, body: &str) -> Result<Value, MyInvoisError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body)
        .map_err(|_| MyInvoisError::api(Some(status.as_u16()), INVALID_JSON_MESSAGE))
}

/// Parse a `Retry-After` header given in seconds
pub fn parse_retry_after(value: Option<&str>) -> Option<u64> {
    value.and_then(|v| v.trim().parse::<u64>().ok())
}

fn fallback_message(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        status.canonical_reason().unwrap_or("Request failed").to_string()
    } else {
        body.chars().take(MAX_ERROR_BODY).collect()
    }
}

fn as_text(value: &Value) -> Option<String> {
    value.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

fn extract_message(body: &Value) -> Option<String> {
    if let Some(message) = body.get("message").and_then(as_text) {
        return Some(message);
    }
    match body.get("error") {
        Some(Value::Object(error)) => error
            .get("error")
            .or_else(|| error.get("message"))
            .and_then(as_text)
            .or_else(|| {
                error
                    .get("details")
                    .and_then(Value::as_array)
                    .and_then(|details| details.first())
                    .and_then(|d| d.get("message"))
                    .and_then(as_text)
            }),
        Some(other) => body.get("error_description").and_then(as_text).or_else(|| as_text(other)),
        None => body.get("error_description").and_then(as_text),
    }
}

fn extract_code(body: &Value) -> Option<String> {
    body.get("error")
        .and_then(|e| e.get("errorCode").or_else(|| e.get("code")))
        .or_else(|| body.get("code"))
        .and_then(|c| match c {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn extract_field_errors(body: &Value) -> FieldErrors {
    let mut fields: FieldErrors = BTreeMap::new();

    if let Some(Value::Object(errors)) = body.get("errors") {
        for (field, messages) in errors {
            let messages = match messages {
                Value::Array(items) => items.iter().filter_map(as_text).collect(),
                other => as_text(other).into_iter().collect(),
            };
            fields.insert(field.clone(), messages);
        }
    }

    let details = body.get("error").and_then(|e| e.get("details")).and_then(Value::as_array);
    for detail in details.into_iter().flatten() {
        let Some(message) = detail.get("message").and_then(as_text) else {
            continue;
        };
        let target = detail
            .get("target")
            .or_else(|| detail.get("propertyPath"))
            .and_then(as_text)
            .unwrap_or_else(|| "document".to_string());
        fields.entry(target).or_default().push(message);
    }

    fields
}
