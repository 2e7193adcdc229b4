//! Tracing initialisation and redaction helpers
//!
//! The library itself only emits `tracing` events. Applications that do not
//! install their own subscriber can call [`init_tracing`] once at start-up.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{CommonError, CommonResult};

/// Replacement text for secrets in log output
pub const REDACTED: &str = "[REDACTED]";

/// Header names whose values never reach the logs
const SENSITIVE_HEADERS: &[&str] = &["authorization", "proxy-authorization", "x-webhook-signature"];

/// Form or JSON field names whose values never reach the logs
const SENSITIVE_FIELDS: &[&str] = &["client_secret", "access_token", "secret", "password"];

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Emit request/response logging for HTTP traffic
    pub enabled: bool,
    /// Channel name attached to every HTTP log event
    pub channel: String,
    /// Use the JSON formatter instead of the human-readable one
    pub json: bool,
    /// Fallback filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: "myinvois".to_string(),
            json: false,
            level: "info".to_string(),
        }
    }
}

/// Install a global subscriber honouring `RUST_LOG`
///
/// Calling this more than once (or after another subscriber was installed)
/// returns a config error instead of panicking.
pub fn init_tracing(settings: &LoggingSettings) -> CommonResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if settings.json {
        registry.with(tracing_subscriber::fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|err| CommonError::config("logging", err.to_string()))
}

/// Whether a header value must be redacted
pub fn is_sensitive_header(name: &str) -> bool {
    SENSITIVE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Whether a body field must be redacted
pub fn is_sensitive_field(name: &str) -> bool {
    SENSITIVE_FIELDS.iter().any(|f| f.eq_ignore_ascii_case(name))
}

/// Redact sensitive values in a `key=value&...` form body
pub fn redact_form(body: &str) -> String {
    body.split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_sensitive_field(key) => format!("{key}={REDACTED}"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Redact sensitive fields (at any depth) in a JSON value
pub fn redact_json(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, v)| {
                    let v = if is_sensitive_field(key) {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_json(v)
                    };
                    (key.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_json).collect()),
        other => other.clone(),
    }
}
