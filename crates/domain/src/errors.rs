//! Error types used throughout the client

use std::collections::BTreeMap;
use std::time::Duration;

use myinvois_common::error::{CommonError, ErrorClassification, ErrorSeverity};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::impl_domain_status_conversions;

/// Field name to list of messages, as returned by the API for 422 responses
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Main error type for the MyInvois client
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum MyInvoisError {
    /// Input rejected locally or by the API (422)
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        #[serde(default)]
        errors: FieldErrors,
    },

    /// Identity endpoint refused the credentials, or a resource call returned 401
    #[error("Authentication failed: {message}")]
    Authentication { status: Option<u16>, message: String },

    /// No response was received (connect failure, timeout, reset)
    #[error("Network error: {0}")]
    Network(String),

    /// The API answered with a non-success status or an unreadable body
    #[error("API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api {
        status: Option<u16>,
        message: String,
        code: Option<String>,
        /// Server-requested delay before the next attempt, in seconds
        #[serde(default)]
        retry_after: Option<u64>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    /// Illegal state transition (e.g. retrying a delivered webhook)
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, MyInvoisError>;

/// Machine-readable error category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Authentication,
    Network,
    Api,
    Config,
    InvalidState,
    Internal,
}

impl_domain_status_conversions!(ErrorKind {
    Validation => "validation",
    Authentication => "authentication",
    Network => "network",
    Api => "api",
    Config => "config",
    InvalidState => "invalid_state",
    Internal => "internal",
});

impl MyInvoisError {
    /// Validation error without per-field details
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation { message: message.into(), errors: FieldErrors::new() }
    }

    /// Validation error attributed to a single field
    pub fn validation_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut errors = FieldErrors::new();
        errors.insert(field.into(), vec![message.clone()]);
        Self::Validation { message, errors }
    }

    pub fn authentication(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Authentication { status, message: message.into() }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn api(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Api { status, message: message.into(), code: None, retry_after: None }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Network(_) => ErrorKind::Network,
            Self::Api { .. } => ErrorKind::Api,
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status attached to the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } | Self::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Per-field messages of a validation error
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation { errors, .. } => Some(errors),
            _ => None,
        }
    }

    /// Transient failures: no response, 429, or any 5xx
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status: Some(status), .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl ErrorClassification for MyInvoisError {
    fn is_retryable(&self) -> bool {
        MyInvoisError::is_retryable(self)
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Network(_) => ErrorSeverity::Warning,
            Self::Api { status: Some(429), .. } => ErrorSeverity::Warning,
            Self::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Api { retry_after: Some(secs), .. } => Some(Duration::from_secs(*secs)),
            _ => None,
        }
    }
}

impl From<CommonError> for MyInvoisError {
    fn from(err: CommonError) -> Self {
        match err {
            CommonError::Config { .. } => Self::Config(err.to_string()),
            CommonError::Timeout { .. } | CommonError::Backend { transient: true, .. } => {
                Self::Network(err.to_string())
            }
            CommonError::Serialization { .. }
            | CommonError::Storage { .. }
            | CommonError::Backend { .. }
            | CommonError::Internal(_) => Self::Internal(err.to_string()),
        }
    }
}
