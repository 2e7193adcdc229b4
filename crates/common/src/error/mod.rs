//! Errors raised by the generic building blocks and the classification
//! contract the retry engine runs on
//!
//! Cache backends and tracing setup fail with [`CommonError`]; the domain
//! crate folds it into its own error type. Anything that can be retried by
//! [`crate::resilience`] implements [`ErrorClassification`].
//!
//! ```rust
//! # #[cfg(feature = "foundation")]
//! # {
//! use myinvois_common::error::{CommonError, ErrorClassification, ErrorSeverity};
//!
//! let err = CommonError::storage("read", "permission denied");
//! assert!(!err.is_retryable());
//! assert_eq!(err.severity(), ErrorSeverity::Error);
//! # }
//! ```

use std::fmt;
use std::time::Duration;

use thiserror::Error;

pub type CommonResult<T> = Result<T, CommonError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommonError {
    #[error("Invalid {field} settings: {message}")]
    Config { field: String, message: String },

    #[error("Could not encode or decode {format}: {message}")]
    Serialization { format: &'static str, message: String },

    /// Local store I/O (file cache directory, entry files)
    #[error("Store {operation} failed: {message}")]
    Storage { operation: &'static str, message: String },

    #[error("{operation} timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// A remote store or service answered with an error or not at all
    #[error("{service} error: {message}")]
    Backend { service: String, message: String, transient: bool },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CommonError {
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { field: field.into(), message: message.into() }
    }

    pub fn serialization(format: &'static str, message: impl Into<String>) -> Self {
        Self::Serialization { format, message: message.into() }
    }

    pub fn storage(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Storage { operation, message: message.into() }
    }

    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout { operation: operation.into(), duration }
    }

    pub fn backend(service: impl Into<String>, message: impl Into<String>, transient: bool) -> Self {
        Self::Backend { service: service.into(), message: message.into(), transient }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Stable variant name for log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Serialization { .. } => "serialization",
            Self::Storage { .. } => "storage",
            Self::Timeout { .. } => "timeout",
            Self::Backend { .. } => "backend",
            Self::Internal(_) => "internal",
        }
    }
}

impl ErrorClassification for CommonError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Backend { transient, .. } => *transient,
            _ => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Timeout { .. } => ErrorSeverity::Warning,
            Self::Backend { transient: true, .. } => ErrorSeverity::Warning,
            Self::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// How an error should be treated by retry loops and alerting
pub trait ErrorClassification {
    /// Transient failure; the same call may succeed later
    fn is_retryable(&self) -> bool;

    fn severity(&self) -> ErrorSeverity;

    fn is_critical(&self) -> bool;

    /// Delay requested by the remote side (e.g. `Retry-After`); `None` means
    /// use the configured backoff
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Info,
    /// Degraded but expected to recover (rate limits, timeouts)
    Warning,
    Error,
    /// Broken invariant
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "INFO",
            Self::Warning => "WARN",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        })
    }
}

impl From<serde_json::Error> for CommonError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization("JSON", err.to_string())
    }
}
