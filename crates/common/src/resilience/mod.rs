//! Retry engine used by the request executor
//!
//! Fixed, capped-exponential or caller-supplied backoff with bounded jitter.
//! Whether an error is retried is up to a [`RetryPolicy`]; the engine itself
//! knows nothing about HTTP. Server-supplied delay hints are bounded by the
//! backoff's own longest sleep.

pub mod retry;

pub use retry::{
    policies, BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryContext,
    RetryAfterLimit, RetryDecision, RetryError, RetryExecutor, RetryPolicy, RetryResult,
    DEFAULT_MAX_JITTER,
};
