//! Integration tests for the retry engine
//!
//! Drives the executor with an error type classified the way the HTTP layer
//! classifies responses: 429/5xx and network failures retry, other client
//! errors stop immediately.

#![cfg(feature = "runtime")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use myinvois_common::error::{ErrorClassification, ErrorSeverity};
use myinvois_common::resilience::{policies, RetryConfig, RetryError, RetryExecutor};

#[derive(Debug, Clone, PartialEq)]
enum CallError {
    Network,
    Status(u16),
    RateLimited(Duration),
}

impl ErrorClassification for CallError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Network | Self::RateLimited(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Warning
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited(delay) => Some(*delay),
            _ => None,
        }
    }
}

fn three_retries() -> RetryConfig {
    RetryConfig::builder()
        .retries(3)
        .exponential_backoff(Duration::from_millis(1), Duration::from_millis(4))
        .no_jitter()
        .build()
        .expect("valid config")
}

/// Scripted responses, one per attempt; the last entry repeats.
async fn scripted(
    executor: &RetryExecutor<policies::ClassifiedRetry>,
    script: Vec<Result<&'static str, CallError>>,
) -> (Result<&'static str, RetryError<CallError>>, u32) {
    let calls = Arc::new(AtomicU32::new(0));
    let script = Arc::new(script);
    let calls_clone = Arc::clone(&calls);

    let result = executor
        .execute(|| {
            let calls = Arc::clone(&calls_clone);
            let script = Arc::clone(&script);
            async move {
                let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
                script[n.min(script.len() - 1)].clone()
            }
        })
        .await;

    (result, calls.load(Ordering::SeqCst))
}

#[tokio::test]
async fn three_unavailable_then_ok_takes_four_attempts() {
    let executor = RetryExecutor::new(three_retries(), policies::ClassifiedRetry);
    let (result, calls) = scripted(
        &executor,
        vec![
            Err(CallError::Status(503)),
            Err(CallError::Status(503)),
            Err(CallError::Status(503)),
            Ok("accepted"),
        ],
    )
    .await;

    assert_eq!(result.unwrap(), "accepted");
    assert_eq!(calls, 4);
}

#[tokio::test]
async fn persistent_server_error_stops_after_budget() {
    let executor = RetryExecutor::new(three_retries(), policies::ClassifiedRetry);
    let (result, calls) = scripted(&executor, vec![Err(CallError::Status(500))]).await;

    assert_eq!(calls, 4, "no fifth attempt");
    match result {
        Err(RetryError::AttemptsExhausted { attempts: 4, source }) => {
            assert_eq!(source, CallError::Status(500));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let executor = RetryExecutor::new(three_retries(), policies::ClassifiedRetry);

    for status in [400_u16, 401, 403, 404, 422] {
        let (result, calls) = scripted(&executor, vec![Err(CallError::Status(status))]).await;
        assert_eq!(calls, 1, "status {status} must not retry");
        assert_eq!(result.unwrap_err().into_source(), Some(CallError::Status(status)));
    }
}

#[tokio::test]
async fn network_failures_and_rate_limits_recover() {
    let executor = RetryExecutor::new(three_retries(), policies::ClassifiedRetry);
    let (result, calls) = scripted(
        &executor,
        vec![
            Err(CallError::Network),
            Err(CallError::RateLimited(Duration::from_millis(2))),
            Ok("ok"),
        ],
    )
    .await;

    assert_eq!(result.unwrap(), "ok");
    assert_eq!(calls, 3);
}

#[tokio::test]
async fn zero_retries_means_single_attempt() {
    let config = RetryConfig::builder().retries(0).build().unwrap();
    let executor = RetryExecutor::new(config, policies::ClassifiedRetry);
    let (result, calls) = scripted(&executor, vec![Err(CallError::Network)]).await;

    assert_eq!(calls, 1);
    assert!(matches!(result, Err(RetryError::AttemptsExhausted { attempts: 1, .. })));
}
