//! Authenticated request execution with retry
//!
//! Every call goes `token -> send -> classify`. Transient failures (no
//! response, 429, 5xx) are retried by the shared retry engine; everything
//! else surfaces on the first attempt. A 401 drops the held token so the
//! *next* call re-authenticates, but this call still fails.

use std::sync::Arc;
use std::time::{Duration, Instant};

use myinvois_common::observability::{redact_json, LoggingSettings, REDACTED};
use myinvois_common::resilience::policies::ClassifiedRetry;
use myinvois_common::resilience::{RetryConfig, RetryError, RetryExecutor, DEFAULT_MAX_JITTER};
use myinvois_core::AccessTokenProvider;
use myinvois_domain::{
    ClientConfig, MyInvoisError, QueryPairs, Result, RetrySettings, RetrySleep,
};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::errors::{error_from_response, parse_json_body, parse_retry_after, INVALID_FORMAT_MESSAGE};
use crate::errors::InfraError;
use crate::http::HttpClient;

/// Query string and JSON body for one call
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub query: QueryPairs,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(query: QueryPairs) -> Self {
        Self { query, body: None }
    }

    pub fn json(body: Value) -> Self {
        Self { query: Vec::new(), body: Some(body) }
    }
}

/// Map the configured retry budget and sleep onto the retry engine
///
/// Only the computed exponential delay is jittered; fixed and callable
/// delays are used as given.
///
/// A `Retry-After` longer than the longest configured sleep ends the retry
/// loop; the caller gets the 429 with its `retry_after` instead of a stall.
pub fn retry_config(settings: &RetrySettings) -> Result<RetryConfig> {
    let builder = RetryConfig::builder().retries(settings.times);
    let builder = match settings.sleep {
        RetrySleep::Exponential { base_ms, cap_ms } => builder
            .exponential_backoff(Duration::from_millis(base_ms), Duration::from_millis(cap_ms))
            .bounded_jitter(DEFAULT_MAX_JITTER),
        RetrySleep::Fixed { ms } => builder.fixed_backoff(Duration::from_millis(ms)).no_jitter(),
        RetrySleep::Callable(delay) => builder.custom_backoff(delay).no_jitter(),
    };
    builder.build().map_err(|err| MyInvoisError::config(err.to_string()))
}

/// Async request executor
#[derive(Clone)]
pub struct RequestExecutor {
    http: HttpClient,
    auth: Arc<dyn AccessTokenProvider>,
    base_url: String,
    retry: RetryExecutor<ClassifiedRetry>,
    logging: LoggingSettings,
}

impl RequestExecutor {
    /// Create an executor for the resource host in `config`
    ///
    /// # Errors
    ///
    /// Returns a config error if the retry settings are unusable
    pub fn new(
        http: HttpClient,
        auth: Arc<dyn AccessTokenProvider>,
        config: &ClientConfig,
    ) -> Result<Self> {
        Ok(Self {
            http,
            auth,
            base_url: config.resolved_base_url().to_string(),
            retry: RetryExecutor::new(retry_config(&config.http.retry)?, ClassifiedRetry),
            logging: config.logging.clone(),
        })
    }

    /// Resource host requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send an authenticated JSON request, retrying transient failures
    ///
    /// # Arguments
    ///
    /// * `method` - HTTP method
    /// * `path` - Path below the resource host (e.g. `/api/v1.0/documenttypes`)
    /// * `options` - Query parameters and optional JSON body
    ///
    /// # Returns
    ///
    /// The parsed response body; `Value::Null` for an empty body
    ///
    /// # Errors
    ///
    /// The last error seen once retries are exhausted, or the first
    /// non-retryable one
    #[instrument(skip(self, options), fields(method = %method, path = %path))]
    pub async fn execute(&self, method: Method, path: &str, options: RequestOptions) -> Result<Value> {
        let url = self.url_for(path, &options.query)?;
        let body = options.body.as_ref();

        self.retry
            .execute(|| self.send_once(&method, &url, body))
            .await
            .map_err(unwrap_retry_error)
    }

    /// [`execute`](Self::execute) and decode the body into `T`
    pub async fn execute_as<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        let value = self.execute(method, path, options).await?;
        serde_json::from_value(value).map_err(|err| {
            debug!(error = %err, "response did not match the expected shape");
            MyInvoisError::api(None, INVALID_FORMAT_MESSAGE)
        })
    }

    fn url_for(&self, path: &str, query: &QueryPairs) -> Result<Url> {
        let separator = if path.starts_with('/') { "" } else { "/" };
        let mut url = Url::parse(&format!("{}{separator}{path}", self.base_url))
            .map_err(|err| MyInvoisError::config(format!("Invalid request URL for {path}: {err}")))?;

        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn send_once(&self, method: &Method, url: &Url, body: Option<&Value>) -> Result<Value> {
        let token = self.auth.access_token().await?;

        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }

        if self.logging.enabled {
            info!(
                channel = %self.logging.channel,
                %method,
                %url,
                authorization = REDACTED,
                body = ?body.map(redact_json),
                "MyInvois API request"
            );
        }

        let started = Instant::now();
        let response = self.http.send(request).await?;
        let status = response.status();
        let retry_after =
            parse_retry_after(response.headers().get(RETRY_AFTER).and_then(|v| v.to_str().ok()));
        let text = response.text().await.map_err(|err| MyInvoisError::from(InfraError::from(err)))?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        if self.logging.enabled {
            info!(
                channel = %self.logging.channel,
                %method,
                %url,
                status = status.as_u16(),
                elapsed_ms,
                body_len = text.len(),
                "MyInvois API response"
            );
        }

        if status == StatusCode::UNAUTHORIZED {
            warn!(%url, "access token rejected, dropping it");
            if let Err(err) = self.auth.invalidate().await {
                warn!(error = %err, "failed to drop rejected token");
            }
        }

        if !status.is_success() {
            return Err(error_from_response(status, retry_after, &text));
        }
        parse_json_body(status, &text)
    }
}

fn unwrap_retry_error(err: RetryError<MyInvoisError>) -> MyInvoisError {
    match err {
        RetryError::InvalidConfiguration { message } => MyInvoisError::config(message),
        other => other
            .into_source()
            .unwrap_or_else(|| MyInvoisError::network("retry time budget exhausted")),
    }
}

/// Blocking facade over [`RequestExecutor`]
///
/// Owns a current-thread runtime; must not be used from inside another
/// tokio runtime.
pub struct BlockingRequestExecutor {
    inner: RequestExecutor,
    runtime: tokio::runtime::Runtime,
}

impl BlockingRequestExecutor {
    pub fn new(inner: RequestExecutor) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| MyInvoisError::internal(format!("Failed to start runtime: {err}")))?;
        Ok(Self { inner, runtime })
    }

    /// Same semantics as [`RequestExecutor::execute`]
    pub fn execute(&self, method: Method, path: &str, options: RequestOptions) -> Result<Value> {
        self.runtime.block_on(self.inner.execute(method, path, options))
    }

    pub fn execute_as<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<T> {
        self.runtime.block_on(self.inner.execute_as(method, path, options))
    }

    pub fn inner(&self) -> &RequestExecutor {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use myinvois_common::resilience::RetryAfterLimit;
    use myinvois_domain::Credentials;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct StaticToken {
        invalidated: AtomicUsize,
    }

    #[async_trait]
    impl AccessTokenProvider for StaticToken {
        async fn access_token(&self) -> Result<String> {
            Ok("token".into())
        }

        async fn invalidate(&self) -> Result<()> {
            self.invalidated.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn executor(base_url: &str) -> RequestExecutor {
        let config = ClientConfig::new(Credentials::new("id", "secret")).with_base_url(base_url);
        RequestExecutor::new(
            HttpClient::new().unwrap(),
            Arc::new(StaticToken { invalidated: AtomicUsize::new(0) }),
            &config,
        )
        .unwrap()
    }

    #[test]
    fn retry_times_become_attempts() {
        let config = retry_config(&RetrySettings::default()).unwrap();
        assert_eq!(config.max_attempts, 4);

        let fixed = RetrySettings { times: 0, sleep: RetrySleep::Fixed { ms: 5 } };
        let config = retry_config(&fixed).unwrap();
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.delay_for(3), Duration::from_millis(5));
    }

    #[test]
    fn retry_after_is_bounded_by_the_sleep_cap() {
        let settings = RetrySettings {
            times: 2,
            sleep: RetrySleep::Exponential { base_ms: 10, cap_ms: 100 },
        };
        let config = retry_config(&settings).unwrap();
        assert_eq!(config.retry_after_ceiling(), Duration::from_millis(100));
        assert_eq!(config.retry_after_limit, RetryAfterLimit::GiveUp);
    }

    #[test]
    fn callable_sleep_is_used_verbatim() {
        fn linear(retry: u32) -> Duration {
            Duration::from_millis(u64::from(retry + 1) * 10)
        }
        let settings = RetrySettings { times: 2, sleep: RetrySleep::Callable(linear) };
        let config = retry_config(&settings).unwrap();
        assert_eq!(config.delay_for(0), Duration::from_millis(10));
        assert_eq!(config.delay_for(1), Duration::from_millis(20));
    }

    #[test]
    fn exponential_delay_is_jittered_within_bounds() {
        let settings = RetrySettings {
            times: 3,
            sleep: RetrySleep::Exponential { base_ms: 100, cap_ms: 300 },
        };
        let config = retry_config(&settings).unwrap();
        for _ in 0..20 {
            let d = config.delay_for(1);
            assert!(d >= Duration::from_millis(200) && d <= Duration::from_millis(400));
            let capped = config.delay_for(5);
            assert!(capped >= Duration::from_millis(300) && capped <= Duration::from_millis(600));
        }
    }

    #[test]
    fn urls_join_path_and_query() {
        let exec = executor("https://api.example.test/");
        let url = exec
            .url_for("/api/v1.0/documents/recent", &vec![("pageNo", "1".into()), ("status", "Valid".into())])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/api/v1.0/documents/recent?pageNo=1&status=Valid");

        let url = exec.url_for("api/v1.0/documenttypes", &Vec::new()).unwrap();
        assert_eq!(url.as_str(), "https://api.example.test/api/v1.0/documenttypes");
    }

    #[test]
    fn query_values_are_encoded() {
        let exec = executor("https://api.example.test");
        let url = exec
            .url_for("/x", &vec![("submissionDateFrom", "2024-01-01T00:00:00Z".into())])
            .unwrap();
        assert_eq!(url.query(), Some("submissionDateFrom=2024-01-01T00%3A00%3A00Z"));
    }
}
