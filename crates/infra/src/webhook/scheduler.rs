//! Background polling of due webhook retries
//!
//! The dispatcher never schedules work itself; this worker calls
//! [`WebhookDispatcher::retry_due`] on a fixed interval. Join handles are
//! tracked, cancellation is explicit and every pass is bounded by a timeout.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use myinvois_infra::webhook::{RetryScheduler, RetrySchedulerConfig};
//!
//! # async fn example(dispatcher: Arc<myinvois_core::WebhookDispatcher>) -> myinvois_domain::Result<()> {
//! let mut scheduler = RetryScheduler::new(
//!     dispatcher,
//!     RetrySchedulerConfig { poll_interval: Duration::from_secs(30), ..Default::default() },
//! );
//! scheduler.start()?;
//! scheduler.stop().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use myinvois_core::WebhookDispatcher;
use myinvois_domain::{MyInvoisError, WebhookDelivery};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Scheduler lifecycle errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Retry scheduler is already running")]
    AlreadyRunning,

    #[error("Retry scheduler was not started")]
    NotRunning,

    #[error("Retry scheduler gave up waiting after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Retry task ended abnormally: {0}")]
    TaskJoinFailed(String),
}

impl From<SchedulerError> for MyInvoisError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::AlreadyRunning | SchedulerError::NotRunning => {
                MyInvoisError::invalid_state(err.to_string())
            }
            SchedulerError::Timeout { .. } | SchedulerError::TaskJoinFailed(_) => {
                MyInvoisError::internal(err.to_string())
            }
        }
    }
}

/// Configuration for the retry scheduler.
#[derive(Debug, Clone)]
pub struct RetrySchedulerConfig {
    /// Interval between polling passes
    pub poll_interval: Duration,
    /// Maximum deliveries re-attempted per pass
    pub batch_size: usize,
    /// Timeout for a single pass
    pub processing_timeout: Duration,
    /// How long `stop` waits for the task
    pub join_timeout: Duration,
}

impl Default for RetrySchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            batch_size: 50,
            processing_timeout: Duration::from_secs(300),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Retry worker with explicit lifecycle management.
pub struct RetryScheduler {
    dispatcher: Arc<WebhookDispatcher>,
    config: RetrySchedulerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl RetryScheduler {
    pub fn new(dispatcher: Arc<WebhookDispatcher>, config: RetrySchedulerConfig) -> Self {
        Self { dispatcher, config, cancellation: CancellationToken::new(), task_handle: None }
    }

    /// Spawn the polling task on the current runtime.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();
        let dispatcher = Arc::clone(&self.dispatcher);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        self.task_handle = Some(tokio::spawn(async move {
            Self::process_loop(dispatcher, config, cancel).await;
        }));
        info!(poll_interval_ms = self.config.poll_interval.as_millis() as u64, "Retry scheduler started");
        Ok(())
    }

    /// Cancel the polling task and wait for it to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> Result<(), SchedulerError> {
        let Some(handle) = self.task_handle.take() else {
            return Err(SchedulerError::NotRunning);
        };

        self.cancellation.cancel();
        let join_timeout = self.config.join_timeout;
        let joined = tokio::time::timeout(join_timeout, handle).await;
        self.cancellation = CancellationToken::new();

        match joined {
            Ok(Ok(())) => {
                info!("Retry scheduler stopped");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Retry task panicked");
                Err(SchedulerError::TaskJoinFailed(e.to_string()))
            }
            Err(_) => {
                warn!(timeout_secs = join_timeout.as_secs(), "Retry task still running after cancel");
                Err(SchedulerError::Timeout { seconds: join_timeout.as_secs() })
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    /// Run one pass immediately, outside the polling loop.
    pub async fn run_once(&self) -> Result<Vec<WebhookDelivery>, MyInvoisError> {
        Self::run_pass(&self.dispatcher, &self.config).await
    }

    async fn run_pass(
        dispatcher: &WebhookDispatcher,
        config: &RetrySchedulerConfig,
    ) -> Result<Vec<WebhookDelivery>, MyInvoisError> {
        match tokio::time::timeout(config.processing_timeout, dispatcher.retry_due(config.batch_size))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SchedulerError::Timeout { seconds: config.processing_timeout.as_secs() }.into()),
        }
    }

    async fn process_loop(
        dispatcher: Arc<WebhookDispatcher>,
        config: RetrySchedulerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Retry scheduler loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.poll_interval) => {
                    match Self::run_pass(&dispatcher, &config).await {
                        Ok(retried) if !retried.is_empty() => {
                            debug!(count = retried.len(), "Retry pass complete");
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Retry pass failed"),
                    }
                }
            }
        }
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!("RetryScheduler dropped while running; cancelling task");
            self.cancellation.cancel();
        }
    }
}
