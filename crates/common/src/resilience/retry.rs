//! Attempt-budgeted retry loop
//!
//! [`RetryExecutor`] runs an async operation until it succeeds, the
//! [`RetryPolicy`] refuses the error, or the attempt budget runs out.
//! `max_attempts` counts every attempt, so "three retries" is four attempts
//! (see [`RetryConfigBuilder::retries`]).

use std::fmt;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::error::ErrorClassification;

/// Upper bound on the random jitter added to a computed delay
pub const DEFAULT_MAX_JITTER: Duration = Duration::from_millis(1000);

const MAX_SAMPLED_RETRIES: u32 = 64;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Budget used up; carries the error from the final attempt
    #[error("Gave up after {attempts} attempts: {source:?}")]
    AttemptsExhausted { attempts: u32, source: E },

    #[error("Not retryable: {source:?}")]
    NonRetryable { source: E },

    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// The operation error that ended the loop
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::AttemptsExhausted { source, .. } | Self::NonRetryable { source } => Some(source),
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Decides, per failed attempt, whether the loop continues
pub trait RetryPolicy<E> {
    /// `attempt` is the 0-based index of the retry that would follow
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for the configured backoff
    Retry,
    /// Sleep for exactly this long instead
    RetryAfter(Duration),
    Stop,
}

#[derive(Debug, Clone)]
#[allow(unpredictable_function_pointer_comparisons)]
#[derive(PartialEq)]
pub enum BackoffStrategy {
    Fixed(Duration),
    /// `min(initial_delay * base^attempt, max_delay)`
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
    /// Delay for the given 0-based retry, supplied by the caller
    Custom(fn(u32) -> Duration),
}

impl BackoffStrategy {
    /// Doubling from `initial_delay`, capped at `max_delay`
    pub fn exponential(initial_delay: Duration, max_delay: Duration) -> Self {
        Self::Exponential { initial_delay, base: 2.0, max_delay }
    }

    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
                let scaled = initial_delay.as_millis() as f64 * base.powi(exponent);
                Duration::from_millis(scaled.min(max_delay.as_millis() as f64) as u64)
            }
            Self::Custom(delay) => delay(attempt),
        }
    }

    /// Longest sleep this strategy picks over `retries` retries, before jitter
    pub fn longest_delay(&self, retries: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { max_delay, .. } => *max_delay,
            Self::Custom(delay) => {
                (0..retries.min(MAX_SAMPLED_RETRIES)).map(delay).max().unwrap_or_default()
            }
        }
    }

    /// Only engine-computed delays get jitter
    fn is_computed(&self) -> bool {
        matches!(self, Self::Exponential { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Jitter {
    None,
    /// Adds a random `0..=min(max, delay)` on top of the delay
    Bounded { max: Duration },
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            Self::None => delay,
            Self::Bounded { max } => {
                let bound = (*max).min(delay).as_millis() as u64;
                if bound == 0 {
                    return delay;
                }
                delay + Duration::from_millis(rand::thread_rng().gen_range(0..=bound))
            }
        }
    }
}

/// Handling of a server hint longer than the backoff's own longest sleep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RetryAfterLimit {
    /// Stop and hand the error (with its hint) back to the caller
    #[default]
    GiveUp,
    /// Sleep the backoff's longest delay instead and keep retrying
    Clamp,
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first one
    pub max_attempts: u32,
    pub backoff: BackoffStrategy,
    pub jitter: Jitter,
    pub retry_after_limit: RetryAfterLimit,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            backoff: BackoffStrategy::exponential(
                Duration::from_millis(200),
                Duration::from_secs(10),
            ),
            jitter: Jitter::Bounded { max: DEFAULT_MAX_JITTER },
            retry_after_limit: RetryAfterLimit::GiveUp,
        }
    }
}

impl RetryConfig {
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    pub fn validate(&self) -> Result<(), RetryError<()>> {
        let invalid = |message: &str| {
            Err(RetryError::InvalidConfiguration { message: message.to_string() })
        };

        if self.max_attempts == 0 {
            return invalid("max_attempts must be at least 1");
        }
        if let BackoffStrategy::Exponential { initial_delay, base, .. } = &self.backoff {
            if *base <= 0.0 {
                return invalid("exponential base must be positive");
            }
            if initial_delay.is_zero() {
                return invalid("exponential initial delay must be non-zero");
            }
        }
        Ok(())
    }

    /// Sleep before 0-based retry `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff.calculate_delay(attempt);
        if self.backoff.is_computed() {
            self.jitter.apply(delay)
        } else {
            delay
        }
    }

    /// Upper bound for server-requested sleeps
    pub fn retry_after_ceiling(&self) -> Duration {
        self.backoff.longest_delay(self.max_attempts.saturating_sub(1))
    }
}

#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Retries after the first attempt
    pub fn retries(mut self, retries: u32) -> Self {
        self.config.max_attempts = retries.saturating_add(1);
        self
    }

    pub fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn exponential_backoff(mut self, initial_delay: Duration, max_delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::exponential(initial_delay, max_delay);
        self
    }

    pub fn custom_backoff(mut self, delay: fn(u32) -> Duration) -> Self {
        self.config.backoff = BackoffStrategy::Custom(delay);
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    pub fn bounded_jitter(mut self, max: Duration) -> Self {
        self.config.jitter = Jitter::Bounded { max };
        self
    }

    /// Sleep at most the backoff's longest delay when the server asks for more
    pub fn clamp_retry_after(mut self) -> Self {
        self.config.retry_after_limit = RetryAfterLimit::Clamp;
        self
    }

    pub fn build(self) -> Result<RetryConfig, RetryError<()>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Progress of one logical call through its attempt budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryContext {
    /// Attempts started so far; never exceeds `max_attempts`
    pub attempt_count: u32,
    pub max_attempts: u32,
    /// Sleep chosen before the upcoming attempt
    pub next_delay: Option<Duration>,
}

impl RetryContext {
    pub fn new(max_attempts: u32) -> Self {
        Self { attempt_count: 0, max_attempts, next_delay: None }
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempt_count >= self.max_attempts
    }
}

#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    pub fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `operation` until it succeeds or the loop gives up
    ///
    /// The policy is asked before the budget is checked, so a non-retryable
    /// error on the last attempt still comes back as
    /// [`RetryError::NonRetryable`]. A `RetryAfter` hint above
    /// [`RetryConfig::retry_after_ceiling`] is clamped or ends the loop, per
    /// [`RetryConfig::retry_after_limit`].
    #[instrument(skip(self, operation), fields(max_attempts = self.config.max_attempts))]
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Debug,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut context = RetryContext::new(self.config.max_attempts);

        loop {
            context.attempt_count += 1;
            let attempts = context.attempt_count;

            let error = match operation().await {
                Ok(value) => {
                    if attempts > 1 {
                        debug!(attempts, "succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            let retry = attempts - 1;
            let delay = match self.policy.should_retry(&error, retry) {
                RetryDecision::Stop => {
                    debug!(attempts, ?error, "error is not retryable");
                    return Err(RetryError::NonRetryable { source: error });
                }
                RetryDecision::Retry => self.config.delay_for(retry),
                RetryDecision::RetryAfter(hint) => {
                    let ceiling = self.config.retry_after_ceiling();
                    if hint <= ceiling {
                        hint
                    } else if self.config.retry_after_limit == RetryAfterLimit::Clamp {
                        debug!(attempts, ?hint, ?ceiling, "clamping server retry hint");
                        ceiling
                    } else {
                        warn!(
                            attempts,
                            ?hint,
                            ?ceiling,
                            ?error,
                            "server retry hint exceeds backoff, giving up"
                        );
                        return Err(RetryError::AttemptsExhausted { attempts, source: error });
                    }
                }
            };

            if context.is_exhausted() {
                warn!(attempts, ?error, "retry budget exhausted");
                return Err(RetryError::AttemptsExhausted { attempts, source: error });
            }

            warn!(attempts, ?delay, ?error, "attempt failed, backing off");
            context.next_delay = Some(delay);
            tokio::time::sleep(delay).await;
        }
    }
}

pub mod policies {
    use super::{ErrorClassification, RetryDecision, RetryPolicy};

    /// Retries whatever [`ErrorClassification::is_retryable`] allows, honouring
    /// [`ErrorClassification::retry_after`] hints
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ClassifiedRetry;

    impl<E: ErrorClassification> RetryPolicy<E> for ClassifiedRetry {
        fn should_retry(&self, error: &E, _attempt: u32) -> RetryDecision {
            if !error.is_retryable() {
                return RetryDecision::Stop;
            }
            error.retry_after().map_or(RetryDecision::Retry, RetryDecision::RetryAfter)
        }
    }
}
