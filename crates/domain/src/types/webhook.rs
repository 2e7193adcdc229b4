//! Webhook subscriptions and the delivery state machine
//!
//! A [`WebhookDelivery`] moves through
//!
//! ```text
//! pending ──► delivered                      (terminal)
//!    │
//!    └──► failed ──► (schedule_retry) ──► pending ──► ...
//!            │
//!            ├── attempt_number >= max_retries: terminal, next_retry_at = None
//!            └── (abandon) webhook gone or inactive: terminal
//! ```
//!
//! Retries are pulled: a scheduler asks for failed deliveries whose
//! `next_retry_at` has passed ([`WebhookDelivery::can_retry`]) and re-arms
//! them with [`WebhookDelivery::schedule_retry`]. Nothing here performs I/O.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::{
    DEFAULT_WEBHOOK_MAX_RETRIES, DEFAULT_WEBHOOK_TIMEOUT_SECS, MAX_STORED_RESPONSE_BODY,
    MAX_WEBHOOK_BACKOFF_MINUTES, MAX_WEBHOOK_TIMEOUT_SECS, WEBHOOK_BACKOFF_BASE_MINUTES,
    WILDCARD_EVENT,
};
use crate::errors::{MyInvoisError, Result};
use crate::impl_domain_status_conversions;

/// Delay before the retry that follows failed attempt `attempt_number`
///
/// `5^attempt` minutes (5, 25, 125, ...), capped at 24 hours.
pub fn retry_backoff(attempt_number: u32) -> Duration {
    let minutes = WEBHOOK_BACKOFF_BASE_MINUTES
        .checked_pow(attempt_number)
        .map_or(MAX_WEBHOOK_BACKOFF_MINUTES, |m| m.min(MAX_WEBHOOK_BACKOFF_MINUTES));
    Duration::minutes(minutes)
}

/// Keep at most [`MAX_STORED_RESPONSE_BODY`] characters of a response body
pub fn truncate_body(body: &str) -> String {
    body.chars().take(MAX_STORED_RESPONSE_BODY).collect()
}

/// A registered webhook endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    pub id: Uuid,
    pub url: String,
    /// HMAC signing secret
    pub secret: String,
    /// Subscribed event types; empty or `*` means every event
    #[serde(default)]
    pub events: Vec<String>,
    pub max_retries: u32,
    pub timeout_seconds: u64,
    pub is_active: bool,
    #[serde(default)]
    pub success_count: u64,
    #[serde(default)]
    pub failure_count: u64,
    pub last_triggered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Webhook {
    /// New active webhook with default retry and timeout settings
    pub fn new(url: impl Into<String>, secret: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            url: url.into(),
            secret: secret.into(),
            events: Vec::new(),
            max_retries: DEFAULT_WEBHOOK_MAX_RETRIES,
            timeout_seconds: DEFAULT_WEBHOOK_TIMEOUT_SECS,
            is_active: true,
            success_count: 0,
            failure_count: 0,
            last_triggered_at: None,
            created_at: now,
        }
    }

    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = events.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Check URL scheme, secret and limits
    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| MyInvoisError::validation_field("url", format!("Invalid URL: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(MyInvoisError::validation_field("url", "URL must use http or https"));
        }
        if self.secret.is_empty() {
            return Err(MyInvoisError::validation_field("secret", "Secret must not be empty"));
        }
        if self.max_retries == 0 {
            return Err(MyInvoisError::validation_field(
                "max_retries",
                "max_retries must be at least 1",
            ));
        }
        if self.timeout_seconds == 0 || self.timeout_seconds > MAX_WEBHOOK_TIMEOUT_SECS {
            return Err(MyInvoisError::validation_field(
                "timeout_seconds",
                format!("timeout_seconds must be between 1 and {MAX_WEBHOOK_TIMEOUT_SECS}"),
            ));
        }
        Ok(())
    }

    /// Active and subscribed to `event_type`
    pub fn accepts(&self, event_type: &str) -> bool {
        self.is_active
            && (self.events.is_empty()
                || self.events.iter().any(|e| e == event_type || e == WILDCARD_EVENT))
    }

    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds)
    }

    pub fn record_success(&mut self, now: DateTime<Utc>) {
        self.success_count += 1;
        self.last_triggered_at = Some(now);
    }

    pub fn record_failure(&mut self, now: DateTime<Utc>) {
        self.failure_count += 1;
        self.last_triggered_at = Some(now);
    }

    /// Count one finished attempt
    pub fn record_outcome(&mut self, delivered: bool, now: DateTime<Utc>) {
        if delivered {
            self.record_success(now);
        } else {
            self.record_failure(now);
        }
    }
}

/// Event emitted towards webhooks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Self {
        Self { id: Uuid::now_v7(), event_type: event_type.into(), payload, occurred_at: now }
    }
}

/// Status of one logical delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

impl_domain_status_conversions!(DeliveryStatus {
    Pending => "pending",
    Delivered => "delivered",
    Failed => "failed",
});

/// One logical delivery of one event to one webhook
///
/// `max_retries` is copied from the webhook when the delivery is created so
/// later edits to the webhook do not change an in-flight retry budget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub webhook_id: Uuid,
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: serde_json::Value,
    /// 1-based; incremented by [`WebhookDelivery::schedule_retry`]
    pub attempt_number: u32,
    pub max_retries: u32,
    pub status: DeliveryStatus,
    pub status_code: Option<u16>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<u64>,
    pub error_message: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookDelivery {
    /// New pending delivery of `event` to `webhook`, first attempt
    pub fn new(webhook: &Webhook, event: &WebhookEvent, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            webhook_id: webhook.id,
            event_id: event.id,
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            attempt_number: 1,
            max_retries: webhook.max_retries,
            status: DeliveryStatus::Pending,
            status_code: None,
            response_body: None,
            response_time_ms: None,
            error_message: None,
            delivered_at: None,
            next_retry_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_pending(&self, transition: &str) -> Result<()> {
        if self.status == DeliveryStatus::Pending {
            Ok(())
        } else {
            Err(MyInvoisError::invalid_state(format!(
                "cannot {transition} delivery {} in status {}",
                self.id, self.status
            )))
        }
    }

    /// Record a 2xx response; terminal
    pub fn mark_as_delivered(
        &mut self,
        status_code: u16,
        response_body: &str,
        response_time_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_pending("mark as delivered")?;
        self.status = DeliveryStatus::Delivered;
        self.status_code = Some(status_code);
        self.response_body = Some(truncate_body(response_body));
        self.response_time_ms = Some(response_time_ms);
        self.error_message = None;
        self.delivered_at = Some(now);
        self.next_retry_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Record a failed attempt and compute when it may be retried
    ///
    /// With budget left, `next_retry_at = now + retry_backoff(attempt_number)`;
    /// otherwise the delivery is terminally failed with no retry time.
    pub fn mark_as_failed(
        &mut self,
        error_message: impl Into<String>,
        status_code: Option<u16>,
        response_body: Option<&str>,
        response_time_ms: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_pending("mark as failed")?;
        self.status = DeliveryStatus::Failed;
        self.error_message = Some(error_message.into());
        self.status_code = status_code;
        self.response_body = response_body.map(truncate_body);
        self.response_time_ms = response_time_ms;
        self.next_retry_at = if self.has_budget() {
            Some(now + retry_backoff(self.attempt_number))
        } else {
            None
        };
        self.updated_at = now;
        Ok(())
    }

    /// Re-arm a failed delivery for its next attempt
    ///
    /// Increments `attempt_number` and returns to `pending`; `next_retry_at`
    /// is cleared since it only has meaning while failed.
    pub fn schedule_retry(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status != DeliveryStatus::Failed {
            return Err(MyInvoisError::invalid_state(format!(
                "cannot retry delivery {} in status {}",
                self.id, self.status
            )));
        }
        if !self.has_budget() {
            return Err(MyInvoisError::invalid_state(format!(
                "delivery {} exhausted its {} attempts",
                self.id, self.max_retries
            )));
        }
        self.attempt_number += 1;
        self.status = DeliveryStatus::Pending;
        self.next_retry_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Stop retrying a failed delivery whose webhook is gone or disabled
    ///
    /// The remaining budget is dropped, so the delivery is terminal and no
    /// longer due.
    pub fn abandon(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        if self.status != DeliveryStatus::Failed {
            return Err(MyInvoisError::invalid_state(format!(
                "cannot abandon delivery {} in status {}",
                self.id, self.status
            )));
        }
        self.max_retries = self.attempt_number;
        self.error_message = Some(reason.into());
        self.next_retry_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Failed, budget left, and the retry time has passed
    pub fn can_retry(&self, now: DateTime<Utc>) -> bool {
        self.status == DeliveryStatus::Failed
            && self.has_budget()
            && self.next_retry_at.is_some_and(|at| at <= now)
    }

    /// Delivered, or failed with no attempts left
    pub fn is_terminal(&self) -> bool {
        match self.status {
            DeliveryStatus::Delivered => true,
            DeliveryStatus::Failed => !self.has_budget(),
            DeliveryStatus::Pending => false,
        }
    }

    fn has_budget(&self) -> bool {
        self.attempt_number < self.max_retries
    }
}
