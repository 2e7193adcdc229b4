//! Port interfaces for webhook delivery

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use myinvois_domain::{Result, Webhook, WebhookDelivery};
use uuid::Uuid;

/// Registered webhook endpoints
#[async_trait]
pub trait WebhookRepository: Send + Sync {
    /// Active webhooks subscribed to `event_type`
    async fn find_subscribed(&self, event_type: &str) -> Result<Vec<Webhook>>;

    async fn find_webhook(&self, id: Uuid) -> Result<Option<Webhook>>;

    /// Bump the success or failure counter and `last_triggered_at`
    ///
    /// Applied to the stored webhook as-is, so concurrent edits (deactivation,
    /// URL or secret changes) and concurrent outcomes are not lost. Unknown
    /// ids are ignored.
    async fn record_outcome(&self, id: Uuid, delivered: bool, now: DateTime<Utc>) -> Result<()>;
}

/// Delivery records
#[async_trait]
pub trait DeliveryRepository: Send + Sync {
    /// Insert or replace
    async fn save_delivery(&self, delivery: &WebhookDelivery) -> Result<()>;

    async fn find_delivery(&self, id: Uuid) -> Result<Option<WebhookDelivery>>;

    /// Failed deliveries with budget left whose `next_retry_at <= now`,
    /// oldest retry time first
    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<WebhookDelivery>>;
}

/// Response received from a webhook target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status_code: u16,
    pub body: String,
    pub elapsed_ms: u64,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Sends one delivery attempt
///
/// `Err` means no response was received (timeout, connection failure).
/// Non-2xx responses are returned as `Ok` and judged by the caller.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn send(&self, webhook: &Webhook, delivery: &WebhookDelivery)
        -> Result<TransportResponse>;
}
