//! Process-local webhook and delivery storage

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use myinvois_core::{DeliveryRepository, WebhookRepository};
use myinvois_domain::{DeliveryStatus, MyInvoisError, Result, Webhook, WebhookDelivery};
use uuid::Uuid;

/// DashMap-backed store implementing both webhook repositories
///
/// Suitable for a single process; deliveries are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryWebhookStore {
    webhooks: DashMap<Uuid, Webhook>,
    deliveries: DashMap<Uuid, WebhookDelivery>,
}

impl InMemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a webhook, replacing one with the same id
    pub fn register(&self, webhook: Webhook) -> Result<Uuid> {
        webhook.validate()?;
        let id = webhook.id;
        self.webhooks.insert(id, webhook);
        Ok(id)
    }

    /// Stop dispatching to a webhook; pending retries are skipped
    pub fn deactivate(&self, id: Uuid) -> Result<()> {
        let mut webhook = self
            .webhooks
            .get_mut(&id)
            .ok_or_else(|| MyInvoisError::validation_field("webhook_id", format!("Unknown webhook {id}")))?;
        webhook.is_active = false;
        Ok(())
    }

    pub fn webhook(&self, id: Uuid) -> Option<Webhook> {
        self.webhooks.get(&id).map(|w| w.clone())
    }

    pub fn webhooks(&self) -> Vec<Webhook> {
        self.webhooks.iter().map(|w| w.clone()).collect()
    }

    pub fn delivery(&self, id: Uuid) -> Option<WebhookDelivery> {
        self.deliveries.get(&id).map(|d| d.clone())
    }

    /// Deliveries for one webhook, oldest first
    pub fn deliveries_for(&self, webhook_id: Uuid) -> Vec<WebhookDelivery> {
        let mut deliveries: Vec<_> = self
            .deliveries
            .iter()
            .filter(|d| d.webhook_id == webhook_id)
            .map(|d| d.clone())
            .collect();
        deliveries.sort_by_key(|d| d.created_at);
        deliveries
    }
}

#[async_trait]
impl WebhookRepository for InMemoryWebhookStore {
    async fn find_subscribed(&self, event_type: &str) -> Result<Vec<Webhook>> {
        Ok(self.webhooks.iter().filter(|w| w.accepts(event_type)).map(|w| w.clone()).collect())
    }

    async fn find_webhook(&self, id: Uuid) -> Result<Option<Webhook>> {
        Ok(self.webhook(id))
    }

    async fn record_outcome(&self, id: Uuid, delivered: bool, now: DateTime<Utc>) -> Result<()> {
        if let Some(mut webhook) = self.webhooks.get_mut(&id) {
            webhook.record_outcome(delivered, now);
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryRepository for InMemoryWebhookStore {
    async fn save_delivery(&self, delivery: &WebhookDelivery) -> Result<()> {
        self.deliveries.insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn find_delivery(&self, id: Uuid) -> Result<Option<WebhookDelivery>> {
        Ok(self.delivery(id))
    }

    async fn find_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<WebhookDelivery>> {
        let mut due: Vec<_> = self
            .deliveries
            .iter()
            .filter(|d| d.status == DeliveryStatus::Failed && d.can_retry(now))
            .map(|d| d.clone())
            .collect();
        due.sort_by_key(|d| d.next_retry_at);
        due.truncate(limit);
        Ok(due)
    }
}
