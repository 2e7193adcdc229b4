//! Webhook delivery orchestration
//!
//! Emitting an event never fails because a target is down: every attempt
//! outcome is recorded on the delivery, and failed deliveries are picked up
//! again by [`WebhookDispatcher::retry_due`] once their retry time passes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use myinvois_common::time::{SharedClock, SystemClock};
use myinvois_domain::{DeliveryStatus, Result, Webhook, WebhookDelivery, WebhookEvent};
use tracing::{debug, error, info, instrument, warn};

use super::ports::{DeliveryRepository, WebhookRepository, WebhookTransport};

/// Fans events out to webhooks and drives retries
pub struct WebhookDispatcher {
    webhooks: Arc<dyn WebhookRepository>,
    deliveries: Arc<dyn DeliveryRepository>,
    transport: Arc<dyn WebhookTransport>,
    clock: SharedClock,
}

impl WebhookDispatcher {
    pub fn new(
        webhooks: Arc<dyn WebhookRepository>,
        deliveries: Arc<dyn DeliveryRepository>,
        transport: Arc<dyn WebhookTransport>,
    ) -> Self {
        Self { webhooks, deliveries, transport, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Create and attempt one delivery per subscribed webhook
    ///
    /// Returns the deliveries in their post-attempt state. Only a failure to
    /// list subscribers is returned as an error.
    #[instrument(skip(self, event), fields(event_type = %event.event_type, event_id = %event.id))]
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<Vec<WebhookDelivery>> {
        let subscribers = self.webhooks.find_subscribed(&event.event_type).await?;
        let mut deliveries = Vec::with_capacity(subscribers.len());

        for webhook in subscribers.into_iter().filter(|w| w.accepts(&event.event_type)) {
            let mut delivery = WebhookDelivery::new(&webhook, event, self.clock.utc_now());
            if let Err(err) = self.deliveries.save_delivery(&delivery).await {
                error!(webhook_id = %webhook.id, error = %err, "Failed to record delivery");
                continue;
            }
            if let Err(err) = self.attempt(&webhook, &mut delivery).await {
                error!(delivery_id = %delivery.id, error = %err, "Delivery attempt not recorded");
            }
            deliveries.push(delivery);
        }

        debug!(count = deliveries.len(), "Event dispatched");
        Ok(deliveries)
    }

    /// Send a pending delivery and record the outcome on it and its webhook
    ///
    /// Only the webhook's counters are written back; the rest of the stored
    /// webhook may have changed while the request was in flight.
    pub async fn attempt(&self, webhook: &Webhook, delivery: &mut WebhookDelivery) -> Result<()> {
        let outcome = self.transport.send(webhook, delivery).await;
        let now = self.clock.utc_now();

        match outcome {
            Ok(response) if response.is_success() => {
                delivery.mark_as_delivered(
                    response.status_code,
                    &response.body,
                    response.elapsed_ms,
                    now,
                )?;
                info!(
                    target: "webhook_delivery",
                    delivery_id = %delivery.id,
                    webhook_id = %webhook.id,
                    attempt = delivery.attempt_number,
                    status_code = response.status_code,
                    elapsed_ms = response.elapsed_ms,
                    "Webhook delivered"
                );
            }
            Ok(response) => {
                delivery.mark_as_failed(
                    format!("HTTP {}", response.status_code),
                    Some(response.status_code),
                    Some(&response.body),
                    Some(response.elapsed_ms),
                    now,
                )?;
                warn!(
                    target: "webhook_delivery",
                    delivery_id = %delivery.id,
                    webhook_id = %webhook.id,
                    attempt = delivery.attempt_number,
                    status_code = response.status_code,
                    next_retry_at = ?delivery.next_retry_at,
                    "Webhook rejected delivery"
                );
            }
            Err(err) => {
                delivery.mark_as_failed(err.to_string(), None, None, None, now)?;
                warn!(
                    target: "webhook_delivery",
                    delivery_id = %delivery.id,
                    webhook_id = %webhook.id,
                    attempt = delivery.attempt_number,
                    error = %err,
                    next_retry_at = ?delivery.next_retry_at,
                    "Webhook unreachable"
                );
            }
        }

        self.deliveries.save_delivery(delivery).await?;
        self.webhooks
            .record_outcome(webhook.id, delivery.status == DeliveryStatus::Delivered, now)
            .await
    }

    /// Re-attempt up to `limit` failed deliveries whose retry time has passed
    ///
    /// Due deliveries whose webhook was removed or deactivated are abandoned
    /// (made terminal and saved) and do not count against `limit`, so they
    /// cannot crowd out retries for live webhooks.
    pub async fn retry_due(&self, limit: usize) -> Result<Vec<WebhookDelivery>> {
        let now = self.clock.utc_now();
        let mut retried = Vec::new();

        loop {
            let wanted = limit.saturating_sub(retried.len());
            if wanted == 0 {
                break;
            }
            let due = self.deliveries.find_due(now, wanted).await?;
            let mut abandoned = 0usize;

            for mut delivery in due {
                if !delivery.can_retry(now) {
                    continue;
                }
                let webhook = match self.webhooks.find_webhook(delivery.webhook_id).await? {
                    Some(webhook) if webhook.is_active => webhook,
                    Some(_) => {
                        self.abandon(&mut delivery, "webhook inactive", now).await?;
                        abandoned += 1;
                        continue;
                    }
                    None => {
                        self.abandon(&mut delivery, "webhook no longer exists", now).await?;
                        abandoned += 1;
                        continue;
                    }
                };

                delivery.schedule_retry(now)?;
                if let Err(err) = self.attempt(&webhook, &mut delivery).await {
                    error!(delivery_id = %delivery.id, error = %err, "Retry attempt not recorded");
                }
                retried.push(delivery);
            }

            // Abandoned rows are no longer due; refill the batch from what follows them
            if abandoned == 0 {
                break;
            }
        }

        if !retried.is_empty() {
            info!(target: "webhook_delivery", count = retried.len(), "Retried due deliveries");
        }
        Ok(retried)
    }

    async fn abandon(
        &self,
        delivery: &mut WebhookDelivery,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        delivery.abandon(reason, now)?;
        self.deliveries.save_delivery(delivery).await?;
        warn!(
            target: "webhook_delivery",
            delivery_id = %delivery.id,
            webhook_id = %delivery.webhook_id,
            reason,
            "Retry abandoned"
        );
        Ok(())
    }
}
