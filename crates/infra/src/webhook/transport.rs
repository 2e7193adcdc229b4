//! Signed HTTP delivery to webhook targets

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use myinvois_common::time::{SharedClock, SystemClock};
use myinvois_core::{TransportResponse, WebhookTransport};
use myinvois_domain::{truncate_body, MyInvoisError, Result, Webhook, WebhookDelivery};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use serde_json::json;
use tracing::debug;

use super::signature::{sign, DELIVERY_HEADER, EVENT_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
use crate::errors::InfraError;
use crate::http::HttpClient;

/// POSTs the event envelope to the webhook URL
///
/// The webhook's own `timeout_seconds` bounds each attempt. Any response is
/// returned as-is; only a missing response is an error.
pub struct HttpWebhookTransport {
    http: HttpClient,
    clock: SharedClock,
}

impl HttpWebhookTransport {
    pub fn new(http: HttpClient) -> Self {
        Self { http, clock: Arc::new(SystemClock) }
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }
}

/// JSON body sent for a delivery
pub fn envelope(delivery: &WebhookDelivery) -> serde_json::Value {
    json!({
        "id": delivery.event_id,
        "event": delivery.event_type,
        "delivery_id": delivery.id,
        "attempt": delivery.attempt_number,
        "data": delivery.payload,
    })
}

#[async_trait]
impl WebhookTransport for HttpWebhookTransport {
    async fn send(&self, webhook: &Webhook, delivery: &WebhookDelivery) -> Result<TransportResponse> {
        let body = envelope(delivery).to_string();
        let timestamp = self.clock.utc_now().timestamp();
        let signature = sign(&webhook.secret, timestamp, &body)?;

        let request = self
            .http
            .request(Method::POST, &webhook.url)
            .timeout(webhook.timeout())
            .header(CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(TIMESTAMP_HEADER, timestamp.to_string())
            .header(EVENT_HEADER, &delivery.event_type)
            .header(DELIVERY_HEADER, delivery.id.to_string())
            .body(body);

        let started = Instant::now();
        let response = self.http.send(request).await?;
        let status_code = response.status().as_u16();
        let text = response.text().await.map_err(|err| MyInvoisError::from(InfraError::from(err)))?;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        debug!(webhook_id = %webhook.id, status_code, elapsed_ms, "webhook responded");
        Ok(TransportResponse { status_code, body: truncate_body(&text), elapsed_ms })
    }
}
