//! In-memory port implementations for testing
//!
//! Every mock counts the calls tests care about so assertions can check how
//! often the network would have been hit.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use myinvois_core::auth::ports::{IdentityProvider, TokenCache};
use myinvois_core::webhook::ports::{
    DeliveryRepository, TransportResponse, WebhookRepository, WebhookTransport,
};
use myinvois_domain::{
    AuthIdentity, AuthToken, Credentials, DeliveryStatus, MyInvoisError, Result as DomainResult,
    Tin, TokenResponse, Webhook, WebhookDelivery,
};
use parking_lot::Mutex;
use uuid::Uuid;

/// Token cache keyed by `AuthIdentity::cache_key`
#[derive(Default)]
pub struct MemoryTokenCache {
    entries: Mutex<HashMap<String, (AuthToken, Duration)>>,
    pub removals: AtomicUsize,
}

impl MemoryTokenCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn ttl_for(&self, identity: &AuthIdentity) -> Option<Duration> {
        self.entries.lock().get(&identity.cache_key()).map(|(_, ttl)| *ttl)
    }
}

#[async_trait]
impl TokenCache for MemoryTokenCache {
    async fn get(&self, identity: &AuthIdentity) -> DomainResult<Option<AuthToken>> {
        Ok(self.entries.lock().get(&identity.cache_key()).map(|(token, _)| token.clone()))
    }

    async fn put(
        &self,
        identity: &AuthIdentity,
        token: &AuthToken,
        ttl: Duration,
    ) -> DomainResult<()> {
        self.entries.lock().insert(identity.cache_key(), (token.clone(), ttl));
        Ok(())
    }

    async fn remove(&self, identity: &AuthIdentity) -> DomainResult<()> {
        self.removals.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().remove(&identity.cache_key());
        Ok(())
    }
}

/// Identity endpoint stand-in that issues numbered tokens
pub struct ScriptedIdentityProvider {
    calls: AtomicUsize,
    expires_in: u64,
    latency: Duration,
    failure: Mutex<Option<MyInvoisError>>,
    pub last_on_behalf_of: Mutex<Option<String>>,
}

impl ScriptedIdentityProvider {
    pub fn new(expires_in: u64) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            expires_in,
            latency: Duration::ZERO,
            failure: Mutex::new(None),
            last_on_behalf_of: Mutex::new(None),
        })
    }

    /// Provider that sleeps before answering, to widen race windows
    pub fn slow(expires_in: u64, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            expires_in,
            latency,
            failure: Mutex::new(None),
            last_on_behalf_of: Mutex::new(None),
        })
    }

    pub fn fail_with(&self, err: MyInvoisError) {
        *self.failure.lock() = Some(err);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentityProvider {
    async fn request_token(
        &self,
        credentials: &Credentials,
        _scope: &str,
        on_behalf_of: Option<&Tin>,
    ) -> DomainResult<TokenResponse> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if let Some(err) = self.failure.lock().clone() {
            return Err(err);
        }
        *self.last_on_behalf_of.lock() = on_behalf_of.map(ToString::to_string);
        Ok(TokenResponse {
            access_token: format!("{}-token-{n}", credentials.client_id),
            token_type: "Bearer".into(),
            expires_in: self.expires_in,
            scope: Some("InvoicingAPI".into()),
        })
    }
}

#[derive(Default)]
pub struct MemoryWebhookRepository {
    webhooks: Mutex<HashMap<Uuid, Webhook>>,
}

impl MemoryWebhookRepository {
    pub fn with(webhooks: Vec<Webhook>) -> Arc<Self> {
        Arc::new(Self { webhooks: Mutex::new(webhooks.into_iter().map(|w| (w.id, w)).collect()) })
    }

    pub fn get(&self, id: Uuid) -> Option<Webhook> {
        self.webhooks.lock().get(&id).cloned()
    }

    /// Seed or replace a webhook outside of the dispatcher
    pub fn save_webhook_sync(&self, webhook: Webhook) {
        self.webhooks.lock().insert(webhook.id, webhook);
    }

    pub fn deactivate(&self, id: Uuid) {
        if let Some(webhook) = self.webhooks.lock().get_mut(&id) {
            webhook.is_active = false;
        }
    }
}

#[async_trait]
impl WebhookRepository for MemoryWebhookRepository {
    async fn find_subscribed(&self, event_type: &str) -> DomainResult<Vec<Webhook>> {
        Ok(self.webhooks.lock().values().filter(|w| w.accepts(event_type)).cloned().collect())
    }

    async fn find_webhook(&self, id: Uuid) -> DomainResult<Option<Webhook>> {
        Ok(self.get(id))
    }

    async fn record_outcome(
        &self,
        id: Uuid,
        delivered: bool,
        now: DateTime<Utc>,
    ) -> DomainResult<()> {
        if let Some(webhook) = self.webhooks.lock().get_mut(&id) {
            webhook.record_outcome(delivered, now);
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDeliveryRepository {
    deliveries: Mutex<HashMap<Uuid, WebhookDelivery>>,
}

impl MemoryDeliveryRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get(&self, id: Uuid) -> Option<WebhookDelivery> {
        self.deliveries.lock().get(&id).cloned()
    }

    pub fn all(&self) -> Vec<WebhookDelivery> {
        self.deliveries.lock().values().cloned().collect()
    }
}

#[async_trait]
impl DeliveryRepository for MemoryDeliveryRepository {
    async fn save_delivery(&self, delivery: &WebhookDelivery) -> DomainResult<()> {
        self.deliveries.lock().insert(delivery.id, delivery.clone());
        Ok(())
    }

    async fn find_delivery(&self, id: Uuid) -> DomainResult<Option<WebhookDelivery>> {
        Ok(self.get(id))
    }

    async fn find_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> DomainResult<Vec<WebhookDelivery>> {
        let mut due: Vec<_> = self
            .deliveries
            .lock()
            .values()
            .filter(|d| d.status == DeliveryStatus::Failed && d.can_retry(now))
            .cloned()
            .collect();
        due.sort_by_key(|d| d.next_retry_at);
        due.truncate(limit);
        Ok(due)
    }
}

/// Replays queued outcomes; answers 200 once the script runs out
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<DomainResult<TransportResponse>>>,
    sent: AtomicUsize,
    latency: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport that sleeps before answering, so tests can act mid-request
    pub fn slow(latency: Duration) -> Arc<Self> {
        Arc::new(Self { latency, ..Self::default() })
    }

    pub fn respond(&self, status_code: u16, body: &str) {
        self.script.lock().push_back(Ok(TransportResponse {
            status_code,
            body: body.to_string(),
            elapsed_ms: 12,
        }));
    }

    pub fn fail(&self, message: &str) {
        self.script.lock().push_back(Err(MyInvoisError::network(message)));
    }

    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn send(
        &self,
        _webhook: &Webhook,
        _delivery: &WebhookDelivery,
    ) -> DomainResult<TransportResponse> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.script.lock().pop_front().unwrap_or_else(|| {
            Ok(TransportResponse { status_code: 200, body: "ok".into(), elapsed_ms: 5 })
        })
    }
}
