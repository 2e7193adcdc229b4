//! Token lifecycle for one client
//!
//! `AuthSession` owns the credentials, the current identity (the client
//! itself or a represented taxpayer) and the tokens acquired for it. Tokens
//! are held in memory and, when a [`TokenCache`] is configured, shared
//! through it.
//!
//! Concurrent callers needing a token for the same identity are serialised
//! behind a per-identity lock and re-check the cache once they hold it, so a
//! burst of requests triggers a single identity call.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use myinvois_common::time::{SharedClock, SystemClock};
use myinvois_domain::constants::{DEFAULT_SCOPE, TIN_REQUIRED_MESSAGE};
use myinvois_domain::{
    AuthIdentity, AuthMode, AuthSettings, AuthToken, ClientConfig, Credentials, MyInvoisError,
    Result, Tin,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::ports::{AccessTokenProvider, IdentityProvider, TokenCache};

/// Settings the session needs from [`ClientConfig`]
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub mode: AuthMode,
    pub scope: String,
    pub refresh_buffer: Duration,
    pub token_ttl: Option<Duration>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        let auth = AuthSettings::default();
        Self {
            mode: AuthMode::Direct,
            scope: DEFAULT_SCOPE.to_string(),
            refresh_buffer: auth.refresh_buffer(),
            token_ttl: auth.token_ttl(),
        }
    }
}

impl From<&ClientConfig> for SessionSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            mode: config.mode,
            scope: config.scope.clone(),
            refresh_buffer: config.auth.refresh_buffer(),
            token_ttl: config.auth.token_ttl(),
        }
    }
}

/// Authentication client state for one set of credentials
pub struct AuthSession {
    credentials: Credentials,
    settings: SessionSettings,
    provider: Arc<dyn IdentityProvider>,
    cache: Option<Arc<dyn TokenCache>>,
    clock: SharedClock,
    taxpayer: RwLock<Option<Tin>>,
    held: Mutex<HashMap<AuthIdentity, AuthToken>>,
    in_flight: Mutex<HashMap<AuthIdentity, Arc<tokio::sync::Mutex<()>>>>,
}

impl AuthSession {
    pub fn new(
        credentials: Credentials,
        settings: SessionSettings,
        provider: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            credentials,
            settings,
            provider,
            cache: None,
            clock: Arc::new(SystemClock),
            taxpayer: RwLock::new(None),
            held: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Share tokens through `cache` in addition to the in-memory copy
    pub fn with_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn mode(&self) -> AuthMode {
        self.settings.mode
    }

    /// Identity tokens are currently requested for
    pub fn identity(&self) -> AuthIdentity {
        match self.settings.mode {
            AuthMode::Direct => AuthIdentity::direct(&self.credentials.client_id),
            AuthMode::Intermediary => AuthIdentity {
                client_id: self.credentials.client_id.clone(),
                tin: self.taxpayer.read().clone(),
            },
        }
    }

    /// Act on behalf of the taxpayer identified by `tin`
    ///
    /// The format is checked before anything else. Tokens held for the
    /// previous identity are discarded so the next request authenticates as
    /// the new one.
    pub async fn on_behalf_of(&self, tin: &str) -> Result<()> {
        let tin = Tin::parse(tin)?;
        if self.settings.mode != AuthMode::Intermediary {
            return Err(MyInvoisError::config(
                "on_behalf_of requires the client to be in intermediary mode",
            ));
        }

        let previous = self.identity();
        *self.taxpayer.write() = Some(tin);
        let current = self.identity();
        if previous != current {
            self.prune_gates(&current);
            self.forget(&previous).await?;
            info!(identity = %current, "Switched taxpayer identity");
        }
        Ok(())
    }

    /// Request a new token for the current identity and store it
    #[instrument(skip(self), fields(client_id = %self.credentials.client_id))]
    pub async fn authenticate(&self) -> Result<AuthToken> {
        let identity = self.identity();
        self.authenticate_as(&identity).await
    }

    /// Access token for the current identity, authenticating when the held
    /// token is missing or inside the refresh buffer
    pub async fn get_access_token(&self) -> Result<String> {
        let identity = self.identity();
        if let Some(token) = self.usable_token(&identity).await? {
            return Ok(token.access_token);
        }

        let gate = self.gate_for(&identity);
        let _guard = gate.lock().await;

        // Another caller may have authenticated while we waited
        if let Some(token) = self.usable_token(&identity).await? {
            debug!(identity = %identity, "Token acquired by concurrent caller");
            return Ok(token.access_token);
        }

        let token = self.authenticate_as(&identity).await?;
        Ok(token.access_token)
    }

    /// Whether a usable token is held for the current identity
    ///
    /// Never calls the identity endpoint and never changes stored state.
    pub async fn has_valid_token(&self) -> Result<bool> {
        let identity = self.identity();
        let now = self.clock.utc_now();
        let buffer = self.settings.refresh_buffer;
        if self.held_token(&identity).is_some_and(|t| t.is_usable_at(now, buffer)) {
            return Ok(true);
        }
        match &self.cache {
            Some(cache) => Ok(cache.get(&identity).await?.is_some_and(|t| t.is_usable_at(now, buffer))),
            None => Ok(false),
        }
    }

    /// Drop the token held for the current identity
    pub async fn invalidate(&self) -> Result<()> {
        let identity = self.identity();
        debug!(identity = %identity, "Invalidating token");
        self.forget(&identity).await
    }

    async fn authenticate_as(&self, identity: &AuthIdentity) -> Result<AuthToken> {
        if self.settings.mode == AuthMode::Intermediary && identity.tin.is_none() {
            return Err(MyInvoisError::validation_field("tin", TIN_REQUIRED_MESSAGE));
        }

        let acquired_at = self.clock.utc_now();
        let response = self
            .provider
            .request_token(&self.credentials, &self.settings.scope, identity.tin.as_ref())
            .await?;
        let token = AuthToken::from_response(response, acquired_at);
        info!(identity = %identity, expires_at = %token.expires_at, "Authenticated");

        self.held.lock().insert(identity.clone(), token.clone());
        self.store(identity, &token).await;
        Ok(token)
    }

    async fn usable_token(&self, identity: &AuthIdentity) -> Result<Option<AuthToken>> {
        let now = self.clock.utc_now();
        let buffer = self.settings.refresh_buffer;

        if let Some(token) = self.held_token(identity).filter(|t| t.is_usable_at(now, buffer)) {
            return Ok(Some(token));
        }

        let Some(cache) = &self.cache else {
            return Ok(None);
        };
        match cache.get(identity).await? {
            Some(token) if token.is_usable_at(now, buffer) => {
                self.held.lock().insert(identity.clone(), token.clone());
                Ok(Some(token))
            }
            _ => Ok(None),
        }
    }

    fn held_token(&self, identity: &AuthIdentity) -> Option<AuthToken> {
        self.held.lock().get(identity).cloned()
    }

    /// Cache write failures only cost a later re-authentication
    async fn store(&self, identity: &AuthIdentity, token: &AuthToken) {
        let Some(cache) = &self.cache else {
            return;
        };
        let mut ttl = token.remaining(self.clock.utc_now());
        if let Some(cap) = self.settings.token_ttl {
            ttl = ttl.min(cap);
        }
        if ttl.is_zero() {
            return;
        }
        if let Err(err) = cache.put(identity, token, ttl).await {
            warn!(identity = %identity, error = %err, "Failed to cache token");
        }
    }

    async fn forget(&self, identity: &AuthIdentity) -> Result<()> {
        self.held.lock().remove(identity);
        if let Some(cache) = &self.cache {
            cache.remove(identity).await?;
        }
        Ok(())
    }

    fn gate_for(&self, identity: &AuthIdentity) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self.in_flight.lock();
        gates.retain(|held, gate| held == identity || Arc::strong_count(gate) > 1);
        gates.entry(identity.clone()).or_default().clone()
    }

    /// Drop refresh gates no task is waiting on, except `keep`'s
    fn prune_gates(&self, keep: &AuthIdentity) {
        self.in_flight.lock().retain(|held, gate| held == keep || Arc::strong_count(gate) > 1);
    }

    #[cfg(test)]
    fn gate_count(&self) -> usize {
        self.in_flight.lock().len()
    }
}

#[async_trait]
impl AccessTokenProvider for AuthSession {
    async fn access_token(&self) -> Result<String> {
        self.get_access_token().await
    }

    async fn invalidate(&self) -> Result<()> {
        AuthSession::invalidate(self).await
    }
}
