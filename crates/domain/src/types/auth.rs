//! Authentication types: credentials, identities and tokens

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::tin::Tin;
use crate::constants::TOKEN_CACHE_PREFIX;
use crate::impl_domain_status_conversions;

/// OAuth2 client credentials
///
/// `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), client_secret: client_secret.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

/// Whether the client acts for itself or on behalf of a represented taxpayer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    #[default]
    Direct,
    Intermediary,
}

impl_domain_status_conversions!(AuthMode {
    Direct => "direct",
    Intermediary => "intermediary",
});

/// Who a token was issued to
///
/// Two identities share a token only if both the client id and the
/// represented TIN match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuthIdentity {
    pub client_id: String,
    pub tin: Option<Tin>,
}

impl AuthIdentity {
    pub fn direct(client_id: impl Into<String>) -> Self {
        Self { client_id: client_id.into(), tin: None }
    }

    pub fn intermediary(client_id: impl Into<String>, tin: Tin) -> Self {
        Self { client_id: client_id.into(), tin: Some(tin) }
    }

    pub fn is_intermediary(&self) -> bool {
        self.tin.is_some()
    }

    /// Cache key: `myinvois:token:{client_id}` plus `:{tin}` when present
    pub fn cache_key(&self) -> String {
        match &self.tin {
            Some(tin) => format!("{TOKEN_CACHE_PREFIX}:{}:{tin}", self.client_id),
            None => format!("{TOKEN_CACHE_PREFIX}:{}", self.client_id),
        }
    }
}

impl fmt::Display for AuthIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tin {
            Some(tin) => write!(f, "{} on behalf of {tin}", self.client_id),
            None => f.write_str(&self.client_id),
        }
    }
}

/// Longest lifetime accepted from the identity endpoint (ten years)
const MAX_LIFETIME_SECS: u64 = 10 * 365 * 24 * 3600;

/// Body returned by the identity endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Access token with its absolute expiry
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthToken {
    pub access_token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub scope: Option<String>,
}

impl AuthToken {
    /// Build a token acquired at `acquired_at`; expiry is always
    /// `acquired_at + expires_in`
    pub fn from_response(response: TokenResponse, acquired_at: DateTime<Utc>) -> Self {
        let lifetime = chrono::Duration::seconds(response.expires_in.min(MAX_LIFETIME_SECS) as i64);
        Self {
            access_token: response.access_token,
            token_type: response.token_type,
            expires_at: acquired_at + lifetime,
            scope: response.scope,
        }
    }

    /// Usable while `now < expires_at - refresh_buffer`
    pub fn is_usable_at(&self, now: DateTime<Utc>, refresh_buffer: Duration) -> bool {
        let Ok(buffer) = chrono::Duration::from_std(refresh_buffer) else {
            return false;
        };
        match self.expires_at.checked_sub_signed(buffer) {
            Some(deadline) => now < deadline,
            None => false,
        }
    }

    /// Time left before hard expiry, zero once expired
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Value for the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.access_token)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scope", &self.scope)
            .finish()
    }
}
