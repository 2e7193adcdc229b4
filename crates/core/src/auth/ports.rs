//! Port interfaces for authentication
//!
//! These traits define the boundaries between the token lifecycle and the
//! infrastructure that talks to the identity endpoint or stores tokens.

use std::time::Duration;

use async_trait::async_trait;
use myinvois_domain::{AuthIdentity, AuthToken, Credentials, Result, Tin, TokenResponse};

/// Storage for tokens keyed by identity
///
/// Implementations must keep identities apart: a token stored for one
/// client/TIN pair is never returned for another.
#[async_trait]
pub trait TokenCache: Send + Sync {
    /// Get the stored token for `identity`, if any
    async fn get(&self, identity: &AuthIdentity) -> Result<Option<AuthToken>>;

    /// Store a token; the entry may be dropped after `ttl`
    async fn put(&self, identity: &AuthIdentity, token: &AuthToken, ttl: Duration) -> Result<()>;

    /// Remove the stored token for `identity`
    async fn remove(&self, identity: &AuthIdentity) -> Result<()>;
}

/// Client-credentials exchange against the identity endpoint
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Request a token, adding the on-behalf-of header when `on_behalf_of` is set
    async fn request_token(
        &self,
        credentials: &Credentials,
        scope: &str,
        on_behalf_of: Option<&Tin>,
    ) -> Result<TokenResponse>;
}

/// What the request executor needs from the auth layer
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// A usable access token for the current identity
    async fn access_token(&self) -> Result<String>;

    /// Drop the current identity's token so the next call re-authenticates
    async fn invalidate(&self) -> Result<()>;
}
