//! # MyInvois Core
//!
//! I/O-free orchestration for the MyInvois client.
//!
//! This crate contains:
//! - Port interfaces (traits) for the identity endpoint, token storage,
//!   webhook storage and webhook transport
//! - `AuthSession`: token acquisition, caching, refresh and on-behalf-of
//!   identity switching
//! - `WebhookDispatcher`: delivery fan-out and pull-based retries
//!
//! ## Architecture Principles
//! - Depends only on `myinvois-common` and `myinvois-domain`
//! - No HTTP or storage code
//! - All external dependencies via traits
//! - Time comes from an injectable clock

pub mod auth;
pub mod webhook;

pub use auth::{AccessTokenProvider, AuthSession, IdentityProvider, SessionSettings, TokenCache};
pub use webhook::{
    DeliveryRepository, TransportResponse, WebhookDispatcher, WebhookRepository, WebhookTransport,
};
