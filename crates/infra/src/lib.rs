//! # MyInvois Infrastructure
//!
//! I/O adapters for the ports defined in `myinvois-core`.
//!
//! This crate contains:
//! - The reqwest-based HTTP client and the OAuth identity provider
//! - Token caching on top of the shared key-value stores
//! - The request executor and [`MyInvoisClient`]
//! - Webhook signing, HTTP transport, in-memory storage and the retry worker
//! - Configuration loading from environment variables and files
//!
//! ## Architecture
//! - Implements traits defined in `myinvois-core`
//! - Depends on `myinvois-common` and `myinvois-domain`
//! - Contains all "impure" code (network, filesystem, environment)

pub mod api;
pub mod auth;
pub mod config;
pub mod errors;
pub mod http;
pub mod webhook;

// Re-export commonly used items
pub use api::{BlockingRequestExecutor, MyInvoisClient, MyInvoisClientBuilder, RequestExecutor, RequestOptions};
pub use auth::{HttpIdentityProvider, StoreTokenCache};
pub use errors::InfraError;
pub use http::HttpClient;
pub use webhook::{HttpWebhookTransport, InMemoryWebhookStore, RetryScheduler, RetrySchedulerConfig};
