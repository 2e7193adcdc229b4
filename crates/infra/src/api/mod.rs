//! MyInvois API access
//!
//! - [`errors`]: maps HTTP responses onto [`myinvois_domain::MyInvoisError`]
//! - [`executor`]: authenticated requests with retry, async and blocking
//! - [`client`]: the document, taxpayer and notification operations

pub mod client;
pub mod errors;
pub mod executor;

pub use client::{MyInvoisClient, MyInvoisClientBuilder};
pub use errors::{error_from_response, ApiErrorCategory};
pub use executor::{retry_config, BlockingRequestExecutor, RequestExecutor, RequestOptions};
