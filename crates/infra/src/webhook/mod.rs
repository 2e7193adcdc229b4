//! Webhook delivery adapters
//!
//! - [`HttpWebhookTransport`]: signed POST to the target URL
//! - [`InMemoryWebhookStore`]: webhook and delivery repositories
//! - [`RetryScheduler`]: polls the dispatcher for due retries

pub mod memory;
pub mod scheduler;
pub mod signature;
pub mod transport;

pub use memory::InMemoryWebhookStore;
pub use scheduler::{RetryScheduler, RetrySchedulerConfig, SchedulerError};
pub use signature::{sign, verify};
pub use transport::HttpWebhookTransport;
