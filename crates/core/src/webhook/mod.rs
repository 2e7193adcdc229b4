//! Webhook delivery: ports plus the dispatcher

pub mod ports;
pub mod service;

pub use ports::{DeliveryRepository, TransportResponse, WebhookRepository, WebhookTransport};
pub use service::WebhookDispatcher;
