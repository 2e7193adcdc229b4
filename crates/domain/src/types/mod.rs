//! Domain types and models

pub mod auth;
pub mod document;
pub mod tin;
pub mod webhook;

pub use auth::{AuthIdentity, AuthMode, AuthToken, Credentials, TokenResponse};
pub use document::{
    validate_paging, DocumentQuery, DocumentState, DocumentStateUpdate, DocumentStatus,
    DocumentSubmission, InvoiceDirection, NotificationQuery, QueryPairs, SubmissionDocument,
    TaxpayerIdType,
};
pub use tin::Tin;
pub use webhook::{
    retry_backoff, truncate_body, DeliveryStatus, Webhook, WebhookDelivery, WebhookEvent,
};
