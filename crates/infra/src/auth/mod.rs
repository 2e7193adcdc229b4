//! Identity endpoint and token cache adapters

pub mod cache;
pub mod identity;

pub use cache::{build_store, StoreTokenCache};
pub use identity::HttpIdentityProvider;
