//! Shared test helpers for `myinvois-core` integration tests.
//!
//! In-memory implementations of every core port so tests can focus on
//! behaviour instead of boilerplate.

#![allow(dead_code)]

pub mod repositories;

// Not every test binary uses every fake
#[allow(unused_imports)]
pub use repositories::{
    MemoryDeliveryRepository, MemoryTokenCache, MemoryWebhookRepository, ScriptedIdentityProvider,
    ScriptedTransport,
};
