//! # MyInvois Domain
//!
//! Data types and rules for the MyInvois e-invoicing client.
//!
//! This crate contains:
//! - The error taxonomy (`MyInvoisError`) and `Result` alias
//! - Authentication types (`AuthToken`, `AuthIdentity`, `Tin`)
//! - Document query and submission payloads with local validation
//! - The webhook delivery state machine
//! - `ClientConfig` with defaults and validation
//!
//! ## Architecture
//! - No I/O; time is always passed in by the caller
//! - Depends on `myinvois-common` for error classification and logging settings

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
