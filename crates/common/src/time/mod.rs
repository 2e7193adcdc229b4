//! Time abstractions
//!
//! Token expiry and webhook retry scheduling are computed against a
//! [`Clock`] so tests can simulate time passing with [`MockClock`] instead of
//! sleeping.
//!
//! ```rust
//! use std::time::Duration;
//!
//! use myinvois_common::time::{Clock, MockClock};
//!
//! let clock = MockClock::new();
//! let before = clock.utc_now();
//! clock.advance(Duration::from_secs(3600));
//! assert_eq!((clock.utc_now() - before).num_seconds(), 3600);
//! ```

pub mod clock;

pub use clock::{Clock, MockClock, SharedClock, SystemClock};
