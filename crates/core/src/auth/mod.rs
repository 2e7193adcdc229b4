//! Token lifecycle: ports plus the session that drives them

pub mod ports;
pub mod session;

pub use ports::{AccessTokenProvider, IdentityProvider, TokenCache};
pub use session::{AuthSession, SessionSettings};
