//! Token verifier adapters.

mod jwt;
mod mock;

pub use jwt::{AccessClaims, JwtTokenVerifier};
pub use mock::MockTokenVerifier;
