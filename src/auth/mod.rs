//! Authentication module
//!
//! Supports: Bearer tokens and service-account JWTs exchanged for access
//! tokens (Google). The `Authenticator` caches exchanged tokens until they
//! are close to expiry.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AuthConfig, CachedToken, ServiceAccountKey, GOOGLE_TOKEN_URL};
