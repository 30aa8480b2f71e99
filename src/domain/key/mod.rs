//! Access key domain
//!
//! Types and traits for the key lifecycle: issuance bound to a client
//! identity, a fixed validity window, and lazy or periodic expiry.

mod entity;
mod error;
mod policy;
mod repository;
mod validation;

pub use entity::{AccessKey, AccessToken, KeyState, DEFAULT_KEY_TTL_SECS, MAX_KEY_TTL_SECS};
pub use error::{InvalidReason, KeyError, ValidationOutcome};
pub use policy::DuplicatePolicy;
pub use repository::{CreateOutcome, KeyStats, KeyStore};
pub use validation::{
    normalize_access_token, validate_access_token, TokenFormatError, MAX_TOKEN_BYTES,
    MIN_TOKEN_BYTES,
};

#[cfg(test)]
pub use repository::MockKeyStore;
