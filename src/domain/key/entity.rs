//! Access key entity and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::validation::{validate_access_token, TokenFormatError};
use crate::domain::identity::Identity;

/// Default validity window of an access key
pub const DEFAULT_KEY_TTL_SECS: i64 = 24 * 60 * 60;

/// Longest validity window accepted from configuration (one year)
pub const MAX_KEY_TTL_SECS: i64 = 365 * DEFAULT_KEY_TTL_SECS;

/// Opaque access token - fixed-length uppercase hexadecimal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessToken(String);

impl AccessToken {
    /// Create a new AccessToken after validation
    pub fn new(token: impl Into<String>) -> Result<Self, TokenFormatError> {
        let token = token.into();
        validate_access_token(&token)?;
        Ok(Self(token))
    }

    /// Wrap a value produced by the token generator, which only emits
    /// uppercase hex of an allowed length
    pub(crate) fn from_generated(token: String) -> Self {
        debug_assert!(validate_access_token(&token).is_ok());
        Self(token)
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for AccessToken {
    type Error = TokenFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<AccessToken> for String {
    fn from(token: AccessToken) -> Self {
        token.0
    }
}

impl std::fmt::Display for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of a persisted key at a given instant
///
/// `Active -> Expired` is purely a function of time; the third state,
/// reaped, is simply the record's absence from the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Active,
    Expired,
}

/// A single issued access key
///
/// `expires_at` is fixed at creation. Renewal is always delete and recreate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    token: AccessToken,
    owner_identity: Identity,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    expires_at: DateTime<Utc>,
}

impl AccessKey {
    /// Create a key valid for `ttl` starting at `created_at`
    pub fn new(
        token: AccessToken,
        owner_identity: Identity,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            token,
            owner_identity,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// Rebuild a key from persisted fields
    pub fn from_parts(
        token: AccessToken,
        owner_identity: Identity,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            owner_identity,
            created_at,
            expires_at,
        }
    }

    pub fn token(&self) -> &AccessToken {
        &self.token
    }

    pub fn owner_identity(&self) -> &Identity {
        &self.owner_identity
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Active while `now < expires_at`
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> KeyState {
        if self.is_active_at(now) {
            KeyState::Active
        } else {
            KeyState::Expired
        }
    }

    /// Time left in the validity window, zero once expired
    pub fn remaining_at(&self, now: DateTime<Utc>) -> Duration {
        if self.is_active_at(now) {
            self.expires_at - now
        } else {
            Duration::zero()
        }
    }

    pub fn is_owned_by(&self, identity: &Identity) -> bool {
        &self.owner_identity == identity
    }
}
