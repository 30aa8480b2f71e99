//! Issuance and validation outcomes

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::domain::gate::GateDenial;
use crate::domain::DomainError;

/// Reasons an issuance attempt does not produce a new key
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Issuance rejected: {denial}")]
    GateRejected { denial: GateDenial },

    #[error("An active key already exists for this client ({} ms remaining)", .remaining.num_milliseconds())]
    DuplicateActiveToken {
        remaining: Duration,
        expires_at: DateTime<Utc>,
    },

    #[error(transparent)]
    Store(#[from] DomainError),
}

impl KeyError {
    /// Short machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::GateRejected { .. } => "gate_rejected",
            Self::DuplicateActiveToken { .. } => "duplicate_active_token",
            Self::Store(e) if e.is_store_unavailable() => "store_unavailable",
            Self::Store(_) => "internal_error",
        }
    }
}

/// Why a presented token is not valid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    NotFound,
    Expired,
    IdentityMismatch,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::IdentityMismatch => "identity_mismatch",
        }
    }
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Expired => write!(f, "key expired"),
            Self::IdentityMismatch => write!(f, "key was issued to a different client"),
        }
    }
}

/// Result of checking a presented token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid { expires_at: DateTime<Utc> },
    Invalid(InvalidReason),
}

impl ValidationOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Valid { expires_at } => Some(*expires_at),
            Self::Invalid(_) => None,
        }
    }

    pub fn reason(&self) -> Option<InvalidReason> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid(reason) => Some(*reason),
        }
    }
}
