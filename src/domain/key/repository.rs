//! Key store trait

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[cfg(test)]
use mockall::automock;

use super::entity::{AccessKey, AccessToken};
use crate::domain::identity::Identity;
use crate::domain::DomainError;

/// Result of an atomic get-or-create for one owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// The candidate was written; any expired record of the owner was replaced
    Created(AccessKey),
    /// The owner already holds an active key; nothing was written
    Existing(AccessKey),
    /// The candidate's token belongs to another record; regenerate and retry
    TokenCollision,
}

/// Aggregate counts over the whole store. Never carries identities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStats {
    pub total: u64,
    pub active: u64,
    /// Expired but not yet reaped
    pub expired: u64,
    pub active_identities: u64,
}

/// Persistent record set keyed by token with a unique owner identity
///
/// Implementations are the single arbiter of the one-active-key-per-owner
/// rule: `get_or_create` must decide and write atomically, so that N
/// concurrent calls for one owner yield exactly one `Created`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Store `candidate` unless its owner already holds a key active at `now`
    async fn get_or_create(
        &self,
        candidate: AccessKey,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, DomainError>;

    /// Find a key by token, regardless of its expiry
    async fn lookup(&self, token: &AccessToken) -> Result<Option<AccessKey>, DomainError>;

    /// Find the key held by an owner, regardless of its expiry
    async fn find_by_owner(&self, owner: &Identity) -> Result<Option<AccessKey>, DomainError>;

    /// Delete a key by token, returns true if a record was removed
    async fn delete(&self, token: &AccessToken) -> Result<bool, DomainError>;

    /// Remove every key expired at `now`, returns how many were removed
    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError>;

    /// Aggregate counts evaluated at `now`
    async fn stats(&self, now: DateTime<Utc>) -> Result<KeyStats, DomainError>;

    /// Cheap reachability check
    async fn ping(&self) -> Result<(), DomainError>;
}
