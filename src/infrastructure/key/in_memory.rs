//! In-memory key store implementation

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::identity::Identity;
use crate::domain::key::{AccessKey, AccessToken, CreateOutcome, KeyStats, KeyStore};
use crate::domain::DomainError;

#[derive(Debug, Default)]
struct Records {
    by_token: HashMap<AccessToken, AccessKey>,
    /// Unique owner index; an owner maps to at most one token
    by_owner: HashMap<Identity, AccessToken>,
}

impl Records {
    fn remove_token(&mut self, token: &AccessToken) -> Option<AccessKey> {
        let removed = self.by_token.remove(token)?;

        if self.by_owner.get(removed.owner_identity()) == Some(token) {
            self.by_owner.remove(removed.owner_identity());
        }

        Some(removed)
    }
}

/// Thread-safe in-memory key store
///
/// Both indexes live behind one lock and every mutation happens inside a
/// single write critical section, which makes `get_or_create` a
/// compare-and-set on the owner index. No `.await` is held under the lock.
/// Data is lost when the process terminates.
#[derive(Debug, Default)]
pub struct InMemoryKeyStore {
    records: RwLock<Records>,
}

impl InMemoryKeyStore {
    /// Creates a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with keys
    pub fn with_keys(keys: Vec<AccessKey>) -> Self {
        let store = Self::new();
        {
            let mut records = store
                .records
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());

            for key in keys {
                records
                    .by_owner
                    .insert(key.owner_identity().clone(), key.token().clone());
                records.by_token.insert(key.token().clone(), key);
            }
        }
        store
    }

    fn read_error<E: std::fmt::Display>(e: E) -> DomainError {
        DomainError::storage(format!("Failed to acquire read lock: {}", e))
    }

    fn write_error<E: std::fmt::Display>(e: E) -> DomainError {
        DomainError::storage(format!("Failed to acquire write lock: {}", e))
    }
}

#[async_trait]
impl KeyStore for InMemoryKeyStore {
    async fn get_or_create(
        &self,
        candidate: AccessKey,
        now: DateTime<Utc>,
    ) -> Result<CreateOutcome, DomainError> {
        let mut records = self.records.write().map_err(Self::write_error)?;
        let owner = candidate.owner_identity().clone();

        if let Some(existing) = records
            .by_owner
            .get(&owner)
            .and_then(|token| records.by_token.get(token))
        {
            if existing.is_active_at(now) {
                return Ok(CreateOutcome::Existing(existing.clone()));
            }
        }

        if records.by_token.contains_key(candidate.token()) {
            return Ok(CreateOutcome::TokenCollision);
        }

        if let Some(previous) = records.by_owner.remove(&owner) {
            records.by_token.remove(&previous);
        }

        records.by_owner.insert(owner, candidate.token().clone());
        records
            .by_token
            .insert(candidate.token().clone(), candidate.clone());

        Ok(CreateOutcome::Created(candidate))
    }

    async fn lookup(&self, token: &AccessToken) -> Result<Option<AccessKey>, DomainError> {
        let records = self.records.read().map_err(Self::read_error)?;
        Ok(records.by_token.get(token).cloned())
    }

    async fn find_by_owner(&self, owner: &Identity) -> Result<Option<AccessKey>, DomainError> {
        let records = self.records.read().map_err(Self::read_error)?;

        Ok(records
            .by_owner
            .get(owner)
            .and_then(|token| records.by_token.get(token))
            .cloned())
    }

    async fn delete(&self, token: &AccessToken) -> Result<bool, DomainError> {
        let mut records = self.records.write().map_err(Self::write_error)?;
        Ok(records.remove_token(token).is_some())
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<u64, DomainError> {
        let mut records = self.records.write().map_err(Self::write_error)?;

        let expired: Vec<AccessToken> = records
            .by_token
            .values()
            .filter(|key| !key.is_active_at(now))
            .map(|key| key.token().clone())
            .collect();

        for token in &expired {
            records.remove_token(token);
        }

        Ok(expired.len() as u64)
    }

    async fn stats(&self, now: DateTime<Utc>) -> Result<KeyStats, DomainError> {
        let records = self.records.read().map_err(Self::read_error)?;

        let mut stats = KeyStats {
            total: records.by_token.len() as u64,
            ..KeyStats::default()
        };
        let mut owners = HashSet::new();

        for key in records.by_token.values() {
            if key.is_active_at(now) {
                stats.active += 1;
                owners.insert(key.owner_identity());
            } else {
                stats.expired += 1;
            }
        }

        stats.active_identities = owners.len() as u64;
        Ok(stats)
    }

    async fn ping(&self) -> Result<(), DomainError> {
        self.records.read().map(|_| ()).map_err(Self::read_error)
    }
}
