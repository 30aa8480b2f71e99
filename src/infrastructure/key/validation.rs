//! Key validation and reporting service

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info};

use crate::domain::key::{
    normalize_access_token, AccessKey, AccessToken, InvalidReason, KeyStats, KeyStore,
    ValidationOutcome,
};
use crate::domain::{Clock, DomainError, Identity, SystemClock};
use crate::infrastructure::observability::record_validation;

/// What an identity currently holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    /// No key, or only an expired one awaiting reaping
    Inactive,
    Active { key: AccessKey, remaining: Duration },
}

impl KeyStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active { .. })
    }
}

/// Read path over the key store: check, status and stats
#[derive(Clone)]
pub struct ValidationService {
    store: Arc<dyn KeyStore>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for ValidationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationService")
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl ValidationService {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Check a presented token
    ///
    /// The raw value is trimmed and uppercased first. A malformed value can
    /// never be in the store and is reported as `NotFound` without a lookup.
    /// An expired record is deleted before `Expired` is returned. When
    /// `identity` is given, a key owned by someone else is `IdentityMismatch`.
    pub async fn check(
        &self,
        raw: &str,
        identity: Option<&Identity>,
    ) -> Result<ValidationOutcome, DomainError> {
        let outcome = self.evaluate(raw, identity).await?;

        record_validation(match outcome.reason() {
            None => "valid",
            Some(reason) => reason.as_str(),
        });

        Ok(outcome)
    }

    async fn evaluate(
        &self,
        raw: &str,
        identity: Option<&Identity>,
    ) -> Result<ValidationOutcome, DomainError> {
        let Ok(token) = AccessToken::new(normalize_access_token(raw)) else {
            debug!("Presented token is malformed");
            return Ok(ValidationOutcome::Invalid(InvalidReason::NotFound));
        };

        let Some(key) = self.store.lookup(&token).await? else {
            debug!(token = %token, "Presented token not found");
            return Ok(ValidationOutcome::Invalid(InvalidReason::NotFound));
        };

        let now = self.clock.now();

        if !key.is_active_at(now) {
            let removed = self.store.delete(key.token()).await?;
            info!(
                client = %key.owner_identity().masked(),
                removed,
                "Reaped expired key on validation"
            );
            debug!(token = %token, "Expired token");
            return Ok(ValidationOutcome::Invalid(InvalidReason::Expired));
        }

        if let Some(identity) = identity {
            if !key.is_owned_by(identity) {
                info!(
                    client = %identity.masked(),
                    "Key presented by a client other than its owner"
                );
                return Ok(ValidationOutcome::Invalid(InvalidReason::IdentityMismatch));
            }
        }

        Ok(ValidationOutcome::Valid {
            expires_at: key.expires_at(),
        })
    }

    /// Report the key held by `identity` without modifying the store
    pub async fn status(&self, identity: &Identity) -> Result<KeyStatus, DomainError> {
        let now = self.clock.now();

        Ok(match self.store.find_by_owner(identity).await? {
            Some(key) if key.is_active_at(now) => KeyStatus::Active {
                remaining: key.remaining_at(now),
                key,
            },
            _ => KeyStatus::Inactive,
        })
    }

    /// Aggregate counts at the current instant
    pub async fn stats(&self) -> Result<KeyStats, DomainError> {
        self.store.stats(self.clock.now()).await
    }

    /// Reachability of the backing store
    pub async fn ping(&self) -> Result<(), DomainError> {
        self.store.ping().await
    }
}
