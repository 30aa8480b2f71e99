//! Key issuance service
//!
//! Combines the provenance gate, token generation and the store's atomic
//! get-or-create into the single issuance operation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use crate::domain::key::{
    AccessKey, CreateOutcome, DuplicatePolicy, KeyError, KeyStore, DEFAULT_KEY_TTL_SECS,
};
use crate::domain::{
    AccessGate, Clock, DomainError, GateDecision, GateDenial, Identity, Provenance, SystemClock,
};
use crate::infrastructure::observability::{record_issue_rejected, record_key_issued};

use super::generator::KeyGenerator;

/// How many fresh tokens to try before giving up on a colliding keyspace
pub const MAX_COLLISION_ATTEMPTS: usize = 5;

/// Result of a successful issuance call
#[derive(Debug, Clone)]
pub struct IssuedKey {
    pub key: AccessKey,
    /// False when the existing active key was handed back
    pub created: bool,
}

/// Issues access keys to gated callers
#[derive(Clone)]
pub struct IssuanceService {
    store: Arc<dyn KeyStore>,
    gate: AccessGate,
    generator: KeyGenerator,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    policy: DuplicatePolicy,
}

impl std::fmt::Debug for IssuanceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuanceService")
            .field("gate", &self.gate)
            .field("generator", &self.generator)
            .field("ttl", &self.ttl)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl IssuanceService {
    pub fn new(store: Arc<dyn KeyStore>, gate: AccessGate) -> Self {
        Self {
            store,
            gate,
            generator: KeyGenerator::default(),
            clock: Arc::new(SystemClock),
            ttl: Duration::seconds(DEFAULT_KEY_TTL_SECS),
            policy: DuplicatePolicy::default(),
        }
    }

    pub fn with_generator(mut self, generator: KeyGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn gate(&self) -> &AccessGate {
        &self.gate
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a key to `identity` if the request passes the gate and the
    /// identity holds no active key
    ///
    /// A gate denial never touches the store.
    pub async fn issue(
        &self,
        provenance: &Provenance,
        identity: &Identity,
    ) -> Result<IssuedKey, KeyError> {
        if let GateDecision::Deny(denial) = self.gate.check(provenance) {
            warn!(
                client = %identity.masked(),
                reason = %denial,
                "Key issuance rejected by gate"
            );
            record_issue_rejected(denial_label(&denial));
            return Err(KeyError::GateRejected { denial });
        }

        let now = self.clock.now();

        for attempt in 1..=MAX_COLLISION_ATTEMPTS {
            let token = self.generator.generate();
            let candidate = AccessKey::new(token, identity.clone(), now, self.ttl);

            let outcome = match self.store.get_or_create(candidate, now).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(
                        client = %identity.masked(),
                        error = %e,
                        "Key store failed during issuance"
                    );
                    record_issue_rejected(if e.is_store_unavailable() {
                        "store_unavailable"
                    } else {
                        "internal_error"
                    });
                    return Err(KeyError::Store(e));
                }
            };

            match outcome {
                CreateOutcome::Created(key) => {
                    info!(
                        client = %identity.masked(),
                        expires_at = %key.expires_at(),
                        "Issued access key"
                    );
                    debug!(token = %key.token(), "Issued token");
                    record_key_issued();
                    return Ok(IssuedKey { key, created: true });
                }
                CreateOutcome::Existing(key) => return self.on_existing(key, identity, now),
                CreateOutcome::TokenCollision => {
                    debug!(attempt, "Generated token collided, regenerating");
                }
            }
        }

        warn!(
            attempts = MAX_COLLISION_ATTEMPTS,
            "Could not generate a unique token"
        );
        record_issue_rejected("internal_error");
        Err(KeyError::Store(DomainError::internal(format!(
            "No unique token after {} attempts",
            MAX_COLLISION_ATTEMPTS
        ))))
    }

    /// `now` is the instant the store judged `key` active against
    fn on_existing(
        &self,
        key: AccessKey,
        identity: &Identity,
        now: DateTime<Utc>,
    ) -> Result<IssuedKey, KeyError> {
        match self.policy {
            DuplicatePolicy::Reject => {
                let remaining = key.remaining_at(now);
                info!(
                    client = %identity.masked(),
                    remaining_ms = remaining.num_milliseconds(),
                    "Client already holds an active key"
                );
                record_issue_rejected("duplicate_active_token");
                Err(KeyError::DuplicateActiveToken {
                    remaining,
                    expires_at: key.expires_at(),
                })
            }
            DuplicatePolicy::ReturnExisting => {
                debug!(client = %identity.masked(), "Returning existing active key");
                Ok(IssuedKey {
                    key,
                    created: false,
                })
            }
        }
    }
}

fn denial_label(denial: &GateDenial) -> &'static str {
    match denial {
        GateDenial::MissingProvenance => "missing_provenance",
        GateDenial::UntrustedProvenance => "untrusted_provenance",
    }
}
