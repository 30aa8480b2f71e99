//! Domain layer - Core business logic and entities

pub mod clock;
pub mod error;
pub mod gate;
pub mod identity;
pub mod key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::DomainError;
pub use gate::{AccessGate, GateDecision, GateDenial, Provenance};
pub use identity::{ClientSignals, Identity, IdentityResolver};
pub use key::{
    AccessKey, AccessToken, CreateOutcome, DuplicatePolicy, InvalidReason, KeyError, KeyState,
    KeyStats, KeyStore, ValidationOutcome,
};
