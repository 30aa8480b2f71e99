//! Application state for shared services

use std::sync::Arc;

use crate::domain::IdentityResolver;
use crate::infrastructure::key::{IssuanceService, ValidationService};

/// Application state shared by every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub issuance: Arc<IssuanceService>,
    pub validation: Arc<ValidationService>,
    pub resolver: IdentityResolver,
    /// Validate tokens against the presenting client's identity
    pub bind_identity: bool,
}

impl AppState {
    pub fn new(issuance: IssuanceService, validation: ValidationService) -> Self {
        Self {
            issuance: Arc::new(issuance),
            validation: Arc::new(validation),
            resolver: IdentityResolver::new(),
            bind_identity: false,
        }
    }

    pub fn with_bind_identity(mut self, bind: bool) -> Self {
        self.bind_identity = bind;
        self
    }
}
