//! Entry points run after an identity is persisted.

use std::sync::Arc;

use affirm_types::IdentityId;

use crate::{RequestOutcome, VerificationEngine, VerificationError};

/// Requests verification for every declared address that is not verified.
///
/// Run after registration and after a settings update. Addresses already
/// verified for their current value are skipped by the engine.
#[derive(Clone)]
pub struct VerificationHook {
    engine: Arc<VerificationEngine>,
}

impl VerificationHook {
    pub fn new(engine: Arc<VerificationEngine>) -> Self {
        Self { engine }
    }

    pub fn after_registration(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<RequestOutcome>, VerificationError> {
        tracing::debug!(identity = %identity, "post-registration verification hook");
        self.engine
            .declared_addresses(identity)?
            .iter()
            .map(|address| self.engine.request_verification(identity, address))
            .collect()
    }

    /// Declared values that changed are rebound before a challenge is issued.
    pub fn after_settings(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<RequestOutcome>, VerificationError> {
        tracing::debug!(identity = %identity, "post-settings verification hook");
        self.engine
            .declared_addresses(identity)?
            .iter()
            .map(|address| self.engine.on_traits_changed(identity, address))
            .collect()
    }
}
