//! Flow coordinator: a resumable, read-only view of a challenge.
//!
//! A flow is what the browser-facing layer addresses. It reports where the
//! underlying challenge stands without ever touching its state, so an old or
//! expired link resolves to a stable, inspectable answer. All mutation goes
//! through [`crate::VerificationEngine`].

use std::sync::Arc;

use serde::Serialize;

use affirm_store::{Challenge, StoreError, VerifiableAddress, VerificationStore};
use affirm_types::{
    AddressId, AddressValue, ChallengeState, Clock, ExpiredReason, FlowId, IdentityId, Timestamp,
    Via,
};

use crate::VerificationError;

/// Where a flow stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "phase", content = "reason")]
pub enum FlowPhase {
    /// Live; waiting for the code.
    AwaitingCode,
    Completed,
    Expired(ExpiredReason),
}

/// Snapshot of a flow. Carries no token or code.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FlowState {
    pub flow_id: FlowId,
    pub identity_id: IdentityId,
    pub address_id: AddressId,
    pub via: Via,
    pub address_value: AddressValue,
    pub phase: FlowPhase,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    pub flow_expires_at: Timestamp,
    pub attempts_remaining: Option<u32>,
}

impl FlowState {
    /// Derive the flow view of a challenge at `now`.
    ///
    /// An active challenge whose lifetime ran out reads as expired even before
    /// the expiry is written back.
    pub fn from_challenge(challenge: &Challenge, now: Timestamp) -> Self {
        let phase = match challenge.state {
            ChallengeState::Completed => FlowPhase::Completed,
            ChallengeState::Expired => {
                FlowPhase::Expired(challenge.expired_reason.unwrap_or(ExpiredReason::Elapsed))
            }
            ChallengeState::Active if challenge.is_live(now) => FlowPhase::AwaitingCode,
            ChallengeState::Active => FlowPhase::Expired(ExpiredReason::Elapsed),
        };
        Self {
            flow_id: challenge.id,
            identity_id: challenge.identity_id.clone(),
            address_id: challenge.address_id,
            via: challenge.via,
            address_value: challenge.address_value.clone(),
            phase,
            issued_at: challenge.issued_at,
            expires_at: challenge.expires_at,
            flow_expires_at: challenge.flow_expires_at,
            attempts_remaining: challenge.attempts_remaining,
        }
    }

    /// [`Self::from_challenge`], checked against the address as it stands now.
    ///
    /// A completed challenge whose slot was rebound since reads as expired
    /// with reason `address-changed`, even if the value was edited back.
    pub fn against_address(
        challenge: &Challenge,
        address: &VerifiableAddress,
        now: Timestamp,
    ) -> Self {
        let mut state = Self::from_challenge(challenge, now);
        if state.phase == FlowPhase::Completed && !challenge.vouches_for(address) {
            state.phase = FlowPhase::Expired(ExpiredReason::AddressChanged);
        }
        state
    }

    pub fn is_expired(&self) -> bool {
        matches!(self.phase, FlowPhase::Expired(_))
    }
}

/// What a UI needs to offer "resend" for a dead flow.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ExpiredContext {
    pub flow_id: FlowId,
    pub identity_id: IdentityId,
    /// The address value the dead flow was issued for.
    pub challenge_value: AddressValue,
    /// The address record as it stands now; its value may differ after an edit.
    pub address: VerifiableAddress,
    pub reason: ExpiredReason,
}

impl ExpiredContext {
    pub(crate) fn load(
        store: &dyn VerificationStore,
        challenge: &Challenge,
        reason: ExpiredReason,
    ) -> Result<Self, VerificationError> {
        let address = address_of(store, challenge)?;
        Ok(Self::new(challenge, address, reason))
    }

    fn new(challenge: &Challenge, address: VerifiableAddress, reason: ExpiredReason) -> Self {
        Self {
            flow_id: challenge.id,
            identity_id: challenge.identity_id.clone(),
            challenge_value: challenge.address_value.clone(),
            address,
            reason,
        }
    }
}

/// The address a challenge was issued for. Missing means corruption.
pub(crate) fn address_of(
    store: &dyn VerificationStore,
    challenge: &Challenge,
) -> Result<VerifiableAddress, VerificationError> {
    let address = store.get_address(&challenge.address_id)?.ok_or_else(|| {
        StoreError::Corruption(format!(
            "challenge {} references missing address {}",
            challenge.id, challenge.address_id
        ))
    })?;
    Ok(address)
}

/// Read-only entry point for browser-addressable flows.
pub struct FlowCoordinator {
    store: Arc<dyn VerificationStore>,
    clock: Arc<dyn Clock>,
}

impl FlowCoordinator {
    pub fn new(store: Arc<dyn VerificationStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    fn load(
        &self,
        flow_id: &FlowId,
    ) -> Result<(Challenge, VerifiableAddress, FlowState), VerificationError> {
        let challenge = self
            .store
            .find_challenge(flow_id)?
            .ok_or(VerificationError::NotFound)?;
        let address = address_of(self.store.as_ref(), &challenge)?;
        let state = FlowState::against_address(&challenge, &address, self.clock.now());
        Ok((challenge, address, state))
    }

    /// Re-read the flow's current status. Safe to call any number of times.
    pub fn resume(&self, flow_id: &FlowId) -> Result<FlowState, VerificationError> {
        let (_, _, state) = self.load(flow_id)?;
        Ok(state)
    }

    /// Context for a resend offer on an expired flow.
    ///
    /// Fails with [`VerificationError::FlowNotExpired`] while the flow is
    /// still live or already completed.
    pub fn render_expired_context(
        &self,
        flow_id: &FlowId,
    ) -> Result<ExpiredContext, VerificationError> {
        let (challenge, address, state) = self.load(flow_id)?;
        match state.phase {
            FlowPhase::Expired(reason) => Ok(ExpiredContext::new(&challenge, address, reason)),
            FlowPhase::AwaitingCode | FlowPhase::Completed => {
                Err(VerificationError::FlowNotExpired(*flow_id))
            }
        }
    }
}
