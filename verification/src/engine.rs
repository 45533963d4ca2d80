//! Verification engine: issues, validates and expires challenges.
//!
//! Every mutation on an address runs under that address's slot lock, and every
//! store call it makes is atomic on its own. Reads take no lock.

use std::sync::Arc;

use serde::Serialize;

use affirm_crypto::{codec_for, new_address_id, new_flow_id};
use affirm_store::{
    Challenge, Completion, FailedAttempt, IdentityStore, Upserted, VerifiableAddress,
    VerificationStore,
};
use affirm_types::{
    AddressId, AddressValue, ChallengeState, Clock, DeclaredAddress, ExpiredReason, FlowId,
    IdentityId, Timestamp, VerificationParams, Via,
};

use crate::courier::{LinkBuilder, MailTemplate, MailTransport};
use crate::flow::{address_of, ExpiredContext, FlowState};
use crate::locks::AddressLocks;
use crate::VerificationError;

/// Result of asking for an address to be verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "outcome", content = "flow_id")]
pub enum RequestOutcome {
    /// A new challenge was minted and mailed.
    Issued(FlowId),
    /// The live challenge was mailed again with the same token and code.
    Resent(FlowId),
    /// The address is verified for its current value. Nothing was sent.
    AlreadyVerified,
}

impl RequestOutcome {
    pub fn flow_id(&self) -> Option<FlowId> {
        match self {
            Self::Issued(flow) | Self::Resent(flow) => Some(*flow),
            Self::AlreadyVerified => None,
        }
    }
}

/// Result of a successful code submission.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "outcome", content = "address")]
pub enum SubmitOutcome {
    Verified(VerifiableAddress),
    /// The flow had already completed; `verified_at` is unchanged.
    AlreadyVerified(VerifiableAddress),
}

impl SubmitOutcome {
    pub fn address(&self) -> &VerifiableAddress {
        match self {
            Self::Verified(a) | Self::AlreadyVerified(a) => a,
        }
    }
}

pub struct VerificationEngine {
    store: Arc<dyn VerificationStore>,
    identities: Arc<dyn IdentityStore>,
    mailer: Arc<dyn MailTransport>,
    clock: Arc<dyn Clock>,
    links: LinkBuilder,
    params: VerificationParams,
    locks: AddressLocks,
}

impl VerificationEngine {
    pub fn new(
        store: Arc<dyn VerificationStore>,
        identities: Arc<dyn IdentityStore>,
        mailer: Arc<dyn MailTransport>,
        clock: Arc<dyn Clock>,
        links: LinkBuilder,
        params: VerificationParams,
    ) -> Self {
        Self {
            store,
            identities,
            mailer,
            clock,
            links,
            params,
            locks: AddressLocks::new(),
        }
    }

    pub fn params(&self) -> &VerificationParams {
        &self.params
    }

    pub fn links(&self) -> &LinkBuilder {
        &self.links
    }

    // ── Issuing ──────────────────────────────────────────────────────────

    /// Make sure the declared address has exactly one live challenge and mail
    /// its link.
    ///
    /// The address must be declared on the identity. A live challenge is
    /// resent as is; an elapsed one is expired and replaced.
    pub fn request_verification(
        &self,
        identity: &IdentityId,
        address: &DeclaredAddress,
    ) -> Result<RequestOutcome, VerificationError> {
        let record = self
            .identities
            .get_identity(identity)?
            .ok_or_else(|| VerificationError::IdentityNotFound(identity.clone()))?;
        if record.traits.address(address.via) != Some(&address.value) {
            return Err(VerificationError::UndeclaredAddress {
                identity: identity.clone(),
                value: address.value.to_string(),
            });
        }
        self.locks.with_slot(identity, address.via, || {
            self.ensure_challenge_locked(identity, address.via, &address.value)
        })
    }

    /// React to an identity declaring `address`, possibly replacing the value
    /// previously held in that channel.
    ///
    /// The identity's traits are updated right away. A changed value is never
    /// trusted until a challenge for it completes: the slot is rebound, its
    /// old challenges expire and a fresh one is issued.
    pub fn on_traits_changed(
        &self,
        identity: &IdentityId,
        address: &DeclaredAddress,
    ) -> Result<RequestOutcome, VerificationError> {
        self.locks.with_slot(identity, address.via, || {
            let mut record = self
                .identities
                .get_identity(identity)?
                .ok_or_else(|| VerificationError::IdentityNotFound(identity.clone()))?;
            if record.traits.address(address.via) != Some(&address.value) {
                record.traits.set_address(address.via, address.value.clone());
                self.identities.update_traits(identity, &record.traits)?;
                tracing::info!(
                    identity = %identity,
                    via = %address.via,
                    value = %address.value,
                    "declared address changed"
                );
            }
            self.ensure_challenge_locked(identity, address.via, &address.value)
        })
    }

    /// Resend form: request verification for whoever declared `raw`.
    ///
    /// When no identity holds the value, a `VerificationInvalid` notice goes
    /// to it instead, so the form never reveals whether an account exists.
    pub fn request_verification_by_value(
        &self,
        via: Via,
        raw: &str,
    ) -> Result<Vec<RequestOutcome>, VerificationError> {
        let value = AddressValue::parse(via, raw)?;
        let owners = self.store.addresses_by_value(via, &value)?;
        if owners.is_empty() {
            tracing::info!(via = %via, "verification requested for unknown address");
            self.dispatch(&MailTemplate::VerificationInvalid { to: value });
            return Ok(Vec::new());
        }
        owners
            .iter()
            .map(|owner| {
                self.locks.with_slot(&owner.identity_id, via, || {
                    self.ensure_challenge_locked(&owner.identity_id, via, &value)
                })
            })
            .collect()
    }

    /// Caller holds the slot lock.
    fn ensure_challenge_locked(
        &self,
        identity: &IdentityId,
        via: Via,
        value: &AddressValue,
    ) -> Result<RequestOutcome, VerificationError> {
        let now = self.clock.now();
        let candidate =
            VerifiableAddress::new(new_address_id(), identity.clone(), via, value.clone(), now);
        let upserted = self.store.upsert_address(&candidate)?;
        if let Upserted::Rebound { expired, .. } = &upserted {
            for challenge in expired {
                tracing::info!(
                    identity = %identity,
                    flow = %challenge.id,
                    "challenge expired by address change"
                );
            }
        }
        let address = upserted.into_address();
        if address.verified {
            return Ok(RequestOutcome::AlreadyVerified);
        }

        if let Some(active) = self.store.active_challenge_for(&address.id)? {
            if active.is_live(now) && active.address_value == address.value {
                tracing::info!(identity = %identity, flow = %active.id, "resending verification");
                self.dispatch_link(&active);
                return Ok(RequestOutcome::Resent(active.id));
            }
            tracing::debug!(flow = %active.id, "expiring elapsed challenge before reissue");
            self.store
                .expire_challenge(&active.id, ExpiredReason::Elapsed, now)?;
        }

        let flow_id = self.issue_locked(&address, now)?;
        Ok(RequestOutcome::Issued(flow_id))
    }

    fn issue_locked(
        &self,
        address: &VerifiableAddress,
        now: Timestamp,
    ) -> Result<FlowId, VerificationError> {
        let flow_id = new_flow_id();
        let secret = codec_for(address.via).issue(&flow_id);
        let challenge = Challenge::issue(
            flow_id,
            address,
            secret.token,
            secret.code,
            &self.params,
            now,
        );
        if let Some(superseded) = self.store.create_challenge(&challenge)? {
            tracing::debug!(flow = %superseded.id, "challenge superseded");
        }
        tracing::info!(
            identity = %address.identity_id,
            flow = %flow_id,
            expires_at = %challenge.expires_at,
            "verification challenge issued"
        );
        self.dispatch_link(&challenge);
        Ok(flow_id)
    }

    fn dispatch_link(&self, challenge: &Challenge) {
        match self.links.verification_url(&challenge.id, &challenge.token) {
            Ok(url) => self.dispatch(&MailTemplate::VerificationValid {
                to: challenge.address_value.clone(),
                verification_url: url.to_string(),
                code: challenge.code.clone(),
            }),
            Err(e) => tracing::warn!(flow = %challenge.id, "cannot build verification link: {e}"),
        }
    }

    /// Fire-and-forget. Failures are logged and left for a later resend.
    fn dispatch(&self, template: &MailTemplate) {
        if let Err(e) = self.mailer.send(template) {
            tracing::warn!(kind = template.kind(), error = %e, "mail dispatch failed");
        }
    }

    // ── Validating ───────────────────────────────────────────────────────

    /// Open a flow from its link.
    ///
    /// A wrong token answers exactly like an unknown flow. Never issues or
    /// completes anything; the code is still required.
    pub fn start_flow_from_link(
        &self,
        flow_id: &FlowId,
        token: &str,
    ) -> Result<FlowState, VerificationError> {
        let challenge = self
            .store
            .find_challenge(flow_id)?
            .ok_or(VerificationError::NotFound)?;
        if !codec_for(challenge.via).verify(&challenge.token, token) {
            return Err(VerificationError::NotFound);
        }

        let now = self.clock.now();
        match challenge.state {
            ChallengeState::Completed => {
                let address = address_of(self.store.as_ref(), &challenge)?;
                if challenge.vouches_for(&address) {
                    Ok(FlowState::from_challenge(&challenge, now))
                } else {
                    Err(self.expired_flow(&challenge))
                }
            }
            ChallengeState::Active if challenge.is_live(now) => {
                Ok(FlowState::from_challenge(&challenge, now))
            }
            ChallengeState::Active => Err(self
                .locks
                .with_slot(&challenge.identity_id, challenge.via, || {
                    self.expire_elapsed_locked(&challenge, now)
                })),
            ChallengeState::Expired => Err(self.expired_flow(&challenge)),
        }
    }

    /// Submit the code for a flow.
    pub fn submit_code(
        &self,
        flow_id: &FlowId,
        code: &str,
    ) -> Result<SubmitOutcome, VerificationError> {
        let challenge = self
            .store
            .find_challenge(flow_id)?
            .ok_or(VerificationError::NotFound)?;
        self.locks
            .with_slot(&challenge.identity_id, challenge.via, || {
                self.submit_locked(flow_id, code)
            })
    }

    fn submit_locked(
        &self,
        flow_id: &FlowId,
        code: &str,
    ) -> Result<SubmitOutcome, VerificationError> {
        let challenge = self
            .store
            .find_challenge(flow_id)?
            .ok_or(VerificationError::NotFound)?;
        let now = self.clock.now();
        let matches = codec_for(challenge.via).verify(&challenge.code, code);

        match challenge.state {
            ChallengeState::Expired => {
                if challenge.expired_reason == Some(ExpiredReason::AttemptsExhausted) {
                    Err(VerificationError::AttemptsExhausted)
                } else {
                    Err(self.expired_flow(&challenge))
                }
            }
            ChallengeState::Completed if !matches => Err(VerificationError::InvalidCode {
                attempts_remaining: challenge.attempts_remaining,
            }),
            ChallengeState::Active if !challenge.is_live(now) => {
                Err(self.expire_elapsed_locked(&challenge, now))
            }
            ChallengeState::Active if !matches => {
                match self.store.record_failed_attempt(flow_id, now)? {
                    FailedAttempt::Remaining(attempts_remaining) => {
                        tracing::debug!(flow = %flow_id, ?attempts_remaining, "invalid code");
                        Err(VerificationError::InvalidCode { attempts_remaining })
                    }
                    FailedAttempt::Exhausted => {
                        tracing::warn!(
                            identity = %challenge.identity_id,
                            flow = %flow_id,
                            "verification attempts exhausted"
                        );
                        Err(VerificationError::AttemptsExhausted)
                    }
                    FailedAttempt::NotActive(_) => Err(self.reload_expired(flow_id)),
                }
            }
            ChallengeState::Active | ChallengeState::Completed => {
                match self.store.complete_challenge(flow_id, now)? {
                    Completion::Completed(address) => {
                        tracing::info!(
                            identity = %address.identity_id,
                            flow = %flow_id,
                            "address verified"
                        );
                        Ok(SubmitOutcome::Verified(address))
                    }
                    Completion::AlreadyCompleted(address) => {
                        Ok(SubmitOutcome::AlreadyVerified(address))
                    }
                    Completion::Expired(expired) => Err(self.expired_flow(&expired)),
                }
            }
        }
    }

    /// Persist the expiry of an elapsed challenge and describe it. Caller
    /// holds the slot lock.
    fn expire_elapsed_locked(&self, challenge: &Challenge, now: Timestamp) -> VerificationError {
        tracing::debug!(flow = %challenge.id, "lazily expiring elapsed challenge");
        match self
            .store
            .expire_challenge(&challenge.id, ExpiredReason::Elapsed, now)
        {
            Ok(expired) => self.expired_flow(&expired),
            Err(e) => e.into(),
        }
    }

    fn reload_expired(&self, flow_id: &FlowId) -> VerificationError {
        match self.store.find_challenge(flow_id) {
            Ok(Some(challenge)) => self.expired_flow(&challenge),
            Ok(None) => VerificationError::NotFound,
            Err(e) => e.into(),
        }
    }

    fn expired_flow(&self, challenge: &Challenge) -> VerificationError {
        // A completed challenge only lands here once its slot was rebound.
        let reason = challenge
            .expired_reason
            .unwrap_or(ExpiredReason::AddressChanged);
        match ExpiredContext::load(self.store.as_ref(), challenge, reason) {
            Ok(context) => VerificationError::ExpiredFlow(Box::new(context)),
            Err(e) => e,
        }
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// Expire every active challenge whose lifetime ran out.
    ///
    /// Optional: expiry is also applied lazily whenever a flow is touched.
    pub fn sweep_expired(&self) -> Result<usize, VerificationError> {
        let now = self.clock.now();
        let mut expired = 0;
        for challenge in self.store.active_challenges()? {
            if challenge.is_live(now) {
                continue;
            }
            let record = self.locks.with_slot(&challenge.identity_id, challenge.via, || {
                self.store
                    .expire_challenge(&challenge.id, ExpiredReason::Elapsed, now)
            })?;
            if record.state == ChallengeState::Expired {
                expired += 1;
            }
        }
        self.locks.cleanup();
        if expired > 0 {
            tracing::info!(expired, "swept elapsed challenges");
        }
        Ok(expired)
    }

    // ── Reads ────────────────────────────────────────────────────────────

    pub fn address(
        &self,
        identity: &IdentityId,
        via: Via,
    ) -> Result<Option<VerifiableAddress>, VerificationError> {
        Ok(self.store.address_for_slot(identity, via)?)
    }

    pub fn addresses(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<VerifiableAddress>, VerificationError> {
        Ok(self.store.addresses_for_identity(identity)?)
    }

    /// Every challenge issued for an address, oldest first.
    pub fn history(&self, address: &AddressId) -> Result<Vec<Challenge>, VerificationError> {
        Ok(self.store.challenges_for_address(address)?)
    }

    /// The addresses an identity declares in its traits.
    pub fn declared_addresses(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<DeclaredAddress>, VerificationError> {
        let record = self
            .identities
            .get_identity(identity)?
            .ok_or_else(|| VerificationError::IdentityNotFound(identity.clone()))?;
        Ok(record.traits.addresses)
    }
}
