//! Verification challenge records, their storage trait, and the transition
//! rules every backend applies.

use crate::address::VerifiableAddress;
use crate::StoreError;
use affirm_types::{
    AddressId, AddressValue, ChallengeState, ExpiredReason, FlowId, IdentityId, Timestamp, Via,
    VerificationParams,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single issued, time-bounded proof-of-control attempt.
///
/// The challenge id doubles as the flow id. Records are never deleted.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub id: FlowId,
    pub address_id: AddressId,
    pub identity_id: IdentityId,
    pub via: Via,
    /// The address value this challenge proves control of.
    pub address_value: AddressValue,
    /// Routing secret embedded in the link.
    pub token: String,
    /// Authorizing secret compared on submission.
    pub code: String,
    pub issued_at: Timestamp,
    /// End of the token/code lifetime.
    pub expires_at: Timestamp,
    /// End of the browser-facing flow, tracked separately from the token.
    pub flow_expires_at: Timestamp,
    pub state: ChallengeState,
    pub expired_reason: Option<ExpiredReason>,
    /// `None` when wrong codes are not bounded.
    pub attempts_remaining: Option<u32>,
    pub completed_at: Option<Timestamp>,
}

impl Challenge {
    /// Build an active challenge for `address`, with lifetimes from `params`.
    pub fn issue(
        id: FlowId,
        address: &VerifiableAddress,
        token: String,
        code: String,
        params: &VerificationParams,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            address_id: address.id,
            identity_id: address.identity_id.clone(),
            via: address.via,
            address_value: address.value.clone(),
            token,
            code,
            issued_at: now,
            expires_at: now.plus_secs(params.challenge_lifespan_secs),
            flow_expires_at: now.plus_secs(params.flow_lifespan_secs),
            state: ChallengeState::Active,
            expired_reason: None,
            attempts_remaining: params.max_attempts,
            completed_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == ChallengeState::Active
    }

    /// Whether the token lifetime has run out.
    pub fn token_elapsed(&self, now: Timestamp) -> bool {
        self.expires_at.is_reached(now)
    }

    /// Whether the flow lifetime has run out.
    pub fn flow_elapsed(&self, now: Timestamp) -> bool {
        self.flow_expires_at.is_reached(now)
    }

    /// Active and neither lifetime has run out.
    pub fn is_live(&self, now: Timestamp) -> bool {
        self.is_active() && !self.token_elapsed(now) && !self.flow_elapsed(now)
    }

    /// Whether this challenge is expired, either recorded or by the clock.
    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        match self.state {
            ChallengeState::Expired => true,
            ChallengeState::Active => !self.is_live(now),
            ChallengeState::Completed => false,
        }
    }

    /// Whether this completed challenge still vouches for `address`.
    ///
    /// False once the slot was rebound, even if the value was later edited
    /// back: a rebind drops trust and only a fresh challenge restores it.
    pub fn vouches_for(&self, address: &VerifiableAddress) -> bool {
        self.state == ChallengeState::Completed
            && self.address_id == address.id
            && self.address_value == address.value
            && address.verified
    }

    /// Move an active challenge to `Expired`. Terminal challenges are untouched.
    ///
    /// Returns whether the state changed.
    pub fn expire(&mut self, reason: ExpiredReason) -> bool {
        if !self.is_active() {
            return false;
        }
        self.state = ChallengeState::Expired;
        self.expired_reason = Some(reason);
        true
    }
}

impl fmt::Debug for Challenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Challenge")
            .field("id", &self.id)
            .field("address_id", &self.address_id)
            .field("identity_id", &self.identity_id)
            .field("address_value", &self.address_value)
            .field("state", &self.state)
            .field("expired_reason", &self.expired_reason)
            .field("expires_at", &self.expires_at)
            .field("flow_expires_at", &self.flow_expires_at)
            .field("attempts_remaining", &self.attempts_remaining)
            .finish_non_exhaustive()
    }
}

/// Result of [`ChallengeStore::complete_challenge`].
#[derive(Clone, Debug)]
pub enum Completion {
    /// The challenge completed now; the address is verified.
    Completed(VerifiableAddress),
    /// The challenge had already completed for the address's current value.
    AlreadyCompleted(VerifiableAddress),
    /// The challenge cannot complete: elapsed, superseded, exhausted, or its
    /// address value has since changed. A completed challenge whose slot was
    /// rebound comes back unchanged, with no `expired_reason`.
    Expired(Challenge),
}

/// Result of [`ChallengeStore::record_failed_attempt`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailedAttempt {
    /// The challenge stays active. `None` when attempts are unbounded.
    Remaining(Option<u32>),
    /// That was the last allowed attempt; the challenge is now expired.
    Exhausted,
    /// The challenge was not active to begin with.
    NotActive(ChallengeState),
}

/// Apply a completion to a challenge and its address.
///
/// The caller persists both records afterwards within the same atomic write.
pub fn apply_completion(
    challenge: &mut Challenge,
    address: &mut VerifiableAddress,
    now: Timestamp,
) -> Completion {
    match challenge.state {
        ChallengeState::Completed if challenge.vouches_for(address) => {
            Completion::AlreadyCompleted(address.clone())
        }
        ChallengeState::Completed | ChallengeState::Expired => {
            Completion::Expired(challenge.clone())
        }
        ChallengeState::Active => {
            if challenge.token_elapsed(now) || challenge.flow_elapsed(now) {
                challenge.expire(ExpiredReason::Elapsed);
                address.mark_attempt_expired(challenge, now);
                return Completion::Expired(challenge.clone());
            }
            if challenge.address_id != address.id || challenge.address_value != address.value {
                challenge.expire(ExpiredReason::AddressChanged);
                return Completion::Expired(challenge.clone());
            }
            challenge.state = ChallengeState::Completed;
            challenge.completed_at = Some(now);
            address.mark_verified(now);
            Completion::Completed(address.clone())
        }
    }
}

/// Apply a wrong-code submission to a challenge and its address.
pub fn apply_failed_attempt(
    challenge: &mut Challenge,
    address: &mut VerifiableAddress,
    now: Timestamp,
) -> FailedAttempt {
    if !challenge.is_active() {
        return FailedAttempt::NotActive(challenge.state);
    }
    match challenge.attempts_remaining {
        None => FailedAttempt::Remaining(None),
        Some(remaining) => {
            let remaining = remaining.saturating_sub(1);
            challenge.attempts_remaining = Some(remaining);
            if remaining == 0 {
                challenge.expire(ExpiredReason::AttemptsExhausted);
                address.mark_attempt_expired(challenge, now);
                FailedAttempt::Exhausted
            } else {
                FailedAttempt::Remaining(Some(remaining))
            }
        }
    }
}

/// Trait for challenge storage.
pub trait ChallengeStore: Send + Sync {
    /// Insert a new active challenge.
    ///
    /// Atomically expires any challenge still active for the same address
    /// (reason `superseded`), inserts `challenge`, and marks the address
    /// pending. Returns the superseded challenge, if there was one.
    fn create_challenge(&self, challenge: &Challenge) -> Result<Option<Challenge>, StoreError>;

    fn find_challenge(&self, id: &FlowId) -> Result<Option<Challenge>, StoreError>;

    /// The challenge currently marked active for an address.
    ///
    /// Lazily elapsed challenges are still returned; check
    /// [`Challenge::is_live`].
    fn active_challenge_for(&self, address: &AddressId) -> Result<Option<Challenge>, StoreError>;

    /// Every challenge ever issued for an address, oldest first.
    fn challenges_for_address(&self, address: &AddressId) -> Result<Vec<Challenge>, StoreError>;

    /// Every challenge still marked active.
    fn active_challenges(&self) -> Result<Vec<Challenge>, StoreError>;

    /// Complete a challenge and verify its address in one atomic write.
    ///
    /// Idempotent for already completed challenges.
    fn complete_challenge(&self, id: &FlowId, now: Timestamp) -> Result<Completion, StoreError>;

    /// Count a wrong-code submission against the challenge's attempt bound.
    fn record_failed_attempt(&self, id: &FlowId, now: Timestamp)
        -> Result<FailedAttempt, StoreError>;

    /// Expire a challenge if it is still active and return its current record.
    fn expire_challenge(
        &self,
        id: &FlowId,
        reason: ExpiredReason,
        now: Timestamp,
    ) -> Result<Challenge, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use affirm_types::AddressStatus;

    fn address() -> VerifiableAddress {
        VerifiableAddress::new(
            AddressId::new([1; 16]),
            IdentityId::new("alice").unwrap(),
            Via::Email,
            AddressValue::parse(Via::Email, "alice@example.com").unwrap(),
            Timestamp::new(1_000),
        )
    }

    fn challenge(address: &VerifiableAddress, params: &VerificationParams) -> Challenge {
        Challenge::issue(
            FlowId::new([2; 16]),
            address,
            "secret-token".into(),
            "secret-code".into(),
            params,
            Timestamp::new(1_000),
        )
    }

    #[test]
    fn completion_verifies_once() {
        let params = VerificationParams::default();
        let mut address = address();
        let mut challenge = challenge(&address, &params);

        let first = apply_completion(&mut challenge, &mut address, Timestamp::new(1_010));
        assert!(matches!(first, Completion::Completed(_)));
        assert_eq!(address.verified_at, Some(Timestamp::new(1_010)));

        let second = apply_completion(&mut challenge, &mut address, Timestamp::new(1_020));
        assert!(matches!(second, Completion::AlreadyCompleted(_)));
        assert_eq!(address.verified_at, Some(Timestamp::new(1_010)));
    }

    #[test]
    fn completion_after_lifespan_expires() {
        let params = VerificationParams::default();
        let mut address = address();
        let mut challenge = challenge(&address, &params);
        let late = Timestamp::new(1_000 + params.challenge_lifespan_secs);

        let outcome = apply_completion(&mut challenge, &mut address, late);
        assert!(matches!(outcome, Completion::Expired(_)));
        assert_eq!(challenge.expired_reason, Some(ExpiredReason::Elapsed));
        assert!(!address.verified);
        assert_eq!(address.status, AddressStatus::ExpiredAttempt);
    }

    #[test]
    fn flow_lifespan_is_checked_independently() {
        let params = VerificationParams {
            challenge_lifespan_secs: 3_600,
            flow_lifespan_secs: 60,
            max_attempts: None,
        };
        let address = address();
        let challenge = challenge(&address, &params);
        let now = Timestamp::new(1_100);
        assert!(!challenge.token_elapsed(now));
        assert!(challenge.flow_elapsed(now));
        assert!(!challenge.is_live(now));
    }

    #[test]
    fn completion_refuses_rebound_address() {
        let params = VerificationParams::default();
        let mut address = address();
        let mut challenge = challenge(&address, &params);
        address.rebind(
            AddressValue::parse(Via::Email, "not-alice@example.com").unwrap(),
            Timestamp::new(1_005),
        );

        let outcome = apply_completion(&mut challenge, &mut address, Timestamp::new(1_010));
        assert!(matches!(outcome, Completion::Expired(_)));
        assert_eq!(challenge.expired_reason, Some(ExpiredReason::AddressChanged));
        assert!(!address.verified);
    }

    #[test]
    fn completed_challenge_does_not_survive_edit_and_revert() {
        let params = VerificationParams::default();
        let mut address = address();
        let mut challenge = challenge(&address, &params);
        let original = address.value.clone();
        apply_completion(&mut challenge, &mut address, Timestamp::new(1_010));
        assert!(challenge.vouches_for(&address));

        address.rebind(
            AddressValue::parse(Via::Email, "not-alice@example.com").unwrap(),
            Timestamp::new(1_020),
        );
        address.rebind(original, Timestamp::new(1_030));
        assert!(!challenge.vouches_for(&address));

        let outcome = apply_completion(&mut challenge, &mut address, Timestamp::new(1_040));
        assert!(matches!(outcome, Completion::Expired(_)));
        assert!(!address.verified);
        assert_eq!(address.status, AddressStatus::Unverified);
    }

    #[test]
    fn failed_attempts_exhaust_bound() {
        let params = VerificationParams {
            max_attempts: Some(2),
            ..VerificationParams::default()
        };
        let mut address = address();
        let mut challenge = challenge(&address, &params);
        let now = Timestamp::new(1_001);

        assert_eq!(
            apply_failed_attempt(&mut challenge, &mut address, now),
            FailedAttempt::Remaining(Some(1))
        );
        assert_eq!(
            apply_failed_attempt(&mut challenge, &mut address, now),
            FailedAttempt::Exhausted
        );
        assert_eq!(challenge.state, ChallengeState::Expired);
        assert_eq!(address.status, AddressStatus::ExpiredAttempt);
        assert_eq!(
            apply_failed_attempt(&mut challenge, &mut address, now),
            FailedAttempt::NotActive(ChallengeState::Expired)
        );
    }

    #[test]
    fn unbounded_attempts_never_exhaust() {
        let params = VerificationParams {
            max_attempts: None,
            ..VerificationParams::default()
        };
        let mut address = address();
        let mut challenge = challenge(&address, &params);
        for _ in 0..20 {
            assert_eq!(
                apply_failed_attempt(&mut challenge, &mut address, Timestamp::new(1_001)),
                FailedAttempt::Remaining(None)
            );
        }
        assert!(challenge.is_active());
    }

    #[test]
    fn debug_does_not_leak_secrets() {
        let params = VerificationParams::default();
        let rendered = format!("{:?}", challenge(&address(), &params));
        assert!(!rendered.contains("secret-"));
    }
}
