//! Verifiable address records and their storage trait.

use crate::challenge::Challenge;
use crate::StoreError;
use affirm_types::{AddressId, AddressStatus, AddressValue, IdentityId, Timestamp, Via};
use serde::{Deserialize, Serialize};

/// A contact address that needs proof of control before it is trusted.
///
/// An identity holds at most one record per channel (its "slot"). Editing the
/// declared value rebinds the slot rather than creating a second record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiableAddress {
    pub id: AddressId,
    pub identity_id: IdentityId,
    pub via: Via,
    pub value: AddressValue,
    pub status: AddressStatus,
    /// True only after a challenge for the current `value` completed.
    pub verified: bool,
    /// First successful verification. Survives later edits.
    pub verified_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl VerifiableAddress {
    /// A fresh, unverified address record.
    pub fn new(
        id: AddressId,
        identity_id: IdentityId,
        via: Via,
        value: AddressValue,
        now: Timestamp,
    ) -> Self {
        Self {
            id,
            identity_id,
            via,
            value,
            status: AddressStatus::Unverified,
            verified: false,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Point the slot at a new value. Trust never carries over.
    pub fn rebind(&mut self, value: AddressValue, now: Timestamp) {
        self.value = value;
        self.verified = false;
        self.status = AddressStatus::Unverified;
        self.updated_at = now;
    }

    /// Record that a challenge for the current value was issued.
    pub fn mark_pending(&mut self, now: Timestamp) {
        if !self.verified {
            self.status = AddressStatus::Pending;
        }
        self.updated_at = now;
    }

    /// Record that the challenge for the current value can no longer complete.
    ///
    /// A no-op for verified addresses and for challenges issued against an
    /// earlier value of the slot.
    pub fn mark_attempt_expired(&mut self, challenge: &Challenge, now: Timestamp) {
        if self.verified || challenge.address_value != self.value {
            return;
        }
        self.status = AddressStatus::ExpiredAttempt;
        self.updated_at = now;
    }

    /// Record a successful challenge completion.
    pub fn mark_verified(&mut self, now: Timestamp) {
        self.verified = true;
        self.status = AddressStatus::Completed;
        self.verified_at.get_or_insert(now);
        self.updated_at = now;
    }
}

/// Result of [`AddressStore::upsert_address`].
#[derive(Clone, Debug)]
pub enum Upserted {
    /// The slot was empty; the candidate was stored.
    Created(VerifiableAddress),
    /// The slot already held this value.
    Unchanged(VerifiableAddress),
    /// The slot held a different value and now points at the new one.
    /// `expired` lists the challenges that were active for the old value.
    Rebound {
        address: VerifiableAddress,
        expired: Vec<Challenge>,
    },
}

impl Upserted {
    pub fn address(&self) -> &VerifiableAddress {
        match self {
            Self::Created(a) | Self::Unchanged(a) => a,
            Self::Rebound { address, .. } => address,
        }
    }

    pub fn into_address(self) -> VerifiableAddress {
        match self {
            Self::Created(a) | Self::Unchanged(a) => a,
            Self::Rebound { address, .. } => address,
        }
    }
}

/// Trait for verifiable address storage.
pub trait AddressStore: Send + Sync {
    fn get_address(&self, id: &AddressId) -> Result<Option<VerifiableAddress>, StoreError>;

    /// The record occupying an identity's slot for a channel.
    fn address_for_slot(
        &self,
        identity: &IdentityId,
        via: Via,
    ) -> Result<Option<VerifiableAddress>, StoreError>;

    fn addresses_for_identity(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<VerifiableAddress>, StoreError>;

    /// Every record currently bound to `value` on the given channel, across identities.
    fn addresses_by_value(
        &self,
        via: Via,
        value: &AddressValue,
    ) -> Result<Vec<VerifiableAddress>, StoreError>;

    /// Store `candidate` in its slot, or rebind the slot's existing record.
    ///
    /// When the slot holds a different value the existing record keeps its id,
    /// takes the candidate's value, loses `verified`, returns to `unverified`,
    /// and every active challenge for it expires as `address-changed`. All of
    /// this commits as one atomic write.
    fn upsert_address(&self, candidate: &VerifiableAddress) -> Result<Upserted, StoreError>;
}
