//! Nullable store: thread-safe in-memory storage for testing.
//!
//! Every mutating call runs inside one mutex section, so each is atomic the
//! same way an LMDB write transaction is.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use affirm_store::challenge::{apply_completion, apply_failed_attempt};
use affirm_store::{
    AddressStore, Challenge, ChallengeStore, Completion, FailedAttempt, MailTemplate,
    MessageStatus, MessageStore, QueuedMessage, StoreError, Upserted, VerifiableAddress,
};
use affirm_types::{AddressId, AddressValue, ExpiredReason, FlowId, IdentityId, Timestamp, Via};

#[derive(Default)]
struct State {
    addresses: HashMap<AddressId, VerifiableAddress>,
    slots: HashMap<(IdentityId, Via), AddressId>,
    challenges: HashMap<FlowId, Challenge>,
    /// Challenge ids in issue order.
    issued: Vec<FlowId>,
    active: HashMap<AddressId, FlowId>,
    messages: Vec<QueuedMessage>,
}

impl State {
    fn challenge(&self, id: &FlowId) -> Result<Challenge, StoreError> {
        self.challenges
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("challenge {id}")))
    }

    fn address_of(&self, challenge: &Challenge) -> Result<VerifiableAddress, StoreError> {
        self.addresses
            .get(&challenge.address_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::Corruption(format!(
                    "challenge {} references missing address {}",
                    challenge.id, challenge.address_id
                ))
            })
    }

    /// Write back a challenge and its address, dropping the active pointer
    /// once the challenge is terminal.
    fn put(&mut self, challenge: Challenge, address: VerifiableAddress) {
        if !challenge.is_active() && self.active.get(&address.id) == Some(&challenge.id) {
            self.active.remove(&address.id);
        }
        self.addresses.insert(address.id, address);
        self.challenges.insert(challenge.id, challenge);
    }

    /// Expire the active challenge of an address, if any.
    fn expire_active(&mut self, address: &AddressId, reason: ExpiredReason) -> Option<Challenge> {
        let id = self.active.remove(address)?;
        let challenge = self.challenges.get_mut(&id)?;
        challenge.expire(reason);
        Some(challenge.clone())
    }
}

/// An in-memory verification store and courier outbox for testing.
#[derive(Default)]
pub struct NullStore {
    state: Mutex<State>,
}

impl NullStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of challenges ever stored.
    pub fn challenge_count(&self) -> usize {
        self.state().challenges.len()
    }
}

impl AddressStore for NullStore {
    fn get_address(&self, id: &AddressId) -> Result<Option<VerifiableAddress>, StoreError> {
        Ok(self.state().addresses.get(id).cloned())
    }

    fn address_for_slot(
        &self,
        identity: &IdentityId,
        via: Via,
    ) -> Result<Option<VerifiableAddress>, StoreError> {
        let state = self.state();
        Ok(state
            .slots
            .get(&(identity.clone(), via))
            .and_then(|id| state.addresses.get(id))
            .cloned())
    }

    fn addresses_for_identity(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<VerifiableAddress>, StoreError> {
        let mut addresses: Vec<_> = self
            .state()
            .addresses
            .values()
            .filter(|a| &a.identity_id == identity)
            .cloned()
            .collect();
        addresses.sort_by_key(|a| a.via);
        Ok(addresses)
    }

    fn addresses_by_value(
        &self,
        via: Via,
        value: &AddressValue,
    ) -> Result<Vec<VerifiableAddress>, StoreError> {
        let mut addresses: Vec<_> = self
            .state()
            .addresses
            .values()
            .filter(|a| a.via == via && &a.value == value)
            .cloned()
            .collect();
        addresses.sort_by(|a, b| a.identity_id.cmp(&b.identity_id));
        Ok(addresses)
    }

    fn upsert_address(&self, candidate: &VerifiableAddress) -> Result<Upserted, StoreError> {
        let mut state = self.state();
        let slot = (candidate.identity_id.clone(), candidate.via);
        let Some(id) = state.slots.get(&slot).copied() else {
            state.slots.insert(slot, candidate.id);
            state.addresses.insert(candidate.id, candidate.clone());
            return Ok(Upserted::Created(candidate.clone()));
        };

        let mut address = state
            .addresses
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::Corruption(format!("slot points at missing address {id}")))?;
        if address.value == candidate.value {
            return Ok(Upserted::Unchanged(address));
        }

        let expired = state
            .expire_active(&id, ExpiredReason::AddressChanged)
            .into_iter()
            .collect();
        address.rebind(candidate.value.clone(), candidate.updated_at);
        state.addresses.insert(id, address.clone());
        Ok(Upserted::Rebound { address, expired })
    }
}

impl ChallengeStore for NullStore {
    fn create_challenge(&self, challenge: &Challenge) -> Result<Option<Challenge>, StoreError> {
        let mut state = self.state();
        if state.challenges.contains_key(&challenge.id) {
            return Err(StoreError::Duplicate(format!("challenge {}", challenge.id)));
        }
        let mut address = state.address_of(challenge)?;

        let superseded = state.expire_active(&address.id, ExpiredReason::Superseded);
        address.mark_pending(challenge.issued_at);

        state.active.insert(address.id, challenge.id);
        state.issued.push(challenge.id);
        state.addresses.insert(address.id, address);
        state.challenges.insert(challenge.id, challenge.clone());
        Ok(superseded)
    }

    fn find_challenge(&self, id: &FlowId) -> Result<Option<Challenge>, StoreError> {
        Ok(self.state().challenges.get(id).cloned())
    }

    fn active_challenge_for(&self, address: &AddressId) -> Result<Option<Challenge>, StoreError> {
        let state = self.state();
        Ok(state
            .active
            .get(address)
            .and_then(|id| state.challenges.get(id))
            .cloned())
    }

    fn challenges_for_address(&self, address: &AddressId) -> Result<Vec<Challenge>, StoreError> {
        let state = self.state();
        Ok(state
            .issued
            .iter()
            .filter_map(|id| state.challenges.get(id))
            .filter(|c| &c.address_id == address)
            .cloned()
            .collect())
    }

    fn active_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        let state = self.state();
        Ok(state
            .issued
            .iter()
            .filter_map(|id| state.challenges.get(id))
            .filter(|c| c.is_active())
            .cloned()
            .collect())
    }

    fn complete_challenge(&self, id: &FlowId, now: Timestamp) -> Result<Completion, StoreError> {
        let mut state = self.state();
        let mut challenge = state.challenge(id)?;
        let mut address = state.address_of(&challenge)?;
        let completion = apply_completion(&mut challenge, &mut address, now);
        state.put(challenge, address);
        Ok(completion)
    }

    fn record_failed_attempt(
        &self,
        id: &FlowId,
        now: Timestamp,
    ) -> Result<FailedAttempt, StoreError> {
        let mut state = self.state();
        let mut challenge = state.challenge(id)?;
        let mut address = state.address_of(&challenge)?;
        let outcome = apply_failed_attempt(&mut challenge, &mut address, now);
        state.put(challenge, address);
        Ok(outcome)
    }

    fn expire_challenge(
        &self,
        id: &FlowId,
        reason: ExpiredReason,
        now: Timestamp,
    ) -> Result<Challenge, StoreError> {
        let mut state = self.state();
        let mut challenge = state.challenge(id)?;
        let mut address = state.address_of(&challenge)?;
        if challenge.expire(reason) && reason != ExpiredReason::Superseded {
            address.mark_attempt_expired(&challenge, now);
        }
        state.put(challenge.clone(), address);
        Ok(challenge)
    }
}

impl MessageStore for NullStore {
    fn enqueue(
        &self,
        template: &MailTemplate,
        now: Timestamp,
    ) -> Result<QueuedMessage, StoreError> {
        let mut state = self.state();
        let message = QueuedMessage {
            id: state.messages.len() as u64 + 1,
            template: template.clone(),
            status: MessageStatus::Queued,
            created_at: now,
        };
        state.messages.push(message.clone());
        Ok(message)
    }

    fn messages(&self, status: Option<MessageStatus>) -> Result<Vec<QueuedMessage>, StoreError> {
        Ok(self
            .state()
            .messages
            .iter()
            .filter(|m| status.map_or(true, |s| m.status == s))
            .cloned()
            .collect())
    }

    fn mark_sent(&self, id: u64) -> Result<(), StoreError> {
        let mut state = self.state();
        let message = state
            .messages
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("message {id}")))?;
        message.status = MessageStatus::Sent;
        Ok(())
    }
}
