//! LMDB implementation of ChallengeStore.
//!
//! Challenges are never deleted. The issue history of an address is the
//! prefix range-scan `address_id ++ seq` over the history database; the
//! currently active challenge is a direct pointer.

use heed::RwTxn;

use affirm_store::challenge::{apply_completion, apply_failed_attempt};
use affirm_store::{
    Challenge, ChallengeStore, Completion, FailedAttempt, StoreError, VerifiableAddress,
};
use affirm_types::{AddressId, ExpiredReason, FlowId, Timestamp};

use crate::address::LmdbVerificationStore;
use crate::layout::{flow_id, history_key, scan_prefix};
use crate::LmdbError;

const CHALLENGE_SEQ_KEY: &[u8] = b"challenge_seq";

impl LmdbVerificationStore {
    fn next_challenge_seq(&self, txn: &mut RwTxn) -> Result<u64, LmdbError> {
        let current = match self.meta_db.get(txn, CHALLENGE_SEQ_KEY)? {
            Some(bytes) => u64::from_be_bytes(bytes.try_into().map_err(|_| {
                LmdbError::Corruption("challenge_seq has unexpected byte length".to_string())
            })?),
            None => 0,
        };
        let next = current + 1;
        self.meta_db
            .put(txn, CHALLENGE_SEQ_KEY, &next.to_be_bytes())?;
        Ok(next)
    }

    /// Load a challenge and its address, apply `f`, and write both back in
    /// one transaction.
    fn update_challenge<R>(
        &self,
        id: &FlowId,
        f: impl FnOnce(&mut Challenge, &mut VerifiableAddress) -> R,
    ) -> Result<(R, Challenge), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut challenge = self
            .read_challenge(&wtxn, id)?
            .ok_or_else(|| LmdbError::NotFound(format!("challenge {id}")))?;
        let mut address = self.address_of(&wtxn, &challenge)?;
        let before = address.clone();

        let outcome = f(&mut challenge, &mut address);

        self.write_challenge(&mut wtxn, &challenge)?;
        if address != before {
            self.write_address(&mut wtxn, &address, Some(&before.value))?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok((outcome, challenge))
    }
}

impl ChallengeStore for LmdbVerificationStore {
    fn create_challenge(&self, challenge: &Challenge) -> Result<Option<Challenge>, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        if self.read_challenge(&wtxn, &challenge.id)?.is_some() {
            return Err(StoreError::Duplicate(format!("challenge {}", challenge.id)));
        }
        let mut address = self.address_of(&wtxn, challenge)?;

        let superseded =
            self.expire_active(&mut wtxn, &address.id, ExpiredReason::Superseded)?;
        address.mark_pending(challenge.issued_at);

        let seq = self.next_challenge_seq(&mut wtxn)?;
        self.history_db
            .put(&mut wtxn, &history_key(&address.id, seq), challenge.id.as_bytes())
            .map_err(LmdbError::from)?;
        self.write_challenge(&mut wtxn, challenge)?;
        self.write_address(&mut wtxn, &address, Some(&address.value))?;
        wtxn.commit().map_err(LmdbError::from)?;

        if let Some(old) = &superseded {
            tracing::trace!(old = %old.id, new = %challenge.id, "superseded challenge");
        }
        Ok(superseded)
    }

    fn find_challenge(&self, id: &FlowId) -> Result<Option<Challenge>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.read_challenge(&rtxn, id)?)
    }

    fn active_challenge_for(&self, address: &AddressId) -> Result<Option<Challenge>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.read_active(&rtxn, address)?)
    }

    fn challenges_for_address(&self, address: &AddressId) -> Result<Vec<Challenge>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut challenges = Vec::new();
        for raw in scan_prefix(&self.history_db, &rtxn, address.as_bytes())? {
            let id = flow_id(raw)?;
            let challenge = self.read_challenge(&rtxn, &id)?.ok_or_else(|| {
                LmdbError::Corruption(format!("history points at missing challenge {id}"))
            })?;
            challenges.push(challenge);
        }
        Ok(challenges)
    }

    fn active_challenges(&self) -> Result<Vec<Challenge>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut challenges = Vec::new();
        for entry in self.active_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_address, raw) = entry.map_err(LmdbError::from)?;
            let id = flow_id(raw)?;
            if let Some(challenge) = self.read_challenge(&rtxn, &id)? {
                challenges.push(challenge);
            }
        }
        challenges.sort_by_key(|c| c.issued_at);
        Ok(challenges)
    }

    fn complete_challenge(&self, id: &FlowId, now: Timestamp) -> Result<Completion, StoreError> {
        let (completion, _) = self.update_challenge(id, |challenge, address| {
            apply_completion(challenge, address, now)
        })?;
        Ok(completion)
    }

    fn record_failed_attempt(
        &self,
        id: &FlowId,
        now: Timestamp,
    ) -> Result<FailedAttempt, StoreError> {
        let (outcome, _) = self.update_challenge(id, |challenge, address| {
            apply_failed_attempt(challenge, address, now)
        })?;
        Ok(outcome)
    }

    fn expire_challenge(
        &self,
        id: &FlowId,
        reason: ExpiredReason,
        now: Timestamp,
    ) -> Result<Challenge, StoreError> {
        let ((), challenge) = self.update_challenge(id, |challenge, address| {
            if challenge.expire(reason) && reason != ExpiredReason::Superseded {
                address.mark_attempt_expired(challenge, now);
            }
        })?;
        Ok(challenge)
    }
}
