//! LMDB implementation of AddressStore, plus the transaction helpers shared
//! with the challenge half of the store.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, RoTxn, RwTxn};

use affirm_store::{AddressStore, Challenge, StoreError, Upserted, VerifiableAddress};
use affirm_types::{AddressId, AddressValue, ExpiredReason, FlowId, IdentityId, Via};

use crate::layout::{
    address_id, decode, encode, flow_id, identity_prefix, scan_prefix, slot_key, value_key,
    value_prefix,
};
use crate::LmdbError;

/// Address and challenge storage.
///
/// Both record kinds live behind one handle because challenge creation,
/// completion and slot rebinding change records of both kinds in the same
/// write transaction.
pub struct LmdbVerificationStore {
    pub(crate) env: Arc<Env>,
    pub(crate) addresses_db: Database<Bytes, Bytes>,
    pub(crate) slots_db: Database<Bytes, Bytes>,
    pub(crate) value_index_db: Database<Bytes, Bytes>,
    pub(crate) challenges_db: Database<Bytes, Bytes>,
    pub(crate) active_db: Database<Bytes, Bytes>,
    pub(crate) history_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbVerificationStore {
    pub(crate) fn read_address(
        &self,
        txn: &RoTxn,
        id: &AddressId,
    ) -> Result<Option<VerifiableAddress>, LmdbError> {
        self.addresses_db
            .get(txn, id.as_bytes())?
            .map(decode)
            .transpose()
    }

    /// The address a challenge belongs to. Missing means corruption.
    pub(crate) fn address_of(
        &self,
        txn: &RoTxn,
        challenge: &Challenge,
    ) -> Result<VerifiableAddress, LmdbError> {
        self.read_address(txn, &challenge.address_id)?.ok_or_else(|| {
            LmdbError::Corruption(format!(
                "challenge {} references missing address {}",
                challenge.id, challenge.address_id
            ))
        })
    }

    /// Write an address record and keep the slot and value indexes in step.
    ///
    /// `previous` is the value the record was indexed under, if any.
    pub(crate) fn write_address(
        &self,
        txn: &mut RwTxn,
        address: &VerifiableAddress,
        previous: Option<&AddressValue>,
    ) -> Result<(), LmdbError> {
        let id = address.id.as_bytes();
        self.addresses_db.put(txn, id, &encode(address)?)?;
        self.slots_db
            .put(txn, &slot_key(&address.identity_id, address.via), id)?;
        if let Some(old) = previous.filter(|old| *old != &address.value) {
            self.value_index_db
                .delete(txn, &value_key(address.via, old, &address.id))?;
        }
        self.value_index_db
            .put(txn, &value_key(address.via, &address.value, &address.id), id)?;
        Ok(())
    }

    pub(crate) fn read_challenge(
        &self,
        txn: &RoTxn,
        id: &FlowId,
    ) -> Result<Option<Challenge>, LmdbError> {
        self.challenges_db
            .get(txn, id.as_bytes())?
            .map(decode)
            .transpose()
    }

    /// Write a challenge record, dropping the active pointer once it is terminal.
    pub(crate) fn write_challenge(
        &self,
        txn: &mut RwTxn,
        challenge: &Challenge,
    ) -> Result<(), LmdbError> {
        self.challenges_db
            .put(txn, challenge.id.as_bytes(), &encode(challenge)?)?;
        let key = challenge.address_id.as_bytes();
        if challenge.is_active() {
            self.active_db.put(txn, key, challenge.id.as_bytes())?;
        } else if self.active_db.get(txn, key)? == Some(challenge.id.as_bytes().as_slice()) {
            self.active_db.delete(txn, key)?;
        }
        Ok(())
    }

    pub(crate) fn read_active(
        &self,
        txn: &RoTxn,
        address: &AddressId,
    ) -> Result<Option<Challenge>, LmdbError> {
        let Some(flow) = self.active_db.get(txn, address.as_bytes())? else {
            return Ok(None);
        };
        let flow = flow_id(flow)?;
        self.read_challenge(txn, &flow)?
            .map(Some)
            .ok_or_else(|| LmdbError::Corruption(format!("active pointer to missing {flow}")))
    }

    /// Expire the active challenge of an address, if any.
    pub(crate) fn expire_active(
        &self,
        txn: &mut RwTxn,
        address: &AddressId,
        reason: ExpiredReason,
    ) -> Result<Option<Challenge>, LmdbError> {
        let Some(mut challenge) = self.read_active(txn, address)? else {
            return Ok(None);
        };
        challenge.expire(reason);
        self.write_challenge(txn, &challenge)?;
        Ok(Some(challenge))
    }

    fn addresses_at(
        &self,
        txn: &RoTxn,
        index: &Database<Bytes, Bytes>,
        prefix: &[u8],
    ) -> Result<Vec<VerifiableAddress>, LmdbError> {
        scan_prefix(index, txn, prefix)?
            .into_iter()
            .map(|raw| {
                let id = address_id(raw)?;
                self.read_address(txn, &id)?
                    .ok_or_else(|| LmdbError::Corruption(format!("index points at missing {id}")))
            })
            .collect()
    }
}

impl AddressStore for LmdbVerificationStore {
    fn get_address(&self, id: &AddressId) -> Result<Option<VerifiableAddress>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.read_address(&rtxn, id)?)
    }

    fn address_for_slot(
        &self,
        identity: &IdentityId,
        via: Via,
    ) -> Result<Option<VerifiableAddress>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let Some(raw) = self
            .slots_db
            .get(&rtxn, &slot_key(identity, via))
            .map_err(LmdbError::from)?
        else {
            return Ok(None);
        };
        let id = address_id(raw)?;
        Ok(self.read_address(&rtxn, &id)?)
    }

    fn addresses_for_identity(
        &self,
        identity: &IdentityId,
    ) -> Result<Vec<VerifiableAddress>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.addresses_at(&rtxn, &self.slots_db, &identity_prefix(identity))?)
    }

    fn addresses_by_value(
        &self,
        via: Via,
        value: &AddressValue,
    ) -> Result<Vec<VerifiableAddress>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.addresses_at(&rtxn, &self.value_index_db, &value_prefix(via, value))?)
    }

    fn upsert_address(&self, candidate: &VerifiableAddress) -> Result<Upserted, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let slot = slot_key(&candidate.identity_id, candidate.via);
        let existing = match self.slots_db.get(&wtxn, &slot).map_err(LmdbError::from)? {
            Some(raw) => Some(address_id(raw)?),
            None => None,
        };

        let upserted = match existing {
            None => {
                self.write_address(&mut wtxn, candidate, None)?;
                Upserted::Created(candidate.clone())
            }
            Some(id) => {
                let mut address = self.read_address(&wtxn, &id)?.ok_or_else(|| {
                    LmdbError::Corruption(format!("slot points at missing address {id}"))
                })?;
                if address.value == candidate.value {
                    return Ok(Upserted::Unchanged(address));
                }
                let expired = self
                    .expire_active(&mut wtxn, &id, ExpiredReason::AddressChanged)?
                    .into_iter()
                    .collect();
                let previous = address.value.clone();
                address.rebind(candidate.value.clone(), candidate.updated_at);
                self.write_address(&mut wtxn, &address, Some(&previous))?;
                Upserted::Rebound { address, expired }
            }
        };
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(upserted)
    }
}
