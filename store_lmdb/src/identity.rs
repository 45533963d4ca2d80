//! LMDB implementation of IdentityStore.
//!
//! The daemon keeps its own identity records; embedders usually bring their
//! identity system and only use the verification store.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use affirm_store::{IdentityStore, StoreError};
use affirm_types::{Identity, IdentityId, Traits};

use crate::layout::{decode, encode};
use crate::LmdbError;

pub struct LmdbIdentityStore {
    pub(crate) env: Arc<Env>,
    pub(crate) identities_db: Database<Bytes, Bytes>,
}

impl LmdbIdentityStore {
    /// Insert a new identity. Fails with [`StoreError::Duplicate`] if the id
    /// is taken.
    pub fn create_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let key = identity.id.as_bytes();
        if self
            .identities_db
            .get(&wtxn, key)
            .map_err(LmdbError::from)?
            .is_some()
        {
            return Err(StoreError::Duplicate(format!("identity {}", identity.id)));
        }
        self.identities_db
            .put(&mut wtxn, key, &encode(identity)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    pub fn identity_count(&self) -> Result<u64, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        Ok(self.identities_db.len(&rtxn).map_err(LmdbError::from)?)
    }
}

impl IdentityStore for LmdbIdentityStore {
    fn get_identity(&self, id: &IdentityId) -> Result<Option<Identity>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let identity = self
            .identities_db
            .get(&rtxn, id.as_bytes())
            .map_err(LmdbError::from)?
            .map(decode)
            .transpose()?;
        Ok(identity)
    }

    fn update_traits(&self, id: &IdentityId, traits: &Traits) -> Result<(), StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut identity: Identity = self
            .identities_db
            .get(&wtxn, id.as_bytes())
            .map_err(LmdbError::from)?
            .map(decode)
            .transpose()?
            .ok_or_else(|| LmdbError::NotFound(format!("identity {id}")))?;
        identity.traits = traits.clone();
        self.identities_db
            .put(&mut wtxn, id.as_bytes(), &encode(&identity)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
