//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions, RoTxn};

use crate::address::LmdbVerificationStore;
use crate::identity::LmdbIdentityStore;
use crate::message::LmdbMessageStore;
use crate::LmdbError;

/// The schema version that the current code writes.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const SCHEMA_VERSION_KEY: &[u8] = b"schema_version";
const MAX_DBS: u32 = 16;

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    /// address_id → VerifiableAddress
    pub(crate) addresses_db: Database<Bytes, Bytes>,
    /// identity ++ via → address_id
    pub(crate) slots_db: Database<Bytes, Bytes>,
    /// via ++ value ++ address_id → address_id
    pub(crate) value_index_db: Database<Bytes, Bytes>,
    /// flow_id → Challenge
    pub(crate) challenges_db: Database<Bytes, Bytes>,
    /// address_id → flow_id of the active challenge
    pub(crate) active_db: Database<Bytes, Bytes>,
    /// address_id ++ seq → flow_id
    pub(crate) history_db: Database<Bytes, Bytes>,
    /// identity → Identity
    pub(crate) identities_db: Database<Bytes, Bytes>,
    /// message_id → QueuedMessage
    pub(crate) messages_db: Database<Bytes, Bytes>,
    pub(crate) meta_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment in the directory `path`.
    ///
    /// Refuses databases written by a newer schema.
    pub fn open(path: &Path, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per process per path and the
        // memory map is never modified outside of LMDB.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(MAX_DBS)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let addresses_db = env.create_database(&mut wtxn, Some("addresses"))?;
        let slots_db = env.create_database(&mut wtxn, Some("slots"))?;
        let value_index_db = env.create_database(&mut wtxn, Some("value_index"))?;
        let challenges_db = env.create_database(&mut wtxn, Some("challenges"))?;
        let active_db = env.create_database(&mut wtxn, Some("active_by_address"))?;
        let history_db = env.create_database(&mut wtxn, Some("address_challenges"))?;
        let identities_db = env.create_database(&mut wtxn, Some("identities"))?;
        let messages_db = env.create_database(&mut wtxn, Some("messages"))?;
        let meta_db: Database<Bytes, Bytes> = env.create_database(&mut wtxn, Some("meta"))?;

        let found = read_schema_version(&meta_db, &wtxn)?;
        if found > CURRENT_SCHEMA_VERSION {
            return Err(LmdbError::UnsupportedSchema {
                found,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }
        if found < CURRENT_SCHEMA_VERSION {
            meta_db.put(
                &mut wtxn,
                SCHEMA_VERSION_KEY,
                &CURRENT_SCHEMA_VERSION.to_le_bytes(),
            )?;
            tracing::info!(from = found, to = CURRENT_SCHEMA_VERSION, "initialized schema");
        }
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), map_size, "opened LMDB environment");
        Ok(Self {
            env: Arc::new(env),
            addresses_db,
            slots_db,
            value_index_db,
            challenges_db,
            active_db,
            history_db,
            identities_db,
            messages_db,
            meta_db,
        })
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn schema_version(&self) -> Result<u32, LmdbError> {
        let rtxn = self.env.read_txn()?;
        read_schema_version(&self.meta_db, &rtxn)
    }

    pub fn verification_store(&self) -> LmdbVerificationStore {
        LmdbVerificationStore {
            env: Arc::clone(&self.env),
            addresses_db: self.addresses_db,
            slots_db: self.slots_db,
            value_index_db: self.value_index_db,
            challenges_db: self.challenges_db,
            active_db: self.active_db,
            history_db: self.history_db,
            meta_db: self.meta_db,
        }
    }

    pub fn identity_store(&self) -> LmdbIdentityStore {
        LmdbIdentityStore {
            env: Arc::clone(&self.env),
            identities_db: self.identities_db,
        }
    }

    pub fn message_store(&self) -> LmdbMessageStore {
        LmdbMessageStore {
            env: Arc::clone(&self.env),
            messages_db: self.messages_db,
        }
    }
}

fn read_schema_version(db: &Database<Bytes, Bytes>, txn: &RoTxn) -> Result<u32, LmdbError> {
    match db.get(txn, SCHEMA_VERSION_KEY)? {
        Some(bytes) => {
            let arr: [u8; 4] = bytes.try_into().map_err(|_| {
                LmdbError::Corruption("schema_version has unexpected byte length".to_string())
            })?;
            Ok(u32::from_le_bytes(arr))
        }
        None => Ok(0),
    }
}
