//! Nullable identity store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use affirm_store::{IdentityStore, StoreError};
use affirm_types::{AddressValue, DeclaredAddress, Identity, IdentityId, Traits, Via};

/// An in-memory identity store for testing.
#[derive(Default)]
pub struct NullIdentityStore {
    identities: Mutex<HashMap<IdentityId, Identity>>,
}

impl NullIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn identities(&self) -> MutexGuard<'_, HashMap<IdentityId, Identity>> {
        self.identities.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, identity: Identity) {
        self.identities().insert(identity.id.clone(), identity);
    }

    /// Register an identity declaring a single email address.
    pub fn register_email(&self, id: &IdentityId, email: AddressValue) -> DeclaredAddress {
        let address = DeclaredAddress {
            via: Via::Email,
            value: email,
        };
        self.insert(Identity {
            id: id.clone(),
            traits: Traits {
                addresses: vec![address.clone()],
            },
        });
        address
    }
}

impl IdentityStore for NullIdentityStore {
    fn get_identity(&self, id: &IdentityId) -> Result<Option<Identity>, StoreError> {
        Ok(self.identities().get(id).cloned())
    }

    fn update_traits(&self, id: &IdentityId, traits: &Traits) -> Result<(), StoreError> {
        let mut identities = self.identities();
        let identity = identities
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("identity {id}")))?;
        identity.traits = traits.clone();
        Ok(())
    }
}
