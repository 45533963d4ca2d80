//! Identity store contract, consumed from the identity system.

use crate::StoreError;
use affirm_types::{DeclaredAddress, Identity, IdentityId, Traits};

/// Read/write access to identities and their address-bearing traits.
///
/// The identity store is the source of truth for which address values an
/// identity declares. Whether an address is verified is tracked by the
/// verification store, never here.
pub trait IdentityStore: Send + Sync {
    fn get_identity(&self, id: &IdentityId) -> Result<Option<Identity>, StoreError>;

    /// Replace an identity's traits. Fails with [`StoreError::NotFound`] for
    /// unknown identities.
    fn update_traits(&self, id: &IdentityId, traits: &Traits) -> Result<(), StoreError>;

    /// The addresses currently declared on an identity.
    fn list_addresses(&self, id: &IdentityId) -> Result<Vec<DeclaredAddress>, StoreError> {
        let identity = self
            .get_identity(id)?
            .ok_or_else(|| StoreError::NotFound(format!("identity {id}")))?;
        Ok(identity.traits.addresses)
    }
}
