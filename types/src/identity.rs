//! The slice of an identity that address verification reads and writes.

use serde::{Deserialize, Serialize};

use crate::{AddressValue, IdentityId, Via};

/// An address declared in an identity's traits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclaredAddress {
    pub via: Via,
    pub value: AddressValue,
}

/// Address-bearing traits of an identity.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traits {
    pub addresses: Vec<DeclaredAddress>,
}

impl Traits {
    /// The declared value for a channel, if any.
    pub fn address(&self, via: Via) -> Option<&AddressValue> {
        self.addresses
            .iter()
            .find(|a| a.via == via)
            .map(|a| &a.value)
    }

    /// Replace (or add) the declared value for a channel.
    pub fn set_address(&mut self, via: Via, value: AddressValue) {
        match self.addresses.iter_mut().find(|a| a.via == via) {
            Some(existing) => existing.value = value,
            None => self.addresses.push(DeclaredAddress { via, value }),
        }
    }
}

/// An identity as seen through the identity store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: IdentityId,
    pub traits: Traits,
}
