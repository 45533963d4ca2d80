//! Operating-system randomness for identifiers and secrets.

use rand::rngs::OsRng;
use rand::RngCore;

use affirm_types::{AddressId, FlowId};

/// Fill an array with bytes from the operating system CSPRNG.
pub fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

pub fn new_address_id() -> AddressId {
    AddressId::new(random_bytes())
}

pub fn new_flow_id() -> FlowId {
    FlowId::new(random_bytes())
}
