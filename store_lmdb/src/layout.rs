//! Key layouts and record encoding.
//!
//! Composite keys put the scan prefix first so listing is a prefix
//! range-scan. Variable-length components carry a 2-byte big-endian length so
//! no prefix can run into its neighbour.

use std::ops::Bound;

use heed::types::Bytes;
use heed::{Database, RoTxn};
use serde::de::DeserializeOwned;
use serde::Serialize;

use affirm_types::{AddressId, AddressValue, FlowId, IdentityId, Via};

use crate::LmdbError;

fn push_sized(key: &mut Vec<u8>, part: &[u8]) {
    key.extend_from_slice(&(part.len() as u16).to_be_bytes());
    key.extend_from_slice(part);
}

/// Prefix shared by every slot of an identity.
pub(crate) fn identity_prefix(identity: &IdentityId) -> Vec<u8> {
    let mut key = Vec::with_capacity(2 + identity.as_bytes().len() + 1);
    push_sized(&mut key, identity.as_bytes());
    key
}

/// `len ++ identity ++ via_tag` → address id.
pub(crate) fn slot_key(identity: &IdentityId, via: Via) -> Vec<u8> {
    let mut key = identity_prefix(identity);
    key.push(via.tag());
    key
}

/// Prefix shared by every record bound to a value.
pub(crate) fn value_prefix(via: Via, value: &AddressValue) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + 2 + value.as_str().len() + AddressId::LEN);
    key.push(via.tag());
    push_sized(&mut key, value.as_str().as_bytes());
    key
}

/// `via_tag ++ len ++ value ++ address_id` → address id.
pub(crate) fn value_key(via: Via, value: &AddressValue, address: &AddressId) -> Vec<u8> {
    let mut key = value_prefix(via, value);
    key.extend_from_slice(address.as_bytes());
    key
}

/// `address_id ++ seq_be` → flow id. Sequence order is issue order.
pub(crate) fn history_key(address: &AddressId, seq: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(AddressId::LEN + 8);
    key.extend_from_slice(address.as_bytes());
    key.extend_from_slice(&seq.to_be_bytes());
    key
}

pub(crate) fn address_id(bytes: &[u8]) -> Result<AddressId, LmdbError> {
    AddressId::from_slice(bytes).map_err(|e| LmdbError::Corruption(e.to_string()))
}

pub(crate) fn flow_id(bytes: &[u8]) -> Result<FlowId, LmdbError> {
    FlowId::from_slice(bytes).map_err(|e| LmdbError::Corruption(e.to_string()))
}

/// Exclusive upper bound of a prefix range-scan.
///
/// Trailing `0xff` bytes roll over; `None` when the prefix is all `0xff` and
/// the scan must run to the end of the database.
pub(crate) fn upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(last) = upper.pop() {
        if last < u8::MAX {
            upper.push(last + 1);
            return Some(upper);
        }
    }
    None
}

/// Prefix range-scan: every value whose key starts with `prefix`, in key order.
pub(crate) fn scan_prefix<'t>(
    db: &Database<Bytes, Bytes>,
    txn: &'t RoTxn,
    prefix: &[u8],
) -> Result<Vec<&'t [u8]>, LmdbError> {
    let upper = upper_bound(prefix);
    let bounds = (
        Bound::Included(prefix),
        upper.as_deref().map_or(Bound::Unbounded, Bound::Excluded),
    );
    let mut values = Vec::new();
    for entry in db.range(txn, &bounds)? {
        let (_key, value) = entry?;
        values.push(value);
    }
    Ok(values)
}

pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Vec<u8>, LmdbError> {
    Ok(bincode::serialize(record)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, LmdbError> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upper_bound_rolls_over() {
        assert_eq!(upper_bound(&[0x01, 0xff]), Some(vec![0x02]));
        assert_eq!(upper_bound(&[0x10, 0x20]), Some(vec![0x10, 0x21]));
        assert_eq!(upper_bound(&[0xff, 0xff]), None);
    }

    #[test]
    fn identity_prefixes_do_not_overlap() {
        let ab = IdentityId::new("ab").unwrap();
        let abc = IdentityId::new("abc").unwrap();
        assert!(!slot_key(&abc, Via::Email).starts_with(&identity_prefix(&ab)));
        assert!(slot_key(&ab, Via::Email).starts_with(&identity_prefix(&ab)));
    }
}
