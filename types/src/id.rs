//! Identifiers for identities, addresses and flows.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// Opaque identifier of an identity, chosen by the identity store.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IdentityId(String);

impl IdentityId {
    /// Create an identity id from its raw string form.
    ///
    /// Fails on empty or whitespace-only input.
    pub fn new(raw: impl Into<String>) -> Result<Self, TypesError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(TypesError::InvalidId("identity id must not be empty".into()));
        }
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! byte_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name([u8; 16]);

        impl $name {
            pub const LEN: usize = 16;

            pub fn new(bytes: [u8; 16]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Parse the 32-character lowercase or uppercase hex form.
            pub fn from_hex(s: &str) -> Result<Self, TypesError> {
                let mut bytes = [0u8; 16];
                hex::decode_to_slice(s, &mut bytes)
                    .map_err(|e| TypesError::InvalidId(format!("{}: {e}", stringify!($name))))?;
                Ok(Self(bytes))
            }

            /// Parse from a raw byte slice of exactly [`Self::LEN`] bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self, TypesError> {
                let arr: [u8; 16] = bytes.try_into().map_err(|_| {
                    TypesError::InvalidId(format!(
                        "{} must be {} bytes, got {}",
                        stringify!($name),
                        Self::LEN,
                        bytes.len()
                    ))
                })?;
                Ok(Self(arr))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(&self.0[..4]))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }
    };
}

byte_id!(
    /// Identifier of a verifiable address record.
    AddressId
);

byte_id!(
    /// Identifier of a verification challenge, doubling as its flow handle.
    FlowId
);
