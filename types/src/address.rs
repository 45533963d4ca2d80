//! Channel kinds and normalized address values.

use email_address::EmailAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::TypesError;

/// The channel an address is reached through.
///
/// Email is the only channel today; every channel-specific behavior
/// (normalization, token codec, mail template) dispatches on this tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Via {
    Email,
}

impl Via {
    /// Stable single-byte tag used in storage keys.
    pub fn tag(&self) -> u8 {
        match self {
            Self::Email => 1,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Email),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
        }
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Via {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(Self::Email),
            other => Err(TypesError::UnknownVia(other.to_string())),
        }
    }
}

/// A contact value normalized for its channel.
///
/// Two values that differ only in case or surrounding whitespace normalize to
/// the same `AddressValue`, which makes uniqueness case-insensitive.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AddressValue(String);

impl AddressValue {
    /// Normalize and validate `raw` for the given channel.
    pub fn parse(via: Via, raw: &str) -> Result<Self, TypesError> {
        let normalized = raw.trim().to_lowercase();
        let valid = match via {
            Via::Email => EmailAddress::is_valid(&normalized),
        };
        if !valid {
            return Err(TypesError::InvalidAddress {
                via: via.to_string(),
                value: raw.to_string(),
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AddressValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_is_case_and_whitespace_insensitive() {
        let a = AddressValue::parse(Via::Email, "  Alice@Example.COM ").unwrap();
        let b = AddressValue::parse(Via::Email, "alice@example.com").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "alice@example.com");
    }

    #[test]
    fn rejects_malformed_email() {
        let err = AddressValue::parse(Via::Email, "not an email").unwrap_err();
        assert!(matches!(err, TypesError::InvalidAddress { .. }));
    }

    #[test]
    fn via_parses_and_tags() {
        assert_eq!("EMAIL".parse::<Via>().unwrap(), Via::Email);
        assert!("sms".parse::<Via>().is_err());
        assert_eq!(Via::from_tag(Via::Email.tag()), Some(Via::Email));
        assert_eq!(Via::from_tag(0), None);
    }
}
