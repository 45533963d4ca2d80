//! Lifecycle state enums for addresses and challenges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trust lifecycle of a verifiable address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AddressStatus {
    /// No challenge has been issued for the current value.
    Unverified,
    /// A challenge is active for the current value.
    Pending,
    /// A challenge for the current value was completed.
    Completed,
    /// The last challenge ran out of time or attempts before completion.
    ExpiredAttempt,
}

impl AddressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unverified => "unverified",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::ExpiredAttempt => "expired-attempt",
        }
    }
}

impl fmt::Display for AddressStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of a single verification challenge.
///
/// Transitions are monotonic: `Active` moves to exactly one of the two
/// terminal states and never back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeState {
    Active,
    Completed,
    Expired,
}

impl ChallengeState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for ChallengeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a challenge moved to [`ChallengeState::Expired`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpiredReason {
    /// The challenge or flow lifespan elapsed.
    Elapsed,
    /// A newer challenge was issued for the same address.
    Superseded,
    /// The bounded number of code attempts was used up.
    AttemptsExhausted,
    /// The address value was edited after the challenge was issued.
    AddressChanged,
}

impl ExpiredReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Elapsed => "elapsed",
            Self::Superseded => "superseded",
            Self::AttemptsExhausted => "attempts-exhausted",
            Self::AddressChanged => "address-changed",
        }
    }
}

impl fmt::Display for ExpiredReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
