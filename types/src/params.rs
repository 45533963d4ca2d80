//! Verification policy parameters.

use serde::{Deserialize, Serialize};

/// Policy constants governing challenge lifetimes and attempt bounds.
///
/// Lifetimes are fixed durations from challenge creation, never derived from
/// clock drift or request timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationParams {
    /// Lifetime of a challenge's token and code, in seconds.
    pub challenge_lifespan_secs: u64,

    /// Lifetime of the browser-facing flow wrapping a challenge, in seconds.
    pub flow_lifespan_secs: u64,

    /// Wrong-code submissions allowed before the challenge expires.
    /// `None` disables the bound and relies on expiry alone.
    pub max_attempts: Option<u32>,
}

impl Default for VerificationParams {
    fn default() -> Self {
        Self {
            challenge_lifespan_secs: 3600,
            flow_lifespan_secs: 3600,
            max_attempts: Some(5),
        }
    }
}
