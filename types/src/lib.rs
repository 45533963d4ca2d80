//! Fundamental types for the address verification engine.
//!
//! This crate defines the core types shared across every other crate in the workspace:
//! identifiers, timestamps and clocks, channel kinds, normalized address values,
//! lifecycle state enums, identity traits, and verification policy parameters.

pub mod address;
pub mod error;
pub mod id;
pub mod identity;
pub mod params;
pub mod state;
pub mod time;

pub use address::{AddressValue, Via};
pub use error::TypesError;
pub use id::{AddressId, FlowId, IdentityId};
pub use identity::{DeclaredAddress, Identity, Traits};
pub use params::VerificationParams;
pub use state::{AddressStatus, ChallengeState, ExpiredReason};
pub use time::{Clock, SystemClock, Timestamp};
