//! Abstract storage traits for address verification.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The rest of the codebase depends only on the traits.
//!
//! The lifecycle rules that decide how a record changes (supersession,
//! completion, failed attempts, value rebinding) live here as plain functions
//! over the records, so every backend applies identical semantics inside its
//! own atomic write.

pub mod address;
pub mod challenge;
pub mod error;
pub mod identity;
pub mod message;

pub use address::{AddressStore, Upserted, VerifiableAddress};
pub use challenge::{Challenge, ChallengeStore, Completion, FailedAttempt};
pub use error::StoreError;
pub use identity::IdentityStore;
pub use message::{MailTemplate, MessageStatus, MessageStore, QueuedMessage};

/// Everything the verification engine needs from its durable store.
pub trait VerificationStore: AddressStore + ChallengeStore {}

impl<T: AddressStore + ChallengeStore> VerificationStore for T {}
