//! LMDB storage backend for address verification.
//!
//! Implements the storage traits from `affirm-store` using the `heed` LMDB
//! bindings. Every logical store maps to one or more named databases within a
//! single environment, and every mutating trait call is one write transaction.

pub mod address;
pub mod challenge;
pub mod environment;
pub mod error;
pub mod identity;
mod layout;
pub mod message;

pub use address::LmdbVerificationStore;
pub use environment::{LmdbEnvironment, CURRENT_SCHEMA_VERSION};
pub use error::LmdbError;
pub use identity::LmdbIdentityStore;
pub use message::LmdbMessageStore;
