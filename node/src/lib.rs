//! Address verification service.
//!
//! The node is the central coordinator that:
//! - Opens the LMDB environment and its stores
//! - Builds the verification engine, flow coordinator and hooks
//! - Routes outgoing mail into a durable outbox
//! - Registers identities and applies address edits for the CLI

pub mod config;
pub mod error;
pub mod node;
pub mod outbox;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::AffirmNode;
pub use outbox::{Courier, OutboxMailer};
