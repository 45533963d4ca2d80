//! Nullable collaborators for deterministic tests.
//!
//! The verification engine reaches time, storage, identities and mail only
//! through traits. The types here implement those traits in memory: time
//! moves only when a test advances it, every sent message is recorded, and
//! the mail transport can be told to fail.

pub mod clock;
pub mod identity;
pub mod mailer;
pub mod store;

pub use clock::NullClock;
pub use identity::NullIdentityStore;
pub use mailer::NullMailer;
pub use store::NullStore;
