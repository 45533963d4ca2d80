//! Address verification engine.
//!
//! Three layers over the store traits in `affirm-store`:
//! 1. **Engine**: issues, validates, and expires challenges and keeps each
//!    address's trust state consistent with them, including after trait edits.
//! 2. **Flow coordinator**: a read-only, resumable view of a challenge for the
//!    browser-facing layer, with a stable expired context for resend offers.
//! 3. **Hooks**: post-registration and post-settings entry points that request
//!    verification for every unverified declared address.
//!
//! Mail is dispatched fire-and-forget through a [`MailTransport`]; a failed
//! dispatch leaves the challenge active and a later request resends it.

pub mod courier;
pub mod engine;
pub mod error;
pub mod flow;
pub mod hook;
pub mod locks;

pub use courier::{parse_verification_link, LinkBuilder, MailError, MailTemplate, MailTransport};
pub use engine::{RequestOutcome, SubmitOutcome, VerificationEngine};
pub use error::VerificationError;
pub use flow::{ExpiredContext, FlowCoordinator, FlowPhase, FlowState};
pub use hook::VerificationHook;
pub use locks::AddressLocks;
