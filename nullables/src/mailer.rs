//! Nullable mail transport: record messages without sending them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use affirm_store::MailTemplate;
use affirm_types::AddressValue;
use affirm_verification::{MailError, MailTransport};

/// A test transport that records messages instead of sending them.
///
/// While failing, sends return an error and nothing is recorded.
#[derive(Default)]
pub struct NullMailer {
    sent: Mutex<Vec<MailTemplate>>,
    failing: AtomicBool,
}

impl NullMailer {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Vec<MailTemplate>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// All messages delivered so far (for assertions).
    pub fn sent(&self) -> Vec<MailTemplate> {
        self.log().clone()
    }

    /// The most recent verification link mailed to `to`.
    pub fn last_link_to(&self, to: &AddressValue) -> Option<String> {
        self.log().iter().rev().find_map(|template| match template {
            MailTemplate::VerificationValid {
                to: recipient,
                verification_url,
                ..
            } if recipient == to => Some(verification_url.clone()),
            _ => None,
        })
    }

    /// Clear all recorded messages.
    pub fn reset(&self) {
        self.log().clear();
    }
}

impl MailTransport for NullMailer {
    fn send(&self, template: &MailTemplate) -> Result<(), MailError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(MailError::Transport("null transport is failing".into()));
        }
        self.log().push(template.clone());
        Ok(())
    }
}
