//! Courier outbox records and their storage trait.

use crate::StoreError;
use affirm_types::{AddressValue, Timestamp};
use serde::{Deserialize, Serialize};

/// The kind of message to deliver, with the data its template needs.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MailTemplate {
    /// A verification link for a known address, and the code to enter
    /// once the link is opened.
    VerificationValid {
        to: AddressValue,
        verification_url: String,
        code: String,
    },
    /// Someone asked to verify an address no identity has declared.
    VerificationInvalid { to: AddressValue },
}

impl MailTemplate {
    pub fn recipient(&self) -> &AddressValue {
        match self {
            Self::VerificationValid { to, .. } | Self::VerificationInvalid { to } => to,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::VerificationValid { .. } => "verification_valid",
            Self::VerificationInvalid { .. } => "verification_invalid",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Queued,
    Sent,
}

/// A message waiting in (or delivered from) the outbox.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    /// Monotonic sequence number assigned by the store.
    pub id: u64,
    pub template: MailTemplate,
    pub status: MessageStatus,
    pub created_at: Timestamp,
}

/// Trait for the courier outbox.
pub trait MessageStore: Send + Sync {
    /// Append a message with status `queued`.
    fn enqueue(&self, template: &MailTemplate, now: Timestamp)
        -> Result<QueuedMessage, StoreError>;

    /// Messages in insertion order, optionally filtered by status.
    fn messages(&self, status: Option<MessageStatus>) -> Result<Vec<QueuedMessage>, StoreError>;

    fn mark_sent(&self, id: u64) -> Result<(), StoreError>;
}
