//! Durable courier outbox.
//!
//! The engine hands mail to an [`OutboxMailer`], which only records it. A
//! [`Courier`] later drains queued messages through a real transport and
//! marks each one sent once the transport accepts it.

use std::sync::Arc;

use affirm_store::{MailTemplate, MessageStatus, MessageStore};
use affirm_types::Clock;
use affirm_verification::{MailError, MailTransport};

use crate::NodeError;

/// [`MailTransport`] that appends to the outbox instead of sending.
pub struct OutboxMailer {
    outbox: Arc<dyn MessageStore>,
    clock: Arc<dyn Clock>,
}

impl OutboxMailer {
    pub fn new(outbox: Arc<dyn MessageStore>, clock: Arc<dyn Clock>) -> Self {
        Self { outbox, clock }
    }
}

impl MailTransport for OutboxMailer {
    fn send(&self, template: &MailTemplate) -> Result<(), MailError> {
        let message = self
            .outbox
            .enqueue(template, self.clock.now())
            .map_err(|e| MailError::Transport(e.to_string()))?;
        tracing::debug!(id = message.id, kind = template.kind(), "queued message");
        Ok(())
    }
}

/// Delivers queued messages.
pub struct Courier {
    outbox: Arc<dyn MessageStore>,
}

impl Courier {
    pub fn new(outbox: Arc<dyn MessageStore>) -> Self {
        Self { outbox }
    }

    /// Send every queued message through `transport`, oldest first.
    ///
    /// On success returns how many were sent. Stops at the first transport
    /// failure and returns its error; the messages sent before it stay
    /// marked sent, and that message and the ones after it stay queued.
    pub fn dispatch_queued(&self, transport: &dyn MailTransport) -> Result<usize, NodeError> {
        let mut sent = 0;
        for message in self.outbox.messages(Some(MessageStatus::Queued))? {
            if let Err(e) = transport.send(&message.template) {
                tracing::warn!(
                    id = message.id,
                    sent,
                    error = %e,
                    "delivery failed; message stays queued"
                );
                return Err(e.into());
            }
            self.outbox.mark_sent(message.id)?;
            sent += 1;
        }
        if sent > 0 {
            tracing::info!(sent, "outbox drained");
        }
        Ok(sent)
    }
}
