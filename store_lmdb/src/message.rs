//! LMDB implementation of MessageStore (the courier outbox).
//!
//! Key format: big-endian `u64` message id, so key order is insertion order
//! and the next id is one past the last key.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use affirm_store::{MailTemplate, MessageStatus, MessageStore, QueuedMessage, StoreError};
use affirm_types::Timestamp;

use crate::layout::{decode, encode};
use crate::LmdbError;

pub struct LmdbMessageStore {
    pub(crate) env: Arc<Env>,
    pub(crate) messages_db: Database<Bytes, Bytes>,
}

fn message_id(key: &[u8]) -> Result<u64, LmdbError> {
    let arr: [u8; 8] = key
        .try_into()
        .map_err(|_| LmdbError::Corruption(format!("message key of {} bytes", key.len())))?;
    Ok(u64::from_be_bytes(arr))
}

impl MessageStore for LmdbMessageStore {
    fn enqueue(
        &self,
        template: &MailTemplate,
        now: Timestamp,
    ) -> Result<QueuedMessage, StoreError> {
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let last = match self.messages_db.last(&wtxn).map_err(LmdbError::from)? {
            Some((key, _)) => message_id(key)?,
            None => 0,
        };
        let message = QueuedMessage {
            id: last + 1,
            template: template.clone(),
            status: MessageStatus::Queued,
            created_at: now,
        };
        self.messages_db
            .put(&mut wtxn, &message.id.to_be_bytes(), &encode(&message)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(message)
    }

    fn messages(&self, status: Option<MessageStatus>) -> Result<Vec<QueuedMessage>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut messages = Vec::new();
        for entry in self.messages_db.iter(&rtxn).map_err(LmdbError::from)? {
            let (_key, raw) = entry.map_err(LmdbError::from)?;
            let message: QueuedMessage = decode(raw)?;
            if status.map_or(true, |s| message.status == s) {
                messages.push(message);
            }
        }
        Ok(messages)
    }

    fn mark_sent(&self, id: u64) -> Result<(), StoreError> {
        let key = id.to_be_bytes();
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        let mut message: QueuedMessage = self
            .messages_db
            .get(&wtxn, &key)
            .map_err(LmdbError::from)?
            .map(decode)
            .transpose()?
            .ok_or_else(|| LmdbError::NotFound(format!("message {id}")))?;
        message.status = MessageStatus::Sent;
        self.messages_db
            .put(&mut wtxn, &key, &encode(&message)?)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}
