use affirm_store::StoreError;
use affirm_types::{FlowId, IdentityId, TypesError};
use thiserror::Error;

use crate::flow::ExpiredContext;

#[derive(Debug, Error)]
pub enum VerificationError {
    /// Unknown flow, or a token that does not belong to it. The two are
    /// deliberately indistinguishable.
    #[error("verification flow not found")]
    NotFound,

    #[error("verification flow for {} has expired", .0.challenge_value)]
    ExpiredFlow(Box<ExpiredContext>),

    #[error("invalid verification code")]
    InvalidCode { attempts_remaining: Option<u32> },

    #[error("verification attempts exhausted; request a new verification")]
    AttemptsExhausted,

    #[error("verification flow {0} has not expired")]
    FlowNotExpired(FlowId),

    #[error("identity {0} not found")]
    IdentityNotFound(IdentityId),

    #[error("address {value} is not declared on identity {identity}")]
    UndeclaredAddress { identity: IdentityId, value: String },

    #[error("invalid address: {0}")]
    InvalidAddress(#[from] TypesError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl VerificationError {
    /// Whether the error is a business outcome the user can act on (resend,
    /// retry) rather than an internal failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Store(_))
    }
}
