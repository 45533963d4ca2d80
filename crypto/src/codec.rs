//! Per-channel token codecs.
//!
//! Each [`Via`] variant gets an implementation of [`TokenCodec`]; the engine
//! never generates or compares secrets itself.

use subtle::ConstantTimeEq;

use affirm_types::{FlowId, Via};

use crate::hash::bind_token;
use crate::random::random_bytes;

/// A freshly issued `(token, code)` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedSecret {
    /// Routes the browser to the flow. Embedded in the link.
    pub token: String,
    /// Authorizes completion. Compared in constant time.
    pub code: String,
}

impl std::fmt::Debug for IssuedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSecret")
            .field("token", &"<redacted>")
            .field("code", &"<redacted>")
            .finish()
    }
}

/// Capability interface implemented once per channel.
pub trait TokenCodec: Send + Sync {
    /// Mint an unguessable token and code for the given flow.
    fn issue(&self, flow: &FlowId) -> IssuedSecret;

    /// Compare a supplied value against the stored one without leaking
    /// partial matches through timing.
    fn verify(&self, expected: &str, supplied: &str) -> bool {
        constant_time_eq(expected, supplied)
    }
}

/// Codec for email links: 64 hex-char tokens and 32 hex-char codes.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmailCodec;

impl EmailCodec {
    pub const TOKEN_LEN: usize = 64;
    pub const CODE_LEN: usize = 32;
}

impl TokenCodec for EmailCodec {
    fn issue(&self, flow: &FlowId) -> IssuedSecret {
        let token_entropy: [u8; 32] = random_bytes();
        let token = bind_token(b"affirm/email-token", flow, &token_entropy);
        let code: [u8; 16] = random_bytes();
        IssuedSecret {
            token: hex::encode(token),
            code: hex::encode(code),
        }
    }
}

static EMAIL_CODEC: EmailCodec = EmailCodec;

/// Select the codec for a channel.
pub fn codec_for(via: Via) -> &'static dyn TokenCodec {
    match via {
        Via::Email => &EMAIL_CODEC,
    }
}

/// Constant-time string equality.
///
/// Length is not secret (every secret of a codec has a fixed length), so a
/// length mismatch returns `false` straight away; equal-length inputs are
/// compared without early exit.
pub fn constant_time_eq(expected: &str, supplied: &str) -> bool {
    bool::from(expected.as_bytes().ct_eq(supplied.as_bytes()))
}
