//! Token codec for address verification.
//!
//! - **Randomness** from the operating system for ids, tokens and codes
//! - **Blake2b** for binding tokens to their flow
//! - **Constant-time** code comparison via `subtle`
//!
//! Token and code are independent random values. The token only routes a
//! browser to its flow; the code is what authorizes completion.

pub mod codec;
pub mod hash;
pub mod random;

pub use codec::{codec_for, constant_time_eq, EmailCodec, IssuedSecret, TokenCodec};
pub use hash::bind_token;
pub use random::{new_address_id, new_flow_id, random_bytes};
