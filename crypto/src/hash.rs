//! Blake2b binding of link tokens to their flow.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use affirm_types::FlowId;

type Blake2b256 = Blake2b<U32>;

/// Hash fresh entropy together with the flow a token routes to, under a
/// per-channel domain tag.
pub fn bind_token(domain: &[u8], flow: &FlowId, entropy: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2b256::new();
    hasher.update(domain);
    hasher.update(flow.as_bytes());
    hasher.update(entropy);
    let mut output = [0u8; 32];
    output.copy_from_slice(&hasher.finalize());
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_depends_on_every_input() {
        let flow = FlowId::new([1; 16]);
        let base = bind_token(b"email", &flow, &[7; 32]);
        assert_eq!(base, bind_token(b"email", &flow, &[7; 32]));
        assert_ne!(base, bind_token(b"sms", &flow, &[7; 32]));
        assert_ne!(base, bind_token(b"email", &FlowId::new([2; 16]), &[7; 32]));
        assert_ne!(base, bind_token(b"email", &flow, &[8; 32]));
    }
}
