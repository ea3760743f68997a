//! Hash and randomness primitives used to derive and generate DHT identifiers.
//!
//! Kept deliberately small: the DHT core treats hashing and randomness as
//! abstract primitives (see the identity component design), so this crate
//! exposes exactly the two operations callers need and nothing else.

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Width, in bytes, of every digest and random identifier this crate produces.
pub const DIGEST_LEN: usize = 32;

/// SHA-256 over the exact byte content, in network byte order.
pub fn hash_sha256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// A cryptographically seeded uniform 32-byte value, used for random identity
/// generation (contacts that are not content-addressed).
pub fn random_bytes32() -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    rand::thread_rng().fill_bytes(&mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_sha256(b"hello"), hash_sha256(b"hello"));
    }

    #[test]
    fn hash_matches_known_vector() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        let got = hash_sha256(b"");
        let expected =
            hex::decode("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
                .unwrap();
        assert_eq!(got.to_vec(), expected);
    }

    #[test]
    fn random_bytes_are_not_trivially_constant() {
        let a = random_bytes32();
        let b = random_bytes32();
        assert_ne!(a, b);
    }
}
