use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::IdentityError;

/// Width of a node identifier, in bytes (256 bits).
pub const NID_LEN: usize = 32;

/// Number of distinct XOR-distance buckets; `distance` returns a value in
/// `[0, BUCKET_COUNT)`.
pub const BUCKET_COUNT: usize = NID_LEN * 8;

/// A fixed 256-bit opaque identifier, shared by nodes and content.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; NID_LEN]);

impl NodeId {
    /// Wrap a raw 32-byte array.
    pub const fn from_bytes(bytes: [u8; NID_LEN]) -> Self {
        Self(bytes)
    }

    /// Borrow the underlying bytes, in network byte order.
    pub fn as_bytes(&self) -> &[u8; NID_LEN] {
        &self.0
    }

    /// The content-addressed id of `data`: `SHA-256(data)`.
    pub fn hash(data: &[u8]) -> Self {
        Self(lib_crypto::hash_sha256(data))
    }

    /// A uniformly random id, for nodes that are not content-addressed.
    pub fn random() -> Self {
        Self(lib_crypto::random_bytes32())
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a lowercase- or uppercase-hex encoding. Fails on wrong length or
    /// non-hex characters.
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        if s.len() != NID_LEN * 2 {
            return Err(IdentityError::MalformedId {
                reason: format!("expected {} hex chars, got {}", NID_LEN * 2, s.len()),
            });
        }
        let bytes = hex::decode(s).map_err(|e| IdentityError::MalformedId {
            reason: e.to_string(),
        })?;
        let mut out = [0u8; NID_LEN];
        out.copy_from_slice(&bytes);
        Ok(Self(out))
    }

    /// Position (0-based from the most-significant bit) of the highest set
    /// bit in `self XOR other`, in `[0, BUCKET_COUNT)`. Identical ids have
    /// distance 0 — the reserved, never-populated self-bucket.
    pub fn distance(&self, other: &Self) -> usize {
        for (byte_idx, (a, b)) in self.0.iter().zip(other.0.iter()).enumerate() {
            let xor = a ^ b;
            if xor != 0 {
                return byte_idx * 8 + xor.leading_zeros() as usize;
            }
        }
        0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.to_hex())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}
