//! Value hashing.
//!
//! Every digest is a blake3 hash over canonical encodings. Ordered
//! collections (stacks, inbox segments) hash as a left fold of a chained
//! digest, so both the contents and the order are committed to.

use super::Value;

/// 32-byte big-endian digest.
pub type Digest32 = [u8; 32];

/// The digest of an empty chain.
pub const EMPTY_CHAIN: Digest32 = [0u8; 32];

impl Value {
    pub fn hash(&self) -> Digest32 {
        blake3::hash(&self.encode()).into()
    }
}

/// Extends a chained digest by one item.
pub fn chain(prev: &Digest32, item: &Digest32) -> Digest32 {
    let mut hasher = blake3::Hasher::new();
    hasher.update(prev);
    hasher.update(item);
    hasher.finalize().into()
}

/// Chained digest over an ordered sequence of values, bottom first.
pub fn chain_values(values: &[Value]) -> Digest32 {
    let mut acc = EMPTY_CHAIN;
    for value in values {
        acc = chain(&acc, &value.hash());
    }
    acc
}
