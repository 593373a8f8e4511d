//! Order-sensitive Merkle folding of certificate digests.
//!
//! Leaves, interior pairs and the empty tree are hashed under distinct
//! markers so no interior node can be passed off as a leaf.  A level with an
//! odd count promotes its last node unchanged.

use blake2::digest::{consts::U32, Digest};
use blake2::Blake2b;

/// 32-byte BLAKE2b digest used for certificates and batches.
pub type Digest32 = [u8; 32];

const MERKLE_DOMAIN: &[u8] = b"COLLATZ_GHOST_MERKLE";

fn finish(hasher: Blake2b<U32>) -> Digest32 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

fn hash_leaf(leaf: &Digest32) -> Digest32 {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(MERKLE_DOMAIN);
    hasher.update([0u8]);
    hasher.update(leaf);
    finish(hasher)
}

fn hash_pair(left: &Digest32, right: &Digest32) -> Digest32 {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(MERKLE_DOMAIN);
    hasher.update([1u8]);
    hasher.update(left);
    hasher.update(right);
    finish(hasher)
}

fn hash_empty() -> Digest32 {
    let mut hasher = Blake2b::<U32>::new();
    hasher.update(MERKLE_DOMAIN);
    hasher.update([2u8]);
    finish(hasher)
}

/// Folds `leaves`, in the given order, into a single root.
pub fn merkle_root(leaves: &[Digest32]) -> Digest32 {
    if leaves.is_empty() {
        return hash_empty();
    }
    let mut level: Vec<Digest32> = leaves.iter().map(hash_leaf).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| match pair {
                [left, right] => hash_pair(left, right),
                _ => pair[0],
            })
            .collect();
    }
    level[0]
}

/// Lower-case hex rendering of a digest.
pub fn digest_to_hex(digest: &Digest32) -> String {
    hex::encode(digest)
}

/// Parses a digest written exactly as [`digest_to_hex`] renders it.
///
/// Upper-case digits, surrounding whitespace and any other length are
/// rejected, so every digest has a single accepted spelling.
pub fn digest_from_hex(input: &str) -> Result<Digest32, String> {
    let canonical = input.len() == 64
        && input
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
    if !canonical {
        return Err(format!(
            "digest must be 64 lower-case hex characters, got '{input}'"
        ));
    }
    let bytes = hex::decode(input).map_err(|err| format!("invalid hex digest: {err}"))?;
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}
