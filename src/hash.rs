//! Key hashing
//!
//! Bucket hashes are never persisted: the key index recomputes them from the
//! stored key bytes on every open. Any `KeyHasher` must therefore be stable
//! across process restarts.

use std::fmt::Debug;

/// 32-bit hash over raw key bytes
pub trait KeyHasher: Debug + Send + Sync {
    fn hash(&self, key: &[u8]) -> u32;
}

/// Seeded polynomial hash: `h = 17; h = h * 37 + byte` over signed bytes.
///
/// The empty key hashes to 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct PolyHasher;

impl PolyHasher {
    const SEED: i32 = 17;
    const MULTIPLIER: i32 = 37;
}

impl KeyHasher for PolyHasher {
    fn hash(&self, key: &[u8]) -> u32 {
        if key.is_empty() {
            return 0;
        }
        key.iter().fold(Self::SEED, |h, &b| {
            h.wrapping_mul(Self::MULTIPLIER).wrapping_add(b as i8 as i32)
        }) as u32
    }
}

/// Maps every key to the same bucket. Used to exercise collision chains.
#[derive(Debug, Clone, Copy)]
pub struct ConstHasher(pub u32);

impl KeyHasher for ConstHasher {
    fn hash(&self, _key: &[u8]) -> u32 {
        self.0
    }
}
