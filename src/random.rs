//! Deterministic per-transaction seed derivation
//!
//! Contract runtimes need randomness, but every honest node replaying the
//! same block must observe the same values. Seeds are therefore derived, not
//! sampled: a block-level seed from the header timestamp, re-keyed per
//! transaction by its hash.

use crate::types::TxHash;

/// Seed source scoped to one block play.
#[derive(Debug, Clone)]
pub struct SeedSource {
    block_seed: [u8; 32],
}

impl SeedSource {
    pub fn new(block_timestamp: i64) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"blockplay.seed.v1");
        hasher.update(&block_timestamp.to_le_bytes());
        Self {
            block_seed: *hasher.finalize().as_bytes(),
        }
    }

    /// Seed for one transaction's runtime RNG.
    pub fn tx_seed(&self, hash: &TxHash) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.block_seed);
        hasher.update(hash.as_bytes());
        *hasher.finalize().as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeds_are_reproducible() {
        let h = TxHash::of(b"tx");
        assert_eq!(SeedSource::new(42).tx_seed(&h), SeedSource::new(42).tx_seed(&h));
    }

    #[test]
    fn seeds_differ_per_tx_and_per_block() {
        let a = TxHash::of(b"a");
        let b = TxHash::of(b"b");
        let s = SeedSource::new(42);
        assert_ne!(s.tx_seed(&a), s.tx_seed(&b));
        assert_ne!(s.tx_seed(&a), SeedSource::new(43).tx_seed(&a));
    }
}
