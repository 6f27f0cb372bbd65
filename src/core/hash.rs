//! Seed Table Hashing
//!
//! SHA-256 digests of the derived seed table, used to compare two peers'
//! view of a tick without shipping the table itself.

use sha2::{Digest, Sha256};

use super::seed::entity_seeds;

/// Hash output type (256 bits / 32 bytes)
pub type SeedDigest = [u8; 32];

/// Deterministic hasher with a domain separator.
pub struct SeedHasher {
    hasher: Sha256,
}

impl SeedHasher {
    /// Create a new hasher with domain separator.
    pub fn new(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Hasher for per-tick seed tables.
    pub fn for_seed_table() -> Self {
        Self::new(b"LOCKSTEP_SEEDS_V1")
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Finalize and return the hash.
    pub fn finalize(self) -> SeedDigest {
        self.hasher.finalize().into()
    }
}

/// Digest of the seeds of entities `0..entity_count` at `loop_count`.
pub fn seed_digest(loop_count: u32, entity_count: usize) -> SeedDigest {
    let mut hasher = SeedHasher::for_seed_table();
    hasher.update_u32(loop_count);
    for seed in entity_seeds(loop_count, entity_count) {
        hasher.update_u32(seed);
    }
    hasher.finalize()
}
