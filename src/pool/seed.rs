//! Seed expansion
//!
//! Each pick index is a keyed BLAKE3 hash of an attempt counter under the
//! selection seed, reduced into `[0, total_weight)`. Reducing a 128-bit value
//! keeps the modulo bias far below anything a 64-bit total can observe.

use std::fmt;
use std::str::FromStr;

use crate::operator::{decode_padded, ParseIdError};

/// Width of a selection seed in bytes.
pub const SEED_LEN: usize = 32;

/// Public random value driving one group selection.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Seed([u8; SEED_LEN]);

impl Seed {
    /// Wrap raw seed bytes.
    pub const fn new(bytes: [u8; SEED_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw seed bytes.
    pub fn as_bytes(&self) -> &[u8; SEED_LEN] {
        &self.0
    }
}

impl From<[u8; SEED_LEN]> for Seed {
    fn from(bytes: [u8; SEED_LEN]) -> Self {
        Self(bytes)
    }
}

/// Parses hex, left-padding short values as big-endian numbers.
impl FromStr for Seed {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_padded::<SEED_LEN>(s).map(Self)
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Seed({self})")
    }
}

/// Deterministic stream of pick indices for one seed.
#[derive(Debug, Clone)]
pub struct PickIndices {
    seed: Seed,
    counter: u64,
}

impl PickIndices {
    /// Start the stream at attempt 0.
    pub fn new(seed: Seed) -> Self {
        Self { seed, counter: 0 }
    }

    /// Attempts drawn so far.
    pub fn attempts(&self) -> u64 {
        self.counter
    }

    /// Index for attempt `counter` in `[0, bound)`. `bound` must be non-zero.
    pub fn index_at(seed: &Seed, counter: u64, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        let mut hasher = blake3::Hasher::new_keyed(seed.as_bytes());
        hasher.update(&counter.to_le_bytes());
        let digest = hasher.finalize();

        let mut wide = [0u8; 16];
        wide.copy_from_slice(&digest.as_bytes()[..16]);
        (u128::from_le_bytes(wide) % u128::from(bound.max(1))) as u64
    }

    /// Draw the next index in `[0, bound)`.
    pub fn next_below(&mut self, bound: u64) -> u64 {
        let index = Self::index_at(&self.seed, self.counter, bound);
        self.counter += 1;
        index
    }
}
