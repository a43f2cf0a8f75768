//! Leaf addressing
//!
//! A position is a fixed-length digit string, one octal digit per level.
//! Digit 0 picks the root slot, digit `LEVELS - 1` picks the leaf slot inside
//! its level-6 parent. Stored as the plain integer whose octal digits are the
//! level digits, so `0o7654321` walks slots 7, 6, 5, 4, 3, 2, 1.

use std::fmt;

use super::TreeError;

/// Number of tree levels (root included).
pub const LEVELS: usize = 7;

/// Bits per level digit.
pub const SLOT_BITS: u32 = 3;

/// Fan-out of every branch.
pub const SLOT_COUNT: usize = 1 << SLOT_BITS;

/// Total leaf slots addressable by a position.
pub const POOL_CAPACITY: u32 = 1 << (SLOT_BITS * LEVELS as u32);

const SLOT_MASK: u32 = (SLOT_COUNT as u32) - 1;

/// Address of one leaf slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position(u32);

impl Position {
    /// Validate a raw leaf index.
    pub fn new(raw: u32) -> Result<Self, TreeError> {
        if raw >= POOL_CAPACITY {
            return Err(TreeError::InvalidPosition(raw));
        }
        Ok(Self(raw))
    }

    /// Assemble a position from its level digits, root-most first.
    pub fn from_digits(digits: &[u8]) -> Result<Self, TreeError> {
        if digits.len() != LEVELS {
            return Err(TreeError::MalformedPosition(digits.len()));
        }
        let mut raw = 0u32;
        for &digit in digits {
            if usize::from(digit) >= SLOT_COUNT {
                return Err(TreeError::InvalidPosition((raw << SLOT_BITS) | u32::from(digit)));
            }
            raw = (raw << SLOT_BITS) | u32::from(digit);
        }
        Ok(Self(raw))
    }

    /// Raw leaf index.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// All level digits, root-most first.
    pub fn digits(self) -> [u8; LEVELS] {
        let mut digits = [0u8; LEVELS];
        for (level, digit) in digits.iter_mut().enumerate() {
            // slot_at never exceeds SLOT_MASK
            *digit = self.slot_at(level) as u8;
        }
        digits
    }

    /// Slot selected at `level`.
    pub fn slot(self, level: usize) -> Result<usize, TreeError> {
        if level >= LEVELS {
            return Err(TreeError::IndexOutOfRange {
                index: level,
                bound: LEVELS,
            });
        }
        Ok(self.slot_at(level))
    }

    /// Whether `level` is the last branch level, whose slots hold leaves.
    #[inline]
    pub fn is_leaf_level(level: usize) -> bool {
        level + 1 == LEVELS
    }

    #[inline]
    pub(crate) fn slot_at(self, level: usize) -> usize {
        debug_assert!(level < LEVELS);
        let shift = SLOT_BITS * (LEVELS - 1 - level) as u32;
        ((self.0 >> shift) & SLOT_MASK) as usize
    }

    /// Index of the branch at `level` that lies on this position's path.
    #[inline]
    pub(crate) fn node_at(self, level: usize) -> u32 {
        debug_assert!(level < LEVELS);
        self.0 >> (SLOT_BITS * (LEVELS - level) as u32)
    }

    /// Position following this one in allocation order.
    pub(crate) fn next(self) -> Option<Self> {
        Self::new(self.0 + 1).ok()
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0o{:07o}", self.0)
    }
}
