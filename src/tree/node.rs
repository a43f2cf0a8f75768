//! Packed tree nodes
//!
//! A node holds one fixed-width sub-field per child. Branch sub-fields are
//! 32-bit weight sums; leaf sub-fields are `(operator, weight)` pairs.
//! Slot 0 is the most-significant sub-field of the packed word.

use std::fmt;

use bitvec::prelude::*;

use super::position::SLOT_COUNT;
use super::TreeError;
use crate::operator::OperatorId;

/// Width of one branch sub-field in bits.
pub const SLOT_WIDTH: usize = 32;

/// Bytes in a packed branch word.
pub const PACKED_BYTES: usize = SLOT_COUNT * SLOT_WIDTH / 8;

/// A value that can occupy a node sub-field.
pub trait Slot: Copy + Default + PartialEq + fmt::Debug {
    /// Whether this value is the empty sentinel.
    fn is_vacant(&self) -> bool;
}

impl Slot for u32 {
    #[inline]
    fn is_vacant(&self) -> bool {
        *self == 0
    }
}

/// Operator and weight stored in a leaf slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Leaf {
    /// Operator occupying the slot.
    pub operator: OperatorId,
    /// Weight recorded when the leaf was last written.
    pub weight: u32,
}

impl Leaf {
    /// Build an occupied leaf.
    pub fn new(operator: OperatorId, weight: u32) -> Self {
        Self { operator, weight }
    }
}

impl Slot for Leaf {
    #[inline]
    fn is_vacant(&self) -> bool {
        self.weight == 0 && self.operator.is_zero()
    }
}

/// Fixed-width node of `SLOT_COUNT` sub-fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PackedNode<S> {
    slots: [S; SLOT_COUNT],
}

/// Internal node: per-child weight sums.
pub type Branch = PackedNode<u32>;

/// Leaf-level node: per-slot operator records.
pub type LeafNode = PackedNode<Leaf>;

impl<S: Slot> PackedNode<S> {
    /// Node with every slot vacant.
    pub fn empty() -> Self {
        Self {
            slots: [S::default(); SLOT_COUNT],
        }
    }

    /// Read slot `index`.
    pub fn get(&self, index: usize) -> Result<S, TreeError> {
        self.slots
            .get(index)
            .copied()
            .ok_or(TreeError::IndexOutOfRange {
                index,
                bound: SLOT_COUNT,
            })
    }

    /// Copy of this node with slot `index` replaced by `value`.
    pub fn set(&self, index: usize, value: S) -> Result<Self, TreeError> {
        if index >= SLOT_COUNT {
            return Err(TreeError::IndexOutOfRange {
                index,
                bound: SLOT_COUNT,
            });
        }
        let mut next = *self;
        next.slots[index] = value;
        Ok(next)
    }

    /// Whether slot `index` holds the empty sentinel.
    pub fn is_empty_slot(&self, index: usize) -> Result<bool, TreeError> {
        self.get(index).map(|slot| slot.is_vacant())
    }

    /// Whether every slot is vacant.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Slot::is_vacant)
    }

    /// Iterate slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = &S> {
        self.slots.iter()
    }

    #[inline]
    pub(crate) fn slot(&self, index: usize) -> S {
        self.slots[index]
    }

    #[inline]
    pub(crate) fn replace(&mut self, index: usize, value: S) {
        self.slots[index] = value;
    }
}

impl Branch {
    /// Sum of all sub-fields as the parent's sub-field, or `None` if it does
    /// not fit.
    pub fn weight(&self) -> Option<u32> {
        self.slots
            .iter()
            .try_fold(0u32, |acc, w| acc.checked_add(*w))
    }

    /// Exact sum of all sub-fields.
    pub fn total(&self) -> u64 {
        self.slots.iter().map(|w| u64::from(*w)).sum()
    }

    /// Child slot whose cumulative range contains `index`, plus the offset
    /// of `index` within that child.
    pub fn pick_slot(&self, index: u64) -> Option<(usize, u64)> {
        let mut remaining = index;
        for (slot, weight) in self.slots.iter().enumerate() {
            let weight = u64::from(*weight);
            if remaining < weight {
                return Some((slot, remaining));
            }
            remaining -= weight;
        }
        None
    }

    /// Packed word, slot 0 in the most-significant bits.
    pub fn to_packed_bytes(&self) -> [u8; PACKED_BYTES] {
        let mut word = BitArray::<[u8; PACKED_BYTES], Msb0>::new([0u8; PACKED_BYTES]);
        for (index, weight) in self.slots.iter().enumerate() {
            word[index * SLOT_WIDTH..(index + 1) * SLOT_WIDTH].store_be(*weight);
        }
        word.into_inner()
    }

    /// Inverse of [`Branch::to_packed_bytes`].
    pub fn from_packed_bytes(bytes: [u8; PACKED_BYTES]) -> Self {
        let word = BitArray::<[u8; PACKED_BYTES], Msb0>::new(bytes);
        let mut branch = Self::empty();
        for (index, slot) in branch.slots.iter_mut().enumerate() {
            *slot = word[index * SLOT_WIDTH..(index + 1) * SLOT_WIDTH].load_be::<u32>();
        }
        branch
    }
}

/// Renders the packed word as a hex number without leading zeros.
impl fmt::LowerHex for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = hex::encode(self.to_packed_bytes());
        let digits = match encoded.trim_start_matches('0') {
            "" => "0",
            digits => digits,
        };
        if f.alternate() {
            f.write_str("0x")?;
        }
        f.write_str(digits)
    }
}
