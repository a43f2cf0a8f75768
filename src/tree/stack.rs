//! Free-slot stack
//!
//! Vacated leaf positions, most recently freed on top. Allocation drains this
//! before touching virgin slots, so the tree only grows to its high-water mark.

use super::{Position, TreeError};

/// LIFO list of vacated positions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FreeSlotStack {
    slots: Vec<Position>,
}

impl FreeSlotStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Push a vacated position.
    pub fn push(&mut self, position: Position) {
        self.slots.push(position);
    }

    /// Pop the most recently freed position.
    pub fn pop(&mut self) -> Result<Position, TreeError> {
        self.slots.pop().ok_or(TreeError::StackEmpty)
    }

    /// Most recently freed position, if any.
    pub fn peek(&self) -> Option<Position> {
        self.slots.last().copied()
    }

    /// Whether no vacated positions are recorded.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of recorded positions.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Positions from the top of the stack down.
    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.slots.iter().rev()
    }

    /// Drop `position` wherever it sits. O(1) when it is on top.
    pub(crate) fn take(&mut self, position: Position) -> bool {
        if self.peek() == Some(position) {
            self.slots.pop();
            return true;
        }
        match self.slots.iter().rposition(|p| *p == position) {
            Some(index) => {
                self.slots.remove(index);
                true
            }
            None => false,
        }
    }
}
