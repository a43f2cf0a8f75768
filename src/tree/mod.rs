//! Weighted sortition tree
//!
//! Seven levels of 8-way packed branches over 2^21 leaf slots. Every branch
//! slot holds the weight sum of the subtree beneath it, so insert, remove,
//! reweight and weighted pick each touch one node per level.
//!
//! Storage is sparse: only branches and leaf groups with at least one
//! non-empty slot are kept.

mod node;
mod position;
mod stack;

pub use node::{Branch, Leaf, LeafNode, PackedNode, Slot, PACKED_BYTES, SLOT_WIDTH};
pub use position::{Position, LEVELS, POOL_CAPACITY, SLOT_BITS, SLOT_COUNT};
pub use stack::FreeSlotStack;

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::operator::OperatorId;

const LEAF_PARENT_LEVEL: usize = LEVELS - 1;

/// Structural errors: the caller violated a tree precondition.
///
/// Every operation checks its preconditions before writing, so an error
/// leaves the tree exactly as it was.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Raw position exceeds the tree's slot capacity.
    #[error("position {0:#o} is outside the tree")]
    InvalidPosition(u32),

    /// Sub-field or level index past its bound.
    #[error("index {index} out of range (bound {bound})")]
    IndexOutOfRange {
        /// Requested index.
        index: usize,
        /// Exclusive upper bound.
        bound: usize,
    },

    /// Target leaf slot already holds an operator.
    #[error("leaf slot {0} is occupied")]
    SlotOccupied(Position),

    /// Target leaf slot is vacant.
    #[error("leaf slot {0} is empty")]
    SlotEmpty(Position),

    /// Pop from an empty free-slot stack.
    #[error("free-slot stack is empty")]
    StackEmpty,

    /// Pick requested while the total weight is zero.
    #[error("tree holds no weight")]
    EmptyTree,

    /// Pick index not below the total weight.
    #[error("pick index {index} out of range (total weight {total})")]
    WeightOutOfRange {
        /// Requested index.
        index: u64,
        /// Total weight at the time of the pick.
        total: u64,
    },

    /// Zero weights are never stored.
    #[error("weight must be non-zero")]
    ZeroWeight,

    /// Writing the leaf would push a subtree sum past its sub-field width.
    #[error("weight {weight} at {position} overflows a subtree sum")]
    WeightOverflow {
        /// Leaf being written.
        position: Position,
        /// Weight that did not fit.
        weight: u32,
    },

    /// Digit string of the wrong length for a position.
    #[error("position needs 7 digits, got {0}")]
    MalformedPosition(usize),

    /// The all-zero address marks empty slots and cannot be inserted.
    #[error("operator address {0} is reserved")]
    ReservedOperator(OperatorId),

    /// Operator already has a leaf.
    #[error("operator {0} is already registered in the pool")]
    OperatorAlreadyRegistered(OperatorId),

    /// Operator has no leaf.
    #[error("operator {0} is not registered in the pool")]
    OperatorNotRegistered(OperatorId),

    /// No free or virgin slot remains.
    #[error("no free leaf slot remains")]
    TreeFull,
}

/// Sparse packed sum tree with free-slot reuse.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SortitionTree {
    /// Non-empty branches per level, keyed by node index.
    branches: Vec<HashMap<u32, Branch>>,
    /// Non-empty leaf groups, keyed by their parent branch index.
    leaves: HashMap<u32, LeafNode>,
    operators: HashMap<OperatorId, Position>,
    free_slots: FreeSlotStack,
    /// Lowest never-allocated position; `None` once exhausted.
    next_virgin: Option<Position>,
}

impl Default for SortitionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SortitionTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self {
            branches: vec![HashMap::new(); LEVELS],
            leaves: HashMap::new(),
            operators: HashMap::new(),
            free_slots: FreeSlotStack::new(),
            next_virgin: Position::new(0).ok(),
        }
    }

    /// Packed root branch.
    pub fn root(&self) -> Branch {
        self.branch(0, 0)
    }

    /// Sum of all stored weights.
    pub fn total_weight(&self) -> u64 {
        self.root().total()
    }

    /// Number of occupied leaves.
    pub fn operators_in_pool(&self) -> usize {
        self.operators.len()
    }

    /// Whether `operator` has a leaf.
    pub fn is_operator_registered(&self, operator: &OperatorId) -> bool {
        self.operators.contains_key(operator)
    }

    /// Position of `operator`'s leaf.
    pub fn position_of(&self, operator: &OperatorId) -> Option<Position> {
        self.operators.get(operator).copied()
    }

    /// Occupied leaf at `position`.
    pub fn leaf(&self, position: Position) -> Option<Leaf> {
        let leaf = self.leaf_slot(position);
        (!leaf.is_vacant()).then_some(leaf)
    }

    /// Branch `node` at `level`; vacant branches read as empty.
    pub fn branch_at(&self, level: usize, node: u32) -> Result<Branch, TreeError> {
        if level >= LEVELS {
            return Err(TreeError::IndexOutOfRange {
                index: level,
                bound: LEVELS,
            });
        }
        Ok(self.branch(level, node))
    }

    /// Vacated positions awaiting reuse.
    pub fn free_slots(&self) -> &FreeSlotStack {
        &self.free_slots
    }

    /// Write `operator` with `weight` into the vacant slot at `position`.
    pub fn insert(
        &mut self,
        position: Position,
        operator: OperatorId,
        weight: u32,
    ) -> Result<(), TreeError> {
        if weight == 0 {
            return Err(TreeError::ZeroWeight);
        }
        if operator.is_zero() {
            return Err(TreeError::ReservedOperator(operator));
        }
        if !self.leaf_slot(position).is_vacant() {
            return Err(TreeError::SlotOccupied(position));
        }
        if self.operators.contains_key(&operator) {
            return Err(TreeError::OperatorAlreadyRegistered(operator));
        }

        let path = self.path_with(position, weight)?;
        self.commit(position, Leaf::new(operator, weight), path);
        self.operators.insert(operator, position);
        self.free_slots.take(position);
        if self.next_virgin == Some(position) {
            self.next_virgin = position.next();
        }

        debug!(%position, %operator, weight, "inserted leaf");
        Ok(())
    }

    /// Clear the leaf at `position` and queue the slot for reuse.
    pub fn remove(&mut self, position: Position) -> Result<Leaf, TreeError> {
        let leaf = self
            .leaf(position)
            .ok_or(TreeError::SlotEmpty(position))?;

        let path = self.path_with(position, 0)?;
        self.commit(position, Leaf::default(), path);
        self.operators.remove(&leaf.operator);
        self.free_slots.push(position);

        debug!(%position, operator = %leaf.operator, weight = leaf.weight, "removed leaf");
        Ok(leaf)
    }

    /// Replace the weight at `position`, keeping its operator. Returns the
    /// previous weight.
    pub fn update_weight(&mut self, position: Position, weight: u32) -> Result<u32, TreeError> {
        let leaf = self
            .leaf(position)
            .ok_or(TreeError::SlotEmpty(position))?;
        if weight == 0 {
            return Err(TreeError::ZeroWeight);
        }

        let path = self.path_with(position, weight)?;
        self.commit(position, Leaf::new(leaf.operator, weight), path);

        debug!(%position, operator = %leaf.operator, from = leaf.weight, to = weight, "reweighted leaf");
        Ok(leaf.weight)
    }

    /// Leaf whose cumulative weight range contains `index`.
    ///
    /// Walks from the root, at each level skipping children whose sums lie
    /// wholly below the remaining index.
    pub fn pick(&self, index: u64) -> Result<(Position, Leaf), TreeError> {
        let total = self.total_weight();
        if total == 0 {
            return Err(TreeError::EmptyTree);
        }
        if index >= total {
            return Err(TreeError::WeightOutOfRange { index, total });
        }

        let mut node = 0u32;
        let mut remaining = index;
        for level in 0..LEVELS {
            let (slot, offset) = self
                .branch(level, node)
                .pick_slot(remaining)
                .ok_or(TreeError::WeightOutOfRange { index, total })?;
            node = (node << SLOT_BITS) | slot as u32;
            remaining = offset;
        }

        let position = Position::new(node)?;
        let leaf = self.leaf(position).ok_or(TreeError::SlotEmpty(position))?;
        Ok((position, leaf))
    }

    /// Slot the allocator would hand out next: top of the free stack, else
    /// the lowest vacant virgin slot.
    pub fn next_free_position(&self) -> Result<Position, TreeError> {
        if let Some(position) = self.free_slots.peek() {
            return Ok(position);
        }
        let mut cursor = self.next_virgin;
        while let Some(position) = cursor {
            if self.leaf_slot(position).is_vacant() {
                return Ok(position);
            }
            cursor = position.next();
        }
        Err(TreeError::TreeFull)
    }

    /// Insert `operator` at the next free position.
    pub fn insert_operator(
        &mut self,
        operator: OperatorId,
        weight: u32,
    ) -> Result<Position, TreeError> {
        if self.operators.contains_key(&operator) {
            return Err(TreeError::OperatorAlreadyRegistered(operator));
        }
        let position = self.next_free_position()?;
        self.insert(position, operator, weight)?;
        Ok(position)
    }

    /// Remove `operator`'s leaf.
    pub fn remove_operator(&mut self, operator: &OperatorId) -> Result<Leaf, TreeError> {
        let position = self
            .position_of(operator)
            .ok_or(TreeError::OperatorNotRegistered(*operator))?;
        self.remove(position)
    }

    /// Occupied leaves with their positions, in no particular order.
    pub fn leaves(&self) -> impl Iterator<Item = (Position, Leaf)> + '_ {
        self.operators
            .values()
            .map(|&position| (position, self.leaf_slot(position)))
    }

    #[inline]
    fn branch(&self, level: usize, node: u32) -> Branch {
        self.branches[level].get(&node).copied().unwrap_or_default()
    }

    fn leaf_slot(&self, position: Position) -> Leaf {
        self.leaves
            .get(&position.node_at(LEAF_PARENT_LEVEL))
            .map(|group| group.slot(position.slot_at(LEAF_PARENT_LEVEL)))
            .unwrap_or_default()
    }

    /// Branches on `position`'s path, leaf parent first, as they would read
    /// with the leaf weight set to `weight`.
    ///
    /// Every non-root branch sum must fit its parent's sub-field; the root's
    /// slots are summed exactly by [`Branch::total`].
    fn path_with(
        &self,
        position: Position,
        weight: u32,
    ) -> Result<[(u32, Branch); LEVELS], TreeError> {
        let mut path = [(0u32, Branch::empty()); LEVELS];
        let mut child_weight = weight;
        for (step, level) in (0..LEVELS).rev().enumerate() {
            let node = position.node_at(level);
            let mut branch = self.branch(level, node);
            branch.replace(position.slot_at(level), child_weight);
            if level > 0 {
                child_weight = branch
                    .weight()
                    .ok_or(TreeError::WeightOverflow { position, weight })?;
            }
            path[step] = (node, branch);
        }
        Ok(path)
    }

    fn commit(&mut self, position: Position, leaf: Leaf, path: [(u32, Branch); LEVELS]) {
        let group_key = position.node_at(LEAF_PARENT_LEVEL);
        let mut group = self.leaves.get(&group_key).copied().unwrap_or_default();
        group.replace(position.slot_at(LEAF_PARENT_LEVEL), leaf);
        store(&mut self.leaves, group_key, group);

        for (step, (node, branch)) in path.into_iter().enumerate() {
            store(&mut self.branches[LEVELS - 1 - step], node, branch);
        }
    }
}

fn store<S: Slot>(level: &mut HashMap<u32, PackedNode<S>>, key: u32, node: PackedNode<S>) {
    if node.is_empty() {
        level.remove(&key);
    } else {
        level.insert(key, node);
    }
}
