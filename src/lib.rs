//! # Stake-Weighted Sortition
//!
//! Deterministic selection of operator groups from a pool, where each
//! operator's chance of being picked is proportional to a weight derived
//! from its stake. Anyone holding the seed and the pool's recorded state can
//! recompute the same group.
//!
//! ## Structure
//!
//! 1. **Position codec**: 7 octal digits address one of 2^21 leaves
//! 2. **Packed nodes**: 8 fixed-width sub-fields per node, weight sums above
//!    the leaves and `(operator, weight)` pairs at the bottom
//! 3. **Free-slot stack**: vacated leaves are reused last-in first-out
//! 4. **Sortition tree**: insert, remove, reweight and pick in O(height)
//! 5. **Sortition pool**: membership, lazy sync against a stake oracle, and
//!    seeded group selection with replacement
//!
//! ## Usage Example
//!
//! ```
//! use sortition::{OperatorId, PoolConfig, SortitionPool, StaticStakeOracle};
//!
//! let oracle = StaticStakeOracle::new();
//! let alice = OperatorId::from_low_u64(1);
//! oracle.set_stake(alice, 20_000);
//!
//! let mut pool = SortitionPool::new(oracle, PoolConfig::new(2_000)?);
//! pool.join(alice)?;
//!
//! let group = pool.select_group(3, "0x01".parse()?)?;
//! assert_eq!(group.members, vec![alice; 3]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

#![warn(missing_docs, missing_debug_implementations)]

pub mod operator; // Operator identities
pub mod pool;     // Membership, oracle sync, group selection
pub mod tree;     // Packed weighted sum tree

// Re-exports for convenience
pub use operator::{OperatorId, ParseIdError};
pub use pool::{
    GroupSelection, Membership, OperatorStatus, OracleError, PoolConfig, PoolError, Seed,
    SortitionPool, StakeOracle, StalenessPolicy, StaticStakeOracle, StatusUpdate,
};
pub use tree::{Branch, FreeSlotStack, Leaf, Position, SortitionTree, TreeError};
