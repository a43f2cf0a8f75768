//! Sortition pool
//!
//! Operators join with a weight derived from their stake, and groups are
//! drawn from the tree by seeded weighted picks with replacement.
//!
//! Recorded weights are refreshed lazily. Selection tolerates stale leaves
//! by re-drawing when a pick lands on an operator the oracle no longer
//! considers eligible, but it never rewrites the tree; only
//! [`SortitionPool::update_operator_status`] and [`SortitionPool::leave`]
//! change the weight distribution.

mod config;
mod oracle;
mod seed;

pub use config::{PoolConfig, StalenessPolicy};
pub use oracle::{OracleError, StakeOracle, StaticStakeOracle};
pub use seed::{PickIndices, Seed, SEED_LEN};

use std::collections::{HashMap, HashSet};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::operator::OperatorId;
use crate::tree::{Position, SortitionTree, TreeError};

/// Errors surfaced by pool operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Operator is already a member.
    #[error("operator {0} is already registered in the pool")]
    AlreadyMember(OperatorId),

    /// Operator is not a member.
    #[error("operator {0} is not registered in the pool")]
    NotMember(OperatorId),

    /// Operator's stake does not reach the minimum.
    #[error("operator {operator} is not eligible to join (stake {stake})")]
    IneligibleToJoin {
        /// Rejected operator.
        operator: OperatorId,
        /// Stake reported by the oracle.
        stake: u64,
    },

    /// Every leaf slot is taken.
    #[error("pool is full")]
    PoolFull,

    /// Recording `weight` for `operator` would overflow a subtree sum.
    #[error("weight {weight} of operator {operator} exceeds the pool's weight capacity")]
    WeightCapacityExceeded {
        /// Operator being written.
        operator: OperatorId,
        /// Weight derived from its stake.
        weight: u32,
    },

    /// Selection requested with no weight in the pool.
    #[error("no operators in pool")]
    EmptyPool,

    /// Every operator with recorded weight was rejected by the oracle.
    #[error("no eligible operators in pool")]
    NoEligibleOperators,

    /// Invalid pool parameters.
    #[error("invalid pool configuration: {0}")]
    InvalidConfiguration(String),

    /// Stake oracle failed; the operation was aborted before any write.
    #[error(transparent)]
    OracleUnavailable(#[from] OracleError),

    /// Tree precondition violated.
    #[error(transparent)]
    Tree(#[from] TreeError),
}

/// Whether an operator's recorded weight is known to match the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OperatorStatus {
    /// Recorded weight was current at the last sync.
    Eligible,
    /// A selection found the recorded weight out of date.
    Outdated,
}

/// Pool bookkeeping for one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Membership {
    /// Leaf holding the operator.
    pub position: Position,
    /// Sync status.
    pub status: OperatorStatus,
}

/// Outcome of [`SortitionPool::update_operator_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// Recorded weight already matched.
    Unchanged,
    /// Recorded weight was replaced.
    Reweighted {
        /// Weight before the refresh.
        from: u32,
        /// Weight after the refresh.
        to: u32,
    },
    /// Stake fell below the minimum; the operator left the pool.
    Removed,
}

/// Result of one group selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSelection {
    /// Selected operators in pick order; may repeat.
    pub members: Vec<OperatorId>,
    /// Operators found with outdated weights, in discovery order.
    pub outdated: Vec<OperatorId>,
    /// Pick indices drawn, including re-draws.
    pub attempts: u64,
}

/// Weighted operator pool synchronised against a stake oracle.
#[derive(Debug)]
pub struct SortitionPool<O> {
    tree: SortitionTree,
    members: HashMap<OperatorId, Membership>,
    oracle: O,
    config: PoolConfig,
}

impl<O: StakeOracle> SortitionPool<O> {
    /// Create an empty pool.
    pub fn new(oracle: O, config: PoolConfig) -> Self {
        Self {
            tree: SortitionTree::new(),
            members: HashMap::new(),
            oracle,
            config,
        }
    }

    /// Pool parameters.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Stake oracle backing this pool.
    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    /// Underlying tree.
    pub fn tree(&self) -> &SortitionTree {
        &self.tree
    }

    /// Number of members.
    pub fn operators_in_pool(&self) -> usize {
        self.members.len()
    }

    /// Sum of recorded weights.
    pub fn total_weight(&self) -> u64 {
        self.tree.total_weight()
    }

    /// Whether `operator` is a member.
    pub fn is_operator_in_pool(&self, operator: &OperatorId) -> bool {
        self.members.contains_key(operator)
    }

    /// Membership record of `operator`.
    pub fn membership(&self, operator: &OperatorId) -> Option<Membership> {
        self.members.get(operator).copied()
    }

    /// Sync status of `operator`.
    pub fn operator_status(&self, operator: &OperatorId) -> Option<OperatorStatus> {
        self.members.get(operator).map(|m| m.status)
    }

    /// Weight recorded in the tree for `operator`.
    pub fn recorded_weight(&self, operator: &OperatorId) -> Option<u32> {
        let membership = self.members.get(operator)?;
        self.tree.leaf(membership.position).map(|leaf| leaf.weight)
    }

    /// Weight the oracle currently supports for `operator`.
    pub fn current_weight(&self, operator: &OperatorId) -> Result<u32, PoolError> {
        let stake = self.oracle.eligible_stake(operator)?;
        Ok(self.config.weight_for_stake(stake))
    }

    /// Add `operator` with its current oracle weight.
    pub fn join(&mut self, operator: OperatorId) -> Result<Position, PoolError> {
        if self.members.contains_key(&operator) {
            return Err(PoolError::AlreadyMember(operator));
        }
        let stake = self.oracle.eligible_stake(&operator)?;
        let weight = self.config.weight_for_stake(stake);
        if weight == 0 {
            return Err(PoolError::IneligibleToJoin { operator, stake });
        }

        let position = self
            .tree
            .insert_operator(operator, weight)
            .map_err(|err| match err {
                TreeError::TreeFull => PoolError::PoolFull,
                TreeError::WeightOverflow { weight, .. } => {
                    PoolError::WeightCapacityExceeded { operator, weight }
                }
                other => PoolError::Tree(other),
            })?;
        self.members.insert(
            operator,
            Membership {
                position,
                status: OperatorStatus::Eligible,
            },
        );

        info!(%operator, %position, weight, "operator joined pool");
        Ok(position)
    }

    /// Remove `operator` regardless of its stake.
    pub fn leave(&mut self, operator: &OperatorId) -> Result<(), PoolError> {
        let position = self
            .members
            .get(operator)
            .map(|m| m.position)
            .ok_or(PoolError::NotMember(*operator))?;
        self.tree.remove(position)?;
        self.members.remove(operator);

        info!(%operator, %position, "operator left pool");
        Ok(())
    }

    /// Re-sync `operator`'s recorded weight with the oracle.
    ///
    /// An operator whose stake dropped below the minimum is removed and must
    /// join again later.
    pub fn update_operator_status(
        &mut self,
        operator: &OperatorId,
    ) -> Result<StatusUpdate, PoolError> {
        let membership = *self
            .members
            .get(operator)
            .ok_or(PoolError::NotMember(*operator))?;
        let weight = self.current_weight(operator)?;

        if weight == 0 {
            self.tree.remove(membership.position)?;
            self.members.remove(operator);
            info!(%operator, "operator no longer eligible, removed from pool");
            return Ok(StatusUpdate::Removed);
        }

        let recorded = self
            .tree
            .leaf(membership.position)
            .ok_or(TreeError::SlotEmpty(membership.position))?
            .weight;
        let update = if recorded == weight {
            StatusUpdate::Unchanged
        } else {
            self.tree
                .update_weight(membership.position, weight)
                .map_err(|err| match err {
                    TreeError::WeightOverflow { weight, .. } => PoolError::WeightCapacityExceeded {
                        operator: *operator,
                        weight,
                    },
                    other => PoolError::Tree(other),
                })?;
            info!(%operator, from = recorded, to = weight, "operator weight updated");
            StatusUpdate::Reweighted {
                from: recorded,
                to: weight,
            }
        };

        if let Some(entry) = self.members.get_mut(operator) {
            entry.status = OperatorStatus::Eligible;
        }
        Ok(update)
    }

    /// Draw `group_size` operators, with replacement, from the current
    /// weight distribution.
    ///
    /// A pick landing on a stale operator that the staleness policy rejects
    /// is re-drawn with the next index; the tree is left untouched, so the
    /// same operators keep their share of the weight until refreshed.
    /// Operators found stale are marked [`OperatorStatus::Outdated`].
    ///
    /// Re-draws are unbounded: each pick succeeds with probability equal to
    /// the accepted share of the recorded weight, so when rejected operators
    /// hold nearly all of it the expected number of attempts grows as the
    /// inverse of that share. Refresh stale operators with
    /// [`SortitionPool::update_operator_status`] to keep selection cheap.
    ///
    /// A failed oracle read aborts the selection before any status changes.
    pub fn select_group(
        &mut self,
        group_size: usize,
        seed: Seed,
    ) -> Result<GroupSelection, PoolError> {
        let total = self.tree.total_weight();
        if total == 0 {
            return Err(PoolError::EmptyPool);
        }

        let mut indices = PickIndices::new(seed);
        let mut members = Vec::with_capacity(group_size);
        let mut current: HashMap<OperatorId, u32> = HashMap::new();
        let mut outdated = Vec::new();
        let mut rejected = HashSet::new();
        let mut rejected_weight = 0u64;

        while members.len() < group_size {
            let index = indices.next_below(total);
            let (position, leaf) = self.tree.pick(index)?;
            if rejected.contains(&position) {
                continue;
            }

            let weight = match current.get(&leaf.operator) {
                Some(weight) => *weight,
                None => {
                    let weight = self.current_weight(&leaf.operator)?;
                    current.insert(leaf.operator, weight);
                    if weight != leaf.weight {
                        warn!(
                            operator = %leaf.operator,
                            recorded = leaf.weight,
                            current = weight,
                            "picked operator has outdated weight"
                        );
                        outdated.push(leaf.operator);
                    }
                    weight
                }
            };

            let skip = weight != leaf.weight
                && match self.config.staleness {
                    StalenessPolicy::SkipIneligible => weight == 0,
                    StalenessPolicy::SkipOutdated => true,
                };
            if skip {
                rejected.insert(position);
                rejected_weight += u64::from(leaf.weight);
                debug!(%position, operator = %leaf.operator, "pick rejected, drawing again");
                if rejected_weight >= total {
                    return Err(PoolError::NoEligibleOperators);
                }
                continue;
            }

            debug!(index, %position, operator = %leaf.operator, "picked operator");
            members.push(leaf.operator);
        }

        for operator in &outdated {
            if let Some(entry) = self.members.get_mut(operator) {
                entry.status = OperatorStatus::Outdated;
            }
        }

        Ok(GroupSelection {
            members,
            outdated,
            attempts: indices.attempts(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const MIN_STAKE: u64 = 2000;

    fn seed() -> Seed {
        "0xff39d6cca87853892d2854566e883008bc".parse().unwrap()
    }

    fn operator(n: u64) -> OperatorId {
        OperatorId::from_low_u64(n)
    }

    fn pool() -> (Arc<StaticStakeOracle>, SortitionPool<Arc<StaticStakeOracle>>) {
        let oracle = Arc::new(StaticStakeOracle::new());
        let pool = SortitionPool::new(Arc::clone(&oracle), PoolConfig::new(MIN_STAKE).unwrap());
        (oracle, pool)
    }

    #[test]
    fn join_records_oracle_weight() {
        let (oracle, mut pool) = pool();
        oracle.set_stake(operator(1), 20_000);

        let position = pool.join(operator(1)).unwrap();
        assert_eq!(pool.recorded_weight(&operator(1)), Some(10));
        assert_eq!(
            pool.membership(&operator(1)),
            Some(Membership {
                position,
                status: OperatorStatus::Eligible
            })
        );
        assert_eq!(pool.operators_in_pool(), 1);
    }

    #[test]
    fn join_rejects_members_and_low_stake() {
        let (oracle, mut pool) = pool();
        oracle.set_stake(operator(1), 2000);
        oracle.set_stake(operator(2), 1999);
        pool.join(operator(1)).unwrap();

        assert_eq!(pool.join(operator(1)), Err(PoolError::AlreadyMember(operator(1))));
        assert_eq!(
            pool.join(operator(2)),
            Err(PoolError::IneligibleToJoin {
                operator: operator(2),
                stake: 1999
            })
        );
        assert_eq!(pool.operators_in_pool(), 1);
    }

    #[test]
    fn update_status_of_non_member_fails() {
        let (_oracle, mut pool) = pool();
        assert_eq!(
            pool.update_operator_status(&operator(9)),
            Err(PoolError::NotMember(operator(9)))
        );
        assert_eq!(pool.leave(&operator(9)), Err(PoolError::NotMember(operator(9))));
    }

    #[test]
    fn update_status_reweights_and_removes() {
        let (oracle, mut pool) = pool();
        oracle.set_stake(operator(1), 4000);
        oracle.set_stake(operator(2), 4000);
        pool.join(operator(1)).unwrap();
        pool.join(operator(2)).unwrap();

        assert_eq!(pool.update_operator_status(&operator(1)), Ok(StatusUpdate::Unchanged));

        oracle.set_stake(operator(1), 10_000);
        assert_eq!(
            pool.update_operator_status(&operator(1)),
            Ok(StatusUpdate::Reweighted { from: 2, to: 5 })
        );
        assert_eq!(pool.total_weight(), 7);

        oracle.set_stake(operator(2), 0);
        assert_eq!(pool.update_operator_status(&operator(2)), Ok(StatusUpdate::Removed));
        assert!(!pool.is_operator_in_pool(&operator(2)));
        assert_eq!(pool.total_weight(), 5);
    }

    #[test]
    fn rejoin_reuses_freed_position() {
        let (oracle, mut pool) = pool();
        for n in 1..=3 {
            oracle.set_stake(operator(n), 2000);
            pool.join(operator(n)).unwrap();
        }
        let freed = pool.membership(&operator(2)).unwrap().position;
        pool.leave(&operator(2)).unwrap();

        oracle.set_stake(operator(4), 2000);
        assert_eq!(pool.join(operator(4)), Ok(freed));
    }

    #[test]
    fn select_from_empty_pool_fails() {
        let (_oracle, mut pool) = pool();
        assert_eq!(pool.select_group(3, seed()), Err(PoolError::EmptyPool));
    }

    #[test]
    fn selection_marks_stale_picks_outdated() {
        let (oracle, mut pool) = pool();
        oracle.set_stake(operator(1), 2000);
        oracle.set_stake(operator(2), 4_000_000);
        pool.join(operator(1)).unwrap();
        pool.join(operator(2)).unwrap();
        oracle.set_stake(operator(2), 1000);

        let selection = pool.select_group(5, seed()).unwrap();
        assert_eq!(selection.members, vec![operator(1); 5]);
        assert_eq!(selection.outdated, vec![operator(2)]);
        assert!(selection.attempts > 5);
        assert_eq!(pool.operator_status(&operator(2)), Some(OperatorStatus::Outdated));
        assert_eq!(pool.operator_status(&operator(1)), Some(OperatorStatus::Eligible));
        assert_eq!(pool.recorded_weight(&operator(2)), Some(2000));
    }

    #[test]
    fn selection_gives_up_when_nobody_is_eligible() {
        let (oracle, mut pool) = pool();
        oracle.set_stake(operator(1), 2000);
        pool.join(operator(1)).unwrap();
        oracle.set_stake(operator(1), 0);

        assert_eq!(pool.select_group(1, seed()), Err(PoolError::NoEligibleOperators));
    }

    #[test]
    fn zero_sized_group_is_empty() {
        let (oracle, mut pool) = pool();
        oracle.set_stake(operator(1), 2000);
        pool.join(operator(1)).unwrap();

        let selection = pool.select_group(0, seed()).unwrap();
        assert!(selection.members.is_empty());
        assert_eq!(selection.attempts, 0);
    }
}
