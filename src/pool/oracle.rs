//! External stake oracle
//!
//! The pool never stores stake. It asks the oracle at join, refresh and pick
//! time and converts the answer to a weight.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::operator::OperatorId;

/// Failure to obtain a stake reading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// The oracle could not be reached or refused the query.
    #[error("stake oracle unavailable: {0}")]
    Unavailable(String),
}

/// Source of truth for each operator's current eligible stake.
pub trait StakeOracle {
    /// Current eligible stake of `operator`; unknown operators have zero.
    fn eligible_stake(&self, operator: &OperatorId) -> Result<u64, OracleError>;
}

impl<T: StakeOracle + ?Sized> StakeOracle for &T {
    fn eligible_stake(&self, operator: &OperatorId) -> Result<u64, OracleError> {
        (**self).eligible_stake(operator)
    }
}

impl<T: StakeOracle + ?Sized> StakeOracle for Arc<T> {
    fn eligible_stake(&self, operator: &OperatorId) -> Result<u64, OracleError> {
        (**self).eligible_stake(operator)
    }
}

/// In-memory stake table.
#[derive(Debug, Default)]
pub struct StaticStakeOracle {
    stakes: RwLock<HashMap<OperatorId, u64>>,
}

impl StaticStakeOracle {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `stake` for `operator`, replacing any previous value.
    pub fn set_stake(&self, operator: OperatorId, stake: u64) {
        let mut stakes = match self.stakes.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        stakes.insert(operator, stake);
    }
}

impl FromIterator<(OperatorId, u64)> for StaticStakeOracle {
    fn from_iter<I: IntoIterator<Item = (OperatorId, u64)>>(iter: I) -> Self {
        Self {
            stakes: RwLock::new(iter.into_iter().collect()),
        }
    }
}

impl StakeOracle for StaticStakeOracle {
    fn eligible_stake(&self, operator: &OperatorId) -> Result<u64, OracleError> {
        let stakes = self
            .stakes
            .read()
            .map_err(|_| OracleError::Unavailable("stake table lock poisoned".to_string()))?;
        Ok(stakes.get(operator).copied().unwrap_or(0))
    }
}
