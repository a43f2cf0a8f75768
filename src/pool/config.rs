//! Pool configuration

use super::PoolError;

/// How selection treats a picked operator whose recorded weight no longer
/// matches the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum StalenessPolicy {
    /// Skip the pick only when the current weight is below the threshold.
    #[default]
    SkipIneligible,
    /// Skip any pick whose recorded weight is outdated.
    SkipOutdated,
}

/// Parameters of a sortition pool.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Stake worth one unit of weight; operators below it cannot join.
    pub minimum_stake: u64,
    /// Treatment of stale picks during selection.
    pub staleness: StalenessPolicy,
}

impl PoolConfig {
    /// Configuration with the default staleness policy.
    pub fn new(minimum_stake: u64) -> Result<Self, PoolError> {
        if minimum_stake == 0 {
            return Err(PoolError::InvalidConfiguration(
                "minimum stake must be > 0".to_string(),
            ));
        }
        Ok(Self {
            minimum_stake,
            staleness: StalenessPolicy::default(),
        })
    }

    /// Set the staleness policy.
    pub fn with_staleness(mut self, staleness: StalenessPolicy) -> Self {
        self.staleness = staleness;
        self
    }

    /// Weight for `stake`: `floor(stake / minimum_stake)`, clamped to the
    /// leaf sub-field width.
    pub fn weight_for_stake(&self, stake: u64) -> u32 {
        let units = stake / self.minimum_stake.max(1);
        u32::try_from(units).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, 0 ; "no stake")]
    #[test_case(1999, 0 ; "just below minimum")]
    #[test_case(2000, 1 ; "exact minimum")]
    #[test_case(4_000_000, 2000 ; "large stake")]
    #[test_case(390_000, 195 ; "rounds down")]
    #[test_case(u64::MAX, u32::MAX ; "clamped")]
    fn weight_is_stake_in_minimum_units(stake: u64, weight: u32) {
        let config = PoolConfig::new(2000).unwrap();
        assert_eq!(config.weight_for_stake(stake), weight);
    }

    #[test]
    fn zero_minimum_stake_is_rejected() {
        assert!(matches!(
            PoolConfig::new(0),
            Err(PoolError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn staleness_defaults_to_skip_ineligible() {
        let config = PoolConfig::new(1).unwrap();
        assert_eq!(config.staleness, StalenessPolicy::SkipIneligible);
        let config = config.with_staleness(StalenessPolicy::SkipOutdated);
        assert_eq!(config.staleness, StalenessPolicy::SkipOutdated);
    }
}
