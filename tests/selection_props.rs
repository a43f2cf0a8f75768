use proptest::prelude::*;
use sortition::{OperatorId, PoolConfig, Seed, SortitionPool, StaticStakeOracle};

fn pool_with(stakes: &[u64]) -> SortitionPool<StaticStakeOracle> {
    let oracle: StaticStakeOracle = stakes
        .iter()
        .enumerate()
        .map(|(i, stake)| (OperatorId::from_low_u64(i as u64 + 1), *stake))
        .collect();
    let mut pool = SortitionPool::new(oracle, PoolConfig::new(100).unwrap());
    for i in 0..stakes.len() {
        pool.join(OperatorId::from_low_u64(i as u64 + 1)).unwrap();
    }
    pool
}

proptest! {
    #[test]
    fn group_has_requested_size(
        stakes in proptest::collection::vec(100u64..1_000_000, 1..12),
        group_size in 0usize..300,
        seed in any::<[u8; 32]>(),
    ) {
        let mut pool = pool_with(&stakes);
        let selection = pool.select_group(group_size, Seed::new(seed)).unwrap();
        prop_assert_eq!(selection.members.len(), group_size);
        for member in &selection.members {
            prop_assert!(pool.is_operator_in_pool(member));
        }
    }

    #[test]
    fn same_seed_same_group(
        stakes in proptest::collection::vec(100u64..1_000_000, 1..12),
        seed in any::<[u8; 32]>(),
    ) {
        let mut first = pool_with(&stakes);
        let mut second = pool_with(&stakes);
        let seed = Seed::new(seed);
        prop_assert_eq!(
            first.select_group(32, seed).unwrap(),
            second.select_group(32, seed).unwrap()
        );
    }
}
