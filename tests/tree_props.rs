use std::collections::HashMap;

use proptest::prelude::*;
use sortition::tree::{Branch, Leaf, LeafNode, PackedNode, Position, SLOT_COUNT};
use sortition::{OperatorId, SortitionTree, TreeError};

#[derive(Debug, Clone)]
enum Op {
    Insert(u64, u32),
    Remove(u64),
    Reweight(u64, u32),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    let op = prop_oneof![
        (1u64..24, 1u32..1_000_000).prop_map(|(id, w)| Op::Insert(id, w)),
        (1u64..24).prop_map(Op::Remove),
        (1u64..24, 1u32..1_000_000).prop_map(|(id, w)| Op::Reweight(id, w)),
    ];
    proptest::collection::vec(op, 1..128)
}

proptest! {
    #[test]
    fn root_sum_matches_occupied_leaves(ops in ops()) {
        let mut tree = SortitionTree::new();
        let mut model: HashMap<OperatorId, u32> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(id, weight) => {
                    let operator = OperatorId::from_low_u64(id);
                    let result = tree.insert_operator(operator, weight);
                    if model.contains_key(&operator) {
                        prop_assert_eq!(result, Err(TreeError::OperatorAlreadyRegistered(operator)));
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(operator, weight);
                    }
                }
                Op::Remove(id) => {
                    let operator = OperatorId::from_low_u64(id);
                    let result = tree.remove_operator(&operator);
                    prop_assert_eq!(result.is_ok(), model.remove(&operator).is_some());
                }
                Op::Reweight(id, weight) => {
                    let operator = OperatorId::from_low_u64(id);
                    if let Some(position) = tree.position_of(&operator) {
                        tree.update_weight(position, weight).unwrap();
                        model.insert(operator, weight);
                    }
                }
            }

            let expected: u64 = model.values().map(|w| u64::from(*w)).sum();
            prop_assert_eq!(tree.total_weight(), expected);
            prop_assert_eq!(tree.operators_in_pool(), model.len());
        }

        let leaf_sum: u64 = tree.leaves().map(|(_, leaf)| u64::from(leaf.weight)).sum();
        prop_assert_eq!(leaf_sum, tree.total_weight());
    }

    #[test]
    fn full_range_weights_never_break_the_root_sum(
        weights in proptest::collection::vec(1u32..=u32::MAX, 1..24),
    ) {
        let mut tree = SortitionTree::new();
        let mut expected = 0u64;
        for (i, weight) in weights.iter().enumerate() {
            match tree.insert_operator(OperatorId::from_low_u64(i as u64 + 1), *weight) {
                Ok(_) => expected += u64::from(*weight),
                Err(err) => prop_assert!(matches!(err, TreeError::WeightOverflow { .. }), "unexpected error: {:?}", err),
            }
            prop_assert_eq!(tree.total_weight(), expected);
        }

        let leaf_sum: u64 = tree.leaves().map(|(_, leaf)| u64::from(leaf.weight)).sum();
        prop_assert_eq!(leaf_sum, expected);
    }

    #[test]
    fn freed_slots_are_exactly_the_empty_ones(ops in ops()) {
        let mut tree = SortitionTree::new();
        for op in ops {
            match op {
                Op::Insert(id, weight) => {
                    let _ = tree.insert_operator(OperatorId::from_low_u64(id), weight);
                }
                Op::Remove(id) => {
                    let _ = tree.remove_operator(&OperatorId::from_low_u64(id));
                }
                Op::Reweight(..) => {}
            }
            for position in tree.free_slots().iter() {
                prop_assert_eq!(tree.leaf(*position), None);
            }
        }
    }

    #[test]
    fn every_pick_lands_on_the_leaf_owning_that_range(
        weights in proptest::collection::vec(1u32..5_000, 1..40),
    ) {
        let mut tree = SortitionTree::new();
        for (i, weight) in weights.iter().enumerate() {
            tree.insert_operator(OperatorId::from_low_u64(i as u64 + 1), *weight).unwrap();
        }

        // leaves are allocated left to right, so cumulative ranges follow insertion order
        let mut start = 0u64;
        for (i, weight) in weights.iter().enumerate() {
            let end = start + u64::from(*weight);
            for index in [start, end - 1] {
                let (position, leaf) = tree.pick(index).unwrap();
                prop_assert_eq!(position, Position::new(i as u32).unwrap());
                prop_assert_eq!(leaf.operator, OperatorId::from_low_u64(i as u64 + 1));
            }
            start = end;
        }
    }

    #[test]
    fn branch_set_get_round_trips(
        slots in proptest::array::uniform8(any::<u32>()),
        index in 0usize..SLOT_COUNT,
        value in any::<u32>(),
    ) {
        let mut node = Branch::empty();
        for (i, slot) in slots.iter().enumerate() {
            node = node.set(i, *slot).unwrap();
        }

        let updated = node.set(index, value).unwrap();
        prop_assert_eq!(updated.get(index), Ok(value));
        for other in (0..SLOT_COUNT).filter(|&j| j != index) {
            prop_assert_eq!(updated.get(other), node.get(other));
        }
        prop_assert_eq!(Branch::from_packed_bytes(updated.to_packed_bytes()), updated);
    }

    #[test]
    fn leaf_set_get_round_trips(
        index in 0usize..SLOT_COUNT,
        id in 1u64..u64::MAX,
        weight in any::<u32>(),
    ) {
        let leaf = Leaf::new(OperatorId::from_low_u64(id), weight);
        let node: LeafNode = PackedNode::empty().set(index, leaf).unwrap();
        prop_assert_eq!(node.get(index), Ok(leaf));
        prop_assert_eq!(node.is_empty_slot(index), Ok(false));
        for other in (0..SLOT_COUNT).filter(|&j| j != index) {
            prop_assert_eq!(node.is_empty_slot(other), Ok(true));
        }
    }
}
