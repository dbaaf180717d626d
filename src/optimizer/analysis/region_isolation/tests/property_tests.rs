//! Randomized op sequences over a small pool of elements.
//! Every element is assigned before the sequence runs, so every generated op is well formed.

use super::test_support::{bb, e, inst, operand, EvalHarness};
use crate::optimizer::analysis::region_isolation::partition::Partition;
use crate::optimizer::analysis::region_isolation::partition_op::PartitionOp;
use proptest::prelude::*;

const POOL: u32 = 6;

fn element() -> impl Strategy<Value = u32> {
    0..POOL
}

fn partition_op() -> impl Strategy<Value = PartitionOp> {
    prop_oneof![
        (element(), element()).prop_map(|(target, source)| PartitionOp::assign(e(target), e(source), None)),
        element().prop_map(|target| PartitionOp::assign_fresh(e(target), None)),
        (element(), element()).prop_map(|(first, second)| PartitionOp::merge(e(first), e(second), None)),
        (element(), 0u32..3).prop_map(|(target, user)| PartitionOp::transfer(e(target), operand(20 + user, 0))),
        element().prop_map(|target| PartitionOp::undo_transfer(e(target), inst(30))),
        element().prop_map(|target| PartitionOp::require(e(target), Some(inst(40)))),
    ]
}

fn seeded_harness() -> EvalHarness {
    let mut harness = EvalHarness::new();
    let seed = (0..POOL)
        .map(|id| PartitionOp::assign_fresh(e(id), Some(inst(id))))
        .collect::<Vec<_>>();
    harness.apply_all(&seed).expect("seed ops are well formed");
    harness
}

fn run(harness: &mut EvalHarness, ops: &[PartitionOp]) -> Partition {
    harness.apply_all(ops).expect("every element is tracked");
    harness.partition.clone()
}

proptest! {
    /// Canonicalizing twice changes nothing and leaves consistent bookkeeping
    #[test]
    fn canonicalize_is_idempotent(ops in prop::collection::vec(partition_op(), 0..40)) {
        let mut harness = seeded_harness();
        let mut partition = run(&mut harness, &ops);

        partition.canonicalize();
        let mut again = partition.clone();
        again.forget_canonical_form();
        again.canonicalize();

        prop_assert!(partition.is_canonical_correct());
        prop_assert!(partition.validate_region_to_transferred_op_map_regions().is_ok());
        prop_assert_eq!(again.iter().collect::<Vec<_>>(), partition.iter().collect::<Vec<_>>());
        prop_assert_eq!(again.transferred_elements(), partition.transferred_elements());
        prop_assert_eq!(again.fresh_label(), partition.fresh_label());
        prop_assert_eq!(partition.len(), POOL as usize);
    }

    /// A merge puts everything from both regions into one region
    #[test]
    fn merge_unions_whole_regions(
        ops in prop::collection::vec(partition_op(), 0..30),
        first in element(),
        second in element(),
    ) {
        let mut harness = seeded_harness();
        let before = run(&mut harness, &ops);

        let members = (0..POOL)
            .filter(|id| {
                before.are_elements_in_same_region(e(*id), e(first))
                    || before.are_elements_in_same_region(e(*id), e(second))
            })
            .collect::<Vec<_>>();

        let after = run(&mut harness, &[PartitionOp::merge(e(first), e(second), None)]);

        for id in members {
            prop_assert!(after.are_elements_in_same_region(e(id), e(first)));
        }
        prop_assert_eq!(
            after.is_transferred(e(first)),
            before.is_transferred(e(first)) || before.is_transferred(e(second))
        );
    }

    /// A freshly assigned element is alone and usable
    #[test]
    fn assign_fresh_isolates_the_target(
        ops in prop::collection::vec(partition_op(), 0..30),
        target in element(),
    ) {
        let mut harness = seeded_harness();
        run(&mut harness, &ops);
        let after = run(&mut harness, &[PartitionOp::assign_fresh(e(target), None)]);

        let region = after.region(e(target)).expect("target is tracked");
        prop_assert_eq!(after.elements_in_region(region), vec![e(target)]);
        prop_assert!(!after.is_transferred(e(target)));
    }

    /// Undoing a transfer always clears it, whatever came before
    #[test]
    fn undo_transfer_clears_a_transfer(
        ops in prop::collection::vec(partition_op(), 0..30),
        target in element(),
    ) {
        let mut harness = seeded_harness();
        run(&mut harness, &ops);

        let transferred = run(&mut harness, &[PartitionOp::transfer(e(target), operand(50, 0))]);
        prop_assert!(transferred.is_transferred(e(target)));

        let undone = run(&mut harness, &[PartitionOp::undo_transfer(e(target), inst(51))]);
        prop_assert!(!undone.is_transferred(e(target)));
    }

    /// The join keeps every grouping and every transfer from both sides, in either order
    #[test]
    fn join_is_an_upper_bound(
        left_ops in prop::collection::vec(partition_op(), 0..30),
        right_ops in prop::collection::vec(partition_op(), 0..30),
    ) {
        let mut harness = seeded_harness();
        let base = harness.partition.clone();
        let mut left = run(&mut harness, &left_ops);
        harness.partition = base;
        let mut right = run(&mut harness, &right_ops);

        let mut joined = Partition::join(&left, &mut right, bb(1), bb(3))
            .expect("joined elements are trackable");
        let mut flipped = Partition::join(&right, &mut left, bb(2), bb(3))
            .expect("joined elements are trackable");

        for x in 0..POOL {
            if left.is_transferred(e(x)) || right.is_transferred(e(x)) {
                prop_assert!(joined.is_transferred(e(x)));
            }
            for y in 0..POOL {
                if left.are_elements_in_same_region(e(x), e(y))
                    || right.are_elements_in_same_region(e(x), e(y))
                {
                    prop_assert!(joined.are_elements_in_same_region(e(x), e(y)));
                }
            }
        }

        prop_assert!(joined.fresh_label() >= left.fresh_label());
        prop_assert!(joined.fresh_label() >= right.fresh_label());
        prop_assert!(Partition::equals(&mut joined, &mut flipped));
    }

    /// Two elements share a region after the join exactly when a chain of groupings
    /// from either side links them
    #[test]
    fn join_is_the_union_of_both_groupings(
        left_ops in prop::collection::vec(partition_op(), 0..30),
        right_ops in prop::collection::vec(partition_op(), 0..30),
    ) {
        let mut harness = seeded_harness();
        let base = harness.partition.clone();
        let left = run(&mut harness, &left_ops);
        harness.partition = base;
        let mut right = run(&mut harness, &right_ops);

        let joined = Partition::join(&left, &mut right, bb(1), bb(3))
            .expect("joined elements are trackable");

        let size = POOL as usize;
        let mut linked = vec![vec![false; size]; size];
        for x in 0..POOL {
            for y in 0..POOL {
                linked[x as usize][y as usize] = left.are_elements_in_same_region(e(x), e(y))
                    || right.are_elements_in_same_region(e(x), e(y));
            }
        }

        // Transitive closure
        for k in 0..size {
            for i in 0..size {
                for j in 0..size {
                    if linked[i][k] && linked[k][j] {
                        linked[i][j] = true;
                    }
                }
            }
        }

        for x in 0..POOL {
            for y in 0..POOL {
                prop_assert_eq!(
                    joined.are_elements_in_same_region(e(x), e(y)),
                    linked[x as usize][y as usize],
                    "{} and {} in {}", e(x), e(y), joined
                );
            }
        }
    }

    /// Joining a partition with itself changes nothing
    #[test]
    fn join_is_idempotent(ops in prop::collection::vec(partition_op(), 0..30)) {
        let mut harness = seeded_harness();
        let mut partition = run(&mut harness, &ops);
        let mut copy = partition.clone();

        let mut joined = Partition::join(&partition, &mut copy, bb(0), bb(0))
            .expect("joined elements are trackable");

        prop_assert!(Partition::equals(&mut joined, &mut partition));
    }
}
