use super::test_support::{bb, e, elements, empty_partition, operand, partition_with_groups};
use crate::optimizer::analysis::region_isolation::history::{
    HistoryNodeKind, IsolationHistoryFactory, SequenceBoundarySemantics,
};
use crate::optimizer::analysis::region_isolation::partition::{
    Partition, TransferringOperandSet, TransferringOperandSetFactory,
};
use crate::optimizer::analysis::region_isolation::primitives::{Element, Region};
use crate::optimizer::compiler_messages::compiler_errors::ErrorType;

fn head_kind(partition: &Partition) -> Option<HistoryNodeKind> {
    let history = partition.isolation_history();
    history
        .head()
        .and_then(|head| history.node(head))
        .map(|node| node.kind().clone())
}

#[test]
fn single_region_groups_every_element_under_the_smallest() {
    let factory = IsolationHistoryFactory::new();
    let partition = Partition::single_region(None, &elements(&[2, 0, 1]), factory.get())
        .expect("elements are trackable");

    assert_eq!(partition.regions(), vec![elements(&[0, 1, 2])]);
    assert_eq!(partition.region(e(2)), Some(Region(0)));
    assert_eq!(partition.fresh_label(), Region(3));
    assert!(partition.is_canonical());
    assert!(partition.is_canonical_correct());

    // Boundary, then the first element, then everything merged into it
    assert_eq!(partition.history_len(), 3);
    assert_eq!(
        head_kind(&partition),
        Some(HistoryNodeKind::MergeElementRegions(e(0), elements(&[1, 2])))
    );
}

#[test]
fn separate_regions_gives_every_element_its_own_region() {
    let factory = IsolationHistoryFactory::new();
    let partition = Partition::separate_regions(None, &elements(&[3, 1]), factory.get())
        .expect("elements are trackable");

    assert_eq!(partition.regions(), vec![elements(&[1]), elements(&[3])]);
    assert!(!partition.are_elements_in_same_region(e(1), e(3)));
    assert_eq!(partition.fresh_label(), Region(4));

    let root = partition
        .isolation_history()
        .iter()
        .last()
        .map(|(_, node)| node);
    assert_eq!(
        root.and_then(|node| node.boundary_semantics()),
        Some(SequenceBoundarySemantics::SeparateRegions)
    );
}

#[test]
fn an_empty_element_list_still_opens_a_boundary() {
    let factory = IsolationHistoryFactory::new();
    let partition = Partition::single_region(None, &[], factory.get())
        .expect("elements are trackable");

    assert!(partition.is_empty());
    assert_eq!(partition.history_len(), 1);
}

#[test]
fn tracking_an_element_again_detaches_it_from_its_region() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = Partition::single_region(None, &elements(&[0, 1, 2]), factory.get())
        .expect("elements are trackable");

    let region = partition.track_new_element(e(1), true).expect("region ids remain");

    assert_eq!(region, Region(3));
    assert_eq!(partition.regions(), vec![elements(&[0, 2]), elements(&[1])]);
    assert!(!partition.is_canonical());

    let kinds = partition
        .isolation_history()
        .iter()
        .take(2)
        .map(|(_, node)| node.kind().clone())
        .collect::<Vec<_>>();
    assert_eq!(
        kinds,
        vec![
            HistoryNodeKind::AddNewRegionForElement(e(1)),
            HistoryNodeKind::RemoveElementFromRegion(e(0), elements(&[1])),
        ]
    );
}

#[test]
fn assign_element_moves_into_the_source_region() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = partition_with_groups(&factory, &[&[0], &[1]]);

    partition
        .assign_element(e(3), e(0), true)
        .expect("source is tracked");

    assert!(partition.are_elements_in_same_region(e(3), e(0)));
    assert!(!partition.are_elements_in_same_region(e(3), e(1)));
    assert_eq!(
        head_kind(&partition),
        Some(HistoryNodeKind::MergeElementRegions(e(0), elements(&[3])))
    );
}

#[test]
fn assigning_within_one_region_records_nothing() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = Partition::single_region(None, &elements(&[0, 1]), factory.get())
        .expect("elements are trackable");
    let before = partition.history_len();

    partition
        .assign_element(e(1), e(0), true)
        .expect("source is tracked");

    assert_eq!(partition.history_len(), before);
}

#[test]
fn assign_from_an_untracked_element_is_an_error() {
    let (_factory, mut partition) = empty_partition();
    partition.track_new_element(e(0), true).expect("region ids remain");

    let error = partition
        .assign_element(e(0), e(9), true)
        .expect_err("source is untracked");
    assert_eq!(error.error_type, ErrorType::Compiler);
    assert!(partition.is_tracking_element(e(0)));
}

#[test]
fn merge_keeps_the_smaller_region() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = partition_with_groups(&factory, &[&[0], &[1], &[2]]);

    let region = partition.merge(e(2), e(1), true).expect("both tracked");

    assert_eq!(region, Region(1));
    assert_eq!(partition.region(e(2)), Some(Region(1)));
    assert_eq!(
        head_kind(&partition),
        Some(HistoryNodeKind::MergeElementRegions(e(1), elements(&[2])))
    );
}

#[test]
fn merge_with_an_untracked_element_is_an_error() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = partition_with_groups(&factory, &[&[0]]);

    let error = partition.merge(e(0), e(5), true).expect_err("5 is untracked");
    assert!(error.msg.contains("is not tracked"));
    assert_eq!(partition.len(), 1);
}

#[test]
fn merge_unions_transferred_operands() {
    let factory = IsolationHistoryFactory::new();
    let mut operand_sets = TransferringOperandSetFactory::new();
    let mut partition = partition_with_groups(&factory, &[&[0], &[1]]);

    partition
        .mark_transferred(e(0), operand_sets.get(operand(5, 0)))
        .expect("element is trackable");
    partition
        .mark_transferred(e(1), operand_sets.get(operand(6, 0)))
        .expect("element is trackable");
    partition.merge(e(0), e(1), true).expect("both tracked");

    let transferred = partition.transferred(e(1)).expect("merged region is transferred");
    assert_eq!(transferred.as_slice(), &[operand(5, 0), operand(6, 0)]);
    assert!(partition.validate_region_to_transferred_op_map_regions().is_ok());
}

#[test]
fn transfer_then_undo_round_trips() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = partition_with_groups(&factory, &[&[0, 1]]);

    partition
        .mark_transferred(e(0), TransferringOperandSet::single(operand(2, 0)))
        .expect("element is trackable");
    assert!(partition.is_transferred(e(1)));
    assert_eq!(partition.transferred_elements(), elements(&[0, 1]));

    assert!(partition.undo_transfer(e(0)));
    assert!(!partition.is_transferred(e(0)));
    assert!(partition.transferred(e(0)).is_none());
    assert!(!partition.undo_transfer(e(0)));
}

#[test]
fn marking_an_untracked_element_tracks_it_first() {
    let (_factory, mut partition) = empty_partition();

    partition
        .mark_transferred(e(4), TransferringOperandSet::single(operand(1, 0)))
        .expect("element is trackable");

    assert!(partition.is_tracking_element(e(4)));
    assert!(partition.is_transferred(e(4)));
}

#[test]
fn emptying_a_transferred_region_drops_its_transfer_state() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = partition_with_groups(&factory, &[&[0], &[1]]);

    partition
        .mark_transferred(e(0), TransferringOperandSet::single(operand(1, 0)))
        .expect("element is trackable");
    partition.track_new_element(e(0), true).expect("region ids remain");

    assert!(!partition.is_transferred(e(0)));
    assert!(partition.validate_region_to_transferred_op_map_regions().is_ok());
}

#[test]
fn canonicalize_renames_regions_after_their_smallest_element() {
    let (_factory, mut partition) = empty_partition();
    partition.track_new_element(e(2), true).expect("region ids remain");
    partition.track_new_element(e(1), true).expect("region ids remain");
    partition.track_new_element(e(0), true).expect("region ids remain");
    partition.merge(e(1), e(0), true).expect("both tracked");

    assert_eq!(partition.region(e(0)), Some(Region(1)));

    partition.canonicalize();

    assert!(partition.is_canonical());
    assert!(partition.is_canonical_correct());
    assert_eq!(partition.region(e(0)), Some(Region(0)));
    assert_eq!(partition.region(e(1)), Some(Region(0)));
    assert_eq!(partition.region(e(2)), Some(Region(2)));
}

#[test]
fn equals_ignores_region_numbering() {
    let factory = IsolationHistoryFactory::new();
    let mut by_groups = partition_with_groups(&factory, &[&[0, 1], &[2]]);

    let mut by_tracking = Partition::new(factory.get());
    by_tracking.track_new_element(e(2), true).expect("region ids remain");
    by_tracking.track_new_element(e(1), true).expect("region ids remain");
    by_tracking.track_new_element(e(0), true).expect("region ids remain");
    by_tracking.merge(e(1), e(0), true).expect("both tracked");

    assert!(Partition::equals(&mut by_groups, &mut by_tracking));

    by_tracking
        .mark_transferred(e(2), TransferringOperandSet::single(operand(3, 0)))
        .expect("element is trackable");
    assert!(!Partition::equals(&mut by_groups, &mut by_tracking));
}

#[test]
fn join_forces_transitive_groupings_together() {
    let factory = IsolationHistoryFactory::new();
    let first = partition_with_groups(&factory, &[&[0, 1], &[2]]);
    let mut second = partition_with_groups(&factory, &[&[0, 2], &[1]]);

    let joined = Partition::join(&first, &mut second, bb(1), bb(2))
        .expect("joined elements are trackable");

    assert_eq!(joined.regions(), vec![elements(&[0, 1, 2])]);
    assert!(joined.is_canonical());
    assert!(
        joined
            .isolation_history()
            .iter()
            .any(|(_, node)| node.joined_blocks() == Some((bb(1), bb(2))))
    );
}

#[test]
fn join_tracks_elements_only_one_side_knows() {
    let factory = IsolationHistoryFactory::new();
    let first = partition_with_groups(&factory, &[&[0]]);
    let mut second = partition_with_groups(&factory, &[&[0, 1]]);

    let joined = Partition::join(&first, &mut second, bb(0), bb(1))
        .expect("joined elements are trackable");

    assert_eq!(joined.regions(), vec![elements(&[0, 1])]);
    assert!(joined.fresh_label() >= second.fresh_label());
    assert!(joined.fresh_label() >= first.fresh_label());
}

#[test]
fn join_keeps_regions_transferred_on_either_side() {
    let factory = IsolationHistoryFactory::new();
    let mut operand_sets = TransferringOperandSetFactory::new();

    let mut first = partition_with_groups(&factory, &[&[0], &[1]]);
    first.mark_transferred(e(0), operand_sets.get(operand(4, 0))).expect("element is trackable");

    let mut second = partition_with_groups(&factory, &[&[0], &[1]]);
    second.mark_transferred(e(0), operand_sets.get(operand(5, 0))).expect("element is trackable");
    second.mark_transferred(e(1), operand_sets.get(operand(6, 0))).expect("element is trackable");

    let joined = Partition::join(&first, &mut second, bb(0), bb(1))
        .expect("joined elements are trackable");

    let zero = joined.transferred(e(0)).expect("transferred on both sides");
    assert_eq!(zero.as_slice(), &[operand(4, 0), operand(5, 0)]);
    let one = joined.transferred(e(1)).expect("transferred on one side");
    assert_eq!(one.as_slice(), &[operand(6, 0)]);
}

#[test]
fn display_braces_transferred_regions() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = partition_with_groups(&factory, &[&[0, 1], &[2]]);
    assert_eq!(partition.to_string(), "[(0 1)(2)]");

    partition
        .mark_transferred(e(2), TransferringOperandSet::single(operand(1, 0)))
        .expect("element is trackable");
    assert_eq!(partition.to_string(), "[(0 1){2}]");
}

#[test]
fn snapshots_list_transferred_regions_with_their_operands() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = partition_with_groups(&factory, &[&[0, 1], &[2]]);
    partition
        .mark_transferred(e(1), TransferringOperandSet::single(operand(7, 1)))
        .expect("element is trackable");

    let snapshot = partition.to_snapshot();

    assert_eq!(snapshot.regions, vec![elements(&[0, 1]), elements(&[2])]);
    assert_eq!(snapshot.transferred.len(), 1);
    assert_eq!(snapshot.transferred[0].elements, elements(&[0, 1]));
    assert_eq!(snapshot.transferred[0].operands, vec![operand(7, 1)]);
}

#[test]
fn removing_transfer_state_keeps_regions_and_history() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = partition_with_groups(&factory, &[&[0, 1]]);
    partition
        .mark_transferred(e(0), TransferringOperandSet::single(operand(1, 0)))
        .expect("element is trackable");

    let cleared = partition.removing_transfer_state();

    assert!(cleared.transferred_elements().is_empty());
    assert_eq!(cleared.regions(), partition.regions());
    assert_eq!(cleared.isolation_history(), partition.isolation_history());
}

#[test]
fn operand_set_factory_interns_by_content() {
    let mut operand_sets = TransferringOperandSetFactory::new();

    let single = operand_sets.get(operand(1, 0));
    assert!(single.shares_allocation(&operand_sets.get(operand(1, 0))));

    let unordered = operand_sets
        .get_set(&[operand(2, 0), operand(1, 0), operand(2, 0)])
        .expect("non-empty set");
    let ordered = operand_sets
        .get_set(&[operand(1, 0), operand(2, 0)])
        .expect("non-empty set");
    assert!(unordered.shares_allocation(&ordered));
    assert_eq!(ordered.len(), 2);
    assert!(operand_sets.get_set(&[]).is_none());

    let two = operand_sets.get(operand(2, 0));
    let merged = operand_sets.merge(&single, &two);
    assert!(merged.shares_allocation(&ordered));
}

#[test]
fn merging_a_subset_reuses_the_larger_set() {
    let mut operand_sets = TransferringOperandSetFactory::new();
    let both = operand_sets
        .get_set(&[operand(1, 0), operand(2, 0)])
        .expect("non-empty set");
    let one = operand_sets.get(operand(2, 0));

    assert!(both.merge(&one).shares_allocation(&both));
    assert!(one.merge(&both).contains(operand(1, 0)));
}

#[test]
fn the_reserved_element_id_cannot_be_tracked() {
    let (factory, mut partition) = empty_partition();

    let error = partition
        .track_new_element(Element(u32::MAX), true)
        .expect_err("u32::MAX is reserved");
    assert_eq!(error.error_type, ErrorType::Compiler);
    assert!(partition.is_empty());
    assert!(!partition.has_history());

    assert!(Partition::single_region(None, &[Element(u32::MAX)], factory.get()).is_err());
    assert!(Partition::separate_regions(None, &[e(0), Element(u32::MAX)], factory.get()).is_err());
}

#[test]
fn running_out_of_region_ids_fails_without_changes() {
    let factory = IsolationHistoryFactory::new();
    let mut partition = Partition::single_region(None, &[Element::MAX], factory.get())
        .expect("the largest element id is trackable");
    assert_eq!(partition.fresh_label(), Region(u32::MAX));
    let history_len = partition.history_len();

    let error = partition
        .track_new_element(e(0), true)
        .expect_err("no region id is left above r4294967295");

    assert!(error.msg.contains("Ran out of region ids"));
    assert_eq!(partition.regions(), vec![vec![Element::MAX]]);
    assert_eq!(partition.history_len(), history_len);
    assert!(partition.validate_region_to_transferred_op_map_regions().is_ok());
}

#[test]
fn unions_of_interned_sets_are_interned() {
    let factory = IsolationHistoryFactory::new();
    let mut operand_sets = TransferringOperandSetFactory::new();
    let first = operand_sets.get(operand(1, 0));
    let second = operand_sets.get(operand(2, 0));

    let mut merged_by_regions = partition_with_groups(&factory, &[&[0], &[1]]);
    merged_by_regions
        .mark_transferred(e(0), first.clone())
        .expect("element is trackable");
    merged_by_regions
        .mark_transferred(e(1), second.clone())
        .expect("element is trackable");
    merged_by_regions.merge(e(1), e(0), true).expect("both tracked");

    let mut marked_twice = partition_with_groups(&factory, &[&[0]]);
    marked_twice
        .mark_transferred(e(0), second)
        .expect("element is trackable");
    marked_twice
        .mark_transferred(e(0), first)
        .expect("element is trackable");

    let interned = operand_sets
        .get_set(&[operand(2, 0), operand(1, 0)])
        .expect("set is not empty");
    let by_regions = merged_by_regions.transferred(e(0)).expect("merge keeps the transfer");
    let by_marking = marked_twice.transferred(e(0)).expect("region is transferred");

    assert!(by_regions.shares_allocation(&interned));
    assert!(by_marking.shares_allocation(&interned));
    assert_eq!(operand_sets.len(), 3);
}

#[test]
fn unions_of_plain_sets_compare_by_content() {
    let lhs = TransferringOperandSet::single(operand(1, 0));
    let rhs = TransferringOperandSet::single(operand(2, 0));

    let union = lhs.merge(&rhs);

    assert_eq!(union.as_slice(), &[operand(1, 0), operand(2, 0)]);
    assert_eq!(union, rhs.merge(&lhs));
    assert!(!union.shares_allocation(&rhs.merge(&lhs)));
    assert!(lhs.merge(&union).shares_allocation(&union));
}
