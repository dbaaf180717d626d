//! Rewinds a partition through its history to explain how two elements came to share a region.
//!
//! Every history node is undone on a private copy of the partition, one source level step
//! (sequence boundary) at a time, until the two elements stop sharing a region. The step
//! that separated them is the step that merged them.

use crate::history_log;
use crate::optimizer::analysis::region_isolation::history::{HistoryNodeId, HistoryNodeKind};
use crate::optimizer::analysis::region_isolation::partition::Partition;
use crate::optimizer::analysis::region_isolation::primitives::{BlockId, Element};
use crate::optimizer::analysis::region_isolation::types::MergeExplanation;

pub struct PartitionStack {
    partition: Partition,

    // Sub histories spliced in by joins that were rewound through
    found_joined_histories: Vec<HistoryNodeId>,
}

// What the nodes of the step currently being rewound did
#[derive(Default)]
struct StepRecord {
    merge_target: Option<Element>,
    merged_elements: Vec<Element>,
    joined_blocks: Option<(BlockId, BlockId)>,
}

impl PartitionStack {
    /// Transfer state does not affect which elements ever shared a region, so it is dropped.
    pub fn new(start: &Partition) -> Self {
        PartitionStack {
            partition: start.removing_transfer_state(),
            found_joined_histories: Vec::new(),
        }
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn found_joined_histories(&self) -> &[HistoryNodeId] {
        &self.found_joined_histories
    }

    /// Shorthand for rewinding a fresh stack.
    pub fn compute(start: &Partition, first: Element, second: Element) -> Option<MergeExplanation> {
        PartitionStack::new(start).rewind_until_separated(first, second)
    }

    /// Rewinds until `first` and `second` no longer share a region and describes the step
    /// that was undone last. None if they never shared a region or history runs out first.
    pub fn rewind_until_separated(
        &mut self,
        first: Element,
        second: Element,
    ) -> Option<MergeExplanation> {
        if !self.partition.are_elements_in_same_region(first, second) {
            return None;
        }

        let mut history = self.partition.isolation_history().clone();
        let mut step = StepRecord::default();

        while let Some(node) = history.pop() {
            history_log!(format!("Rewinding: {node}"));

            match node.kind() {
                HistoryNodeKind::AddNewRegionForElement(element) => {
                    self.partition.forget_element(*element);
                }
                HistoryNodeKind::RemoveLastElementFromRegion(element) => {
                    self.partition.track_new_element(*element, false).ok()?;
                }
                HistoryNodeKind::RemoveElementFromRegion(witness, removed) => {
                    for element in removed {
                        // The witness is tracked by construction, a failure means history is corrupt
                        if self
                            .partition
                            .assign_element(*element, *witness, false)
                            .is_err()
                        {
                            return None;
                        }
                    }
                }
                HistoryNodeKind::MergeElementRegions(into, merged) => {
                    self.split_merged_elements(merged)?;
                    step.merge_target = Some(*into);
                    step.merged_elements = merged.clone();
                }
                HistoryNodeKind::CfgHistoryJoin {
                    joined,
                    pred_block,
                    succ_block,
                } => {
                    self.found_joined_histories.push(*joined);
                    step.joined_blocks = Some((*pred_block, *succ_block));
                }
                HistoryNodeKind::SequenceBoundary {
                    semantics,
                    boundary_inst,
                } => {
                    if !self.partition.are_elements_in_same_region(first, second) {
                        return Some(MergeExplanation {
                            boundary_inst: *boundary_inst,
                            semantics: *semantics,
                            merge_target: step.merge_target,
                            merged_elements: step.merged_elements,
                            joined_blocks: step.joined_blocks,
                        });
                    }

                    step = StepRecord::default();
                }
            }
        }

        None
    }

    // Moves elements that a merge pulled in back into one region of their own
    fn split_merged_elements(&mut self, merged: &[Element]) -> Option<()> {
        let Some((&first, rest)) = merged.split_first() else {
            return Some(());
        };

        self.partition.track_new_element(first, false).ok()?;
        for element in rest {
            self.partition.assign_element(*element, first, false).ok()?;
        }
        Some(())
    }
}
