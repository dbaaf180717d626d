use crate::optimizer::analysis::region_isolation::history::SequenceBoundarySemantics;
use crate::optimizer::analysis::region_isolation::isolation_info::IsolationInfo;
use crate::optimizer::analysis::region_isolation::primitives::{
    BlockId, Element, InstId, OperandId,
};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RegionCheckReport {
    pub function_name: String,
    pub diagnostics: Vec<RegionDiagnostic>,
    pub stats: RegionCheckStats,
    pub block_exit_partitions: Vec<BlockPartitionSnapshot>,

    // How diagnostics name the elements they mention
    pub element_names: BTreeMap<Element, String>,
}

impl RegionCheckReport {
    pub fn use_after_transfer_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|diagnostic| matches!(diagnostic, RegionDiagnostic::UseAfterTransfer { .. }))
            .count()
    }

    pub fn transfer_non_transferrable_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|diagnostic| {
                matches!(
                    diagnostic,
                    RegionDiagnostic::TransferNonTransferrable { .. }
                )
            })
            .count()
    }

    /// The source name of `element` when the input gave one.
    pub fn element_name(&self, element: Element) -> String {
        match self.element_names.get(&element) {
            Some(name) => name.to_owned(),
            None => element.to_string(),
        }
    }

    pub fn exit_partition(&self, block: BlockId) -> Option<&PartitionSnapshot> {
        self.block_exit_partitions
            .iter()
            .find(|snapshot| snapshot.block == block)
            .map(|snapshot| &snapshot.partition)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionCheckStats {
    pub blocks_analyzed: usize,
    pub worklist_iterations: usize,
    pub ops_evaluated: usize,
    pub transfers_recorded: usize,
    pub history_nodes: usize,
}

/// One user facing data race report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RegionDiagnostic {
    /// A value was used after its region was transferred away.
    UseAfterTransfer {
        transferring_operand: OperandId,

        // Merged isolation of everything the operand transferred
        isolation: IsolationInfo,
        is_closure_captured: bool,

        // First uses along each path from the transfer, in program order
        requires: Vec<InstId>,
    },

    /// A value whose region is already isolated was transferred.
    TransferNonTransferrable {
        transferring_operand: Option<OperandId>,
        element: Element,
        other_element: Option<Element>,
        isolation: IsolationInfo,
        explanation: Option<MergeExplanation>,
    },
}

/// Why two elements ended up in one region, recovered by rewinding history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeExplanation {
    pub boundary_inst: Option<InstId>,
    pub semantics: SequenceBoundarySemantics,

    // The element whose region absorbed the merged elements
    pub merge_target: Option<Element>,
    pub merged_elements: Vec<Element>,

    // (predecessor, successor) when the merge arrived through a control flow join
    pub joined_blocks: Option<(BlockId, BlockId)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PartitionSnapshot {
    pub regions: Vec<Vec<Element>>,
    pub transferred: Vec<TransferredRegionSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferredRegionSnapshot {
    pub elements: Vec<Element>,
    pub operands: Vec<OperandId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockPartitionSnapshot {
    pub block: BlockId,
    pub partition: PartitionSnapshot,
}
