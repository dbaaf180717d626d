#![cfg(test)]

use crate::optimizer::analysis::region_isolation::evaluator::{BasicHooks, PartitionOpEvaluator};
use crate::optimizer::analysis::region_isolation::function::{RegionBlock, RegionFunction};
use crate::optimizer::analysis::region_isolation::history::IsolationHistoryFactory;
use crate::optimizer::analysis::region_isolation::operand_state::TransferringOperandToStateMap;
use crate::optimizer::analysis::region_isolation::partition::{
    Partition, TransferringOperandSetFactory,
};
use crate::optimizer::analysis::region_isolation::partition_op::PartitionOp;
use crate::optimizer::analysis::region_isolation::primitives::{
    BlockId, Element, InstId, OperandId,
};
use crate::optimizer::compiler_messages::compiler_errors::CompilerError;

pub(crate) fn e(id: u32) -> Element {
    Element(id)
}

pub(crate) fn inst(id: u32) -> InstId {
    InstId(id)
}

pub(crate) fn bb(id: u32) -> BlockId {
    BlockId(id)
}

pub(crate) fn operand(user: u32, index: u32) -> OperandId {
    OperandId::new(InstId(user), index)
}

pub(crate) fn elements(ids: &[u32]) -> Vec<Element> {
    ids.iter().copied().map(Element).collect()
}

/// An empty partition backed by a new arena.
pub(crate) fn empty_partition() -> (IsolationHistoryFactory, Partition) {
    let factory = IsolationHistoryFactory::new();
    let partition = Partition::new(factory.get());
    (factory, partition)
}

/// A partition with the given groups, built through `separate_regions` and `merge`.
pub(crate) fn partition_with_groups(
    factory: &IsolationHistoryFactory,
    groups: &[&[u32]],
) -> Partition {
    let all = groups
        .iter()
        .flat_map(|group| group.iter().copied())
        .map(Element)
        .collect::<Vec<_>>();

    let mut partition = Partition::separate_regions(None, &all, factory.get())
        .expect("elements are trackable");
    for group in groups {
        if let Some((first, rest)) = group.split_first() {
            for other in rest {
                partition
                    .merge(Element(*first), Element(*other), true)
                    .expect("grouped elements are tracked");
            }
        }
    }
    partition
}

/// Owns everything an evaluator borrows, so tests can apply ops one at a time.
pub(crate) struct EvalHarness {
    pub(crate) factory: IsolationHistoryFactory,
    pub(crate) partition: Partition,
    pub(crate) operand_sets: TransferringOperandSetFactory,
    pub(crate) operand_states: TransferringOperandToStateMap,
    pub(crate) hooks: BasicHooks,
}

impl EvalHarness {
    pub(crate) fn new() -> Self {
        let factory = IsolationHistoryFactory::new();
        EvalHarness {
            partition: Partition::new(factory.get()),
            operand_states: TransferringOperandToStateMap::new(factory.clone()),
            operand_sets: TransferringOperandSetFactory::new(),
            hooks: BasicHooks::default(),
            factory,
        }
    }

    pub(crate) fn apply(&mut self, op: PartitionOp) -> Result<(), CompilerError> {
        PartitionOpEvaluator::new(
            &mut self.partition,
            &mut self.operand_sets,
            &mut self.operand_states,
            &mut self.hooks,
        )
        .apply(&op)
    }

    pub(crate) fn apply_all(&mut self, ops: &[PartitionOp]) -> Result<(), CompilerError> {
        PartitionOpEvaluator::new(
            &mut self.partition,
            &mut self.operand_sets,
            &mut self.operand_states,
            &mut self.hooks,
        )
        .apply_all(ops)
    }
}

pub(crate) fn function(name: &str, blocks: Vec<RegionBlock>) -> RegionFunction {
    let mut function = RegionFunction::new(name, BlockId(0));
    function.blocks = blocks;
    function
}

pub(crate) fn block(id: u32, successors: &[u32], ops: Vec<PartitionOp>) -> RegionBlock {
    RegionBlock::new(
        BlockId(id),
        successors.iter().copied().map(BlockId).collect(),
        ops,
    )
}
