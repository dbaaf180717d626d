//! The lowered form of one function: per block op sequences plus the static facts
//! the checker needs about elements and instructions.

use crate::optimizer::analysis::region_isolation::isolation_info::{
    ActorIsolation, IsolationInfo,
};
use crate::optimizer::analysis::region_isolation::partition_op::PartitionOp;
use crate::optimizer::analysis::region_isolation::primitives::{
    BlockId, Element, InstId, OperandId,
};
use crate::optimizer::compiler_messages::compiler_errors::{CompilerError, ErrorLocation};
use crate::return_config_error;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementInfo {
    pub name: Option<String>,
    pub isolation: IsolationInfo,
    pub actor_derived: bool,
    pub task_isolated_derived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionBlock {
    pub id: BlockId,
    pub successors: Vec<BlockId>,
    pub ops: Vec<PartitionOp>,
}

impl RegionBlock {
    pub fn new(id: BlockId, successors: Vec<BlockId>, ops: Vec<PartitionOp>) -> Self {
        RegionBlock {
            id,
            successors,
            ops,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegionFunction {
    pub name: String,
    pub isolation: Option<ActorIsolation>,
    pub entry: BlockId,

    // Elements that start out sharing one region at function entry
    pub entry_region: Vec<Element>,

    // Elements that start out in their own regions at function entry
    pub separate_entry_elements: Vec<Element>,

    pub elements: FxHashMap<Element, ElementInfo>,
    pub instruction_isolation: FxHashMap<InstId, IsolationInfo>,
    pub closure_captures: FxHashSet<(Element, OperandId)>,
    pub blocks: Vec<RegionBlock>,
}

impl RegionFunction {
    pub fn new(name: impl Into<String>, entry: BlockId) -> Self {
        RegionFunction {
            name: name.into(),
            isolation: None,
            entry,
            entry_region: Vec::new(),
            separate_entry_elements: Vec::new(),
            elements: FxHashMap::default(),
            instruction_isolation: FxHashMap::default(),
            closure_captures: FxHashSet::default(),
            blocks: Vec::new(),
        }
    }

    pub fn element_name(&self, element: Element) -> String {
        match self
            .elements
            .get(&element)
            .and_then(|info| info.name.as_ref())
        {
            Some(name) => format!("'{name}'"),
            None => element.to_string(),
        }
    }

    pub fn location(&self) -> ErrorLocation {
        ErrorLocation::in_function(self.name.clone())
    }
}

/// Lookup tables over a function's blocks, built once per check.
#[derive(Debug)]
pub(crate) struct FunctionLayout {
    block_index_by_id: FxHashMap<BlockId, usize>,
    block_instructions: FxHashMap<BlockId, Vec<InstId>>,
    instruction_position: FxHashMap<InstId, (BlockId, usize)>,
}

impl FunctionLayout {
    pub(crate) fn new(function: &RegionFunction) -> Result<Self, CompilerError> {
        let mut block_index_by_id = FxHashMap::default();
        for (index, block) in function.blocks.iter().enumerate() {
            if block_index_by_id.insert(block.id, index).is_some() {
                return_config_error!(
                    format!("Block {} is defined more than once", block.id),
                    function.location().at_block(block.id)
                );
            }
        }

        if !block_index_by_id.contains_key(&function.entry) {
            return_config_error!(
                format!("Entry block {} does not exist", function.entry),
                function.location(),
                {
                    PrimarySuggestion => "Set 'entry' to the id of one of the function's blocks",
                }
            );
        }

        let mut block_instructions: FxHashMap<BlockId, Vec<InstId>> = FxHashMap::default();
        let mut instruction_position = FxHashMap::default();

        for block in &function.blocks {
            for successor in &block.successors {
                if !block_index_by_id.contains_key(successor) {
                    return_config_error!(
                        format!("Block {} branches to missing block {successor}", block.id),
                        function.location().at_block(block.id)
                    );
                }
            }

            let instructions = block_instructions.entry(block.id).or_default();
            for inst in block.ops.iter().filter_map(PartitionOp::source_inst) {
                match instruction_position.get(&inst) {
                    Some((owner, _)) if *owner != block.id => {
                        return_config_error!(
                            format!("{inst} appears in both {owner} and {}", block.id),
                            function.location().at_block(block.id).at_instruction(inst)
                        );
                    }
                    Some(_) => {}
                    None => {
                        instruction_position.insert(inst, (block.id, instructions.len()));
                        instructions.push(inst);
                    }
                }
            }
        }

        Ok(FunctionLayout {
            block_index_by_id,
            block_instructions,
            instruction_position,
        })
    }

    pub(crate) fn block<'f>(
        &self,
        function: &'f RegionFunction,
        id: BlockId,
    ) -> Option<&'f RegionBlock> {
        let index = self.block_index_by_id.get(&id)?;
        function.blocks.get(*index)
    }

    pub(crate) fn successors<'f>(&self, function: &'f RegionFunction, id: BlockId) -> &'f [BlockId] {
        match self.block(function, id) {
            Some(block) => &block.successors,
            None => &[],
        }
    }

    /// Blocks reachable from the entry, in breadth first order.
    pub(crate) fn reachable_blocks(&self, function: &RegionFunction) -> Vec<BlockId> {
        let mut visited = FxHashSet::default();
        let mut order = Vec::new();
        let mut queue = VecDeque::from([function.entry]);

        while let Some(block_id) = queue.pop_front() {
            if !visited.insert(block_id) {
                continue;
            }

            order.push(block_id);
            for successor in self.successors(function, block_id) {
                if !visited.contains(successor) {
                    queue.push_back(*successor);
                }
            }
        }

        order
    }

    pub(crate) fn instructions_in_block(&self, id: BlockId) -> &[InstId] {
        match self.block_instructions.get(&id) {
            Some(instructions) => instructions,
            None => &[],
        }
    }

    pub(crate) fn instruction_block(&self, inst: InstId) -> Option<BlockId> {
        self.instruction_position.get(&inst).map(|(block, _)| *block)
    }

    /// (block, index within block) of an instruction, for program order sorting.
    pub(crate) fn instruction_position(&self, inst: InstId) -> Option<(BlockId, usize)> {
        self.instruction_position.get(&inst).copied()
    }
}
