use crate::optimizer::analysis::region_isolation::function::{FunctionLayout, RegionFunction};
use crate::optimizer::analysis::region_isolation::primitives::{BlockId, InstId};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

/// Narrows every use of a transferred value down to the first use along each path
/// leaving the transfer, so one race is reported once per path instead of once per use.
pub(crate) struct RequireLiveness<'a> {
    function: &'a RegionFunction,
    layout: &'a FunctionLayout,
    transfer_inst: InstId,
    all_requires: FxHashSet<InstId>,
    final_requires: FxHashSet<InstId>,
}

impl<'a> RequireLiveness<'a> {
    pub(crate) fn new(
        function: &'a RegionFunction,
        layout: &'a FunctionLayout,
        transfer_inst: InstId,
    ) -> Self {
        RequireLiveness {
            function,
            layout,
            transfer_inst,
            all_requires: FxHashSet::default(),
            final_requires: FxHashSet::default(),
        }
    }

    /// Returns the final requires in program order.
    pub(crate) fn process(mut self, requires: &[InstId]) -> Vec<InstId> {
        self.all_requires.extend(requires.iter().copied());

        let Some(transfer_block) = self.layout.instruction_block(self.transfer_inst) else {
            // Without a position for the transfer nothing can be narrowed
            self.final_requires = self.all_requires.clone();
            return self.into_sorted();
        };

        let first_require_before_transfer = self.process_def_block(transfer_block);
        if !self.final_requires.is_empty() {
            return self.into_sorted();
        }

        let mut first_require_in_block: FxHashMap<BlockId, InstId> = FxHashMap::default();
        for require in &self.all_requires {
            let Some((block, index)) = self.layout.instruction_position(*require) else {
                continue;
            };

            let is_earlier = match first_require_in_block.get(&block) {
                Some(existing) => self
                    .layout
                    .instruction_position(*existing)
                    .is_some_and(|(_, existing_index)| index < existing_index),
                None => true,
            };
            if is_earlier {
                first_require_in_block.insert(block, *require);
            }
        }
        if let Some(require) = first_require_before_transfer {
            first_require_in_block.insert(transfer_block, require);
        }

        let mut visited = FxHashSet::default();
        let mut worklist = self
            .layout
            .successors(self.function, transfer_block)
            .iter()
            .copied()
            .collect::<VecDeque<_>>();

        while let Some(block) = worklist.pop_front() {
            if !visited.insert(block) {
                continue;
            }

            if let Some(require) = first_require_in_block.get(&block) {
                self.final_requires.insert(*require);
                continue;
            }

            // Came back around to the transfer without meeting a use
            if block == transfer_block {
                continue;
            }

            worklist.extend(self.layout.successors(self.function, block).iter().copied());
        }

        self.into_sorted()
    }

    // Records the first require after the transfer in its own block
    // and returns the first require before it, if any.
    fn process_def_block(&mut self, transfer_block: BlockId) -> Option<InstId> {
        let instructions = self.layout.instructions_in_block(transfer_block);
        let transfer_index = instructions
            .iter()
            .position(|inst| *inst == self.transfer_inst)?;

        if let Some(require) = instructions[transfer_index + 1..]
            .iter()
            .find(|inst| self.all_requires.contains(*inst))
        {
            self.final_requires.insert(*require);
            return None;
        }

        instructions[..transfer_index]
            .iter()
            .find(|inst| self.all_requires.contains(*inst))
            .copied()
    }

    fn into_sorted(self) -> Vec<InstId> {
        let mut requires = self.final_requires.into_iter().collect::<Vec<_>>();
        requires.sort_by_key(|inst| (self.layout.instruction_position(*inst), *inst));
        requires
    }
}
