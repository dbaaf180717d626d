//! Region based isolation checking.
//!
//! Every tracked value of a function lives in a region. Ops lowered from the function
//! merge regions, transfer them to other concurrency domains and require them to still be
//! local. A forward fixed point over the blocks computes the partition at every block entry,
//! then one more pass with diagnostic hooks reports every use of a transferred region.

mod diagnostics;
pub mod evaluator;
pub mod function;
pub mod history;
pub mod isolation_info;
pub mod operand_state;
pub mod partition;
pub mod partition_op;
pub mod partition_stack;
pub mod primitives;
mod require_liveness;
pub mod types;

pub use types::{
    BlockPartitionSnapshot, MergeExplanation, PartitionSnapshot, RegionCheckReport,
    RegionCheckStats, RegionDiagnostic,
};

use crate::optimizer::analysis::region_isolation::diagnostics::CheckerHooks;
use crate::optimizer::analysis::region_isolation::evaluator::PartitionOpEvaluator;
use crate::optimizer::analysis::region_isolation::function::{FunctionLayout, RegionFunction};
use crate::optimizer::analysis::region_isolation::history::{
    IsolationHistoryFactory, SequenceBoundarySemantics,
};
use crate::optimizer::analysis::region_isolation::operand_state::TransferringOperandToStateMap;
use crate::optimizer::analysis::region_isolation::partition::{
    Partition, TransferringOperandSetFactory,
};
use crate::optimizer::analysis::region_isolation::partition_stack::PartitionStack;
use crate::optimizer::analysis::region_isolation::primitives::BlockId;
use crate::optimizer::analysis::region_isolation::require_liveness::RequireLiveness;
use crate::optimizer::compiler_messages::compiler_errors::CompilerError;
use crate::settings::CheckerSettings;
use crate::{history_log, region_log, timer_log};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::time::Instant;

/// Checks one function. Every call owns its own history arena.
pub fn check_region_isolation(
    function: &RegionFunction,
    settings: &CheckerSettings,
) -> Result<RegionCheckReport, CompilerError> {
    RegionIsolationChecker::new(function, settings)?.run()
}

struct RegionIsolationChecker<'a> {
    function: &'a RegionFunction,
    settings: &'a CheckerSettings,
    layout: FunctionLayout,
    history_factory: IsolationHistoryFactory,
    operand_set_factory: TransferringOperandSetFactory,
    operand_to_state: TransferringOperandToStateMap,
}

impl<'a> RegionIsolationChecker<'a> {
    fn new(
        function: &'a RegionFunction,
        settings: &'a CheckerSettings,
    ) -> Result<Self, CompilerError> {
        let layout = FunctionLayout::new(function)?;
        let history_factory = IsolationHistoryFactory::new();

        Ok(RegionIsolationChecker {
            function,
            settings,
            layout,
            operand_to_state: TransferringOperandToStateMap::new(history_factory.clone()),
            history_factory,
            operand_set_factory: TransferringOperandSetFactory::new(),
        })
    }

    fn run(mut self) -> Result<RegionCheckReport, CompilerError> {
        let start = Instant::now();
        let reachable_blocks = self.layout.reachable_blocks(self.function);

        let mut report = RegionCheckReport {
            function_name: self.function.name.clone(),
            ..RegionCheckReport::default()
        };
        report.stats.blocks_analyzed = reachable_blocks.len();

        region_log!(format!(
            "[Regions] Checking function '{}' (entry={} blocks={})",
            self.function.name,
            self.function.entry,
            reachable_blocks.len()
        ));

        let in_states = self.compute_fixed_point(&reachable_blocks, &mut report)?;
        self.emit_diagnostics(&reachable_blocks, &in_states, &mut report)?;

        report.stats.transfers_recorded = self.operand_to_state.len();
        report.stats.history_nodes = self.history_factory.len();

        region_log!(format!(
            "[Regions] Completed '{}': iterations={} ops={} transfers={} diagnostics={}",
            self.function.name,
            report.stats.worklist_iterations,
            report.stats.ops_evaluated,
            report.stats.transfers_recorded,
            report.diagnostics.len()
        ));
        timer_log!(start, "Region isolation checked in: ");

        Ok(report)
    }

    fn entry_partition(&self) -> Result<Partition, CompilerError> {
        let history = self.history_factory.get();
        let function = self.function;

        if function.separate_entry_elements.is_empty() {
            return Partition::single_region(None, &function.entry_region, history);
        }

        if function.entry_region.is_empty() {
            return Partition::separate_regions(None, &function.separate_entry_elements, history);
        }

        let mut partition = Partition::single_region(None, &function.entry_region, history)?;
        partition.push_history_sequence_boundary(SequenceBoundarySemantics::SeparateRegions, None);
        for element in &function.separate_entry_elements {
            partition.track_new_element(*element, true)?;
        }
        Ok(partition)
    }

    /// Standard forward worklist: apply each block, join into successors, repeat until
    /// no block entry partition changes.
    fn compute_fixed_point(
        &mut self,
        reachable_blocks: &[BlockId],
        report: &mut RegionCheckReport,
    ) -> Result<FxHashMap<BlockId, Partition>, CompilerError> {
        let reachable_block_set = reachable_blocks.iter().copied().collect::<FxHashSet<_>>();
        let max_iterations = self
            .settings
            .max_worklist_iterations(reachable_blocks.len());

        let mut in_states: FxHashMap<BlockId, Partition> = FxHashMap::default();
        let mut out_states: FxHashMap<BlockId, Partition> = FxHashMap::default();
        let entry_partition = self
            .entry_partition()
            .map_err(|error| self.locate_in_block(error, self.function.entry))?;
        in_states.insert(self.function.entry, entry_partition);

        let mut worklist = VecDeque::from([self.function.entry]);
        let mut hooks = CheckerHooks::for_dataflow(self.function, self.settings);

        while let Some(block_id) = worklist.pop_front() {
            report.stats.worklist_iterations += 1;
            if report.stats.worklist_iterations > max_iterations {
                return Err(CompilerError::new_dataflow_error(
                    format!(
                        "Region dataflow did not converge after {max_iterations} iterations"
                    ),
                    self.function.location().at_block(block_id),
                ));
            }

            let Some(mut output_state) = in_states.get(&block_id).cloned() else {
                continue;
            };
            let Some(block) = self.layout.block(self.function, block_id) else {
                continue;
            };

            for op in &block.ops {
                let applied = PartitionOpEvaluator::new(
                    &mut output_state,
                    &mut self.operand_set_factory,
                    &mut self.operand_to_state,
                    &mut hooks,
                )
                .apply(op);
                applied.map_err(|error| self.locate_in_block(error, block_id))?;
                report.stats.ops_evaluated += 1;
            }

            let changed_out = match out_states.get_mut(&block_id) {
                Some(existing) => !Partition::equals(existing, &mut output_state),
                None => true,
            };

            if !changed_out {
                continue;
            }

            out_states.insert(block_id, output_state.clone());

            for successor in &block.successors {
                if !reachable_block_set.contains(successor) {
                    continue;
                }

                let mut next_state = match in_states.get(successor) {
                    Some(existing) => {
                        let joined =
                            Partition::join(existing, &mut output_state, block_id, *successor);
                        joined.map_err(|error| self.locate_in_block(error, *successor))?
                    }
                    None => output_state.clone(),
                };

                let changed_in = match in_states.get_mut(successor) {
                    Some(existing) => !Partition::equals(existing, &mut next_state),
                    None => true,
                };

                if changed_in {
                    in_states.insert(*successor, next_state);
                    worklist.push_back(*successor);
                }
            }
        }

        Ok(in_states)
    }

    /// Replays every block from its converged entry partition with diagnostic hooks.
    fn emit_diagnostics(
        &mut self,
        reachable_blocks: &[BlockId],
        in_states: &FxHashMap<BlockId, Partition>,
        report: &mut RegionCheckReport,
    ) -> Result<(), CompilerError> {
        let mut hooks = CheckerHooks::for_diagnostics(self.function, self.settings);

        for block_id in reachable_blocks {
            let (Some(entry_state), Some(block)) = (
                in_states.get(block_id),
                self.layout.block(self.function, *block_id),
            ) else {
                continue;
            };

            let mut working = entry_state.clone();
            for op in &block.ops {
                let already_recorded = hooks
                    .diagnostics_mut()
                    .map_or(0, |diagnostics| diagnostics.non_transferrable.len());

                let applied = PartitionOpEvaluator::new(
                    &mut working,
                    &mut self.operand_set_factory,
                    &mut self.operand_to_state,
                    &mut hooks,
                )
                .apply(op);
                applied.map_err(|error| self.locate_in_block(error, *block_id))?;

                // Explain pairwise failures while the partition still matches the failing op
                if let Some(diagnostics) = hooks.diagnostics_mut() {
                    for record in diagnostics
                        .non_transferrable
                        .iter_mut()
                        .skip(already_recorded)
                    {
                        if let Some(other_element) = record.other_element {
                            record.explanation =
                                PartitionStack::compute(&working, record.element, other_element);
                        }
                    }
                }
            }

            if self.settings.verbose_logging {
                history_log!(format!(
                    "[Regions] History at exit of {block_id}:\n{}",
                    working.isolation_history().render()
                ));
            }

            report.block_exit_partitions.push(BlockPartitionSnapshot {
                block: *block_id,
                partition: working.to_snapshot(),
            });
        }

        let collected = hooks.into_diagnostics();

        for record in collected.non_transferrable {
            for element in std::iter::once(record.element).chain(record.other_element) {
                report
                    .element_names
                    .insert(element, self.function.element_name(element));
            }

            report
                .diagnostics
                .push(RegionDiagnostic::TransferNonTransferrable {
                    transferring_operand: record.transferring_operand,
                    element: record.element,
                    other_element: record.other_element,
                    isolation: record.isolation,
                    explanation: record.explanation,
                });
        }

        for (transferring_operand, requires) in collected.transfer_requires {
            let requires = RequireLiveness::new(self.function, &self.layout, transferring_operand.user)
                .process(&requires);

            let (isolation, is_closure_captured) = match self.operand_to_state.lookup(transferring_operand) {
                Some(state) => (state.isolation_info.clone(), state.is_closure_captured),
                None => Default::default(),
            };

            report.diagnostics.push(RegionDiagnostic::UseAfterTransfer {
                transferring_operand,
                isolation,
                is_closure_captured,
                requires,
            });
        }

        Ok(())
    }

    fn locate_in_block(&self, mut error: CompilerError, block_id: BlockId) -> CompilerError {
        if error.location.function.is_none() {
            error.location.function = Some(self.function.name.clone());
        }
        error.location.block.get_or_insert(block_id);
        error
    }
}

#[cfg(test)]
mod tests;
