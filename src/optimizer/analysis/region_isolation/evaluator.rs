//! Applies partition ops to a working partition.
//!
//! The evaluator owns none of the state it works on. Everything that depends on the embedding
//! (how values are isolated, what a diagnostic looks like) goes through `EvaluatorHooks`,
//! so the same interpreter runs the dataflow fixed point, the diagnostic pass and unit tests.

use crate::optimizer::analysis::region_isolation::history::SequenceBoundarySemantics;
use crate::optimizer::analysis::region_isolation::isolation_info::{
    ActorIsolation, IsolationInfo,
};
use crate::optimizer::analysis::region_isolation::operand_state::TransferringOperandToStateMap;
use crate::optimizer::analysis::region_isolation::partition::{
    Partition, TransferringOperandSetFactory,
};
use crate::optimizer::analysis::region_isolation::partition_op::{
    PartitionOp, PartitionOpKind, PartitionOpSource,
};
use crate::optimizer::analysis::region_isolation::primitives::{
    Element, InstId, OperandId, Region,
};
use crate::optimizer::compiler_messages::compiler_errors::{CompilerError, ErrorLocation};
use crate::{region_log, return_compiler_error};
use rustc_hash::{FxHashMap, FxHashSet};

/// Everything the evaluator needs to ask or tell its embedding.
///
/// Every method has a do-nothing default, which is enough to run the raw dataflow.
/// None of the hooks can see or mutate the partition.
pub trait EvaluatorHooks {
    fn should_emit_verbose_logging(&self) -> bool {
        false
    }

    fn should_try_to_squelch_errors(&self) -> bool {
        true
    }

    /// A required element's region was transferred by `transferring_operand`.
    fn handle_local_use_after_transfer(
        &mut self,
        _op: &PartitionOp,
        _element: Element,
        _transferring_operand: OperandId,
    ) {
    }

    /// `element` was transferred while its region already had concrete isolation.
    fn handle_transfer_non_transferrable(
        &mut self,
        _op: &PartitionOp,
        _element: Element,
        _isolation: &IsolationInfo,
    ) {
    }

    /// Like `handle_transfer_non_transferrable`, but the isolation came from
    /// `other_element`, which shares a region with `element`.
    fn handle_transfer_non_transferrable_with_element(
        &mut self,
        _op: &PartitionOp,
        _element: Element,
        _other_element: Element,
        _isolation: &IsolationInfo,
    ) {
    }

    fn is_actor_derived(&self, _element: Element) -> bool {
        false
    }

    fn is_task_isolated_derived(&self, _element: Element) -> bool {
        false
    }

    fn is_closure_captured(&self, _element: Element, _operand: OperandId) -> bool {
        false
    }

    /// Static isolation of one element.
    fn get_isolation_region_info(&self, _element: Element) -> IsolationInfo {
        IsolationInfo::unknown()
    }

    fn get_instruction_isolation(&self, _inst: InstId) -> IsolationInfo {
        IsolationInfo::unknown()
    }

    /// Isolation of the instruction an op came from.
    fn get_isolation_info(&self, op: &PartitionOp) -> IsolationInfo {
        match op.source_inst() {
            Some(inst) => self.get_instruction_isolation(inst),
            None => IsolationInfo::unknown(),
        }
    }

    /// Actor isolation of the function being checked, if it has one.
    fn function_isolation(&self) -> Option<ActorIsolation> {
        None
    }

    fn instruction_location(&self, inst: InstId) -> ErrorLocation {
        ErrorLocation::default().at_instruction(inst)
    }

    fn operand_location(&self, operand: OperandId) -> ErrorLocation {
        self.instruction_location(operand.user)
    }
}

pub struct PartitionOpEvaluator<'a, H: EvaluatorHooks> {
    partition: &'a mut Partition,
    operand_set_factory: &'a mut TransferringOperandSetFactory,
    operand_to_state: &'a mut TransferringOperandToStateMap,
    hooks: &'a mut H,
}

// Isolation of a whole region, plus which element made it concrete
struct RegionIsolation {
    isolation: IsolationInfo,
    isolation_source: Option<Element>,
    is_closure_captured: bool,
}

impl<'a, H: EvaluatorHooks> PartitionOpEvaluator<'a, H> {
    pub fn new(
        partition: &'a mut Partition,
        operand_set_factory: &'a mut TransferringOperandSetFactory,
        operand_to_state: &'a mut TransferringOperandToStateMap,
        hooks: &'a mut H,
    ) -> Self {
        PartitionOpEvaluator {
            partition,
            operand_set_factory,
            operand_to_state,
            hooks,
        }
    }

    pub fn partition(&self) -> &Partition {
        &*self.partition
    }

    pub fn hooks(&self) -> &H {
        &*self.hooks
    }

    pub fn apply_all(&mut self, ops: &[PartitionOp]) -> Result<(), CompilerError> {
        for op in ops {
            self.apply(op)?;
        }
        Ok(())
    }

    /// Applies one op.
    ///
    /// Races are reported through the hooks and never stop evaluation.
    /// An `Err` means the op itself is malformed for this partition
    /// (wrong arity, an untracked element that must be tracked, missing provenance),
    /// and in that case the partition is left untouched.
    pub fn apply(&mut self, op: &PartitionOp) -> Result<(), CompilerError> {
        let verbose = self.hooks.should_emit_verbose_logging();
        if verbose {
            region_log!(format!("Applying: {op}"));
            region_log!(format!("    Before: {}", self.partition));
        }

        self.check_op_arguments(op)?;

        let history_before = self.partition.isolation_history().head();
        let boundary = SequenceBoundarySemantics::for_op_kind(op.kind());
        if let Some(semantics) = boundary {
            let boundary_inst = if op.has_source_inst() {
                op.source_inst()
            } else {
                None
            };
            self.partition
                .push_history_sequence_boundary(semantics, boundary_inst);
        }

        let args = op.args();
        match op.kind() {
            PartitionOpKind::Assign => {
                self.report_uses_after_transfer(op, args[1]);
                self.partition.assign_element(args[0], args[1], true)?;
            }
            PartitionOpKind::AssignFresh => {
                self.partition.track_new_element(args[0], true)?;
            }
            PartitionOpKind::Merge => {
                self.report_uses_after_transfer(op, args[0]);
                self.report_uses_after_transfer(op, args[1]);
                self.partition.merge(args[0], args[1], true)?;
            }
            PartitionOpKind::Transfer => self.apply_transfer(op, args[0])?,
            PartitionOpKind::UndoTransfer => {
                self.partition.undo_transfer(args[0]);
            }
            PartitionOpKind::Require => self.report_uses_after_transfer(op, args[0]),
        }

        debug_assert!(
            boundary.is_some() || self.partition.isolation_history().head() == history_before,
            "'{op}' changed history without opening a sequence boundary"
        );
        debug_assert!(self.partition.is_canonical_correct());
        debug_assert!(
            self.partition
                .validate_region_to_transferred_op_map_regions()
                .is_ok()
        );

        if verbose {
            region_log!(format!("    After:  {}", self.partition));
        }

        Ok(())
    }

    fn check_op_arguments(&self, op: &PartitionOp) -> Result<(), CompilerError> {
        let location = match op.source() {
            PartitionOpSource::Instruction(inst) => self.hooks.instruction_location(inst),
            PartitionOpSource::Operand(operand) => self.hooks.operand_location(operand),
            PartitionOpSource::None => ErrorLocation::default(),
        };

        if op.args().len() != op.kind().arg_count() {
            return_compiler_error!(
                format!("Malformed partition op '{op}'"),
                location,
                {
                    CompilationStage => "Region Isolation",
                    PartitionOp => op.to_string(),
                }
            );
        }

        if let Some(element) = op.args().iter().find(|element| **element > Element::MAX) {
            return_compiler_error!(
                format!("'{op}' uses {element}, which is above the largest trackable element"),
                location,
                {
                    CompilationStage => "Region Isolation",
                    PartitionOp => op.to_string(),
                    Element => element.to_string(),
                }
            );
        }

        let required = match op.kind() {
            PartitionOpKind::AssignFresh => &[][..],
            PartitionOpKind::Assign => &op.args()[1..],
            PartitionOpKind::Merge
            | PartitionOpKind::Transfer
            | PartitionOpKind::UndoTransfer
            | PartitionOpKind::Require => op.args(),
        };

        if let Some(untracked) = required
            .iter()
            .find(|element| !self.partition.is_tracking_element(**element))
        {
            return_compiler_error!(
                format!("'{op}' uses {untracked}, which is not tracked by the partition"),
                location,
                {
                    CompilationStage => "Region Isolation",
                    PartitionOp => op.to_string(),
                    Element => untracked.to_string(),
                    PrimarySuggestion => "Give every element an 'assign_fresh' before it is used",
                }
            );
        }

        if op.kind() == PartitionOpKind::Transfer && op.source_operand().is_none() {
            return_compiler_error!(
                format!("'{op}' has no transferring operand"),
                location,
                {
                    CompilationStage => "Region Isolation",
                    PartitionOp => op.to_string(),
                }
            );
        }

        Ok(())
    }

    fn apply_transfer(&mut self, op: &PartitionOp, element: Element) -> Result<(), CompilerError> {
        let (Some(region), Some(operand)) = (self.partition.region(element), op.source_operand())
        else {
            return Ok(());
        };

        let region_isolation = self.region_isolation(region, operand);

        // Handing a value to the domain it already lives in is not a transfer
        let call_isolation = self.hooks.get_isolation_info(op);
        if call_isolation.is_known()
            && region_isolation
                .isolation
                .has_same_isolation(&call_isolation)
        {
            return Ok(());
        }

        if region_isolation.isolation.is_known() && !region_isolation.isolation.is_disconnected() {
            match region_isolation.isolation_source {
                Some(other_element) if other_element != element => {
                    self.hooks.handle_transfer_non_transferrable_with_element(
                        op,
                        element,
                        other_element,
                        &region_isolation.isolation,
                    );
                }
                _ => self.hooks.handle_transfer_non_transferrable(
                    op,
                    element,
                    &region_isolation.isolation,
                ),
            }
            return Ok(());
        }

        let history = self.partition.isolation_history().clone();
        let state = self.operand_to_state.get(operand);
        state.is_closure_captured |= region_isolation.is_closure_captured;
        state.isolation_info = state.isolation_info.merge(&region_isolation.isolation);
        state.isolation_history = history;

        let operands = self.operand_set_factory.get(operand);
        self.partition.mark_transferred(element, operands)
    }

    // Merges the isolation of every element in `region`
    fn region_isolation(&self, region: Region, operand: OperandId) -> RegionIsolation {
        let mut result = RegionIsolation {
            isolation: IsolationInfo::unknown(),
            isolation_source: None,
            is_closure_captured: false,
        };

        for (element, element_region) in self.partition.iter() {
            if element_region != region {
                continue;
            }

            let element_isolation = self.element_isolation(element);
            if result.isolation_source.is_none()
                && element_isolation.is_known()
                && !element_isolation.is_disconnected()
            {
                result.isolation_source = Some(element);
            }

            result.isolation = result.isolation.merge(&element_isolation);
            result.is_closure_captured |= self.hooks.is_closure_captured(element, operand);
        }

        result
    }

    fn element_isolation(&self, element: Element) -> IsolationInfo {
        let isolation = self.hooks.get_isolation_region_info(element);
        if isolation.is_known() {
            return isolation;
        }

        if self.hooks.is_actor_derived(element) {
            return IsolationInfo::actor_derived(element);
        }

        if self.hooks.is_task_isolated_derived(element) {
            return IsolationInfo::task_isolated(Some(element));
        }

        isolation
    }

    fn report_uses_after_transfer(&mut self, op: &PartitionOp, element: Element) {
        let Some(operands) = self.partition.transferred(element).cloned() else {
            return;
        };

        for transferring_operand in operands.iter() {
            self.handle_local_use_after_transfer_helper(op, element, transferring_operand);
        }
    }

    fn handle_local_use_after_transfer_helper(
        &mut self,
        op: &PartitionOp,
        element: Element,
        transferring_operand: OperandId,
    ) {
        if self.hooks.should_try_to_squelch_errors() {
            let op_isolation = self.hooks.get_isolation_info(op);
            let transferring_isolation = self
                .hooks
                .get_instruction_isolation(transferring_operand.user);

            // Transfer and use happen inside the same actor
            if op_isolation.is_actor_isolated()
                && op_isolation.has_same_isolation(&transferring_isolation)
            {
                if self.hooks.should_emit_verbose_logging() {
                    region_log!(format!(
                        "    Squelching use of {element} after transfer by {transferring_operand}"
                    ));
                }
                return;
            }

            // The transfer stays inside the actor the whole function is isolated to
            if let Some(function_isolation) = self.hooks.function_isolation() {
                if transferring_isolation.has_same_actor_isolation(&function_isolation) {
                    if self.hooks.should_emit_verbose_logging() {
                        region_log!(format!(
                            "    Squelching use of {element} after transfer by {transferring_operand} inside {function_isolation}"
                        ));
                    }
                    return;
                }
            }
        }

        self.hooks
            .handle_local_use_after_transfer(op, element, transferring_operand);
    }
}

/// Hooks with configurable isolation answers that record every callback.
/// Used to drive the raw dataflow and in tests.
#[derive(Debug, Clone, Default)]
pub struct BasicHooks {
    pub verbose_logging: bool,
    pub disable_squelching: bool,
    pub element_isolation: FxHashMap<Element, IsolationInfo>,
    pub instruction_isolation: FxHashMap<InstId, IsolationInfo>,
    pub actor_derived: FxHashSet<Element>,
    pub task_isolated_derived: FxHashSet<Element>,
    pub closure_captures: FxHashSet<(Element, OperandId)>,
    pub function_isolation: Option<ActorIsolation>,

    pub uses_after_transfer: Vec<(PartitionOp, Element, OperandId)>,
    pub non_transferrable: Vec<(PartitionOp, Element, Option<Element>, IsolationInfo)>,
}

impl EvaluatorHooks for BasicHooks {
    fn should_emit_verbose_logging(&self) -> bool {
        self.verbose_logging
    }

    fn should_try_to_squelch_errors(&self) -> bool {
        !self.disable_squelching
    }

    fn handle_local_use_after_transfer(
        &mut self,
        op: &PartitionOp,
        element: Element,
        transferring_operand: OperandId,
    ) {
        self.uses_after_transfer
            .push((op.clone(), element, transferring_operand));
    }

    fn handle_transfer_non_transferrable(
        &mut self,
        op: &PartitionOp,
        element: Element,
        isolation: &IsolationInfo,
    ) {
        self.non_transferrable
            .push((op.clone(), element, None, isolation.clone()));
    }

    fn handle_transfer_non_transferrable_with_element(
        &mut self,
        op: &PartitionOp,
        element: Element,
        other_element: Element,
        isolation: &IsolationInfo,
    ) {
        self.non_transferrable
            .push((op.clone(), element, Some(other_element), isolation.clone()));
    }

    fn is_actor_derived(&self, element: Element) -> bool {
        self.actor_derived.contains(&element)
    }

    fn is_task_isolated_derived(&self, element: Element) -> bool {
        self.task_isolated_derived.contains(&element)
    }

    fn is_closure_captured(&self, element: Element, operand: OperandId) -> bool {
        self.closure_captures.contains(&(element, operand))
    }

    fn get_isolation_region_info(&self, element: Element) -> IsolationInfo {
        self.element_isolation
            .get(&element)
            .cloned()
            .unwrap_or_default()
    }

    fn get_instruction_isolation(&self, inst: InstId) -> IsolationInfo {
        self.instruction_isolation
            .get(&inst)
            .cloned()
            .unwrap_or_default()
    }

    fn function_isolation(&self) -> Option<ActorIsolation> {
        self.function_isolation.clone()
    }
}
