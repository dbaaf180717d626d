use crate::optimizer::analysis::region_isolation::evaluator::EvaluatorHooks;
use crate::optimizer::analysis::region_isolation::function::{ElementInfo, RegionFunction};
use crate::optimizer::analysis::region_isolation::isolation_info::{
    ActorIsolation, IsolationInfo,
};
use crate::optimizer::analysis::region_isolation::partition_op::PartitionOp;
use crate::optimizer::analysis::region_isolation::primitives::{Element, InstId, OperandId};
use crate::optimizer::analysis::region_isolation::types::MergeExplanation;
use crate::optimizer::compiler_messages::compiler_errors::ErrorLocation;
use crate::region_log;
use crate::settings::CheckerSettings;
use std::collections::BTreeMap;

/// A transfer of a value whose region was already isolated.
#[derive(Debug, Clone)]
pub(crate) struct NonTransferrableRecord {
    pub(crate) transferring_operand: Option<OperandId>,
    pub(crate) element: Element,
    pub(crate) other_element: Option<Element>,
    pub(crate) isolation: IsolationInfo,
    pub(crate) explanation: Option<MergeExplanation>,
}

/// Raw callback output of the diagnostic pass, before requires are narrowed.
#[derive(Debug, Default)]
pub(crate) struct DiagnosticCollector {
    // Ordered by operand so reports are stable
    pub(crate) transfer_requires: BTreeMap<OperandId, Vec<InstId>>,
    pub(crate) non_transferrable: Vec<NonTransferrableRecord>,
}

/// Hooks used by both passes over a function.
/// The fixed point runs without a collector, the diagnostic pass runs with one.
pub(crate) struct CheckerHooks<'a> {
    function: &'a RegionFunction,
    settings: &'a CheckerSettings,
    diagnostics: Option<DiagnosticCollector>,
}

impl<'a> CheckerHooks<'a> {
    pub(crate) fn for_dataflow(function: &'a RegionFunction, settings: &'a CheckerSettings) -> Self {
        CheckerHooks {
            function,
            settings,
            diagnostics: None,
        }
    }

    pub(crate) fn for_diagnostics(
        function: &'a RegionFunction,
        settings: &'a CheckerSettings,
    ) -> Self {
        CheckerHooks {
            function,
            settings,
            diagnostics: Some(DiagnosticCollector::default()),
        }
    }

    pub(crate) fn diagnostics_mut(&mut self) -> Option<&mut DiagnosticCollector> {
        self.diagnostics.as_mut()
    }

    pub(crate) fn into_diagnostics(self) -> DiagnosticCollector {
        self.diagnostics.unwrap_or_default()
    }

    fn element_info_flag(&self, element: Element, flag: fn(&ElementInfo) -> bool) -> bool {
        self.function.elements.get(&element).is_some_and(flag)
    }
}

impl EvaluatorHooks for CheckerHooks<'_> {
    fn should_emit_verbose_logging(&self) -> bool {
        self.settings.verbose_logging
    }

    fn should_try_to_squelch_errors(&self) -> bool {
        self.settings.squelch_errors
    }

    fn handle_local_use_after_transfer(
        &mut self,
        op: &PartitionOp,
        element: Element,
        transferring_operand: OperandId,
    ) {
        let Some(diagnostics) = self.diagnostics.as_mut() else {
            return;
        };

        let Some(require_inst) = op.source_inst() else {
            region_log!(format!(
                "Dropping use of {element} after transfer by {transferring_operand}: '{op}' has no instruction"
            ));
            return;
        };

        diagnostics
            .transfer_requires
            .entry(transferring_operand)
            .or_default()
            .push(require_inst);
    }

    fn handle_transfer_non_transferrable(
        &mut self,
        op: &PartitionOp,
        element: Element,
        isolation: &IsolationInfo,
    ) {
        if let Some(diagnostics) = self.diagnostics.as_mut() {
            diagnostics.non_transferrable.push(NonTransferrableRecord {
                transferring_operand: op.source_operand(),
                element,
                other_element: None,
                isolation: isolation.clone(),
                explanation: None,
            });
        }
    }

    fn handle_transfer_non_transferrable_with_element(
        &mut self,
        op: &PartitionOp,
        element: Element,
        other_element: Element,
        isolation: &IsolationInfo,
    ) {
        if let Some(diagnostics) = self.diagnostics.as_mut() {
            diagnostics.non_transferrable.push(NonTransferrableRecord {
                transferring_operand: op.source_operand(),
                element,
                other_element: Some(other_element),
                isolation: isolation.clone(),
                explanation: None,
            });
        }
    }

    fn is_actor_derived(&self, element: Element) -> bool {
        self.element_info_flag(element, |info| info.actor_derived)
    }

    fn is_task_isolated_derived(&self, element: Element) -> bool {
        self.element_info_flag(element, |info| info.task_isolated_derived)
    }

    fn is_closure_captured(&self, element: Element, operand: OperandId) -> bool {
        self.function.closure_captures.contains(&(element, operand))
    }

    fn get_isolation_region_info(&self, element: Element) -> IsolationInfo {
        self.function
            .elements
            .get(&element)
            .map(|info| info.isolation.clone())
            .unwrap_or_default()
    }

    fn get_instruction_isolation(&self, inst: InstId) -> IsolationInfo {
        self.function
            .instruction_isolation
            .get(&inst)
            .cloned()
            .unwrap_or_default()
    }

    fn function_isolation(&self) -> Option<ActorIsolation> {
        self.function.isolation.clone()
    }

    fn instruction_location(&self, inst: InstId) -> ErrorLocation {
        self.function.location().at_instruction(inst)
    }
}
