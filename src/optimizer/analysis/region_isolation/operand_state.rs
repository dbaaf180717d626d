use crate::optimizer::analysis::region_isolation::history::{
    IsolationHistory, IsolationHistoryFactory,
};
use crate::optimizer::analysis::region_isolation::isolation_info::IsolationInfo;
use crate::optimizer::analysis::region_isolation::primitives::OperandId;
use rustc_hash::FxHashMap;

/// What one operand transferred, accumulated across every time it transferred something.
#[derive(Debug, Clone)]
pub struct TransferringOperandState {
    /// Merged isolation of every region this operand transferred
    pub isolation_info: IsolationInfo,

    /// History of the partition at the most recent transfer
    pub isolation_history: IsolationHistory,

    pub is_closure_captured: bool,
}

/// Function scoped side table of transferring operands.
#[derive(Debug)]
pub struct TransferringOperandToStateMap {
    internal_map: FxHashMap<OperandId, TransferringOperandState>,
    history_factory: IsolationHistoryFactory,
}

impl TransferringOperandToStateMap {
    pub fn new(history_factory: IsolationHistoryFactory) -> Self {
        TransferringOperandToStateMap {
            internal_map: FxHashMap::default(),
            history_factory,
        }
    }

    /// The state for `operand`, created with an empty history on first use.
    pub fn get(&mut self, operand: OperandId) -> &mut TransferringOperandState {
        let history_factory = &self.history_factory;
        self.internal_map
            .entry(operand)
            .or_insert_with(|| TransferringOperandState {
                isolation_info: IsolationInfo::unknown(),
                isolation_history: history_factory.get(),
                is_closure_captured: false,
            })
    }

    pub fn lookup(&self, operand: OperandId) -> Option<&TransferringOperandState> {
        self.internal_map.get(&operand)
    }

    pub fn len(&self) -> usize {
        self.internal_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.internal_map.is_empty()
    }
}
