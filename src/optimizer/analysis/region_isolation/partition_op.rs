use crate::optimizer::analysis::region_isolation::primitives::{Element, InstId, OperandId};
use crate::optimizer::compiler_messages::compiler_errors::{CompilerError, ErrorLocation};
use crate::return_compiler_error;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionOpKind {
    /// Make the first argument share the region of the second. The second must be tracked.
    Assign,

    /// Give the argument a brand new region.
    AssignFresh,

    /// Union the regions of both arguments. Both must be tracked.
    Merge,

    /// Hand the region of the argument to another concurrency domain.
    Transfer,

    /// Make a transferred region usable again.
    UndoTransfer,

    /// The argument is used here, so its region must not be transferred.
    Require,
}

impl PartitionOpKind {
    pub fn arg_count(self) -> usize {
        match self {
            PartitionOpKind::Assign | PartitionOpKind::Merge => 2,
            PartitionOpKind::AssignFresh
            | PartitionOpKind::Transfer
            | PartitionOpKind::UndoTransfer
            | PartitionOpKind::Require => 1,
        }
    }
}

impl Display for PartitionOpKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            PartitionOpKind::Assign => "assign",
            PartitionOpKind::AssignFresh => "assign_fresh",
            PartitionOpKind::Merge => "merge",
            PartitionOpKind::Transfer => "transfer",
            PartitionOpKind::UndoTransfer => "undo_transfer",
            PartitionOpKind::Require => "require",
        };
        write!(f, "{name}")
    }
}

/// Where an op came from. Only used for diagnostics and history provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PartitionOpSource {
    None,
    Instruction(InstId),
    Operand(OperandId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionOp {
    kind: PartitionOpKind,
    args: Vec<Element>,
    source: PartitionOpSource,
}

fn instruction_source(inst: Option<InstId>) -> PartitionOpSource {
    match inst {
        Some(inst) => PartitionOpSource::Instruction(inst),
        None => PartitionOpSource::None,
    }
}

impl PartitionOp {
    pub fn assign(target: Element, source: Element, inst: Option<InstId>) -> Self {
        PartitionOp {
            kind: PartitionOpKind::Assign,
            args: vec![target, source],
            source: instruction_source(inst),
        }
    }

    pub fn assign_fresh(target: Element, inst: Option<InstId>) -> Self {
        PartitionOp {
            kind: PartitionOpKind::AssignFresh,
            args: vec![target],
            source: instruction_source(inst),
        }
    }

    pub fn merge(first: Element, second: Element, inst: Option<InstId>) -> Self {
        PartitionOp {
            kind: PartitionOpKind::Merge,
            args: vec![first, second],
            source: instruction_source(inst),
        }
    }

    pub fn transfer(target: Element, operand: OperandId) -> Self {
        PartitionOp {
            kind: PartitionOpKind::Transfer,
            args: vec![target],
            source: PartitionOpSource::Operand(operand),
        }
    }

    pub fn undo_transfer(target: Element, inst: InstId) -> Self {
        PartitionOp {
            kind: PartitionOpKind::UndoTransfer,
            args: vec![target],
            source: PartitionOpSource::Instruction(inst),
        }
    }

    pub fn require(target: Element, inst: Option<InstId>) -> Self {
        PartitionOp {
            kind: PartitionOpKind::Require,
            args: vec![target],
            source: instruction_source(inst),
        }
    }

    /// Builds an op from loosely typed parts, rejecting combinations the evaluator cannot run.
    pub fn from_parts(
        kind: PartitionOpKind,
        args: Vec<Element>,
        source: PartitionOpSource,
    ) -> Result<Self, CompilerError> {
        if args.len() != kind.arg_count() {
            return_compiler_error!(
                format!(
                    "'{kind}' takes {} argument(s) but {} were given",
                    kind.arg_count(),
                    args.len()
                ),
                ErrorLocation::default(),
                {
                    CompilationStage => "Region Isolation",
                    PartitionOp => kind.to_string(),
                }
            );
        }

        match (kind, source) {
            (PartitionOpKind::Transfer, PartitionOpSource::Operand(_)) => {}
            (PartitionOpKind::Transfer, _) => {
                return_compiler_error!(
                    "'transfer' needs the transferring operand as its source",
                    ErrorLocation::default(),
                    {
                        CompilationStage => "Region Isolation",
                        PartitionOp => kind.to_string(),
                    }
                );
            }
            (PartitionOpKind::UndoTransfer, PartitionOpSource::Instruction(_)) => {}
            (PartitionOpKind::UndoTransfer, _) => {
                return_compiler_error!(
                    "'undo_transfer' needs the instruction that reacquires the value",
                    ErrorLocation::default(),
                    {
                        CompilationStage => "Region Isolation",
                        PartitionOp => kind.to_string(),
                    }
                );
            }
            (_, PartitionOpSource::Operand(operand)) => {
                return_compiler_error!(
                    format!("'{kind}' cannot be sourced from operand {operand}"),
                    ErrorLocation::default(),
                    {
                        CompilationStage => "Region Isolation",
                        PartitionOp => kind.to_string(),
                    }
                );
            }
            _ => {}
        }

        Ok(PartitionOp { kind, args, source })
    }

    pub fn kind(&self) -> PartitionOpKind {
        self.kind
    }

    pub fn args(&self) -> &[Element] {
        &self.args
    }

    pub fn source(&self) -> PartitionOpSource {
        self.source
    }

    pub fn has_source_inst(&self) -> bool {
        matches!(self.source, PartitionOpSource::Instruction(_))
    }

    /// The instruction this op came from, looking through operands to their user.
    pub fn source_inst(&self) -> Option<InstId> {
        match self.source {
            PartitionOpSource::None => None,
            PartitionOpSource::Instruction(inst) => Some(inst),
            PartitionOpSource::Operand(operand) => Some(operand.user),
        }
    }

    pub fn source_operand(&self) -> Option<OperandId> {
        match self.source {
            PartitionOpSource::Operand(operand) => Some(operand),
            _ => None,
        }
    }
}

impl Display for PartitionOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.args.as_slice() {
            [target, source] if self.kind == PartitionOpKind::Assign => {
                write!(f, "assign {target} = {source}")?
            }
            [first, second] => write!(f, "{} {first} with {second}", self.kind)?,
            [target] => write!(f, "{} {target}", self.kind)?,
            _ => write!(f, "{} <malformed>", self.kind)?,
        }

        match self.source {
            PartitionOpSource::None => Ok(()),
            PartitionOpSource::Instruction(inst) => write!(f, " @ {inst}"),
            PartitionOpSource::Operand(operand) => write!(f, " @ {operand}"),
        }
    }
}
