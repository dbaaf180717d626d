//! Loads lowered functions from TOML files.
//!
//! ```toml
//! [checker]
//! squelch_errors = false
//!
//! [[functions]]
//! name = "send_to_main"
//! entry = 0
//!
//! [[functions.elements]]
//! id = 1
//! name = "value"
//! isolation = "disconnected"
//!
//! [[functions.instructions]]
//! id = 2
//! isolation = { global_actor = "MainActor" }
//!
//! [[functions.blocks]]
//! id = 0
//! ops = [
//!     { kind = "assign_fresh", args = [1], inst = 1 },
//!     { kind = "transfer", args = [1], operand = { user = 2, index = 0 } },
//!     { kind = "require", args = [1], inst = 3 },
//! ]
//! ```

use crate::optimizer::analysis::region_isolation::function::{
    ElementInfo, RegionBlock, RegionFunction,
};
use crate::optimizer::analysis::region_isolation::isolation_info::{
    ActorIsolation, IsolationInfo,
};
use crate::optimizer::analysis::region_isolation::partition_op::{
    PartitionOp, PartitionOpKind, PartitionOpSource,
};
use crate::optimizer::analysis::region_isolation::primitives::{
    BlockId, Element, InstId, OperandId,
};
use crate::optimizer::compiler_messages::compiler_errors::{
    CompilerError, ErrorLocation, ErrorType,
};
use crate::settings::CheckerSettings;
use crate::return_config_error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Everything one input file describes.
#[derive(Debug, Clone)]
pub struct FunctionFile {
    pub checker: Option<CheckerSettings>,
    pub functions: Vec<RegionFunction>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileEntry {
    checker: Option<CheckerSettings>,

    #[serde(default)]
    functions: Vec<FunctionEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FunctionEntry {
    name: String,
    isolation: Option<ActorEntry>,

    #[serde(default)]
    entry: u32,

    #[serde(default)]
    entry_region: Vec<u32>,

    #[serde(default)]
    separate_entry_elements: Vec<u32>,

    #[serde(default)]
    elements: Vec<ElementEntry>,

    #[serde(default)]
    instructions: Vec<InstructionEntry>,

    #[serde(default)]
    closure_captures: Vec<ClosureCaptureEntry>,

    #[serde(default)]
    blocks: Vec<BlockEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ActorEntry {
    GlobalActor(String),
    ActorInstance(u32),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum IsolationEntry {
    #[default]
    Unknown,
    Disconnected,
    Task(u32),
    GlobalActor(String),
    ActorInstance(u32),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ElementEntry {
    id: u32,
    name: Option<String>,

    #[serde(default)]
    isolation: IsolationEntry,

    #[serde(default)]
    actor_derived: bool,

    #[serde(default)]
    task_isolated_derived: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct InstructionEntry {
    id: u32,
    isolation: IsolationEntry,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
struct OperandEntry {
    user: u32,

    #[serde(default)]
    index: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClosureCaptureEntry {
    element: u32,
    operand: OperandEntry,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BlockEntry {
    id: u32,

    #[serde(default)]
    successors: Vec<u32>,

    #[serde(default)]
    ops: Vec<OpEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OpEntry {
    kind: PartitionOpKind,
    args: Vec<u32>,
    inst: Option<u32>,
    operand: Option<OperandEntry>,
}

pub fn load_function_file(path: &Path) -> Result<FunctionFile, CompilerError> {
    let source = fs::read_to_string(path).map_err(|error| {
        CompilerError::file_error(path, format!("Could not read function file: {error}"))
    })?;

    parse_function_file(&source).map_err(|error| error.with_file_path(path))
}

pub fn parse_function_file(source: &str) -> Result<FunctionFile, CompilerError> {
    let file: FileEntry = toml::from_str(source).map_err(|error| {
        CompilerError::new_config_error(
            format!("Malformed function file: {error}"),
            ErrorLocation::default(),
        )
    })?;

    let mut functions = Vec::with_capacity(file.functions.len());
    for function in file.functions {
        functions.push(function.into_region_function()?);
    }

    Ok(FunctionFile {
        checker: file.checker,
        functions,
    })
}

impl FunctionEntry {
    fn into_region_function(self) -> Result<RegionFunction, CompilerError> {
        let mut function = RegionFunction::new(self.name, BlockId(self.entry));
        function.isolation = self.isolation.map(ActorEntry::into_actor_isolation);
        function.entry_region = tracked_elements(&self.entry_region, function.location())?;
        function.separate_entry_elements =
            tracked_elements(&self.separate_entry_elements, function.location())?;

        for element in self.elements {
            tracked_elements(&[element.id], function.location())?;

            let info = ElementInfo {
                name: element.name,
                isolation: element.isolation.into_isolation_info(),
                actor_derived: element.actor_derived,
                task_isolated_derived: element.task_isolated_derived,
            };

            if function.elements.insert(Element(element.id), info).is_some() {
                return_config_error!(
                    format!("Element {} is described more than once", Element(element.id)),
                    function.location()
                );
            }
        }

        for instruction in self.instructions {
            let isolation = instruction.isolation.into_isolation_info();
            if function
                .instruction_isolation
                .insert(InstId(instruction.id), isolation)
                .is_some()
            {
                return_config_error!(
                    format!("Instruction {} has more than one isolation", InstId(instruction.id)),
                    function.location().at_instruction(InstId(instruction.id))
                );
            }
        }

        function.closure_captures = self
            .closure_captures
            .into_iter()
            .map(|capture| (Element(capture.element), capture.operand.into_operand_id()))
            .collect();

        for block in self.blocks {
            let block_id = BlockId(block.id);
            let mut ops = Vec::with_capacity(block.ops.len());

            for op in block.ops {
                let location = function.location().at_block(block_id);
                ops.push(op.into_partition_op().map_err(|mut error| {
                    error.error_type = ErrorType::Config;
                    error.with_location(location)
                })?);
            }

            function.blocks.push(RegionBlock::new(
                block_id,
                block.successors.into_iter().map(BlockId).collect(),
                ops,
            ));
        }

        Ok(function)
    }
}

impl OpEntry {
    fn into_partition_op(self) -> Result<PartitionOp, CompilerError> {
        let source = match (self.inst, self.operand) {
            (Some(_), Some(operand)) => {
                return_config_error!(
                    format!(
                        "A '{}' op has both an instruction and an operand",
                        self.kind
                    ),
                    ErrorLocation::default(),
                    {
                        PrimarySuggestion => "Only 'transfer' ops take an operand, every other op takes 'inst'",
                    }
                );
            }
            (Some(inst), None) => PartitionOpSource::Instruction(InstId(inst)),
            (None, Some(operand)) => PartitionOpSource::Operand(operand.into_operand_id()),
            (None, None) => PartitionOpSource::None,
        };

        PartitionOp::from_parts(
            self.kind,
            tracked_elements(&self.args, ErrorLocation::default())?,
            source,
        )
    }
}

// The largest id is reserved so region ids can always sit above every element
fn tracked_elements(ids: &[u32], location: ErrorLocation) -> Result<Vec<Element>, CompilerError> {
    if let Some(id) = ids.iter().find(|id| Element(**id) > Element::MAX) {
        return_config_error!(
            format!(
                "Element id {id} is too large, the largest element id is {}",
                Element::MAX.0
            ),
            location,
            {
                Element => Element(*id).to_string(),
            }
        );
    }

    Ok(ids.iter().copied().map(Element).collect())
}

impl OperandEntry {
    fn into_operand_id(self) -> OperandId {
        OperandId::new(InstId(self.user), self.index)
    }
}

impl ActorEntry {
    fn into_actor_isolation(self) -> ActorIsolation {
        match self {
            ActorEntry::GlobalActor(name) => ActorIsolation::GlobalActor(name),
            ActorEntry::ActorInstance(element) => ActorIsolation::ActorInstance(Element(element)),
        }
    }
}

impl IsolationEntry {
    fn into_isolation_info(self) -> IsolationInfo {
        match self {
            IsolationEntry::Unknown => IsolationInfo::unknown(),
            IsolationEntry::Disconnected => IsolationInfo::disconnected(),
            IsolationEntry::Task(element) => IsolationInfo::task_isolated(Some(Element(element))),
            IsolationEntry::GlobalActor(name) => IsolationInfo::global_actor(name),
            IsolationEntry::ActorInstance(element) => IsolationInfo::actor_isolated(
                ActorIsolation::ActorInstance(Element(element)),
                Some(Element(element)),
            ),
        }
    }
}

#[cfg(test)]
#[path = "tests/function_input_tests.rs"]
mod tests;
