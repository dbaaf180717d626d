use crate::optimizer::analysis::region_isolation::primitives::{BlockId, InstId};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

// The final set of errors emitted while loading and checking functions
#[derive(Debug, Default)]
pub struct CompilerMessages {
    pub errors: Vec<CompilerError>,
}

impl CompilerMessages {
    pub fn new() -> Self {
        CompilerMessages { errors: Vec::new() }
    }

    pub fn from_error(error: CompilerError) -> Self {
        CompilerMessages {
            errors: vec![error],
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq, Serialize)]
pub enum ErrorMetaDataKey {
    CompilationStage,
    FunctionName,
    PartitionOp,
    Element,
    Operand,

    // Optional suggestions
    PrimarySuggestion,
    AlternativeSuggestion,
}

/// Where an error came from.
/// Every part is optional because errors can be raised before a function or block is known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorLocation {
    pub file: Option<PathBuf>,
    pub function: Option<String>,
    pub block: Option<BlockId>,
    pub instruction: Option<InstId>,
}

impl ErrorLocation {
    pub fn in_file(path: &Path) -> Self {
        ErrorLocation {
            file: Some(path.to_path_buf()),
            ..ErrorLocation::default()
        }
    }

    pub fn in_function(name: impl Into<String>) -> Self {
        ErrorLocation {
            function: Some(name.into()),
            ..ErrorLocation::default()
        }
    }

    pub fn at_block(mut self, block: BlockId) -> Self {
        self.block = Some(block);
        self
    }

    pub fn at_instruction(mut self, instruction: InstId) -> Self {
        self.instruction = Some(instruction);
        self
    }

    pub fn with_file(mut self, path: &Path) -> Self {
        self.file = Some(path.to_path_buf());
        self
    }

    pub fn is_unknown(&self) -> bool {
        self == &ErrorLocation::default()
    }
}

impl Display for ErrorLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(file) = &self.file {
            parts.push(file.display().to_string());
        }
        if let Some(function) = &self.function {
            parts.push(format!("fn '{function}'"));
        }
        if let Some(block) = self.block {
            parts.push(block.to_string());
        }
        if let Some(instruction) = self.instruction {
            parts.push(instruction.to_string());
        }

        if parts.is_empty() {
            return write!(f, "<unknown location>");
        }

        write!(f, "{}", parts.join(" > "))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CompilerError {
    pub msg: String,
    pub location: ErrorLocation,
    pub error_type: ErrorType,

    // Structured context for tooling, printed after the message
    pub metadata: HashMap<ErrorMetaDataKey, String>,
}

impl CompilerError {
    pub fn new(msg: impl Into<String>, location: ErrorLocation, error_type: ErrorType) -> Self {
        CompilerError {
            msg: msg.into(),
            location,
            error_type,
            metadata: HashMap::new(),
        }
    }

    pub fn with_location(mut self, location: ErrorLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_file_path(mut self, path: &Path) -> Self {
        self.location.file = Some(path.to_path_buf());
        self
    }

    pub fn new_metadata_entry(&mut self, key: ErrorMetaDataKey, value: impl Into<String>) {
        self.metadata.insert(key, value.into());
    }

    /// Create a compiler error (internal bug or a broken caller contract, not the user's fault)
    pub fn compiler_error(msg: impl Into<String>) -> Self {
        CompilerError::new(msg, ErrorLocation::default(), ErrorType::Compiler)
    }

    /// Create a file system error for a path that could not be read
    pub fn file_error(path: &Path, msg: impl Into<String>) -> Self {
        CompilerError::new(msg, ErrorLocation::in_file(path), ErrorType::File)
    }

    /// Create a malformed input / config error
    pub fn new_config_error(msg: impl Into<String>, location: ErrorLocation) -> Self {
        CompilerError::new(msg, location, ErrorType::Config)
    }

    /// Create a dataflow error (the fixed point could not be computed)
    pub fn new_dataflow_error(msg: impl Into<String>, location: ErrorLocation) -> Self {
        CompilerError::new(msg, location, ErrorType::Dataflow)
    }

    /// Create a thread panic error (internal issue in a parallel check)
    pub fn new_thread_panic(msg: impl Into<String>) -> Self {
        CompilerError::new(msg, ErrorLocation::default(), ErrorType::Compiler)
    }
}

impl Display for CompilerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({})",
            error_type_to_str(&self.error_type),
            self.msg,
            self.location
        )
    }
}

impl std::error::Error for CompilerError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorType {
    File,
    Config,
    Compiler,
    Dataflow,
}

pub fn error_type_to_str(e_type: &ErrorType) -> &'static str {
    match e_type {
        ErrorType::Compiler => "Compiler Bug",
        ErrorType::Config => "Malformed Input",
        ErrorType::File => "File Error",
        ErrorType::Dataflow => "Dataflow",
    }
}

/// Returns a new CompilerError for a broken caller contract.
///
/// Usage: `return_compiler_error!("msg", location, { PartitionOp => op.to_string() })`;
#[macro_export]
macro_rules! return_compiler_error {
    ($msg:expr, $location:expr, { $( $key:ident => $value:expr ),* $(,)? }) => {
        return Err($crate::optimizer::compiler_messages::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $location,
            error_type: $crate::optimizer::compiler_messages::compiler_errors::ErrorType::Compiler,
            metadata: {
                let mut map = std::collections::HashMap::new();
                $( map.insert($crate::optimizer::compiler_messages::compiler_errors::ErrorMetaDataKey::$key, $value.into()); )*
                map
            },
        })
    };
    ($msg:expr, $location:expr) => {
        return Err($crate::optimizer::compiler_messages::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $location,
            error_type: $crate::optimizer::compiler_messages::compiler_errors::ErrorType::Compiler,
            metadata: std::collections::HashMap::new(),
        })
    };
}

/// Returns a new CompilerError for malformed function descriptions.
///
/// Usage: `return_config_error!("msg", location, { PrimarySuggestion => "..." })`;
#[macro_export]
macro_rules! return_config_error {
    ($msg:expr, $location:expr, { $( $key:ident => $value:expr ),* $(,)? }) => {
        return Err($crate::optimizer::compiler_messages::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $location,
            error_type: $crate::optimizer::compiler_messages::compiler_errors::ErrorType::Config,
            metadata: {
                let mut map = std::collections::HashMap::new();
                $( map.insert($crate::optimizer::compiler_messages::compiler_errors::ErrorMetaDataKey::$key, $value.into()); )*
                map
            },
        })
    };
    ($msg:expr, $location:expr) => {
        return Err($crate::optimizer::compiler_messages::compiler_errors::CompilerError {
            msg: $msg.into(),
            location: $location,
            error_type: $crate::optimizer::compiler_messages::compiler_errors::ErrorType::Config,
            metadata: std::collections::HashMap::new(),
        })
    };
}
