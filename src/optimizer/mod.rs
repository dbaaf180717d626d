pub mod analysis {
    pub mod region_isolation;
}

pub mod compiler_messages {
    pub mod compiler_dev_logging;
    pub mod compiler_errors;
    pub mod display_messages;
}

pub mod function_input;

use crate::optimizer::analysis::region_isolation::function::RegionFunction;
use crate::optimizer::analysis::region_isolation::{RegionCheckReport, check_region_isolation};
use crate::optimizer::compiler_messages::compiler_errors::{
    CompilerError, CompilerMessages, ErrorMetaDataKey,
};
use crate::optimizer::function_input::load_function_file;
use crate::settings::{CheckerSettings, Config};
use crate::timer_log;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum Flag {
    Verbose,
    DisableSquelch,
    Json,
    DisableTimers,
}

/// Checks every function independently and in parallel.
/// Results come back in the same order as `functions`.
pub fn check_functions(
    functions: &[RegionFunction],
    settings: &CheckerSettings,
) -> Vec<Result<RegionCheckReport, CompilerError>> {
    functions
        .par_iter()
        .map(|function| {
            // History arenas are per function and never cross threads
            panic::catch_unwind(AssertUnwindSafe(|| check_region_isolation(function, settings)))
                .unwrap_or_else(|_| {
                    let mut error = CompilerError::new_thread_panic(format!(
                        "Checking '{}' panicked",
                        function.name
                    ));
                    error.new_metadata_entry(ErrorMetaDataKey::FunctionName, function.name.clone());
                    Err(error)
                })
        })
        .collect()
}

/// Loads the input file named by the config and checks every function in it.
/// Any failure to load or check a function is returned as a whole set of messages.
pub fn check_file(config: &Config) -> Result<Vec<RegionCheckReport>, CompilerMessages> {
    // ----------------------------------
    //          Load functions
    // ----------------------------------
    let time = Instant::now();
    let file = load_function_file(&config.input_path).map_err(CompilerMessages::from_error)?;
    timer_log!(time, "Function file loaded in: ");

    let settings = resolve_settings(file.checker, &config.checker);

    // ----------------------------------
    //        Region isolation
    // ----------------------------------
    let time = Instant::now();
    let mut reports = Vec::with_capacity(file.functions.len());
    let mut messages = CompilerMessages::new();

    for result in check_functions(&file.functions, &settings) {
        match result {
            Ok(report) => reports.push(report),
            Err(error) => messages
                .errors
                .push(error.with_file_path(&config.input_path)),
        }
    }
    timer_log!(time, "Region isolation checked in: ");

    if messages.has_errors() {
        return Err(messages);
    }

    Ok(reports)
}

/// The file's `[checker]` table is the base. Flags given on the command line win over it.
pub fn resolve_settings(
    file_settings: Option<CheckerSettings>,
    command_line: &CheckerSettings,
) -> CheckerSettings {
    let mut settings = file_settings.unwrap_or_else(|| command_line.clone());

    if command_line.verbose_logging {
        settings.verbose_logging = true;
    }
    if !command_line.squelch_errors {
        settings.squelch_errors = false;
    }

    settings
}
