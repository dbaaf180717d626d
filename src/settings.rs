use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const REGION_CHECK_FILE_EXTENSION: &str = "toml";

// The fixed point is monotone, so this only trips on a broken join.
// Scaled by block count when a function is checked.
pub const WORKLIST_ITERATIONS_PER_BLOCK: usize = 64;
pub const MINIMUM_WORKLIST_ITERATIONS: usize = 1_024;

/// Behaviour flags handed to the evaluator. Never read from the process environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckerSettings {
    pub verbose_logging: bool,
    pub squelch_errors: bool,
    pub worklist_iterations_per_block: usize,
}

impl Default for CheckerSettings {
    fn default() -> Self {
        CheckerSettings {
            verbose_logging: false,
            squelch_errors: true,
            worklist_iterations_per_block: WORKLIST_ITERATIONS_PER_BLOCK,
        }
    }
}

impl CheckerSettings {
    pub fn max_worklist_iterations(&self, block_count: usize) -> usize {
        block_count
            .saturating_mul(self.worklist_iterations_per_block)
            .max(MINIMUM_WORKLIST_ITERATIONS)
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub input_path: PathBuf,
    pub checker: CheckerSettings,
    pub json_output: bool,
    pub show_timers: bool,
}

impl Config {
    pub fn new(input_path: PathBuf) -> Self {
        Config {
            input_path,
            ..Config::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            input_path: PathBuf::from("functions.toml"),
            checker: CheckerSettings::default(),
            json_output: false,
            show_timers: true,
        }
    }
}
