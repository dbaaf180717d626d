//! Region based concurrency isolation checking for lowered functions.

pub mod cli;
pub mod optimizer;
pub mod settings;

pub use optimizer::analysis::region_isolation::check_region_isolation;
pub use optimizer::{check_file, check_functions};
