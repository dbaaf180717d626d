//! Command-line entrypoint for the region isolation checker.
//!
//! This module parses CLI commands and flags, loads the requested function file
//! and prints the reports either for humans or as JSON.

use crate::optimizer::Flag;
use crate::optimizer::check_file;
use crate::optimizer::compiler_messages::display_messages::{
    print_compiler_messages, print_region_report,
};
use crate::settings::{Config, REGION_CHECK_FILE_EXTENSION};
use saying::say;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Check(String), // Checks every function in a TOML function file
    Help,
}

pub fn start_cli() {
    let checker_args: Vec<String> = env::args().collect();

    if checker_args.len() < 2 {
        print_help(false);
        return;
    }

    let command = match get_command(&checker_args[1..]) {
        Ok(command) => command,
        Err(e) => {
            say!(Red e);
            print_help(true);
            return;
        }
    };

    // Gather a list of any additional flags
    let flags = get_flags(&checker_args);

    match command {
        Command::Help => {
            print_help(false);
        }

        Command::Check(path) => {
            let config = config_from_flags(PathBuf::from(path), &flags);
            run_check(&config);
        }
    }
}

fn run_check(config: &Config) {
    let time = Instant::now();

    let reports = match check_file(config) {
        Ok(reports) => reports,
        Err(messages) => {
            print_compiler_messages(messages);
            return;
        }
    };

    if config.json_output {
        match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{json}"),
            Err(e) => say!(Red "Could not serialize the reports: ", e.to_string()),
        }
        return;
    }

    for report in &reports {
        print_region_report(report);
    }

    if config.show_timers {
        say!(Bright Black "------------------------------------");
        say!("Checked ", Bright {reports.len()}, " function(s) in: ", Green #time.elapsed());
    }
}

fn get_command(args: &[String]) -> Result<Command, String> {
    let command = args.first().map(String::as_str);

    match command {
        Some("help") => Ok(Command::Help),

        Some("check") => match args.get(1) {
            Some(path) if !path.starts_with("--") => {
                check_input_extension(path)?;
                Ok(Command::Check(path.to_owned()))
            }
            _ => Err(String::from(
                "Missing function file path (try 'regioncheck check functions.toml')",
            )),
        },

        Some(other) => Err(format!("Invalid command: '{other}'")),

        None => Err(String::from("No command given")),
    }
}

fn get_flags(args: &[String]) -> Vec<Flag> {
    let mut flags = Vec::new();

    for arg in args {
        match arg.as_str() {
            "--verbose" => flags.push(Flag::Verbose),
            "--no-squelch" => flags.push(Flag::DisableSquelch),
            "--json" => flags.push(Flag::Json),
            "--hide-timers" => flags.push(Flag::DisableTimers),
            _ => {}
        }
    }

    flags
}

fn config_from_flags(input_path: PathBuf, flags: &[Flag]) -> Config {
    let mut config = Config::new(input_path);

    for flag in flags {
        match flag {
            Flag::Verbose => config.checker.verbose_logging = true,
            Flag::DisableSquelch => config.checker.squelch_errors = false,
            Flag::Json => config.json_output = true,
            Flag::DisableTimers => config.show_timers = false,
        }
    }

    config
}

fn check_input_extension(path: &str) -> Result<(), String> {
    match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext == REGION_CHECK_FILE_EXTENSION => Ok(()),
        _ => Err(format!(
            "'{path}' is not a .{REGION_CHECK_FILE_EXTENSION} function file"
        )),
    }
}

fn print_help(commands_only: bool) {
    if !commands_only {
        say!(Bright Black "------------------------------------");
        say!(Green Bold "regioncheck - region based isolation checker");
        say!("Usage: ", Bold "<command>", Italic " <args>");
    }
    say!(Green Bold "\nCommands:");
    say!("  check <path>      - Checks every function in a .toml function file");
    say!("  help              - Shows this message");

    say!(Green Bold "\nFlags:");
    say!("  --verbose         - Logs every applied op (needs the show_region_isolation feature)");
    say!("  --no-squelch      - Reports uses after transfer that stay inside one actor");
    say!("  --json            - Prints the reports as JSON");
    say!("  --hide-timers");
}

#[cfg(test)]
#[path = "tests/cli_tests.rs"]
mod tests;
