use crate::optimizer::analysis::region_isolation::{
    MergeExplanation, RegionCheckReport, RegionDiagnostic,
};
use crate::optimizer::compiler_messages::compiler_errors::{
    CompilerError, CompilerMessages, ErrorMetaDataKey, ErrorType,
};
use saying::say;

pub fn print_compiler_messages(messages: CompilerMessages) {
    for err in messages.errors {
        print_formatted_error(err);
    }
}

pub fn print_formatted_error(e: CompilerError) {
    let location = e.location.to_string();

    match e.error_type {
        ErrorType::File => {
            say!(Yellow "🏚 Can't find/read file: ", location);
            say!(e.msg);
            return;
        }

        ErrorType::Config => {
            say!("\n (-_-)  🔥🔥 ", Dark Magenta location, " 🔥🔥  <(^~^)/ ");
            say!(Yellow "MALFORMED INPUT - ");
            say!(Dark Yellow "Something in the function description doesn't make sense");
        }

        ErrorType::Compiler => {
            say!("\nヽ༼☉ ‿ ⚆༽ﾉ  🔥🔥🔥🔥 ", Dark Magenta location, " 🔥🔥🔥🔥  ╰(° _ o╰) ");
            say!(Yellow "CHECKER BUG - ");
            say!(Dark Yellow "an op broke the evaluator's contract (not a data race in your code)");
        }

        ErrorType::Dataflow => {
            say!("\n(╯°Д°)╯  🔥🔥 ", Dark Magenta location, " 🔥🔥  ╰(°□°╰) ");
            say!(Red "Dataflow");
        }
    }

    say!(Red e.msg);

    if let Some(op) = e.metadata.get(&ErrorMetaDataKey::PartitionOp) {
        say!(Dark Magenta "Op: ", Bright {op.to_owned()});
    }
    if let Some(suggestion) = e.metadata.get(&ErrorMetaDataKey::PrimarySuggestion) {
        say!(Green "Suggestion: ", suggestion.to_owned());
    }
    if let Some(suggestion) = e.metadata.get(&ErrorMetaDataKey::AlternativeSuggestion) {
        say!(Green "Alternatively: ", suggestion.to_owned());
    }
}

pub fn print_region_report(report: &RegionCheckReport) {
    say!(Bright Black "------------------------------------");
    say!(Green Bold "fn ", report.function_name.to_owned());

    if report.diagnostics.is_empty() {
        say!(Green "No data races found");
        return;
    }

    for diagnostic in &report.diagnostics {
        print_region_diagnostic(report, diagnostic);
    }

    say!(
        Dark Magenta "Found ",
        Bright {report.use_after_transfer_count()},
        Dark Magenta " use(s) after transfer and ",
        Bright {report.transfer_non_transferrable_count()},
        Dark Magenta " non-transferrable transfer(s)"
    );
}

fn print_region_diagnostic(report: &RegionCheckReport, diagnostic: &RegionDiagnostic) {
    match diagnostic {
        RegionDiagnostic::UseAfterTransfer {
            transferring_operand,
            isolation,
            is_closure_captured,
            requires,
        } => {
            say!(
                Red "Data race: ",
                format!(
                    "value sent by {transferring_operand} into {} code is used afterwards",
                    isolation.describe_for_diagnostics()
                )
            );

            if *is_closure_captured {
                say!(Dark Yellow "  The value was captured by a closure before it was sent");
            }

            for require in requires {
                say!(Dark Magenta "  Used at ", Bright {require.to_string()});
            }
        }

        RegionDiagnostic::TransferNonTransferrable {
            transferring_operand,
            element,
            other_element,
            isolation,
            explanation,
        } => {
            let sender = match transferring_operand {
                Some(operand) => operand.to_string(),
                None => String::from("an unknown operand"),
            };

            let element = report.element_name(*element);
            say!(
                Red "Data race: ",
                format!(
                    "{sender} sends {element}, which is {}",
                    isolation.describe_for_diagnostics()
                )
            );

            if let Some(other_element) = other_element {
                let other_element = report.element_name(*other_element);
                say!(
                    Dark Yellow "  ",
                    format!("{element} shares a region with {other_element}, which gives it that isolation")
                );
            }

            if let Some(explanation) = explanation {
                print_merge_explanation(explanation);
            }
        }
    }
}

fn print_merge_explanation(explanation: &MergeExplanation) {
    let site = match explanation.boundary_inst {
        Some(inst) => inst.to_string(),
        None => String::from("function entry"),
    };

    say!(
        Dark Magenta "  Regions were joined by ",
        Bright {explanation.semantics.to_string()},
        Dark Magenta " at ",
        Bright {site}
    );

    if let Some((pred, succ)) = explanation.joined_blocks {
        say!(Dark Magenta "  Along the edge ", Bright {format!("{pred} -> {succ}")});
    }
}
