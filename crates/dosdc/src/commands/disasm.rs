//! `disasm` command.

use std::path::Path;

use dosdc::Listing;

use super::{analyze_file, report_failures};
use crate::cli::{EXIT_FAILURE, EngineArgs};

/// Handle the `disasm` command.
pub fn cmd_disasm(input: &Path, args: &EngineArgs, silent: bool) -> i32 {
    let Some(pipeline) = analyze_file(input, args, silent) else {
        return EXIT_FAILURE;
    };
    for function in pipeline.functions.values() {
        println!("{}", Listing(&function.disassembly));
    }
    report_failures(&pipeline)
}
