//! `cfg` command.

use std::path::Path;

use dosdc::{GraphDump, Liveness};

use super::{analyze_file, report_failures};
use crate::cli::{EXIT_FAILURE, EngineArgs};

/// Handle the `cfg` command.
pub fn cmd_cfg(input: &Path, args: &EngineArgs, liveness: bool, silent: bool) -> i32 {
    let Some(pipeline) = analyze_file(input, args, silent) else {
        return EXIT_FAILURE;
    };
    for function in pipeline.functions.values() {
        let dump = GraphDump::new(&function.graph);
        if liveness {
            let live = Liveness::compute(&function.graph);
            println!("{}", dump.with_liveness(&live));
        } else {
            println!("{dump}");
        }
    }
    report_failures(&pipeline)
}
