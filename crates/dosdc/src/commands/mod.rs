//! Command implementations.

mod cfg;
mod disasm;

use std::path::Path;

use dosdc::{Image, Pipeline};
use tracing::{debug, error, info};

use crate::cli::{Cli, Commands, EXIT_FAILURE, EXIT_SUCCESS, EngineArgs};
use crate::terminal::{self, Spinner};

/// Dispatch CLI command to the appropriate handler.
pub fn run_command(cli: &Cli) -> i32 {
    match &cli.command {
        Commands::Disasm { input, engine } => disasm::cmd_disasm(input, engine, cli.silent),
        Commands::Cfg {
            input,
            engine,
            liveness,
        } => cfg::cmd_cfg(input, engine, *liveness, cli.silent),
    }
}

/// Load `input` and run the pipeline over the requested entries.
fn analyze_file(input: &Path, args: &EngineArgs, silent: bool) -> Option<Pipeline> {
    info!(input = %input.display(), "loading");
    let image = match Image::load(input) {
        Ok(image) => image,
        Err(e) => {
            error!(error = %e, "failed to load executable");
            return None;
        }
    };

    let entries = if args.entry.is_empty() {
        vec![image.entry]
    } else {
        args.entry.clone()
    };

    let spinner = if silent {
        Spinner::hidden()
    } else {
        Spinner::new(format!("Analyzing {}", input.display()))
    };
    let mut pipeline = Pipeline::new(image, args.pipeline_config());
    debug!(
        templates = ?pipeline.disassembler().template_names(),
        follow_calls = pipeline.config().follow_calls,
        max_cases = pipeline.config().engine.max_switch_cases,
        "pipeline configured"
    );
    pipeline.run(entries);

    let stats = pipeline.stats();
    let summary = format!(
        "{} functions, {} instructions, {} switches",
        stats.functions, stats.instructions, stats.switches
    );
    if stats.failures == 0 {
        spinner.finish_with_success(&summary);
    } else {
        spinner.finish_with_warning(&format!("{summary}, {} failed", stats.failures));
    }
    Some(pipeline)
}

/// Report failed functions and pick the exit code.
fn report_failures(pipeline: &Pipeline) -> i32 {
    for failure in &pipeline.failures {
        terminal::error(&format!("{}: {}", failure.entry, failure.error));
    }
    let unresolved: usize = pipeline
        .functions
        .values()
        .map(|f| f.disassembly.unresolved.len())
        .sum();
    if unresolved > 0 {
        terminal::dim(&format!("{unresolved} unresolved indirect jumps"));
    }
    if pipeline.failures.is_empty() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}
