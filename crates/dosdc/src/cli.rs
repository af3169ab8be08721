//! CLI definitions and argument types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use dosdc::{DEFAULT_MAX_SWITCH_CASES, EngineConfig, PipelineConfig, SegOff};

/// Exit code for success.
pub const EXIT_SUCCESS: i32 = 0;
/// Exit code for failure.
pub const EXIT_FAILURE: i32 = 1;

#[derive(Parser)]
#[command(name = "dosdc")]
#[command(about = "DOS decompiler front end - recovers control flow from MZ/COM executables")]
#[command(version)]
pub struct Cli {
    /// Enable verbose output (sets RUST_LOG=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output (only show errors)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Disassemble functions and print their sorted listings
    Disasm {
        /// Input MZ or COM file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,
    },
    /// Build flow graphs and print nodes with required/defined locals
    Cfg {
        /// Input MZ or COM file
        #[arg(value_name = "FILE")]
        input: PathBuf,

        #[command(flatten)]
        engine: EngineArgs,

        /// Also print whole-function liveness per node
        #[arg(long)]
        liveness: bool,
    },
}

/// Analysis options shared by all commands.
#[derive(Args, Clone, Debug)]
pub struct EngineArgs {
    /// Function entry as hex SEG:OFF (repeatable; default: program entry)
    #[arg(long, value_name = "SEG:OFF")]
    pub entry: Vec<SegOff>,

    /// Fuse adjacent word loads into dword loads
    #[arg(long)]
    pub fuse_dword_loads: bool,

    /// Reject jump tables with more cases than this
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_SWITCH_CASES)]
    pub max_cases: u16,

    /// Analyze only the given entries, not their callees
    #[arg(long)]
    pub no_follow_calls: bool,
}

impl EngineArgs {
    pub fn pipeline_config(&self) -> PipelineConfig {
        let engine = EngineConfig::default()
            .with_fuse_dword_loads(self.fuse_dword_loads)
            .with_max_switch_cases(self.max_cases);
        PipelineConfig::default()
            .with_engine(engine)
            .with_follow_calls(!self.no_follow_calls)
    }
}
