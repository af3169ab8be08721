//! dosdc - control flow recovery for DOS executables
//!
//! Loads MZ/COM programs, recovers each function's instruction stream and
//! flow graph, and annotates nodes with the locals they require and define.
//!
//! # Example
//!
//! ```ignore
//! use dosdc::{Image, Pipeline, PipelineConfig};
//!
//! let image = Image::load("GAME.EXE")?;
//! let mut pipeline = Pipeline::new(image, PipelineConfig::default());
//! pipeline.run([pipeline.image.entry]);
//! for function in pipeline.functions.values() {
//!     println!("{}", dosdc::Listing(&function.disassembly));
//! }
//! ```

// Re-export from sub-crates
pub use dosdc_cfg::{
    BiasedRange, BoundsCheckedJump, CfgError, DEFAULT_MAX_SWITCH_CASES, Disassembler, Disassembly,
    EngineConfig, FlowGraph, Liveness, LocalsError, Node, NodeId, NodeKind, SwitchMatch,
    SwitchTemplate, Unresolved, UnresolvedReason, locals,
};
pub use dosdc_exe::{ExeError, Format, Image};
pub use dosdc_isa::{Instruction, Locals, Mnemonic, Operand, SegOff, decode};

mod listing;
mod pipeline;

pub use listing::{GraphDump, Listing};
pub use pipeline::*;

use thiserror::Error;

/// Driver errors.
#[derive(Error, Debug)]
pub enum Error {
    #[error("executable error: {0}")]
    Exe(#[from] ExeError),
    #[error(transparent)]
    Cfg(#[from] CfgError),
    #[error(transparent)]
    Locals(#[from] LocalsError),
}

pub type Result<T> = std::result::Result<T, Error>;
