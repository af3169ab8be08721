//! Control flow recovery for 16-bit DOS code.
//!
//! The pipeline for one function is
//! [`Disassembler::disassemble`] → [`FlowGraph::build`] → [`locals::annotate`],
//! with [`Liveness::compute`] as an optional global pass over the result.

mod config;
mod engine;
mod graph;
pub mod idiom;
mod liveness;
pub mod locals;

pub use config::{DEFAULT_MAX_INSTRUCTIONS, DEFAULT_MAX_SWITCH_CASES, EngineConfig};
pub use engine::{Disassembler, Disassembly, Unresolved, UnresolvedReason};
pub use graph::{FlowGraph, Node, NodeId, NodeKind};
pub use idiom::{BiasedRange, BoundsCheckedJump, SwitchMatch, SwitchTemplate};
pub use liveness::Liveness;
pub use locals::LocalsError;

use dosdc_isa::{DecodeError, SegOff};
use thiserror::Error;

/// Per-function analysis errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CfgError {
    #[error("function {entry}: address {addr:#07x} is outside the image")]
    OutOfBounds { entry: SegOff, addr: u32 },
    #[error("function {entry}: cannot decode at {addr:#07x}: {source}")]
    Decode {
        entry: SegOff,
        addr: u32,
        source: DecodeError,
    },
    #[error(
        "function {entry}: target {target:#07x} of instruction at {addr:#07x} is not a decoded instruction"
    )]
    UnresolvedControlFlow { entry: SegOff, addr: u32, target: u32 },
    #[error("function {entry}: dispatch at {addr:#07x}: {reason}")]
    IdiomInvariant {
        entry: SegOff,
        addr: u32,
        reason: String,
    },
    #[error("function {entry}: more than {limit} instructions")]
    InstructionLimit { entry: SegOff, limit: usize },
    #[error(transparent)]
    Locals(#[from] LocalsError),
}

pub type Result<T> = std::result::Result<T, CfgError>;
