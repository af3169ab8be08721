//! 8086/80186 instruction set definitions and decoder.
//!
//! This crate provides the instruction model consumed by the analysis
//! crates: a byte decoder, a static op table with flag effects and operand
//! roles, and the `Locals` vocabulary used by dataflow passes.

mod decode;
mod flags;
mod instruction;
mod locals;
mod mnemonic;
mod operand;
mod types;

pub use decode::{DecodeError, decode};
pub use flags::{FlagEffects, FlagSet};
pub use instruction::Instruction;
pub use locals::Locals;
pub use mnemonic::{Access, Mnemonic, OpClass, OpInfo};
pub use operand::{AddrMode, MemOperand, Operand, SwitchCase};
pub use types::{Cond, ParseSegOffError, Reg, Rep, SegOff, SegReg, Size};
