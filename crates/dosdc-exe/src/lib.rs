//! Loader for DOS executables (MZ `.EXE` and flat `.COM`).

mod header;
mod image;
mod mz;

pub use header::*;
pub use image::*;

use thiserror::Error;

/// Executable loading errors.
#[derive(Error, Debug)]
pub enum ExeError {
    #[error("executable data too small")]
    TooSmall,
    #[error("invalid MZ magic number")]
    InvalidMagic,
    #[error("MZ header extends beyond file")]
    HeaderOutOfBounds,
    #[error("relocation table out of bounds")]
    RelocationsOutOfBounds,
    #[error("relocation site {0:#x} outside the load module")]
    RelocationSiteOutOfBounds(u32),
    #[error("load module extends beyond file")]
    LoadModuleOutOfBounds,
    #[error("COM image larger than one segment ({0} bytes)")]
    ComTooLarge(usize),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExeError>;
