//! Disassembly engine configuration.

/// Default upper bound on recovered switch cases.
pub const DEFAULT_MAX_SWITCH_CASES: u16 = 256;
/// Default per-function instruction budget.
pub const DEFAULT_MAX_INSTRUCTIONS: usize = 0x10000;

/// Engine knobs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Reject recovered jump tables with more entries than this.
    pub max_switch_cases: u16,
    /// Fuse `MOV lo, [m] ; MOV hi, [m+2]` into one dword load.
    pub fuse_dword_loads: bool,
    /// Abort a function after decoding this many instructions.
    pub max_instructions: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_switch_cases: DEFAULT_MAX_SWITCH_CASES,
            fuse_dword_loads: false,
            max_instructions: DEFAULT_MAX_INSTRUCTIONS,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub const fn with_max_switch_cases(mut self, max: u16) -> Self {
        self.max_switch_cases = max;
        self
    }

    #[must_use]
    pub const fn with_fuse_dword_loads(mut self, enabled: bool) -> Self {
        self.fuse_dword_loads = enabled;
        self
    }

    #[must_use]
    pub const fn with_max_instructions(mut self, max: usize) -> Self {
        self.max_instructions = max;
        self
    }
}
