//! Instruction operands.

use std::fmt::{self, Display};

use crate::{Cond, Reg, SegOff, SegReg, Size};

/// Base/index combination of a ModRM memory operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddrMode {
    BxSi,
    BxDi,
    BpSi,
    BpDi,
    Si,
    Di,
    Bp,
    Bx,
    /// Displacement only.
    Direct,
}

impl AddrMode {
    /// Mode for a ModRM `rm` field (mod != 3). `mod == 0, rm == 6` is handled by the caller.
    pub const fn from_rm(rm: u8) -> Self {
        match rm & 7 {
            0 => Self::BxSi,
            1 => Self::BxDi,
            2 => Self::BpSi,
            3 => Self::BpDi,
            4 => Self::Si,
            5 => Self::Di,
            6 => Self::Bp,
            _ => Self::Bx,
        }
    }

    /// Registers the effective address reads.
    pub const fn registers(self) -> &'static [Reg] {
        match self {
            Self::BxSi => &[Reg::Bx, Reg::Si],
            Self::BxDi => &[Reg::Bx, Reg::Di],
            Self::BpSi => &[Reg::Bp, Reg::Si],
            Self::BpDi => &[Reg::Bp, Reg::Di],
            Self::Si => &[Reg::Si],
            Self::Di => &[Reg::Di],
            Self::Bp => &[Reg::Bp],
            Self::Bx => &[Reg::Bx],
            Self::Direct => &[],
        }
    }

    pub const fn default_seg(self) -> SegReg {
        match self {
            Self::BpSi | Self::BpDi | Self::Bp => SegReg::Ss,
            _ => SegReg::Ds,
        }
    }
}

impl Display for AddrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for reg in self.registers() {
            if !first {
                f.write_str("+")?;
            }
            write!(f, "{reg}")?;
            first = false;
        }
        Ok(())
    }
}

/// A memory reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MemOperand {
    pub mode: AddrMode,
    pub disp: u16,
    /// Effective segment (override if present, else the mode's default).
    pub seg: SegReg,
    pub size: Size,
}

impl MemOperand {
    pub const fn new(mode: AddrMode, disp: u16, seg: SegReg, size: Size) -> Self {
        Self {
            mode,
            disp,
            seg,
            size,
        }
    }

    /// Segment the encoding implies without an override.
    pub const fn default_seg(&self) -> SegReg {
        self.mode.default_seg()
    }

    /// True if `reg` takes part in addressing.
    pub fn uses(&self, reg: Reg) -> bool {
        self.mode.registers().contains(&reg)
    }

    /// Same location shifted by `delta` bytes, with a new access size.
    #[must_use]
    pub const fn offset(self, delta: u16, size: Size) -> Self {
        Self {
            disp: self.disp.wrapping_add(delta),
            size,
            ..self
        }
    }
}

impl Display for MemOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.size)?;
        if self.seg != self.default_seg() {
            write!(f, "{}:", self.seg)?;
        }
        if self.mode == AddrMode::Direct {
            return write!(f, "[{:#x}]", self.disp);
        }
        // Displacements are stored as u16; print them signed.
        #[allow(clippy::cast_possible_wrap)]
        let disp = self.disp as i16;
        match disp {
            0 => write!(f, "[{}]", self.mode),
            d if d < 0 => write!(f, "[{}-{:#x}]", self.mode, d.unsigned_abs()),
            d => write!(f, "[{}+{:#x}]", self.mode, d),
        }
    }
}

/// One entry of a recovered jump table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SwitchCase {
    /// Index value selecting this case.
    pub value: u16,
    /// Target displacement from the end of the switch instruction.
    pub disp: i16,
}

/// An instruction operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Imm { value: u16, size: Size },
    Reg(Reg),
    SegReg(SegReg),
    Cond(Cond),
    Mem(MemOperand),
    /// Displacement from the next instruction.
    Rel(i16),
    Far(SegOff),
    Case(SwitchCase),
}

impl Operand {
    pub const fn imm8(value: u8) -> Self {
        Self::Imm {
            value: value as u16,
            size: Size::Byte,
        }
    }

    pub const fn imm16(value: u16) -> Self {
        Self::Imm {
            value,
            size: Size::Word,
        }
    }

    pub const fn as_reg(&self) -> Option<Reg> {
        match self {
            Self::Reg(r) => Some(*r),
            _ => None,
        }
    }

    pub const fn as_mem(&self) -> Option<&MemOperand> {
        match self {
            Self::Mem(m) => Some(m),
            _ => None,
        }
    }

    pub const fn as_imm(&self) -> Option<u16> {
        match self {
            Self::Imm { value, .. } => Some(*value),
            _ => None,
        }
    }
}

impl Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Imm { value, .. } => write!(f, "{value:#x}"),
            Self::Reg(r) => write!(f, "{r}"),
            Self::SegReg(s) => write!(f, "{s}"),
            Self::Cond(c) => write!(f, "{c}"),
            Self::Mem(m) => write!(f, "{m}"),
            Self::Rel(d) => write!(f, "$+{d}"),
            Self::Far(p) => write!(f, "{p}"),
            Self::Case(c) => write!(f, "{}: $+{}", c.value, c.disp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_segments() {
        assert_eq!(AddrMode::Bp.default_seg(), SegReg::Ss);
        assert_eq!(AddrMode::BpSi.default_seg(), SegReg::Ss);
        assert_eq!(AddrMode::Bx.default_seg(), SegReg::Ds);
        assert_eq!(AddrMode::Direct.default_seg(), SegReg::Ds);
    }

    #[test]
    fn test_mem_display() {
        let m = MemOperand::new(AddrMode::Bx, 0x110, SegReg::Cs, Size::Word);
        assert_eq!(m.to_string(), "word cs:[bx+0x110]");
        let m = MemOperand::new(AddrMode::Bp, 0xFFFE, SegReg::Ss, Size::Byte);
        assert_eq!(m.to_string(), "byte [bp-0x2]");
        let m = MemOperand::new(AddrMode::Direct, 0x42, SegReg::Ds, Size::Word);
        assert_eq!(m.to_string(), "word [0x42]");
    }

    #[test]
    fn test_uses() {
        let m = MemOperand::new(AddrMode::BxSi, 0, SegReg::Ds, Size::Word);
        assert!(m.uses(Reg::Si));
        assert!(!m.uses(Reg::Di));
        assert_eq!(m.offset(2, Size::Dword).disp, 2);
    }
}
