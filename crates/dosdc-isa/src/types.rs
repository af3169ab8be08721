//! Core types for the 8086 instruction model.

use std::fmt::{self, Display};

use strum::{Display as StrumDisplay, EnumIter, IntoStaticStr};

use crate::FlagSet;

/// A real-mode `segment:offset` address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegOff {
    pub seg: u16,
    pub off: u16,
}

impl SegOff {
    pub const fn new(seg: u16, off: u16) -> Self {
        Self { seg, off }
    }

    /// Linear (physical) address: `seg * 16 + off`.
    #[inline]
    pub const fn linear(self) -> u32 {
        ((self.seg as u32) << 4) + self.off as u32
    }

    /// Advance the offset, wrapping inside the segment.
    #[inline]
    #[must_use]
    pub const fn wrapping_add(self, delta: u16) -> Self {
        Self {
            seg: self.seg,
            off: self.off.wrapping_add(delta),
        }
    }
}

impl Display for SegOff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.seg, self.off)
    }
}

/// Error returned when parsing a `SSSS:OOOO` string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid segment:offset address '{0}'")]
pub struct ParseSegOffError(pub String);

impl std::str::FromStr for SegOff {
    type Err = ParseSegOffError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseSegOffError(s.to_string());
        let (seg, off) = s.split_once(':').ok_or_else(err)?;
        let seg = u16::from_str_radix(seg.trim_start_matches("0x"), 16).map_err(|_| err())?;
        let off = u16::from_str_radix(off.trim_start_matches("0x"), 16).map_err(|_| err())?;
        Ok(Self { seg, off })
    }
}

/// Operand size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Size {
    Byte,
    #[default]
    Word,
    Dword,
}

impl Size {
    pub const fn bytes(self) -> u16 {
        match self {
            Self::Byte => 1,
            Self::Word => 2,
            Self::Dword => 4,
        }
    }
}

/// General purpose registers, byte halves first in encoding order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, StrumDisplay, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum Reg {
    Al,
    Cl,
    Dl,
    Bl,
    Ah,
    Ch,
    Dh,
    Bh,
    Ax,
    Cx,
    Dx,
    Bx,
    Sp,
    Bp,
    Si,
    Di,
}

const BYTE_REGS: [Reg; 8] = [
    Reg::Al,
    Reg::Cl,
    Reg::Dl,
    Reg::Bl,
    Reg::Ah,
    Reg::Ch,
    Reg::Dh,
    Reg::Bh,
];

const WORD_REGS: [Reg; 8] = [
    Reg::Ax,
    Reg::Cx,
    Reg::Dx,
    Reg::Bx,
    Reg::Sp,
    Reg::Bp,
    Reg::Si,
    Reg::Di,
];

impl Reg {
    /// Register for a 3-bit ModRM/opcode field at the given operand size.
    pub const fn from_index(index: u8, size: Size) -> Self {
        let idx = (index & 7) as usize;
        match size {
            Size::Byte => BYTE_REGS[idx],
            Size::Word | Size::Dword => WORD_REGS[idx],
        }
    }

    pub const fn size(self) -> Size {
        if (self as u8) < 8 {
            Size::Byte
        } else {
            Size::Word
        }
    }

    pub const fn is_word(self) -> bool {
        matches!(self.size(), Size::Word)
    }
}

/// Segment registers in `sreg` field order.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, StrumDisplay, IntoStaticStr, EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum SegReg {
    Es,
    Cs,
    Ss,
    Ds,
    Fs,
    Gs,
}

impl SegReg {
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::Es),
            1 => Some(Self::Cs),
            2 => Some(Self::Ss),
            3 => Some(Self::Ds),
            4 => Some(Self::Fs),
            5 => Some(Self::Gs),
            _ => None,
        }
    }
}

/// Branch condition, in the order of the `Jcc` opcode's low nibble.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Cond {
    O,
    No,
    B,
    Ae,
    E,
    Ne,
    Be,
    A,
    S,
    Ns,
    P,
    Np,
    L,
    Ge,
    Le,
    G,
}

const CONDS: [Cond; 16] = [
    Cond::O,
    Cond::No,
    Cond::B,
    Cond::Ae,
    Cond::E,
    Cond::Ne,
    Cond::Be,
    Cond::A,
    Cond::S,
    Cond::Ns,
    Cond::P,
    Cond::Np,
    Cond::L,
    Cond::Ge,
    Cond::Le,
    Cond::G,
];

impl Cond {
    pub const fn from_index(index: u8) -> Self {
        CONDS[(index & 0xF) as usize]
    }

    /// Status flags the condition tests.
    pub const fn tests(self) -> FlagSet {
        match self {
            Self::O | Self::No => FlagSet::OF,
            Self::B | Self::Ae => FlagSet::CF,
            Self::E | Self::Ne => FlagSet::ZF,
            Self::Be | Self::A => FlagSet::CF.union(FlagSet::ZF),
            Self::S | Self::Ns => FlagSet::SF,
            Self::P | Self::Np => FlagSet::PF,
            Self::L | Self::Ge => FlagSet::SF.union(FlagSet::OF),
            Self::Le | Self::G => FlagSet::ZF.union(FlagSet::SF).union(FlagSet::OF),
        }
    }
}

/// Repeat prefix. `REP` and `REPE` share encoding F3.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, StrumDisplay, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Rep {
    Rep,
    Repne,
}
