//! The machine-state vocabulary used by dataflow analyses.

use std::fmt::{self, Display};

use bitflags::bitflags;

use crate::{FlagSet, Reg, SegReg};

bitflags! {
    /// Set of machine-state components ("locals").
    ///
    /// General registers are tracked per byte half so that `MOV AL, ..`
    /// followed by a read of `AX` still requires `AH`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct Locals: u32 {
        const AL = 1 << 0;
        const AH = 1 << 1;
        const BL = 1 << 2;
        const BH = 1 << 3;
        const CL = 1 << 4;
        const CH = 1 << 5;
        const DL = 1 << 6;
        const DH = 1 << 7;
        const SI = 1 << 8;
        const DI = 1 << 9;
        const BP = 1 << 10;
        const SP = 1 << 11;
        const ES = 1 << 12;
        const CS = 1 << 13;
        const SS = 1 << 14;
        const DS = 1 << 15;
        const FS = 1 << 16;
        const GS = 1 << 17;
        const CF = 1 << 18;
        const PF = 1 << 19;
        const ZF = 1 << 20;
        const SF = 1 << 21;
        const OF = 1 << 22;

        const AX = Self::AL.bits() | Self::AH.bits();
        const BX = Self::BL.bits() | Self::BH.bits();
        const CX = Self::CL.bits() | Self::CH.bits();
        const DX = Self::DL.bits() | Self::DH.bits();
        const FLAGS = Self::CF.bits() | Self::PF.bits() | Self::ZF.bits()
            | Self::SF.bits() | Self::OF.bits();
        const GPRS = Self::AX.bits() | Self::BX.bits() | Self::CX.bits() | Self::DX.bits()
            | Self::SI.bits() | Self::DI.bits() | Self::BP.bits() | Self::SP.bits();
    }
}

impl Reg {
    pub const fn locals(self) -> Locals {
        match self {
            Self::Al => Locals::AL,
            Self::Cl => Locals::CL,
            Self::Dl => Locals::DL,
            Self::Bl => Locals::BL,
            Self::Ah => Locals::AH,
            Self::Ch => Locals::CH,
            Self::Dh => Locals::DH,
            Self::Bh => Locals::BH,
            Self::Ax => Locals::AX,
            Self::Cx => Locals::CX,
            Self::Dx => Locals::DX,
            Self::Bx => Locals::BX,
            Self::Sp => Locals::SP,
            Self::Bp => Locals::BP,
            Self::Si => Locals::SI,
            Self::Di => Locals::DI,
        }
    }
}

impl SegReg {
    pub const fn locals(self) -> Locals {
        match self {
            Self::Es => Locals::ES,
            Self::Cs => Locals::CS,
            Self::Ss => Locals::SS,
            Self::Ds => Locals::DS,
            Self::Fs => Locals::FS,
            Self::Gs => Locals::GS,
        }
    }
}

impl FlagSet {
    pub const fn locals(self) -> Locals {
        let mut out = Locals::empty();
        if self.contains(Self::CF) {
            out = out.union(Locals::CF);
        }
        if self.contains(Self::PF) {
            out = out.union(Locals::PF);
        }
        if self.contains(Self::ZF) {
            out = out.union(Locals::ZF);
        }
        if self.contains(Self::SF) {
            out = out.union(Locals::SF);
        }
        if self.contains(Self::OF) {
            out = out.union(Locals::OF);
        }
        out
    }
}

/// Display order. Word registers collapse to one name when both halves are present.
const SPLIT: [(Locals, &str, &str, &str); 4] = [
    (Locals::AX, "ax", "al", "ah"),
    (Locals::BX, "bx", "bl", "bh"),
    (Locals::CX, "cx", "cl", "ch"),
    (Locals::DX, "dx", "dl", "dh"),
];

const SINGLE: [(Locals, &str); 15] = [
    (Locals::SI, "si"),
    (Locals::DI, "di"),
    (Locals::BP, "bp"),
    (Locals::SP, "sp"),
    (Locals::ES, "es"),
    (Locals::CS, "cs"),
    (Locals::SS, "ss"),
    (Locals::DS, "ds"),
    (Locals::FS, "fs"),
    (Locals::GS, "gs"),
    (Locals::CF, "cf"),
    (Locals::PF, "pf"),
    (Locals::ZF, "zf"),
    (Locals::SF, "sf"),
    (Locals::OF, "of"),
];

impl Locals {
    /// Names in display order.
    pub fn names(self) -> Vec<&'static str> {
        let mut names = Vec::new();
        for (word, w, lo, hi) in SPLIT {
            if self.contains(word) {
                names.push(w);
            } else {
                let (lo_bit, hi_bit) = split(word);
                if self.contains(lo_bit) {
                    names.push(lo);
                }
                if self.contains(hi_bit) {
                    names.push(hi);
                }
            }
        }
        names.extend(
            SINGLE
                .iter()
                .filter(|(bit, _)| self.contains(*bit))
                .map(|(_, name)| *name),
        );
        names
    }
}

const fn split(word: Locals) -> (Locals, Locals) {
    // The low half is always the lower of the two bits.
    let lo = word.bits() & word.bits().wrapping_neg();
    (
        Locals::from_bits_retain(lo),
        Locals::from_bits_retain(word.bits() & !lo),
    )
}

impl Display for Locals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("-");
        }
        f.write_str(&self.names().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_registers_cover_both_halves() {
        assert_eq!(Reg::Ax.locals(), Locals::AL | Locals::AH);
        assert!(Reg::Bx.locals().contains(Locals::BH));
        assert_eq!(Reg::Si.locals(), Locals::SI);
        assert_eq!(SegReg::Es.locals(), Locals::ES);
    }

    #[test]
    fn test_flagset_to_locals() {
        assert_eq!((FlagSet::CF | FlagSet::ZF).locals(), Locals::CF | Locals::ZF);
        assert_eq!(FlagSet::STATUS.locals(), Locals::FLAGS);
        assert_eq!(FlagSet::empty().locals(), Locals::empty());
    }

    #[test]
    fn test_display() {
        assert_eq!(Locals::empty().to_string(), "-");
        assert_eq!((Locals::AX | Locals::BX).to_string(), "ax bx");
        assert_eq!((Locals::AH | Locals::ZF | Locals::DS).to_string(), "ah ds zf");
        assert_eq!((Locals::CL | Locals::SI).to_string(), "cl si");
    }
}
