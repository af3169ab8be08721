//! Status flags and per-instruction flag effects.

use bitflags::bitflags;

use crate::Mnemonic;

bitflags! {
    /// The five tracked arithmetic status flags.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FlagSet: u8 {
        const CF = 1 << 0;
        const PF = 1 << 1;
        const ZF = 1 << 2;
        const SF = 1 << 3;
        const OF = 1 << 4;
    }
}

impl FlagSet {
    /// CF PF ZF SF OF.
    pub const STATUS: Self = Self::all();
    /// Flags written by logic ops besides the cleared CF/OF.
    pub const RESULT: Self = Self::PF.union(Self::ZF).union(Self::SF);
}

/// How one instruction affects the status flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct FlagEffects {
    pub cleared: FlagSet,
    pub set: FlagSet,
    pub modified: FlagSet,
    pub undefined: FlagSet,
}

impl FlagEffects {
    pub const NONE: Self = Self {
        cleared: FlagSet::empty(),
        set: FlagSet::empty(),
        modified: FlagSet::empty(),
        undefined: FlagSet::empty(),
    };

    pub const fn modifies(modified: FlagSet) -> Self {
        Self {
            modified,
            ..Self::NONE
        }
    }

    #[must_use]
    pub const fn with_cleared(mut self, cleared: FlagSet) -> Self {
        self.cleared = cleared;
        self
    }

    #[must_use]
    pub const fn with_set(mut self, set: FlagSet) -> Self {
        self.set = set;
        self
    }

    #[must_use]
    pub const fn with_undefined(mut self, undefined: FlagSet) -> Self {
        self.undefined = undefined;
        self
    }

    /// Flag effects for a mnemonic, from the static op table.
    pub const fn of(mnemonic: Mnemonic) -> Self {
        mnemonic.info().flags
    }

    /// Every flag the instruction writes in any way.
    pub const fn written(self) -> FlagSet {
        self.cleared
            .union(self.set)
            .union(self.modified)
            .union(self.undefined)
    }

    pub const fn is_empty(self) -> bool {
        self.written().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logic_ops_clear_carry_and_overflow() {
        let fx = FlagEffects::of(Mnemonic::Xor);
        assert_eq!(fx.cleared, FlagSet::CF | FlagSet::OF);
        assert_eq!(fx.modified, FlagSet::RESULT);
        assert_eq!(fx.written(), FlagSet::STATUS);
    }

    #[test]
    fn test_inc_preserves_carry() {
        let fx = FlagEffects::of(Mnemonic::Inc);
        assert!(!fx.written().contains(FlagSet::CF));
        assert!(fx.written().contains(FlagSet::ZF));
    }

    #[test]
    fn test_flag_control() {
        assert_eq!(FlagEffects::of(Mnemonic::Stc).set, FlagSet::CF);
        assert_eq!(FlagEffects::of(Mnemonic::Clc).cleared, FlagSet::CF);
        assert!(FlagEffects::of(Mnemonic::Cld).is_empty());
        assert!(FlagEffects::of(Mnemonic::Mov).is_empty());
    }

    #[test]
    fn test_div_leaves_flags_undefined() {
        let fx = FlagEffects::of(Mnemonic::Div);
        assert_eq!(fx.undefined, FlagSet::STATUS);
        assert_eq!(fx.written(), FlagSet::STATUS);
    }
}
