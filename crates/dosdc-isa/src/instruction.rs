//! Decoded instruction record.

use std::fmt::{self, Display};

use crate::{
    Cond, FlagEffects, MemOperand, Mnemonic, Operand, Rep, SegOff, SegReg, Size, SwitchCase,
};

/// A decoded (or rewritten) instruction.
///
/// Values are never patched in place: idiom rewriting builds a new record
/// with [`Instruction::rewritten`] or [`Instruction::neutralized`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Linear address.
    pub addr: u32,
    pub at: SegOff,
    pub mnemonic: Mnemonic,
    pub operands: Vec<Operand>,
    pub size: Size,
    pub rep: Option<Rep>,
    pub seg_override: Option<SegReg>,
    /// Encoded length in bytes. Zero for synthetic instructions.
    pub len: u8,
    pub flags: FlagEffects,
}

impl Instruction {
    pub fn new(at: SegOff, mnemonic: Mnemonic, operands: Vec<Operand>, size: Size, len: u8) -> Self {
        Self {
            addr: at.linear(),
            at,
            mnemonic,
            operands,
            size,
            rep: None,
            seg_override: None,
            len,
            flags: FlagEffects::of(mnemonic),
        }
    }

    #[must_use]
    pub const fn with_rep(mut self, rep: Option<Rep>) -> Self {
        self.rep = rep;
        self
    }

    #[must_use]
    pub const fn with_seg_override(mut self, seg: Option<SegReg>) -> Self {
        self.seg_override = seg;
        self
    }

    /// Same location and length, new operation.
    ///
    /// Flag effects follow the new mnemonic. Relative operands keep their
    /// meaning since the length is unchanged.
    #[must_use]
    pub fn rewritten(&self, mnemonic: Mnemonic, operands: Vec<Operand>) -> Self {
        Self {
            mnemonic,
            operands,
            flags: FlagEffects::of(mnemonic),
            ..self.clone()
        }
    }

    /// A `NOP` occupying the same bytes.
    #[must_use]
    pub fn neutralized(&self) -> Self {
        Self {
            rep: None,
            seg_override: None,
            ..self.rewritten(Mnemonic::Nop, Vec::new())
        }
    }

    /// Address of the following instruction.
    pub const fn next(&self) -> SegOff {
        self.at.wrapping_add(self.len as u16)
    }

    pub const fn next_addr(&self) -> u32 {
        self.next().linear()
    }

    /// Fixed target of a direct jump, call, or conditional branch.
    #[allow(clippy::cast_sign_loss)]
    pub fn branch_target(&self) -> Option<SegOff> {
        let is_branch = self.mnemonic.is_jump()
            || self.mnemonic.is_call()
            || self.mnemonic.is_conditional_branch();
        if !is_branch {
            return None;
        }
        self.operands.iter().find_map(|op| match op {
            Operand::Rel(d) => Some(self.next().wrapping_add(*d as u16)),
            Operand::Far(p) => Some(*p),
            _ => None,
        })
    }

    /// Branch condition of a `Jcc`.
    pub fn cond(&self) -> Option<Cond> {
        self.operands.iter().find_map(|op| match op {
            Operand::Cond(c) => Some(*c),
            _ => None,
        })
    }

    /// JMP/JMPF through a register or memory operand.
    pub fn is_indirect_jump(&self) -> bool {
        self.mnemonic.is_jump()
            && matches!(
                self.operands.first(),
                Some(Operand::Reg(_) | Operand::Mem(_))
            )
    }

    /// Vector of an `INT n`.
    #[allow(clippy::cast_possible_truncation)]
    pub fn int_vector(&self) -> Option<u8> {
        if self.mnemonic != Mnemonic::Int {
            return None;
        }
        self.operands.first().and_then(Operand::as_imm).map(|v| v as u8)
    }

    /// Case entries of a `Switch`.
    pub fn cases(&self) -> impl Iterator<Item = SwitchCase> + '_ {
        self.operands.iter().filter_map(|op| match op {
            Operand::Case(c) => Some(*c),
            _ => None,
        })
    }

    /// Resolved target of a switch case.
    #[allow(clippy::cast_sign_loss)]
    pub const fn case_target(&self, case: SwitchCase) -> SegOff {
        self.next().wrapping_add(case.disp as u16)
    }

    pub fn memory_operand(&self) -> Option<&MemOperand> {
        self.operands.iter().find_map(Operand::as_mem)
    }

    pub const fn is_synthetic(&self) -> bool {
        self.len == 0
    }

    /// Rendered mnemonic, including condition and string size suffixes.
    pub fn name(&self) -> String {
        match self.mnemonic {
            Mnemonic::Jcc => self.cond().map_or_else(|| "jcc".to_string(), |c| format!("j{c}")),
            m if m.is_string() => {
                let suffix = if self.size == Size::Byte { 'b' } else { 'w' };
                format!("{m}{suffix}")
            }
            m => m.to_string(),
        }
    }

    #[allow(clippy::cast_sign_loss)]
    fn fmt_operand(&self, op: &Operand, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match op {
            Operand::Rel(d) => write!(f, "{:#06x}", self.next().wrapping_add(*d as u16).off),
            Operand::Case(c) => write!(f, "{}: {:#06x}", c.value, self.case_target(*c).off),
            other => write!(f, "{other}"),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rep) = self.rep {
            write!(f, "{rep} ")?;
        }
        f.write_str(&self.name())?;
        let shown = self
            .operands
            .iter()
            .filter(|op| !matches!(op, Operand::Cond(_)))
            .enumerate();
        for (i, op) in shown {
            f.write_str(if i == 0 { " " } else { ", " })?;
            self.fmt_operand(op, f)?;
        }
        Ok(())
    }
}
