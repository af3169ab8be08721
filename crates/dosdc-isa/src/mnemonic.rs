//! Mnemonics and the static op table (class, flag effects, operand roles).

use strum::{Display, EnumIter, IntoStaticStr};

use crate::{FlagEffects, FlagSet};

/// Instruction mnemonic.
///
/// Covers the 8086 integer set, the 80186 additions, FPU escapes, and two
/// synthetic kinds produced by idiom rewriting.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, IntoStaticStr, EnumIter)]
#[strum(serialize_all = "lowercase")]
pub enum Mnemonic {
    // Arithmetic and logic
    Add,
    Adc,
    Sub,
    Sbb,
    Cmp,
    And,
    Or,
    Xor,
    Test,
    Inc,
    Dec,
    Neg,
    Not,
    Mul,
    Imul,
    Div,
    Idiv,
    Daa,
    Das,
    Aaa,
    Aas,
    Aam,
    Aad,
    Cbw,
    Cwd,
    // Shifts and rotates
    Rol,
    Ror,
    Rcl,
    Rcr,
    Shl,
    Shr,
    Sar,
    // Data movement
    Mov,
    Xchg,
    Lea,
    Lds,
    Les,
    Xlat,
    Lahf,
    Sahf,
    // Stack
    Push,
    Pop,
    Pusha,
    Popa,
    Pushf,
    Popf,
    Enter,
    Leave,
    // String
    Movs,
    Cmps,
    Stos,
    Lods,
    Scas,
    Ins,
    Outs,
    // Control flow
    Jmp,
    Jmpf,
    Call,
    Callf,
    Ret,
    Retf,
    Iret,
    Jcc,
    Jcxz,
    Loop,
    Loope,
    Loopne,
    Int,
    Into,
    Bound,
    // I/O
    In,
    Out,
    // Flag control
    Clc,
    Stc,
    Cmc,
    Cld,
    Std,
    Cli,
    Sti,
    // Misc
    Nop,
    Hlt,
    Wait,
    /// FPU escape (D8-DF).
    Esc,
    /// Recovered jump-table dispatch.
    Switch,
    /// Two word loads fused into one dword load.
    #[strum(serialize = "words2dword")]
    WordsToDword,
}

/// Instruction category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum OpClass {
    Arithmetic,
    Logic,
    Shift,
    Data,
    Stack,
    String,
    Flow,
    Interrupt,
    Io,
    Flag,
    Misc,
    Fpu,
    Synthetic,
}

/// How an explicit operand is used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    /// Not a data operand (condition codes, case labels).
    None,
    Read,
    Write,
    ReadWrite,
    /// Only the address is computed (LEA).
    Address,
}

/// Static metadata for one mnemonic.
#[derive(Clone, Copy, Debug)]
pub struct OpInfo {
    pub mnemonic: Mnemonic,
    pub class: OpClass,
    pub flags: FlagEffects,
    /// Status flags read regardless of operands.
    pub reads_flags: FlagSet,
    /// Accepted operand role lists, one per arity.
    pub forms: &'static [&'static [Access]],
}

impl Mnemonic {
    /// Table entry for this mnemonic.
    pub const fn info(self) -> &'static OpInfo {
        &OP_INFO[self as usize]
    }

    pub const fn class(self) -> OpClass {
        self.info().class
    }

    /// Role of operand `index` in an instruction with `arity` operands.
    ///
    /// Returns `None` when no form of this mnemonic takes that many operands.
    pub fn role(self, index: usize, arity: usize) -> Option<Access> {
        if self == Self::Switch {
            return match index {
                0 => Some(Access::Read),
                _ if index < arity => Some(Access::None),
                _ => None,
            };
        }
        self.info()
            .forms
            .iter()
            .find(|form| form.len() == arity)
            .and_then(|form| form.get(index))
            .copied()
    }

    pub const fn is_conditional_branch(self) -> bool {
        matches!(
            self,
            Self::Jcc | Self::Jcxz | Self::Loop | Self::Loope | Self::Loopne
        )
    }

    pub const fn is_return(self) -> bool {
        matches!(self, Self::Ret | Self::Retf | Self::Iret)
    }

    pub const fn is_jump(self) -> bool {
        matches!(self, Self::Jmp | Self::Jmpf)
    }

    pub const fn is_call(self) -> bool {
        matches!(self, Self::Call | Self::Callf)
    }

    pub const fn is_string(self) -> bool {
        matches!(self.class(), OpClass::String)
    }
}

use Access::{Address as A, None as N, Read as R, ReadWrite as RW, Write as W};

const NULLARY: &[&[Access]] = &[&[]];
const READ: &[&[Access]] = &[&[R]];
const WRITE: &[&[Access]] = &[&[W]];
const UPDATE: &[&[Access]] = &[&[RW]];
const BINARY: &[&[Access]] = &[&[RW, R]];
const COMPARE: &[&[Access]] = &[&[R, R]];
const MOVE: &[&[Access]] = &[&[W, R]];
const OPTIONAL_READ: &[&[Access]] = &[&[], &[R]];

const ARITH: FlagEffects = FlagEffects::modifies(FlagSet::STATUS);
const LOGIC: FlagEffects =
    FlagEffects::modifies(FlagSet::RESULT).with_cleared(FlagSet::CF.union(FlagSet::OF));
const INC_DEC: FlagEffects = FlagEffects::modifies(FlagSet::RESULT.union(FlagSet::OF));
const MULTIPLY: FlagEffects =
    FlagEffects::modifies(FlagSet::CF.union(FlagSet::OF)).with_undefined(FlagSet::RESULT);
const DIVIDE: FlagEffects = FlagEffects::NONE.with_undefined(FlagSet::STATUS);
const DECIMAL: FlagEffects =
    FlagEffects::modifies(FlagSet::RESULT.union(FlagSet::CF)).with_undefined(FlagSet::OF);
const ASCII: FlagEffects =
    FlagEffects::modifies(FlagSet::CF).with_undefined(FlagSet::RESULT.union(FlagSet::OF));
const ASCII_MUL: FlagEffects =
    FlagEffects::modifies(FlagSet::RESULT).with_undefined(FlagSet::CF.union(FlagSet::OF));
const ROTATE: FlagEffects = FlagEffects::modifies(FlagSet::CF.union(FlagSet::OF));
const NONE: FlagEffects = FlagEffects::NONE;

const CARRY: FlagSet = FlagSet::CF;
const NO_FLAGS: FlagSet = FlagSet::empty();

const fn op(
    mnemonic: Mnemonic,
    class: OpClass,
    flags: FlagEffects,
    reads_flags: FlagSet,
    forms: &'static [&'static [Access]],
) -> OpInfo {
    OpInfo {
        mnemonic,
        class,
        flags,
        reads_flags,
        forms,
    }
}

/// Table-driven OpInfo, indexed by `Mnemonic as usize`.
const OP_INFO: &[OpInfo] = {
    use Mnemonic as M;
    use OpClass as C;
    &[
        op(M::Add, C::Arithmetic, ARITH, NO_FLAGS, BINARY),
        op(M::Adc, C::Arithmetic, ARITH, CARRY, BINARY),
        op(M::Sub, C::Arithmetic, ARITH, NO_FLAGS, BINARY),
        op(M::Sbb, C::Arithmetic, ARITH, CARRY, BINARY),
        op(M::Cmp, C::Arithmetic, ARITH, NO_FLAGS, COMPARE),
        op(M::And, C::Logic, LOGIC, NO_FLAGS, BINARY),
        op(M::Or, C::Logic, LOGIC, NO_FLAGS, BINARY),
        op(M::Xor, C::Logic, LOGIC, NO_FLAGS, BINARY),
        op(M::Test, C::Logic, LOGIC, NO_FLAGS, COMPARE),
        op(M::Inc, C::Arithmetic, INC_DEC, NO_FLAGS, UPDATE),
        op(M::Dec, C::Arithmetic, INC_DEC, NO_FLAGS, UPDATE),
        op(M::Neg, C::Arithmetic, ARITH, NO_FLAGS, UPDATE),
        op(M::Not, C::Logic, NONE, NO_FLAGS, UPDATE),
        op(M::Mul, C::Arithmetic, MULTIPLY, NO_FLAGS, READ),
        op(
            M::Imul,
            C::Arithmetic,
            MULTIPLY,
            NO_FLAGS,
            &[&[R], &[RW, R], &[W, R, R]],
        ),
        op(M::Div, C::Arithmetic, DIVIDE, NO_FLAGS, READ),
        op(M::Idiv, C::Arithmetic, DIVIDE, NO_FLAGS, READ),
        op(M::Daa, C::Arithmetic, DECIMAL, CARRY, NULLARY),
        op(M::Das, C::Arithmetic, DECIMAL, CARRY, NULLARY),
        op(M::Aaa, C::Arithmetic, ASCII, NO_FLAGS, NULLARY),
        op(M::Aas, C::Arithmetic, ASCII, NO_FLAGS, NULLARY),
        op(M::Aam, C::Arithmetic, ASCII_MUL, NO_FLAGS, OPTIONAL_READ),
        op(M::Aad, C::Arithmetic, ASCII_MUL, NO_FLAGS, OPTIONAL_READ),
        op(M::Cbw, C::Arithmetic, NONE, NO_FLAGS, NULLARY),
        op(M::Cwd, C::Arithmetic, NONE, NO_FLAGS, NULLARY),
        op(M::Rol, C::Shift, ROTATE, NO_FLAGS, BINARY),
        op(M::Ror, C::Shift, ROTATE, NO_FLAGS, BINARY),
        op(M::Rcl, C::Shift, ROTATE, CARRY, BINARY),
        op(M::Rcr, C::Shift, ROTATE, CARRY, BINARY),
        op(M::Shl, C::Shift, ARITH, NO_FLAGS, BINARY),
        op(M::Shr, C::Shift, ARITH, NO_FLAGS, BINARY),
        op(M::Sar, C::Shift, ARITH, NO_FLAGS, BINARY),
        op(M::Mov, C::Data, NONE, NO_FLAGS, MOVE),
        op(M::Xchg, C::Data, NONE, NO_FLAGS, &[&[RW, RW]]),
        op(M::Lea, C::Data, NONE, NO_FLAGS, &[&[W, A]]),
        op(M::Lds, C::Data, NONE, NO_FLAGS, MOVE),
        op(M::Les, C::Data, NONE, NO_FLAGS, MOVE),
        op(M::Xlat, C::Data, NONE, NO_FLAGS, NULLARY),
        op(
            M::Lahf,
            C::Data,
            NONE,
            FlagSet::RESULT.union(FlagSet::CF),
            NULLARY,
        ),
        op(
            M::Sahf,
            C::Data,
            FlagEffects::modifies(FlagSet::RESULT.union(FlagSet::CF)),
            NO_FLAGS,
            NULLARY,
        ),
        op(M::Push, C::Stack, NONE, NO_FLAGS, READ),
        op(M::Pop, C::Stack, NONE, NO_FLAGS, WRITE),
        op(M::Pusha, C::Stack, NONE, NO_FLAGS, NULLARY),
        op(M::Popa, C::Stack, NONE, NO_FLAGS, NULLARY),
        op(M::Pushf, C::Stack, NONE, FlagSet::STATUS, NULLARY),
        op(M::Popf, C::Stack, ARITH, NO_FLAGS, NULLARY),
        op(M::Enter, C::Stack, NONE, NO_FLAGS, COMPARE),
        op(M::Leave, C::Stack, NONE, NO_FLAGS, NULLARY),
        op(M::Movs, C::String, NONE, NO_FLAGS, NULLARY),
        op(M::Cmps, C::String, ARITH, NO_FLAGS, NULLARY),
        op(M::Stos, C::String, NONE, NO_FLAGS, NULLARY),
        op(M::Lods, C::String, NONE, NO_FLAGS, NULLARY),
        op(M::Scas, C::String, ARITH, NO_FLAGS, NULLARY),
        op(M::Ins, C::String, NONE, NO_FLAGS, NULLARY),
        op(M::Outs, C::String, NONE, NO_FLAGS, NULLARY),
        op(M::Jmp, C::Flow, NONE, NO_FLAGS, READ),
        op(M::Jmpf, C::Flow, NONE, NO_FLAGS, READ),
        op(M::Call, C::Flow, NONE, NO_FLAGS, READ),
        op(M::Callf, C::Flow, NONE, NO_FLAGS, READ),
        op(M::Ret, C::Flow, NONE, NO_FLAGS, OPTIONAL_READ),
        op(M::Retf, C::Flow, NONE, NO_FLAGS, OPTIONAL_READ),
        op(M::Iret, C::Flow, ARITH, NO_FLAGS, NULLARY),
        op(M::Jcc, C::Flow, NONE, NO_FLAGS, &[&[N, R]]),
        op(M::Jcxz, C::Flow, NONE, NO_FLAGS, READ),
        op(M::Loop, C::Flow, NONE, NO_FLAGS, READ),
        op(M::Loope, C::Flow, NONE, FlagSet::ZF, READ),
        op(M::Loopne, C::Flow, NONE, FlagSet::ZF, READ),
        op(M::Int, C::Interrupt, NONE, NO_FLAGS, READ),
        op(M::Into, C::Interrupt, NONE, FlagSet::OF, NULLARY),
        op(M::Bound, C::Interrupt, NONE, NO_FLAGS, COMPARE),
        op(M::In, C::Io, NONE, NO_FLAGS, MOVE),
        op(M::Out, C::Io, NONE, NO_FLAGS, COMPARE),
        op(M::Clc, C::Flag, NONE.with_cleared(CARRY), NO_FLAGS, NULLARY),
        op(M::Stc, C::Flag, NONE.with_set(CARRY), NO_FLAGS, NULLARY),
        op(M::Cmc, C::Flag, FlagEffects::modifies(CARRY), CARRY, NULLARY),
        op(M::Cld, C::Flag, NONE, NO_FLAGS, NULLARY),
        op(M::Std, C::Flag, NONE, NO_FLAGS, NULLARY),
        op(M::Cli, C::Flag, NONE, NO_FLAGS, NULLARY),
        op(M::Sti, C::Flag, NONE, NO_FLAGS, NULLARY),
        op(M::Nop, C::Misc, NONE, NO_FLAGS, NULLARY),
        op(M::Hlt, C::Misc, NONE, NO_FLAGS, NULLARY),
        op(M::Wait, C::Misc, NONE, NO_FLAGS, NULLARY),
        op(M::Esc, C::Fpu, NONE, NO_FLAGS, COMPARE),
        op(M::Switch, C::Synthetic, NONE, NO_FLAGS, READ),
        op(M::WordsToDword, C::Synthetic, NONE, NO_FLAGS, &[&[W, W, R]]),
    ]
};
