//! Per-instruction and per-node required/defined locals.
//!
//! `required` is what an instruction reads, `defined` what it writes. Folding
//! a node left to right gives the locals the node consumes before producing
//! them, and everything it produces.

use dosdc_isa::{Access, Instruction, Locals, MemOperand, Mnemonic, Operand, SegReg, Size};
use thiserror::Error;

use crate::FlowGraph;

/// Locals rule failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocalsError {
    #[error("unsupported operand {index} for `{mnemonic}` at {addr:#07x}")]
    UnsupportedOperand {
        addr: u32,
        mnemonic: Mnemonic,
        index: usize,
    },
}

pub type Result<T> = std::result::Result<T, LocalsError>;

/// Locals read by `instr`.
pub fn required(instr: &Instruction) -> Result<Locals> {
    Ok(effects(instr)?.0)
}

/// Locals written by `instr`, including every flag it touches.
pub fn defined(instr: &Instruction) -> Result<Locals> {
    Ok(effects(instr)?.1)
}

/// Fold a node's instructions into `(required, defined)`.
pub fn fold(instrs: &[Instruction]) -> Result<(Locals, Locals)> {
    let mut running = Locals::empty();
    let mut req = Locals::empty();
    let mut def = Locals::empty();
    for instr in instrs {
        let (r, d) = effects(instr)?;
        req |= r - running;
        running |= d;
        def |= d;
    }
    Ok((req, def))
}

/// Fill in `required`/`defined` on every node.
pub fn annotate(graph: &mut FlowGraph) -> Result<()> {
    for node in &mut graph.nodes {
        let (req, def) = fold(&node.instructions)?;
        node.required = req;
        node.defined = def;
    }
    Ok(())
}

fn effects(instr: &Instruction) -> Result<(Locals, Locals)> {
    let (mut req, mut def) = explicit(instr)?;
    let (ireq, idef) = implicit(instr);
    req |= ireq;
    def |= idef;

    req |= instr.mnemonic.info().reads_flags.locals();
    if let Some(cond) = instr.cond() {
        req |= cond.tests().locals();
    }
    def |= instr.flags.written().locals();
    Ok((req, def))
}

/// Registers and segment a memory reference needs to form its address.
fn address_locals(mem: &MemOperand) -> Locals {
    mem.mode
        .registers()
        .iter()
        .fold(Locals::empty(), |acc, r| acc | r.locals())
}

fn explicit(instr: &Instruction) -> Result<(Locals, Locals)> {
    let arity = instr.operands.len();
    let mut req = Locals::empty();
    let mut def = Locals::empty();

    for (index, op) in instr.operands.iter().enumerate() {
        let unsupported = || LocalsError::UnsupportedOperand {
            addr: instr.addr,
            mnemonic: instr.mnemonic,
            index,
        };
        let role = instr.mnemonic.role(index, arity).ok_or_else(unsupported)?;
        match (role, op) {
            (Access::None, Operand::Cond(_) | Operand::Case(_)) => {}
            (_, Operand::Cond(_) | Operand::Case(_)) | (Access::None, _) => {
                return Err(unsupported());
            }
            (Access::Address, Operand::Mem(m)) => req |= address_locals(m),
            (Access::Address, _) => return Err(unsupported()),
            (_, Operand::Mem(m)) => req |= address_locals(m) | m.seg.locals(),
            (Access::Read, Operand::Imm { .. } | Operand::Rel(_) | Operand::Far(_)) => {}
            (_, Operand::Imm { .. } | Operand::Rel(_) | Operand::Far(_)) => {
                return Err(unsupported());
            }
            (access, Operand::Reg(r)) => apply(access, r.locals(), &mut req, &mut def),
            (access, Operand::SegReg(s)) => apply(access, s.locals(), &mut req, &mut def),
        }
    }
    Ok((req, def))
}

fn apply(access: Access, locals: Locals, req: &mut Locals, def: &mut Locals) {
    match access {
        Access::Read => *req |= locals,
        Access::Write => *def |= locals,
        Access::ReadWrite => {
            *req |= locals;
            *def |= locals;
        }
        Access::None | Access::Address => {}
    }
}

const STACK: Locals = Locals::SP.union(Locals::SS);

/// Operands the encoding leaves implicit.
fn implicit(instr: &Instruction) -> (Locals, Locals) {
    use Mnemonic as M;
    let byte = instr.size == Size::Byte;
    let acc = if byte { Locals::AL } else { Locals::AX };
    let src_seg = instr.seg_override.unwrap_or(SegReg::Ds).locals();
    let explicit_only = instr.operands.len() > 1;

    let (mut req, mut def) = match instr.mnemonic {
        M::Mul | M::Imul if explicit_only => (Locals::empty(), Locals::empty()),
        M::Mul | M::Imul if byte => (Locals::AL, Locals::AX),
        M::Mul | M::Imul => (Locals::AX, Locals::AX | Locals::DX),
        M::Div | M::Idiv if byte => (Locals::AX, Locals::AX),
        M::Div | M::Idiv => (Locals::AX | Locals::DX, Locals::AX | Locals::DX),
        M::Cbw => (Locals::AL, Locals::AH),
        M::Cwd => (Locals::AX, Locals::DX),
        M::Daa | M::Das => (Locals::AL, Locals::AL),
        M::Aaa | M::Aas | M::Aad => (Locals::AX, Locals::AX),
        M::Aam => (Locals::AL, Locals::AX),
        M::Lahf => (Locals::empty(), Locals::AH),
        M::Sahf => (Locals::AH, Locals::empty()),
        M::Xlat => (Locals::AL | Locals::BX | src_seg, Locals::AL),
        M::Lds => (Locals::empty(), Locals::DS),
        M::Les => (Locals::empty(), Locals::ES),

        M::Push | M::Pushf | M::Call | M::Int | M::Into | M::Pop | M::Popf | M::Ret
        | M::Retf | M::Iret => (STACK, Locals::SP),
        M::Callf => (STACK | Locals::CS, Locals::SP),
        M::Pusha => (Locals::GPRS | Locals::SS, Locals::SP),
        M::Popa => (STACK, Locals::GPRS),
        M::Enter => (STACK | Locals::BP, Locals::SP | Locals::BP),
        M::Leave => (Locals::BP | Locals::SS, Locals::SP | Locals::BP),

        M::Movs | M::Cmps => (
            Locals::SI | Locals::DI | src_seg | Locals::ES,
            Locals::SI | Locals::DI,
        ),
        M::Stos | M::Scas => (acc | Locals::DI | Locals::ES, Locals::DI),
        M::Lods => (Locals::SI | src_seg, acc | Locals::SI),
        M::Ins => (Locals::DX | Locals::DI | Locals::ES, Locals::DI),
        M::Outs => (Locals::DX | Locals::SI | src_seg, Locals::SI),

        M::Jcxz => (Locals::CX, Locals::empty()),
        M::Loop | M::Loope | M::Loopne => (Locals::CX, Locals::CX),
        _ => (Locals::empty(), Locals::empty()),
    };

    if instr.rep.is_some() && instr.mnemonic.is_string() {
        req |= Locals::CX;
        def |= Locals::CX;
    }
    (req, def)
}
