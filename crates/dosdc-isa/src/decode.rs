//! Byte-level 8086/80186 decoder.

use crate::{
    AddrMode, Cond, Instruction, MemOperand, Mnemonic, Operand, Reg, Rep, SegOff, SegReg, Size,
};

/// Decoder failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("instruction runs past the end of the image")]
    Truncated,
    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),
    #[error("32-bit operand or address size prefix")]
    Unsupported32Bit,
}

pub type Result<T> = std::result::Result<T, DecodeError>;

type Decoded = (Mnemonic, Vec<Operand>, Size);

/// Group 1 (80-83) and the 00-3F block, in `reg`/opcode-row order.
const ALU: [Mnemonic; 8] = [
    Mnemonic::Add,
    Mnemonic::Or,
    Mnemonic::Adc,
    Mnemonic::Sbb,
    Mnemonic::And,
    Mnemonic::Sub,
    Mnemonic::Xor,
    Mnemonic::Cmp,
];

/// Group 2. `reg == 6` is the undocumented SAL alias.
const SHIFTS: [Mnemonic; 8] = [
    Mnemonic::Rol,
    Mnemonic::Ror,
    Mnemonic::Rcl,
    Mnemonic::Rcr,
    Mnemonic::Shl,
    Mnemonic::Shr,
    Mnemonic::Shl,
    Mnemonic::Sar,
];

/// Decode one instruction from the start of `bytes`, located at `at`.
///
/// Prefixes (segment override, REP/REPNE, LOCK) are folded into the record.
/// A REP prefix is kept only on string instructions.
pub fn decode(bytes: &[u8], at: SegOff) -> Result<Instruction> {
    let mut d = Decoder::new(bytes);
    let mut rep = None;
    let op = loop {
        let b = d.u8()?;
        match b {
            0x26 => d.seg = Some(SegReg::Es),
            0x2E => d.seg = Some(SegReg::Cs),
            0x36 => d.seg = Some(SegReg::Ss),
            0x3E => d.seg = Some(SegReg::Ds),
            0x64 => d.seg = Some(SegReg::Fs),
            0x65 => d.seg = Some(SegReg::Gs),
            0x66 | 0x67 => return Err(DecodeError::Unsupported32Bit),
            0xF0 => {}
            0xF2 => rep = Some(Rep::Repne),
            0xF3 => rep = Some(Rep::Rep),
            _ => break b,
        }
    };

    let (mnemonic, operands, size) = d.decode_op(op)?;
    let len = u8::try_from(d.pos).map_err(|_| DecodeError::InvalidOpcode(op))?;
    let rep = rep.filter(|_| mnemonic.is_string());
    Ok(Instruction::new(at, mnemonic, operands, size, len)
        .with_rep(rep)
        .with_seg_override(d.seg))
}

#[derive(Clone, Copy)]
struct ModRm {
    md: u8,
    reg: u8,
    rm: u8,
}

struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
    seg: Option<SegReg>,
}

const fn size_of(op: u8) -> Size {
    if op & 1 == 0 { Size::Byte } else { Size::Word }
}

const fn accumulator(size: Size) -> Operand {
    match size {
        Size::Byte => Operand::Reg(Reg::Al),
        Size::Word | Size::Dword => Operand::Reg(Reg::Ax),
    }
}

impl<'a> Decoder<'a> {
    const fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            pos: 0,
            seg: None,
        }
    }

    fn u8(&mut self) -> Result<u8> {
        let b = *self.bytes.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn u16(&mut self) -> Result<u16> {
        let lo = self.u8()?;
        let hi = self.u8()?;
        Ok(u16::from_le_bytes([lo, hi]))
    }

    /// Sign-extended byte immediate or displacement.
    #[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
    fn i8_word(&mut self) -> Result<u16> {
        Ok(i16::from(self.u8()? as i8) as u16)
    }

    #[allow(clippy::cast_possible_wrap)]
    fn rel8(&mut self) -> Result<Operand> {
        Ok(Operand::Rel(i16::from(self.u8()? as i8)))
    }

    #[allow(clippy::cast_possible_wrap)]
    fn rel16(&mut self) -> Result<Operand> {
        Ok(Operand::Rel(self.u16()? as i16))
    }

    fn far(&mut self) -> Result<Operand> {
        let off = self.u16()?;
        let seg = self.u16()?;
        Ok(Operand::Far(SegOff::new(seg, off)))
    }

    fn imm(&mut self, size: Size) -> Result<Operand> {
        match size {
            Size::Byte => Ok(Operand::imm8(self.u8()?)),
            Size::Word | Size::Dword => Ok(Operand::imm16(self.u16()?)),
        }
    }

    fn modrm(&mut self) -> Result<ModRm> {
        let b = self.u8()?;
        Ok(ModRm {
            md: b >> 6,
            reg: (b >> 3) & 7,
            rm: b & 7,
        })
    }

    /// The r/m operand, reading any displacement.
    fn rm(&mut self, m: ModRm, size: Size) -> Result<Operand> {
        if m.md == 3 {
            return Ok(Operand::Reg(Reg::from_index(m.rm, size)));
        }
        let (mode, disp) = match m.md {
            0 if m.rm == 6 => (AddrMode::Direct, self.u16()?),
            0 => (AddrMode::from_rm(m.rm), 0),
            1 => (AddrMode::from_rm(m.rm), self.i8_word()?),
            _ => (AddrMode::from_rm(m.rm), self.u16()?),
        };
        let seg = self.seg.unwrap_or_else(|| mode.default_seg());
        Ok(Operand::Mem(MemOperand::new(mode, disp, seg, size)))
    }

    /// Memory-only r/m (LEA, LDS, LES, BOUND, far indirect).
    fn mem(&mut self, m: ModRm, size: Size, op: u8) -> Result<Operand> {
        if m.md == 3 {
            return Err(DecodeError::InvalidOpcode(op));
        }
        self.rm(m, size)
    }

    /// `Eb,Gb` / `Ev,Gv` forms; bit 1 of the opcode swaps to `G,E`.
    fn rm_reg(&mut self, op: u8) -> Result<(Vec<Operand>, Size)> {
        let size = size_of(op);
        let m = self.modrm()?;
        let reg = Operand::Reg(Reg::from_index(m.reg, size));
        let rm = self.rm(m, size)?;
        let ops = if op & 2 == 0 { vec![rm, reg] } else { vec![reg, rm] };
        Ok((ops, size))
    }

    fn shift_group(&mut self, op: u8, count: Option<Operand>) -> Result<Decoded> {
        let size = size_of(op);
        let m = self.modrm()?;
        let rm = self.rm(m, size)?;
        let count = match count {
            Some(c) => c,
            None => Operand::imm8(self.u8()?),
        };
        Ok((SHIFTS[usize::from(m.reg)], vec![rm, count], size))
    }

    fn decode_op(&mut self, op: u8) -> Result<Decoded> {
        use Mnemonic as M;
        let invalid = DecodeError::InvalidOpcode(op);
        let word = |o: u8| Operand::Reg(Reg::from_index(o, Size::Word));
        let decoded = match op {
            0x00..=0x3F if op & 7 < 4 => {
                let (ops, size) = self.rm_reg(op)?;
                (ALU[usize::from(op >> 3)], ops, size)
            }
            0x00..=0x3F if op & 7 < 6 => {
                let size = size_of(op);
                let imm = self.imm(size)?;
                (ALU[usize::from(op >> 3)], vec![accumulator(size), imm], size)
            }
            0x06 | 0x0E | 0x16 | 0x1E | 0x07 | 0x17 | 0x1F => {
                let seg = SegReg::from_index(op >> 3).ok_or(invalid)?;
                let m = if op & 1 == 0 { M::Push } else { M::Pop };
                (m, vec![Operand::SegReg(seg)], Size::Word)
            }
            0x27 => (M::Daa, vec![], Size::Byte),
            0x2F => (M::Das, vec![], Size::Byte),
            0x37 => (M::Aaa, vec![], Size::Byte),
            0x3F => (M::Aas, vec![], Size::Byte),
            0x40..=0x47 => (M::Inc, vec![word(op)], Size::Word),
            0x48..=0x4F => (M::Dec, vec![word(op)], Size::Word),
            0x50..=0x57 => (M::Push, vec![word(op)], Size::Word),
            0x58..=0x5F => (M::Pop, vec![word(op)], Size::Word),
            0x60 => (M::Pusha, vec![], Size::Word),
            0x61 => (M::Popa, vec![], Size::Word),
            0x62 => {
                let m = self.modrm()?;
                let bounds = self.mem(m, Size::Dword, op)?;
                (M::Bound, vec![word(m.reg), bounds], Size::Word)
            }
            0x68 => (M::Push, vec![Operand::imm16(self.u16()?)], Size::Word),
            0x6A => (M::Push, vec![Operand::imm16(self.i8_word()?)], Size::Word),
            0x69 | 0x6B => {
                let m = self.modrm()?;
                let rm = self.rm(m, Size::Word)?;
                let imm = if op == 0x69 { self.u16()? } else { self.i8_word()? };
                (M::Imul, vec![word(m.reg), rm, Operand::imm16(imm)], Size::Word)
            }
            0x6C | 0x6D => (M::Ins, vec![], size_of(op)),
            0x6E | 0x6F => (M::Outs, vec![], size_of(op)),
            0x70..=0x7F => (
                M::Jcc,
                vec![Operand::Cond(Cond::from_index(op)), self.rel8()?],
                Size::Word,
            ),
            0x80..=0x83 => {
                let size = size_of(op);
                let m = self.modrm()?;
                let rm = self.rm(m, size)?;
                let imm = match op {
                    0x81 => Operand::imm16(self.u16()?),
                    0x83 => Operand::imm16(self.i8_word()?),
                    _ => Operand::imm8(self.u8()?),
                };
                (ALU[usize::from(m.reg)], vec![rm, imm], size)
            }
            0x84..=0x87 => {
                let (ops, size) = self.rm_reg(op)?;
                let m = if op < 0x86 { M::Test } else { M::Xchg };
                (m, ops, size)
            }
            0x88..=0x8B => {
                let (ops, size) = self.rm_reg(op)?;
                (M::Mov, ops, size)
            }
            0x8C | 0x8E => {
                let m = self.modrm()?;
                let seg = Operand::SegReg(SegReg::from_index(m.reg).ok_or(invalid)?);
                let rm = self.rm(m, Size::Word)?;
                let ops = if op == 0x8C { vec![rm, seg] } else { vec![seg, rm] };
                (M::Mov, ops, Size::Word)
            }
            0x8D => {
                let m = self.modrm()?;
                let addr = self.mem(m, Size::Word, op)?;
                (M::Lea, vec![word(m.reg), addr], Size::Word)
            }
            0x8F => {
                let m = self.modrm()?;
                if m.reg != 0 {
                    return Err(invalid);
                }
                (M::Pop, vec![self.rm(m, Size::Word)?], Size::Word)
            }
            0x90 => (M::Nop, vec![], Size::Word),
            0x91..=0x97 => (M::Xchg, vec![Operand::Reg(Reg::Ax), word(op)], Size::Word),
            0x98 => (M::Cbw, vec![], Size::Word),
            0x99 => (M::Cwd, vec![], Size::Word),
            0x9A => (M::Callf, vec![self.far()?], Size::Word),
            0x9B => (M::Wait, vec![], Size::Word),
            0x9C => (M::Pushf, vec![], Size::Word),
            0x9D => (M::Popf, vec![], Size::Word),
            0x9E => (M::Sahf, vec![], Size::Byte),
            0x9F => (M::Lahf, vec![], Size::Byte),
            0xA0..=0xA3 => {
                let size = size_of(op);
                let disp = self.u16()?;
                let seg = self.seg.unwrap_or(SegReg::Ds);
                let mem = Operand::Mem(MemOperand::new(AddrMode::Direct, disp, seg, size));
                let acc = accumulator(size);
                let ops = if op < 0xA2 { vec![acc, mem] } else { vec![mem, acc] };
                (M::Mov, ops, size)
            }
            0xA4 | 0xA5 => (M::Movs, vec![], size_of(op)),
            0xA6 | 0xA7 => (M::Cmps, vec![], size_of(op)),
            0xA8 | 0xA9 => {
                let size = size_of(op);
                (M::Test, vec![accumulator(size), self.imm(size)?], size)
            }
            0xAA | 0xAB => (M::Stos, vec![], size_of(op)),
            0xAC | 0xAD => (M::Lods, vec![], size_of(op)),
            0xAE | 0xAF => (M::Scas, vec![], size_of(op)),
            0xB0..=0xB7 => {
                let reg = Operand::Reg(Reg::from_index(op, Size::Byte));
                (M::Mov, vec![reg, Operand::imm8(self.u8()?)], Size::Byte)
            }
            0xB8..=0xBF => (M::Mov, vec![word(op), Operand::imm16(self.u16()?)], Size::Word),
            0xC0 | 0xC1 => self.shift_group(op, None)?,
            0xC2 => (M::Ret, vec![Operand::imm16(self.u16()?)], Size::Word),
            0xC3 => (M::Ret, vec![], Size::Word),
            0xC4 | 0xC5 => {
                let m = self.modrm()?;
                let ptr = self.mem(m, Size::Dword, op)?;
                let mn = if op == 0xC4 { M::Les } else { M::Lds };
                (mn, vec![word(m.reg), ptr], Size::Word)
            }
            0xC6 | 0xC7 => {
                let size = size_of(op);
                let m = self.modrm()?;
                if m.reg != 0 {
                    return Err(invalid);
                }
                let rm = self.rm(m, size)?;
                (M::Mov, vec![rm, self.imm(size)?], size)
            }
            0xC8 => {
                let frame = Operand::imm16(self.u16()?);
                let level = Operand::imm8(self.u8()?);
                (M::Enter, vec![frame, level], Size::Word)
            }
            0xC9 => (M::Leave, vec![], Size::Word),
            0xCA => (M::Retf, vec![Operand::imm16(self.u16()?)], Size::Word),
            0xCB => (M::Retf, vec![], Size::Word),
            0xCC => (M::Int, vec![Operand::imm8(3)], Size::Byte),
            0xCD => (M::Int, vec![Operand::imm8(self.u8()?)], Size::Byte),
            0xCE => (M::Into, vec![], Size::Byte),
            0xCF => (M::Iret, vec![], Size::Word),
            0xD0 | 0xD1 => self.shift_group(op, Some(Operand::imm8(1)))?,
            0xD2 | 0xD3 => self.shift_group(op, Some(Operand::Reg(Reg::Cl)))?,
            0xD4 => (M::Aam, vec![Operand::imm8(self.u8()?)], Size::Byte),
            0xD5 => (M::Aad, vec![Operand::imm8(self.u8()?)], Size::Byte),
            0xD7 => (M::Xlat, vec![], Size::Byte),
            0xD8..=0xDF => {
                let m = self.modrm()?;
                let index = ((op & 7) << 3) | m.reg;
                let rm = if m.md == 3 {
                    Operand::imm8(m.rm)
                } else {
                    self.rm(m, Size::Word)?
                };
                (M::Esc, vec![Operand::imm8(index), rm], Size::Word)
            }
            0xE0 => (M::Loopne, vec![self.rel8()?], Size::Word),
            0xE1 => (M::Loope, vec![self.rel8()?], Size::Word),
            0xE2 => (M::Loop, vec![self.rel8()?], Size::Word),
            0xE3 => (M::Jcxz, vec![self.rel8()?], Size::Word),
            0xE4 | 0xE5 => {
                let size = size_of(op);
                (M::In, vec![accumulator(size), Operand::imm8(self.u8()?)], size)
            }
            0xE6 | 0xE7 => {
                let size = size_of(op);
                (M::Out, vec![Operand::imm8(self.u8()?), accumulator(size)], size)
            }
            0xE8 => (M::Call, vec![self.rel16()?], Size::Word),
            0xE9 => (M::Jmp, vec![self.rel16()?], Size::Word),
            0xEA => (M::Jmpf, vec![self.far()?], Size::Word),
            0xEB => (M::Jmp, vec![self.rel8()?], Size::Word),
            0xEC | 0xED => {
                let size = size_of(op);
                (M::In, vec![accumulator(size), Operand::Reg(Reg::Dx)], size)
            }
            0xEE | 0xEF => {
                let size = size_of(op);
                (M::Out, vec![Operand::Reg(Reg::Dx), accumulator(size)], size)
            }
            0xF4 => (M::Hlt, vec![], Size::Word),
            0xF5 => (M::Cmc, vec![], Size::Word),
            0xF6 | 0xF7 => {
                let size = size_of(op);
                let m = self.modrm()?;
                let rm = self.rm(m, size)?;
                match m.reg {
                    0 | 1 => (M::Test, vec![rm, self.imm(size)?], size),
                    2 => (M::Not, vec![rm], size),
                    3 => (M::Neg, vec![rm], size),
                    4 => (M::Mul, vec![rm], size),
                    5 => (M::Imul, vec![rm], size),
                    6 => (M::Div, vec![rm], size),
                    _ => (M::Idiv, vec![rm], size),
                }
            }
            0xF8 => (M::Clc, vec![], Size::Word),
            0xF9 => (M::Stc, vec![], Size::Word),
            0xFA => (M::Cli, vec![], Size::Word),
            0xFB => (M::Sti, vec![], Size::Word),
            0xFC => (M::Cld, vec![], Size::Word),
            0xFD => (M::Std, vec![], Size::Word),
            0xFE => {
                let m = self.modrm()?;
                let mn = match m.reg {
                    0 => M::Inc,
                    1 => M::Dec,
                    _ => return Err(invalid),
                };
                (mn, vec![self.rm(m, Size::Byte)?], Size::Byte)
            }
            0xFF => {
                let m = self.modrm()?;
                match m.reg {
                    0 => (M::Inc, vec![self.rm(m, Size::Word)?], Size::Word),
                    1 => (M::Dec, vec![self.rm(m, Size::Word)?], Size::Word),
                    2 => (M::Call, vec![self.rm(m, Size::Word)?], Size::Word),
                    3 => (M::Callf, vec![self.mem(m, Size::Dword, op)?], Size::Word),
                    4 => (M::Jmp, vec![self.rm(m, Size::Word)?], Size::Word),
                    5 => (M::Jmpf, vec![self.mem(m, Size::Dword, op)?], Size::Word),
                    6 => (M::Push, vec![self.rm(m, Size::Word)?], Size::Word),
                    _ => return Err(invalid),
                }
            }
            _ => return Err(invalid),
        };
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(bytes: &[u8]) -> Instruction {
        decode(bytes, SegOff::new(0, 0x100)).unwrap()
    }

    #[test]
    fn test_alu_forms() {
        let cmp = dec(&[0x3D, 0x03, 0x00]);
        assert_eq!(cmp.mnemonic, Mnemonic::Cmp);
        assert_eq!(cmp.operands, vec![Operand::Reg(Reg::Ax), Operand::imm16(3)]);
        assert_eq!(cmp.len, 3);

        let add = dec(&[0x01, 0xC0]);
        assert_eq!(add.to_string(), "add ax, ax");
        assert_eq!(add.len, 2);

        let sub = dec(&[0x2A, 0xC3]);
        assert_eq!(sub.to_string(), "sub al, bl");

        let or = dec(&[0x83, 0xC9, 0xFF]);
        assert_eq!(or.to_string(), "or cx, 0xffff");
    }

    #[test]
    fn test_branches() {
        let jbe = dec(&[0x76, 0x03]);
        assert_eq!(jbe.cond(), Some(Cond::Be));
        assert_eq!(jbe.branch_target(), Some(SegOff::new(0, 0x105)));

        let jmp = decode(&[0xE9, 0x58, 0x00], SegOff::new(0, 0x105)).unwrap();
        assert_eq!(jmp.branch_target(), Some(SegOff::new(0, 0x160)));

        let short = dec(&[0xEB, 0xFE]);
        assert_eq!(short.branch_target(), Some(SegOff::new(0, 0x100)));

        let far = dec(&[0xEA, 0x34, 0x12, 0x00, 0x20]);
        assert_eq!(far.mnemonic, Mnemonic::Jmpf);
        assert_eq!(far.branch_target(), Some(SegOff::new(0x2000, 0x1234)));

        let lp = dec(&[0xE2, 0xFC]);
        assert_eq!(lp.mnemonic, Mnemonic::Loop);
        assert_eq!(lp.branch_target(), Some(SegOff::new(0, 0xFE)));
    }

    #[test]
    fn test_indirect_jump_with_override() {
        let jmp = dec(&[0x2E, 0xFF, 0xA7, 0x10, 0x01]);
        assert_eq!(jmp.len, 5);
        assert!(jmp.is_indirect_jump());
        assert_eq!(jmp.seg_override, Some(SegReg::Cs));
        let mem = jmp.memory_operand().unwrap();
        assert_eq!((mem.mode, mem.disp, mem.seg), (AddrMode::Bx, 0x110, SegReg::Cs));
        assert_eq!(mem.default_seg(), SegReg::Ds);
    }

    #[test]
    fn test_bp_defaults_to_stack_segment() {
        let mov = dec(&[0x8B, 0x46, 0xFE]);
        assert_eq!(mov.to_string(), "mov ax, word [bp-0x2]");
        assert_eq!(mov.memory_operand().unwrap().seg, SegReg::Ss);
    }

    #[test]
    fn test_misc_encodings() {
        assert_eq!(dec(&[0x93]).to_string(), "xchg ax, bx");
        assert_eq!(dec(&[0xCD, 0x21]).int_vector(), Some(0x21));
        assert_eq!(dec(&[0xCC]).int_vector(), Some(3));
        assert_eq!(dec(&[0xB4, 0x4C]).to_string(), "mov ah, 0x4c");
        assert_eq!(dec(&[0xA1, 0x00, 0x01]).to_string(), "mov ax, word [0x100]");
        assert_eq!(dec(&[0xC4, 0x1E, 0x34, 0x12]).to_string(), "les bx, dword [0x1234]");
        assert_eq!(dec(&[0xD1, 0xE0]).to_string(), "shl ax, 0x1");
        assert_eq!(dec(&[0xD3, 0xE8]).to_string(), "shr ax, cl");
        assert_eq!(dec(&[0x8E, 0xD8]).to_string(), "mov ds, ax");
        assert_eq!(dec(&[0x1E]).to_string(), "push ds");
    }

    #[test]
    fn test_186_additions() {
        let push = dec(&[0x6A, 0xFF]);
        assert_eq!(push.operands, vec![Operand::imm16(0xFFFF)]);
        let enter = dec(&[0xC8, 0x10, 0x00, 0x00]);
        assert_eq!(enter.mnemonic, Mnemonic::Enter);
        assert_eq!(enter.len, 4);
        let imul = dec(&[0x6B, 0xC3, 0x0A]);
        assert_eq!(imul.to_string(), "imul ax, bx, 0xa");
        assert_eq!(dec(&[0x60]).mnemonic, Mnemonic::Pusha);
        assert_eq!(dec(&[0xC1, 0xE0, 0x04]).to_string(), "shl ax, 0x4");
    }

    #[test]
    fn test_string_prefixes() {
        let movs = dec(&[0xF3, 0xA5]);
        assert_eq!(movs.rep, Some(Rep::Rep));
        assert_eq!(movs.len, 2);
        assert_eq!(movs.to_string(), "rep movsw");

        // REP on a non-string instruction is dropped.
        let nop = dec(&[0xF3, 0x90]);
        assert_eq!(nop.rep, None);
        assert_eq!(nop.len, 2);

        let lods = dec(&[0x26, 0xAC]);
        assert_eq!(lods.seg_override, Some(SegReg::Es));
        assert_eq!(lods.size, Size::Byte);
    }

    #[test]
    fn test_fpu_escape() {
        let esc = dec(&[0xD9, 0xC0]);
        assert_eq!(esc.mnemonic, Mnemonic::Esc);
        assert_eq!(esc.operands, vec![Operand::imm8(0x08), Operand::imm8(0)]);
        let mem = dec(&[0xDD, 0x06, 0x00, 0x02]);
        assert_eq!(mem.len, 4);
        assert!(mem.memory_operand().is_some());
    }

    #[test]
    fn test_errors() {
        let at = SegOff::new(0, 0);
        assert_eq!(decode(&[0x66, 0x90], at), Err(DecodeError::Unsupported32Bit));
        assert_eq!(decode(&[0x67, 0x8B, 0x00], at), Err(DecodeError::Unsupported32Bit));
        assert_eq!(decode(&[0x0F, 0x01], at), Err(DecodeError::InvalidOpcode(0x0F)));
        assert_eq!(decode(&[0xFF, 0xF8], at), Err(DecodeError::InvalidOpcode(0xFF)));
        assert_eq!(decode(&[0x8D, 0xC0], at), Err(DecodeError::InvalidOpcode(0x8D)));
        assert_eq!(decode(&[0xE9, 0x58], at), Err(DecodeError::Truncated));
        assert_eq!(decode(&[], at), Err(DecodeError::Truncated));
        assert_eq!(decode(&[0x2E], at), Err(DecodeError::Truncated));
    }
}
