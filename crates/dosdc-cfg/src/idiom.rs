//! Compiler idioms: jump-table dispatch templates and dword-load fusion.

use std::collections::BTreeSet;

use dosdc_isa::{Cond, Instruction, MemOperand, Mnemonic, Operand, Reg, SegReg, Size};

/// Number of instructions a template sees before the indirect jump.
pub const WINDOW: usize = 5;

/// A recognized jump-table dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwitchMatch {
    /// Register holding the case index at the jump.
    pub index: Reg,
    /// Highest case value. Cases run `0..=max`.
    pub max: u16,
    /// Offset of the word table in the jump's segment.
    pub table: u16,
    /// Addresses of instructions folded into the switch.
    pub folded: Vec<u32>,
}

impl SwitchMatch {
    pub fn case_count(&self) -> usize {
        usize::from(self.max) + 1
    }
}

/// Pattern recognizer for an indirect-jump dispatch sequence.
///
/// `window` holds up to [`WINDOW`] instructions preceding the jump in
/// address order, followed by the jump itself.
pub trait SwitchTemplate: Send + Sync {
    fn name(&self) -> &'static str;

    /// Structural match, or `None`. Table contents are checked by the caller.
    fn matches(&self, window: &[&Instruction]) -> Option<SwitchMatch>;
}

/// `CMP idx, N ; JBE L ; JMP default ; L: ADD idx, idx ; XCHG idx, base ; JMP cs:[table + base]`
pub struct BoundsCheckedJump;

/// `SUB idx, bias ; CMP idx, N ; JA out ; ADD idx, idx ; XCHG idx, base ; JMP cs:[table + base]`
pub struct BiasedRange;

impl SwitchTemplate for BoundsCheckedJump {
    fn name(&self) -> &'static str {
        "bounds-checked-jump"
    }

    fn matches(&self, window: &[&Instruction]) -> Option<SwitchMatch> {
        let [cmp, jbe, default, add, xchg, jmp] = tail6(window)?;
        let (index, table) = scaled_table_jump(add, xchg, jmp)?;
        let max = compare_with_imm(cmp, index)?;

        let guards = jbe.mnemonic == Mnemonic::Jcc
            && jbe.cond() == Some(Cond::Be)
            && jbe.branch_target().map(|t| t.linear()) == Some(add.addr);
        let jumps_away = default.mnemonic == Mnemonic::Jmp && default.branch_target().is_some();
        if !guards || !jumps_away {
            return None;
        }
        Some(SwitchMatch {
            index,
            max,
            table,
            folded: vec![add.addr, xchg.addr],
        })
    }
}

impl SwitchTemplate for BiasedRange {
    fn name(&self) -> &'static str {
        "biased-range"
    }

    fn matches(&self, window: &[&Instruction]) -> Option<SwitchMatch> {
        let [sub, cmp, ja, add, xchg, jmp] = tail6(window)?;
        let (index, table) = scaled_table_jump(add, xchg, jmp)?;
        let max = compare_with_imm(cmp, index)?;

        let biased = sub.mnemonic == Mnemonic::Sub
            && sub.operands.first().and_then(Operand::as_reg) == Some(index)
            && sub.operands.get(1).and_then(Operand::as_imm).is_some();
        let guards = ja.mnemonic == Mnemonic::Jcc && ja.cond() == Some(Cond::A);
        if !biased || !guards {
            return None;
        }
        Some(SwitchMatch {
            index,
            max,
            table,
            folded: vec![add.addr, xchg.addr],
        })
    }
}

/// Last six instructions of the window, if they are contiguous.
fn tail6<'a>(window: &[&'a Instruction]) -> Option<[&'a Instruction; 6]> {
    let start = window.len().checked_sub(6)?;
    let six: [&Instruction; 6] = window[start..].try_into().ok()?;
    let contiguous = six.windows(2).all(|w| w[0].next_addr() == w[1].addr);
    contiguous.then_some(six)
}

/// `CMP idx, imm` → `imm`.
fn compare_with_imm(cmp: &Instruction, index: Reg) -> Option<u16> {
    let lhs = cmp.operands.first().and_then(Operand::as_reg);
    if cmp.mnemonic != Mnemonic::Cmp || lhs != Some(index) {
        return None;
    }
    cmp.operands.get(1).and_then(Operand::as_imm)
}

/// `ADD idx, idx ; XCHG idx, base ; JMP cs:[table + base]` → `(idx, table)`.
fn scaled_table_jump(add: &Instruction, xchg: &Instruction, jmp: &Instruction) -> Option<(Reg, u16)> {
    let index = match add.operands.as_slice() {
        [Operand::Reg(a), Operand::Reg(b)] if add.mnemonic == Mnemonic::Add && a == b => *a,
        _ => return None,
    };
    if !index.is_word() {
        return None;
    }
    let base = match xchg.operands.as_slice() {
        [Operand::Reg(a), Operand::Reg(b)] if xchg.mnemonic == Mnemonic::Xchg => {
            if *a == index {
                *b
            } else if *b == index {
                *a
            } else {
                return None;
            }
        }
        _ => return None,
    };
    if !jmp.is_indirect_jump() || jmp.mnemonic != Mnemonic::Jmp {
        return None;
    }
    let mem = jmp.memory_operand()?;
    let indexed_by_base = matches!(mem.mode.registers(), [r] if *r == base);
    (indexed_by_base && mem.seg == SegReg::Cs).then_some((index, mem.disp))
}

/// Fuse adjacent word loads of one dword into `WordsToDword [hi, lo, dword m]`.
///
/// The second load becomes a `NOP` so addresses stay gap-free. Returns the
/// number of pairs fused.
pub fn fuse_dword_loads(instrs: &mut [Instruction], labels: &BTreeSet<u32>) -> usize {
    let mut fused = 0;
    let mut i = 0;
    while i + 1 < instrs.len() {
        let rewrite = dword_pair(&instrs[i], &instrs[i + 1], labels);
        if let Some((hi, lo, mem)) = rewrite {
            let dword = mem.offset(0, Size::Dword);
            instrs[i] = Instruction {
                size: Size::Dword,
                ..instrs[i].rewritten(
                    Mnemonic::WordsToDword,
                    vec![Operand::Reg(hi), Operand::Reg(lo), Operand::Mem(dword)],
                )
            };
            instrs[i + 1] = instrs[i + 1].neutralized();
            fused += 1;
            i += 2;
        } else {
            i += 1;
        }
    }
    fused
}

fn word_load(instr: &Instruction) -> Option<(Reg, MemOperand)> {
    match instr.operands.as_slice() {
        [Operand::Reg(r), Operand::Mem(m)]
            if instr.mnemonic == Mnemonic::Mov && r.is_word() && m.size == Size::Word =>
        {
            Some((*r, *m))
        }
        _ => None,
    }
}

fn dword_pair(
    first: &Instruction,
    second: &Instruction,
    labels: &BTreeSet<u32>,
) -> Option<(Reg, Reg, MemOperand)> {
    let (lo, m1) = word_load(first)?;
    let (hi, m2) = word_load(second)?;
    let adjacent = m2 == m1.offset(2, Size::Word) && first.next_addr() == second.addr;
    let ok = lo != hi && adjacent && !labels.contains(&second.addr) && !m2.uses(lo);
    ok.then_some((hi, lo, m1))
}

#[cfg(test)]
mod tests {
    use dosdc_isa::{SegOff, decode};

    use super::*;

    /// Decode a contiguous run of encodings starting at `off`.
    fn run(off: u16, encodings: &[&[u8]]) -> Vec<Instruction> {
        let mut at = SegOff::new(0, off);
        encodings
            .iter()
            .map(|bytes| {
                let instr = decode(bytes, at).unwrap();
                at = instr.next();
                instr
            })
            .collect()
    }

    fn bounds_checked_run() -> Vec<Instruction> {
        run(
            0x100,
            &[
                &[0x3D, 0x03, 0x00],             // cmp ax, 3
                &[0x76, 0x03],                   // jbe 0x108
                &[0xE9, 0x58, 0x00],             // jmp 0x160
                &[0x01, 0xC0],                   // add ax, ax
                &[0x93],                         // xchg ax, bx
                &[0x2E, 0xFF, 0xA7, 0x10, 0x01], // jmp cs:[bx+0x110]
            ],
        )
    }

    #[test]
    fn test_bounds_checked_jump() {
        let instrs = bounds_checked_run();
        let window: Vec<&Instruction> = instrs.iter().collect();
        let m = BoundsCheckedJump.matches(&window).unwrap();
        assert_eq!(m.index, Reg::Ax);
        assert_eq!(m.max, 3);
        assert_eq!(m.case_count(), 4);
        assert_eq!(m.table, 0x110);
        assert_eq!(m.folded, vec![0x108, 0x10A]);
        assert!(BiasedRange.matches(&window).is_none());
    }

    #[test]
    fn test_short_or_broken_windows() {
        let instrs = bounds_checked_run();
        let window: Vec<&Instruction> = instrs.iter().skip(1).collect();
        assert!(BoundsCheckedJump.matches(&window).is_none());

        // xchg with an unrelated register pair
        let mut broken = bounds_checked_run();
        broken[4] = decode(&[0x87, 0xCA], broken[4].at).unwrap(); // xchg cx, dx
        let window: Vec<&Instruction> = broken.iter().collect();
        assert!(BoundsCheckedJump.matches(&window).is_none());
    }

    #[test]
    fn test_requires_code_segment_table() {
        let mut instrs = bounds_checked_run();
        // jmp [bx+0x110] without the CS override
        instrs[5] = decode(&[0xFF, 0xA7, 0x10, 0x01], instrs[5].at).unwrap();
        let window: Vec<&Instruction> = instrs.iter().collect();
        assert!(BoundsCheckedJump.matches(&window).is_none());
    }

    #[test]
    fn test_biased_range() {
        let instrs = run(
            0x200,
            &[
                &[0x2D, 0x05, 0x00],             // sub ax, 5
                &[0x3D, 0x02, 0x00],             // cmp ax, 2
                &[0x77, 0x0B],                   // ja out
                &[0x01, 0xC0],                   // add ax, ax
                &[0x93],                         // xchg ax, bx
                &[0x2E, 0xFF, 0xA7, 0x40, 0x02], // jmp cs:[bx+0x240]
            ],
        );
        let window: Vec<&Instruction> = instrs.iter().collect();
        let m = BiasedRange.matches(&window).unwrap();
        assert_eq!((m.index, m.max, m.table), (Reg::Ax, 2, 0x240));
        assert!(BoundsCheckedJump.matches(&window).is_none());
    }

    #[test]
    fn test_fuse_dword_loads() {
        let mut instrs = run(
            0x100,
            &[
                &[0x8B, 0x47, 0x04], // mov ax, [bx+4]
                &[0x8B, 0x57, 0x06], // mov dx, [bx+6]
                &[0xC3],
            ],
        );
        let fused = fuse_dword_loads(&mut instrs, &BTreeSet::new());
        assert_eq!(fused, 1);
        assert_eq!(instrs[0].mnemonic, Mnemonic::WordsToDword);
        assert_eq!(instrs[0].operands[0], Operand::Reg(Reg::Dx));
        assert_eq!(instrs[0].operands[1], Operand::Reg(Reg::Ax));
        assert_eq!(instrs[0].memory_operand().unwrap().size, Size::Dword);
        assert_eq!(instrs[1].mnemonic, Mnemonic::Nop);
        assert_eq!(instrs[1].addr, 0x103);
    }

    #[test]
    fn test_fusion_preconditions() {
        let pair = |second: &[u8]| run(0x100, &[&[0x8B, 0x47, 0x04], second]);

        // second load addresses through the first destination
        let mut instrs = run(0x100, &[&[0x8B, 0x1F], &[0x8B, 0x57, 0x02]]);
        assert_eq!(fuse_dword_loads(&mut instrs, &BTreeSet::new()), 0);

        // not the following word
        let mut instrs = pair(&[0x8B, 0x57, 0x08]);
        assert_eq!(fuse_dword_loads(&mut instrs, &BTreeSet::new()), 0);

        // second load is a branch target
        let mut instrs = pair(&[0x8B, 0x57, 0x06]);
        let labels = BTreeSet::from([0x103]);
        assert_eq!(fuse_dword_loads(&mut instrs, &labels), 0);

        // same destination twice
        let mut instrs = pair(&[0x8B, 0x47, 0x06]);
        assert_eq!(fuse_dword_loads(&mut instrs, &BTreeSet::new()), 0);
    }
}
