//! Branch-following disassembly engine with jump-table recovery.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use dosdc_exe::Image;
use dosdc_isa::{
    DecodeError, Instruction, Locals, Mnemonic, Operand, Reg, SegOff, Size, SwitchCase, decode,
};
use rustc_hash::FxHashMap;
use tracing::{debug, trace, trace_span, warn};

use crate::idiom::{self, BiasedRange, BoundsCheckedJump, SwitchMatch, SwitchTemplate, WINDOW};
use crate::{CfgError, EngineConfig, Result, locals};

/// Why an indirect or far jump was left as is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnresolvedReason {
    /// No switch template matched the dispatch sequence.
    UnrecognizedDispatch,
    /// Far jump whose target lies outside the program.
    ExternalTarget,
}

/// A control transfer the engine could not follow.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unresolved {
    pub addr: u32,
    pub at: SegOff,
    pub reason: UnresolvedReason,
}

/// Result of disassembling one function.
#[derive(Clone, Debug)]
pub struct Disassembly {
    pub entry: SegOff,
    /// Sorted by address. A synthetic zero-length `JMP entry` comes first when
    /// the entry is not the lowest address.
    pub instructions: Vec<Instruction>,
    /// Branch, loop, and switch-case targets.
    pub labels: BTreeSet<u32>,
    /// Process-exit interrupts.
    pub exits: BTreeSet<u32>,
    pub unresolved: Vec<Unresolved>,
    /// Direct call targets, sorted by linear address.
    pub callees: Vec<SegOff>,
    index: FxHashMap<u32, usize>,
}

impl Disassembly {
    pub fn is_label(&self, addr: u32) -> bool {
        self.labels.contains(&addr)
    }

    pub fn is_exit(&self, addr: u32) -> bool {
        self.exits.contains(&addr)
    }

    pub fn unresolved_at(&self, addr: u32) -> Option<&Unresolved> {
        self.unresolved.iter().find(|u| u.addr == addr)
    }

    /// Position of the real instruction at `addr`. Synthetic entries are skipped.
    pub fn position(&self, addr: u32) -> Option<usize> {
        let pos = *self.index.get(&addr)?;
        let instr = self.instructions.get(pos)?;
        (instr.addr == addr && !instr.is_synthetic()).then_some(pos)
    }

    pub fn find(&self, addr: u32) -> Option<&Instruction> {
        self.position(addr).map(|i| &self.instructions[i])
    }

    /// Number of real (non-synthetic) instructions.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Recovered jump tables.
    pub fn switches(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .filter(|i| i.mnemonic == Mnemonic::Switch)
    }
}

/// Disassembly engine.
///
/// Holds configuration and the registered switch templates; a single value
/// can be shared across threads and reused for many functions.
pub struct Disassembler {
    config: EngineConfig,
    templates: Vec<Box<dyn SwitchTemplate>>,
}

impl Default for Disassembler {
    fn default() -> Self {
        Self::standard()
    }
}

impl Disassembler {
    /// Engine with the built-in switch templates.
    pub fn new(config: EngineConfig) -> Self {
        Self::empty(config)
            .with_template(BoundsCheckedJump)
            .with_template(BiasedRange)
    }

    /// Default config with the built-in templates.
    pub fn standard() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Engine without any switch templates.
    pub fn empty(config: EngineConfig) -> Self {
        Self {
            config,
            templates: Vec::new(),
        }
    }

    /// Register a switch template. Templates are tried in registration order.
    #[must_use]
    pub fn with_template(mut self, template: impl SwitchTemplate + 'static) -> Self {
        self.templates.push(Box::new(template));
        self
    }

    pub fn template_names(&self) -> Vec<&'static str> {
        self.templates.iter().map(|t| t.name()).collect()
    }

    /// Recover the instruction stream of the function at `entry`.
    pub fn disassemble(&self, image: &Image, entry: SegOff) -> Result<Disassembly> {
        let _span = trace_span!("disassemble", entry = %entry).entered();
        if !image.contains(entry.linear()) {
            return Err(CfgError::OutOfBounds {
                entry,
                addr: entry.linear(),
            });
        }

        let mut walk = Walk::new(self, image, entry);
        walk.queue.push_back(entry);
        loop {
            {
                let _span = trace_span!("walk").entered();
                while let Some(at) = walk.queue.pop_front() {
                    walk.run(at)?;
                }
            }
            if walk.pending.is_empty() {
                break;
            }
            let _span = trace_span!("recover_switches").entered();
            for addr in std::mem::take(&mut walk.pending) {
                walk.recover_dispatch(addr)?;
            }
            if walk.queue.is_empty() {
                break;
            }
        }

        walk.finish()
    }
}

/// Mutable state of one `disassemble` call.
struct Walk<'a> {
    engine: &'a Disassembler,
    image: &'a Image,
    entry: SegOff,
    decoded: BTreeMap<u32, Instruction>,
    queue: VecDeque<SegOff>,
    /// Indirect jumps awaiting template matching.
    pending: Vec<u32>,
    /// `(source, target)` for every followed branch.
    branches: Vec<(u32, u32)>,
    labels: BTreeSet<u32>,
    exits: BTreeSet<u32>,
    unresolved: Vec<Unresolved>,
    callees: BTreeMap<u32, SegOff>,
    /// AH known on every followed branch into a run start.
    carried_ah: FxHashMap<u32, Option<u8>>,
}

/// Process-terminating DOS interrupts.
const fn is_process_exit(vector: u8, ah: Option<u8>) -> bool {
    match vector {
        0x20 | 0x27 => true,
        0x21 => matches!(ah, Some(0x00 | 0x31 | 0x4C)),
        _ => false,
    }
}

/// Value an instruction loads into AH, if it is a constant.
fn loads_ah(instr: &Instruction) -> Option<u8> {
    if instr.mnemonic != Mnemonic::Mov {
        return None;
    }
    match instr.operands.as_slice() {
        [Operand::Reg(Reg::Ah), Operand::Imm { value, .. }] => u8::try_from(*value).ok(),
        [Operand::Reg(Reg::Ax), Operand::Imm { value, .. }] => Some(value.to_le_bytes()[1]),
        _ => None,
    }
}

impl<'a> Walk<'a> {
    fn new(engine: &'a Disassembler, image: &'a Image, entry: SegOff) -> Self {
        Self {
            engine,
            image,
            entry,
            decoded: BTreeMap::new(),
            queue: VecDeque::new(),
            pending: Vec::new(),
            branches: Vec::new(),
            labels: BTreeSet::new(),
            exits: BTreeSet::new(),
            unresolved: Vec::new(),
            callees: BTreeMap::new(),
            carried_ah: FxHashMap::default(),
        }
    }

    fn decode_at(&self, at: SegOff) -> Result<Instruction> {
        let addr = at.linear();
        let bytes = self.image.bytes_at(addr).ok_or(CfgError::OutOfBounds {
            entry: self.entry,
            addr,
        })?;
        decode(bytes, at).map_err(|source| match source {
            DecodeError::Truncated => CfgError::OutOfBounds {
                entry: self.entry,
                addr,
            },
            source => CfgError::Decode {
                entry: self.entry,
                addr,
                source,
            },
        })
    }

    /// True if `[addr, addr+len)` overlaps an instruction that starts elsewhere.
    fn overlaps(&self, addr: u32, len: u8) -> bool {
        let end = addr + u32::from(len);
        let before = self
            .decoded
            .range(..addr)
            .next_back()
            .is_some_and(|(_, prev)| prev.next_addr() > addr);
        let inside = self.decoded.range(addr + 1..end).next().is_some();
        before || inside
    }

    /// Queue `target`, recording the AH value control carries into it.
    /// Disagreeing sources leave AH unknown.
    fn follow(&mut self, source: u32, target: SegOff, ah: Option<u8>) {
        self.branches.push((source, target.linear()));
        self.labels.insert(target.linear());
        self.carried_ah
            .entry(target.linear())
            .and_modify(|known| {
                if *known != ah {
                    *known = None;
                }
            })
            .or_insert(ah);
        self.queue.push_back(target);
    }

    /// `INT 21h` with an unknown function that is followed by undecodable bytes.
    fn dos_call_ends_code(&self, vector: Option<u8>, ah: Option<u8>, next: SegOff) -> bool {
        vector == Some(0x21) && ah.is_none() && self.decode_at(next).is_err()
    }

    /// Far transfer whose target is not part of this program.
    fn is_external(&self, instr: &Instruction, target: SegOff) -> bool {
        if !self.image.contains(target.linear()) {
            return true;
        }
        let seg_word = instr.addr + u32::from(instr.len) - 2;
        self.image.has_relocation_table() && !self.image.is_relocated(seg_word)
    }

    /// Decode one straight-line run starting at `start`.
    fn run(&mut self, start: SegOff) -> Result<()> {
        let mut at = start;
        let mut ah = self.carried_ah.get(&start.linear()).copied().flatten();
        loop {
            let addr = at.linear();
            if self.decoded.contains_key(&addr) {
                return Ok(());
            }
            let limit = self.engine.config.max_instructions;
            if self.decoded.len() >= limit {
                return Err(CfgError::InstructionLimit {
                    entry: self.entry,
                    limit,
                });
            }
            let instr = self.decode_at(at)?;
            if self.overlaps(addr, instr.len) {
                trace!(addr, "run stops at overlapping instruction");
                return Ok(());
            }

            let next = instr.next();
            let target = instr.branch_target();
            let mnemonic = instr.mnemonic;
            let vector = instr.int_vector();
            ah = match loads_ah(&instr) {
                Some(v) => Some(v),
                None => match locals::defined(&instr) {
                    Ok(d) if !d.intersects(Locals::AH) => ah,
                    _ => None,
                },
            };
            let external = match (mnemonic, target) {
                (Mnemonic::Jmpf | Mnemonic::Callf, Some(t)) => self.is_external(&instr, t),
                _ => false,
            };
            let at_instr = instr.at;
            self.decoded.insert(addr, instr);

            match mnemonic {
                Mnemonic::Jmp | Mnemonic::Jmpf => {
                    match target {
                        Some(_) if external => self.unresolved.push(Unresolved {
                            addr,
                            at: at_instr,
                            reason: UnresolvedReason::ExternalTarget,
                        }),
                        Some(t) => self.follow(addr, t, ah),
                        None => self.pending.push(addr),
                    }
                    return Ok(());
                }
                m if m.is_conditional_branch() => {
                    if let Some(t) = target {
                        self.follow(addr, t, None);
                    }
                }
                m if m.is_return() => return Ok(()),
                Mnemonic::Int if vector.is_some_and(|v| is_process_exit(v, ah)) => {
                    self.exits.insert(addr);
                    return Ok(());
                }
                Mnemonic::Int if self.dos_call_ends_code(vector, ah, next) => {
                    debug!(
                        function = %self.entry,
                        addr = %format_args!("{addr:#07x}"),
                        "dos call before undecodable bytes treated as exit"
                    );
                    self.exits.insert(addr);
                    return Ok(());
                }
                Mnemonic::Call | Mnemonic::Callf => {
                    if let Some(t) = target.filter(|_| !external) {
                        self.callees.insert(t.linear(), t);
                    }
                }
                _ => {}
            }
            at = next;
        }
    }

    /// Offer the instructions before an indirect jump to each template.
    fn recover_dispatch(&mut self, addr: u32) -> Result<()> {
        let Some(jump) = self.decoded.get(&addr) else {
            return Ok(());
        };
        let mut window: Vec<&Instruction> = self
            .decoded
            .range(..addr)
            .rev()
            .take(WINDOW)
            .map(|(_, i)| i)
            .collect();
        window.reverse();
        window.push(jump);

        let found = self
            .engine
            .templates
            .iter()
            .find_map(|t| t.matches(&window).map(|m| (t.name(), m)));

        let Some((name, matched)) = found else {
            warn!(
                function = %self.entry,
                addr = %format_args!("{addr:#07x}"),
                "unrecognized indirect jump dispatch"
            );
            let at = jump.at;
            self.unresolved.push(Unresolved {
                addr,
                at,
                reason: UnresolvedReason::UnrecognizedDispatch,
            });
            return Ok(());
        };

        debug!(
            function = %self.entry,
            addr = %format_args!("{addr:#07x}"),
            template = name,
            cases = matched.case_count(),
            "recovered switch"
        );
        self.apply_switch(addr, &matched)
    }

    fn apply_switch(&mut self, addr: u32, matched: &SwitchMatch) -> Result<()> {
        let max_cases = usize::from(self.engine.config.max_switch_cases);
        if matched.case_count() > max_cases {
            return Err(CfgError::IdiomInvariant {
                entry: self.entry,
                addr,
                reason: format!(
                    "{} cases exceed the limit of {max_cases}",
                    matched.case_count()
                ),
            });
        }
        let Some(jump) = self.decoded.get(&addr) else {
            return Ok(());
        };
        let seg = jump.at.seg;
        let next = jump.next();

        let mut operands = vec![Operand::Reg(matched.index)];
        let mut targets = Vec::with_capacity(matched.case_count());
        for value in 0..=matched.max {
            let slot = SegOff::new(seg, matched.table.wrapping_add(value.wrapping_mul(2)));
            let word = self.image.read_u16(slot.linear()).ok_or(CfgError::OutOfBounds {
                entry: self.entry,
                addr: slot.linear(),
            })?;
            #[allow(clippy::cast_possible_wrap)]
            let disp = word.wrapping_sub(next.off) as i16;
            operands.push(Operand::Case(SwitchCase { value, disp }));
            targets.push(SegOff::new(seg, word));
        }

        let switch = Instruction {
            size: Size::Word,
            ..jump.rewritten(Mnemonic::Switch, operands)
        };
        self.decoded.insert(addr, switch);
        for folded in &matched.folded {
            if let Some(instr) = self.decoded.get(folded) {
                let nop = instr.neutralized();
                self.decoded.insert(*folded, nop);
            }
        }
        for target in targets {
            self.follow(addr, target, None);
        }
        Ok(())
    }

    /// Whether control continues to the next instruction after `instr`.
    fn falls_through(&self, instr: &Instruction) -> bool {
        !(instr.mnemonic.is_jump()
            || instr.mnemonic.is_return()
            || instr.mnemonic == Mnemonic::Switch
            || self.exits.contains(&instr.addr))
    }

    fn finish(self) -> Result<Disassembly> {
        let _span = trace_span!("finish").entered();
        let entry = self.entry;
        let missing = |addr: u32, target: u32| CfgError::UnresolvedControlFlow {
            entry,
            addr,
            target,
        };
        for &(source, target) in &self.branches {
            if !self.decoded.contains_key(&target) {
                return Err(missing(source, target));
            }
        }
        for instr in self.decoded.values() {
            if self.falls_through(instr) && !self.decoded.contains_key(&instr.next_addr()) {
                return Err(missing(instr.addr, instr.next_addr()));
            }
        }

        let mut instructions: Vec<Instruction> = self.decoded.into_values().collect();
        if self.engine.config.fuse_dword_loads {
            let fused = idiom::fuse_dword_loads(&mut instructions, &self.labels);
            trace!(fused, "dword loads fused");
        }

        let lowest = instructions.first().map(|i| i.at);
        if let Some(lowest) = lowest.filter(|l| l.linear() != entry.linear()) {
            instructions.insert(0, entry_jump(lowest, entry));
        }

        let index = instructions
            .iter()
            .enumerate()
            .filter(|(_, i)| !i.is_synthetic())
            .map(|(pos, i)| (i.addr, pos))
            .collect();

        debug!(
            function = %entry,
            instructions = instructions.len(),
            labels = self.labels.len(),
            unresolved = self.unresolved.len(),
            callees = self.callees.len(),
            "disassembly complete"
        );

        Ok(Disassembly {
            entry,
            instructions,
            labels: self.labels,
            exits: self.exits,
            unresolved: self.unresolved,
            callees: self.callees.into_values().collect(),
            index,
        })
    }
}

/// Zero-length jump at the lowest address that transfers to the entry.
fn entry_jump(lowest: SegOff, entry: SegOff) -> Instruction {
    if lowest.seg == entry.seg {
        #[allow(clippy::cast_possible_wrap)]
        let disp = entry.off.wrapping_sub(lowest.off) as i16;
        Instruction::new(lowest, Mnemonic::Jmp, vec![Operand::Rel(disp)], Size::Word, 0)
    } else {
        Instruction::new(lowest, Mnemonic::Jmpf, vec![Operand::Far(entry)], Size::Word, 0)
    }
}
