//! Flow graph over a disassembled function.

use std::collections::{BTreeMap, VecDeque};
use std::fmt::{self, Display};

use dosdc_isa::{Instruction, Locals, Mnemonic, SegOff};
use tracing::{debug, trace_span};

use crate::{CfgError, Disassembly, Result};

/// Index of a node in [`FlowGraph::nodes`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

impl Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Start,
    Block,
    /// A single conditional branch.
    If,
    /// A single recovered jump table.
    Switch,
    End,
}

impl NodeKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Block => "block",
            Self::If => "if",
            Self::Switch => "switch",
            Self::End => "end",
        }
    }

    /// Kind of a node headed by `instr`.
    fn of(instr: &Instruction) -> Self {
        match instr.mnemonic {
            Mnemonic::Switch => Self::Switch,
            m if m.is_conditional_branch() => Self::If,
            _ => Self::Block,
        }
    }
}

impl Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Linear address of the first instruction. 0 for Start.
    pub addr: u32,
    pub instructions: Vec<Instruction>,
    /// Case values parallel to `edges` (Switch only).
    pub cases: Vec<u16>,
    pub edges: Vec<NodeId>,
    /// Locals read before being written in this node.
    pub required: Locals,
    /// Locals written anywhere in this node.
    pub defined: Locals,
}

impl Node {
    const fn new(id: NodeId, kind: NodeKind, addr: u32) -> Self {
        Self {
            id,
            kind,
            addr,
            instructions: Vec::new(),
            cases: Vec::new(),
            edges: Vec::new(),
            required: Locals::empty(),
            defined: Locals::empty(),
        }
    }
}

/// Control flow graph of one function.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]. Every node
/// except Start is reachable from Start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlowGraph {
    pub entry: SegOff,
    pub nodes: Vec<Node>,
    /// Block, If and Switch nodes by address.
    pub by_addr: BTreeMap<u32, NodeId>,
    pub start: NodeId,
    /// Shared exit node, present once any path returns.
    pub end: Option<NodeId>,
    /// Indirect and external jumps that end a block without edges.
    pub unresolved: Vec<u32>,
}

impl FlowGraph {
    /// Build the graph of a disassembled function.
    pub fn build(disasm: &Disassembly) -> Result<Self> {
        let _span = trace_span!("build_graph", entry = %disasm.entry).entered();
        let mut builder = Builder {
            disasm,
            graph: Self {
                entry: disasm.entry,
                nodes: vec![Node::new(NodeId(0), NodeKind::Start, 0)],
                by_addr: BTreeMap::new(),
                start: NodeId(0),
                end: None,
                unresolved: Vec::new(),
            },
            queue: VecDeque::new(),
        };

        let entry = disasm.entry.linear();
        let first = builder.node_for(entry, entry)?;
        builder.graph.nodes[0].edges.push(first);
        while let Some(id) = builder.queue.pop_front() {
            builder.fill(id)?;
        }

        let graph = builder.graph;
        debug!(
            function = %graph.entry,
            nodes = graph.nodes.len(),
            edges = graph.edge_count(),
            unresolved = graph.unresolved.len(),
            "flow graph built"
        );
        Ok(graph)
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Block, If or Switch node starting at `addr`.
    pub fn node_at(&self, addr: u32) -> Option<&Node> {
        self.by_addr.get(&addr).map(|id| self.node(*id))
    }

    pub fn successors(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).edges
    }

    /// Nodes with an edge to `id`, in arena order.
    pub fn predecessors(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.edges.contains(&id))
            .map(|n| n.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges.len()).sum()
    }

    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }
}

struct Builder<'a> {
    disasm: &'a Disassembly,
    graph: FlowGraph,
    queue: VecDeque<NodeId>,
}

impl<'a> Builder<'a> {
    fn missing(&self, addr: u32, target: u32) -> CfgError {
        CfgError::UnresolvedControlFlow {
            entry: self.disasm.entry,
            addr,
            target,
        }
    }

    fn instruction(&self, addr: u32, from: u32) -> Result<&'a Instruction> {
        let disasm = self.disasm;
        disasm.find(addr).ok_or_else(|| self.missing(from, addr))
    }

    /// Node at `addr`, created and queued on first reference from `from`.
    fn node_for(&mut self, addr: u32, from: u32) -> Result<NodeId> {
        if let Some(id) = self.graph.by_addr.get(&addr) {
            return Ok(*id);
        }
        let kind = NodeKind::of(self.instruction(addr, from)?);
        let id = self.push(kind, addr);
        self.graph.by_addr.insert(addr, id);
        self.queue.push_back(id);
        Ok(id)
    }

    fn push(&mut self, kind: NodeKind, addr: u32) -> NodeId {
        let id = NodeId(self.graph.nodes.len());
        self.graph.nodes.push(Node::new(id, kind, addr));
        id
    }

    fn end_node(&mut self, addr: u32) -> NodeId {
        if let Some(end) = self.graph.end {
            return end;
        }
        let end = self.push(NodeKind::End, addr);
        self.graph.end = Some(end);
        end
    }

    fn fill(&mut self, id: NodeId) -> Result<()> {
        let Node { kind, addr, .. } = self.graph.nodes[id.0];
        let head = self.instruction(addr, addr)?;
        match kind {
            NodeKind::If => {
                let target = head
                    .branch_target()
                    .ok_or_else(|| self.missing(addr, addr))?;
                let taken = self.node_for(target.linear(), addr)?;
                let fallthrough = self.node_for(head.next_addr(), addr)?;
                let node = &mut self.graph.nodes[id.0];
                node.instructions.push(head.clone());
                node.edges = vec![taken, fallthrough];
            }
            NodeKind::Switch => {
                let mut edges = Vec::new();
                let mut cases = Vec::new();
                for case in head.cases() {
                    edges.push(self.node_for(head.case_target(case).linear(), addr)?);
                    cases.push(case.value);
                }
                let node = &mut self.graph.nodes[id.0];
                node.instructions.push(head.clone());
                node.edges = edges;
                node.cases = cases;
            }
            NodeKind::Block => self.fill_block(id, head)?,
            NodeKind::Start | NodeKind::End => {}
        }
        Ok(())
    }

    fn fill_block(&mut self, id: NodeId, head: &'a Instruction) -> Result<()> {
        let disasm = self.disasm;
        let mut instructions = Vec::new();
        let mut edges = Vec::new();
        let mut instr = head;
        loop {
            let addr = instr.addr;
            let starts_node = disasm.is_label(addr)
                || self.graph.by_addr.contains_key(&addr)
                || NodeKind::of(instr) != NodeKind::Block;
            if !instructions.is_empty() && starts_node {
                edges.push(self.node_for(addr, addr)?);
                break;
            }

            if instr.mnemonic.is_jump() {
                match instr.branch_target() {
                    Some(target) if disasm.unresolved_at(addr).is_none() => {
                        edges.push(self.node_for(target.linear(), addr)?);
                    }
                    _ => {
                        instructions.push(instr.clone());
                        self.graph.unresolved.push(addr);
                    }
                }
                break;
            }

            instructions.push(instr.clone());
            if instr.mnemonic.is_return() || disasm.is_exit(addr) {
                edges.push(self.end_node(addr));
                break;
            }
            instr = self.instruction(instr.next_addr(), addr)?;
        }

        let node = &mut self.graph.nodes[id.0];
        node.instructions = instructions;
        node.edges = edges;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use dosdc_exe::Image;
    use dosdc_isa::Reg;

    use super::*;
    use crate::{Disassembler, locals};

    fn build(code: &[u8], entry: u16) -> (Disassembly, FlowGraph) {
        let origin = SegOff::new(0, 0x100);
        let image = Image::from_bytecode(code.to_vec(), origin, origin);
        let d = Disassembler::standard()
            .disassemble(&image, SegOff::new(0, entry))
            .unwrap();
        let g = FlowGraph::build(&d).unwrap();
        (d, g)
    }

    fn dispatch_program() -> Vec<u8> {
        let mut code = vec![0xCC; 0x63];
        let mut put = |off: usize, bytes: &[u8]| {
            code[off - 0x100..off - 0x100 + bytes.len()].copy_from_slice(bytes);
        };
        put(0x100, &[0x3D, 0x03, 0x00]); // cmp ax, 3
        put(0x103, &[0x76, 0x03]); // jbe 0x108
        put(0x105, &[0xE9, 0x58, 0x00]); // jmp 0x160
        put(0x108, &[0x01, 0xC0]); // add ax, ax
        put(0x10A, &[0x93]); // xchg ax, bx
        put(0x10B, &[0x2E, 0xFF, 0xA7, 0x10, 0x01]); // jmp cs:[bx+0x110]
        put(0x110, &[0x20, 0x01, 0x30, 0x01, 0x40, 0x01, 0x50, 0x01]);
        for (i, off) in [0x120, 0x130, 0x140, 0x150].into_iter().enumerate() {
            put(off, &[0xB8, u8::try_from(i).unwrap(), 0x00, 0xC3]); // mov ax, i ; ret
        }
        put(0x160, &[0x31, 0xC0, 0xC3]); // xor ax, ax ; ret
        code
    }

    fn kind_at(g: &FlowGraph, addr: u32) -> NodeKind {
        g.node_at(addr).unwrap().kind
    }

    #[test]
    fn test_dispatch_scenario() {
        let (d, g) = build(&dispatch_program(), 0x100);

        assert_eq!(g.count(NodeKind::Start), 1);
        assert_eq!(g.count(NodeKind::End), 1);
        assert_eq!(g.count(NodeKind::Switch), 1);
        assert_eq!(g.count(NodeKind::If), 1);
        assert_eq!(g.count(NodeKind::Block), 8);

        let start = g.node(g.start);
        assert_eq!(start.edges.len(), 1);
        assert_eq!(g.node(start.edges[0]).addr, 0x100);
        assert_eq!(kind_at(&g, 0x103), NodeKind::If);

        let switch = g.node_at(0x10B).unwrap();
        assert_eq!(switch.kind, NodeKind::Switch);
        assert_eq!(switch.cases, vec![0, 1, 2, 3]);
        let targets: Vec<u32> = switch.edges.iter().map(|e| g.node(*e).addr).collect();
        assert_eq!(targets, vec![0x120, 0x130, 0x140, 0x150]);

        let end = g.end.unwrap();
        for addr in [0x120, 0x130, 0x140, 0x150, 0x160] {
            let case = g.node_at(addr).unwrap();
            assert_eq!(case.kind, NodeKind::Block);
            assert_eq!(case.edges, vec![end]);
        }

        // The block after the bounds check holds the two NOPs and falls into the switch.
        let body = g.node_at(0x108).unwrap();
        assert!(body.instructions.iter().all(|i| i.mnemonic == Mnemonic::Nop));
        assert_eq!(body.edges, vec![switch.id]);

        // The default jump is implicit in its block's edge.
        let default = g.node_at(0x105).unwrap();
        assert!(default.instructions.is_empty());
        assert_eq!(g.node(default.edges[0]).addr, 0x160);

        // Every instruction sits in some node, except the implicit jump.
        let mut placed: Vec<u32> = g
            .nodes
            .iter()
            .flat_map(|n| n.instructions.iter().map(|i| i.addr))
            .collect();
        placed.push(0x105);
        placed.sort_unstable();
        let all: Vec<u32> = d.instructions.iter().map(|i| i.addr).collect();
        assert_eq!(placed, all);
    }

    #[test]
    fn test_biased_range_dispatch() {
        let mut code = vec![0xCC; 0x43];
        let mut put = |off: usize, bytes: &[u8]| {
            code[off - 0x100..off - 0x100 + bytes.len()].copy_from_slice(bytes);
        };
        put(0x100, &[0x2D, 0x05, 0x00]); // sub ax, 5
        put(0x103, &[0x3D, 0x02, 0x00]); // cmp ax, 2
        put(0x106, &[0x77, 0x38]); // ja 0x140
        put(0x108, &[0x01, 0xC0]); // add ax, ax
        put(0x10A, &[0x93]); // xchg ax, bx
        put(0x10B, &[0x2E, 0xFF, 0xA7, 0x10, 0x01]); // jmp cs:[bx+0x110]
        put(0x110, &[0x20, 0x01, 0x28, 0x01, 0x30, 0x01]);
        put(0x120, &[0xB8, 0x00, 0x00, 0xC3]); // mov ax, 0 ; ret
        put(0x128, &[0xB8, 0x01, 0x00, 0xCB]); // mov ax, 1 ; retf
        put(0x130, &[0xB8, 0x02, 0x00, 0xCF]); // mov ax, 2 ; iret
        put(0x140, &[0x31, 0xC0, 0xC3]); // xor ax, ax ; ret
        let (d, g) = build(&code, 0x100);

        let sw = d.find(0x10B).unwrap();
        assert_eq!(sw.mnemonic, Mnemonic::Switch);
        assert!(sw.to_string().contains("switch ax, 0: 0x0120, 1: 0x0128, 2: 0x0130"));
        assert_eq!(d.find(0x108).unwrap().mnemonic, Mnemonic::Nop);
        assert_eq!(d.find(0x10A).unwrap().mnemonic, Mnemonic::Nop);
        assert_eq!(d.find(0x140).unwrap().mnemonic, Mnemonic::Xor);
        assert!(d.unresolved.is_empty());

        assert_eq!(kind_at(&g, 0x106), NodeKind::If);
        assert_eq!(g.node_at(0x10B).unwrap().cases, vec![0, 1, 2]);
        assert_eq!(g.count(NodeKind::End), 1);
        let end = g.end.unwrap();
        for addr in [0x120, 0x128, 0x130, 0x140] {
            let body = g.node_at(addr).unwrap();
            assert_eq!(body.kind, NodeKind::Block);
            assert_eq!(body.edges, vec![end], "{addr:#x} should link to end");
        }
        let returns: Vec<Mnemonic> = [0x123, 0x12B, 0x133]
            .into_iter()
            .map(|a| d.find(a).unwrap().mnemonic)
            .collect();
        assert_eq!(returns, vec![Mnemonic::Ret, Mnemonic::Retf, Mnemonic::Iret]);
    }

    #[test]
    fn test_if_split() {
        let code = [
            0x39, 0xD8, // 100: cmp ax, bx
            0x74, 0x04, // 102: je 0x108
            0xB9, 0x01, 0x00, // 104: mov cx, 1
            0xC3, // 107: ret
            0xB9, 0x02, 0x00, // 108: mov cx, 2
            0xC3, // 10b: ret
        ];
        let (_, mut g) = build(&code, 0x100);
        locals::annotate(&mut g).unwrap();

        let cmp = g.node_at(0x100).unwrap();
        assert_eq!(cmp.kind, NodeKind::Block);
        assert_eq!(cmp.instructions.len(), 1);
        assert_eq!(cmp.required, Locals::AX | Locals::BX);
        assert!(cmp.defined.contains(Locals::FLAGS));

        let je = g.node_at(0x102).unwrap();
        assert_eq!(je.kind, NodeKind::If);
        assert_eq!(je.required, Locals::ZF);
        let children: Vec<u32> = je.edges.iter().map(|e| g.node(*e).addr).collect();
        assert_eq!(children, vec![0x108, 0x104]);
        for addr in children {
            let child = g.node_at(addr).unwrap();
            assert_eq!(child.kind, NodeKind::Block);
            assert_eq!(child.edges, vec![g.end.unwrap()]);
            assert!(child.defined.contains(Locals::CX));
        }
        assert_eq!(g.count(NodeKind::End), 1);
    }

    #[test]
    fn test_loop_back_edge() {
        let code = [
            0xB9, 0x03, 0x00, // 100: mov cx, 3
            0x40, // 103: inc ax
            0xE2, 0xFD, // 104: loop 0x103
            0xC3, // 106: ret
        ];
        let (_, g) = build(&code, 0x100);
        let head = g.node_at(0x100).unwrap();
        let body = g.node_at(0x103).unwrap();
        let lp = g.node_at(0x104).unwrap();
        assert_eq!(head.edges, vec![body.id]);
        assert_eq!(body.edges, vec![lp.id]);
        assert_eq!(lp.kind, NodeKind::If);
        assert_eq!(lp.edges[0], body.id);
        assert_eq!(g.node(lp.edges[1]).addr, 0x106);
        assert_eq!(g.predecessors(body.id), vec![head.id, lp.id]);
        assert_eq!(g.count(NodeKind::Block), 3);
    }

    #[test]
    fn test_exit_and_unresolved() {
        // mov ah, 4c ; int 21
        let (_, g) = build(&[0xB4, 0x4C, 0xCD, 0x21], 0x100);
        let block = g.node_at(0x100).unwrap();
        assert_eq!(block.instructions.len(), 2);
        assert_eq!(block.edges, vec![g.end.unwrap()]);
        assert_eq!(g.node(g.end.unwrap()).addr, 0x102);

        // jmp bx
        let (_, g) = build(&[0xFF, 0xE3], 0x100);
        let block = g.node_at(0x100).unwrap();
        assert_eq!(block.instructions.len(), 1);
        assert!(block.edges.is_empty());
        assert_eq!(g.unresolved, vec![0x100]);
        assert!(g.end.is_none());
    }

    #[test]
    fn test_synthetic_entry_jump_is_skipped() {
        // 100: inc ax ; ret ; 102: jmp 100
        let (d, g) = build(&[0x40, 0xC3, 0xEB, 0xFC], 0x102);
        assert!(d.instructions[0].is_synthetic());
        let start = g.node(g.start);
        let entry = g.node(start.edges[0]);
        assert_eq!(entry.addr, 0x102);
        assert!(entry.instructions.is_empty());
        let target = g.node(entry.edges[0]);
        assert_eq!(target.addr, 0x100);
        assert_eq!(target.instructions[0].mnemonic, Mnemonic::Inc);
    }

    #[test]
    fn test_required_uses_running_defined() {
        // mov ax, ax ; mov bx, ax ; ret
        let (_, mut g) = build(&[0x89, 0xC0, 0x89, 0xC3, 0xC3], 0x100);
        locals::annotate(&mut g).unwrap();
        let block = g.node_at(0x100).unwrap();
        assert!(block.required.contains(Locals::AX));
        assert!(!block.required.intersects(Locals::BX));
        assert!(block.defined.contains(Locals::AX | Locals::BX | Reg::Sp.locals()));
    }

    #[test]
    fn test_isomorphic_rebuild() {
        let (d, g1) = build(&dispatch_program(), 0x100);
        let g2 = FlowGraph::build(&d).unwrap();
        assert_eq!(g1, g2);
    }
}
