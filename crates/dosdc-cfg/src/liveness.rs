//! Whole-function liveness over an annotated flow graph.
//!
//! Kept apart from [`crate::locals`]: node annotations stay local, this pass
//! propagates them across edges.

use dosdc_isa::Locals;
use tracing::{trace, trace_span};

use crate::{FlowGraph, NodeId};

/// Live locals at the entry and exit of every node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Liveness {
    live_in: Vec<Locals>,
    live_out: Vec<Locals>,
}

impl Liveness {
    /// Backward dataflow to a fixpoint.
    ///
    /// `live_out(n)` is the union of `live_in` over the successors of `n`, and
    /// `live_in(n) = required(n) | (live_out(n) - defined(n))`.
    pub fn compute(graph: &FlowGraph) -> Self {
        let _span = trace_span!("liveness", function = %graph.entry).entered();
        let n = graph.nodes.len();
        let mut live_in = vec![Locals::empty(); n];
        let mut live_out = vec![Locals::empty(); n];

        let mut rounds = 0usize;
        let mut changed = true;
        while changed {
            changed = false;
            rounds += 1;
            for node in graph.nodes.iter().rev() {
                let i = node.id.0;
                let out = graph
                    .successors(node.id)
                    .iter()
                    .fold(Locals::empty(), |acc, s| acc | live_in[s.0]);
                let inn = node.required | (out - node.defined);
                if out != live_out[i] || inn != live_in[i] {
                    live_out[i] = out;
                    live_in[i] = inn;
                    changed = true;
                }
            }
        }
        trace!(rounds, "liveness converged");

        Self { live_in, live_out }
    }

    pub fn live_in(&self, id: NodeId) -> Locals {
        self.live_in[id.0]
    }

    pub fn live_out(&self, id: NodeId) -> Locals {
        self.live_out[id.0]
    }
}

#[cfg(test)]
mod tests {
    use dosdc_exe::Image;
    use dosdc_isa::SegOff;

    use super::*;
    use crate::{Disassembler, locals};

    fn analyze(code: &[u8]) -> (FlowGraph, Liveness) {
        let origin = SegOff::new(0, 0x100);
        let image = Image::from_bytecode(code.to_vec(), origin, origin);
        let d = Disassembler::standard().disassemble(&image, origin).unwrap();
        let mut g = FlowGraph::build(&d).unwrap();
        locals::annotate(&mut g).unwrap();
        let live = Liveness::compute(&g);
        (g, live)
    }

    fn id_at(g: &FlowGraph, addr: u32) -> NodeId {
        g.node_at(addr).unwrap().id
    }

    #[test]
    fn test_loop_carries_counter() {
        let (g, live) = analyze(&[
            0xB9, 0x03, 0x00, // 100: mov cx, 3
            0x40, // 103: inc ax
            0xE2, 0xFD, // 104: loop 0x103
            0xC3, // 106: ret
        ]);
        let head = id_at(&g, 0x100);
        let body = id_at(&g, 0x103);

        assert!(live.live_in(body).contains(Locals::AX | Locals::CX));
        assert!(live.live_out(head).contains(Locals::CX));
        assert!(live.live_in(head).contains(Locals::AX));
        assert!(!live.live_in(head).intersects(Locals::CX));
        assert_eq!(live.live_in(g.start), live.live_out(g.start));
        assert_eq!(live.live_in(g.end.unwrap()), Locals::empty());
    }

    #[test]
    fn test_branch_union() {
        let (g, live) = analyze(&[
            0x85, 0xC0, // 100: test ax, ax
            0x74, 0x03, // 102: je 0x107
            0x89, 0xD8, // 104: mov ax, bx
            0xC3, // 106: ret
            0x89, 0xC8, // 107: mov ax, cx
            0xC3, // 109: ret
        ]);
        let je = id_at(&g, 0x102);
        let out = live.live_out(je);
        assert!(out.contains(Locals::BX | Locals::CX));
        assert!(!out.intersects(Locals::AX));
        // TEST consumes AX and defines ZF, so ZF is not live on entry.
        let first = id_at(&g, 0x100);
        assert!(live.live_in(first).contains(Locals::AX | Locals::BX | Locals::CX));
        assert!(!live.live_in(first).intersects(Locals::ZF));
    }
}
