//! Text renderings of disassemblies and flow graphs.

use std::fmt::{self, Display};

use dosdc_cfg::{Disassembly, FlowGraph, Liveness, Node, NodeKind, UnresolvedReason};

/// Sorted instruction listing with labels and annotations.
pub struct Listing<'a>(pub &'a Disassembly);

impl Display for Listing<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.0;
        writeln!(f, "; function {}", d.entry)?;
        for instr in &d.instructions {
            if instr.is_synthetic() {
                writeln!(f, "  {}  {:<32}; entry", instr.at, instr.to_string())?;
                continue;
            }
            if d.is_label(instr.addr) {
                writeln!(f, "L{:05X}:", instr.addr)?;
            }
            let note = match d.unresolved_at(instr.addr).map(|u| u.reason) {
                Some(UnresolvedReason::UnrecognizedDispatch) => "; unresolved dispatch",
                Some(UnresolvedReason::ExternalTarget) => "; external",
                None if d.is_exit(instr.addr) => "; exit",
                None => "",
            };
            if note.is_empty() {
                writeln!(f, "  {}  {instr}", instr.at)?;
            } else {
                writeln!(f, "  {}  {:<32}{note}", instr.at, instr.to_string())?;
            }
        }
        for callee in &d.callees {
            writeln!(f, "; calls {callee}")?;
        }
        Ok(())
    }
}

/// Flow graph nodes with their locals, and optionally liveness.
pub struct GraphDump<'a> {
    pub graph: &'a FlowGraph,
    pub liveness: Option<&'a Liveness>,
}

impl<'a> GraphDump<'a> {
    pub const fn new(graph: &'a FlowGraph) -> Self {
        Self {
            graph,
            liveness: None,
        }
    }

    #[must_use]
    pub const fn with_liveness(mut self, liveness: &'a Liveness) -> Self {
        self.liveness = Some(liveness);
        self
    }

    fn fmt_edges(node: &Node, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if node.edges.is_empty() {
            return Ok(());
        }
        f.write_str("    ->")?;
        for (i, edge) in node.edges.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            match node.cases.get(i) {
                Some(value) if node.kind == NodeKind::Switch => write!(f, "{sep}{value}: {edge}")?,
                _ => write!(f, "{sep}{edge}")?,
            }
        }
        writeln!(f)
    }
}

impl Display for GraphDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.graph;
        writeln!(f, "; graph {} ({} nodes)", g.entry, g.len())?;
        for node in &g.nodes {
            match node.kind {
                NodeKind::Start | NodeKind::End => writeln!(f, "{} {}", node.id, node.kind)?,
                _ => writeln!(
                    f,
                    "{} {} {:#07x}  req: {}  def: {}",
                    node.id, node.kind, node.addr, node.required, node.defined
                )?,
            }
            if let Some(live) = self.liveness {
                writeln!(
                    f,
                    "    in: {}  out: {}",
                    live.live_in(node.id),
                    live.live_out(node.id)
                )?;
            }
            for instr in &node.instructions {
                writeln!(f, "    {}  {instr}", instr.at)?;
            }
            Self::fmt_edges(node, f)?;
        }
        Ok(())
    }
}
