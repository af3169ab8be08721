//! Function discovery pipeline - image → disassembly → flow graph → locals.

use std::collections::{BTreeMap, BTreeSet};

use dosdc_cfg::{Disassembler, Disassembly, FlowGraph, SwitchTemplate, locals};
use dosdc_exe::Image;
use dosdc_isa::SegOff;
use rayon::prelude::*;
use tracing::{debug, info_span, warn};

use crate::{EngineConfig, Error, Result};

/// Pipeline configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub engine: EngineConfig,
    /// Analyze direct call targets as functions of their own.
    pub follow_calls: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
            follow_calls: true,
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub const fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    #[must_use]
    pub const fn with_follow_calls(mut self, follow: bool) -> Self {
        self.follow_calls = follow;
        self
    }
}

/// One analyzed function.
#[derive(Clone, Debug)]
pub struct Function {
    pub disassembly: Disassembly,
    /// Flow graph with `required`/`defined` filled in.
    pub graph: FlowGraph,
}

impl Function {
    pub const fn entry(&self) -> SegOff {
        self.disassembly.entry
    }
}

/// A function whose analysis failed.
#[derive(Debug)]
pub struct Failure {
    pub entry: SegOff,
    pub error: Error,
}

/// Summary counts over a pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub functions: usize,
    pub failures: usize,
    pub instructions: usize,
    pub nodes: usize,
    pub switches: usize,
    pub unresolved: usize,
}

/// Whole-program analysis driver.
pub struct Pipeline {
    pub image: Image,
    config: PipelineConfig,
    /// Analyzed functions keyed by linear entry address.
    pub functions: BTreeMap<u32, Function>,
    pub failures: Vec<Failure>,
    disassembler: Disassembler,
    visited: BTreeSet<u32>,
}

impl Pipeline {
    pub fn new(image: Image, config: PipelineConfig) -> Self {
        Self {
            image,
            config,
            functions: BTreeMap::new(),
            failures: Vec::new(),
            disassembler: Disassembler::new(config.engine),
            visited: BTreeSet::new(),
        }
    }

    /// Register an additional switch template, tried after the built-in ones.
    pub fn add_template(&mut self, template: impl SwitchTemplate + 'static) {
        self.disassembler = std::mem::take(&mut self.disassembler).with_template(template);
    }

    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub const fn disassembler(&self) -> &Disassembler {
        &self.disassembler
    }

    /// Disassemble, build and annotate one function.
    pub fn analyze(&self, entry: SegOff) -> Result<Function> {
        let disassembly = self.disassembler.disassemble(&self.image, entry)?;
        let mut graph = FlowGraph::build(&disassembly)?;
        locals::annotate(&mut graph)?;
        Ok(Function { disassembly, graph })
    }

    /// Analyze `entries` and, when following calls, everything they reach.
    ///
    /// Work proceeds in waves: each wave is analyzed in parallel and its
    /// unvisited callees form the next one. Entries already seen by an earlier
    /// run are skipped.
    pub fn run(&mut self, entries: impl IntoIterator<Item = SegOff>) {
        let _span = info_span!("pipeline").entered();
        let mut wave: Vec<SegOff> = entries
            .into_iter()
            .filter(|e| self.visited.insert(e.linear()))
            .collect();

        let mut round = 0usize;
        while !wave.is_empty() {
            round += 1;
            debug!(round, functions = wave.len(), "analyzing wave");
            let results: Vec<(SegOff, Result<Function>)> = wave
                .par_iter()
                .map(|&entry| (entry, self.analyze(entry)))
                .collect();

            let mut next = Vec::new();
            for (entry, result) in results {
                match result {
                    Ok(function) => {
                        if self.config.follow_calls {
                            for callee in &function.disassembly.callees {
                                if self.visited.insert(callee.linear()) {
                                    next.push(*callee);
                                }
                            }
                        }
                        self.functions.insert(entry.linear(), function);
                    }
                    Err(error) => {
                        warn!(function = %entry, error = %error, "function analysis failed");
                        self.failures.push(Failure { entry, error });
                    }
                }
            }
            wave = next;
        }
        self.failures.sort_by_key(|f| f.entry.linear());
    }

    pub fn function(&self, entry: SegOff) -> Option<&Function> {
        self.functions.get(&entry.linear())
    }

    pub fn stats(&self) -> PipelineStats {
        let mut stats = PipelineStats {
            functions: self.functions.len(),
            failures: self.failures.len(),
            ..PipelineStats::default()
        };
        for function in self.functions.values() {
            let d = &function.disassembly;
            stats.instructions += d.len();
            stats.nodes += function.graph.len();
            stats.switches += d.switches().count();
            stats.unresolved += d.unresolved.len();
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn com(code: &[u8]) -> Image {
        Image::parse_com(code).unwrap()
    }

    #[test]
    fn test_single_function() {
        let mut pipeline = Pipeline::new(com(&[0x40, 0xC3]), PipelineConfig::default());
        let entry = pipeline.image.entry;
        pipeline.run([entry]);
        let f = pipeline.function(entry).unwrap();
        assert_eq!(f.entry(), entry);
        assert_eq!(f.disassembly.len(), 2);
        assert!(f.graph.end.is_some());
        assert!(pipeline.failures.is_empty());
    }

    #[test]
    fn test_rerun_skips_visited() {
        let mut pipeline = Pipeline::new(com(&[0xC3]), PipelineConfig::default());
        let entry = pipeline.image.entry;
        pipeline.run([entry, entry]);
        pipeline.run([entry]);
        assert_eq!(pipeline.functions.len(), 1);
    }

    #[test]
    fn test_stats() {
        // call 0x104 ; ret ; 104: ret
        let image = com(&[0xE8, 0x01, 0x00, 0xC3, 0xC3]);
        let mut pipeline = Pipeline::new(image, PipelineConfig::default());
        pipeline.run([pipeline.image.entry]);
        let stats = pipeline.stats();
        assert_eq!(stats.functions, 2);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.instructions, 3);
        assert_eq!(stats.switches, 0);
    }
}
