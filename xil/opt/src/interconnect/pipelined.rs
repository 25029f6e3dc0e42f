use super::{HClustConfig, HClustInterconnectBuilder, InterconnectBuilder, prepare};
use crate::analysis::plan_pipe;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, BTreeSet};
use xil_ir::{Flow, FlowMatrix, Interconnect, ParFlow, SignalRef, TimedFlow};
use xil_utils::XilResult;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelinedConfig {
    /// Configuration of the clustering that binds the pipe stages.
    pub hclust: HClustConfig,
}

/// Keeps multiplexers narrow by moving values through pipes.
///
/// Every transport from a source to its sinks across `k > 0` steps is
/// replaced by a chain of one-step hops through fresh stage temporaries. The
/// transports of one source with the same delay form a pipe whose stages
/// shift together, so that the clustering builder, which binds the stages,
/// finds a shift register per pipe. Values stored from constants are driven
/// directly at the step they are read.
pub struct PipelinedInterconnectBuilder {
    config: PipelinedConfig,
    /// Pipe network of the last specification: edges are labelled with the
    /// step at which they carry a value.
    graph: DiGraph<SignalRef, usize>,
    nodes: BTreeMap<SignalRef, NodeIndex>,
}

impl PipelinedInterconnectBuilder {
    pub fn new(config: PipelinedConfig) -> Self {
        Self {
            config,
            graph: DiGraph::new(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn graph(&self) -> &DiGraph<SignalRef, usize> {
        &self.graph
    }

    fn node(&mut self, signal: SignalRef) -> NodeIndex {
        if let Some(node) = self.nodes.get(&signal) {
            return *node;
        }
        let node = self.graph.add_node(signal);
        self.nodes.insert(signal, node);
        node
    }

    fn connect(&mut self, from: SignalRef, to: SignalRef, step: usize) {
        let (a, b) = (self.node(from), self.node(to));
        self.graph.add_edge(a, b, step);
    }

    /// Rewrite `spec` into an equivalent specification in which every
    /// temporary is a pipe stage that holds one value between two shifts.
    pub fn split_transports(&mut self, spec: &FlowMatrix) -> XilResult<FlowMatrix> {
        let (spec, lifetimes) = prepare(spec)?;
        self.graph.clear();
        self.nodes.clear();

        let mut out = FlowMatrix::new();
        for flow in spec.neutral_flow().iter() {
            out.add_neutral(flow.clone());
        }
        for step in 0..spec.num_csteps() {
            out.add_par(step, &ParFlow::new());
            if let Some(comment) = spec.comment(step) {
                out.append_comment(step, comment);
            }
        }

        // Sinks of every departure, per source and delay.
        let mut pipes: BTreeMap<(SignalRef, usize), BTreeMap<usize, Vec<SignalRef>>> =
            BTreeMap::new();
        for tf in spec.get_timed_flows()? {
            match tf {
                TimedFlow::Signal {
                    time,
                    source,
                    target,
                    delay,
                } if delay > 0 => {
                    pipes
                        .entry((source, delay))
                        .or_default()
                        .entry(time)
                        .or_default()
                        .push(target);
                }
                TimedFlow::Signal {
                    time,
                    source,
                    target,
                    ..
                } => out.add(time, Flow::signal(source, target)),
                TimedFlow::Value {
                    time,
                    value,
                    target,
                } => out.add(time, Flow::value(value, target)),
            }
        }

        let mut fresh = lifetimes.max_index().map_or(0, |t| t + 1);
        for ((source, delay), departures) in pipes {
            let plan = plan_pipe(&departures.keys().copied().collect::<BTreeSet<_>>(), delay);
            log::debug!(
                "pipe from {source} with delay {delay}: {} departures, {} stages",
                departures.len(),
                plan.capacity
            );
            for (departure, sinks) in departures {
                let strobes = plan
                    .strobes
                    .range(departure + 1..departure + delay)
                    .copied()
                    .collect::<Vec<_>>();
                debug_assert_eq!(strobes.len() + 1, plan.capacity);
                let stages = (0..=strobes.len())
                    .map(|i| SignalRef::temporary(fresh + i, source.ty))
                    .collect::<Vec<_>>();
                fresh += stages.len();

                out.add(departure, Flow::signal(source, stages[0]));
                self.connect(source, stages[0], departure);
                for (k, strobe) in strobes.iter().enumerate() {
                    out.add(*strobe, Flow::signal(stages[k], stages[k + 1]));
                    self.connect(stages[k], stages[k + 1], *strobe);
                }
                let last = stages[stages.len() - 1];
                for sink in sinks {
                    out.add(departure + delay, Flow::signal(last, sink));
                    self.connect(last, sink, departure + delay);
                }
            }
        }
        Ok(out)
    }
}

impl InterconnectBuilder for PipelinedInterconnectBuilder {
    fn create_interconnect(
        &mut self,
        spec: &FlowMatrix,
        detailed: &mut FlowMatrix,
    ) -> XilResult<Interconnect> {
        let pipes = self.split_transports(spec)?;
        HClustInterconnectBuilder::new(self.config.hclust).create_interconnect(&pipes, detailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interconnect::testing::{bit, relay, tmp};
    use crate::interconnect::verify_interconnect;

    fn build(spec: &FlowMatrix) -> (PipelinedInterconnectBuilder, Interconnect) {
        let mut builder = PipelinedInterconnectBuilder::new(PipelinedConfig::default());
        let mut detailed = FlowMatrix::new();
        let ic = builder.create_interconnect(spec, &mut detailed).unwrap();
        verify_interconnect(spec, &detailed, &ic).unwrap();
        (builder, ic)
    }

    #[test]
    fn constants_need_no_storage() {
        let (builder, ic) = build(&relay());
        assert!(ic.registers.is_empty());
        assert_eq!(builder.graph().edge_count(), 0);
    }

    #[test]
    fn lone_transport_uses_one_stage() {
        let mut spec = FlowMatrix::new();
        spec.add(0, Flow::signal(bit("a"), tmp(0)));
        spec.add(3, Flow::signal(tmp(0), bit("b")));
        let (builder, ic) = build(&spec);
        assert_eq!(ic.registers.len(), 1);
        assert_eq!(builder.graph().node_count(), 3);
        assert_eq!(builder.graph().edge_count(), 2);
    }

    #[test]
    fn overlapping_transports_shift_together() {
        let mut spec = FlowMatrix::new();
        spec.add(0, Flow::signal(bit("a"), tmp(0)));
        spec.add(1, Flow::signal(bit("a"), tmp(1)));
        spec.add(4, Flow::signal(tmp(0), bit("b")));
        spec.add(5, Flow::signal(tmp(1), bit("c")));
        // The same value is also used right away.
        spec.add(0, Flow::signal(bit("a"), bit("d")));
        let mut builder = PipelinedInterconnectBuilder::new(PipelinedConfig::default());
        let pipes = builder.split_transports(&spec).unwrap();
        assert_eq!(
            pipes.step_flow(0).unwrap().get(&bit("d")),
            Some(&Flow::signal(bit("a"), bit("d")))
        );
        for (_, par) in pipes.steps() {
            for flow in par.iter() {
                if let Some(src) = flow.source().filter(|s| s.is_temporary()) {
                    // Stage temporaries are fresh.
                    assert!(src.temporary_index().unwrap() > 1);
                }
            }
        }
        let (_, ic) = build(&spec);
        assert!(!ic.registers.is_empty());
    }
}
