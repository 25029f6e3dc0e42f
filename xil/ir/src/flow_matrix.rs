//! Time-indexed dataflow specification consumed by interconnect synthesis.
use crate::{Flow, ParFlow, SignalRef, StdLogic, TimedFlow, Value};
use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt::Write;
use xil_utils::{Error, XilResult};

/// Per-control-step flow sets plus a neutral layer that is active at every
/// step unless a step flow drives the same target.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowMatrix {
    steps: Vec<ParFlow>,
    comments: Vec<String>,
    neutral: ParFlow,
}

/// Source of a temporary's current value during [FlowMatrix::get_timed_flows].
#[derive(Clone)]
enum Origin {
    Signal { source: SignalRef, time: usize },
    Value(Value),
}

impl FlowMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_step(&mut self, step: usize) {
        if self.steps.len() <= step {
            self.steps.resize_with(step + 1, ParFlow::new);
            self.comments.resize_with(step + 1, String::new);
        }
    }

    /// Add `flow` at `step`, replacing any flow to the same target.
    pub fn add(&mut self, step: usize, flow: Flow) {
        self.ensure_step(step);
        self.steps[step].add(flow);
    }

    pub fn add_par(&mut self, step: usize, par: &ParFlow) {
        self.ensure_step(step);
        for flow in par.iter() {
            self.steps[step].add(flow.clone());
        }
    }

    pub fn add_neutral(&mut self, flow: Flow) {
        self.neutral.add(flow);
    }

    pub fn remove(&mut self, step: usize, target: &SignalRef) -> Option<Flow> {
        self.steps.get_mut(step).and_then(|par| par.remove(target))
    }

    /// The flows active at `step`: the neutral layer overridden by the step
    /// flows.
    pub fn get_flow(&self, step: usize) -> ParFlow {
        let mut par = self.neutral.clone();
        if let Some(step) = self.steps.get(step) {
            for flow in step.iter() {
                par.add(flow.clone());
            }
        }
        par
    }

    /// The flows added at `step`, without the neutral layer.
    pub fn step_flow(&self, step: usize) -> Option<&ParFlow> {
        self.steps.get(step)
    }

    pub fn steps(&self) -> impl Iterator<Item = (usize, &ParFlow)> {
        self.steps.iter().enumerate()
    }

    pub fn neutral_flow(&self) -> &ParFlow {
        &self.neutral
    }

    pub fn num_csteps(&self) -> usize {
        self.steps.len()
    }

    pub fn append_comment(&mut self, step: usize, comment: &str) {
        self.ensure_step(step);
        let text = &mut self.comments[step];
        if !text.is_empty() {
            text.push_str("; ");
        }
        text.push_str(comment);
    }

    pub fn comment(&self, step: usize) -> Option<&str> {
        self.comments
            .get(step)
            .map(String::as_str)
            .filter(|c| !c.is_empty())
    }

    fn all_flows(&self) -> impl Iterator<Item = &Flow> {
        self.neutral.iter().chain(self.steps.iter().flat_map(ParFlow::iter))
    }

    /// Every distinct flow target, including those of the neutral layer.
    pub fn flow_targets(&self) -> BTreeSet<SignalRef> {
        self.all_flows().map(Flow::target).collect()
    }

    /// Every distinct signal source, including those of the neutral layer.
    pub fn flow_sources(&self) -> BTreeSet<SignalRef> {
        self.all_flows().filter_map(Flow::source).collect()
    }

    /// Flows that drive `target`, with their step. `None` denotes the neutral
    /// layer.
    pub fn flows_to(&self, target: &SignalRef) -> Vec<(Option<usize>, &Flow)> {
        let neutral = self.neutral.get(target).map(|f| (None, f));
        neutral
            .into_iter()
            .chain(
                self.steps
                    .iter()
                    .enumerate()
                    .filter_map(|(i, par)| par.get(target).map(|f| (Some(i), f))),
            )
            .collect()
    }

    /// Close one flow graph under transitivity.
    fn transitize_graph(graph: &ParFlow) -> XilResult<ParFlow> {
        let mut out = ParFlow::new();
        for flow in graph.iter() {
            let Flow::Signal(sf) = flow else {
                out.add(flow.clone());
                continue;
            };
            let target = sf.target;
            let mut visited = HashSet::from([target]);
            let mut cur = sf.source;
            let resolved = loop {
                if !visited.insert(cur) {
                    return Err(Error::cyclic_dataflow(format!(
                        "flow to {target} resolves back through {cur}"
                    ))
                    .at_signal(target.to_string()));
                }
                match graph.get(&cur) {
                    Some(Flow::Signal(up)) => cur = up.source,
                    Some(Flow::Value(up)) => break Flow::value(up.value.clone(), target),
                    None => break Flow::signal(cur, target),
                }
            };
            out.add(resolved);
        }
        Ok(out)
    }

    /// Replace chains of signal flows within each step, and within the neutral
    /// layer, by direct flows from the first source. Fails on a combinational
    /// cycle.
    pub fn transitize(&mut self) -> XilResult<()> {
        for (step, par) in self.steps.iter_mut().enumerate() {
            *par = Self::transitize_graph(par).map_err(|e| e.at_cstep(step))?;
        }
        self.neutral = Self::transitize_graph(&self.neutral)?;
        Ok(())
    }

    /// Flatten the step flows into absolutely timed flows between concrete
    /// signals. A chain that writes a temporary at step `t` and reads it at
    /// step `t + k` becomes one flow that departs at `t` with delay `k`. A
    /// constant stored in a temporary is emitted at the step it is read.
    ///
    /// The matrix is expected to be transitized. A temporary that is read
    /// without an earlier write is a malformed schedule.
    pub fn get_timed_flows(&self) -> XilResult<Vec<TimedFlow>> {
        let mut origins: BTreeMap<usize, Origin> = BTreeMap::new();
        let mut timed = Vec::new();
        for (step, par) in self.steps.iter().enumerate() {
            let mut writes = Vec::new();
            for flow in par.iter() {
                let origin = match flow {
                    Flow::Value(vf) => Origin::Value(vf.value.clone()),
                    Flow::Signal(sf) => match sf.source.temporary_index() {
                        Some(t) => origins.get(&t).cloned().ok_or_else(|| {
                            Error::malformed_schedule(format!(
                                "{} is read before it is written",
                                sf.source
                            ))
                            .at_temporary(t)
                            .at_cstep(step)
                        })?,
                        None => Origin::Signal {
                            source: sf.source,
                            time: step,
                        },
                    },
                };
                let target = flow.target();
                if let Some(t) = target.temporary_index() {
                    writes.push((t, origin));
                    continue;
                }
                timed.push(match origin {
                    Origin::Signal { source, time } => TimedFlow::Signal {
                        time,
                        source,
                        target,
                        delay: step - time,
                    },
                    Origin::Value(value) => TimedFlow::Value {
                        time: step,
                        value,
                        target,
                    },
                });
            }
            origins.extend(writes);
        }
        Ok(timed)
    }

    /// A flow that does not care about the value of `target`.
    pub fn create_dont_care_flow(target: SignalRef) -> Flow {
        Flow::value(Value::dont_care(target.ty), target)
    }

    pub fn is_dont_care_flow(flow: &Flow) -> bool {
        matches!(flow, Flow::Value(vf) if vf.value.is_dont_care())
    }

    fn map_all<F>(&mut self, mut f: F)
    where
        F: FnMut(&Flow) -> Option<Flow>,
    {
        self.neutral = self.neutral.map(&mut f);
        for par in self.steps.iter_mut() {
            *par = par.map(&mut f);
        }
    }

    /// Replace every don't-care flow by another flow that drives the same
    /// target somewhere in the matrix, or by zeros if there is none.
    pub fn replace_dont_cares(&mut self) {
        let mut subst: BTreeMap<SignalRef, Flow> = BTreeMap::new();
        for flow in self.all_flows() {
            if !Self::is_dont_care_flow(flow) {
                subst.entry(flow.target()).or_insert_with(|| flow.clone());
            }
        }
        self.map_all(|flow| match flow {
            Flow::Value(vf) if vf.value.is_dont_care() => {
                Some(subst.get(&vf.target).cloned().unwrap_or_else(|| {
                    Flow::value(vf.value.filled_like(StdLogic::Zero), vf.target)
                }))
            }
            _ => Some(flow.clone()),
        });
    }

    pub fn replace_dont_cares_by_tri_states(&mut self) {
        self.map_all(|flow| match flow {
            Flow::Value(vf) if vf.value.is_dont_care() => {
                Some(Flow::value(vf.value.filled_like(StdLogic::Z), vf.target))
            }
            _ => Some(flow.clone()),
        });
    }

    pub fn remove_dont_cares(&mut self) {
        self.map_all(|flow| (!Self::is_dont_care_flow(flow)).then(|| flow.clone()));
    }

    /// Distinct flows per target over the whole matrix.
    fn mux_inputs(&self) -> BTreeMap<SignalRef, BTreeSet<&Flow>> {
        let mut inputs: BTreeMap<SignalRef, BTreeSet<&Flow>> = BTreeMap::new();
        for flow in self.all_flows() {
            inputs.entry(flow.target()).or_default().insert(flow);
        }
        inputs
    }

    /// Every target with its distinct inputs, highest fan-in first.
    pub fn mux_report(&self) -> String {
        let mut out = String::new();
        let inputs = self.mux_inputs();
        for (target, flows) in inputs
            .iter()
            .sorted_by(|(ta, fa), (tb, fb)| fb.len().cmp(&fa.len()).then(ta.cmp(tb)))
        {
            let _ = writeln!(out, "MUX target {target}, fan-in: {}", flows.len());
            for flow in flows {
                let _ = writeln!(out, "  {flow}");
            }
        }
        out
    }

    /// Number of targets per fan-in, as `fanin;count;` lines.
    pub fn mux_histogram(&self) -> String {
        let mut histogram: BTreeMap<usize, usize> = BTreeMap::new();
        for flows in self.mux_inputs().values() {
            *histogram.entry(flows.len()).or_default() += 1;
        }
        histogram
            .into_iter()
            .map(|(fanin, count)| format!("{fanin};{count};\n"))
            .collect()
    }

    pub fn timed_flow_report(&self) -> XilResult<String> {
        Ok(self
            .get_timed_flows()?
            .iter()
            .map(|tf| format!("{tf}\n"))
            .collect())
    }

    pub fn flow_report(&self) -> String {
        let mut out = String::from("neutral:\n");
        let _ = write!(out, "{}", self.neutral);
        for (step, par) in self.steps.iter().enumerate() {
            match self.comment(step) {
                Some(comment) => {
                    let _ = writeln!(out, "{step}: -- {comment}");
                }
                None => {
                    let _ = writeln!(out, "{step}:");
                }
            }
            let _ = write!(out, "{par}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{StdLogicVector, Type};

    fn sig(name: &str) -> SignalRef {
        SignalRef::signal(name, Type::Unsigned(4))
    }

    fn tmp(idx: usize) -> SignalRef {
        SignalRef::temporary(idx, Type::Unsigned(4))
    }

    #[test]
    fn aggregate_overrides_neutral() {
        let mut fm = FlowMatrix::new();
        fm.add_neutral(Flow::signal(sig("a"), sig("x")));
        fm.add_neutral(Flow::signal(sig("a"), sig("y")));
        fm.add(1, Flow::signal(sig("b"), sig("x")));
        assert_eq!(fm.num_csteps(), 2);
        let agg = fm.get_flow(1);
        assert_eq!(agg.get(&sig("x")), Some(&Flow::signal(sig("b"), sig("x"))));
        assert_eq!(agg.get(&sig("y")), Some(&Flow::signal(sig("a"), sig("y"))));
        assert_eq!(fm.step_flow(1).map(ParFlow::len), Some(1));
        assert_eq!(fm.get_flow(0).len(), 2);
    }

    #[test]
    fn transitize_collapses_chains() {
        let mut fm = FlowMatrix::new();
        fm.add(0, Flow::signal(sig("a"), sig("b")));
        fm.add(0, Flow::signal(sig("b"), sig("c")));
        fm.add(0, Flow::value(Value::Int(3), sig("d")));
        fm.add(0, Flow::signal(sig("d"), sig("e")));
        fm.transitize().unwrap();
        let step = fm.step_flow(0).unwrap();
        assert_eq!(step.get(&sig("c")), Some(&Flow::signal(sig("a"), sig("c"))));
        assert_eq!(step.get(&sig("b")), Some(&Flow::signal(sig("a"), sig("b"))));
        assert_eq!(step.get(&sig("e")), Some(&Flow::value(Value::Int(3), sig("e"))));
        let once = fm.clone();
        fm.transitize().unwrap();
        assert_eq!(fm, once);
    }

    #[test]
    fn transitize_detects_cycles() {
        let mut fm = FlowMatrix::new();
        fm.add(2, Flow::signal(sig("a"), sig("b")));
        fm.add(2, Flow::signal(sig("b"), sig("a")));
        let err = fm.transitize().unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.cstep(), Some(2));
    }

    #[test]
    fn timed_flows_through_temporaries() {
        let mut fm = FlowMatrix::new();
        fm.add(1, Flow::signal(sig("a"), tmp(0)));
        fm.add(3, Flow::signal(tmp(0), sig("b")));
        fm.add(2, Flow::value(Value::Int(1), tmp(1)));
        fm.add(4, Flow::signal(tmp(1), sig("c")));
        let timed = fm.get_timed_flows().unwrap();
        assert_eq!(
            timed,
            vec![
                TimedFlow::Signal { time: 1, source: sig("a"), target: sig("b"), delay: 2 },
                TimedFlow::Value { time: 4, value: Value::Int(1), target: sig("c") },
            ]
        );
    }

    #[test]
    fn read_before_write_is_malformed() {
        let mut fm = FlowMatrix::new();
        fm.add(0, Flow::signal(tmp(5), sig("b")));
        let err = fm.get_timed_flows().unwrap_err();
        assert_eq!(err.temporary(), Some(5));
        assert_eq!(err.cstep(), Some(0));
    }

    #[test]
    fn dont_cares_take_existing_inputs() {
        let mut fm = FlowMatrix::new();
        fm.add_neutral(FlowMatrix::create_dont_care_flow(sig("x")));
        fm.add(0, Flow::signal(sig("a"), sig("x")));
        fm.add(1, FlowMatrix::create_dont_care_flow(sig("y")));
        fm.replace_dont_cares();
        assert_eq!(fm.neutral_flow().get(&sig("x")), Some(&Flow::signal(sig("a"), sig("x"))));
        assert_eq!(
            fm.step_flow(1).and_then(|p| p.get(&sig("y"))),
            Some(&Flow::value(Value::Vector(StdLogicVector::zeros(4)), sig("y")))
        );
        assert_eq!(fm.mux_histogram(), "1;2;\n");
    }

    #[test]
    fn mux_report_orders_by_fan_in() {
        let mut fm = FlowMatrix::new();
        fm.add(0, Flow::signal(sig("a"), sig("x")));
        fm.add(1, Flow::signal(sig("b"), sig("x")));
        fm.add(1, Flow::signal(sig("a"), sig("y")));
        assert_eq!(
            fm.mux_report(),
            "MUX target x, fan-in: 2\n  x <= a\n  x <= b\nMUX target y, fan-in: 1\n  y <= a\n"
        );
    }
}
