use super::{Binding, InterconnectBuilder, assemble, log_stats};
use crate::analysis::{IntervalSet, Lifetimes, UnionFind};
use std::collections::{BTreeMap, BTreeSet};
use xil_ir::{
    Flow, FlowMatrix, Interconnect, InterconnectStats, Memory, Register,
    SignalRef, SyncProcess, Type, Value,
};
use xil_utils::{Error, XilResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HClustConfig {
    /// Smallest number of register classes that are implemented as one
    /// memory.
    pub memory_threshold: usize,
}

impl Default for HClustConfig {
    fn default() -> Self {
        Self {
            memory_threshold: 800000,
        }
    }
}

/// A distinct input of a multiplexer.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Input {
    Signal(SignalRef),
    /// A temporary, compared by the class it belongs to.
    Temp(usize),
    Value(Value),
}

impl From<&Flow> for Input {
    fn from(flow: &Flow) -> Self {
        match flow {
            Flow::Signal(sf) => match sf.source.temporary_index() {
                Some(t) => Input::Temp(t),
                None => Input::Signal(sf.source),
            },
            Flow::Value(vf) => Input::Value(vf.value.clone()),
        }
    }
}

/// What a register class needs from the register it is bound to.
#[derive(Clone, Debug)]
struct Class {
    ty: Type,
    intervals: IntervalSet,
    /// Steps with a live write.
    writes: BTreeSet<usize>,
    reads: BTreeSet<usize>,
    /// Inputs of the register's multiplexer.
    inputs: BTreeSet<Input>,
    /// Concrete signals the register drives.
    sinks: BTreeSet<SignalRef>,
}

impl Class {
    fn absorb(&mut self, other: &Class) {
        self.intervals.add_set(&other.intervals);
        self.writes.extend(other.writes.iter().copied());
        self.reads.extend(other.reads.iter().copied());
        self.inputs.extend(other.inputs.iter().cloned());
        self.sinks.extend(other.sinks.iter().copied());
    }
}

/// Binds temporaries to registers by clustering temporaries with disjoint
/// lifetimes, and implements large groups of registers as memories.
///
/// Two temporaries of the same type share a register when their lifetimes
/// do not overlap and the merge does not make the register's multiplexer
/// wider than the wider of the two. A second, relaxed round also accepts a
/// merge when both drive a common sink and the merged multiplexer is no
/// wider than the widest sink either of them drives. Sink widths count
/// temporaries by their current class. Both rounds repeat until no merge is
/// found.
///
/// The builder runs as a sequence of steps that can also be driven one at a
/// time: [init](Self::init), [compute_lifetimes](Self::compute_lifetimes),
/// [do_clustering](Self::do_clustering),
/// [do_memory_clustering](Self::do_memory_clustering),
/// [instantiate_control_logic](Self::instantiate_control_logic) and
/// [assemble_flow_matrix](Self::assemble_flow_matrix).
pub struct HClustInterconnectBuilder {
    config: HClustConfig,
    spec: FlowMatrix,
    lifetimes: Lifetimes,
    /// Multiplexer inputs of every temporary and the sinks it drives.
    inputs: BTreeMap<usize, BTreeSet<Input>>,
    sinks: BTreeMap<usize, BTreeSet<SignalRef>>,
    /// Multiplexer inputs of every concrete sink.
    sink_inputs: BTreeMap<SignalRef, BTreeSet<Input>>,
    /// Live temporaries in ascending order. Positions in this list index
    /// `classes` and `uf`.
    temps: Vec<usize>,
    classes: Vec<Class>,
    uf: UnionFind,
    /// Register class representatives that share a memory.
    groups: Vec<Vec<usize>>,
    interconnect: Interconnect,
    bindings: BTreeMap<usize, Binding>,
}

impl HClustInterconnectBuilder {
    pub fn new(config: HClustConfig) -> Self {
        Self {
            config,
            spec: FlowMatrix::new(),
            lifetimes: Lifetimes::default(),
            inputs: BTreeMap::new(),
            sinks: BTreeMap::new(),
            sink_inputs: BTreeMap::new(),
            temps: Vec::new(),
            classes: Vec::new(),
            uf: UnionFind::new(0),
            groups: Vec::new(),
            interconnect: Interconnect::default(),
            bindings: BTreeMap::new(),
        }
    }

    /// Where every temporary of the last specification was bound.
    pub fn bindings(&self) -> &BTreeMap<usize, Binding> {
        &self.bindings
    }

    /// Take a transitized copy of `spec` and record the multiplexer inputs
    /// of every temporary and every concrete sink.
    pub fn init(&mut self, spec: &FlowMatrix) -> XilResult<()> {
        *self = Self::new(self.config);
        self.spec = spec.clone();
        self.spec.transitize()?;

        for (_, par) in self.spec.steps() {
            for flow in par.iter() {
                let target = flow.target();
                match target.temporary_index() {
                    Some(t) => {
                        self.inputs.entry(t).or_default().insert(flow.into());
                    }
                    None => {
                        self.sink_inputs.entry(target).or_default().insert(flow.into());
                        if let Some(t) = flow.source().and_then(|s| s.temporary_index()) {
                            self.sinks.entry(t).or_default().insert(target);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Derive the lifetimes and start with one class per live temporary.
    /// Dead temporaries take no part in clustering.
    pub fn compute_lifetimes(&mut self) -> XilResult<()> {
        self.lifetimes = Lifetimes::compute(&self.spec)?;
        self.temps.clear();
        self.classes.clear();
        for (t, lifetime) in self.lifetimes.live() {
            let Some((start, end)) = lifetime.interval() else {
                continue;
            };
            if start > end {
                return Err(Error::malformed_schedule("inverted lifetime").at_temporary(t));
            }
            self.temps.push(t);
            self.classes.push(Class {
                ty: lifetime.ty,
                intervals: IntervalSet::single(start, end),
                writes: lifetime
                    .write_steps
                    .iter()
                    .copied()
                    .filter(|w| !lifetime.is_dead_write(*w))
                    .collect(),
                reads: lifetime.read_steps.clone(),
                inputs: self.inputs.get(&t).cloned().unwrap_or_default(),
                sinks: self.sinks.get(&t).cloned().unwrap_or_default(),
            });
        }
        self.uf = UnionFind::new(self.temps.len());
        Ok(())
    }

    /// The multiplexer inputs of a register that holds the classes `own`.
    /// Temporaries are named by their class and the register's own output is
    /// left out, since every register already feeds back to itself.
    fn register_inputs<'a>(
        &self,
        inputs: impl IntoIterator<Item = &'a Input>,
        own: &[usize],
    ) -> BTreeSet<Input> {
        inputs
            .into_iter()
            .filter_map(|input| {
                let Input::Temp(t) = input else {
                    return Some(input.clone());
                };
                match self.temps.binary_search(t).map(|p| self.uf.root(p)) {
                    Ok(rep) if own.contains(&rep) => None,
                    Ok(rep) => Some(Input::Temp(self.temps[rep])),
                    Err(_) => Some(input.clone()),
                }
            })
            .collect()
    }

    /// Width of the multiplexer in front of `sink` under the current classes.
    fn sink_fan_in(&self, sink: &SignalRef) -> usize {
        self.sink_inputs
            .get(sink)
            .map_or(0, |inputs| self.register_inputs(inputs, &[]).len())
    }

    fn can_share(&self, a: usize, b: usize, relaxed: bool) -> bool {
        let (ca, cb) = (&self.classes[a], &self.classes[b]);
        if ca.ty != cb.ty || ca.intervals.intersects(&cb.intervals) {
            return false;
        }
        let own = self
            .register_inputs(&ca.inputs, &[a])
            .len()
            .max(self.register_inputs(&cb.inputs, &[b]).len());
        let fan_in = self
            .register_inputs(ca.inputs.iter().chain(&cb.inputs), &[a, b])
            .len();
        if fan_in <= own {
            return true;
        }
        if !relaxed || ca.sinks.is_disjoint(&cb.sinks) {
            return false;
        }
        let bound = ca
            .sinks
            .union(&cb.sinks)
            .map(|s| self.sink_fan_in(s))
            .max()
            .unwrap_or(0);
        fan_in <= bound
    }

    /// One scan over all pairs of classes. Returns whether any merged.
    fn cluster_round(&mut self, relaxed: bool) -> bool {
        let mut merged = false;
        for a in 0..self.temps.len() {
            for b in a + 1..self.temps.len() {
                if !self.uf.is_representative(a)
                    || !self.uf.is_representative(b)
                    || !self.can_share(a, b, relaxed)
                {
                    continue;
                }
                log::trace!(
                    "merging t{} into t{}{}",
                    self.temps[b],
                    self.temps[a],
                    if relaxed { " (shared sink)" } else { "" }
                );
                self.uf.union(a, b);
                let other = self.classes[b].clone();
                self.classes[a].absorb(&other);
                merged = true;
            }
        }
        merged
    }

    /// Cluster the live temporaries into register classes.
    pub fn do_clustering(&mut self) -> XilResult<()> {
        loop {
            let strict = self.cluster_round(false);
            let relaxed = self.cluster_round(true);
            if !strict && !relaxed {
                break;
            }
        }
        Ok(())
    }

    fn representatives(&self) -> Vec<usize> {
        (0..self.temps.len())
            .filter(|p| self.uf.is_representative(*p))
            .collect()
    }

    /// Group register classes whose write steps and read steps are
    /// disjoint. Groups of at least the memory threshold become memories.
    pub fn do_memory_clustering(&mut self) -> XilResult<()> {
        self.groups.clear();
        let reps = self.representatives();
        if reps.len() < self.config.memory_threshold.max(1) {
            return Ok(());
        }
        let mut acc = reps
            .iter()
            .map(|r| self.classes[*r].clone())
            .collect::<Vec<_>>();
        let mut groups = UnionFind::new(reps.len());
        for i in 0..reps.len() {
            for j in i + 1..reps.len() {
                if !groups.is_representative(i) || !groups.is_representative(j) {
                    continue;
                }
                let (gi, gj) = (&acc[i], &acc[j]);
                if gi.ty == gj.ty
                    && gi.writes.is_disjoint(&gj.writes)
                    && gi.reads.is_disjoint(&gj.reads)
                {
                    groups.union(i, j);
                    let other = acc[j].clone();
                    acc[i].absorb(&other);
                }
            }
        }
        self.groups = groups
            .classes()
            .into_values()
            .filter(|members| members.len() >= self.config.memory_threshold)
            .map(|members| members.into_iter().map(|m| reps[m]).collect())
            .collect();
        Ok(())
    }

    /// Allocate a memory per group and a register per remaining class and
    /// bind every temporary.
    pub fn instantiate_control_logic(&mut self) -> XilResult<()> {
        let mut storage: BTreeMap<usize, Binding> = BTreeMap::new();
        let mut memories = Vec::new();
        for (m, group) in self.groups.iter().enumerate() {
            memories.push(Memory::new(m, self.classes[group[0]].ty, group.len()));
            for (addr, rep) in group.iter().enumerate() {
                storage.insert(*rep, Binding::Memory { mem: m, addr });
            }
        }
        let mut registers = Vec::new();
        for rep in self.representatives() {
            storage.entry(rep).or_insert_with(|| {
                registers.push(Register::new(registers.len(), self.classes[rep].ty));
                Binding::Register(registers.len() - 1)
            });
        }

        self.bindings.clear();
        for (t, lifetime) in self.lifetimes.iter() {
            let binding = match self.temps.binary_search(&t) {
                Ok(pos) if !lifetime.is_dead() => storage[&self.uf.find(pos)],
                _ => Binding::Unused,
            };
            self.bindings.insert(t, binding);
        }

        let processes = if registers.is_empty() {
            vec![]
        } else {
            vec![SyncProcess::register_update(&registers)]
        };
        let stats = InterconnectStats {
            temporaries: self.lifetimes.len(),
            dead_temporaries: self.lifetimes.dead_count(),
            registers: registers.len(),
            memories: memories.len(),
            memory_words: memories.iter().map(|m| m.words).sum(),
        };
        self.interconnect = Interconnect {
            registers,
            memories,
            processes,
            stats,
        };
        Ok(())
    }

    /// Write the flows over the allocated storage into `detailed`.
    pub fn assemble_flow_matrix(&self, detailed: &mut FlowMatrix) -> XilResult<()> {
        assemble::assemble_flow_matrix(
            &self.spec,
            &self.lifetimes,
            &self.bindings,
            &self.interconnect,
            detailed,
        )
    }
}

impl InterconnectBuilder for HClustInterconnectBuilder {
    fn create_interconnect(
        &mut self,
        spec: &FlowMatrix,
        detailed: &mut FlowMatrix,
    ) -> XilResult<Interconnect> {
        self.init(spec)?;
        self.compute_lifetimes()?;
        self.do_clustering()?;
        self.do_memory_clustering()?;
        self.instantiate_control_logic()?;
        self.assemble_flow_matrix(detailed)?;
        log_stats("hclust", self.interconnect.stats());
        Ok(self.interconnect.clone())
    }
}
