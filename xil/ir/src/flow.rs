use crate::{SignalRef, Value};
use linked_hash_map::LinkedHashMap;
use std::fmt;

/// A transfer from one signal to another.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalFlow {
    pub source: SignalRef,
    pub target: SignalRef,
}

impl SignalFlow {
    /// Neither endpoint is a temporary.
    pub fn is_end_to_end(&self) -> bool {
        !self.source.is_temporary() && !self.target.is_temporary()
    }
}

/// A constant driven onto a signal.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ValueFlow {
    pub value: Value,
    pub target: SignalRef,
}

/// A dataflow edge active during one control step.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Flow {
    Signal(SignalFlow),
    Value(ValueFlow),
}

impl Flow {
    pub fn signal(source: SignalRef, target: SignalRef) -> Self {
        Flow::Signal(SignalFlow { source, target })
    }

    pub fn value(value: Value, target: SignalRef) -> Self {
        Flow::Value(ValueFlow { value, target })
    }

    pub fn target(&self) -> SignalRef {
        match self {
            Flow::Signal(sf) => sf.target,
            Flow::Value(vf) => vf.target,
        }
    }

    pub fn source(&self) -> Option<SignalRef> {
        match self {
            Flow::Signal(sf) => Some(sf.source),
            Flow::Value(_) => None,
        }
    }

    /// The same source driving a different target.
    pub fn with_target(&self, target: SignalRef) -> Self {
        match self {
            Flow::Signal(sf) => Flow::signal(sf.source, target),
            Flow::Value(vf) => Flow::value(vf.value.clone(), target),
        }
    }
}

/// A signal transfer that takes `delay` control steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DelayedSignalFlow {
    pub source: SignalRef,
    pub target: SignalRef,
    pub delay: usize,
}

/// A flow at an absolute control step. A signal flow departs its source at
/// `time` and arrives at its target `delay` steps later.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimedFlow {
    Signal {
        time: usize,
        source: SignalRef,
        target: SignalRef,
        delay: usize,
    },
    Value {
        time: usize,
        value: Value,
        target: SignalRef,
    },
}

impl TimedFlow {
    /// The step at which the flow departs.
    pub fn time(&self) -> usize {
        match self {
            TimedFlow::Signal { time, .. } | TimedFlow::Value { time, .. } => *time,
        }
    }

    /// The step at which the flow reaches its target.
    pub fn arrival(&self) -> usize {
        match self {
            TimedFlow::Signal { time, delay, .. } => time + delay,
            TimedFlow::Value { time, .. } => *time,
        }
    }

    pub fn target(&self) -> SignalRef {
        match self {
            TimedFlow::Signal { target, .. } | TimedFlow::Value { target, .. } => *target,
        }
    }

    pub fn delayed(&self) -> Option<DelayedSignalFlow> {
        match self {
            TimedFlow::Signal {
                source,
                target,
                delay,
                ..
            } => Some(DelayedSignalFlow {
                source: *source,
                target: *target,
                delay: *delay,
            }),
            TimedFlow::Value { .. } => None,
        }
    }
}

/// The set of flows active in parallel, keyed by target. A target has at
/// most one flow; adding another flow to it replaces the old one in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParFlow {
    flows: LinkedHashMap<SignalRef, Flow>,
}

impl ParFlow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a flow and return the one it replaced.
    pub fn add(&mut self, flow: Flow) -> Option<Flow> {
        let target = flow.target();
        if let Some(old) = self.flows.get_mut(&target) {
            return Some(std::mem::replace(old, flow));
        }
        self.flows.insert(target, flow);
        None
    }

    pub fn get(&self, target: &SignalRef) -> Option<&Flow> {
        self.flows.get(target)
    }

    pub fn remove(&mut self, target: &SignalRef) -> Option<Flow> {
        self.flows.remove(target)
    }

    pub fn contains_target(&self, target: &SignalRef) -> bool {
        self.flows.contains_key(target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Flow> {
        self.flows.values()
    }

    pub fn targets(&self) -> impl Iterator<Item = &SignalRef> {
        self.flows.keys()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Replace every flow by `f`. Flows for which `f` returns `None` are
    /// removed.
    pub fn map<F>(&self, mut f: F) -> Self
    where
        F: FnMut(&Flow) -> Option<Flow>,
    {
        let mut out = ParFlow::new();
        for flow in self.iter() {
            if let Some(flow) = f(flow) {
                out.add(flow);
            }
        }
        out
    }
}

impl FromIterator<Flow> for ParFlow {
    fn from_iter<T: IntoIterator<Item = Flow>>(iter: T) -> Self {
        let mut out = ParFlow::new();
        for flow in iter {
            out.add(flow);
        }
        out
    }
}

impl fmt::Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flow::Signal(sf) => write!(f, "{} <= {}", sf.target, sf.source),
            Flow::Value(vf) => write!(f, "{} <= {}", vf.target, vf.value),
        }
    }
}

impl fmt::Display for DelayedSignalFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <= {} after {}", self.target, self.source, self.delay)
    }
}

impl fmt::Display for TimedFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimedFlow::Signal {
                time,
                source,
                target,
                delay,
            } => write!(f, "{time}: {target} <= {source} after {delay}"),
            TimedFlow::Value {
                time,
                value,
                target,
            } => write!(f, "{time}: {target} <= {value}"),
        }
    }
}

impl fmt::Display for ParFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for flow in self.iter() {
            writeln!(f, "  {flow}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Type;

    #[test]
    fn replacing_keeps_position() {
        let a = SignalRef::signal("a", Type::Bool);
        let b = SignalRef::signal("b", Type::Bool);
        let c = SignalRef::signal("c", Type::Bool);
        let mut par = ParFlow::new();
        par.add(Flow::signal(c, a));
        par.add(Flow::signal(c, b));
        let old = par.add(Flow::value(Value::Bool(true), a));
        assert_eq!(old, Some(Flow::signal(c, a)));
        let targets = par.targets().copied().collect::<Vec<_>>();
        assert_eq!(targets, vec![a, b]);
        assert_eq!(par.to_string(), "  a <= true\n  b <= c\n");
    }
}
