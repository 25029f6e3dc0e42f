use std::collections::{BTreeMap, BTreeSet, btree_map::Entry};
use xil_ir::{Flow, FlowMatrix, SignalRef, Type};
use xil_utils::{Error, XilResult};

/// When a temporary holds a value that is still needed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lifetime {
    pub ty: Type,
    /// The first step that writes the temporary.
    pub start: usize,
    /// The last step that reads the temporary, if any does.
    pub end: Option<usize>,
    pub write_steps: BTreeSet<usize>,
    pub read_steps: BTreeSet<usize>,
}

impl Lifetime {
    /// The temporary is never read and needs no storage.
    pub fn is_dead(&self) -> bool {
        self.end.is_none()
    }

    /// The closed interval `[start, end]` of a live temporary.
    pub fn interval(&self) -> Option<(usize, usize)> {
        self.end.map(|end| (self.start, end))
    }

    /// Whether the value written at `step` is never read.
    pub fn is_dead_write(&self, step: usize) -> bool {
        self.end.is_none_or(|end| step >= end)
    }
}

/// Lifetimes of every temporary of a transitized flow matrix, keyed by the
/// temporary's index.
#[derive(Clone, Debug, Default)]
pub struct Lifetimes {
    temps: BTreeMap<usize, Lifetime>,
}

struct Accesses {
    ty: Type,
    writes: BTreeSet<usize>,
    reads: BTreeSet<usize>,
}

fn record(
    accesses: &mut BTreeMap<usize, Accesses>,
    signal: SignalRef,
    step: usize,
    write: bool,
) -> XilResult<()> {
    let Some(t) = signal.temporary_index() else {
        return Ok(());
    };
    let acc = match accesses.entry(t) {
        Entry::Vacant(e) => e.insert(Accesses {
            ty: signal.ty,
            writes: BTreeSet::new(),
            reads: BTreeSet::new(),
        }),
        Entry::Occupied(e) => e.into_mut(),
    };
    if acc.ty != signal.ty {
        return Err(Error::malformed_structure(format!(
            "temporary used with types {} and {}",
            acc.ty, signal.ty
        ))
        .at_temporary(t)
        .at_cstep(step));
    }
    if write {
        acc.writes.insert(step);
    } else {
        acc.reads.insert(step);
    }
    Ok(())
}

impl Lifetimes {
    /// Derive the lifetimes from the step flows of `fm`, which is expected to
    /// be transitized. A temporary that is read at or before its first write
    /// is a malformed schedule.
    pub fn compute(fm: &FlowMatrix) -> XilResult<Self> {
        if let Some(t) = fm.neutral_flow().iter().find_map(|f| {
            f.target()
                .temporary_index()
                .or_else(|| f.source().and_then(|s| s.temporary_index()))
        }) {
            return Err(Error::malformed_structure(
                "temporary in the neutral layer",
            )
            .at_temporary(t));
        }

        let mut accesses: BTreeMap<usize, Accesses> = BTreeMap::new();
        for (step, par) in fm.steps() {
            for flow in par.iter() {
                if let Flow::Signal(sf) = flow {
                    record(&mut accesses, sf.source, step, false)?;
                }
                record(&mut accesses, flow.target(), step, true)?;
            }
        }

        let mut temps = BTreeMap::new();
        for (t, acc) in accesses {
            let first_read = acc.reads.first().copied();
            let Some(start) = acc.writes.first().copied() else {
                return Err(Error::malformed_schedule(
                    "temporary is read but never written",
                )
                .at_temporary(t)
                .at_cstep(first_read.unwrap_or_default()));
            };
            if let Some(read) = first_read.filter(|r| *r <= start) {
                return Err(Error::malformed_schedule(format!(
                    "temporary is read before its first write at step {start}"
                ))
                .at_temporary(t)
                .at_cstep(read));
            }
            temps.insert(
                t,
                Lifetime {
                    ty: acc.ty,
                    start,
                    end: acc.reads.last().copied(),
                    write_steps: acc.writes,
                    read_steps: acc.reads,
                },
            );
        }
        Ok(Self { temps })
    }

    pub fn get(&self, t: usize) -> Option<&Lifetime> {
        self.temps.get(&t)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Lifetime)> {
        self.temps.iter().map(|(t, l)| (*t, l))
    }

    /// Temporaries that are read at least once.
    pub fn live(&self) -> impl Iterator<Item = (usize, &Lifetime)> {
        self.iter().filter(|(_, l)| !l.is_dead())
    }

    pub fn len(&self) -> usize {
        self.temps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.temps.is_empty()
    }

    pub fn dead_count(&self) -> usize {
        self.temps.values().filter(|l| l.is_dead()).count()
    }

    pub fn max_index(&self) -> Option<usize> {
        self.temps.keys().next_back().copied()
    }
}
