use std::collections::BTreeSet;

/// The shift register that realizes one source-to-sinks transport of a fixed
/// delay.
///
/// A value that departs at step `t` enters stage 1 at `t` and moves up one
/// stage at every strobe. It must sit in the last stage when it is read at
/// `t + delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipePlan {
    pub delay: usize,
    /// Number of stages.
    pub capacity: usize,
    /// Steps at which the stages shift. Every departure is a strobe.
    pub strobes: BTreeSet<usize>,
}

impl PipePlan {
    /// The stage that holds the value departing at `departure` right after
    /// `step`.
    pub fn stage_at(&self, departure: usize, step: usize) -> usize {
        self.strobes.range(departure..=step).count()
    }
}

/// Most values that are in flight at the same step.
fn max_in_flight(departures: &BTreeSet<usize>, delay: usize) -> usize {
    departures
        .iter()
        .map(|t| departures.range(*t..t + delay).count())
        .max()
        .unwrap_or(0)
}

fn strobes_for(departures: &BTreeSet<usize>, delay: usize, capacity: usize) -> BTreeSet<usize> {
    let mut strobes = departures.clone();
    for t in departures {
        strobes.extend((1..capacity).map(|j| t + delay - j));
    }
    strobes
}

/// Every value gets exactly the shifts it needs between departure and
/// arrival.
fn is_consistent(
    departures: &BTreeSet<usize>,
    strobes: &BTreeSet<usize>,
    delay: usize,
    capacity: usize,
) -> bool {
    departures
        .iter()
        .all(|t| strobes.range(t + 1..t + delay).count() == capacity - 1)
}

/// Plan the stages and strobes of a pipe. The capacity starts at the number
/// of values in flight and grows until the strobe table is consistent. A pipe
/// with one stage per step of delay is always consistent.
pub fn plan_pipe(departures: &BTreeSet<usize>, delay: usize) -> PipePlan {
    if delay == 0 || departures.is_empty() {
        return PipePlan {
            delay,
            capacity: 0,
            strobes: BTreeSet::new(),
        };
    }
    let mut capacity = max_in_flight(departures, delay).clamp(1, delay);
    loop {
        let strobes = strobes_for(departures, delay, capacity);
        if capacity >= delay || is_consistent(departures, &strobes, delay, capacity) {
            return PipePlan {
                delay,
                capacity,
                strobes,
            };
        }
        log::debug!(
            "pipe of delay {delay}: capacity {capacity} overflows, retrying with {}",
            capacity + 1
        );
        capacity += 1;
    }
}
