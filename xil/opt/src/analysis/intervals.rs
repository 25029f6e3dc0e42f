use itertools::Itertools;
use std::collections::BTreeSet;

/// A set of closed lifetime intervals `[start, end]` over control steps.
///
/// Two intervals conflict when they overlap by more than a shared endpoint:
/// a value that is last read at step `t` may share storage with a value first
/// written at step `t`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IntervalSet {
    intervals: BTreeSet<(usize, usize)>,
}

fn overlap((a, b): (usize, usize), (c, d): (usize, usize)) -> bool {
    a < d && c < b
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(start: usize, end: usize) -> Self {
        let mut set = Self::new();
        set.add(start, end);
        set
    }

    pub fn add(&mut self, start: usize, end: usize) {
        debug_assert!(start <= end);
        self.intervals.insert((start, end));
    }

    pub fn add_set(&mut self, other: &IntervalSet) {
        self.intervals.extend(other.intervals.iter().copied());
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.intervals.iter().copied()
    }

    /// Whether an interval of `self` conflicts with an interval of `other`.
    pub fn intersects(&self, other: &IntervalSet) -> bool {
        self.intervals
            .iter()
            .cartesian_product(other.intervals.iter())
            .any(|(x, y)| overlap(*x, *y))
    }

    pub fn left_points(&self) -> impl Iterator<Item = usize> + '_ {
        self.intervals.iter().map(|(s, _)| *s)
    }

    pub fn right_points(&self) -> impl Iterator<Item = usize> + '_ {
        self.intervals.iter().map(|(_, e)| *e)
    }
}

#[cfg(test)]
mod tests {
    use super::IntervalSet;

    #[test]
    fn touching_intervals_do_not_conflict() {
        let a = IntervalSet::single(0, 2);
        let b = IntervalSet::single(2, 5);
        assert!(!a.intersects(&b));
        let c = IntervalSet::single(1, 3);
        assert!(a.intersects(&c));
        assert!(b.intersects(&c));

        let mut ab = a.clone();
        ab.add_set(&b);
        assert!(ab.intersects(&c));
        assert!(!ab.intersects(&IntervalSet::single(5, 7)));
        assert_eq!(ab.left_points().collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(ab.right_points().collect::<Vec<_>>(), vec![2, 5]);
    }
}
