use crate::{InstrIdx, LabelIdx};
use xil_utils::IndexedMap;

/// Arena of branch labels. A label is resolved to an instruction index of
/// the function that owns the table. A target equal to the instruction count
/// denotes the end of the function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LabelTable {
    targets: IndexedMap<LabelIdx, InstrIdx>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new label pointing at `target`.
    pub fn create(&mut self, target: InstrIdx) -> LabelIdx {
        self.targets.push(target)
    }

    /// The label pointing at `target`, creating one if none exists.
    pub fn find_or_create(&mut self, target: InstrIdx) -> LabelIdx {
        let found = self.targets.iter().find(|(_, t)| **t == target).map(|(l, _)| l);
        match found {
            Some(label) => label,
            None => self.create(target),
        }
    }

    pub fn set(&mut self, label: LabelIdx, target: InstrIdx) {
        self.targets[label] = target;
    }

    pub fn target(&self, label: LabelIdx) -> InstrIdx {
        self.targets[label]
    }

    pub fn get(&self, label: LabelIdx) -> Option<InstrIdx> {
        self.targets.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabelIdx, InstrIdx)> + '_ {
        self.targets.iter().map(|(l, t)| (l, *t))
    }

    /// Retarget every label through `f`.
    pub fn remap<F>(&self, mut f: F) -> Self
    where
        F: FnMut(InstrIdx) -> InstrIdx,
    {
        Self {
            targets: self.targets.values().map(|t| f(*t)).collect(),
        }
    }

    /// The labels pointing at `target`.
    pub fn labels_at(&self, target: InstrIdx) -> impl Iterator<Item = LabelIdx> + '_ {
        self.iter().filter(move |(_, t)| *t == target).map(|(l, _)| l)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xil_utils::IndexRef;

    #[test]
    fn labels_are_reused_per_target() {
        let mut labels = LabelTable::new();
        let a = labels.find_or_create(InstrIdx::new(4));
        let b = labels.find_or_create(InstrIdx::new(2));
        assert_eq!(labels.find_or_create(InstrIdx::new(4)), a);
        assert_ne!(a, b);
        assert_eq!(labels.len(), 2);
        labels.set(b, InstrIdx::new(4));
        assert_eq!(labels.labels_at(InstrIdx::new(4)).collect::<Vec<_>>(), [a, b]);
    }
}
