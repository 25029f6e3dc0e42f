//! Bases for instruction-list rewriters.
//!
//! A rewriter walks the input list once and emits zero or more output
//! instructions per input instruction. The bookkeeping here maps input indices
//! to output indices so that labels and dependencies survive the rewrite.
mod xil3;
mod xils;

pub use xil3::{Xil3Rewrite, Xil3Rewriter};
pub use xils::{XilsRewrite, XilsRewriter};

use xil_ir::{InstrIdx, LabelTable, Preds, SlotIdx};
use xil_utils::IndexRef;

/// The outcome of a rewrite.
#[derive(Clone, Debug)]
pub struct RewriteResult<F> {
    pub function: F,
    /// For every input instruction, the output instruction that stands for
    /// it, if one exists.
    pub instr_remap: Vec<Option<InstrIdx>>,
    /// For every input slot, the output slot that holds its value. Empty for
    /// stack functions.
    pub slot_remap: Vec<Option<SlotIdx>>,
}

impl<F> RewriteResult<F> {
    pub fn instr_remap(&self, idx: InstrIdx) -> Option<InstrIdx> {
        self.instr_remap.get(idx.index()).copied().flatten()
    }

    pub fn slot_remap(&self, slot: SlotIdx) -> Option<SlotIdx> {
        self.slot_remap.get(slot.index()).copied().flatten()
    }
}

/// Tracks where the output of each input instruction went.
#[derive(Clone, Debug)]
pub(crate) struct Translation {
    first_out: Vec<Option<InstrIdx>>,
    primary: Vec<Option<InstrIdx>>,
    current: usize,
}

impl Translation {
    pub(crate) fn new(len: usize) -> Self {
        Self {
            first_out: vec![None; len],
            primary: vec![None; len],
            current: 0,
        }
    }

    /// Start translating input instruction `idx`.
    pub(crate) fn begin(&mut self, idx: InstrIdx) {
        self.current = idx.index();
    }

    pub(crate) fn current(&self) -> InstrIdx {
        InstrIdx::new(self.current)
    }

    /// Note that `out` was emitted for the current instruction.
    pub(crate) fn emitted(&mut self, out: InstrIdx) {
        self.first_out[self.current].get_or_insert(out);
    }

    /// Make `out` the instruction that dependencies on the current
    /// instruction refer to.
    pub(crate) fn set_primary(&mut self, out: InstrIdx) {
        self.primary[self.current] = Some(out);
    }

    /// Move the dependencies of an input instruction into output space.
    /// Dependencies on instructions without output are dropped.
    pub(crate) fn map_preds(&self, preds: &Preds) -> Preds {
        preds
            .iter()
            .filter_map(|dep| {
                self.primary
                    .get(dep.pred().index())
                    .copied()
                    .flatten()
                    .map(|out| dep.remap(out))
            })
            .collect()
    }

    /// Resolve labels, which still point at input indices. A label that
    /// points at an instruction without output moves to the next instruction
    /// that has one.
    pub(crate) fn finish(
        self,
        labels: &LabelTable,
        out_len: usize,
    ) -> (LabelTable, Vec<Option<InstrIdx>>) {
        let n = self.first_out.len();
        let mut starts = vec![InstrIdx::new(out_len); n + 1];
        for i in (0..n).rev() {
            starts[i] = self.first_out[i].unwrap_or(starts[i + 1]);
        }
        let end = InstrIdx::new(out_len);
        let labels = labels.remap(|t| starts.get(t.index()).copied().unwrap_or(end));
        (labels, self.primary)
    }
}
