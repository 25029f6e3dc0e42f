use crate::rewrite::{Xil3Rewrite, Xil3Rewriter};
use crate::traversal::{Action, Named, VisResult, Visitor};
use smallvec::SmallVec;
use std::collections::HashMap;
use xil_ir::{self as ir, InstrIdx, Preds, SlotIdx, Type, Xil3Instr, XilInstr};
use xil_utils::XilResult;

/// Structural identity of a computation in output space.
#[derive(Clone, PartialEq, Eq, Hash)]
struct Key {
    cmd: XilInstr,
    preds: Preds,
    operands: SmallVec<[SlotIdx; 3]>,
    result_types: SmallVec<[Type; 2]>,
}

/// Shares the results of structurally identical pure computations within a
/// basic block.
///
/// Operands are compared after they have been remapped, so a single forward
/// pass finds every sharing opportunity: the operands of an instruction are
/// deduplicated before the instruction itself is looked at.
#[derive(Default)]
pub struct Cse {
    /// First output instruction computing each key and its result slots.
    seen: HashMap<Key, (InstrIdx, SmallVec<[SlotIdx; 2]>)>,
    eliminated: usize,
}

impl Named for Cse {
    fn name() -> &'static str {
        "cse"
    }

    fn description() -> &'static str {
        "eliminate common subexpressions within basic blocks"
    }
}

impl Cse {
    fn is_candidate(instr: &Xil3Instr) -> bool {
        let op = instr.cmd.op;
        op.is_pure() && !op.is_branch() && !instr.results.is_empty()
    }

    /// Run the elimination over `func` and return the rewritten function.
    pub fn run(&mut self, func: &ir::Xil3Function) -> XilResult<ir::Xil3Function> {
        self.seen.clear();
        self.eliminated = 0;
        let res = Xil3Rewriter::run(func, self)?;
        log::debug!(
            "{}: {} common subexpressions eliminated",
            func.name,
            self.eliminated
        );
        Ok(res.function)
    }
}

impl Xil3Rewrite for Cse {
    fn begin_block(&mut self, _rw: &mut Xil3Rewriter<'_>, _start: InstrIdx) {
        self.seen.clear();
    }

    fn rewrite(
        &mut self,
        rw: &mut Xil3Rewriter<'_>,
        _idx: InstrIdx,
        instr: &Xil3Instr,
    ) -> XilResult<()> {
        if !Self::is_candidate(instr) {
            return rw.process_default(instr);
        }
        let input = rw.input();
        let key = Key {
            cmd: instr.cmd.clone(),
            preds: rw.map_preds(&instr.preds),
            operands: rw.map_operands(&instr.operands)?,
            result_types: instr.results.iter().map(|s| input.slot_type(*s)).collect(),
        };
        if let Some((earlier, results)) = self.seen.get(&key) {
            for (slot, to) in instr.results.iter().zip(results) {
                rw.alias_slot(*slot, *to);
            }
            rw.alias_instr(*earlier);
            self.eliminated += 1;
            return Ok(());
        }
        let Key { cmd, preds, operands, .. } = key.clone();
        let results = rw.fresh_results(&instr.results);
        let out = rw.emit_primary(Xil3Instr {
            cmd,
            preds,
            operands,
            results: results.clone(),
        });
        self.seen.insert(key, (out, results));
        Ok(())
    }
}

impl Visitor for Cse {
    fn visit_xil3(&mut self, func: &mut ir::Xil3Function) -> VisResult {
        let out = self.run(func)?;
        Ok(Action::change(ir::Function::Xil3(out)))
    }
}
