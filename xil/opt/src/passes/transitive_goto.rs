use crate::rewrite::{XilsRewrite, XilsRewriter};
use crate::traversal::{Action, Named, VisResult, Visitor};
use std::collections::BTreeSet;
use xil_ir::{self as ir, InstrIdx, InstrList, Opcode, XilsInstr};
use xil_utils::{IndexRef, XilResult};

/// Retargets branches that land on a chain of `Goto`s to the end of the
/// chain. A branch whose final target is the next instruction is dropped: a
/// `Goto` becomes a `Nop` and a conditional branch becomes a `Pop` of its
/// condition.
#[derive(Default)]
pub struct TransitiveGotoEliminator {
    retargeted: usize,
    dropped: usize,
}

impl Named for TransitiveGotoEliminator {
    fn name() -> &'static str {
        "transitive-goto"
    }

    fn description() -> &'static str {
        "short-circuit chains of unconditional jumps"
    }
}

/// Follow `Goto`s starting at `target`. Stops at the first instruction that
/// is not a `Goto` or when the chain loops.
fn final_target(func: &ir::XilsFunction, from: InstrIdx, target: InstrIdx) -> InstrIdx {
    let mut visited = BTreeSet::from([from]);
    let mut cur = target;
    while cur.index() < func.instrs.len()
        && func.instrs[cur].cmd.op == Opcode::Goto
        && visited.insert(cur)
    {
        match func.branch_target(cur) {
            Some(next) => cur = next,
            None => break,
        }
    }
    cur
}

impl TransitiveGotoEliminator {
    pub fn run(&mut self, func: &ir::XilsFunction) -> XilResult<ir::XilsFunction> {
        self.retargeted = 0;
        self.dropped = 0;
        let res = XilsRewriter::run(func, self)?;
        log::debug!(
            "{}: {} branches retargeted, {} dropped",
            func.name,
            self.retargeted,
            self.dropped
        );
        Ok(res.function)
    }
}

impl XilsRewrite for TransitiveGotoEliminator {
    fn rewrite(
        &mut self,
        rw: &mut XilsRewriter<'_>,
        idx: InstrIdx,
        instr: &XilsInstr,
    ) -> XilResult<()> {
        let Some(target) = rw.input().branch_target(idx) else {
            return rw.process_default(instr);
        };
        let fin = final_target(rw.input(), idx, target);
        if fin.index() == idx.index() + 1 {
            let mut out = if instr.cmd.op == Opcode::Goto {
                XilsInstr::nop()
            } else {
                XilsInstr::pop(instr.operand_types[0])
            };
            out.preds = rw.map_preds(&instr.preds);
            rw.emit_primary(out)?;
            self.dropped += 1;
            return Ok(());
        }
        if fin == target {
            return rw.process_default(instr);
        }
        let mut out = instr.clone();
        out.cmd = instr.cmd.with_label(rw.label_for(fin));
        out.preds = rw.map_preds(&instr.preds);
        rw.emit_primary(out)?;
        self.retargeted += 1;
        Ok(())
    }
}

impl Visitor for TransitiveGotoEliminator {
    fn visit_xils(&mut self, func: &mut ir::XilsFunction) -> VisResult {
        let out = self.run(func)?;
        Ok(Action::change(ir::Function::Xils(out)))
    }
}
