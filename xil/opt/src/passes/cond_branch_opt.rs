use crate::rewrite::{XilsRewrite, XilsRewriter};
use crate::traversal::{Action, Named, VisResult, Visitor};
use std::collections::BTreeSet;
use xil_ir::{
    self as ir, InstrIdx, InstrList, LabelIdx, Opcode, Preds, XilsInstr,
};
use xil_utils::{IndexRef, XilResult};

/// Fuses a conditional branch over an unconditional jump into one inverted
/// branch:
///
/// ```text
///     BrTrue L1            BrFalse L2
///     Goto L2       =>     Nop
/// L1: ...              L1: ...
/// ```
///
/// The jump becomes a `Nop` so that instruction indices stay stable.
#[derive(Default)]
pub struct ConditionalBranchOptimizer {
    /// The `Goto` that the previous instruction absorbed.
    absorbed: Option<InstrIdx>,
    targets: BTreeSet<InstrIdx>,
    fused: usize,
}

impl Named for ConditionalBranchOptimizer {
    fn name() -> &'static str {
        "cond-branch-opt"
    }

    fn description() -> &'static str {
        "invert conditional branches that jump over an unconditional jump"
    }
}

fn inverted(op: Opcode) -> Option<Opcode> {
    match op {
        Opcode::BrTrue => Some(Opcode::BrFalse),
        Opcode::BrFalse => Some(Opcode::BrTrue),
        _ => None,
    }
}

impl ConditionalBranchOptimizer {
    /// The label of the jump that the branch at `idx` can absorb.
    fn fusable(
        func: &ir::XilsFunction,
        targets: &BTreeSet<InstrIdx>,
        idx: InstrIdx,
    ) -> Option<LabelIdx> {
        let next = InstrIdx::new(idx.index() + 1);
        if !func.instrs[idx].cmd.op.is_conditional_branch()
            || next.index() >= func.instrs.len()
            || targets.contains(&next)
        {
            return None;
        }
        let jump = &func.instrs[next];
        if jump.cmd.op != Opcode::Goto
            || func.branch_target(idx)?.index() != idx.index() + 2
        {
            return None;
        }
        jump.cmd.label()
    }

    pub fn run(&mut self, func: &ir::XilsFunction) -> XilResult<ir::XilsFunction> {
        self.absorbed = None;
        self.fused = 0;
        self.targets = func
            .instrs
            .keys()
            .filter_map(|i| func.branch_target(i))
            .collect();
        let res = XilsRewriter::run(func, self)?;
        log::debug!("{}: {} branches fused", func.name, self.fused);
        Ok(res.function)
    }
}

impl XilsRewrite for ConditionalBranchOptimizer {
    fn rewrite(
        &mut self,
        rw: &mut XilsRewriter<'_>,
        idx: InstrIdx,
        instr: &XilsInstr,
    ) -> XilResult<()> {
        if self.absorbed.take() == Some(idx) {
            let mut nop = XilsInstr::nop();
            nop.preds = rw.map_preds(&instr.preds);
            rw.emit_primary(nop)?;
            return Ok(());
        }
        let (Some(label), Some(op)) = (
            Self::fusable(rw.input(), &self.targets, idx),
            inverted(instr.cmd.op),
        ) else {
            return rw.process_default(instr);
        };
        let mut branch = XilsInstr::new(
            instr.cmd.with_label(label),
            Preds::new(),
            instr.operand_types.iter().copied(),
            [],
        );
        branch.cmd.op = op;
        branch.preds = rw.map_preds(&instr.preds);
        rw.emit_primary(branch)?;
        self.absorbed = Some(InstrIdx::new(idx.index() + 1));
        self.fused += 1;
        Ok(())
    }
}

impl Visitor for ConditionalBranchOptimizer {
    fn visit_xils(&mut self, func: &mut ir::XilsFunction) -> VisResult {
        let out = self.run(func)?;
        Ok(Action::change(ir::Function::Xils(out)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xil_ir::{StaticOperand, Type, Value, XilInstr, eval::Evaluator};

    /// `[LdConst, BrTrue L1, Goto L2, L1: Nop, L2: Ret]`
    fn branch_chain(cond: bool) -> ir::XilsFunction {
        let mut f = ir::XilsFunction::new("chain");
        let l1 = f.labels.create(InstrIdx::new(3));
        let l2 = f.labels.create(InstrIdx::new(4));
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::LdConst, StaticOperand::Const(Value::Bool(cond))),
            Preds::new(),
            [],
            [Type::Bool],
        ));
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::BrTrue, StaticOperand::Label(l1)),
            Preds::new(),
            [Type::Bool],
            [],
        ));
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::Goto, StaticOperand::Label(l2)),
            Preds::new(),
            [],
            [],
        ));
        f.instrs.push(XilsInstr::nop());
        f.instrs.push(XilsInstr::new(XilInstr::simple(Opcode::Ret), Preds::new(), [], []));
        f
    }

    #[test]
    fn branch_over_goto_is_inverted() {
        let f = branch_chain(true);
        let out = ConditionalBranchOptimizer::default().run(&f).unwrap();
        out.validate().unwrap();
        let ops = out.instrs.values().map(|i| i.cmd.op).collect::<Vec<_>>();
        assert_eq!(
            ops,
            [Opcode::LdConst, Opcode::BrFalse, Opcode::Nop, Opcode::Nop, Opcode::Ret]
        );
        assert_eq!(out.branch_target(InstrIdx::new(1)), Some(InstrIdx::new(4)));
    }

    #[test]
    fn branch_outcomes_are_preserved() {
        for cond in [false, true] {
            let f = branch_chain(cond);
            let out = ConditionalBranchOptimizer::default().run(&f).unwrap();
            let ev = Evaluator::new();
            let (a, b) = (ev.run_xils(&f).unwrap(), ev.run_xils(&out).unwrap());
            assert_eq!(a.trace, b.trace);
            assert_eq!(a.effects(), b.effects());
        }
    }

    #[test]
    fn targeted_goto_is_kept() {
        let mut f = branch_chain(true);
        // Another jump into the `Goto` makes it observable.
        let into = f.labels.create(InstrIdx::new(2));
        f.instrs[InstrIdx::new(3)] = XilsInstr::new(
            XilInstr::new(Opcode::Goto, StaticOperand::Label(into)),
            Preds::new(),
            [],
            [],
        );
        let out = ConditionalBranchOptimizer::default().run(&f).unwrap();
        assert_eq!(out.instrs[InstrIdx::new(1)].cmd.op, Opcode::BrTrue);
        assert_eq!(out.instrs[InstrIdx::new(2)].cmd.op, Opcode::Goto);
    }
}
