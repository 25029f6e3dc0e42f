use crate::rewrite::Translation;
use crate::traversal::{Action, Named, VisResult, Visitor};
use xil_ir::{
    self as ir, InstrList, VarDesc, VarRef, Xil3Function, XilsFunction,
    XilsInstr,
};
use xil_utils::{Id, IndexRef, NameGenerator, XilResult};

/// Replaces every three-address function by its stack form.
#[derive(Default)]
pub struct ThreeAcToStk;

impl Named for ThreeAcToStk {
    fn name() -> &'static str {
        "3ac-to-stk"
    }

    fn description() -> &'static str {
        "convert three-address functions into stack form"
    }
}

impl Visitor for ThreeAcToStk {
    fn visit_xil3(&mut self, func: &mut ir::Xil3Function) -> VisResult {
        Ok(Action::change(ir::Function::Xils(three_ac_to_stk(func)?)))
    }
}

/// Convert a three-address function into stack form.
///
/// Every slot gets a local of its own. An instruction loads its operand
/// slots, executes, and stores its results, the last result first. The stack
/// is therefore empty between any two input instructions.
pub fn three_ac_to_stk(input: &Xil3Function) -> XilResult<XilsFunction> {
    input.validate()?;
    let mut out = XilsFunction::new(input.name);
    out.args = input.args.clone();
    out.locals = input.locals.clone();

    let taken = input
        .args
        .values()
        .map(|a| a.name)
        .chain(input.locals.values().map(|l| l.name))
        .collect::<Vec<Id>>();
    let mut names = NameGenerator::with_prev_defined_names(taken);
    let slot_vars = input
        .slot_types
        .iter()
        .map(|(slot, ty)| {
            let name = names.gen_name(format!("_s{}", slot.index()));
            VarRef::Local(out.locals.push(VarDesc::new(name, *ty)))
        })
        .collect::<Vec<_>>();
    let var = |slot: xil_ir::SlotIdx| slot_vars[slot.index()];

    let mut tr = Translation::new(input.instrs.len());
    for (idx, instr) in input.instrs.iter() {
        tr.begin(idx);
        for slot in &instr.operands {
            let ld = out.instrs.push(XilsInstr::load_var(var(*slot), input.slot_type(*slot)));
            tr.emitted(ld);
        }
        let cmd = match input.branch_target(idx) {
            Some(target) => instr.cmd.with_label(out.labels.create(target)),
            None => instr.cmd.clone(),
        };
        let main = out.instrs.push(XilsInstr::new(
            cmd,
            tr.map_preds(&instr.preds),
            instr.operands.iter().map(|s| input.slot_type(*s)),
            instr.results.iter().map(|s| input.slot_type(*s)),
        ));
        tr.emitted(main);
        tr.set_primary(main);
        for slot in instr.results.iter().rev() {
            let st = out.instrs.push(XilsInstr::store_var(var(*slot), input.slot_type(*slot)));
            tr.emitted(st);
        }
    }

    let (labels, _) = tr.finish(&out.labels, out.instrs.len());
    out.labels = labels;
    log::debug!(
        "{}: {} three-address instructions became {} stack instructions, {} locals added",
        input.name,
        input.instrs.len(),
        out.instrs.len(),
        slot_vars.len()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passes::stk_to_3ac;
    use xil_ir::{
        InstrIdx, Opcode, Preds, StaticOperand, Type, Xil3Instr, XilInstr,
        eval::Evaluator,
    };

    fn op3<const N: usize, const M: usize>(
        op: Opcode,
        operand: StaticOperand,
        ops: [xil_ir::SlotIdx; N],
        res: [xil_ir::SlotIdx; M],
    ) -> Xil3Instr {
        Xil3Instr::new(XilInstr::new(op, operand), Preds::new(), ops, res)
    }

    /// Writes the negation of port `x` to port `y` if `x` is negative and
    /// returns `x`.
    fn negate_if_negative() -> Xil3Function {
        let i8 = Type::Signed(8);
        let mut f = Xil3Function::new("negate_if_negative");
        let n = f.add_slot(i8);
        let z = f.add_slot(i8);
        let c = f.add_slot(Type::Bool);
        let m = f.add_slot(i8);
        let done = f.labels.create(InstrIdx::new(6));
        let none = StaticOperand::None;
        f.instrs.push(op3(Opcode::RdPort, StaticOperand::Port("x".into()), [], [n]));
        f.instrs.push(op3(Opcode::Ld0, none.clone(), [], [z]));
        f.instrs.push(op3(Opcode::IsLt, none.clone(), [n, z], [c]));
        f.instrs.push(op3(Opcode::BrFalse, StaticOperand::Label(done), [c], []));
        f.instrs.push(op3(Opcode::Neg, none.clone(), [n], [m]));
        f.instrs.push(op3(Opcode::WrPort, StaticOperand::Port("y".into()), [m], []));
        f.instrs.push(op3(Opcode::Ret, none, [n], []));
        f
    }

    #[test]
    fn stack_is_empty_between_instructions() {
        let f = negate_if_negative();
        let s = three_ac_to_stk(&f).unwrap();
        s.validate().unwrap();
        let depths = s.stack_depths().unwrap();
        for bound in s.basic_block_boundaries() {
            assert_eq!(depths[bound.index()], Some(0));
        }
        assert_eq!(s.locals.len(), 4);
        // The branch now lands on the load that feeds `Ret`.
        let (br, _) = s
            .instrs
            .iter()
            .find(|(_, instr)| instr.cmd.op == Opcode::BrFalse)
            .unwrap();
        let target = s.branch_target(br).unwrap();
        assert_eq!(s.instrs[target].cmd.op, Opcode::Ldv);
        assert_eq!(s.instrs[InstrIdx::new(target.index() + 1)].cmd.op, Opcode::Ret);
    }

    #[test]
    fn slot_locals_avoid_existing_names() {
        let mut f = negate_if_negative();
        f.locals.push(VarDesc::new("_s0", Type::Bool));
        let s = three_ac_to_stk(&f).unwrap();
        let names = s.locals.values().map(|v| v.name).collect::<std::collections::BTreeSet<_>>();
        assert_eq!(names.len(), s.locals.len());
    }

    #[test]
    fn round_trip_keeps_the_trace() {
        let f = negate_if_negative();
        let back = stk_to_3ac(&three_ac_to_stk(&f).unwrap()).unwrap();
        back.validate().unwrap();
        for x in [-4, 5] {
            let ev = Evaluator::new().with_port("x", x);
            let a = ev.run_xil3(&f).unwrap();
            let b = ev.run_xil3(&back).unwrap();
            assert_eq!(a.trace, b.trace);
            assert_eq!(a.effects(), b.effects());
        }
    }
}
