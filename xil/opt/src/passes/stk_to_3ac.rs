use crate::rewrite::Translation;
use crate::traversal::{Action, Named, VisResult, Visitor};
use xil_ir::{
    self as ir, InstrIdx, InstrList, Opcode, SlotIdx, StackModel,
    StaticOperand, Xil3Function, Xil3Instr, XilsFunction,
};
use xil_utils::{Error, IndexRef, XilResult};

/// Replaces every stack function by its three-address form.
#[derive(Default)]
pub struct StkTo3ac;

impl Named for StkTo3ac {
    fn name() -> &'static str {
        "stk-to-3ac"
    }

    fn description() -> &'static str {
        "convert stack functions into three-address form"
    }
}

impl Visitor for StkTo3ac {
    fn visit_xils(&mut self, func: &mut ir::XilsFunction) -> VisResult {
        Ok(Action::change(ir::Function::Xil3(stk_to_3ac(func)?)))
    }
}

/// Convert a stack function into three-address form.
///
/// The evaluation stack is simulated with the slot that holds each element.
/// Stack shuffles only permute the simulated stack and produce no output.
/// Every other instruction consumes its operand slots and defines fresh
/// result slots. The stack has to be empty at every branch target.
/// Unreachable instructions are dropped.
pub fn stk_to_3ac(input: &XilsFunction) -> XilResult<Xil3Function> {
    let entry = input.stack_types()?;
    let targets = input
        .instrs
        .keys()
        .filter_map(|idx| input.branch_target(idx))
        .collect::<std::collections::BTreeSet<_>>();

    let mut out = Xil3Function::new(input.name);
    out.args = input.args.clone();
    out.locals = input.locals.clone();
    let mut tr = Translation::new(input.instrs.len());
    let mut stack: StackModel<SlotIdx> = StackModel::new();
    let mut dropped = 0;

    for (idx, instr) in input.instrs.iter() {
        tr.begin(idx);
        let fail = |e: Error| e.at_instr(idx.index()).in_function(input.name);
        let Some(types) = &entry[idx.index()] else {
            dropped += 1;
            continue;
        };
        if targets.contains(&idx) && !types.is_empty() {
            return Err(fail(Error::unsupported(format!(
                "branch target with {} values on the stack",
                types.len()
            ))));
        }
        debug_assert_eq!(stack.depth(), types.len());

        match (instr.cmd.op, &instr.cmd.operand) {
            (Opcode::Pop, _) => {
                stack.pop().map_err(fail)?;
            }
            (Opcode::Dup, _) => stack.dup().map_err(fail)?,
            (Opcode::Swap, _) => stack.swap().map_err(fail)?,
            (Opcode::Dig, StaticOperand::Depth(n)) => stack.dig(*n).map_err(fail)?,
            (Opcode::Dig, _) => {
                return Err(fail(Error::malformed_structure("Dig without a depth")));
            }
            (op, _) => {
                let operands = stack.pop_n(instr.operand_types.len()).map_err(fail)?;
                let results = instr
                    .result_types
                    .iter()
                    .map(|ty| out.add_slot(*ty))
                    .collect::<Vec<_>>();
                let cmd = match input.branch_target(idx) {
                    Some(target) => instr.cmd.with_label(out.labels.create(target)),
                    None => instr.cmd.clone(),
                };
                let emitted = out.instrs.push(Xil3Instr::new(
                    cmd,
                    tr.map_preds(&instr.preds),
                    operands,
                    results.iter().copied(),
                ));
                tr.emitted(emitted);
                tr.set_primary(emitted);
                results.into_iter().for_each(|r| stack.push(r));
                if op.is_terminator() {
                    stack.clear();
                }
            }
        }
    }

    let (labels, _) = tr.finish(&out.labels, out.instrs.len());
    out.labels = labels;
    log::debug!(
        "{}: {} stack instructions became {} three-address instructions, {} unreachable dropped",
        input.name,
        input.instrs.len(),
        out.instrs.len(),
        dropped
    );
    Ok(out)
}
