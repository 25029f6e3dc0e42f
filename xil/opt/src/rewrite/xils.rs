use super::{RewriteResult, Translation};
use xil_ir::{
    InstrIdx, InstrList, LabelIdx, Preds, StackModel, StackTypes, Type,
    XilsFunction, XilsInstr,
};
use xil_utils::{Error, IndexRef, XilResult};

/// The per-instruction hook of a stack rewriter.
pub trait XilsRewrite {
    /// Called before the first instruction of every basic block, after the
    /// type stack has been reset to the block's entry stack.
    fn begin_block(
        &mut self,
        _rw: &mut XilsRewriter<'_>,
        _start: InstrIdx,
    ) -> XilResult<()> {
        Ok(())
    }

    /// Translate one input instruction. The default copies it.
    fn rewrite(
        &mut self,
        rw: &mut XilsRewriter<'_>,
        _idx: InstrIdx,
        instr: &XilsInstr,
    ) -> XilResult<()> {
        rw.process_default(instr)
    }
}

/// Output state of a stack rewrite.
///
/// The rewriter simulates the types on the output stack and rejects any
/// emitted instruction whose operands do not match it. At every block
/// boundary the simulation restarts from the input's entry stack, so a
/// rewrite has to leave each block with the stack the input leaves it with.
pub struct XilsRewriter<'a> {
    input: &'a XilsFunction,
    output: XilsFunction,
    tr: Translation,
    entry: StackTypes,
    stack: StackModel<Type>,
    reachable: bool,
}

impl<'a> XilsRewriter<'a> {
    fn new(input: &'a XilsFunction) -> XilResult<Self> {
        let mut output = XilsFunction::new(input.name);
        output.args = input.args.clone();
        output.locals = input.locals.clone();
        output.labels = input.labels.clone();
        Ok(Self {
            input,
            output,
            tr: Translation::new(input.instrs.len()),
            entry: input.stack_types()?,
            stack: StackModel::new(),
            reachable: true,
        })
    }

    pub fn input(&self) -> &'a XilsFunction {
        self.input
    }

    /// Types on the output stack before the next emitted instruction.
    pub fn stack(&self) -> &StackModel<Type> {
        &self.stack
    }

    /// Whether the current block is reachable from the entry. The stack is
    /// not simulated in unreachable blocks.
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// The input's entry stack at `idx`.
    pub fn entry_types(&self, idx: InstrIdx) -> Option<&[Type]> {
        self.entry.get(idx.index()).and_then(|s| s.as_deref())
    }

    pub fn map_preds(&self, preds: &Preds) -> Preds {
        self.tr.map_preds(preds)
    }

    /// Append an instruction that is already in output space.
    pub fn emit(&mut self, instr: XilsInstr) -> XilResult<InstrIdx> {
        if self.reachable {
            let n = instr.operand_types.len();
            let top = self.stack.top(n)?;
            if top != instr.operand_types.as_slice() {
                return Err(Error::malformed_structure(format!(
                    "emitted `{}' does not match the stack",
                    instr.cmd.op
                )));
            }
            self.stack.pop_n(n)?;
            for ty in &instr.result_types {
                self.stack.push(*ty);
            }
            if instr.cmd.op.is_terminator() {
                self.stack.clear();
            }
        }
        let idx = self.output.instrs.push(instr);
        self.tr.emitted(idx);
        Ok(idx)
    }

    /// Append the instruction that stands for the current input instruction.
    pub fn emit_primary(&mut self, instr: XilsInstr) -> XilResult<InstrIdx> {
        let idx = self.emit(instr)?;
        self.tr.set_primary(idx);
        Ok(idx)
    }

    /// Copy `instr` into output space.
    pub fn process_default(&mut self, instr: &XilsInstr) -> XilResult<()> {
        let mut out = instr.clone();
        out.preds = self.map_preds(&instr.preds);
        self.emit_primary(out)?;
        Ok(())
    }

    /// The label pointing at the input instruction `target`, creating one if
    /// none exists.
    pub fn label_for(&mut self, target: InstrIdx) -> LabelIdx {
        self.output.labels.find_or_create(target)
    }

    /// A new label for the input instruction `target`.
    pub fn create_label(&mut self, target: InstrIdx) -> LabelIdx {
        self.output.labels.create(target)
    }

    fn enter_block(&mut self, idx: InstrIdx) {
        match self.entry.get(idx.index()).cloned().flatten() {
            Some(types) => {
                self.stack = StackModel::from_bottom_up(types);
                self.reachable = true;
            }
            None => {
                self.stack.clear();
                self.reachable = false;
            }
        }
    }

    /// Run `rewrite` over every instruction of `input`. The input has to be
    /// stack-consistent.
    pub fn run<R: XilsRewrite>(
        input: &'a XilsFunction,
        rewrite: &mut R,
    ) -> XilResult<RewriteResult<XilsFunction>> {
        let bounds = input.basic_block_boundaries();
        let mut rw = XilsRewriter::new(input)?;
        for (idx, instr) in input.instrs.iter() {
            rw.tr.begin(idx);
            let res = if bounds.contains(&idx) {
                rw.enter_block(idx);
                rewrite.begin_block(&mut rw, idx)
            } else {
                Ok(())
            };
            res.and_then(|()| rewrite.rewrite(&mut rw, idx, instr))
                .map_err(|e| e.at_instr(idx.index()).in_function(input.name))?;
        }
        let XilsRewriter { mut output, tr, .. } = rw;
        let (labels, instr_remap) = tr.finish(&output.labels, output.instrs.len());
        output.labels = labels;
        log::debug!(
            "{}: {} -> {} instructions",
            input.name,
            input.instrs.len(),
            output.instrs.len()
        );
        Ok(RewriteResult {
            function: output,
            instr_remap,
            slot_remap: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xil_ir::{Opcode, StaticOperand, Value, XilInstr};

    /// Replaces `Dup` by a second copy of the preceding constant.
    struct Unshare;

    impl XilsRewrite for Unshare {
        fn rewrite(
            &mut self,
            rw: &mut XilsRewriter<'_>,
            idx: InstrIdx,
            instr: &XilsInstr,
        ) -> XilResult<()> {
            if instr.cmd.op != Opcode::Dup {
                return rw.process_default(instr);
            }
            let prev = rw.input().instrs[InstrIdx::new(idx.index() - 1)].clone();
            rw.emit_primary(prev)?;
            Ok(())
        }
    }

    /// Emits a `Pop` of a type that is not on the stack.
    struct Broken;

    impl XilsRewrite for Broken {
        fn rewrite(
            &mut self,
            rw: &mut XilsRewriter<'_>,
            _idx: InstrIdx,
            _instr: &XilsInstr,
        ) -> XilResult<()> {
            rw.emit(XilsInstr::pop(Type::Bool))?;
            Ok(())
        }
    }

    fn dup_add() -> XilsFunction {
        let i8 = Type::Signed(8);
        let mut f = XilsFunction::new("f");
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::LdConst, StaticOperand::Const(Value::Int(3))),
            Preds::new(),
            [],
            [i8],
        ));
        f.instrs.push(XilsInstr::dup(i8));
        f.instrs.push(XilsInstr::new(XilInstr::simple(Opcode::Add), Preds::new(), [i8, i8], [i8]));
        f.instrs.push(XilsInstr::new(XilInstr::simple(Opcode::Ret), Preds::new(), [i8], []));
        f
    }

    #[test]
    fn types_are_tracked() {
        let f = dup_add();
        let res = XilsRewriter::run(&f, &mut Unshare).unwrap();
        res.function.validate().unwrap();
        assert_eq!(res.function.instrs[InstrIdx::new(1)].cmd.op, Opcode::LdConst);
        assert!(res.slot_remap.is_empty());
    }

    #[test]
    fn mismatched_emission_is_rejected() {
        let err = XilsRewriter::run(&dup_add(), &mut Broken).unwrap_err();
        assert_eq!(err.instr(), Some(0));
    }
}
