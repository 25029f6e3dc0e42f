use super::{RewriteResult, Translation};
use smallvec::SmallVec;
use xil_ir::{
    InstrIdx, InstrList, LabelIdx, Preds, SlotIdx, Xil3Function, Xil3Instr,
};
use xil_utils::{Error, IndexRef, XilResult};

/// The per-instruction hook of a three-address rewriter.
pub trait Xil3Rewrite {
    /// Called before the first instruction of every basic block.
    fn begin_block(&mut self, _rw: &mut Xil3Rewriter<'_>, _start: InstrIdx) {}

    /// Translate one input instruction. The default copies it.
    fn rewrite(
        &mut self,
        rw: &mut Xil3Rewriter<'_>,
        _idx: InstrIdx,
        instr: &Xil3Instr,
    ) -> XilResult<()> {
        rw.process_default(instr)
    }
}

/// Output state of a three-address rewrite. Output slots are allocated
/// densely in the order they are first defined.
pub struct Xil3Rewriter<'a> {
    input: &'a Xil3Function,
    output: Xil3Function,
    slots: Vec<Option<SlotIdx>>,
    tr: Translation,
}

impl<'a> Xil3Rewriter<'a> {
    fn new(input: &'a Xil3Function) -> Self {
        let mut output = Xil3Function::new(input.name);
        output.args = input.args.clone();
        output.locals = input.locals.clone();
        output.labels = input.labels.clone();
        Self {
            input,
            output,
            slots: vec![None; input.slot_types.len()],
            tr: Translation::new(input.instrs.len()),
        }
    }

    pub fn input(&self) -> &'a Xil3Function {
        self.input
    }

    /// The output slot holding the value of input slot `slot`.
    pub fn slot(&self, slot: SlotIdx) -> XilResult<SlotIdx> {
        self.slots
            .get(slot.index())
            .copied()
            .flatten()
            .ok_or_else(|| {
                Error::malformed_structure(format!(
                    "slot @{} is used before it is defined",
                    slot.index()
                ))
            })
    }

    pub fn map_operands(&self, operands: &[SlotIdx]) -> XilResult<SmallVec<[SlotIdx; 3]>> {
        operands.iter().map(|s| self.slot(*s)).collect()
    }

    /// Allocate an output slot for each of the input slots `results`.
    pub fn fresh_results(&mut self, results: &[SlotIdx]) -> SmallVec<[SlotIdx; 2]> {
        results
            .iter()
            .map(|s| {
                let out = self.output.add_slot(self.input.slot_type(*s));
                self.slots[s.index()] = Some(out);
                out
            })
            .collect()
    }

    /// Let the input slot `slot` be represented by the existing output slot
    /// `to`.
    pub fn alias_slot(&mut self, slot: SlotIdx, to: SlotIdx) {
        self.slots[slot.index()] = Some(to);
    }

    /// Let dependencies on the current instruction refer to `to`.
    pub fn alias_instr(&mut self, to: InstrIdx) {
        self.tr.set_primary(to);
    }

    pub fn map_preds(&self, preds: &Preds) -> Preds {
        self.tr.map_preds(preds)
    }

    /// Append an instruction that is already in output space.
    pub fn emit(&mut self, instr: Xil3Instr) -> InstrIdx {
        let idx = self.output.instrs.push(instr);
        self.tr.emitted(idx);
        idx
    }

    /// Append the instruction that stands for the current input instruction.
    pub fn emit_primary(&mut self, instr: Xil3Instr) -> InstrIdx {
        let idx = self.emit(instr);
        self.tr.set_primary(idx);
        idx
    }

    /// Copy `instr` into output space.
    pub fn process_default(&mut self, instr: &Xil3Instr) -> XilResult<()> {
        let operands = self.map_operands(&instr.operands)?;
        let results = self.fresh_results(&instr.results);
        let preds = self.map_preds(&instr.preds);
        self.emit_primary(Xil3Instr {
            cmd: instr.cmd.clone(),
            preds,
            operands,
            results,
        });
        Ok(())
    }

    /// A new label for the input instruction `target`.
    pub fn create_label(&mut self, target: InstrIdx) -> LabelIdx {
        self.output.labels.create(target)
    }

    pub fn output(&self) -> &Xil3Function {
        &self.output
    }

    /// Run `rewrite` over every instruction of `input`.
    pub fn run<R: Xil3Rewrite>(
        input: &'a Xil3Function,
        rewrite: &mut R,
    ) -> XilResult<RewriteResult<Xil3Function>> {
        let bounds = input.basic_block_boundaries();
        let mut rw = Xil3Rewriter::new(input);
        for (idx, instr) in input.instrs.iter() {
            rw.tr.begin(idx);
            if bounds.contains(&idx) {
                rewrite.begin_block(&mut rw, idx);
            }
            rewrite
                .rewrite(&mut rw, idx, instr)
                .map_err(|e| e.at_instr(idx.index()).in_function(input.name))?;
        }
        let Xil3Rewriter {
            mut output,
            slots,
            tr,
            ..
        } = rw;
        let (labels, instr_remap) = tr.finish(&output.labels, output.instrs.len());
        output.labels = labels;
        log::debug!(
            "{}: {} -> {} instructions, {} -> {} slots",
            input.name,
            input.instrs.len(),
            output.instrs.len(),
            input.slot_types.len(),
            output.slot_types.len()
        );
        Ok(RewriteResult {
            function: output,
            instr_remap,
            slot_remap: slots,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xil_ir::{Opcode, StaticOperand, Type, Value, XilInstr};

    /// Drops every `Nop`.
    struct DropNops;

    impl Xil3Rewrite for DropNops {
        fn rewrite(
            &mut self,
            rw: &mut Xil3Rewriter<'_>,
            _idx: InstrIdx,
            instr: &Xil3Instr,
        ) -> XilResult<()> {
            if instr.cmd.op == Opcode::Nop {
                return Ok(());
            }
            rw.process_default(instr)
        }
    }

    #[test]
    fn labels_and_slots_follow_the_output() {
        let mut f = Xil3Function::new("f");
        let unused = f.add_slot(Type::Bool);
        let a = f.add_slot(Type::Signed(8));
        let l = f.labels.create(InstrIdx::new(2));
        f.instrs.push(Xil3Instr::new(
            XilInstr::new(Opcode::LdConst, StaticOperand::Const(Value::Int(1))),
            Preds::new(),
            [],
            [a],
        ));
        f.instrs.push(Xil3Instr::new(
            XilInstr::new(Opcode::Goto, StaticOperand::Label(l)),
            Preds::new(),
            [],
            [],
        ));
        f.instrs.push(Xil3Instr::new(XilInstr::simple(Opcode::Nop), Preds::new(), [], []));
        f.instrs.push(Xil3Instr::new(XilInstr::simple(Opcode::Ret), Preds::new(), [a], []));
        f.validate().unwrap();

        let res = Xil3Rewriter::run(&f, &mut DropNops).unwrap();
        let out = res.function;
        out.validate().unwrap();
        assert_eq!(out.instrs.len(), 3);
        assert_eq!(out.labels.target(l), InstrIdx::new(2));
        assert_eq!(out.slot_types.len(), 1);
        assert_eq!(res.slot_remap[unused.index()], None);
        assert_eq!(res.slot_remap[a.index()], Some(SlotIdx::new(0)));
        assert_eq!(res.instr_remap[2], None);
    }
}
