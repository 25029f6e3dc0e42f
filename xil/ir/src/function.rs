use crate::{
    ArgIdx, InstrIdx, LabelTable, LocalIdx, Opcode, Preds, SlotIdx,
    StaticOperand, Type, VarRef, XilInstr, Xil3Instr, XilsInstr,
};
use std::collections::{BTreeSet, VecDeque};
use xil_utils::{Error, Id, IndexRef, IndexedMap, XilResult};

/// Descriptor of a function argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArgDesc {
    pub name: Id,
    pub ty: Type,
}

/// Descriptor of a local variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VarDesc {
    pub name: Id,
    pub ty: Type,
}

impl VarDesc {
    pub fn new<S: Into<Id>>(name: S, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

impl ArgDesc {
    pub fn new<S: Into<Id>>(name: S, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Queries shared by both instruction forms.
pub trait InstrList {
    fn name(&self) -> Id;
    fn len(&self) -> usize;
    fn cmd(&self, idx: InstrIdx) -> &XilInstr;
    fn preds(&self, idx: InstrIdx) -> &Preds;
    fn labels(&self) -> &LabelTable;
    fn locals(&self) -> &IndexedMap<LocalIdx, VarDesc>;
    fn args(&self) -> &IndexedMap<ArgIdx, ArgDesc>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn var_type(&self, var: VarRef) -> Option<Type> {
        match var {
            VarRef::Local(l) => self.locals().get(l).map(|v| v.ty),
            VarRef::Arg(a) => self.args().get(a).map(|v| v.ty),
        }
    }

    /// Target of the branch at `idx`.
    fn branch_target(&self, idx: InstrIdx) -> Option<InstrIdx> {
        let cmd = self.cmd(idx);
        if !cmd.op.is_branch() {
            return None;
        }
        cmd.label().and_then(|l| self.labels().get(l))
    }

    /// Instructions that may execute right after `idx`. Falling off the end
    /// of the function is not a successor.
    fn successors(&self, idx: InstrIdx) -> Vec<InstrIdx> {
        let op = self.cmd(idx).op;
        let mut succs = Vec::with_capacity(2);
        if !op.is_terminator() && idx.index() + 1 < self.len() {
            succs.push(InstrIdx::new(idx.index() + 1));
        }
        if let Some(target) = self.branch_target(idx) {
            if target.index() < self.len() && !succs.contains(&target) {
                succs.push(target);
            }
        }
        succs
    }

    /// Indices that begin a basic block: the entry, every branch target, and
    /// every instruction that follows a branch or a terminator.
    fn basic_block_boundaries(&self) -> BTreeSet<InstrIdx> {
        let mut bounds = BTreeSet::new();
        if self.is_empty() {
            return bounds;
        }
        bounds.insert(InstrIdx::new(0));
        for i in 0..self.len() {
            let idx = InstrIdx::new(i);
            let op = self.cmd(idx).op;
            if let Some(target) = self.branch_target(idx) {
                if target.index() < self.len() {
                    bounds.insert(target);
                }
            }
            if (op.is_branch() || op.is_terminator()) && i + 1 < self.len() {
                bounds.insert(InstrIdx::new(i + 1));
            }
        }
        bounds
    }
}

fn check_label<F: InstrList>(func: &F, idx: InstrIdx) -> XilResult<()> {
    let cmd = func.cmd(idx);
    if !cmd.op.is_branch() {
        return Ok(());
    }
    let Some(label) = cmd.label() else {
        return Err(Error::malformed_structure(format!(
            "branch `{}' without a label",
            cmd.op
        )));
    };
    match func.labels().get(label) {
        None => Err(Error::malformed_structure(format!(
            "undefined label L{}",
            label.index()
        ))),
        Some(t) if t.index() > func.len() => Err(Error::malformed_structure(
            format!("label L{} points past the end: {}", label.index(), t.index()),
        )),
        Some(_) => Ok(()),
    }
}

fn check_preds<F: InstrList>(func: &F, idx: InstrIdx) -> XilResult<()> {
    for dep in func.preds(idx) {
        if dep.pred() >= idx {
            return Err(Error::malformed_structure(format!(
                "dependency on instruction {} does not precede its successor",
                dep.pred().index()
            )));
        }
    }
    Ok(())
}

/// A function in three-address form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Xil3Function {
    pub name: Id,
    pub args: IndexedMap<ArgIdx, ArgDesc>,
    pub locals: IndexedMap<LocalIdx, VarDesc>,
    pub instrs: IndexedMap<InstrIdx, Xil3Instr>,
    pub slot_types: IndexedMap<SlotIdx, Type>,
    pub labels: LabelTable,
}

impl Xil3Function {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        Self {
            name: name.into(),
            args: IndexedMap::new(),
            locals: IndexedMap::new(),
            instrs: IndexedMap::new(),
            slot_types: IndexedMap::new(),
            labels: LabelTable::new(),
        }
    }

    pub fn slot_type(&self, slot: SlotIdx) -> Type {
        self.slot_types[slot]
    }

    pub fn label_target(&self, label: crate::LabelIdx) -> InstrIdx {
        self.labels.target(label)
    }

    /// Allocate a fresh slot.
    pub fn add_slot(&mut self, ty: Type) -> SlotIdx {
        self.slot_types.push(ty)
    }

    /// Check slot ranges, single definition of every slot before its uses,
    /// label ranges, and dependency ranges.
    pub fn validate(&self) -> XilResult<()> {
        let mut defined_at: Vec<Option<InstrIdx>> =
            vec![None; self.slot_types.len()];
        for (idx, instr) in self.instrs.iter() {
            self.validate_instr(idx, instr, &mut defined_at)
                .map_err(|e| e.at_instr(idx.index()).in_function(self.name))?;
        }
        Ok(())
    }

    fn validate_instr(
        &self,
        idx: InstrIdx,
        instr: &Xil3Instr,
        defined_at: &mut [Option<InstrIdx>],
    ) -> XilResult<()> {
        let op = instr.cmd.op;
        if op.is_stack_only() {
            return Err(Error::malformed_structure(format!(
                "stack-only opcode `{op}' in three-address code"
            )));
        }
        for slot in &instr.operands {
            match defined_at.get(slot.index()) {
                None => {
                    return Err(Error::malformed_structure(format!(
                        "operand slot @{} out of range",
                        slot.index()
                    )));
                }
                Some(None) => {
                    return Err(Error::malformed_structure(format!(
                        "operand slot @{} used before its definition",
                        slot.index()
                    )));
                }
                Some(Some(_)) => (),
            }
        }
        for slot in &instr.results {
            match defined_at.get_mut(slot.index()) {
                None => {
                    return Err(Error::malformed_structure(format!(
                        "result slot @{} out of range",
                        slot.index()
                    )));
                }
                Some(Some(prev)) => {
                    return Err(Error::malformed_structure(format!(
                        "slot @{} already defined by instruction {}",
                        slot.index(),
                        prev.index()
                    )));
                }
                Some(def) => *def = Some(idx),
            }
        }
        if op.is_conditional_branch() && instr.operands.len() != 1 {
            return Err(Error::malformed_structure(
                "conditional branch needs exactly one operand",
            ));
        }
        check_label(self, idx)?;
        check_preds(self, idx)
    }
}

impl InstrList for Xil3Function {
    fn name(&self) -> Id {
        self.name
    }

    fn len(&self) -> usize {
        self.instrs.len()
    }

    fn cmd(&self, idx: InstrIdx) -> &XilInstr {
        &self.instrs[idx].cmd
    }

    fn preds(&self, idx: InstrIdx) -> &Preds {
        &self.instrs[idx].preds
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn locals(&self) -> &IndexedMap<LocalIdx, VarDesc> {
        &self.locals
    }

    fn args(&self) -> &IndexedMap<ArgIdx, ArgDesc> {
        &self.args
    }
}

/// A function in stack form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XilsFunction {
    pub name: Id,
    pub args: IndexedMap<ArgIdx, ArgDesc>,
    pub locals: IndexedMap<LocalIdx, VarDesc>,
    pub instrs: IndexedMap<InstrIdx, XilsInstr>,
    pub labels: LabelTable,
}

/// Entry stack of every instruction, deepest type first. `None` marks an
/// unreachable instruction.
pub type StackTypes = Vec<Option<Vec<Type>>>;

impl XilsFunction {
    pub fn new<S: Into<Id>>(name: S) -> Self {
        Self {
            name: name.into(),
            args: IndexedMap::new(),
            locals: IndexedMap::new(),
            instrs: IndexedMap::new(),
            labels: LabelTable::new(),
        }
    }

    /// Check instruction shapes and labels, and that the stack never
    /// underflows and agrees at every block entry across predecessors.
    pub fn validate(&self) -> XilResult<()> {
        for (idx, instr) in self.instrs.iter() {
            let check = || -> XilResult<()> {
                if !instr.has_valid_shape() {
                    return Err(Error::malformed_structure(format!(
                        "malformed `{}' instruction",
                        instr.cmd.op
                    )));
                }
                check_label(self, idx)?;
                check_preds(self, idx)
            };
            check().map_err(|e| e.at_instr(idx.index()).in_function(self.name))?;
        }
        self.stack_types().map(|_| ())
    }

    /// Simulate the types on the stack over all control paths.
    pub fn stack_types(&self) -> XilResult<StackTypes> {
        let mut entry: StackTypes = vec![None; self.instrs.len()];
        if self.instrs.is_empty() {
            return Ok(entry);
        }
        entry[0] = Some(vec![]);
        let mut worklist = VecDeque::from([InstrIdx::new(0)]);
        while let Some(idx) = worklist.pop_front() {
            let instr = &self.instrs[idx];
            let mut stack = entry[idx.index()].clone().unwrap_or_default();
            let fail = |e: Error| e.at_instr(idx.index()).in_function(self.name);
            let n = instr.operand_types.len();
            if stack.len() < n {
                return Err(fail(Error::malformed_structure(format!(
                    "stack underflow: `{}' needs {n} operands but the stack holds {}",
                    instr.cmd.op,
                    stack.len()
                ))));
            }
            let operands = stack.split_off(stack.len() - n);
            if operands.as_slice() != instr.operand_types.as_slice() {
                return Err(fail(Error::malformed_structure(format!(
                    "operand types of `{}' do not match the stack",
                    instr.cmd.op
                ))));
            }
            stack.extend(instr.result_types.iter().copied());
            for succ in self.successors(idx) {
                match &entry[succ.index()] {
                    None => {
                        entry[succ.index()] = Some(stack.clone());
                        worklist.push_back(succ);
                    }
                    Some(prev) if *prev != stack => {
                        return Err(Error::malformed_structure(format!(
                            "inconsistent stack at block entry: depth {} and {}",
                            prev.len(),
                            stack.len()
                        ))
                        .at_instr(succ.index())
                        .in_function(self.name));
                    }
                    Some(_) => (),
                }
            }
        }
        Ok(entry)
    }

    /// Entry stack depth of every reachable instruction.
    pub fn stack_depths(&self) -> XilResult<Vec<Option<usize>>> {
        Ok(self
            .stack_types()?
            .into_iter()
            .map(|s| s.map(|s| s.len()))
            .collect())
    }
}

impl InstrList for XilsFunction {
    fn name(&self) -> Id {
        self.name
    }

    fn len(&self) -> usize {
        self.instrs.len()
    }

    fn cmd(&self, idx: InstrIdx) -> &XilInstr {
        &self.instrs[idx].cmd
    }

    fn preds(&self, idx: InstrIdx) -> &Preds {
        &self.instrs[idx].preds
    }

    fn labels(&self) -> &LabelTable {
        &self.labels
    }

    fn locals(&self) -> &IndexedMap<LocalIdx, VarDesc> {
        &self.locals
    }

    fn args(&self) -> &IndexedMap<ArgIdx, ArgDesc> {
        &self.args
    }
}

/// Whether the instruction is a `Stv` or `Ldv` of a local rather than an
/// argument.
pub fn local_access(cmd: &XilInstr) -> Option<(Opcode, LocalIdx)> {
    match (cmd.op, &cmd.operand) {
        (Opcode::Ldv | Opcode::Stv, StaticOperand::Var(VarRef::Local(l))) => {
            Some((cmd.op, *l))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LabelIdx, Value};

    fn branchy() -> XilsFunction {
        // 0: LdConst true; 1: BrTrue L0; 2: Goto L1; 3: Nop; 4: Ret
        let mut f = XilsFunction::new("branchy");
        let l0 = f.labels.create(InstrIdx::new(3));
        let l1 = f.labels.create(InstrIdx::new(4));
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::LdConst, StaticOperand::Const(Value::Bool(true))),
            Preds::new(),
            [],
            [Type::Bool],
        ));
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::BrTrue, StaticOperand::Label(l0)),
            Preds::new(),
            [Type::Bool],
            [],
        ));
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::Goto, StaticOperand::Label(l1)),
            Preds::new(),
            [],
            [],
        ));
        f.instrs.push(XilsInstr::nop());
        f.instrs.push(XilsInstr::new(XilInstr::simple(Opcode::Ret), Preds::new(), [], []));
        f
    }

    #[test]
    fn boundaries_and_successors() {
        let f = branchy();
        let bounds = f.basic_block_boundaries();
        let bounds = bounds.iter().map(|i| i.index()).collect::<Vec<_>>();
        assert_eq!(bounds, vec![0, 2, 3, 4]);
        assert_eq!(f.successors(InstrIdx::new(1)), vec![InstrIdx::new(2), InstrIdx::new(3)]);
        assert_eq!(f.successors(InstrIdx::new(2)), vec![InstrIdx::new(4)]);
        assert!(f.successors(InstrIdx::new(4)).is_empty());
        f.validate().unwrap();
    }

    #[test]
    fn inconsistent_depth_is_rejected() {
        let mut f = branchy();
        // Jumping to 4 with a value left on the stack disagrees with the
        // fall-through path through 3.
        f.instrs[InstrIdx::new(3)] = XilsInstr::new(
            XilInstr::simple(Opcode::Ld0),
            Preds::new(),
            [],
            [Type::Signed(32)],
        );
        let err = f.validate().unwrap_err();
        assert_eq!(err.instr(), Some(4));
    }

    #[test]
    fn undefined_label_is_rejected() {
        let mut f = branchy();
        f.instrs[InstrIdx::new(2)].cmd = XilInstr::new(
            Opcode::Goto,
            StaticOperand::Label(LabelIdx::new(7)),
        );
        assert!(f.validate().is_err());
    }

    #[test]
    fn xil3_use_before_definition() {
        let mut f = Xil3Function::new("f");
        let a = f.add_slot(Type::Signed(8));
        let b = f.add_slot(Type::Signed(8));
        f.instrs.push(Xil3Instr::new(
            XilInstr::simple(Opcode::Neg),
            Preds::new(),
            [b],
            [a],
        ));
        f.instrs.push(Xil3Instr::new(XilInstr::simple(Opcode::Ld0), Preds::new(), [], [b]));
        let err = f.validate().unwrap_err();
        assert_eq!(err.instr(), Some(0));
    }
}
