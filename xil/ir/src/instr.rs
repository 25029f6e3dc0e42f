use crate::{Opcode, Type, Value};
use smallvec::SmallVec;
use xil_utils::{Id, impl_index};

/// Position of an instruction in a function's instruction list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstrIdx(u32);
impl_index!(InstrIdx);

/// A three-address slot (virtual register).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIdx(u32);
impl_index!(SlotIdx);

/// An entry in a function's label table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LabelIdx(u32);
impl_index!(LabelIdx);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalIdx(u32);
impl_index!(LocalIdx);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArgIdx(u32);
impl_index!(ArgIdx);

/// A variable accessed by `Ldv` and `Stv`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VarRef {
    Local(LocalIdx),
    Arg(ArgIdx),
}

/// The static operand of an instruction: everything that is fixed at compile
/// time rather than passed in a slot or on the stack.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StaticOperand {
    None,
    Label(LabelIdx),
    Const(Value),
    Var(VarRef),
    Port(Id),
    Memory(Id),
    /// A memory word at a fixed address.
    MemoryCell(Id, u64),
    /// Depth operand of `Dig`.
    Depth(usize),
    /// Bit range `hi downto lo` of `Slice`.
    Range { hi: u32, lo: u32 },
}

/// How an order dependency constrains its successor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OrderKind {
    /// The successor may not begin before the predecessor begins.
    BeginAfter,
    /// The successor may not begin before the predecessor completes.
    CompleteAfter,
}

/// An ordering constraint on a predecessor instruction that is not carried
/// by an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dependency {
    Order {
        pred: InstrIdx,
        kind: OrderKind,
    },
    Time {
        pred: InstrIdx,
        min_delay: u32,
        max_delay: u32,
    },
}

impl Dependency {
    pub fn order(pred: InstrIdx, kind: OrderKind) -> Self {
        Dependency::Order { pred, kind }
    }

    pub fn time(pred: InstrIdx, min_delay: u32, max_delay: u32) -> Self {
        Dependency::Time {
            pred,
            min_delay,
            max_delay,
        }
    }

    pub fn pred(&self) -> InstrIdx {
        match self {
            Dependency::Order { pred, .. } | Dependency::Time { pred, .. } => {
                *pred
            }
        }
    }

    /// The same constraint on a different predecessor.
    pub fn remap(&self, new_pred: InstrIdx) -> Self {
        let mut dep = *self;
        match &mut dep {
            Dependency::Order { pred, .. } | Dependency::Time { pred, .. } => {
                *pred = new_pred
            }
        }
        dep
    }
}

pub type Preds = SmallVec<[Dependency; 2]>;

/// Opcode together with its static operand.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct XilInstr {
    pub op: Opcode,
    pub operand: StaticOperand,
}

impl XilInstr {
    pub fn new(op: Opcode, operand: StaticOperand) -> Self {
        Self { op, operand }
    }

    pub fn simple(op: Opcode) -> Self {
        Self::new(op, StaticOperand::None)
    }

    pub fn label(&self) -> Option<LabelIdx> {
        match self.operand {
            StaticOperand::Label(l) => Some(l),
            _ => None,
        }
    }

    pub fn with_label(&self, label: LabelIdx) -> Self {
        Self::new(self.op, StaticOperand::Label(label))
    }

    pub fn local(&self) -> Option<LocalIdx> {
        match self.operand {
            StaticOperand::Var(VarRef::Local(l)) => Some(l),
            _ => None,
        }
    }
}

/// A three-address instruction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Xil3Instr {
    pub cmd: XilInstr,
    pub preds: Preds,
    pub operands: SmallVec<[SlotIdx; 3]>,
    pub results: SmallVec<[SlotIdx; 2]>,
}

impl Xil3Instr {
    pub fn new<O, R>(cmd: XilInstr, preds: Preds, operands: O, results: R) -> Self
    where
        O: IntoIterator<Item = SlotIdx>,
        R: IntoIterator<Item = SlotIdx>,
    {
        Self {
            cmd,
            preds,
            operands: operands.into_iter().collect(),
            results: results.into_iter().collect(),
        }
    }
}

/// A stack instruction. Operand types are listed from the deepest stack
/// element to the top; the last result ends up on top of the stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct XilsInstr {
    pub cmd: XilInstr,
    pub preds: Preds,
    pub operand_types: SmallVec<[Type; 3]>,
    pub result_types: SmallVec<[Type; 2]>,
}

impl XilsInstr {
    pub fn new<O, R>(
        cmd: XilInstr,
        preds: Preds,
        operand_types: O,
        result_types: R,
    ) -> Self
    where
        O: IntoIterator<Item = Type>,
        R: IntoIterator<Item = Type>,
    {
        Self {
            cmd,
            preds,
            operand_types: operand_types.into_iter().collect(),
            result_types: result_types.into_iter().collect(),
        }
    }

    pub fn nop() -> Self {
        Self::new(XilInstr::simple(Opcode::Nop), Preds::new(), [], [])
    }

    pub fn pop(ty: Type) -> Self {
        Self::new(XilInstr::simple(Opcode::Pop), Preds::new(), [ty], [])
    }

    pub fn dup(ty: Type) -> Self {
        Self::new(XilInstr::simple(Opcode::Dup), Preds::new(), [ty], [ty, ty])
    }

    pub fn swap(below: Type, top: Type) -> Self {
        Self::new(
            XilInstr::simple(Opcode::Swap),
            Preds::new(),
            [below, top],
            [top, below],
        )
    }

    /// `Dig(n)` over the top `n + 1` stack types, given deepest first. The
    /// deepest of them moves to the top.
    pub fn dig(types: &[Type], preds: Preds) -> Self {
        debug_assert!(!types.is_empty());
        let n = types.len() - 1;
        Self::new(
            XilInstr::new(Opcode::Dig, StaticOperand::Depth(n)),
            preds,
            types.iter().copied(),
            types[1..].iter().chain(&types[..1]).copied(),
        )
    }

    pub fn load_var(var: VarRef, ty: Type) -> Self {
        Self::new(
            XilInstr::new(Opcode::Ldv, StaticOperand::Var(var)),
            Preds::new(),
            [],
            [ty],
        )
    }

    pub fn store_var(var: VarRef, ty: Type) -> Self {
        Self::new(
            XilInstr::new(Opcode::Stv, StaticOperand::Var(var)),
            Preds::new(),
            [ty],
            [],
        )
    }

    /// Whether the operand and result types match the shape that the opcode
    /// requires. Only the stack shuffles have a fixed shape.
    pub fn has_valid_shape(&self) -> bool {
        let ops = &self.operand_types;
        let res = &self.result_types;
        match self.cmd.op {
            Opcode::Pop => ops.len() == 1 && res.is_empty(),
            Opcode::Dup => {
                ops.len() == 1 && res.len() == 2 && res[0] == ops[0] && res[1] == ops[0]
            }
            Opcode::Swap => {
                ops.len() == 2 && res.len() == 2 && ops[0] == res[1] && ops[1] == res[0]
            }
            Opcode::Dig => match self.cmd.operand {
                StaticOperand::Depth(n) => {
                    ops.len() == n + 1
                        && res.len() == n + 1
                        && res[n] == ops[0]
                        && res[..n] == ops[1..]
                }
                _ => false,
            },
            Opcode::BrTrue | Opcode::BrFalse => ops.len() == 1 && res.is_empty(),
            Opcode::Goto => ops.is_empty() && res.is_empty(),
            _ => true,
        }
    }
}
