//! Intermediate representations of the XIL back-end: the instruction model,
//! the three-address and stack function forms, and the flow matrix consumed
//! by interconnect synthesis.
mod context;
mod flow;
mod flow_matrix;
mod function;
mod instr;
mod label;
mod opcode;
mod printer;
mod process;
mod rtl;
mod signal;
mod types;
mod value;

pub mod eval;
pub mod stack;

pub use context::{Context, Design, Function};
pub use flow::{
    DelayedSignalFlow, Flow, ParFlow, SignalFlow, TimedFlow, ValueFlow,
};
pub use flow_matrix::FlowMatrix;
pub use function::{
    ArgDesc, InstrList, StackTypes, VarDesc, Xil3Function, XilsFunction,
    local_access,
};
pub use instr::{
    ArgIdx, Dependency, InstrIdx, LabelIdx, LocalIdx, OrderKind, Preds,
    SlotIdx, StaticOperand, VarRef, Xil3Instr, XilInstr, XilsInstr,
};
pub use label::LabelTable;
pub use opcode::Opcode;
pub use printer::Printer;
pub use process::{BinOp, Expr, Process, Statement, UnOp};
pub use rtl::{
    Interconnect, InterconnectStats, Memory, Register, SyncProcess,
};
pub use signal::{SignalKind, SignalRef};
pub use stack::StackModel;
pub use types::Type;
pub use value::{StdLogic, StdLogicVector, Value};
