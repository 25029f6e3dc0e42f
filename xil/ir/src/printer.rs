//! Implements a formatter for XIL functions and compilation contexts.
use crate::{
    self as ir, Dependency, InstrIdx, InstrList, OrderKind, StaticOperand,
    VarRef,
};
use itertools::Itertools;
use std::{fmt, io};
use xil_utils::IndexRef;

/// Printer for the IR.
pub struct Printer;

impl Printer {
    /// Formats the static operand of an instruction. Variables are printed
    /// with their declared names.
    pub fn format_operand<F: InstrList>(func: &F, operand: &StaticOperand) -> String {
        match operand {
            StaticOperand::None => String::new(),
            StaticOperand::Label(l) => format!("L{}", l.index()),
            StaticOperand::Const(v) => v.to_string(),
            StaticOperand::Var(var) => Self::format_var(func, *var),
            StaticOperand::Port(p) | StaticOperand::Memory(p) => p.to_string(),
            StaticOperand::MemoryCell(m, addr) => format!("{m}[{addr}]"),
            StaticOperand::Depth(n) => n.to_string(),
            StaticOperand::Range { hi, lo } => format!("{hi} downto {lo}"),
        }
    }

    fn format_var<F: InstrList>(func: &F, var: VarRef) -> String {
        match var {
            VarRef::Local(l) => func
                .locals()
                .get(l)
                .map(|v| v.name.to_string())
                .unwrap_or_else(|| format!("local{}", l.index())),
            VarRef::Arg(a) => func
                .args()
                .get(a)
                .map(|v| v.name.to_string())
                .unwrap_or_else(|| format!("arg{}", a.index())),
        }
    }

    /// Formats dependency edges as ` [after 1, begin 2, 3+1..4]`.
    /// Returns the empty string if there are none.
    pub fn format_preds(preds: &[Dependency]) -> String {
        if preds.is_empty() {
            return String::new();
        }
        let deps = preds
            .iter()
            .map(|dep| match dep {
                Dependency::Order {
                    pred,
                    kind: OrderKind::CompleteAfter,
                } => pred.index().to_string(),
                Dependency::Order {
                    pred,
                    kind: OrderKind::BeginAfter,
                } => format!("begin {}", pred.index()),
                Dependency::Time {
                    pred,
                    min_delay,
                    max_delay,
                } => format!("{}+{min_delay}..{max_delay}", pred.index()),
            })
            .join(", ");
        format!(" [after {deps}]")
    }

    fn write_header<F: InstrList, W: io::Write>(
        kind: &str,
        func: &F,
        f: &mut W,
    ) -> io::Result<()> {
        let args = func
            .args()
            .values()
            .map(|a| format!("{}: {}", a.name, a.ty))
            .join(", ");
        writeln!(f, "{kind} {}({args}) {{", func.name())?;
        for local in func.locals().values() {
            writeln!(f, "  var {}: {};", local.name, local.ty)?;
        }
        Ok(())
    }

    fn write_labels<F: InstrList, W: io::Write>(
        func: &F,
        idx: InstrIdx,
        f: &mut W,
    ) -> io::Result<()> {
        for label in func.labels().labels_at(idx) {
            writeln!(f, "L{}:", label.index())?;
        }
        Ok(())
    }

    /// Prints a three-address function as an assignment list.
    pub fn write_xil3<W: io::Write>(
        func: &ir::Xil3Function,
        f: &mut W,
    ) -> io::Result<()> {
        Self::write_header("xil3", func, f)?;
        for (idx, instr) in func.instrs.iter() {
            Self::write_labels(func, idx, f)?;
            write!(f, "  {}: ", idx.index())?;
            if !instr.results.is_empty() {
                let results =
                    instr.results.iter().map(|s| format!("@{}", s.index())).join(", ");
                write!(f, "{results} := ")?;
            }
            write!(f, "{}", instr.cmd.op)?;
            let operand = Self::format_operand(func, &instr.cmd.operand);
            if !operand.is_empty() {
                write!(f, " {operand}")?;
            }
            let operands =
                instr.operands.iter().map(|s| format!("@{}", s.index())).join(", ");
            writeln!(f, "({operands}){}", Self::format_preds(&instr.preds))?;
        }
        Self::write_labels(func, InstrIdx::new(func.instrs.len()), f)?;
        writeln!(f, "}}")
    }

    /// Prints a stack function, one instruction per line with its operand and
    /// result types.
    pub fn write_xils<W: io::Write>(
        func: &ir::XilsFunction,
        f: &mut W,
    ) -> io::Result<()> {
        Self::write_header("xils", func, f)?;
        for (idx, instr) in func.instrs.iter() {
            Self::write_labels(func, idx, f)?;
            write!(f, "  {}: {}", idx.index(), instr.cmd.op)?;
            let operand = Self::format_operand(func, &instr.cmd.operand);
            if !operand.is_empty() {
                write!(f, " {operand}")?;
            }
            writeln!(
                f,
                " : ({}) -> ({}){}",
                instr.operand_types.iter().join(", "),
                instr.result_types.iter().join(", "),
                Self::format_preds(&instr.preds)
            )?;
        }
        Self::write_labels(func, InstrIdx::new(func.instrs.len()), f)?;
        writeln!(f, "}}")
    }

    pub fn write_function<W: io::Write>(
        func: &ir::Function,
        f: &mut W,
    ) -> io::Result<()> {
        match func {
            ir::Function::Xil3(func) => Self::write_xil3(func, f),
            ir::Function::Xils(func) => Self::write_xils(func, f),
        }
    }

    /// Prints out the compilation context: every function followed by the
    /// flow report of every design.
    pub fn write_context<W: io::Write>(
        ctx: &ir::Context,
        f: &mut W,
    ) -> io::Result<()> {
        for func in &ctx.functions {
            Self::write_function(func, f)?;
            writeln!(f)?;
        }
        for design in &ctx.designs {
            writeln!(f, "design {} {{", design.name)?;
            write!(f, "{}", design.flow_spec.flow_report())?;
            if let Some(detailed) = &design.detailed {
                writeln!(f, "detailed:")?;
                write!(f, "{}", detailed.flow_report())?;
            }
            writeln!(f, "}}")?;
        }
        Ok(())
    }

    /// Prints a function into a string.
    pub fn function_to_str(func: &ir::Function) -> String {
        let mut buf = Vec::new();
        // Writing into a vector cannot fail.
        let _ = Self::write_function(func, &mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl fmt::Display for ir::Xil3Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        Printer::write_xil3(self, &mut buf).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}

impl fmt::Display for ir::XilsFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Vec::new();
        Printer::write_xils(self, &mut buf).map_err(|_| fmt::Error)?;
        f.write_str(&String::from_utf8_lossy(&buf))
    }
}
