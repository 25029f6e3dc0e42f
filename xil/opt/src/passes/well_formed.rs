use crate::analysis::Lifetimes;
use crate::traversal::{
    Action, ConstructVisitor, DiagnosticContext, DiagnosticPass,
    DiagnosticResult, Named, VisResult, Visitor,
};
use xil_ir as ir;
use xil_utils::{Error, XilResult};

/// Checks that every function and design of a context is well formed:
/// - three-address functions define each slot once, before its uses;
/// - stack functions never underflow and agree on the stack at every block entry;
/// - branch labels and dependencies are in range;
/// - flow specifications are acyclic within each step and give every
///   temporary a consistent type and a write before its reads;
/// - detailed flow matrices reference no temporaries.
pub struct WellFormed {
    diag: DiagnosticContext,
}

impl ConstructVisitor for WellFormed {
    fn from(_ctx: &ir::Context) -> XilResult<Self> {
        Ok(WellFormed {
            diag: DiagnosticContext::default(),
        })
    }

    // Diagnostics are kept across functions.
    fn clear_data(&mut self) {}
}

impl Named for WellFormed {
    fn name() -> &'static str {
        "well-formed"
    }

    fn description() -> &'static str {
        "check that functions and designs are well formed"
    }
}

impl DiagnosticPass for WellFormed {
    fn diagnostics(&self) -> &DiagnosticContext {
        &self.diag
    }
}

/// Returns the temporaries that are written but never read.
fn check_spec(design: &ir::Design) -> Result<Vec<usize>, Error> {
    let mut spec = design.flow_spec.clone();
    spec.transitize()?;
    let lifetimes = Lifetimes::compute(&spec)?;
    spec.get_timed_flows()?;
    Ok(lifetimes
        .iter()
        .filter(|(_, l)| l.is_dead())
        .map(|(t, _)| t)
        .collect())
}

fn check_detailed(detailed: &ir::FlowMatrix) -> Result<(), Error> {
    let temps = detailed
        .flow_targets()
        .into_iter()
        .chain(detailed.flow_sources())
        .find(|s| s.is_temporary());
    match temps {
        Some(t) => Err(Error::malformed_structure(format!(
            "detailed flows still reference {t}"
        ))
        .at_temporary(t.temporary_index().unwrap_or_default())),
        None => Ok(()),
    }
}

impl Visitor for WellFormed {
    fn visit_xil3(&mut self, func: &mut ir::Xil3Function) -> VisResult {
        func.validate()
            .map(|()| Action::Continue)
            .accumulate_err(&mut self.diag)
    }

    fn visit_xils(&mut self, func: &mut ir::XilsFunction) -> VisResult {
        func.validate()
            .map(|()| Action::Continue)
            .accumulate_err(&mut self.diag)
    }

    fn visit_design(&mut self, design: &mut ir::Design) -> VisResult {
        let in_design = |e: Error| e.with_post_msg(Some(format!("in design {}", design.name)));
        match check_spec(design) {
            Ok(dead) => {
                for t in dead {
                    self.diag.warning(in_design(
                        Error::misc("written but never read").at_temporary(t),
                    ));
                }
            }
            Err(e) => self.diag.err(in_design(e)),
        }
        if let Some(Err(e)) = design.detailed.as_ref().map(check_detailed) {
            self.diag.err(in_design(e));
        }
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xil_ir::{
        Flow, Opcode, Preds, SignalRef, StaticOperand, Type,
        XilInstr, XilsInstr,
    };
    use xil_utils::IndexRef;

    fn run(ctx: &mut ir::Context) -> Vec<Error> {
        let mut pass = <WellFormed as ConstructVisitor>::from(ctx).unwrap();
        pass.do_pass(ctx).unwrap();
        pass.diagnostics().errors_iter().cloned().collect()
    }

    #[test]
    fn reports_every_broken_item() {
        let mut ctx = ir::Context::new();
        // A branch to a label that does not exist.
        let mut f = ir::XilsFunction::new("f");
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::Goto, StaticOperand::Label(ir::LabelIdx::new(3))),
            Preds::new(),
            [],
            [],
        ));
        ctx.functions.push(ir::Function::Xils(f));

        // A combinational loop.
        let (a, b) = (SignalRef::temporary(0, Type::Bool), SignalRef::temporary(1, Type::Bool));
        let mut fm = ir::FlowMatrix::new();
        fm.add(0, Flow::signal(a, b));
        fm.add(0, Flow::signal(b, a));
        ctx.designs.push(ir::Design::new("loop", fm));

        let errors = run(&mut ctx);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].instr(), Some(0));
        assert!(matches!(errors[1].kind(), xil_utils::ErrorKind::CyclicDataflow(_)));
    }

    #[test]
    fn errors_survive_later_functions() {
        let mut ctx = ir::Context::new();
        for name in ["first", "second"] {
            let mut f = ir::XilsFunction::new(name);
            // `Add` with nothing on the stack.
            f.instrs.push(XilsInstr::new(
                XilInstr::simple(Opcode::Add),
                Preds::new(),
                [Type::Signed(8), Type::Signed(8)],
                [Type::Signed(8)],
            ));
            ctx.functions.push(ir::Function::Xils(f));
        }
        let mut pass = <WellFormed as ConstructVisitor>::from(&ctx).unwrap();
        pass.do_pass(&mut ctx).unwrap();
        assert_eq!(pass.diagnostics().errors_iter().count(), 2);
        assert_eq!(pass.diagnostics().check().unwrap_err().errors().len(), 2);
    }

    #[test]
    fn detailed_flows_are_concrete() {
        let mut ctx = ir::Context::new();
        let t = SignalRef::temporary(4, Type::Bool);
        let out = SignalRef::signal("out", Type::Bool);
        let mut design = ir::Design::new("d", ir::FlowMatrix::new());
        let mut detailed = ir::FlowMatrix::new();
        detailed.add(0, Flow::signal(t, out));
        design.detailed = Some(detailed);
        ctx.designs.push(design);
        let errors = run(&mut ctx);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].temporary(), Some(4));
    }

    #[test]
    fn dead_temporaries_only_warn() {
        let mut fm = ir::FlowMatrix::new();
        let (a, t) = (SignalRef::signal("a", Type::Bool), SignalRef::temporary(2, Type::Bool));
        fm.add(0, Flow::signal(a, t));
        let mut ctx = ir::Context::new();
        ctx.designs.push(ir::Design::new("d", fm));
        let mut pass = <WellFormed as ConstructVisitor>::from(&ctx).unwrap();
        pass.do_pass(&mut ctx).unwrap();
        assert!(pass.diagnostics().check().is_ok());
        let warnings = pass.diagnostics().warning_iter().collect::<Vec<_>>();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].temporary(), Some(2));
    }
}
