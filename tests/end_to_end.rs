use xil::Driver;
use xil::ir::{
    self, Flow, FlowMatrix, InstrIdx, InstrList, Opcode, Preds, SignalRef,
    StaticOperand, StdLogic, Type, Value, XilInstr, XilsFunction, XilsInstr,
    eval::Evaluator,
};
use xil::utils::IndexRef;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn bit(name: &str) -> SignalRef {
    SignalRef::signal(name, Type::Logic)
}

fn tmp(idx: usize) -> SignalRef {
    SignalRef::temporary(idx, Type::Logic)
}

fn op<const N: usize, const M: usize>(
    cmd: XilInstr,
    operands: [Type; N],
    results: [Type; M],
) -> XilsInstr {
    XilsInstr::new(cmd, Preds::new(), operands, results)
}

/// `y := if x > 0 { x } else { 5 }`, with the join reached through a chain
/// of jumps.
fn clamp() -> XilsFunction {
    let i8 = Type::Signed(8);
    let port = |op, name: &str| XilInstr::new(op, StaticOperand::Port(name.into()));
    let mut f = XilsFunction::new("clamp");
    let else_ = f.labels.create(InstrIdx::new(8));
    let hop = f.labels.create(InstrIdx::new(7));
    let end = f.labels.create(InstrIdx::new(10));
    f.instrs.push(op(port(Opcode::RdPort, "x"), [], [i8]));
    f.instrs.push(op(XilInstr::simple(Opcode::Ld0), [], [i8]));
    f.instrs.push(op(XilInstr::simple(Opcode::IsGt), [i8, i8], [Type::Bool]));
    let br = XilInstr::new(Opcode::BrFalse, StaticOperand::Label(else_));
    f.instrs.push(op(br, [Type::Bool], []));
    f.instrs.push(op(port(Opcode::RdPort, "x"), [], [i8]));
    f.instrs.push(op(port(Opcode::WrPort, "y"), [i8], []));
    f.instrs.push(op(XilInstr::new(Opcode::Goto, StaticOperand::Label(hop)), [], []));
    f.instrs.push(op(XilInstr::new(Opcode::Goto, StaticOperand::Label(end)), [], []));
    let five = XilInstr::new(Opcode::LdConst, StaticOperand::Const(Value::Int(5)));
    f.instrs.push(op(five, [], [i8]));
    f.instrs.push(op(port(Opcode::WrPort, "y"), [i8], []));
    f.instrs.push(op(XilInstr::simple(Opcode::Ret), [], []));
    f
}

#[test]
fn functions_keep_their_effects_through_all_passes() {
    init_logger();
    let f = clamp();
    f.validate().unwrap();
    let mut ctx = ir::Context::new();
    ctx.functions.push(ir::Function::Xils(f.clone()));
    Driver::new(&["all"]).run(&mut ctx).unwrap();

    let out = ctx.find_function("clamp").unwrap().as_xils().unwrap();
    out.validate().unwrap();
    for x in [-3, 0, 3] {
        let ev = Evaluator::new().with_port("x", x);
        let before = ev.run_xils(&f).unwrap();
        let after = ev.run_xils(out).unwrap();
        assert_eq!(before.effects(), after.effects(), "x = {x}\n{out}");
    }
    // No jump lands on another unconditional jump.
    for (idx, instr) in out.instrs.iter() {
        if instr.cmd.op == Opcode::Goto {
            let target = out.branch_target(idx).unwrap();
            assert_ne!(out.instrs[target].cmd.op, Opcode::Goto, "{out}");
        }
    }
}

#[test]
fn relay_needs_one_register() {
    init_logger();
    let mut spec = FlowMatrix::new();
    spec.add(0, Flow::value(Value::Logic(StdLogic::One), tmp(0)));
    spec.add(1, Flow::signal(tmp(0), tmp(1)));
    spec.add(2, Flow::signal(tmp(1), bit("b")));
    spec.add(2, Flow::value(Value::Logic(StdLogic::Zero), bit("c")));

    let mut ctx = ir::Context::new();
    ctx.designs.push(ir::Design::new("relay", spec));
    Driver::new(&["validate", "hclust", "well-formed"])
        .opt("hclust:verify")
        .run(&mut ctx)
        .unwrap();

    let design = ctx.find_design("relay").unwrap();
    let ic = design.interconnect.as_ref().unwrap();
    assert_eq!(ic.registers.len(), 1);
    assert!(ic.memories.is_empty());
    let stats = serde_json::to_value(ic.stats()).unwrap();
    assert_eq!(stats["registers"], 1);
    assert_eq!(stats["memories"], 0);
    let detailed = design.detailed.as_ref().unwrap();
    assert!(
        detailed
            .flow_targets()
            .iter()
            .chain(&detailed.flow_sources())
            .all(|s| !s.is_temporary())
    );
    assert_eq!(
        detailed.get_flow(2).get(&bit("b")),
        Some(&Flow::signal(ic.registers[0].cur, bit("b")))
    );
}

#[test]
fn broken_functions_stop_the_plan() {
    init_logger();
    let mut f = XilsFunction::new("broken");
    let i8 = Type::Signed(8);
    f.instrs.push(op(XilInstr::simple(Opcode::Add), [i8, i8], [i8]));
    f.instrs.push(op(XilInstr::simple(Opcode::Ret), [i8], []));
    let mut ctx = ir::Context::new();
    ctx.functions.push(ir::Function::Xils(f));
    assert!(Driver::new(&["validate"]).run(&mut ctx).is_err());
}

#[test]
fn unknown_passes_are_rejected() {
    let mut ctx = ir::Context::new();
    assert!(Driver::new(&["no-such-pass"]).run(&mut ctx).is_err());
    assert!(Driver::help().unwrap().contains("lower-stack"));
}
