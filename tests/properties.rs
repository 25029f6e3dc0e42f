use proptest::prelude::*;
use std::collections::BTreeMap;
use xil::ir::{
    Flow, FlowMatrix, Opcode, Preds, SignalRef, StaticOperand, Type, Value,
    XilInstr, XilsFunction, XilsInstr, eval::Evaluator,
};
use xil::opt::analysis::Lifetimes;
use xil::opt::interconnect::{
    Binding, HClustConfig, HClustInterconnectBuilder, InterconnectBuilder,
    MaxRegInterconnectBuilder, MinRegInterconnectBuilder, PipelinedConfig,
    PipelinedInterconnectBuilder, verify_interconnect,
};
use xil::opt::passes::{Cse, stk_to_3ac, three_ac_to_stk};

const I8: Type = Type::Signed(8);

#[derive(Clone, Debug)]
enum StackOp {
    Push(i64),
    Read(u8),
    Binary(Opcode),
    Dup,
    Swap,
    Pop,
    Write(u8),
}

fn stack_op() -> impl Strategy<Value = StackOp> {
    prop_oneof![
        (-20i64..20).prop_map(StackOp::Push),
        (0u8..2).prop_map(StackOp::Read),
        prop::sample::select(vec![Opcode::Add, Opcode::Sub, Opcode::Mul, Opcode::Xor])
            .prop_map(StackOp::Binary),
        Just(StackOp::Dup),
        Just(StackOp::Swap),
        Just(StackOp::Pop),
        (0u8..2).prop_map(StackOp::Write),
    ]
}

fn instr<const N: usize, const M: usize>(
    cmd: XilInstr,
    ops: [Type; N],
    res: [Type; M],
) -> XilsInstr {
    XilsInstr::new(cmd, Preds::new(), ops, res)
}

/// A straight-line stack function. Operations that would underflow the
/// stack are skipped and the leftovers are popped before returning.
fn stack_function(ops: &[StackOp]) -> XilsFunction {
    let port = |op, n: u8| XilInstr::new(op, StaticOperand::Port(format!("p{n}").as_str().into()));
    let mut f = XilsFunction::new("random");
    let mut depth = 0usize;
    for op in ops {
        let (needs, pushed) = match op {
            StackOp::Push(_) | StackOp::Read(_) => (0, 1),
            StackOp::Binary(_) => (2, 1),
            StackOp::Swap => (2, 2),
            StackOp::Dup => (1, 2),
            StackOp::Pop | StackOp::Write(_) => (1, 0),
        };
        if depth < needs {
            continue;
        }
        f.instrs.push(match op {
            StackOp::Push(v) => {
                let cmd = XilInstr::new(Opcode::LdConst, StaticOperand::Const(Value::Int(*v)));
                instr(cmd, [], [I8])
            }
            StackOp::Read(p) => instr(port(Opcode::RdPort, *p), [], [I8]),
            StackOp::Binary(op) => instr(XilInstr::simple(*op), [I8, I8], [I8]),
            StackOp::Dup => XilsInstr::dup(I8),
            StackOp::Swap => XilsInstr::swap(I8, I8),
            StackOp::Pop => XilsInstr::pop(I8),
            StackOp::Write(p) => instr(port(Opcode::WrPort, *p), [I8], []),
        });
        depth = depth - needs + pushed;
    }
    for _ in 0..depth {
        f.instrs.push(XilsInstr::pop(I8));
    }
    f.instrs.push(instr(XilInstr::simple(Opcode::Ret), [], []));
    f
}

fn evaluator(p0: i64, p1: i64) -> Evaluator {
    Evaluator::new().with_port("p0", p0).with_port("p1", p1)
}

proptest! {
    #[test]
    fn conversions_keep_the_trace(
        ops in prop::collection::vec(stack_op(), 0..24),
        p0 in -50i64..50,
        p1 in -50i64..50,
    ) {
        let f = stack_function(&ops);
        f.validate().unwrap();
        let f3 = stk_to_3ac(&f).unwrap();
        f3.validate().unwrap();
        let back = three_ac_to_stk(&f3).unwrap();
        back.validate().unwrap();
        let again = stk_to_3ac(&back).unwrap();
        again.validate().unwrap();

        let ev = evaluator(p0, p1);
        let stack = ev.run_xils(&f).unwrap();
        let others = [
            ev.run_xil3(&f3).unwrap(),
            ev.run_xils(&back).unwrap(),
            ev.run_xil3(&again).unwrap(),
        ];
        for other in others {
            prop_assert_eq!(&stack.trace, &other.trace);
            prop_assert_eq!(stack.effects(), other.effects());
        }
    }

    #[test]
    fn lowered_functions_are_stack_balanced(ops in prop::collection::vec(stack_op(), 0..24)) {
        let back = three_ac_to_stk(&stk_to_3ac(&stack_function(&ops)).unwrap()).unwrap();
        let depths = back.stack_depths().unwrap();
        prop_assert_eq!(depths.len(), back.instrs.len());
        prop_assert_eq!(depths.last().copied().flatten(), Some(0));
    }

    #[test]
    fn cse_is_idempotent_and_sound(
        ops in prop::collection::vec(stack_op(), 0..24),
        p0 in -50i64..50,
        p1 in -50i64..50,
    ) {
        let f3 = stk_to_3ac(&stack_function(&ops)).unwrap();
        let once = Cse::default().run(&f3).unwrap();
        once.validate().unwrap();
        let twice = Cse::default().run(&once).unwrap();
        prop_assert_eq!(&once, &twice);
        prop_assert!(once.instrs.len() <= f3.instrs.len());

        let ev = evaluator(p0, p1);
        let (before, after) = (ev.run_xil3(&f3).unwrap(), ev.run_xil3(&once).unwrap());
        prop_assert_eq!(before.effects(), after.effects());
    }
}

/// Flows between the signals `s0..s5` where sources always have a lower
/// index than their target, so that no step is cyclic.
fn acyclic_matrix() -> impl Strategy<Value = FlowMatrix> {
    let flow = (0usize..4, 0usize..5, 1usize..6, any::<bool>());
    prop::collection::vec(flow, 0..20).prop_map(|flows| {
        let s = |i: usize| SignalRef::signal(format!("s{i}").as_str(), Type::Logic);
        let mut fm = FlowMatrix::new();
        for (step, from, to, constant) in flows {
            let to = (from + to).min(5).max(from + 1);
            let flow = if constant && from == 0 {
                Flow::value(Value::Bool(true), s(to))
            } else {
                Flow::signal(s(from), s(to))
            };
            fm.add(step, flow);
        }
        fm
    })
}

/// Every temporary is written once from one of two inputs and read by its
/// own sinks one or two times later.
fn schedule() -> impl Strategy<Value = FlowMatrix> {
    prop::collection::vec((0usize..6, 1usize..4, 0usize..3), 1..8).prop_map(|temps| {
        let bit = |name: String| SignalRef::signal(name.as_str(), Type::Logic);
        let mut fm = FlowMatrix::new();
        for (i, (write, delay, extra)) in temps.into_iter().enumerate() {
            let t = SignalRef::temporary(i, Type::Logic);
            fm.add(write, Flow::signal(bit(format!("in{}", i % 2)), t));
            fm.add(write + delay, Flow::signal(t, bit(format!("o{i}"))));
            if extra > 0 {
                fm.add(write + delay + extra, Flow::signal(t, bit(format!("p{i}"))));
            }
        }
        fm
    })
}

/// Temporaries bound to one storage location never live at the same time.
fn assert_disjoint(spec: &FlowMatrix, bindings: &BTreeMap<usize, Binding>) {
    let mut spec = spec.clone();
    spec.transitize().unwrap();
    let lifetimes = Lifetimes::compute(&spec).unwrap();
    let mut by_location: BTreeMap<Binding, Vec<(usize, usize)>> = BTreeMap::new();
    for (t, binding) in bindings {
        if let Some(interval) = lifetimes.get(*t).and_then(|l| l.interval()) {
            if *binding != Binding::Unused {
                by_location.entry(*binding).or_default().push(interval);
            }
        }
    }
    for intervals in by_location.values() {
        for (i, (s1, e1)) in intervals.iter().enumerate() {
            for (s2, e2) in &intervals[i + 1..] {
                assert!(e1 <= s2 || e2 <= s1, "{intervals:?} share storage");
            }
        }
    }
}

fn check<B: InterconnectBuilder>(builder: &mut B, spec: &FlowMatrix) -> usize {
    let input = spec.clone();
    let mut detailed = FlowMatrix::new();
    let ic = builder.create_interconnect(spec, &mut detailed).unwrap();
    assert_eq!(&input, spec);
    verify_interconnect(spec, &detailed, &ic).unwrap();
    ic.registers.len()
}

proptest! {
    #[test]
    fn transitize_is_idempotent(mut fm in acyclic_matrix()) {
        fm.transitize().unwrap();
        for (_, par) in fm.steps() {
            for flow in par.iter() {
                if let Some(source) = flow.source() {
                    prop_assert!(!par.contains_target(&source));
                }
            }
        }
        let mut again = fm.clone();
        again.transitize().unwrap();
        prop_assert_eq!(fm, again);
    }

    #[test]
    fn builders_never_share_live_storage(
        spec in schedule(),
        threshold in prop::sample::select(vec![2usize, 800000]),
    ) {
        let _ = env_logger::builder().is_test(true).try_init();
        let live = Lifetimes::compute(&spec).unwrap().live().count();

        let config = HClustConfig { memory_threshold: threshold };
        let mut hclust = HClustInterconnectBuilder::new(config);
        let shared = check(&mut hclust, &spec);
        assert_disjoint(&spec, hclust.bindings());
        prop_assert!(shared <= live);

        let min = check(&mut MinRegInterconnectBuilder, &spec);
        prop_assert!(min <= live);
        prop_assert_eq!(check(&mut MaxRegInterconnectBuilder, &spec), live);

        let config = PipelinedConfig { hclust: config };
        check(&mut PipelinedInterconnectBuilder::new(config), &spec);
    }
}
