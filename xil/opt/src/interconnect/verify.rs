use std::collections::BTreeMap;
use xil_ir::{
    Flow, FlowMatrix, Interconnect, SignalRef, StdLogic, TimedFlow, Value,
};
use xil_utils::{Error, XilResult};

/// A value stored in a register or memory word during replay.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    /// Sampled from `source` at `time`.
    Sampled { source: SignalRef, time: usize },
    Value(Value),
}

#[derive(Clone, Copy)]
enum Port {
    AddrR,
    AddrW,
    DIn,
    WrEn,
}

/// Port values of one memory during one step.
#[derive(Default)]
struct Ports {
    addr_r: Option<Value>,
    addr_w: Option<Value>,
    din: Option<Token>,
    wr_en: Option<Value>,
}

struct MemState {
    words: Vec<Option<Token>>,
    /// Registered read output.
    dout: Option<Token>,
    addresses: BTreeMap<Value, usize>,
}

fn value_of(flow: &Flow) -> Option<Value> {
    match flow {
        Flow::Value(vf) => Some(vf.value.clone()),
        Flow::Signal(_) => None,
    }
}

/// Run `detailed` cycle by cycle and collect the timed flows that reach
/// signals other than the resources of `interconnect`.
fn replay(detailed: &FlowMatrix, interconnect: &Interconnect) -> XilResult<Vec<TimedFlow>> {
    let cur_of: BTreeMap<SignalRef, usize> = interconnect
        .registers
        .iter()
        .enumerate()
        .map(|(i, r)| (r.cur, i))
        .collect();
    let next_of: BTreeMap<SignalRef, usize> = interconnect
        .registers
        .iter()
        .enumerate()
        .map(|(i, r)| (r.next, i))
        .collect();
    let mut ports: BTreeMap<SignalRef, (usize, Port)> = BTreeMap::new();
    let mut dout_of: BTreeMap<SignalRef, usize> = BTreeMap::new();
    let mut mems = Vec::new();
    for (m, mem) in interconnect.memories.iter().enumerate() {
        ports.insert(mem.addr_r, (m, Port::AddrR));
        ports.insert(mem.addr_w, (m, Port::AddrW));
        ports.insert(mem.din, (m, Port::DIn));
        ports.insert(mem.wr_en, (m, Port::WrEn));
        dout_of.insert(mem.dout, m);
        mems.push(MemState {
            words: vec![None; mem.words],
            dout: None,
            addresses: (0..mem.words).map(|w| (mem.address(w), w)).collect(),
        });
    }

    let mut regs: Vec<Option<Token>> = vec![None; interconnect.registers.len()];
    let mut timed = Vec::new();
    for step in 0..detailed.num_csteps() {
        let resolve = |flow: &Flow| -> Option<Token> {
            match flow {
                Flow::Value(vf) => Some(Token::Value(vf.value.clone())),
                Flow::Signal(sf) => {
                    if let Some(r) = cur_of.get(&sf.source) {
                        regs[*r].clone()
                    } else if let Some(m) = dout_of.get(&sf.source) {
                        mems[*m].dout.clone()
                    } else {
                        Some(Token::Sampled {
                            source: sf.source,
                            time: step,
                        })
                    }
                }
            }
        };

        let own = detailed.step_flow(step);
        let mut next = regs.clone();
        let mut step_ports = (0..mems.len()).map(|_| Ports::default()).collect::<Vec<_>>();
        for flow in detailed.get_flow(step).iter() {
            let target = flow.target();
            if let Some(r) = next_of.get(&target) {
                next[*r] = resolve(flow);
            } else if let Some((m, port)) = ports.get(&target) {
                let p = &mut step_ports[*m];
                match port {
                    Port::AddrR => p.addr_r = value_of(flow),
                    Port::AddrW => p.addr_w = value_of(flow),
                    Port::WrEn => p.wr_en = value_of(flow),
                    Port::DIn => p.din = resolve(flow),
                }
            } else if own.is_some_and(|par| par.contains_target(&target)) {
                let token = resolve(flow).ok_or_else(|| {
                    Error::malformed_structure(format!(
                        "{target} reads storage that holds no value"
                    ))
                    .at_cstep(step)
                })?;
                timed.push(match token {
                    Token::Sampled { source, time } => TimedFlow::Signal {
                        time,
                        source,
                        target,
                        delay: step - time,
                    },
                    Token::Value(value) => TimedFlow::Value {
                        time: step,
                        value,
                        target,
                    },
                });
            }
        }

        // Clock edge. Memories write before they read.
        regs = next;
        for (mem, p) in mems.iter_mut().zip(step_ports) {
            if p.wr_en == Some(Value::Logic(StdLogic::One)) {
                let word = p
                    .addr_w
                    .as_ref()
                    .and_then(|a| mem.addresses.get(a))
                    .copied()
                    .ok_or_else(|| {
                        Error::malformed_structure("memory write without a valid address")
                            .at_cstep(step)
                    })?;
                mem.words[word] = p.din;
            }
            mem.dout = p
                .addr_r
                .as_ref()
                .and_then(|a| mem.addresses.get(a))
                .and_then(|w| mem.words[*w].clone());
        }
    }
    Ok(timed)
}

/// Check that `detailed` delivers exactly the values that `spec` schedules.
///
/// The detailed matrix is replayed with registers that take their next value
/// at the end of every step and memories that read one step after the
/// address is applied. The timed flows the replay delivers to concrete
/// signals must equal, as a multiset, the timed flows of `spec`.
pub fn verify_interconnect(
    spec: &FlowMatrix,
    detailed: &FlowMatrix,
    interconnect: &Interconnect,
) -> XilResult<()> {
    let mut spec = spec.clone();
    spec.transitize()?;
    let mut expected = spec.get_timed_flows()?;
    let mut actual = replay(detailed, interconnect)?;
    expected.sort();
    actual.sort();

    let mismatch = |msg: String| Err(Error::malformed_structure(msg));
    for (e, a) in expected.iter().zip(&actual) {
        if e != a {
            return mismatch(format!("expected `{e}' but the interconnect delivers `{a}'"));
        }
    }
    match expected.len().cmp(&actual.len()) {
        std::cmp::Ordering::Greater => {
            mismatch(format!("`{}' is never delivered", expected[actual.len()]))
        }
        std::cmp::Ordering::Less => {
            mismatch(format!("`{}' is delivered but not scheduled", actual[expected.len()]))
        }
        std::cmp::Ordering::Equal => {
            log::debug!("interconnect delivers all {} timed flows", actual.len());
            Ok(())
        }
    }
}
