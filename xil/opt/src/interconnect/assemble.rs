use crate::analysis::{Lifetime, Lifetimes};
use std::collections::BTreeMap;
use xil_ir::{
    Flow, FlowMatrix, Interconnect, ParFlow, SignalRef, StdLogic, Value,
};
use xil_utils::{Error, XilResult};

/// Where a temporary lives once storage has been allocated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Binding {
    /// Index into [Interconnect::registers].
    Register(usize),
    /// A word of one of [Interconnect::memories].
    Memory { mem: usize, addr: usize },
    /// The temporary is never read.
    Unused,
}

struct Assembler<'a> {
    lifetimes: &'a Lifetimes,
    bindings: &'a BTreeMap<usize, Binding>,
    interconnect: &'a Interconnect,
    /// Read addresses, which are driven one step ahead of the data.
    addresses: Vec<(usize, Flow)>,
}

impl Assembler<'_> {
    fn lookup(&self, t: usize, step: usize) -> XilResult<(&Lifetime, Binding)> {
        let missing = |what: &str| {
            Error::malformed_structure(format!("temporary has no {what}"))
                .at_temporary(t)
                .at_cstep(step)
        };
        let lifetime = self.lifetimes.get(t).ok_or_else(|| missing("lifetime"))?;
        let binding = self.bindings.get(&t).ok_or_else(|| missing("binding"))?;
        Ok((lifetime, *binding))
    }

    /// The signal that holds the current value of temporary `t` at `step`.
    fn read(&mut self, t: usize, step: usize) -> XilResult<SignalRef> {
        match self.lookup(t, step)?.1 {
            Binding::Register(r) => Ok(self.interconnect.registers[r].cur),
            Binding::Memory { mem, addr } => {
                let mem = &self.interconnect.memories[mem];
                let Some(prev) = step.checked_sub(1) else {
                    return Err(Error::malformed_schedule(
                        "memory word is read at the first step",
                    )
                    .at_temporary(t)
                    .at_cstep(step));
                };
                self.addresses
                    .push((prev, Flow::value(mem.address(addr), mem.addr_r)));
                Ok(mem.dout)
            }
            Binding::Unused => Err(Error::malformed_structure(
                "unused temporary is read",
            )
            .at_temporary(t)
            .at_cstep(step)),
        }
    }

    fn assemble_flow(&mut self, flow: &Flow, step: usize, out: &mut ParFlow) -> XilResult<()> {
        let target = flow.target();
        let write = match target.temporary_index() {
            Some(t) => {
                let (lifetime, binding) = self.lookup(t, step)?;
                if lifetime.is_dead_write(step) {
                    return Ok(());
                }
                Some(binding)
            }
            None => None,
        };
        let flow = match flow {
            Flow::Signal(sf) => match sf.source.temporary_index() {
                Some(t) => Flow::signal(self.read(t, step)?, target),
                None => flow.clone(),
            },
            Flow::Value(_) => flow.clone(),
        };
        match write {
            None => {
                out.add(flow);
            }
            Some(Binding::Register(r)) => {
                out.add(flow.with_target(self.interconnect.registers[r].next));
            }
            Some(Binding::Memory { mem, addr }) => {
                let mem = &self.interconnect.memories[mem];
                out.add(flow.with_target(mem.din));
                out.add(Flow::value(mem.address(addr), mem.addr_w));
                out.add(Flow::value(Value::Logic(StdLogic::One), mem.wr_en));
            }
            Some(Binding::Unused) => {
                debug_assert!(false, "live write to an unused temporary");
            }
        }
        Ok(())
    }
}

/// Rewrite the transitized `spec` into `detailed` by substituting every
/// temporary with the storage it is bound to.
///
/// Registers are written through their next signal and read through their
/// current signal. A memory word is written through the data, write address
/// and write enable ports, and read on the data output with the read address
/// driven at the preceding step. Writes that are never read are dropped. The
/// neutral layer holds every register and keeps the memories idle.
pub fn assemble_flow_matrix(
    spec: &FlowMatrix,
    lifetimes: &Lifetimes,
    bindings: &BTreeMap<usize, Binding>,
    interconnect: &Interconnect,
    detailed: &mut FlowMatrix,
) -> XilResult<()> {
    for flow in spec.neutral_flow().iter() {
        detailed.add_neutral(flow.clone());
    }
    for reg in &interconnect.registers {
        detailed.add_neutral(Flow::signal(reg.cur, reg.next));
    }
    for mem in &interconnect.memories {
        detailed.add_neutral(Flow::value(Value::Logic(StdLogic::Zero), mem.wr_en));
        for port in [mem.addr_r, mem.addr_w, mem.din] {
            detailed.add_neutral(FlowMatrix::create_dont_care_flow(port));
        }
    }

    let mut asm = Assembler {
        lifetimes,
        bindings,
        interconnect,
        addresses: Vec::new(),
    };
    for (step, par) in spec.steps() {
        let mut out = ParFlow::new();
        for flow in par.iter() {
            asm.assemble_flow(flow, step, &mut out)?;
        }
        detailed.add_par(step, &out);
        if let Some(comment) = spec.comment(step) {
            detailed.append_comment(step, comment);
        }
    }
    for (step, flow) in asm.addresses {
        detailed.add(step, flow);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interconnect::testing::{bit, relay, tmp};
    use xil_ir::{Memory, Register, Type};

    fn bind(pairs: &[(usize, Binding)]) -> BTreeMap<usize, Binding> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn registers_replace_temporaries() {
        let mut spec = relay();
        // Written after its last read.
        spec.add(3, Flow::signal(bit("late"), tmp(1)));
        spec.append_comment(1, "hand over");
        let lifetimes = Lifetimes::compute(&spec).unwrap();
        let ic = Interconnect {
            registers: vec![Register::new(0, Type::Logic)],
            ..Default::default()
        };
        let bindings = bind(&[(0, Binding::Register(0)), (1, Binding::Register(0))]);
        let mut detailed = FlowMatrix::new();
        assemble_flow_matrix(&spec, &lifetimes, &bindings, &ic, &mut detailed).unwrap();

        let r = &ic.registers[0];
        assert_eq!(detailed.num_csteps(), 4);
        assert_eq!(detailed.step_flow(1).unwrap().get(&r.next), Some(&Flow::signal(r.cur, r.next)));
        assert_eq!(
            detailed.step_flow(2).unwrap().get(&bit("sink")),
            Some(&Flow::signal(r.cur, bit("sink")))
        );
        assert!(detailed.step_flow(3).unwrap().is_empty());
        assert_eq!(detailed.neutral_flow().get(&r.next), Some(&Flow::signal(r.cur, r.next)));
        assert_eq!(detailed.comment(1), Some("hand over"));
        assert!(detailed.flow_targets().iter().all(|s| !s.is_temporary()));
    }

    #[test]
    fn memory_reads_are_addressed_early() {
        let mut spec = FlowMatrix::new();
        spec.add(1, Flow::signal(bit("a"), tmp(0)));
        spec.add(4, Flow::signal(tmp(0), bit("b")));
        let lifetimes = Lifetimes::compute(&spec).unwrap();
        let mem = Memory::new(0, Type::Logic, 2);
        let ic = Interconnect {
            memories: vec![mem.clone()],
            ..Default::default()
        };
        let bindings = bind(&[(0, Binding::Memory { mem: 0, addr: 1 })]);
        let mut detailed = FlowMatrix::new();
        assemble_flow_matrix(&spec, &lifetimes, &bindings, &ic, &mut detailed).unwrap();

        let write = detailed.step_flow(1).unwrap();
        assert_eq!(write.get(&mem.din), Some(&Flow::signal(bit("a"), mem.din)));
        assert_eq!(write.get(&mem.addr_w), Some(&Flow::value(mem.address(1), mem.addr_w)));
        assert_eq!(
            write.get(&mem.wr_en),
            Some(&Flow::value(Value::Logic(StdLogic::One), mem.wr_en))
        );
        assert_eq!(
            detailed.step_flow(3).unwrap().get(&mem.addr_r),
            Some(&Flow::value(mem.address(1), mem.addr_r))
        );
        assert_eq!(
            detailed.step_flow(4).unwrap().get(&bit("b")),
            Some(&Flow::signal(mem.dout, bit("b")))
        );
        let idle = detailed.get_flow(2);
        assert!(FlowMatrix::is_dont_care_flow(idle.get(&mem.addr_r).unwrap()));
        assert_eq!(
            idle.get(&mem.wr_en),
            Some(&Flow::value(Value::Logic(StdLogic::Zero), mem.wr_en))
        );
    }

    #[test]
    fn missing_bindings_are_reported() {
        let spec = relay();
        let lifetimes = Lifetimes::compute(&spec).unwrap();
        let bindings = bind(&[(0, Binding::Register(0))]);
        let ic = Interconnect {
            registers: vec![Register::new(0, Type::Logic)],
            ..Default::default()
        };
        let err = assemble_flow_matrix(&spec, &lifetimes, &bindings, &ic, &mut FlowMatrix::new())
            .unwrap_err();
        assert_eq!(err.temporary(), Some(1));
    }
}
