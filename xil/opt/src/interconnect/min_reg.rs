use super::{Binding, InterconnectBuilder, assemble_flow_matrix, log_stats, prepare};
use std::collections::BTreeMap;
use xil_ir::{
    FlowMatrix, Interconnect, InterconnectStats, Register, SyncProcess,
};
use xil_utils::XilResult;

/// Left-edge register allocation.
///
/// Temporaries are visited in order of their first write and packed into the
/// first register of the same type whose last value has been read by then.
/// Multiplexer widths are not considered.
#[derive(Default)]
pub struct MinRegInterconnectBuilder;

impl InterconnectBuilder for MinRegInterconnectBuilder {
    fn create_interconnect(
        &mut self,
        spec: &FlowMatrix,
        detailed: &mut FlowMatrix,
    ) -> XilResult<Interconnect> {
        let (spec, lifetimes) = prepare(spec)?;
        let mut order = lifetimes
            .iter()
            .filter_map(|(t, l)| l.interval().map(|(start, end)| (start, t, end, l.ty)))
            .collect::<Vec<_>>();
        order.sort();

        let mut registers: Vec<Register> = Vec::new();
        // Step of the last read of the value each register holds.
        let mut free_at: Vec<usize> = Vec::new();
        let mut bindings = BTreeMap::new();
        for (start, t, end, ty) in order {
            let reg = match registers
                .iter()
                .zip(&free_at)
                .position(|(r, free)| r.ty == ty && *free <= start)
            {
                Some(r) => r,
                None => {
                    registers.push(Register::new(registers.len(), ty));
                    free_at.push(0);
                    registers.len() - 1
                }
            };
            free_at[reg] = end;
            bindings.insert(t, Binding::Register(reg));
        }
        for (t, _) in lifetimes.iter().filter(|(_, l)| l.is_dead()) {
            bindings.insert(t, Binding::Unused);
        }

        let interconnect = Interconnect {
            processes: if registers.is_empty() {
                vec![]
            } else {
                vec![SyncProcess::register_update(&registers)]
            },
            stats: InterconnectStats {
                temporaries: lifetimes.len(),
                dead_temporaries: lifetimes.dead_count(),
                registers: registers.len(),
                ..Default::default()
            },
            registers,
            memories: vec![],
        };
        assemble_flow_matrix(&spec, &lifetimes, &bindings, &interconnect, detailed)?;
        log_stats("min-reg", interconnect.stats());
        Ok(interconnect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interconnect::testing::{bit, fifo, relay, tmp};
    use crate::interconnect::verify_interconnect;
    use xil_ir::{Flow, SignalRef, Type};

    fn build(spec: &FlowMatrix) -> Interconnect {
        let mut detailed = FlowMatrix::new();
        let ic = MinRegInterconnectBuilder
            .create_interconnect(spec, &mut detailed)
            .unwrap();
        verify_interconnect(spec, &detailed, &ic).unwrap();
        ic
    }

    #[test]
    fn packs_by_first_write() {
        assert_eq!(build(&relay()).registers.len(), 1);
        assert_eq!(build(&fifo(3)).registers.len(), 3);

        // Different sources do not stop sharing.
        let mut spec = FlowMatrix::new();
        spec.add(0, Flow::signal(bit("a"), tmp(0)));
        spec.add(1, Flow::signal(tmp(0), bit("x")));
        spec.add(2, Flow::signal(bit("b"), tmp(1)));
        spec.add(3, Flow::signal(tmp(1), bit("y")));
        assert_eq!(build(&spec).registers.len(), 1);
    }

    #[test]
    fn types_are_never_mixed() {
        let wide = |i| SignalRef::temporary(i, Type::Unsigned(8));
        let mut spec = relay();
        spec.add(3, Flow::signal(SignalRef::signal("v", Type::Unsigned(8)), wide(5)));
        spec.add(4, Flow::signal(wide(5), SignalRef::signal("w", Type::Unsigned(8))));
        let ic = build(&spec);
        assert_eq!(ic.registers.len(), 2);
        assert_eq!(ic.registers[1].ty, Type::Unsigned(8));
    }
}
