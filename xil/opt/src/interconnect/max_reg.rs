use super::{Binding, InterconnectBuilder, assemble_flow_matrix, log_stats, prepare};
use std::collections::BTreeMap;
use xil_ir::{
    FlowMatrix, Interconnect, InterconnectStats, Register, SyncProcess,
};
use xil_utils::XilResult;

/// One register per live temporary. Serves as a baseline for the sharing
/// builders.
#[derive(Default)]
pub struct MaxRegInterconnectBuilder;

impl InterconnectBuilder for MaxRegInterconnectBuilder {
    fn create_interconnect(
        &mut self,
        spec: &FlowMatrix,
        detailed: &mut FlowMatrix,
    ) -> XilResult<Interconnect> {
        let (spec, lifetimes) = prepare(spec)?;
        let mut registers = Vec::new();
        let mut bindings = BTreeMap::new();
        for (t, lifetime) in lifetimes.iter() {
            let binding = if lifetime.is_dead() {
                Binding::Unused
            } else {
                registers.push(Register::new(registers.len(), lifetime.ty));
                Binding::Register(registers.len() - 1)
            };
            bindings.insert(t, binding);
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
        log_stats("max-reg", interconnect.stats());
        Ok(interconnect)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interconnect::testing::{bit, relay, tmp};
    use crate::interconnect::verify_interconnect;
    use xil_ir::Flow;

    #[test]
    fn every_live_temporary_gets_a_register() {
        let mut spec = relay();
        spec.add(2, Flow::signal(bit("a"), tmp(9)));
        let mut detailed = FlowMatrix::new();
        let ic = MaxRegInterconnectBuilder
            .create_interconnect(&spec, &mut detailed)
            .unwrap();
        verify_interconnect(&spec, &detailed, &ic).unwrap();
        assert_eq!(ic.registers.len(), 2);
        assert_eq!(ic.stats().dead_temporaries, 1);
        assert_eq!(ic.registers[1].cur.to_string(), "R1_cur");
    }
}
