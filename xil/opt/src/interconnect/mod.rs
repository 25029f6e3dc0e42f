//! Interconnect synthesis: binding the temporaries of a scheduled flow matrix
//! to registers and memories.
//!
//! Every builder reads a flow specification whose flows may still reference
//! temporaries and writes a detailed flow matrix in which every flow connects
//! concrete signals. It returns the [Interconnect] that declares the
//! resources those signals belong to. The specification is never modified.
mod assemble;
mod hclust;
mod max_reg;
mod min_reg;
mod pipelined;
mod verify;

pub use assemble::{Binding, assemble_flow_matrix};
pub use hclust::{HClustConfig, HClustInterconnectBuilder};
pub use max_reg::MaxRegInterconnectBuilder;
pub use min_reg::MinRegInterconnectBuilder;
pub use pipelined::{PipelinedConfig, PipelinedInterconnectBuilder};
pub use verify::verify_interconnect;

use crate::analysis::Lifetimes;
use xil_ir::{FlowMatrix, Interconnect, InterconnectStats};
use xil_utils::XilResult;

/// A strategy for binding temporaries to storage.
pub trait InterconnectBuilder {
    /// Bind the temporaries of `spec` and write the resulting concrete flows
    /// into `detailed`, which is expected to be empty.
    fn create_interconnect(
        &mut self,
        spec: &FlowMatrix,
        detailed: &mut FlowMatrix,
    ) -> XilResult<Interconnect>;
}

/// Transitized copy of `spec` with the lifetimes of its temporaries.
pub(crate) fn prepare(spec: &FlowMatrix) -> XilResult<(FlowMatrix, Lifetimes)> {
    let mut spec = spec.clone();
    spec.transitize()?;
    let lifetimes = Lifetimes::compute(&spec)?;
    Ok((spec, lifetimes))
}

pub(crate) fn log_stats(builder: &str, stats: &InterconnectStats) {
    log::info!(
        "{builder}: {} temporaries ({} dead), {} registers, {} memories ({} words)",
        stats.temporaries,
        stats.dead_temporaries,
        stats.registers,
        stats.memories,
        stats.memory_words
    );
}
