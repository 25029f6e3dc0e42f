use crate::interconnect::{
    HClustConfig, HClustInterconnectBuilder, InterconnectBuilder,
    MaxRegInterconnectBuilder, MinRegInterconnectBuilder, PipelinedConfig,
    PipelinedInterconnectBuilder, verify_interconnect,
};
use crate::traversal::{
    Action, ConstructVisitor, Named, ParseVal, PassOpt, VisResult, Visitor,
};
use petgraph::dot::Dot;
use std::io::Write;
use xil_ir::{self as ir, FlowMatrix};
use xil_utils::{OutputFile, XilResult};

fn verify_opt() -> PassOpt {
    PassOpt::new(
        "verify",
        "replay the synthesized flows against the specification",
        ParseVal::Bool(false),
        PassOpt::parse_bool,
    )
}

fn clustering_opts() -> Vec<PassOpt> {
    vec![
        PassOpt::new(
            "memory-threshold",
            "smallest number of registers that are implemented as a memory",
            ParseVal::Num(HClustConfig::default().memory_threshold as i64),
            PassOpt::parse_num,
        ),
        verify_opt(),
        PassOpt::new(
            "print-stats",
            "print the allocated resources of every design as JSON",
            ParseVal::OutStream(OutputFile::Null),
            PassOpt::parse_outstream,
        ),
    ]
}

fn hclust_config(opts: &linked_hash_map::LinkedHashMap<&'static str, ParseVal>) -> HClustConfig {
    HClustConfig {
        memory_threshold: opts[&"memory-threshold"]
            .pos_num()
            .map_or(HClustConfig::default().memory_threshold, |n| n as usize),
    }
}

/// Bind the temporaries of `design` with `builder` and store the result in
/// the design.
fn synthesize<B: InterconnectBuilder>(
    builder: &mut B,
    design: &mut ir::Design,
    verify: bool,
) -> XilResult<()> {
    let name = design.name;
    let in_design = |e: xil_utils::Error| e.with_post_msg(Some(format!("in design {name}")));
    let mut detailed = FlowMatrix::new();
    let interconnect = builder
        .create_interconnect(&design.flow_spec, &mut detailed)
        .map_err(in_design)?;
    if verify {
        verify_interconnect(&design.flow_spec, &detailed, &interconnect).map_err(in_design)?;
    }
    design.detailed = Some(detailed);
    design.interconnect = Some(interconnect);
    Ok(())
}

fn print_stats(out: &mut Option<OutputFile>, design: &ir::Design) -> XilResult<()> {
    let (Some(out), Some(ic)) = (out, &design.interconnect) else {
        return Ok(());
    };
    let json = serde_json::json!({
        "design": design.name.as_str(),
        "stats": ic.stats(),
    });
    writeln!(out.get_write()?, "{json}")?;
    Ok(())
}

/// Registers shared by clustering, with large register groups implemented
/// as memories.
pub struct HClustInterconnect {
    config: HClustConfig,
    verify: bool,
    print_stats: Option<OutputFile>,
}

impl Named for HClustInterconnect {
    fn name() -> &'static str {
        "hclust"
    }

    fn description() -> &'static str {
        "bind temporaries to shared registers and memories"
    }

    fn opts() -> Vec<PassOpt> {
        clustering_opts()
    }
}

impl ConstructVisitor for HClustInterconnect {
    fn from(ctx: &ir::Context) -> XilResult<Self> {
        let opts = Self::get_opts(ctx);
        Ok(Self {
            config: hclust_config(&opts),
            verify: opts[&"verify"].bool(),
            print_stats: opts[&"print-stats"].not_null_outstream(),
        })
    }

    fn clear_data(&mut self) {}
}

impl Visitor for HClustInterconnect {
    fn visit_design(&mut self, design: &mut ir::Design) -> VisResult {
        let mut builder = HClustInterconnectBuilder::new(self.config);
        synthesize(&mut builder, design, self.verify)?;
        print_stats(&mut self.print_stats, design)?;
        Ok(Action::Continue)
    }
}

/// Long transports split into pipes before clustering.
pub struct PipelinedInterconnect {
    config: PipelinedConfig,
    verify: bool,
    print_stats: Option<OutputFile>,
    dump_graph: Option<OutputFile>,
}

impl Named for PipelinedInterconnect {
    fn name() -> &'static str {
        "pipelined"
    }

    fn description() -> &'static str {
        "bind temporaries to pipes that keep multiplexers narrow"
    }

    fn opts() -> Vec<PassOpt> {
        let mut opts = clustering_opts();
        opts.push(PassOpt::new(
            "dump-graph",
            "write the pipe network of every design as a dot graph",
            ParseVal::OutStream(OutputFile::Null),
            PassOpt::parse_outstream,
        ));
        opts
    }
}

impl ConstructVisitor for PipelinedInterconnect {
    fn from(ctx: &ir::Context) -> XilResult<Self> {
        let opts = Self::get_opts(ctx);
        Ok(Self {
            config: PipelinedConfig {
                hclust: hclust_config(&opts),
            },
            verify: opts[&"verify"].bool(),
            print_stats: opts[&"print-stats"].not_null_outstream(),
            dump_graph: opts[&"dump-graph"].not_null_outstream(),
        })
    }

    fn clear_data(&mut self) {}
}

impl Visitor for PipelinedInterconnect {
    fn visit_design(&mut self, design: &mut ir::Design) -> VisResult {
        let mut builder = PipelinedInterconnectBuilder::new(self.config);
        synthesize(&mut builder, design, self.verify)?;
        if let Some(out) = &mut self.dump_graph {
            writeln!(out.get_write()?, "{}", Dot::new(builder.graph()))?;
        }
        print_stats(&mut self.print_stats, design)?;
        Ok(Action::Continue)
    }
}

/// Left-edge register allocation.
pub struct MinRegInterconnect {
    verify: bool,
}

impl Named for MinRegInterconnect {
    fn name() -> &'static str {
        "min-reg"
    }

    fn description() -> &'static str {
        "bind temporaries to registers by left-edge allocation"
    }

    fn opts() -> Vec<PassOpt> {
        vec![verify_opt()]
    }
}

impl ConstructVisitor for MinRegInterconnect {
    fn from(ctx: &ir::Context) -> XilResult<Self> {
        Ok(Self {
            verify: Self::get_opts(ctx)[&"verify"].bool(),
        })
    }

    fn clear_data(&mut self) {}
}

impl Visitor for MinRegInterconnect {
    fn visit_design(&mut self, design: &mut ir::Design) -> VisResult {
        synthesize(&mut MinRegInterconnectBuilder, design, self.verify)?;
        Ok(Action::Continue)
    }
}

/// A register for every live temporary.
pub struct MaxRegInterconnect {
    verify: bool,
}

impl Named for MaxRegInterconnect {
    fn name() -> &'static str {
        "max-reg"
    }

    fn description() -> &'static str {
        "bind every temporary to its own register"
    }

    fn opts() -> Vec<PassOpt> {
        vec![verify_opt()]
    }
}

impl ConstructVisitor for MaxRegInterconnect {
    fn from(ctx: &ir::Context) -> XilResult<Self> {
        Ok(Self {
            verify: Self::get_opts(ctx)[&"verify"].bool(),
        })
    }

    fn clear_data(&mut self) {}
}

impl Visitor for MaxRegInterconnect {
    fn visit_design(&mut self, design: &mut ir::Design) -> VisResult {
        synthesize(&mut MaxRegInterconnectBuilder, design, self.verify)?;
        Ok(Action::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interconnect::testing::{fifo, relay};

    fn context(opts: &[&str]) -> ir::Context {
        let mut ctx = ir::Context::new();
        ctx.designs.push(ir::Design::new("relay", relay()));
        ctx.designs.push(ir::Design::new("fifo", fifo(3)));
        ctx.extra_opts = opts.iter().map(|o| o.to_string()).collect();
        ctx
    }

    fn registers(ctx: &ir::Context) -> Vec<(usize, usize)> {
        ctx.designs
            .iter()
            .map(|d| {
                let ic = d.interconnect.as_ref().unwrap();
                (ic.registers.len(), ic.memories.len())
            })
            .collect()
    }

    #[test]
    fn every_design_is_synthesized() {
        let mut ctx = context(&["hclust:verify"]);
        HClustInterconnect::do_pass_default(&mut ctx).unwrap();
        assert_eq!(registers(&ctx), [(1, 0), (3, 0)]);
        assert!(ctx.designs.iter().all(|d| d.detailed.is_some()));

        let mut ctx = context(&["max-reg:verify"]);
        MaxRegInterconnect::do_pass_default(&mut ctx).unwrap();
        assert_eq!(registers(&ctx), [(2, 0), (3, 0)]);

        let mut ctx = context(&["min-reg:verify"]);
        MinRegInterconnect::do_pass_default(&mut ctx).unwrap();
        assert_eq!(registers(&ctx), [(1, 0), (3, 0)]);
    }

    #[test]
    fn pipes_are_verified() {
        let mut ctx = context(&["pipelined:memory-threshold=3", "pipelined:verify"]);
        let pass = <PipelinedInterconnect as ConstructVisitor>::from(&ctx).unwrap();
        assert_eq!(pass.config.hclust.memory_threshold, 3);
        assert!(pass.dump_graph.is_none());
        PipelinedInterconnect::do_pass_default(&mut ctx).unwrap();
        // The three values from `a` shift through one three-stage pipe.
        assert_eq!(registers(&ctx), [(0, 0), (3, 0)]);
    }

    #[test]
    fn stats_are_written_as_json() {
        let path = std::env::temp_dir().join(format!("xil-stats-{}.json", std::process::id()));
        let opt = format!("hclust:print-stats={}", path.display());
        let mut ctx = context(&[&opt]);
        HClustInterconnect::do_pass_default(&mut ctx).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        let lines = text
            .lines()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["design"], "relay");
        assert_eq!(lines[1]["stats"]["registers"], 3);
    }
}
