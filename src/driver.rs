//! Driver for the XIL back-end.
use xil_ir as ir;
use xil_opt::pass_manager::{PassManager, PassResult};

/// A pass plan over the default passes, with the extra options handed to
/// the passes.
#[derive(Clone, Debug, Default)]
pub struct Driver {
    passes: Vec<String>,
    disabled: Vec<String>,
    extra_opts: Vec<String>,
    dump_ir: bool,
}

impl Driver {
    /// Run the given passes and aliases in order.
    pub fn new<S: AsRef<str>>(passes: &[S]) -> Self {
        Self {
            passes: passes.iter().map(|p| p.as_ref().to_string()).collect(),
            ..Default::default()
        }
    }

    /// Skip `pass` wherever the plan would run it.
    pub fn disable(mut self, pass: &str) -> Self {
        self.disabled.push(pass.to_string());
        self
    }

    /// Add a pass option of the form `pass:opt` or `pass:opt=value`.
    pub fn opt(mut self, opt: &str) -> Self {
        self.extra_opts.push(opt.to_string());
        self
    }

    /// Print the context to stdout after every pass.
    pub fn dump_ir(mut self, dump: bool) -> Self {
        self.dump_ir = dump;
        self
    }

    /// Run the plan over `ctx`. Options already present in the context are
    /// kept and the driver's options are appended.
    pub fn run(&self, ctx: &mut ir::Context) -> PassResult<()> {
        let pm = PassManager::default_passes()?;
        ctx.extra_opts.extend(self.extra_opts.iter().cloned());
        log::debug!("pass plan: {}", pm.plan(&self.passes, &self.disabled)?.join(", "));
        pm.execute_plan(ctx, &self.passes, &self.disabled, self.dump_ir)
    }

    /// Help for every registered pass and alias.
    pub fn help() -> PassResult<String> {
        Ok(PassManager::default_passes()?.complete_help())
    }
}
