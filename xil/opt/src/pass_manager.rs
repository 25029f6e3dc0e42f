//! Registry of named passes and the plans that run them over a context.
use crate::traversal::{ConstructVisitor, DiagnosticPass, Named, Visitor};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::time::Instant;
use xil_ir as ir;
use xil_utils::{Error, MultiError};

pub type PassResult<T> = std::result::Result<T, MultiError>;

/// A registered pass, ready to run over a whole context.
pub type PassClosure = Box<dyn Fn(&mut ir::Context) -> PassResult<()>>;

/// Passes and aliases known by name.
#[derive(Default)]
pub struct PassManager {
    passes: BTreeMap<String, PassClosure>,
    /// Every alias is stored fully expanded to pass names.
    aliases: BTreeMap<String, Vec<String>>,
    help: BTreeMap<String, String>,
}

impl PassManager {
    /// Register `Pass` under its name. Fails if the name is taken.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let mut pm = PassManager::default();
    /// pm.register_pass::<Cse>()?;
    /// ```
    pub fn register_pass<Pass>(&mut self) -> PassResult<()>
    where
        Pass: Visitor + ConstructVisitor + Named,
    {
        self.insert::<Pass>(Box::new(|ctx| {
            Pass::do_pass_default(ctx)?;
            Ok(())
        }))
    }

    /// Register a pass that collects problems instead of failing on the first
    /// one. The pass fails with all collected errors at once. Its warnings
    /// are logged only when there are no errors.
    pub fn register_diagnostic<Pass>(&mut self) -> PassResult<()>
    where
        Pass: Visitor + ConstructVisitor + Named + DiagnosticPass,
    {
        self.insert::<Pass>(Box::new(|ctx| {
            let mut pass = Pass::from(ctx)?;
            pass.do_pass(ctx)?;
            pass.diagnostics().check()?;
            for warning in pass.diagnostics().warning_iter() {
                log::warn!(target: Pass::name(), "{warning}");
            }
            Ok(())
        }))
    }

    fn insert<Pass: Named>(&mut self, run: PassClosure) -> PassResult<()> {
        let name = Pass::name().to_string();
        if self.passes.contains_key(&name) || self.aliases.contains_key(&name) {
            return Err(Error::already_bound(name.into(), "pass").into());
        }
        let mut help = format!("- {name}: {}", Pass::description());
        for opt in Pass::opts() {
            let _ = write!(
                help,
                "\n  * {}: {} (default: {})",
                opt.name(),
                opt.description(),
                opt.default()
            );
        }
        self.help.insert(name.clone(), help);
        self.passes.insert(name, run);
        Ok(())
    }

    /// Define `name` as the sequence `passes`. Entries may be passes or
    /// aliases defined earlier, which are expanded in place.
    pub fn add_alias(&mut self, name: String, passes: Vec<String>) -> PassResult<()> {
        if self.aliases.contains_key(&name) || self.passes.contains_key(&name) {
            return Err(Error::already_bound(name.into(), "alias").into());
        }
        let mut expanded = Vec::with_capacity(passes.len());
        for pass in passes {
            match self.aliases.get(&pass) {
                Some(inner) => expanded.extend(inner.iter().cloned()),
                None if self.passes.contains_key(&pass) => expanded.push(pass),
                None => return Err(Error::undefined(pass.into(), "pass or alias").into()),
            }
        }
        self.aliases.insert(name, expanded);
        Ok(())
    }

    /// Help for one pass, or the expansion of one alias.
    pub fn specific_help(&self, name: &str) -> Option<String> {
        if let Some(help) = self.help.get(name) {
            return Some(help.clone());
        }
        self.aliases.get(name).map(|passes| {
            let mut help = format!("`{name}' runs:");
            for pass in passes {
                let _ = write!(help, "\n- {pass}");
            }
            help
        })
    }

    /// Help for every pass and alias, sorted by name.
    pub fn complete_help(&self) -> String {
        let mut out = String::from("Passes:\n");
        for help in self.help.values() {
            let _ = writeln!(out, "{help}");
        }
        out.push_str("\nAliases:\n");
        for (alias, passes) in &self.aliases {
            let _ = writeln!(out, "- {alias}: {}", passes.join(", "));
        }
        out
    }

    fn expand(&self, names: &[String]) -> PassResult<Vec<String>> {
        let mut passes = Vec::new();
        for name in names {
            match self.aliases.get(name) {
                Some(inner) => passes.extend(inner.iter().cloned()),
                None if self.passes.contains_key(name) => passes.push(name.clone()),
                None => {
                    return Err(Error::undefined(name.into(), "pass or alias")
                        .with_post_msg(Some("see the pass help for registered passes".into()))
                        .into());
                }
            }
        }
        Ok(passes)
    }

    /// The passes that `incl` runs once everything in `excl` is left out.
    pub fn plan(&self, incl: &[String], excl: &[String]) -> PassResult<Vec<String>> {
        let excluded = self.expand(excl)?.into_iter().collect::<BTreeSet<_>>();
        Ok(self
            .expand(incl)?
            .into_iter()
            .filter(|p| !excluded.contains(p))
            .collect())
    }

    /// Run the plan of `incl` and `excl` over `ctx`, in order. With `dump_ir`
    /// the context is printed to stdout after every pass.
    pub fn execute_plan(
        &self,
        ctx: &mut ir::Context,
        incl: &[String],
        excl: &[String],
        dump_ir: bool,
    ) -> PassResult<()> {
        let excluded = self.expand(excl)?.into_iter().collect::<BTreeSet<_>>();
        for name in self.expand(incl)? {
            if excluded.contains(&name) {
                log::info!("{name}: Ignored");
                continue;
            }
            let start = Instant::now();
            self.passes[&name](ctx)?;
            if dump_ir {
                ir::Printer::write_context(ctx, &mut std::io::stdout()).map_err(Error::from)?;
            }
            let elapsed = start.elapsed();
            if elapsed.as_secs() > 5 {
                log::warn!("{name}: {}ms", elapsed.as_millis());
            } else {
                log::info!("{name}: {}ms", elapsed.as_millis());
            }
        }
        Ok(())
    }
}

/// Register an alias with a pass manager. Entries are pass types or string
/// literals naming passes and aliases.
///
/// ## Example
/// ```rust,ignore
/// let mut pm = PassManager::default();
/// register_alias!(pm, "validate", [WellFormed]);
/// ```
#[macro_export]
macro_rules! register_alias {
    (@name $pass:ident) => {
        $pass::name().to_string()
    };

    (@name $pass:literal) => {
        $pass.to_string()
    };

    ($manager:expr, $alias:literal, [ $($pass:tt),* $(,)? ]) => {
        $manager.add_alias($alias.to_string(), vec![
            $($crate::register_alias!(@name $pass)),*
        ])?;
    };
}
