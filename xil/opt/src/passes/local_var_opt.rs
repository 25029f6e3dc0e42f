use crate::analysis::DataflowAnalyzer;
use crate::rewrite::{XilsRewrite, XilsRewriter};
use crate::traversal::{
    Action, ConstructVisitor, Named, ParseVal, PassOpt, VisResult, Visitor,
};
use std::collections::{BTreeMap, BTreeSet};
use xil_ir::{
    self as ir, InstrIdx, Opcode, Preds, StackModel, StaticOperand, XilsInstr,
    local_access,
};
use xil_utils::{Error, IndexRef, XilResult};

/// Which eliminations [LocalVariableOptimizer] performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalVarOptConfig {
    /// Keep values that are stored and read back exactly once on the stack.
    pub read_after_write: bool,
    /// Replace stores that are never read by a `Pop`.
    pub never_read: bool,
}

impl Default for LocalVarOptConfig {
    fn default() -> Self {
        Self {
            read_after_write: true,
            never_read: true,
        }
    }
}

/// Promotes locals to stack values.
///
/// A store whose value is read by exactly one load in the same basic block
/// leaves the value on the stack instead. The value is buried at the bottom
/// of the stack, out of reach of the instructions in between, and dug up
/// again in place of the load. Stores of eliminable locals that are never
/// read become a `Pop`.
pub struct LocalVariableOptimizer {
    config: LocalVarOptConfig,
    /// Promoted stores mapped to their load, and the inverse.
    promoted: BTreeMap<InstrIdx, InstrIdx>,
    loads: BTreeMap<InstrIdx, InstrIdx>,
    dead_stores: BTreeSet<InstrIdx>,
    /// For every element of the output stack, the promoted store whose value
    /// it is.
    tags: StackModel<Option<InstrIdx>>,
}

impl Named for LocalVariableOptimizer {
    fn name() -> &'static str {
        "local-var-opt"
    }

    fn description() -> &'static str {
        "keep local variables on the evaluation stack where possible"
    }

    fn opts() -> Vec<PassOpt> {
        vec![
            PassOpt::new(
                "read-after-write",
                "eliminate store/load pairs within a basic block",
                ParseVal::Bool(true),
                PassOpt::parse_bool,
            ),
            PassOpt::new(
                "never-read",
                "replace stores that are never read by a pop",
                ParseVal::Bool(true),
                PassOpt::parse_bool,
            ),
        ]
    }
}

impl ConstructVisitor for LocalVariableOptimizer {
    fn from(ctx: &ir::Context) -> XilResult<Self> {
        let opts = Self::get_opts(ctx);
        Ok(Self::with_config(LocalVarOptConfig {
            read_after_write: opts[&"read-after-write"].bool(),
            never_read: opts[&"never-read"].bool(),
        }))
    }

    fn clear_data(&mut self) {
        self.promoted.clear();
        self.loads.clear();
        self.dead_stores.clear();
        self.tags.clear();
    }
}

impl LocalVariableOptimizer {
    pub fn with_config(config: LocalVarOptConfig) -> Self {
        Self {
            config,
            promoted: BTreeMap::new(),
            loads: BTreeMap::new(),
            dead_stores: BTreeSet::new(),
            tags: StackModel::new(),
        }
    }

    pub fn run(&mut self, func: &ir::XilsFunction) -> XilResult<ir::XilsFunction> {
        self.clear_data();
        // Values only stay on the stack within a block.
        let flow = DataflowAnalyzer {
            do_not_optimize_across_basic_blocks: true,
        }
        .analyze(func);
        if self.config.read_after_write {
            self.promoted = flow.read_after_write().clone();
            self.loads = self.promoted.iter().map(|(s, l)| (*l, *s)).collect();
        }
        if self.config.never_read {
            let eliminable = flow.eliminable_locals();
            self.dead_stores = flow
                .written_and_never_read()
                .into_iter()
                .filter(|s| {
                    local_access(&func.instrs[*s].cmd)
                        .is_some_and(|(_, local)| eliminable.contains(&local))
                })
                .collect();
        }
        let res = XilsRewriter::run(func, self)?;
        log::debug!(
            "{}: {} store/load pairs promoted, {} dead stores popped",
            func.name,
            self.promoted.len(),
            self.dead_stores.len()
        );
        Ok(res.function)
    }

    /// Mirror `instr` on the tags and emit it.
    fn emit(
        &mut self,
        rw: &mut XilsRewriter<'_>,
        instr: XilsInstr,
        primary: bool,
    ) -> XilResult<()> {
        match (instr.cmd.op, &instr.cmd.operand) {
            (Opcode::Dig, StaticOperand::Depth(n)) => self.tags.dig(*n)?,
            (Opcode::Dup, _) => self.tags.dup()?,
            (Opcode::Swap, _) => self.tags.swap()?,
            (op, _) => {
                self.tags.pop_n(instr.operand_types.len())?;
                instr.result_types.iter().for_each(|_| self.tags.push(None));
                if op.is_terminator() {
                    self.tags.clear();
                }
            }
        }
        if primary {
            rw.emit_primary(instr)?;
        } else {
            rw.emit(instr)?;
        }
        Ok(())
    }

    /// Dig the element `depth` positions below the top.
    fn dig(
        &mut self,
        rw: &mut XilsRewriter<'_>,
        depth: usize,
        preds: Preds,
        primary: bool,
    ) -> XilResult<()> {
        let types = rw.stack().top(depth + 1)?.to_vec();
        self.emit(rw, XilsInstr::dig(&types, preds), primary)
    }

    /// Keep the value stored at `store` on the stack, below everything else.
    fn promote(&mut self, rw: &mut XilsRewriter<'_>, store: InstrIdx) -> XilResult<()> {
        self.tags.pop()?;
        self.tags.push(Some(store));
        let depth = self.tags.depth();
        for _ in 1..depth {
            self.dig(rw, depth - 1, Preds::new(), false)?;
        }
        Ok(())
    }

    /// Bring the value of `store` back to the top of the stack.
    fn unpromote(
        &mut self,
        rw: &mut XilsRewriter<'_>,
        store: InstrIdx,
        instr: &XilsInstr,
    ) -> XilResult<()> {
        let pos = self
            .tags
            .position_from_top(|t| *t == Some(store))
            .ok_or_else(|| {
                Error::malformed_structure(format!(
                    "value of the store at {} is not on the stack",
                    store.index()
                ))
            })?;
        if pos > 0 {
            let preds = rw.map_preds(&instr.preds);
            self.dig(rw, pos, preds, true)?;
        }
        self.tags.pop()?;
        self.tags.push(None);
        Ok(())
    }
}

impl XilsRewrite for LocalVariableOptimizer {
    fn begin_block(&mut self, rw: &mut XilsRewriter<'_>, _start: InstrIdx) -> XilResult<()> {
        self.tags = StackModel::from_bottom_up(vec![None; rw.stack().depth()]);
        Ok(())
    }

    fn rewrite(
        &mut self,
        rw: &mut XilsRewriter<'_>,
        idx: InstrIdx,
        instr: &XilsInstr,
    ) -> XilResult<()> {
        if !rw.is_reachable() {
            return rw.process_default(instr);
        }
        if self.promoted.contains_key(&idx) {
            return self.promote(rw, idx);
        }
        if let Some(store) = self.loads.get(&idx).copied() {
            return self.unpromote(rw, store, instr);
        }
        if self.dead_stores.contains(&idx) {
            let mut pop = XilsInstr::pop(instr.operand_types[0]);
            pop.preds = rw.map_preds(&instr.preds);
            return self.emit(rw, pop, true);
        }
        let mut out = instr.clone();
        out.preds = rw.map_preds(&instr.preds);
        self.emit(rw, out, true)
    }
}

impl Visitor for LocalVariableOptimizer {
    fn visit_xils(&mut self, func: &mut ir::XilsFunction) -> VisResult {
        let out = self.run(func)?;
        Ok(Action::change(ir::Function::Xils(out)))
    }
}
