use super::ControlFlowGraph;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use xil_ir::{InstrIdx, LocalIdx, Opcode, XilsFunction, local_access};
use xil_utils::IndexRef;

/// A definition of a local that may reach a load.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DefPoint {
    /// The value the local holds when the function is entered.
    Entry,
    /// The `Stv` at the given index.
    Store(InstrIdx),
}

type DefState = BTreeMap<LocalIdx, BTreeSet<DefPoint>>;

/// Computes reaching definitions of the locals of a stack function.
#[derive(Clone, Debug)]
pub struct DataflowAnalyzer {
    /// Only pair a store with a load in the same basic block.
    pub do_not_optimize_across_basic_blocks: bool,
}

impl Default for DataflowAnalyzer {
    fn default() -> Self {
        Self {
            do_not_optimize_across_basic_blocks: true,
        }
    }
}

/// Def-use chains of the locals of one function.
#[derive(Clone, Debug, Default)]
pub struct LocalDataflow {
    load_defs: BTreeMap<InstrIdx, BTreeSet<DefPoint>>,
    store_uses: BTreeMap<InstrIdx, BTreeSet<InstrIdx>>,
    stores_of: BTreeMap<LocalIdx, BTreeSet<InstrIdx>>,
    raw: BTreeMap<InstrIdx, InstrIdx>,
}

fn transfer(func: &XilsFunction, idx: InstrIdx, state: &mut DefState) {
    if let Some((Opcode::Stv, local)) = local_access(&func.instrs[idx].cmd) {
        state.insert(local, BTreeSet::from([DefPoint::Store(idx)]));
    }
}

fn join(into: &mut DefState, from: &DefState) -> bool {
    let mut changed = false;
    for (local, defs) in from {
        let entry = into.entry(*local).or_default();
        for def in defs {
            changed |= entry.insert(*def);
        }
    }
    changed
}

impl DataflowAnalyzer {
    pub fn analyze(&self, func: &XilsFunction) -> LocalDataflow {
        let cfg = ControlFlowGraph::build(func);
        let mut flow = LocalDataflow::default();
        if cfg.is_empty() {
            return flow;
        }

        let mut block_in: Vec<Option<DefState>> = vec![None; cfg.len()];
        block_in[0] = Some(
            func.locals
                .keys()
                .map(|l| (l, BTreeSet::from([DefPoint::Entry])))
                .collect(),
        );
        let mut worklist = cfg.reverse_postorder().into_iter().collect::<VecDeque<_>>();
        while let Some(b) = worklist.pop_front() {
            let Some(mut state) = block_in[b].clone() else {
                continue;
            };
            let block = cfg.block(b);
            for i in block.start.index()..block.end.index() {
                transfer(func, InstrIdx::new(i), &mut state);
            }
            for succ in cfg.successors(b) {
                let changed = match block_in[succ].as_mut() {
                    Some(prev) => join(prev, &state),
                    None => {
                        block_in[succ] = Some(state.clone());
                        true
                    }
                };
                if changed && !worklist.contains(&succ) {
                    worklist.push_back(succ);
                }
            }
        }
        log::trace!(
            "{}: {} blocks, {} loop headers",
            func.name,
            cfg.len(),
            cfg.loop_headers().len()
        );

        for (b, state) in block_in.into_iter().enumerate() {
            let Some(mut state) = state else { continue };
            let block = cfg.block(b);
            for i in block.start.index()..block.end.index() {
                let idx = InstrIdx::new(i);
                match local_access(&func.instrs[idx].cmd) {
                    Some((Opcode::Ldv, local)) => {
                        let defs = state.get(&local).cloned().unwrap_or_default();
                        for def in &defs {
                            if let DefPoint::Store(s) = def {
                                flow.store_uses.entry(*s).or_default().insert(idx);
                            }
                        }
                        flow.load_defs.insert(idx, defs);
                    }
                    Some((_, local)) => {
                        flow.stores_of.entry(local).or_default().insert(idx);
                        flow.store_uses.entry(idx).or_default();
                    }
                    None => (),
                }
                transfer(func, idx, &mut state);
            }
        }

        for (store, uses) in &flow.store_uses {
            let (1, Some(&load)) = (uses.len(), uses.first()) else {
                continue;
            };
            let only_this_store = flow
                .load_defs
                .get(&load)
                .is_some_and(|defs| defs.len() == 1 && defs.contains(&DefPoint::Store(*store)));
            if !only_this_store || load <= *store {
                continue;
            }
            if self.do_not_optimize_across_basic_blocks
                && cfg.block_of(*store) != cfg.block_of(load)
            {
                continue;
            }
            let barrier = (store.index() + 1..load.index())
                .any(|i| func.instrs[InstrIdx::new(i)].cmd.op == Opcode::Barrier);
            if !barrier {
                flow.raw.insert(*store, load);
            }
        }
        flow
    }
}

impl LocalDataflow {
    /// The definitions that may reach the load at `load`.
    pub fn reaching(&self, load: InstrIdx) -> Option<&BTreeSet<DefPoint>> {
        self.load_defs.get(&load)
    }

    /// The loads that may observe the store at `store`.
    pub fn uses(&self, store: InstrIdx) -> Option<&BTreeSet<InstrIdx>> {
        self.store_uses.get(&store)
    }

    /// Stores whose value is read by exactly one later load that no other
    /// definition reaches, mapped to that load.
    pub fn read_after_write(&self) -> &BTreeMap<InstrIdx, InstrIdx> {
        &self.raw
    }

    /// Stores that no load observes.
    pub fn written_and_never_read(&self) -> BTreeSet<InstrIdx> {
        self.store_uses
            .iter()
            .filter(|(_, uses)| uses.is_empty())
            .map(|(s, _)| *s)
            .collect()
    }

    /// Locals that are stored at least once and whose every store is either
    /// paired with its single load or never read.
    pub fn eliminable_locals(&self) -> BTreeSet<LocalIdx> {
        self.stores_of
            .iter()
            .filter(|(_, stores)| {
                stores.iter().all(|s| {
                    self.raw.contains_key(s)
                        || self.store_uses.get(s).is_none_or(BTreeSet::is_empty)
                })
            })
            .map(|(l, _)| *l)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xil_ir::{
        Preds, StaticOperand, Type, VarDesc, VarRef, XilInstr, XilsInstr,
    };

    fn ld_const(v: i64) -> XilsInstr {
        XilsInstr::new(
            XilInstr::new(Opcode::LdConst, StaticOperand::Const(xil_ir::Value::Int(v))),
            Preds::new(),
            [],
            [Type::Signed(8)],
        )
    }

    fn ret() -> XilsInstr {
        XilsInstr::new(XilInstr::simple(Opcode::Ret), Preds::new(), [Type::Signed(8)], [])
    }

    #[test]
    fn pairs_and_dead_stores() {
        let mut f = XilsFunction::new("f");
        let x = VarRef::Local(f.locals.push(VarDesc::new("x", Type::Signed(8))));
        let y = VarRef::Local(f.locals.push(VarDesc::new("y", Type::Signed(8))));
        f.instrs.push(ld_const(1)); // 0
        f.instrs.push(XilsInstr::store_var(x, Type::Signed(8))); // 1
        f.instrs.push(ld_const(2)); // 2
        f.instrs.push(XilsInstr::store_var(y, Type::Signed(8))); // 3: never read
        f.instrs.push(XilsInstr::load_var(x, Type::Signed(8))); // 4
        f.instrs.push(ret()); // 5
        f.validate().unwrap();

        let flow = DataflowAnalyzer::default().analyze(&f);
        assert_eq!(
            flow.read_after_write().iter().collect::<Vec<_>>(),
            vec![(&InstrIdx::new(1), &InstrIdx::new(4))]
        );
        assert_eq!(
            flow.written_and_never_read().into_iter().collect::<Vec<_>>(),
            vec![InstrIdx::new(3)]
        );
        assert_eq!(flow.eliminable_locals().len(), 2);
    }

    #[test]
    fn loads_across_blocks() {
        // 0: LdConst; 1: Stv x; 2: Goto L0; 3: Ldv x (L0); 4: Ret
        let mut f = XilsFunction::new("g");
        let x = VarRef::Local(f.locals.push(VarDesc::new("x", Type::Signed(8))));
        let l0 = f.labels.create(InstrIdx::new(3));
        f.instrs.push(ld_const(1));
        f.instrs.push(XilsInstr::store_var(x, Type::Signed(8)));
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::Goto, StaticOperand::Label(l0)),
            Preds::new(),
            [],
            [],
        ));
        f.instrs.push(XilsInstr::load_var(x, Type::Signed(8)));
        f.instrs.push(ret());
        f.validate().unwrap();

        let flow = DataflowAnalyzer::default().analyze(&f);
        assert!(flow.read_after_write().is_empty());
        assert!(flow.eliminable_locals().is_empty());
        assert_eq!(
            flow.reaching(InstrIdx::new(3)),
            Some(&BTreeSet::from([DefPoint::Store(InstrIdx::new(1))]))
        );

        let across = DataflowAnalyzer {
            do_not_optimize_across_basic_blocks: false,
        };
        assert_eq!(across.analyze(&f).read_after_write().len(), 1);
    }

    #[test]
    fn entry_definition_reaches_loop_loads() {
        // 0: Ldv x (L0); 1: Stv x; 2: Goto L0
        let mut f = XilsFunction::new("h");
        let x = VarRef::Local(f.locals.push(VarDesc::new("x", Type::Signed(8))));
        let l0 = f.labels.create(InstrIdx::new(0));
        f.instrs.push(XilsInstr::load_var(x, Type::Signed(8)));
        f.instrs.push(XilsInstr::store_var(x, Type::Signed(8)));
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::Goto, StaticOperand::Label(l0)),
            Preds::new(),
            [],
            [],
        ));
        let flow = DataflowAnalyzer::default().analyze(&f);
        assert_eq!(
            flow.reaching(InstrIdx::new(0)),
            Some(&BTreeSet::from([DefPoint::Entry, DefPoint::Store(InstrIdx::new(1))]))
        );
        assert!(flow.read_after_write().is_empty());
    }
}
