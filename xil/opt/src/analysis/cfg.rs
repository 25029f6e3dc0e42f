use petgraph::{
    Direction::{Incoming, Outgoing},
    algo::dominators::{self, Dominators},
    graph::{DiGraph, NodeIndex},
    visit::DfsPostOrder,
};
use std::collections::BTreeSet;
use xil_ir::{InstrIdx, InstrList};
use xil_utils::IndexRef;

/// A maximal run of instructions `start..end` that is entered only at
/// `start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    pub start: InstrIdx,
    pub end: InstrIdx,
}

impl BasicBlock {
    pub fn len(&self) -> usize {
        self.end.index() - self.start.index()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The instruction that decides where control goes next.
    pub fn last(&self) -> InstrIdx {
        InstrIdx::new(self.end.index() - 1)
    }

    pub fn contains(&self, idx: InstrIdx) -> bool {
        self.start <= idx && idx < self.end
    }
}

/// The control-flow graph of a function in either form. Node `i` of the
/// graph is block `i`, and blocks are ordered by their first instruction.
#[derive(Clone, Debug)]
pub struct ControlFlowGraph {
    blocks: Vec<BasicBlock>,
    block_of: Vec<usize>,
    graph: DiGraph<usize, ()>,
}

impl ControlFlowGraph {
    pub fn build<F: InstrList>(func: &F) -> Self {
        let bounds = func.basic_block_boundaries();
        let starts = bounds.iter().copied().collect::<Vec<_>>();
        let mut blocks = Vec::with_capacity(starts.len());
        let mut block_of = vec![0; func.len()];
        let mut graph = DiGraph::new();
        for (b, start) in starts.iter().enumerate() {
            let end = starts
                .get(b + 1)
                .copied()
                .unwrap_or_else(|| InstrIdx::new(func.len()));
            for i in start.index()..end.index() {
                block_of[i] = b;
            }
            blocks.push(BasicBlock { start: *start, end });
            graph.add_node(b);
        }
        for (b, block) in blocks.iter().enumerate() {
            for succ in func.successors(block.last()) {
                graph.update_edge(
                    NodeIndex::new(b),
                    NodeIndex::new(block_of[succ.index()]),
                    (),
                );
            }
        }
        Self {
            blocks,
            block_of,
            graph,
        }
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, b: usize) -> BasicBlock {
        self.blocks[b]
    }

    /// The block that contains `idx`.
    pub fn block_of(&self, idx: InstrIdx) -> usize {
        self.block_of[idx.index()]
    }

    fn neighbors(&self, b: usize, dir: petgraph::Direction) -> Vec<usize> {
        let mut out = self
            .graph
            .neighbors_directed(NodeIndex::new(b), dir)
            .map(|n| n.index())
            .collect::<Vec<_>>();
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn successors(&self, b: usize) -> Vec<usize> {
        self.neighbors(b, Outgoing)
    }

    pub fn predecessors(&self, b: usize) -> Vec<usize> {
        self.neighbors(b, Incoming)
    }

    fn dominator_tree(&self) -> Option<Dominators<NodeIndex>> {
        (!self.is_empty())
            .then(|| dominators::simple_fast(&self.graph, NodeIndex::new(0)))
    }

    /// The immediate dominator of every block. The entry block and
    /// unreachable blocks have none.
    pub fn dominators(&self) -> Vec<Option<usize>> {
        let Some(doms) = self.dominator_tree() else {
            return vec![];
        };
        (0..self.len())
            .map(|b| {
                doms.immediate_dominator(NodeIndex::new(b))
                    .map(|d| d.index())
            })
            .collect()
    }

    /// Whether every path from the entry to `b` passes through `a`.
    pub fn dominates(&self, a: usize, b: usize) -> bool {
        self.dominator_tree()
            .and_then(|doms| {
                doms.dominators(NodeIndex::new(b))
                    .map(|mut it| it.any(|d| d.index() == a))
            })
            .unwrap_or(false)
    }

    /// Edges whose target dominates their source.
    pub fn back_edges(&self) -> Vec<(usize, usize)> {
        let Some(doms) = self.dominator_tree() else {
            return vec![];
        };
        let dominates = |a: usize, b: usize| {
            doms.dominators(NodeIndex::new(b))
                .is_some_and(|mut it| it.any(|d| d.index() == a))
        };
        let mut edges = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(s, t)| (s.index(), t.index()))
            .filter(|(s, t)| dominates(*t, *s))
            .collect::<Vec<_>>();
        edges.sort_unstable();
        edges
    }

    /// Blocks that are the target of a back edge.
    pub fn loop_headers(&self) -> BTreeSet<usize> {
        self.back_edges().into_iter().map(|(_, h)| h).collect()
    }

    /// Reachable blocks in reverse postorder from the entry.
    pub fn reverse_postorder(&self) -> Vec<usize> {
        if self.is_empty() {
            return vec![];
        }
        let mut order = Vec::with_capacity(self.len());
        let mut dfs = DfsPostOrder::new(&self.graph, NodeIndex::new(0));
        while let Some(n) = dfs.next(&self.graph) {
            order.push(n.index());
        }
        order.reverse();
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xil_ir::{
        Opcode, Preds, StaticOperand, Type, Value, XilInstr, XilsFunction,
        XilsInstr,
    };

    /// 0: Ld0; 1: Ldv; 2: BrTrue L0 -> 1; 3: Ret
    fn simple_loop() -> XilsFunction {
        let mut f = XilsFunction::new("loop");
        let l0 = f.labels.create(InstrIdx::new(1));
        f.instrs.push(XilsInstr::nop());
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::LdConst, StaticOperand::Const(Value::Bool(false))),
            Preds::new(),
            [],
            [Type::Bool],
        ));
        f.instrs.push(XilsInstr::new(
            XilInstr::new(Opcode::BrTrue, StaticOperand::Label(l0)),
            Preds::new(),
            [Type::Bool],
            [],
        ));
        f.instrs.push(XilsInstr::new(XilInstr::simple(Opcode::Ret), Preds::new(), [], []));
        f
    }

    #[test]
    fn blocks_and_edges() {
        let f = simple_loop();
        let cfg = ControlFlowGraph::build(&f);
        assert_eq!(cfg.len(), 3);
        assert_eq!(cfg.block(1).start, InstrIdx::new(1));
        assert_eq!(cfg.block(1).len(), 2);
        assert_eq!(cfg.block_of(InstrIdx::new(2)), 1);
        assert_eq!(cfg.successors(1), vec![1, 2]);
        assert_eq!(cfg.predecessors(1), vec![0, 1]);
        assert_eq!(cfg.reverse_postorder()[0], 0);
    }

    #[test]
    fn loops_have_back_edges() {
        let cfg = ControlFlowGraph::build(&simple_loop());
        assert_eq!(cfg.dominators(), vec![None, Some(0), Some(1)]);
        assert!(cfg.dominates(0, 2));
        assert!(!cfg.dominates(2, 1));
        assert_eq!(cfg.back_edges(), vec![(1, 1)]);
        assert_eq!(cfg.loop_headers().into_iter().collect::<Vec<_>>(), vec![1]);
    }
}
