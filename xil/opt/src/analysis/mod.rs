//! Analyses over functions and flow matrices used by the rewriters and the
//! interconnect builders.
mod cfg;
mod dataflow;
mod intervals;
mod lifetimes;
mod pipe;
mod union_find;

pub use cfg::{BasicBlock, ControlFlowGraph};
pub use dataflow::{DataflowAnalyzer, DefPoint, LocalDataflow};
pub use intervals::IntervalSet;
pub use lifetimes::{Lifetime, Lifetimes};
pub use pipe::{PipePlan, plan_pipe};
pub use union_find::UnionFind;
