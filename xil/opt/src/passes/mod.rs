//! Passes over XIL functions and designs.
mod cond_branch_opt;
mod cse;
mod interconnect;
mod local_var_opt;
mod stk_to_3ac;
mod three_ac_to_stk;
mod transitive_goto;
mod well_formed;

pub use cond_branch_opt::ConditionalBranchOptimizer;
pub use cse::Cse;
pub use interconnect::{
    HClustInterconnect, MaxRegInterconnect, MinRegInterconnect,
    PipelinedInterconnect,
};
pub use local_var_opt::{LocalVarOptConfig, LocalVariableOptimizer};
pub use stk_to_3ac::{StkTo3ac, stk_to_3ac};
pub use three_ac_to_stk::{ThreeAcToStk, three_ac_to_stk};
pub use transitive_goto::TransitiveGotoEliminator;
pub use well_formed::WellFormed;
