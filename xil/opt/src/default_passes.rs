//! The passes and aliases every [PassManager] starts with.
use crate::pass_manager::PassResult;
use crate::passes::{
    ConditionalBranchOptimizer, Cse, HClustInterconnect, LocalVariableOptimizer,
    MaxRegInterconnect, MinRegInterconnect, PipelinedInterconnect, StkTo3ac,
    ThreeAcToStk, TransitiveGotoEliminator, WellFormed,
};
use crate::traversal::Named;
use crate::{pass_manager::PassManager, register_alias};

impl PassManager {
    pub fn default_passes() -> PassResult<Self> {
        let mut pm = PassManager::default();

        // Validation passes
        pm.register_diagnostic::<WellFormed>()?;

        // Conversion passes
        pm.register_pass::<StkTo3ac>()?;
        pm.register_pass::<ThreeAcToStk>()?;

        // Optimization passes
        pm.register_pass::<Cse>()?;
        pm.register_pass::<LocalVariableOptimizer>()?;
        pm.register_pass::<TransitiveGotoEliminator>()?;
        pm.register_pass::<ConditionalBranchOptimizer>()?;

        // Interconnect synthesis
        pm.register_pass::<HClustInterconnect>()?;
        pm.register_pass::<PipelinedInterconnect>()?;
        pm.register_pass::<MinRegInterconnect>()?;
        pm.register_pass::<MaxRegInterconnect>()?;

        register_alias!(pm, "validate", [WellFormed]);
        register_alias!(pm, "opt3", [Cse]);
        register_alias!(
            pm,
            "lower-stack",
            [
                ThreeAcToStk,
                LocalVariableOptimizer,
                TransitiveGotoEliminator,
                ConditionalBranchOptimizer,
            ]
        );
        register_alias!(
            pm,
            "all",
            [StkTo3ac, "validate", "opt3", "lower-stack", WellFormed]
        );

        Ok(pm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_expand_to_registered_passes() {
        let pm = PassManager::default_passes().unwrap();
        let plan = pm.plan(&["all".to_string()], &[]).unwrap();
        assert_eq!(
            plan,
            [
                "stk-to-3ac",
                "well-formed",
                "cse",
                "3ac-to-stk",
                "local-var-opt",
                "transitive-goto",
                "cond-branch-opt",
                "well-formed",
            ]
        );
        let help = pm.complete_help();
        assert!(help.contains("memory-threshold"));
        assert!(pm.specific_help("pipelined").unwrap().contains("dump-graph"));
    }
}
