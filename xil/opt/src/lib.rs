//! Optimizations and interconnect synthesis for the XIL back-end.
//!
//! Passes rewrite the functions of an [xil_ir::Context] between the
//! three-address (XIL-3) and stack (XIL-S) forms, optimize them, and bind
//! the temporaries of every scheduled [xil_ir::Design] to registers and
//! memories. The [pass_manager::PassManager] runs them by name:
//!
//! ```rust,ignore
//! let pm = PassManager::default_passes()?;
//! pm.execute_plan(&mut ctx, &["all".to_string()], &[], false)?;
//! ```
pub mod analysis;
pub mod default_passes;
pub mod interconnect;
pub mod pass_manager;
pub mod passes;
pub mod rewrite;
pub mod traversal;
