//! # The XIL back-end
//!
//! This crate plumbs together the XIL crates. [`xil_ir`] defines the
//! three-address and stack function forms and the flow matrix, [`xil_opt`]
//! holds the rewriting passes and the interconnect builders, and
//! [`xil_utils`] the shared errors, identifiers and indices.
//!
//! A host fills an [ir::Context] with functions and scheduled designs and
//! runs named passes over it:
//!
//! ```rust,ignore
//! let mut ctx = ir::Context::new();
//! ctx.designs.push(ir::Design::new("main", spec));
//! xil::Driver::new(&["all", "hclust"]).opt("hclust:verify").run(&mut ctx)?;
//! ```
mod driver;

pub use driver::Driver;
pub use xil_ir as ir;
pub use xil_opt as opt;
pub use xil_utils as utils;
