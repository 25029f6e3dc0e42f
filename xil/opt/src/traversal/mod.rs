//! Helpers for traversing the functions and designs of a context.
mod action;
mod construct;
mod diagnostics;
mod visitor;

pub use action::{Action, VisResult};
pub use construct::{ConstructVisitor, Named, ParseVal, PassOpt};
pub use diagnostics::{DiagnosticContext, DiagnosticPass, DiagnosticResult};
pub use visitor::Visitor;
