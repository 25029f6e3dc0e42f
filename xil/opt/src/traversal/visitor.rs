//! Implements a visitor over the functions and designs of an [ir::Context].
//! Passes implemented as a Visitor are directly invoked on the context and
//! process every function and then every design.
use super::action::{Action, VisResult};
use super::{ConstructVisitor, Named};
use xil_ir::{self as ir, Context};
use xil_utils::XilResult;

/// The visiting interface for a compilation context.
///
/// A pass overrides the visit methods for the forms it handles and relies on
/// the defaults to leave everything else untouched.
pub trait Visitor {
    /// Reason to skip the pass on `ctx`, if any. A skipped pass leaves the
    /// context untouched.
    fn precondition(_ctx: &ir::Context) -> Option<String>
    where
        Self: Sized,
    {
        None
    }

    /// [Visitor::start], then the visit method of the function's form, then
    /// [Visitor::finish].
    fn traverse_function(&mut self, func: &mut ir::Function) -> VisResult
    where
        Self: Sized,
    {
        let action = self
            .start(func)?
            .and_then(|| match func {
                ir::Function::Xil3(f) => self.visit_xil3(f),
                ir::Function::Xils(f) => self.visit_xils(f),
            })?
            .and_then(|| self.finish(func))?
            .apply_change(func);
        Ok(action)
    }

    /// Visit every function of `context`, then every design. State is reset
    /// with [ConstructVisitor::clear_data] between functions. The functions
    /// stay in `context` even when a visit fails.
    fn do_pass(&mut self, context: &mut Context) -> XilResult<()>
    where
        Self: Sized + ConstructVisitor + Named,
    {
        if let Some(msg) = Self::precondition(&*context) {
            log::info!("Skipping `{}': {msg}", Self::name());
            return Ok(());
        }

        // Moved out so that `Action::Change` can replace them in place.
        let mut functions = std::mem::take(&mut context.functions);
        let mut stopped = false;
        let mut result = Ok(());
        for func in functions.iter_mut() {
            match self.traverse_function(func) {
                Ok(Action::Stop) => {
                    stopped = true;
                    break;
                }
                Ok(_) => self.clear_data(),
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        context.functions = functions;
        result?;
        if stopped {
            return Ok(());
        }

        for design in context.designs.iter_mut() {
            if let Action::Stop = self.visit_design(design)? {
                break;
            }
        }
        Ok(())
    }

    /// Construct the pass from the options in `context` and run it.
    fn do_pass_default(context: &mut Context) -> XilResult<Self>
    where
        Self: ConstructVisitor + Sized + Named,
    {
        let mut visitor = Self::from(&*context)?;
        visitor.do_pass(context)?;
        Ok(visitor)
    }

    /// Executed before the function's visit method.
    fn start(&mut self, _func: &mut ir::Function) -> VisResult {
        Ok(Action::Continue)
    }

    /// Executed after the function's visit method unless it asked to stop or
    /// replaced the function.
    fn finish(&mut self, _func: &mut ir::Function) -> VisResult {
        Ok(Action::Continue)
    }

    /// Visit a function in three-address form.
    fn visit_xil3(&mut self, _func: &mut ir::Xil3Function) -> VisResult {
        Ok(Action::Continue)
    }

    /// Visit a function in stack form.
    fn visit_xils(&mut self, _func: &mut ir::XilsFunction) -> VisResult {
        Ok(Action::Continue)
    }

    /// Visit a scheduled design.
    fn visit_design(&mut self, _design: &mut ir::Design) -> VisResult {
        Ok(Action::Continue)
    }
}
