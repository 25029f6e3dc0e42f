//! Actions control the traversal of a compilation context.
use xil_ir as ir;
use xil_utils::XilResult;

pub type VisResult = XilResult<Action>;

/// What the traversal does after a visit method returns.
pub enum Action {
    Continue,
    /// Skip the remaining functions and designs.
    Stop,
    /// Replace the visited function, possibly by one in the other
    /// instruction form. None of the remaining visit methods run on the
    /// function.
    Change(Box<ir::Function>),
}

impl Action {
    /// `next` runs only after `Continue`.
    pub(super) fn and_then<F>(self, mut next: F) -> VisResult
    where
        F: FnMut() -> VisResult,
    {
        match self {
            Action::Continue => next(),
            Action::Change(_) | Action::Stop => Ok(self),
        }
    }

    pub fn change(func: ir::Function) -> Self {
        Action::Change(Box::new(func))
    }

    /// Install a replacement in `func`. A change then continues the
    /// traversal.
    pub(super) fn apply_change(self, func: &mut ir::Function) -> Action {
        match self {
            Action::Change(f) => {
                *func = *f;
                Action::Continue
            }
            action => action,
        }
    }
}
