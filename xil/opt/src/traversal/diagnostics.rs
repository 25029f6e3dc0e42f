//! Error collection for passes that report every broken function and design
//! instead of stopping at the first one.
use super::{Action, VisResult};
use xil_utils::{Error, MultiError, XilResult};

/// A pass that collects problems in a [DiagnosticContext]. The pass manager
/// fails such a pass when it collected an error and logs its warnings
/// otherwise.
pub trait DiagnosticPass {
    fn diagnostics(&self) -> &DiagnosticContext;
}

/// Errors and warnings in the order they were found.
#[derive(Default, Debug)]
pub struct DiagnosticContext {
    errors: Vec<Error>,
    warnings: Vec<Error>,
}

impl DiagnosticContext {
    pub fn err(&mut self, error: Error) {
        self.errors.push(error);
    }

    pub fn warning(&mut self, warning: Error) {
        self.warnings.push(warning);
    }

    pub fn errors_iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    pub fn warning_iter(&self) -> impl Iterator<Item = &Error> {
        self.warnings.iter()
    }

    /// Every collected error at once, if there is one.
    pub fn check(&self) -> Result<(), MultiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(MultiError::from(self.errors.clone()))
        }
    }
}

/// Moves the error of a result into a [DiagnosticContext] so that the
/// traversal can go on with the next item.
pub trait DiagnosticResult {
    fn accumulate_err(self, diag: &mut DiagnosticContext) -> Self;
}

impl<T: Default> DiagnosticResult for XilResult<T> {
    fn accumulate_err(self, diag: &mut DiagnosticContext) -> Self {
        self.or_else(|err| {
            diag.err(err);
            Ok(T::default())
        })
    }
}

impl DiagnosticResult for VisResult {
    fn accumulate_err(self, diag: &mut DiagnosticContext) -> Self {
        self.or_else(|err| {
            diag.err(err);
            Ok(Action::Continue)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_kept_in_order() {
        let mut diag = DiagnosticContext::default();
        assert!(diag.check().is_ok());
        let r: XilResult<usize> = Err(Error::misc("first"));
        assert_eq!(r.accumulate_err(&mut diag).unwrap(), 0);
        let v: VisResult = Err(Error::cyclic_dataflow("second"));
        assert!(matches!(v.accumulate_err(&mut diag), Ok(Action::Continue)));
        diag.warning(Error::misc("only a warning"));
        let all = diag.check().unwrap_err();
        assert_eq!(all.errors().len(), 2);
        assert!(matches!(all.first().unwrap().kind(), xil_utils::ErrorKind::Misc(_)));
        assert_eq!(diag.warning_iter().count(), 1);
    }
}
