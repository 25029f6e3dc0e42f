//! Errors generated by the XIL back-end.
use crate::Id;
use itertools::Itertools;
use std::fmt;

/// Convenience wrapper to represent success or a meaningful compiler error.
pub type XilResult<T> = std::result::Result<T, Error>;

/// A location inside the compiled program that an error refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Loc {
    /// The function being processed.
    Function(Id),
    /// Index of an instruction in the function's instruction list.
    Instr(usize),
    /// A control step of a flow matrix.
    CStep(usize),
    /// Index of a temporary (virtual register).
    Temporary(usize),
    /// A concrete signal.
    Signal(Id),
}

impl fmt::Display for Loc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Loc::Function(name) => write!(f, "function `{name}`"),
            Loc::Instr(idx) => write!(f, "instruction {idx}"),
            Loc::CStep(step) => write!(f, "c-step {step}"),
            Loc::Temporary(idx) => write!(f, "temporary t{idx}"),
            Loc::Signal(name) => write!(f, "signal `{name}`"),
        }
    }
}

/// Standard error type for the XIL back-end.
#[derive(Clone)]
pub struct Error {
    kind: Box<ErrorKind>,
    /// Locations that localize the error, innermost first.
    locations: Vec<Loc>,
    /// Message appended after the error text.
    post_msg: Option<String>,
}

impl std::fmt::Debug for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)?;
        if !self.locations.is_empty() {
            write!(f, " (at {})", self.locations.iter().join(", "))?;
        }
        if let Some(post) = &self.post_msg {
            write!(f, "\n{post}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for Error {}

impl Error {
    fn new(kind: ErrorKind) -> Self {
        Self {
            kind: Box::new(kind),
            locations: vec![],
            post_msg: None,
        }
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    pub fn locations(&self) -> &[Loc] {
        &self.locations
    }

    pub fn with_post_msg(mut self, msg: Option<String>) -> Self {
        self.post_msg = msg;
        self
    }

    pub fn at(mut self, loc: Loc) -> Self {
        self.locations.push(loc);
        self
    }

    pub fn at_instr(self, idx: usize) -> Self {
        self.at(Loc::Instr(idx))
    }

    pub fn at_cstep(self, step: usize) -> Self {
        self.at(Loc::CStep(step))
    }

    pub fn at_temporary(self, idx: usize) -> Self {
        self.at(Loc::Temporary(idx))
    }

    pub fn at_signal<S: Into<Id>>(self, name: S) -> Self {
        self.at(Loc::Signal(name.into()))
    }

    pub fn in_function<S: Into<Id>>(self, name: S) -> Self {
        self.at(Loc::Function(name.into()))
    }

    /// The first control step recorded for this error, if any.
    pub fn cstep(&self) -> Option<usize> {
        self.locations.iter().find_map(|l| match l {
            Loc::CStep(s) => Some(*s),
            _ => None,
        })
    }

    /// The first temporary recorded for this error, if any.
    pub fn temporary(&self) -> Option<usize> {
        self.locations.iter().find_map(|l| match l {
            Loc::Temporary(t) => Some(*t),
            _ => None,
        })
    }

    /// The first instruction recorded for this error, if any.
    pub fn instr(&self) -> Option<usize> {
        self.locations.iter().find_map(|l| match l {
            Loc::Instr(i) => Some(*i),
            _ => None,
        })
    }

    pub fn malformed_schedule<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MalformedSchedule(msg.to_string()))
    }

    pub fn cyclic_dataflow<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::CyclicDataflow(msg.to_string()))
    }

    pub fn unsupported<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Unsupported(msg.to_string()))
    }

    pub fn malformed_structure<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::MalformedStructure(msg.to_string()))
    }

    pub fn pass_assumption<S: ToString, M: ToString>(pass: S, msg: M) -> Self {
        Self::new(ErrorKind::PassAssumption(pass.to_string(), msg.to_string()))
    }

    pub fn undefined<S: ToString>(name: Id, typ: S) -> Self {
        Self::new(ErrorKind::Undefined(name, typ.to_string()))
    }

    pub fn already_bound<S: ToString>(name: Id, typ: S) -> Self {
        Self::new(ErrorKind::AlreadyBound(name, typ.to_string()))
    }

    pub fn misc<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::Misc(msg.to_string()))
    }

    pub fn write_error<S: ToString>(msg: S) -> Self {
        Self::new(ErrorKind::WriteError(msg.to_string()))
    }

    /// Whether this error aborts compilation of the whole design rather than
    /// a single conversion.
    pub fn is_fatal(&self) -> bool {
        matches!(
            *self.kind,
            ErrorKind::MalformedSchedule(_) | ErrorKind::CyclicDataflow(_)
        )
    }
}

/// Standard error type for XIL errors.
#[derive(Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A virtual register is read before it is written.
    MalformedSchedule(String),
    /// Closing a flow graph under transitivity resolved a flow to itself.
    CyclicDataflow(String),
    /// A construct that a conversion cannot express.
    Unsupported(String),
    /// An input violates a structural invariant.
    MalformedStructure(String),
    /// The input does not satisfy an assumption made by a pass.
    PassAssumption(String, String),
    /// The name has not been bound.
    Undefined(Id, String),
    /// The name has already been bound.
    AlreadyBound(Id, String),
    /// Miscellaneous error message.
    Misc(String),
    /// Failed to write the output.
    WriteError(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ErrorKind::*;
        match self {
            MalformedSchedule(msg) => write!(f, "[Malformed Schedule] {msg}"),
            CyclicDataflow(msg) => write!(f, "[Cyclic Dataflow] {msg}"),
            Unsupported(msg) => write!(f, "[Unsupported] {msg}"),
            MalformedStructure(msg) => {
                write!(f, "[Malformed Structure]: {msg}")
            }
            PassAssumption(pass, msg) => {
                write!(f, "[{pass}]: {msg}")
            }
            Undefined(name, typ) => {
                write!(f, "Undefined {typ} name: {name}")
            }
            AlreadyBound(name, bound_by) => {
                write!(f, "Name `{name}' already bound by {bound_by}")
            }
            Misc(msg) => write!(f, "{msg}"),
            WriteError(msg) => write!(f, "{msg}"),
        }
    }
}

impl fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::write_error(format!("IO Error: {e}"))
    }
}

impl From<std::fmt::Error> for Error {
    fn from(e: std::fmt::Error) -> Self {
        Error::write_error(format!("Formatting Error: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::misc(format!("serde_json Error: {e}"))
    }
}

/// A collection of errors gathered by a diagnostic pass.
#[derive(Clone)]
pub struct MultiError {
    errors: Vec<Error>,
}

impl MultiError {
    pub fn errors(&self) -> &[Error] {
        &self.errors
    }

    pub fn first(&self) -> Option<&Error> {
        self.errors.first()
    }
}

impl From<Error> for MultiError {
    fn from(e: Error) -> Self {
        Self { errors: vec![e] }
    }
}

impl From<Vec<Error>> for MultiError {
    fn from(errors: Vec<Error>) -> Self {
        Self { errors }
    }
}

impl fmt::Debug for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.errors.iter().map(|e| format!("{e:?}")).join("\n"))
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl std::error::Error for MultiError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locations_are_reported() {
        let err = Error::malformed_schedule("read before write")
            .at_temporary(3)
            .at_cstep(7);
        assert_eq!(err.temporary(), Some(3));
        assert_eq!(err.cstep(), Some(7));
        assert!(err.is_fatal());
        assert_eq!(
            format!("{err}"),
            "[Malformed Schedule] read before write (at temporary t3, c-step 7)"
        );
    }

    #[test]
    fn unsupported_is_not_fatal() {
        let err = Error::unsupported("loop in process").in_function("main");
        assert!(!err.is_fatal());
        assert!(matches!(err.kind(), ErrorKind::Unsupported(_)));
    }
}
