use crate::Type;
use std::fmt;
use xil_utils::Id;

/// What a flow endpoint denotes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SignalKind {
    /// A concrete signal, port, or memory port.
    Signal(Id),
    /// A virtual register that interconnect synthesis has not yet bound.
    Temporary(u32),
}

/// An endpoint of a flow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SignalRef {
    pub kind: SignalKind,
    pub ty: Type,
}

impl SignalRef {
    pub fn signal<S: Into<Id>>(name: S, ty: Type) -> Self {
        Self {
            kind: SignalKind::Signal(name.into()),
            ty,
        }
    }

    pub fn temporary(idx: usize, ty: Type) -> Self {
        Self {
            kind: SignalKind::Temporary(idx as u32),
            ty,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self.kind, SignalKind::Temporary(_))
    }

    pub fn temporary_index(&self) -> Option<usize> {
        match self.kind {
            SignalKind::Temporary(idx) => Some(idx as usize),
            SignalKind::Signal(_) => None,
        }
    }

    pub fn name(&self) -> Option<Id> {
        match self.kind {
            SignalKind::Signal(name) => Some(name),
            SignalKind::Temporary(_) => None,
        }
    }

    /// The temporary `idx` with the type of this endpoint.
    pub fn tag_endpoint(&self, idx: usize) -> Self {
        Self::temporary(idx, self.ty)
    }
}

impl fmt::Display for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SignalKind::Signal(name) => write!(f, "{name}"),
            SignalKind::Temporary(idx) => write!(f, "t{idx}"),
        }
    }
}
