use crate::{FlowMatrix, Interconnect, Xil3Function, XilsFunction};
use xil_utils::{GetName, Id};

/// A function in either instruction form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Function {
    Xil3(Xil3Function),
    Xils(XilsFunction),
}

impl Function {
    pub fn as_xil3(&self) -> Option<&Xil3Function> {
        match self {
            Function::Xil3(f) => Some(f),
            Function::Xils(_) => None,
        }
    }

    pub fn as_xils(&self) -> Option<&XilsFunction> {
        match self {
            Function::Xils(f) => Some(f),
            Function::Xil3(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Function::Xil3(f) => f.instrs.len(),
            Function::Xils(f) => f.instrs.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GetName for Function {
    fn name(&self) -> Id {
        match self {
            Function::Xil3(f) => f.name,
            Function::Xils(f) => f.name,
        }
    }
}

/// A scheduled design awaiting interconnect synthesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Design {
    pub name: Id,
    /// The scheduled flows, which may still reference temporaries.
    pub flow_spec: FlowMatrix,
    /// The concrete flows, once an interconnect pass has run.
    pub detailed: Option<FlowMatrix>,
    pub interconnect: Option<Interconnect>,
}

impl Design {
    pub fn new<S: Into<Id>>(name: S, flow_spec: FlowMatrix) -> Self {
        Self {
            name: name.into(),
            flow_spec,
            detailed: None,
            interconnect: None,
        }
    }
}

impl GetName for Design {
    fn name(&self) -> Id {
        self.name
    }
}

/// The state of one compilation run.
#[derive(Clone, Debug, Default)]
pub struct Context {
    pub functions: Vec<Function>,
    pub designs: Vec<Design>,
    /// Pass options of the form `pass:opt=value`.
    pub extra_opts: Vec<String>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_function<S: Into<Id>>(&self, name: S) -> Option<&Function> {
        let name = name.into();
        self.functions.iter().find(|f| f.name() == name)
    }

    pub fn find_design<S: Into<Id>>(&self, name: S) -> Option<&Design> {
        let name = name.into();
        self.designs.iter().find(|d| d.name == name)
    }
}
