//! A minimal register-transfer process model and its conversion to flows.
use crate::{Flow, ParFlow, SignalRef, Value};
use std::fmt;
use xil_utils::{Error, Id, XilResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    And,
    Or,
    Eq,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expr {
    Signal(SignalRef),
    Const(Value),
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Statement {
    Store { target: SignalRef, value: Expr },
    If { cond: Expr, then: Vec<Statement>, otherwise: Vec<Statement> },
    Loop(Vec<Statement>),
    Call { callee: Id, args: Vec<Expr> },
    Nop,
}

/// A process body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Process {
    pub name: Id,
    pub body: Vec<Statement>,
}

impl Statement {
    fn kind(&self) -> &'static str {
        match self {
            Statement::Store { .. } => "store",
            Statement::If { .. } => "if statement",
            Statement::Loop(_) => "loop",
            Statement::Call { .. } => "call",
            Statement::Nop => "nop",
        }
    }
}

impl Process {
    pub fn new<S: Into<Id>>(name: S, body: Vec<Statement>) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Interpret the body as a set of parallel transfers. Only stores of a
    /// signal or a constant have a flow equivalent; `Nop` is skipped.
    pub fn to_flow(&self) -> XilResult<ParFlow> {
        let mut par = ParFlow::new();
        for stmt in &self.body {
            let flow = match stmt {
                Statement::Nop => continue,
                Statement::Store {
                    target,
                    value: Expr::Signal(source),
                } => Flow::signal(*source, *target),
                Statement::Store {
                    target,
                    value: Expr::Const(value),
                } => Flow::value(value.clone(), *target),
                Statement::Store { target, .. } => {
                    return Err(Error::unsupported(format!(
                        "store to {target} is not a register transfer"
                    ))
                    .in_function(self.name));
                }
                other => {
                    return Err(Error::unsupported(format!(
                        "{} in a dataflow process",
                        other.kind()
                    ))
                    .in_function(self.name));
                }
            };
            par.add(flow);
        }
        Ok(par)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Signal(s) => write!(f, "{s}"),
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Unary(UnOp::Neg, e) => write!(f, "-{e}"),
            Expr::Unary(UnOp::Not, e) => write!(f, "!{e}"),
            Expr::Binary(op, l, r) => {
                let op = match op {
                    BinOp::Add => "+",
                    BinOp::Sub => "-",
                    BinOp::And => "&",
                    BinOp::Or => "|",
                    BinOp::Eq => "==",
                };
                write!(f, "({l} {op} {r})")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Type;
    use xil_utils::ErrorKind;

    #[test]
    fn stores_become_flows() {
        let a = SignalRef::signal("a", Type::Bool);
        let b = SignalRef::signal("b", Type::Bool);
        let p = Process::new(
            "p",
            vec![
                Statement::Store { target: b, value: Expr::Signal(a) },
                Statement::Nop,
                Statement::Store { target: a, value: Expr::Const(Value::Bool(false)) },
            ],
        );
        let par = p.to_flow().unwrap();
        assert_eq!(par.len(), 2);
        assert_eq!(par.get(&b), Some(&Flow::signal(a, b)));
    }

    #[test]
    fn control_flow_is_unsupported() {
        let a = SignalRef::signal("a", Type::Bool);
        let p = Process::new(
            "p",
            vec![Statement::If {
                cond: Expr::Signal(a),
                then: vec![],
                otherwise: vec![],
            }],
        );
        let err = p.to_flow().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Unsupported(_)));

        let p = Process::new(
            "q",
            vec![Statement::Store {
                target: a,
                value: Expr::Unary(UnOp::Not, Box::new(Expr::Signal(a))),
            }],
        );
        assert!(p.to_flow().is_err());
    }
}
