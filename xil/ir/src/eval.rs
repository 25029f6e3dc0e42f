//! A reference evaluator for both instruction forms.
//!
//! Values are 64-bit integers and booleans are `0` or `1`. Every result is
//! normalized to the width of its type, so the two forms of one function
//! produce the same trace. The evaluator is used to check that rewriters do
//! not change the observable behavior of a function.
use crate::{
    InstrIdx, InstrList, Opcode, StackModel, StaticOperand, Type, VarRef,
    XilInstr, Xil3Function, XilsFunction,
};
use std::collections::BTreeMap;
use xil_utils::{Error, Id, IndexRef, XilResult};

/// One observable step of an evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// A computation with its operand and result values. Variable transfers,
    /// stack shuffles, and control transfers are not recorded.
    Exec {
        op: Opcode,
        operands: Vec<i64>,
        results: Vec<i64>,
    },
    /// A conditional branch with the value of its condition.
    Branch { cond: i64 },
}

/// Everything an evaluation observed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub trace: Vec<Event>,
    pub port_writes: Vec<(Id, i64)>,
    pub ret: Option<i64>,
}

impl Outcome {
    /// The effects visible outside the function.
    pub fn effects(&self) -> (&[(Id, i64)], Option<i64>) {
        (&self.port_writes, self.ret)
    }
}

/// Configures and runs evaluations.
#[derive(Clone, Debug)]
pub struct Evaluator {
    ports: BTreeMap<Id, i64>,
    args: Vec<i64>,
    fuel: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            ports: BTreeMap::new(),
            args: Vec::new(),
            fuel: 100_000,
        }
    }
}

fn mask(width: u32) -> i64 {
    if width >= 64 { -1 } else { (1i64 << width) - 1 }
}

/// Truncate `v` to the width of `ty`.
fn normalize(v: i64, ty: Type) -> i64 {
    let w = ty.width();
    match ty {
        Type::Bool => i64::from(v != 0),
        _ if w >= 64 => v,
        _ if w == 0 => 0,
        Type::Signed(_) | Type::SFix { .. } => {
            let shift = 64 - w;
            (v << shift) >> shift
        }
        _ => v & mask(w),
    }
}

/// Where control goes after a stack instruction.
enum Control {
    Next,
    Jump(usize),
    Stop,
}

#[derive(Default)]
struct State {
    vars: BTreeMap<VarRef, i64>,
    memories: BTreeMap<(Id, u64), i64>,
    outcome: Outcome,
    fuel: usize,
}

impl State {
    fn burn(&mut self) -> XilResult<()> {
        if self.fuel == 0 {
            return Err(Error::misc("evaluation ran out of fuel"));
        }
        self.fuel -= 1;
        Ok(())
    }

    fn memory_at(operand: &StaticOperand, addr: Option<i64>) -> XilResult<(Id, u64)> {
        match (operand, addr) {
            (StaticOperand::Memory(m), Some(a)) => Ok((*m, a as u64)),
            (StaticOperand::MemoryCell(m, a), _) => Ok((*m, *a)),
            _ => Err(Error::malformed_structure(
                "memory access without a memory operand",
            )),
        }
    }

    /// Compute the results of a non-control, non-stack instruction.
    fn exec(
        &mut self,
        ports: &BTreeMap<Id, i64>,
        cmd: &XilInstr,
        ops: &[i64],
        operand_types: &[Type],
        result_types: &[Type],
    ) -> XilResult<Vec<i64>> {
        use Opcode::*;
        let arg = |i: usize| -> XilResult<i64> {
            ops.get(i).copied().ok_or_else(|| {
                Error::malformed_structure(format!("`{}' is missing operand {i}", cmd.op))
            })
        };
        let result_ty = result_types.first().copied().unwrap_or(Type::Signed(64));
        let value: Option<i64> = match cmd.op {
            LdConst => match &cmd.operand {
                StaticOperand::Const(v) => Some(v.as_i64().ok_or_else(|| {
                    Error::unsupported(format!("constant {v} has no integer value"))
                })?),
                _ => return Err(Error::malformed_structure("LdConst without a constant")),
            },
            Ld0 | LdMemBase => Some(0),
            Abs => Some(arg(0)?.wrapping_abs()),
            Neg => Some(arg(0)?.wrapping_neg()),
            Not if result_ty == Type::Bool => Some(i64::from(arg(0)? == 0)),
            Not => Some(!arg(0)?),
            Sign => Some(arg(0)?.signum()),
            Mod2 => Some(arg(0)? & 1),
            Ceil | Floor | Convert | Xts => Some(arg(0)?),
            Sqrt => {
                let x = arg(0)?;
                if x < 0 {
                    return Err(Error::unsupported("square root of a negative value"));
                }
                Some((x as f64).sqrt() as i64)
            }
            Add => Some(arg(0)?.wrapping_add(arg(1)?)),
            Sub => Some(arg(0)?.wrapping_sub(arg(1)?)),
            Mul => Some(arg(0)?.wrapping_mul(arg(1)?)),
            Div | DivQF | Rem => {
                let (a, b) = (arg(0)?, arg(1)?);
                if b == 0 {
                    return Err(Error::misc("division by zero"));
                }
                Some(if cmd.op == Rem { a.wrapping_rem(b) } else { a.wrapping_div(b) })
            }
            Rempow2 => Some(arg(0)?.rem_euclid(1i64 << (arg(1)? & 62))),
            And => Some(arg(0)? & arg(1)?),
            Or => Some(arg(0)? | arg(1)?),
            Xor => Some(arg(0)? ^ arg(1)?),
            LShift => Some(arg(0)?.wrapping_shl((arg(1)? & 63) as u32)),
            RShift => Some(arg(0)?.wrapping_shr((arg(1)? & 63) as u32)),
            Max => Some(arg(0)?.max(arg(1)?)),
            Min => Some(arg(0)?.min(arg(1)?)),
            IsEq => Some(i64::from(arg(0)? == arg(1)?)),
            IsNEq => Some(i64::from(arg(0)? != arg(1)?)),
            IsLt => Some(i64::from(arg(0)? < arg(1)?)),
            IsLte => Some(i64::from(arg(0)? <= arg(1)?)),
            IsGt => Some(i64::from(arg(0)? > arg(1)?)),
            IsGte => Some(i64::from(arg(0)? >= arg(1)?)),
            Cmp => Some(arg(0)?.cmp(&arg(1)?) as i64),
            Select => Some(if arg(2)? != 0 { arg(0)? } else { arg(1)? }),
            Concat => {
                let low = operand_types.get(1).map(|t| t.width()).unwrap_or(0);
                Some(arg(0)?.wrapping_shl(low) | (arg(1)? & mask(low)))
            }
            Slice | SliceFixI => match cmd.operand {
                StaticOperand::Range { hi, lo } if hi >= lo => {
                    Some((arg(0)? >> lo.min(63)) & mask(hi - lo + 1))
                }
                _ => return Err(Error::malformed_structure("slice without a range")),
            },
            RdPort => match &cmd.operand {
                StaticOperand::Port(p) => Some(ports.get(p).copied().unwrap_or(0)),
                _ => return Err(Error::malformed_structure("RdPort without a port")),
            },
            WrPort => match &cmd.operand {
                StaticOperand::Port(p) => {
                    self.outcome.port_writes.push((*p, arg(0)?));
                    None
                }
                _ => return Err(Error::malformed_structure("WrPort without a port")),
            },
            RdMem | LdelemFixA => {
                let cell = Self::memory_at(&cmd.operand, Some(arg(0)?))?;
                Some(self.memories.get(&cell).copied().unwrap_or(0))
            }
            RdMemFix | LdelemFixAFixI => {
                let cell = Self::memory_at(&cmd.operand, None)?;
                Some(self.memories.get(&cell).copied().unwrap_or(0))
            }
            WrMem | StelemFixA => {
                let cell = Self::memory_at(&cmd.operand, Some(arg(0)?))?;
                self.memories.insert(cell, arg(1)?);
                None
            }
            WrMemFix | StelemFixAFixI => {
                let cell = Self::memory_at(&cmd.operand, None)?;
                self.memories.insert(cell, arg(0)?);
                None
            }
            Ldv => match cmd.operand {
                StaticOperand::Var(var) => Some(self.vars.get(&var).copied().unwrap_or(0)),
                _ => return Err(Error::malformed_structure("Ldv without a variable")),
            },
            Stv => match cmd.operand {
                StaticOperand::Var(var) => {
                    self.vars.insert(var, arg(0)?);
                    return Ok(vec![]);
                }
                _ => return Err(Error::malformed_structure("Stv without a variable")),
            },
            Nop | Barrier => return Ok(vec![]),
            Cos | ScCos | Sin | ScSin | SinCos | ScSinCos => {
                return Err(Error::unsupported(format!(
                    "cannot evaluate `{}' over integers",
                    cmd.op
                )));
            }
            BrTrue | BrFalse | Goto | Ret | Exit | Pop | Dup | Swap | Dig => {
                return Err(Error::malformed_structure(format!(
                    "`{}' is not a computation",
                    cmd.op
                )));
            }
        };
        let results = result_types
            .iter()
            .map(|ty| normalize(value.unwrap_or(0), *ty))
            .collect::<Vec<_>>();
        if cmd.op != Ldv {
            self.outcome.trace.push(Event::Exec {
                op: cmd.op,
                operands: ops.to_vec(),
                results: results.clone(),
            });
        }
        Ok(results)
    }

    fn branch(&mut self, op: Opcode, cond: i64) -> bool {
        self.outcome.trace.push(Event::Branch { cond });
        match op {
            Opcode::BrTrue => cond != 0,
            _ => cond == 0,
        }
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port<S: Into<Id>>(mut self, port: S, value: i64) -> Self {
        self.ports.insert(port.into(), value);
        self
    }

    pub fn with_args(mut self, args: Vec<i64>) -> Self {
        self.args = args;
        self
    }

    /// Maximum number of instructions to execute.
    pub fn with_fuel(mut self, fuel: usize) -> Self {
        self.fuel = fuel;
        self
    }

    fn initial_state<F: InstrList>(&self, func: &F) -> State {
        let mut state = State {
            fuel: self.fuel,
            ..Default::default()
        };
        for (arg, desc) in func.args().iter() {
            let v = self.args.get(arg.index()).copied().unwrap_or(0);
            state.vars.insert(VarRef::Arg(arg), normalize(v, desc.ty));
        }
        state
    }

    fn target<F: InstrList>(func: &F, idx: InstrIdx) -> XilResult<usize> {
        func.branch_target(idx)
            .map(|t| t.index())
            .ok_or_else(|| Error::malformed_structure("branch without a target"))
    }

    pub fn run_xil3(&self, func: &Xil3Function) -> XilResult<Outcome> {
        let mut state = self.initial_state(func);
        let mut slots: Vec<Option<i64>> = vec![None; func.slot_types.len()];
        let mut pc = 0;
        while pc < func.instrs.len() {
            state.burn()?;
            let idx = InstrIdx::new(pc);
            let instr = &func.instrs[idx];
            let ops = instr
                .operands
                .iter()
                .map(|s| {
                    slots.get(s.index()).copied().flatten().ok_or_else(|| {
                        Error::malformed_structure(format!(
                            "slot @{} read before written",
                            s.index()
                        ))
                    })
                })
                .collect::<XilResult<Vec<_>>>()
                .map_err(|e| e.at_instr(pc))?;
            pc += 1;
            match instr.cmd.op {
                Opcode::Goto => pc = Self::target(func, idx)?,
                Opcode::BrTrue | Opcode::BrFalse => {
                    let cond = ops.first().copied().ok_or_else(|| {
                        Error::malformed_structure("branch without a condition")
                            .at_instr(idx.index())
                    })?;
                    if state.branch(instr.cmd.op, cond) {
                        pc = Self::target(func, idx)?;
                    }
                }
                Opcode::Ret => {
                    state.outcome.ret = ops.first().copied();
                    break;
                }
                Opcode::Exit => break,
                _ => {
                    let operand_types =
                        instr.operands.iter().map(|s| func.slot_type(*s)).collect::<Vec<_>>();
                    let result_types =
                        instr.results.iter().map(|s| func.slot_type(*s)).collect::<Vec<_>>();
                    let results = state
                        .exec(&self.ports, &instr.cmd, &ops, &operand_types, &result_types)
                        .map_err(|e| e.at_instr(idx.index()))?;
                    for (slot, v) in instr.results.iter().zip(results) {
                        slots[slot.index()] = Some(v);
                    }
                }
            }
        }
        Ok(state.outcome)
    }

    pub fn run_xils(&self, func: &XilsFunction) -> XilResult<Outcome> {
        let mut state = self.initial_state(func);
        let mut stack: StackModel<i64> = StackModel::new();
        let mut pc = 0;
        while pc < func.instrs.len() {
            state.burn()?;
            let idx = InstrIdx::new(pc);
            let instr = &func.instrs[idx];
            pc += 1;
            let step = |state: &mut State, stack: &mut StackModel<i64>| -> XilResult<Control> {
                match instr.cmd.op {
                    Opcode::Pop => {
                        stack.pop()?;
                    }
                    Opcode::Dup => stack.dup()?,
                    Opcode::Swap => stack.swap()?,
                    Opcode::Dig => match instr.cmd.operand {
                        StaticOperand::Depth(n) => stack.dig(n)?,
                        _ => return Err(Error::malformed_structure("Dig without a depth")),
                    },
                    Opcode::Goto => return Ok(Control::Jump(Self::target(func, idx)?)),
                    Opcode::BrTrue | Opcode::BrFalse => {
                        let cond = stack.pop()?;
                        if state.branch(instr.cmd.op, cond) {
                            return Ok(Control::Jump(Self::target(func, idx)?));
                        }
                    }
                    Opcode::Ret => {
                        let ops = stack.pop_n(instr.operand_types.len())?;
                        state.outcome.ret = ops.first().copied();
                        return Ok(Control::Stop);
                    }
                    Opcode::Exit => return Ok(Control::Stop),
                    _ => {
                        let ops = stack.pop_n(instr.operand_types.len())?;
                        let results = state.exec(
                            &self.ports,
                            &instr.cmd,
                            &ops,
                            &instr.operand_types,
                            &instr.result_types,
                        )?;
                        for v in results {
                            stack.push(v);
                        }
                    }
                }
                Ok(Control::Next)
            };
            match step(&mut state, &mut stack).map_err(|e| e.at_instr(idx.index()))? {
                Control::Stop => break,
                Control::Jump(target) => pc = target,
                Control::Next => (),
            }
        }
        Ok(state.outcome)
    }

    pub fn run(&self, func: &crate::Function) -> XilResult<Outcome> {
        match func {
            crate::Function::Xil3(f) => self.run_xil3(f),
            crate::Function::Xils(f) => self.run_xils(f),
        }
    }
}
