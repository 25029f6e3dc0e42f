use lazy_static::lazy_static;
use std::{collections::HashMap, fmt, str::FromStr};

macro_rules! opcodes {
    ($($(#[$attr:meta])* $variant:ident => $name:literal),* $(,)?) => {
        /// The closed set of XIL instruction codes.
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Opcode {
            $($(#[$attr])* $variant),*
        }

        impl Opcode {
            /// Every opcode, in declaration order.
            pub const ALL: &'static [Opcode] = &[$(Opcode::$variant),*];

            /// The stable textual name of the opcode.
            pub const fn name(self) -> &'static str {
                match self {
                    $(Opcode::$variant => $name),*
                }
            }
        }
    };
}

opcodes! {
    Abs => "Abs",
    Add => "Add",
    And => "And",
    Barrier => "Barrier",
    BrTrue => "BrTrue",
    BrFalse => "BrFalse",
    Ceil => "Ceil",
    /// Three-way comparison: -1, 0 or 1.
    Cmp => "Cmp",
    Concat => "Concat",
    Convert => "Convert",
    Cos => "Cos",
    ScCos => "ScCos",
    Sin => "Sin",
    ScSin => "ScSin",
    SinCos => "SinCos",
    ScSinCos => "ScSinCos",
    Dig => "Dig",
    Div => "Div",
    DivQF => "DivQF",
    Dup => "Dup",
    Exit => "$Exit",
    Floor => "Floor",
    Goto => "Goto",
    IsEq => "IsEq",
    IsGt => "IsGt",
    IsGte => "IsGte",
    IsLt => "IsLt",
    IsLte => "IsLte",
    IsNEq => "IsNEq",
    LdConst => "LdConst",
    Ld0 => "Ld0",
    LdelemFixA => "LdelemFixA",
    LdelemFixAFixI => "LdelemFixAFixI",
    LdMemBase => "LdMemBase",
    /// Load a local variable or argument.
    Ldv => "Ldv",
    LShift => "LShift",
    Max => "Max",
    Min => "Min",
    Mod2 => "Mod2",
    Mul => "Mul",
    Neg => "Neg",
    Nop => "Nop",
    Not => "Not",
    Or => "Or",
    Pop => "Pop",
    RdMem => "RdMem",
    RdMemFix => "RdMemFix",
    RdPort => "RdPort",
    Rem => "Rem",
    Rempow2 => "Rempow2",
    Ret => "Ret",
    RShift => "RShift",
    Select => "Select",
    Sign => "Sign",
    Slice => "Slice",
    SliceFixI => "SliceFixI",
    Sqrt => "Sqrt",
    StelemFixA => "StelemFixA",
    StelemFixAFixI => "StelemFixAFixI",
    /// Store a local variable.
    Stv => "Stv",
    Sub => "Sub",
    Swap => "Swap",
    WrMem => "WrMem",
    WrMemFix => "WrMemFix",
    WrPort => "WrPort",
    Xor => "Xor",
    /// Sign extension.
    Xts => "Xts",
}

lazy_static! {
    static ref BY_NAME: HashMap<&'static str, Opcode> =
        Opcode::ALL.iter().map(|op| (op.name(), *op)).collect();
}

impl Opcode {
    pub fn is_branch(self) -> bool {
        matches!(self, Opcode::Goto | Opcode::BrTrue | Opcode::BrFalse)
    }

    pub fn is_conditional_branch(self) -> bool {
        matches!(self, Opcode::BrTrue | Opcode::BrFalse)
    }

    /// Opcodes that only shuffle the evaluation stack. They exist in the
    /// stack form only.
    pub fn is_stack_only(self) -> bool {
        matches!(self, Opcode::Pop | Opcode::Dup | Opcode::Swap | Opcode::Dig)
    }

    /// Control never falls through to the next instruction.
    pub fn is_terminator(self) -> bool {
        matches!(self, Opcode::Goto | Opcode::Ret | Opcode::Exit)
    }

    /// Writes state visible outside the instruction's results.
    pub fn has_side_effects(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            WrPort
                | WrMem
                | WrMemFix
                | Stv
                | StelemFixA
                | StelemFixAFixI
                | Barrier
                | Nop
                | Ret
                | Exit
        ) || self.is_branch()
    }

    /// The result depends on state other than the operands.
    pub fn reads_state(self) -> bool {
        use Opcode::*;
        matches!(
            self,
            RdPort
                | RdMem
                | RdMemFix
                | Ldv
                | LdelemFixA
                | LdelemFixAFixI
                | LdMemBase
        )
    }

    /// The instruction computes its results from its operands and its static
    /// operand alone.
    pub fn is_pure(self) -> bool {
        !self.has_side_effects() && !self.reads_state() && !self.is_stack_only()
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Opcode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BY_NAME
            .get(s)
            .copied()
            .ok_or_else(|| format!("unknown opcode `{s}'"))
    }
}
