use crate::Type;
use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt;

/// Nine-valued logic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StdLogic {
    /// Uninitialized
    U,
    /// Forcing unknown
    X,
    Zero,
    One,
    /// High impedance
    Z,
    /// Weak unknown
    W,
    /// Weak zero
    L,
    /// Weak one
    H,
    DontCare,
}

impl StdLogic {
    pub fn symbol(&self) -> char {
        match self {
            StdLogic::U => 'U',
            StdLogic::X => 'X',
            StdLogic::Zero => '0',
            StdLogic::One => '1',
            StdLogic::Z => 'Z',
            StdLogic::W => 'W',
            StdLogic::L => 'L',
            StdLogic::H => 'H',
            StdLogic::DontCare => '-',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        Some(match c {
            'U' => StdLogic::U,
            'X' => StdLogic::X,
            '0' => StdLogic::Zero,
            '1' => StdLogic::One,
            'Z' => StdLogic::Z,
            'W' => StdLogic::W,
            'L' => StdLogic::L,
            'H' => StdLogic::H,
            '-' => StdLogic::DontCare,
            _ => return None,
        })
    }

    /// The driven binary value, if any.
    pub fn as_bit(&self) -> Option<bool> {
        match self {
            StdLogic::Zero | StdLogic::L => Some(false),
            StdLogic::One | StdLogic::H => Some(true),
            _ => None,
        }
    }
}

/// A vector of nine-valued logic, most significant bit first.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StdLogicVector(SmallVec<[StdLogic; 16]>);

impl StdLogicVector {
    pub fn filled(value: StdLogic, width: u32) -> Self {
        Self(std::iter::repeat_n(value, width as usize).collect())
    }

    pub fn dont_cares(width: u32) -> Self {
        Self::filled(StdLogic::DontCare, width)
    }

    pub fn zeros(width: u32) -> Self {
        Self::filled(StdLogic::Zero, width)
    }

    pub fn tri_states(width: u32) -> Self {
        Self::filled(StdLogic::Z, width)
    }

    /// The low `width` bits of `value`.
    pub fn from_uint(value: u64, width: u32) -> Self {
        Self(
            (0..width)
                .rev()
                .map(|i| {
                    if i < 64 && (value >> i) & 1 == 1 {
                        StdLogic::One
                    } else {
                        StdLogic::Zero
                    }
                })
                .collect(),
        )
    }

    /// Interpret the vector as an unsigned number. Fails if any bit is not
    /// driven.
    pub fn to_uint(&self) -> Option<u64> {
        self.0.iter().try_fold(0u64, |acc, bit| {
            Some((acc << 1) | u64::from(bit.as_bit()?))
        })
    }

    pub fn width(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn bits(&self) -> &[StdLogic] {
        &self.0
    }

    pub fn is_dont_care(&self) -> bool {
        !self.0.is_empty() && self.0.iter().all(|b| *b == StdLogic::DontCare)
    }
}

impl std::str::FromStr for StdLogicVector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.chars()
            .map(|c| {
                StdLogic::from_symbol(c)
                    .ok_or_else(|| format!("invalid logic symbol `{c}'"))
            })
            .collect::<Result<_, _>>()
            .map(Self)
    }
}

/// A constant.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Logic(StdLogic),
    Vector(StdLogicVector),
}

impl Value {
    /// The don't-care placeholder of the given type.
    pub fn dont_care(ty: Type) -> Self {
        if ty.is_scalar() {
            Value::Logic(StdLogic::DontCare)
        } else {
            Value::Vector(StdLogicVector::dont_cares(ty.width()))
        }
    }

    pub fn is_dont_care(&self) -> bool {
        match self {
            Value::Logic(l) => *l == StdLogic::DontCare,
            Value::Vector(v) => v.is_dont_care(),
            Value::Bool(_) | Value::Int(_) => false,
        }
    }

    /// A value of the same size as `self` with every bit set to `bit`.
    pub fn filled_like(&self, bit: StdLogic) -> Self {
        match self {
            Value::Vector(v) => {
                Value::Vector(StdLogicVector::filled(bit, v.width()))
            }
            _ => Value::Logic(bit),
        }
    }

    /// Integer view of the value used by the evaluator.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            Value::Logic(l) => l.as_bit().map(i64::from),
            Value::Vector(v) => v.to_uint().map(|u| u as i64),
        }
    }
}

impl fmt::Display for StdLogicVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.iter().map(StdLogic::symbol).join(""))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Logic(l) => write!(f, "'{}'", l.symbol()),
            Value::Vector(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint_conversion() {
        let v = StdLogicVector::from_uint(5, 4);
        assert_eq!(format!("{v}"), "\"0101\"");
        assert_eq!(v.to_uint(), Some(5));
        assert_eq!(StdLogicVector::dont_cares(3).to_uint(), None);
    }

    #[test]
    fn dont_care_detection() {
        assert!(Value::dont_care(Type::Bool).is_dont_care());
        assert!(Value::dont_care(Type::Unsigned(8)).is_dont_care());
        assert!(!Value::Int(0).is_dont_care());
        let mixed: StdLogicVector = "-1".parse().unwrap();
        assert!(!Value::Vector(mixed).is_dont_care());
    }
}
