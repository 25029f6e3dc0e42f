use std::fmt;

/// Static type of a slot, stack value, variable, or signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Type {
    Bool,
    /// A single nine-valued logic bit.
    Logic,
    /// A logic vector of the given width.
    Vector(u32),
    Signed(u32),
    Unsigned(u32),
    SFix { int_width: u32, frac_width: u32 },
    UFix { int_width: u32, frac_width: u32 },
    Float32,
    Float64,
}

impl Type {
    /// Width of the type in bits.
    pub fn width(&self) -> u32 {
        match self {
            Type::Bool | Type::Logic => 1,
            Type::Vector(w) | Type::Signed(w) | Type::Unsigned(w) => *w,
            Type::SFix {
                int_width,
                frac_width,
            }
            | Type::UFix {
                int_width,
                frac_width,
            } => int_width + frac_width,
            Type::Float32 => 32,
            Type::Float64 => 64,
        }
    }

    /// Whether values of this type are a single bit rather than a vector.
    pub fn is_scalar(&self) -> bool {
        matches!(self, Type::Bool | Type::Logic)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Bool => write!(f, "bool"),
            Type::Logic => write!(f, "logic"),
            Type::Vector(w) => write!(f, "lv{w}"),
            Type::Signed(w) => write!(f, "i{w}"),
            Type::Unsigned(w) => write!(f, "u{w}"),
            Type::SFix {
                int_width,
                frac_width,
            } => write!(f, "sfix{int_width}.{frac_width}"),
            Type::UFix {
                int_width,
                frac_width,
            } => write!(f, "ufix{int_width}.{frac_width}"),
            Type::Float32 => write!(f, "f32"),
            Type::Float64 => write!(f, "f64"),
        }
    }
}
