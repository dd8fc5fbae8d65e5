//! Intrinsic function tags.
//!
//! Functions in the built-in library carry an `[[intrin: "name"]]`
//! annotation and no body; the tag identifies the back-end operation and
//! lets the constant folder evaluate calls with constant arguments.

/// Back-end operation implemented for a library function.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub enum IntrinsicType {
    #[default]
    None,
    Abs,
    Min,
    Max,
    Clamp,
    Wrap,
    Floor,
    Ceil,
    Fmod,
    Sqrt,
    Pow,
    Exp,
    Log,
    Log10,
    Sin,
    Cos,
    Tan,
}

impl IntrinsicType {
    pub fn from_name(name: &str) -> IntrinsicType {
        use IntrinsicType::*;
        match name {
            "abs" => Abs,
            "min" => Min,
            "max" => Max,
            "clamp" => Clamp,
            "wrap" => Wrap,
            "floor" => Floor,
            "ceil" => Ceil,
            "fmod" => Fmod,
            "sqrt" => Sqrt,
            "pow" => Pow,
            "exp" => Exp,
            "log" => Log,
            "log10" => Log10,
            "sin" => Sin,
            "cos" => Cos,
            "tan" => Tan,
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        use IntrinsicType::*;
        match self {
            None => "none",
            Abs => "abs",
            Min => "min",
            Max => "max",
            Clamp => "clamp",
            Wrap => "wrap",
            Floor => "floor",
            Ceil => "ceil",
            Fmod => "fmod",
            Sqrt => "sqrt",
            Pow => "pow",
            Exp => "exp",
            Log => "log",
            Log10 => "log10",
            Sin => "sin",
            Cos => "cos",
            Tan => "tan",
        }
    }
}
