//! Binary and unary operator kinds shared by the AST and HEART.

use std::fmt;

/// Binary operators. `&&` and `||` never appear here: the parser lowers
/// them to ternaries with constant branches to keep short-circuit
/// semantics explicit.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitwiseOr,
    BitwiseAnd,
    BitwiseXor,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LeftShift,
    RightShift,
    RightShiftUnsigned,
}

impl BinaryOperator {
    /// The surface-syntax symbol.
    pub fn symbol(self) -> &'static str {
        use BinaryOperator::*;
        match self {
            Add => "+",
            Subtract => "-",
            Multiply => "*",
            Divide => "/",
            Modulo => "%",
            BitwiseOr => "|",
            BitwiseAnd => "&",
            BitwiseXor => "^",
            Equals => "==",
            NotEquals => "!=",
            LessThan => "<",
            LessThanOrEqual => "<=",
            GreaterThan => ">",
            GreaterThanOrEqual => ">=",
            LeftShift => "<<",
            RightShift => ">>",
            RightShiftUnsigned => ">>>",
        }
    }

    /// Parse the HEART-dump spelling of an operator.
    pub fn from_symbol(s: &str) -> Option<Self> {
        use BinaryOperator::*;
        Some(match s {
            "+" => Add,
            "-" => Subtract,
            "*" => Multiply,
            "/" => Divide,
            "%" => Modulo,
            "|" => BitwiseOr,
            "&" => BitwiseAnd,
            "^" => BitwiseXor,
            "==" => Equals,
            "!=" => NotEquals,
            "<" => LessThan,
            "<=" => LessThanOrEqual,
            ">" => GreaterThan,
            ">=" => GreaterThanOrEqual,
            "<<" => LeftShift,
            ">>" => RightShift,
            ">>>" => RightShiftUnsigned,
            _ => return None,
        })
    }

    pub fn is_comparison(self) -> bool {
        use BinaryOperator::*;
        matches!(
            self,
            Equals | NotEquals | LessThan | LessThanOrEqual | GreaterThan | GreaterThanOrEqual
        )
    }

    pub fn is_equality(self) -> bool {
        matches!(self, BinaryOperator::Equals | BinaryOperator::NotEquals)
    }

    pub fn is_bitwise(self) -> bool {
        use BinaryOperator::*;
        matches!(
            self,
            BitwiseOr | BitwiseAnd | BitwiseXor | LeftShift | RightShift | RightShiftUnsigned
        )
    }

    pub fn is_shift(self) -> bool {
        use BinaryOperator::*;
        matches!(self, LeftShift | RightShift | RightShiftUnsigned)
    }

    pub fn is_arithmetic(self) -> bool {
        use BinaryOperator::*;
        matches!(self, Add | Subtract | Multiply | Divide | Modulo)
    }
}

impl fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Unary operators.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum UnaryOperator {
    Negate,     // -
    LogicalNot, // !
    BitwiseNot, // ~
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Negate => "-",
            UnaryOperator::LogicalNot => "!",
            UnaryOperator::BitwiseNot => "~",
        }
    }

    pub fn from_symbol(s: &str) -> Option<Self> {
        Some(match s {
            "-" => UnaryOperator::Negate,
            "!" => UnaryOperator::LogicalNot,
            "~" => UnaryOperator::BitwiseNot,
            _ => return None,
        })
    }
}

impl fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
