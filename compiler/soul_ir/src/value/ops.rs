//! Constant arithmetic for the folder.
//!
//! Operands are unified to a common type first (the same rules the
//! resolver uses for non-constant operands, plus value-aware literal
//! casting), then the operation is applied. Integer arithmetic wraps;
//! division and modulo by a constant zero are reported, not folded.

use super::Value;
use crate::types::{StructStore, Type, TypeRules};
use crate::{BinaryOperator, UnaryOperator};

/// Why a constant operation could not be folded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FoldError {
    /// The operand types cannot be reconciled; not an error at fold time,
    /// the expression simply stays unfolded for the resolver to diagnose.
    NotApplicable,
    DivideByZero,
    ModuloZero,
}

/// Apply a binary operator to two constant values.
pub fn apply_binary_op(
    lhs: &Value,
    rhs: &Value,
    op: BinaryOperator,
    structs: &StructStore,
) -> Result<Value, FoldError> {
    let types = TypeRules::binary_op_types(op, lhs.get_type(), rhs.get_type())
        .or_else(|| {
            // Literals may pull the other side to their type.
            if TypeRules::can_silently_cast_value(lhs.get_type(), rhs) {
                TypeRules::binary_op_types(op, lhs.get_type(), lhs.get_type())
            } else if TypeRules::can_silently_cast_value(rhs.get_type(), lhs) {
                TypeRules::binary_op_types(op, rhs.get_type(), rhs.get_type())
            } else {
                None
            }
        })
        .ok_or(FoldError::NotApplicable)?;

    let lhs = lhs
        .cast_to_type(&types.operand, structs)
        .map_err(|_| FoldError::NotApplicable)?;
    let rhs = rhs
        .cast_to_type(&types.operand, structs)
        .map_err(|_| FoldError::NotApplicable)?;

    // Element-wise over vectors.
    if let (Some(a), Some(b)) = (lhs.elements(), rhs.elements()) {
        if a.len() != b.len() {
            return Err(FoldError::NotApplicable);
        }
        let folded: Result<Vec<Value>, FoldError> = a
            .iter()
            .zip(b.iter())
            .map(|(x, y)| apply_binary_op(x, y, op, structs))
            .collect();
        return Ok(Value::aggregate(types.result, folded?));
    }

    apply_scalar_binary(&lhs, &rhs, op)
}

fn apply_scalar_binary(lhs: &Value, rhs: &Value, op: BinaryOperator) -> Result<Value, FoldError> {
    use BinaryOperator::*;

    if lhs.get_type().is_bool() {
        let a = lhs.get_as_bool().ok_or(FoldError::NotApplicable)?;
        let b = rhs.get_as_bool().ok_or(FoldError::NotApplicable)?;
        return match op {
            Equals => Ok(Value::bool(a == b)),
            NotEquals => Ok(Value::bool(a != b)),
            _ => Err(FoldError::NotApplicable),
        };
    }

    if lhs.get_type().is_string_literal() {
        let a = lhs.get_string_handle().ok_or(FoldError::NotApplicable)?;
        let b = rhs.get_string_handle().ok_or(FoldError::NotApplicable)?;
        return match op {
            Equals => Ok(Value::bool(a == b)),
            NotEquals => Ok(Value::bool(a != b)),
            _ => Err(FoldError::NotApplicable),
        };
    }

    if lhs.get_type().is_primitive_float() {
        let a = lhs.get_as_f64().ok_or(FoldError::NotApplicable)?;
        let b = rhs.get_as_f64().ok_or(FoldError::NotApplicable)?;
        let is32 = lhs.get_type() == &Type::float32();

        let num = |v: f64| {
            if is32 {
                Value::float32(v as f32)
            } else {
                Value::float64(v)
            }
        };

        return Ok(match op {
            Add => num(a + b),
            Subtract => num(a - b),
            Multiply => num(a * b),
            Divide => {
                if b == 0.0 {
                    return Err(FoldError::DivideByZero);
                }
                num(a / b)
            }
            Modulo => {
                if b == 0.0 {
                    return Err(FoldError::ModuloZero);
                }
                num(a % b)
            }
            Equals => Value::bool(a == b),
            NotEquals => Value::bool(a != b),
            LessThan => Value::bool(a < b),
            LessThanOrEqual => Value::bool(a <= b),
            GreaterThan => Value::bool(a > b),
            GreaterThanOrEqual => Value::bool(a >= b),
            _ => return Err(FoldError::NotApplicable),
        });
    }

    let a = lhs.get_as_i64().ok_or(FoldError::NotApplicable)?;
    let b = rhs.get_as_i64().ok_or(FoldError::NotApplicable)?;
    let is32 = !lhs.get_type().is_integer64();

    let num = |v: i64| {
        if is32 {
            Value::int32(v as i32)
        } else {
            Value::int64(v)
        }
    };

    Ok(match op {
        Add => num(a.wrapping_add(b)),
        Subtract => num(a.wrapping_sub(b)),
        Multiply => num(a.wrapping_mul(b)),
        Divide => {
            if b == 0 {
                return Err(FoldError::DivideByZero);
            }
            num(a.wrapping_div(b))
        }
        Modulo => {
            if b == 0 {
                return Err(FoldError::ModuloZero);
            }
            num(a.wrapping_rem(b))
        }
        BitwiseOr => num(a | b),
        BitwiseAnd => num(a & b),
        BitwiseXor => num(a ^ b),
        Equals => Value::bool(a == b),
        NotEquals => Value::bool(a != b),
        LessThan => Value::bool(a < b),
        LessThanOrEqual => Value::bool(a <= b),
        GreaterThan => Value::bool(a > b),
        GreaterThanOrEqual => Value::bool(a >= b),
        LeftShift => {
            if is32 {
                Value::int32((a as i32).wrapping_shl(b as u32))
            } else {
                Value::int64(a.wrapping_shl(b as u32))
            }
        }
        RightShift => {
            if is32 {
                Value::int32((a as i32).wrapping_shr(b as u32))
            } else {
                Value::int64(a.wrapping_shr(b as u32))
            }
        }
        RightShiftUnsigned => {
            if is32 {
                Value::int32(((a as u32).wrapping_shr(b as u32)) as i32)
            } else {
                Value::int64(((a as u64).wrapping_shr(b as u32)) as i64)
            }
        }
    })
}

/// Apply a unary operator to a constant value.
pub fn apply_unary_op(source: &Value, op: UnaryOperator) -> Result<Value, FoldError> {
    match op {
        UnaryOperator::Negate => source.negated().ok_or(FoldError::NotApplicable),
        UnaryOperator::LogicalNot => source
            .get_as_bool()
            .map(|b| Value::bool(!b))
            .ok_or(FoldError::NotApplicable),
        UnaryOperator::BitwiseNot => {
            if !source.get_type().is_primitive_integer() {
                return Err(FoldError::NotApplicable);
            }
            let v = source.get_as_i64().ok_or(FoldError::NotApplicable)?;
            Ok(if source.get_type().is_integer64() {
                Value::int64(!v)
            } else {
                Value::int32(!(v as i32))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structs() -> StructStore {
        StructStore::new()
    }

    #[test]
    fn integer_arithmetic() {
        let r = apply_binary_op(&Value::int32(2), &Value::int32(3), BinaryOperator::Multiply, &structs())
            .unwrap();
        assert_eq!(r, Value::int32(6));

        // 2 + 3 * 4 shape: the folder sees each op separately.
        let r = apply_binary_op(&Value::int32(2), &Value::int32(12), BinaryOperator::Add, &structs())
            .unwrap();
        assert_eq!(r, Value::int32(14));
    }

    #[test]
    fn mixed_width_promotes() {
        let r = apply_binary_op(&Value::int32(1), &Value::int64(2), BinaryOperator::Add, &structs())
            .unwrap();
        assert_eq!(r, Value::int64(3));
    }

    #[test]
    fn literal_pulls_to_float() {
        let r = apply_binary_op(
            &Value::float32(1.5),
            &Value::int32(1),
            BinaryOperator::Add,
            &structs(),
        )
        .unwrap();
        assert_eq!(r, Value::float32(2.5));
    }

    #[test]
    fn divide_by_zero_reported() {
        assert_eq!(
            apply_binary_op(&Value::int32(1), &Value::int32(0), BinaryOperator::Divide, &structs()),
            Err(FoldError::DivideByZero)
        );
        assert_eq!(
            apply_binary_op(&Value::int32(1), &Value::int32(0), BinaryOperator::Modulo, &structs()),
            Err(FoldError::ModuloZero)
        );
    }

    #[test]
    fn comparisons_produce_bool() {
        let r = apply_binary_op(&Value::int32(1), &Value::int32(2), BinaryOperator::LessThan, &structs())
            .unwrap();
        assert_eq!(r, Value::bool(true));
    }

    #[test]
    fn unsigned_shift_reinterprets_bits() {
        let r = apply_binary_op(
            &Value::int32(-1),
            &Value::int32(28),
            BinaryOperator::RightShiftUnsigned,
            &structs(),
        )
        .unwrap();
        assert_eq!(r, Value::int32(15));
    }

    #[test]
    fn unary_ops() {
        assert_eq!(
            apply_unary_op(&Value::int32(5), UnaryOperator::Negate).unwrap(),
            Value::int32(-5)
        );
        assert_eq!(
            apply_unary_op(&Value::bool(true), UnaryOperator::LogicalNot).unwrap(),
            Value::bool(false)
        );
        assert_eq!(
            apply_unary_op(&Value::int32(0), UnaryOperator::BitwiseNot).unwrap(),
            Value::int32(-1)
        );
    }
}
