//! Casting and operator type rules.
//!
//! Three levels of cast permission exist:
//!
//! 1. explicit casts ([`TypeRules::can_cast_to`]): possibly narrowing,
//!    requested by the programmer;
//! 2. silent casts ([`TypeRules::can_silently_cast_to`]): inserted
//!    automatically at arguments, returns, and assignments. A silent cast
//!    must preserve every possible value of the source type;
//! 3. value-aware silent casts ([`TypeRules::can_silently_cast_value`]):
//!    literals additionally cast silently to any type that represents
//!    their particular value losslessly.

use super::{PrimitiveType, StructStore, Type, TypeError, TypeKind, MAX_ARRAY_SIZE};
use crate::value::Value;
use crate::BinaryOperator;

pub struct TypeRules;

/// Operand and result types chosen for a binary operator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BinaryOpTypes {
    pub operand: Type,
    pub result: Type,
}

impl TypeRules {
    /// Silent (implicit) casts: every value of `src` must be exactly
    /// representable in `dest`.
    pub fn can_silently_cast_to(dest: &Type, src: &Type) -> bool {
        let dest = dest.without_reference_and_const();
        let src = src.without_reference_and_const();

        if dest.kind == src.kind {
            return true;
        }

        // A size-1 vector and its scalar are interchangeable.
        if dest.is_equal_ignoring_vector_size1(&src) {
            return true;
        }

        match (&dest.kind, &src.kind) {
            (TypeKind::Primitive(d), TypeKind::Primitive(s)) => {
                Self::primitive_silently_casts(*d, *s)
            }

            // Bounded ints hold 0..limit-1, which any int32 represents.
            (TypeKind::Primitive(d), TypeKind::BoundedInt { .. }) => {
                d.is_integer() || *d == PrimitiveType::Float64
            }

            // Scalar broadcast into a vector.
            (TypeKind::Vector { element, .. }, _) if src.is_scalar() => {
                Self::can_silently_cast_to(&Type::primitive(*element), &src)
            }

            // Fixed arrays silently decay to unsized arrays of the same
            // element type (by-reference parameter passing).
            (TypeKind::UnsizedArray { element: d }, TypeKind::FixedArray { element: s, .. }) => {
                d == s
            }

            _ => false,
        }
    }

    fn primitive_silently_casts(dest: PrimitiveType, src: PrimitiveType) -> bool {
        use PrimitiveType::*;
        matches!(
            (dest, src),
            (Int64, Int32) | (Float64, Float32) | (Float64, Int32)
        )
    }

    /// Explicit casts: any numeric conversion, bounded-int reduction, or
    /// element-wise aggregate conversion of matching shape.
    pub fn can_cast_to(dest: &Type, src: &Type) -> bool {
        let dest = dest.without_reference_and_const();
        let src = src.without_reference_and_const();

        if Self::can_silently_cast_to(&dest, &src) {
            return true;
        }

        let numeric = |t: &Type| t.is_primitive() && !t.is_void() || t.is_bounded_int();

        if numeric(&dest) && numeric(&src) {
            return true;
        }

        match (&dest.kind, &src.kind) {
            (
                TypeKind::Vector {
                    element: d,
                    size: ds,
                },
                TypeKind::Vector {
                    element: s,
                    size: ss,
                },
            ) => {
                ds == ss
                    && Self::can_cast_to(&Type::primitive(*d), &Type::primitive(*s))
            }
            (
                TypeKind::FixedArray {
                    element: d,
                    size: ds,
                },
                TypeKind::FixedArray {
                    element: s,
                    size: ss,
                },
            ) => ds == ss && Self::can_cast_to(d, s),
            (TypeKind::Vector { element, .. }, _) if src.is_scalar() => {
                Self::can_cast_to(&Type::primitive(*element), &src)
            }
            _ => false,
        }
    }

    /// Value-aware silent casting: literals cast to any type that
    /// represents their value losslessly.
    pub fn can_silently_cast_value(dest: &Type, value: &Value) -> bool {
        if Self::can_silently_cast_to(dest, value.get_type()) {
            return true;
        }

        let dest_stripped = dest.without_reference_and_const();

        // Broadcast a castable literal into a vector.
        if let TypeKind::Vector { element, .. } = &dest_stripped.kind {
            if value.get_type().is_scalar() {
                return Self::can_silently_cast_value(&Type::primitive(*element), value);
            }
        }

        let src = value.get_type();

        if src.is_primitive_integer() {
            let v = match value.get_as_i64() {
                Some(v) => v,
                None => return false,
            };
            return match dest_stripped.kind {
                TypeKind::Primitive(PrimitiveType::Int32) => i32::try_from(v).is_ok(),
                TypeKind::Primitive(PrimitiveType::Int64) => true,
                TypeKind::Primitive(PrimitiveType::Float32) => (v as f32) as i64 == v,
                TypeKind::Primitive(PrimitiveType::Float64) => (v as f64) as i64 == v,
                TypeKind::BoundedInt { limit, .. } => v >= 0 && v < limit,
                _ => false,
            };
        }

        if src.is_primitive_float() {
            let v = match value.get_as_f64() {
                Some(v) => v,
                None => return false,
            };
            return match dest_stripped.kind {
                TypeKind::Primitive(PrimitiveType::Float32) => {
                    f64::from(v as f32).to_bits() == v.to_bits() || v.is_nan()
                }
                TypeKind::Primitive(PrimitiveType::Float64) => true,
                _ => false,
            };
        }

        false
    }

    /// Parameter matching for overload resolution.
    ///
    /// With `must_match_exactly` the argument type must be identical after
    /// reference/const adjustment; otherwise a silent cast suffices
    /// (except into non-const references, which always need an exact,
    /// assignable match).
    pub fn can_pass_as_argument_to(dest: &Type, src: &Type, must_match_exactly: bool) -> bool {
        if dest.is_reference {
            let inner = dest.without_reference();

            if inner.without_const().is_same_kind(&src.without_reference_and_const()) {
                return true;
            }

            // Fixed arrays may bind to unsized-array references.
            if let (TypeKind::UnsizedArray { element: d }, TypeKind::FixedArray { element: s, .. }) =
                (&inner.kind, &src.without_reference_and_const().kind)
            {
                if d == s {
                    return true;
                }
            }

            if !must_match_exactly && inner.is_const {
                return Self::can_silently_cast_to(&inner.without_const(), src);
            }

            return false;
        }

        if dest
            .without_const()
            .is_same_kind(&src.without_reference_and_const())
        {
            return true;
        }

        !must_match_exactly && Self::can_silently_cast_to(dest, src)
    }

    /// Pick operand and result types for a binary operator, or `None` when
    /// the operand types cannot be reconciled.
    pub fn binary_op_types(op: BinaryOperator, lhs: &Type, rhs: &Type) -> Option<BinaryOpTypes> {
        let lhs = Self::decay_operand(lhs);
        let rhs = Self::decay_operand(rhs);

        let operand = Self::unify(&lhs, &rhs)?;

        if op.is_shift() {
            if !(lhs.is_primitive_integer() || Self::is_integer_vector(&lhs)) {
                return None;
            }
            if !rhs.is_integer() {
                return None;
            }
            // Shift width does not influence the result type.
            return Some(BinaryOpTypes {
                operand: lhs.clone(),
                result: lhs,
            });
        }

        if op.is_bitwise() {
            if !(operand.is_primitive_integer() || Self::is_integer_vector(&operand)) {
                return None;
            }
            return Some(BinaryOpTypes {
                result: operand.clone(),
                operand,
            });
        }

        if op.is_comparison() {
            let comparable = operand.is_scalar()
                || (op.is_equality()
                    && (operand.is_bool() || operand.is_string_literal() || operand.is_vector()));
            if !comparable {
                return None;
            }
            let result = if operand.is_vector() {
                Type::vector(PrimitiveType::Bool, operand.vector_size().unwrap_or(1)).ok()?
            } else {
                Type::bool()
            };
            return Some(BinaryOpTypes { operand, result });
        }

        // Arithmetic: numeric scalars and vectors.
        let arithmetic_ok = match &operand.kind {
            TypeKind::Primitive(p) => p.is_integer() || p.is_float(),
            TypeKind::Vector { .. } => true,
            _ => false,
        };
        if !arithmetic_ok {
            return None;
        }
        Some(BinaryOpTypes {
            result: operand.clone(),
            operand,
        })
    }

    fn is_integer_vector(t: &Type) -> bool {
        matches!(t.kind, TypeKind::Vector { element, .. } if element.is_integer())
    }

    /// Operands shed const/reference and bounded ints decay to int32.
    fn decay_operand(t: &Type) -> Type {
        let t = t.without_reference_and_const();
        if t.is_bounded_int() {
            Type::int32()
        } else {
            t
        }
    }

    fn unify(a: &Type, b: &Type) -> Option<Type> {
        if a.kind == b.kind {
            return Some(a.clone());
        }
        if Self::can_silently_cast_to(a, b) {
            return Some(a.clone());
        }
        if Self::can_silently_cast_to(b, a) {
            return Some(b.clone());
        }
        None
    }

    /// Validate a constant value as an array/vector size.
    pub fn array_size_from_value(v: &Value) -> Result<u64, TypeError> {
        let n = v.get_as_i64().ok_or(TypeError::SizeOutOfRange)?;
        if n < 1 || n > MAX_ARRAY_SIZE as i64 {
            return Err(TypeError::SizeOutOfRange);
        }
        Ok(n as u64)
    }

    /// Validate a constant value as an array index (negative indexes count
    /// from the end).
    pub fn array_index_from_value(v: &Value) -> Result<i64, TypeError> {
        v.get_as_i64().ok_or(TypeError::SizeOutOfRange)
    }

    /// Resolve a possibly negative index against a size, for bounds checks.
    pub fn resolve_index(index: i64, size: u64) -> Option<u64> {
        let size = size as i64;
        if index >= 0 && index < size {
            Some(index as u64)
        } else if index < 0 && index >= -size {
            Some((size + index) as u64)
        } else {
            None
        }
    }

    /// Readable description of a set of types (multi-type event
    /// endpoints).
    pub fn describe_types(types: &[Type], structs: &StructStore) -> String {
        if types.len() == 1 {
            return types[0].describe(structs);
        }
        let list: Vec<String> = types.iter().map(|t| t.describe(structs)).collect();
        format!("({})", list.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundedIntKind;

    #[test]
    fn silent_casts_are_lossless() {
        assert!(TypeRules::can_silently_cast_to(&Type::int64(), &Type::int32()));
        assert!(TypeRules::can_silently_cast_to(&Type::float64(), &Type::float32()));
        assert!(TypeRules::can_silently_cast_to(&Type::float64(), &Type::int32()));
        // Narrowing or precision-losing directions are not silent.
        assert!(!TypeRules::can_silently_cast_to(&Type::int32(), &Type::int64()));
        assert!(!TypeRules::can_silently_cast_to(&Type::float32(), &Type::int32()));
        assert!(!TypeRules::can_silently_cast_to(&Type::float64(), &Type::int64()));
        assert!(!TypeRules::can_silently_cast_to(&Type::int32(), &Type::bool()));
    }

    #[test]
    fn bounded_int_decays_silently() {
        let wrap = Type::bounded_int(BoundedIntKind::Wrap, 8).unwrap();
        assert!(TypeRules::can_silently_cast_to(&Type::int32(), &wrap));
        assert!(TypeRules::can_silently_cast_to(&Type::int64(), &wrap));
        assert!(!TypeRules::can_silently_cast_to(&wrap, &Type::int32()));
    }

    #[test]
    fn scalar_broadcasts_into_vector() {
        let v = Type::vector(PrimitiveType::Float32, 4).unwrap();
        assert!(TypeRules::can_silently_cast_to(&v, &Type::float32()));
        assert!(!TypeRules::can_silently_cast_to(&v, &Type::float64()));
    }

    #[test]
    fn explicit_casts_may_narrow() {
        assert!(TypeRules::can_cast_to(&Type::int32(), &Type::int64()));
        assert!(TypeRules::can_cast_to(&Type::float32(), &Type::float64()));
        assert!(TypeRules::can_cast_to(&Type::int32(), &Type::bool()));
        let wrap = Type::bounded_int(BoundedIntKind::Wrap, 10).unwrap();
        assert!(TypeRules::can_cast_to(&wrap, &Type::int64()));
        assert!(!TypeRules::can_cast_to(&Type::string_literal(), &Type::int32()));
    }

    #[test]
    fn literal_value_silent_casting() {
        let one = Value::int32(1);
        assert!(TypeRules::can_silently_cast_value(&Type::float32(), &one));
        assert!(TypeRules::can_silently_cast_value(&Type::int64(), &one));
        let wrap = Type::bounded_int(BoundedIntKind::Wrap, 4).unwrap();
        assert!(TypeRules::can_silently_cast_value(&wrap, &Value::int32(3)));
        assert!(!TypeRules::can_silently_cast_value(&wrap, &Value::int32(4)));
        // 2^24 + 1 has no exact float32 representation.
        assert!(!TypeRules::can_silently_cast_value(
            &Type::float32(),
            &Value::int32(16_777_217)
        ));
    }

    #[test]
    fn binary_operand_unification() {
        let t = TypeRules::binary_op_types(BinaryOperator::Add, &Type::int32(), &Type::int64())
            .unwrap();
        assert_eq!(t.operand, Type::int64());
        assert_eq!(t.result, Type::int64());

        let t = TypeRules::binary_op_types(BinaryOperator::LessThan, &Type::float32(), &Type::float32())
            .unwrap();
        assert_eq!(t.operand, Type::float32());
        assert_eq!(t.result, Type::bool());

        assert!(TypeRules::binary_op_types(
            BinaryOperator::BitwiseAnd,
            &Type::float32(),
            &Type::float32()
        )
        .is_none());

        // int64 + float32 has no unambiguous silent unification.
        assert!(
            TypeRules::binary_op_types(BinaryOperator::Add, &Type::int64(), &Type::float32())
                .is_none()
        );
    }

    #[test]
    fn argument_passing() {
        assert!(TypeRules::can_pass_as_argument_to(&Type::int32(), &Type::int32(), true));
        assert!(!TypeRules::can_pass_as_argument_to(&Type::int64(), &Type::int32(), true));
        assert!(TypeRules::can_pass_as_argument_to(&Type::int64(), &Type::int32(), false));

        let ref_t = Type::float32().with_reference();
        assert!(TypeRules::can_pass_as_argument_to(&ref_t, &Type::float32(), true));
        assert!(!TypeRules::can_pass_as_argument_to(&ref_t, &Type::int32(), false));

        let const_ref = Type::float64().with_const().with_reference();
        assert!(TypeRules::can_pass_as_argument_to(&const_ref, &Type::float32(), false));
        assert!(!TypeRules::can_pass_as_argument_to(&const_ref, &Type::float32(), true));
    }

    #[test]
    fn negative_index_resolution() {
        assert_eq!(TypeRules::resolve_index(2, 4), Some(2));
        assert_eq!(TypeRules::resolve_index(-1, 4), Some(3));
        assert_eq!(TypeRules::resolve_index(4, 4), None);
        assert_eq!(TypeRules::resolve_index(-5, 4), None);
    }
}
