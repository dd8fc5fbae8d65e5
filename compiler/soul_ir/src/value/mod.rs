//! Compile-time constant values.
//!
//! A [`Value`] is tagged by its [`Type`]. Aggregates store their elements
//! inline; unsized-array literals store a handle into the constant table.
//! Values are immutable; casts produce new values. Structural equality
//! compares floats bitwise so the constant table stays injective.

mod ops;

pub use ops::{apply_binary_op, apply_unary_op, FoldError};

use crate::string_dictionary::StringHandle;
use crate::types::{PrimitiveType, StructStore, Type, TypeError, TypeKind, TypeRules};

/// Handle into the constant table, for values too large to inline.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ConstantHandle(pub u32);

#[derive(Clone, Debug)]
pub enum ValueData {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Handle into the string dictionary.
    String(StringHandle),
    /// Elements of a vector, fixed array, or struct.
    Aggregate(Vec<Value>),
    /// Content of an unsized-array literal, held by the constant table.
    UnsizedArray(ConstantHandle),
}

/// A constant value together with its type.
#[derive(Clone, Debug)]
pub struct Value {
    ty: Type,
    data: ValueData,
}

impl Value {
    // ---- constructors ----

    pub fn bool(v: bool) -> Value {
        Value {
            ty: Type::bool(),
            data: ValueData::Bool(v),
        }
    }

    pub fn int32(v: i32) -> Value {
        Value {
            ty: Type::int32(),
            data: ValueData::Int32(v),
        }
    }

    pub fn int64(v: i64) -> Value {
        Value {
            ty: Type::int64(),
            data: ValueData::Int64(v),
        }
    }

    pub fn float32(v: f32) -> Value {
        Value {
            ty: Type::float32(),
            data: ValueData::Float32(v),
        }
    }

    pub fn float64(v: f64) -> Value {
        Value {
            ty: Type::float64(),
            data: ValueData::Float64(v),
        }
    }

    pub fn string_literal(handle: StringHandle) -> Value {
        Value {
            ty: Type::string_literal(),
            data: ValueData::String(handle),
        }
    }

    /// An array index constant (int32, per the surface language).
    pub fn array_index(v: i64) -> Value {
        Value::int32(v as i32)
    }

    /// Aggregate of a vector/array/struct type. The caller is responsible
    /// for the element count matching the type.
    pub fn aggregate(ty: Type, elements: Vec<Value>) -> Value {
        Value {
            ty,
            data: ValueData::Aggregate(elements),
        }
    }

    pub fn unsized_array(element_type: Type, content: ConstantHandle) -> Value {
        Value {
            ty: Type::create_unsized_array(element_type),
            data: ValueData::UnsizedArray(content),
        }
    }

    /// Zero value for any type. Aggregates are filled with element zeros.
    pub fn zero_initialiser(ty: &Type, structs: &StructStore) -> Value {
        let data = match &ty.kind {
            TypeKind::Primitive(PrimitiveType::Void) => ValueData::Int32(0),
            TypeKind::Primitive(PrimitiveType::Bool) => ValueData::Bool(false),
            TypeKind::Primitive(PrimitiveType::Int32) => ValueData::Int32(0),
            TypeKind::Primitive(PrimitiveType::Int64) => ValueData::Int64(0),
            TypeKind::Primitive(PrimitiveType::Float32) => ValueData::Float32(0.0),
            TypeKind::Primitive(PrimitiveType::Float64) => ValueData::Float64(0.0),
            TypeKind::StringLiteral => ValueData::String(StringHandle::EMPTY),
            TypeKind::BoundedInt { .. } => ValueData::Int32(0),
            TypeKind::Vector { element, size } => {
                let zero = Value::zero_initialiser(&Type::primitive(*element), structs);
                ValueData::Aggregate(vec![zero; *size as usize])
            }
            TypeKind::FixedArray { element, size } => {
                let zero = Value::zero_initialiser(element, structs);
                ValueData::Aggregate(vec![zero; *size as usize])
            }
            TypeKind::UnsizedArray { .. } => ValueData::Aggregate(Vec::new()),
            TypeKind::Struct(id) => {
                let members = structs.get(*id).members.clone();
                ValueData::Aggregate(
                    members
                        .iter()
                        .map(|m| Value::zero_initialiser(&m.ty, structs))
                        .collect(),
                )
            }
        };
        Value {
            ty: ty.without_reference_and_const(),
            data,
        }
    }

    // ---- accessors ----

    pub fn get_type(&self) -> &Type {
        &self.ty
    }

    pub fn data(&self) -> &ValueData {
        &self.data
    }

    pub fn get_as_bool(&self) -> Option<bool> {
        match self.data {
            ValueData::Bool(b) => Some(b),
            _ => None,
        }
    }

    pub fn get_as_i64(&self) -> Option<i64> {
        match self.data {
            ValueData::Int32(v) => Some(v as i64),
            ValueData::Int64(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_as_f64(&self) -> Option<f64> {
        match self.data {
            ValueData::Int32(v) => Some(v as f64),
            ValueData::Int64(v) => Some(v as f64),
            ValueData::Float32(v) => Some(v as f64),
            ValueData::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn get_string_handle(&self) -> Option<StringHandle> {
        match self.data {
            ValueData::String(h) => Some(h),
            _ => None,
        }
    }

    pub fn elements(&self) -> Option<&[Value]> {
        match &self.data {
            ValueData::Aggregate(items) => Some(items),
            _ => None,
        }
    }

    /// True when this value, or every element of an aggregate, is zero.
    pub fn is_zero(&self) -> bool {
        match &self.data {
            ValueData::Bool(b) => !b,
            ValueData::Int32(v) => *v == 0,
            ValueData::Int64(v) => *v == 0,
            ValueData::Float32(v) => *v == 0.0,
            ValueData::Float64(v) => *v == 0.0,
            ValueData::String(_) => false,
            ValueData::Aggregate(items) => items.iter().all(Value::is_zero),
            ValueData::UnsizedArray(_) => false,
        }
    }

    pub fn can_negate(&self) -> bool {
        matches!(
            self.data,
            ValueData::Int32(_) | ValueData::Int64(_) | ValueData::Float32(_) | ValueData::Float64(_)
        )
    }

    pub fn negated(&self) -> Option<Value> {
        Some(match self.data {
            ValueData::Int32(v) => Value::int32(v.wrapping_neg()),
            ValueData::Int64(v) => Value::int64(v.wrapping_neg()),
            ValueData::Float32(v) => Value::float32(-v),
            ValueData::Float64(v) => Value::float64(-v),
            _ => return None,
        })
    }

    // ---- casting ----

    /// Cast using the explicit-cast rules, reducing into bounded-int types
    /// by wrap or clamp.
    pub fn cast_to_type(&self, dest: &Type, structs: &StructStore) -> Result<Value, TypeError> {
        let dest = dest.without_reference_and_const();

        if dest == self.ty.without_reference_and_const() {
            let mut v = self.clone();
            v.ty = dest;
            return Ok(v);
        }

        match &dest.kind {
            TypeKind::Primitive(p) => self.cast_to_primitive(*p).ok_or(TypeError::CastNotPermitted),

            TypeKind::BoundedInt { kind, limit } => {
                let v = self
                    .get_as_i64()
                    .or_else(|| self.get_as_bool().map(i64::from))
                    .ok_or(TypeError::CastNotPermitted)?;
                let reduced = match kind {
                    crate::types::BoundedIntKind::Wrap => v.rem_euclid(*limit),
                    crate::types::BoundedIntKind::Clamp => v.clamp(0, limit - 1),
                };
                Ok(Value {
                    ty: dest.clone(),
                    data: ValueData::Int32(reduced as i32),
                })
            }

            TypeKind::Vector { element, size } => {
                let element_type = Type::primitive(*element);
                if let ValueData::Aggregate(items) = &self.data {
                    if items.len() != *size as usize {
                        return Err(TypeError::CastNotPermitted);
                    }
                    let cast: Result<Vec<Value>, TypeError> = items
                        .iter()
                        .map(|v| v.cast_to_type(&element_type, structs))
                        .collect();
                    return Ok(Value::aggregate(dest.clone(), cast?));
                }
                // Scalar broadcast.
                let scalar = self.cast_to_type(&element_type, structs)?;
                Ok(Value::aggregate(dest.clone(), vec![scalar; *size as usize]))
            }

            TypeKind::FixedArray { element, size } => {
                if let ValueData::Aggregate(items) = &self.data {
                    if items.len() != *size as usize {
                        return Err(TypeError::CastNotPermitted);
                    }
                    let cast: Result<Vec<Value>, TypeError> = items
                        .iter()
                        .map(|v| v.cast_to_type(element, structs))
                        .collect();
                    return Ok(Value::aggregate(dest.clone(), cast?));
                }
                Err(TypeError::CastNotPermitted)
            }

            TypeKind::Struct(id) => {
                if let ValueData::Aggregate(items) = &self.data {
                    let members = structs.get(*id).members.clone();
                    if items.len() != members.len() {
                        return Err(TypeError::CastNotPermitted);
                    }
                    let cast: Result<Vec<Value>, TypeError> = items
                        .iter()
                        .zip(members.iter())
                        .map(|(v, m)| v.cast_to_type(&m.ty, structs))
                        .collect();
                    return Ok(Value::aggregate(dest.clone(), cast?));
                }
                Err(TypeError::CastNotPermitted)
            }

            _ => Err(TypeError::CastNotPermitted),
        }
    }

    /// Cast after asserting the cast is silent; used where the caller has
    /// already verified [`TypeRules::can_silently_cast_value`].
    ///
    /// # Panics
    ///
    /// Panics if the silent cast does not in fact succeed; that is an
    /// internal compiler error, not a user error.
    pub fn cast_to_type_expecting_success(&self, dest: &Type, structs: &StructStore) -> Value {
        debug_assert!(
            TypeRules::can_silently_cast_value(dest, self),
            "silent cast was asserted to succeed"
        );
        self.cast_to_type(dest, structs)
            .expect("silent cast was asserted to succeed")
    }

    fn cast_to_primitive(&self, dest: PrimitiveType) -> Option<Value> {
        use PrimitiveType::*;

        // Unwrap a size-1 vector to its scalar.
        if let ValueData::Aggregate(items) = &self.data {
            if self.ty.is_vector() && items.len() == 1 {
                return items[0].cast_to_primitive(dest);
            }
            return None;
        }

        if let ValueData::Bool(b) = self.data {
            return Some(match dest {
                Bool => Value::bool(b),
                Int32 => Value::int32(b as i32),
                Int64 => Value::int64(b as i64),
                Float32 => Value::float32(b as i32 as f32),
                Float64 => Value::float64(b as i32 as f64),
                Void => return None,
            });
        }

        if let Some(v) = self.get_as_i64() {
            if self.ty.is_integer() {
                return Some(match dest {
                    Bool => Value::bool(v != 0),
                    Int32 => Value::int32(v as i32),
                    Int64 => Value::int64(v),
                    Float32 => Value::float32(v as f32),
                    Float64 => Value::float64(v as f64),
                    Void => return None,
                });
            }
        }

        if let Some(v) = self.get_as_f64() {
            return Some(match dest {
                Bool => Value::bool(v != 0.0),
                Int32 => Value::int32(v as i32),
                Int64 => Value::int64(v as i64),
                Float32 => Value::float32(v as f32),
                Float64 => Value::float64(v),
                Void => return None,
            });
        }

        None
    }

    /// Readable description for diagnostics.
    pub fn describe(&self) -> String {
        match &self.data {
            ValueData::Bool(b) => b.to_string(),
            ValueData::Int32(v) => v.to_string(),
            ValueData::Int64(v) => format!("{v}L"),
            ValueData::Float32(v) => format!("{v}f"),
            ValueData::Float64(v) => format!("{v}"),
            ValueData::String(h) => format!("string#{}", h.0),
            ValueData::Aggregate(items) => {
                let inner: Vec<String> = items.iter().map(Value::describe).collect();
                format!("({})", inner.join(", "))
            }
            ValueData::UnsizedArray(h) => format!("constant#{}", h.0),
        }
    }
}

/// Structural equality; floats compare bitwise.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.data, &other.data) {
            (ValueData::Bool(a), ValueData::Bool(b)) => a == b,
            (ValueData::Int32(a), ValueData::Int32(b)) => a == b,
            (ValueData::Int64(a), ValueData::Int64(b)) => a == b,
            (ValueData::Float32(a), ValueData::Float32(b)) => a.to_bits() == b.to_bits(),
            (ValueData::Float64(a), ValueData::Float64(b)) => a.to_bits() == b.to_bits(),
            (ValueData::String(a), ValueData::String(b)) => a == b,
            (ValueData::Aggregate(a), ValueData::Aggregate(b)) => a == b,
            (ValueData::UnsizedArray(a), ValueData::UnsizedArray(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundedIntKind;

    #[test]
    fn zero_initialiser_for_each_kind() {
        let structs = StructStore::new();
        assert!(Value::zero_initialiser(&Type::int32(), &structs).is_zero());
        assert!(Value::zero_initialiser(&Type::bool(), &structs).is_zero());
        let v = Type::vector(PrimitiveType::Float32, 4).unwrap();
        let zv = Value::zero_initialiser(&v, &structs);
        assert_eq!(zv.elements().unwrap().len(), 4);
        assert!(zv.is_zero());
    }

    #[test]
    fn silent_cast_preserves_type() {
        let structs = StructStore::new();
        let v = Value::int32(42);
        for t in [Type::int64(), Type::float64(), Type::float32()] {
            assert!(TypeRules::can_silently_cast_value(&t, &v));
            let cast = v.cast_to_type(&t, &structs).unwrap();
            assert_eq!(cast.get_type(), &t);
        }
    }

    #[test]
    fn wrap_and_clamp_reduction() {
        let structs = StructStore::new();
        let wrap = Type::bounded_int(BoundedIntKind::Wrap, 8).unwrap();
        let clamp = Type::bounded_int(BoundedIntKind::Clamp, 8).unwrap();
        assert_eq!(
            Value::int32(10).cast_to_type(&wrap, &structs).unwrap().get_as_i64(),
            Some(2)
        );
        assert_eq!(
            Value::int32(-1).cast_to_type(&wrap, &structs).unwrap().get_as_i64(),
            Some(7)
        );
        assert_eq!(
            Value::int32(10).cast_to_type(&clamp, &structs).unwrap().get_as_i64(),
            Some(7)
        );
    }

    #[test]
    fn float_equality_is_bitwise() {
        assert_eq!(Value::float32(0.5), Value::float32(0.5));
        assert_ne!(Value::float32(0.5), Value::float32(-0.5));
        assert_eq!(Value::float64(f64::NAN), Value::float64(f64::NAN));
    }

    #[test]
    fn scalar_broadcast_cast() {
        let structs = StructStore::new();
        let v4 = Type::vector(PrimitiveType::Float32, 4).unwrap();
        let cast = Value::float32(1.5).cast_to_type(&v4, &structs).unwrap();
        assert_eq!(cast.elements().unwrap().len(), 4);
        assert_eq!(cast.elements().unwrap()[3], Value::float32(1.5));
    }
}
