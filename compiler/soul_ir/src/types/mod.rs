//! The SOUL type model.
//!
//! A [`Type`] is a kind (primitive, vector, array, bounded integer, struct,
//! string-literal handle) plus orthogonal `const` and `reference` flags.
//! The flag representation makes two invariants structural: `const const`
//! collapses and references never nest. Values and types are immutable;
//! the `with_*`/`without_*` mutators return new types.

mod rules;
mod structure;

pub use rules::{BinaryOpTypes, TypeRules};
pub use structure::{Member, StructId, StructStore, Structure};

use std::fmt;

/// Legal vector sizes are 1..=256.
pub const MAX_VECTOR_SIZE: u64 = 256;

/// Legal array sizes are 1..=2^30.
pub const MAX_ARRAY_SIZE: u64 = 1 << 30;

/// Bounded-integer limits are 1..=2^31-1.
pub const MAX_BOUNDED_INT_LIMIT: i64 = i32::MAX as i64;

/// Cap on the packed byte size of any single value.
pub const MAX_PACKED_OBJECT_SIZE: u64 = 16 * 1024 * 1024;

/// Scalar primitive types.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum PrimitiveType {
    Void,
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl PrimitiveType {
    pub fn is_integer(self) -> bool {
        matches!(self, PrimitiveType::Int32 | PrimitiveType::Int64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, PrimitiveType::Float32 | PrimitiveType::Float64)
    }

    /// True for types a vector may contain (everything except void).
    pub fn can_be_vector_element(self) -> bool {
        self != PrimitiveType::Void
    }

    pub fn packed_size(self) -> u64 {
        match self {
            PrimitiveType::Void => 0,
            PrimitiveType::Bool => 1,
            PrimitiveType::Int32 | PrimitiveType::Float32 => 4,
            PrimitiveType::Int64 | PrimitiveType::Float64 => 8,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            PrimitiveType::Void => "void",
            PrimitiveType::Bool => "bool",
            PrimitiveType::Int32 => "int32",
            PrimitiveType::Int64 => "int64",
            PrimitiveType::Float32 => "float32",
            PrimitiveType::Float64 => "float64",
        }
    }

    pub fn from_text(s: &str) -> Option<Self> {
        Some(match s {
            "void" => PrimitiveType::Void,
            "bool" => PrimitiveType::Bool,
            "int32" => PrimitiveType::Int32,
            "int64" => PrimitiveType::Int64,
            "float32" => PrimitiveType::Float32,
            "float64" => PrimitiveType::Float64,
            _ => return None,
        })
    }
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text())
    }
}

/// Whether a bounded integer reduces out-of-range values modulo the limit
/// or clamps them.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum BoundedIntKind {
    Wrap,
    Clamp,
}

/// The structural part of a type, without const/reference flags.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeKind {
    Primitive(PrimitiveType),
    /// Handle into the string dictionary.
    StringLiteral,
    Vector {
        element: PrimitiveType,
        size: u32,
    },
    FixedArray {
        element: Box<Type>,
        size: u64,
    },
    /// Array whose size is fixed by its first full assignment.
    UnsizedArray {
        element: Box<Type>,
    },
    BoundedInt {
        kind: BoundedIntKind,
        limit: i64,
    },
    Struct(StructId),
}

/// Error kinds for type construction and casting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeError {
    CastNotPermitted,
    SizeOutOfRange,
    IllegalVectorSize,
    IllegalBoundedIntSize,
    TypeTooLarge,
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeError::CastNotPermitted => write!(f, "cast not permitted"),
            TypeError::SizeOutOfRange => write!(f, "size out of range"),
            TypeError::IllegalVectorSize => {
                write!(f, "illegal vector size (must be 1..{MAX_VECTOR_SIZE})")
            }
            TypeError::IllegalBoundedIntSize => {
                write!(f, "illegal wrap/clamp size (must be 1..{MAX_BOUNDED_INT_LIMIT})")
            }
            TypeError::TypeTooLarge => write!(f, "type is too large"),
        }
    }
}

impl std::error::Error for TypeError {}

/// A complete SOUL type.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct Type {
    pub kind: TypeKind,
    pub is_reference: bool,
    pub is_const: bool,
}

impl Type {
    // ---- constructors ----

    pub const fn primitive(p: PrimitiveType) -> Type {
        Type {
            kind: TypeKind::Primitive(p),
            is_reference: false,
            is_const: false,
        }
    }

    pub const fn void() -> Type {
        Type::primitive(PrimitiveType::Void)
    }

    pub const fn bool() -> Type {
        Type::primitive(PrimitiveType::Bool)
    }

    pub const fn int32() -> Type {
        Type::primitive(PrimitiveType::Int32)
    }

    pub const fn int64() -> Type {
        Type::primitive(PrimitiveType::Int64)
    }

    pub const fn float32() -> Type {
        Type::primitive(PrimitiveType::Float32)
    }

    pub const fn float64() -> Type {
        Type::primitive(PrimitiveType::Float64)
    }

    pub const fn string_literal() -> Type {
        Type {
            kind: TypeKind::StringLiteral,
            is_reference: false,
            is_const: false,
        }
    }

    pub fn is_legal_vector_size(size: i64) -> bool {
        size >= 1 && size <= MAX_VECTOR_SIZE as i64
    }

    pub fn is_legal_array_size(size: i64) -> bool {
        size >= 1 && size <= MAX_ARRAY_SIZE as i64
    }

    pub fn is_legal_bounded_int_limit(limit: i64) -> bool {
        limit >= 1 && limit <= MAX_BOUNDED_INT_LIMIT
    }

    pub fn vector(element: PrimitiveType, size: u64) -> Result<Type, TypeError> {
        if !element.can_be_vector_element() {
            return Err(TypeError::IllegalVectorSize);
        }
        if !Self::is_legal_vector_size(size as i64) {
            return Err(TypeError::IllegalVectorSize);
        }
        Ok(Type {
            kind: TypeKind::Vector {
                element,
                size: size as u32,
            },
            is_reference: false,
            is_const: false,
        })
    }

    pub fn array(element: Type, size: u64) -> Result<Type, TypeError> {
        if !Self::is_legal_array_size(size as i64) {
            return Err(TypeError::SizeOutOfRange);
        }
        Ok(Type {
            kind: TypeKind::FixedArray {
                element: Box::new(element.without_reference_and_const()),
                size,
            },
            is_reference: false,
            is_const: false,
        })
    }

    pub fn bounded_int(kind: BoundedIntKind, limit: i64) -> Result<Type, TypeError> {
        if !Self::is_legal_bounded_int_limit(limit) {
            return Err(TypeError::IllegalBoundedIntSize);
        }
        Ok(Type {
            kind: TypeKind::BoundedInt { kind, limit },
            is_reference: false,
            is_const: false,
        })
    }

    pub fn structure(id: StructId) -> Type {
        Type {
            kind: TypeKind::Struct(id),
            is_reference: false,
            is_const: false,
        }
    }

    /// Array whose size is determined by its first full assignment.
    pub fn create_unsized_array(element: Type) -> Type {
        Type {
            kind: TypeKind::UnsizedArray {
                element: Box::new(element.without_reference_and_const()),
            },
            is_reference: false,
            is_const: false,
        }
    }

    // ---- predicates ----

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(PrimitiveType::Void))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(_))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(PrimitiveType::Bool))
    }

    pub fn is_primitive_integer(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(p) if p.is_integer())
    }

    pub fn is_primitive_float(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(p) if p.is_float())
    }

    /// Primitive integer or bounded integer.
    pub fn is_integer(&self) -> bool {
        self.is_primitive_integer() || self.is_bounded_int()
    }

    pub fn is_integer64(&self) -> bool {
        matches!(self.kind, TypeKind::Primitive(PrimitiveType::Int64))
    }

    pub fn is_string_literal(&self) -> bool {
        matches!(self.kind, TypeKind::StringLiteral)
    }

    pub fn is_vector(&self) -> bool {
        matches!(self.kind, TypeKind::Vector { .. })
    }

    pub fn is_array(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::FixedArray { .. } | TypeKind::UnsizedArray { .. }
        )
    }

    pub fn is_fixed_size_array(&self) -> bool {
        matches!(self.kind, TypeKind::FixedArray { .. })
    }

    pub fn is_unsized_array(&self) -> bool {
        matches!(self.kind, TypeKind::UnsizedArray { .. })
    }

    pub fn is_array_or_vector(&self) -> bool {
        self.is_array() || self.is_vector()
    }

    /// Vector, fixed array, or struct: aggregates whose element count is
    /// known at compile time.
    pub fn is_fixed_size_aggregate(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Vector { .. } | TypeKind::FixedArray { .. } | TypeKind::Struct(_)
        )
    }

    pub fn is_bounded_int(&self) -> bool {
        matches!(self.kind, TypeKind::BoundedInt { .. })
    }

    pub fn is_wrapped_int(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::BoundedInt {
                kind: BoundedIntKind::Wrap,
                ..
            }
        )
    }

    pub fn is_struct(&self) -> bool {
        matches!(self.kind, TypeKind::Struct(_))
    }

    pub fn is_scalar(&self) -> bool {
        self.is_primitive() && !self.is_void() || self.is_bounded_int()
    }

    pub fn is_non_const_reference(&self) -> bool {
        self.is_reference && !self.is_const
    }

    /// True for element types a vector accepts.
    pub fn can_be_vector_element(&self) -> bool {
        match self.kind {
            TypeKind::Primitive(p) => p.can_be_vector_element(),
            _ => false,
        }
    }

    /// True for element types an array accepts (multi-dimensional arrays
    /// are rejected later by the sanity checker, not here).
    pub fn can_be_array_element(&self) -> bool {
        !self.is_void() && !self.is_reference
    }

    // ---- introspection ----

    pub fn primitive_type(&self) -> Option<PrimitiveType> {
        match self.kind {
            TypeKind::Primitive(p) => Some(p),
            TypeKind::Vector { element, .. } => Some(element),
            _ => None,
        }
    }

    pub fn vector_size(&self) -> Option<u64> {
        match self.kind {
            TypeKind::Vector { size, .. } => Some(size as u64),
            _ => None,
        }
    }

    pub fn array_size(&self) -> Option<u64> {
        match self.kind {
            TypeKind::FixedArray { size, .. } => Some(size),
            _ => None,
        }
    }

    pub fn array_or_vector_size(&self) -> Option<u64> {
        match self.kind {
            TypeKind::Vector { size, .. } => Some(size as u64),
            TypeKind::FixedArray { size, .. } => Some(size),
            _ => None,
        }
    }

    pub fn bounded_int_limit(&self) -> Option<i64> {
        match self.kind {
            TypeKind::BoundedInt { limit, .. } => Some(limit),
            _ => None,
        }
    }

    pub fn struct_ref(&self) -> Option<StructId> {
        match self.kind {
            TypeKind::Struct(id) => Some(id),
            _ => None,
        }
    }

    /// Element type of an array or vector.
    pub fn element_type(&self) -> Option<Type> {
        match &self.kind {
            TypeKind::Vector { element, .. } => Some(Type::primitive(*element)),
            TypeKind::FixedArray { element, .. } | TypeKind::UnsizedArray { element } => {
                Some((**element).clone())
            }
            _ => None,
        }
    }

    /// Element count of a fixed-size aggregate.
    pub fn num_aggregate_elements(&self, structs: &StructStore) -> Option<u64> {
        match self.kind {
            TypeKind::Vector { size, .. } => Some(size as u64),
            TypeKind::FixedArray { size, .. } => Some(size),
            TypeKind::Struct(id) => Some(structs.get(id).members.len() as u64),
            _ => None,
        }
    }

    pub fn is_valid_array_or_vector_index(&self, index: i64) -> bool {
        match self.array_or_vector_size() {
            Some(size) => {
                let size = size as i64;
                index >= -size && index < size
            }
            None => false,
        }
    }

    pub fn is_valid_array_or_vector_range(&self, start: i64, end: i64) -> bool {
        match self.array_or_vector_size() {
            Some(size) => start >= 0 && end > start && end <= size as i64,
            None => false,
        }
    }

    // ---- mutators (produce new types) ----

    pub fn with_const(&self) -> Type {
        let mut t = self.clone();
        t.is_const = true; // const of const collapses
        t
    }

    pub fn without_const(&self) -> Type {
        let mut t = self.clone();
        t.is_const = false;
        t
    }

    pub fn with_reference(&self) -> Type {
        let mut t = self.clone();
        t.is_reference = true; // references never nest
        t
    }

    pub fn without_reference(&self) -> Type {
        let mut t = self.clone();
        t.is_reference = false;
        t
    }

    pub fn without_reference_and_const(&self) -> Type {
        let mut t = self.clone();
        t.is_reference = false;
        t.is_const = false;
        t
    }

    /// Copy of this array type with a new size. Works on fixed and unsized
    /// arrays; this is how an unsized array becomes fixed once its size is
    /// known.
    pub fn with_array_size(&self, size: u64) -> Result<Type, TypeError> {
        if !Self::is_legal_array_size(size as i64) {
            return Err(TypeError::SizeOutOfRange);
        }
        match &self.kind {
            TypeKind::FixedArray { element, .. } | TypeKind::UnsizedArray { element } => Ok(Type {
                kind: TypeKind::FixedArray {
                    element: element.clone(),
                    size,
                },
                is_reference: self.is_reference,
                is_const: self.is_const,
            }),
            _ => Err(TypeError::CastNotPermitted),
        }
    }

    // ---- equality ----

    /// Exact structural identity, including const/reference flags.
    pub fn is_identical(&self, other: &Type) -> bool {
        self == other
    }

    /// Identity ignoring const and reference flags.
    pub fn is_same_kind(&self, other: &Type) -> bool {
        self.kind == other.kind
    }

    /// Equality treating a size-1 vector and its scalar as the same type.
    pub fn is_equal_ignoring_vector_size1(&self, other: &Type) -> bool {
        if self.kind == other.kind {
            return true;
        }
        match (&self.kind, &other.kind) {
            (TypeKind::Vector { element, size: 1 }, TypeKind::Primitive(p))
            | (TypeKind::Primitive(p), TypeKind::Vector { element, size: 1 }) => element == p,
            _ => false,
        }
    }

    // ---- sizes ----

    /// Total packed byte size. Recursion is bounded because recursive
    /// struct types are rejected during resolution.
    pub fn packed_size(&self, structs: &StructStore) -> u64 {
        self.packed_size_with_depth(structs, 0)
    }

    fn packed_size_with_depth(&self, structs: &StructStore, depth: u32) -> u64 {
        if depth > 64 {
            return u64::MAX;
        }
        match &self.kind {
            TypeKind::Primitive(p) => p.packed_size(),
            TypeKind::StringLiteral => 4,
            TypeKind::BoundedInt { .. } => 4,
            TypeKind::Vector { element, size } => element.packed_size() * (*size as u64),
            TypeKind::FixedArray { element, size } => {
                element
                    .packed_size_with_depth(structs, depth + 1)
                    .saturating_mul(*size)
            }
            TypeKind::UnsizedArray { .. } => 8,
            TypeKind::Struct(id) => structs
                .get(*id)
                .members
                .iter()
                .map(|m| m.ty.packed_size_with_depth(structs, depth + 1))
                .fold(0u64, u64::saturating_add),
        }
    }

    pub fn is_packed_size_too_big(&self, structs: &StructStore) -> bool {
        self.packed_size(structs) > MAX_PACKED_OBJECT_SIZE
    }

    /// Readable description, using the struct store for struct names.
    pub fn describe(&self, structs: &StructStore) -> String {
        let mut s = String::new();
        if self.is_const {
            s.push_str("const ");
        }
        match &self.kind {
            TypeKind::Primitive(p) => s.push_str(p.text()),
            TypeKind::StringLiteral => s.push_str("string"),
            TypeKind::Vector { element, size } => {
                s.push_str(&format!("{}<{}>", element.text(), size));
            }
            TypeKind::FixedArray { element, size } => {
                s.push_str(&format!("{}[{}]", element.describe(structs), size));
            }
            TypeKind::UnsizedArray { element } => {
                s.push_str(&format!("{}[]", element.describe(structs)));
            }
            TypeKind::BoundedInt { kind, limit } => {
                let name = match kind {
                    BoundedIntKind::Wrap => "wrap",
                    BoundedIntKind::Clamp => "clamp",
                };
                s.push_str(&format!("{name}<{limit}>"));
            }
            TypeKind::Struct(id) => s.push_str(&structs.get(*id).name),
        }
        if self.is_reference {
            s.push('&');
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_size_limits() {
        assert!(Type::vector(PrimitiveType::Float32, 0).is_err());
        assert!(Type::vector(PrimitiveType::Float32, 1).is_ok());
        assert!(Type::vector(PrimitiveType::Float32, 256).is_ok());
        assert!(Type::vector(PrimitiveType::Float32, 257).is_err());
        assert!(Type::vector(PrimitiveType::Void, 4).is_err());
    }

    #[test]
    fn bounded_int_limits() {
        assert!(Type::bounded_int(BoundedIntKind::Wrap, 0).is_err());
        assert!(Type::bounded_int(BoundedIntKind::Wrap, 1).is_ok());
        assert!(Type::bounded_int(BoundedIntKind::Clamp, (1 << 31) - 1).is_ok());
        assert!(Type::bounded_int(BoundedIntKind::Clamp, 1 << 31).is_err());
    }

    #[test]
    fn const_of_const_collapses() {
        let t = Type::int32().with_const().with_const();
        assert!(t.is_const);
        assert_eq!(t, Type::int32().with_const());
    }

    #[test]
    fn references_do_not_nest() {
        let t = Type::float32().with_reference().with_reference();
        assert_eq!(t, Type::float32().with_reference());
        assert!(t.without_reference().is_identical(&Type::float32()));
    }

    #[test]
    fn unsized_array_becomes_fixed() {
        let t = Type::create_unsized_array(Type::float32());
        assert!(t.is_unsized_array());
        let fixed = t.with_array_size(16).unwrap();
        assert!(fixed.is_fixed_size_array());
        assert_eq!(fixed.array_size(), Some(16));
    }

    #[test]
    fn vector_size1_equality() {
        let v1 = Type::vector(PrimitiveType::Float32, 1).unwrap();
        assert!(v1.is_equal_ignoring_vector_size1(&Type::float32()));
        let v2 = Type::vector(PrimitiveType::Float32, 2).unwrap();
        assert!(!v2.is_equal_ignoring_vector_size1(&Type::float32()));
    }

    #[test]
    fn describe_types() {
        let structs = StructStore::new();
        assert_eq!(Type::float32().describe(&structs), "float32");
        let v = Type::vector(PrimitiveType::Float32, 2).unwrap();
        assert_eq!(v.describe(&structs), "float32<2>");
        let a = Type::array(Type::int32(), 4).unwrap();
        assert_eq!(a.describe(&structs), "int32[4]");
        assert_eq!(
            Type::bounded_int(BoundedIntKind::Wrap, 8).unwrap().describe(&structs),
            "wrap<8>"
        );
    }
}
