//! Semantic queries over the AST.
//!
//! These are the predicates the resolution passes are built from: what an
//! expression currently is (value, type, endpoint, processor, or still
//! unresolved), what type it produces, and whether it is a compile-time
//! constant or an assignable l-value. Everything here is tolerant of
//! partially resolved trees; a query that cannot be answered yet returns
//! `None` rather than guessing.

use super::*;
use crate::endpoint::EndpointKind;
use crate::types::{Type, TypeRules};
use crate::value::Value;
use crate::UnaryOperator;

/// What an expression node currently denotes.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ExprClass {
    Value,
    Type,
    Endpoint,
    Processor,
    Unresolved,
}

impl AstAllocator {
    // ---- classification ----

    pub fn expr_class(&self, id: ExprId) -> ExprClass {
        match self.expr(id) {
            Expr::Constant(_)
            | Expr::VariableRef(_)
            | Expr::TypeCast { .. }
            | Expr::FunctionCall { .. }
            | Expr::UnaryOp { .. }
            | Expr::BinaryOp { .. }
            | Expr::TernaryOp { .. }
            | Expr::Assignment { .. }
            | Expr::PreOrPostIncDec { .. }
            | Expr::CommaSeparatedList { .. }
            | Expr::ArrayElementRef { .. }
            | Expr::StructMemberRef { .. }
            | Expr::WriteToEndpoint { .. }
            | Expr::ProcessorProperty(_)
            | Expr::AdvanceClock
            | Expr::StaticAssertion { .. } => ExprClass::Value,

            Expr::ConcreteType(_) => ExprClass::Type,

            Expr::TypeMetaFunction { .. } => match self.type_meta_result(id) {
                Some(MetaResult::Type(_)) => ExprClass::Type,
                Some(MetaResult::Value(_)) => ExprClass::Value,
                None => ExprClass::Unresolved,
            },

            Expr::InputEndpointRef(_) | Expr::OutputEndpointRef(_) => ExprClass::Endpoint,
            Expr::ProcessorRef(_) => ExprClass::Processor,

            Expr::QualifiedIdentifier(_)
            | Expr::SubscriptWithBrackets { .. }
            | Expr::SubscriptWithChevrons { .. }
            | Expr::CallOrCast { .. }
            | Expr::DotOperator { .. } => ExprClass::Unresolved,
        }
    }

    /// A node is resolved once its class is known and its type questions
    /// can be answered.
    pub fn is_resolved_expr(&self, id: ExprId) -> bool {
        match self.expr(id) {
            Expr::Constant(_) | Expr::ConcreteType(_) | Expr::ProcessorRef(_) => true,
            Expr::ProcessorProperty(_) | Expr::AdvanceClock | Expr::StaticAssertion { .. } => true,

            Expr::VariableRef(v) => self.variable_type(*v).is_some(),

            Expr::InputEndpointRef(e) | Expr::OutputEndpointRef(e) => {
                self.endpoint_sample_types(*e).is_some()
            }

            Expr::TypeMetaFunction { .. } => self.type_meta_result(id).is_some(),

            Expr::TypeCast { source, .. } => self.is_resolved_expr(*source),

            Expr::FunctionCall { function, args } => {
                self.resolve_as_type(self.function(*function).return_type)
                    .is_some()
                    && args.map_or(true, |a| self.is_resolved_expr(a))
            }

            Expr::UnaryOp { source, .. } => {
                self.is_resolved_as_value(*source) && self.result_type(id).is_some()
            }

            Expr::BinaryOp { lhs, rhs, .. } => {
                // An output-endpoint LHS means this is really a stream
                // write; that rewrite has not happened yet.
                if self.is_output_endpoint(*lhs) {
                    return false;
                }
                self.is_readable_value(*lhs)
                    && self.is_readable_value(*rhs)
                    && self.result_type(id).is_some()
            }

            Expr::TernaryOp {
                condition,
                true_branch,
                false_branch,
            } => {
                self.is_resolved_as_value(*condition)
                    && self.is_resolved_as_value(*true_branch)
                    && self.is_resolved_as_value(*false_branch)
            }

            Expr::Assignment { target, new_value } => {
                self.is_resolved_expr(*target) && self.is_resolved_expr(*new_value)
            }

            Expr::PreOrPostIncDec { target, .. } => self.is_resolved_expr(*target),

            Expr::CommaSeparatedList { items } => {
                items.iter().all(|&i| self.is_resolved_expr(i))
            }

            Expr::ArrayElementRef {
                object,
                start,
                end,
                ..
            } => {
                self.is_resolved_expr(*object)
                    && self.is_resolved_expr(*start)
                    && end.map_or(true, |e| self.is_resolved_expr(e))
                    && self.result_type(id).is_some()
            }

            Expr::StructMemberRef { object, .. } => self.is_resolved_expr(*object),

            Expr::WriteToEndpoint { target, value } => {
                self.is_resolved_expr(*target) && self.is_resolved_expr(*value)
            }

            Expr::QualifiedIdentifier(_)
            | Expr::SubscriptWithBrackets { .. }
            | Expr::SubscriptWithChevrons { .. }
            | Expr::CallOrCast { .. }
            | Expr::DotOperator { .. } => false,
        }
    }

    pub fn is_resolved_as_value(&self, id: ExprId) -> bool {
        self.expr_class(id) == ExprClass::Value && self.is_resolved_expr(id)
    }

    pub fn is_resolved_as_type(&self, id: ExprId) -> bool {
        self.resolve_as_type(id).is_some()
    }

    pub fn is_resolved_as_processor(&self, id: ExprId) -> bool {
        matches!(self.expr(id), Expr::ProcessorRef(_))
    }

    pub fn is_resolved_as_endpoint(&self, id: ExprId) -> bool {
        self.expr_class(id) == ExprClass::Endpoint && self.is_resolved_expr(id)
    }

    pub fn is_resolved_as_constant(&self, id: ExprId) -> bool {
        self.get_as_constant(id).is_some()
    }

    /// Values, plus readable input endpoints (`x = in` reads a stream).
    pub fn is_readable_value(&self, id: ExprId) -> bool {
        match self.expr(id) {
            Expr::InputEndpointRef(e) => !self.endpoint(*e).kind.is_event(),
            _ => self.is_resolved_as_value(id),
        }
    }

    pub fn is_output_endpoint(&self, id: ExprId) -> bool {
        match self.expr(id) {
            Expr::OutputEndpointRef(_) => true,
            Expr::ArrayElementRef { object, .. } => self.is_output_endpoint(*object),
            Expr::WriteToEndpoint { .. } => true,
            _ => false,
        }
    }

    // ---- type resolution ----

    /// Resolve an expression used in type position to a concrete type.
    pub fn resolve_as_type(&self, id: ExprId) -> Option<Type> {
        match self.expr(id) {
            Expr::ConcreteType(t) => Some(t.clone()),
            Expr::TypeMetaFunction { .. } => match self.type_meta_result(id)? {
                MetaResult::Type(t) => Some(t),
                MetaResult::Value(_) => None,
            },
            _ => None,
        }
    }

    /// Evaluate a type meta-function if its source is resolved.
    pub(crate) fn type_meta_result(&self, id: ExprId) -> Option<MetaResult> {
        let (op, source) = match self.expr(id) {
            Expr::TypeMetaFunction { op, source } => (*op, *source),
            _ => return None,
        };

        // `const T`/`T&` wrap type expressions; the others accept a type
        // or take the type of a value.
        let source_type = self
            .resolve_as_type(source)
            .or_else(|| self.result_type(source))?;

        use TypeMetaOp::*;
        Some(match op {
            TypeOf => MetaResult::Type(source_type.without_reference_and_const()),
            MakeConst => MetaResult::Type(source_type.with_const()),
            MakeReference => MetaResult::Type(source_type.with_reference()),
            ElementType => MetaResult::Type(source_type.element_type()?),
            PrimitiveOf => MetaResult::Type(Type::primitive(source_type.primitive_type()?)),
            Size => {
                let size = if let Some(s) = source_type.array_or_vector_size() {
                    s as i64
                } else if let Some(limit) = source_type.bounded_int_limit() {
                    limit
                } else {
                    return None;
                };
                MetaResult::Value(if size > i32::MAX as i64 {
                    Value::int64(size)
                } else {
                    Value::int32(size as i32)
                })
            }
            IsStruct => MetaResult::Value(Value::bool(source_type.is_struct())),
            IsArray => MetaResult::Value(Value::bool(source_type.is_array())),
            IsVector => MetaResult::Value(Value::bool(source_type.is_vector())),
            IsPrimitive => MetaResult::Value(Value::bool(source_type.is_primitive())),
            IsFloat => MetaResult::Value(Value::bool(source_type.is_primitive_float())),
            IsInt => MetaResult::Value(Value::bool(source_type.is_integer())),
            IsScalar => MetaResult::Value(Value::bool(source_type.is_scalar())),
            IsString => MetaResult::Value(Value::bool(source_type.is_string_literal())),
            IsBool => MetaResult::Value(Value::bool(source_type.is_bool())),
            IsReference => MetaResult::Value(Value::bool(source_type.is_reference)),
            IsConst => MetaResult::Value(Value::bool(source_type.is_const)),
        })
    }

    // ---- result types ----

    /// The type an expression produces when read as a value.
    pub fn result_type(&self, id: ExprId) -> Option<Type> {
        match self.expr(id) {
            Expr::Constant(v) => Some(v.get_type().clone()),
            Expr::VariableRef(v) => self.variable_type(*v),
            Expr::TypeCast { target, .. } => Some(target.clone()),
            Expr::FunctionCall { function, .. } => {
                self.resolve_as_type(self.function(*function).return_type)
            }
            Expr::UnaryOp { op, source } => {
                let t = self.result_type(*source)?.without_reference_and_const();
                match op {
                    UnaryOperator::LogicalNot => {
                        if t.is_bool() {
                            Some(Type::bool())
                        } else {
                            None
                        }
                    }
                    UnaryOperator::BitwiseNot => {
                        if t.is_primitive_integer() {
                            Some(t)
                        } else {
                            None
                        }
                    }
                    UnaryOperator::Negate => {
                        if t.is_bounded_int() {
                            Some(Type::int32())
                        } else if t.is_primitive_integer()
                            || t.is_primitive_float()
                            || t.is_vector()
                        {
                            Some(t)
                        } else {
                            None
                        }
                    }
                }
            }
            Expr::BinaryOp { .. } => self.binary_expr_types(id).map(|t| t.result),
            Expr::TernaryOp {
                true_branch,
                false_branch,
                ..
            } => {
                let t = self.result_type(*true_branch)?.without_reference_and_const();
                let f = self
                    .result_type(*false_branch)?
                    .without_reference_and_const();
                if t == f {
                    Some(t)
                } else if TypeRules::can_silently_cast_to(&t, &f) {
                    Some(t)
                } else if TypeRules::can_silently_cast_to(&f, &t) {
                    Some(f)
                } else {
                    None
                }
            }
            Expr::Assignment { .. } => Some(Type::void()),
            Expr::PreOrPostIncDec { target, .. } => {
                Some(self.result_type(*target)?.without_reference_and_const())
            }
            Expr::ArrayElementRef {
                object,
                is_slice,
                ..
            } => {
                let object_type = self.object_array_type(*object)?;
                if *is_slice {
                    let (start, end) = self.resolved_slice_range(id)?;
                    let len = end - start;
                    match object_type.element_type()? {
                        t if object_type.is_vector() => {
                            Type::vector(t.primitive_type()?, len).ok()
                        }
                        t => Type::array(t, len).ok(),
                    }
                } else {
                    object_type.element_type()
                }
            }
            Expr::StructMemberRef {
                structure,
                member_index,
                ..
            } => Some(self.structs.get(*structure).members[*member_index].ty.clone()),
            Expr::WriteToEndpoint { .. } => Some(Type::void()),
            Expr::ProcessorProperty(p) => Some(if p.is_float() {
                Type::float64()
            } else {
                Type::int32()
            }),
            Expr::AdvanceClock | Expr::StaticAssertion { .. } => Some(Type::void()),
            Expr::InputEndpointRef(e) => {
                let endpoint = self.endpoint(*e);
                if endpoint.kind.is_event() {
                    return None;
                }
                let types = self.endpoint_sample_array_types(*e)?;
                types.into_iter().next()
            }
            Expr::TypeMetaFunction { .. } => match self.type_meta_result(id)? {
                MetaResult::Value(v) => Some(v.get_type().clone()),
                MetaResult::Type(_) => None,
            },
            _ => None,
        }
    }

    /// The array/vector type a subscripted object produces; endpoints use
    /// their sample-array type.
    fn object_array_type(&self, object: ExprId) -> Option<Type> {
        match self.expr(object) {
            Expr::InputEndpointRef(e) | Expr::OutputEndpointRef(e) => self
                .endpoint_sample_array_types(*e)?
                .into_iter()
                .next(),
            _ => Some(self.result_type(object)?.without_reference_and_const()),
        }
    }

    /// Operand/result typing for a binary expression; aware of constant
    /// operands, so `1.0f + 1` types as float32.
    pub fn binary_expr_types(&self, id: ExprId) -> Option<crate::types::BinaryOpTypes> {
        let (op, lhs, rhs) = match self.expr(id) {
            Expr::BinaryOp { op, lhs, rhs } => (*op, *lhs, *rhs),
            _ => return None,
        };
        let lhs_type = self.result_type(lhs)?;
        let rhs_type = self.result_type(rhs)?;

        if let Some(types) = TypeRules::binary_op_types(op, &lhs_type, &rhs_type) {
            return Some(types);
        }

        if let Some(c) = self.get_as_constant(lhs) {
            if TypeRules::can_silently_cast_value(&rhs_type, c) {
                return TypeRules::binary_op_types(op, &rhs_type, &rhs_type);
            }
        }
        if let Some(c) = self.get_as_constant(rhs) {
            if TypeRules::can_silently_cast_value(&lhs_type, c) {
                return TypeRules::binary_op_types(op, &lhs_type, &lhs_type);
            }
        }
        None
    }

    // ---- constants ----

    /// The constant value of a node, if it has been folded to one.
    pub fn get_as_constant(&self, id: ExprId) -> Option<&Value> {
        match self.expr(id) {
            Expr::Constant(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_compile_time_constant(&self, id: ExprId) -> bool {
        match self.expr(id) {
            Expr::Constant(_) => true,
            Expr::CommaSeparatedList { items } => {
                items.iter().all(|&i| self.is_compile_time_constant(i))
            }
            Expr::TypeCast { source, .. } => self.is_compile_time_constant(*source),
            _ => false,
        }
    }

    /// Constant slice bounds resolved against the object's size, with
    /// negative indexes counted from the end.
    pub fn resolved_slice_range(&self, id: ExprId) -> Option<(u64, u64)> {
        let (object, start, end) = match self.expr(id) {
            Expr::ArrayElementRef {
                object,
                start,
                end,
                is_slice: true,
                ..
            } => (*object, *start, *end),
            _ => return None,
        };
        let size = self.object_array_type(object)?.array_or_vector_size()?;
        let start_value = self.get_as_constant(start)?.get_as_i64()?;
        let start_index = TypeRules::resolve_index(start_value, size)?;
        let end_index = match end {
            None => size,
            Some(e) => {
                let v = self.get_as_constant(e)?.get_as_i64()?;
                if v == size as i64 {
                    size
                } else {
                    TypeRules::resolve_index(v, size)?
                }
            }
        };
        if end_index > start_index {
            Some((start_index, end_index))
        } else {
            None
        }
    }

    // ---- l-values ----

    pub fn is_assignable(&self, id: ExprId) -> bool {
        match self.expr(id) {
            Expr::VariableRef(v) => {
                let var = self.variable(*v);
                if var.is_const || var.is_external {
                    return false;
                }
                match self.variable_type(*v) {
                    Some(t) => !t.is_const,
                    None => true, // unknown yet; assume assignable
                }
            }
            Expr::ArrayElementRef { object, .. } | Expr::StructMemberRef { object, .. } => {
                self.is_assignable(*object)
            }
            _ => false,
        }
    }

    // ---- variables ----

    /// The resolved type of a variable: its declared type, or the type of
    /// its initialiser for `let`/`var` declarations.
    pub fn variable_type(&self, id: VarId) -> Option<Type> {
        let var = self.variable(id);
        if let Some(declared) = var.declared_type {
            let t = self.resolve_as_type(declared)?;
            return Some(if var.is_const { t.with_const() } else { t });
        }
        let init = var.initial_value?;
        let t = self.result_type(init)?.without_reference_and_const();
        Some(if var.is_const { t.with_const() } else { t })
    }

    // ---- endpoints ----

    /// Resolved sample types of an endpoint.
    pub fn endpoint_sample_types(&self, id: EndpointId) -> Option<Vec<Type>> {
        let endpoint = self.endpoint(id);
        endpoint
            .sample_types
            .iter()
            .map(|&t| self.resolve_as_type(t))
            .collect()
    }

    /// Sample types with the endpoint's array size applied.
    pub fn endpoint_sample_array_types(&self, id: EndpointId) -> Option<Vec<Type>> {
        let endpoint = self.endpoint(id);
        let types = self.endpoint_sample_types(id)?;
        let size = match endpoint.array_size {
            None => return Some(types),
            Some(size_expr) => self.get_as_constant(size_expr)?.get_as_i64()?,
        };
        types
            .into_iter()
            .map(|t| Type::array(t, size as u64).ok())
            .collect()
    }

    /// The constant array size of an endpoint, if declared.
    pub fn endpoint_array_size(&self, id: EndpointId) -> Option<u64> {
        let size_expr = self.endpoint(id).array_size?;
        let v = self.get_as_constant(size_expr)?.get_as_i64()?;
        if v >= 1 {
            Some(v as u64)
        } else {
            None
        }
    }

    // ---- functions ----

    pub fn is_run_function(&self, id: FuncId) -> bool {
        let f = self.function(id);
        f.name == self.names.run && !f.is_event_handler
    }

    /// Resolved parameter types, or `None` while any parameter is
    /// unresolved.
    pub fn function_parameter_types(&self, id: FuncId) -> Option<Vec<Type>> {
        self.function(id)
            .parameters
            .iter()
            .map(|&p| self.variable_type(p))
            .collect()
    }

    /// Signature string for duplicate-function detection and
    /// specialisation cache keys.
    pub fn function_signature(&self, id: FuncId) -> Option<String> {
        let f = self.function(id);
        let params = self.function_parameter_types(id)?;
        let mut sig = self.interner.lookup(f.name);
        for p in params {
            sig.push('/');
            sig.push_str(&p.without_reference_and_const().describe(&self.structs));
        }
        Some(sig)
    }

    /// Cache-key suffix describing a call's argument types.
    pub fn argument_type_signature(&self, types: &[Type]) -> String {
        types
            .iter()
            .map(|t| t.describe(&self.structs))
            .collect::<Vec<_>>()
            .join("_")
            .replace(['<', '>', '[', ']', ' ', ','], "_")
    }

    /// The module that owns a scope, walking block and function parents.
    pub fn scope_module(&self, scope: ScopeRef) -> ModuleId {
        match scope {
            ScopeRef::Module(m) => m,
            ScopeRef::Function(f) => self.function(f).module,
            ScopeRef::Block(b) => self.scope_module(self.block(b).parent),
        }
    }

    /// The function a block belongs to, if any.
    pub fn block_function(&self, block: BlockId) -> Option<FuncId> {
        let b = self.block(block);
        if let Some(f) = b.function {
            return Some(f);
        }
        match b.parent {
            ScopeRef::Block(parent) => self.block_function(parent),
            ScopeRef::Function(f) => Some(f),
            ScopeRef::Module(_) => None,
        }
    }

    /// True when an input endpoint of this kind can appear on the left of
    /// an event-handler declaration.
    pub fn input_has_event_handler_type(&self, endpoint: EndpointId, handler: FuncId) -> bool {
        let e = self.endpoint(endpoint);
        if e.kind != EndpointKind::Event {
            return false;
        }
        let handler = self.function(handler);
        let param_type = match handler
            .parameters
            .first()
            .and_then(|&p| self.variable_type(p))
        {
            Some(t) => t.without_reference_and_const(),
            None => return false,
        };
        self.endpoint_sample_types(endpoint)
            .map_or(false, |types| {
                types
                    .iter()
                    .any(|t| t.without_reference_and_const() == param_type)
            })
    }
}

/// Result of evaluating a type meta-function.
pub(crate) enum MetaResult {
    Type(Type),
    Value(Value),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrimitiveType;
    use crate::BinaryOperator;

    fn ast_with_expr(expr: Expr) -> (AstAllocator, ExprId) {
        let mut ast = AstAllocator::new();
        let id = ast.alloc_expr(expr, Context::NONE);
        (ast, id)
    }

    #[test]
    fn constant_classifies_as_value() {
        let (ast, id) = ast_with_expr(Expr::Constant(Value::int32(3)));
        assert_eq!(ast.expr_class(id), ExprClass::Value);
        assert!(ast.is_resolved_as_value(id));
        assert_eq!(ast.result_type(id), Some(Type::int32()));
    }

    #[test]
    fn qualified_identifier_is_unresolved() {
        let mut ast = AstAllocator::new();
        let name = ast.interner.intern("foo");
        let id = ast.alloc_expr(
            Expr::QualifiedIdentifier(IdentifierPath::unqualified(name)),
            Context::NONE,
        );
        assert_eq!(ast.expr_class(id), ExprClass::Unresolved);
        assert!(!ast.is_resolved_expr(id));
    }

    #[test]
    fn meta_function_size_of_vector() {
        let mut ast = AstAllocator::new();
        let vec_type = Type::vector(PrimitiveType::Float32, 8).unwrap();
        let source = ast.alloc_expr(Expr::ConcreteType(vec_type), Context::NONE);
        let id = ast.alloc_expr(
            Expr::TypeMetaFunction {
                op: TypeMetaOp::Size,
                source,
            },
            Context::NONE,
        );
        assert_eq!(ast.expr_class(id), ExprClass::Value);
        assert_eq!(ast.result_type(id), Some(Type::int32()));
    }

    #[test]
    fn binary_op_with_literal_operand() {
        let mut ast = AstAllocator::new();
        let lhs = ast.alloc_expr(Expr::Constant(Value::float32(1.5)), Context::NONE);
        let rhs = ast.alloc_expr(Expr::Constant(Value::int32(1)), Context::NONE);
        let id = ast.alloc_expr(
            Expr::BinaryOp {
                op: BinaryOperator::Add,
                lhs,
                rhs,
            },
            Context::NONE,
        );
        let types = ast.binary_expr_types(id).unwrap();
        assert_eq!(types.operand, Type::float32());
        assert_eq!(types.result, Type::float32());
    }

    #[test]
    fn ternary_branch_widening() {
        let mut ast = AstAllocator::new();
        let cond = ast.alloc_expr(Expr::Constant(Value::bool(true)), Context::NONE);
        let t = ast.alloc_expr(Expr::Constant(Value::int32(1)), Context::NONE);
        let f = ast.alloc_expr(Expr::Constant(Value::int64(2)), Context::NONE);
        let id = ast.alloc_expr(
            Expr::TernaryOp {
                condition: cond,
                true_branch: t,
                false_branch: f,
            },
            Context::NONE,
        );
        assert_eq!(ast.result_type(id), Some(Type::int64()));
    }
}
