//! Type resolution.
//!
//! Resolves the ambiguous subscript forms into concrete types or array
//! element references, evaluates type meta-functions, materialises struct
//! declarations once their member types are known, and fixes the sizes of
//! unsized-array variable declarations from their initialisers.

use crate::lookup::ScopeStack;
use crate::passes::scope_tracked_visits;
use crate::sanity;
use soul_diagnostic::{errors, CompileError, CompileResult};
use soul_ir::ast::visit::{rewalk_expr, rewalk_variable, RewritingVisitor};
use soul_ir::ast::{AstAllocator, Expr, ExprId, ModuleId, VarId};
use soul_ir::types::{BoundedIntKind, Structure, Type, TypeRules};
use soul_ir::value::Value;

pub(crate) struct TypeResolver<'a> {
    pub ast: &'a mut AstAllocator,
    pub module: ModuleId,
    pub ignore_errors: bool,
    pub scopes: ScopeStack,
    pub num_fails: usize,
    pub items_replaced: usize,
}

impl<'a> TypeResolver<'a> {
    pub fn new(ast: &'a mut AstAllocator, module: ModuleId, ignore_errors: bool) -> Self {
        TypeResolver {
            ast,
            module,
            ignore_errors,
            scopes: ScopeStack::new(module),
            num_fails: 0,
            items_replaced: 0,
        }
    }

    pub fn perform(&mut self) -> CompileResult<()> {
        self.visit_module_content(self.module)?;
        self.materialise_structs()
    }

    /// Build `Structure`s for declarations whose member types have all
    /// resolved.
    fn materialise_structs(&mut self) -> CompileResult<()> {
        let decls = self.ast.module(self.module).structs.clone();
        for decl_id in decls {
            if self.ast.struct_decl(decl_id).resolved.is_some() {
                continue;
            }

            let decl = self.ast.struct_decl(decl_id).clone();
            let mut members = Vec::with_capacity(decl.members.len());
            let mut all_resolved = true;
            for member in &decl.members {
                match self.ast.resolve_as_type(member.type_expr) {
                    Some(t) => {
                        members.push((t, self.ast.interner.lookup(member.name)));
                    }
                    None => {
                        all_resolved = false;
                        break;
                    }
                }
            }

            if !all_resolved {
                self.num_fails += 1;
                continue;
            }

            let mut structure = Structure::new(self.ast.interner.lookup(decl.name));
            for (ty, name) in members {
                structure.add_member(ty, name);
            }
            let id = self.ast.structs.add(structure);
            self.ast.struct_decl_mut(decl_id).resolved = Some(id);
            self.items_replaced += 1;
        }
        Ok(())
    }

    fn resolve_bracket_subscript(&mut self, id: ExprId) -> CompileResult<()> {
        let (lhs, index) = match self.ast.expr(id) {
            Expr::SubscriptWithBrackets { lhs, index } => (*lhs, *index),
            _ => return Ok(()),
        };
        let context = self.ast.expr_context(id);

        if self.ast.is_resolved_as_value(lhs) || self.ast.is_resolved_as_endpoint(lhs) {
            let Some(start) = index else {
                if self.ignore_errors {
                    self.num_fails += 1;
                    return Ok(());
                }
                return Err(errors::expected_value(context.location).into());
            };
            self.ast.replace_expr(
                id,
                Expr::ArrayElementRef {
                    object: lhs,
                    start,
                    end: None,
                    is_slice: false,
                    suppress_wrap_warning: false,
                },
            );
            self.items_replaced += 1;
            return Ok(());
        }

        if let Some(element) = self.ast.resolve_as_type(lhs) {
            let Some(index) = index else {
                self.ast.replace_expr(
                    id,
                    Expr::ConcreteType(Type::create_unsized_array(element)),
                );
                self.items_replaced += 1;
                return Ok(());
            };

            if let Some(c) = self.ast.get_as_constant(index) {
                let size = match TypeRules::array_size_from_value(c) {
                    Ok(size) => size,
                    Err(_) => {
                        return Err(errors::illegal_array_size(
                            self.ast.expr_context(index).location,
                        )
                        .into())
                    }
                };
                if !element.can_be_array_element() {
                    return Err(errors::wrong_type_for_array_element(
                        self.ast.expr_context(lhs).location,
                    )
                    .into());
                }
                let array = Type::array(element, size).map_err(|_| {
                    CompileError::from(errors::illegal_array_size(
                        self.ast.expr_context(index).location,
                    ))
                })?;
                self.ast.replace_expr(id, Expr::ConcreteType(array));
                self.items_replaced += 1;
                return Ok(());
            }

            if self.ast.is_resolved_as_value(index) && !self.ignore_errors {
                return Err(errors::array_size_must_be_constant(context.location).into());
            }
        }

        if self.ignore_errors {
            self.num_fails += 1;
            Ok(())
        } else if self.ast.is_resolved_as_processor(lhs) {
            Err(errors::no_such_operation_on_processor(context.location).into())
        } else {
            Err(errors::cannot_resolve_bracketed_exp(context.location).into())
        }
    }

    fn resolve_chevron_subscript(&mut self, id: ExprId) -> CompileResult<()> {
        let (lhs, size) = match self.ast.expr(id) {
            Expr::SubscriptWithChevrons { lhs, size } => (*lhs, *size),
            _ => return Ok(()),
        };
        let context = self.ast.expr_context(id);

        if let Some(element) = self.ast.resolve_as_type(lhs) {
            if !element.can_be_vector_element() {
                return Err(errors::wrong_type_for_vector_element(
                    self.ast.expr_context(lhs).location,
                )
                .into());
            }

            if let Some(c) = self.ast.get_as_constant(size) {
                let size_location = self.ast.expr_context(size).location;
                let n = c
                    .get_as_i64()
                    .ok_or_else(|| CompileError::from(errors::expected_integer(size_location)))?;
                if !Type::is_legal_vector_size(n) {
                    return Err(errors::illegal_vector_size(size_location).into());
                }
                let primitive = element
                    .primitive_type()
                    .expect("vector elements are primitive");
                let vector = Type::vector(primitive, n as u64)
                    .map_err(|_| CompileError::from(errors::illegal_vector_size(size_location)))?;
                self.ast.replace_expr(id, Expr::ConcreteType(vector));
                self.items_replaced += 1;
                return Ok(());
            }
        }

        // `wrap<N>` / `clamp<N>` behave as type constructors here.
        if let Expr::QualifiedIdentifier(path) = self.ast.expr(lhs) {
            let bounded_kind = if path.is_unqualified_name(self.ast.names.wrap) {
                Some(BoundedIntKind::Wrap)
            } else if path.is_unqualified_name(self.ast.names.clamp) {
                Some(BoundedIntKind::Clamp)
            } else {
                None
            };

            if let Some(kind) = bounded_kind {
                if let Some(c) = self.ast.get_as_constant(size) {
                    let size_location = self.ast.expr_context(size).location;
                    let n = c.get_as_i64().ok_or_else(|| {
                        CompileError::from(errors::expected_integer(size_location))
                    })?;
                    if !Type::is_legal_bounded_int_limit(n) {
                        return Err(errors::illegal_bounded_int_size(size_location).into());
                    }
                    let t = Type::bounded_int(kind, n).map_err(|_| {
                        CompileError::from(errors::illegal_bounded_int_size(size_location))
                    })?;
                    self.ast.replace_expr(id, Expr::ConcreteType(t));
                    self.items_replaced += 1;
                    return Ok(());
                }

                if self.ast.is_resolved_as_value(size) && !self.ignore_errors {
                    return Err(
                        errors::wrap_or_clamp_size_must_be_constant(context.location).into()
                    );
                }
            }
        }

        if self.ignore_errors {
            self.num_fails += 1;
            Ok(())
        } else {
            Err(errors::cannot_resolve_vector_size(context.location).into())
        }
    }

    fn resolve_meta_function(&mut self, id: ExprId) -> CompileResult<()> {
        use soul_ir::ast::ExprClass;

        match self.ast.expr_class(id) {
            ExprClass::Type => {
                if let Some(t) = self.ast.resolve_as_type(id) {
                    self.ast.replace_expr(id, Expr::ConcreteType(t));
                    self.items_replaced += 1;
                }
                Ok(())
            }
            ExprClass::Value => {
                if let Some(v) = meta_value(self.ast, id) {
                    self.ast.replace_expr(id, Expr::Constant(v));
                    self.items_replaced += 1;
                }
                Ok(())
            }
            _ => {
                let context = self.ast.expr_context(id);

                // A `.size` whose source type is known but has no
                // compile-time size (an unsized array, say) never
                // resolves; report it as soon as errors are enabled.
                if let Expr::TypeMetaFunction {
                    op: soul_ir::ast::TypeMetaOp::Size,
                    source,
                } = self.ast.expr(id)
                {
                    let source_type = self
                        .ast
                        .resolve_as_type(*source)
                        .or_else(|| self.ast.result_type(*source));
                    if source_type.is_some() && !self.ignore_errors {
                        return Err(errors::cannot_take_size_of_type(context.location).into());
                    }
                }

                if self.ignore_errors {
                    self.num_fails += 1;
                    Ok(())
                } else {
                    Err(errors::cannot_resolve_source_type(context.location).into())
                }
            }
        }
    }

    /// Resolve a variable declaration's initialiser against its declared
    /// type, fixing unsized-array sizes from the source.
    fn resolve_variable(&mut self, id: VarId) -> CompileResult<()> {
        let var = self.ast.variable(id).clone();

        let Some(init) = var.initial_value else {
            return Ok(());
        };

        if let Some(declared) = var.declared_type {
            let Some(dest_type) = self.ast.resolve_as_type(declared) else {
                return Ok(());
            };

            let dest_type = if dest_type.is_unsized_array() {
                match find_size_of_array(self.ast, init) {
                    Some(size) => match dest_type.with_array_size(size) {
                        Ok(t) => t,
                        Err(_) => {
                            return Err(errors::illegal_array_size(var.context.location).into())
                        }
                    },
                    None => return Ok(()),
                }
            } else {
                dest_type
            };

            self.give_initial_value_explicit_type(id, init, dest_type);
            return Ok(());
        }

        // `let x = ...` with an unsized-array initialiser fixes the size
        // from the source.
        if self.ast.is_resolved_as_value(init) {
            if let Some(t) = self.ast.result_type(init) {
                if t.is_unsized_array() {
                    let size = find_size_of_array(self.ast, init).unwrap_or(1);
                    if let Ok(fixed) = t.with_array_size(size) {
                        self.give_initial_value_explicit_type(id, init, fixed);
                    }
                }
            }
        } else if self.ast.is_resolved_as_type(init) {
            return Err(errors::expected_value(self.ast.expr_context(init).location).into());
        }

        Ok(())
    }

    fn give_initial_value_explicit_type(&mut self, var: VarId, init: ExprId, dest: Type) {
        let already_typed = self
            .ast
            .result_type(init)
            .map_or(false, |t| t.is_identical(&dest));

        if !already_typed {
            let context = self.ast.expr_context(init);
            let node = self.ast.expr(init).clone();
            let inner = self.ast.alloc_expr(node, context);
            self.ast.replace_expr(
                init,
                Expr::TypeCast {
                    target: dest.without_reference_and_const(),
                    source: inner,
                },
            );
        }

        self.ast.variable_mut(var).declared_type = None;
        self.items_replaced += 1;
    }
}

/// Infer the element count an initialiser provides.
fn find_size_of_array(ast: &AstAllocator, value: ExprId) -> Option<u64> {
    if ast.is_resolved_as_value(value) {
        if let Some(t) = ast.result_type(value) {
            if t.is_fixed_size_array() {
                return t.array_size();
            }
        }
    }

    match ast.expr(value) {
        Expr::CommaSeparatedList { items } => {
            let n = items.len() as u64;
            Type::is_legal_array_size(n as i64).then_some(n)
        }
        Expr::TypeCast { target, source } => {
            if target.is_fixed_size_array() {
                return target.array_size();
            }
            if target.is_unsized_array() {
                return find_size_of_array(ast, *source);
            }
            None
        }
        Expr::CallOrCast { name_or_type, .. } => {
            let t = ast.resolve_as_type(*name_or_type)?;
            if t.is_fixed_size_array() {
                t.array_size()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Evaluate a type meta-function to a value (sizes and `is*` queries).
fn meta_value(ast: &AstAllocator, id: ExprId) -> Option<Value> {
    let t = ast.result_type(id)?;
    // The query layer computed the value type; re-derive the value itself.
    match ast.expr(id) {
        Expr::TypeMetaFunction { op, source } => {
            let source_type = ast
                .resolve_as_type(*source)
                .or_else(|| ast.result_type(*source))?;
            use soul_ir::ast::TypeMetaOp::*;
            let size_type = t;
            let v = match op {
                Size => {
                    let size = source_type
                        .array_or_vector_size()
                        .map(|s| s as i64)
                        .or_else(|| source_type.bounded_int_limit())?;
                    if size_type.is_integer64() {
                        Value::int64(size)
                    } else {
                        Value::int32(size as i32)
                    }
                }
                IsStruct => Value::bool(source_type.is_struct()),
                IsArray => Value::bool(source_type.is_array()),
                IsVector => Value::bool(source_type.is_vector()),
                IsPrimitive => Value::bool(source_type.is_primitive()),
                IsFloat => Value::bool(source_type.is_primitive_float()),
                IsInt => Value::bool(source_type.is_integer()),
                IsScalar => Value::bool(source_type.is_scalar()),
                IsString => Value::bool(source_type.is_string_literal()),
                IsBool => Value::bool(source_type.is_bool()),
                IsReference => Value::bool(source_type.is_reference),
                IsConst => Value::bool(source_type.is_const),
                _ => return None,
            };
            Some(v)
        }
        _ => None,
    }
}

impl<'a> RewritingVisitor for TypeResolver<'a> {
    type Error = CompileError;

    fn ast_mut(&mut self) -> &mut AstAllocator {
        self.ast
    }

    scope_tracked_visits!();

    fn visit_variable(&mut self, id: VarId) -> CompileResult<()> {
        rewalk_variable(self, id)?;
        self.resolve_variable(id)
    }

    fn visit_expr(&mut self, id: ExprId) -> CompileResult<()> {
        rewalk_expr(self, id)?;

        match self.ast.expr(id).clone() {
            Expr::SubscriptWithBrackets { .. } => self.resolve_bracket_subscript(id),
            Expr::SubscriptWithChevrons { .. } => self.resolve_chevron_subscript(id),
            Expr::TypeMetaFunction { .. } => self.resolve_meta_function(id),

            Expr::TypeCast { target, source } => {
                // An unsized-array cast takes its size from a list source.
                if target.is_unsized_array() {
                    if let Expr::CommaSeparatedList { items } = self.ast.expr(source) {
                        let n = items.len() as u64;
                        if n > 0 {
                            if let Ok(sized) = target.with_array_size(n) {
                                self.ast
                                    .replace_expr(id, Expr::TypeCast { target: sized, source });
                                self.items_replaced += 1;
                            }
                        }
                    } else if let Some(c) = self.ast.get_as_constant(source) {
                        if let Ok(sized) = target.with_array_size(1) {
                            if TypeRules::can_silently_cast_value(&sized, c) {
                                self.ast
                                    .replace_expr(id, Expr::TypeCast { target: sized, source });
                                self.items_replaced += 1;
                            }
                        }
                    }
                }
                Ok(())
            }

            Expr::BinaryOp { op, lhs, rhs } => {
                if self.ast.is_output_endpoint(lhs) {
                    // Stream writes are converted by the next pass.
                    self.num_fails += 1;
                    return Ok(());
                }
                if self.ast.is_readable_value(lhs) && self.ast.is_readable_value(rhs) {
                    if self.ast.binary_expr_types(id).is_none() && !self.ignore_errors {
                        let lhs_type = self
                            .ast
                            .result_type(lhs)
                            .map(|t| t.describe(&self.ast.structs))
                            .unwrap_or_default();
                        let rhs_type = self
                            .ast
                            .result_type(rhs)
                            .map(|t| t.describe(&self.ast.structs))
                            .unwrap_or_default();
                        return Err(errors::illegal_types_for_binary_operator(
                            self.ast.expr_context(id).location,
                            op.symbol(),
                            &lhs_type,
                            &rhs_type,
                        )
                        .into());
                    }
                }
                Ok(())
            }

            Expr::ArrayElementRef { .. } => {
                if !self.ignore_errors {
                    sanity::check_array_subscript(self.ast, id)?;
                }
                Ok(())
            }

            _ => Ok(()),
        }
    }
}
