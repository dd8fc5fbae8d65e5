//! Qualified-identifier resolution.
//!
//! Replaces unresolved name references with variable, processor,
//! endpoint, or type references, or the built-in constants (`pi`,
//! `twoPi`, `nan`, `inf`). Name lookup walks outward through lexical
//! scopes, stopping at the first scope containing a hit; multiple hits in
//! one scope are an ambiguity error. The pass also disambiguates dot
//! operators (struct members vs type meta-functions) and converts
//! call-or-cast nodes whose name resolves to a type.

use crate::lookup::{self, FoundItem, NameSearch, ScopeStack};
use crate::passes::{convert_to_cast, scope_tracked_visits};
use rustc_hash::FxHashSet;
use soul_diagnostic::{errors, CompileError, CompileResult};
use soul_ir::ast::visit::{rewalk_expr, RewritingVisitor};
use soul_ir::ast::{AstAllocator, Expr, ExprId, IdentifierPath, ModuleId, TypeMetaOp, VarId};
use soul_ir::types::Type;
use soul_ir::value::Value;

pub(crate) struct QualifiedIdentifierResolver<'a> {
    pub ast: &'a mut AstAllocator,
    pub module: ModuleId,
    pub ignore_errors: bool,
    pub scopes: ScopeStack,
    pub num_fails: usize,
    pub items_replaced: usize,
    num_variables_resolved: usize,
}

impl<'a> QualifiedIdentifierResolver<'a> {
    pub fn new(ast: &'a mut AstAllocator, module: ModuleId, ignore_errors: bool) -> Self {
        QualifiedIdentifierResolver {
            ast,
            module,
            ignore_errors,
            scopes: ScopeStack::new(module),
            num_fails: 0,
            items_replaced: 0,
            num_variables_resolved: 0,
        }
    }

    pub fn perform(&mut self) -> CompileResult<()> {
        self.visit_module_content(self.module)?;

        // Newly resolved variable references may have formed initialiser
        // cycles.
        if self.num_variables_resolved > 0 {
            check_recursive_variable_initialisers(self.ast)?;
        }
        Ok(())
    }

    fn resolve_path(&mut self, id: ExprId, path: &IdentifierPath) -> CompileResult<()> {
        let search = NameSearch::for_identifier(path.clone());
        let found = lookup::perform_search(self.ast, &self.scopes, &search);
        let context = self.ast.expr_context(id);

        if found.len() == 1 {
            match found[0] {
                FoundItem::Variable(v) => {
                    self.ast.replace_expr(id, Expr::VariableRef(v));
                    self.num_variables_resolved += 1;
                    self.items_replaced += 1;
                    return Ok(());
                }
                FoundItem::Module(m) => {
                    if self.ast.module(m).is_processor_or_graph() {
                        self.ast.replace_expr(id, Expr::ProcessorRef(m));
                        self.items_replaced += 1;
                        return Ok(());
                    }
                    // A bare namespace name is not an expression.
                }
                FoundItem::Endpoint(e) => {
                    let replacement = if self.ast.endpoint(e).is_input {
                        Expr::InputEndpointRef(e)
                    } else {
                        Expr::OutputEndpointRef(e)
                    };
                    self.ast.replace_expr(id, replacement);
                    self.items_replaced += 1;
                    return Ok(());
                }
                FoundItem::StructDecl(s) => {
                    if let Some(struct_id) = self.ast.struct_decl(s).resolved {
                        self.ast
                            .replace_expr(id, Expr::ConcreteType(Type::structure(struct_id)));
                        self.items_replaced += 1;
                        return Ok(());
                    }
                    // The struct has unresolved members; try again next
                    // iteration.
                    self.num_fails += 1;
                    return Ok(());
                }
                FoundItem::Using(u) => {
                    if let Some(target) = self.ast.using(u).target {
                        if let Some(t) = self.ast.resolve_as_type(target) {
                            self.ast.replace_expr(id, Expr::ConcreteType(t));
                            self.items_replaced += 1;
                            return Ok(());
                        }
                    }
                    self.num_fails += 1;
                    return Ok(());
                }
                FoundItem::BoundWildcard { function, index } => {
                    let t = self.ast.function(function).generic_specialisations[index]
                        .1
                        .clone();
                    self.ast.replace_expr(id, Expr::ConcreteType(t));
                    self.items_replaced += 1;
                    return Ok(());
                }
                FoundItem::Function(_) => {
                    // Function names resolve at call sites only.
                }
            }
        }

        if found.is_empty() {
            if let Some(constant) = self.built_in_constant(path) {
                self.ast.replace_expr(id, Expr::Constant(constant));
                self.items_replaced += 1;
                return Ok(());
            }
        }

        if !self.ignore_errors {
            // `wrap` and `clamp` behave as type constructors elsewhere;
            // leave them for the type resolver's diagnostics.
            if path.is_unqualified_name(self.ast.names.wrap)
                || path.is_unqualified_name(self.ast.names.clamp)
            {
                return Ok(());
            }

            let name = path.to_string(&self.ast.interner);
            if found.len() > 1 {
                return Err(errors::ambiguous_symbol(context.location, &name).into());
            }
            return Err(errors::unresolved_symbol(context.location, &name).into());
        }

        self.num_fails += 1;
        Ok(())
    }

    fn built_in_constant(&self, path: &IdentifierPath) -> Option<Value> {
        let names = &self.ast.names;
        if path.is_unqualified_name(names.pi) {
            return Some(Value::float64(std::f64::consts::PI));
        }
        if path.is_unqualified_name(names.two_pi) {
            return Some(Value::float64(std::f64::consts::TAU));
        }
        if path.is_unqualified_name(names.nan) {
            return Some(Value::float32(f32::NAN));
        }
        if path.is_unqualified_name(names.inf) {
            return Some(Value::float32(f32::INFINITY));
        }
        None
    }

    /// Disambiguate `lhs.rhs` once the left side is resolved.
    fn resolve_dot(&mut self, id: ExprId) -> CompileResult<()> {
        let (lhs, rhs) = match self.ast.expr(id) {
            Expr::DotOperator { lhs, rhs } => (*lhs, rhs.clone()),
            _ => return Ok(()),
        };
        let context = self.ast.expr_context(id);

        let meta_op = if rhs.is_unqualified() {
            TypeMetaOp::from_name(&self.ast.interner.lookup(rhs.first_part()))
        } else {
            None
        };

        if self.ast.is_resolved_as_type(lhs) {
            if let Some(op) = meta_op {
                self.ast
                    .replace_expr(id, Expr::TypeMetaFunction { op, source: lhs });
                self.items_replaced += 1;
                return Ok(());
            }
        } else if self.ast.is_resolved_as_value(lhs) {
            let lhs_type = self.ast.result_type(lhs);

            if let Some(struct_id) = lhs_type.as_ref().and_then(Type::struct_ref) {
                if rhs.is_unqualified() {
                    let member_name = self.ast.interner.lookup(rhs.first_part());
                    let structure = self.ast.structs.get(struct_id);
                    if let Some(index) = structure.member_index(&member_name) {
                        self.ast.replace_expr(
                            id,
                            Expr::StructMemberRef {
                                object: lhs,
                                structure: struct_id,
                                member_index: index,
                            },
                        );
                        self.items_replaced += 1;
                        return Ok(());
                    }
                    if !self.ignore_errors {
                        let struct_name = structure.name.clone();
                        return Err(errors::unknown_member_in_struct(
                            context.location,
                            &member_name,
                            &struct_name,
                        )
                        .into());
                    }
                }
            }

            if let Some(op) = meta_op {
                self.ast
                    .replace_expr(id, Expr::TypeMetaFunction { op, source: lhs });
                self.items_replaced += 1;
                return Ok(());
            }
        } else if self.ast.is_output_endpoint(lhs) {
            return Err(errors::no_such_operation_on_endpoint(context.location).into());
        } else if self.ast.is_resolved_as_processor(lhs) {
            return Err(errors::no_such_operation_on_processor(context.location).into());
        }

        if self.ignore_errors {
            self.num_fails += 1;
            Ok(())
        } else {
            Err(errors::invalid_dot_arguments(context.location).into())
        }
    }
}

impl<'a> RewritingVisitor for QualifiedIdentifierResolver<'a> {
    type Error = CompileError;

    fn ast_mut(&mut self) -> &mut AstAllocator {
        self.ast
    }

    scope_tracked_visits!();

    fn visit_expr(&mut self, id: ExprId) -> CompileResult<()> {
        // A call's name must not resolve through the ordinary identifier
        // path (it would find variables); only its arguments are visited
        // here, and the name is handled below or by the function
        // resolver.
        if let Expr::CallOrCast {
            name_or_type, args, ..
        } = self.ast.expr(id).clone()
        {
            if let Some(args) = args {
                self.visit_expr(args)?;
            }
            if !matches!(self.ast.expr(name_or_type), Expr::QualifiedIdentifier(_)) {
                self.visit_expr(name_or_type)?;
            }

            let args_resolved = args.map_or(true, |a| self.ast.is_resolved_expr(a));
            if args_resolved {
                if let Some(t) = self.ast.resolve_as_type(name_or_type) {
                    convert_to_cast(self.ast, id, t);
                    self.items_replaced += 1;
                    return Ok(());
                }

                // A name that resolves to a type makes this a cast.
                if let Expr::QualifiedIdentifier(path) = self.ast.expr(name_or_type).clone() {
                    let search = NameSearch {
                        path,
                        stop_at_first_scope_with_results: true,
                        required_num_function_args: None,
                        find_variables: false,
                        find_types: true,
                        find_functions: false,
                        find_processors_and_namespaces: false,
                        find_endpoints: false,
                    };
                    let found = lookup::perform_search(self.ast, &self.scopes, &search);
                    if found.len() == 1 {
                        let target = match found[0] {
                            FoundItem::StructDecl(s) => self
                                .ast
                                .struct_decl(s)
                                .resolved
                                .map(Type::structure),
                            FoundItem::Using(u) => self
                                .ast
                                .using(u)
                                .target
                                .and_then(|t| self.ast.resolve_as_type(t)),
                            FoundItem::BoundWildcard { function, index } => Some(
                                self.ast.function(function).generic_specialisations[index]
                                    .1
                                    .clone(),
                            ),
                            _ => None,
                        };
                        if let Some(target) = target {
                            convert_to_cast(self.ast, id, target);
                            self.items_replaced += 1;
                        }
                    }
                }
            }
            return Ok(());
        }

        rewalk_expr(self, id)?;

        match self.ast.expr(id).clone() {
            Expr::QualifiedIdentifier(path) => self.resolve_path(id, &path),
            Expr::DotOperator { .. } => self.resolve_dot(id),
            Expr::ArrayElementRef { .. } => {
                if self.ast.is_resolved_expr(id) {
                    crate::sanity::check_array_subscript(self.ast, id)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Detect variables whose initialisers refer back to themselves, directly
/// or through other variables.
fn check_recursive_variable_initialisers(ast: &AstAllocator) -> CompileResult<()> {
    fn walk(
        ast: &AstAllocator,
        e: ExprId,
        stack: &mut Vec<VarId>,
        done: &mut FxHashSet<VarId>,
    ) -> CompileResult<()> {
        if let Expr::VariableRef(v) = ast.expr(e) {
            return visit_variable(ast, *v, stack, done);
        }
        let mut result = Ok(());
        crate::sanity::for_each_child(ast.expr(e), |child| {
            if result.is_ok() {
                result = walk(ast, child, stack, done);
            }
        });
        result
    }

    fn visit_variable(
        ast: &AstAllocator,
        v: VarId,
        stack: &mut Vec<VarId>,
        done: &mut FxHashSet<VarId>,
    ) -> CompileResult<()> {
        if done.contains(&v) {
            return Ok(());
        }
        if stack.contains(&v) {
            let var = ast.variable(v);
            return Err(errors::initialiser_refers_to_target(
                var.context.location,
                &ast.interner.lookup(var.name),
            )
            .into());
        }
        if let Some(init) = ast.variable(v).initial_value {
            stack.push(v);
            walk(ast, init, stack, done)?;
            stack.pop();
        }
        done.insert(v);
        Ok(())
    }

    let mut done = FxHashSet::default();
    for v in ast.variable_ids() {
        visit_variable(ast, v, &mut Vec::new(), &mut done)?;
    }
    Ok(())
}
