//! Structural and semantic sanity checks.
//!
//! Run in two waves: [`run_pre_resolution`] immediately after parsing
//! (overall module structure), and [`run_post_resolution`] once a module
//! is fully resolved (duplicate names, type rules that need resolved
//! types, graph cycles, and the pre/post-increment collision check).
//! Recursive type declarations are checked separately by the engine
//! before the fixpoint, since an unresolvable cycle would otherwise stall
//! it with a misleading unresolved-symbol error.

use crate::lookup::{self, FoundItem, NameSearch, ScopeStack};
use rustc_hash::{FxHashMap, FxHashSet};
use soul_diagnostic::{errors, CompileError, CompileResult, DiagnosticList};
use soul_ir::ast::visit::{self, Visitor};
use soul_ir::ast::{
    AstAllocator, BlockId, Context, EndpointId, Expr, ExprId, FuncId, IdentifierPath, Module,
    ModuleId, ModuleKind, Stmt, StmtId, StructDeclId, UsingId, VarId,
};
use soul_ir::endpoint::EndpointKind;
use soul_ir::types::{StructStore, Type, TypeRules, MAX_PACKED_OBJECT_SIZE};
use soul_ir::value::Value;
use soul_ir::{BinaryOperator, Name, SourceRef};

/// Longest permitted delay line.
pub const MAX_DELAY_LINE_LENGTH: i64 = 65536;

/// Largest endpoint or processor-instance array.
pub const MAX_ENDPOINT_ARRAY_SIZE: i64 = 65536;

// ---- pre-resolution ----

/// High-level structure checks after the initial parse: every processor
/// needs an output and exactly one parameterless void run() function.
pub fn run_pre_resolution(ast: &AstAllocator, module: ModuleId) -> CompileResult<()> {
    let m = ast.module(module);

    if m.is_processor_or_graph() && m.outputs.is_empty() {
        return Err(errors::processor_needs_an_output(m.context.location).into());
    }

    if m.is_processor() {
        let mut num_run_functions = 0;
        for &f in &m.functions {
            if !ast.is_run_function(f) {
                continue;
            }
            let function = ast.function(f);
            match ast.resolve_as_type(function.return_type) {
                Some(t) if t.is_void() => {}
                _ => {
                    return Err(errors::run_function_must_be_void(
                        function.context.location,
                    )
                    .into())
                }
            }
            if !function.parameters.is_empty() {
                return Err(errors::run_function_has_params(function.context.location).into());
            }
            num_run_functions += 1;
        }
        if num_run_functions == 0 {
            return Err(errors::processor_needs_run_function(m.context.location).into());
        }
        if num_run_functions > 1 {
            return Err(errors::multiple_run_functions(m.context.location).into());
        }
    }

    for &sub in &m.sub_modules {
        run_pre_resolution(ast, sub)?;
    }
    Ok(())
}

// ---- recursive type declarations ----

/// Reject `struct A { A a; }` and mutually recursive structs or usings.
/// Works on the unresolved declarations, because a recursive type can
/// never finish resolving.
pub fn check_recursive_type_declarations(
    ast: &AstAllocator,
    module: ModuleId,
) -> CompileResult<()> {
    #[derive(Copy, Clone, PartialEq, Eq, Hash)]
    enum TypeDecl {
        Struct(StructDeclId),
        Using(UsingId),
    }

    struct Checker<'a> {
        ast: &'a AstAllocator,
        module: ModuleId,
        stack: Vec<TypeDecl>,
        finished: FxHashSet<TypeDecl>,
    }

    impl<'a> Checker<'a> {
        fn decl_name(&self, decl: TypeDecl) -> Name {
            match decl {
                TypeDecl::Struct(s) => self.ast.struct_decl(s).name,
                TypeDecl::Using(u) => self.ast.using(u).name,
            }
        }

        fn decl_context(&self, decl: TypeDecl) -> Context {
            match decl {
                TypeDecl::Struct(s) => self.ast.struct_decl(s).context,
                TypeDecl::Using(u) => self.ast.using(u).context,
            }
        }

        fn visit(&mut self, decl: TypeDecl) -> CompileResult<()> {
            if self.finished.contains(&decl) {
                return Ok(());
            }

            if let Some(position) = self.stack.iter().position(|d| *d == decl) {
                let name = self.ast.interner.lookup(self.decl_name(decl));
                let location = self.decl_context(decl).location;
                // Self-reference and mutual reference read differently.
                if position == self.stack.len() - 1 {
                    return Err(errors::type_contains_itself(location, &name).into());
                }
                let other = self.ast.interner.lookup(self.decl_name(self.stack[self.stack.len() - 1]));
                return Err(errors::types_refer_to_each_other(location, &name, &other).into());
            }

            self.stack.push(decl);

            let type_exprs: Vec<ExprId> = match decl {
                TypeDecl::Struct(s) => self
                    .ast
                    .struct_decl(s)
                    .members
                    .iter()
                    .map(|m| m.type_expr)
                    .collect(),
                TypeDecl::Using(u) => self.ast.using(u).target.into_iter().collect(),
            };

            for e in type_exprs {
                self.visit_type_expr(e)?;
            }

            self.stack.pop();
            self.finished.insert(decl);
            Ok(())
        }

        fn visit_type_expr(&mut self, e: ExprId) -> CompileResult<()> {
            match self.ast.expr(e) {
                Expr::QualifiedIdentifier(path) => {
                    if let Some(decl) = self.find_type_decl(path) {
                        self.visit(decl)?;
                    }
                }
                Expr::SubscriptWithBrackets { lhs, .. }
                | Expr::SubscriptWithChevrons { lhs, .. } => self.visit_type_expr(*lhs)?,
                Expr::TypeMetaFunction { source, .. } => self.visit_type_expr(*source)?,
                _ => {}
            }
            Ok(())
        }

        fn find_type_decl(&self, path: &IdentifierPath) -> Option<TypeDecl> {
            let scopes = ScopeStack::new(self.module);
            let search = NameSearch {
                path: path.clone(),
                stop_at_first_scope_with_results: true,
                required_num_function_args: None,
                find_variables: false,
                find_types: true,
                find_functions: false,
                find_processors_and_namespaces: false,
                find_endpoints: false,
            };
            let found = lookup::perform_search(self.ast, &scopes, &search);
            found.into_iter().find_map(|item| match item {
                FoundItem::StructDecl(s) => Some(TypeDecl::Struct(s)),
                FoundItem::Using(u) => Some(TypeDecl::Using(u)),
                _ => None,
            })
        }
    }

    let mut checker = Checker {
        ast,
        module,
        stack: Vec::new(),
        finished: FxHashSet::default(),
    };

    let m = ast.module(module);
    for &s in &m.structs {
        checker.visit(TypeDecl::Struct(s))?;
    }
    for &u in &m.usings {
        checker.visit(TypeDecl::Using(u))?;
    }
    Ok(())
}

// ---- post-resolution ----

/// Full rule set over one resolved module (sub-modules are checked by
/// their own calls). Warnings go to `diagnostics`.
pub fn run_post_resolution(
    ast: &AstAllocator,
    module: ModuleId,
    diagnostics: &mut DiagnosticList,
) -> CompileResult<()> {
    run_duplicate_name_checks(ast, module)?;
    let mut checks = PostResolutionChecks { ast, diagnostics };
    checks.visit_module_content(module)?;
    check_module_structure(ast, module)?;
    PreAndPostIncCheck { ast }.check_module(module)?;
    Ok(())
}

// ---- duplicate names ----

struct DuplicateNameScope {
    names: FxHashMap<Name, Context>,
}

impl DuplicateNameScope {
    fn new() -> Self {
        DuplicateNameScope {
            names: FxHashMap::default(),
        }
    }

    fn check(&mut self, ast: &AstAllocator, name: Name, context: Context) -> CompileResult<()> {
        if self.names.insert(name, context).is_some() {
            return Err(
                errors::duplicate_name(context.location, &ast.interner.lookup(name)).into(),
            );
        }
        Ok(())
    }

    /// Functions may overload each other, but not collide with anything
    /// else in scope.
    fn check_without_adding(
        &self,
        ast: &AstAllocator,
        name: Name,
        context: Context,
    ) -> CompileResult<()> {
        if self.names.contains_key(&name) {
            return Err(
                errors::duplicate_name(context.location, &ast.interner.lookup(name)).into(),
            );
        }
        Ok(())
    }
}

fn run_duplicate_name_checks(ast: &AstAllocator, module: ModuleId) -> CompileResult<()> {
    let m = ast.module(module);
    let mut scope = DuplicateNameScope::new();

    for &io in m.inputs.iter().chain(m.outputs.iter()) {
        let e = ast.endpoint(io);
        scope.check(ast, e.name, e.context)?;
    }

    if !m.is_graph() {
        for &v in &m.state_variables {
            let var = ast.variable(v);
            scope.check(ast, var.name, var.context)?;
        }
        for &s in &m.structs {
            let decl = ast.struct_decl(s);
            scope.check(ast, decl.name, decl.context)?;
        }
        for &u in &m.usings {
            let decl = ast.using(u);
            scope.check(ast, decl.name, decl.context)?;
        }
        for &sub in &m.sub_modules {
            let decl = ast.module(sub);
            scope.check(ast, decl.name, decl.context)?;
        }

        // Functions are scanned last: overloads share a name with each
        // other but with nothing else. Event handlers instead must match
        // a declared event input.
        for &f in &m.functions {
            let function = ast.function(f);
            if function.is_event_handler {
                let has_input = m.inputs.iter().any(|&io| {
                    let e = ast.endpoint(io);
                    e.name == function.name && e.kind == EndpointKind::Event
                });
                if !has_input {
                    return Err(errors::no_such_input_event(
                        function.context.location,
                        &ast.interner.lookup(function.name),
                    )
                    .into());
                }
            } else {
                scope.check_without_adding(ast, function.name, function.name_context)?;
            }
        }
    }

    // Duplicate overloads with matching parameter types.
    check_for_duplicate_functions(ast, &m.functions)?;

    let mut walker = DuplicateNamesInBodies { ast };
    walker.visit_module_content(module)
}

fn check_for_duplicate_functions(ast: &AstAllocator, functions: &[FuncId]) -> CompileResult<()> {
    let mut signatures: Vec<String> = Vec::new();
    for &f in functions {
        let function = ast.function(f);
        if function.is_generic() || function.original_generic.is_some() {
            continue;
        }
        if let Some(sig) = ast.function_signature(f) {
            if signatures.contains(&sig) {
                return Err(errors::duplicate_function(
                    function.name_context.location,
                    &ast.interner.lookup(function.name),
                )
                .into());
            }
            signatures.push(sig);
        }
    }
    Ok(())
}

/// Checks duplicate names inside blocks, parameter lists, struct members,
/// and annotations.
struct DuplicateNamesInBodies<'a> {
    ast: &'a AstAllocator,
}

impl<'a> Visitor for DuplicateNamesInBodies<'a> {
    type Error = CompileError;

    fn ast(&self) -> &AstAllocator {
        self.ast
    }

    fn visit_block(&mut self, id: BlockId) -> CompileResult<()> {
        let mut scope = DuplicateNameScope::new();
        for &s in &self.ast.block(id).statements {
            if let Stmt::VariableDeclaration(v) = self.ast.stmt(s) {
                let var = self.ast.variable(*v);
                scope.check(self.ast, var.name, var.context)?;
            }
        }
        visit::walk_block(self, id)
    }

    fn visit_function(&mut self, id: FuncId) -> CompileResult<()> {
        let mut scope = DuplicateNameScope::new();
        for &p in &self.ast.function(id).parameters {
            let var = self.ast.variable(p);
            scope.check(self.ast, var.name, var.context)?;
        }
        if self.ast.function(id).is_generic() {
            return Ok(());
        }
        visit::walk_function(self, id)
    }

    fn visit_module_content(&mut self, id: ModuleId) -> CompileResult<()> {
        for &s in &self.ast.module(id).structs {
            let decl = self.ast.struct_decl(s);
            let mut scope = DuplicateNameScope::new();
            for member in &decl.members {
                scope.check(self.ast, member.name, member.context)?;
            }
        }

        check_annotation_keys(self.ast, id)?;
        visit::walk_module_content(self, id)
    }
}

fn check_annotation_keys(ast: &AstAllocator, module: ModuleId) -> CompileResult<()> {
    let m = ast.module(module);
    let mut check = |annotation: &soul_ir::ast::Annotation| -> CompileResult<()> {
        let mut scope = DuplicateNameScope::new();
        for p in &annotation.properties {
            scope.check(ast, p.name, p.context)?;
        }
        Ok(())
    };

    check(&m.annotation)?;
    for &io in m.inputs.iter().chain(m.outputs.iter()) {
        check(&ast.endpoint(io).annotation)?;
    }
    for &f in &m.functions {
        check(&ast.function(f).annotation)?;
    }
    for &v in &m.state_variables {
        check(&ast.variable(v).annotation)?;
    }
    Ok(())
}

// ---- cast checks, shared with the passes and the generator ----

/// Check a silent cast is possible, recursing into initialiser lists:
/// aggregate targets need an exact element count and element-wise
/// castability.
pub fn expect_silent_cast_possible(
    ast: &AstAllocator,
    location: SourceRef,
    target: &Type,
    source: ExprId,
) -> CompileResult<()> {
    if let Expr::CommaSeparatedList { items } = ast.expr(source) {
        let items = items.clone();
        throw_if_wrong_number_of_elements(ast, location, target, items.len())?;

        if target.is_array_or_vector() {
            let element = target.element_type().expect("aggregate has element type");
            for i in items {
                expect_silent_cast_possible(ast, ast.expr_context(i).location, &element, i)?;
            }
            return Ok(());
        }

        if let Some(struct_id) = target.struct_ref() {
            let members = ast.structs.get(struct_id).members.clone();
            for (i, member) in items.iter().zip(members.iter()) {
                expect_silent_cast_possible(ast, ast.expr_context(*i).location, &member.ty, *i)?;
            }
            return Ok(());
        }

        return Err(
            errors::cannot_cast_list_to_type(location, &target.describe(&ast.structs)).into(),
        );
    }

    if can_expr_silently_cast_to(ast, source, target) {
        return Ok(());
    }

    let source_type = ast
        .result_type(source)
        .map(|t| t.describe(&ast.structs))
        .unwrap_or_else(|| "<unresolved>".to_string());

    if let Some(c) = ast.get_as_constant(source) {
        if c.get_type().is_primitive() {
            return Err(errors::cannot_implicitly_cast_value(
                location,
                &c.describe(),
                &source_type,
                &target.describe(&ast.structs),
            )
            .into());
        }
    }

    Err(errors::cannot_implicitly_cast_type(
        location,
        &source_type,
        &target.describe(&ast.structs),
    )
    .into())
}

/// Multi-type form for event endpoints: an exact match wins outright;
/// otherwise exactly one silent cast must apply.
pub fn expect_silent_cast_possible_multi(
    ast: &AstAllocator,
    location: SourceRef,
    targets: &[Type],
    source: ExprId,
) -> CompileResult<()> {
    if targets.len() == 1 {
        return expect_silent_cast_possible(ast, location, &targets[0], source);
    }

    let source_type = ast.result_type(source);

    if let Some(source_type) = &source_type {
        if targets
            .iter()
            .any(|t| source_type.is_equal_ignoring_vector_size1(t))
        {
            return Ok(());
        }
    }

    let matches = targets
        .iter()
        .filter(|t| can_expr_silently_cast_to(ast, source, t))
        .count();

    let source_description = source_type
        .map(|t| t.describe(&ast.structs))
        .unwrap_or_else(|| "<unresolved>".to_string());

    match matches {
        0 => Err(errors::cannot_implicitly_cast_type(
            location,
            &source_description,
            &TypeRules::describe_types(targets, &ast.structs),
        )
        .into()),
        1 => Ok(()),
        _ => Err(errors::ambiguous_cast_between(
            location,
            &source_description,
            &TypeRules::describe_types(targets, &ast.structs),
        )
        .into()),
    }
}

/// Value-aware silent-castability of an expression.
pub fn can_expr_silently_cast_to(ast: &AstAllocator, source: ExprId, target: &Type) -> bool {
    if let Some(c) = ast.get_as_constant(source) {
        return TypeRules::can_silently_cast_value(target, c);
    }
    match ast.result_type(source) {
        Some(t) => TypeRules::can_silently_cast_to(target, &t),
        None => false,
    }
}

pub fn throw_if_wrong_number_of_elements(
    ast: &AstAllocator,
    location: SourceRef,
    ty: &Type,
    available: usize,
) -> CompileResult<()> {
    if let Some(n) = ty.num_aggregate_elements(&ast.structs) {
        if n != available as u64 {
            return Err(
                errors::wrong_num_args_for_aggregate(location, &ty.describe(&ast.structs)).into(),
            );
        }
    }
    Ok(())
}

/// Readable value check with specific messages for endpoints and
/// processors.
pub fn throw_if_not_readable_value(ast: &AstAllocator, e: ExprId) -> CompileResult<()> {
    if ast.is_readable_value(e) {
        return Ok(());
    }
    let location = ast.expr_context(e).location;
    match ast.expr(e) {
        Expr::OutputEndpointRef(_) => Err(errors::cannot_read_from_output(location).into()),
        Expr::InputEndpointRef(_) => Err(errors::event_endpoint_cannot_be_read(location).into()),
        Expr::ProcessorRef(_) => Err(errors::cannot_use_processor_as_output(location).into()),
        _ => Err(errors::expected_value(location).into()),
    }
}

pub fn throw_if_not_readable_type(ast: &AstAllocator, e: ExprId) -> CompileResult<()> {
    if ast.is_resolved_as_type(e) {
        return Ok(());
    }
    let location = ast.expr_context(e).location;
    match ast.expr(e) {
        Expr::ProcessorRef(_) => Err(errors::cannot_use_processor_as_type(location).into()),
        _ => Err(errors::expected_type(location).into()),
    }
}

/// A subscripted object must be an array or vector (output endpoints are
/// checked at write sites instead).
pub fn check_array_subscript(ast: &AstAllocator, subscript: ExprId) -> CompileResult<()> {
    let Expr::ArrayElementRef { object, .. } = ast.expr(subscript) else {
        return Ok(());
    };
    let object = *object;

    if ast.is_output_endpoint(object) {
        return Ok(());
    }
    if matches!(ast.expr(object), Expr::InputEndpointRef(_)) {
        return Ok(());
    }

    throw_if_not_readable_value(ast, object)?;
    match ast.result_type(object) {
        Some(t) if t.without_reference_and_const().is_array_or_vector() => Ok(()),
        Some(_) => {
            Err(errors::expected_array_or_vector(ast.expr_context(object).location).into())
        }
        None => Ok(()), // not resolved yet; later passes re-check
    }
}

/// Validate a delay-line length constant: an integer in 1..=65536.
pub fn check_delay_line_length(location: SourceRef, v: &Value) -> CompileResult<i64> {
    if !v.get_type().is_primitive_integer() {
        return Err(errors::delay_line_must_have_int_length(location).into());
    }
    let value = v.get_as_i64().unwrap_or(0);
    if value < 1 {
        return Err(errors::delay_line_has_zero_length(location).into());
    }
    if value > MAX_DELAY_LINE_LENGTH {
        return Err(errors::delay_line_illegal_length(location).into());
    }
    Ok(value)
}

/// Multi-dimensional arrays are rejected wherever they could appear.
pub fn throw_if_multidimensional(
    structs: &StructStore,
    location: SourceRef,
    ty: &Type,
) -> CompileResult<()> {
    if ty.is_array() {
        let element = ty.element_type().expect("arrays have element types");
        if element.is_array() {
            return Err(errors::not_yet_implemented(location, "multi-dimensional arrays").into());
        }
        throw_if_multidimensional(structs, location, &element)?;
    }
    if let Some(id) = ty.struct_ref() {
        for member in structs.get(id).members.clone() {
            throw_if_multidimensional(structs, location, &member.ty)?;
        }
    }
    Ok(())
}

// ---- post-resolution visitor ----

struct PostResolutionChecks<'a> {
    ast: &'a AstAllocator,
    diagnostics: &'a mut DiagnosticList,
}

impl<'a> Visitor for PostResolutionChecks<'a> {
    type Error = CompileError;

    fn ast(&self) -> &AstAllocator {
        self.ast
    }

    fn visit_function(&mut self, id: FuncId) -> CompileResult<()> {
        let function = self.ast.function(id);
        if function.is_generic() {
            return Ok(());
        }
        for &p in &function.parameters {
            if let Some(t) = self.ast.variable_type(p) {
                if t.is_void() {
                    return Err(errors::parameter_cannot_be_void(
                        self.ast.variable(p).context.location,
                    )
                    .into());
                }
            }
        }
        visit::walk_function(self, id)
    }

    fn visit_variable(&mut self, id: VarId) -> CompileResult<()> {
        visit::walk_variable(self, id)?;
        let var = self.ast.variable(id);
        let location = var.context.location;

        match var.declared_type {
            Some(t) => throw_if_not_readable_type(self.ast, t)?,
            None => {
                if let Some(init) = var.initial_value {
                    throw_if_not_readable_value(self.ast, init)?;
                }
            }
        }

        if let Some(t) = self.ast.variable_type(id) {
            if t.is_void() {
                return Err(errors::void_variable(location).into());
            }
            if t.packed_size(&self.ast.structs) > MAX_PACKED_OBJECT_SIZE {
                return Err(errors::type_too_big(
                    location,
                    &format!("{} bytes", t.packed_size(&self.ast.structs)),
                    &format!("{MAX_PACKED_OBJECT_SIZE} bytes"),
                )
                .into());
            }
            throw_if_multidimensional(&self.ast.structs, location, &t)?;
        }

        Ok(())
    }

    fn visit_expr(&mut self, id: ExprId) -> CompileResult<()> {
        visit::walk_expr(self, id)?;

        match self.ast.expr(id) {
            Expr::UnaryOp { op, source } => {
                let suitable = match self.ast.result_type(*source) {
                    None => true,
                    Some(t) => {
                        let t = t.without_reference_and_const();
                        match op {
                            soul_ir::UnaryOperator::LogicalNot => t.is_bool(),
                            soul_ir::UnaryOperator::BitwiseNot => {
                                t.is_primitive_integer()
                            }
                            soul_ir::UnaryOperator::Negate => {
                                t.is_primitive_integer()
                                    || t.is_primitive_float()
                                    || t.is_vector()
                                    || t.is_bounded_int()
                            }
                        }
                    }
                };
                if !suitable {
                    return Err(errors::wrong_type_for_unary(
                        self.ast.expr_context(*source).location,
                    )
                    .into());
                }
            }

            Expr::BinaryOp { op, lhs, rhs } if op.is_comparison() => {
                self.check_bounded_comparison(id, *op, *lhs, *rhs);
            }

            _ => {}
        }
        Ok(())
    }
}

impl<'a> PostResolutionChecks<'a> {
    /// Comparing a constant against a bounded-int value whose whole range
    /// is on one side of the constant always gives the same answer.
    fn check_bounded_comparison(
        &mut self,
        id: ExprId,
        op: BinaryOperator,
        lhs: ExprId,
        rhs: ExprId,
    ) {
        let location = self.ast.expr_context(id).location;

        let (bounded, constant, constant_on_left) = if let Some(c) = self.ast.get_as_constant(lhs)
        {
            match self.ast.result_type(rhs) {
                Some(t) if t.is_bounded_int() => (t, c, true),
                _ => return,
            }
        } else if let Some(c) = self.ast.get_as_constant(rhs) {
            match self.ast.result_type(lhs) {
                Some(t) if t.is_bounded_int() => (t, c, false),
                _ => return,
            }
        } else {
            return;
        };

        let Some(limit) = bounded.bounded_int_limit() else {
            return;
        };
        let Some(c) = constant.get_as_i64() else {
            return;
        };

        // The bounded value is always within [0, limit).
        let (lo, hi) = (0i64, limit - 1);
        let mut verdict = |result: Option<bool>| match result {
            Some(true) => self
                .diagnostics
                .add(errors::comparison_always_true(location)),
            Some(false) => self
                .diagnostics
                .add(errors::comparison_always_false(location)),
            None => {}
        };

        // Normalise to `bounded OP constant`.
        let op = if constant_on_left {
            match op {
                BinaryOperator::LessThan => BinaryOperator::GreaterThan,
                BinaryOperator::LessThanOrEqual => BinaryOperator::GreaterThanOrEqual,
                BinaryOperator::GreaterThan => BinaryOperator::LessThan,
                BinaryOperator::GreaterThanOrEqual => BinaryOperator::LessThanOrEqual,
                other => other,
            }
        } else {
            op
        };

        match op {
            BinaryOperator::LessThan => verdict(if hi < c {
                Some(true)
            } else if lo >= c {
                Some(false)
            } else {
                None
            }),
            BinaryOperator::LessThanOrEqual => verdict(if hi <= c {
                Some(true)
            } else if lo > c {
                Some(false)
            } else {
                None
            }),
            BinaryOperator::GreaterThan => verdict(if lo > c {
                Some(true)
            } else if hi <= c {
                Some(false)
            } else {
                None
            }),
            BinaryOperator::GreaterThanOrEqual => verdict(if lo >= c {
                Some(true)
            } else if hi < c {
                Some(false)
            } else {
                None
            }),
            BinaryOperator::Equals => verdict(if c < lo || c > hi { Some(false) } else { None }),
            BinaryOperator::NotEquals => verdict(if c < lo || c > hi { Some(true) } else { None }),
            _ => {}
        }
    }
}

/// Module-level checks that are not per-node: endpoint sample types,
/// state-variable constants, graph cycles.
fn check_module_structure(ast: &AstAllocator, module: ModuleId) -> CompileResult<()> {
    let m = ast.module(module);

    for &io in m.inputs.iter().chain(m.outputs.iter()) {
        check_endpoint(ast, io)?;
    }

    match &m.kind {
        ModuleKind::Processor => {
            for &v in &m.state_variables {
                let var = ast.variable(v);
                if let Some(init) = var.initial_value {
                    if !ast.is_compile_time_constant(init) {
                        return Err(errors::expected_constant(
                            ast.expr_context(init).location,
                        )
                        .into());
                    }
                }
            }
        }
        ModuleKind::Namespace { .. } => {
            for &v in &m.state_variables {
                let var = ast.variable(v);
                if let Some(init) = var.initial_value {
                    if !ast.is_compile_time_constant(init) {
                        return Err(errors::non_const_in_namespace(
                            ast.expr_context(init).location,
                        )
                        .into());
                    }
                }
            }
        }
        ModuleKind::Graph {
            instances,
            connections,
        } => {
            for instance in instances {
                if let Some(size) = instance.array_size {
                    check_constant_array_size(ast, size)?;
                }
            }
            for connection in connections {
                if let Some(delay) = connection.delay_length {
                    throw_if_not_readable_value(ast, delay)?;
                    if let Some(c) = ast.get_as_constant(delay) {
                        check_delay_line_length(ast.expr_context(delay).location, c)?;
                    }
                }
            }
            check_graph_cycles(ast, module, m, instances, connections)?;
        }
    }

    // Annotation values must be primitive constants.
    check_annotation_values(ast, module)?;
    Ok(())
}

fn check_endpoint(ast: &AstAllocator, io: EndpointId) -> CompileResult<()> {
    let e = ast.endpoint(io);
    let location = e.context.location;

    let Some(types) = ast.endpoint_sample_types(io) else {
        return Err(errors::expected_type(location).into());
    };

    for t in &types {
        if t.is_void() || t.is_reference {
            return Err(errors::expected_type(location).into());
        }
        throw_if_multidimensional(&ast.structs, location, t)?;

        if e.kind != EndpointKind::Event {
            // Streams and values carry samples: primitives and vectors.
            if !(t.is_primitive() || t.is_vector() || t.is_bounded_int()) {
                return Err(errors::expected_type(location).into());
            }
        }
    }

    if let Some(size) = e.array_size {
        check_constant_array_size(ast, size)?;
    }
    Ok(())
}

fn check_constant_array_size(ast: &AstAllocator, size: ExprId) -> CompileResult<()> {
    let location = ast.expr_context(size).location;
    let Some(c) = ast.get_as_constant(size) else {
        return Err(errors::non_const_array_size(location).into());
    };
    if !c.get_type().is_integer() {
        return Err(errors::non_integer_array_size(location).into());
    }
    let v = c.get_as_i64().unwrap_or(0);
    if v < 1 || v > MAX_ENDPOINT_ARRAY_SIZE {
        return Err(errors::illegal_array_size(location).into());
    }
    Ok(())
}

fn check_annotation_values(ast: &AstAllocator, module: ModuleId) -> CompileResult<()> {
    let m = ast.module(module);
    let mut check = |annotation: &soul_ir::ast::Annotation| -> CompileResult<()> {
        for p in &annotation.properties {
            let location = ast.expr_context(p.value).location;
            if !ast.is_compile_time_constant(p.value) {
                return Err(errors::property_must_be_constant(location).into());
            }
            if let Some(t) = ast.result_type(p.value) {
                if !(t.is_primitive_float()
                    || t.is_primitive_integer()
                    || t.is_bool()
                    || t.is_string_literal())
                {
                    return Err(errors::illegal_property_type(location).into());
                }
            }
        }
        Ok(())
    };

    check(&m.annotation)?;
    for &io in m.inputs.iter().chain(m.outputs.iter()) {
        check(&ast.endpoint(io).annotation)?;
    }
    for &f in &m.functions {
        check(&ast.function(f).annotation)?;
    }
    for &v in &m.state_variables {
        check(&ast.variable(v).annotation)?;
    }
    Ok(())
}

// ---- graph cycles ----

/// Topological check over connection edges, ignoring delayed edges (a
/// delay breaks a feedback cycle); also rejects graphs that instantiate
/// themselves.
fn check_graph_cycles(
    ast: &AstAllocator,
    module: ModuleId,
    m: &Module,
    instances: &[soul_ir::ast::ProcessorInstance],
    connections: &[soul_ir::ast::Connection],
) -> CompileResult<()> {
    // Recursive instantiation: the graph reachable through instance
    // targets must never include itself.
    fn check_recursive_instantiation(
        ast: &AstAllocator,
        graph: ModuleId,
        current: ModuleId,
        visited: &mut FxHashSet<ModuleId>,
    ) -> CompileResult<()> {
        if !visited.insert(current) {
            return Ok(());
        }
        if let ModuleKind::Graph { instances, .. } = &ast.module(current).kind {
            for instance in instances {
                if let Expr::ProcessorRef(target) = ast.expr(instance.target) {
                    if *target == graph {
                        return Err(errors::recursive_graph(
                            instance.context.location,
                            &ast.interner.lookup(ast.module(graph).name),
                        )
                        .into());
                    }
                    check_recursive_instantiation(ast, graph, *target, visited)?;
                }
            }
        }
        Ok(())
    }
    check_recursive_instantiation(ast, module, module, &mut FxHashSet::default())?;

    // Feedback cycles: nodes are instances, edges are undelayed
    // instance-to-instance connections.
    let index_of = |name: Name| instances.iter().position(|i| i.instance_name == name);

    let mut edges: Vec<(usize, usize)> = Vec::new();
    for connection in connections {
        if connection.delay_length.is_some() {
            continue;
        }
        let (Some(src), Some(dst)) = (connection.source.processor, connection.dest.processor)
        else {
            continue; // the graph's own endpoints cannot form a cycle
        };
        if let (Some(a), Some(b)) = (index_of(src), index_of(dst)) {
            edges.push((a, b));
        }
    }

    // Depth-first cycle detection.
    #[derive(Copy, Clone, PartialEq)]
    enum State {
        Unvisited,
        Active,
        Done,
    }
    let mut states = vec![State::Unvisited; instances.len()];

    fn dfs(
        node: usize,
        edges: &[(usize, usize)],
        states: &mut [State],
        path: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        states[node] = State::Active;
        path.push(node);
        for &(a, b) in edges {
            if a != node {
                continue;
            }
            match states[b] {
                State::Active => {
                    let start = path.iter().position(|&n| n == b).unwrap_or(0);
                    return Some(path[start..].to_vec());
                }
                State::Unvisited => {
                    if let Some(cycle) = dfs(b, edges, states, path) {
                        return Some(cycle);
                    }
                }
                State::Done => {}
            }
        }
        path.pop();
        states[node] = State::Done;
        None
    }

    for n in 0..instances.len() {
        if states[n] == State::Unvisited {
            let mut path = Vec::new();
            if let Some(cycle) = dfs(n, &edges, &mut states, &mut path) {
                let names: Vec<String> = cycle
                    .iter()
                    .map(|&i| ast.interner.lookup(instances[i].instance_name))
                    .collect();
                return Err(errors::graph_cycle(m.context.location, &names.join(" -> ")).into());
            }
        }
    }

    Ok(())
}

// ---- pre/post increment collisions ----

/// Within one statement, a variable modified by `++`/`--` cannot also be
/// referenced elsewhere.
struct PreAndPostIncCheck<'a> {
    ast: &'a AstAllocator,
}

impl<'a> PreAndPostIncCheck<'a> {
    fn check_module(&self, module: ModuleId) -> CompileResult<()> {
        for &f in &self.ast.module(module).functions {
            let function = self.ast.function(f);
            if function.is_generic() {
                continue;
            }
            if let Some(block) = function.block {
                self.check_stmt(block)?;
            }
        }
        Ok(())
    }

    fn check_stmt(&self, stmt: StmtId) -> CompileResult<()> {
        match self.ast.stmt(stmt).clone() {
            Stmt::Block(b) => {
                for &s in &self.ast.block(b).statements {
                    self.check_stmt(s)?;
                }
                Ok(())
            }
            Stmt::Expression(e) => self.check_statement_expr(e),
            Stmt::VariableDeclaration(v) => {
                if let Some(init) = self.ast.variable(v).initial_value {
                    self.check_statement_expr(init)?;
                }
                Ok(())
            }
            Stmt::If {
                condition,
                true_branch,
                false_branch,
            } => {
                self.check_statement_expr(condition)?;
                self.check_stmt(true_branch)?;
                if let Some(f) = false_branch {
                    self.check_stmt(f)?;
                }
                Ok(())
            }
            Stmt::Loop {
                condition,
                num_iterations,
                iterator,
                body,
                ..
            } => {
                if let Some(c) = condition {
                    self.check_statement_expr(c)?;
                }
                if let Some(n) = num_iterations {
                    self.check_statement_expr(n)?;
                }
                if let Some(i) = iterator {
                    self.check_statement_expr(i)?;
                }
                self.check_stmt(body)
            }
            Stmt::Return { value } => {
                if let Some(v) = value {
                    self.check_statement_expr(v)?;
                }
                Ok(())
            }
            Stmt::Break | Stmt::Continue | Stmt::Noop => Ok(()),
        }
    }

    fn check_statement_expr(&self, e: ExprId) -> CompileResult<()> {
        let mut referenced = FxHashSet::default();
        let mut modified = FxHashSet::default();
        self.walk(e, &mut referenced, &mut modified)
    }

    fn walk(
        &self,
        e: ExprId,
        referenced: &mut FxHashSet<VarId>,
        modified: &mut FxHashSet<VarId>,
    ) -> CompileResult<()> {
        match self.ast.expr(e).clone() {
            Expr::VariableRef(v) => {
                if modified.contains(&v) {
                    return Err(errors::pre_inc_dec_collision(
                        self.ast.expr_context(e).location,
                    )
                    .into());
                }
                referenced.insert(v);
                Ok(())
            }
            Expr::PreOrPostIncDec { target, .. } => {
                if let Expr::VariableRef(v) = self.ast.expr(target) {
                    if referenced.contains(v) {
                        return Err(errors::pre_inc_dec_collision(
                            self.ast.expr_context(target).location,
                        )
                        .into());
                    }
                    modified.insert(*v);
                    referenced.insert(*v);
                    Ok(())
                } else {
                    self.walk(target, referenced, modified)
                }
            }
            other => {
                let mut result = Ok(());
                for_each_child(&other, |child| {
                    if result.is_ok() {
                        result = self.walk(child, referenced, modified);
                    }
                });
                result
            }
        }
    }
}

/// Call `f` for each direct child expression of a node.
pub(crate) fn for_each_child(expr: &Expr, mut f: impl FnMut(ExprId)) {
    match expr {
        Expr::SubscriptWithBrackets { lhs, index } => {
            f(*lhs);
            if let Some(i) = index {
                f(*i);
            }
        }
        Expr::SubscriptWithChevrons { lhs, size } => {
            f(*lhs);
            f(*size);
        }
        Expr::TypeMetaFunction { source, .. } | Expr::TypeCast { source, .. } => f(*source),
        Expr::CallOrCast {
            name_or_type, args, ..
        } => {
            f(*name_or_type);
            if let Some(a) = args {
                f(*a);
            }
        }
        Expr::FunctionCall { args, .. } => {
            if let Some(a) = args {
                f(*a);
            }
        }
        Expr::UnaryOp { source, .. } => f(*source),
        Expr::BinaryOp { lhs, rhs, .. } => {
            f(*lhs);
            f(*rhs);
        }
        Expr::TernaryOp {
            condition,
            true_branch,
            false_branch,
        } => {
            f(*condition);
            f(*true_branch);
            f(*false_branch);
        }
        Expr::Assignment { target, new_value } => {
            f(*target);
            f(*new_value);
        }
        Expr::PreOrPostIncDec { target, .. } => f(*target),
        Expr::CommaSeparatedList { items } => {
            for i in items {
                f(*i);
            }
        }
        Expr::ArrayElementRef {
            object, start, end, ..
        } => {
            f(*object);
            f(*start);
            if let Some(e) = end {
                f(*e);
            }
        }
        Expr::StructMemberRef { object, .. } => f(*object),
        Expr::DotOperator { lhs, .. } => f(*lhs),
        Expr::WriteToEndpoint { target, value } => {
            f(*target);
            f(*value);
        }
        Expr::StaticAssertion { condition, .. } => f(*condition),
        _ => {}
    }
}
