//! Final resolution checks.
//!
//! Runs once, with errors enabled, after the fixpoint settles. Anything
//! still unresolved here is a real error; beyond that, this pass performs
//! the checks that need complete types: constant `if` pruning, ternary
//! branch unification, assignment and write-to-endpoint cast checks,
//! array subscript validation, and clock-ratio validation.

use crate::lookup::ScopeStack;
use crate::passes::scope_tracked_visits;
use crate::sanity;
use soul_diagnostic::{errors, CompileError, CompileResult};
use soul_ir::ast::visit::{rewalk_expr, rewalk_stmt, RewritingVisitor};
use soul_ir::ast::{
    AstAllocator, Expr, ExprId, ModuleId, ModuleKind, Stmt, StmtId,
};
use soul_ir::types::{Type, TypeRules};
use soul_ir::value::Value;
use soul_ir::BinaryOperator;

pub(crate) struct FullResolver<'a> {
    pub ast: &'a mut AstAllocator,
    pub module: ModuleId,
    pub scopes: ScopeStack,
    pub items_replaced: usize,
}

impl<'a> FullResolver<'a> {
    pub fn new(ast: &'a mut AstAllocator, module: ModuleId) -> Self {
        FullResolver {
            ast,
            module,
            scopes: ScopeStack::new(module),
            items_replaced: 0,
        }
    }

    pub fn perform(&mut self) -> CompileResult<()> {
        self.visit_module_content(self.module)?;
        self.check_clock_ratios()
    }

    /// Wrap a slot in a silent cast to `target` (constants cast
    /// directly).
    fn insert_silent_cast(&mut self, slot: ExprId, target: Type) -> CompileResult<()> {
        sanity::expect_silent_cast_possible(
            self.ast,
            self.ast.expr_context(slot).location,
            &target,
            slot,
        )?;

        if let Some(v) = self.ast.get_as_constant(slot).cloned() {
            let cast = v.cast_to_type_expecting_success(&target, &self.ast.structs);
            self.ast.replace_expr(slot, Expr::Constant(cast));
        } else {
            let context = self.ast.expr_context(slot);
            let node = self.ast.expr(slot).clone();
            let inner = self.ast.alloc_expr(node, context);
            self.ast.replace_expr(
                slot,
                Expr::TypeCast {
                    target,
                    source: inner,
                },
            );
        }
        self.items_replaced += 1;
        Ok(())
    }

    fn check_ternary(&mut self, id: ExprId) -> CompileResult<()> {
        let (condition, true_branch, false_branch) = match self.ast.expr(id) {
            Expr::TernaryOp {
                condition,
                true_branch,
                false_branch,
            } => (*condition, *true_branch, *false_branch),
            _ => return Ok(()),
        };
        let context = self.ast.expr_context(id);

        sanity::throw_if_not_readable_value(self.ast, condition)?;
        sanity::throw_if_not_readable_value(self.ast, true_branch)?;
        sanity::throw_if_not_readable_value(self.ast, false_branch)?;
        sanity::expect_silent_cast_possible(
            self.ast,
            self.ast.expr_context(condition).location,
            &Type::bool(),
            condition,
        )?;

        let true_type = self
            .ast
            .result_type(true_branch)
            .map(|t| t.without_reference_and_const());
        let false_type = self
            .ast
            .result_type(false_branch)
            .map(|t| t.without_reference_and_const());
        let (Some(true_type), Some(false_type)) = (true_type, false_type) else {
            return Err(errors::expected_value(context.location).into());
        };

        if true_type.is_void() || false_type.is_void() {
            return Err(errors::ternary_cannot_be_void(context.location).into());
        }

        // Non-identical branch types take a silent cast to the wider
        // branch.
        if !true_type.is_identical(&false_type) {
            let cast_to_true = sanity::can_expr_silently_cast_to(self.ast, false_branch, &true_type);
            let cast_to_false = sanity::can_expr_silently_cast_to(self.ast, true_branch, &false_type);

            if !(cast_to_true || cast_to_false) {
                return Err(errors::ternary_types_must_match(
                    context.location,
                    &true_type.describe(&self.ast.structs),
                    &false_type.describe(&self.ast.structs),
                )
                .into());
            }

            if cast_to_true {
                self.insert_silent_cast(false_branch, true_type)?;
            } else {
                self.insert_silent_cast(true_branch, false_type)?;
            }
        }

        // A constant condition leaves only one branch.
        if let Some(c) = self.ast.get_as_constant(condition) {
            if let Some(take_true) = c.get_as_bool() {
                let branch = if take_true { true_branch } else { false_branch };
                let node = self.ast.expr(branch).clone();
                self.ast.replace_expr(id, node);
                self.items_replaced += 1;
            }
        }
        Ok(())
    }

    fn check_binary(&mut self, id: ExprId) -> CompileResult<()> {
        let (op, lhs, rhs) = match self.ast.expr(id) {
            Expr::BinaryOp { op, lhs, rhs } => (*op, *lhs, *rhs),
            _ => return Ok(()),
        };
        let context = self.ast.expr_context(id);

        sanity::throw_if_not_readable_value(self.ast, rhs)?;
        if self.ast.is_output_endpoint(lhs) {
            // Should have been converted to a stream write; reaching here
            // means the operator was not `<<`.
            return Err(errors::cannot_read_from_output(
                self.ast.expr_context(lhs).location,
            )
            .into());
        }
        sanity::throw_if_not_readable_value(self.ast, lhs)?;

        // Division or modulo by a constant zero is a diagnostic even when
        // the other operand is not constant.
        if matches!(op, BinaryOperator::Divide | BinaryOperator::Modulo) {
            if let Some(c) = self.ast.get_as_constant(rhs) {
                if c.is_zero() {
                    return Err(if op == BinaryOperator::Divide {
                        errors::divide_by_zero(self.ast.expr_context(rhs).location).into()
                    } else {
                        errors::modulo_zero(self.ast.expr_context(rhs).location).into()
                    });
                }
            }
        }

        if self.ast.binary_expr_types(id).is_some() {
            // A constant operand that only fits through value-aware
            // casting materialises as the unified type now.
            let lhs_type = self.ast.result_type(lhs);
            let rhs_type = self.ast.result_type(rhs);
            if let (Some(lhs_type), Some(rhs_type)) = (lhs_type, rhs_type) {
                if !lhs_type.is_same_kind(&rhs_type) {
                    if let Some(c) = self.ast.get_as_constant(lhs).cloned() {
                        if TypeRules::can_silently_cast_value(&rhs_type, &c) {
                            let cast = c.cast_to_type_expecting_success(
                                &rhs_type.without_reference_and_const(),
                                &self.ast.structs,
                            );
                            self.ast.replace_expr(lhs, Expr::Constant(cast));
                            self.items_replaced += 1;
                            return Ok(());
                        }
                    }
                    if let Some(c) = self.ast.get_as_constant(rhs).cloned() {
                        if TypeRules::can_silently_cast_value(&lhs_type, &c) {
                            let cast = c.cast_to_type_expecting_success(
                                &lhs_type.without_reference_and_const(),
                                &self.ast.structs,
                            );
                            self.ast.replace_expr(rhs, Expr::Constant(cast));
                            self.items_replaced += 1;
                        }
                    }
                }
            }
            return Ok(());
        }

        let describe = |t: Option<Type>| {
            t.map(|t| t.describe(&self.ast.structs))
                .unwrap_or_else(|| "<unresolved>".to_string())
        };
        Err(errors::illegal_types_for_binary_operator(
            context.location,
            op.symbol(),
            &describe(self.ast.result_type(lhs)),
            &describe(self.ast.result_type(rhs)),
        )
        .into())
    }

    fn check_array_element_ref(&mut self, id: ExprId) -> CompileResult<()> {
        let (object, start, end, is_slice) = match self.ast.expr(id) {
            Expr::ArrayElementRef {
                object,
                start,
                end,
                is_slice,
                ..
            } => (*object, *start, *end, *is_slice),
            _ => return Ok(()),
        };

        // The subscripted object's type; endpoints use their sample
        // types.
        let object_type = match self.ast.expr(object) {
            Expr::InputEndpointRef(e) | Expr::OutputEndpointRef(e) => self
                .ast
                .endpoint_sample_array_types(*e)
                .and_then(|t| t.into_iter().next()),
            _ => self
                .ast
                .result_type(object)
                .map(|t| t.without_reference_and_const()),
        };

        let Some(object_type) = object_type else {
            return Err(errors::expected_array_or_vector(
                self.ast.expr_context(object).location,
            )
            .into());
        };

        if !object_type.is_array_or_vector() {
            let location = self.ast.expr_context(object).location;
            if matches!(
                self.ast.expr(object),
                Expr::InputEndpointRef(_) | Expr::OutputEndpointRef(_)
            ) {
                return Err(errors::cannot_use_bracket_on_endpoint(location).into());
            }
            return Err(errors::expected_array_or_vector_for_bracket_op(location).into());
        }

        if let Some(c) = self.ast.get_as_constant(start) {
            let start_location = self.ast.expr_context(start).location;
            let start_index = TypeRules::array_index_from_value(c)
                .map_err(|_| CompileError::from(errors::non_integer_array_index(start_location)))?;

            if !(object_type.is_unsized_array()
                || object_type.is_valid_array_or_vector_index(start_index))
            {
                return Err(errors::index_out_of_range(start_location).into());
            }

            if is_slice {
                if object_type.is_unsized_array() {
                    return Err(errors::not_yet_implemented(
                        start_location,
                        "slices of dynamic arrays",
                    )
                    .into());
                }
                let element_ok = object_type
                    .element_type()
                    .map_or(false, |e| e.is_primitive());
                if !element_ok {
                    return Err(errors::not_yet_implemented(
                        start_location,
                        "slices of non-primitive arrays",
                    )
                    .into());
                }
                if let Some(end) = end {
                    let end_location = self.ast.expr_context(end).location;
                    let Some(end_const) = self.ast.get_as_constant(end) else {
                        return Err(errors::not_yet_implemented(
                            end_location,
                            "dynamic slice indexes",
                        )
                        .into());
                    };
                    let end_index = TypeRules::array_index_from_value(end_const).map_err(|_| {
                        CompileError::from(errors::non_integer_array_index(end_location))
                    })?;
                    let size = object_type.array_or_vector_size().unwrap_or(0) as i64;
                    let resolved_start =
                        TypeRules::resolve_index(start_index, size as u64).unwrap_or(0) as i64;
                    let resolved_end = if end_index == size {
                        size
                    } else {
                        TypeRules::resolve_index(end_index, size as u64)
                            .map(|i| i as i64)
                            .unwrap_or(-1)
                    };
                    if resolved_end <= resolved_start || resolved_end > size {
                        return Err(errors::illegal_slice_size(end_location).into());
                    }
                }
            }
            return Ok(());
        }

        // Dynamic index.
        let start_location = self.ast.expr_context(start).location;
        if is_slice {
            return Err(errors::not_yet_implemented(start_location, "dynamic slice indexes").into());
        }

        if object_type.is_unsized_array() {
            let index_ok = self
                .ast
                .result_type(start)
                .map_or(false, |t| t.is_integer());
            if !index_ok {
                return Err(errors::non_integer_array_index(start_location).into());
            }
            return Ok(());
        }

        sanity::expect_silent_cast_possible(self.ast, start_location, &Type::int32(), start)
    }

    fn check_assignment(&mut self, id: ExprId) -> CompileResult<()> {
        let (target, new_value) = match self.ast.expr(id) {
            Expr::Assignment { target, new_value } => (*target, *new_value),
            _ => return Ok(()),
        };
        let context = self.ast.expr_context(id);

        if !self.ast.is_assignable(target) {
            return Err(errors::operator_needs_assignable_target(context.location, "=").into());
        }

        let Some(target_type) = self.ast.result_type(target) else {
            return Err(errors::expected_value(context.location).into());
        };
        sanity::expect_silent_cast_possible(
            self.ast,
            context.location,
            &target_type.without_reference_and_const(),
            new_value,
        )
    }

    fn check_inc_dec(&mut self, id: ExprId) -> CompileResult<()> {
        let (target, is_increment) = match self.ast.expr(id) {
            Expr::PreOrPostIncDec {
                target,
                is_increment,
                ..
            } => (*target, *is_increment),
            _ => return Ok(()),
        };
        let context = self.ast.expr_context(id);
        let op = if is_increment { "++" } else { "--" };

        if !self.ast.is_assignable(target) {
            return Err(errors::operator_needs_assignable_target(context.location, op).into());
        }

        let Some(t) = self.ast.result_type(target) else {
            return Err(errors::expected_value(context.location).into());
        };
        let t = t.without_reference_and_const();
        if t.is_bool() || !(t.is_primitive() || t.is_bounded_int()) {
            return Err(errors::illegal_type_for_operator(context.location, op).into());
        }
        Ok(())
    }

    fn check_write_to_endpoint(&mut self, id: ExprId) -> CompileResult<()> {
        let (target, value) = match self.ast.expr(id) {
            Expr::WriteToEndpoint { target, value } => (*target, *value),
            _ => return Ok(()),
        };
        let context = self.ast.expr_context(id);

        sanity::throw_if_not_readable_value(self.ast, value)?;

        // Chained writes (`out << a << b`) nest in the target; the
        // endpoint sits at the head of the chain.
        let mut head = target;
        while let Expr::WriteToEndpoint { target, .. } = self.ast.expr(head) {
            head = *target;
        }

        match self.ast.expr(head).clone() {
            Expr::OutputEndpointRef(e) => {
                let Some(types) = self.ast.endpoint_sample_array_types(e) else {
                    return Err(errors::expected_type(context.location).into());
                };
                sanity::expect_silent_cast_possible_multi(self.ast, context.location, &types, value)
            }
            Expr::ArrayElementRef { object, .. } => {
                if let Expr::OutputEndpointRef(e) = self.ast.expr(object).clone() {
                    let Some(types) = self.ast.endpoint_sample_types(e) else {
                        return Err(errors::expected_type(context.location).into());
                    };
                    sanity::expect_silent_cast_possible_multi(
                        self.ast,
                        context.location,
                        &types,
                        value,
                    )
                } else {
                    Err(errors::target_must_be_output(context.location).into())
                }
            }
            _ => Err(errors::target_must_be_output(context.location).into()),
        }
    }

    fn check_clock_ratios(&mut self) -> CompileResult<()> {
        let instances = match &self.ast.module(self.module).kind {
            ModuleKind::Graph { instances, .. } => instances.clone(),
            _ => return Ok(()),
        };

        for instance in instances {
            for ratio in [instance.clock_multiplier, instance.clock_divider]
                .into_iter()
                .flatten()
            {
                let location = self.ast.expr_context(ratio).location;
                let Some(c) = self.ast.get_as_constant(ratio) else {
                    return Err(errors::ratio_must_be_constant(location).into());
                };
                validate_clock_ratio(location, c)?;
            }
        }
        Ok(())
    }
}

/// A clock ratio must be a power of two in 1..=512.
pub(crate) fn validate_clock_ratio(
    location: soul_ir::SourceRef,
    v: &Value,
) -> CompileResult<i64> {
    if !v.get_type().is_primitive_integer() {
        return Err(errors::ratio_must_be_integer(location).into());
    }
    let ratio = v.get_as_i64().unwrap_or(0);
    if !(1..=512).contains(&ratio) || ratio.count_ones() != 1 {
        return Err(errors::ratio_out_of_range(location).into());
    }
    Ok(ratio)
}

impl<'a> RewritingVisitor for FullResolver<'a> {
    type Error = CompileError;

    fn ast_mut(&mut self) -> &mut AstAllocator {
        self.ast
    }

    scope_tracked_visits!();

    fn visit_stmt(&mut self, id: StmtId) -> CompileResult<()> {
        rewalk_stmt(self, id)?;

        match self.ast.stmt(id).clone() {
            // `if (constTrue)` is replaced by its live branch.
            Stmt::If {
                condition,
                true_branch,
                false_branch,
            } => {
                if let Some(c) = self.ast.get_as_constant(condition) {
                    if let Some(take_true) = c.get_as_bool() {
                        let replacement = if take_true {
                            Some(true_branch)
                        } else {
                            false_branch
                        };
                        let node = match replacement {
                            Some(branch) => self.ast.stmt(branch).clone(),
                            None => Stmt::Noop,
                        };
                        self.ast.replace_stmt(id, node);
                        self.items_replaced += 1;
                    }
                }
                Ok(())
            }

            Stmt::Return { value } => {
                let return_type = self
                    .scopes
                    .enclosing_function()
                    .and_then(|f| self.ast.resolve_as_type(self.ast.function(f).return_type));
                let Some(return_type) = return_type else {
                    return Ok(());
                };
                let location = self.ast.stmt_context(id).location;

                match value {
                    Some(v) => sanity::expect_silent_cast_possible(
                        self.ast,
                        location,
                        &return_type,
                        v,
                    ),
                    None => {
                        if !return_type.is_void() {
                            return Err(
                                errors::void_function_cannot_return_value(location).into()
                            );
                        }
                        Ok(())
                    }
                }
            }

            Stmt::Loop {
                num_iterations: Some(n),
                ..
            } => {
                let location = self.ast.expr_context(n).location;
                if let Some(c) = self.ast.get_as_constant(n) {
                    if c.get_as_i64().map_or(false, |v| v <= 0) {
                        return Err(errors::negative_loop_count(location).into());
                    }
                }
                sanity::expect_silent_cast_possible(self.ast, location, &Type::int64(), n)
            }

            _ => Ok(()),
        }
    }

    fn visit_expr(&mut self, id: ExprId) -> CompileResult<()> {
        rewalk_expr(self, id)?;

        match self.ast.expr(id).clone() {
            Expr::QualifiedIdentifier(path) => Err(errors::unresolved_symbol(
                self.ast.expr_context(id).location,
                &path.to_string(&self.ast.interner),
            )
            .into()),

            Expr::CallOrCast { .. } => Err(errors::cannot_resolve_function_or_cast(
                self.ast.expr_context(id).location,
            )
            .into()),

            Expr::TernaryOp { .. } => self.check_ternary(id),
            Expr::BinaryOp { .. } => self.check_binary(id),
            Expr::ArrayElementRef { .. } => self.check_array_element_ref(id),
            Expr::Assignment { .. } => self.check_assignment(id),
            Expr::PreOrPostIncDec { .. } => self.check_inc_dec(id),
            Expr::WriteToEndpoint { .. } => self.check_write_to_endpoint(id),

            Expr::TypeCast { target, source } => {
                let context = self.ast.expr_context(id);
                if target.is_unsized_array() {
                    return Err(errors::not_yet_implemented(
                        context.location,
                        "casts to unsized arrays",
                    )
                    .into());
                }
                if let Expr::CommaSeparatedList { items } = self.ast.expr(source) {
                    if items.len() != 1 {
                        sanity::throw_if_wrong_number_of_elements(
                            self.ast,
                            context.location,
                            &target,
                            items.len(),
                        )?;
                    }
                }
                Ok(())
            }

            Expr::StaticAssertion { condition, message } => {
                if let Some(c) = self.ast.get_as_constant(condition) {
                    if c.get_as_bool() == Some(false) {
                        return Err(errors::static_assert_failed(
                            self.ast.expr_context(id).location,
                            &message,
                        )
                        .into());
                    }
                }
                Ok(())
            }

            _ => Ok(()),
        }
    }
}
