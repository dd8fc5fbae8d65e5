//! Constant folding.
//!
//! Every sub-expression whose operands are known constants becomes a
//! constant node: unary and binary operators, ternaries with constant
//! conditions, casts of literals, reads of write-once variables with
//! constant initialisers, and intrinsic calls over constant arguments.
//! Expressions consumed by reference are left alone; folding them would
//! break the aliasing the callee expects.
//!
//! This pass always runs with errors ignored; the only failures it can
//! raise itself are real ones (division by a constant zero, a failed
//! static assertion, a const value passed by non-const reference).

use crate::intrinsics::fold_intrinsic;
use crate::lookup::ScopeStack;
use crate::passes::scope_tracked_visits;
use crate::sanity;
use soul_diagnostic::{errors, CompileError, CompileResult};
use soul_ir::ast::visit::{rewalk_expr, RewritingVisitor};
use soul_ir::ast::{AstAllocator, Expr, ExprId, ModuleId};
use soul_ir::value::{apply_binary_op, apply_unary_op, FoldError, Value};
use soul_ir::types::TypeRules;

pub(crate) struct ConstantFolder<'a> {
    pub ast: &'a mut AstAllocator,
    pub module: ModuleId,
    pub scopes: ScopeStack,
    pub num_fails: usize,
    pub items_replaced: usize,
    is_used_as_reference: bool,
}

impl<'a> ConstantFolder<'a> {
    pub fn new(ast: &'a mut AstAllocator, module: ModuleId) -> Self {
        ConstantFolder {
            ast,
            module,
            scopes: ScopeStack::new(module),
            num_fails: 0,
            items_replaced: 0,
            is_used_as_reference: false,
        }
    }

    pub fn perform(&mut self) -> CompileResult<()> {
        self.visit_module_content(self.module)
    }

    fn replace_with_constant(&mut self, id: ExprId, value: Value) {
        self.ast.replace_expr(id, Expr::Constant(value));
        self.items_replaced += 1;
    }

    fn fold(&mut self, id: ExprId) -> CompileResult<()> {
        if self.is_used_as_reference {
            return Ok(());
        }

        match self.ast.expr(id).clone() {
            // A write-once variable with a constant initialiser reads as
            // that constant (arrays stay materialised in storage).
            Expr::VariableRef(v) => {
                let var = self.ast.variable(v);
                if var.num_writes > 0 {
                    return Ok(());
                }
                let Some(init) = var.initial_value else {
                    return Ok(());
                };
                let Some(value) = self.ast.get_as_constant(init).cloned() else {
                    return Ok(());
                };
                if value.get_type().is_array() {
                    return Ok(());
                }
                let Some(variable_type) = self.ast.variable_type(v) else {
                    return Ok(());
                };
                let variable_type = variable_type.without_reference_and_const();

                if value.get_type().is_identical(&variable_type) {
                    self.replace_with_constant(id, value);
                } else if TypeRules::can_silently_cast_value(&variable_type, &value) {
                    let cast = value
                        .cast_to_type_expecting_success(&variable_type, &self.ast.structs);
                    self.replace_with_constant(id, cast);
                }
                Ok(())
            }

            Expr::TernaryOp {
                condition,
                true_branch,
                false_branch,
            } => {
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

            Expr::UnaryOp { op, source } => {
                if let Some(v) = self.ast.get_as_constant(source) {
                    if let Ok(folded) = apply_unary_op(v, op) {
                        self.replace_with_constant(id, folded);
                    }
                }
                Ok(())
            }

            Expr::BinaryOp { op, lhs, rhs } => {
                if self.ast.is_output_endpoint(lhs) {
                    self.num_fails += 1;
                    return Ok(());
                }
                let (Some(a), Some(b)) = (
                    self.ast.get_as_constant(lhs),
                    self.ast.get_as_constant(rhs),
                ) else {
                    return Ok(());
                };
                match apply_binary_op(a, b, op, &self.ast.structs) {
                    Ok(folded) => {
                        self.replace_with_constant(id, folded);
                        Ok(())
                    }
                    Err(FoldError::DivideByZero) => {
                        Err(errors::divide_by_zero(self.ast.expr_context(rhs).location).into())
                    }
                    Err(FoldError::ModuloZero) => {
                        Err(errors::modulo_zero(self.ast.expr_context(rhs).location).into())
                    }
                    Err(FoldError::NotApplicable) => Ok(()),
                }
            }

            Expr::TypeCast { target, source } => self.fold_cast(id, target, source),

            Expr::FunctionCall { function, args } => {
                let intrinsic = self.ast.function(function).intrinsic;
                if intrinsic == soul_ir::intrinsic::IntrinsicType::None {
                    return Ok(());
                }
                let arg_ids: Vec<ExprId> = match args {
                    None => Vec::new(),
                    Some(list) => match self.ast.expr(list) {
                        Expr::CommaSeparatedList { items } => items.clone(),
                        _ => vec![list],
                    },
                };
                let mut constants = Vec::with_capacity(arg_ids.len());
                for a in &arg_ids {
                    match self.ast.get_as_constant(*a) {
                        Some(v) => constants.push(v.clone()),
                        None => return Ok(()),
                    }
                }
                if constants.is_empty() {
                    return Ok(());
                }
                if let Some(result) = fold_intrinsic(intrinsic, &constants, &self.ast.structs) {
                    self.replace_with_constant(id, result);
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

    fn fold_cast(
        &mut self,
        id: ExprId,
        target: soul_ir::types::Type,
        source: ExprId,
    ) -> CompileResult<()> {
        let context = self.ast.expr_context(id);

        if let Expr::CommaSeparatedList { items } = self.ast.expr(source).clone() {
            // An empty initialiser is the zero value.
            if items.is_empty() {
                let zero = Value::zero_initialiser(&target, &self.ast.structs);
                self.replace_with_constant(id, zero);
                return Ok(());
            }

            let mut constants = Vec::with_capacity(items.len());
            for &item in &items {
                match self.ast.get_as_constant(item) {
                    Some(v) => constants.push(v.clone()),
                    None => return Ok(()),
                }
            }

            if constants.len() == 1 && TypeRules::can_cast_to(&target, constants[0].get_type()) {
                if let Ok(cast) = constants[0].cast_to_type(&target, &self.ast.structs) {
                    self.replace_with_constant(id, cast);
                }
                return Ok(());
            }

            if target.is_array_or_vector() {
                let element = target.element_type().expect("aggregate element type");
                let mut elements = Vec::with_capacity(constants.len());
                for v in &constants {
                    if !TypeRules::can_cast_to(&element, v.get_type()) {
                        return Ok(());
                    }
                    match v.cast_to_type(&element, &self.ast.structs) {
                        Ok(cast) => elements.push(cast),
                        Err(_) => return Ok(()),
                    }
                }
                sanity::throw_if_wrong_number_of_elements(
                    self.ast,
                    context.location,
                    &target,
                    elements.len(),
                )?;
                self.replace_with_constant(id, Value::aggregate(target, elements));
                return Ok(());
            }

            if let Some(struct_id) = target.struct_ref() {
                let members = self.ast.structs.get(struct_id).members.clone();
                sanity::throw_if_wrong_number_of_elements(
                    self.ast,
                    context.location,
                    &target,
                    constants.len(),
                )?;
                let mut values = Vec::with_capacity(members.len());
                for (v, member) in constants.iter().zip(members.iter()) {
                    if !TypeRules::can_silently_cast_value(&member.ty, v) {
                        sanity::expect_silent_cast_possible(
                            self.ast,
                            context.location,
                            &member.ty,
                            source,
                        )?;
                        return Ok(());
                    }
                    values.push(v.cast_to_type_expecting_success(&member.ty, &self.ast.structs));
                }
                self.replace_with_constant(id, Value::aggregate(target, values));
                return Ok(());
            }

            return Err(errors::wrong_type_for_initialise_list(context.location).into());
        }

        // A cast to the source's own type is the source.
        if let Some(t) = self.ast.result_type(source) {
            if t.is_identical(&target) {
                let node = self.ast.expr(source).clone();
                self.ast.replace_expr(id, node);
                self.items_replaced += 1;
                return Ok(());
            }
        }

        if let Some(v) = self.ast.get_as_constant(source).cloned() {
            if TypeRules::can_silently_cast_value(&target, &v) {
                let cast = v.cast_to_type_expecting_success(&target, &self.ast.structs);
                self.replace_with_constant(id, cast);
            } else if TypeRules::can_cast_to(&target, v.get_type()) {
                if let Ok(cast) = v.cast_to_type(&target, &self.ast.structs) {
                    self.replace_with_constant(id, cast);
                }
            }
        }
        Ok(())
    }
}

impl<'a> RewritingVisitor for ConstantFolder<'a> {
    type Error = CompileError;

    fn ast_mut(&mut self) -> &mut AstAllocator {
        self.ast
    }

    scope_tracked_visits!();

    fn visit_expr(&mut self, id: ExprId) -> CompileResult<()> {
        // Function-call arguments bound to reference parameters must not
        // fold; a const value passed by non-const reference is an error.
        if let Expr::FunctionCall { function, args } = self.ast.expr(id).clone() {
            let params = self.ast.function(function).parameters.clone();
            let arg_ids: Vec<ExprId> = match args {
                None => Vec::new(),
                Some(list) => match self.ast.expr(list) {
                    Expr::CommaSeparatedList { items } => items.clone(),
                    _ => vec![list],
                },
            };

            for (i, &arg) in arg_ids.iter().enumerate() {
                let param_type = params.get(i).and_then(|&p| self.ast.variable_type(p));
                let by_reference = param_type.as_ref().map_or(false, |t| t.is_reference);

                if by_reference {
                    let non_const = param_type
                        .as_ref()
                        .map_or(false, |t| t.is_non_const_reference());
                    if non_const
                        && self.ast.is_resolved_as_value(arg)
                        && !self.ast.is_assignable(arg)
                    {
                        return Err(errors::cannot_pass_const_as_non_const_ref(
                            self.ast.expr_context(arg).location,
                        )
                        .into());
                    }
                }

                let old = self.is_used_as_reference;
                self.is_used_as_reference = by_reference;
                let result = self.visit_expr(arg);
                self.is_used_as_reference = old;
                result?;
            }

            if !self.ast.is_resolved_expr(id) {
                self.num_fails += 1;
            }
            return self.fold(id);
        }

        rewalk_expr(self, id)?;
        self.fold(id)?;

        if !self.ast.is_resolved_expr(id) {
            self.num_fails += 1;
        }
        Ok(())
    }
}
