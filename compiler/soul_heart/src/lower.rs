//! Statement and expression lowering.
//!
//! Control flow becomes blocks and branches: `if` gets true/false blocks
//! joined only when an else-branch exists; loops get break and continue
//! blocks; `loop (n)` counts a local variable down; `break`/`continue`
//! branch out and open a fresh unreachable block so later statements
//! still have a home. Ternaries always lower through a temporary.
//! Expression lowering produces HEART expression trees, spilling
//! call-like sub-expressions into register temporaries.

use crate::builder::{cast_if_needed, destination_type, narrowest_counter_type};
use crate::generator::{Generator, LoopTargets, UnresolvedCall};
use crate::ir::*;
use soul_diagnostic::{errors, CompileError, CompileResult};
use soul_ir::ast::{self, Expr as AstExpr, ExprId, Stmt, StmtId};
use soul_ir::endpoint::EndpointKind;
use soul_ir::types::{Type, TypeRules};
use soul_ir::value::Value;
use soul_ir::{BinaryOperator, SourceRef};

impl<'a> Generator<'a> {
    pub(crate) fn visit_statement(&mut self, s: StmtId) -> CompileResult<()> {
        match self.ast.stmt(s).clone() {
            Stmt::Block(b) => {
                for &inner in &self.ast.block(b).statements.clone() {
                    self.builder.ensure_block_is_ready(&mut self.module);
                    self.visit_statement(inner)?;
                }
                Ok(())
            }

            Stmt::Expression(e) => self.visit_with_destination(None, e),

            Stmt::VariableDeclaration(v) => {
                let var = self.ast.variable(v).clone();
                let ty = self.ast.variable_type(v).ok_or_else(|| {
                    CompileError::from(errors::expected_type(var.context.location))
                })?;
                let name = self.ast.interner.lookup(var.name);
                let local = self.builder.create_named_local(&mut self.module, &name, ty);
                self.var_map.insert(v, local);

                match var.initial_value {
                    Some(init) => {
                        self.visit_with_destination(Some(Destination::variable(local)), init)
                    }
                    None => {
                        self.builder.add_zero_assignment(
                            &mut self.module,
                            &self.ast.structs,
                            Destination::variable(local),
                        );
                        Ok(())
                    }
                }
            }

            Stmt::If {
                condition,
                true_branch,
                false_branch,
            } => {
                let label = self.if_index;
                self.if_index += 1;

                let true_block = self.builder.create_block(&mut self.module, "if_", label);
                let false_block = self.builder.create_block(&mut self.module, "ifnot_", label);

                let cond = self.evaluate_typed(condition, &Type::bool())?;
                self.builder
                    .add_branch_if(&mut self.module, cond, true_block, false_block, true_block);

                self.visit_statement(true_branch)?;

                if let Some(false_branch) = false_branch {
                    let end_block = self.builder.create_block(&mut self.module, "ifend_", label);
                    self.builder.add_branch(&mut self.module, end_block, false_block);
                    self.visit_statement(false_branch)?;
                    self.builder.begin_block(&mut self.module, end_block);
                } else {
                    self.builder.begin_block(&mut self.module, false_block);
                }
                Ok(())
            }

            Stmt::Loop {
                is_do,
                condition,
                num_iterations,
                iterator,
                body,
            } => self.lower_loop(is_do, condition, num_iterations, iterator, body),

            Stmt::Return { value } => {
                match value {
                    Some(v) => {
                        let return_type = self.current_return_type();
                        let value = self.evaluate_typed(v, &return_type)?;
                        self.builder.add_return(&mut self.module, Some(value));
                    }
                    None => self.builder.add_return(&mut self.module, None),
                }
                Ok(())
            }

            Stmt::Break => {
                let Some(targets) = self.loop_targets.last() else {
                    return Err(errors::break_outside_loop(
                        self.ast.stmt_context(s).location,
                    )
                    .into());
                };
                let target = targets.break_target;
                let next_index = self.current_function().blocks.len() as u32;
                let next = self.builder.create_block(&mut self.module, "block_", next_index);
                self.builder.add_branch(&mut self.module, target, next);
                Ok(())
            }

            Stmt::Continue => {
                let Some(targets) = self.loop_targets.last() else {
                    return Err(errors::continue_outside_loop(
                        self.ast.stmt_context(s).location,
                    )
                    .into());
                };
                let target = targets.continue_target;
                let next_index = self.current_function().blocks.len() as u32;
                let next = self.builder.create_block(&mut self.module, "block_", next_index);
                self.builder.add_branch(&mut self.module, target, next);
                Ok(())
            }

            Stmt::Noop => Ok(()),
        }
    }

    fn current_function(&self) -> &Function {
        &self.module.functions[self.builder.function_index]
    }

    fn current_return_type(&self) -> Type {
        self.current_function().return_type.clone()
    }

    fn lower_loop(
        &mut self,
        is_do: bool,
        condition: Option<ExprId>,
        num_iterations: Option<ExprId>,
        iterator: Option<ExprId>,
        body: StmtId,
    ) -> CompileResult<()> {
        let label = self.loop_index;
        self.loop_index += 1;

        let break_block = self.builder.create_block(&mut self.module, "break_", label);
        let continue_block = self.builder.create_block(&mut self.module, "cont_", label);

        self.loop_targets.push(LoopTargets {
            break_target: break_block,
            continue_target: continue_block,
        });

        if is_do {
            // Body precedes the conditional back-edge.
            self.builder.begin_block(&mut self.module, continue_block);
            self.visit_statement(body)?;
            let cond =
                self.evaluate_typed(condition.expect("do loops have conditions"), &Type::bool())?;
            self.builder.add_branch_if(
                &mut self.module,
                cond,
                continue_block,
                break_block,
                break_block,
            );
        } else {
            let start_block = self.builder.create_block(&mut self.module, "loop_", label);
            let body_block = self.builder.create_block(&mut self.module, "body_", label);

            if let Some(n) = num_iterations {
                // Counted loop: a counter of the narrowest fitting type
                // decrements to zero.
                let declared = self
                    .ast
                    .result_type(n)
                    .unwrap_or(Type::int32())
                    .without_reference_and_const();
                if !declared.is_primitive_integer() {
                    return Err(errors::expected_integer(
                        self.ast.expr_context(n).location,
                    )
                    .into());
                }
                let constant = self.ast.get_as_constant(n).and_then(Value::get_as_i64);
                let counter_type = narrowest_counter_type(constant, &declared);

                let counter = self.builder.create_named_local(
                    &mut self.module,
                    &format!("counter_{label}"),
                    counter_type.clone(),
                );
                let initial = self.evaluate_as_expression(n)?;
                let initial = cast_if_needed(&self.module, &self.ast.structs, initial, &counter_type);
                self.builder
                    .add_assignment(&mut self.module, Destination::variable(counter), initial);

                self.builder.begin_block(&mut self.module, start_block);
                let zero = Value::zero_initialiser(&counter_type, &self.ast.structs);
                let in_range = Expr::Binary {
                    op: BinaryOperator::GreaterThan,
                    lhs: Box::new(Expr::Variable(counter)),
                    rhs: Box::new(Expr::Constant(zero)),
                    ty: Type::bool(),
                };
                self.builder.add_branch_if(
                    &mut self.module,
                    in_range,
                    body_block,
                    break_block,
                    body_block,
                );
                self.visit_statement(body)?;
                self.builder.begin_block(&mut self.module, continue_block);
                self.builder
                    .decrement_value(&mut self.module, &self.ast.structs, counter);
            } else {
                self.builder.begin_block(&mut self.module, start_block);

                match condition {
                    None => {
                        // Endless loop.
                        self.builder
                            .add_branch(&mut self.module, body_block, body_block);
                    }
                    Some(c) => {
                        if let Some(constant) = self.ast.get_as_constant(c) {
                            let target = if constant.get_as_bool() == Some(true) {
                                body_block
                            } else {
                                break_block
                            };
                            self.builder.add_branch(&mut self.module, target, body_block);
                        } else {
                            let cond = self.evaluate_typed(c, &Type::bool())?;
                            self.builder.add_branch_if(
                                &mut self.module,
                                cond,
                                body_block,
                                break_block,
                                body_block,
                            );
                        }
                    }
                }

                self.visit_statement(body)?;
                self.builder.begin_block(&mut self.module, continue_block);
                if let Some(iterator) = iterator {
                    self.visit_with_destination(None, iterator)?;
                }
            }

            self.builder.add_terminal_branch(&mut self.module, start_block);
        }

        self.loop_targets.pop();
        self.builder.begin_block(&mut self.module, break_block);
        Ok(())
    }

    // ---- destination-driven expression lowering ----

    pub(crate) fn visit_with_destination(
        &mut self,
        dest: Option<Destination>,
        e: ExprId,
    ) -> CompileResult<()> {
        let location = self.ast.expr_context(e).location;

        match self.ast.expr(e).clone() {
            AstExpr::Constant(v) => {
                if let Some(dest) = dest {
                    let target_type = destination_type(&self.module, &self.ast.structs, &dest);
                    let cast = v.cast_to_type(&target_type, &self.ast.structs).map_err(|_| {
                        CompileError::from(errors::cannot_cast_between(
                            location,
                            &v.get_type().describe(&self.ast.structs),
                            &target_type.describe(&self.ast.structs),
                        ))
                    })?;
                    self.builder
                        .add_assignment(&mut self.module, dest, Expr::Constant(cast));
                }
                Ok(())
            }

            AstExpr::Assignment { target, new_value } => {
                let dest_ref = self.get_as_reference(target, false)?;
                self.create_assignment(dest_ref, new_value)
            }

            AstExpr::FunctionCall { function, args } => {
                self.lower_function_call(dest, function, args, location)
            }

            AstExpr::TypeCast { source, .. } => {
                // Multi-element casts initialise aggregates in place.
                if let AstExpr::CommaSeparatedList { items } = self.ast.expr(source).clone() {
                    if items.len() > 1 {
                        if let Some(dest) = dest {
                            return self.initialise_elements(dest, &items, location);
                        }
                    }
                }
                self.assign_evaluated(dest, e)
            }

            AstExpr::TernaryOp {
                condition,
                true_branch,
                false_branch,
            } => {
                let Some(dest) = dest else {
                    return Err(errors::ternary_cannot_be_statement(location).into());
                };
                self.lower_ternary(dest, condition, true_branch, false_branch)
            }

            AstExpr::PreOrPostIncDec {
                target,
                is_increment,
                is_post,
            } => self.lower_inc_dec(dest, target, is_increment, is_post, location),

            AstExpr::WriteToEndpoint { .. } => {
                let mut values = Vec::new();
                let head = self.collect_write_chain(e, &mut values);
                self.create_series_of_writes(head, &values, location)
            }

            AstExpr::AdvanceClock => {
                self.builder.add_statement(&mut self.module, Statement::AdvanceClock);
                Ok(())
            }

            // Checked during resolution; nothing to emit.
            AstExpr::StaticAssertion { .. } => Ok(()),

            AstExpr::InputEndpointRef(io) => {
                let Some(dest) = dest else {
                    return Err(errors::unused_expression(location).into());
                };
                self.lower_stream_read(dest, io, location)
            }

            AstExpr::OutputEndpointRef(_) => {
                Err(errors::cannot_read_from_output(location).into())
            }

            AstExpr::CommaSeparatedList { items } => {
                let Some(dest) = dest else {
                    return Err(errors::unused_expression(location).into());
                };
                self.initialise_elements(dest, &items, location)
            }

            _ => self.assign_evaluated(dest, e),
        }
    }

    fn assign_evaluated(&mut self, dest: Option<Destination>, e: ExprId) -> CompileResult<()> {
        match dest {
            Some(dest) => self.create_assignment(dest, e),
            // A valueless use was rejected at parse time; whatever
            // remains (a bare variable read, say) lowers to nothing.
            None => Ok(()),
        }
    }

    fn create_assignment(&mut self, dest: Destination, source: ExprId) -> CompileResult<()> {
        let target_type = destination_type(&self.module, &self.ast.structs, &dest);
        let value = self.evaluate_typed(source, &target_type)?;
        self.builder.add_assignment(&mut self.module, dest, value);
        Ok(())
    }

    fn lower_function_call(
        &mut self,
        dest: Option<Destination>,
        function: ast::FuncId,
        args: Option<ExprId>,
        location: SourceRef,
    ) -> CompileResult<()> {
        let callee = self.ast.function(function).clone();
        let return_type = self
            .ast
            .resolve_as_type(callee.return_type)
            .ok_or_else(|| CompileError::from(errors::expected_type(location)))?;

        // A destination of a different type takes the result through a
        // register.
        if let Some(dest) = &dest {
            let dest_type = destination_type(&self.module, &self.ast.structs, dest);
            if !dest_type.is_identical(&return_type) {
                let temp = self
                    .builder
                    .create_register_variable(&mut self.module, return_type.clone());
                self.emit_call(Some(Destination::variable(temp)), function, &callee, args)?;
                let cast = cast_if_needed(
                    &self.module,
                    &self.ast.structs,
                    Expr::Variable(temp),
                    &dest_type,
                );
                self.builder
                    .add_assignment(&mut self.module, dest.clone(), cast);
                return Ok(());
            }
        }

        self.emit_call(dest, function, &callee, args)
    }

    fn emit_call(
        &mut self,
        dest: Option<Destination>,
        function: ast::FuncId,
        callee: &ast::Function,
        args: Option<ExprId>,
    ) -> CompileResult<()> {
        let arg_ids: Vec<ExprId> = match args {
            None => Vec::new(),
            Some(list) => match self.ast.expr(list) {
                AstExpr::CommaSeparatedList { items } => items.clone(),
                _ => vec![list],
            },
        };

        let mut lowered = Vec::with_capacity(arg_ids.len());
        for (i, &arg) in arg_ids.iter().enumerate() {
            let param_type = callee
                .parameters
                .get(i)
                .and_then(|&p| self.ast.variable_type(p))
                .ok_or_else(|| {
                    CompileError::from(errors::expected_type(
                        self.ast.expr_context(arg).location,
                    ))
                })?;

            if param_type.is_reference {
                let reference = self.get_as_reference(arg, param_type.is_const)?;
                lowered.push(self.destination_to_expr(&reference));
            } else {
                lowered.push(self.evaluate_typed(arg, &param_type)?);
            }
        }

        // Target and printed name are patched by the fix-up pass once
        // every module exists; only then is the callee's unique HEART
        // name known.
        let target = self.func_map.get(&function).copied();
        let (block, statement) = self.builder.next_statement_position(&mut self.module);
        self.unresolved.push(UnresolvedCall {
            module: self.module_index,
            function: self.builder.function_index,
            block,
            statement,
            target: function,
        });

        self.builder.add_statement(
            &mut self.module,
            Statement::FunctionCall {
                dest,
                name: String::new(),
                function: target,
                args: lowered,
            },
        );
        Ok(())
    }

    fn lower_ternary(
        &mut self,
        dest: Destination,
        condition: ExprId,
        true_branch: ExprId,
        false_branch: ExprId,
    ) -> CompileResult<()> {
        let label = self.if_index;
        self.if_index += 1;

        let true_block = self.builder.create_block(&mut self.module, "if_true_", label);
        let false_block = self.builder.create_block(&mut self.module, "if_false_", label);
        let end_block = self.builder.create_block(&mut self.module, "if_end_", label);

        let target_type = destination_type(&self.module, &self.ast.structs, &dest);
        let temp = self
            .builder
            .create_mutable_local(&mut self.module, target_type);
        self.builder.add_zero_assignment(
            &mut self.module,
            &self.ast.structs,
            Destination::variable(temp),
        );

        let cond = self.evaluate_typed(condition, &Type::bool())?;
        self.builder
            .add_branch_if(&mut self.module, cond, true_block, false_block, true_block);
        self.visit_with_destination(Some(Destination::variable(temp)), true_branch)?;
        self.builder.add_branch(&mut self.module, end_block, false_block);
        self.visit_with_destination(Some(Destination::variable(temp)), false_branch)?;
        self.builder.begin_block(&mut self.module, end_block);
        self.builder
            .add_assignment(&mut self.module, dest, Expr::Variable(temp));
        Ok(())
    }

    /// `++`/`--` lower to read-modify-write; pre/post decides whether the
    /// destination receives the new or the old value.
    fn lower_inc_dec(
        &mut self,
        result_dest: Option<Destination>,
        target: ExprId,
        is_increment: bool,
        is_post: bool,
        location: SourceRef,
    ) -> CompileResult<()> {
        let op = if is_increment {
            BinaryOperator::Add
        } else {
            BinaryOperator::Subtract
        };

        let dest = self.get_as_reference(target, false)?;
        let ty = destination_type(&self.module, &self.ast.structs, &dest);

        let old_value = self
            .builder
            .create_register_variable(&mut self.module, ty.clone());
        let dest_expr = self.destination_to_expr(&dest);
        self.builder
            .add_assignment(&mut self.module, Destination::variable(old_value), dest_expr);

        let one = Value::int32(1).cast_to_type(&ty, &self.ast.structs).map_err(|_| {
            CompileError::from(errors::illegal_type_for_operator(
                location,
                if is_increment { "++" } else { "--" },
            ))
        })?;
        let incremented = Expr::Binary {
            op,
            lhs: Box::new(Expr::Variable(old_value)),
            rhs: Box::new(Expr::Constant(one)),
            ty: ty.clone(),
        };

        match result_dest {
            None => {
                self.builder.add_assignment(&mut self.module, dest, incremented);
            }
            Some(result) if is_post => {
                self.builder.add_assignment(&mut self.module, dest, incremented);
                self.builder.add_assignment(
                    &mut self.module,
                    result,
                    Expr::Variable(old_value),
                );
            }
            Some(result) => {
                self.builder
                    .add_assignment(&mut self.module, result.clone(), incremented);
                let result_expr = self.destination_to_expr(&result);
                self.builder.add_assignment(&mut self.module, dest, result_expr);
            }
        }
        Ok(())
    }

    fn lower_stream_read(
        &mut self,
        dest: Destination,
        io: ast::EndpointId,
        location: SourceRef,
    ) -> CompileResult<()> {
        let endpoint = self.ast.endpoint(io);
        if endpoint.kind == EndpointKind::Event {
            return Err(errors::event_endpoint_cannot_be_read(location).into());
        }

        let index = self
            .ast
            .module(self.source)
            .inputs
            .iter()
            .position(|&e| e == io)
            .ok_or_else(|| {
                CompileError::from(errors::internal_compiler_error(
                    location,
                    "input endpoint not found in its module",
                ))
            })? as u32;

        let sample_type = self
            .ast
            .endpoint_sample_array_types(io)
            .and_then(|t| t.into_iter().next())
            .ok_or_else(|| CompileError::from(errors::expected_type(location)))?;

        let dest_type = destination_type(&self.module, &self.ast.structs, &dest);
        if dest_type.is_identical(&sample_type) {
            self.builder
                .add_statement(&mut self.module, Statement::ReadStream { dest, input: index });
        } else {
            let temp = self
                .builder
                .create_register_variable(&mut self.module, sample_type);
            self.builder.add_statement(
                &mut self.module,
                Statement::ReadStream {
                    dest: Destination::variable(temp),
                    input: index,
                },
            );
            let cast = cast_if_needed(
                &self.module,
                &self.ast.structs,
                Expr::Variable(temp),
                &dest_type,
            );
            self.builder.add_assignment(&mut self.module, dest, cast);
        }
        Ok(())
    }

    // ---- stream writes ----

    /// Flatten `out << a << b` into the head target and value list.
    fn collect_write_chain(&self, e: ExprId, values: &mut Vec<ExprId>) -> ExprId {
        match self.ast.expr(e) {
            AstExpr::WriteToEndpoint { target, value } => {
                values.insert(0, *value);
                self.collect_write_chain(*target, values)
            }
            _ => e,
        }
    }

    fn create_series_of_writes(
        &mut self,
        target: ExprId,
        values: &[ExprId],
        location: SourceRef,
    ) -> CompileResult<()> {
        match self.ast.expr(target).clone() {
            AstExpr::OutputEndpointRef(io) => {
                let output = self.output_index(io, location)?;
                let types = self
                    .ast
                    .endpoint_sample_array_types(io)
                    .ok_or_else(|| CompileError::from(errors::expected_type(location)))?;

                for &v in values {
                    let sample_type = self.pick_sample_type(&types, v, location)?;
                    let value = self.evaluate_typed(v, &sample_type)?;
                    self.builder.add_statement(
                        &mut self.module,
                        Statement::WriteStream {
                            output,
                            index: None,
                            value,
                        },
                    );
                }
                Ok(())
            }

            AstExpr::ArrayElementRef { object, start, .. } => {
                let AstExpr::OutputEndpointRef(io) = self.ast.expr(object).clone() else {
                    return Err(errors::target_must_be_output(location).into());
                };
                let output = self.output_index(io, location)?;
                let endpoint = self.ast.endpoint(io);
                if endpoint.array_size.is_none() {
                    return Err(errors::cannot_use_brackets_on_non_array_endpoint(
                        self.ast.expr_context(object).location,
                    )
                    .into());
                }
                let array_size = self.ast.endpoint_array_size(io).unwrap_or(1);
                let element_types = self
                    .ast
                    .endpoint_sample_types(io)
                    .ok_or_else(|| CompileError::from(errors::expected_type(location)))?;

                for &v in values {
                    let sample_type = self.pick_sample_type(&element_types, v, location)?;
                    let value = self.evaluate_typed(v, &sample_type)?;

                    let index_location = self.ast.expr_context(start).location;
                    let index = if let Some(c) = self.ast.get_as_constant(start) {
                        let raw = TypeRules::array_index_from_value(c).map_err(|_| {
                            CompileError::from(errors::non_integer_array_index(index_location))
                        })?;
                        let fixed = TypeRules::resolve_index(raw, array_size).ok_or_else(|| {
                            CompileError::from(errors::index_out_of_range(index_location))
                        })?;
                        Expr::Constant(Value::int32(fixed as i32))
                    } else {
                        // A runtime index wraps into range.
                        let raw = self.evaluate_as_expression(start)?;
                        let wrap_type = Type::bounded_int(
                            soul_ir::types::BoundedIntKind::Wrap,
                            array_size as i64,
                        )
                        .map_err(|_| {
                            CompileError::from(errors::illegal_array_size(index_location))
                        })?;
                        Expr::Cast {
                            target: wrap_type,
                            source: Box::new(raw),
                        }
                    };

                    self.builder.add_statement(
                        &mut self.module,
                        Statement::WriteStream {
                            output,
                            index: Some(index),
                            value,
                        },
                    );
                }
                Ok(())
            }

            _ => Err(errors::target_must_be_output(location).into()),
        }
    }

    fn output_index(&self, io: ast::EndpointId, location: SourceRef) -> CompileResult<u32> {
        self.ast
            .module(self.source)
            .outputs
            .iter()
            .position(|&e| e == io)
            .map(|i| i as u32)
            .ok_or_else(|| {
                CompileError::from(errors::internal_compiler_error(
                    location,
                    "output endpoint not found in its module",
                ))
            })
    }

    /// The sample type a written value lowers to: an exact match wins,
    /// otherwise the single silently accepting type.
    fn pick_sample_type(
        &self,
        types: &[Type],
        value: ExprId,
        location: SourceRef,
    ) -> CompileResult<Type> {
        let value_type = self.ast.result_type(value);

        if let Some(value_type) = &value_type {
            for t in types {
                if value_type.is_equal_ignoring_vector_size1(t) {
                    return Ok(t.clone());
                }
            }
        }

        for t in types {
            if soul_resolve::sanity::can_expr_silently_cast_to(self.ast, value, t) {
                return Ok(t.clone());
            }
        }

        Err(errors::cannot_write_type_to_endpoint(
            location,
            &value_type
                .map(|t| t.describe(&self.ast.structs))
                .unwrap_or_else(|| "<unresolved>".to_string()),
            &TypeRules::describe_types(types, &self.ast.structs),
        )
        .into())
    }

    // ---- aggregate initialisation ----

    fn initialise_elements(
        &mut self,
        dest: Destination,
        items: &[ExprId],
        location: SourceRef,
    ) -> CompileResult<()> {
        let target_type = destination_type(&self.module, &self.ast.structs, &dest);
        soul_resolve::sanity::throw_if_wrong_number_of_elements(
            self.ast,
            location,
            &target_type,
            items.len(),
        )?;

        self.builder
            .add_zero_assignment(&mut self.module, &self.ast.structs, dest.clone());

        for (i, &item) in items.iter().enumerate() {
            // Elements that are zero are already covered by the zero
            // fill.
            if let Some(c) = self.ast.get_as_constant(item) {
                if c.is_zero() {
                    continue;
                }
            }
            let mut element = dest.clone();
            element.path.push(SubIndex::Fixed(i as u64));
            self.create_assignment(element, item)?;
        }
        Ok(())
    }

    // ---- expression evaluation ----

    pub(crate) fn evaluate_as_expression(&mut self, e: ExprId) -> CompileResult<Expr> {
        let location = self.ast.expr_context(e).location;

        match self.ast.expr(e).clone() {
            AstExpr::Constant(v) => Ok(Expr::Constant(v)),

            AstExpr::VariableRef(v) => {
                if let Some(&id) = self.var_map.get(&v) {
                    return Ok(Expr::Variable(id));
                }
                // A variable of another module: constants materialise
                // inline, anything mutable is out of reach.
                let var = self.ast.variable(v).clone();
                if let Some(init) = var.initial_value {
                    if self.ast.is_compile_time_constant(init) {
                        return self.evaluate_as_expression(init);
                    }
                }
                if var.is_const {
                    if let Some(ty) = self.ast.variable_type(v) {
                        return Ok(Expr::Constant(Value::zero_initialiser(
                            &ty,
                            &self.ast.structs,
                        )));
                    }
                }
                Err(errors::cannot_reference_other_processor_var(location).into())
            }

            AstExpr::StructMemberRef {
                object,
                member_index,
                ..
            } => {
                let parent = self.evaluate_as_expression(object)?;
                Ok(Expr::SubElement {
                    parent: Box::new(parent),
                    index: SubIndex::Fixed(member_index as u64),
                })
            }

            AstExpr::ArrayElementRef {
                object,
                start,
                is_slice,
                suppress_wrap_warning,
                ..
            } => {
                let object_type = self
                    .ast
                    .result_type(object)
                    .map(|t| t.without_reference_and_const());
                let parent = self.evaluate_as_expression(object)?;

                if is_slice {
                    let (range_start, range_end) =
                        self.ast.resolved_slice_range(e).ok_or_else(|| {
                            CompileError::from(errors::not_yet_implemented(
                                location,
                                "dynamic slice indexes",
                            ))
                        })?;
                    return Ok(Expr::SubElement {
                        parent: Box::new(parent),
                        index: SubIndex::Range(range_start, range_end),
                    });
                }

                let index = self.lower_element_index(
                    object_type.as_ref(),
                    start,
                    suppress_wrap_warning,
                )?;
                Ok(Expr::SubElement {
                    parent: Box::new(parent),
                    index,
                })
            }

            AstExpr::TypeCast { target, source } => {
                if let AstExpr::CommaSeparatedList { items } = self.ast.expr(source).clone() {
                    // Aggregates build in a temporary.
                    let temp = self
                        .builder
                        .create_mutable_local(&mut self.module, target.clone());
                    self.initialise_elements(Destination::variable(temp), &items, location)?;
                    return Ok(Expr::Variable(temp));
                }

                let lowered = self.evaluate_as_expression(source)?;
                let source_type = lowered.get_type(&self.module, &self.ast.structs);
                if TypeRules::can_cast_to(&target, &source_type) {
                    return Ok(cast_if_needed(
                        &self.module,
                        &self.ast.structs,
                        lowered,
                        &target,
                    ));
                }

                // A single-element aggregate takes the value as its only
                // element.
                if target
                    .num_aggregate_elements(&self.ast.structs)
                    .map_or(false, |n| n == 1)
                {
                    let temp = self
                        .builder
                        .create_mutable_local(&mut self.module, target.clone());
                    self.initialise_elements(Destination::variable(temp), &[source], location)?;
                    return Ok(Expr::Variable(temp));
                }

                Err(errors::cannot_cast_between(
                    location,
                    &source_type.describe(&self.ast.structs),
                    &target.describe(&self.ast.structs),
                )
                .into())
            }

            AstExpr::BinaryOp { op, lhs, rhs } => {
                let types = self.ast.binary_expr_types(e).ok_or_else(|| {
                    CompileError::from(errors::internal_compiler_error(
                        location,
                        "unresolved binary operator reached lowering",
                    ))
                })?;

                // Locals keep evaluation order left-to-right.
                let lhs = self.evaluate_as_expression(lhs)?;
                let lhs = cast_if_needed(&self.module, &self.ast.structs, lhs, &types.operand);
                let rhs = self.evaluate_as_expression(rhs)?;
                let rhs = cast_if_needed(&self.module, &self.ast.structs, rhs, &types.operand);

                Ok(Expr::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                    ty: types.result,
                })
            }

            AstExpr::UnaryOp { op, source } => {
                let result_type = self.ast.result_type(e).ok_or_else(|| {
                    CompileError::from(errors::internal_compiler_error(
                        location,
                        "unresolved unary operator reached lowering",
                    ))
                })?;
                let lowered = self.evaluate_as_expression(source)?;
                let lowered =
                    cast_if_needed(&self.module, &self.ast.structs, lowered, &result_type);
                Ok(Expr::Unary {
                    op,
                    source: Box::new(lowered),
                })
            }

            AstExpr::ProcessorProperty(p) => {
                if self.module.kind == crate::ir::ModuleKind::Namespace {
                    return Err(errors::properties_outside_processor(location).into());
                }
                Ok(Expr::ProcessorProperty(p))
            }

            // Everything else (calls, ternaries, reads, increments)
            // evaluates through a register temporary.
            _ => {
                let ty = self
                    .ast
                    .result_type(e)
                    .ok_or_else(|| CompileError::from(errors::expected_value(location)))?
                    .without_reference_and_const();
                let temp = self.builder.create_register_variable(&mut self.module, ty);
                self.visit_with_destination(Some(Destination::variable(temp)), e)?;
                Ok(Expr::Variable(temp))
            }
        }
    }

    pub(crate) fn evaluate_typed(&mut self, e: ExprId, target: &Type) -> CompileResult<Expr> {
        let location = self.ast.expr_context(e).location;

        if target.is_reference {
            return self.evaluate_typed(e, &target.without_reference());
        }

        if let AstExpr::CommaSeparatedList { items } = self.ast.expr(e).clone() {
            if target.is_fixed_size_aggregate() {
                let temp = self
                    .builder
                    .create_mutable_local(&mut self.module, target.clone());
                self.initialise_elements(Destination::variable(temp), &items, location)?;
                return Ok(Expr::Variable(temp));
            }
            if items.len() == 1 {
                return self.evaluate_typed(items[0], target);
            }
            return Err(errors::wrong_type_for_initialise_list(location).into());
        }

        let lowered = self.evaluate_as_expression(e)?;
        let lowered_type = lowered
            .get_type(&self.module, &self.ast.structs)
            .without_reference_and_const();

        if lowered_type.is_identical(target) {
            return Ok(lowered);
        }

        if let Some(v) = lowered.as_constant() {
            if TypeRules::can_silently_cast_value(target, v) {
                return Ok(Expr::Constant(
                    v.cast_to_type_expecting_success(target, &self.ast.structs),
                ));
            }
        }

        if !TypeRules::can_silently_cast_to(target, &lowered_type) {
            return Err(errors::expected_expression_of_type(
                location,
                &target.describe(&self.ast.structs),
            )
            .into());
        }

        Ok(cast_if_needed(
            &self.module,
            &self.ast.structs,
            lowered,
            target,
        ))
    }

    fn lower_element_index(
        &mut self,
        object_type: Option<&Type>,
        start: ExprId,
        suppress_wrap_warning: bool,
    ) -> CompileResult<SubIndex> {
        let location = self.ast.expr_context(start).location;
        let size = object_type.and_then(Type::array_or_vector_size);

        if let Some(c) = self.ast.get_as_constant(start) {
            let raw = TypeRules::array_index_from_value(c).map_err(|_| {
                CompileError::from(errors::non_integer_array_index(location))
            })?;
            if let Some(size) = size {
                let fixed = TypeRules::resolve_index(raw, size).ok_or_else(|| {
                    CompileError::from(errors::index_out_of_range(location))
                })?;
                return Ok(SubIndex::Fixed(fixed));
            }
            return Ok(SubIndex::Fixed(raw.max(0) as u64));
        }

        let index = self.evaluate_as_expression(start)?;
        let index_type = self.ast.result_type(start);

        // A bounded index within range needs no runtime wrap.
        let statically_safe = match (&index_type, size) {
            (Some(t), Some(size)) => t
                .bounded_int_limit()
                .map_or(false, |limit| limit as u64 <= size),
            _ => false,
        };

        if statically_safe {
            return Ok(SubIndex::Dynamic {
                index: Box::new(index),
                wrap: None,
            });
        }

        if !suppress_wrap_warning {
            self.diagnostics
                .add(errors::index_has_runtime_overhead(location));
        }

        Ok(SubIndex::Dynamic {
            index: Box::new(index),
            wrap: size,
        })
    }

    // ---- references ----

    /// Resolve an expression into an assignable destination; const
    /// references accept a materialised local copy.
    pub(crate) fn get_as_reference(
        &mut self,
        e: ExprId,
        is_const_ref: bool,
    ) -> CompileResult<Destination> {
        let location = self.ast.expr_context(e).location;

        match self.ast.expr(e).clone() {
            AstExpr::VariableRef(v) => {
                if let Some(&id) = self.var_map.get(&v) {
                    return Ok(Destination::variable(id));
                }
                if is_const_ref {
                    return self.materialise_local_copy(e);
                }
                Err(errors::expression_not_assignable(location).into())
            }

            AstExpr::StructMemberRef {
                object,
                member_index,
                ..
            } => {
                let mut dest = self.get_as_reference(object, is_const_ref)?;
                dest.path.push(SubIndex::Fixed(member_index as u64));
                Ok(dest)
            }

            AstExpr::ArrayElementRef {
                object,
                start,
                is_slice,
                suppress_wrap_warning,
                ..
            } => {
                let object_type = self
                    .ast
                    .result_type(object)
                    .map(|t| t.without_reference_and_const());
                let mut dest = self.get_as_reference(object, is_const_ref)?;

                if is_slice {
                    let (range_start, range_end) =
                        self.ast.resolved_slice_range(e).ok_or_else(|| {
                            CompileError::from(errors::not_yet_implemented(
                                location,
                                "dynamic slice indexes",
                            ))
                        })?;
                    dest.path.push(SubIndex::Range(range_start, range_end));
                    return Ok(dest);
                }

                let index =
                    self.lower_element_index(object_type.as_ref(), start, suppress_wrap_warning)?;
                dest.path.push(index);
                Ok(dest)
            }

            _ => {
                if is_const_ref {
                    return self.materialise_local_copy(e);
                }
                Err(errors::expression_not_assignable(location).into())
            }
        }
    }

    fn materialise_local_copy(&mut self, e: ExprId) -> CompileResult<Destination> {
        let location = self.ast.expr_context(e).location;
        let ty = self
            .ast
            .result_type(e)
            .ok_or_else(|| CompileError::from(errors::expected_value(location)))?
            .without_reference_and_const();
        let temp = self.builder.create_mutable_local(&mut self.module, ty);
        self.visit_with_destination(Some(Destination::variable(temp)), e)?;
        Ok(Destination::variable(temp))
    }

    pub(crate) fn destination_to_expr(&self, dest: &Destination) -> Expr {
        let mut expr = Expr::Variable(dest.root);
        for step in &dest.path {
            expr = Expr::SubElement {
                parent: Box::new(expr),
                index: step.clone(),
            };
        }
        expr
    }
}
