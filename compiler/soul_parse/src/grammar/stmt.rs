//! Statement and block parsing.

use super::ParseTypeContext;
use crate::Parser;
use soul_diagnostic::{errors, CompileResult};
use soul_ir::ast::{
    Block, Expr, ExprClass, ExprId, FuncId, ScopeRef, Stmt, StmtId, Variable,
};
use soul_ir::value::Value;
use soul_ir::TokenKind;

impl<'a> Parser<'a> {
    /// Parse `{ ... }` as a block statement. `owner` is set for a
    /// function's main block.
    pub(crate) fn parse_block(&mut self, owner: Option<FuncId>) -> CompileResult<StmtId> {
        let context = self.context();
        self.expect(&TokenKind::OpenBrace)?;

        let block = self.ast.alloc_block(Block {
            context,
            parent: self.scope(),
            function: owner,
            statements: Vec::new(),
        });

        self.with_scope(ScopeRef::Block(block), |p| {
            let mut statements = Vec::new();
            while !p.cursor.eat(&TokenKind::CloseBrace) {
                if p.cursor.is_at_end() {
                    return Err(p.expected("'}'"));
                }
                p.parse_statement_into(&mut statements)?;
            }
            p.ast.block_mut(block).statements = statements;
            Ok(())
        })?;

        Ok(self.ast.alloc_stmt(Stmt::Block(block), context))
    }

    /// Parse one statement; variable declaration lists may append several.
    pub(crate) fn parse_statement_into(&mut self, out: &mut Vec<StmtId>) -> CompileResult<()> {
        let context = self.context();

        if self.cursor.check(&TokenKind::OpenBrace) {
            let block = self.parse_block(None)?;
            out.push(block);
            return Ok(());
        }

        if self.cursor.eat(&TokenKind::If) {
            out.push(self.parse_if()?);
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::While) {
            out.push(self.parse_do_or_while_loop(false)?);
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::Do) {
            out.push(self.parse_do_or_while_loop(true)?);
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::For) {
            out.push(self.parse_for_loop()?);
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::Loop) {
            out.push(self.parse_loop_statement()?);
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::Return) {
            out.push(self.parse_return()?);
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::Break) {
            self.expect(&TokenKind::Semicolon)?;
            out.push(self.ast.alloc_stmt(Stmt::Break, context));
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::Continue) {
            self.expect(&TokenKind::Semicolon)?;
            out.push(self.ast.alloc_stmt(Stmt::Continue, context));
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::Let) {
            return self.parse_local_let_or_var(true, out);
        }
        if self.cursor.eat(&TokenKind::Var) {
            return self.parse_local_let_or_var(false, out);
        }
        if self.cursor.check(&TokenKind::External) {
            return Err(self.error(errors::external_not_allowed_in_function(self.location())));
        }
        if self.cursor.eat(&TokenKind::Semicolon) {
            out.push(self.ast.alloc_stmt(Stmt::Noop, context));
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::PlusPlus) {
            let e = self.parse_pre_inc_dec(true)?;
            self.expect(&TokenKind::Semicolon)?;
            out.push(self.ast.alloc_stmt(Stmt::Expression(e), context));
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::MinusMinus) {
            let e = self.parse_pre_inc_dec(false)?;
            self.expect(&TokenKind::Semicolon)?;
            out.push(self.ast.alloc_stmt(Stmt::Expression(e), context));
            return Ok(());
        }
        if self.cursor.check(&TokenKind::OpenParen) {
            let e = self.parse_factor()?;
            self.expect(&TokenKind::Semicolon)?;
            out.push(self.ast.alloc_stmt(Stmt::Expression(e), context));
            return Ok(());
        }

        if self.cursor.current_kind().is_numeric_literal()
            || matches!(
                self.cursor.current_kind(),
                TokenKind::String(_) | TokenKind::Minus
            )
        {
            out.push(self.parse_expression_as_statement(false)?);
            return Ok(());
        }

        // Tentatively parse `Type name ...` as a variable declaration; on
        // failure rewind and treat it as an expression.
        {
            let start = self.cursor.snapshot();
            if let Some(declared_type) = self.try_parse_type(ParseTypeContext::VariableType)? {
                if let Some(name) = self.cursor.check_ident() {
                    self.cursor.advance();
                    if self.cursor.check(&TokenKind::OpenParen) {
                        return Err(self.error(errors::expected_variable_decl(self.location())));
                    }
                    return self.parse_variable_declaration(declared_type, name, false, out);
                }
            }
            self.cursor.restore(start);
        }

        if self.cursor.check_ident().is_some() {
            out.push(self.parse_expression_as_statement(true)?);
            return Ok(());
        }

        Err(self.error(errors::expected_statement(self.location())))
    }

    /// Parse one statement and wrap multi-statement declaration lists in
    /// an implicit block, for `if`/loop bodies without braces.
    pub(crate) fn parse_single_statement(&mut self) -> CompileResult<StmtId> {
        let context = self.context();
        let mut statements = Vec::new();
        self.parse_statement_into(&mut statements)?;

        if statements.len() == 1 {
            return Ok(statements[0]);
        }

        let block = self.ast.alloc_block(Block {
            context,
            parent: self.scope(),
            function: None,
            statements,
        });
        Ok(self.ast.alloc_stmt(Stmt::Block(block), context))
    }

    fn parse_expression_as_statement(&mut self, allow_assignment: bool) -> CompileResult<StmtId> {
        let context = self.context();
        let e = self.parse_expression(allow_assignment)?;
        self.expect(&TokenKind::Semicolon)?;

        if self.ast.is_compile_time_constant(e) {
            return Err(self.error(errors::expression_has_no_effect(
                self.ast.expr_context(e).location,
            )));
        }

        Ok(self.ast.alloc_stmt(Stmt::Expression(e), context))
    }

    fn parse_if(&mut self) -> CompileResult<StmtId> {
        let context = self.context();
        self.expect(&TokenKind::OpenParen)?;
        let condition = self.parse_expression(false)?;
        self.expect(&TokenKind::CloseParen)?;
        let true_branch = self.parse_single_statement()?;
        let false_branch = if self.cursor.eat(&TokenKind::Else) {
            Some(self.parse_single_statement()?)
        } else {
            None
        };
        Ok(self.ast.alloc_stmt(
            Stmt::If {
                condition,
                true_branch,
                false_branch,
            },
            context,
        ))
    }

    fn parse_return(&mut self) -> CompileResult<StmtId> {
        let context = self.context();

        if self.cursor.eat(&TokenKind::Semicolon) {
            return Ok(self.ast.alloc_stmt(Stmt::Return { value: None }, context));
        }

        let value = self.parse_expression(false)?;
        self.expect(&TokenKind::Semicolon)?;
        Ok(self.ast.alloc_stmt(
            Stmt::Return {
                value: Some(value),
            },
            context,
        ))
    }

    /// `for (init; condition; iterator) body` desugars to a block holding
    /// the init statement and a loop; with an empty init the loop stands
    /// alone.
    fn parse_for_loop(&mut self) -> CompileResult<StmtId> {
        let context = self.context();
        self.expect(&TokenKind::OpenParen)?;

        if self.cursor.eat(&TokenKind::Semicolon) {
            let (condition, iterator, body) = self.parse_for_loop_tail(context)?;
            return Ok(self.ast.alloc_stmt(
                Stmt::Loop {
                    is_do: false,
                    condition: Some(condition),
                    num_iterations: None,
                    iterator,
                    body,
                },
                context,
            ));
        }

        let block = self.ast.alloc_block(Block {
            context,
            parent: self.scope(),
            function: None,
            statements: Vec::new(),
        });

        self.with_scope(ScopeRef::Block(block), |p| {
            let mut statements = Vec::new();
            p.parse_statement_into(&mut statements)?;

            let (condition, iterator, body) = p.parse_for_loop_tail(context)?;
            let loop_stmt = p.ast.alloc_stmt(
                Stmt::Loop {
                    is_do: false,
                    condition: Some(condition),
                    num_iterations: None,
                    iterator,
                    body,
                },
                context,
            );
            statements.push(loop_stmt);
            p.ast.block_mut(block).statements = statements;
            Ok(())
        })?;

        Ok(self.ast.alloc_stmt(Stmt::Block(block), context))
    }

    /// Condition, iterator, and body of a `for`, after the init.
    fn parse_for_loop_tail(
        &mut self,
        context: soul_ir::ast::Context,
    ) -> CompileResult<(ExprId, Option<ExprId>, StmtId)> {
        let condition = if self.cursor.eat(&TokenKind::Semicolon) {
            self.ast
                .alloc_expr(Expr::Constant(Value::bool(true)), context)
        } else {
            let c = self.parse_expression(false)?;
            self.expect(&TokenKind::Semicolon)?;
            c
        };

        let iterator = if self.cursor.eat(&TokenKind::CloseParen) {
            None
        } else {
            let i = self.parse_expression(true)?;
            self.expect(&TokenKind::CloseParen)?;
            Some(i)
        };

        let body = self.parse_single_statement()?;
        Ok((condition, iterator, body))
    }

    /// `loop body` or `loop (n) body`.
    fn parse_loop_statement(&mut self) -> CompileResult<StmtId> {
        let context = self.context();

        let num_iterations = if self.cursor.eat(&TokenKind::OpenParen) {
            let n = self.parse_expression(false)?;
            self.expect(&TokenKind::CloseParen)?;
            Some(n)
        } else {
            None
        };

        let body = self.parse_single_statement()?;
        Ok(self.ast.alloc_stmt(
            Stmt::Loop {
                is_do: false,
                condition: None,
                num_iterations,
                iterator: None,
                body,
            },
            context,
        ))
    }

    fn parse_do_or_while_loop(&mut self, is_do: bool) -> CompileResult<StmtId> {
        let context = self.context();

        if is_do {
            let body = self.parse_block(None)?;
            self.expect(&TokenKind::While)?;
            self.expect(&TokenKind::OpenParen)?;
            let condition = self.parse_expression(false)?;
            self.expect(&TokenKind::CloseParen)?;
            return Ok(self.ast.alloc_stmt(
                Stmt::Loop {
                    is_do: true,
                    condition: Some(condition),
                    num_iterations: None,
                    iterator: None,
                    body,
                },
                context,
            ));
        }

        self.expect(&TokenKind::OpenParen)?;
        let condition = self.parse_expression(false)?;
        self.expect(&TokenKind::CloseParen)?;
        let body = self.parse_single_statement()?;
        Ok(self.ast.alloc_stmt(
            Stmt::Loop {
                is_do: false,
                condition: Some(condition),
                num_iterations: None,
                iterator: None,
                body,
            },
            context,
        ))
    }

    /// `let a = x, b = y;` / `var ...`: local declarations with inferred
    /// types.
    fn parse_local_let_or_var(
        &mut self,
        is_const: bool,
        out: &mut Vec<StmtId>,
    ) -> CompileResult<()> {
        loop {
            let context = self.context();
            let name = self.parse_identifier()?;
            self.expect(&TokenKind::Assign)?;
            let initial_value = self.parse_expression(false)?;

            if matches!(
                self.ast.expr_class(initial_value),
                ExprClass::Type | ExprClass::Processor
            ) {
                return Err(self.error(errors::expected_value(
                    self.ast.expr_context(initial_value).location,
                )));
            }

            let var = self.ast.alloc_variable(Variable {
                context,
                name,
                declared_type: None,
                initial_value: Some(initial_value),
                is_const,
                is_external: false,
                is_parameter: false,
                annotation: Default::default(),
                num_reads: 0,
                num_writes: 0,
            });
            out.push(self.ast.alloc_stmt(Stmt::VariableDeclaration(var), context));

            if self.cursor.eat(&TokenKind::Semicolon) {
                return Ok(());
            }
            self.expect(&TokenKind::Comma)?;
        }
    }

    /// `Type a = x, b, c = y;`: typed declarations, local or state.
    /// Statements (or state entries) are delivered through `out`.
    pub(crate) fn parse_variable_declaration(
        &mut self,
        declared_type: ExprId,
        first_name: soul_ir::Name,
        is_external: bool,
        out: &mut Vec<StmtId>,
    ) -> CompileResult<()> {
        let mut vars = Vec::new();
        self.parse_variable_declaration_list(declared_type, first_name, is_external, &mut vars)?;
        for (var, context) in vars {
            out.push(self.ast.alloc_stmt(Stmt::VariableDeclaration(var), context));
        }
        Ok(())
    }

    /// Shared comma-list parse; delivers variables for the caller to
    /// place (block statements or module state).
    pub(crate) fn parse_variable_declaration_list(
        &mut self,
        declared_type: ExprId,
        first_name: soul_ir::Name,
        is_external: bool,
        out: &mut Vec<(soul_ir::ast::VarId, soul_ir::ast::Context)>,
    ) -> CompileResult<()> {
        let mut name = first_name;
        loop {
            let context = self.ast.expr_context(declared_type);

            if let Some(t) = self.ast.resolve_as_type(declared_type) {
                if t.is_void() {
                    return Err(self.error(errors::variable_cannot_be_void(context.location)));
                }
            }

            let mut is_const = self.type_expr_is_const(declared_type);
            let initial_value = if self.cursor.eat(&TokenKind::Assign) {
                if is_external {
                    return Err(self.error(errors::external_cannot_have_initialiser(
                        self.location(),
                    )));
                }
                Some(self.parse_expression(false)?)
            } else {
                is_const = is_const || is_external;
                None
            };

            let var = self.ast.alloc_variable(Variable {
                context,
                name,
                declared_type: Some(declared_type),
                initial_value,
                is_const,
                is_external,
                is_parameter: false,
                annotation: Default::default(),
                num_reads: 0,
                num_writes: 0,
            });

            let annotation = self.parse_annotation()?;
            self.ast.variable_mut(var).annotation = annotation;
            out.push((var, context));

            if self.cursor.eat(&TokenKind::Semicolon) {
                return Ok(());
            }
            self.expect(&TokenKind::Comma)?;
            name = self.parse_identifier()?;
        }
    }
}
