//! The expression precedence chain.
//!
//! Precedence, low to high: assignment · ternary · `||` · `&&` · `|` ·
//! `^` · `&` · equality · comparison · shifts · additive · multiplicative
//! · unary · primary. `||` and `&&` lower immediately to ternaries with
//! constant branches, which keeps short-circuiting explicit for the later
//! lowering to branches.

use super::ParseTypeContext;
use crate::Parser;
use soul_diagnostic::{errors, CompileResult};
use soul_ir::ast::{Expr, ExprClass, ExprId, IdentifierPath};
use soul_ir::endpoint::ProcessorProperty;
use soul_ir::value::Value;
use soul_ir::{BinaryOperator, TokenKind, UnaryOperator};

/// Longest permitted initialiser list.
pub(crate) const MAX_INITIALISER_LIST_LENGTH: usize = 128;

impl<'a> Parser<'a> {
    pub(crate) fn parse_expression(&mut self, allow_assignment: bool) -> CompileResult<ExprId> {
        let lhs = self.parse_ternary_operator()?;

        // Compound assignments rewrite to `target = target op value`.
        let compound = match self.cursor.current_kind() {
            TokenKind::PlusEquals => Some(BinaryOperator::Add),
            TokenKind::MinusEquals => Some(BinaryOperator::Subtract),
            TokenKind::TimesEquals => Some(BinaryOperator::Multiply),
            TokenKind::DivideEquals => Some(BinaryOperator::Divide),
            TokenKind::ModuloEquals => Some(BinaryOperator::Modulo),
            TokenKind::LeftShiftEquals => Some(BinaryOperator::LeftShift),
            TokenKind::RightShiftEquals => Some(BinaryOperator::RightShift),
            TokenKind::RightShiftUnsignedEquals => Some(BinaryOperator::RightShiftUnsigned),
            TokenKind::XorEquals => Some(BinaryOperator::BitwiseXor),
            TokenKind::AndEquals => Some(BinaryOperator::BitwiseAnd),
            TokenKind::OrEquals => Some(BinaryOperator::BitwiseOr),
            _ => None,
        };

        if let Some(op) = compound {
            self.cursor.advance();
            return self.parse_in_place_op(lhs, op);
        }

        if self.cursor.check(&TokenKind::Assign) {
            if !allow_assignment {
                return Err(self.error(errors::assignment_inside_expression(self.location())));
            }
            let context = self.context();
            self.cursor.advance();
            let new_value = self.parse_expression(false)?;
            return Ok(self.ast.alloc_expr(
                Expr::Assignment {
                    target: lhs,
                    new_value,
                },
                context,
            ));
        }

        Ok(lhs)
    }

    /// Parse an expression, rolling back and returning `None` on failure.
    /// Used for tentative parses such as vector sizes.
    pub(crate) fn try_parse_expression_ignoring_errors(&mut self) -> Option<ExprId> {
        let start = self.cursor.snapshot();
        match self.parse_expression(false) {
            Ok(e) => Some(e),
            Err(_) => {
                self.cursor.restore(start);
                None
            }
        }
    }

    fn parse_in_place_op(&mut self, lhs: ExprId, op: BinaryOperator) -> CompileResult<ExprId> {
        let context = self.context();
        let rhs = self.parse_expression(false)?;
        let combined = self.create_binary_operator(context, lhs, rhs, op)?;
        Ok(self.ast.alloc_expr(
            Expr::Assignment {
                target: lhs,
                new_value: combined,
            },
            context,
        ))
    }

    fn create_binary_operator(
        &mut self,
        context: soul_ir::ast::Context,
        lhs: ExprId,
        rhs: ExprId,
        op: BinaryOperator,
    ) -> CompileResult<ExprId> {
        for operand in [lhs, rhs] {
            if matches!(
                self.ast.expr_class(operand),
                ExprClass::Type | ExprClass::Processor
            ) {
                let location = self.ast.expr_context(operand).location;
                return Err(self.error(errors::expected_value_or_endpoint(location)));
            }
        }
        Ok(self
            .ast
            .alloc_expr(Expr::BinaryOp { op, lhs, rhs }, context))
    }

    fn parse_ternary_operator(&mut self) -> CompileResult<ExprId> {
        let a = self.parse_logical_or()?;

        if !self.cursor.check(&TokenKind::Question) {
            return Ok(a);
        }

        let context = self.context();
        self.cursor.advance();
        let true_branch = self.parse_ternary_operator()?;
        self.expect(&TokenKind::Colon)?;
        let false_branch = self.parse_ternary_operator()?;
        Ok(self.ast.alloc_expr(
            Expr::TernaryOp {
                condition: a,
                true_branch,
                false_branch,
            },
            context,
        ))
    }

    fn parse_logical_or(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_logical_and()?;
        loop {
            if !self.cursor.check(&TokenKind::LogicalOr) {
                return Ok(a);
            }
            let context = self.context();
            self.cursor.advance();
            // `a || b` becomes `a ? true : b`.
            let true_branch = self
                .ast
                .alloc_expr(Expr::Constant(Value::bool(true)), context);
            let false_branch = self.parse_logical_and()?;
            a = self.ast.alloc_expr(
                Expr::TernaryOp {
                    condition: a,
                    true_branch,
                    false_branch,
                },
                context,
            );
        }
    }

    fn parse_logical_and(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_bitwise_or()?;
        loop {
            if !self.cursor.check(&TokenKind::LogicalAnd) {
                return Ok(a);
            }
            let context = self.context();
            self.cursor.advance();
            // `a && b` becomes `a ? b : false`.
            let true_branch = self.parse_bitwise_or()?;
            let false_branch = self
                .ast
                .alloc_expr(Expr::Constant(Value::bool(false)), context);
            a = self.ast.alloc_expr(
                Expr::TernaryOp {
                    condition: a,
                    true_branch,
                    false_branch,
                },
                context,
            );
        }
    }

    fn parse_bitwise_or(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_bitwise_xor()?;
        while self.cursor.check(&TokenKind::BitwiseOr) {
            let context = self.context();
            self.cursor.advance();
            let rhs = self.parse_bitwise_xor()?;
            a = self.create_binary_operator(context, a, rhs, BinaryOperator::BitwiseOr)?;
        }
        Ok(a)
    }

    fn parse_bitwise_xor(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_bitwise_and()?;
        while self.cursor.check(&TokenKind::BitwiseXor) {
            let context = self.context();
            self.cursor.advance();
            let rhs = self.parse_bitwise_and()?;
            a = self.create_binary_operator(context, a, rhs, BinaryOperator::BitwiseXor)?;
        }
        Ok(a)
    }

    fn parse_bitwise_and(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_equality_operator()?;
        while self.cursor.check(&TokenKind::BitwiseAnd) {
            let context = self.context();
            self.cursor.advance();
            let rhs = self.parse_equality_operator()?;
            a = self.create_binary_operator(context, a, rhs, BinaryOperator::BitwiseAnd)?;
        }
        Ok(a)
    }

    fn parse_equality_operator(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_comparison_operator()?;
        loop {
            let op = match self.cursor.current_kind() {
                TokenKind::Equals => BinaryOperator::Equals,
                TokenKind::NotEquals => BinaryOperator::NotEquals,
                _ => return Ok(a),
            };
            let context = self.context();
            self.cursor.advance();
            let rhs = self.parse_comparison_operator()?;
            a = self.create_binary_operator(context, a, rhs, op)?;
        }
    }

    fn parse_comparison_operator(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_shift_operator()?;
        loop {
            let op = match self.cursor.current_kind() {
                TokenKind::LessThan => BinaryOperator::LessThan,
                TokenKind::LessThanOrEqual => BinaryOperator::LessThanOrEqual,
                TokenKind::GreaterThanOrEqual => BinaryOperator::GreaterThanOrEqual,
                // A `>` inside a vector size closes the chevron instead.
                TokenKind::GreaterThan if self.ignore_greater_than == 0 => {
                    BinaryOperator::GreaterThan
                }
                _ => return Ok(a),
            };
            let context = self.context();
            self.cursor.advance();
            let rhs = self.parse_shift_operator()?;
            a = self.create_binary_operator(context, a, rhs, op)?;
        }
    }

    fn parse_shift_operator(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_addition_subtraction()?;
        loop {
            let op = match self.cursor.current_kind() {
                TokenKind::LeftShift => BinaryOperator::LeftShift,
                TokenKind::RightShift => BinaryOperator::RightShift,
                TokenKind::RightShiftUnsigned => BinaryOperator::RightShiftUnsigned,
                _ => return Ok(a),
            };
            let context = self.context();
            self.cursor.advance();
            let rhs = self.parse_addition_subtraction()?;
            a = self.create_binary_operator(context, a, rhs, op)?;
        }
    }

    fn parse_addition_subtraction(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_multiply_divide()?;
        loop {
            let op = match self.cursor.current_kind() {
                TokenKind::Plus => BinaryOperator::Add,
                TokenKind::Minus => BinaryOperator::Subtract,
                _ => {
                    // `x -1`: the minus lexed into the literal, so treat it
                    // as adding the (negative) literal.
                    if self.cursor.current_kind().negated_literal().is_some() {
                        let context = self.context();
                        let rhs = self.parse_multiply_divide()?;
                        a = self.create_binary_operator(context, a, rhs, BinaryOperator::Add)?;
                        continue;
                    }
                    return Ok(a);
                }
            };
            let context = self.context();
            self.cursor.advance();
            let rhs = self.parse_multiply_divide()?;
            a = self.create_binary_operator(context, a, rhs, op)?;
        }
    }

    fn parse_multiply_divide(&mut self) -> CompileResult<ExprId> {
        let mut a = self.parse_unary()?;
        loop {
            let op = match self.cursor.current_kind() {
                TokenKind::Times => BinaryOperator::Multiply,
                TokenKind::Divide => BinaryOperator::Divide,
                TokenKind::Modulo => BinaryOperator::Modulo,
                _ => return Ok(a),
            };
            let context = self.context();
            self.cursor.advance();
            let rhs = self.parse_unary()?;
            a = self.create_binary_operator(context, a, rhs, op)?;
        }
    }

    fn parse_unary(&mut self) -> CompileResult<ExprId> {
        if self.cursor.eat(&TokenKind::PlusPlus) {
            return self.parse_pre_inc_dec(true);
        }
        if self.cursor.eat(&TokenKind::MinusMinus) {
            return self.parse_pre_inc_dec(false);
        }

        let op = match self.cursor.current_kind() {
            TokenKind::Minus => Some(UnaryOperator::Negate),
            TokenKind::LogicalNot => Some(UnaryOperator::LogicalNot),
            TokenKind::BitwiseNot => Some(UnaryOperator::BitwiseNot),
            _ => None,
        };

        if let Some(op) = op {
            let context = self.context();
            self.cursor.advance();
            let source = self.parse_unary()?;
            return Ok(self.ast.alloc_expr(Expr::UnaryOp { op, source }, context));
        }

        self.parse_factor()
    }

    pub(crate) fn parse_pre_inc_dec(&mut self, is_increment: bool) -> CompileResult<ExprId> {
        let context = self.context();
        let target = self.parse_factor()?;
        Ok(self.ast.alloc_expr(
            Expr::PreOrPostIncDec {
                target,
                is_increment,
                is_post: false,
            },
            context,
        ))
    }

    pub(crate) fn parse_factor(&mut self) -> CompileResult<ExprId> {
        if self.cursor.eat(&TokenKind::OpenParen) {
            return self.parse_parenthesised_expression();
        }

        let literal = match *self.cursor.current_kind() {
            TokenKind::Int32(v) => Some(Value::int32(v)),
            TokenKind::Int64(v) => Some(Value::int64(v)),
            TokenKind::Float32(bits) => Some(Value::float32(f32::from_bits(bits))),
            TokenKind::Float64(bits) => Some(Value::float64(f64::from_bits(bits))),
            TokenKind::True => Some(Value::bool(true)),
            TokenKind::False => Some(Value::bool(false)),
            _ => None,
        };
        if let Some(v) = literal {
            return self.create_literal(v);
        }

        if let TokenKind::String(name) = *self.cursor.current_kind() {
            let text = self.ast.interner.lookup(name);
            let handle = self.ast.string_dictionary.handle_for_string(&text);
            return self.create_literal(Value::string_literal(handle));
        }

        if self.cursor.eat(&TokenKind::Processor) {
            return self.parse_processor_property();
        }

        if let Some(t) = self.try_parse_type(ParseTypeContext::NameOrType)? {
            return self.parse_suffixes(t);
        }

        let qi = self.parse_qualified_identifier_or_error("an expression")?;
        self.parse_suffixes(qi)
    }

    fn create_literal(&mut self, v: Value) -> CompileResult<ExprId> {
        let context = self.context();
        let e = self.ast.alloc_expr(Expr::Constant(v), context);
        self.cursor.advance();
        self.parse_suffixes(e)
    }

    fn parse_parenthesised_expression(&mut self) -> CompileResult<ExprId> {
        let e = self.parse_expression(false)?;

        if self.cursor.eat(&TokenKind::CloseParen) {
            return self.parse_suffixes(e);
        }

        if self.cursor.eat(&TokenKind::Comma) {
            let context = self.ast.expr_context(e);
            let mut items = vec![e];
            loop {
                items.push(self.parse_expression(false)?);

                if items.len() > MAX_INITIALISER_LIST_LENGTH {
                    return Err(self.error(errors::too_many_initialisers(context.location)));
                }

                if self.cursor.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::CloseParen)?;
                break;
            }
            return Ok(self
                .ast
                .alloc_expr(Expr::CommaSeparatedList { items }, context));
        }

        self.expect(&TokenKind::CloseParen)?;
        Ok(e)
    }

    fn parse_processor_property(&mut self) -> CompileResult<ExprId> {
        self.expect(&TokenKind::Dot)?;
        let context = self.context();
        let name = self.parse_identifier()?;
        let text = self.ast.interner.lookup(name);

        let property = ProcessorProperty::from_name(&text)
            .ok_or_else(|| self.error(errors::unknown_property(context.location, &text)))?;

        if !self.ast.module(self.current_module()).is_processor_or_graph() {
            return Err(self.error(errors::properties_outside_processor(context.location)));
        }

        Ok(self
            .ast
            .alloc_expr(Expr::ProcessorProperty(property), context))
    }

    /// Parse `(a, b, c)` with the open paren already consumed.
    pub(crate) fn parse_call_argument_list(&mut self) -> CompileResult<ExprId> {
        let context = self.context();
        let mut items = Vec::new();

        loop {
            if self.cursor.eat(&TokenKind::CloseParen) {
                break;
            }

            let e = self.parse_expression(false)?;

            if items.len() >= MAX_INITIALISER_LIST_LENGTH {
                return Err(self.error(errors::too_many_initialisers(context.location)));
            }

            match self.ast.expr_class(e) {
                ExprClass::Type => {
                    return Err(self.error(errors::type_reference_not_allowed(
                        self.ast.expr_context(e).location,
                    )))
                }
                ExprClass::Processor => {
                    return Err(self.error(errors::processor_reference_not_allowed(
                        self.ast.expr_context(e).location,
                    )))
                }
                _ => {}
            }

            items.push(e);

            if self.cursor.eat(&TokenKind::Comma) {
                continue;
            }
        }

        Ok(self
            .ast
            .alloc_expr(Expr::CommaSeparatedList { items }, context))
    }

    pub(crate) fn parse_dot_operator(&mut self, lhs: ExprId) -> CompileResult<ExprId> {
        let context = self.context();
        self.expect(&TokenKind::Dot)?;
        let rhs_context = self.context();
        let rhs = self.parse_identifier_path()?;

        if rhs.is_unqualified() {
            let name = self.ast.interner.lookup(rhs.first_part());
            if let Some(op) = soul_ir::ast::TypeMetaOp::from_name(&name) {
                let mf = self
                    .ast
                    .alloc_expr(Expr::TypeMetaFunction { op, source: lhs }, rhs_context);
                return self
                    .parse_vector_or_array_type_suffixes(mf, ParseTypeContext::MetaFunctionArgument);
            }
        }

        let e = self
            .ast
            .alloc_expr(Expr::DotOperator { lhs, rhs }, context);
        self.parse_suffixes(e)
    }

    pub(crate) fn parse_suffixes(&mut self, expression: ExprId) -> CompileResult<ExprId> {
        let context = self.context();

        if self.cursor.check(&TokenKind::Dot) {
            return self.parse_dot_operator(expression);
        }

        if self.cursor.eat(&TokenKind::OpenParen) {
            let args = self.parse_call_argument_list()?;

            // `a.b(args)` is a method call: `b(a, args)`.
            let (name, is_method) =
                if let Expr::DotOperator { lhs, rhs } = self.ast.expr(expression).clone() {
                    if let Expr::CommaSeparatedList { items } = self.ast.expr_mut(args) {
                        items.insert(0, lhs);
                    }
                    let name_context = self.ast.expr_context(expression);
                    let name = self
                        .ast
                        .alloc_expr(Expr::QualifiedIdentifier(rhs), name_context);
                    (name, true)
                } else {
                    (expression, false)
                };

            let call = self.ast.alloc_expr(
                Expr::CallOrCast {
                    name_or_type: name,
                    args: Some(args),
                    is_method,
                },
                context,
            );
            return self.parse_suffixes(call);
        }

        if self.cursor.eat(&TokenKind::OpenBracket) {
            return self.parse_subscript_with_brackets(expression);
        }

        if self.cursor.eat(&TokenKind::PlusPlus) {
            return Ok(self.ast.alloc_expr(
                Expr::PreOrPostIncDec {
                    target: expression,
                    is_increment: true,
                    is_post: true,
                },
                context,
            ));
        }
        if self.cursor.eat(&TokenKind::MinusMinus) {
            return Ok(self.ast.alloc_expr(
                Expr::PreOrPostIncDec {
                    target: expression,
                    is_increment: false,
                    is_post: true,
                },
                context,
            ));
        }

        Ok(expression)
    }

    /// Parse a `[...]` subscript with the open bracket already consumed.
    /// Produces either an ambiguous `SubscriptWithBrackets` (index form)
    /// or an `ArrayElementRef` slice (colon form).
    pub(crate) fn parse_subscript_with_brackets(&mut self, lhs: ExprId) -> CompileResult<ExprId> {
        let context = self.context();

        let e = if self.cursor.eat(&TokenKind::Colon) {
            let start = self
                .ast
                .alloc_expr(Expr::Constant(Value::array_index(0)), context);
            let end = if self.cursor.check(&TokenKind::CloseBracket) {
                None
            } else {
                Some(self.parse_expression(false)?)
            };
            self.check_and_create_array_element_ref(context, lhs, start, end)?
        } else if self.cursor.check(&TokenKind::CloseBracket) {
            self.ast
                .alloc_expr(Expr::SubscriptWithBrackets { lhs, index: None }, context)
        } else {
            let start = self.parse_expression(false)?;
            if self.cursor.eat(&TokenKind::Colon) {
                let end = if self.cursor.check(&TokenKind::CloseBracket) {
                    None
                } else {
                    Some(self.parse_expression(false)?)
                };
                self.check_and_create_array_element_ref(context, lhs, start, end)?
            } else {
                self.ast.alloc_expr(
                    Expr::SubscriptWithBrackets {
                        lhs,
                        index: Some(start),
                    },
                    context,
                )
            }
        };

        self.expect(&TokenKind::CloseBracket)?;
        self.parse_suffixes(e)
    }

    fn check_and_create_array_element_ref(
        &mut self,
        context: soul_ir::ast::Context,
        lhs: ExprId,
        start: ExprId,
        end: Option<ExprId>,
    ) -> CompileResult<ExprId> {
        if matches!(
            self.ast.expr_class(lhs),
            ExprClass::Type | ExprClass::Processor
        ) {
            return Err(self.error(errors::expected_value_or_endpoint(
                self.ast.expr_context(lhs).location,
            )));
        }

        // Statically nonsensical ranges are rejected at parse time.
        if let (Some(s), Some(e)) = (
            self.ast.get_as_constant(start),
            end.and_then(|e| self.ast.get_as_constant(e)),
        ) {
            let s_loc = self.ast.expr_context(start).location;
            let s = s
                .get_as_i64()
                .ok_or_else(|| self.error(errors::expected_integer(s_loc)))?;
            let e = e
                .get_as_i64()
                .ok_or_else(|| self.error(errors::expected_integer(s_loc)))?;
            if (s >= 0 && e >= 0 && s >= e) || (s < 0 && e < 0 && s >= e) {
                return Err(self.error(errors::illegal_slice_size(context.location)));
            }
        }

        Ok(self.ast.alloc_expr(
            Expr::ArrayElementRef {
                object: lhs,
                start,
                end,
                is_slice: true,
                suppress_wrap_warning: false,
            },
            context,
        ))
    }

    // ---- identifiers ----

    pub(crate) fn parse_identifier_path(&mut self) -> CompileResult<IdentifierPath> {
        let mut parts = vec![self.parse_identifier()?];
        while self.cursor.eat(&TokenKind::DoubleColon) {
            parts.push(self.parse_identifier()?);
        }
        Ok(IdentifierPath::new(parts))
    }

    pub(crate) fn parse_qualified_identifier(&mut self) -> CompileResult<ExprId> {
        let context = self.context();
        let path = self.parse_identifier_path()?;
        Ok(self
            .ast
            .alloc_expr(Expr::QualifiedIdentifier(path), context))
    }

    fn parse_qualified_identifier_or_error(&mut self, what: &str) -> CompileResult<ExprId> {
        if self.cursor.check_ident().is_none() {
            return Err(self.expected(what));
        }
        self.parse_qualified_identifier()
    }
}
