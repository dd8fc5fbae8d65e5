//! Type expression parsing.
//!
//! Types and values share a subset of syntax (`Name<N>`, `Name[N]`,
//! `Name.elementType`), so most entry points are *tentative*: they return
//! `None` and rewind rather than failing, and the caller re-parses as an
//! expression. A resolved type only exists for primitive keywords at this
//! stage; named types stay as qualified identifiers for the resolver.

use crate::Parser;
use soul_diagnostic::{errors, CompileResult};
use soul_ir::ast::{Context, Expr, ExprId, TypeMetaOp};
use soul_ir::types::{PrimitiveType, Type};
use soul_ir::TokenKind;

/// Where a type expression appears; governs which suffixes are legal.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ParseTypeContext {
    VariableType,
    NameOrType,
    FunctionParameter,
    EventType,
    StructMember,
    UsingDeclTarget,
    ProcessorParameter,
    MetaFunctionArgument,
}

impl<'a> Parser<'a> {
    /// Parse a type, failing if there is none.
    pub(crate) fn parse_type(&mut self, ctx: ParseTypeContext) -> CompileResult<ExprId> {
        match self.try_parse_type(ctx)? {
            Some(t) => Ok(t),
            None => Err(self.error(errors::expected_type(self.location()))),
        }
    }

    /// Tentatively parse a type; `Ok(None)` means the tokens do not start
    /// a type and the cursor has not moved.
    pub(crate) fn try_parse_type(
        &mut self,
        ctx: ParseTypeContext,
    ) -> CompileResult<Option<ExprId>> {
        let context = self.context();

        let primitive = match self.cursor.current_kind() {
            TokenKind::Float | TokenKind::Float32Type => Some(PrimitiveType::Float32),
            TokenKind::Float64Type => Some(PrimitiveType::Float64),
            TokenKind::Void => Some(PrimitiveType::Void),
            TokenKind::Int | TokenKind::Int32Type => Some(PrimitiveType::Int32),
            TokenKind::Int64Type => Some(PrimitiveType::Int64),
            TokenKind::Bool => Some(PrimitiveType::Bool),
            _ => None,
        };

        if let Some(p) = primitive {
            self.cursor.advance();
            let base = self
                .ast
                .alloc_expr(Expr::ConcreteType(Type::primitive(p)), context);
            return Ok(Some(self.parse_vector_or_array_type_suffixes(base, ctx)?));
        }

        if self.cursor.eat(&TokenKind::StringType) {
            let base = self
                .ast
                .alloc_expr(Expr::ConcreteType(Type::string_literal()), context);
            return Ok(Some(self.parse_array_type_suffixes(base, ctx)?));
        }

        if self.cursor.eat(&TokenKind::Const) {
            if ctx == ParseTypeContext::StructMember {
                return Err(self.error(errors::member_cannot_be_const(context.location)));
            }
            let inner = self.parse_type(ctx)?;
            return Ok(Some(self.ast.alloc_expr(
                Expr::TypeMetaFunction {
                    op: TypeMetaOp::MakeConst,
                    source: inner,
                },
                context,
            )));
        }

        if self.cursor.check(&TokenKind::Fixed) {
            return Err(self.error(errors::not_yet_implemented(
                context.location,
                "fixed point type support",
            )));
        }

        if self.cursor.check_ident().is_some() {
            let qi = self.parse_qualified_identifier()?;

            // A meta-function name followed by parens is the functional
            // form: `elementType(T)`.
            if let Expr::QualifiedIdentifier(path) = self.ast.expr(qi) {
                if path.is_unqualified() {
                    let name = self.ast.interner.lookup(path.first_part());
                    if let Some(op) = TypeMetaOp::from_name(&name) {
                        if self.cursor.check(&TokenKind::OpenParen) {
                            let mf = self.parse_type_meta_function(context, op)?;
                            return Ok(Some(
                                self.parse_vector_or_array_type_suffixes(mf, ctx)?,
                            ));
                        }
                    }
                }
            }

            return Ok(Some(self.parse_vector_or_array_type_suffixes(qi, ctx)?));
        }

        Ok(None)
    }

    /// Parse `<size>` / `[size]` / `&` / `.meta` suffixes after a type.
    pub(crate) fn parse_vector_or_array_type_suffixes(
        &mut self,
        element: ExprId,
        ctx: ParseTypeContext,
    ) -> CompileResult<ExprId> {
        let context = self.context();
        let start = self.cursor.snapshot();

        if !self.cursor.eat(&TokenKind::LessThan) {
            return self.parse_array_type_suffixes(element, ctx);
        }

        // Inside the chevrons, `>` must close the bracket rather than be a
        // comparison.
        self.ignore_greater_than += 1;
        let size = self.try_parse_expression_ignoring_errors();
        self.ignore_greater_than -= 1;

        let size = match size {
            Some(size) if self.cursor.eat(&TokenKind::GreaterThan) => size,
            _ => {
                // Not a vector size after all (e.g. a comparison).
                self.cursor.restore(start);
                return Ok(element);
            }
        };

        let e = self.ast.alloc_expr(
            Expr::SubscriptWithChevrons {
                lhs: element,
                size,
            },
            context,
        );
        self.parse_array_type_suffixes(e, ctx)
    }

    pub(crate) fn parse_array_type_suffixes(
        &mut self,
        t: ExprId,
        ctx: ParseTypeContext,
    ) -> CompileResult<ExprId> {
        if self.cursor.eat(&TokenKind::OpenBracket) {
            let subscripted = self.parse_subscript_with_brackets(t)?;
            return self.parse_array_type_suffixes(subscripted, ctx);
        }

        if self.cursor.check(&TokenKind::BitwiseAnd) {
            let location = self.location();
            match ctx {
                ParseTypeContext::VariableType => {
                    return Err(self.error(errors::type_cannot_be_reference(location)))
                }
                ParseTypeContext::EventType => {
                    return Err(self.error(errors::event_type_cannot_be_reference(location)))
                }
                ParseTypeContext::StructMember => {
                    return Err(self.error(errors::member_cannot_be_reference(location)))
                }
                ParseTypeContext::UsingDeclTarget => {
                    return Err(self.error(errors::using_cannot_be_reference(location)))
                }
                ParseTypeContext::ProcessorParameter => {
                    return Err(self.error(errors::processor_params_cannot_be_reference(location)))
                }
                // In expression position `&` is the bitwise-and operator;
                // leave it for the expression parser.
                ParseTypeContext::NameOrType | ParseTypeContext::MetaFunctionArgument => {}
                ParseTypeContext::FunctionParameter => {
                    let context = self.context();
                    self.cursor.advance();
                    return Ok(self.ast.alloc_expr(
                        Expr::TypeMetaFunction {
                            op: TypeMetaOp::MakeReference,
                            source: t,
                        },
                        context,
                    ));
                }
            }
        }

        if self.cursor.check(&TokenKind::Dot) {
            return self.parse_dot_operator(t);
        }

        Ok(t)
    }

    /// The functional meta-function form: `elementType(T)`.
    fn parse_type_meta_function(
        &mut self,
        context: Context,
        op: TypeMetaOp,
    ) -> CompileResult<ExprId> {
        self.expect(&TokenKind::OpenParen)?;
        let t = self.parse_type(ParseTypeContext::MetaFunctionArgument)?;
        self.expect(&TokenKind::CloseParen)?;
        Ok(self
            .ast
            .alloc_expr(Expr::TypeMetaFunction { op, source: t }, context))
    }

    /// True when a type expression is definitely const at parse time
    /// (used before resolution has run).
    pub(crate) fn type_expr_is_const(&self, id: ExprId) -> bool {
        if let Some(t) = self.ast.resolve_as_type(id) {
            return t.is_const;
        }
        matches!(
            self.ast.expr(id),
            Expr::TypeMetaFunction {
                op: TypeMetaOp::MakeConst,
                ..
            }
        )
    }
}
