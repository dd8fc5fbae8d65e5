//! `[[ key: value, ... ]]` annotation sets.
//!
//! Keys may be identifiers, string literals, or keywords; a missing value
//! defaults to `true`.

use crate::Parser;
use soul_diagnostic::CompileResult;
use soul_ir::ast::{Annotation, AnnotationProperty, Expr};
use soul_ir::value::Value;
use soul_ir::{Name, TokenKind};

impl<'a> Parser<'a> {
    pub(crate) fn parse_annotation(&mut self) -> CompileResult<Annotation> {
        let mut annotation = Annotation::default();

        if !self.cursor.eat(&TokenKind::OpenDoubleBracket) {
            return Ok(annotation);
        }
        if self.cursor.eat(&TokenKind::CloseDoubleBracket) {
            return Ok(annotation);
        }

        loop {
            let context = self.context();
            let name = self.parse_annotation_key()?;

            let value = if self.cursor.eat(&TokenKind::Colon) {
                self.parse_expression(false)?
            } else {
                self.ast
                    .alloc_expr(Expr::Constant(Value::bool(true)), context)
            };

            annotation.properties.push(AnnotationProperty {
                name,
                value,
                context,
            });

            if self.cursor.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::CloseDoubleBracket)?;
            return Ok(annotation);
        }
    }

    fn parse_annotation_key(&mut self) -> CompileResult<Name> {
        match self.cursor.current_kind().clone() {
            TokenKind::Ident(name) => {
                self.cursor.advance();
                Ok(name)
            }
            TokenKind::String(name) => {
                self.cursor.advance();
                Ok(name)
            }
            kind => {
                if let Some(text) = kind.keyword_text() {
                    self.cursor.advance();
                    return Ok(self.ast.interner.intern(text));
                }
                Err(self.expected("an annotation key"))
            }
        }
    }
}
