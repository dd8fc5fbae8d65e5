//! Tokeniser for SOUL source text.
//!
//! Built on a `logos` DFA over the raw lexemes, with a conversion layer
//! that cooks literals and interns identifiers. The lexer never stops at
//! an error: bad input produces an `Error` token plus a diagnostic, and
//! lexing continues, so the parser always sees a complete,
//! `Eof`-terminated stream.
//!
//! # Identifier limits
//!
//! Identifiers start with a letter, continue with letters, digits, and
//! underscores, and are capped at 255 bytes; longer names produce a
//! diagnostic.

mod parse_helpers;
mod raw_token;

use logos::Logos;
use parse_helpers::{cook_string, parse_float, parse_int, CookedFloat, CookedInt};
use raw_token::RawToken;
use soul_diagnostic::{errors, Diagnostic};
use soul_ir::{FileId, SourceRef, Span, StringInterner, Token, TokenKind, TokenList};

/// Longest permitted identifier, in bytes.
pub const MAX_IDENTIFIER_LENGTH: usize = 255;

/// Result of lexing one source unit.
pub struct LexResult {
    pub tokens: TokenList,
    pub diagnostics: Vec<Diagnostic>,
}

impl LexResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Lex a source unit into an `Eof`-terminated [`TokenList`].
pub fn lex(source: &str, file: FileId, interner: &StringInterner) -> LexResult {
    let mut tokens = TokenList::new();
    let mut diagnostics = Vec::new();
    let mut lexer = RawToken::lexer(source);

    while let Some(result) = lexer.next() {
        let span = Span::from_range(lexer.span());
        let slice = lexer.slice();

        match result {
            Ok(raw) => {
                let kind = convert(raw, slice, span, file, interner, &mut diagnostics);
                tokens.push(Token::new(kind, span));
            }
            Err(()) => {
                let location = SourceRef::new(file, span);
                if slice.starts_with('"') {
                    diagnostics.push(errors::unterminated_string(location));
                } else if slice.starts_with("/*") {
                    diagnostics.push(errors::unterminated_comment(location));
                } else {
                    diagnostics.push(errors::unknown_character(location, slice));
                }
                tokens.push(Token::new(TokenKind::Error, span));
            }
        }
    }

    tokens.push(Token::new(
        TokenKind::Eof,
        Span::point(u32::try_from(source.len()).unwrap_or(u32::MAX)),
    ));

    LexResult {
        tokens,
        diagnostics,
    }
}

fn convert(
    raw: RawToken,
    slice: &str,
    span: Span,
    file: FileId,
    interner: &StringInterner,
    diagnostics: &mut Vec<Diagnostic>,
) -> TokenKind {
    use RawToken as R;
    use TokenKind as T;

    match raw {
        R::Ident => {
            if slice.len() > MAX_IDENTIFIER_LENGTH {
                diagnostics.push(errors::name_too_long(
                    SourceRef::new(file, span),
                    &slice[..32],
                ));
                return T::Error;
            }
            T::Ident(interner.intern(slice))
        }

        R::IntLiteral => match parse_int(slice) {
            CookedInt::Int32(v) => T::Int32(v),
            CookedInt::Int64(v) => T::Int64(v),
            CookedInt::TooLarge => {
                diagnostics.push(errors::integer_literal_too_large(SourceRef::new(file, span)));
                T::Error
            }
        },

        R::FloatLiteral => match parse_float(slice) {
            CookedFloat::Float32(v) => T::float32(v),
            CookedFloat::Float64(v) => T::float64(v),
        },

        R::StringLiteral => {
            let contents = &slice[1..slice.len() - 1];
            T::String(interner.intern(&cook_string(contents)))
        }

        R::If => T::If,
        R::Else => T::Else,
        R::Do => T::Do,
        R::While => T::While,
        R::For => T::For,
        R::Loop => T::Loop,
        R::Break => T::Break,
        R::Continue => T::Continue,
        R::Return => T::Return,
        R::Const => T::Const,
        R::Let => T::Let,
        R::Var => T::Var,
        R::Void => T::Void,
        R::Int => T::Int,
        R::Int32 => T::Int32Type,
        R::Int64 => T::Int64Type,
        R::Float => T::Float,
        R::Float32 => T::Float32Type,
        R::Float64 => T::Float64Type,
        R::Fixed => T::Fixed,
        R::Bool => T::Bool,
        R::True => T::True,
        R::False => T::False,
        R::String => T::StringType,
        R::Struct => T::Struct,
        R::Using => T::Using,
        R::External => T::External,
        R::Graph => T::Graph,
        R::Processor => T::Processor,
        R::Namespace => T::Namespace,
        R::Input => T::Input,
        R::Output => T::Output,
        R::Connection => T::Connection,
        R::Event => T::Event,
        R::Import => T::Import,
        R::Try => T::Try,
        R::Catch => T::Catch,
        R::Throw => T::Throw,
        R::Switch => T::Switch,
        R::Case => T::Case,
        R::Default => T::Default,
        R::Enum => T::Enum,

        R::Semicolon => T::Semicolon,
        R::Comma => T::Comma,
        R::Dot => T::Dot,
        R::DoubleColon => T::DoubleColon,
        R::Colon => T::Colon,
        R::Question => T::Question,
        R::OpenParen => T::OpenParen,
        R::CloseParen => T::CloseParen,
        R::OpenBrace => T::OpenBrace,
        R::CloseBrace => T::CloseBrace,
        R::OpenBracket => T::OpenBracket,
        R::CloseBracket => T::CloseBracket,
        R::OpenDoubleBracket => T::OpenDoubleBracket,
        R::CloseDoubleBracket => T::CloseDoubleBracket,
        R::RightArrow => T::RightArrow,
        R::Assign => T::Assign,
        R::Equals => T::Equals,
        R::NotEquals => T::NotEquals,
        R::LessThan => T::LessThan,
        R::LessThanOrEqual => T::LessThanOrEqual,
        R::GreaterThan => T::GreaterThan,
        R::GreaterThanOrEqual => T::GreaterThanOrEqual,
        R::Plus => T::Plus,
        R::Minus => T::Minus,
        R::Times => T::Times,
        R::Divide => T::Divide,
        R::Modulo => T::Modulo,
        R::PlusPlus => T::PlusPlus,
        R::MinusMinus => T::MinusMinus,
        R::PlusEquals => T::PlusEquals,
        R::MinusEquals => T::MinusEquals,
        R::TimesEquals => T::TimesEquals,
        R::DivideEquals => T::DivideEquals,
        R::ModuloEquals => T::ModuloEquals,
        R::LeftShift => T::LeftShift,
        R::RightShift => T::RightShift,
        R::RightShiftUnsigned => T::RightShiftUnsigned,
        R::LeftShiftEquals => T::LeftShiftEquals,
        R::RightShiftEquals => T::RightShiftEquals,
        R::RightShiftUnsignedEquals => T::RightShiftUnsignedEquals,
        R::LogicalAnd => T::LogicalAnd,
        R::LogicalOr => T::LogicalOr,
        R::LogicalNot => T::LogicalNot,
        R::BitwiseAnd => T::BitwiseAnd,
        R::BitwiseOr => T::BitwiseOr,
        R::BitwiseXor => T::BitwiseXor,
        R::BitwiseNot => T::BitwiseNot,
        R::AndEquals => T::AndEquals,
        R::OrEquals => T::OrEquals,
        R::XorEquals => T::XorEquals,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let interner = StringInterner::new();
        let result = lex(source, FileId(0), &interner);
        assert!(!result.has_errors(), "unexpected lex errors");
        result.tokens.iter().map(|t| t.kind.clone()).collect()
    }

    #[test]
    fn keywords_and_idents() {
        let interner = StringInterner::new();
        let result = lex("processor Gain { }", FileId(0), &interner);
        let kinds: Vec<_> = result.tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(kinds[0], TokenKind::Processor);
        assert_eq!(kinds[1], TokenKind::Ident(interner.intern("Gain")));
        assert_eq!(kinds[2], TokenKind::OpenBrace);
        assert_eq!(kinds[3], TokenKind::CloseBrace);
        assert_eq!(kinds[4], TokenKind::Eof);
    }

    #[test]
    fn numeric_literal_kinds() {
        assert_eq!(kinds("42")[0], TokenKind::Int32(42));
        assert_eq!(kinds("42L")[0], TokenKind::Int64(42));
        assert_eq!(kinds("0x10")[0], TokenKind::Int32(16));
        assert_eq!(kinds("2.5")[0], TokenKind::float64(2.5));
        assert_eq!(kinds("2.5f")[0], TokenKind::float32(2.5));
        assert_eq!(kinds("1e3")[0], TokenKind::float64(1000.0));
    }

    #[test]
    fn adjacent_minus_lexes_into_literal() {
        let interner = StringInterner::new();
        let result = lex("x -1", FileId(0), &interner);
        let kinds: Vec<_> = result.tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(kinds[1], TokenKind::Int32(-1));

        let result = lex("x - 1", FileId(0), &interner);
        let kinds: Vec<_> = result.tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(kinds[1], TokenKind::Minus);
        assert_eq!(kinds[2], TokenKind::Int32(1));
    }

    #[test]
    fn multi_char_operators() {
        assert_eq!(kinds(">>>=")[0], TokenKind::RightShiftUnsignedEquals);
        assert_eq!(kinds(">>=")[0], TokenKind::RightShiftEquals);
        assert_eq!(kinds("[[")[0], TokenKind::OpenDoubleBracket);
        assert_eq!(kinds("]]")[0], TokenKind::CloseDoubleBracket);
        assert_eq!(kinds("::")[0], TokenKind::DoubleColon);
    }

    #[test]
    fn comments_are_skipped() {
        let toks = kinds("1 // comment\n/* block\n comment */ 2");
        assert_eq!(toks[0], TokenKind::Int32(1));
        assert_eq!(toks[1], TokenKind::Int32(2));
    }

    #[test]
    fn string_literal_interned_with_escapes() {
        let interner = StringInterner::new();
        let result = lex(r#""a\nb""#, FileId(0), &interner);
        assert_eq!(
            result.tokens[0].kind,
            TokenKind::String(interner.intern("a\nb"))
        );
    }

    #[test]
    fn unknown_character_reports_and_continues() {
        let interner = StringInterner::new();
        let result = lex("1 @ 2", FileId(0), &interner);
        assert!(result.has_errors());
        let kinds: Vec<_> = result.tokens.iter().map(|t| t.kind.clone()).collect();
        assert_eq!(kinds[0], TokenKind::Int32(1));
        assert_eq!(kinds[1], TokenKind::Error);
        assert_eq!(kinds[2], TokenKind::Int32(2));
    }

    #[test]
    fn identifier_length_cap() {
        let interner = StringInterner::new();
        let long = format!("x{}", "a".repeat(300));
        let result = lex(&long, FileId(0), &interner);
        assert!(result.has_errors());
    }
}
