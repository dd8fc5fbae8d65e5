//! Token cursor for navigating the token stream.
//!
//! Provides lookahead, consumption, and speculative-parse support: a
//! [`CursorSnapshot`] captures the full cursor state so the parser can
//! rewind after a tentative parse (types and expressions share a subset of
//! syntax, so the parser routinely tries one and falls back).
//!
//! The cursor can also split a `]]` token into two `]`s: closing a
//! subscript nested inside another (`a[b[i]]`) consumes the first half and
//! leaves a pending `]` as the current token.

use soul_ir::{Span, Token, TokenKind, TokenList};

pub struct Cursor<'a> {
    tokens: &'a TokenList,
    pos: usize,
    /// Set when the first half of a `]]` has been consumed; the current
    /// token then reads as a single `]`.
    pending_close_bracket: bool,
}

/// Saved cursor state for speculative parsing.
#[derive(Copy, Clone, Debug)]
pub struct CursorSnapshot {
    pos: usize,
    pending_close_bracket: bool,
}

impl<'a> Cursor<'a> {
    /// Create a cursor at the start of the stream. The list must be
    /// `Eof`-terminated, which the lexer guarantees.
    pub fn new(tokens: &'a TokenList) -> Self {
        debug_assert!(
            matches!(tokens[tokens.len() - 1].kind, TokenKind::Eof),
            "token stream must end with Eof"
        );
        Cursor {
            tokens,
            pos: 0,
            pending_close_bracket: false,
        }
    }

    /// The current token's kind, with a pending `]]` split reading as `]`.
    pub fn current_kind(&self) -> &TokenKind {
        if self.pending_close_bracket {
            &TokenKind::CloseBracket
        } else {
            &self.tokens[self.pos].kind
        }
    }

    pub fn current_span(&self) -> Span {
        self.tokens[self.pos].span
    }

    pub fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::DUMMY
        }
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    pub fn is_at_end(&self) -> bool {
        matches!(self.current_kind(), TokenKind::Eof)
    }

    /// Advance past the current (possibly virtual) token.
    pub fn advance(&mut self) {
        if self.pending_close_bracket {
            self.pending_close_bracket = false;
        }
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
    }

    /// Consume the current token and return its kind.
    pub fn take(&mut self) -> TokenKind {
        let kind = self.current_kind().clone();
        self.advance();
        kind
    }

    pub fn check(&self, kind: &TokenKind) -> bool {
        self.current_kind() == kind
    }

    pub fn check_any(&self, kinds: &[TokenKind]) -> bool {
        kinds.iter().any(|k| self.check(k))
    }

    /// Consume the token if it matches. Requests for `]` match the first
    /// half of a `]]`, leaving the second half pending.
    pub fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        if *kind == TokenKind::CloseBracket
            && !self.pending_close_bracket
            && matches!(self.current_kind(), TokenKind::CloseDoubleBracket)
        {
            self.pending_close_bracket = true;
            return true;
        }
        false
    }

    /// The current identifier, if there is one.
    pub fn check_ident(&self) -> Option<soul_ir::Name> {
        match self.current_kind() {
            TokenKind::Ident(name) => Some(*name),
            _ => None,
        }
    }

    /// Consume and return an identifier.
    pub fn eat_ident(&mut self) -> Option<soul_ir::Name> {
        let name = self.check_ident()?;
        self.advance();
        Some(name)
    }

    // ---- speculative parsing ----

    pub fn snapshot(&self) -> CursorSnapshot {
        CursorSnapshot {
            pos: self.pos,
            pending_close_bracket: self.pending_close_bracket,
        }
    }

    /// Roll back to a snapshot taken earlier. Nodes allocated during the
    /// abandoned parse stay in the arena unreferenced; that is fine, the
    /// arena is bulk-freed with the compilation.
    pub fn restore(&mut self, snapshot: CursorSnapshot) {
        debug_assert!(snapshot.pos <= self.pos, "cannot restore a future snapshot");
        self.pos = snapshot.pos;
        self.pending_close_bracket = snapshot.pending_close_bracket;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use soul_ir::Token;

    fn token_list(kinds: Vec<TokenKind>) -> TokenList {
        let mut list = TokenList::new();
        for (i, kind) in kinds.into_iter().enumerate() {
            list.push(Token::new(kind, Span::new(i as u32, i as u32 + 1)));
        }
        list.push(Token::new(TokenKind::Eof, Span::point(99)));
        list
    }

    #[test]
    fn eat_and_snapshot() {
        let tokens = token_list(vec![TokenKind::OpenParen, TokenKind::Int32(1)]);
        let mut cursor = Cursor::new(&tokens);
        let start = cursor.snapshot();
        assert!(cursor.eat(&TokenKind::OpenParen));
        assert!(cursor.check(&TokenKind::Int32(1)));
        cursor.restore(start);
        assert!(cursor.check(&TokenKind::OpenParen));
    }

    #[test]
    fn close_double_bracket_splits() {
        let tokens = token_list(vec![TokenKind::CloseDoubleBracket, TokenKind::Semicolon]);
        let mut cursor = Cursor::new(&tokens);
        assert!(cursor.eat(&TokenKind::CloseBracket));
        assert!(cursor.check(&TokenKind::CloseBracket));
        assert!(cursor.eat(&TokenKind::CloseBracket));
        assert!(cursor.check(&TokenKind::Semicolon));
    }

    #[test]
    fn advance_stops_at_eof() {
        let tokens = token_list(vec![TokenKind::Semicolon]);
        let mut cursor = Cursor::new(&tokens);
        cursor.advance();
        cursor.advance();
        cursor.advance();
        assert!(cursor.is_at_end());
    }
}
