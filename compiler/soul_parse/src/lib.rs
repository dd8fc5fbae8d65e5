//! Recursive-descent structural parser for SOUL.
//!
//! Produces a rough AST: names stay as qualified identifiers, calls and
//! casts share one node, and subscripts are ambiguous between types and
//! values. The resolution engine refines all of that later; this crate
//! only enforces the surface grammar.
//!
//! Parse errors are fatal: the first one aborts the parse of the source
//! unit, matching the rest of the pipeline's all-or-nothing treatment of
//! a translation unit.

mod cursor;
mod grammar;
pub mod render;

#[cfg(test)]
mod tests;

pub use cursor::{Cursor, CursorSnapshot};
pub use render::{render_module, render_program};

use soul_diagnostic::{errors, CompileError, CompileResult};
use soul_ir::ast::{AstAllocator, Context, ModuleId, ScopeRef};
use soul_ir::{FileId, SourceRef, TokenKind, TokenList};

/// Parser state for one source unit.
pub struct Parser<'a> {
    cursor: Cursor<'a>,
    ast: &'a mut AstAllocator,
    file: FileId,
    /// The module currently being filled in.
    module: ModuleId,
    /// The scope new declarations land in.
    scope: ScopeRef,
    /// While positive, `>` is not consumed as a comparison operator; this
    /// is how `float<2 + 2>` keeps its closing chevron.
    ignore_greater_than: u32,
}

/// Parse a source unit's top-level declarations into `root` (a namespace
/// module), appending the new modules to its sub-module list.
pub fn parse_top_level(
    ast: &mut AstAllocator,
    tokens: &TokenList,
    file: FileId,
    root: ModuleId,
) -> CompileResult<()> {
    let mut parser = Parser {
        cursor: Cursor::new(tokens),
        ast,
        file,
        module: root,
        scope: ScopeRef::Module(root),
        ignore_greater_than: 0,
    };
    parser.parse_top_level_decls(root)
}

impl<'a> Parser<'a> {
    // ---- context and errors ----

    fn context(&self) -> Context {
        Context::new(SourceRef::new(self.file, self.cursor.current_span()))
    }

    fn location(&self) -> SourceRef {
        SourceRef::new(self.file, self.cursor.current_span())
    }

    fn error(&self, diagnostic: soul_diagnostic::Diagnostic) -> CompileError {
        CompileError::new(diagnostic)
    }

    /// Error for an unexpected current token.
    fn expected(&self, what: &str) -> CompileError {
        CompileError::new(errors::found_instead(
            self.location(),
            what,
            &self.cursor.current_kind().describe(),
        ))
    }

    fn expect(&mut self, kind: &TokenKind) -> CompileResult<()> {
        if self.cursor.eat(kind) {
            Ok(())
        } else {
            Err(self.expected(&kind.describe()))
        }
    }

    fn parse_identifier(&mut self) -> CompileResult<soul_ir::Name> {
        self.cursor
            .eat_ident()
            .ok_or_else(|| self.expected("identifier"))
    }

    fn give_error_on_semicolon(&self) -> CompileResult<()> {
        if self.cursor.check(&TokenKind::Semicolon) {
            return Err(self.error(errors::semicolon_after_brace(self.location())));
        }
        Ok(())
    }

    fn give_error_on_external_keyword(&self) -> CompileResult<()> {
        if self.cursor.check(&TokenKind::External) {
            return Err(self.error(errors::external_only_on_state_vars(self.location())));
        }
        Ok(())
    }

    // ---- scope handling ----

    fn with_scope<T>(
        &mut self,
        scope: ScopeRef,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let old = self.scope;
        self.scope = scope;
        let result = f(self);
        self.scope = old;
        result
    }

    fn with_module<T>(
        &mut self,
        module: ModuleId,
        f: impl FnOnce(&mut Self) -> CompileResult<T>,
    ) -> CompileResult<T> {
        let old = self.module;
        self.module = module;
        let result = self.with_scope(ScopeRef::Module(module), f);
        self.module = old;
        result
    }

    /// The block new statements are being added to.
    fn current_block(&self) -> soul_ir::ast::BlockId {
        match self.scope {
            ScopeRef::Block(b) => b,
            _ => unreachable!("statements are always parsed inside a block"),
        }
    }

    fn current_module(&self) -> ModuleId {
        self.module
    }

    fn scope(&self) -> ScopeRef {
        self.scope
    }
}
