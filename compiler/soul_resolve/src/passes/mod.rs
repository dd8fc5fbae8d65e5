//! The resolution passes.
//!
//! One iteration of the engine runs, in order: qualified-identifier
//! resolution, type resolution, stream-operation conversion, a
//! variable-use-count rebuild, function resolution, constant folding, and
//! another use-count rebuild; generic specialisation runs when nothing
//! else made progress. Every pass reports how many names it failed to
//! resolve and how many nodes it rewrote; the engine drives those counts
//! to a fixpoint.

pub(crate) mod constant_folder;
pub(crate) mod convert_stream_ops;
pub(crate) mod full_resolver;
pub(crate) mod function_resolver;
pub(crate) mod qualified_identifier;
pub(crate) mod type_resolver;
pub(crate) mod use_counts;

/// Scope-tracking `visit_block`/`visit_function` overrides shared by the
/// passes: blocks push a visible-statement counter (so later locals do
/// not resolve earlier uses) and generic functions are skipped; they
/// resolve only as specialised clones.
macro_rules! scope_tracked_visits {
    () => {
        fn visit_block(
            &mut self,
            id: soul_ir::ast::BlockId,
        ) -> Result<(), soul_diagnostic::CompileError> {
            self.scopes.push(crate::lookup::ScopeEntry::Block { id, visible: 0 });
            let statements = self.ast.block(id).statements.clone();
            let mut result = Ok(());
            for (i, s) in statements.iter().enumerate() {
                self.scopes.set_block_visible(i + 1);
                result = self.visit_stmt(*s);
                if result.is_err() {
                    break;
                }
            }
            self.scopes.pop();
            result
        }

        fn visit_function(
            &mut self,
            id: soul_ir::ast::FuncId,
        ) -> Result<(), soul_diagnostic::CompileError> {
            if self.ast.function(id).is_generic() {
                return Ok(());
            }
            self.scopes.push(crate::lookup::ScopeEntry::Function(id));
            let result = soul_ir::ast::visit::rewalk_function(self, id);
            self.scopes.pop();
            result
        }
    };
}

pub(crate) use scope_tracked_visits;

/// Convert a call-or-cast into a cast once the target type is known; a
/// single-item argument list unwraps to its item.
pub(crate) fn convert_to_cast(
    ast: &mut soul_ir::ast::AstAllocator,
    call_id: soul_ir::ast::ExprId,
    target: soul_ir::types::Type,
) {
    use soul_ir::ast::Expr;

    let args = match ast.expr(call_id) {
        Expr::CallOrCast { args, .. } => *args,
        _ => unreachable!("convert_to_cast requires a CallOrCast"),
    };

    let source = match args {
        Some(list) => match ast.expr(list) {
            Expr::CommaSeparatedList { items } if items.len() == 1 => items[0],
            _ => list,
        },
        None => {
            let context = ast.expr_context(call_id);
            ast.alloc_expr(
                Expr::CommaSeparatedList { items: Vec::new() },
                context,
            )
        }
    };

    ast.replace_expr(call_id, Expr::TypeCast { target, source });
}
