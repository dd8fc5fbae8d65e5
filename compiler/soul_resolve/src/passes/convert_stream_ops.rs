//! Stream-operation conversion.
//!
//! `out << value` parses as a left-shift whose LHS is an output endpoint
//! (or an element of one, or a chained write); this pass rewrites it into
//! an explicit `WriteToEndpoint` node.

use crate::lookup::ScopeStack;
use crate::passes::scope_tracked_visits;
use soul_diagnostic::{CompileError, CompileResult};
use soul_ir::ast::visit::{rewalk_expr, RewritingVisitor};
use soul_ir::ast::{AstAllocator, Expr, ExprId, ModuleId};
use soul_ir::BinaryOperator;

pub(crate) struct ConvertStreamOperations<'a> {
    pub ast: &'a mut AstAllocator,
    pub module: ModuleId,
    pub scopes: ScopeStack,
    pub num_fails: usize,
    pub items_replaced: usize,
}

impl<'a> ConvertStreamOperations<'a> {
    pub fn new(ast: &'a mut AstAllocator, module: ModuleId) -> Self {
        ConvertStreamOperations {
            ast,
            module,
            scopes: ScopeStack::new(module),
            num_fails: 0,
            items_replaced: 0,
        }
    }

    pub fn perform(&mut self) -> CompileResult<()> {
        self.visit_module_content(self.module)
    }
}

impl<'a> RewritingVisitor for ConvertStreamOperations<'a> {
    type Error = CompileError;

    fn ast_mut(&mut self) -> &mut AstAllocator {
        self.ast
    }

    scope_tracked_visits!();

    fn visit_expr(&mut self, id: ExprId) -> CompileResult<()> {
        rewalk_expr(self, id)?;

        if let Expr::BinaryOp {
            op: BinaryOperator::LeftShift,
            lhs,
            rhs,
        } = *self.ast.expr(id)
        {
            if self.ast.is_output_endpoint(lhs) {
                self.ast.replace_expr(
                    id,
                    Expr::WriteToEndpoint {
                        target: lhs,
                        value: rhs,
                    },
                );
                self.items_replaced += 1;
            }
        }
        Ok(())
    }
}
