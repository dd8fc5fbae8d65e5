//! Variable use counting.
//!
//! Resets and re-counts every variable's reads and writes. Arguments to
//! by-reference parameters count as writes; arguments to a call that has
//! not resolved yet are pessimistically treated as writes, so a variable
//! is never wrongly considered write-once mid-resolution.

use soul_ir::ast::{AstAllocator, Expr, ExprId, FuncId, ModuleId, ModuleKind, Stmt, StmtId, VarId};

pub(crate) fn rebuild_variable_use_counts(ast: &mut AstAllocator, module: ModuleId) {
    for v in ast.variable_ids().collect::<Vec<_>>() {
        let var = ast.variable_mut(v);
        var.num_reads = 0;
        var.num_writes = 0;
    }

    let mut counter = UseCounter {
        ast,
        is_reading: true,
        is_writing: false,
    };
    counter.count_module(module);
}

struct UseCounter<'a> {
    ast: &'a mut AstAllocator,
    is_reading: bool,
    is_writing: bool,
}

impl<'a> UseCounter<'a> {
    fn count_module(&mut self, module: ModuleId) {
        let m = self.ast.module(module).clone();

        for &v in &m.state_variables {
            self.count_variable_decl(v);
        }
        for &f in &m.functions {
            self.count_function(f);
        }
        if let ModuleKind::Graph { instances, .. } = &m.kind {
            for instance in instances {
                for &arg in &instance.specialisation_args {
                    self.count_expr(arg);
                }
            }
        }
    }

    fn count_function(&mut self, f: FuncId) {
        let function = self.ast.function(f).clone();
        if function.is_generic() {
            return;
        }
        if let Some(block) = function.block {
            self.count_stmt(block);
        }
    }

    fn count_variable_decl(&mut self, v: VarId) {
        if let Some(init) = self.ast.variable(v).initial_value {
            self.count_expr(init);
        }
    }

    fn count_stmt(&mut self, s: StmtId) {
        match self.ast.stmt(s).clone() {
            Stmt::Block(b) => {
                for &s in &self.ast.block(b).statements.clone() {
                    self.count_stmt(s);
                }
            }
            Stmt::Expression(e) => self.count_expr(e),
            Stmt::VariableDeclaration(v) => self.count_variable_decl(v),
            Stmt::If {
                condition,
                true_branch,
                false_branch,
            } => {
                self.count_expr(condition);
                self.count_stmt(true_branch);
                if let Some(f) = false_branch {
                    self.count_stmt(f);
                }
            }
            Stmt::Loop {
                condition,
                num_iterations,
                iterator,
                body,
                ..
            } => {
                if let Some(c) = condition {
                    self.count_expr(c);
                }
                if let Some(n) = num_iterations {
                    self.count_expr(n);
                }
                self.count_stmt(body);
                if let Some(i) = iterator {
                    self.count_expr(i);
                }
            }
            Stmt::Return { value } => {
                if let Some(v) = value {
                    self.count_expr(v);
                }
            }
            Stmt::Break | Stmt::Continue | Stmt::Noop => {}
        }
    }

    fn with_flags(&mut self, reading: bool, writing: bool, e: ExprId) {
        let (old_r, old_w) = (self.is_reading, self.is_writing);
        self.is_reading = reading;
        self.is_writing = writing;
        self.count_expr(e);
        self.is_reading = old_r;
        self.is_writing = old_w;
    }

    fn count_expr(&mut self, e: ExprId) {
        match self.ast.expr(e).clone() {
            Expr::VariableRef(v) => {
                let var = self.ast.variable_mut(v);
                if self.is_writing {
                    var.num_writes += 1;
                } else {
                    var.num_reads += 1;
                }
            }

            Expr::Assignment { target, new_value } => {
                self.with_flags(false, true, target);
                self.count_expr(new_value);
            }

            Expr::PreOrPostIncDec { target, .. } => {
                self.with_flags(true, true, target);
            }

            // The callee is unknown: any argument may be by-reference.
            Expr::CallOrCast { args, .. } => {
                if let Some(args) = args {
                    self.with_flags(self.is_reading, true, args);
                }
            }

            Expr::FunctionCall { function, args } => {
                let params = self.ast.function(function).parameters.clone();
                if let Some(args) = args {
                    if let Expr::CommaSeparatedList { items } = self.ast.expr(args).clone() {
                        for (i, &arg) in items.iter().enumerate() {
                            let writes = match params.get(i) {
                                Some(&p) => match self.ast.variable_type(p) {
                                    Some(t) => t.is_reference,
                                    None => true,
                                },
                                None => true,
                            };
                            if writes {
                                self.with_flags(true, true, arg);
                            } else {
                                self.count_expr(arg);
                            }
                        }
                    }
                }
            }

            other => {
                let mut children = Vec::new();
                crate::sanity::for_each_child(&other, |c| children.push(c));
                for c in children {
                    self.count_expr(c);
                }
            }
        }
    }
}
