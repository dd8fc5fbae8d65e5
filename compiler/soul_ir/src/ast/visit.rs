//! Visitor framework.
//!
//! Two pass patterns exist over the AST, mirroring how the resolution
//! engine works:
//!
//! - [`Visitor`]: read-only traversal of every node.
//! - [`RewritingVisitor`]: traversal where a hook may *replace the
//!   visited slot* (via [`AstAllocator::replace_expr`]); every parent
//!   holding the slot's id sees the replacement. Hooks run after their
//!   children (post-order), matching the fixpoint passes, which resolve
//!   leaves first.
//!
//! Every hook defaults to the matching `walk_*`/`rewalk_*` free function;
//! an overriding hook calls the walk first, then inspects or rewrites the
//! node, exactly like calling `super::visit` in a classic visitor.
//!
//! Neither walker descends into sub-modules: the resolution engine
//! recurses modules explicitly so each sub-module gets its own fixpoint.

use super::*;

macro_rules! define_visitor {
    ($trait_name:ident, $ast_method:ident, ($($mutability:tt)*),
     $walk_expr:ident, $walk_stmt:ident, $walk_block:ident, $walk_variable:ident,
     $walk_function:ident, $walk_annotation:ident, $walk_module:ident) => {
        pub trait $trait_name: Sized {
            type Error;

            fn $ast_method(&$($mutability)* self) -> &$($mutability)* AstAllocator;

            fn visit_expr(&mut self, id: ExprId) -> Result<(), Self::Error> {
                $walk_expr(self, id)
            }

            fn visit_stmt(&mut self, id: StmtId) -> Result<(), Self::Error> {
                $walk_stmt(self, id)
            }

            fn visit_block(&mut self, id: BlockId) -> Result<(), Self::Error> {
                $walk_block(self, id)
            }

            fn visit_variable(&mut self, id: VarId) -> Result<(), Self::Error> {
                $walk_variable(self, id)
            }

            fn visit_function(&mut self, id: FuncId) -> Result<(), Self::Error> {
                $walk_function(self, id)
            }

            fn visit_module_content(&mut self, id: ModuleId) -> Result<(), Self::Error> {
                $walk_module(self, id)
            }
        }

        /// Visit every child expression of `id`.
        pub fn $walk_expr<V: $trait_name>(v: &mut V, id: ExprId) -> Result<(), V::Error> {
            let node = v.$ast_method().expr(id).clone();
            match node {
                Expr::Constant(_)
                | Expr::QualifiedIdentifier(_)
                | Expr::VariableRef(_)
                | Expr::ProcessorRef(_)
                | Expr::InputEndpointRef(_)
                | Expr::OutputEndpointRef(_)
                | Expr::ConcreteType(_)
                | Expr::ProcessorProperty(_)
                | Expr::AdvanceClock => {}

                Expr::SubscriptWithBrackets { lhs, index } => {
                    v.visit_expr(lhs)?;
                    if let Some(index) = index {
                        v.visit_expr(index)?;
                    }
                }
                Expr::SubscriptWithChevrons { lhs, size } => {
                    v.visit_expr(lhs)?;
                    v.visit_expr(size)?;
                }
                Expr::TypeMetaFunction { source, .. } => v.visit_expr(source)?,
                Expr::TypeCast { source, .. } => v.visit_expr(source)?,
                Expr::CallOrCast {
                    name_or_type, args, ..
                } => {
                    v.visit_expr(name_or_type)?;
                    if let Some(args) = args {
                        v.visit_expr(args)?;
                    }
                }
                Expr::FunctionCall { args, .. } => {
                    if let Some(args) = args {
                        v.visit_expr(args)?;
                    }
                }
                Expr::UnaryOp { source, .. } => v.visit_expr(source)?,
                Expr::BinaryOp { lhs, rhs, .. } => {
                    v.visit_expr(lhs)?;
                    v.visit_expr(rhs)?;
                }
                Expr::TernaryOp {
                    condition,
                    true_branch,
                    false_branch,
                } => {
                    v.visit_expr(condition)?;
                    v.visit_expr(true_branch)?;
                    v.visit_expr(false_branch)?;
                }
                Expr::Assignment { target, new_value } => {
                    v.visit_expr(target)?;
                    v.visit_expr(new_value)?;
                }
                Expr::PreOrPostIncDec { target, .. } => v.visit_expr(target)?,
                Expr::CommaSeparatedList { items } => {
                    for item in items {
                        v.visit_expr(item)?;
                    }
                }
                Expr::ArrayElementRef {
                    object, start, end, ..
                } => {
                    v.visit_expr(object)?;
                    v.visit_expr(start)?;
                    if let Some(end) = end {
                        v.visit_expr(end)?;
                    }
                }
                Expr::StructMemberRef { object, .. } => v.visit_expr(object)?,
                Expr::DotOperator { lhs, .. } => v.visit_expr(lhs)?,
                Expr::WriteToEndpoint { target, value } => {
                    v.visit_expr(target)?;
                    v.visit_expr(value)?;
                }
                Expr::StaticAssertion { condition, .. } => v.visit_expr(condition)?,
            }
            Ok(())
        }

        /// Visit the children of a statement.
        pub fn $walk_stmt<V: $trait_name>(v: &mut V, id: StmtId) -> Result<(), V::Error> {
            let node = v.$ast_method().stmt(id).clone();
            match node {
                Stmt::Block(block) => v.visit_block(block)?,
                Stmt::Expression(e) => v.visit_expr(e)?,
                Stmt::VariableDeclaration(var) => v.visit_variable(var)?,
                Stmt::If {
                    condition,
                    true_branch,
                    false_branch,
                } => {
                    v.visit_expr(condition)?;
                    v.visit_stmt(true_branch)?;
                    if let Some(false_branch) = false_branch {
                        v.visit_stmt(false_branch)?;
                    }
                }
                Stmt::Loop {
                    condition,
                    num_iterations,
                    iterator,
                    body,
                    ..
                } => {
                    if let Some(n) = num_iterations {
                        v.visit_expr(n)?;
                    }
                    if let Some(c) = condition {
                        v.visit_expr(c)?;
                    }
                    v.visit_stmt(body)?;
                    if let Some(i) = iterator {
                        v.visit_expr(i)?;
                    }
                }
                Stmt::Return { value } => {
                    if let Some(value) = value {
                        v.visit_expr(value)?;
                    }
                }
                Stmt::Break | Stmt::Continue | Stmt::Noop => {}
            }
            Ok(())
        }

        /// Visit every statement in a block.
        pub fn $walk_block<V: $trait_name>(v: &mut V, id: BlockId) -> Result<(), V::Error> {
            let statements = v.$ast_method().block(id).statements.clone();
            for s in statements {
                v.visit_stmt(s)?;
            }
            Ok(())
        }

        /// Visit a variable's type and initialiser expressions.
        pub fn $walk_variable<V: $trait_name>(v: &mut V, id: VarId) -> Result<(), V::Error> {
            let var = v.$ast_method().variable(id);
            let declared = var.declared_type;
            let initial = var.initial_value;
            let annotation = var.annotation.clone();
            if let Some(declared) = declared {
                v.visit_expr(declared)?;
            }
            if let Some(initial) = initial {
                v.visit_expr(initial)?;
            }
            $walk_annotation(v, &annotation)?;
            Ok(())
        }

        /// Visit a function's return type, parameters, and body.
        pub fn $walk_function<V: $trait_name>(v: &mut V, id: FuncId) -> Result<(), V::Error> {
            let f = v.$ast_method().function(id);
            let return_type = f.return_type;
            let parameters = f.parameters.clone();
            let block = f.block;
            let annotation = f.annotation.clone();
            v.visit_expr(return_type)?;
            for p in parameters {
                v.visit_variable(p)?;
            }
            $walk_annotation(v, &annotation)?;
            if let Some(block) = block {
                v.visit_stmt(block)?;
            }
            Ok(())
        }

        /// Visit annotation property values.
        pub fn $walk_annotation<V: $trait_name>(
            v: &mut V,
            annotation: &Annotation,
        ) -> Result<(), V::Error> {
            for property in &annotation.properties {
                v.visit_expr(property.value)?;
            }
            Ok(())
        }

        /// Visit everything declared directly in a module, but not its
        /// sub-modules.
        pub fn $walk_module<V: $trait_name>(v: &mut V, id: ModuleId) -> Result<(), V::Error> {
            let module = v.$ast_method().module(id).clone();

            $walk_annotation(v, &module.annotation)?;

            for &endpoint_id in module.inputs.iter().chain(module.outputs.iter()) {
                let endpoint = v.$ast_method().endpoint(endpoint_id).clone();
                for t in endpoint.sample_types {
                    v.visit_expr(t)?;
                }
                if let Some(size) = endpoint.array_size {
                    v.visit_expr(size)?;
                }
                $walk_annotation(v, &endpoint.annotation)?;
            }

            for &s in &module.structs {
                let members = v.$ast_method().struct_decl(s).members.clone();
                for m in members {
                    v.visit_expr(m.type_expr)?;
                }
            }

            for &u in &module.usings {
                let target = v.$ast_method().using(u).target;
                if let Some(target) = target {
                    v.visit_expr(target)?;
                }
            }

            for &var in &module.state_variables {
                v.visit_variable(var)?;
            }

            for &f in &module.functions {
                v.visit_function(f)?;
            }

            if let ModuleKind::Graph {
                instances,
                connections,
            } = &module.kind
            {
                for instance in instances {
                    v.visit_expr(instance.target)?;
                    if let Some(size) = instance.array_size {
                        v.visit_expr(size)?;
                    }
                    for &arg in &instance.specialisation_args {
                        v.visit_expr(arg)?;
                    }
                    if let Some(m) = instance.clock_multiplier {
                        v.visit_expr(m)?;
                    }
                    if let Some(d) = instance.clock_divider {
                        v.visit_expr(d)?;
                    }
                }
                for connection in connections {
                    if let Some(delay) = connection.delay_length {
                        v.visit_expr(delay)?;
                    }
                }
            }

            Ok(())
        }
    };
}

define_visitor!(
    Visitor,
    ast,
    (),
    walk_expr,
    walk_stmt,
    walk_block,
    walk_variable,
    walk_function,
    walk_annotation,
    walk_module_content
);

define_visitor!(
    RewritingVisitor,
    ast_mut,
    (mut),
    rewalk_expr,
    rewalk_stmt,
    rewalk_block,
    rewalk_variable,
    rewalk_function,
    rewalk_annotation,
    rewalk_module_content
);
