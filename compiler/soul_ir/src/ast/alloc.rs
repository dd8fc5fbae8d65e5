//! Arena allocation for the AST.
//!
//! One allocator owns every node, table, and interned string of a
//! compilation; dropping it releases everything at once. Ids are indices
//! into the arenas, so a slot can be re-targeted in place during
//! resolution.

use super::*;
use crate::constant_table::ConstantTable;
use crate::string_dictionary::StringDictionary;
use crate::types::StructStore;
use crate::{Name, StringInterner};
use rustc_hash::FxHashMap;

/// Pre-interned names the compiler tests against frequently.
pub struct KnownNames {
    pub run: Name,
    pub advance: Name,
    pub static_assert: Name,
    pub at: Name,
    pub wrap: Name,
    pub clamp: Name,
    pub pi: Name,
    pub two_pi: Name,
    pub nan: Name,
    pub inf: Name,
    pub main: Name,
    pub intrin: Name,
    pub stream: Name,
    pub value: Name,
    pub soul: Name,
    pub intrinsics: Name,
}

impl KnownNames {
    fn new(interner: &StringInterner) -> Self {
        KnownNames {
            run: interner.intern("run"),
            advance: interner.intern("advance"),
            static_assert: interner.intern("static_assert"),
            at: interner.intern("at"),
            wrap: interner.intern("wrap"),
            clamp: interner.intern("clamp"),
            pi: interner.intern("pi"),
            two_pi: interner.intern("twoPi"),
            nan: interner.intern("nan"),
            inf: interner.intern("inf"),
            main: interner.intern("main"),
            intrin: interner.intern("intrin"),
            stream: interner.intern("stream"),
            value: interner.intern("value"),
            soul: interner.intern("soul"),
            intrinsics: interner.intern("intrinsics"),
        }
    }
}

/// Owns all AST nodes and per-compilation tables.
pub struct AstAllocator {
    pub interner: StringInterner,
    pub string_dictionary: StringDictionary,
    pub constant_table: ConstantTable,
    pub structs: StructStore,
    pub names: KnownNames,

    exprs: Vec<Expr>,
    expr_contexts: Vec<Context>,
    stmts: Vec<Stmt>,
    stmt_contexts: Vec<Context>,
    blocks: Vec<Block>,
    vars: Vec<Variable>,
    functions: Vec<Function>,
    modules: Vec<Module>,
    endpoints: Vec<EndpointDecl>,
    struct_decls: Vec<StructDecl>,
    usings: Vec<UsingDecl>,
}

impl AstAllocator {
    pub fn new() -> Self {
        let interner = StringInterner::new();
        let names = KnownNames::new(&interner);
        AstAllocator {
            interner,
            string_dictionary: StringDictionary::new(),
            constant_table: ConstantTable::new(),
            structs: StructStore::new(),
            names,
            exprs: Vec::new(),
            expr_contexts: Vec::new(),
            stmts: Vec::new(),
            stmt_contexts: Vec::new(),
            blocks: Vec::new(),
            vars: Vec::new(),
            functions: Vec::new(),
            modules: Vec::new(),
            endpoints: Vec::new(),
            struct_decls: Vec::new(),
            usings: Vec::new(),
        }
    }

    // ---- expressions ----

    pub fn alloc_expr(&mut self, expr: Expr, context: Context) -> ExprId {
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(expr);
        self.expr_contexts.push(context);
        id
    }

    #[inline]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.index()]
    }

    #[inline]
    pub fn expr_context(&self, id: ExprId) -> Context {
        self.expr_contexts[id.index()]
    }

    /// Re-target a slot: every parent referring to `id` now sees the new
    /// node. The context is preserved.
    pub fn replace_expr(&mut self, id: ExprId, expr: Expr) {
        self.exprs[id.index()] = expr;
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut Expr {
        &mut self.exprs[id.index()]
    }

    pub fn num_exprs(&self) -> usize {
        self.exprs.len()
    }

    // ---- statements ----

    pub fn alloc_stmt(&mut self, stmt: Stmt, context: Context) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(stmt);
        self.stmt_contexts.push(context);
        id
    }

    #[inline]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.index()]
    }

    #[inline]
    pub fn stmt_context(&self, id: StmtId) -> Context {
        self.stmt_contexts[id.index()]
    }

    pub fn replace_stmt(&mut self, id: StmtId, stmt: Stmt) {
        self.stmts[id.index()] = stmt;
    }

    // ---- blocks ----

    pub fn alloc_block(&mut self, block: Block) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(block);
        id
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    // ---- variables ----

    pub fn alloc_variable(&mut self, var: Variable) -> VarId {
        let id = VarId(self.vars.len() as u32);
        self.vars.push(var);
        id
    }

    #[inline]
    pub fn variable(&self, id: VarId) -> &Variable {
        &self.vars[id.index()]
    }

    pub fn variable_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.vars[id.index()]
    }

    pub fn num_variables(&self) -> usize {
        self.vars.len()
    }

    pub fn variable_ids(&self) -> impl Iterator<Item = VarId> {
        (0..self.vars.len() as u32).map(VarId)
    }

    // ---- functions ----

    pub fn alloc_function(&mut self, function: Function) -> FuncId {
        let id = FuncId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    #[inline]
    pub fn function(&self, id: FuncId) -> &Function {
        &self.functions[id.index()]
    }

    pub fn function_mut(&mut self, id: FuncId) -> &mut Function {
        &mut self.functions[id.index()]
    }

    // ---- modules ----

    pub fn alloc_module(&mut self, module: Module) -> ModuleId {
        let id = ModuleId(self.modules.len() as u32);
        self.modules.push(module);
        id
    }

    #[inline]
    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.index()]
    }

    pub fn module_mut(&mut self, id: ModuleId) -> &mut Module {
        &mut self.modules[id.index()]
    }

    /// Fully qualified path of a module, without the invisible root.
    pub fn module_path(&self, id: ModuleId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(id);
        while let Some(m) = current {
            let module = self.module(m);
            if module.parent.is_some() {
                parts.push(self.interner.lookup(module.name));
            }
            current = module.parent;
        }
        parts.reverse();
        parts.join("::")
    }

    // ---- endpoints ----

    pub fn alloc_endpoint(&mut self, endpoint: EndpointDecl) -> EndpointId {
        let id = EndpointId(self.endpoints.len() as u32);
        self.endpoints.push(endpoint);
        id
    }

    #[inline]
    pub fn endpoint(&self, id: EndpointId) -> &EndpointDecl {
        &self.endpoints[id.index()]
    }

    pub fn endpoint_mut(&mut self, id: EndpointId) -> &mut EndpointDecl {
        &mut self.endpoints[id.index()]
    }

    // ---- struct and using declarations ----

    pub fn alloc_struct_decl(&mut self, decl: StructDecl) -> StructDeclId {
        let id = StructDeclId(self.struct_decls.len() as u32);
        self.struct_decls.push(decl);
        id
    }

    #[inline]
    pub fn struct_decl(&self, id: StructDeclId) -> &StructDecl {
        &self.struct_decls[id.index()]
    }

    pub fn struct_decl_mut(&mut self, id: StructDeclId) -> &mut StructDecl {
        &mut self.struct_decls[id.index()]
    }

    pub fn alloc_using(&mut self, decl: UsingDecl) -> UsingId {
        let id = UsingId(self.usings.len() as u32);
        self.usings.push(decl);
        id
    }

    #[inline]
    pub fn using(&self, id: UsingId) -> &UsingDecl {
        &self.usings[id.index()]
    }

    pub fn using_mut(&mut self, id: UsingId) -> &mut UsingDecl {
        &mut self.usings[id.index()]
    }

    // ---- generic function cloning ----

    /// Deep-clone a function's sub-tree for generic specialisation.
    ///
    /// Parameters and local variable declarations get fresh ids; the body
    /// of a generic function is otherwise unresolved (name resolution
    /// skips generic functions), so expression nodes clone structurally.
    pub fn clone_function(&mut self, source: FuncId) -> FuncId {
        let original = self.function(source).clone();

        // Allocate the clone first so block scope links can point at it.
        let id = self.alloc_function(Function {
            context: original.context,
            name: original.name,
            name_context: original.name_context,
            module: original.module,
            return_type: original.return_type,
            parameters: Vec::new(),
            generic_wildcards: original.generic_wildcards.clone(),
            generic_specialisations: Vec::new(),
            block: None,
            annotation: original.annotation.clone(),
            intrinsic: original.intrinsic,
            is_event_handler: original.is_event_handler,
            original_generic: Some(source),
        });

        let mut cloner = FunctionCloner {
            var_map: FxHashMap::default(),
            block_map: FxHashMap::default(),
        };

        let parameters: Vec<VarId> = original
            .parameters
            .iter()
            .map(|&p| cloner.clone_variable(self, p))
            .collect();

        let return_type = cloner.clone_expr(self, original.return_type);
        let block = original.block.map(|b| cloner.clone_stmt(self, b));

        // Re-point cloned block scopes into the clone.
        let block_map = cloner.block_map.clone();
        for (_, &new_block) in &block_map {
            let parent = self.block(new_block).parent;
            let remapped = match parent {
                ScopeRef::Block(old) => ScopeRef::Block(*block_map.get(&old).unwrap_or(&old)),
                ScopeRef::Function(_) => ScopeRef::Function(id),
                other => other,
            };
            let b = self.block_mut(new_block);
            b.parent = remapped;
            if b.function.is_some() {
                b.function = Some(id);
            }
        }

        let f = self.function_mut(id);
        f.parameters = parameters;
        f.return_type = return_type;
        f.block = block;
        id
    }
}

impl Default for AstAllocator {
    fn default() -> Self {
        AstAllocator::new()
    }
}

struct FunctionCloner {
    var_map: FxHashMap<VarId, VarId>,
    block_map: FxHashMap<BlockId, BlockId>,
}

impl FunctionCloner {
    fn clone_variable(&mut self, ast: &mut AstAllocator, id: VarId) -> VarId {
        if let Some(&mapped) = self.var_map.get(&id) {
            return mapped;
        }
        let mut var = ast.variable(id).clone();
        var.declared_type = var.declared_type.map(|e| self.clone_expr(ast, e));
        var.initial_value = var.initial_value.map(|e| self.clone_expr(ast, e));
        var.num_reads = 0;
        var.num_writes = 0;
        let new_id = ast.alloc_variable(var);
        self.var_map.insert(id, new_id);
        new_id
    }

    fn clone_expr(&mut self, ast: &mut AstAllocator, id: ExprId) -> ExprId {
        let context = ast.expr_context(id);
        let node = ast.expr(id).clone();
        let cloned = match node {
            Expr::Constant(v) => Expr::Constant(v),
            Expr::QualifiedIdentifier(path) => Expr::QualifiedIdentifier(path),
            Expr::VariableRef(v) => Expr::VariableRef(self.clone_variable(ast, v)),
            Expr::ProcessorRef(m) => Expr::ProcessorRef(m),
            Expr::InputEndpointRef(e) => Expr::InputEndpointRef(e),
            Expr::OutputEndpointRef(e) => Expr::OutputEndpointRef(e),
            Expr::ConcreteType(t) => Expr::ConcreteType(t),
            Expr::SubscriptWithBrackets { lhs, index } => Expr::SubscriptWithBrackets {
                lhs: self.clone_expr(ast, lhs),
                index: index.map(|e| self.clone_expr(ast, e)),
            },
            Expr::SubscriptWithChevrons { lhs, size } => Expr::SubscriptWithChevrons {
                lhs: self.clone_expr(ast, lhs),
                size: self.clone_expr(ast, size),
            },
            Expr::TypeMetaFunction { op, source } => Expr::TypeMetaFunction {
                op,
                source: self.clone_expr(ast, source),
            },
            Expr::TypeCast { target, source } => Expr::TypeCast {
                target,
                source: self.clone_expr(ast, source),
            },
            Expr::CallOrCast {
                name_or_type,
                args,
                is_method,
            } => Expr::CallOrCast {
                name_or_type: self.clone_expr(ast, name_or_type),
                args: args.map(|e| self.clone_expr(ast, e)),
                is_method,
            },
            Expr::FunctionCall { function, args } => Expr::FunctionCall {
                function,
                args: args.map(|e| self.clone_expr(ast, e)),
            },
            Expr::UnaryOp { op, source } => Expr::UnaryOp {
                op,
                source: self.clone_expr(ast, source),
            },
            Expr::BinaryOp { op, lhs, rhs } => Expr::BinaryOp {
                op,
                lhs: self.clone_expr(ast, lhs),
                rhs: self.clone_expr(ast, rhs),
            },
            Expr::TernaryOp {
                condition,
                true_branch,
                false_branch,
            } => Expr::TernaryOp {
                condition: self.clone_expr(ast, condition),
                true_branch: self.clone_expr(ast, true_branch),
                false_branch: self.clone_expr(ast, false_branch),
            },
            Expr::Assignment { target, new_value } => Expr::Assignment {
                target: self.clone_expr(ast, target),
                new_value: self.clone_expr(ast, new_value),
            },
            Expr::PreOrPostIncDec {
                target,
                is_increment,
                is_post,
            } => Expr::PreOrPostIncDec {
                target: self.clone_expr(ast, target),
                is_increment,
                is_post,
            },
            Expr::CommaSeparatedList { items } => Expr::CommaSeparatedList {
                items: items.into_iter().map(|e| self.clone_expr(ast, e)).collect(),
            },
            Expr::ArrayElementRef {
                object,
                start,
                end,
                is_slice,
                suppress_wrap_warning,
            } => Expr::ArrayElementRef {
                object: self.clone_expr(ast, object),
                start: self.clone_expr(ast, start),
                end: end.map(|e| self.clone_expr(ast, e)),
                is_slice,
                suppress_wrap_warning,
            },
            Expr::StructMemberRef {
                object,
                structure,
                member_index,
            } => Expr::StructMemberRef {
                object: self.clone_expr(ast, object),
                structure,
                member_index,
            },
            Expr::DotOperator { lhs, rhs } => Expr::DotOperator {
                lhs: self.clone_expr(ast, lhs),
                rhs,
            },
            Expr::WriteToEndpoint { target, value } => Expr::WriteToEndpoint {
                target: self.clone_expr(ast, target),
                value: self.clone_expr(ast, value),
            },
            Expr::ProcessorProperty(p) => Expr::ProcessorProperty(p),
            Expr::AdvanceClock => Expr::AdvanceClock,
            Expr::StaticAssertion { condition, message } => Expr::StaticAssertion {
                condition: self.clone_expr(ast, condition),
                message,
            },
        };
        ast.alloc_expr(cloned, context)
    }

    fn clone_stmt(&mut self, ast: &mut AstAllocator, id: StmtId) -> StmtId {
        let context = ast.stmt_context(id);
        let node = ast.stmt(id).clone();
        let cloned = match node {
            Stmt::Block(block_id) => {
                let block = ast.block(block_id).clone();
                let new_block = ast.alloc_block(Block {
                    context: block.context,
                    parent: block.parent,
                    function: block.function,
                    statements: Vec::new(),
                });
                self.block_map.insert(block_id, new_block);
                let statements: Vec<StmtId> = block
                    .statements
                    .iter()
                    .map(|&s| self.clone_stmt(ast, s))
                    .collect();
                ast.block_mut(new_block).statements = statements;
                Stmt::Block(new_block)
            }
            Stmt::Expression(e) => Stmt::Expression(self.clone_expr(ast, e)),
            Stmt::VariableDeclaration(v) => {
                Stmt::VariableDeclaration(self.clone_variable(ast, v))
            }
            Stmt::If {
                condition,
                true_branch,
                false_branch,
            } => Stmt::If {
                condition: self.clone_expr(ast, condition),
                true_branch: self.clone_stmt(ast, true_branch),
                false_branch: false_branch.map(|s| self.clone_stmt(ast, s)),
            },
            Stmt::Loop {
                is_do,
                condition,
                num_iterations,
                iterator,
                body,
            } => Stmt::Loop {
                is_do,
                condition: condition.map(|e| self.clone_expr(ast, e)),
                num_iterations: num_iterations.map(|e| self.clone_expr(ast, e)),
                iterator: iterator.map(|e| self.clone_expr(ast, e)),
                body: self.clone_stmt(ast, body),
            },
            Stmt::Return { value } => Stmt::Return {
                value: value.map(|e| self.clone_expr(ast, e)),
            },
            Stmt::Break => Stmt::Break,
            Stmt::Continue => Stmt::Continue,
            Stmt::Noop => Stmt::Noop,
        };
        ast.alloc_stmt(cloned, context)
    }
}
