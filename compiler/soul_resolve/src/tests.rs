//! Resolution engine tests: the fixpoint must leave no rough nodes
//! behind, and failures must surface as the right diagnostics.

use crate::ResolutionPass;
use soul_diagnostic::{CompileError, CompileResult};
use soul_ir::ast::visit::{self, Visitor};
use soul_ir::ast::{
    Annotation, AstAllocator, Context, Expr, ExprId, FuncId, Module, ModuleId, ModuleKind, Stmt,
};
use soul_ir::{FileId, Name};

fn parse_only(source: &str) -> (AstAllocator, ModuleId) {
    let mut ast = AstAllocator::new();
    let root = ast.alloc_module(Module {
        context: Context::NONE,
        name: Name::EMPTY,
        parent: None,
        kind: ModuleKind::Namespace {
            imports: Vec::new(),
        },
        annotation: Annotation::default(),
        specialisation_params: Vec::new(),
        inputs: Vec::new(),
        outputs: Vec::new(),
        structs: Vec::new(),
        usings: Vec::new(),
        functions: Vec::new(),
        state_variables: Vec::new(),
        sub_modules: Vec::new(),
        is_fully_resolved: false,
    });
    // The built-in library is part of every compilation.
    let library = soul_lexer::lex(crate::intrinsics::BUILT_IN_LIBRARY, FileId(0), &ast.interner);
    assert!(!library.has_errors(), "lex errors in the built-in library");
    soul_parse::parse_top_level(&mut ast, &library.tokens, FileId(0), root)
        .unwrap_or_else(|e| panic!("built-in library failed to parse: {e}"));

    let lexed = soul_lexer::lex(source, FileId(1), &ast.interner);
    assert!(!lexed.has_errors(), "lex errors in test source");
    soul_parse::parse_top_level(&mut ast, &lexed.tokens, FileId(1), root)
        .unwrap_or_else(|e| panic!("parse failed: {e}"));
    (ast, root)
}

fn resolve(source: &str) -> Result<(AstAllocator, ModuleId), CompileError> {
    let (mut ast, root) = parse_only(source);
    ResolutionPass::run(&mut ast, root, true)?;
    ResolutionPass::run(&mut ast, root, false)?;
    Ok((ast, root))
}

fn resolve_ok(source: &str) -> (AstAllocator, ModuleId) {
    resolve(source).unwrap_or_else(|e| panic!("resolution failed: {e}"))
}

fn error_code(source: &str) -> String {
    match resolve(source) {
        Ok(_) => panic!("expected resolution to fail"),
        Err(e) => e.diagnostic.code.as_str().to_string(),
    }
}

fn find_module(ast: &AstAllocator, root: ModuleId, name: &str) -> ModuleId {
    ast.module(root)
        .sub_modules
        .iter()
        .copied()
        .find(|&m| ast.interner.lookup(ast.module(m).name) == name)
        .unwrap_or_else(|| panic!("no module named '{name}'"))
}

/// Walks every reachable expression in a module tree.
struct RoughNodeScan<'a> {
    ast: &'a AstAllocator,
    rough: Vec<ExprId>,
}

impl<'a> Visitor for RoughNodeScan<'a> {
    type Error = CompileError;

    fn ast(&self) -> &AstAllocator {
        self.ast
    }

    fn visit_function(&mut self, id: FuncId) -> CompileResult<()> {
        if self.ast.function(id).is_generic() {
            return Ok(());
        }
        visit::walk_function(self, id)
    }

    fn visit_expr(&mut self, id: ExprId) -> CompileResult<()> {
        visit::walk_expr(self, id)?;
        if matches!(
            self.ast.expr(id),
            Expr::QualifiedIdentifier(_)
                | Expr::CallOrCast { .. }
                | Expr::SubscriptWithBrackets { .. }
                | Expr::SubscriptWithChevrons { .. }
                | Expr::DotOperator { .. }
        ) {
            self.rough.push(id);
        }
        Ok(())
    }
}

fn assert_no_rough_nodes(ast: &AstAllocator, module: ModuleId) {
    let mut scan = RoughNodeScan {
        ast,
        rough: Vec::new(),
    };
    scan.visit_module_content(module).unwrap();
    assert!(
        scan.rough.is_empty(),
        "rough nodes remain: {:?}",
        scan.rough
            .iter()
            .map(|&e| format!("{:?}", ast.expr(e)))
            .collect::<Vec<_>>()
    );
    for &sub in &ast.module(module).sub_modules {
        assert_no_rough_nodes(ast, sub);
    }
}

const GAIN: &str = "processor Gain {
    input stream float in;
    output stream float out;
    float level;
    void run() { loop { level = level + 0.01f; out << in * level; advance(); } }
}";

#[test]
fn resolved_tree_has_no_rough_nodes() {
    let (ast, root) = resolve_ok(GAIN);
    assert_no_rough_nodes(&ast, root);
    assert!(ast.module(find_module(&ast, root, "Gain")).is_fully_resolved);
}

#[test]
fn struct_members_resolve_and_materialise() {
    let (ast, root) = resolve_ok(
        "processor P {
            output stream float out;
            struct Voice { float level; int age; }
            Voice v;
            void run() { loop { v.level = v.level + 1.0f; v.age = v.age + 1; out << v.level; advance(); } }
        }",
    );
    let p = ast.module(find_module(&ast, root, "P"));
    let decl = ast.struct_decl(p.structs[0]);
    let id = decl.resolved.expect("struct must materialise");
    assert_eq!(ast.structs.get(id).members.len(), 2);
    assert_no_rough_nodes(&ast, root);
}

#[test]
fn locals_shadow_state() {
    let (ast, root) = resolve_ok(
        "processor P {
            output stream float out;
            float x;
            void run() { loop { let x = 1.0f; out << x; advance(); } }
        }",
    );
    assert_no_rough_nodes(&ast, root);
}

#[test]
fn later_locals_do_not_resolve_earlier_uses() {
    // `y` is declared after the statement that reads it.
    let code = error_code(
        "processor P {
            output stream float out;
            void run() { loop { out << y; let y = 1.0f; advance(); } }
        }",
    );
    assert_eq!(code, "E0300");
}

#[test]
fn self_referential_initialiser_is_reported() {
    let code = error_code(
        "processor P {
            output stream float out;
            void run() { let x = x + 1; loop { out << float(x); advance(); } }
        }",
    );
    assert_eq!(code, "E0328");
}

#[test]
fn ambiguous_symbol_is_reported() {
    // Two namespaces at the same scope level both declare `x`; a
    // qualified path picks one, an unqualified one cannot exist, but a
    // name clash within one scope must trip the duplicate check instead.
    let code = error_code(
        "namespace N { let x = 1; let x = 2; }
        processor P {
            output stream float out;
            void run() { loop { out << float(N::x); advance(); } }
        }",
    );
    assert_eq!(code, "E0301");
}

#[test]
fn wrap_type_and_wrap_intrinsic_coexist() {
    let (ast, root) = resolve_ok(
        "processor P {
            output stream float out;
            float[8] buffer;
            wrap<8> index;
            void run() {
                loop {
                    buffer[index] = buffer[index] + 1.0f;
                    index = wrap<8>(index + 1);
                    out << buffer[wrap(index + 3, 8)];
                    advance();
                }
            }
        }",
    );
    assert_no_rough_nodes(&ast, root);
}

#[test]
fn at_call_becomes_subscript() {
    let (ast, root) = resolve_ok(
        "processor P {
            output stream float out;
            float[4] table;
            void run() { var i = 0; loop { table[0] = 1.0f; out << at(table, i); i = i + 1; advance(); } }
        }",
    );

    struct FindAt<'a> {
        ast: &'a AstAllocator,
        found: bool,
    }
    impl<'a> Visitor for FindAt<'a> {
        type Error = CompileError;
        fn ast(&self) -> &AstAllocator {
            self.ast
        }
        fn visit_expr(&mut self, id: ExprId) -> CompileResult<()> {
            visit::walk_expr(self, id)?;
            if let Expr::ArrayElementRef {
                suppress_wrap_warning: true,
                ..
            } = self.ast.expr(id)
            {
                self.found = true;
            }
            Ok(())
        }
    }

    let p = find_module(&ast, root, "P");
    let mut finder = FindAt { ast: &ast, found: false };
    finder.visit_module_content(p).unwrap();
    assert!(finder.found, "at() must lower to a wrap-index subscript");
}

#[test]
fn constant_if_branches_are_pruned() {
    let (ast, root) = resolve_ok(
        "processor P {
            output stream float out;
            void run() { loop { if (1 > 2) { out << 1.0f; } else { out << 2.0f; } advance(); } }
        }",
    );

    struct FindIf<'a> {
        ast: &'a AstAllocator,
        found: bool,
    }
    impl<'a> Visitor for FindIf<'a> {
        type Error = CompileError;
        fn ast(&self) -> &AstAllocator {
            self.ast
        }
        fn visit_stmt(&mut self, id: soul_ir::ast::StmtId) -> CompileResult<()> {
            visit::walk_stmt(self, id)?;
            if matches!(self.ast.stmt(id), Stmt::If { .. }) {
                self.found = true;
            }
            Ok(())
        }
    }

    let p = find_module(&ast, root, "P");
    let mut finder = FindIf { ast: &ast, found: false };
    finder.visit_module_content(p).unwrap();
    assert!(!finder.found, "constant if must be replaced by its branch");
}

#[test]
fn generic_specialisations_are_cached_by_signature() {
    let (ast, root) = resolve_ok(
        "namespace N { T pick<T>(T a, T b) { return a > b ? a : b; } }
        processor P {
            output stream float out;
            void run() {
                let a = N::pick(1, 2);
                let b = N::pick(3, 4);
                let c = N::pick(0.5f, 0.25f);
                loop { out << float(a + b) + c; advance(); } }
        }",
    );
    let n = ast
        .module(root)
        .sub_modules
        .iter()
        .copied()
        .find(|&m| ast.interner.lookup(ast.module(m).name) == "N")
        .expect("namespace N");
    let clones = ast
        .module(n)
        .functions
        .iter()
        .filter(|&&f| ast.function(f).original_generic.is_some())
        .count();
    assert_eq!(clones, 2, "two argument signatures, two clones");
}

#[test]
fn generic_reference_parameters_unify() {
    let (ast, root) = resolve_ok(
        "namespace N { void bump<T>(T& target, T amount) { target = target + amount; } }
        processor P {
            output stream float out;
            float level;
            void run() { loop { N::bump(level, 0.5f); out << level; advance(); } }
        }",
    );
    assert_no_rough_nodes(&ast, root);
}

#[test]
fn vector_parameter_unification_requires_matching_size() {
    let code = error_code(
        "namespace N { T sum2<T>(T<2> v) { return v[0] + v[1]; } }
        processor P {
            output stream float out;
            float<3> v;
            void run() { loop { out << N::sum2(v); advance(); } }
        }",
    );
    assert!(
        code == "E0307" || code == "E0325",
        "expected a failed specialisation, got {code}"
    );
}

#[test]
fn division_by_constant_zero_is_reported() {
    let code = error_code(
        "processor P {
            output stream float out;
            void run() { var x = 1; loop { out << float(x / 0); advance(); } }
        }",
    );
    assert_eq!(code, "E0424");
}

#[test]
fn write_to_input_is_rejected() {
    let code = error_code(
        "processor P {
            input stream float in;
            output stream float out;
            void run() { loop { in << 1.0f; out << 0.0f; advance(); } }
        }",
    );
    // The shift's LHS is an input endpoint: not a writable stream.
    assert!(
        code == "E0428" || code == "E0405",
        "expected a stream-write error, got {code}"
    );
}

#[test]
fn event_output_accepts_each_declared_type() {
    let (ast, root) = resolve_ok(
        "processor P {
            output event (float, int) e;
            output stream float out;
            void run() { loop { e << 1.5f; e << 2; out << 0.0f; advance(); } }
        }",
    );
    assert_no_rough_nodes(&ast, root);
}

#[test]
fn size_meta_function_folds() {
    let (ast, root) = resolve_ok(
        "processor P {
            output stream float out;
            float[12] buffer;
            void run() { loop { buffer[0] = 1.0f; out << float(buffer.size); advance(); } }
        }",
    );
    assert_no_rough_nodes(&ast, root);
}
