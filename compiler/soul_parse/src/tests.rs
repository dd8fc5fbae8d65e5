//! Parser tests over small source units.

use crate::parse_top_level;
use soul_diagnostic::CompileResult;
use soul_ir::ast::{
    Annotation, AstAllocator, Context, Expr, Module, ModuleId, ModuleKind, Stmt,
};
use soul_ir::{FileId, Name};

fn parse(source: &str) -> CompileResult<(AstAllocator, ModuleId)> {
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

    let lexed = soul_lexer::lex(source, FileId(0), &ast.interner);
    assert!(!lexed.has_errors(), "lex errors in test source");
    parse_top_level(&mut ast, &lexed.tokens, FileId(0), root)?;
    Ok((ast, root))
}

fn parse_ok(source: &str) -> (AstAllocator, ModuleId) {
    match parse(source) {
        Ok(result) => result,
        Err(e) => panic!("parse failed: {e}"),
    }
}

#[test]
fn parses_minimal_processor() {
    let (ast, root) = parse_ok(
        "processor P { output stream float out; void run() { loop { out << 0.0f; advance(); } } }",
    );
    let root = ast.module(root);
    assert_eq!(root.sub_modules.len(), 1);

    let p = ast.module(root.sub_modules[0]);
    assert!(p.is_processor());
    assert_eq!(p.outputs.len(), 1);
    assert_eq!(p.functions.len(), 1);
    assert!(ast.is_run_function(p.functions[0]));
}

#[test]
fn parses_graph_with_connections() {
    let (ast, root) = parse_ok(
        "graph G {
             input stream float in;
             output stream float out;
             let p = P;
             connection { in -> [128] -> p.in; p.out -> out; }
         }",
    );
    let g = ast.module(ast.module(root).sub_modules[0]);
    assert!(g.is_graph());
    let ModuleKind::Graph {
        instances,
        connections,
    } = &g.kind
    else {
        panic!("expected graph")
    };
    assert_eq!(instances.len(), 1);
    assert_eq!(connections.len(), 2);
    assert!(connections[0].delay_length.is_some());
    assert!(connections[1].delay_length.is_none());
}

#[test]
fn vector_size_with_expression() {
    // The `>` inside the chevrons must not parse as a comparison.
    let (ast, root) = parse_ok("processor P { output stream float<2 + 2> out; void run() {} }");
    let p = ast.module(ast.module(root).sub_modules[0]);
    let out = ast.endpoint(p.outputs[0]);
    assert!(matches!(
        ast.expr(out.sample_types[0]),
        Expr::SubscriptWithChevrons { .. }
    ));
}

#[test]
fn logical_ops_lower_to_ternaries() {
    let (ast, root) =
        parse_ok("namespace N { bool f(bool a, bool b) { return a && b || a; } }");
    let n = ast.module(ast.module(root).sub_modules[0]);
    let f = ast.function(n.functions[0]);
    let Stmt::Block(block) = ast.stmt(f.block.unwrap()) else {
        panic!("expected block")
    };
    let Stmt::Return { value: Some(v) } = ast.stmt(ast.block(*block).statements[0]) else {
        panic!("expected return")
    };
    assert!(matches!(ast.expr(*v), Expr::TernaryOp { .. }));
}

#[test]
fn annotations_attach_to_endpoints() {
    let (ast, root) = parse_ok(
        "processor P { output stream float out [[ name: \"main\", fixed ]]; void run() {} }",
    );
    let p = ast.module(ast.module(root).sub_modules[0]);
    let out = ast.endpoint(p.outputs[0]);
    assert_eq!(out.annotation.properties.len(), 2);
    // A keyword key with no value defaults to true.
    let fixed = ast.interner.intern("fixed");
    let prop = out.annotation.find(fixed).unwrap();
    assert!(matches!(ast.expr(prop.value), Expr::Constant(v) if v.get_as_bool() == Some(true)));
}

#[test]
fn generic_function_wildcards() {
    let (ast, root) = parse_ok("namespace N { T max<T>(T a, T b) { return a > b ? a : b; } }");
    let n = ast.module(ast.module(root).sub_modules[0]);
    let f = ast.function(n.functions[0]);
    assert_eq!(f.generic_wildcards.len(), 1);
    assert!(f.is_generic());
    assert_eq!(f.parameters.len(), 2);
}

#[test]
fn nested_subscript_close_brackets() {
    // `a[b[i]]` ends in `]]`, which must split into two closes.
    parse_ok("namespace N { int f(int[4] a, int[4] b, int i) { return a[b[i]]; } }");
}

#[test]
fn compound_assignment_desugars() {
    let (ast, root) = parse_ok("namespace N { void f() { var x = 1; x += 2; } }");
    let n = ast.module(ast.module(root).sub_modules[0]);
    let f = ast.function(n.functions[0]);
    let Stmt::Block(block) = ast.stmt(f.block.unwrap()) else {
        panic!()
    };
    let Stmt::Expression(e) = ast.stmt(ast.block(*block).statements[1]) else {
        panic!("expected expression statement")
    };
    let Expr::Assignment { new_value, .. } = ast.expr(*e) else {
        panic!("expected assignment")
    };
    assert!(matches!(ast.expr(*new_value), Expr::BinaryOp { .. }));
}

#[test]
fn minus_without_space_is_subtraction() {
    let (ast, root) = parse_ok("namespace N { int f(int x) { return x -1; } }");
    let n = ast.module(ast.module(root).sub_modules[0]);
    let f = ast.function(n.functions[0]);
    let Stmt::Block(block) = ast.stmt(f.block.unwrap()) else {
        panic!()
    };
    let Stmt::Return { value: Some(v) } = ast.stmt(ast.block(*block).statements[0]) else {
        panic!()
    };
    // Lowered as x + (-1).
    assert!(matches!(
        ast.expr(*v),
        Expr::BinaryOp {
            op: soul_ir::BinaryOperator::Add,
            ..
        }
    ));
}

#[test]
fn rejects_misplaced_endpoint() {
    assert!(parse("processor P { void run() {} input stream float in; }").is_err());
}

#[test]
fn rejects_semicolon_after_brace() {
    assert!(parse("processor P { output stream float out; void run() {} }; ").is_err());
}

#[test]
fn rejects_import_not_yet_implemented() {
    assert!(parse("namespace N { } import \"other\";").is_err());
}

#[test]
fn struct_declarations() {
    let (ast, root) = parse_ok(
        "namespace N { struct Point { float x, y; int count; } }",
    );
    let n = ast.module(ast.module(root).sub_modules[0]);
    assert_eq!(n.structs.len(), 1);
    let s = ast.struct_decl(n.structs[0]);
    assert_eq!(s.members.len(), 3);
}

/// Rendering a parse and parsing it again must settle immediately: the
/// renders of both trees are textually identical.
fn assert_render_round_trip(source: &str) {
    let (ast, root) = parse_ok(source);
    let rendered = crate::render::render_program(&ast, root);
    let (ast2, root2) = match parse(&rendered) {
        Ok(r) => r,
        Err(e) => panic!("rendered source failed to parse: {e}\n{rendered}"),
    };
    let rendered2 = crate::render::render_program(&ast2, root2);
    assert_eq!(rendered, rendered2, "render is not a fixed point");
}

#[test]
fn render_round_trips_processor() {
    assert_render_round_trip(
        "processor Gain {
            input stream float in;
            output stream float<2> out;
            float level;
            void run() {
                loop {
                    level = level + 0.01f;
                    if (level > 1.0f) level = 1.0f; else level = level * 0.5f;
                    out << in * level;
                    advance();
                }
            }
        }",
    );
}

#[test]
fn render_round_trips_control_flow() {
    assert_render_round_trip(
        "namespace N {
            int sum(int n) {
                var total = 0;
                for (var i = 0; i < n; ++i) { total += i; }
                for (; total > 100; total = total / 2) { ; }
                while (total > 10) { --total; }
                do { total = total - 1; } while (total > 0)
                loop (3) { ++total; }
                return total;
            }
        }",
    );
}

#[test]
fn render_round_trips_graph_and_structs() {
    assert_render_round_trip(
        "namespace dsp {
            struct Voice { float level; int age; }
            using Sample = float<2>;
            T max2<T>(T a, T b) { return a > b ? a : b; }
        }
        processor P {
            input stream float in;
            output stream float out [[ name: \"main out\" ]];
            void run() { loop { out << dsp::max2(in, -1.5f); advance(); } }
        }
        graph G {
            input stream float in;
            output stream float out;
            let p = P;
            connection { [linear] in -> [32] -> p.in; p.out -> out; }
        }",
    );
}

#[test]
fn event_endpoints_allow_multiple_types() {
    parse_ok("processor P { input event (float, int) e; output stream float out; void run() {} event e(float f) {} }");
    assert!(parse("processor P { input stream (float, int) s; output stream float out; void run() {} }").is_err());
}
