//! End-to-end lowering and round-trip tests: SOUL source → resolved AST
//! → HEART → text → HEART.

use crate::ir::{ModuleKind, Statement};
use crate::program::Program;
use rustc_hash::FxHashMap;
use soul_diagnostic::DiagnosticList;
use soul_ir::ast::{
    Annotation, AstAllocator, Context, Module as AstModule, ModuleId, ModuleKind as AstModuleKind,
};
use soul_ir::{FileId, Name};

/// Compile source through parsing and resolution, then lower every
/// module.
fn build_program(source: &str) -> Program {
    let mut ast = AstAllocator::new();
    let root = ast.alloc_module(AstModule {
        context: Context::NONE,
        name: Name::EMPTY,
        parent: None,
        kind: AstModuleKind::Namespace {
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
    assert!(!lexed.has_errors(), "lex errors");
    soul_parse::parse_top_level(&mut ast, &lexed.tokens, FileId(0), root)
        .unwrap_or_else(|e| panic!("parse failed: {e}"));

    soul_resolve::sanity::run_pre_resolution(&ast, root)
        .unwrap_or_else(|e| panic!("pre-resolution sanity failed: {e}"));
    soul_resolve::ResolutionPass::run(&mut ast, root, true)
        .unwrap_or_else(|e| panic!("resolution (quiet) failed: {e}"));
    soul_resolve::ResolutionPass::run(&mut ast, root, false)
        .unwrap_or_else(|e| panic!("resolution failed: {e}"));

    let mut program = Program::new();
    let mut func_map = FxHashMap::default();
    let mut unresolved = Vec::new();
    let mut diagnostics = DiagnosticList::new();

    fn lower_tree(
        ast: &AstAllocator,
        module: ModuleId,
        program: &mut Program,
        func_map: &mut FxHashMap<soul_ir::ast::FuncId, crate::ir::FunctionRef>,
        unresolved: &mut Vec<crate::generator::UnresolvedCall>,
        diagnostics: &mut DiagnosticList,
    ) {
        let m = ast.module(module);
        let needs_module = m.is_processor_or_graph()
            || !m.functions.is_empty()
            || !m.structs.is_empty()
            || m.state_variables.iter().any(|&v| ast.variable(v).is_external);
        if needs_module && m.parent.is_some() {
            crate::generator::generate_module(
                ast, module, &mut program.modules, func_map, unresolved, diagnostics,
            )
            .unwrap_or_else(|e| panic!("generation failed: {e}"));
        }
        for &sub in &m.sub_modules {
            lower_tree(ast, sub, program, func_map, unresolved, diagnostics);
        }
    }

    lower_tree(
        &ast,
        root,
        &mut program,
        &mut func_map,
        &mut unresolved,
        &mut diagnostics,
    );
    crate::generator::resolve_pending_calls(&mut program.modules, &func_map, &unresolved, &ast)
        .unwrap_or_else(|e| panic!("call fix-up failed: {e}"));

    program.string_dictionary = ast.string_dictionary.clone();
    program.constant_table = ast.constant_table.clone();
    program.structs = ast.structs.clone();
    program.main_processor = program
        .modules
        .iter()
        .rposition(|m| m.kind != ModuleKind::Namespace);
    program
}

const PASS_THROUGH: &str = "processor P {
    output stream float out;
    input stream float in;
    void run() { loop { out << in; advance(); } }
}";

#[test]
fn pass_through_lowers_to_single_loop() {
    let program = build_program(PASS_THROUGH);
    let p = program.module_with_name("P").expect("module P");
    assert_eq!(p.kind, ModuleKind::Processor);
    assert!(p.state_variables.is_empty());

    let run = &p.functions[p.find_function("run").expect("run")];
    let reads = crate::optimiser::count_statements(run, |s| {
        matches!(s, Statement::ReadStream { .. })
    });
    let writes = crate::optimiser::count_statements(run, |s| {
        matches!(s, Statement::WriteStream { .. })
    });
    let advances =
        crate::optimiser::count_statements(run, |s| matches!(s, Statement::AdvanceClock));
    assert_eq!(reads, 1);
    assert_eq!(writes, 1);
    assert_eq!(advances, 1);
    assert!(crate::optimiser::has_back_edge(run));
}

#[test]
fn constant_initialisers_fold_out_of_state() {
    let program = build_program(
        "processor P {
            output stream float out;
            let gain = 2 + 3 * 4;
            float level;
            void run() { loop { level = level + float(gain); out << level; advance(); } }
        }",
    );
    let p = program.module_with_name("P").unwrap();
    // `gain` folds to 14 and disappears; `level` is written and stays.
    assert_eq!(p.state_variables.len(), 1);
    assert_eq!(p.variable(p.state_variables[0]).name, "level");
    let text = program.to_heart();
    assert!(text.contains("14"), "folded constant should appear: {text}");
}

#[test]
fn init_function_zeroes_state() {
    let program = build_program(
        "processor P {
            output stream float out;
            float a;
            float b = 0.25f;
            void run() { loop { a = a + b; b = b + 1.0f; out << a; advance(); } }
        }",
    );
    let p = program.module_with_name("P").unwrap();
    let init = &p.functions[p.find_function("_init").expect("init function")];
    let assigns = crate::optimiser::count_statements(init, |s| {
        matches!(s, Statement::Assign { .. })
    });
    assert_eq!(assigns, 2);
}

#[test]
fn graph_connection_carries_delay() {
    let program = build_program(
        "processor D {
            input stream float in;
            output stream float out;
            void run() { loop { out << in; advance(); } }
        }
        graph G {
            input stream float in;
            output stream float out;
            let p = D;
            connection { in -> [128] -> p.in; p.out -> out; }
        }",
    );
    let g = program.module_with_name("G").unwrap();
    assert_eq!(g.kind, ModuleKind::Graph);
    assert_eq!(g.instances.len(), 1);
    assert_eq!(g.connections.len(), 2);
    assert_eq!(g.connections[0].delay_length, 128);
    assert_eq!(g.connections[1].delay_length, 0);
}

#[test]
fn generic_specialisations_are_shared() {
    let program = build_program(
        "namespace N {
            T biggest<T>(T a, T b) { return a > b ? a : b; }
        }
        processor P {
            output stream float out;
            void run() {
                let a = N::biggest(1, 2);
                let b = N::biggest(1.0f, 2.0f);
                let c = N::biggest(3, 4);
                loop { out << float(a) + b + float(c); advance(); }
            }
        }",
    );
    let n = program.module_with_name("N").unwrap();
    // Two argument-type signatures → exactly two clones.
    let specialised: Vec<&str> = n
        .functions
        .iter()
        .map(|f| f.name.as_str())
        .filter(|n| n.starts_with("_biggest_specialised"))
        .collect();
    assert_eq!(specialised.len(), 2, "got {specialised:?}");
}

#[test]
fn loop_n_emits_counter() {
    let program = build_program(
        "processor P {
            output stream float out;
            float sum;
            void run() { loop { loop (4) { sum = sum + 1.0f; } out << sum; advance(); } }
        }",
    );
    let p = program.module_with_name("P").unwrap();
    let run = &p.functions[p.find_function("run").unwrap()];
    let text = program.to_heart();
    assert!(
        p.variables.iter().any(|v| v.name.starts_with("counter_")),
        "counter variable expected: {text}"
    );
    assert!(crate::optimiser::has_back_edge(run));
}

#[test]
fn non_void_paths_must_return() {
    // The else-less branch falls off the end of a non-void function.
    let mut ast = AstAllocator::new();
    let root = ast.alloc_module(AstModule {
        context: Context::NONE,
        name: Name::EMPTY,
        parent: None,
        kind: AstModuleKind::Namespace {
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
    let source = "namespace N { int f(bool b) { if (b) return 1; } }";
    let lexed = soul_lexer::lex(source, FileId(0), &ast.interner);
    soul_parse::parse_top_level(&mut ast, &lexed.tokens, FileId(0), root).unwrap();
    soul_resolve::ResolutionPass::run(&mut ast, root, true).unwrap();
    soul_resolve::ResolutionPass::run(&mut ast, root, false).unwrap();

    let n = ast.module(root).sub_modules[0];
    let mut modules = Vec::new();
    let mut func_map = FxHashMap::default();
    let mut unresolved = Vec::new();
    let mut diagnostics = DiagnosticList::new();
    let result = crate::generator::generate_module(
        &ast,
        n,
        &mut modules,
        &mut func_map,
        &mut unresolved,
        &mut diagnostics,
    );
    let err = result.expect_err("missing return must be rejected");
    assert_eq!(err.diagnostic.code.as_str(), "E0432");
}

#[test]
fn heart_round_trip_preserves_hash() {
    let program = build_program(PASS_THROUGH);
    let text = program.to_heart();
    let reparsed = crate::parse_heart(&text).unwrap_or_else(|e| panic!("reparse failed: {e}\n{text}"));
    assert_eq!(
        reparsed.hash(),
        program.hash(),
        "original:\n{text}\nreparsed:\n{}",
        reparsed.to_heart()
    );
}

#[test]
fn heart_round_trip_with_graph_and_generics() {
    let program = build_program(
        "namespace util {
            T doubled<T>(T x) { return x + x; }
        }
        processor D {
            input stream float in;
            output stream float out;
            float acc;
            void run() { loop { acc = util::doubled(acc) + in; out << acc; advance(); } }
        }
        graph G {
            input stream float in;
            output stream float out;
            let d = D;
            connection { in -> [64] -> d.in; d.out -> out; }
        }",
    );
    let text = program.to_heart();
    let reparsed =
        crate::parse_heart(&text).unwrap_or_else(|e| panic!("reparse failed: {e}\n{text}"));
    assert_eq!(reparsed.hash(), program.hash());
}

#[test]
fn ternary_lowers_through_temporary() {
    let program = build_program(
        "processor P {
            output stream float out;
            float level;
            void run() { loop { level = level > 1.0f ? 0.0f : level + 0.1f; out << level; advance(); } }
        }",
    );
    let text = program.to_heart();
    assert!(text.contains("branch_if"), "expected a conditional: {text}");
    let reparsed = crate::parse_heart(&text).unwrap();
    assert_eq!(reparsed.hash(), program.hash());
}

#[test]
fn every_block_has_exactly_one_terminator() {
    let program = build_program(PASS_THROUGH);
    for module in &program.modules {
        for function in &module.functions {
            if function.has_no_body {
                continue;
            }
            for block in &function.blocks {
                assert!(
                    block.terminator.is_some(),
                    "unterminated block {} in {}",
                    block.name,
                    function.name
                );
            }
        }
    }
}
