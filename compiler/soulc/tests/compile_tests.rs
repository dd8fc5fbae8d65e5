//! End-to-end compiler tests over the public API.

use soul_diagnostic::DiagnosticList;
use soulc::{Compiler, LinkOptions};

fn build(source: &str) -> Result<soulc::Program, DiagnosticList> {
    let mut diagnostics = DiagnosticList::new();
    match Compiler::build(&mut diagnostics, "test.soul", source, &LinkOptions::default()) {
        Some(program) => Ok(program),
        None => Err(diagnostics),
    }
}

fn build_ok(source: &str) -> soulc::Program {
    build(source).unwrap_or_else(|diagnostics| {
        let messages: Vec<String> = diagnostics.iter().map(|d| d.to_string()).collect();
        panic!("compilation failed:\n{}", messages.join("\n"))
    })
}

fn first_error_code(source: &str) -> String {
    let diagnostics = build(source).err().expect("expected a compile error");
    diagnostics
        .iter()
        .find(|d| d.is_error())
        .map(|d| d.code.as_str().to_string())
        .expect("an error diagnostic")
}

// ---- the trivial pass-through ----

#[test]
fn trivial_pass_through() {
    let program = build_ok(
        "processor P {
            output stream float<1> out;
            input stream float<1> in;
            void run() { loop { out << in; advance(); } }
        }",
    );
    let p = program.module_with_name("P").expect("P");
    assert!(p.state_variables.is_empty());
    assert_eq!(program.main_processor().unwrap().name, "P");

    let run = &p.functions[p.find_function("run").unwrap()];
    use soul_heart::ir::Statement;
    let count = |pred: fn(&Statement) -> bool| soul_heart::optimiser::count_statements(run, pred);
    assert_eq!(count(|s| matches!(s, Statement::ReadStream { .. })), 1);
    assert_eq!(count(|s| matches!(s, Statement::WriteStream { .. })), 1);
    assert_eq!(count(|s| matches!(s, Statement::AdvanceClock)), 1);
    assert!(soul_heart::optimiser::has_back_edge(run));
}

// ---- constant folding ----

#[test]
fn namespace_constant_folds() {
    let program = build_ok(
        "namespace N { let x = 2 + 3 * 4; }
        processor P {
            output stream int out;
            void run() { loop { out << N::x; advance(); } }
        }",
    );
    // x folds to 14; the namespace emits no module at all.
    assert!(program.module_with_name("N").is_none());
    let text = program.to_heart();
    assert!(text.contains("write out 14"), "got:\n{text}");
}

// ---- generic specialisation ----

#[test]
fn generic_specialisation_and_reuse() {
    let program = build_ok(
        "namespace N { T max2<T>(T a, T b) { return a > b ? a : b; } }
        processor P {
            output stream float out;
            void run() {
                let a = N::max2(1, 2);
                let b = N::max2(1.0f, 2.0f);
                let c = N::max2(1, 2);
                loop { out << b + float(a + c); advance(); }
            }
        }",
    );
    let n = program.module_with_name("N").expect("N");
    let clones: Vec<&str> = n
        .functions
        .iter()
        .map(|f| f.name.as_str())
        .filter(|name| name.starts_with("_max2_specialised"))
        .collect();
    assert_eq!(clones.len(), 2, "two distinct keys expected: {clones:?}");
}

#[test]
fn generic_conflicting_arguments_fail() {
    // No value of T satisfies (float32, struct)-style mismatches.
    let code = first_error_code(
        "namespace N { T max2<T>(T a, T b) { return a > b ? a : b; } }
        processor P {
            output stream float out;
            void run() {
                let x = N::max2(1.0f, true);
                loop { out << x; advance(); }
            }
        }",
    );
    assert!(
        code == "E0307" || code == "E0325",
        "expected a no-match or generic failure, got {code}"
    );
}

// ---- overload resolution ----

const OVERLOADS: &str = "namespace O {
    float foo(int x)   { return 1.0f; }
    float foo(float x) { return 2.0f; }
}
processor P {
    output stream float out;
    void run() { loop { out << O::foo(ARG); advance(); } }
}";

#[test]
fn exact_int_overload_wins() {
    let program = build_ok(&OVERLOADS.replace("ARG", "1"));
    let text = program.to_heart();
    // int32 matches foo(int) exactly.
    assert!(text.contains("call O::foo ("), "got:\n{text}");
}

#[test]
fn float_argument_selects_float_overload() {
    build_ok(&OVERLOADS.replace("ARG", "1.5f"));
}

#[test]
fn int64_argument_has_no_match() {
    let code = first_error_code(&OVERLOADS.replace("ARG", "1L"));
    assert!(
        code == "E0307" || code == "E0308",
        "expected no-match/ambiguous, got {code}"
    );
}

// ---- graphs ----

#[test]
fn delayed_connection_carries_length() {
    let program = build_ok(
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
    assert_eq!(g.connections[0].delay_length, 128);
    assert_eq!(g.connections[1].delay_length, 0);
}

#[test]
fn graph_cycle_is_detected() {
    let code = first_error_code(
        "processor D {
            input stream float in;
            output stream float out;
            void run() { loop { out << in; advance(); } }
        }
        graph G {
            output stream float out;
            let a = D; let b = D;
            connection { a.out -> b.in; b.out -> a.in; a.out -> out; }
        }",
    );
    assert_eq!(code, "E0213");
}

#[test]
fn delay_breaks_a_cycle() {
    build_ok(
        "processor D {
            input stream float in;
            output stream float out;
            void run() { loop { out << in; advance(); } }
        }
        graph G {
            output stream float out;
            let a = D; let b = D;
            connection { a.out -> b.in; b.out -> [1] -> a.in; a.out -> out; }
        }",
    );
}

// ---- recursive types ----

#[test]
fn mutually_recursive_structs_are_rejected() {
    let code = first_error_code(
        "namespace N { struct A { B b; } struct B { A a; } }
        processor P { output stream float out; void run() { loop { advance(); } } }",
    );
    assert_eq!(code, "E0209");
}

#[test]
fn self_recursive_struct_is_rejected() {
    let code = first_error_code(
        "namespace N { struct A { A a; } }
        processor P { output stream float out; void run() { loop { advance(); } } }",
    );
    assert_eq!(code, "E0208");
}

// ---- boundary behaviours ----

fn vector_size_program(size: &str) -> String {
    format!(
        "processor P {{
            output stream float<{size}> out;
            void run() {{ loop {{ advance(); }} }}
        }}"
    )
}

#[test]
fn vector_size_boundaries() {
    assert_eq!(first_error_code(&vector_size_program("0")), "E0500");
    build_ok(&vector_size_program("1"));
    build_ok(&vector_size_program("256"));
    assert_eq!(first_error_code(&vector_size_program("257")), "E0500");
}

fn bounded_int_program(limit: &str) -> String {
    format!(
        "processor P {{
            output stream float out;
            wrap<{limit}> i;
            void run() {{ loop {{ i = i; out << 0.0f; advance(); }} }}
        }}"
    )
}

#[test]
fn bounded_int_boundaries() {
    assert_eq!(first_error_code(&bounded_int_program("0")), "E0501");
    build_ok(&bounded_int_program("1"));
    assert_eq!(
        first_error_code(&bounded_int_program("2147483648")),
        "E0501"
    );
}

fn delay_program(length: &str) -> String {
    format!(
        "processor D {{
            input stream float in;
            output stream float out;
            void run() {{ loop {{ out << in; advance(); }} }}
        }}
        graph G {{
            input stream float in;
            output stream float out;
            let p = D;
            connection {{ in -> [{length}] -> p.in; p.out -> out; }}
        }}"
    )
}

#[test]
fn delay_length_boundaries() {
    assert_eq!(first_error_code(&delay_program("0")), "E0217");
    build_ok(&delay_program("1"));
    build_ok(&delay_program("65536"));
    assert_eq!(first_error_code(&delay_program("65537")), "E0218");
}

#[test]
fn empty_for_loop_compiles() {
    build_ok(
        "processor P {
            output stream float out;
            float x;
            void run() { loop { for (var i = 0; i < 0; i = i + 1) { x = x + 1.0f; } out << x; advance(); } }
        }",
    );
}

#[test]
fn loop_zero_is_rejected() {
    let code = first_error_code(
        "processor P {
            output stream float out;
            void run() { loop { loop (0) { out << 1.0f; } advance(); } }
        }",
    );
    assert_eq!(code, "E0226");
}

#[test]
fn run_without_advance_still_compiles() {
    // Documented behaviour: legal, just produces no audio progress.
    build_ok(
        "processor P {
            output stream float out;
            void run() { loop { out << 0.0f; } }
        }",
    );
}

// ---- diagnostics and special calls ----

#[test]
fn static_assert_failure_reports_message() {
    let diagnostics = build(
        "processor P {
            output stream float out;
            void run() { static_assert(1 > 2, \"sizes must grow\"); loop { advance(); } }
        }",
    )
    .err()
    .expect("static assert must fail");
    assert!(diagnostics
        .iter()
        .any(|d| d.message.contains("sizes must grow")));
}

#[test]
fn advance_outside_run_is_rejected() {
    let code = first_error_code(
        "processor P {
            output stream float out;
            void helper() { advance(); }
            void run() { loop { helper(); out << 0.0f; } }
        }",
    );
    assert_eq!(code, "E0318");
}

#[test]
fn unresolved_symbol_is_reported_with_location() {
    let diagnostics = build(
        "processor P {
            output stream float out;
            void run() { loop { out << wibble; advance(); } }
        }",
    )
    .err()
    .expect("must fail");
    let error = diagnostics.iter().find(|d| d.is_error()).unwrap();
    assert_eq!(error.code.as_str(), "E0300");
    assert!(error.location.is_some());
}

#[test]
fn misspelt_function_gets_suggestion() {
    let diagnostics = build(
        "processor P {
            output stream float out;
            float gain(float x) { return x * 0.5f; }
            void run() { loop { out << gian(1.0f); advance(); } }
        }",
    )
    .err()
    .expect("must fail");
    let error = diagnostics.iter().find(|d| d.is_error()).unwrap();
    assert!(
        error.message.contains("did you mean"),
        "got: {}",
        error.message
    );
}

#[test]
fn intrinsics_resolve_and_fold() {
    let program = build_ok(
        "processor P {
            output stream float out;
            void run() { loop { out << max(1.0f, 2.0f) + float(abs(-3)); advance(); } }
        }",
    );
    let text = program.to_heart();
    // Both calls fold: 2.0 + 3.0 = 5.0 written directly.
    assert!(text.contains("write out 5.0f"), "got:\n{text}");
}

#[test]
fn pre_inc_collision_is_rejected() {
    let code = first_error_code(
        "processor P {
            output stream float out;
            void run() {
                var i = 0;
                int[4] a;
                loop { a[i++] = i; out << float(a[0]); advance(); }
            }
        }",
    );
    assert_eq!(code, "E0210");
}

// ---- round trips ----

#[test]
fn heart_round_trip_hash_is_stable() {
    let program = build_ok(
        "processor P {
            output stream float<2> out;
            input stream float<2> in;
            float<2> level;
            void run() { loop { level = level + in; out << level; advance(); } }
        }",
    );
    let text = program.to_heart();
    let reparsed = soul_heart::parse_heart(&text)
        .unwrap_or_else(|e| panic!("reparse failed: {e}\n{text}"));
    assert_eq!(reparsed.hash(), program.hash());
    assert_eq!(reparsed.to_heart(), text);
}

#[test]
fn main_processor_choice_survives_round_trip() {
    let mut diagnostics = DiagnosticList::new();
    let options = LinkOptions {
        main_processor: Some("A".to_string()),
        ..LinkOptions::default()
    };
    let source = "processor A { output stream float out; void run() { loop { out << 0.0f; advance(); } } }
                  processor B { output stream float out; void run() { loop { out << 1.0f; advance(); } } }";
    let program = Compiler::build(&mut diagnostics, "t.soul", source, &options)
        .expect("must compile");
    assert_eq!(program.main_processor().unwrap().name, "A");

    let reparsed = soul_heart::parse_heart(&program.to_heart()).unwrap();
    assert_eq!(reparsed.main_processor().unwrap().name, "A");
}

#[test]
fn multiple_units_link_together() {
    let mut diagnostics = DiagnosticList::new();
    let mut compiler = Compiler::new();
    assert!(compiler.add_code(
        &mut diagnostics,
        "util.soul",
        "namespace util { float half(float x) { return x * 0.5f; } }",
    ));
    assert!(compiler.add_code(
        &mut diagnostics,
        "main.soul",
        "processor P {
            output stream float out;
            void run() { loop { out << util::half(3.0f); advance(); } }
        }",
    ));
    let program = compiler
        .link(&mut diagnostics, &LinkOptions::default())
        .expect("link must succeed");
    assert!(program.module_with_name("util").is_some());
}
