//! CLI command implementations.

use soul_diagnostic::emitter::{DiagnosticEmitter, TerminalEmitter};
use soul_diagnostic::DiagnosticList;
use soulc::{Compiler, LinkOptions};

fn read_source(path: &str) -> Result<String, i32> {
    std::fs::read_to_string(path).map_err(|e| {
        eprintln!("soulc: cannot read '{path}': {e}");
        2
    })
}

fn emit_diagnostics(diagnostics: &DiagnosticList, compiler: &Compiler) {
    let mut emitter = TerminalEmitter::new(std::io::stderr());
    for d in diagnostics.iter() {
        emitter.emit(d, &compiler.sources);
    }
}

pub fn compile_file(source_path: &str, output_path: &str, main: Option<&str>) -> i32 {
    let code = match read_source(source_path) {
        Ok(code) => code,
        Err(status) => return status,
    };

    let options = LinkOptions {
        main_processor: main.map(str::to_string),
        ..LinkOptions::default()
    };

    let mut diagnostics = DiagnosticList::new();
    let mut compiler = Compiler::new();
    let program = if compiler.add_code(&mut diagnostics, source_path, &code) {
        compiler.link(&mut diagnostics, &options)
    } else {
        None
    };

    emit_diagnostics(&diagnostics, &compiler);

    let Some(program) = program else {
        return 1;
    };

    if let Err(e) = std::fs::write(output_path, program.to_heart()) {
        eprintln!("soulc: cannot write '{output_path}': {e}");
        return 2;
    }

    println!("{output_path}: {} modules, hash {}", program.modules.len(), program.hash());
    0
}

pub fn check_file(source_path: &str) -> i32 {
    let code = match read_source(source_path) {
        Ok(code) => code,
        Err(status) => return status,
    };

    let mut diagnostics = DiagnosticList::new();
    let mut compiler = Compiler::new();
    let program = if compiler.add_code(&mut diagnostics, source_path, &code) {
        compiler.link(&mut diagnostics, &LinkOptions::default())
    } else {
        None
    };

    emit_diagnostics(&diagnostics, &compiler);

    if program.is_none() || diagnostics.has_errors() {
        return 1;
    }
    println!("{source_path}: ok");
    0
}

pub fn lex_file(source_path: &str) -> i32 {
    let code = match read_source(source_path) {
        Ok(code) => code,
        Err(status) => return status,
    };

    let interner = soul_ir::StringInterner::new();
    let result = soul_lexer::lex(&code, soul_ir::FileId(0), &interner);

    for token in result.tokens.iter() {
        println!("{token:?}");
    }

    if result.has_errors() {
        for d in &result.diagnostics {
            eprintln!("{d}");
        }
        return 1;
    }
    0
}

pub fn parse_file(source_path: &str) -> i32 {
    let code = match read_source(source_path) {
        Ok(code) => code,
        Err(status) => return status,
    };

    let mut diagnostics = DiagnosticList::new();
    let mut compiler = Compiler::new();
    if !compiler.add_code(&mut diagnostics, source_path, &code) {
        emit_diagnostics(&diagnostics, &compiler);
        return 1;
    }

    println!("{source_path}: parsed");
    0
}
