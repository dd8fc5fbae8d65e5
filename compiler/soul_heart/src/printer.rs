//! The textual HEART dump.
//!
//! Deterministic: the same program always prints the same text, which is
//! what the program hash is computed over. The grammar is kept regular so
//! `parser.rs` can read it back losslessly:
//!
//! ```text
//! #SOUL-HEART 1.0
//!
//! processor path::Name [[ key: value ]]
//! {
//!     input in stream float32 [4] [[ ... ]];
//!     struct Name { float32 member; }
//!     node p = path::Other [2] * 4 (type float32, value 5);
//!     connection linear in -> 128 -> p.in;
//!     var state float32[4] %buffer;
//!
//!     function run () -> void [[ run ]]
//!     {
//!         local float32 %t0;
//!
//!         @block_0:
//!             %t0 = read in;
//!             write out %t0;
//!             advance;
//!             branch @block_0;
//!     }
//! }
//! ```
//!
//! Sub-element paths print as `[3]` (fixed), `[1:4]` (range), `[expr]`
//! (dynamic), or `[wrap expr, n]` (dynamic with a runtime wrap).

use crate::ir::*;
use crate::program::Program;
use soul_ir::types::{StructStore, Type};
use soul_ir::value::{Value, ValueData};
use std::fmt::Write;

/// Version tag at the top of every dump.
pub const HEART_VERSION: &str = "1.0";

pub fn print_program(program: &Program) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "#SOUL-HEART {HEART_VERSION}");

    for module in &program.modules {
        let _ = writeln!(out);
        print_module(&mut out, program, module);
    }
    out
}

fn keyword_for_kind(kind: ModuleKind) -> &'static str {
    match kind {
        ModuleKind::Namespace => "namespace",
        ModuleKind::Processor => "processor",
        ModuleKind::Graph => "graph",
    }
}

fn print_module(out: &mut String, program: &Program, module: &Module) {
    let _ = write!(out, "{} {}", keyword_for_kind(module.kind), module.name);
    print_annotation(out, &module.annotation, program);
    let _ = writeln!(out);
    let _ = writeln!(out, "{{");

    for endpoint in &module.inputs {
        print_endpoint(out, program, endpoint, true);
    }
    for endpoint in &module.outputs {
        print_endpoint(out, program, endpoint, false);
    }

    for &s in &module.structs {
        let structure = program.structs.get(s);
        let _ = write!(out, "    struct {} {{ ", structure.name);
        for member in &structure.members {
            let _ = write!(
                out,
                "{} {}; ",
                type_text(&member.ty, &program.structs),
                member.name
            );
        }
        let _ = writeln!(out, "}}");
    }

    for instance in &module.instances {
        print_instance(out, program, instance);
    }

    for connection in &module.connections {
        print_connection(out, module, connection);
    }

    for &v in &module.state_variables {
        let variable = module.variable(v);
        let role = match variable.role {
            VariableRole::External => "external",
            _ => "state",
        };
        let _ = write!(
            out,
            "    var {role} {} %{}",
            type_text(&variable.ty, &program.structs),
            variable.name
        );
        print_annotation(out, &variable.annotation, program);
        let _ = writeln!(out, ";");
    }

    for function in &module.functions {
        print_function(out, program, module, function);
    }

    let _ = writeln!(out, "}}");
}

fn print_endpoint(out: &mut String, program: &Program, endpoint: &EndpointDecl, is_input: bool) {
    let direction = if is_input { "input" } else { "output" };
    let _ = write!(
        out,
        "    {direction} {} {}",
        endpoint.name,
        endpoint.kind.text()
    );

    if endpoint.sample_types.len() == 1 {
        let _ = write!(
            out,
            " {}",
            type_text(&endpoint.sample_types[0], &program.structs)
        );
    } else {
        let types: Vec<String> = endpoint
            .sample_types
            .iter()
            .map(|t| type_text(t, &program.structs))
            .collect();
        let _ = write!(out, " ({})", types.join(", "));
    }

    if let Some(size) = endpoint.array_size {
        let _ = write!(out, " [{size}]");
    }
    print_annotation(out, &endpoint.annotation, program);
    let _ = writeln!(out, ";");
}

fn print_instance(out: &mut String, program: &Program, instance: &ProcessorInstance) {
    let _ = write!(
        out,
        "    node {} = {}",
        instance.instance_name, instance.source_name
    );
    if instance.array_size != 1 {
        let _ = write!(out, " [{}]", instance.array_size);
    }
    if let Some(m) = instance.clock_multiplier {
        let _ = write!(out, " * {m}");
    }
    if let Some(d) = instance.clock_divider {
        let _ = write!(out, " / {d}");
    }
    if !instance.specialisation_args.is_empty() {
        let args: Vec<String> = instance
            .specialisation_args
            .iter()
            .map(|arg| match arg {
                SpecialisationArgument::Type(t) => {
                    format!("type {}", type_text(t, &program.structs))
                }
                SpecialisationArgument::ProcessorName(name) => format!("processor {name}"),
                SpecialisationArgument::Value(v) => {
                    format!("value {}", constant_text(v, program))
                }
            })
            .collect();
        let _ = write!(out, " ({})", args.join(", "));
    }
    let _ = writeln!(out, ";");
}

fn print_connection(out: &mut String, module: &Module, connection: &Connection) {
    let end_text = |processor: &Option<usize>, channel: &str| match processor {
        None => channel.to_string(),
        Some(i) => format!("{}.{}", module.instances[*i].instance_name, channel),
    };

    let _ = write!(
        out,
        "    connection {} {}",
        connection.interpolation.text(),
        end_text(&connection.source_processor, &connection.source_channel)
    );
    if connection.delay_length > 0 {
        let _ = write!(out, " -> {}", connection.delay_length);
    }
    let _ = writeln!(
        out,
        " -> {};",
        end_text(&connection.dest_processor, &connection.dest_channel)
    );
}

fn print_function(out: &mut String, program: &Program, module: &Module, function: &Function) {
    let _ = writeln!(out);
    let _ = write!(out, "    function {} (", function.name);

    for (i, &p) in function.parameters.iter().enumerate() {
        if i > 0 {
            let _ = write!(out, ", ");
        }
        let variable = module.variable(p);
        let _ = write!(
            out,
            "{} %{}",
            type_text(&variable.ty, &program.structs),
            variable.name
        );
    }

    let _ = write!(
        out,
        ") -> {}",
        type_text(&function.return_type, &program.structs)
    );

    print_function_flags(out, program, function);

    if function.has_no_body {
        let _ = writeln!(out, ";");
        return;
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "    {{");

    for &local in &function.locals {
        let variable = module.variable(local);
        let mutability = match variable.role {
            VariableRole::Register => "let",
            _ => "local",
        };
        let _ = writeln!(
            out,
            "        {mutability} {} %{};",
            type_text(&variable.ty, &program.structs),
            variable.name
        );
    }
    if !function.locals.is_empty() {
        let _ = writeln!(out);
    }

    for block in &function.blocks {
        let _ = writeln!(out, "        {}:", block.name);
        for statement in &block.statements {
            let _ = writeln!(
                out,
                "            {}",
                statement_text(statement, program, module)
            );
        }
        if let Some(terminator) = &block.terminator {
            let _ = writeln!(
                out,
                "            {}",
                terminator_text(terminator, program, module, function)
            );
        }
    }

    let _ = writeln!(out, "    }}");
}

fn print_function_flags(out: &mut String, program: &Program, function: &Function) {
    let mut entries: Vec<String> = Vec::new();
    if function.is_run_function {
        entries.push("run".to_string());
    }
    if function.is_event_function {
        entries.push("event".to_string());
    }
    if function.is_init_function {
        entries.push("init".to_string());
    }
    if function.intrinsic != soul_ir::intrinsic::IntrinsicType::None {
        entries.push(format!("intrin: \"{}\"", function.intrinsic.name()));
    }
    for (key, value) in &function.annotation {
        if matches!(key.as_str(), "run" | "event" | "init" | "intrin") {
            continue;
        }
        entries.push(format!("{key}: {}", constant_text(value, program)));
    }
    if !entries.is_empty() {
        let _ = write!(out, " [[ {} ]]", entries.join(", "));
    }
}

fn print_annotation(out: &mut String, annotation: &PlainAnnotation, program: &Program) {
    if annotation.is_empty() {
        return;
    }
    let entries: Vec<String> = annotation
        .iter()
        .map(|(key, value)| format!("{key}: {}", constant_text(value, program)))
        .collect();
    let _ = write!(out, " [[ {} ]]", entries.join(", "));
}

// ---- statements ----

fn statement_text(statement: &Statement, program: &Program, module: &Module) -> String {
    match statement {
        Statement::Assign { dest, source } => format!(
            "{} = {};",
            destination_text(dest, program, module),
            expr_text(source, program, module)
        ),
        Statement::FunctionCall {
            dest,
            name,
            args,
            ..
        } => {
            let args: Vec<String> = args.iter().map(|a| expr_text(a, program, module)).collect();
            match dest {
                Some(dest) => format!(
                    "{} = call {} ({});",
                    destination_text(dest, program, module),
                    name,
                    args.join(", ")
                ),
                None => format!("call {} ({});", name, args.join(", ")),
            }
        }
        Statement::ReadStream { dest, input } => format!(
            "{} = read {};",
            destination_text(dest, program, module),
            module.inputs[*input as usize].name
        ),
        Statement::WriteStream {
            output,
            index,
            value,
        } => {
            let name = &module.outputs[*output as usize].name;
            match index {
                Some(index) => format!(
                    "write {}[{}] {};",
                    name,
                    expr_text(index, program, module),
                    expr_text(value, program, module)
                ),
                None => format!("write {} {};", name, expr_text(value, program, module)),
            }
        }
        Statement::AdvanceClock => "advance;".to_string(),
    }
}

fn terminator_text(
    terminator: &Terminator,
    program: &Program,
    module: &Module,
    function: &Function,
) -> String {
    match terminator {
        Terminator::Branch(target) => {
            format!("branch {};", function.blocks[target.0 as usize].name)
        }
        Terminator::BranchIf {
            condition,
            true_target,
            false_target,
        } => format!(
            "branch_if {} ? {} : {};",
            expr_text(condition, program, module),
            function.blocks[true_target.0 as usize].name,
            function.blocks[false_target.0 as usize].name
        ),
        Terminator::Return(None) => "return;".to_string(),
        Terminator::Return(Some(value)) => {
            format!("return {};", expr_text(value, program, module))
        }
    }
}

fn destination_text(dest: &Destination, program: &Program, module: &Module) -> String {
    let mut text = format!("%{}", module.variable(dest.root).name);
    for step in &dest.path {
        text.push_str(&sub_index_text(step, program, module));
    }
    text
}

fn sub_index_text(step: &SubIndex, program: &Program, module: &Module) -> String {
    match step {
        SubIndex::Fixed(i) => format!("[{i}]"),
        SubIndex::Range(start, end) => format!("[{start}:{end}]"),
        SubIndex::Dynamic { index, wrap } => match wrap {
            Some(n) => format!("[wrap {}, {}]", expr_text(index, program, module), n),
            None => format!("[{}]", expr_text(index, program, module)),
        },
    }
}

// ---- expressions ----

pub(crate) fn expr_text(expr: &Expr, program: &Program, module: &Module) -> String {
    match expr {
        Expr::Constant(v) => constant_text(v, program),
        Expr::Variable(v) => format!("%{}", module.variable(*v).name),
        Expr::SubElement { parent, index } => format!(
            "{}{}",
            expr_text(parent, program, module),
            sub_index_text(index, program, module)
        ),
        Expr::Cast { target, source } => format!(
            "cast {} ({})",
            type_text(target, &program.structs),
            expr_text(source, program, module)
        ),
        Expr::Unary { op, source } => {
            let name = match op {
                soul_ir::UnaryOperator::Negate => "neg",
                soul_ir::UnaryOperator::LogicalNot => "not",
                soul_ir::UnaryOperator::BitwiseNot => "bnot",
            };
            format!("{name} ({})", expr_text(source, program, module))
        }
        Expr::Binary { op, lhs, rhs, .. } => format!(
            "({} {} {})",
            expr_text(lhs, program, module),
            op.symbol(),
            expr_text(rhs, program, module)
        ),
        Expr::ProcessorProperty(p) => format!("processor.{}", p.name()),
    }
}

// ---- types and constants ----

/// Canonical type spelling in dumps; identical to the diagnostics
/// spelling.
pub(crate) fn type_text(ty: &Type, structs: &StructStore) -> String {
    ty.describe(structs)
}

pub(crate) fn constant_text(value: &Value, program: &Program) -> String {
    let structs = &program.structs;
    let ty = value.get_type();
    match value.data() {
        ValueData::Bool(b) => b.to_string(),
        ValueData::Int32(v) => {
            if ty.is_bounded_int() {
                format!("{} {v}", type_text(ty, structs))
            } else {
                v.to_string()
            }
        }
        ValueData::Int64(v) => format!("{v}L"),
        ValueData::Float32(v) => float32_text(*v),
        ValueData::Float64(v) => float64_text(*v),
        ValueData::String(handle) => {
            format!(
                "\"{}\"",
                escape(program.string_dictionary.string_for_handle(*handle))
            )
        }
        ValueData::Aggregate(items) => {
            let inner: Vec<String> = items
                .iter()
                .map(|v| constant_text(v, program))
                .collect();
            format!("{} ({})", type_text(ty, structs), inner.join(", "))
        }
        ValueData::UnsizedArray(handle) => {
            // Out-of-line content prints inline; the parser rebuilds the
            // table entry.
            constant_text(program.constant_table.get(*handle), program)
        }
    }
}

fn float32_text(v: f32) -> String {
    if v.is_nan() {
        "nan32".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf32".to_string() } else { "-inf32".to_string() }
    } else {
        format!("{v:?}f")
    }
}

fn float64_text(v: f64) -> String {
    if v.is_nan() {
        "nan64".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "inf64".to_string() } else { "-inf64".to_string() }
    } else {
        format!("{v:?}")
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\0' => out.push_str("\\0"),
            c => out.push(c),
        }
    }
    out
}
