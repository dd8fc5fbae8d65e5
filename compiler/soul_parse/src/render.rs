//! Render a parsed module tree back to SOUL source.
//!
//! The output re-parses to the same structure: desugared forms (`&&`/`||`
//! as ternaries, compound assignments, `for` as a block plus loop) render
//! in their desugared spelling, so a second parse is a fixed point. Every
//! operator expression is parenthesised, which keeps precedence out of
//! the picture entirely.

use soul_ir::ast::{
    Annotation, AstAllocator, Expr, ExprId, FuncId, ModuleId, ModuleKind, SpecialisationParam,
    Stmt, StmtId, TypeMetaOp, VarId,
};
use soul_ir::endpoint::InterpolationType;
use soul_ir::value::{Value, ValueData};
use soul_ir::Name;

/// Render every module of a tree (usually the invisible root namespace).
pub fn render_program(ast: &AstAllocator, root: ModuleId) -> String {
    let mut out = String::new();
    for &sub in &ast.module(root).sub_modules {
        render_module(ast, sub, 0, &mut out);
        out.push('\n');
    }
    out
}

/// Render one module declaration.
pub fn render_module(ast: &AstAllocator, module: ModuleId, depth: usize, out: &mut String) {
    let r = Renderer { ast };
    r.module(module, depth, out);
}

struct Renderer<'a> {
    ast: &'a AstAllocator,
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push_str("    ");
    }
}

impl<'a> Renderer<'a> {
    fn name(&self, name: Name) -> String {
        self.ast.interner.lookup(name)
    }

    fn module(&self, id: ModuleId, depth: usize, out: &mut String) {
        let m = self.ast.module(id);
        let keyword = match m.kind {
            ModuleKind::Namespace { .. } => "namespace",
            ModuleKind::Processor => "processor",
            ModuleKind::Graph { .. } => "graph",
        };

        indent(depth, out);
        out.push_str(keyword);
        out.push(' ');
        out.push_str(&self.name(m.name));
        self.specialisation_params(&m.specialisation_params, out);
        self.annotation(&m.annotation, out);
        out.push('\n');
        indent(depth, out);
        out.push_str("{\n");

        for &io in m.inputs.iter().chain(m.outputs.iter()) {
            let e = self.ast.endpoint(io);
            indent(depth + 1, out);
            out.push_str(if e.is_input { "input " } else { "output " });
            out.push_str(e.kind.text());
            out.push(' ');
            if e.sample_types.len() == 1 {
                out.push_str(&self.expr(e.sample_types[0]));
            } else {
                let types: Vec<String> =
                    e.sample_types.iter().map(|&t| self.expr(t)).collect();
                out.push('(');
                out.push_str(&types.join(", "));
                out.push(')');
            }
            out.push(' ');
            out.push_str(&self.name(e.name));
            if let Some(size) = e.array_size {
                out.push_str(&format!("[{}]", self.expr(size)));
            }
            self.annotation(&e.annotation, out);
            out.push_str(";\n");
        }

        if let ModuleKind::Graph {
            instances,
            connections,
        } = &m.kind
        {
            for instance in instances {
                indent(depth + 1, out);
                out.push_str("let ");
                out.push_str(&self.name(instance.instance_name));
                out.push_str(" = ");
                out.push_str(&self.expr(instance.target));
                if let Some(size) = instance.array_size {
                    out.push_str(&format!("[{}]", self.expr(size)));
                }
                if !instance.specialisation_args.is_empty() {
                    let args: Vec<String> = instance
                        .specialisation_args
                        .iter()
                        .map(|&a| self.expr(a))
                        .collect();
                    out.push_str(&format!(" ({})", args.join(", ")));
                }
                if let Some(ratio) = instance.clock_multiplier {
                    out.push_str(&format!(" * {}", self.expr(ratio)));
                }
                if let Some(ratio) = instance.clock_divider {
                    out.push_str(&format!(" / {}", self.expr(ratio)));
                }
                out.push_str(";\n");
            }

            if !connections.is_empty() {
                indent(depth + 1, out);
                out.push_str("connection\n");
                indent(depth + 1, out);
                out.push_str("{\n");
                for connection in connections {
                    indent(depth + 2, out);
                    if connection.interpolation != InterpolationType::None {
                        out.push_str(&format!("[{}] ", connection.interpolation.text()));
                    }
                    let end = |e: &soul_ir::ast::ConnectionEnd| match e.processor {
                        Some(p) => format!("{}.{}", self.name(p), self.name(e.channel)),
                        None => self.name(e.channel),
                    };
                    out.push_str(&end(&connection.source));
                    out.push_str(" -> ");
                    if let Some(delay) = connection.delay_length {
                        out.push_str(&format!("[{}] -> ", self.expr(delay)));
                    }
                    out.push_str(&end(&connection.dest));
                    out.push_str(";\n");
                }
                indent(depth + 1, out);
                out.push_str("}\n");
            }
        }

        for &s in &m.structs {
            let decl = self.ast.struct_decl(s);
            indent(depth + 1, out);
            out.push_str(&format!("struct {}\n", self.name(decl.name)));
            indent(depth + 1, out);
            out.push_str("{\n");
            for member in &decl.members {
                indent(depth + 2, out);
                out.push_str(&format!(
                    "{} {};\n",
                    self.expr(member.type_expr),
                    self.name(member.name)
                ));
            }
            indent(depth + 1, out);
            out.push_str("}\n");
        }

        for &u in &m.usings {
            let decl = self.ast.using(u);
            if let Some(target) = decl.target {
                indent(depth + 1, out);
                out.push_str(&format!(
                    "using {} = {};\n",
                    self.name(decl.name),
                    self.expr(target)
                ));
            }
        }

        for &v in &m.state_variables {
            // Specialisation value parameters render in the header.
            if m.specialisation_params
                .iter()
                .any(|p| matches!(p, SpecialisationParam::Value(pv) if *pv == v))
            {
                continue;
            }
            indent(depth + 1, out);
            self.state_variable(v, out);
        }

        for &f in &m.functions {
            self.function(f, depth + 1, out);
        }

        for &sub in &m.sub_modules {
            self.module(sub, depth + 1, out);
        }

        indent(depth, out);
        out.push_str("}\n");
    }

    fn specialisation_params(&self, params: &[SpecialisationParam], out: &mut String) {
        if params.is_empty() {
            return;
        }
        let rendered: Vec<String> = params
            .iter()
            .map(|p| match p {
                SpecialisationParam::Using(u) => {
                    format!("using {}", self.name(self.ast.using(*u).name))
                }
                SpecialisationParam::ProcessorAlias { name, .. } => {
                    format!("processor {}", self.name(*name))
                }
                SpecialisationParam::Value(v) => {
                    let var = self.ast.variable(*v);
                    let ty = var
                        .declared_type
                        .map(|t| self.expr(t))
                        .unwrap_or_default();
                    format!("{ty} {}", self.name(var.name))
                }
            })
            .collect();
        out.push_str(&format!(" ({})", rendered.join(", ")));
    }

    fn state_variable(&self, v: VarId, out: &mut String) {
        let var = self.ast.variable(v);
        match var.declared_type {
            Some(t) => {
                if var.is_external {
                    out.push_str("external ");
                }
                out.push_str(&self.expr(t));
                out.push(' ');
                out.push_str(&self.name(var.name));
            }
            None => {
                out.push_str(if var.is_const { "let " } else { "var " });
                out.push_str(&self.name(var.name));
            }
        }
        if let Some(init) = var.initial_value {
            out.push_str(" = ");
            out.push_str(&self.expr(init));
        }
        self.annotation(&var.annotation, out);
        out.push_str(";\n");
    }

    fn function(&self, f: FuncId, depth: usize, out: &mut String) {
        let function = self.ast.function(f);
        indent(depth, out);

        if function.is_event_handler {
            out.push_str(&format!("event {} (", self.name(function.name)));
        } else {
            out.push_str(&self.expr(function.return_type));
            out.push(' ');
            out.push_str(&self.name(function.name));
            if !function.generic_wildcards.is_empty() {
                let wildcards: Vec<String> = function
                    .generic_wildcards
                    .iter()
                    .map(|(w, _)| self.name(*w))
                    .collect();
                out.push_str(&format!("<{}>", wildcards.join(", ")));
            }
            out.push_str(" (");
        }

        let params: Vec<String> = function
            .parameters
            .iter()
            .map(|&p| {
                let var = self.ast.variable(p);
                let ty = var
                    .declared_type
                    .map(|t| self.expr(t))
                    .unwrap_or_default();
                format!("{ty} {}", self.name(var.name))
            })
            .collect();
        out.push_str(&params.join(", "));
        out.push(')');

        self.annotation(&function.annotation, out);

        match function.block {
            Some(block) => {
                out.push('\n');
                self.stmt(block, depth, out);
            }
            None => out.push_str(";\n"),
        }
    }

    fn annotation(&self, annotation: &Annotation, out: &mut String) {
        if annotation.is_empty() {
            return;
        }
        let entries: Vec<String> = annotation
            .properties
            .iter()
            .map(|p| format!("{}: {}", self.name(p.name), self.expr(p.value)))
            .collect();
        out.push_str(&format!(" [[ {} ]]", entries.join(", ")));
    }

    // ---- statements ----

    fn stmt(&self, id: StmtId, depth: usize, out: &mut String) {
        match self.ast.stmt(id).clone() {
            Stmt::Block(block) => {
                indent(depth, out);
                out.push_str("{\n");
                for &s in &self.ast.block(block).statements {
                    self.stmt(s, depth + 1, out);
                }
                indent(depth, out);
                out.push_str("}\n");
            }

            Stmt::Expression(e) => {
                indent(depth, out);
                out.push_str(&self.expr(e));
                out.push_str(";\n");
            }

            Stmt::VariableDeclaration(v) => {
                indent(depth, out);
                self.state_variable(v, out);
            }

            Stmt::If {
                condition,
                true_branch,
                false_branch,
            } => {
                indent(depth, out);
                out.push_str(&format!("if ({})\n", self.expr(condition)));
                self.stmt_as_body(true_branch, depth, out);
                if let Some(false_branch) = false_branch {
                    indent(depth, out);
                    out.push_str("else\n");
                    self.stmt_as_body(false_branch, depth, out);
                }
            }

            Stmt::Loop {
                is_do,
                condition,
                num_iterations,
                iterator,
                body,
            } => {
                indent(depth, out);
                if is_do {
                    // No trailing semicolon: it would re-parse as an
                    // extra empty statement.
                    out.push_str("do\n");
                    self.stmt_as_body(body, depth, out);
                    indent(depth, out);
                    out.push_str(&format!(
                        "while ({})\n",
                        condition.map(|c| self.expr(c)).unwrap_or_default()
                    ));
                } else if let Some(n) = num_iterations {
                    out.push_str(&format!("loop ({})\n", self.expr(n)));
                    self.stmt_as_body(body, depth, out);
                } else if let Some(iterator) = iterator {
                    // A loop carrying an iterator spells as a `for` with
                    // an empty init.
                    out.push_str(&format!(
                        "for (; {}; {})\n",
                        condition.map(|c| self.expr(c)).unwrap_or_default(),
                        self.expr(iterator)
                    ));
                    self.stmt_as_body(body, depth, out);
                } else if let Some(condition) = condition {
                    out.push_str(&format!("while ({})\n", self.expr(condition)));
                    self.stmt_as_body(body, depth, out);
                } else {
                    out.push_str("loop\n");
                    self.stmt_as_body(body, depth, out);
                }
            }

            Stmt::Return { value } => {
                indent(depth, out);
                match value {
                    Some(v) => out.push_str(&format!("return {};\n", self.expr(v))),
                    None => out.push_str("return;\n"),
                }
            }

            Stmt::Break => {
                indent(depth, out);
                out.push_str("break;\n");
            }
            Stmt::Continue => {
                indent(depth, out);
                out.push_str("continue;\n");
            }
            Stmt::Noop => {
                indent(depth, out);
                out.push_str(";\n");
            }
        }
    }

    /// Bodies render as blocks so single statements and blocks read the
    /// same.
    fn stmt_as_body(&self, id: StmtId, depth: usize, out: &mut String) {
        if matches!(self.ast.stmt(id), Stmt::Block(_)) {
            self.stmt(id, depth, out);
        } else {
            indent(depth, out);
            out.push_str("{\n");
            self.stmt(id, depth + 1, out);
            indent(depth, out);
            out.push_str("}\n");
        }
    }

    // ---- expressions ----

    fn expr(&self, id: ExprId) -> String {
        match self.ast.expr(id).clone() {
            Expr::Constant(v) => self.constant(&v),
            Expr::QualifiedIdentifier(path) => path.to_string(&self.ast.interner),
            Expr::VariableRef(v) => self.name(self.ast.variable(v).name),
            Expr::ProcessorRef(m) => self.ast.module_path(m),
            Expr::InputEndpointRef(e) | Expr::OutputEndpointRef(e) => {
                self.name(self.ast.endpoint(e).name)
            }
            Expr::ConcreteType(t) => t.describe(&self.ast.structs),
            Expr::SubscriptWithBrackets { lhs, index } => match index {
                Some(index) => format!("{}[{}]", self.expr(lhs), self.expr(index)),
                None => format!("{}[]", self.expr(lhs)),
            },
            Expr::SubscriptWithChevrons { lhs, size } => {
                format!("{}<{}>", self.expr(lhs), self.expr(size))
            }
            Expr::TypeMetaFunction { op, source } => match op {
                TypeMetaOp::MakeConst => format!("const {}", self.expr(source)),
                TypeMetaOp::MakeReference => format!("{}&", self.expr(source)),
                other => format!("{}.{}", self.expr(source), meta_op_name(other)),
            },
            Expr::TypeCast { target, source } => {
                format!(
                    "{} ({})",
                    target.describe(&self.ast.structs),
                    self.expr(source)
                )
            }
            Expr::CallOrCast {
                name_or_type, args, ..
            } => {
                let args = args
                    .map(|a| self.comma_list(a))
                    .unwrap_or_default();
                format!("{} ({})", self.expr(name_or_type), args)
            }
            Expr::FunctionCall { function, args } => {
                let name = self.name(self.ast.function(function).name);
                let args = args.map(|a| self.comma_list(a)).unwrap_or_default();
                format!("{name} ({args})")
            }
            Expr::UnaryOp { op, source } => format!("{}({})", op.symbol(), self.expr(source)),
            Expr::BinaryOp { op, lhs, rhs } => {
                format!("({} {} {})", self.expr(lhs), op.symbol(), self.expr(rhs))
            }
            Expr::TernaryOp {
                condition,
                true_branch,
                false_branch,
            } => format!(
                "({} ? {} : {})",
                self.expr(condition),
                self.expr(true_branch),
                self.expr(false_branch)
            ),
            Expr::Assignment { target, new_value } => {
                format!("{} = {}", self.expr(target), self.expr(new_value))
            }
            Expr::PreOrPostIncDec {
                target,
                is_increment,
                is_post,
            } => {
                let op = if is_increment { "++" } else { "--" };
                if is_post {
                    format!("{}{op}", self.expr(target))
                } else {
                    format!("{op}{}", self.expr(target))
                }
            }
            Expr::CommaSeparatedList { items } => {
                let items: Vec<String> = items.iter().map(|&i| self.expr(i)).collect();
                format!("({})", items.join(", "))
            }
            Expr::ArrayElementRef {
                object,
                start,
                end,
                is_slice,
                ..
            } => {
                if is_slice {
                    match end {
                        Some(end) => format!(
                            "{}[{}:{}]",
                            self.expr(object),
                            self.expr(start),
                            self.expr(end)
                        ),
                        None => format!("{}[{}:]", self.expr(object), self.expr(start)),
                    }
                } else {
                    format!("{}[{}]", self.expr(object), self.expr(start))
                }
            }
            Expr::StructMemberRef {
                object,
                structure,
                member_index,
            } => format!(
                "{}.{}",
                self.expr(object),
                self.ast.structs.get(structure).members[member_index].name
            ),
            Expr::DotOperator { lhs, rhs } => {
                format!("{}.{}", self.expr(lhs), rhs.to_string(&self.ast.interner))
            }
            Expr::WriteToEndpoint { target, value } => {
                format!("{} << {}", self.expr(target), self.expr(value))
            }
            Expr::ProcessorProperty(p) => format!("processor.{}", p.name()),
            Expr::AdvanceClock => "advance ()".to_string(),
            Expr::StaticAssertion { condition, message } => {
                format!(
                    "static_assert ({}, \"{}\")",
                    self.expr(condition),
                    escape(&message)
                )
            }
        }
    }

    fn comma_list(&self, id: ExprId) -> String {
        match self.ast.expr(id) {
            Expr::CommaSeparatedList { items } => {
                let items: Vec<String> = items.iter().map(|&i| self.expr(i)).collect();
                items.join(", ")
            }
            _ => self.expr(id),
        }
    }

    fn constant(&self, v: &Value) -> String {
        match v.data() {
            ValueData::Bool(b) => b.to_string(),
            ValueData::Int32(n) => n.to_string(),
            ValueData::Int64(n) => format!("{n}L"),
            ValueData::Float32(f) => {
                if f.is_finite() {
                    format!("{f:?}f")
                } else {
                    "nan".to_string()
                }
            }
            ValueData::Float64(f) => {
                if f.is_finite() {
                    format!("{f:?}")
                } else {
                    "nan".to_string()
                }
            }
            ValueData::String(handle) => {
                format!(
                    "\"{}\"",
                    escape(self.ast.string_dictionary.string_for_handle(*handle))
                )
            }
            ValueData::Aggregate(items) => {
                let items: Vec<String> = items.iter().map(|v| self.constant(v)).collect();
                format!("({})", items.join(", "))
            }
            ValueData::UnsizedArray(handle) => {
                self.constant(self.ast.constant_table.get(*handle))
            }
        }
    }
}

fn meta_op_name(op: TypeMetaOp) -> &'static str {
    use TypeMetaOp::*;
    match op {
        TypeOf => "type",
        ElementType => "elementType",
        PrimitiveOf => "primitiveType",
        Size => "size",
        IsStruct => "isStruct",
        IsArray => "isArray",
        IsVector => "isVector",
        IsPrimitive => "isPrimitive",
        IsFloat => "isFloat",
        IsInt => "isInt",
        IsScalar => "isScalar",
        IsString => "isString",
        IsBool => "isBool",
        IsReference => "isReference",
        IsConst => "isConst",
        MakeConst | MakeReference => unreachable!("rendered structurally"),
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
            c => out.push(c),
        }
    }
    out
}
