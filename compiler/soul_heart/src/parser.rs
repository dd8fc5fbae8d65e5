//! Parser for the textual HEART dump.
//!
//! Reads exactly what `printer.rs` emits: `parse(print(p))` reproduces a
//! program whose printed form, and therefore hash, matches the
//! original. Struct declarations are pre-scanned so member types and
//! variables can refer to structs declared later in the text; function
//! call targets resolve by qualified name after all modules are in.

use crate::ir::*;
use crate::program::Program;
use rustc_hash::FxHashMap;
use soul_diagnostic::{errors, CompileError, CompileResult};
use soul_ir::endpoint::{EndpointKind, InterpolationType, ProcessorProperty};
use soul_ir::intrinsic::IntrinsicType;
use soul_ir::types::{BoundedIntKind, PrimitiveType, StructId, Structure, Type};
use soul_ir::value::{Value, ValueData};
use soul_ir::{BinaryOperator, SourceRef, UnaryOperator};

/// Parse a HEART dump back into a program.
pub fn parse_heart(text: &str) -> CompileResult<Program> {
    let tokens = tokenize(text)?;
    let mut parser = HeartParser {
        tokens,
        pos: 0,
        program: Program::new(),
        struct_names: FxHashMap::default(),
        variable_names: FxHashMap::default(),
    };
    parser.parse_program()?;
    parser.resolve_calls()?;
    parser.pick_main_processor();
    Ok(parser.program)
}

// ---- tokens ----

#[derive(Clone, Debug, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64, bool),   // value, is_64
    Float(f64, bool), // value, is_32
    Str(String),
    Punct(&'static str),
    Eof,
}

struct SpannedTok {
    tok: Tok,
    line: u32,
}

fn syntax_error(line: u32, message: &str) -> CompileError {
    errors::heart_syntax_error(SourceRef::NONE, &format!("line {line}: {message}")).into()
}

fn tokenize(text: &str) -> CompileResult<Vec<SpannedTok>> {
    let mut tokens = Vec::new();
    let bytes: Vec<char> = text.chars().collect();
    let mut i = 0;
    let mut line = 1u32;

    // Longest first; three-, two-, then one-character operators.
    let puncts: [&'static str; 35] = [
        ">>>", "[[", "]]", "->", "::", "==", "!=", "<=", ">=", "<<", ">>", "{", "}", "(", ")",
        "[", "]", ";", ":", ",", "%", "@", "=", "?", "*", "/", ".", "<", ">", "&", "-", "+", "|",
        "^", "~",
    ];

    while i < bytes.len() {
        let c = bytes[i];

        if c == '\n' {
            line += 1;
            i += 1;
            continue;
        }
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c == '#' {
            // The version header line.
            let start = i;
            while i < bytes.len() && bytes[i] != '\n' {
                i += 1;
            }
            let header: String = bytes[start..i].iter().collect();
            if !header.starts_with("#SOUL-HEART") {
                return Err(syntax_error(line, "expected #SOUL-HEART header"));
            }
            let version = header.trim_start_matches("#SOUL-HEART").trim();
            if version != crate::printer::HEART_VERSION {
                return Err(
                    errors::heart_unknown_version(SourceRef::NONE, version).into()
                );
            }
            continue;
        }

        if c == '"' {
            let mut out = String::new();
            i += 1;
            loop {
                if i >= bytes.len() {
                    return Err(syntax_error(line, "unterminated string"));
                }
                match bytes[i] {
                    '"' => {
                        i += 1;
                        break;
                    }
                    '\\' => {
                        i += 1;
                        let escaped = bytes.get(i).copied().unwrap_or('\\');
                        out.push(match escaped {
                            'n' => '\n',
                            'r' => '\r',
                            't' => '\t',
                            '0' => '\0',
                            other => other,
                        });
                        i += 1;
                    }
                    other => {
                        out.push(other);
                        i += 1;
                    }
                }
            }
            tokens.push(SpannedTok {
                tok: Tok::Str(out),
                line,
            });
            continue;
        }

        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == '_') {
                i += 1;
            }
            let word: String = bytes[start..i].iter().collect();
            tokens.push(SpannedTok {
                tok: Tok::Ident(word),
                line,
            });
            continue;
        }

        let is_negative_number =
            c == '-' && i + 1 < bytes.len() && bytes[i + 1].is_ascii_digit();
        if c.is_ascii_digit() || is_negative_number {
            let start = i;
            if c == '-' {
                i += 1;
            }
            let mut is_float = false;
            while i < bytes.len() {
                let d = bytes[i];
                if d.is_ascii_digit() {
                    i += 1;
                } else if d == '.' && bytes.get(i + 1).map_or(false, char::is_ascii_digit) {
                    is_float = true;
                    i += 1;
                } else if (d == 'e' || d == 'E')
                    && bytes
                        .get(i + 1)
                        .map_or(false, |&n| n.is_ascii_digit() || n == '+' || n == '-')
                {
                    is_float = true;
                    i += 2;
                } else {
                    break;
                }
            }
            let digits: String = bytes[start..i].iter().collect();

            if i < bytes.len() && (bytes[i] == 'f' || bytes[i] == 'F') {
                i += 1;
                let v: f64 = digits
                    .parse()
                    .map_err(|_| syntax_error(line, "bad float literal"))?;
                tokens.push(SpannedTok {
                    tok: Tok::Float(v, true),
                    line,
                });
            } else if i < bytes.len() && (bytes[i] == 'L' || bytes[i] == 'l') {
                i += 1;
                let v: i64 = digits
                    .parse()
                    .map_err(|_| syntax_error(line, "bad integer literal"))?;
                tokens.push(SpannedTok {
                    tok: Tok::Int(v, true),
                    line,
                });
            } else if is_float {
                let v: f64 = digits
                    .parse()
                    .map_err(|_| syntax_error(line, "bad float literal"))?;
                tokens.push(SpannedTok {
                    tok: Tok::Float(v, false),
                    line,
                });
            } else {
                let v: i64 = digits
                    .parse()
                    .map_err(|_| syntax_error(line, "bad integer literal"))?;
                tokens.push(SpannedTok {
                    tok: Tok::Int(v, false),
                    line,
                });
            }
            continue;
        }

        let rest: String = bytes[i..bytes.len().min(i + 3)].iter().collect();
        let matched = puncts.iter().find(|p| rest.starts_with(**p)).copied();
        match matched {
            Some(p) => {
                i += p.len();
                tokens.push(SpannedTok {
                    tok: Tok::Punct(p),
                    line,
                });
            }
            None => return Err(syntax_error(line, &format!("unexpected character '{c}'"))),
        }
    }

    tokens.push(SpannedTok {
        tok: Tok::Eof,
        line,
    });
    Ok(tokens)
}

// ---- parser ----

struct HeartParser {
    tokens: Vec<SpannedTok>,
    pos: usize,
    program: Program,
    struct_names: FxHashMap<String, StructId>,
    /// Per-module variable name → id, rebuilt for each module.
    variable_names: FxHashMap<String, VarId>,
}

impl HeartParser {
    fn current(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn line(&self) -> u32 {
        self.tokens[self.pos].line
    }

    fn advance(&mut self) -> Tok {
        let t = self.tokens[self.pos].tok.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn eat_punct(&mut self, p: &str) -> bool {
        if matches!(self.current(), Tok::Punct(q) if *q == p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> CompileResult<()> {
        if self.eat_punct(p) {
            Ok(())
        } else {
            Err(syntax_error(self.line(), &format!("expected '{p}'")))
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.current(), Tok::Ident(w) if w == word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> CompileResult<String> {
        match self.advance() {
            Tok::Ident(w) => Ok(w),
            _ => Err(syntax_error(self.line(), "expected an identifier")),
        }
    }

    fn expect_int(&mut self) -> CompileResult<i64> {
        match self.advance() {
            Tok::Int(v, _) => Ok(v),
            _ => Err(syntax_error(self.line(), "expected an integer")),
        }
    }

    fn parse_qualified_name(&mut self) -> CompileResult<String> {
        let mut name = self.expect_ident()?;
        while self.eat_punct("::") {
            name.push_str("::");
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    // ---- program ----

    fn parse_program(&mut self) -> CompileResult<()> {
        self.prescan_structs()?;

        while !matches!(self.current(), Tok::Eof) {
            self.parse_module()?;
        }
        Ok(())
    }

    /// Register every struct name first so types can refer forwards.
    fn prescan_structs(&mut self) -> CompileResult<()> {
        let mut i = 0;
        while i < self.tokens.len() {
            if let Tok::Ident(word) = &self.tokens[i].tok {
                if word == "struct" {
                    if let Some(Tok::Ident(name)) = self.tokens.get(i + 1).map(|t| &t.tok) {
                        if !self.struct_names.contains_key(name) {
                            let id = self.program.structs.add(Structure::new(name.clone()));
                            self.struct_names.insert(name.clone(), id);
                        }
                    }
                }
            }
            i += 1;
        }
        Ok(())
    }

    fn parse_module(&mut self) -> CompileResult<()> {
        let kind = match self.advance() {
            Tok::Ident(w) if w == "processor" => ModuleKind::Processor,
            Tok::Ident(w) if w == "graph" => ModuleKind::Graph,
            Tok::Ident(w) if w == "namespace" => ModuleKind::Namespace,
            _ => {
                return Err(syntax_error(
                    self.line(),
                    "expected processor, graph, or namespace",
                ))
            }
        };

        let name = self.parse_qualified_name()?;
        let mut module = Module::new(kind, name);
        module.annotation = self.parse_annotation()?;
        self.variable_names.clear();

        self.expect_punct("{")?;
        while !self.eat_punct("}") {
            self.parse_module_item(&mut module)?;
        }

        self.program.modules.push(module);
        Ok(())
    }

    fn parse_module_item(&mut self, module: &mut Module) -> CompileResult<()> {
        let line = self.line();
        let word = self.expect_ident()?;
        match word.as_str() {
            "input" => self.parse_endpoint(module, true),
            "output" => self.parse_endpoint(module, false),
            "struct" => self.parse_struct(module),
            "node" => self.parse_instance(module),
            "connection" => self.parse_connection(module),
            "var" => self.parse_state_variable(module),
            "function" => self.parse_function(module),
            other => Err(syntax_error(line, &format!("unexpected item '{other}'"))),
        }
    }

    fn parse_endpoint(&mut self, module: &mut Module, is_input: bool) -> CompileResult<()> {
        let name = self.expect_ident()?;
        let kind_word = self.expect_ident()?;
        let kind = EndpointKind::from_text(&kind_word)
            .ok_or_else(|| syntax_error(self.line(), "expected an endpoint kind"))?;

        let mut sample_types = Vec::new();
        if self.eat_punct("(") {
            loop {
                sample_types.push(self.parse_type()?);
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        } else {
            sample_types.push(self.parse_type()?);
        }

        let array_size = if self.eat_punct("[") {
            let n = self.expect_int()?;
            self.expect_punct("]")?;
            Some(n as u64)
        } else {
            None
        };

        let annotation = self.parse_annotation()?;
        self.expect_punct(";")?;

        let list = if is_input {
            &mut module.inputs
        } else {
            &mut module.outputs
        };
        let index = list.len() as u32;
        list.push(EndpointDecl {
            name,
            index,
            kind,
            sample_types,
            array_size,
            annotation,
        });
        Ok(())
    }

    fn parse_struct(&mut self, module: &mut Module) -> CompileResult<()> {
        let name = self.expect_ident()?;
        let id = *self
            .struct_names
            .get(&name)
            .expect("structs are pre-scanned");
        module.structs.push(id);

        self.expect_punct("{")?;
        let mut members = Vec::new();
        while !self.eat_punct("}") {
            let ty = self.parse_type()?;
            let member = self.expect_ident()?;
            self.expect_punct(";")?;
            members.push((ty, member));
        }

        let structure = self.program.structs.get_mut(id);
        for (ty, member) in members {
            structure.add_member(ty, member);
        }
        Ok(())
    }

    fn parse_instance(&mut self, module: &mut Module) -> CompileResult<()> {
        let instance_name = self.expect_ident()?;
        self.expect_punct("=")?;
        let source_name = self.parse_qualified_name()?;

        let array_size = if self.eat_punct("[") {
            let n = self.expect_int()?;
            self.expect_punct("]")?;
            n as u64
        } else {
            1
        };

        let clock_multiplier = if self.eat_punct("*") {
            Some(self.expect_int()?)
        } else {
            None
        };
        let clock_divider = if self.eat_punct("/") {
            Some(self.expect_int()?)
        } else {
            None
        };

        let mut specialisation_args = Vec::new();
        if self.eat_punct("(") {
            loop {
                if self.eat_keyword("type") {
                    specialisation_args.push(SpecialisationArgument::Type(self.parse_type()?));
                } else if self.eat_keyword("processor") {
                    specialisation_args.push(SpecialisationArgument::ProcessorName(
                        self.parse_qualified_name()?,
                    ));
                } else if self.eat_keyword("value") {
                    specialisation_args.push(SpecialisationArgument::Value(
                        self.parse_constant()?,
                    ));
                } else {
                    return Err(syntax_error(self.line(), "expected a specialisation kind"));
                }
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        }

        self.expect_punct(";")?;
        module.instances.push(ProcessorInstance {
            instance_name,
            source_name,
            array_size,
            clock_multiplier,
            clock_divider,
            specialisation_args,
        });
        Ok(())
    }

    fn parse_connection(&mut self, module: &mut Module) -> CompileResult<()> {
        let interp_word = self.expect_ident()?;
        let interpolation = InterpolationType::from_text(&interp_word)
            .ok_or_else(|| syntax_error(self.line(), "expected an interpolation type"))?;

        let source = self.parse_connection_end(module)?;
        self.expect_punct("->")?;

        let delay_length = if let Tok::Int(_, _) = self.current() {
            let n = self.expect_int()?;
            self.expect_punct("->")?;
            n
        } else {
            0
        };

        let dest = self.parse_connection_end(module)?;
        self.expect_punct(";")?;

        module.connections.push(Connection {
            interpolation,
            source_processor: source.0,
            source_channel: source.1,
            dest_processor: dest.0,
            dest_channel: dest.1,
            delay_length,
        });
        Ok(())
    }

    fn parse_connection_end(
        &mut self,
        module: &Module,
    ) -> CompileResult<(Option<usize>, String)> {
        let first = self.expect_ident()?;
        if self.eat_punct(".") {
            let channel = self.expect_ident()?;
            let index = module
                .instances
                .iter()
                .position(|i| i.instance_name == first)
                .ok_or_else(|| {
                    syntax_error(self.line(), &format!("unknown instance '{first}'"))
                })?;
            Ok((Some(index), channel))
        } else {
            Ok((None, first))
        }
    }

    fn parse_state_variable(&mut self, module: &mut Module) -> CompileResult<()> {
        let role = match self.expect_ident()?.as_str() {
            "state" => VariableRole::State,
            "external" => VariableRole::External,
            other => {
                return Err(syntax_error(
                    self.line(),
                    &format!("unexpected variable role '{other}'"),
                ))
            }
        };
        let ty = self.parse_type()?;
        self.expect_punct("%")?;
        let name = self.expect_ident()?;
        let annotation = self.parse_annotation()?;
        self.expect_punct(";")?;

        let id = module.add_variable(Variable {
            name: name.clone(),
            ty,
            role,
            annotation,
        });
        module.state_variables.push(id);
        self.variable_names.insert(name, id);
        Ok(())
    }

    // ---- functions ----

    fn parse_function(&mut self, module: &mut Module) -> CompileResult<()> {
        let name = self.expect_ident()?;
        self.expect_punct("(")?;

        let mut parameters = Vec::new();
        if !self.eat_punct(")") {
            loop {
                let ty = self.parse_type()?;
                self.expect_punct("%")?;
                let param_name = self.expect_ident()?;
                let id = module.add_variable(Variable {
                    name: param_name.clone(),
                    ty,
                    role: VariableRole::Parameter,
                    annotation: Vec::new(),
                });
                self.variable_names.insert(param_name, id);
                parameters.push(id);
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        }

        self.expect_punct("->")?;
        let return_type = self.parse_type()?;

        let mut annotation = self.parse_annotation()?;
        let mut is_run = false;
        let mut is_event = false;
        let mut is_init = false;
        let mut intrinsic = IntrinsicType::None;
        annotation.retain(|(key, value)| match key.as_str() {
            "run" => {
                is_run = true;
                false
            }
            "event" => {
                is_event = true;
                false
            }
            "init" => {
                is_init = true;
                false
            }
            "intrin" => {
                if let ValueData::String(handle) = value.data() {
                    intrinsic = IntrinsicType::from_name(
                        self.program.string_dictionary.string_for_handle(*handle),
                    );
                }
                false
            }
            _ => true,
        });

        let mut function = Function {
            name,
            return_type,
            parameters,
            locals: Vec::new(),
            blocks: Vec::new(),
            is_run_function: is_run,
            is_event_function: is_event,
            is_init_function: is_init,
            has_no_body: false,
            intrinsic,
            annotation,
        };

        if self.eat_punct(";") {
            function.has_no_body = true;
            module.functions.push(function);
            return Ok(());
        }

        self.expect_punct("{")?;

        // Locals.
        loop {
            let is_register = if self.eat_keyword("local") {
                false
            } else if self.eat_keyword("let") {
                true
            } else {
                break;
            };
            let ty = self.parse_type()?;
            self.expect_punct("%")?;
            let local_name = self.expect_ident()?;
            self.expect_punct(";")?;
            let id = module.add_variable(Variable {
                name: local_name.clone(),
                ty,
                role: if is_register {
                    VariableRole::Register
                } else {
                    VariableRole::MutableLocal
                },
                annotation: Vec::new(),
            });
            self.variable_names.insert(local_name, id);
            function.locals.push(id);
        }

        // Blocks: first collect names so branches can refer forwards.
        let mut block_names = FxHashMap::default();
        {
            let mut i = self.pos;
            let mut depth = 0usize;
            while i < self.tokens.len() {
                match &self.tokens[i].tok {
                    Tok::Punct("{") => depth += 1,
                    Tok::Punct("}") if depth == 0 => break,
                    Tok::Punct("}") => depth -= 1,
                    Tok::Punct("@") => {
                        if let Some(Tok::Ident(n)) = self.tokens.get(i + 1).map(|t| &t.tok) {
                            if matches!(
                                self.tokens.get(i + 2).map(|t| &t.tok),
                                Some(Tok::Punct(":"))
                            ) {
                                let id = BlockId(block_names.len() as u32);
                                block_names.insert(format!("@{n}"), id);
                            }
                        }
                    }
                    _ => {}
                }
                i += 1;
            }
        }

        while !self.eat_punct("}") {
            self.expect_punct("@")?;
            let block_name = format!("@{}", self.expect_ident()?);
            self.expect_punct(":")?;

            let mut block = Block {
                name: block_name,
                statements: Vec::new(),
                terminator: None,
            };

            loop {
                if let Some(terminator) = self.try_parse_terminator(module, &block_names)? {
                    block.terminator = Some(terminator);
                    break;
                }
                block.statements.push(self.parse_statement(module)?);
            }

            function.blocks.push(block);
        }

        module.functions.push(function);
        Ok(())
    }

    fn try_parse_terminator(
        &mut self,
        module: &Module,
        block_names: &FxHashMap<String, BlockId>,
    ) -> CompileResult<Option<Terminator>> {
        let resolve = |parser: &Self, name: &str| {
            block_names.get(name).copied().ok_or_else(|| {
                syntax_error(parser.line(), &format!("unknown block '{name}'"))
            })
        };

        if self.eat_keyword("branch") {
            self.expect_punct("@")?;
            let name = format!("@{}", self.expect_ident()?);
            self.expect_punct(";")?;
            return Ok(Some(Terminator::Branch(resolve(self, &name)?)));
        }

        if self.eat_keyword("branch_if") {
            let condition = self.parse_expr(module)?;
            self.expect_punct("?")?;
            self.expect_punct("@")?;
            let true_name = format!("@{}", self.expect_ident()?);
            self.expect_punct(":")?;
            self.expect_punct("@")?;
            let false_name = format!("@{}", self.expect_ident()?);
            self.expect_punct(";")?;
            return Ok(Some(Terminator::BranchIf {
                condition,
                true_target: resolve(self, &true_name)?,
                false_target: resolve(self, &false_name)?,
            }));
        }

        if self.eat_keyword("return") {
            if self.eat_punct(";") {
                return Ok(Some(Terminator::Return(None)));
            }
            let value = self.parse_expr(module)?;
            self.expect_punct(";")?;
            return Ok(Some(Terminator::Return(Some(value))));
        }

        Ok(None)
    }

    fn parse_statement(&mut self, module: &Module) -> CompileResult<Statement> {
        if self.eat_keyword("advance") {
            self.expect_punct(";")?;
            return Ok(Statement::AdvanceClock);
        }

        if self.eat_keyword("write") {
            let output_name = self.expect_ident()?;
            let output = module
                .outputs
                .iter()
                .position(|e| e.name == output_name)
                .ok_or_else(|| {
                    syntax_error(self.line(), &format!("unknown output '{output_name}'"))
                })? as u32;

            let index = if self.eat_punct("[") {
                let e = self.parse_expr(module)?;
                self.expect_punct("]")?;
                Some(e)
            } else {
                None
            };

            let value = self.parse_expr(module)?;
            self.expect_punct(";")?;
            return Ok(Statement::WriteStream {
                output,
                index,
                value,
            });
        }

        if self.eat_keyword("call") {
            let name = self.parse_qualified_name()?;
            let args = self.parse_call_args(module)?;
            self.expect_punct(";")?;
            return Ok(Statement::FunctionCall {
                dest: None,
                name,
                function: None,
                args,
            });
        }

        // `%dest... = ...;`
        let dest = self.parse_destination(module)?;
        self.expect_punct("=")?;

        if self.eat_keyword("read") {
            let input_name = self.expect_ident()?;
            let input = module
                .inputs
                .iter()
                .position(|e| e.name == input_name)
                .ok_or_else(|| {
                    syntax_error(self.line(), &format!("unknown input '{input_name}'"))
                })? as u32;
            self.expect_punct(";")?;
            return Ok(Statement::ReadStream { dest, input });
        }

        if self.eat_keyword("call") {
            let name = self.parse_qualified_name()?;
            let args = self.parse_call_args(module)?;
            self.expect_punct(";")?;
            return Ok(Statement::FunctionCall {
                dest: Some(dest),
                name,
                function: None,
                args,
            });
        }

        let source = self.parse_expr(module)?;
        self.expect_punct(";")?;
        Ok(Statement::Assign { dest, source })
    }

    fn parse_call_args(&mut self, module: &Module) -> CompileResult<Vec<Expr>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if !self.eat_punct(")") {
            loop {
                args.push(self.parse_expr(module)?);
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        }
        Ok(args)
    }

    fn parse_destination(&mut self, module: &Module) -> CompileResult<Destination> {
        self.expect_punct("%")?;
        let name = self.expect_ident()?;
        let root = self.lookup_variable(&name)?;
        let mut dest = Destination::variable(root);
        while matches!(self.current(), Tok::Punct("[")) {
            dest.path.push(self.parse_sub_index(module)?);
        }
        Ok(dest)
    }

    fn lookup_variable(&self, name: &str) -> CompileResult<VarId> {
        self.variable_names.get(name).copied().ok_or_else(|| {
            syntax_error(self.line(), &format!("unknown variable '%{name}'"))
        })
    }

    fn parse_sub_index(&mut self, module: &Module) -> CompileResult<SubIndex> {
        self.expect_punct("[")?;

        if self.eat_keyword("wrap") {
            let index = self.parse_expr(module)?;
            self.expect_punct(",")?;
            let n = self.expect_int()?;
            self.expect_punct("]")?;
            return Ok(SubIndex::Dynamic {
                index: Box::new(index),
                wrap: Some(n as u64),
            });
        }

        // A bare integer is a fixed index or the start of a range.
        if let Tok::Int(_, false) = self.current() {
            let start = self.expect_int()?;
            if self.eat_punct(":") {
                let end = self.expect_int()?;
                self.expect_punct("]")?;
                return Ok(SubIndex::Range(start as u64, end as u64));
            }
            self.expect_punct("]")?;
            return Ok(SubIndex::Fixed(start as u64));
        }

        let index = self.parse_expr(module)?;
        self.expect_punct("]")?;
        Ok(SubIndex::Dynamic {
            index: Box::new(index),
            wrap: None,
        })
    }

    // ---- expressions ----

    fn parse_expr(&mut self, module: &Module) -> CompileResult<Expr> {
        let mut expr = self.parse_primary(module)?;
        while matches!(self.current(), Tok::Punct("[")) {
            let index = self.parse_sub_index(module)?;
            expr = Expr::SubElement {
                parent: Box::new(expr),
                index,
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self, module: &Module) -> CompileResult<Expr> {
        if self.eat_punct("%") {
            let name = self.expect_ident()?;
            return Ok(Expr::Variable(self.lookup_variable(&name)?));
        }

        if self.eat_punct("(") {
            let lhs = self.parse_expr(module)?;
            let op = self.parse_binary_operator()?;
            let rhs = self.parse_expr(module)?;
            self.expect_punct(")")?;

            let lhs_type = lhs.get_type(module, &self.program.structs);
            let rhs_type = rhs.get_type(module, &self.program.structs);
            let ty = soul_ir::types::TypeRules::binary_op_types(op, &lhs_type, &rhs_type)
                .map(|t| t.result)
                .unwrap_or(lhs_type);
            return Ok(Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                ty,
            });
        }

        if self.eat_keyword("cast") {
            let target = self.parse_type()?;
            self.expect_punct("(")?;
            let source = self.parse_expr(module)?;
            self.expect_punct(")")?;
            return Ok(Expr::Cast {
                target,
                source: Box::new(source),
            });
        }

        for (word, op) in [
            ("neg", UnaryOperator::Negate),
            ("not", UnaryOperator::LogicalNot),
            ("bnot", UnaryOperator::BitwiseNot),
        ] {
            if matches!(self.current(), Tok::Ident(w) if w == word) {
                self.advance();
                self.expect_punct("(")?;
                let source = self.parse_expr(module)?;
                self.expect_punct(")")?;
                return Ok(Expr::Unary {
                    op,
                    source: Box::new(source),
                });
            }
        }

        if matches!(self.current(), Tok::Ident(w) if w == "processor") {
            self.advance();
            self.expect_punct(".")?;
            let property_name = self.expect_ident()?;
            let property = ProcessorProperty::from_name(&property_name)
                .ok_or_else(|| syntax_error(self.line(), "unknown processor property"))?;
            return Ok(Expr::ProcessorProperty(property));
        }

        Ok(Expr::Constant(self.parse_constant()?))
    }

    fn parse_binary_operator(&mut self) -> CompileResult<BinaryOperator> {
        let line = self.line();
        match self.advance() {
            Tok::Punct(p) => BinaryOperator::from_symbol(p)
                .ok_or_else(|| syntax_error(line, &format!("unknown operator '{p}'"))),
            _ => Err(syntax_error(line, "expected an operator")),
        }
    }

    // ---- constants ----

    fn parse_constant(&mut self) -> CompileResult<Value> {
        match self.current().clone() {
            Tok::Int(v, true) => {
                self.advance();
                Ok(Value::int64(v))
            }
            Tok::Int(v, false) => {
                self.advance();
                let v32 = i32::try_from(v)
                    .map_err(|_| syntax_error(self.line(), "int32 constant out of range"))?;
                Ok(Value::int32(v32))
            }
            Tok::Float(v, true) => {
                self.advance();
                Ok(Value::float32(v as f32))
            }
            Tok::Float(v, false) => {
                self.advance();
                Ok(Value::float64(v))
            }
            Tok::Str(s) => {
                self.advance();
                let handle = self.program.string_dictionary.handle_for_string(&s);
                Ok(Value::string_literal(handle))
            }
            Tok::Ident(w) => match w.as_str() {
                "true" => {
                    self.advance();
                    Ok(Value::bool(true))
                }
                "false" => {
                    self.advance();
                    Ok(Value::bool(false))
                }
                "nan32" => {
                    self.advance();
                    Ok(Value::float32(f32::NAN))
                }
                "inf32" => {
                    self.advance();
                    Ok(Value::float32(f32::INFINITY))
                }
                "nan64" => {
                    self.advance();
                    Ok(Value::float64(f64::NAN))
                }
                "inf64" => {
                    self.advance();
                    Ok(Value::float64(f64::INFINITY))
                }
                _ => self.parse_typed_constant(),
            },
            Tok::Punct("-") => {
                // `-inf32` / `-inf64`.
                self.advance();
                match self.advance() {
                    Tok::Ident(w) if w == "inf32" => Ok(Value::float32(f32::NEG_INFINITY)),
                    Tok::Ident(w) if w == "inf64" => Ok(Value::float64(f64::NEG_INFINITY)),
                    _ => Err(syntax_error(self.line(), "expected a constant")),
                }
            }
            _ => Err(syntax_error(self.line(), "expected a constant")),
        }
    }

    /// `TYPE literal` for bounded ints, `TYPE (...)` for aggregates.
    fn parse_typed_constant(&mut self) -> CompileResult<Value> {
        let ty = self.parse_type()?;

        if ty.is_bounded_int() {
            let v = self.expect_int()?;
            return Value::int32(v as i32)
                .cast_to_type(&ty, &self.program.structs)
                .map_err(|_| syntax_error(self.line(), "bounded constant out of range"));
        }

        self.expect_punct("(")?;
        let mut items = Vec::new();
        if !self.eat_punct(")") {
            loop {
                items.push(self.parse_constant()?);
                if self.eat_punct(")") {
                    break;
                }
                self.expect_punct(",")?;
            }
        }

        if ty.is_unsized_array() {
            let element = ty.element_type().unwrap_or(Type::float32());
            let sized = Type::array(element.clone(), items.len().max(1) as u64)
                .unwrap_or_else(|_| Type::create_unsized_array(element.clone()));
            let content = Value::aggregate(sized, items);
            let handle = self.program.constant_table.add(content);
            return Ok(Value::unsized_array(element, handle));
        }

        Ok(Value::aggregate(ty, items))
    }

    // ---- types ----

    fn parse_type(&mut self) -> CompileResult<Type> {
        let is_const = self.eat_keyword("const");
        let mut ty = self.parse_base_type()?;

        loop {
            if self.eat_punct("<") {
                let n = self.expect_int()?;
                self.expect_punct(">")?;
                let primitive = ty.primitive_type().ok_or_else(|| {
                    syntax_error(self.line(), "vector elements must be primitive")
                })?;
                ty = Type::vector(primitive, n as u64)
                    .map_err(|_| syntax_error(self.line(), "illegal vector size"))?;
            } else if self.eat_punct("[") {
                if self.eat_punct("]") {
                    ty = Type::create_unsized_array(ty);
                } else {
                    let n = self.expect_int()?;
                    self.expect_punct("]")?;
                    ty = Type::array(ty, n as u64)
                        .map_err(|_| syntax_error(self.line(), "illegal array size"))?;
                }
            } else if self.eat_punct("&") {
                ty = ty.with_reference();
            } else {
                break;
            }
        }

        if is_const {
            ty = ty.with_const();
        }
        Ok(ty)
    }

    fn parse_base_type(&mut self) -> CompileResult<Type> {
        let line = self.line();
        let word = self.expect_ident()?;

        if let Some(p) = PrimitiveType::from_text(&word) {
            return Ok(Type::primitive(p));
        }
        if word == "string" {
            return Ok(Type::string_literal());
        }
        if word == "wrap" || word == "clamp" {
            self.expect_punct("<")?;
            let n = self.expect_int()?;
            self.expect_punct(">")?;
            let kind = if word == "wrap" {
                BoundedIntKind::Wrap
            } else {
                BoundedIntKind::Clamp
            };
            return Type::bounded_int(kind, n)
                .map_err(|_| syntax_error(line, "illegal bounded-int size"));
        }

        match self.struct_names.get(&word) {
            Some(&id) => Ok(Type::structure(id)),
            None => Err(syntax_error(line, &format!("unknown type '{word}'"))),
        }
    }

    fn parse_annotation(&mut self) -> CompileResult<PlainAnnotation> {
        let mut annotation = Vec::new();
        if !self.eat_punct("[[") {
            return Ok(annotation);
        }
        if self.eat_punct("]]") {
            return Ok(annotation);
        }
        loop {
            let key = self.expect_ident()?;
            let value = if self.eat_punct(":") {
                self.parse_constant()?
            } else {
                Value::bool(true)
            };
            annotation.push((key, value));
            if self.eat_punct(",") {
                continue;
            }
            self.expect_punct("]]")?;
            return Ok(annotation);
        }
    }

    // ---- finishing ----

    fn resolve_calls(&mut self) -> CompileResult<()> {
        let mut by_name: FxHashMap<String, FunctionRef> = FxHashMap::default();
        for (module_index, module) in self.program.modules.iter().enumerate() {
            for (function_index, function) in module.functions.iter().enumerate() {
                let qualified = if module.name.is_empty() {
                    function.name.clone()
                } else {
                    format!("{}::{}", module.name, function.name)
                };
                by_name.insert(
                    qualified,
                    FunctionRef {
                        module: module_index,
                        function: function_index,
                    },
                );
            }
        }

        for module in &mut self.program.modules {
            for function in &mut module.functions {
                for block in &mut function.blocks {
                    for statement in &mut block.statements {
                        if let Statement::FunctionCall { name, function, .. } = statement {
                            match by_name.get(name) {
                                Some(&r) => *function = Some(r),
                                None => {
                                    return Err(syntax_error(
                                        0,
                                        &format!("unknown function '{name}'"),
                                    ))
                                }
                            }
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn pick_main_processor(&mut self) {
        let annotated = self.program.modules.iter().position(|m| {
            m.kind != ModuleKind::Namespace
                && m.annotation
                    .iter()
                    .any(|(key, value)| key == "main" && value.get_as_bool() == Some(true))
        });
        self.program.main_processor = annotated.or_else(|| {
            self.program
                .modules
                .iter()
                .rposition(|m| m.kind != ModuleKind::Namespace)
        });
    }
}
