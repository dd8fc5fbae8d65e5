//! Top-level declarations: namespaces, processors, graphs, endpoints,
//! processor instances, connections, functions, and state variables.

use super::ParseTypeContext;
use crate::Parser;
use soul_diagnostic::{errors, CompileResult};
use soul_ir::ast::{
    Annotation, Connection, ConnectionEnd, Context, EndpointDecl, EndpointId, Expr, ExprClass,
    ExprId, FuncId, Function, Module, ModuleId, ModuleKind, ProcessorInstance, ScopeRef,
    SpecialisationParam, StructDecl, StructMemberDecl, UsingDecl, Variable,
};
use soul_ir::endpoint::{EndpointKind, InterpolationType};
use soul_ir::intrinsic::IntrinsicType;
use soul_ir::types::Type;
use soul_ir::value::ValueData;
use soul_ir::{Name, TokenKind};

/// Most parameters a function may declare.
const MAX_FUNCTION_PARAMETERS: usize = 128;

#[derive(Copy, Clone, PartialEq)]
enum NewModuleKind {
    Namespace,
    Processor,
    Graph,
}

impl<'a> Parser<'a> {
    pub(crate) fn parse_top_level_decls(&mut self, parent: ModuleId) -> CompileResult<()> {
        while !self.cursor.is_at_end() {
            self.parse_top_level_decl(parent)?;
        }
        Ok(())
    }

    fn parse_top_level_decl(&mut self, parent: ModuleId) -> CompileResult<()> {
        self.parse_imports(parent)?;

        if self.cursor.eat(&TokenKind::Processor) {
            self.parse_module_decl(parent, NewModuleKind::Processor)?;
        } else if self.cursor.eat(&TokenKind::Graph) {
            self.parse_module_decl(parent, NewModuleKind::Graph)?;
        } else if self.cursor.eat(&TokenKind::Namespace) {
            self.parse_module_decl(parent, NewModuleKind::Namespace)?;
        } else if self.cursor.check(&TokenKind::Import) {
            return Err(self.error(errors::imports_must_be_at_start(self.location())));
        } else {
            return Err(self.error(errors::expected_top_level_decl(self.location())));
        }
        Ok(())
    }

    fn parse_imports(&mut self, module: ModuleId) -> CompileResult<()> {
        while self.cursor.eat(&TokenKind::Import) {
            let location = self.location();

            let name = match self.cursor.current_kind().clone() {
                TokenKind::String(s) => {
                    self.cursor.advance();
                    self.ast.interner.lookup(s)
                }
                TokenKind::Ident(_) => {
                    let first = self.parse_identifier()?;
                    let mut name = self.ast.interner.lookup(first);
                    while self.cursor.eat(&TokenKind::Dot) {
                        let part = self.parse_identifier()?;
                        name.push('.');
                        name.push_str(&self.ast.interner.lookup(part));
                    }
                    name
                }
                _ => return Err(self.error(errors::expected_module_name(location))),
            };

            self.expect(&TokenKind::Semicolon)?;

            if let ModuleKind::Namespace { imports } = &mut self.ast.module_mut(module).kind {
                if !imports.contains(&name) {
                    imports.push(name);
                }
            }

            return Err(self.error(errors::not_yet_implemented(location, "import statements")));
        }
        Ok(())
    }

    fn parse_module_decl(
        &mut self,
        parent: ModuleId,
        kind: NewModuleKind,
    ) -> CompileResult<ModuleId> {
        let context = self.context();
        let name = self.parse_identifier()?;

        let module_kind = match kind {
            NewModuleKind::Namespace => ModuleKind::Namespace {
                imports: Vec::new(),
            },
            NewModuleKind::Processor => ModuleKind::Processor,
            NewModuleKind::Graph => ModuleKind::Graph {
                instances: Vec::new(),
                connections: Vec::new(),
            },
        };

        let module = self.ast.alloc_module(Module {
            context,
            name,
            parent: Some(parent),
            kind: module_kind,
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
        self.ast.module_mut(parent).sub_modules.push(module);

        // `namespace A::B { ... }` nests B inside A.
        if kind == NewModuleKind::Namespace && self.cursor.eat(&TokenKind::DoubleColon) {
            return self.with_module(module, |p| p.parse_module_decl(module, kind));
        }

        self.with_module(module, |p| p.parse_module_content(kind))?;
        Ok(module)
    }

    fn parse_module_content(&mut self, kind: NewModuleKind) -> CompileResult<()> {
        let module = self.current_module();

        if kind != NewModuleKind::Namespace {
            self.parse_specialisation_params(kind)?;
        }
        let annotation = self.parse_annotation()?;
        self.ast.module_mut(module).annotation = annotation;

        self.expect(&TokenKind::OpenBrace)?;

        match kind {
            NewModuleKind::Graph => {
                loop {
                    if self.parse_endpoint_decl()?
                        || self.parse_processor_instance_list()?
                        || self.parse_connection_list()?
                    {
                        continue;
                    }
                    break;
                }
                self.expect(&TokenKind::CloseBrace)?;
                self.give_error_on_semicolon()
            }
            NewModuleKind::Processor => {
                while self.parse_endpoint_decl()? {}
                self.parse_member_decls()
            }
            NewModuleKind::Namespace => {
                self.parse_imports(module)?;
                self.parse_member_decls()
            }
        }
    }

    /// Declarations after a processor's endpoints, or a namespace's
    /// imports, up to the closing brace.
    fn parse_member_decls(&mut self) -> CompileResult<()> {
        let module = self.current_module();
        let is_namespace = self.ast.module(module).is_namespace();

        while !self.cursor.eat(&TokenKind::CloseBrace) {
            if self.cursor.is_at_end() {
                return Err(self.expected("'}'"));
            }

            if self.cursor.eat(&TokenKind::Struct) {
                self.parse_struct_declaration()?;
            } else if self.cursor.eat(&TokenKind::Using) {
                self.parse_using_declaration()?;
            } else if self.cursor.eat(&TokenKind::Namespace) {
                if !is_namespace {
                    return Err(
                        self.error(errors::namespace_must_be_inside_namespace(self.location()))
                    );
                }
                self.parse_module_decl(module, NewModuleKind::Namespace)?;
            } else if self.cursor.eat(&TokenKind::Processor) {
                if !is_namespace {
                    return Err(
                        self.error(errors::processor_must_be_inside_namespace(self.location()))
                    );
                }
                self.parse_module_decl(module, NewModuleKind::Processor)?;
            } else if self.cursor.eat(&TokenKind::Graph) {
                if !is_namespace {
                    return Err(self.error(errors::graph_must_be_inside_namespace(self.location())));
                }
                self.parse_module_decl(module, NewModuleKind::Graph)?;
            } else if self.cursor.eat(&TokenKind::Let) {
                self.parse_top_level_let_or_var(true)?;
            } else if self.cursor.eat(&TokenKind::Var) {
                self.parse_top_level_let_or_var(false)?;
            } else if self.cursor.eat(&TokenKind::Event) {
                self.parse_event_function()?;
            } else if self.cursor.check_any(&[TokenKind::Input, TokenKind::Output]) {
                return Err(if is_namespace {
                    self.error(errors::namespace_cannot_contain_endpoints(self.location()))
                } else {
                    self.error(errors::endpoint_decls_must_be_first(self.location()))
                });
            } else if self.cursor.check(&TokenKind::Import) {
                return Err(self.error(errors::imports_must_be_at_start(self.location())));
            } else {
                self.parse_function_or_state_variable()?;
            }
        }

        self.give_error_on_semicolon()
    }

    // ---- specialisation parameters ----

    fn parse_specialisation_params(&mut self, kind: NewModuleKind) -> CompileResult<()> {
        if !self.cursor.eat(&TokenKind::OpenParen) {
            return Ok(());
        }
        if self.cursor.eat(&TokenKind::CloseParen) {
            return Ok(());
        }

        let module = self.current_module();
        loop {
            if self.cursor.eat(&TokenKind::Using) {
                if kind == NewModuleKind::Graph {
                    return Err(
                        self.error(errors::graph_cannot_have_specialisations(self.location()))
                    );
                }
                let context = self.context();
                let name = self.parse_identifier()?;
                let using = self.ast.alloc_using(UsingDecl {
                    context,
                    name,
                    target: None,
                });
                let m = self.ast.module_mut(module);
                m.usings.push(using);
                m.specialisation_params
                    .push(SpecialisationParam::Using(using));
            } else if self.cursor.eat(&TokenKind::Processor) {
                if kind != NewModuleKind::Graph {
                    return Err(
                        self.error(errors::processor_specialisation_not_allowed(self.location()))
                    );
                }
                let context = self.context();
                let name = self.parse_identifier()?;
                self.ast
                    .module_mut(module)
                    .specialisation_params
                    .push(SpecialisationParam::ProcessorAlias { name, context });
            } else {
                self.give_error_on_external_keyword()?;
                let parameter_type = self.parse_type(ParseTypeContext::ProcessorParameter)?;
                let context = self.context();
                let name = self.parse_identifier()?;
                let var = self.ast.alloc_variable(Variable {
                    context,
                    name,
                    declared_type: Some(parameter_type),
                    initial_value: None,
                    is_const: true,
                    is_external: false,
                    is_parameter: false,
                    annotation: Annotation::default(),
                    num_reads: 0,
                    num_writes: 0,
                });
                let m = self.ast.module_mut(module);
                m.state_variables.push(var);
                m.specialisation_params.push(SpecialisationParam::Value(var));
            }

            if self.cursor.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::CloseParen)?;
            return Ok(());
        }
    }

    // ---- endpoints ----

    /// Returns true when an `input`/`output` section was parsed.
    fn parse_endpoint_decl(&mut self) -> CompileResult<bool> {
        let is_input = if self.cursor.eat(&TokenKind::Input) {
            true
        } else if self.cursor.eat(&TokenKind::Output) {
            false
        } else {
            return Ok(false);
        };

        if self.cursor.eat(&TokenKind::OpenBrace) {
            while !self.cursor.eat(&TokenKind::CloseBrace) {
                let kind = self.parse_endpoint_kind()?;
                self.parse_endpoint_items(is_input, kind)?;
            }
        } else {
            let kind = self.parse_endpoint_kind()?;
            if self.cursor.eat(&TokenKind::OpenBrace) {
                while !self.cursor.eat(&TokenKind::CloseBrace) {
                    self.parse_endpoint_items(is_input, kind)?;
                }
            } else {
                self.parse_endpoint_items(is_input, kind)?;
            }
        }

        Ok(true)
    }

    fn parse_endpoint_kind(&mut self) -> CompileResult<EndpointKind> {
        if self.cursor.eat(&TokenKind::Event) {
            return Ok(EndpointKind::Event);
        }
        if let Some(name) = self.cursor.check_ident() {
            if let Some(kind) = EndpointKind::from_text(&self.ast.interner.lookup(name)) {
                self.cursor.advance();
                return Ok(kind);
            }
        }
        Err(self.error(errors::expected_endpoint_kind(self.location())))
    }

    /// One `type name [size] [[...]], name2, ...;` line.
    fn parse_endpoint_items(&mut self, is_input: bool, kind: EndpointKind) -> CompileResult<()> {
        let context = self.context();
        let sample_types = self.parse_endpoint_type_list(kind, context)?;

        let first = self.parse_one_endpoint(is_input, kind, sample_types.clone())?;
        self.add_endpoint(is_input, first);

        while self.cursor.eat(&TokenKind::Comma) {
            let e = self.parse_one_endpoint(is_input, kind, sample_types.clone())?;
            self.add_endpoint(is_input, e);
        }

        self.expect(&TokenKind::Semicolon)
    }

    fn parse_one_endpoint(
        &mut self,
        is_input: bool,
        kind: EndpointKind,
        sample_types: Vec<ExprId>,
    ) -> CompileResult<EndpointId> {
        let context = self.context();
        let name = self.parse_identifier()?;

        let array_size = if self.cursor.eat(&TokenKind::OpenBracket) {
            let size = self.parse_expression(false)?;
            self.expect(&TokenKind::CloseBracket)?;
            Some(size)
        } else {
            None
        };

        let annotation = self.parse_annotation()?;

        Ok(self.ast.alloc_endpoint(EndpointDecl {
            context,
            name,
            is_input,
            kind,
            sample_types,
            array_size,
            annotation,
        }))
    }

    fn add_endpoint(&mut self, is_input: bool, endpoint: EndpointId) {
        let module = self.current_module();
        let m = self.ast.module_mut(module);
        if is_input {
            m.inputs.push(endpoint);
        } else {
            m.outputs.push(endpoint);
        }
    }

    fn parse_endpoint_type_list(
        &mut self,
        kind: EndpointKind,
        context: Context,
    ) -> CompileResult<Vec<ExprId>> {
        let mut result = Vec::new();

        if self.cursor.eat(&TokenKind::OpenParen) {
            loop {
                result.push(self.parse_type(ParseTypeContext::EventType)?);
                if self.cursor.eat(&TokenKind::CloseParen) {
                    break;
                }
                self.expect(&TokenKind::Comma)?;
            }
        } else {
            result.push(self.parse_type(ParseTypeContext::EventType)?);
        }

        if !kind.is_event() && result.len() > 1 {
            return Err(self.error(errors::no_multiple_types_on_endpoint(context.location)));
        }

        Ok(result)
    }

    // ---- graph bodies ----

    fn parse_processor_instance_list(&mut self) -> CompileResult<bool> {
        self.parse_optionally_braced_list(&TokenKind::Let, Self::parse_processor_instance)
    }

    fn parse_connection_list(&mut self) -> CompileResult<bool> {
        self.parse_optionally_braced_list(&TokenKind::Connection, Self::parse_connection)
    }

    fn parse_optionally_braced_list(
        &mut self,
        keyword: &TokenKind,
        mut item: impl FnMut(&mut Self) -> CompileResult<()>,
    ) -> CompileResult<bool> {
        if !self.cursor.eat(keyword) {
            return Ok(false);
        }
        if self.cursor.eat(&TokenKind::OpenBrace) {
            while !self.cursor.eat(&TokenKind::CloseBrace) {
                item(self)?;
            }
        } else {
            item(self)?;
        }
        Ok(true)
    }

    fn parse_processor_instance(&mut self) -> CompileResult<()> {
        let context = self.context();
        let instance_name = self.parse_identifier()?;

        if self.cursor.check(&TokenKind::DoubleColon) {
            return Err(self.error(errors::qualifier_on_channel(self.location())));
        }

        let module = self.current_module();
        if let ModuleKind::Graph { instances, .. } = &self.ast.module(module).kind {
            if instances.iter().any(|i| i.instance_name == instance_name) {
                let name = self.ast.interner.lookup(instance_name);
                return Err(self.error(errors::name_in_use(context.location, &name)));
            }
        }

        self.expect(&TokenKind::Assign)?;
        let target = self.parse_qualified_identifier()?;

        // Array of processors.
        let array_size = if self.cursor.eat(&TokenKind::OpenBracket) {
            let size = self.parse_expression(false)?;
            self.expect(&TokenKind::CloseBracket)?;
            Some(size)
        } else {
            None
        };

        // Parameterised.
        let mut specialisation_args = Vec::new();
        if self.cursor.eat(&TokenKind::OpenParen) {
            if !self.cursor.eat(&TokenKind::CloseParen) {
                loop {
                    specialisation_args.push(self.parse_specialisation_value_or_type()?);
                    if self.cursor.eat(&TokenKind::CloseParen) {
                        break;
                    }
                    self.expect(&TokenKind::Comma)?;
                }
            }
        }

        // Clocked.
        let mut clock_multiplier = None;
        let mut clock_divider = None;
        if self.cursor.eat(&TokenKind::Times) {
            clock_multiplier = Some(self.parse_expression(false)?);
        } else if self.cursor.eat(&TokenKind::Divide) {
            clock_divider = Some(self.parse_expression(false)?);
        }

        self.expect(&TokenKind::Semicolon)?;

        if let ModuleKind::Graph { instances, .. } = &mut self.ast.module_mut(module).kind {
            instances.push(ProcessorInstance {
                context,
                instance_name,
                target,
                array_size,
                specialisation_args,
                clock_multiplier,
                clock_divider,
            });
        }
        Ok(())
    }

    /// A specialisation argument may be a type or a value; try the type
    /// first and rewind when a call-looking form follows.
    fn parse_specialisation_value_or_type(&mut self) -> CompileResult<ExprId> {
        let start = self.cursor.snapshot();

        if let Ok(Some(t)) = self.try_parse_type(ParseTypeContext::UsingDeclTarget) {
            if !self.cursor.check(&TokenKind::OpenParen) {
                return Ok(t);
            }
        }

        self.cursor.restore(start);
        self.parse_expression(false)
    }

    fn parse_connection(&mut self) -> CompileResult<()> {
        let interpolation = self.parse_optional_interpolation_type()?;
        let mut context = self.context();

        let mut sources = Vec::new();
        let delay_length;
        loop {
            sources.push(self.parse_connection_end()?);
            if self.cursor.eat(&TokenKind::Comma) {
                continue;
            }
            context = self.context();
            self.expect(&TokenKind::RightArrow)?;
            delay_length = self.parse_delay_length()?;
            break;
        }

        let mut dests = Vec::new();
        loop {
            dests.push(self.parse_connection_end()?);
            if self.cursor.eat(&TokenKind::Comma) {
                continue;
            }
            self.expect(&TokenKind::Semicolon)?;
            break;
        }

        if sources.len() > 1 && dests.len() > 1 {
            return Err(self.error(errors::not_yet_implemented(
                context.location,
                "many-to-many connections",
            )));
        }

        let module = self.current_module();
        if let ModuleKind::Graph { connections, .. } = &mut self.ast.module_mut(module).kind {
            for source in &sources {
                for dest in &dests {
                    connections.push(Connection {
                        context,
                        interpolation,
                        source: source.clone(),
                        dest: dest.clone(),
                        delay_length,
                    });
                }
            }
        }
        Ok(())
    }

    fn parse_optional_interpolation_type(&mut self) -> CompileResult<InterpolationType> {
        if !self.cursor.eat(&TokenKind::OpenBracket) {
            return Ok(InterpolationType::None);
        }

        let location = self.location();
        let name = self.parse_identifier()?;
        let interpolation = InterpolationType::from_text(&self.ast.interner.lookup(name))
            .ok_or_else(|| {
                self.error(errors::found_instead(
                    location,
                    "an interpolation type",
                    &self.ast.interner.lookup(name),
                ))
            })?;

        self.expect(&TokenKind::CloseBracket)?;
        Ok(interpolation)
    }

    fn parse_delay_length(&mut self) -> CompileResult<Option<ExprId>> {
        if !self.cursor.eat(&TokenKind::OpenBracket) {
            return Ok(None);
        }
        let e = self.parse_expression(false)?;
        self.expect(&TokenKind::CloseBracket)?;
        self.expect(&TokenKind::RightArrow)?;
        Ok(Some(e))
    }

    fn parse_connection_end(&mut self) -> CompileResult<ConnectionEnd> {
        let context = self.context();
        if self.cursor.check_ident().is_none() {
            return Err(self.error(errors::expected_processor_or_endpoint(context.location)));
        }

        let path = self.parse_identifier_path()?;

        if self.cursor.eat(&TokenKind::OpenBracket) {
            let _ = self.parse_expression(false)?;
            self.expect(&TokenKind::CloseBracket)?;
            return Err(self.error(errors::not_yet_implemented(
                context.location,
                "processor indexes",
            )));
        }

        let (processor, channel) = if self.cursor.eat(&TokenKind::Dot) {
            if path.is_qualified() {
                return Err(self.error(errors::qualifier_on_channel(context.location)));
            }
            (Some(path.first_part()), self.parse_identifier()?)
        } else {
            if path.is_qualified() {
                return Err(self.error(errors::qualifier_on_channel(context.location)));
            }
            (None, path.first_part())
        };

        if self.cursor.eat(&TokenKind::OpenBracket) {
            let _ = self.parse_expression(false)?;
            self.expect(&TokenKind::CloseBracket)?;
            return Err(self.error(errors::not_yet_implemented(
                context.location,
                "channel indexes",
            )));
        }

        Ok(ConnectionEnd {
            context,
            processor,
            channel,
        })
    }

    // ---- functions and state variables ----

    fn parse_top_level_let_or_var(&mut self, is_const: bool) -> CompileResult<()> {
        let module = self.current_module();
        if self.ast.module(module).is_graph() {
            // A graph's `let` introduces processor instances, which are
            // parsed in the graph body loop; reaching here means the
            // keyword appeared after the connection section.
            return Err(self.error(errors::no_variable_in_this_scope(self.location())));
        }

        loop {
            let context = self.context();
            let name = self.parse_identifier()?;
            self.expect(&TokenKind::Assign)?;
            let initial_value = self.parse_expression(false)?;

            if matches!(
                self.ast.expr_class(initial_value),
                ExprClass::Type | ExprClass::Processor
            ) {
                return Err(self.error(errors::expected_value(
                    self.ast.expr_context(initial_value).location,
                )));
            }

            let var = self.ast.alloc_variable(Variable {
                context,
                name,
                declared_type: None,
                initial_value: Some(initial_value),
                is_const,
                is_external: false,
                is_parameter: false,
                annotation: Annotation::default(),
                num_reads: 0,
                num_writes: 0,
            });
            self.ast.module_mut(module).state_variables.push(var);

            if self.cursor.eat(&TokenKind::Semicolon) {
                return Ok(());
            }
            self.expect(&TokenKind::Comma)?;
        }
    }

    fn parse_function_or_state_variable(&mut self) -> CompileResult<()> {
        let decl_location = self.location();
        let is_external = self.cursor.eat(&TokenKind::External);

        let declared_type = match self.try_parse_type(ParseTypeContext::VariableType)? {
            Some(t) => t,
            None => return Err(self.error(errors::expected_function_or_variable(decl_location))),
        };

        let name_context = self.context();
        let name = self.parse_identifier()?;

        let mut generic_wildcards = Vec::new();
        if self.cursor.eat(&TokenKind::LessThan) {
            generic_wildcards = self.parse_generic_wildcard_list()?;
        }

        if self.cursor.eat(&TokenKind::OpenParen) {
            if is_external {
                return Err(self.error(errors::function_cannot_be_external(decl_location)));
            }
            let module = self.current_module();
            if self.ast.module(module).is_graph() {
                return Err(self.error(errors::no_function_in_this_scope(decl_location)));
            }
            let f = self.parse_function_declaration(
                declared_type,
                name,
                name_context,
                generic_wildcards,
            )?;
            self.ast.module_mut(module).functions.push(f);
            return Ok(());
        }

        if is_external && self.type_expr_is_const(declared_type) {
            return Err(self.error(errors::no_const_on_externals(decl_location)));
        }

        let module = self.current_module();
        if self.ast.module(module).is_graph() {
            return Err(self.error(errors::no_variable_in_this_scope(decl_location)));
        }

        let mut vars = Vec::new();
        self.parse_variable_declaration_list(declared_type, name, is_external, &mut vars)?;
        for (var, _) in vars {
            self.ast.module_mut(module).state_variables.push(var);
        }
        Ok(())
    }

    fn parse_generic_wildcard_list(&mut self) -> CompileResult<Vec<(Name, Context)>> {
        let mut wildcards: Vec<(Name, Context)> = Vec::new();

        loop {
            let context = self.context();
            let name = match self.cursor.eat_ident() {
                Some(n) => n,
                None => {
                    return Err(self.error(errors::expected_generic_wildcard_name(self.location())))
                }
            };
            if self.cursor.check(&TokenKind::DoubleColon) {
                return Err(self.error(errors::qualifier_on_generic(self.location())));
            }
            if wildcards.iter().any(|(n, _)| *n == name) {
                return Err(self.error(errors::wildcard_not_unique(
                    context.location,
                    &self.ast.interner.lookup(name),
                )));
            }
            wildcards.push((name, context));

            if self.cursor.eat(&TokenKind::GreaterThan) {
                return Ok(wildcards);
            }
            self.expect(&TokenKind::Comma)?;
        }
    }

    fn parse_function_declaration(
        &mut self,
        return_type: ExprId,
        name: Name,
        name_context: Context,
        generic_wildcards: Vec<(Name, Context)>,
    ) -> CompileResult<FuncId> {
        if let Some(t) = self.ast.resolve_as_type(return_type) {
            if t.is_const {
                return Err(
                    self.error(errors::function_return_type_cannot_be_const(name_context.location))
                );
            }
        }

        let module = self.current_module();
        let function = self.ast.alloc_function(Function {
            context: name_context,
            name,
            name_context,
            module,
            return_type,
            parameters: Vec::new(),
            generic_wildcards,
            generic_specialisations: Vec::new(),
            block: None,
            annotation: Annotation::default(),
            intrinsic: IntrinsicType::None,
            is_event_handler: false,
            original_generic: None,
        });

        self.with_scope(ScopeRef::Function(function), |p| {
            if !p.cursor.eat(&TokenKind::CloseParen) {
                loop {
                    p.give_error_on_external_keyword()?;
                    let type_location = p.location();
                    let param_type = p.parse_type(ParseTypeContext::FunctionParameter)?;

                    if let Some(t) = p.ast.resolve_as_type(param_type) {
                        if t.is_void() {
                            return Err(p.error(errors::parameter_cannot_be_void(type_location)));
                        }
                    }

                    if p.ast.function(function).parameters.len() >= MAX_FUNCTION_PARAMETERS {
                        return Err(p.error(errors::too_many_parameters(type_location)));
                    }

                    let param_context = p.context();
                    let param_name = p.parse_identifier()?;
                    let annotation = p.parse_annotation()?;
                    let var = p.ast.alloc_variable(Variable {
                        context: param_context,
                        name: param_name,
                        declared_type: Some(param_type),
                        initial_value: None,
                        is_const: false,
                        is_external: false,
                        is_parameter: true,
                        annotation,
                        num_reads: 0,
                        num_writes: 0,
                    });
                    p.ast.function_mut(function).parameters.push(var);

                    if p.cursor.eat(&TokenKind::CloseParen) {
                        break;
                    }
                    p.expect(&TokenKind::Comma)?;
                }
            }

            let annotation = p.parse_annotation()?;
            p.ast.function_mut(function).intrinsic = p.intrinsic_from_annotation(&annotation);
            p.ast.function_mut(function).annotation = annotation;

            if !p.cursor.eat(&TokenKind::Semicolon) {
                let block = p.parse_block(Some(function))?;
                p.ast.function_mut(function).block = Some(block);
            }
            Ok(())
        })?;

        Ok(function)
    }

    fn intrinsic_from_annotation(&self, annotation: &Annotation) -> IntrinsicType {
        let Some(property) = annotation.find(self.ast.names.intrin) else {
            return IntrinsicType::None;
        };
        let Expr::Constant(v) = self.ast.expr(property.value) else {
            return IntrinsicType::None;
        };
        if !v.get_type().is_string_literal() {
            return IntrinsicType::None;
        }
        match v.data() {
            ValueData::String(handle) => {
                IntrinsicType::from_name(self.ast.string_dictionary.string_for_handle(*handle))
            }
            _ => IntrinsicType::None,
        }
    }

    /// `event name(Type arg) { ... }`: an event handler for a declared
    /// event input.
    fn parse_event_function(&mut self) -> CompileResult<()> {
        let module = self.current_module();
        if !self.ast.module(module).is_processor() {
            return Err(self.error(errors::no_event_functions_allowed(self.location())));
        }

        let context = self.context();
        let name = self.parse_identifier()?;
        self.expect(&TokenKind::OpenParen)?;

        let void_type = self
            .ast
            .alloc_expr(Expr::ConcreteType(Type::void()), context);

        let function = self.ast.alloc_function(Function {
            context,
            name,
            name_context: context,
            module,
            return_type: void_type,
            parameters: Vec::new(),
            generic_wildcards: Vec::new(),
            generic_specialisations: Vec::new(),
            block: None,
            annotation: Annotation::default(),
            intrinsic: IntrinsicType::None,
            is_event_handler: true,
            original_generic: None,
        });
        self.ast.module_mut(module).functions.push(function);

        self.with_scope(ScopeRef::Function(function), |p| {
            let param_type = p.parse_type(ParseTypeContext::FunctionParameter)?;
            let param_context = p.context();
            let param_name = p.parse_identifier()?;
            let var = p.ast.alloc_variable(Variable {
                context: param_context,
                name: param_name,
                declared_type: Some(param_type),
                initial_value: None,
                is_const: false,
                is_external: false,
                is_parameter: true,
                annotation: Annotation::default(),
                num_reads: 0,
                num_writes: 0,
            });
            p.ast.function_mut(function).parameters.push(var);
            p.expect(&TokenKind::CloseParen)?;

            let block = p.parse_block(Some(function))?;
            p.ast.function_mut(function).block = Some(block);
            Ok(())
        })
    }

    // ---- structs and usings ----

    fn parse_struct_declaration(&mut self) -> CompileResult<()> {
        let module = self.current_module();
        if self.ast.module(module).is_graph() {
            return Err(self.error(errors::struct_decl_not_allowed(self.location())));
        }

        let context = self.context();
        let name = self.parse_identifier()?;
        self.expect(&TokenKind::OpenBrace)?;

        let mut members = Vec::new();
        while !self.cursor.eat(&TokenKind::CloseBrace) {
            let member_type = self.parse_type(ParseTypeContext::StructMember)?;
            loop {
                let member_context = self.context();
                let member_name = self.parse_identifier()?;
                members.push(StructMemberDecl {
                    context: member_context,
                    name: member_name,
                    type_expr: member_type,
                });
                if self.cursor.eat(&TokenKind::Comma) {
                    continue;
                }
                self.expect(&TokenKind::Semicolon)?;
                break;
            }
        }
        self.give_error_on_semicolon()?;

        let decl = self.ast.alloc_struct_decl(StructDecl {
            context,
            name,
            members,
            resolved: None,
        });
        self.ast.module_mut(module).structs.push(decl);
        Ok(())
    }

    fn parse_using_declaration(&mut self) -> CompileResult<()> {
        let module = self.current_module();
        if self.ast.module(module).is_graph() {
            return Err(self.error(errors::using_decl_not_allowed(self.location())));
        }

        let context = self.context();
        let name = self.parse_identifier()?;
        self.expect(&TokenKind::Assign)?;
        let target = self.parse_type(ParseTypeContext::UsingDeclTarget)?;
        self.expect(&TokenKind::Semicolon)?;

        let using = self.ast.alloc_using(UsingDecl {
            context,
            name,
            target: Some(target),
        });
        self.ast.module_mut(module).usings.push(using);
        Ok(())
    }
}
