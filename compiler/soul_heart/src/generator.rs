//! AST → HEART lowering: module-level structure.
//!
//! Walks one fully resolved module and emits a HEART module: endpoints,
//! connections, state variables, and functions. Statement and expression
//! lowering lives in `lower.rs`. Calls whose callee has not been
//! generated yet are recorded and fixed up once every module exists.

use crate::builder::FunctionBuilder;
use crate::ir::{self, *};
use rustc_hash::FxHashMap;
use soul_diagnostic::{errors, CompileError, CompileResult, DiagnosticList};
use soul_ir::ast::{
    self, AstAllocator, Context, EndpointId, Expr as AstExpr, ExprId, ModuleId, ModuleKind,
};
use soul_ir::types::Type;
use tracing::debug;

/// A call site awaiting its callee's HEART function.
pub struct UnresolvedCall {
    pub module: usize,
    pub function: usize,
    pub block: usize,
    pub statement: usize,
    pub target: ast::FuncId,
}

/// Generate the HEART module for one AST module, appending it to
/// `modules`. Runs the post-resolution sanity checks first.
pub fn generate_module(
    ast: &AstAllocator,
    source: ModuleId,
    modules: &mut Vec<Module>,
    func_map: &mut FxHashMap<ast::FuncId, FunctionRef>,
    unresolved: &mut Vec<UnresolvedCall>,
    diagnostics: &mut DiagnosticList,
) -> CompileResult<usize> {
    soul_resolve::sanity::run_post_resolution(ast, source, diagnostics)?;

    let m = ast.module(source);
    let kind = match m.kind {
        ModuleKind::Namespace { .. } => ir::ModuleKind::Namespace,
        ModuleKind::Processor => ir::ModuleKind::Processor,
        ModuleKind::Graph { .. } => ir::ModuleKind::Graph,
    };

    let module_index = modules.len();
    let mut module = Module::new(kind, ast.module_path(source));
    module.annotation = plain_annotation(ast, &m.annotation)?;

    debug!(module = %module.name, "generating HEART module");

    let mut generator = Generator {
        ast,
        source,
        module_index,
        module,
        func_map,
        unresolved,
        diagnostics,
        var_map: FxHashMap::default(),
        builder: FunctionBuilder::new(0),
        loop_targets: Vec::new(),
        loop_index: 0,
        if_index: 0,
    };

    generator.generate()?;
    modules.push(generator.module);
    Ok(module_index)
}

/// Patch every recorded call with its target and dump-stable qualified
/// name. Names can only be final here: a callee's unique HEART name (an
/// overload may have been suffixed) exists once its module is generated.
pub fn resolve_pending_calls(
    modules: &mut [Module],
    func_map: &FxHashMap<ast::FuncId, FunctionRef>,
    unresolved: &[UnresolvedCall],
    ast: &AstAllocator,
) -> CompileResult<()> {
    for call in unresolved {
        let Some(&target) = func_map.get(&call.target) else {
            let f = ast.function(call.target);
            return Err(errors::internal_compiler_error(
                f.context.location,
                "call target was never generated",
            )
            .into());
        };

        let qualified = {
            let callee_module = &modules[target.module];
            let callee = &callee_module.functions[target.function];
            if callee_module.name.is_empty() {
                callee.name.clone()
            } else {
                format!("{}::{}", callee_module.name, callee.name)
            }
        };

        let statement = &mut modules[call.module].functions[call.function].blocks[call.block]
            .statements[call.statement];
        if let Statement::FunctionCall { function, name, .. } = statement {
            *function = Some(target);
            *name = qualified;
        }
    }
    Ok(())
}

pub(crate) fn plain_annotation(
    ast: &AstAllocator,
    annotation: &ast::Annotation,
) -> CompileResult<PlainAnnotation> {
    let mut result = Vec::new();
    for property in &annotation.properties {
        let value = ast
            .get_as_constant(property.value)
            .cloned()
            .ok_or_else(|| {
                CompileError::from(errors::property_must_be_constant(property.context.location))
            })?;
        result.push((ast.interner.lookup(property.name), value));
    }
    Ok(result)
}

/// Loop context while lowering a body.
#[derive(Copy, Clone)]
pub(crate) struct LoopTargets {
    pub break_target: BlockId,
    pub continue_target: BlockId,
}

pub(crate) struct Generator<'a> {
    pub ast: &'a AstAllocator,
    pub source: ModuleId,
    pub module_index: usize,
    pub module: Module,
    pub func_map: &'a mut FxHashMap<ast::FuncId, FunctionRef>,
    pub unresolved: &'a mut Vec<UnresolvedCall>,
    pub diagnostics: &'a mut DiagnosticList,
    /// AST variable → HEART variable, for state, parameters, and locals.
    pub var_map: FxHashMap<ast::VarId, VarId>,
    pub builder: FunctionBuilder,
    pub loop_targets: Vec<LoopTargets>,
    pub loop_index: u32,
    pub if_index: u32,
}

impl<'a> Generator<'a> {
    fn generate(&mut self) -> CompileResult<()> {
        let m = self.ast.module(self.source).clone();

        for &io in m.inputs.iter().chain(m.outputs.iter()) {
            self.generate_endpoint(io)?;
        }

        for &s in &m.structs {
            if let Some(id) = self.ast.struct_decl(s).resolved {
                self.module.structs.push(id);
            }
        }

        match &m.kind {
            ModuleKind::Graph { .. } => self.generate_graph_body()?,
            ModuleKind::Processor => {
                self.generate_state_variables(&m.state_variables)?;
                self.declare_functions(&m.functions)?;
                self.create_init_function(&m.state_variables)?;
                self.generate_function_bodies(&m.functions)?;
            }
            ModuleKind::Namespace { .. } => {
                // Only external constants surface as namespace state;
                // plain constants fold into their uses.
                let externals: Vec<ast::VarId> = m
                    .state_variables
                    .iter()
                    .copied()
                    .filter(|&v| self.ast.variable(v).is_external)
                    .collect();
                self.generate_state_variables(&externals)?;
                self.declare_functions(&m.functions)?;
                self.generate_function_bodies(&m.functions)?;
            }
        }

        Ok(())
    }

    // ---- endpoints ----

    fn generate_endpoint(&mut self, io: EndpointId) -> CompileResult<()> {
        let e = self.ast.endpoint(io).clone();
        let sample_types = self.ast.endpoint_sample_types(io).ok_or_else(|| {
            CompileError::from(errors::expected_type(e.context.location))
        })?;

        let array_size = match e.array_size {
            None => None,
            Some(size) => Some(
                self.ast
                    .get_as_constant(size)
                    .and_then(|v| v.get_as_i64())
                    .filter(|&v| v >= 1)
                    .ok_or_else(|| {
                        CompileError::from(errors::non_const_array_size(
                            self.ast.expr_context(size).location,
                        ))
                    })? as u64,
            ),
        };

        let decl = EndpointDecl {
            name: self.ast.interner.lookup(e.name),
            index: if e.is_input {
                self.module.inputs.len() as u32
            } else {
                self.module.outputs.len() as u32
            },
            kind: e.kind,
            sample_types,
            array_size,
            annotation: plain_annotation(self.ast, &e.annotation)?,
        };

        if e.is_input {
            self.module.inputs.push(decl);
        } else {
            self.module.outputs.push(decl);
        }
        Ok(())
    }

    // ---- graphs ----

    fn generate_graph_body(&mut self) -> CompileResult<()> {
        let ModuleKind::Graph {
            instances,
            connections,
        } = self.ast.module(self.source).kind.clone()
        else {
            return Ok(());
        };

        for instance in &instances {
            let target = match self.ast.expr(instance.target) {
                AstExpr::ProcessorRef(m) => *m,
                _ => {
                    return Err(errors::unknown_processor_instance(
                        instance.context.location,
                        &self.ast.interner.lookup(instance.instance_name),
                    )
                    .into())
                }
            };

            let array_size = match instance.array_size {
                None => 1,
                Some(size) => self
                    .ast
                    .get_as_constant(size)
                    .and_then(|v| v.get_as_i64())
                    .filter(|&v| v >= 1)
                    .ok_or_else(|| {
                        CompileError::from(errors::non_const_array_size(
                            self.ast.expr_context(size).location,
                        ))
                    })? as u64,
            };

            let clock_multiplier = self.clock_ratio(instance.clock_multiplier)?;
            let clock_divider = self.clock_ratio(instance.clock_divider)?;

            let mut specialisation_args = Vec::new();
            for &arg in &instance.specialisation_args {
                let lowered = if let Some(t) = self.ast.resolve_as_type(arg) {
                    SpecialisationArgument::Type(t)
                } else if let AstExpr::ProcessorRef(p) = self.ast.expr(arg) {
                    SpecialisationArgument::ProcessorName(self.ast.module_path(*p))
                } else if let Some(v) = self.ast.get_as_constant(arg) {
                    SpecialisationArgument::Value(v.clone())
                } else {
                    return Err(errors::cannot_resolve_specialisation_value(
                        self.ast.expr_context(arg).location,
                    )
                    .into());
                };
                specialisation_args.push(lowered);
            }

            self.module.instances.push(ProcessorInstance {
                instance_name: self.ast.interner.lookup(instance.instance_name),
                source_name: self.ast.module_path(target),
                array_size,
                clock_multiplier,
                clock_divider,
                specialisation_args,
            });
        }

        for connection in &connections {
            let source = self.resolve_connection_end(&instances, &connection.source, false)?;
            let dest = self.resolve_connection_end(&instances, &connection.dest, true)?;

            let delay_length = match connection.delay_length {
                None => 0,
                Some(delay) => {
                    let c = self.ast.get_as_constant(delay).ok_or_else(|| {
                        CompileError::from(errors::delay_line_must_be_constant(
                            self.ast.expr_context(delay).location,
                        ))
                    })?;
                    soul_resolve::sanity::check_delay_line_length(
                        self.ast.expr_context(delay).location,
                        c,
                    )?
                }
            };

            self.module.connections.push(Connection {
                interpolation: connection.interpolation,
                source_processor: source.0,
                source_channel: source.1,
                dest_processor: dest.0,
                dest_channel: dest.1,
                delay_length,
            });
        }

        Ok(())
    }

    fn clock_ratio(&self, ratio: Option<ExprId>) -> CompileResult<Option<i64>> {
        let Some(ratio) = ratio else { return Ok(None) };
        let location = self.ast.expr_context(ratio).location;
        let c = self
            .ast
            .get_as_constant(ratio)
            .ok_or_else(|| CompileError::from(errors::ratio_must_be_constant(location)))?;
        if !c.get_type().is_primitive_integer() {
            return Err(errors::ratio_must_be_integer(location).into());
        }
        let v = c.get_as_i64().unwrap_or(0);
        if !(1..=512).contains(&v) || v.count_ones() != 1 {
            return Err(errors::ratio_out_of_range(location).into());
        }
        Ok(Some(v))
    }

    /// Resolve one end of a connection to (instance index, channel name),
    /// checking the named endpoint exists with the right direction.
    fn resolve_connection_end(
        &self,
        instances: &[ast::ProcessorInstance],
        end: &ast::ConnectionEnd,
        is_dest: bool,
    ) -> CompileResult<(Option<usize>, String)> {
        let channel = self.ast.interner.lookup(end.channel);
        let location = end.context.location;

        match end.processor {
            None => {
                // The graph's own endpoint: sources read graph inputs,
                // destinations feed graph outputs.
                let m = self.ast.module(self.source);
                let list = if is_dest { &m.outputs } else { &m.inputs };
                let exists = list
                    .iter()
                    .any(|&io| self.ast.interner.lookup(self.ast.endpoint(io).name) == channel);
                if !exists {
                    return Err(errors::unknown_endpoint_in_connection(location, &channel).into());
                }
                Ok((None, channel))
            }
            Some(instance_name) => {
                let index = instances
                    .iter()
                    .position(|i| i.instance_name == instance_name)
                    .ok_or_else(|| {
                        CompileError::from(errors::unknown_processor_instance(
                            location,
                            &self.ast.interner.lookup(instance_name),
                        ))
                    })?;

                // An instance's source end is one of its outputs; a dest
                // end one of its inputs.
                if let AstExpr::ProcessorRef(target) = self.ast.expr(instances[index].target) {
                    let target = self.ast.module(*target);
                    let list = if is_dest { &target.inputs } else { &target.outputs };
                    let exists = list.iter().any(|&io| {
                        self.ast.interner.lookup(self.ast.endpoint(io).name) == channel
                    });
                    if !exists {
                        return Err(
                            errors::unknown_endpoint_in_connection(location, &channel).into()
                        );
                    }
                }

                Ok((Some(index), channel))
            }
        }
    }

    // ---- state variables ----

    fn generate_state_variables(&mut self, state: &[ast::VarId]) -> CompileResult<()> {
        for &v in state {
            let var = self.ast.variable(v);
            let Some(ty) = self.ast.variable_type(v) else {
                return Err(errors::expected_type(var.context.location).into());
            };

            if var.is_external {
                let annotation = plain_annotation(self.ast, &var.annotation)?;
                let id = self.module.add_variable(Variable {
                    name: self.ast.interner.lookup(var.name),
                    ty,
                    role: VariableRole::External,
                    annotation,
                });
                self.module.state_variables.push(id);
                self.var_map.insert(v, id);
                continue;
            }

            // Constant and never-written primitive state folds away; its
            // reads were already replaced by constants.
            if ty.is_const || (var.num_writes == 0 && (ty.is_primitive() || ty.is_bounded_int()))
            {
                continue;
            }

            let annotation = plain_annotation(self.ast, &var.annotation)?;
            let id = self.module.add_variable(Variable {
                name: self.ast.interner.lookup(var.name),
                ty,
                role: VariableRole::State,
                annotation,
            });
            self.module.state_variables.push(id);
            self.var_map.insert(v, id);
        }
        Ok(())
    }

    // ---- functions ----

    /// Create every function record first so calls resolve regardless of
    /// declaration order.
    fn declare_functions(&mut self, functions: &[ast::FuncId]) -> CompileResult<()> {
        for &f in functions {
            let function = self.ast.function(f);
            if function.is_generic() {
                continue;
            }

            let base = self.ast.interner.lookup(function.name);
            let name = if function.is_event_handler {
                let param_type = function
                    .parameters
                    .first()
                    .and_then(|&p| self.ast.variable_type(p))
                    .unwrap_or(Type::void());
                ir::event_function_name(&base, &param_type, &self.ast.structs)
            } else {
                let mut name = base.clone();
                let mut suffix = 1;
                while self.module.find_function(&name).is_some() {
                    suffix += 1;
                    name = format!("{base}_{suffix}");
                }
                name
            };

            let return_type = self
                .ast
                .resolve_as_type(function.return_type)
                .ok_or_else(|| {
                    CompileError::from(errors::expected_type(function.context.location))
                })?;

            let annotation = plain_annotation(self.ast, &function.annotation)?;
            let index = self.module.functions.len();
            self.module.functions.push(Function {
                name,
                return_type,
                parameters: Vec::new(),
                locals: Vec::new(),
                blocks: Vec::new(),
                is_run_function: self.ast.is_run_function(f),
                is_event_function: function.is_event_handler,
                is_init_function: false,
                has_no_body: function.block.is_none(),
                intrinsic: function.intrinsic,
                annotation,
            });
            self.func_map.insert(
                f,
                FunctionRef {
                    module: self.module_index,
                    function: index,
                },
            );
        }
        Ok(())
    }

    fn create_init_function(&mut self, state: &[ast::VarId]) -> CompileResult<()> {
        let index = self.module.functions.len();
        self.module.functions.push(Function {
            name: ir::init_function_name().to_string(),
            return_type: Type::void(),
            parameters: Vec::new(),
            locals: Vec::new(),
            blocks: Vec::new(),
            is_run_function: false,
            is_event_function: false,
            is_init_function: true,
            has_no_body: false,
            intrinsic: soul_ir::intrinsic::IntrinsicType::None,
            annotation: Vec::new(),
        });

        self.builder = FunctionBuilder::new(index);
        self.builder.create_new_block(&mut self.module);

        for &v in state {
            let Some(&target) = self.var_map.get(&v) else {
                continue;
            };
            let var = self.ast.variable(v).clone();
            if var.is_external {
                continue;
            }
            match var.initial_value {
                Some(init) => {
                    self.visit_with_destination(Some(Destination::variable(target)), init)?;
                }
                None => self.builder.add_zero_assignment(
                    &mut self.module,
                    &self.ast.structs,
                    Destination::variable(target),
                ),
            }
        }

        self.finish_function(index, Context::NONE)
    }

    fn generate_function_bodies(&mut self, functions: &[ast::FuncId]) -> CompileResult<()> {
        for &f in functions {
            if self.ast.function(f).is_generic() {
                continue;
            }
            self.generate_function_body(f)?;
        }
        Ok(())
    }

    fn generate_function_body(&mut self, f: ast::FuncId) -> CompileResult<()> {
        let function = self.ast.function(f).clone();
        let index = self.func_map[&f].function;

        self.builder = FunctionBuilder::new(index);

        for &p in &function.parameters {
            let var = self.ast.variable(p);
            let location = var.context.location;
            let name = self.ast.interner.lookup(var.name);
            let annotation = plain_annotation(self.ast, &var.annotation)?;
            let ty = self
                .ast
                .variable_type(p)
                .ok_or_else(|| CompileError::from(errors::expected_type(location)))?;

            if function.is_event_handler && ty.is_non_const_reference() {
                return Err(errors::event_params_cannot_be_non_const_reference(location).into());
            }

            let id = self
                .builder
                .add_parameter(&mut self.module, name, ty, annotation);
            self.var_map.insert(p, id);
        }

        match function.block {
            Some(block) => {
                self.builder.create_new_block(&mut self.module);
                self.visit_statement(block)?;
                self.finish_function(index, function.context)
            }
            // Intrinsic declarations have no body.
            None => Ok(()),
        }
    }

    fn finish_function(&mut self, index: usize, context: Context) -> CompileResult<()> {
        self.builder.end_function(&mut self.module);

        if !self.builder.check_function_blocks_for_termination(&self.module) {
            // Unreachable blocks may be the only offenders; strip them
            // and re-check before reporting.
            crate::optimiser::remove_unreachable_blocks(&mut self.module.functions[index]);
            if !self.builder.check_function_blocks_for_termination(&self.module) {
                let name = self.module.functions[index].name.clone();
                return Err(errors::not_all_control_paths_return(context.location, &name).into());
            }
        }
        Ok(())
    }
}
