//! Compile and link SOUL source into a HEART program.

use rustc_hash::FxHashMap;
use soul_diagnostic::{errors, CompileResult, DiagnosticList, SourceMap};
use soul_heart::{generator, Program};
use soul_ir::ast::{
    Annotation, AstAllocator, Context, Module, ModuleId, ModuleKind,
};
use soul_ir::value::Value;
use soul_ir::{Name, SourceRef};
use tracing::{debug, info};

/// Options for [`Compiler::link`].
#[derive(Clone, Debug)]
pub struct LinkOptions {
    /// Name (or fully qualified path) of the processor to run; falls back
    /// to a `[[ main ]]` annotation, then the last processor declared.
    pub main_processor: Option<String>,
    /// Session sample rate, handed through to the performer.
    pub sample_rate: f64,
    /// Largest block the performer will ask for.
    pub max_block_size: u32,
}

impl Default for LinkOptions {
    fn default() -> Self {
        LinkOptions {
            main_processor: None,
            sample_rate: 44100.0,
            max_block_size: 1024,
        }
    }
}

/// Compiles and links source units into a [`Program`].
pub struct Compiler {
    ast: AstAllocator,
    root: ModuleId,
    pub sources: SourceMap,
}

impl Compiler {
    pub fn new() -> Self {
        let mut ast = AstAllocator::new();
        let root = create_root_namespace(&mut ast);
        let mut compiler = Compiler {
            ast,
            root,
            sources: SourceMap::new(),
        };
        compiler.add_built_in_library();
        compiler
    }

    fn add_built_in_library(&mut self) {
        let mut diagnostics = DiagnosticList::new();
        let ok = self.add_code(
            &mut diagnostics,
            "<built-in>",
            soul_resolve::intrinsics::BUILT_IN_LIBRARY,
        );
        debug_assert!(ok, "the built-in library must parse: {diagnostics:?}");
        // A broken built-in library is a compiler defect, not a user
        // error; surface it loudly in debug builds and carry on.
        let _ = diagnostics;
    }

    /// Parse and stage a source unit. Returns false (and appends
    /// diagnostics) on a lex, parse, or early-sanity failure.
    pub fn add_code(
        &mut self,
        diagnostics: &mut DiagnosticList,
        name: &str,
        code: &str,
    ) -> bool {
        let file = self.sources.add_file(name, code);

        let lexed = soul_lexer::lex(code, file, &self.ast.interner);
        let had_lex_errors = lexed.has_errors();
        for d in lexed.diagnostics {
            diagnostics.add(d);
        }
        if had_lex_errors {
            return false;
        }

        let modules_before = self.ast.module(self.root).sub_modules.len();

        if let Err(e) = soul_parse::parse_top_level(&mut self.ast, &lexed.tokens, file, self.root)
        {
            diagnostics.add_error(e);
            return false;
        }

        // Structural checks on the newly added modules only.
        let new_modules: Vec<ModuleId> = self.ast.module(self.root).sub_modules
            [modules_before..]
            .to_vec();
        for module in new_modules {
            if let Err(e) = soul_resolve::sanity::run_pre_resolution(&self.ast, module) {
                diagnostics.add_error(e);
                return false;
            }
        }

        info!(unit = name, "staged source unit");
        true
    }

    /// Run full resolution, lowering, and cross-module linking. The
    /// compiler is reset afterwards.
    pub fn link(
        &mut self,
        diagnostics: &mut DiagnosticList,
        options: &LinkOptions,
    ) -> Option<Program> {
        let result = self.link_inner(diagnostics, options);
        self.reset();
        match result {
            Ok(program) => Some(program),
            Err(e) => {
                diagnostics.add_error(e);
                None
            }
        }
    }

    fn link_inner(
        &mut self,
        diagnostics: &mut DiagnosticList,
        options: &LinkOptions,
    ) -> CompileResult<Program> {
        if !(options.sample_rate > 0.0) || options.max_block_size == 0 {
            return Err(errors::internal_compiler_error(
                SourceRef::NONE,
                "link options must carry a positive sample rate and block size",
            )
            .into());
        }

        // Modules still carrying specialisation parameters are templates
        // for the linker's instantiation step; they take no part in
        // resolution.
        remove_modules_with_specialisation_params(&mut self.ast, self.root);

        // First a quiet fixpoint so cross-module references can settle in
        // any order, then a strict run to surface anything still stuck.
        soul_resolve::ResolutionPass::run(&mut self.ast, self.root, true)?;
        soul_resolve::ResolutionPass::run(&mut self.ast, self.root, false)?;

        let main = self.find_main_processor(options)?;

        let mut program = Program::new();
        let mut func_map = FxHashMap::default();
        let mut unresolved = Vec::new();
        let mut heart_indices: FxHashMap<ModuleId, usize> = FxHashMap::default();

        self.lower_tree(
            self.root,
            &mut program,
            &mut func_map,
            &mut unresolved,
            &mut heart_indices,
            diagnostics,
        )?;
        generator::resolve_pending_calls(
            &mut program.modules,
            &func_map,
            &unresolved,
            &self.ast,
        )?;

        program.string_dictionary = self.ast.string_dictionary.clone();
        program.constant_table = self.ast.constant_table.clone();
        program.structs = self.ast.structs.clone();

        if let Some(main) = main {
            let index = heart_indices.get(&main).copied();
            program.main_processor = index;
            // The choice survives the text round-trip as an annotation.
            if let Some(index) = index {
                let module = &mut program.modules[index];
                if !module.annotation.iter().any(|(k, _)| k == "main") {
                    module.annotation.push(("main".to_string(), Value::bool(true)));
                }
            }
        }

        info!(
            modules = program.modules.len(),
            main = program.main_processor().map(|m| m.name.as_str()).unwrap_or("<none>"),
            "linked program"
        );
        Ok(program)
    }

    /// Convenience: `add_code` + `link` for a single unit.
    pub fn build(
        diagnostics: &mut DiagnosticList,
        name: &str,
        code: &str,
        options: &LinkOptions,
    ) -> Option<Program> {
        let mut compiler = Compiler::new();
        if !compiler.add_code(diagnostics, name, code) {
            return None;
        }
        compiler.link(diagnostics, options)
    }

    fn reset(&mut self) {
        // The source map stays: emitted diagnostics keep resolving their
        // file ids after the link.
        self.ast = AstAllocator::new();
        self.root = create_root_namespace(&mut self.ast);
        self.add_built_in_library();
    }

    // ---- main processor selection ----

    fn find_main_processor(&self, options: &LinkOptions) -> CompileResult<Option<ModuleId>> {
        let mut processors = Vec::new();
        collect_processors(&self.ast, self.root, &mut processors);

        if let Some(wanted) = &options.main_processor {
            let found = processors.iter().copied().find(|&m| {
                let path = self.ast.module_path(m);
                path == *wanted || path.split("::").last() == Some(wanted.as_str())
            });
            return match found {
                Some(m) => Ok(Some(m)),
                None => Err(errors::no_main_processor(SourceRef::NONE, wanted).into()),
            };
        }

        // A `[[ main ]]` annotation wins; otherwise the last processor
        // declared.
        let main_name = self.ast.names.main;
        let annotated = processors.iter().copied().find(|&m| {
            self.ast
                .module(m)
                .annotation
                .find(main_name)
                .map_or(false, |p| {
                    self.ast
                        .get_as_constant(p.value)
                        .and_then(Value::get_as_bool)
                        .unwrap_or(true)
                })
        });

        Ok(annotated.or_else(|| processors.last().copied()))
    }

    fn lower_tree(
        &self,
        module: ModuleId,
        program: &mut Program,
        func_map: &mut FxHashMap<soul_ir::ast::FuncId, soul_heart::ir::FunctionRef>,
        unresolved: &mut Vec<generator::UnresolvedCall>,
        heart_indices: &mut FxHashMap<ModuleId, usize>,
        diagnostics: &mut DiagnosticList,
    ) -> CompileResult<()> {
        let m = self.ast.module(module);

        if m.parent.is_some() && module_needs_lowering(&self.ast, module) {
            let index = generator::generate_module(
                &self.ast,
                module,
                &mut program.modules,
                func_map,
                unresolved,
                diagnostics,
            )?;
            heart_indices.insert(module, index);
            debug!(module = %self.ast.module_path(module), "lowered");
        }

        for &sub in &m.sub_modules.clone() {
            self.lower_tree(sub, program, func_map, unresolved, heart_indices, diagnostics)?;
        }
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

fn create_root_namespace(ast: &mut AstAllocator) -> ModuleId {
    ast.alloc_module(Module {
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
    })
}

/// Namespaces with nothing to emit stay out of the program; everything
/// else becomes a HEART module.
fn module_needs_lowering(ast: &AstAllocator, module: ModuleId) -> bool {
    let m = ast.module(module);
    m.is_processor_or_graph()
        || m.functions.iter().any(|&f| !ast.function(f).is_generic())
        || !m.structs.is_empty()
        || m.state_variables
            .iter()
            .any(|&v| ast.variable(v).is_external)
}

fn collect_processors(ast: &AstAllocator, module: ModuleId, out: &mut Vec<ModuleId>) {
    for &sub in &ast.module(module).sub_modules {
        if ast.module(sub).is_processor_or_graph() {
            out.push(sub);
        }
        collect_processors(ast, sub, out);
    }
}

fn remove_modules_with_specialisation_params(ast: &mut AstAllocator, module: ModuleId) {
    let subs = ast.module(module).sub_modules.clone();
    let kept: Vec<ModuleId> = subs
        .iter()
        .copied()
        .filter(|&m| !ast.module(m).has_specialisation_params())
        .collect();
    ast.module_mut(module).sub_modules = kept.clone();
    for sub in kept {
        remove_modules_with_specialisation_params(ast, sub);
    }
}
