//! The resolution fixpoint.
//!
//! One iteration runs the passes in a fixed order, collecting how many
//! names failed to resolve and how many nodes were rewritten. The loop
//! repeats while both counts move; on a stall with failures remaining it
//! either gives up quietly (`ignore_errors`, the caller will retry after
//! other modules make progress) or re-runs the passes with errors enabled
//! to surface the first precise diagnostic. After the fixpoint, a full
//! resolution pass performs the checks that need complete types.

use crate::passes::constant_folder::ConstantFolder;
use crate::passes::convert_stream_ops::ConvertStreamOperations;
use crate::passes::full_resolver::FullResolver;
use crate::passes::function_resolver::FunctionResolver;
use crate::passes::qualified_identifier::QualifiedIdentifierResolver;
use crate::passes::type_resolver::TypeResolver;
use crate::passes::use_counts::rebuild_variable_use_counts;
use crate::sanity;
use soul_diagnostic::CompileResult;
use soul_ir::ast::{AstAllocator, ModuleId};
use tracing::{debug, trace};

/// Progress counters for one pass or one iteration.
#[derive(Copy, Clone, Default, Debug)]
pub struct RunStats {
    /// Names a pass could not resolve this round (run with errors
    /// ignored).
    pub num_failures: usize,
    /// Nodes rewritten.
    pub num_replaced: usize,
}

impl RunStats {
    fn clear(&mut self) {
        *self = RunStats::default();
    }

    fn add(&mut self, other: RunStats) {
        self.num_failures += other.num_failures;
        self.num_replaced += other.num_replaced;
    }
}

/// Runs the resolution fixpoint over a module and its sub-modules.
pub struct ResolutionPass;

impl ResolutionPass {
    pub fn run(
        ast: &mut AstAllocator,
        module: ModuleId,
        ignore_errors: bool,
    ) -> CompileResult<RunStats> {
        let mut stats = RunStats::default();

        if ast.module(module).is_fully_resolved {
            return Ok(stats);
        }

        // An unresolvable type cycle would stall the fixpoint with a
        // misleading symbol error; reject it up front.
        sanity::check_recursive_type_declarations(ast, module)?;

        loop {
            stats.clear();

            stats.add(run_qualified_identifier(ast, module, true)?);
            stats.add(run_type_resolver(ast, module, true)?);
            stats.add(run_stream_conversion(ast, module)?);
            rebuild_variable_use_counts(ast, module);
            stats.add(run_function_resolver(ast, module, true, false)?);
            stats.add(run_constant_folder(ast, module)?);
            rebuild_variable_use_counts(ast, module);

            // Generic specialisation is deliberately last-resort: it only
            // runs when nothing else can move, so argument types are as
            // settled as they can get.
            if stats.num_replaced == 0 {
                stats.add(run_function_resolver(ast, module, true, true)?);
            }

            for sub in ast.module(module).sub_modules.clone() {
                stats.add(ResolutionPass::run(ast, sub, ignore_errors)?);
            }

            trace!(
                module = %ast.module_path(module),
                failures = stats.num_failures,
                replaced = stats.num_replaced,
                "resolution iteration"
            );

            if stats.num_failures == 0 {
                break;
            }

            if stats.num_replaced == 0 {
                // Stalled. Quietly hand back to the caller while errors
                // are ignored; otherwise re-run for the first precise
                // diagnostic.
                if ignore_errors {
                    return Ok(stats);
                }

                debug!(
                    module = %ast.module_path(module),
                    failures = stats.num_failures,
                    "resolution stalled; re-running with errors enabled"
                );

                run_function_resolver(ast, module, false, false)?;
                run_qualified_identifier(ast, module, false)?;
                run_type_resolver(ast, module, false)?;
                run_stream_conversion(ast, module)?;
                run_function_resolver(ast, module, false, true)?;
                break;
            }
        }

        let mut full = FullResolver::new(ast, module);
        full.perform()?;

        ast.module_mut(module).is_fully_resolved = true;
        debug!(module = %ast.module_path(module), "module resolved");
        Ok(stats)
    }
}

fn run_qualified_identifier(
    ast: &mut AstAllocator,
    module: ModuleId,
    ignore_errors: bool,
) -> CompileResult<RunStats> {
    let mut pass = QualifiedIdentifierResolver::new(ast, module, ignore_errors);
    pass.perform()?;
    Ok(RunStats {
        num_failures: pass.num_fails,
        num_replaced: pass.items_replaced,
    })
}

fn run_type_resolver(
    ast: &mut AstAllocator,
    module: ModuleId,
    ignore_errors: bool,
) -> CompileResult<RunStats> {
    let mut pass = TypeResolver::new(ast, module, ignore_errors);
    pass.perform()?;
    Ok(RunStats {
        num_failures: pass.num_fails,
        num_replaced: pass.items_replaced,
    })
}

fn run_stream_conversion(ast: &mut AstAllocator, module: ModuleId) -> CompileResult<RunStats> {
    let mut pass = ConvertStreamOperations::new(ast, module);
    pass.perform()?;
    Ok(RunStats {
        num_failures: pass.num_fails,
        num_replaced: pass.items_replaced,
    })
}

fn run_function_resolver(
    ast: &mut AstAllocator,
    module: ModuleId,
    ignore_errors: bool,
    resolve_generics: bool,
) -> CompileResult<RunStats> {
    let mut pass = FunctionResolver::new(ast, module, ignore_errors, resolve_generics);
    pass.perform()?;
    Ok(RunStats {
        num_failures: pass.num_fails,
        num_replaced: pass.items_replaced,
    })
}

fn run_constant_folder(ast: &mut AstAllocator, module: ModuleId) -> CompileResult<RunStats> {
    let mut pass = ConstantFolder::new(ast, module);
    pass.perform()?;
    Ok(RunStats {
        num_failures: pass.num_fails,
        num_replaced: pass.items_replaced,
    })
}
