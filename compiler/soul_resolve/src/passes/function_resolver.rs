//! Function resolution and generic specialisation.
//!
//! For each call-or-cast whose name did not resolve to a type, candidate
//! functions are gathered by name and argument count (unqualified names
//! also search the intrinsics namespace) and scored: exact match,
//! requires a silent cast, impossible, or requires generic
//! specialisation. Exactly one viable candidate wins; one exact match
//! beats any number of cast matches; otherwise generic specialisation is
//! attempted, and a single successful specialisation wins.
//!
//! Specialisation clones the generic function's sub-tree and binds each
//! wildcard by unifying the parameter type expressions against the caller
//! argument types. Clones are cached per `(function, argument types)`
//! signature, so identical calls reuse the same specialisation.

use crate::lookup::{
    self, levenshtein_distance, root_module, FoundItem, NameSearch, ScopeStack,
};
use crate::passes::{convert_to_cast, scope_tracked_visits};
use crate::sanity;
use soul_diagnostic::{errors, CompileError, CompileResult};
use soul_ir::ast::visit::{rewalk_expr, RewritingVisitor};
use soul_ir::ast::{
    AstAllocator, Context, Expr, ExprId, FuncId, IdentifierPath, ModuleId, TypeMetaOp,
};
use soul_ir::types::{Type, TypeRules};
use soul_ir::Name;

pub(crate) struct FunctionResolver<'a> {
    pub ast: &'a mut AstAllocator,
    pub module: ModuleId,
    pub ignore_errors: bool,
    /// Set for the generic-function pass; the plain pass leaves generic
    /// candidates for it.
    pub resolve_generics: bool,
    pub scopes: ScopeStack,
    pub num_fails: usize,
    pub items_replaced: usize,
}

struct PossibleFunction {
    function: FuncId,
    is_impossible: bool,
    requires_cast: bool,
    requires_generic: bool,
}

impl PossibleFunction {
    fn new(ast: &AstAllocator, function: FuncId, arg_types: &[Type]) -> Self {
        let mut result = PossibleFunction {
            function,
            is_impossible: false,
            requires_cast: false,
            requires_generic: false,
        };

        let params = ast.function(function).parameters.clone();
        let is_generic = ast.function(function).is_generic();

        for (i, &param) in params.iter().enumerate() {
            let target = match ast.variable_type(param) {
                Some(t) => t,
                None if is_generic => {
                    result.requires_generic = true;
                    continue;
                }
                None => {
                    // Still resolving; treat as a cast candidate so the
                    // call waits rather than failing.
                    result.requires_cast = true;
                    continue;
                }
            };

            if TypeRules::can_pass_as_argument_to(&target, &arg_types[i], true) {
                continue;
            }
            if !TypeRules::can_pass_as_argument_to(&target, &arg_types[i], false) {
                result.is_impossible = true;
            }
            result.requires_cast = true;
        }

        result
    }

    fn is_exact_match(&self) -> bool {
        !(self.is_impossible || self.requires_cast || self.requires_generic)
    }
}

impl<'a> FunctionResolver<'a> {
    pub fn new(
        ast: &'a mut AstAllocator,
        module: ModuleId,
        ignore_errors: bool,
        resolve_generics: bool,
    ) -> Self {
        FunctionResolver {
            ast,
            module,
            ignore_errors,
            resolve_generics,
            scopes: ScopeStack::new(module),
            num_fails: 0,
            items_replaced: 0,
        }
    }

    pub fn perform(&mut self) -> CompileResult<()> {
        self.visit_module_content(self.module)
    }

    fn call_argument_ids(&self, args: Option<ExprId>) -> Vec<ExprId> {
        match args {
            None => Vec::new(),
            Some(list) => match self.ast.expr(list) {
                Expr::CommaSeparatedList { items } => items.clone(),
                _ => vec![list],
            },
        }
    }

    fn call_argument_types(&self, args: &[ExprId]) -> Option<Vec<Type>> {
        args.iter().map(|&a| self.ast.result_type(a)).collect()
    }

    fn call_description(&self, name: &IdentifierPath, arg_types: &[Type]) -> String {
        let types: Vec<String> = arg_types
            .iter()
            .map(|t| t.describe(&self.ast.structs))
            .collect();
        format!(
            "{} ({})",
            name.to_string(&self.ast.interner),
            types.join(", ")
        )
    }

    fn resolve_call(&mut self, id: ExprId) -> CompileResult<()> {
        let (name_or_type, args, is_method) = match self.ast.expr(id) {
            Expr::CallOrCast {
                name_or_type,
                args,
                is_method,
            } => (*name_or_type, *args, *is_method),
            _ => return Ok(()),
        };
        let context = self.ast.expr_context(id);

        if let Some(t) = self.ast.resolve_as_type(name_or_type) {
            convert_to_cast(self.ast, id, t);
            self.items_replaced += 1;
            return Ok(());
        }

        let arg_ids = self.call_argument_ids(args);
        let args_resolved = arg_ids.iter().all(|&a| self.ast.is_readable_value(a));

        let Expr::QualifiedIdentifier(path) = self.ast.expr(name_or_type).clone() else {
            self.num_fails += 1;
            return Ok(());
        };

        // Special call sites, valid before argument resolution matters.
        if path.is_unqualified_name(self.ast.names.advance) {
            return self.create_advance_call(id, context, is_method, &arg_ids);
        }
        if path.is_unqualified_name(self.ast.names.static_assert) {
            return self.create_static_assert(id, context, &arg_ids);
        }

        if !args_resolved {
            if !self.ignore_errors {
                for &a in &arg_ids {
                    sanity::throw_if_not_readable_value(self.ast, a)?;
                }
            }
            self.num_fails += 1;
            return Ok(());
        }

        if path.is_unqualified_name(self.ast.names.at) {
            if let Some(()) = self.create_at_call(id, context, &arg_ids)? {
                return Ok(());
            }
        }

        let Some(arg_types) = self.call_argument_types(&arg_ids) else {
            self.num_fails += 1;
            return Ok(());
        };

        let possibles = self.find_all_possible_functions(&path, &arg_types);
        let total_matches = possibles.len();

        // A single candidate wins if it is at all callable.
        if total_matches == 1 && !possibles[0].is_impossible {
            return self.resolve_to_function(id, &possibles[0], &path, args, &arg_types);
        }

        // One exact match beats any number of cast matches.
        let exact_matches = possibles.iter().filter(|f| f.is_exact_match()).count();
        if exact_matches == 1 {
            let best = possibles
                .iter()
                .find(|f| f.is_exact_match())
                .expect("counted above");
            return self.resolve_to_function(id, best, &path, args, &arg_types);
        }

        // Try generic specialisation: exactly one success wins.
        let generic_candidates: Vec<FuncId> = possibles
            .iter()
            .filter(|f| !f.is_impossible && f.requires_generic)
            .map(|f| f.function)
            .collect();

        if !generic_candidates.is_empty() && !self.resolve_generics {
            self.num_fails += 1;
            return Ok(());
        }

        let mut matching_generics = Vec::new();
        for generic in &generic_candidates {
            if let Some(specialised) =
                self.get_or_create_specialised_function(*generic, &arg_types, context, true)?
            {
                matching_generics.push(specialised);
            }
        }

        if matching_generics.len() == 1 {
            self.ast.replace_expr(
                id,
                Expr::FunctionCall {
                    function: matching_generics[0],
                    args,
                },
            );
            self.items_replaced += 1;
            return Ok(());
        }

        if !self.ignore_errors {
            if total_matches == 0 {
                return Err(self.unknown_function_error(&path, context, arg_ids.len()));
            }

            let cast_matches = possibles
                .iter()
                .filter(|f| f.requires_cast && !f.is_impossible)
                .count();

            if exact_matches + cast_matches == 0 {
                // With a single concrete candidate, the per-argument cast
                // check produces the precise diagnostic.
                if total_matches == 1 && !possibles[0].requires_generic {
                    if let Some(params) = self.ast.function_parameter_types(possibles[0].function)
                    {
                        for (i, param) in params.iter().enumerate() {
                            sanity::expect_silent_cast_possible(
                                self.ast,
                                self.ast.expr_context(arg_ids[i]).location,
                                param,
                                arg_ids[i],
                            )?;
                        }
                    }
                }

                if !generic_candidates.is_empty() {
                    // Re-run the failed specialisation with errors on for
                    // its diagnostic.
                    self.get_or_create_specialised_function(
                        generic_candidates[0],
                        &arg_types,
                        context,
                        false,
                    )?;
                }

                return Err(errors::no_match_for_function_call(
                    context.location,
                    &self.call_description(&path, &arg_types),
                )
                .into());
            }

            return Err(errors::ambiguous_function_call(
                context.location,
                &self.call_description(&path, &arg_types),
            )
            .into());
        }

        self.num_fails += 1;
        Ok(())
    }

    fn resolve_to_function(
        &mut self,
        id: ExprId,
        candidate: &PossibleFunction,
        path: &IdentifierPath,
        args: Option<ExprId>,
        arg_types: &[Type],
    ) -> CompileResult<()> {
        let context = self.ast.expr_context(id);

        if self.ast.is_run_function(candidate.function) {
            return Err(errors::cannot_call_run_function(context.location).into());
        }

        if self.ast.function(candidate.function).is_generic() {
            if !self.resolve_generics {
                self.num_fails += 1;
                return Ok(());
            }
            match self.get_or_create_specialised_function(
                candidate.function,
                arg_types,
                context,
                self.ignore_errors,
            )? {
                Some(specialised) => {
                    self.ast.replace_expr(
                        id,
                        Expr::FunctionCall {
                            function: specialised,
                            args,
                        },
                    );
                    self.items_replaced += 1;
                    return Ok(());
                }
                None => {
                    if !self.ignore_errors {
                        return Err(errors::failed_to_resolve_generic(
                            context.location,
                            &self.call_description(path, arg_types),
                        )
                        .into());
                    }
                    self.num_fails += 1;
                    return Ok(());
                }
            }
        }

        self.ast.replace_expr(
            id,
            Expr::FunctionCall {
                function: candidate.function,
                args,
            },
        );
        self.items_replaced += 1;
        Ok(())
    }

    fn find_all_possible_functions(
        &self,
        path: &IdentifierPath,
        arg_types: &[Type],
    ) -> Vec<PossibleFunction> {
        let search = NameSearch::for_functions(path.clone(), arg_types.len());
        let mut found = lookup::perform_search(self.ast, &self.scopes, &search);

        // Unqualified names also search the implicit intrinsics
        // namespace, after user scopes.
        if path.is_unqualified() {
            let intrinsics_path = IdentifierPath::new(vec![
                self.ast.names.soul,
                self.ast.names.intrinsics,
                path.last_part(),
            ]);
            let root = root_module(self.ast, self.module);
            let search = NameSearch::for_functions(intrinsics_path, arg_types.len());
            found.extend(lookup::search_from_module(self.ast, root, &search));
        }

        found
            .into_iter()
            .filter_map(|item| match item {
                FoundItem::Function(f) => {
                    // Specialised clones never join an overload set.
                    if self.ast.function(f).original_generic.is_some() {
                        None
                    } else {
                        Some(PossibleFunction::new(self.ast, f, arg_types))
                    }
                }
                _ => None,
            })
            .collect()
    }

    // ---- special call sites ----

    fn create_advance_call(
        &mut self,
        id: ExprId,
        context: Context,
        is_method: bool,
        args: &[ExprId],
    ) -> CompileResult<()> {
        if is_method {
            return Err(errors::advance_is_not_a_method(context.location).into());
        }
        if !args.is_empty() {
            return Err(errors::advance_has_no_args(context.location).into());
        }
        let in_run = self
            .scopes
            .enclosing_function()
            .map_or(false, |f| self.ast.is_run_function(f));
        if !in_run {
            return Err(errors::advance_must_be_called_in_run(context.location).into());
        }

        self.ast.replace_expr(id, Expr::AdvanceClock);
        self.items_replaced += 1;
        Ok(())
    }

    fn create_static_assert(
        &mut self,
        id: ExprId,
        context: Context,
        args: &[ExprId],
    ) -> CompileResult<()> {
        if args.is_empty() || args.len() > 2 {
            return Err(errors::expected_1_or_2_args(context.location).into());
        }

        let message = if args.len() == 2 {
            let value = self.ast.get_as_constant(args[1]);
            let handle = value.and_then(|v| v.get_string_handle());
            match handle {
                Some(h) => self.ast.string_dictionary.string_for_handle(h).to_string(),
                None => {
                    if self.ast.is_resolved_expr(args[1]) {
                        return Err(errors::expected_string_literal_as_arg2(
                            self.ast.expr_context(args[1]).location,
                        )
                        .into());
                    }
                    self.num_fails += 1;
                    return Ok(());
                }
            }
        } else {
            "static_assert failed".to_string()
        };

        self.ast.replace_expr(
            id,
            Expr::StaticAssertion {
                condition: args[0],
                message,
            },
        );
        self.items_replaced += 1;
        Ok(())
    }

    /// `at(array, index)`: a wrap-indexed subscript with no warning.
    /// Returns `Ok(None)` to fall through to ordinary lookup when the
    /// name is shadowed by a user function.
    fn create_at_call(
        &mut self,
        id: ExprId,
        context: Context,
        args: &[ExprId],
    ) -> CompileResult<Option<()>> {
        if args.len() != 2 {
            return Err(errors::at_method_takes_1_arg(context.location).into());
        }

        let array = args[0];
        let index = args[1];

        sanity::expect_silent_cast_possible(
            self.ast,
            self.ast.expr_context(index).location,
            &Type::int32(),
            index,
        )?;

        match self.ast.expr(array) {
            Expr::InputEndpointRef(e) | Expr::OutputEndpointRef(e) => {
                let size = self.ast.endpoint_array_size(*e);
                if size.is_none() {
                    return Err(errors::wrong_type_for_at_method(context.location).into());
                }
            }
            _ => {
                let Some(t) = self.ast.result_type(array) else {
                    return Err(errors::cannot_resolve_source_of_at_method(
                        context.location,
                    )
                    .into());
                };
                if !t.without_reference_and_const().is_array_or_vector() {
                    return Err(errors::wrong_type_for_at_method(context.location).into());
                }
            }
        }

        self.ast.replace_expr(
            id,
            Expr::ArrayElementRef {
                object: array,
                start: index,
                end: None,
                is_slice: false,
                suppress_wrap_warning: true,
            },
        );
        self.items_replaced += 1;
        Ok(Some(()))
    }

    // ---- rich unknown-function diagnostics ----

    fn unknown_function_error(
        &self,
        path: &IdentifierPath,
        context: Context,
        num_args: usize,
    ) -> CompileError {
        // Is there a function with this name but a different arity, or a
        // non-function with the name?
        let mut search = NameSearch::for_identifier(path.clone());
        search.find_functions = true;
        let mut found = lookup::perform_search(self.ast, &self.scopes, &search);

        if path.is_unqualified() {
            let intrinsics_path = IdentifierPath::new(vec![
                self.ast.names.soul,
                self.ast.names.intrinsics,
                path.last_part(),
            ]);
            let root = root_module(self.ast, self.module);
            let mut search = NameSearch::for_identifier(intrinsics_path);
            search.find_functions = true;
            found.extend(lookup::search_from_module(self.ast, root, &search));
        }

        let name = path.to_string(&self.ast.interner);

        if found
            .iter()
            .any(|item| matches!(item, FoundItem::Function(_)))
        {
            return errors::no_function_with_number_of_args(context.location, &name, num_args)
                .into();
        }

        match found.first() {
            Some(FoundItem::Module(m)) if self.ast.module(*m).is_processor_or_graph() => {
                return errors::cannot_use_processor_as_function(context.location).into();
            }
            Some(FoundItem::Endpoint(e)) => {
                return if self.ast.endpoint(*e).is_input {
                    errors::cannot_use_input_as_function(context.location).into()
                } else {
                    errors::cannot_use_output_as_function(context.location).into()
                };
            }
            _ => {}
        }

        if let Some(nearest) = self.find_possible_misspelt_function(&name) {
            return errors::unknown_function_with_suggestion(context.location, &name, &nearest)
                .into();
        }

        errors::unknown_function(context.location, &name).into()
    }

    /// The closest declared function name within Levenshtein distance 5.
    fn find_possible_misspelt_function(&self, name: &str) -> Option<String> {
        fn scan(
            ast: &AstAllocator,
            module: ModuleId,
            name: &str,
            nearest: &mut Option<(usize, String)>,
        ) {
            for &f in &ast.module(module).functions {
                let function = ast.function(f);
                if function.original_generic.is_some() || function.is_event_handler {
                    continue;
                }
                let candidate = ast.interner.lookup(function.name);
                let distance = levenshtein_distance(name, &candidate);
                if nearest.as_ref().map_or(distance < 5, |(d, _)| distance < *d) {
                    let path = ast.module_path(module);
                    let qualified = if path.is_empty() {
                        candidate
                    } else {
                        format!("{path}::{candidate}")
                    };
                    *nearest = Some((distance, qualified));
                }
            }
            for &sub in &ast.module(module).sub_modules {
                scan(ast, sub, name, nearest);
            }
        }

        let mut nearest = None;
        scan(
            self.ast,
            root_module(self.ast, self.module),
            name,
            &mut nearest,
        );
        nearest.map(|(_, n)| {
            // The implicit namespace prefix only confuses the message.
            n.strip_prefix("soul::intrinsics::")
                .map(str::to_string)
                .unwrap_or(n)
        })
    }

    // ---- generic specialisation ----

    fn get_or_create_specialised_function(
        &mut self,
        generic: FuncId,
        arg_types: &[Type],
        call_context: Context,
        ignore_errors: bool,
    ) -> CompileResult<Option<FuncId>> {
        let generic_function = self.ast.function(generic).clone();
        debug_assert!(generic_function.is_generic());

        let specialised_name = self.ast.interner.intern(&format!(
            "_{}_specialised_{}",
            self.ast.interner.lookup(generic_function.name),
            self.ast.argument_type_signature(arg_types)
        ));

        // Reuse a cached specialisation for the same argument types.
        let parent = generic_function.module;
        for &f in &self.ast.module(parent).functions {
            let candidate = self.ast.function(f);
            if candidate.name == specialised_name && candidate.original_generic == Some(generic) {
                return Ok(Some(f));
            }
        }

        let clone = self.ast.clone_function(generic);
        self.ast.function_mut(clone).name = specialised_name;

        if !self.bind_wildcards(generic, clone, arg_types, call_context, ignore_errors)? {
            // The clone stays unreferenced in the arena; it is not added
            // to the module, so nothing else will see it.
            return Ok(None);
        }

        // The clone needs resolving, so its module re-enters the
        // fixpoint even when it had already settled.
        let parent_module = self.ast.module_mut(parent);
        parent_module.functions.push(clone);
        parent_module.is_fully_resolved = false;

        self.items_replaced += 1;
        Ok(Some(clone))
    }

    /// Bind every wildcard of `clone` by unification against the caller
    /// argument types. Returns false (without a hard error) when the
    /// binding fails and `ignore_errors` is set.
    fn bind_wildcards(
        &mut self,
        generic: FuncId,
        clone: FuncId,
        arg_types: &[Type],
        call_context: Context,
        ignore_errors: bool,
    ) -> CompileResult<bool> {
        while let Some((wildcard, wildcard_context)) =
            self.ast.function_mut(clone).generic_wildcards.pop()
        {
            let parameters = self.ast.function(clone).parameters.clone();
            let mut resolved: Option<Type> = None;

            for (i, &param) in parameters.iter().enumerate() {
                let Some(param_type_expr) = self.ast.variable(param).declared_type else {
                    continue;
                };

                let mut references_involved = false;
                let new_match = match_parameter_against_wildcard(
                    self.ast,
                    param_type_expr,
                    &arg_types[i],
                    wildcard,
                    &mut references_involved,
                );

                let Some(mut new_match) = new_match else {
                    continue;
                };
                if !new_match.is_reference {
                    new_match = new_match.without_const();
                }

                match &resolved {
                    None => resolved = Some(new_match),
                    Some(existing) if new_match.is_identical(existing) => {}
                    Some(existing) => {
                        // Conflicting constraints reconcile through a
                        // silent-cast union unless references are
                        // involved.
                        if !references_involved
                            && TypeRules::can_silently_cast_to(&new_match, existing)
                        {
                            resolved = Some(new_match);
                        } else if references_involved
                            || !TypeRules::can_silently_cast_to(existing, &new_match)
                        {
                            if !ignore_errors {
                                let name = self.ast.interner.lookup(wildcard);
                                let description = self.generic_call_description(generic, arg_types);
                                return Err(CompileError::new(
                                    errors::failed_to_resolve_generic(
                                        call_context.location,
                                        &description,
                                    )
                                    .with_note(
                                        errors::generic_argument_conflict(
                                            wildcard_context.location,
                                            &name,
                                        )
                                        .message,
                                        Some(wildcard_context.location),
                                    ),
                                ));
                            }
                            return Ok(false);
                        }
                    }
                }
            }

            let Some(resolved) = resolved else {
                if !ignore_errors {
                    let name = self.ast.interner.lookup(wildcard);
                    let description = self.generic_call_description(generic, arg_types);
                    return Err(CompileError::new(
                        errors::failed_to_resolve_generic(call_context.location, &description)
                            .with_note(
                                errors::generic_unresolved(wildcard_context.location, &name)
                                    .message,
                                Some(wildcard_context.location),
                            ),
                    ));
                }
                return Ok(false);
            };

            self.ast
                .function_mut(clone)
                .generic_specialisations
                .push((wildcard, resolved));
        }

        Ok(true)
    }

    fn generic_call_description(&self, generic: FuncId, arg_types: &[Type]) -> String {
        let name = self.ast.function(generic).name;
        self.call_description(&IdentifierPath::unqualified(name), arg_types)
    }
}

/// Walk a parameter type expression and the caller argument type in
/// parallel, extracting the type the wildcard must take.
fn match_parameter_against_wildcard(
    ast: &AstAllocator,
    param_type: ExprId,
    caller_type: &Type,
    wildcard: Name,
    references_involved: &mut bool,
) -> Option<Type> {
    match ast.expr(param_type) {
        Expr::QualifiedIdentifier(path) => {
            if path.is_unqualified_name(wildcard) {
                return Some(caller_type.clone());
            }
            None
        }

        Expr::TypeMetaFunction { op, source } => match op {
            TypeMetaOp::MakeConst => match_parameter_against_wildcard(
                ast,
                *source,
                &caller_type.without_const(),
                wildcard,
                references_involved,
            ),
            TypeMetaOp::MakeReference => {
                *references_involved = true;
                match_parameter_against_wildcard(
                    ast,
                    *source,
                    &caller_type.without_reference(),
                    wildcard,
                    references_involved,
                )
            }
            _ => None,
        },

        // `T[]` matches any array; `T[N]` a fixed array of exactly N.
        Expr::SubscriptWithBrackets { lhs, index } => {
            if !caller_type.is_array() {
                return None;
            }
            match index {
                None => match_parameter_against_wildcard(
                    ast,
                    *lhs,
                    &caller_type.element_type()?,
                    wildcard,
                    references_involved,
                ),
                Some(size_expr) => {
                    let size = ast.get_as_constant(*size_expr)?.get_as_i64()?;
                    if caller_type.array_size()? as i64 != size {
                        return None;
                    }
                    match_parameter_against_wildcard(
                        ast,
                        *lhs,
                        &caller_type.element_type()?,
                        wildcard,
                        references_involved,
                    )
                }
            }
        }

        // `T<N>` matches a vector of exactly N.
        Expr::SubscriptWithChevrons { lhs, size } => {
            if !caller_type.is_vector() {
                return None;
            }
            let n = ast.get_as_constant(*size)?.get_as_i64()?;
            if caller_type.vector_size()? as i64 != n {
                return None;
            }
            match_parameter_against_wildcard(
                ast,
                *lhs,
                &caller_type.element_type()?,
                wildcard,
                references_involved,
            )
        }

        _ => None,
    }
}

impl<'a> RewritingVisitor for FunctionResolver<'a> {
    type Error = CompileError;

    fn ast_mut(&mut self) -> &mut AstAllocator {
        self.ast
    }

    scope_tracked_visits!();

    fn visit_expr(&mut self, id: ExprId) -> CompileResult<()> {
        rewalk_expr(self, id)?;

        match self.ast.expr(id).clone() {
            Expr::CallOrCast { .. } => self.resolve_call(id),
            Expr::ArrayElementRef { .. } => {
                if !self.ignore_errors {
                    sanity::check_array_subscript(self.ast, id)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
