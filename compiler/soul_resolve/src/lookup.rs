//! Name lookup.
//!
//! Lookup walks outward through lexical scopes: block (locals declared
//! before the current statement), function (parameters and bound generic
//! wildcards), module, then enclosing namespaces, stopping at the first
//! scope containing a hit when asked to. Qualified paths descend through
//! sub-module names.

use soul_ir::ast::{
    AstAllocator, BlockId, EndpointId, FuncId, IdentifierPath, ModuleId, Stmt, StructDeclId,
    UsingId, VarId,
};
use soul_ir::Name;

/// One entry of the active scope chain, innermost last.
#[derive(Copy, Clone, Debug)]
pub enum ScopeEntry {
    Module(ModuleId),
    Function(FuncId),
    Block {
        id: BlockId,
        /// Statements visible so far; locals declared later in the block
        /// must not resolve earlier uses.
        visible: usize,
    },
}

/// Scope chain maintained by the passes while they traverse a module.
#[derive(Default)]
pub struct ScopeStack {
    entries: Vec<ScopeEntry>,
}

impl ScopeStack {
    pub fn new(module: ModuleId) -> Self {
        ScopeStack {
            entries: vec![ScopeEntry::Module(module)],
        }
    }

    pub fn push(&mut self, entry: ScopeEntry) {
        self.entries.push(entry);
    }

    pub fn pop(&mut self) {
        self.entries.pop();
    }

    /// Update the visible-statement count of the innermost block.
    pub fn set_block_visible(&mut self, visible: usize) {
        if let Some(ScopeEntry::Block { visible: v, .. }) = self.entries.last_mut() {
            *v = visible;
        }
    }

    pub fn entries(&self) -> &[ScopeEntry] {
        &self.entries
    }

    /// The function the innermost scope sits in, if any.
    pub fn enclosing_function(&self) -> Option<FuncId> {
        self.entries.iter().rev().find_map(|e| match e {
            ScopeEntry::Function(f) => Some(*f),
            _ => None,
        })
    }

    /// The module at the bottom of the stack.
    pub fn module(&self) -> ModuleId {
        match self.entries.first() {
            Some(ScopeEntry::Module(m)) => *m,
            _ => unreachable!("scope stack always starts at a module"),
        }
    }
}

/// What a search is looking for.
pub struct NameSearch {
    pub path: IdentifierPath,
    pub stop_at_first_scope_with_results: bool,
    /// Filter functions by parameter count.
    pub required_num_function_args: Option<usize>,
    pub find_variables: bool,
    pub find_types: bool,
    pub find_functions: bool,
    pub find_processors_and_namespaces: bool,
    pub find_endpoints: bool,
}

impl NameSearch {
    /// The standard search for a name in expression position.
    pub fn for_identifier(path: IdentifierPath) -> Self {
        NameSearch {
            path,
            stop_at_first_scope_with_results: true,
            required_num_function_args: None,
            find_variables: true,
            find_types: true,
            find_functions: false,
            find_processors_and_namespaces: true,
            find_endpoints: true,
        }
    }

    /// A search for callable functions only.
    pub fn for_functions(path: IdentifierPath, num_args: usize) -> Self {
        NameSearch {
            path,
            stop_at_first_scope_with_results: false,
            required_num_function_args: Some(num_args),
            find_variables: false,
            find_types: false,
            find_functions: true,
            find_processors_and_namespaces: false,
            find_endpoints: false,
        }
    }
}

/// An item a search can find.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FoundItem {
    Variable(VarId),
    Function(FuncId),
    StructDecl(StructDeclId),
    Using(UsingId),
    Module(ModuleId),
    Endpoint(EndpointId),
    /// A generic wildcard bound in a specialised function clone.
    BoundWildcard { function: FuncId, index: usize },
}

/// The root namespace above a module.
pub fn root_module(ast: &AstAllocator, mut module: ModuleId) -> ModuleId {
    while let Some(parent) = ast.module(module).parent {
        module = parent;
    }
    module
}

/// Search the active scope chain for a name.
pub fn perform_search(ast: &AstAllocator, scopes: &ScopeStack, search: &NameSearch) -> Vec<FoundItem> {
    let mut results = Vec::new();

    // Innermost first through the tracked scopes.
    for entry in scopes.entries().iter().rev() {
        match entry {
            ScopeEntry::Block { id, visible } => {
                search_block(ast, *id, *visible, search, &mut results);
            }
            ScopeEntry::Function(f) => search_function(ast, *f, search, &mut results),
            ScopeEntry::Module(m) => search_module(ast, *m, &search.path, search, &mut results),
        }
        if search.stop_at_first_scope_with_results && !results.is_empty() {
            return results;
        }
    }

    // Then the enclosing namespaces above the module.
    let mut current = ast.module(scopes.module()).parent;
    while let Some(module) = current {
        search_module(ast, module, &search.path, search, &mut results);
        if search.stop_at_first_scope_with_results && !results.is_empty() {
            return results;
        }
        current = ast.module(module).parent;
    }

    results
}

/// Search from an explicit module, used for the intrinsics namespace.
pub fn search_from_module(
    ast: &AstAllocator,
    module: ModuleId,
    search: &NameSearch,
) -> Vec<FoundItem> {
    let mut results = Vec::new();
    search_module(ast, module, &search.path, search, &mut results);
    results
}

fn search_block(
    ast: &AstAllocator,
    block: BlockId,
    visible: usize,
    search: &NameSearch,
    results: &mut Vec<FoundItem>,
) {
    if !search.find_variables || !search.path.is_unqualified() {
        return;
    }
    let name = search.path.first_part();
    let statements = &ast.block(block).statements;
    for &s in statements.iter().take(visible) {
        if let Stmt::VariableDeclaration(var) = ast.stmt(s) {
            if ast.variable(*var).name == name {
                push_unique(results, FoundItem::Variable(*var));
            }
        }
    }
}

fn search_function(
    ast: &AstAllocator,
    function: FuncId,
    search: &NameSearch,
    results: &mut Vec<FoundItem>,
) {
    if !search.path.is_unqualified() {
        return;
    }
    let name = search.path.first_part();
    let f = ast.function(function);

    if search.find_variables {
        for &p in &f.parameters {
            if ast.variable(p).name == name {
                push_unique(results, FoundItem::Variable(p));
            }
        }
    }

    // Bound generic wildcards of a specialised clone act as local type
    // aliases.
    if search.find_types {
        for (index, (wildcard, _)) in f.generic_specialisations.iter().enumerate() {
            if *wildcard == name {
                push_unique(results, FoundItem::BoundWildcard { function, index });
            }
        }
    }
}

fn search_module(
    ast: &AstAllocator,
    module: ModuleId,
    path: &IdentifierPath,
    search: &NameSearch,
    results: &mut Vec<FoundItem>,
) {
    let m = ast.module(module);

    if path.is_qualified() {
        let first = path.first_part();
        for &sub in &m.sub_modules {
            if ast.module(sub).name == first {
                search_module(ast, sub, &path.tail(), search, results);
            }
        }
        return;
    }

    let name = path.first_part();

    if search.find_variables {
        for &v in &m.state_variables {
            if ast.variable(v).name == name {
                push_unique(results, FoundItem::Variable(v));
            }
        }
    }

    if search.find_types {
        for &s in &m.structs {
            if ast.struct_decl(s).name == name {
                push_unique(results, FoundItem::StructDecl(s));
            }
        }
        for &u in &m.usings {
            if ast.using(u).name == name {
                push_unique(results, FoundItem::Using(u));
            }
        }
    }

    if search.find_functions {
        for &f in &m.functions {
            let function = ast.function(f);
            if function.name != name || function.is_event_handler {
                continue;
            }
            if let Some(required) = search.required_num_function_args {
                if function.parameters.len() != required {
                    continue;
                }
            }
            push_unique(results, FoundItem::Function(f));
        }
    }

    if search.find_processors_and_namespaces {
        for &sub in &m.sub_modules {
            if ast.module(sub).name == name {
                push_unique(results, FoundItem::Module(sub));
            }
        }
    }

    if search.find_endpoints {
        for &e in m.inputs.iter().chain(m.outputs.iter()) {
            if ast.endpoint(e).name == name {
                push_unique(results, FoundItem::Endpoint(e));
            }
        }
    }
}

fn push_unique(results: &mut Vec<FoundItem>, item: FoundItem) {
    if !results.contains(&item) {
        results.push(item);
    }
}

/// Levenshtein distance, for misspelt-function suggestions.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.iter().enumerate() {
        let mut previous = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let insert_or_delete = row[j].min(row[j + 1]) + 1;
            let substitute = previous + usize::from(ca != cb);
            previous = row[j + 1];
            row[j + 1] = insert_or_delete.min(substitute);
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("sin", "sin"), 0);
        assert_eq!(levenshtein_distance("sqr", "sqrt"), 1);
        assert_eq!(levenshtein_distance("cso", "cos"), 2);
    }
}
