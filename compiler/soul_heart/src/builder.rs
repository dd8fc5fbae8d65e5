//! Function builder.
//!
//! Tracks the current block of the function being lowered, hands out
//! fresh local variables with unique names, and closes every block with
//! exactly one terminator. The builder holds only indices; the module it
//! builds into is passed to each call, which keeps borrows simple while
//! the generator also reads the AST.

use crate::ir::*;
use rustc_hash::FxHashSet;
use soul_ir::types::{StructStore, Type};
use soul_ir::value::Value;
use soul_ir::BinaryOperator;

pub(crate) struct FunctionBuilder {
    pub function_index: usize,
    current_block: Option<usize>,
    next_temp: u32,
    used_local_names: FxHashSet<String>,
}

impl FunctionBuilder {
    pub fn new(function_index: usize) -> Self {
        FunctionBuilder {
            function_index,
            current_block: None,
            next_temp: 0,
            used_local_names: FxHashSet::default(),
        }
    }

    fn function<'m>(&self, module: &'m Module) -> &'m Function {
        &module.functions[self.function_index]
    }

    fn function_mut<'m>(&self, module: &'m mut Module) -> &'m mut Function {
        &mut module.functions[self.function_index]
    }

    // ---- blocks ----

    /// Create a block to be begun later (a forward branch target).
    pub fn create_block(&mut self, module: &mut Module, prefix: &str, index: u32) -> BlockId {
        let name = format!("@{prefix}{index}");
        let function = self.function_mut(module);
        let id = BlockId(function.blocks.len() as u32);
        function.blocks.push(Block {
            name,
            statements: Vec::new(),
            terminator: None,
        });
        id
    }

    /// Create and immediately begin an anonymous sequential block.
    pub fn create_new_block(&mut self, module: &mut Module) -> BlockId {
        let index = self.function(module).blocks.len() as u32;
        let id = self.create_block(module, "block_", index);
        self.begin_block(module, id);
        id
    }

    /// Make `block` current; an unterminated previous block falls through
    /// with an explicit branch.
    pub fn begin_block(&mut self, module: &mut Module, block: BlockId) {
        if let Some(previous) = self.current_block {
            let function = self.function_mut(module);
            if function.blocks[previous].terminator.is_none() {
                function.blocks[previous].terminator = Some(Terminator::Branch(block));
            }
        }
        self.current_block = Some(block.0 as usize);
    }

    /// Ensure statements have a block to land in.
    pub fn ensure_block_is_ready(&mut self, module: &mut Module) {
        let needs_new = match self.current_block {
            None => true,
            Some(b) => self.function(module).blocks[b].terminator.is_some(),
        };
        if needs_new {
            self.create_new_block(module);
        }
    }

    pub fn add_statement(&mut self, module: &mut Module, statement: Statement) {
        self.ensure_block_is_ready(module);
        let block = self.current_block.expect("block ready");
        self.function_mut(module).blocks[block]
            .statements
            .push(statement);
    }

    /// Location of the next statement, for call fix-ups.
    pub fn next_statement_position(&mut self, module: &mut Module) -> (usize, usize) {
        self.ensure_block_is_ready(module);
        let block = self.current_block.expect("block ready");
        (block, self.function(module).blocks[block].statements.len())
    }

    fn terminate(&mut self, module: &mut Module, terminator: Terminator) {
        self.ensure_block_is_ready(module);
        let block = self.current_block.expect("block ready");
        self.function_mut(module).blocks[block].terminator = Some(terminator);
    }

    pub fn add_branch(&mut self, module: &mut Module, target: BlockId, subsequent: BlockId) {
        self.terminate(module, Terminator::Branch(target));
        self.begin_block(module, subsequent);
    }

    /// Branch without opening a follow-on block (loop tails).
    pub fn add_terminal_branch(&mut self, module: &mut Module, target: BlockId) {
        self.terminate(module, Terminator::Branch(target));
        self.current_block = None;
    }

    pub fn add_branch_if(
        &mut self,
        module: &mut Module,
        condition: Expr,
        true_target: BlockId,
        false_target: BlockId,
        subsequent: BlockId,
    ) {
        self.terminate(
            module,
            Terminator::BranchIf {
                condition,
                true_target,
                false_target,
            },
        );
        self.begin_block(module, subsequent);
    }

    pub fn add_return(&mut self, module: &mut Module, value: Option<Expr>) {
        self.terminate(module, Terminator::Return(value));
        self.current_block = None;
    }

    /// Close the function: a dangling block gets an implicit valueless
    /// return (the termination check rejects it for non-void functions).
    pub fn end_function(&mut self, module: &mut Module) {
        if let Some(block) = self.current_block {
            let function = self.function_mut(module);
            if function.blocks[block].terminator.is_none() {
                function.blocks[block].terminator = Some(Terminator::Return(None));
            }
        }
        self.current_block = None;
    }

    // ---- variables ----

    fn unique_local_name(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut suffix = 1;
        while !self.used_local_names.insert(name.clone()) {
            suffix += 1;
            name = format!("{base}_{suffix}");
        }
        name
    }

    pub fn add_parameter(
        &mut self,
        module: &mut Module,
        name: String,
        ty: Type,
        annotation: PlainAnnotation,
    ) -> VarId {
        let name = self.unique_local_name(&name);
        let id = module.add_variable(Variable {
            name,
            ty,
            role: VariableRole::Parameter,
            annotation,
        });
        self.function_mut(module).parameters.push(id);
        id
    }

    pub fn create_named_local(&mut self, module: &mut Module, name: &str, ty: Type) -> VarId {
        let name = self.unique_local_name(name);
        let id = module.add_variable(Variable {
            name,
            ty: ty.without_reference_and_const(),
            role: VariableRole::MutableLocal,
            annotation: Vec::new(),
        });
        self.function_mut(module).locals.push(id);
        id
    }

    /// A single-assignment temporary.
    pub fn create_register_variable(&mut self, module: &mut Module, ty: Type) -> VarId {
        let name = format!("t{}", self.next_temp);
        self.next_temp += 1;
        let name = self.unique_local_name(&name);
        let id = module.add_variable(Variable {
            name,
            ty: ty.without_reference_and_const(),
            role: VariableRole::Register,
            annotation: Vec::new(),
        });
        self.function_mut(module).locals.push(id);
        id
    }

    pub fn create_mutable_local(&mut self, module: &mut Module, ty: Type) -> VarId {
        let name = format!("v{}", self.next_temp);
        self.next_temp += 1;
        self.create_named_local(module, &name, ty)
    }

    // ---- statement helpers ----

    pub fn add_assignment(&mut self, module: &mut Module, dest: Destination, source: Expr) {
        self.add_statement(module, Statement::Assign { dest, source });
    }

    pub fn add_zero_assignment(
        &mut self,
        module: &mut Module,
        structs: &StructStore,
        dest: Destination,
    ) {
        let ty = destination_type(module, structs, &dest);
        let zero = Value::zero_initialiser(&ty, structs);
        self.add_assignment(module, dest, Expr::Constant(zero));
    }

    /// `counter = counter - 1` for counted-loop lowering.
    pub fn decrement_value(&mut self, module: &mut Module, structs: &StructStore, var: VarId) {
        let ty = module.variable(var).ty.clone();
        let one = Value::int32(1)
            .cast_to_type(&ty, structs)
            .unwrap_or(Value::int32(1));
        let decremented = Expr::Binary {
            op: BinaryOperator::Subtract,
            lhs: Box::new(Expr::Variable(var)),
            rhs: Box::new(Expr::Constant(one)),
            ty,
        };
        self.add_assignment(module, Destination::variable(var), decremented);
    }

    /// Checks every block ends in a terminator and that a non-void
    /// function returns a value on every terminating path.
    pub fn check_function_blocks_for_termination(&self, module: &Module) -> bool {
        let function = self.function(module);
        let needs_value = !function.return_type.is_void();

        for block in &function.blocks {
            match &block.terminator {
                None => return false,
                Some(Terminator::Return(value)) => {
                    if needs_value && value.is_none() {
                        return false;
                    }
                    if !needs_value && value.is_some() {
                        return false;
                    }
                }
                Some(_) => {}
            }
        }
        true
    }
}

/// The type at the end of a destination's sub-element path.
pub(crate) fn destination_type(module: &Module, structs: &StructStore, dest: &Destination) -> Type {
    let mut ty = module
        .variable(dest.root)
        .ty
        .without_reference_and_const();
    for step in &dest.path {
        ty = match step {
            SubIndex::Fixed(i) => match ty.struct_ref() {
                Some(s) => structs.get(s).members[*i as usize].ty.clone(),
                None => ty.element_type().unwrap_or(Type::void()),
            },
            SubIndex::Range(start, end) => {
                let element = ty.element_type().unwrap_or(Type::void());
                if ty.is_vector() {
                    element
                        .primitive_type()
                        .and_then(|p| Type::vector(p, end - start).ok())
                        .unwrap_or(element)
                } else {
                    Type::array(element.clone(), end - start).unwrap_or(element)
                }
            }
            SubIndex::Dynamic { .. } => ty.element_type().unwrap_or(Type::void()),
        };
    }
    ty
}

/// Insert a cast when the types differ (no-op otherwise).
pub(crate) fn cast_if_needed(
    module: &Module,
    structs: &StructStore,
    source: Expr,
    target: &Type,
) -> Expr {
    let source_type = source.get_type(module, structs);
    if source_type
        .without_reference_and_const()
        .is_identical(&target.without_reference_and_const())
    {
        return source;
    }
    Expr::Cast {
        target: target.without_reference_and_const(),
        source: Box::new(source),
    }
}

/// Narrowest integer type that can count down a constant iteration count.
pub(crate) fn narrowest_counter_type(num_iterations: Option<i64>, declared: &Type) -> Type {
    if declared.is_integer64() {
        if let Some(n) = num_iterations {
            if n <= i32::MAX as i64 {
                return Type::int32();
            }
        }
        return Type::int64();
    }
    Type::int32()
}
