//! The HEART data model.
//!
//! A program is a flat list of modules; each module lists endpoints,
//! connections, processor instances, state variables, structs, and
//! functions. A function body is a list of basic blocks; every block ends
//! in exactly one terminator. Assignments write *destinations*: a
//! variable, or a chain of sub-element steps rooted at one.

use soul_ir::endpoint::{EndpointKind, InterpolationType, ProcessorProperty};
use soul_ir::intrinsic::IntrinsicType;
use soul_ir::types::{StructId, Type};
use soul_ir::value::Value;
use soul_ir::{BinaryOperator, UnaryOperator};

/// Variable handle within one module.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct VarId(pub u32);

/// Block handle within one function.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct BlockId(pub u32);

/// A function within a program: module index plus function index.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct FunctionRef {
    pub module: usize,
    pub function: usize,
}

/// Plain key/value annotation carried through from the AST.
pub type PlainAnnotation = Vec<(String, Value)>;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum VariableRole {
    /// Lives for the processor instance.
    State,
    /// External data supplied by the host.
    External,
    Parameter,
    /// Function-local, mutable.
    MutableLocal,
    /// Function-local single-assignment temporary.
    Register,
}

#[derive(Clone, Debug)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
    pub role: VariableRole,
    pub annotation: PlainAnnotation,
}

#[derive(Clone, Debug)]
pub struct EndpointDecl {
    pub name: String,
    pub index: u32,
    pub kind: EndpointKind,
    pub sample_types: Vec<Type>,
    pub array_size: Option<u64>,
    pub annotation: PlainAnnotation,
}

#[derive(Clone, Debug)]
pub enum SpecialisationArgument {
    Type(Type),
    ProcessorName(String),
    Value(Value),
}

#[derive(Clone, Debug)]
pub struct ProcessorInstance {
    pub instance_name: String,
    /// Fully qualified name of the instantiated processor.
    pub source_name: String,
    pub array_size: u64,
    pub clock_multiplier: Option<i64>,
    pub clock_divider: Option<i64>,
    pub specialisation_args: Vec<SpecialisationArgument>,
}

#[derive(Clone, Debug)]
pub struct Connection {
    pub interpolation: InterpolationType,
    /// Instance index, or `None` for the graph's own endpoint.
    pub source_processor: Option<usize>,
    pub source_channel: String,
    pub dest_processor: Option<usize>,
    pub dest_channel: String,
    /// Zero when the connection has no delay section.
    pub delay_length: i64,
}

/// One step of a sub-element path.
#[derive(Clone, Debug)]
pub enum SubIndex {
    /// Fixed index into a struct, array, or vector.
    Fixed(u64),
    /// A `[start:end]` slice.
    Range(u64, u64),
    /// Runtime index, wrapped into range when `wrap` is set.
    Dynamic {
        index: Box<Expr>,
        /// Bound for the runtime wrap; `None` when the index type is
        /// already bounded.
        wrap: Option<u64>,
    },
}

#[derive(Clone, Debug)]
pub enum Expr {
    Constant(Value),
    Variable(VarId),
    SubElement {
        parent: Box<Expr>,
        index: SubIndex,
    },
    Cast {
        target: Type,
        source: Box<Expr>,
    },
    Unary {
        op: UnaryOperator,
        source: Box<Expr>,
    },
    Binary {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        /// Result type, fixed at lowering time.
        ty: Type,
    },
    ProcessorProperty(ProcessorProperty),
}

impl Expr {
    /// The type an expression produces, given its module's variables.
    pub fn get_type(&self, module: &Module, structs: &soul_ir::types::StructStore) -> Type {
        match self {
            Expr::Constant(v) => v.get_type().clone(),
            Expr::Variable(v) => module.variables[v.0 as usize].ty.clone(),
            Expr::SubElement { parent, index } => {
                let parent_type = parent
                    .get_type(module, structs)
                    .without_reference_and_const();
                match index {
                    SubIndex::Fixed(i) => {
                        if let Some(struct_id) = parent_type.struct_ref() {
                            structs.get(struct_id).members[*i as usize].ty.clone()
                        } else {
                            parent_type.element_type().unwrap_or(Type::void())
                        }
                    }
                    SubIndex::Range(start, end) => {
                        let element = parent_type.element_type().unwrap_or(Type::void());
                        let len = end - start;
                        if parent_type.is_vector() {
                            Type::vector(
                                element.primitive_type().unwrap_or(
                                    soul_ir::types::PrimitiveType::Float32,
                                ),
                                len,
                            )
                            .unwrap_or(element)
                        } else {
                            Type::array(element.clone(), len).unwrap_or(element)
                        }
                    }
                    SubIndex::Dynamic { .. } => {
                        parent_type.element_type().unwrap_or(Type::void())
                    }
                }
            }
            Expr::Cast { target, .. } => target.clone(),
            Expr::Unary { source, .. } => source.get_type(module, structs),
            Expr::Binary { ty, .. } => ty.clone(),
            Expr::ProcessorProperty(p) => {
                if p.is_float() {
                    Type::float64()
                } else {
                    Type::int32()
                }
            }
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expr::Constant(v) => Some(v),
            _ => None,
        }
    }
}

/// An assignment target: a variable, or sub-elements of one.
#[derive(Clone, Debug)]
pub struct Destination {
    pub root: VarId,
    pub path: Vec<SubIndex>,
}

impl Destination {
    pub fn variable(root: VarId) -> Self {
        Destination {
            root,
            path: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum Statement {
    Assign {
        dest: Destination,
        source: Expr,
    },
    FunctionCall {
        dest: Option<Destination>,
        /// Fully qualified unique function name (stable in dumps).
        name: String,
        /// Resolved after every module has been generated or parsed.
        function: Option<FunctionRef>,
        args: Vec<Expr>,
    },
    ReadStream {
        dest: Destination,
        /// Input endpoint index.
        input: u32,
    },
    WriteStream {
        /// Output endpoint index.
        output: u32,
        /// Element index for array endpoints.
        index: Option<Expr>,
        value: Expr,
    },
    AdvanceClock,
}

#[derive(Clone, Debug)]
pub enum Terminator {
    Branch(BlockId),
    BranchIf {
        condition: Expr,
        true_target: BlockId,
        false_target: BlockId,
    },
    Return(Option<Expr>),
}

#[derive(Clone, Debug)]
pub struct Block {
    pub name: String,
    pub statements: Vec<Statement>,
    /// Filled by the builder; present on every finished block.
    pub terminator: Option<Terminator>,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub name: String,
    pub return_type: Type,
    pub parameters: Vec<VarId>,
    pub locals: Vec<VarId>,
    pub blocks: Vec<Block>,
    pub is_run_function: bool,
    pub is_event_function: bool,
    pub is_init_function: bool,
    pub has_no_body: bool,
    pub intrinsic: IntrinsicType,
    pub annotation: PlainAnnotation,
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ModuleKind {
    Namespace,
    Processor,
    Graph,
}

#[derive(Clone, Debug)]
pub struct Module {
    pub kind: ModuleKind,
    /// Fully qualified module path.
    pub name: String,
    pub annotation: PlainAnnotation,
    pub inputs: Vec<EndpointDecl>,
    pub outputs: Vec<EndpointDecl>,
    pub instances: Vec<ProcessorInstance>,
    pub connections: Vec<Connection>,
    /// All variables of the module, including function locals.
    pub variables: Vec<Variable>,
    pub state_variables: Vec<VarId>,
    pub structs: Vec<StructId>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn new(kind: ModuleKind, name: String) -> Self {
        Module {
            kind,
            name,
            annotation: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            instances: Vec::new(),
            connections: Vec::new(),
            variables: Vec::new(),
            state_variables: Vec::new(),
            structs: Vec::new(),
            functions: Vec::new(),
        }
    }

    pub fn add_variable(&mut self, variable: Variable) -> VarId {
        let id = VarId(self.variables.len() as u32);
        self.variables.push(variable);
        id
    }

    pub fn variable(&self, id: VarId) -> &Variable {
        &self.variables[id.0 as usize]
    }

    pub fn find_input(&self, name: &str) -> Option<&EndpointDecl> {
        self.inputs.iter().find(|e| e.name == name)
    }

    pub fn find_output(&self, name: &str) -> Option<&EndpointDecl> {
        self.outputs.iter().find(|e| e.name == name)
    }

    pub fn find_function(&self, name: &str) -> Option<usize> {
        self.functions.iter().position(|f| f.name == name)
    }
}

/// Name of the generated state-initialisation function.
pub fn init_function_name() -> &'static str {
    "_init"
}

/// Mangled name for an event handler, one per sample type.
pub fn event_function_name(
    base: &str,
    param_type: &Type,
    structs: &soul_ir::types::StructStore,
) -> String {
    let mangled = param_type
        .without_reference_and_const()
        .describe(structs)
        .replace(['<', '>', '[', ']', ' ', ',', ':'], "_");
    format!("_{base}_event_{mangled}")
}
