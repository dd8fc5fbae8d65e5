//! The abstract syntax tree.
//!
//! Nodes live in typed arenas owned by one [`AstAllocator`]; ids are plain
//! indices. Resolution rewrites a node by replacing the contents of its
//! slot, so every parent holding the id sees the replacement without any
//! pointer fixup. Scope parent links are explicit ids, never references.
//!
//! # Resolution states
//!
//! A freshly parsed tree is "rough": names are [`Expr::QualifiedIdentifier`]
//! nodes, calls and casts share [`Expr::CallOrCast`], and subscripts are
//! ambiguous between types and values. The resolution passes replace these
//! until none remain; `ast/queries.rs` defines what "resolved" means per
//! variant.

mod alloc;
mod queries;
pub mod visit;

pub use alloc::{AstAllocator, KnownNames};
pub use queries::ExprClass;

use crate::endpoint::{EndpointKind, InterpolationType, ProcessorProperty};
use crate::intrinsic::IntrinsicType;
use crate::span::SourceRef;
use crate::types::{StructId, Type};
use crate::value::Value;
use crate::{BinaryOperator, Name, UnaryOperator};

// ---- ids ----

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

define_id!(
    /// Expression slot.
    ExprId
);
define_id!(
    /// Statement slot.
    StmtId
);
define_id!(
    /// Block.
    BlockId
);
define_id!(
    /// Variable declaration.
    VarId
);
define_id!(
    /// Function.
    FuncId
);
define_id!(
    /// Module (namespace, processor, or graph).
    ModuleId
);
define_id!(
    /// Endpoint declaration.
    EndpointId
);
define_id!(
    /// Struct declaration.
    StructDeclId
);
define_id!(
    /// Using declaration.
    UsingId
);

/// Node context: where the node came from.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct Context {
    pub location: SourceRef,
}

impl Context {
    pub const NONE: Context = Context {
        location: SourceRef::NONE,
    };

    pub fn new(location: SourceRef) -> Self {
        Context { location }
    }
}

/// A scope that declarations can live in.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ScopeRef {
    Module(ModuleId),
    Function(FuncId),
    Block(BlockId),
}

// ---- names ----

/// A possibly qualified name: `a`, `a::b::c`.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub struct IdentifierPath {
    pub parts: Vec<Name>,
}

impl IdentifierPath {
    pub fn unqualified(name: Name) -> Self {
        IdentifierPath { parts: vec![name] }
    }

    pub fn new(parts: Vec<Name>) -> Self {
        IdentifierPath { parts }
    }

    pub fn is_unqualified(&self) -> bool {
        self.parts.len() == 1
    }

    pub fn is_qualified(&self) -> bool {
        self.parts.len() > 1
    }

    pub fn first_part(&self) -> Name {
        self.parts[0]
    }

    pub fn last_part(&self) -> Name {
        *self.parts.last().expect("empty identifier path")
    }

    pub fn is_unqualified_name(&self, name: Name) -> bool {
        self.is_unqualified() && self.parts[0] == name
    }

    /// Path with the first part removed.
    pub fn tail(&self) -> IdentifierPath {
        IdentifierPath {
            parts: self.parts[1..].to_vec(),
        }
    }

    pub fn with_suffix(&self, name: Name) -> IdentifierPath {
        let mut parts = self.parts.clone();
        parts.push(name);
        IdentifierPath { parts }
    }

    pub fn to_string(&self, interner: &crate::StringInterner) -> String {
        self.parts
            .iter()
            .map(|n| interner.lookup(*n))
            .collect::<Vec<_>>()
            .join("::")
    }
}

/// An `[[ key: value, ... ]]` annotation set.
#[derive(Clone, Debug, Default)]
pub struct Annotation {
    pub properties: Vec<AnnotationProperty>,
}

#[derive(Clone, Debug)]
pub struct AnnotationProperty {
    pub name: Name,
    pub value: ExprId,
    pub context: Context,
}

impl Annotation {
    pub fn find(&self, name: Name) -> Option<&AnnotationProperty> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

// ---- expressions ----

/// Type meta-function operations (`x.size`, `x.elementType`, `const T`, ...).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeMetaOp {
    /// The type of the source expression.
    TypeOf,
    MakeConst,
    MakeReference,
    ElementType,
    PrimitiveOf,
    Size,
    IsStruct,
    IsArray,
    IsVector,
    IsPrimitive,
    IsFloat,
    IsInt,
    IsScalar,
    IsString,
    IsBool,
    IsReference,
    IsConst,
}

impl TypeMetaOp {
    pub fn from_name(name: &str) -> Option<TypeMetaOp> {
        use TypeMetaOp::*;
        Some(match name {
            "type" => TypeOf,
            "elementType" => ElementType,
            "primitiveType" => PrimitiveOf,
            "size" => Size,
            "isStruct" => IsStruct,
            "isArray" => IsArray,
            "isVector" => IsVector,
            "isPrimitive" => IsPrimitive,
            "isFloat" => IsFloat,
            "isInt" => IsInt,
            "isScalar" => IsScalar,
            "isString" => IsString,
            "isBool" => IsBool,
            "isReference" => IsReference,
            "isConst" => IsConst,
            _ => return None,
        })
    }
}

/// Expression node variants.
///
/// `QualifiedIdentifier`, `DotOperator`, `CallOrCast`, and the two
/// `Subscript*` forms exist only before resolution; none remain in a fully
/// resolved tree.
#[derive(Clone, Debug)]
pub enum Expr {
    Constant(Value),
    QualifiedIdentifier(IdentifierPath),
    VariableRef(VarId),
    ProcessorRef(ModuleId),
    InputEndpointRef(EndpointId),
    OutputEndpointRef(EndpointId),
    /// A fully resolved type used in expression position.
    ConcreteType(Type),
    /// `lhs[index]` before it is known whether `lhs` is a type or a value.
    SubscriptWithBrackets {
        lhs: ExprId,
        index: Option<ExprId>,
    },
    /// `lhs<size>` before `lhs` is resolved.
    SubscriptWithChevrons {
        lhs: ExprId,
        size: ExprId,
    },
    TypeMetaFunction {
        op: TypeMetaOp,
        source: ExprId,
    },
    /// An explicit or resolver-inserted cast. `source` may be a
    /// `CommaSeparatedList` for aggregate initialisation.
    TypeCast {
        target: Type,
        source: ExprId,
    },
    /// `name(args)` before it is known whether `name` is a function or a
    /// type.
    CallOrCast {
        name_or_type: ExprId,
        args: Option<ExprId>,
        is_method: bool,
    },
    FunctionCall {
        function: FuncId,
        args: Option<ExprId>,
    },
    UnaryOp {
        op: UnaryOperator,
        source: ExprId,
    },
    BinaryOp {
        op: BinaryOperator,
        lhs: ExprId,
        rhs: ExprId,
    },
    TernaryOp {
        condition: ExprId,
        true_branch: ExprId,
        false_branch: ExprId,
    },
    Assignment {
        target: ExprId,
        new_value: ExprId,
    },
    PreOrPostIncDec {
        target: ExprId,
        is_increment: bool,
        is_post: bool,
    },
    CommaSeparatedList {
        items: Vec<ExprId>,
    },
    /// `object[start]`, or `object[start:end]` when `is_slice`.
    ArrayElementRef {
        object: ExprId,
        start: ExprId,
        end: Option<ExprId>,
        is_slice: bool,
        suppress_wrap_warning: bool,
    },
    StructMemberRef {
        object: ExprId,
        structure: StructId,
        member_index: usize,
    },
    /// `lhs.rhs` before `lhs` is resolved.
    DotOperator {
        lhs: ExprId,
        rhs: IdentifierPath,
    },
    /// `endpoint << value`, rewritten from the stream-write binary op.
    WriteToEndpoint {
        target: ExprId,
        value: ExprId,
    },
    ProcessorProperty(ProcessorProperty),
    AdvanceClock,
    StaticAssertion {
        condition: ExprId,
        message: String,
    },
}

// ---- statements ----

#[derive(Clone, Debug)]
pub enum Stmt {
    Block(BlockId),
    Expression(ExprId),
    VariableDeclaration(VarId),
    If {
        condition: ExprId,
        true_branch: StmtId,
        false_branch: Option<StmtId>,
    },
    /// All loop forms: `while`, `do`, `for` (after desugaring), `loop`,
    /// `loop(n)`.
    Loop {
        is_do: bool,
        condition: Option<ExprId>,
        num_iterations: Option<ExprId>,
        iterator: Option<ExprId>,
        body: StmtId,
    },
    Return {
        value: Option<ExprId>,
    },
    Break,
    Continue,
    Noop,
}

/// A `{ ... }` block: a scope owning its local variable declarations.
#[derive(Clone, Debug)]
pub struct Block {
    pub context: Context,
    pub parent: ScopeRef,
    /// Set for a function's main block.
    pub function: Option<FuncId>,
    pub statements: Vec<StmtId>,
}

// ---- declarations ----

#[derive(Clone, Debug)]
pub struct Variable {
    pub context: Context,
    pub name: Name,
    /// Type expression; `None` for `let`/`var` declarations, and cleared
    /// once the initialiser has been given an explicit cast to the
    /// resolved type.
    pub declared_type: Option<ExprId>,
    pub initial_value: Option<ExprId>,
    pub is_const: bool,
    pub is_external: bool,
    pub is_parameter: bool,
    pub annotation: Annotation,
    /// Rebuilt from scratch by the use-count pass each iteration.
    pub num_reads: u32,
    pub num_writes: u32,
}

#[derive(Clone, Debug)]
pub struct Function {
    pub context: Context,
    pub name: Name,
    pub name_context: Context,
    pub module: ModuleId,
    pub return_type: ExprId,
    pub parameters: Vec<VarId>,
    /// Wildcard type names of a generic function; emptied in clones once
    /// every wildcard is bound.
    pub generic_wildcards: Vec<(Name, Context)>,
    /// Wildcard bindings of a specialised clone.
    pub generic_specialisations: Vec<(Name, Type)>,
    /// `None` for intrinsics without bodies.
    pub block: Option<StmtId>,
    pub annotation: Annotation,
    pub intrinsic: IntrinsicType,
    pub is_event_handler: bool,
    /// The generic this function was specialised from.
    pub original_generic: Option<FuncId>,
}

impl Function {
    pub fn is_generic(&self) -> bool {
        !self.generic_wildcards.is_empty()
    }
}

#[derive(Clone, Debug)]
pub struct StructMemberDecl {
    pub context: Context,
    pub name: Name,
    pub type_expr: ExprId,
}

#[derive(Clone, Debug)]
pub struct StructDecl {
    pub context: Context,
    pub name: Name,
    pub members: Vec<StructMemberDecl>,
    /// Filled by the type resolver once every member type is resolved.
    pub resolved: Option<StructId>,
}

#[derive(Clone, Debug)]
pub struct UsingDecl {
    pub context: Context,
    pub name: Name,
    /// `None` only for `using` specialisation parameters awaiting their
    /// argument.
    pub target: Option<ExprId>,
}

#[derive(Clone, Debug)]
pub struct EndpointDecl {
    pub context: Context,
    pub name: Name,
    pub is_input: bool,
    pub kind: EndpointKind,
    /// One type expression per sample type; more than one only for events.
    pub sample_types: Vec<ExprId>,
    pub array_size: Option<ExprId>,
    pub annotation: Annotation,
}

// ---- modules ----

#[derive(Clone, Debug)]
pub enum SpecialisationParam {
    /// `using X`: a type parameter.
    Using(UsingId),
    /// `processor P`: a processor alias parameter (graphs only).
    ProcessorAlias { name: Name, context: Context },
    /// `Type name`: a value parameter.
    Value(VarId),
}

#[derive(Clone, Debug)]
pub struct ProcessorInstance {
    pub context: Context,
    pub instance_name: Name,
    /// Target processor name; resolved to a `ProcessorRef`.
    pub target: ExprId,
    pub array_size: Option<ExprId>,
    pub specialisation_args: Vec<ExprId>,
    pub clock_multiplier: Option<ExprId>,
    pub clock_divider: Option<ExprId>,
}

/// One endpoint of a connection: `name` (the graph's own endpoint) or
/// `instance.name`.
#[derive(Clone, Debug)]
pub struct ConnectionEnd {
    pub context: Context,
    pub processor: Option<Name>,
    pub channel: Name,
}

#[derive(Clone, Debug)]
pub struct Connection {
    pub context: Context,
    pub interpolation: InterpolationType,
    pub source: ConnectionEnd,
    pub dest: ConnectionEnd,
    pub delay_length: Option<ExprId>,
}

#[derive(Clone, Debug)]
pub enum ModuleKind {
    Namespace {
        imports: Vec<String>,
    },
    Processor,
    Graph {
        instances: Vec<ProcessorInstance>,
        connections: Vec<Connection>,
    },
}

#[derive(Clone, Debug)]
pub struct Module {
    pub context: Context,
    pub name: Name,
    pub parent: Option<ModuleId>,
    pub kind: ModuleKind,
    pub annotation: Annotation,
    pub specialisation_params: Vec<SpecialisationParam>,
    pub inputs: Vec<EndpointId>,
    pub outputs: Vec<EndpointId>,
    pub structs: Vec<StructDeclId>,
    pub usings: Vec<UsingId>,
    pub functions: Vec<FuncId>,
    /// State variables for processors, constants for namespaces.
    pub state_variables: Vec<VarId>,
    pub sub_modules: Vec<ModuleId>,
    pub is_fully_resolved: bool,
}

impl Module {
    pub fn is_namespace(&self) -> bool {
        matches!(self.kind, ModuleKind::Namespace { .. })
    }

    pub fn is_processor(&self) -> bool {
        matches!(self.kind, ModuleKind::Processor)
    }

    pub fn is_graph(&self) -> bool {
        matches!(self.kind, ModuleKind::Graph { .. })
    }

    pub fn is_processor_or_graph(&self) -> bool {
        self.is_processor() || self.is_graph()
    }

    pub fn has_specialisation_params(&self) -> bool {
        !self.specialisation_params.is_empty()
    }
}
