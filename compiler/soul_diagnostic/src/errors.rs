//! The diagnostic catalog.
//!
//! One constructor per diagnostic the compiler can produce, so codes and
//! wording live in one place. Constructors take a [`SourceRef`] plus the
//! values interpolated into the message.

use crate::{Category, Diagnostic, ErrorCode};
use soul_ir::SourceRef;

macro_rules! errors {
    ($( $name:ident ($($arg:ident : $ty:ty),*) = $code:literal, $category:ident, $fmt:literal; )*) => {
        $(
            pub fn $name(location: SourceRef $(, $arg: $ty)*) -> Diagnostic {
                Diagnostic::error(
                    ErrorCode($code),
                    Category::$category,
                    location,
                    format!($fmt $(, $arg = $arg)*),
                )
            }
        )*
    };
}

macro_rules! warnings {
    ($( $name:ident ($($arg:ident : $ty:ty),*) = $code:literal, $category:ident, $fmt:literal; )*) => {
        $(
            pub fn $name(location: SourceRef $(, $arg: $ty)*) -> Diagnostic {
                Diagnostic::warning(
                    ErrorCode($code),
                    Category::$category,
                    location,
                    format!($fmt $(, $arg = $arg)*),
                )
            }
        )*
    };
}

errors! {
    // ---- lexer ----
    unknown_character(text: &str) = "E0001", Lex, "unexpected character: '{text}'";
    unterminated_string() = "E0002", Lex, "unterminated string literal";
    unterminated_comment() = "E0003", Lex, "unterminated comment";
    integer_literal_too_large() = "E0004", Lex, "integer literal is too large";
    name_too_long(name: &str) = "E0005", Lex, "name is too long: '{name}'";

    // ---- parser ----
    expected_token(token: &str) = "E0100", Parse, "expected {token}";
    found_instead(token: &str, found: &str) = "E0101", Parse, "expected {token} but found {found}";
    expected_top_level_decl() = "E0102", Parse, "expected a global declaration such as a processor, graph or namespace";
    expected_statement() = "E0103", Parse, "expected a statement";
    expected_expression() = "E0104", Parse, "expected an expression";
    expected_type() = "E0105", Parse, "expected a type";
    expected_value() = "E0106", Parse, "expected a value";
    expected_value_or_endpoint() = "E0107", Parse, "expected a value or endpoint";
    expected_function_or_variable() = "E0108", Parse, "expected a function or variable declaration";
    expected_variable_decl() = "E0109", Parse, "expected a variable declaration";
    expected_module_name() = "E0110", Parse, "expected a module name";
    imports_must_be_at_start() = "E0111", Parse, "import statements must appear at the start of a namespace";
    namespace_must_be_inside_namespace() = "E0112", Parse, "a namespace can only be declared inside a namespace";
    processor_must_be_inside_namespace() = "E0113", Parse, "a processor can only be declared inside a namespace";
    graph_must_be_inside_namespace() = "E0114", Parse, "a graph can only be declared inside a namespace";
    semicolon_after_brace() = "E0115", Parse, "a closing brace must not be followed by a semicolon";
    endpoint_decls_must_be_first() = "E0116", Parse, "endpoint declarations must appear before anything else in a processor";
    namespace_cannot_contain_endpoints() = "E0117", Parse, "a namespace cannot contain endpoint declarations";
    no_event_functions_allowed() = "E0118", Parse, "event handler functions can only be declared inside a processor";
    struct_decl_not_allowed() = "E0119", Parse, "structs cannot be declared inside this scope";
    using_decl_not_allowed() = "E0120", Parse, "using declarations are not allowed in this scope";
    no_function_in_this_scope() = "E0121", Parse, "functions cannot be declared inside this scope";
    no_variable_in_this_scope() = "E0122", Parse, "variables cannot be declared inside this scope";
    external_not_allowed_in_function() = "E0123", Parse, "external variables must be declared at processor or namespace scope";
    external_only_on_state_vars() = "E0124", Parse, "'external' is only allowed on state variables";
    external_cannot_have_initialiser() = "E0125", Parse, "external variables cannot be given initialiser values";
    no_const_on_externals() = "E0126", Parse, "external variables are implicitly const";
    function_cannot_be_external() = "E0127", Parse, "functions cannot be declared external";
    function_return_type_cannot_be_const() = "E0128", Parse, "a function's return type cannot be const";
    parameter_cannot_be_void() = "E0129", Parse, "function parameters cannot be void";
    too_many_parameters() = "E0130", Parse, "too many function parameters";
    too_many_initialisers() = "E0131", Parse, "initialiser list is too long";
    expected_generic_wildcard_name() = "E0132", Parse, "expected a generic function wildcard name";
    qualifier_on_generic() = "E0133", Parse, "generic wildcard names cannot be qualified";
    assignment_inside_expression() = "E0134", Parse, "assignment is not allowed inside an expression";
    expression_has_no_effect() = "E0135", Parse, "this expression has no effect";
    expected_processor_or_endpoint() = "E0136", Parse, "expected a processor or endpoint name";
    qualifier_on_channel() = "E0137", Parse, "endpoint names in connections cannot be qualified";
    name_in_use(name: &str) = "E0138", Parse, "the name '{name}' is already in use";
    graph_cannot_have_specialisations() = "E0139", Parse, "graphs cannot declare 'using' specialisation parameters";
    processor_specialisation_not_allowed() = "E0140", Parse, "'processor' specialisation parameters are only allowed on graphs";
    no_multiple_types_on_endpoint() = "E0141", Parse, "only event endpoints can declare multiple types";
    expected_endpoint_kind() = "E0142", Parse, "expected 'stream', 'value' or 'event'";
    member_cannot_be_const() = "E0143", Parse, "struct members cannot be const";
    member_cannot_be_reference() = "E0144", Parse, "struct members cannot be references";
    type_cannot_be_reference() = "E0145", Parse, "variable types cannot be references";
    event_type_cannot_be_reference() = "E0146", Parse, "event types cannot be references";
    using_cannot_be_reference() = "E0147", Parse, "using declarations cannot refer to references";
    processor_params_cannot_be_reference() = "E0148", Parse, "processor parameters cannot be references";
    unknown_property(name: &str) = "E0149", Parse, "unknown processor property '{name}'";
    properties_outside_processor() = "E0150", Parse, "processor properties are only valid inside a processor or graph";
    type_reference_not_allowed() = "E0151", Parse, "type references are not allowed here";
    processor_reference_not_allowed() = "E0152", Parse, "processor references are not allowed here";
    illegal_slice_size() = "E0153", Parse, "illegal slice range";
    expected_integer() = "E0154", Parse, "expected an integer";
    variable_cannot_be_void() = "E0155", Parse, "variables cannot be void";
    expected_string_literal() = "E0156", Parse, "expected a string literal";
    wildcard_not_unique(name: &str) = "E0157", Parse, "duplicate generic wildcard name '{name}'";
    break_outside_loop() = "E0158", Parse, "'break' can only be used inside a loop";
    continue_outside_loop() = "E0159", Parse, "'continue' can only be used inside a loop";

    // ---- sanity checks ----
    processor_needs_an_output() = "E0200", Sanity, "a processor must declare at least one output";
    processor_needs_run_function() = "E0201", Sanity, "a processor must contain a run() function";
    multiple_run_functions() = "E0202", Sanity, "a processor cannot contain more than one run() function";
    run_function_must_be_void() = "E0203", Sanity, "the run() function must return void";
    run_function_has_params() = "E0204", Sanity, "the run() function cannot take parameters";
    duplicate_name(name: &str) = "E0205", Sanity, "the name '{name}' is already declared in this scope";
    no_such_input_event(name: &str) = "E0206", Sanity, "no input event endpoint matches the handler '{name}'";
    duplicate_function(name: &str) = "E0207", Sanity, "a function '{name}' with matching parameters has already been declared";
    type_contains_itself(name: &str) = "E0208", Sanity, "the type '{name}' contains itself";
    types_refer_to_each_other(a: &str, b: &str) = "E0209", Sanity, "the types '{a}' and '{b}' refer to each other";
    pre_inc_dec_collision() = "E0210", Sanity, "a variable modified by '++' or '--' cannot also be referenced in the same statement";
    expected_constant() = "E0211", Sanity, "expected a compile-time constant";
    non_const_in_namespace() = "E0212", Sanity, "namespace-level variables must be compile-time constants";
    graph_cycle(path: &str) = "E0213", Sanity, "the graph contains a feedback cycle: {path}";
    recursive_graph(name: &str) = "E0214", Sanity, "the graph '{name}' recursively instantiates itself";
    event_params_cannot_be_non_const_reference() = "E0215", Sanity, "event handler parameters cannot be non-const references";
    delay_line_must_have_int_length() = "E0216", Sanity, "a delay line length must be an integer";
    delay_line_has_zero_length() = "E0217", Sanity, "a delay line must have a length of at least 1";
    delay_line_illegal_length() = "E0218", Sanity, "delay line length is out of range";
    delay_line_must_be_constant() = "E0219", Sanity, "a delay line length must be a compile-time constant";
    illegal_array_size() = "E0220", Sanity, "illegal array size";
    non_integer_array_size() = "E0221", Sanity, "array sizes must be integers";
    non_const_array_size() = "E0222", Sanity, "array sizes must be compile-time constants";
    property_must_be_constant() = "E0223", Sanity, "annotation values must be compile-time constants";
    illegal_property_type() = "E0224", Sanity, "annotation values must be primitives or strings";
    wrong_num_args_for_aggregate(ty: &str) = "E0225", Sanity, "wrong number of values to initialise a '{ty}'";
    negative_loop_count() = "E0226", Sanity, "a loop count must be greater than zero";
    unused_expression() = "E0227", Sanity, "this expression is unused";

    // ---- resolution ----
    unresolved_symbol(name: &str) = "E0300", Resolution, "cannot find symbol '{name}'";
    ambiguous_symbol(name: &str) = "E0301", Resolution, "multiple matches for symbol '{name}'";
    unknown_member_in_struct(member: &str, ty: &str) = "E0302", Resolution, "the struct '{ty}' has no member '{member}'";
    invalid_dot_arguments() = "E0303", Resolution, "illegal operands for the dot operator";
    no_such_operation_on_endpoint() = "E0304", Resolution, "this operation is not supported on an endpoint";
    no_such_operation_on_processor() = "E0305", Resolution, "this operation is not supported on a processor";
    cannot_take_size_of_type() = "E0306", Resolution, "cannot take the size of this type";
    no_match_for_function_call(call: &str) = "E0307", Resolution, "no suitable override found for function call: {call}";
    ambiguous_function_call(call: &str) = "E0308", Resolution, "ambiguous function call: {call}";
    no_function_with_number_of_args(name: &str, num: usize) = "E0309", Resolution, "no function '{name}' takes {num} arguments";
    unknown_function(name: &str) = "E0310", Resolution, "unknown function '{name}'";
    unknown_function_with_suggestion(name: &str, nearest: &str) = "E0311", Resolution, "unknown function '{name}' (did you mean '{nearest}'?)";
    cannot_use_processor_as_function() = "E0312", Resolution, "a processor cannot be called as a function";
    cannot_use_input_as_function() = "E0313", Resolution, "an input endpoint cannot be called as a function";
    cannot_use_output_as_function() = "E0314", Resolution, "an output endpoint cannot be called as a function";
    cannot_call_run_function() = "E0315", Resolution, "the run() function cannot be called directly";
    advance_is_not_a_method() = "E0316", Resolution, "advance() cannot be used as a method";
    advance_has_no_args() = "E0317", Resolution, "advance() takes no arguments";
    advance_must_be_called_in_run() = "E0318", Resolution, "advance() can only be called inside the run() function";
    expected_1_or_2_args() = "E0319", Resolution, "expected 1 or 2 arguments";
    static_assert_failed(message: &str) = "E0320", Resolution, "{message}";
    expected_string_literal_as_arg2() = "E0321", Resolution, "the second argument to static_assert must be a string literal";
    at_method_takes_1_arg() = "E0322", Resolution, "the at() function expects an array and an index";
    wrong_type_for_at_method() = "E0323", Resolution, "the at() function requires an array or vector";
    cannot_resolve_source_of_at_method() = "E0324", Resolution, "cannot resolve the target of the at() function";
    failed_to_resolve_generic(call: &str) = "E0325", Resolution, "failed to resolve generic function call {call}";
    generic_argument_conflict(name: &str) = "E0326", Resolution, "could not find a value for '{name}' that satisfies all argument types";
    generic_unresolved(name: &str) = "E0327", Resolution, "failed to resolve generic parameter '{name}'";
    initialiser_refers_to_target(name: &str) = "E0328", Resolution, "the initialiser of '{name}' refers to the variable it is initialising";
    cannot_resolve_function_or_cast() = "E0329", Resolution, "cannot resolve function or cast";
    cannot_resolve_bracketed_exp() = "E0330", Resolution, "cannot resolve this bracketed expression";
    cannot_resolve_vector_size() = "E0331", Resolution, "cannot resolve vector size";
    array_size_must_be_constant() = "E0332", Resolution, "array sizes must be compile-time constants";
    wrap_or_clamp_size_must_be_constant() = "E0333", Resolution, "wrap and clamp sizes must be compile-time constants";
    cannot_resolve_source_type() = "E0334", Resolution, "cannot resolve the argument of this type meta-function";
    ratio_must_be_constant() = "E0335", Resolution, "clock ratios must be compile-time constants";
    ratio_must_be_integer() = "E0336", Resolution, "clock ratios must be integers";
    ratio_out_of_range() = "E0337", Resolution, "clock ratios must be a power of two between 1 and 512";
    cannot_resolve_specialisation_value() = "E0338", Resolution, "cannot resolve this specialisation argument";
    unknown_processor_instance(name: &str) = "E0339", Resolution, "unknown processor instance '{name}'";
    unknown_endpoint_in_connection(name: &str) = "E0340", Resolution, "unknown endpoint '{name}' in connection";

    // ---- type errors ----
    cannot_cast_between(from: &str, to: &str) = "E0400", Type, "cannot cast from '{from}' to '{to}'";
    cannot_implicitly_cast_value(value: &str, from: &str, to: &str) = "E0401", Type, "cannot implicitly convert {value} ('{from}') to '{to}'";
    cannot_implicitly_cast_type(from: &str, to: &str) = "E0402", Type, "cannot implicitly convert '{from}' to '{to}'";
    ambiguous_cast_between(from: &str, to: &str) = "E0403", Type, "ambiguous implicit conversion from '{from}' to {to}";
    cannot_cast_list_to_type(ty: &str) = "E0404", Type, "cannot create a '{ty}' from an initialiser list";
    illegal_types_for_binary_operator(op: &str, lhs: &str, rhs: &str) = "E0405", Type, "illegal types for binary operator '{op}' ('{lhs}' and '{rhs}')";
    wrong_type_for_unary() = "E0406", Type, "illegal type for unary operator";
    ternary_cannot_be_void() = "E0407", Type, "the branches of a ternary cannot be void";
    ternary_types_must_match(t: &str, f: &str) = "E0408", Type, "ternary branch types do not match ('{t}' and '{f}')";
    ternary_cannot_be_statement() = "E0409", Type, "a ternary operator cannot be used as a statement";
    expected_array_or_vector() = "E0410", Type, "expected an array or vector";
    expected_array_or_vector_for_bracket_op() = "E0411", Type, "the '[]' operator requires an array or vector";
    expected_struct_for_dot_operator() = "E0412", Type, "the dot operator requires a struct";
    wrong_type_for_array_element() = "E0413", Type, "illegal type for an array element";
    wrong_type_for_vector_element() = "E0414", Type, "vector elements must be primitive";
    index_out_of_range() = "E0415", Type, "index out of range";
    non_integer_array_index() = "E0416", Type, "array indexes must be integers";
    operator_needs_assignable_target(op: &str) = "E0417", Type, "the '{op}' operator requires an assignable target";
    illegal_type_for_operator(op: &str) = "E0418", Type, "illegal type for the '{op}' operator";
    cannot_pass_const_as_non_const_ref() = "E0419", Type, "cannot pass a const value as a non-const reference";
    expression_not_assignable() = "E0420", Type, "this expression cannot be assigned to";
    cannot_read_from_output() = "E0421", Type, "cannot read from an output endpoint";
    cannot_use_processor_as_output() = "E0422", Type, "cannot use a processor as a value";
    cannot_use_processor_as_type() = "E0423", Type, "cannot use a processor as a type";
    divide_by_zero() = "E0424", Type, "division by zero";
    modulo_zero() = "E0425", Type, "modulo zero";
    wrong_type_for_initialise_list() = "E0426", Type, "this type cannot be initialised from a list";
    cannot_write_type_to_endpoint(value: &str, target: &str) = "E0427", Type, "cannot write a value of type '{value}' to an endpoint that accepts {target}";
    target_must_be_output() = "E0428", Type, "the target of '<<' must be an output endpoint";
    cannot_use_bracket_on_endpoint() = "E0429", Type, "the '[]' operator cannot be applied to this endpoint";
    cannot_use_brackets_on_non_array_endpoint() = "E0430", Type, "the '[]' operator can only be applied to array endpoints";
    void_function_cannot_return_value() = "E0431", Type, "a void function cannot return a value";
    not_all_control_paths_return(name: &str) = "E0432", Type, "not all control paths in the function '{name}' return a value";
    expected_expression_of_type(ty: &str) = "E0433", Type, "expected an expression of type '{ty}'";
    cannot_reference_other_processor_var() = "E0434", Type, "cannot reference a mutable variable belonging to another processor";
    void_variable() = "E0435", Type, "variables cannot be void";
    event_endpoint_cannot_be_read() = "E0436", Type, "event endpoints cannot be read as values";

    // ---- overflow / limits ----
    illegal_vector_size() = "E0500", Overflow, "vector sizes must be between 1 and 256";
    illegal_bounded_int_size() = "E0501", Overflow, "wrap and clamp sizes must be between 1 and 2147483647";
    type_too_big(size: &str, maximum: &str) = "E0502", Overflow, "the type size {size} exceeds the maximum of {maximum}";
    illegal_size() = "E0503", Overflow, "illegal size";

    // ---- not yet implemented ----
    not_yet_implemented(what: &str) = "E0600", NotYetImplemented, "language feature not yet implemented: {what}";

    // ---- HEART generation and linking ----
    no_main_processor(name: &str) = "E0700", Heart, "cannot find a main processor called '{name}'";
    no_processor_to_run() = "E0701", Heart, "the program contains no processor to run";
    heart_syntax_error(message: &str) = "E0702", Heart, "HEART syntax error: {message}";
    heart_unknown_version(version: &str) = "E0703", Heart, "unsupported HEART version: {version}";
}

warnings! {
    comparison_always_true() = "W0200", Sanity, "this comparison is always true";
    comparison_always_false() = "W0201", Sanity, "this comparison is always false";
    index_has_runtime_overhead() = "W0202", Sanity, "this index will be wrapped at runtime; use at() or wrap<> to avoid the check";
}

/// An internal compiler error: a broken invariant, never a user mistake.
pub fn internal_compiler_error(location: SourceRef, detail: &str) -> Diagnostic {
    Diagnostic::error(
        ErrorCode("E0900"),
        Category::Internal,
        location,
        format!("internal compiler error: {detail}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;

    #[test]
    fn message_interpolation() {
        let d = unresolved_symbol(SourceRef::NONE, "foo::bar");
        assert_eq!(d.message, "cannot find symbol 'foo::bar'");
        assert_eq!(d.code.as_str(), "E0300");
        assert_eq!(d.severity, Severity::Error);
    }

    #[test]
    fn internal_errors_are_distinguished() {
        let d = internal_compiler_error(SourceRef::NONE, "block without terminator");
        assert!(d.is_internal());
        assert!(d.code.is_internal());
        let u = unresolved_symbol(SourceRef::NONE, "x");
        assert!(!u.is_internal());
    }

    #[test]
    fn warnings_are_not_errors() {
        let w = comparison_always_true(SourceRef::NONE);
        assert_eq!(w.severity, Severity::Warning);
    }
}
