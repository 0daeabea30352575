use thiserror::Error;

/// Runtime error taxonomy: name, type, value, and user kinds.
///
/// The `Display` string doubles as the value bound by `catch (e)`, so the
/// wording here is observable from scripts.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RuntimeError {
    // Name errors
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Unknown function '{name}'")]
    UndefinedFunction { name: String },
    #[error("Method '{method}' not found in class '{class}'")]
    MethodNotFound { method: String, class: String },
    #[error("Property '{property}' not found in object '{object}'")]
    PropertyNotFound { property: String, object: String },
    #[error("Class '{name}' not found")]
    ClassNotFound { name: String },
    #[error("Module '{module}' has no member '{name}'")]
    ModuleMemberNotFound { module: String, name: String },
    #[error("Module function '{module}.{name}' can only be called")]
    BareModuleFunction { module: String, name: String },
    #[error("'this' is not defined outside of method context")]
    ThisOutsideMethod,

    // Type errors
    #[error("Unsupported operand type for {op}: '{type_name}' (expected number)")]
    NonNumericOperand { op: String, type_name: String },
    #[error("Logical '{op}' requires boolean operands, got {type_name}")]
    NonBooleanOperand { op: String, type_name: String },
    #[error("Condition must be a boolean, got {type_name}")]
    NonBooleanCondition { type_name: String },
    #[error("Cannot compare {left} with {right}")]
    IncomparableTypes { left: String, right: String },
    #[error("Cannot index {type_name} value")]
    NotIndexable { type_name: String },
    #[error("Array index must be integer, got {type_name}")]
    NonIntegerIndex { type_name: String },
    #[error("Cannot set property on non-object value: {type_name}")]
    PropertyAssignmentOnNonObject { type_name: String },
    #[error("Cannot access property '{property}' on {type_name} value")]
    PropertyAccessOnNonObject { property: String, type_name: String },
    #[error("Cannot call method '{method}' on {type_name} value")]
    MethodCallOnNonObject { method: String, type_name: String },
    #[error("Cannot increment non-numeric value: {type_name}")]
    IncrementOnNonNumeric { type_name: String },
    #[error("{builtin}() requires {expected}, got {type_name}")]
    BuiltinTypeMismatch {
        builtin: String,
        expected: String,
        type_name: String,
    },
    #[error("Cannot convert {type_name} (value: {value}) to {target}")]
    ConversionFailed {
        type_name: String,
        value: String,
        target: String,
    },

    // Value errors
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Modulo by zero")]
    ModuloByZero,
    #[error("Array index {index} out of bounds (length: {len})")]
    IndexOutOfBounds { index: i64, len: usize },
    #[error("{builtin}() expected {expected} arguments, got {found}")]
    BuiltinArityMismatch {
        builtin: String,
        expected: String,
        found: usize,
    },
    #[error("Function '{name}' expected {expected} arguments, got {found}")]
    FunctionArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("range() step must not be zero")]
    ZeroRangeStep,
    #[error("{function}() domain error: {reason}")]
    MathDomain { function: String, reason: String },

    #[error("'break' outside of loop")]
    BreakOutsideLoop,
    #[error("'continue' outside of loop")]
    ContinueOutsideLoop,

    // Import errors
    #[error("Cannot import module '{module}': {reason}")]
    ImportFailed { module: String, reason: String },

    // I/O raised from builtins and stdlib modules
    #[error("End of input reached while waiting for input")]
    InputEof,
    #[error("{operation} failed for '{path}': {reason}")]
    IoFailed {
        operation: String,
        path: String,
        reason: String,
    },

    // User errors carry exactly the thrown message
    #[error("{message}")]
    User { message: String },
}
