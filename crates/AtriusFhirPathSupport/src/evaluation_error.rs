/// Error type for FHIRPath evaluation failures.
///
/// Each variant corresponds to one failure class of the evaluator. Errors are
/// raised at the point of detection and abort the sub-expression being
/// evaluated; soft problems (terminology misses, unresolved reference types)
/// are reported as [`Issue`](crate::issue::Issue)s instead.
///
/// ```rust
/// use atrius_fhirpath_support::EvaluationError;
///
/// let error = EvaluationError::arity("substring", 3);
/// assert_eq!(
///     error.to_string(),
///     "Invalid Arity: Unexpected number of arguments: 3 for function: 'substring'"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvaluationError {
    /// Operands of incompatible system types, e.g. comparing a string with a date.
    TypeError(String),
    /// An argument or input of the wrong kind or shape.
    InvalidArgument(String),
    /// `%name` with no binding in the evaluation context.
    UndefinedVariable(String),
    /// An operator applied to operands it does not support.
    InvalidOperation(String),
    /// A function called with fewer or more arguments than it accepts.
    InvalidArity(String),
    /// A function name that is neither built in nor registered.
    UndefinedFunction(String),
    /// An indexer whose index is not an integer.
    InvalidIndex(String),
    /// A regular expression that does not compile.
    InvalidRegex(String),
    /// A type name in `is`, `as` or `ofType` that names no known type.
    InvalidTypeSpecifier(String),
    /// A singleton was required but the collection held more than one item.
    ///
    /// Example: "Input collection has 3 items, but only 1 is allowed"
    SingletonEvaluationError(String),
    /// A function that is registered but has no implementation.
    UnsupportedFunction(String),
}

impl EvaluationError {
    pub fn arity(function: &str, count: usize) -> Self {
        EvaluationError::InvalidArity(format!(
            "Unexpected number of arguments: {} for function: '{}'",
            count, function
        ))
    }

    pub fn not_singleton(count: usize) -> Self {
        EvaluationError::SingletonEvaluationError(format!(
            "Input collection has {} items, but only 1 is allowed",
            count
        ))
    }

    pub fn unknown_function(name: &str) -> Self {
        EvaluationError::UndefinedFunction(format!("Function: '{}' not found", name))
    }
}

impl std::error::Error for EvaluationError {}

impl std::fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EvaluationError::TypeError(msg) => write!(f, "Type Error: {}", msg),
            EvaluationError::InvalidArgument(msg) => write!(f, "Invalid Argument: {}", msg),
            EvaluationError::UndefinedVariable(name) => write!(f, "Undefined Variable: {}", name),
            EvaluationError::InvalidOperation(msg) => write!(f, "Invalid Operation: {}", msg),
            EvaluationError::InvalidArity(msg) => write!(f, "Invalid Arity: {}", msg),
            EvaluationError::UndefinedFunction(msg) => write!(f, "Undefined Function: {}", msg),
            EvaluationError::InvalidIndex(msg) => write!(f, "Invalid Index: {}", msg),
            EvaluationError::InvalidRegex(msg) => write!(f, "Invalid Regex: {}", msg),
            EvaluationError::InvalidTypeSpecifier(msg) => {
                write!(f, "Invalid Type Specifier: {}", msg)
            }
            EvaluationError::SingletonEvaluationError(msg) => {
                write!(f, "Singleton Evaluation Error: {}", msg)
            }
            EvaluationError::UnsupportedFunction(msg) => write!(f, "Unsupported Function: {}", msg),
        }
    }
}
