//! # FHIRPath Function Registry
//!
//! Name-keyed table of the functions that take eagerly evaluated arguments.
//! Functions whose arguments are expressions evaluated per item (`where`,
//! `select`, `all`, `exists`, `repeat`, `iif`, `trace` and the type
//! functions) are handled by the evaluator itself and are not registered.
//!
//! A registry is built once and then shared read-only behind an `Arc`; the
//! process-wide default is created lazily on first use.

use std::collections::HashMap;
use std::sync::Arc;

use atrius_fhirpath_support::{Collection, EvaluationError, SystemValue};
use once_cell::sync::Lazy;

use crate::context::EvaluationContext;

/// Name and accepted argument count of a function.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionDescriptor {
    pub name: String,
    pub min_arity: usize,
    pub max_arity: usize,
}

impl FunctionDescriptor {
    pub fn new(name: impl Into<String>, min_arity: usize, max_arity: usize) -> Self {
        Self {
            name: name.into(),
            min_arity,
            max_arity,
        }
    }

    pub fn accepts(&self, count: usize) -> bool {
        (self.min_arity..=self.max_arity).contains(&count)
    }
}

/// A function callable from expressions.
pub trait FhirPathFunction: Send + Sync {
    fn descriptor(&self) -> &FunctionDescriptor;

    /// Applies the function to `input` with already evaluated `arguments`.
    /// The argument count has been checked against the descriptor.
    fn apply(
        &self,
        context: &mut EvaluationContext,
        input: &Collection,
        arguments: &[Collection],
    ) -> Result<Collection, EvaluationError> {
        let _ = (context, input, arguments);
        Err(unsupported(self.descriptor()))
    }
}

pub type ApplyFn =
    fn(&mut EvaluationContext, &Collection, &[Collection]) -> Result<Collection, EvaluationError>;

/// A function backed by a plain `fn`; `apply: None` declares a function
/// that is known but not implemented.
pub struct BuiltinFunction {
    descriptor: FunctionDescriptor,
    apply: Option<ApplyFn>,
}

impl BuiltinFunction {
    pub fn new(name: &str, min_arity: usize, max_arity: usize, apply: ApplyFn) -> Self {
        Self {
            descriptor: FunctionDescriptor::new(name, min_arity, max_arity),
            apply: Some(apply),
        }
    }

    pub fn declared(name: &str, min_arity: usize, max_arity: usize) -> Self {
        Self {
            descriptor: FunctionDescriptor::new(name, min_arity, max_arity),
            apply: None,
        }
    }
}

impl FhirPathFunction for BuiltinFunction {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        context: &mut EvaluationContext,
        input: &Collection,
        arguments: &[Collection],
    ) -> Result<Collection, EvaluationError> {
        match self.apply {
            Some(apply) => apply(context, input, arguments),
            None => Err(unsupported(&self.descriptor)),
        }
    }
}

fn unsupported(descriptor: &FunctionDescriptor) -> EvaluationError {
    EvaluationError::UnsupportedFunction(format!(
        "Function '{}' is not supported",
        descriptor.name
    ))
}

#[derive(Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<dyn FhirPathFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::existence_functions::register(&mut registry);
        crate::subset_functions::register(&mut registry);
        crate::conversion_functions::register(&mut registry);
        crate::string_functions::register(&mut registry);
        crate::math_functions::register(&mut registry);
        crate::navigation_functions::register(&mut registry);
        crate::type_function::register(&mut registry);
        crate::boolean_functions::register(&mut registry);
        crate::utility_functions::register(&mut registry);
        crate::resolve_function::register(&mut registry);
        crate::terminology_functions::register(&mut registry);
        crate::profile_functions::register(&mut registry);
        registry
    }

    /// Adds or replaces a function under its descriptor name.
    pub fn register(&mut self, function: impl FhirPathFunction + 'static) {
        let name = function.descriptor().name.clone();
        self.functions.insert(name, Arc::new(function));
    }

    pub fn register_fn(&mut self, name: &str, min_arity: usize, max_arity: usize, apply: ApplyFn) {
        self.register(BuiltinFunction::new(name, min_arity, max_arity, apply));
    }

    pub fn declare(&mut self, name: &str, min_arity: usize, max_arity: usize) {
        self.register(BuiltinFunction::declared(name, min_arity, max_arity));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn lookup(&self, name: &str) -> Result<Arc<dyn FhirPathFunction>, EvaluationError> {
        self.functions
            .get(name)
            .cloned()
            .ok_or_else(|| EvaluationError::unknown_function(name))
    }

    /// Fails with `InvalidArity` unless `count` arguments are acceptable.
    pub fn check_arity(&self, name: &str, count: usize) -> Result<(), EvaluationError> {
        let function = self.lookup(name)?;
        if function.descriptor().accepts(count) {
            Ok(())
        } else {
            Err(EvaluationError::arity(name, count))
        }
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Looks up and applies `name`; the arity gate runs before the function.
pub fn invoke(
    registry: &FunctionRegistry,
    name: &str,
    context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let function = registry.lookup(name)?;
    if !function.descriptor().accepts(arguments.len()) {
        return Err(EvaluationError::arity(name, arguments.len()));
    }
    function.apply(context, input, arguments)
}

/// The value of a collection that must hold at most one primitive item.
pub(crate) fn singleton_value(
    function: &str,
    collection: &Collection,
) -> Result<Option<SystemValue>, EvaluationError> {
    match collection.optional_single()? {
        None => Ok(None),
        Some(node) => node.system_value().map(Some).ok_or_else(|| {
            EvaluationError::InvalidArgument(format!(
                "Function '{}' requires a primitive value",
                function
            ))
        }),
    }
}

pub(crate) fn string_value(
    function: &str,
    collection: &Collection,
) -> Result<Option<String>, EvaluationError> {
    match singleton_value(function, collection)? {
        None => Ok(None),
        Some(SystemValue::String(s)) => Ok(Some(s)),
        Some(other) => Err(EvaluationError::InvalidArgument(format!(
            "Function '{}' expects a string, found {}",
            function,
            other.fhirpath_type()
        ))),
    }
}

pub(crate) fn integer_value(
    function: &str,
    collection: &Collection,
) -> Result<Option<i64>, EvaluationError> {
    match singleton_value(function, collection)? {
        None => Ok(None),
        Some(SystemValue::Integer(i)) => Ok(Some(i)),
        Some(other) => Err(EvaluationError::InvalidArgument(format!(
            "Function '{}' expects an integer, found {}",
            function,
            other.fhirpath_type()
        ))),
    }
}

static DEFAULT_REGISTRY: Lazy<Arc<FunctionRegistry>> =
    Lazy::new(|| Arc::new(FunctionRegistry::with_builtins()));

pub fn default_registry() -> Arc<FunctionRegistry> {
    DEFAULT_REGISTRY.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhirpath_support::Node;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHead {
        descriptor: FunctionDescriptor,
        calls: Arc<AtomicUsize>,
    }

    impl FhirPathFunction for CountingHead {
        fn descriptor(&self) -> &FunctionDescriptor {
            &self.descriptor
        }

        fn apply(
            &self,
            _: &mut EvaluationContext,
            input: &Collection,
            _: &[Collection],
        ) -> Result<Collection, EvaluationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(input.iter().next().cloned().into_iter().collect())
        }
    }

    #[test]
    fn arity_is_checked_before_apply() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = FunctionRegistry::new();
        registry.register(CountingHead {
            descriptor: FunctionDescriptor::new("head", 0, 0),
            calls: calls.clone(),
        });
        let mut context = EvaluationContext::new();
        let input = Collection::from_nodes(vec![Node::integer(1), Node::integer(2)]);

        let err = invoke(&registry, "head", &mut context, &input, &[Collection::empty()]);
        assert!(matches!(err, Err(EvaluationError::InvalidArity(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let result = invoke(&registry, "head", &mut context, &input, &[]).unwrap();
        assert_eq!(result, Collection::singleton(Node::integer(1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn declared_functions_are_unsupported() {
        let mut registry = FunctionRegistry::new();
        registry.declare("conformsTo", 1, 1);
        let mut context = EvaluationContext::new();
        let err = invoke(
            &registry,
            "conformsTo",
            &mut context,
            &Collection::empty(),
            &[Collection::empty()],
        );
        assert!(matches!(err, Err(EvaluationError::UnsupportedFunction(_))));
        assert!(matches!(
            registry.lookup("nope"),
            Err(EvaluationError::UndefinedFunction(_))
        ));
    }

    #[test]
    fn builtins_are_registered() {
        let registry = default_registry();
        for name in ["count", "substring", "resolve", "memberOf", "conformsTo", "extension"] {
            assert!(registry.contains(name), "{} missing", name);
        }
    }
}
