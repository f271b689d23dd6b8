//! Atrius FHIRPath evaluation engine.
//!
//! [`FhirPathEngine`] is the entry point for applications: it owns an
//! [`EngineConfig`], builds an [`EvaluationContext`] per call and keeps
//! recently parsed expressions in a bounded cache.
//!
//! ## What this engine does
//! - Parses a FHIRPath expression (cached by source text).
//! - Evaluates it against a resource, or a caller-built context.
//! - Optionally records a diagnostics tree explaining the result.
//! - Coerces invariant results to a singleton boolean (`eval_bool`).
//!
//! The engine is cheap to clone and can be shared between threads; each
//! evaluation gets its own context.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use atrius_fhir_model::Element;
use atrius_fhirpath_support::{Collection, EvaluationError, Issue, SystemValue};
use parking_lot::Mutex;
use tracing::debug;

use crate::context::EvaluationContext;
use crate::diagnostics::{DiagnosticsBuilder, DiagnosticsTree};
use crate::error::FhirPathResult;
use crate::evaluator::{evaluate, evaluate_with_listener};
use crate::parser::{ParsedExpression, parse};
use crate::registry::{FunctionRegistry, default_registry};
use crate::resolve_function::ReferenceResolver;
use crate::terminology::TerminologyProvider;

const DEFAULT_PARSE_CACHE_CAPACITY: usize = 256;

/// Configuration for [`FhirPathEngine`].
#[derive(Clone)]
pub struct EngineConfig {
    pub terminology: Option<Arc<dyn TerminologyProvider>>,
    pub registry: Arc<FunctionRegistry>,
    pub service_base_url: Option<String>,
    pub resolve_relative_references: bool,
    pub reference_resolver: Option<Arc<dyn ReferenceResolver>>,
    /// Maximum number of parsed expressions kept; 0 disables the cache.
    pub parse_cache_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            terminology: None,
            registry: default_registry(),
            service_base_url: None,
            resolve_relative_references: false,
            reference_resolver: None,
            parse_cache_capacity: DEFAULT_PARSE_CACHE_CAPACITY,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_terminology(mut self, provider: Arc<dyn TerminologyProvider>) -> Self {
        self.terminology = Some(provider);
        self
    }

    pub fn with_registry(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_service_base_url(mut self, url: impl Into<String>) -> Self {
        self.service_base_url = Some(url.into());
        self
    }

    /// Enables resolving relative references through `resolver`.
    pub fn with_reference_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.reference_resolver = Some(resolver);
        self.resolve_relative_references = true;
        self
    }

    pub fn with_relative_references(mut self, enabled: bool) -> Self {
        self.resolve_relative_references = enabled;
        self
    }

    pub fn with_parse_cache_capacity(mut self, capacity: usize) -> Self {
        self.parse_cache_capacity = capacity;
        self
    }
}

/// Parsed expressions by source text, oldest evicted first.
#[derive(Default)]
struct ParseCache {
    entries: HashMap<String, Arc<ParsedExpression>>,
    order: VecDeque<String>,
}

impl ParseCache {
    fn get(&self, expression: &str) -> Option<Arc<ParsedExpression>> {
        self.entries.get(expression).cloned()
    }

    fn insert(&mut self, expression: &str, parsed: Arc<ParsedExpression>, capacity: usize) {
        if capacity == 0 || self.entries.contains_key(expression) {
            return;
        }
        while self.order.len() >= capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        self.order.push_back(expression.to_string());
        self.entries.insert(expression.to_string(), parsed);
    }
}

/// Result of [`FhirPathEngine::evaluate_with_diagnostics`].
///
/// The tree is available even when evaluation failed.
#[derive(Debug)]
pub struct DiagnosedEvaluation {
    pub result: Result<Collection, EvaluationError>,
    pub diagnostics: DiagnosticsTree,
    pub issues: Vec<Issue>,
}

/// Concrete FHIRPath engine used by Atrius.
#[derive(Clone, Default)]
pub struct FhirPathEngine {
    config: EngineConfig,
    cache: Arc<Mutex<ParseCache>>,
}

impl FhirPathEngine {
    /// Create a new engine with default configuration (built-in functions,
    /// no terminology provider).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            cache: Arc::default(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Parses `expression`, reusing a cached parse when available.
    pub fn parse(&self, expression: &str) -> FhirPathResult<Arc<ParsedExpression>> {
        if let Some(parsed) = self.cache.lock().get(expression) {
            return Ok(parsed);
        }
        let parsed = Arc::new(parse(expression)?);
        self.cache
            .lock()
            .insert(expression, parsed.clone(), self.config.parse_cache_capacity);
        Ok(parsed)
    }

    pub fn cached_expressions(&self) -> usize {
        self.cache.lock().entries.len()
    }

    /// A context over `resource` carrying this engine's configuration.
    pub fn context_for(&self, resource: Arc<Element>) -> EvaluationContext {
        self.configure(EvaluationContext::from_resource(resource))
    }

    /// Applies this engine's configuration to a caller-built context.
    pub fn configure(&self, context: EvaluationContext) -> EvaluationContext {
        let mut context = context
            .with_registry(self.config.registry.clone())
            .with_relative_references(self.config.resolve_relative_references);
        if let Some(provider) = &self.config.terminology {
            context = context.with_terminology(provider.clone());
        }
        if let Some(resolver) = &self.config.reference_resolver {
            context = context.with_reference_resolver(resolver.clone());
        }
        if let Some(url) = &self.config.service_base_url {
            context = context.with_service_base_url(url.clone());
        }
        context
    }

    /// Evaluates `expression` against the root of `resource`.
    pub fn evaluate(&self, expression: &str, resource: &Arc<Element>) -> FhirPathResult<Collection> {
        let mut context = self.context_for(resource.clone());
        self.evaluate_with_context(expression, &mut context)
    }

    /// Evaluates with a caller-owned context, so that warnings, errors and
    /// trace output can be read afterwards.
    pub fn evaluate_with_context(
        &self,
        expression: &str,
        context: &mut EvaluationContext,
    ) -> FhirPathResult<Collection> {
        let parsed = self.parse(expression)?;
        debug!(expression, "engine evaluate");
        Ok(evaluate(&parsed, context)?)
    }

    /// Evaluates while recording every sub-expression.
    ///
    /// Only parse errors fail the call; evaluation errors are returned in
    /// [`DiagnosedEvaluation::result`] next to the partial tree.
    pub fn evaluate_with_diagnostics(
        &self,
        expression: &str,
        context: &mut EvaluationContext,
    ) -> FhirPathResult<DiagnosedEvaluation> {
        let parsed = self.parse(expression)?;
        let mut builder = DiagnosticsBuilder::new(&parsed);
        let result = evaluate_with_listener(&parsed, context, Some(&mut builder));
        Ok(DiagnosedEvaluation {
            result,
            diagnostics: builder.finish(),
            issues: context.take_issues(),
        })
    }

    /// Evaluates an invariant and coerces the result to a boolean.
    ///
    /// An empty result is false. Anything other than a single boolean is an
    /// error.
    pub fn eval_bool(&self, expression: &str, resource: &Arc<Element>) -> FhirPathResult<bool> {
        let result = self.evaluate(expression, resource)?;
        let value = match result.nodes() {
            [] => return Ok(false),
            [node] => node.system_value(),
            nodes => {
                return Err(EvaluationError::SingletonEvaluationError(format!(
                    "FHIR invariant '{}' must evaluate to a singleton boolean, got {} items",
                    expression,
                    nodes.len()
                ))
                .into());
            }
        };
        match value {
            Some(SystemValue::Boolean(b)) => Ok(b),
            _ => Err(EvaluationError::TypeError(format!(
                "FHIR invariant '{}' must evaluate to boolean, got {}",
                expression,
                result.nodes()[0].fhirpath_type()
            ))
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FhirPathError;
    use crate::terminology::InMemoryTerminologyProvider;

    fn patient() -> Arc<Element> {
        Arc::new(
            Element::new("Patient")
                .with("active", Element::boolean(true))
                .with("gender", Element::code("female")),
        )
    }

    #[test]
    fn evaluates_and_caches() {
        let engine = FhirPathEngine::new();
        let result = engine.evaluate("Patient.gender", &patient()).unwrap();
        assert_eq!(result.len(), 1);
        engine.evaluate("Patient.gender", &patient()).unwrap();
        assert_eq!(engine.cached_expressions(), 1);
    }

    #[test]
    fn cache_is_bounded() {
        let engine = FhirPathEngine::with_config(EngineConfig::new().with_parse_cache_capacity(2));
        for expression in ["1", "2", "3"] {
            engine.parse(expression).unwrap();
        }
        assert_eq!(engine.cached_expressions(), 2);

        let uncached = FhirPathEngine::with_config(EngineConfig::new().with_parse_cache_capacity(0));
        uncached.parse("1").unwrap();
        assert_eq!(uncached.cached_expressions(), 0);
    }

    #[test]
    fn invariants_coerce_to_boolean() {
        let engine = FhirPathEngine::new();
        assert!(engine.eval_bool("active", &patient()).unwrap());
        assert!(!engine.eval_bool("birthDate.exists()", &patient()).unwrap());
        assert!(!engine.eval_bool("deceased", &patient()).unwrap());
        assert!(matches!(
            engine.eval_bool("gender", &patient()),
            Err(FhirPathError::Evaluation(EvaluationError::TypeError(_)))
        ));
        assert!(matches!(engine.eval_bool("active and", &patient()), Err(FhirPathError::Parse { .. })));
    }

    #[test]
    fn diagnostics_survive_errors() {
        let engine = FhirPathEngine::new();
        let mut context = engine.context_for(patient());
        let diagnosed = engine
            .evaluate_with_diagnostics("(active | gender).not()", &mut context)
            .unwrap();
        assert!(diagnosed.result.is_err());
        assert!(diagnosed.diagnostics.root().is_some());
    }

    #[test]
    fn configured_terminology_reaches_functions() {
        let provider = InMemoryTerminologyProvider::new()
            .with_value_set("http://example.org/vs", [("http://hl7.org/fhir/administrative-gender", "female")]);
        let engine = FhirPathEngine::with_config(EngineConfig::new().with_terminology(Arc::new(provider)));
        assert!(engine
            .eval_bool("gender.memberOf('http://example.org/vs')", &patient())
            .unwrap());
    }
}
