//! Per-evaluation state.
//!
//! An [`EvaluationContext`] is created for one expression evaluation and
//! discarded afterwards. It holds the source tree, caller-supplied constant
//! bindings, the warning and error sinks, reference-resolution policy, the
//! pluggable providers and a small result cache for expensive functions.

use std::collections::HashMap;
use std::sync::Arc;

use atrius_fhir_model::{Element, PrecisionDate, PrecisionDateTime, PrecisionTime};
use atrius_fhirpath_support::{Collection, EvaluationError, IntoCollection, Issue, Node};
use chrono::{DateTime, FixedOffset, Local};
use once_cell::unsync::OnceCell;
use parking_lot::Mutex;
use tracing::debug;

use crate::registry::{FunctionRegistry, default_registry};
use crate::resolve_function::ReferenceResolver;
use crate::terminology::TerminologyProvider;

/// Shared sink for `trace()` output.
pub type TraceOutputs = Arc<Mutex<Vec<(String, Collection)>>>;

/// Upper bound on cached function results per context.
const RESULT_CACHE_CAPACITY: usize = 512;

/// Function name and the locations of the input nodes. Nodes without a
/// location key on their debug form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    function: String,
    input: Vec<String>,
}

impl CacheKey {
    fn new(function: &str, input: &Collection) -> Self {
        Self {
            function: function.to_string(),
            input: input
                .iter()
                .map(|node| match node.path() {
                    Some(path) => path.to_string(),
                    None => format!("{:?}", node),
                })
                .collect(),
        }
    }
}

/// Detached resources may share a location with the root, so entries
/// under one key still compare the full input.
struct CacheEntry {
    input: Collection,
    arguments: Vec<Collection>,
    result: Collection,
}

pub struct EvaluationContext {
    tree: Option<Arc<Element>>,
    context_node: Option<Node>,
    index: OnceCell<HashMap<String, Node>>,
    constants: HashMap<String, Collection>,
    warnings: Vec<Issue>,
    errors: Vec<Issue>,
    resolve_relative_references: bool,
    service_base_url: Option<String>,
    reference_resolver: Option<Arc<dyn ReferenceResolver>>,
    terminology: Option<Arc<dyn TerminologyProvider>>,
    registry: Arc<FunctionRegistry>,
    cache: HashMap<CacheKey, Vec<CacheEntry>>,
    cached: usize,
    trace_outputs: TraceOutputs,
    now: DateTime<FixedOffset>,
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationContext {
    /// A context with no source tree; only literals and constants are available.
    pub fn new() -> Self {
        Self {
            tree: None,
            context_node: None,
            index: OnceCell::new(),
            constants: HashMap::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            resolve_relative_references: false,
            service_base_url: None,
            reference_resolver: None,
            terminology: None,
            registry: default_registry(),
            cache: HashMap::new(),
            cached: 0,
            trace_outputs: Arc::new(Mutex::new(Vec::new())),
            now: Local::now().fixed_offset(),
        }
    }

    /// Evaluates against the root of `resource`.
    pub fn from_resource(resource: Arc<Element>) -> Self {
        let mut context = Self::new();
        context.context_node = Some(Node::root(resource.clone()));
        context.tree = Some(resource);
        context
    }

    /// Evaluates against the node at `path` inside `root`, e.g.
    /// `Patient.contact[0]`. Fails when the path names no node.
    pub fn from_element(root: Arc<Element>, path: &str) -> Result<Self, EvaluationError> {
        let mut context = Self::from_resource(root);
        let node = context.node_at(path).ok_or_else(|| {
            EvaluationError::InvalidArgument(format!("No node at path '{}'", path))
        })?;
        context.context_node = Some(node);
        Ok(context)
    }

    pub fn with_constant(mut self, name: &str, value: impl IntoCollection) -> Self {
        self.set_constant(name, value);
        self
    }

    pub fn set_constant(&mut self, name: &str, value: impl IntoCollection) {
        self.constants
            .insert(name.trim_start_matches('%').to_string(), value.to_collection());
    }

    pub fn with_terminology(mut self, provider: Arc<dyn TerminologyProvider>) -> Self {
        self.terminology = Some(provider);
        self
    }

    pub fn with_reference_resolver(mut self, resolver: Arc<dyn ReferenceResolver>) -> Self {
        self.reference_resolver = Some(resolver);
        self
    }

    pub fn with_service_base_url(mut self, url: impl Into<String>) -> Self {
        self.service_base_url = Some(url.into());
        self
    }

    pub fn with_relative_references(mut self, enabled: bool) -> Self {
        self.resolve_relative_references = enabled;
        self
    }

    pub fn with_registry(mut self, registry: Arc<FunctionRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_trace_outputs(mut self, outputs: TraceOutputs) -> Self {
        self.trace_outputs = outputs;
        self
    }

    /// Fixes the clock used by `now()`, `today()` and `timeOfDay()`.
    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = now;
        self
    }

    pub fn tree(&self) -> Option<&Arc<Element>> {
        self.tree.as_ref()
    }

    /// The node the expression is evaluated on.
    pub fn context_node(&self) -> Option<&Node> {
        self.context_node.as_ref()
    }

    pub fn registry(&self) -> &Arc<FunctionRegistry> {
        &self.registry
    }

    pub fn terminology(&self) -> Option<&Arc<dyn TerminologyProvider>> {
        self.terminology.as_ref()
    }

    pub fn reference_resolver(&self) -> Option<&Arc<dyn ReferenceResolver>> {
        self.reference_resolver.as_ref()
    }

    pub fn resolve_relative_references(&self) -> bool {
        self.resolve_relative_references
    }

    pub fn service_base_url(&self) -> Option<&str> {
        self.service_base_url.as_deref()
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.now
    }

    fn index(&self) -> &HashMap<String, Node> {
        self.index.get_or_init(|| {
            let mut index = HashMap::new();
            if let Some(tree) = &self.tree {
                let root = Node::root(tree.clone());
                for node in std::iter::once(root.clone()).chain(root.descendants()) {
                    if let Some(path) = node.path() {
                        index.insert(path.to_string(), node.clone());
                    }
                }
            }
            index
        })
    }

    /// The node of the source tree at `path`.
    pub fn node_at(&self, path: &str) -> Option<Node> {
        self.index().get(path).cloned()
    }

    /// The node that holds `node` as a child.
    pub fn parent(&self, node: &Node) -> Option<Node> {
        parent_path(node.path()?).and_then(|p| self.node_at(p))
    }

    /// First child named `name` of the parent of `node`; used to pick up the
    /// `system` and `version` that accompany a bare code.
    pub fn sibling(&self, node: &Node, name: &str) -> Option<Node> {
        self.parent(node)?.members(name).into_iter().next()
    }

    /// The nearest resource at or above `node`.
    pub fn resource_for(&self, node: &Node) -> Option<Node> {
        if node.is_resource() {
            return Some(node.clone());
        }
        let mut path = node.path()?;
        while let Some(parent) = parent_path(path) {
            match self.node_at(parent) {
                Some(candidate) if candidate.is_resource() => return Some(candidate),
                _ => path = parent,
            }
        }
        None
    }

    /// Like [`resource_for`](Self::resource_for), but a contained resource
    /// yields its container.
    pub fn root_resource_for(&self, node: &Node) -> Option<Node> {
        let resource = self.resource_for(node)?;
        let is_contained = resource
            .path()
            .and_then(|p| p.rsplit('.').next())
            .is_some_and(|segment| segment.starts_with("contained"));
        if !is_contained {
            return Some(resource);
        }
        let container = resource.path().and_then(parent_path).and_then(|p| self.node_at(p))?;
        self.resource_for(&container)
    }

    /// Value of `%name`: caller bindings first, then the built-in constants.
    pub fn resolve_constant(&self, name: &str) -> Result<Collection, EvaluationError> {
        if let Some(bound) = self.constants.get(name) {
            return Ok(bound.clone());
        }
        let string = |s: String| Collection::singleton(Node::string(s));
        let context_node = || self.context_node.clone();
        let value = match name {
            "ucum" => string("http://unitsofmeasure.org".to_string()),
            "loinc" => string("http://loinc.org".to_string()),
            "sct" => string("http://snomed.info/sct".to_string()),
            "terminologies" => Collection::singleton(Node::TerminologyService),
            "context" => context_node().to_collection(),
            "resource" => context_node()
                .and_then(|n| self.resource_for(&n))
                .to_collection(),
            "rootResource" => context_node()
                .and_then(|n| self.root_resource_for(&n))
                .to_collection(),
            "now" => PrecisionDateTime::from_fixed_offset(&self.now).to_collection(),
            "today" => PrecisionDate::from_naive_date(self.now.date_naive()).to_collection(),
            "timeOfDay" => PrecisionTime::from_naive_time(self.now.time()).to_collection(),
            _ => {
                if let Some(rest) = name.strip_prefix("ext-") {
                    string(format!("http://hl7.org/fhir/StructureDefinition/{}", rest))
                } else if let Some(rest) = name.strip_prefix("vs-") {
                    string(format!("http://hl7.org/fhir/ValueSet/{}", rest))
                } else {
                    return Err(EvaluationError::UndefinedVariable(format!("%{}", name)));
                }
            }
        };
        Ok(value)
    }

    /// Appends a soft finding to the warning or error sink.
    pub fn add_issue(&mut self, issue: Issue) {
        debug!(severity = ?issue.severity, code = issue.code.code(), "{}", issue.diagnostics);
        if issue.is_error() {
            self.errors.push(issue);
        } else {
            self.warnings.push(issue);
        }
    }

    pub fn warnings(&self) -> &[Issue] {
        &self.warnings
    }

    pub fn errors(&self) -> &[Issue] {
        &self.errors
    }

    /// Drains both sinks, errors first.
    pub fn take_issues(&mut self) -> Vec<Issue> {
        let mut issues = std::mem::take(&mut self.errors);
        issues.append(&mut self.warnings);
        issues
    }

    pub fn cached_result(
        &self,
        function: &str,
        input: &Collection,
        arguments: &[Collection],
    ) -> Option<Collection> {
        self.cache
            .get(&CacheKey::new(function, input))?
            .iter()
            .find(|e| &e.input == input && e.arguments == arguments)
            .map(|e| e.result.clone())
    }

    pub fn cache_result(
        &mut self,
        function: &str,
        input: &Collection,
        arguments: &[Collection],
        result: &Collection,
    ) {
        if self.cached >= RESULT_CACHE_CAPACITY {
            return;
        }
        self.cache
            .entry(CacheKey::new(function, input))
            .or_default()
            .push(CacheEntry {
                input: input.clone(),
                arguments: arguments.to_vec(),
                result: result.clone(),
            });
        self.cached += 1;
    }

    pub fn record_trace(&self, name: &str, collection: &Collection) {
        self.trace_outputs
            .lock()
            .push((name.to_string(), collection.clone()));
    }

    pub fn trace_outputs(&self) -> Vec<(String, Collection)> {
        self.trace_outputs.lock().clone()
    }
}

/// `Patient.name[0].given[1]` -> `Patient.name[0]`
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind('.').map(|i| &path[..i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhirpath_support::SystemValue;

    fn patient_with_contained() -> Arc<Element> {
        Arc::new(
            Element::new("Patient")
                .with("contained", Element::new("Organization").with("name", Element::string("Acme")))
                .with(
                    "name",
                    Element::new("HumanName").with("family", Element::string("Chalmers")),
                ),
        )
    }

    #[test]
    fn resource_lookups_walk_up_the_path() {
        let context = EvaluationContext::from_resource(patient_with_contained());
        let org_name = context.node_at("Patient.contained[0].name").unwrap();
        let resource = context.resource_for(&org_name).unwrap();
        assert_eq!(resource.path(), Some("Patient.contained[0]"));
        let root = context.root_resource_for(&org_name).unwrap();
        assert_eq!(root.path(), Some("Patient"));
    }

    #[test]
    fn constants() {
        let context = EvaluationContext::from_element(patient_with_contained(), "Patient.contained[0]")
            .unwrap()
            .with_constant("threshold", 5_i64);
        assert_eq!(
            context.resolve_constant("threshold").unwrap(),
            Collection::singleton(Node::integer(5))
        );
        assert_eq!(
            context.resolve_constant("ext-patient-birthTime").unwrap().nodes()[0].system_value(),
            Some(SystemValue::String(
                "http://hl7.org/fhir/StructureDefinition/patient-birthTime".into()
            ))
        );
        let resource = context.resolve_constant("resource").unwrap();
        assert_eq!(resource.nodes()[0].path(), Some("Patient.contained[0]"));
        let root = context.resolve_constant("rootResource").unwrap();
        assert_eq!(root.nodes()[0].path(), Some("Patient"));
        assert!(matches!(
            context.resolve_constant("missing"),
            Err(EvaluationError::UndefinedVariable(_))
        ));
    }

    #[test]
    fn result_cache_is_keyed_and_bounded() {
        let mut context = EvaluationContext::from_resource(patient_with_contained());
        let family = Collection::singleton(context.node_at("Patient.name[0].family").unwrap());
        let name = Collection::singleton(context.node_at("Patient.name[0]").unwrap());
        let arguments = [Collection::singleton(Node::string("x"))];

        context.cache_result("memberOf", &family, &arguments, &Collection::boolean(true));
        assert_eq!(
            context.cached_result("memberOf", &family, &arguments),
            Some(Collection::boolean(true))
        );
        assert_eq!(context.cached_result("memberOf", &name, &arguments), None);
        assert_eq!(context.cached_result("resolve", &family, &arguments), None);
        assert_eq!(context.cached_result("memberOf", &family, &[]), None);

        for i in 0..RESULT_CACHE_CAPACITY as i64 {
            let input = Collection::singleton(Node::integer(i));
            context.cache_result("resolve", &input, &[], &Collection::empty());
        }
        assert_eq!(context.cached, RESULT_CACHE_CAPACITY);
        let last = Collection::singleton(Node::integer(RESULT_CACHE_CAPACITY as i64));
        context.cache_result("resolve", &last, &[], &Collection::empty());
        assert_eq!(context.cached_result("resolve", &last, &[]), None);
        assert_eq!(
            context.cached_result("resolve", &Collection::singleton(Node::integer(3)), &[]),
            Some(Collection::empty())
        );
    }

    #[test]
    fn siblings() {
        let context = EvaluationContext::from_resource(patient_with_contained());
        let family = context.node_at("Patient.name[0].family").unwrap();
        assert!(context.sibling(&family, "given").is_none());
        assert_eq!(context.sibling(&family, "family"), Some(family));
    }
}
