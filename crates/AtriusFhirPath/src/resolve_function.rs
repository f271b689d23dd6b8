//! # FHIRPath resolve() Function
//!
//! Implements `resolve()`, which follows references to the resources they
//! point at.
//!
//! For each input that carries a reference (a `Reference` element, or a
//! string or uri holding a reference), exactly one node is produced:
//!
//! 1. `#id` resolves to the contained resource with that id; `#` alone to
//!    the container.
//! 2. Inside a Bundle, an entry whose `fullUrl` equals the reference, or
//!    whose resource has the referenced type and id, is used.
//! 3. Otherwise the reference is split into base, type, id and version. If
//!    relative references are enabled and the base is absent or equals the
//!    service base URL, the [`ReferenceResolver`] is asked for the target.
//! 4. When nothing is found a placeholder resource node of the referenced
//!    type is produced, so that `resolve() is Patient` still works. If no
//!    type can be determined the placeholder has type `UnknownResourceType`
//!    and an informational issue is recorded.

use std::sync::Arc;

use atrius_fhir_model::Element;
use atrius_fhirpath_support::{
    Collection, EvaluationError, FhirPathType, Issue, IssueSeverity, IssueType, Node,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::context::{EvaluationContext, parent_path};
use crate::registry::FunctionRegistry;

const STRUCTURE_DEFINITION_PREFIX: &str = "http://hl7.org/fhir/StructureDefinition/";

static REFERENCE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^((?:https?)://(?:[A-Za-z0-9\-\\.:%$]*/)+)?([A-Z][A-Za-z]+)/([A-Za-z0-9\-.]{1,64})(?:/_history/([A-Za-z0-9\-.]{1,64}))?$",
    )
    .unwrap()
});

/// Looks up resources that are not part of the evaluated tree.
///
/// Consulted for relative references (and absolute ones on the service base
/// URL) when relative-reference resolution is enabled on the context.
pub trait ReferenceResolver: Send + Sync {
    fn resolve(&self, resource_type: &str, id: &str, version: Option<&str>) -> Option<Arc<Element>>;
}

impl<F> ReferenceResolver for F
where
    F: Fn(&str, &str, Option<&str>) -> Option<Arc<Element>> + Send + Sync,
{
    fn resolve(&self, resource_type: &str, id: &str, version: Option<&str>) -> Option<Arc<Element>> {
        self(resource_type, id, version)
    }
}

/// A reference split by [`parse_reference`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub base: Option<String>,
    pub resource_type: String,
    pub id: String,
    pub version: Option<String>,
}

/// Splits `[base/]Type/id[/_history/version]`.
pub fn parse_reference(reference: &str) -> Option<ParsedReference> {
    let captures = REFERENCE_URL.captures(reference)?;
    Some(ParsedReference {
        base: captures
            .get(1)
            .map(|m| m.as_str().trim_end_matches('/').to_string()),
        resource_type: captures.get(2)?.as_str().to_string(),
        id: captures.get(3)?.as_str().to_string(),
        version: captures.get(4).map(|m| m.as_str().to_string()),
    })
}

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("resolve", 0, 0, resolve_function);
}

pub fn resolve_function(
    context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let mut out = Collection::empty();
    for node in input {
        if let Some((reference, declared_type)) = reference_of(node) {
            out.push(resolve_one(context, node, reference.as_deref(), declared_type.as_deref())?);
        }
    }
    Ok(out)
}

/// The reference string and declared target type carried by `node`, or
/// `None` when the node carries no reference at all.
fn reference_of(node: &Node) -> Option<(Option<String>, Option<String>)> {
    if let Some(element) = node.element() {
        if element.type_name() == "Reference" {
            let reference = element.child_str("reference").map(str::to_string);
            let declared = element
                .child_str("type")
                .map(|t| t.strip_prefix(STRUCTURE_DEFINITION_PREFIX).unwrap_or(t).to_string());
            return Some((reference, declared));
        }
    }
    let value = node.system_value()?;
    value.as_str().map(|s| (Some(s.to_string()), None))
}

fn resolve_one(
    context: &mut EvaluationContext,
    node: &Node,
    reference: Option<&str>,
    declared_type: Option<&str>,
) -> Result<Node, EvaluationError> {
    let Some(reference) = reference else {
        return Ok(placeholder(context, declared_type, "Reference has no reference value"));
    };

    if let Some(fragment) = reference.strip_prefix('#') {
        return Ok(resolve_contained(context, node, fragment)
            .unwrap_or_else(|| placeholder(context, declared_type, reference)));
    }

    let parsed = parse_reference(reference);
    if let (Some(parsed), Some(declared)) = (&parsed, declared_type) {
        if parsed.resource_type != declared {
            return Err(EvaluationError::InvalidArgument(format!(
                "Resource type found in reference URL: {} does not match reference type: {}",
                parsed.resource_type, declared
            )));
        }
    }

    if let Some(found) = resolve_in_bundle(context, node, reference, parsed.as_ref()) {
        return Ok(found);
    }

    let Some(parsed) = parsed else {
        return Ok(placeholder(context, declared_type, reference));
    };

    if context.resolve_relative_references() && is_local(context, parsed.base.as_deref()) {
        if let Some(resolver) = context.reference_resolver() {
            if let Some(resource) = resolver.resolve(&parsed.resource_type, &parsed.id, parsed.version.as_deref()) {
                debug!(reference, "resolved relative reference");
                return Ok(Node::detached_resource(resource));
            }
        }
    }

    Ok(placeholder(context, Some(&parsed.resource_type), reference))
}

fn is_local(context: &EvaluationContext, base: Option<&str>) -> bool {
    match (base, context.service_base_url()) {
        (None, _) => true,
        (Some(base), Some(service)) => base == service.trim_end_matches('/'),
        (Some(_), None) => false,
    }
}

fn resolve_contained(context: &EvaluationContext, node: &Node, id: &str) -> Option<Node> {
    let container = context.root_resource_for(node)?;
    if id.is_empty() {
        return Some(container);
    }
    container
        .members("contained")
        .into_iter()
        .find(|c| c.element().and_then(|e| e.id()) == Some(id))
}

fn resolve_in_bundle(
    context: &EvaluationContext,
    node: &Node,
    reference: &str,
    parsed: Option<&ParsedReference>,
) -> Option<Node> {
    let bundle = enclosing_bundle(context, node)?;
    for entry in bundle.members("entry") {
        let full_url = entry.element().and_then(|e| e.child_str("fullUrl"));
        let Some(resource) = entry.members("resource").into_iter().next() else {
            continue;
        };
        if full_url == Some(reference) {
            return Some(resource);
        }
        if let (Some(parsed), Some(element)) = (parsed, resource.element()) {
            if element.type_name() == parsed.resource_type && element.id() == Some(parsed.id.as_str()) {
                return Some(resource);
            }
        }
    }
    None
}

fn enclosing_bundle(context: &EvaluationContext, node: &Node) -> Option<Node> {
    let mut path = node.path()?;
    while let Some(parent) = parent_path(path) {
        if let Some(candidate) = context.node_at(parent) {
            if candidate.element().is_some_and(|e| e.type_name() == "Bundle") {
                return Some(candidate);
            }
        }
        path = parent;
    }
    None
}

fn placeholder(context: &mut EvaluationContext, resource_type: Option<&str>, reference: &str) -> Node {
    match resource_type.and_then(FhirPathType::fhir) {
        Some(resource_type) if resource_type.is_resource_type() => Node::placeholder_resource(resource_type),
        _ => {
            context.add_issue(Issue::new(
                IssueSeverity::Information,
                IssueType::Informational,
                format!("Resource type could not be inferred from reference: {}", reference),
            ));
            Node::placeholder_resource(FhirPathType::FHIR_UNKNOWN_RESOURCE_TYPE)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(value: &str) -> Element {
        Element::new("Reference").with("reference", Element::string(value))
    }

    fn resolve_at(context: &mut EvaluationContext, path: &str) -> Result<Collection, EvaluationError> {
        let node = context.node_at(path).unwrap();
        resolve_function(context, &Collection::singleton(node), &[])
    }

    #[test]
    fn parses_reference_urls() {
        let parsed = parse_reference("http://example.org/fhir/Patient/123/_history/2").unwrap();
        assert_eq!(parsed.base.as_deref(), Some("http://example.org/fhir"));
        assert_eq!(parsed.resource_type, "Patient");
        assert_eq!(parsed.id, "123");
        assert_eq!(parsed.version.as_deref(), Some("2"));
        assert!(parse_reference("urn:uuid:1234").is_none());

        let relative = parse_reference("Organization/org-1").unwrap();
        assert_eq!(relative.base, None);
        assert_eq!(relative.id, "org-1");
        assert!(parse_reference("organization/1").is_none());
    }

    #[test]
    fn contained_references() {
        let organization = Element::new("Organization").with("id", Element::string("org1"));
        let patient = Element::new("Patient")
            .with("contained", organization)
            .with("managingOrganization", reference("#org1"));
        let mut context = EvaluationContext::from_resource(Arc::new(patient));
        let result = resolve_at(&mut context, "Patient.managingOrganization").unwrap();
        assert_eq!(result.single().unwrap().path(), Some("Patient.contained[0]"));
    }

    #[test]
    fn bundle_entries_and_placeholders() {
        let bundle = Element::new("Bundle")
            .with(
                "entry",
                Element::new("Bundle.entry")
                    .with("fullUrl", Element::uri("http://example.org/fhir/Patient/1"))
                    .with(
                        "resource",
                        Element::new("Patient")
                            .with("id", Element::string("1"))
                            .with("managingOrganization", reference("Organization/9")),
                    ),
            )
            .with(
                "entry",
                Element::new("Bundle.entry").with(
                    "resource",
                    Element::new("Observation").with("subject", reference("Patient/1")),
                ),
            );
        let mut context = EvaluationContext::from_resource(Arc::new(bundle));

        let subject = resolve_at(&mut context, "Bundle.entry[1].resource.subject").unwrap();
        assert_eq!(subject.single().unwrap().path(), Some("Bundle.entry[0].resource"));

        let missing = resolve_at(&mut context, "Bundle.entry[0].resource.managingOrganization").unwrap();
        assert_eq!(missing.single().unwrap().fhirpath_type(), FhirPathType::fhir("Organization").unwrap());
        assert!(context.warnings().is_empty());
    }

    #[test]
    fn unknown_types_are_reported() {
        let patient = Element::new("Patient").with("managingOrganization", reference("urn:uuid:42"));
        let mut context = EvaluationContext::from_resource(Arc::new(patient));
        let result = resolve_at(&mut context, "Patient.managingOrganization").unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.single().unwrap().fhirpath_type(), FhirPathType::FHIR_UNKNOWN_RESOURCE_TYPE);
        assert_eq!(context.warnings().len(), 1);
        assert_eq!(context.warnings()[0].severity, IssueSeverity::Information);
    }

    #[test]
    fn declared_type_must_match() {
        let patient = Element::new("Patient").with(
            "managingOrganization",
            reference("Patient/1").with("type", Element::uri("Organization")),
        );
        let mut context = EvaluationContext::from_resource(Arc::new(patient));
        assert!(matches!(
            resolve_at(&mut context, "Patient.managingOrganization"),
            Err(EvaluationError::InvalidArgument(_))
        ));
    }

    #[test]
    fn relative_references_use_the_resolver() {
        let resolver = |resource_type: &str, id: &str, _: Option<&str>| {
            (resource_type == "Organization" && id == "9").then(|| {
                Arc::new(Element::new("Organization").with("id", Element::string("9")))
            })
        };
        let patient = Element::new("Patient").with("managingOrganization", reference("Organization/9"));
        let mut context = EvaluationContext::from_resource(Arc::new(patient))
            .with_relative_references(true)
            .with_reference_resolver(Arc::new(resolver));
        let result = resolve_at(&mut context, "Patient.managingOrganization").unwrap();
        let resolved = result.single().unwrap();
        assert!(resolved.element().is_some());
        assert_eq!(resolved.path(), None);
    }
}
