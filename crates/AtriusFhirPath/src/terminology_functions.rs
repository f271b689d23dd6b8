//! # FHIRPath Terminology Functions
//!
//! Implements `memberOf()`, `subsumes()`, `subsumedBy()` and
//! `%terminologies.validateVS()` on top of the context's
//! [`TerminologyProvider`](crate::terminology::TerminologyProvider).
//!
//! A missing provider or an answer the provider cannot give never fails the
//! evaluation: a WARNING `not-supported` issue is recorded instead.

use std::sync::Arc;

use atrius_fhir_model::Element;
use atrius_fhir_model::parameters::ParametersBuilder;
use atrius_fhirpath_support::{Collection, EvaluationError, Issue, IssueSeverity, IssueType, Node};
use tracing::warn;

use crate::context::EvaluationContext;
use crate::registry::{FunctionRegistry, string_value};

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("memberOf", 1, 2, member_of_function);
    registry.register_fn("subsumes", 1, 1, |context, input, args| {
        subsumption("subsumes", context, input, &args[0], false)
    });
    registry.register_fn("subsumedBy", 1, 1, |context, input, args| {
        subsumption("subsumedBy", context, input, &args[0], true)
    });
    registry.register_fn("validateVS", 2, 2, validate_vs_function);
}

/// A code with the system and version it belongs to; empty strings when
/// absent.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Coded {
    system: String,
    version: Option<String>,
    code: String,
}

/// The codes carried by `node`: one for a code, string, uri, Coding or
/// Quantity, one per coding for a CodeableConcept.
fn codes_of(context: &EvaluationContext, node: &Node, function: &str) -> Result<Vec<Coded>, EvaluationError> {
    let coded = |element: &Element| {
        element.child_str("code").map(|code| Coded {
            system: element.child_str("system").unwrap_or_default().to_string(),
            version: element.child_str("version").map(str::to_string),
            code: code.to_string(),
        })
    };
    if let Some(element) = node.element() {
        let element: &Element = element;
        match element.type_name() {
            "Coding" | "Quantity" => return Ok(coded(element).into_iter().collect()),
            "CodeableConcept" => {
                return Ok(element.children("coding").iter().filter_map(|c| coded(c.as_ref())).collect());
            }
            _ => {}
        }
    }
    let Some(code) = node.system_value().and_then(|v| v.as_str().map(str::to_string)) else {
        return Err(EvaluationError::InvalidArgument(format!(
            "Function '{}' requires a coded value, found {}",
            function,
            node.fhirpath_type()
        )));
    };
    let sibling = |name: &str| {
        context
            .sibling(node, name)
            .and_then(|n| n.system_value())
            .and_then(|v| v.as_str().map(str::to_string))
    };
    Ok(vec![Coded {
        system: sibling("system").unwrap_or_default(),
        version: sibling("version"),
        code,
    }])
}

fn not_supported(context: &mut EvaluationContext, message: String) {
    warn!("{}", message);
    context.add_issue(Issue::new(IssueSeverity::Warning, IssueType::NotSupported, message));
}

/// Implements the FHIRPath `memberOf` function
///
/// Syntax: coded.memberOf(valueSet : String [, strength : String]) : Boolean
///
/// Under `extensible` or `preferred` strength a code outside the value set
/// is accepted and two INFORMATION `code-invalid` issues are recorded.
///
/// ```text
/// Patient.communication.language.memberOf('http://hl7.org/fhir/ValueSet/all-languages')
/// Observation.code.memberOf(%vs-observation-codes, 'extensible')
/// ```
pub fn member_of_function(
    context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let Some(node) = input.optional_single()? else {
        return Ok(Collection::empty());
    };
    let Some(url) = string_value("memberOf", &arguments[0])? else {
        return Ok(Collection::empty());
    };
    let strength = match arguments.get(1) {
        Some(argument) => string_value("memberOf", argument)?,
        None => None,
    };
    let codes = codes_of(context, node, "memberOf")?;
    if codes.is_empty() {
        return Ok(Collection::empty());
    }

    let Some(provider) = context.terminology().cloned() else {
        not_supported(context, format!("Membership in value set '{}' cannot be checked: no terminology provider", url));
        return Ok(Collection::boolean(true));
    };
    let answers: Vec<Option<bool>> = codes
        .iter()
        .map(|c| provider.validate_in_valueset(&url, &c.system, c.version.as_deref(), &c.code))
        .collect();

    if answers.contains(&Some(true)) {
        return Ok(Collection::boolean(true));
    }
    if answers.contains(&None) {
        not_supported(context, format!("Membership in value set '{}' could not be determined", url));
        return Ok(Collection::boolean(true));
    }

    let display = codes
        .iter()
        .map(|c| if c.system.is_empty() { c.code.clone() } else { format!("{}|{}", c.system, c.code) })
        .collect::<Vec<_>>()
        .join(", ");
    match strength.as_deref() {
        Some(strength @ ("extensible" | "preferred")) => {
            context.add_issue(Issue::new(
                IssueSeverity::Information,
                IssueType::CodeInvalid,
                format!("Code '{}' was not found in value set '{}'", display, url),
            ));
            context.add_issue(Issue::new(
                IssueSeverity::Information,
                IssueType::CodeInvalid,
                format!("Code '{}' should be from value set '{}' ({} binding)", display, url, strength),
            ));
            Ok(Collection::boolean(true))
        }
        _ => Ok(Collection::boolean(false)),
    }
}

/// Shared body of `subsumes()` and `subsumedBy()`.
///
/// Codes from different systems are never related. Empty when the provider
/// cannot answer.
fn subsumption(
    function: &str,
    context: &mut EvaluationContext,
    input: &Collection,
    other: &Collection,
    reversed: bool,
) -> Result<Collection, EvaluationError> {
    let (Some(left), Some(right)) = (input.optional_single()?, other.optional_single()?) else {
        return Ok(Collection::empty());
    };
    let left = codes_of(context, left, function)?;
    let right = codes_of(context, right, function)?;
    let Some(provider) = context.terminology().cloned() else {
        not_supported(context, format!("Function '{}' requires a terminology provider", function));
        return Ok(Collection::empty());
    };

    let mut undetermined = false;
    for a in &left {
        for b in right.iter().filter(|b| b.system == a.system) {
            let (ancestor, descendant) = if reversed { (b, a) } else { (a, b) };
            match provider.subsumes(&a.system, &ancestor.code, &descendant.code) {
                Some(true) => return Ok(Collection::boolean(true)),
                Some(false) => {}
                None => undetermined = true,
            }
        }
    }
    if undetermined {
        not_supported(context, format!("Function '{}' could not be evaluated by the terminology provider", function));
        return Ok(Collection::empty());
    }
    Ok(Collection::boolean(false))
}

/// Implements `%terminologies.validateVS(valueSet, coded)`
///
/// Returns a `Parameters` resource with a `result` boolean and a `message`.
pub fn validate_vs_function(
    context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    if !matches!(input.nodes(), [Node::TerminologyService]) {
        return Err(EvaluationError::InvalidArgument(
            "Function 'validateVS' must be invoked on %terminologies".to_string(),
        ));
    }
    let Some(url) = string_value("validateVS", &arguments[0])? else {
        return Ok(Collection::empty());
    };
    let Some(node) = arguments[1].optional_single()? else {
        return Ok(Collection::empty());
    };
    let codes = codes_of(context, node, "validateVS")?;
    let Some(provider) = context.terminology().cloned() else {
        not_supported(context, "Function 'validateVS' requires a terminology provider".to_string());
        return Ok(Collection::empty());
    };
    let mut answer = Some(false);
    for c in &codes {
        match provider.validate_in_valueset(&url, &c.system, c.version.as_deref(), &c.code) {
            Some(true) => {
                answer = Some(true);
                break;
            }
            Some(false) => {}
            None => answer = None,
        }
    }
    let Some(result) = answer else {
        not_supported(context, format!("Validation against value set '{}' could not be determined", url));
        return Ok(Collection::empty());
    };
    let message = if result {
        format!("Code is in value set '{}'", url)
    } else {
        format!("Code is not in value set '{}'", url)
    };
    let parameters = ParametersBuilder::new()
        .boolean("result", result)
        .string("message", message)
        .build();
    Ok(Collection::singleton(Node::detached_resource(Arc::new(parameters))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminology::InMemoryTerminologyProvider;
    use atrius_fhirpath_support::SystemValue;

    const VS: &str = "http://example.org/fhir/ValueSet/colors";
    const SYSTEM: &str = "http://example.org/colors";

    fn provider() -> Arc<InMemoryTerminologyProvider> {
        Arc::new(
            InMemoryTerminologyProvider::new()
                .with_value_set(VS, [(SYSTEM, "red"), (SYSTEM, "green")])
                .with_parent(SYSTEM, "crimson", "red"),
        )
    }

    fn coding(code: &str) -> Collection {
        let coding = Element::new("Coding")
            .with("system", Element::uri(SYSTEM))
            .with("code", Element::code(code));
        Collection::singleton(Node::root(Arc::new(coding)))
    }

    fn string(s: &str) -> Collection {
        Collection::singleton(Node::string(s))
    }

    #[test]
    fn membership() {
        let mut context = EvaluationContext::new().with_terminology(provider());
        let result = member_of_function(&mut context, &coding("red"), &[string(VS)]).unwrap();
        assert_eq!(result, Collection::boolean(true));
        let result = member_of_function(&mut context, &coding("blue"), &[string(VS)]).unwrap();
        assert_eq!(result, Collection::boolean(false));
        assert!(context.warnings().is_empty());
    }

    #[test]
    fn extensible_misses_are_informational() {
        let mut context = EvaluationContext::new().with_terminology(provider());
        let result =
            member_of_function(&mut context, &coding("blue"), &[string(VS), string("extensible")]).unwrap();
        assert_eq!(result, Collection::boolean(true));
        assert_eq!(context.warnings().len(), 2);
        assert!(context
            .warnings()
            .iter()
            .all(|i| i.severity == IssueSeverity::Information && i.code == IssueType::CodeInvalid));
    }

    #[test]
    fn undeterminable_membership_warns() {
        let mut context = EvaluationContext::new();
        let result = member_of_function(&mut context, &coding("red"), &[string(VS)]).unwrap();
        assert_eq!(result, Collection::boolean(true));
        assert_eq!(context.warnings()[0].code, IssueType::NotSupported);

        let mut context = EvaluationContext::new().with_terminology(provider());
        let result =
            member_of_function(&mut context, &coding("red"), &[string("http://example.org/unknown")]).unwrap();
        assert_eq!(result, Collection::boolean(true));
        assert_eq!(context.warnings()[0].severity, IssueSeverity::Warning);
    }

    #[test]
    fn subsumption_both_ways() {
        let mut context = EvaluationContext::new().with_terminology(provider());
        assert_eq!(
            subsumption("subsumes", &mut context, &coding("red"), &coding("crimson"), false).unwrap(),
            Collection::boolean(true)
        );
        assert_eq!(
            subsumption("subsumedBy", &mut context, &coding("red"), &coding("crimson"), true).unwrap(),
            Collection::boolean(false)
        );
    }

    #[test]
    fn validate_vs_returns_parameters() {
        let mut context = EvaluationContext::new().with_terminology(provider());
        let service = Collection::singleton(Node::TerminologyService);
        let result = validate_vs_function(&mut context, &service, &[string(VS), coding("green")]).unwrap();
        let parameters = result.single().unwrap();
        assert_eq!(parameters.element().map(|e| e.type_name()), Some("Parameters"));
        let result_value = parameters
            .members("parameter")
            .into_iter()
            .flat_map(|p| p.members("value"))
            .next()
            .and_then(|v| v.system_value());
        assert_eq!(result_value, Some(SystemValue::Boolean(true)));

        assert!(validate_vs_function(&mut context, &string("x"), &[string(VS), coding("green")]).is_err());
    }
}
