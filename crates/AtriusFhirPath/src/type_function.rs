//! # FHIRPath Type Functions
//!
//! Implements `type()` and the type tests shared by `is`, `as` and `ofType()`
//! (the latter are evaluated by the evaluator because their argument is a
//! type specifier, not an expression).

use atrius_fhirpath_support::{
    Collection, EvaluationError, FhirPathType, Node, TypeInfo,
};

use crate::context::EvaluationContext;
use crate::registry::FunctionRegistry;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("type", 0, 0, type_function);
}

/// Resolves a type specifier such as `Patient`, `FHIR.string` or `System.Integer`.
pub fn resolve_type(name: &str) -> Result<FhirPathType, EvaluationError> {
    FhirPathType::from_name(name)
        .ok_or_else(|| EvaluationError::InvalidTypeSpecifier(format!("Unknown type '{}'", name)))
}

/// True when `node` is an instance of `target` or one of its subtypes.
///
/// A FHIR primitive also matches the system type of its value, so that
/// `Patient.birthDate is Date` holds; a system quantity matches
/// `FHIR.Quantity`.
pub fn is_type(node: &Node, target: &FhirPathType) -> bool {
    let actual = node.fhirpath_type();
    if target.is_assignable_from(&actual) {
        return true;
    }
    match node {
        Node::Element(_) if target.is_system_type() => node
            .system_value()
            .is_some_and(|v| target.is_assignable_from(&v.fhirpath_type())),
        Node::System(_) => !target.is_system_type() && target.name() == actual.name(),
        _ => false,
    }
}

/// Implements the FHIRPath `type()` function
///
/// Syntax: collection.type() : collection
///
/// Returns one type descriptor per input item:
///
/// ```text
/// 1.type().name                  // 'Integer'
/// Patient.type().namespace       // 'FHIR'
/// Patient.contact.type()         // TupleTypeInfo
/// ```
pub fn type_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(input.iter().map(|node| Node::type_info(type_info_of(node))).collect())
}

fn type_info_of(node: &Node) -> TypeInfo {
    match node {
        Node::Element(_) | Node::Resource(_) => node
            .element_type()
            .and_then(TypeInfo::for_catalog_type)
            .unwrap_or_else(|| TypeInfo::simple(node.fhirpath_type())),
        _ => TypeInfo::simple(node.fhirpath_type()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhir_model::{Element, PrecisionDate};
    use std::sync::Arc;

    #[test]
    fn primitives_match_system_types() {
        let patient = Arc::new(
            Element::new("Patient")
                .with("birthDate", Element::date(PrecisionDate::from_ymd(1974, 12, 25))),
        );
        let root = Node::root(patient);
        let birth_date = root.members("birthDate").remove(0);
        assert!(is_type(&birth_date, &resolve_type("date").unwrap()));
        assert!(is_type(&birth_date, &resolve_type("Date").unwrap()));
        assert!(!is_type(&birth_date, &resolve_type("string").unwrap()));
        assert!(is_type(&root, &resolve_type("DomainResource").unwrap()));
        assert!(matches!(
            resolve_type("Nope"),
            Err(EvaluationError::InvalidTypeSpecifier(_))
        ));
    }

    #[test]
    fn type_of_system_value() {
        let mut context = EvaluationContext::new();
        let result = type_function(
            &mut context,
            &Collection::singleton(Node::integer(1)),
            &[],
        )
        .unwrap();
        let name = result.nodes()[0].members("name");
        assert_eq!(name[0].system_value().unwrap().as_str(), Some("Integer"));
    }
}
