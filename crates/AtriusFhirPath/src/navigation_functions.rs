//! # FHIRPath Tree Navigation Functions
//!
//! Implements `children()`, `descendants()`, and the FHIR additions
//! `extension()`, `hasValue()` and `getValue()`.

use atrius_fhirpath_support::{Collection, EvaluationError, Node};

use crate::context::EvaluationContext;
use crate::registry::{FunctionRegistry, string_value};

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("children", 0, 0, children_function);
    registry.register_fn("descendants", 0, 0, descendants_function);
    registry.register_fn("extension", 1, 1, extension_function);
    registry.register_fn("hasValue", 0, 0, has_value_function);
    registry.register_fn("getValue", 0, 0, get_value_function);
}

/// Direct children of every input node. The result is unordered.
pub fn children_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let nodes = input.iter().flat_map(Node::children).collect();
    Ok(Collection::unordered(nodes))
}

/// Implements the FHIRPath `descendants` function
///
/// Shorthand for `repeat(children())`; the result is unordered.
pub fn descendants_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let nodes = input.iter().flat_map(Node::descendants).collect();
    Ok(Collection::unordered(nodes))
}

/// Implements the FHIRPath `extension` function
///
/// Syntax: element.extension(url : String) : collection
///
/// ```text
/// Patient.birthDate.extension('http://hl7.org/fhir/StructureDefinition/patient-birthTime')
/// ```
pub fn extension_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let Some(url) = string_value("extension", &arguments[0])? else {
        return Ok(Collection::empty());
    };
    Ok(input
        .iter()
        .flat_map(|node| node.members("extension"))
        .filter(|extension| {
            extension
                .element()
                .and_then(|e| e.child_str("url"))
                .is_some_and(|u| u == url)
        })
        .collect())
}

/// True for a single primitive carrying a value.
pub fn has_value_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let result = match input.nodes() {
        [node] => matches!(node, Node::Element(_)) && node.has_value(),
        _ => false,
    };
    Ok(Collection::boolean(result))
}

/// The system value of a single primitive element, or empty.
pub fn get_value_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let value = match input.nodes() {
        [node @ Node::Element(element)] if element.element.value().is_some() => node.system_value(),
        _ => None,
    };
    Ok(value.map(Node::from_system_value).into_iter().collect())
}
