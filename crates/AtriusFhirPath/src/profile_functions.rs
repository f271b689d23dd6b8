//! # FHIRPath Profile Functions
//!
//! `conformsTo(profile)` is recognised so that expressions using it parse
//! and dispatch, but validating against a profile needs a structure
//! definition registry this crate does not have. Invoking it fails with
//! [`EvaluationError::UnsupportedFunction`](atrius_fhirpath_support::EvaluationError).

use crate::registry::FunctionRegistry;

pub fn register(registry: &mut FunctionRegistry) {
    registry.declare("conformsTo", 1, 1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EvaluationContext;
    use crate::registry::invoke;
    use atrius_fhirpath_support::{Collection, EvaluationError, Node};

    #[test]
    fn conforms_to_is_declared_but_unsupported() {
        let mut registry = FunctionRegistry::new();
        register(&mut registry);
        let mut context = EvaluationContext::new();
        let profile = Collection::singleton(Node::string("http://hl7.org/fhir/StructureDefinition/Patient"));
        let result = invoke(&registry, "conformsTo", &mut context, &Collection::empty(), &[profile]);
        assert!(matches!(result, Err(EvaluationError::UnsupportedFunction(_))));
        let result = invoke(&registry, "conformsTo", &mut context, &Collection::empty(), &[]);
        assert!(matches!(result, Err(EvaluationError::InvalidArity(_))));
    }
}
