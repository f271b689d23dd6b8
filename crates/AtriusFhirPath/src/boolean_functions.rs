//! # FHIRPath Boolean Functions
//!
//! Implements `not()`. The boolean operators themselves live in
//! [`crate::operators`].

use atrius_fhirpath_support::conversion::singleton_boolean;
use atrius_fhirpath_support::{Collection, EvaluationError};

use crate::context::EvaluationContext;
use crate::registry::FunctionRegistry;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("not", 0, 0, not_function);
}

/// Implements the FHIRPath not() function
///
/// Syntax: collection.not() : Boolean
///
/// # Arguments
///
/// * `input` - The value to negate, read with singleton evaluation
///
/// # Returns
///
/// * `Ok(false)` - If the input is effectively true
/// * `Ok(true)` - If the input is effectively false
/// * `Ok(empty)` - If the input is empty
/// * `Err` - If the input holds several items
///
/// # Examples
///
/// ```text
/// true.not() = false
/// {}.not() = {}
/// 0.not() = true
/// ```
pub fn not_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(singleton_boolean(input)?
        .map(|b| Collection::boolean(!b))
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhirpath_support::Node;

    #[test]
    fn negation_uses_singleton_evaluation() {
        let mut context = EvaluationContext::new();
        let not = |context: &mut EvaluationContext, input: Collection| not_function(context, &input, &[]);
        assert_eq!(not(&mut context, Collection::boolean(true)).unwrap(), Collection::boolean(false));
        assert_eq!(not(&mut context, Collection::singleton(Node::integer(0))).unwrap(), Collection::boolean(true));
        assert_eq!(not(&mut context, Collection::singleton(Node::string("x"))).unwrap(), Collection::boolean(false));
        assert!(not(&mut context, Collection::empty()).unwrap().is_empty());
        let many = Collection::from_nodes(vec![Node::boolean(true), Node::boolean(false)]);
        assert!(matches!(
            not(&mut context, many),
            Err(EvaluationError::SingletonEvaluationError(_))
        ));
    }
}
