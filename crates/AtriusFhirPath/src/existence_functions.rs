//! # FHIRPath Existence Functions
//!
//! Implements `empty()`, `count()`, `allTrue()`, `anyTrue()`, `allFalse()`,
//! `anyFalse()`, `subsetOf()`, `supersetOf()`, `distinct()` and
//! `isDistinct()`. `exists()` and `all()` take criteria and live in the
//! evaluator.

use atrius_fhirpath_support::{Collection, EvaluationError, Node, SystemValue};

use crate::context::EvaluationContext;
use crate::registry::FunctionRegistry;

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("empty", 0, 0, empty_function);
    registry.register_fn("count", 0, 0, count_function);
    registry.register_fn("allTrue", 0, 0, |_, input, _| all_booleans(input, "allTrue", true, true));
    registry.register_fn("anyTrue", 0, 0, |_, input, _| all_booleans(input, "anyTrue", true, false));
    registry.register_fn("allFalse", 0, 0, |_, input, _| all_booleans(input, "allFalse", false, true));
    registry.register_fn("anyFalse", 0, 0, |_, input, _| all_booleans(input, "anyFalse", false, false));
    registry.register_fn("subsetOf", 1, 1, subset_of_function);
    registry.register_fn("supersetOf", 1, 1, superset_of_function);
    registry.register_fn("distinct", 0, 0, distinct_function);
    registry.register_fn("isDistinct", 0, 0, is_distinct_function);
}

pub fn empty_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(Collection::boolean(input.is_empty()))
}

pub fn count_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(Collection::singleton(Node::integer(input.len() as i64)))
}

/// Shared body of the four boolean aggregate checks.
///
/// With `every` set the result is true when each item equals `expected`
/// (vacuously true for an empty input); otherwise it is true when at least
/// one item does.
fn all_booleans(
    input: &Collection,
    function: &str,
    expected: bool,
    every: bool,
) -> Result<Collection, EvaluationError> {
    let mut values = Vec::with_capacity(input.len());
    for node in input {
        match node.system_value() {
            Some(SystemValue::Boolean(b)) => values.push(b),
            _ => {
                return Err(EvaluationError::InvalidArgument(format!(
                    "Function '{}' requires a collection of booleans",
                    function
                )));
            }
        }
    }
    let result = if every {
        values.iter().all(|b| *b == expected)
    } else {
        values.iter().any(|b| *b == expected)
    };
    Ok(Collection::boolean(result))
}

/// Implements the FHIRPath `subsetOf` function
///
/// Syntax: collection.subsetOf(other : collection) : Boolean
///
/// ```text
/// (1 | 2).subsetOf(1 | 2 | 3)  // true
/// {}.subsetOf(1)              // true
/// ```
pub fn subset_of_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(Collection::boolean(arguments[0].contains_all(input)))
}

pub fn superset_of_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(Collection::boolean(input.contains_all(&arguments[0])))
}

pub fn distinct_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(input.distinct())
}

pub fn is_distinct_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(Collection::boolean(input.distinct().len() == input.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Collection {
        values.iter().map(|i| Node::integer(*i)).collect()
    }

    fn bools(values: &[bool]) -> Collection {
        values.iter().map(|b| Node::boolean(*b)).collect()
    }

    #[test]
    fn boolean_aggregates() {
        assert_eq!(all_booleans(&bools(&[]), "allTrue", true, true).unwrap(), Collection::boolean(true));
        assert_eq!(all_booleans(&bools(&[true, false]), "anyFalse", false, false).unwrap(), Collection::boolean(true));
        assert_eq!(all_booleans(&bools(&[true, false]), "allTrue", true, true).unwrap(), Collection::boolean(false));
        assert!(all_booleans(&ints(&[1]), "allTrue", true, true).is_err());
    }

    #[test]
    fn subsets_and_distinct() {
        let mut context = EvaluationContext::new();
        let result = subset_of_function(&mut context, &ints(&[1, 2]), &[ints(&[1, 2, 3])]).unwrap();
        assert_eq!(result, Collection::boolean(true));
        let result = superset_of_function(&mut context, &ints(&[1, 2]), &[ints(&[1, 2, 3])]).unwrap();
        assert_eq!(result, Collection::boolean(false));
        let result = distinct_function(&mut context, &ints(&[1, 2, 1]), &[]).unwrap();
        assert_eq!(result, ints(&[1, 2]));
        let result = is_distinct_function(&mut context, &ints(&[1, 2, 1]), &[]).unwrap();
        assert_eq!(result, Collection::boolean(false));
    }
}
