//! # FHIRPath Subsetting and Combining Functions
//!
//! Implements `single()`, `first()`, `last()`, `tail()`, `skip()`, `take()`,
//! `intersect()`, `exclude()`, `union()` and `combine()`.

use atrius_fhirpath_support::{Collection, EvaluationError};

use crate::context::EvaluationContext;
use crate::operators;
use crate::registry::{FunctionRegistry, integer_value};

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("single", 0, 0, single_function);
    registry.register_fn("first", 0, 0, first_function);
    registry.register_fn("last", 0, 0, last_function);
    registry.register_fn("tail", 0, 0, tail_function);
    registry.register_fn("skip", 1, 1, skip_function);
    registry.register_fn("take", 1, 1, take_function);
    registry.register_fn("intersect", 1, 1, intersect_function);
    registry.register_fn("exclude", 1, 1, exclude_function);
    registry.register_fn("union", 1, 1, union_function);
    registry.register_fn("combine", 1, 1, combine_function);
}

/// Implements the FHIRPath `single` function
///
/// Syntax: collection.single() : collection
///
/// Returns the input when it holds at most one item and signals an error
/// otherwise.
pub fn single_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(input.optional_single()?.cloned().into_iter().collect())
}

pub fn first_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    input.require_ordered("first")?;
    Ok(input.iter().next().cloned().into_iter().collect())
}

pub fn last_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    input.require_ordered("last")?;
    Ok(input.iter().last().cloned().into_iter().collect())
}

pub fn tail_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    input.require_ordered("tail")?;
    Ok(input.iter().skip(1).cloned().collect())
}

fn count_argument(function: &str, arguments: &[Collection]) -> Result<i64, EvaluationError> {
    integer_value(function, &arguments[0])?.ok_or_else(|| {
        EvaluationError::InvalidArgument(format!(
            "Function '{}' requires an integer argument",
            function
        ))
    })
}

/// Implements the FHIRPath `skip` function
///
/// ```text
/// (1 | 2 | 3).skip(2)   // 3
/// (1 | 2 | 3).skip(-1)  // 1 | 2 | 3
/// ```
pub fn skip_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    input.require_ordered("skip")?;
    let count = count_argument("skip", arguments)?.max(0);
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    Ok(input.iter().skip(count).cloned().collect())
}

pub fn take_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    input.require_ordered("take")?;
    let count = count_argument("take", arguments)?.max(0);
    let count = usize::try_from(count).unwrap_or(usize::MAX);
    Ok(input.iter().take(count).cloned().collect())
}

/// Items present in both collections, without duplicates.
pub fn intersect_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let other = &arguments[0];
    let common: Collection = input.iter().filter(|n| other.contains_node(n)).cloned().collect();
    Ok(common.distinct())
}

/// Items of the input not present in the argument; duplicates are kept.
pub fn exclude_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let other = &arguments[0];
    Ok(input
        .iter()
        .filter(|n| !other.contains_node(n))
        .cloned()
        .collect())
}

pub fn union_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(operators::union(input, &arguments[0]))
}

pub fn combine_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let mut combined = input.clone();
    combined.extend(arguments[0].clone());
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhirpath_support::Node;

    fn ints(values: &[i64]) -> Collection {
        values.iter().map(|i| Node::integer(*i)).collect()
    }

    #[test]
    fn positional() {
        let mut context = EvaluationContext::new();
        let input = ints(&[1, 2, 3]);
        assert_eq!(first_function(&mut context, &input, &[]).unwrap(), ints(&[1]));
        assert_eq!(last_function(&mut context, &input, &[]).unwrap(), ints(&[3]));
        assert_eq!(tail_function(&mut context, &input, &[]).unwrap(), ints(&[2, 3]));
        assert_eq!(skip_function(&mut context, &input, &[ints(&[2])]).unwrap(), ints(&[3]));
        assert_eq!(take_function(&mut context, &input, &[ints(&[-1])]).unwrap(), ints(&[]));
        assert!(single_function(&mut context, &input, &[]).is_err());
    }

    #[test]
    fn unordered_input_is_rejected() {
        let mut context = EvaluationContext::new();
        let input = Collection::unordered(vec![Node::integer(1), Node::integer(2)]);
        assert!(matches!(
            first_function(&mut context, &input, &[]),
            Err(EvaluationError::InvalidOperation(_))
        ));
    }

    #[test]
    fn set_operations() {
        let mut context = EvaluationContext::new();
        let input = ints(&[1, 2, 2, 3]);
        assert_eq!(
            intersect_function(&mut context, &input, &[ints(&[2, 3, 4])]).unwrap(),
            ints(&[2, 3])
        );
        assert_eq!(
            exclude_function(&mut context, &input, &[ints(&[1])]).unwrap(),
            ints(&[2, 2, 3])
        );
        assert_eq!(
            combine_function(&mut context, &ints(&[1]), &[ints(&[1])]).unwrap(),
            ints(&[1, 1])
        );
        assert_eq!(
            union_function(&mut context, &ints(&[1]), &[ints(&[1, 2])]).unwrap(),
            ints(&[1, 2])
        );
    }
}
