//! # FHIRPath String Manipulation Functions
//!
//! Implements `indexOf()`, `substring()`, `startsWith()`, `endsWith()`,
//! `contains()`, `upper()`, `lower()`, `replace()`, `matches()`,
//! `matchesFull()`, `replaceMatches()`, `length()`, `toChars()`, `trim()`,
//! `split()` and `join()`.
//!
//! Positions and lengths count characters, not bytes. An empty input or an
//! empty argument yields empty.

use atrius_fhirpath_support::{Collection, EvaluationError, Node};
use regex::{Regex, RegexBuilder};

use crate::context::EvaluationContext;
use crate::registry::{FunctionRegistry, integer_value, string_value};

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("indexOf", 1, 1, index_of_function);
    registry.register_fn("substring", 1, 2, substring_function);
    registry.register_fn("startsWith", 1, 1, |_, input, args| {
        test_with_argument("startsWith", input, args, |s, arg| s.starts_with(arg))
    });
    registry.register_fn("endsWith", 1, 1, |_, input, args| {
        test_with_argument("endsWith", input, args, |s, arg| s.ends_with(arg))
    });
    registry.register_fn("contains", 1, 1, |_, input, args| {
        test_with_argument("contains", input, args, |s, arg| s.contains(arg))
    });
    registry.register_fn("upper", 0, 0, |_, input, _| map_string("upper", input, |s| s.to_uppercase()));
    registry.register_fn("lower", 0, 0, |_, input, _| map_string("lower", input, |s| s.to_lowercase()));
    registry.register_fn("trim", 0, 0, |_, input, _| map_string("trim", input, |s| s.trim().to_string()));
    registry.register_fn("replace", 2, 2, replace_function);
    registry.register_fn("matches", 1, 1, |_, input, args| matches("matches", input, args, false));
    registry.register_fn("matchesFull", 1, 1, |_, input, args| matches("matchesFull", input, args, true));
    registry.register_fn("replaceMatches", 2, 2, replace_matches_function);
    registry.register_fn("length", 0, 0, length_function);
    registry.register_fn("toChars", 0, 0, to_chars_function);
    registry.register_fn("split", 1, 1, split_function);
    registry.register_fn("join", 0, 1, join_function);
}

fn one(value: String) -> Collection {
    Collection::singleton(Node::string(value))
}

fn map_string(
    function: &str,
    input: &Collection,
    f: impl FnOnce(&str) -> String,
) -> Result<Collection, EvaluationError> {
    Ok(string_value(function, input)?
        .map(|s| one(f(&s)))
        .unwrap_or_default())
}

fn test_with_argument(
    function: &str,
    input: &Collection,
    arguments: &[Collection],
    test: impl FnOnce(&str, &str) -> bool,
) -> Result<Collection, EvaluationError> {
    let Some(s) = string_value(function, input)? else {
        return Ok(Collection::empty());
    };
    let Some(arg) = string_value(function, &arguments[0])? else {
        return Ok(Collection::empty());
    };
    Ok(Collection::boolean(test(&s, &arg)))
}

fn compile(pattern: &str, anchored: bool) -> Result<Regex, EvaluationError> {
    let pattern = if anchored {
        format!("^(?:{})$", pattern)
    } else {
        pattern.to_string()
    };
    RegexBuilder::new(&pattern)
        .dot_matches_new_line(true)
        .build()
        .map_err(|e| EvaluationError::InvalidRegex(e.to_string()))
}

/// Implements the FHIRPath `indexOf` function
///
/// Syntax: string.indexOf(substring : String) : Integer
///
/// ```text
/// 'abcdefg'.indexOf('bc')  // 1
/// 'abcdefg'.indexOf('x')   // -1
/// 'abcdefg'.indexOf('')    // 0
/// ```
pub fn index_of_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let Some(s) = string_value("indexOf", input)? else {
        return Ok(Collection::empty());
    };
    let Some(sub) = string_value("indexOf", &arguments[0])? else {
        return Ok(Collection::empty());
    };
    let index = match s.find(&sub) {
        Some(byte_index) => s[..byte_index].chars().count() as i64,
        None => -1,
    };
    Ok(Collection::singleton(Node::integer(index)))
}

/// Implements the FHIRPath `substring` function
///
/// Syntax: string.substring(start : Integer [, length : Integer]) : String
///
/// A start outside the string yields empty.
pub fn substring_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let Some(s) = string_value("substring", input)? else {
        return Ok(Collection::empty());
    };
    let Some(start) = integer_value("substring", &arguments[0])? else {
        return Ok(Collection::empty());
    };
    let length = match arguments.get(1) {
        Some(argument) => integer_value("substring", argument)?,
        None => None,
    };
    let chars: Vec<char> = s.chars().collect();
    let Ok(start) = usize::try_from(start) else {
        return Ok(Collection::empty());
    };
    if start >= chars.len() {
        return Ok(Collection::empty());
    }
    let end = match length {
        Some(length) if length <= 0 => start,
        Some(length) => start
            .saturating_add(usize::try_from(length).unwrap_or(usize::MAX))
            .min(chars.len()),
        None => chars.len(),
    };
    Ok(one(chars[start..end].iter().collect()))
}

/// Literal (non-regex) replacement of every occurrence.
pub fn replace_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let Some(s) = string_value("replace", input)? else {
        return Ok(Collection::empty());
    };
    let (Some(pattern), Some(substitution)) = (
        string_value("replace", &arguments[0])?,
        string_value("replace", &arguments[1])?,
    ) else {
        return Ok(Collection::empty());
    };
    Ok(one(s.replace(&pattern, &substitution)))
}

fn matches(
    function: &str,
    input: &Collection,
    arguments: &[Collection],
    anchored: bool,
) -> Result<Collection, EvaluationError> {
    let Some(s) = string_value(function, input)? else {
        return Ok(Collection::empty());
    };
    let Some(pattern) = string_value(function, &arguments[0])? else {
        return Ok(Collection::empty());
    };
    Ok(Collection::boolean(compile(&pattern, anchored)?.is_match(&s)))
}

pub fn replace_matches_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let Some(s) = string_value("replaceMatches", input)? else {
        return Ok(Collection::empty());
    };
    let (Some(pattern), Some(substitution)) = (
        string_value("replaceMatches", &arguments[0])?,
        string_value("replaceMatches", &arguments[1])?,
    ) else {
        return Ok(Collection::empty());
    };
    let regex = compile(&pattern, false)?;
    Ok(one(regex.replace_all(&s, substitution.as_str()).into_owned()))
}

pub fn length_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(string_value("length", input)?
        .map(|s| Collection::singleton(Node::integer(s.chars().count() as i64)))
        .unwrap_or_default())
}

pub fn to_chars_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    Ok(string_value("toChars", input)?
        .map(|s| s.chars().map(|c| Node::string(c.to_string())).collect())
        .unwrap_or_default())
}

pub fn split_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let Some(s) = string_value("split", input)? else {
        return Ok(Collection::empty());
    };
    let Some(separator) = string_value("split", &arguments[0])? else {
        return Ok(Collection::empty());
    };
    Ok(s.split(separator.as_str()).map(Node::string).collect())
}

/// Joins every string of the input; unlike the other functions the input
/// may hold several items.
pub fn join_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let separator = match arguments.first() {
        Some(argument) => string_value("join", argument)?.unwrap_or_default(),
        None => String::new(),
    };
    let mut parts = Vec::with_capacity(input.len());
    for node in input {
        match node.system_value().as_ref().and_then(|v| v.as_str()) {
            Some(s) => parts.push(s.to_string()),
            None => {
                return Err(EvaluationError::InvalidArgument(
                    "Function 'join' requires a collection of strings".to_string(),
                ));
            }
        }
    }
    Ok(one(parts.join(&separator)))
}
