//! # Singleton Evaluation and Implicit Conversion
//!
//! Helpers that read a collection as a single value. Every `has_*` check is
//! total and never fails. Each `get_*` accessor may only be called after the
//! matching check succeeded; calling it otherwise is a bug in the caller and
//! panics.
//!
//! Two boolean readings coexist and must stay distinct:
//!
//! - [`is_true`] / [`is_false`] hold only for a singleton that converts to
//!   the boolean in question.
//! - [`evaluates_to_true`] additionally treats a non-convertible singleton
//!   (and any collection of several items) as true, because it is not empty.

use atrius_fhir_model::{PrecisionDate, PrecisionDateTime, PrecisionTime};
use rust_decimal::Decimal;

use crate::collection::Collection;
use crate::evaluation_error::EvaluationError;
use crate::system_value::{Quantity, SystemValue};

pub fn is_singleton(collection: &Collection) -> bool {
    collection.is_singleton()
}

fn sole_value(collection: &Collection) -> Option<SystemValue> {
    match collection.nodes() {
        [node] => node.system_value(),
        _ => None,
    }
}

pub fn has_system_value(collection: &Collection) -> bool {
    sole_value(collection).is_some()
}

pub fn get_system_value(collection: &Collection) -> SystemValue {
    match sole_value(collection) {
        Some(value) => value,
        None => panic!("get_system_value called without has_system_value"),
    }
}

pub fn has_boolean_value(collection: &Collection) -> bool {
    matches!(sole_value(collection), Some(SystemValue::Boolean(_)))
}

pub fn get_boolean_value(collection: &Collection) -> bool {
    match sole_value(collection) {
        Some(SystemValue::Boolean(b)) => b,
        _ => panic!("get_boolean_value called without has_boolean_value"),
    }
}

pub fn has_integer_value(collection: &Collection) -> bool {
    matches!(sole_value(collection), Some(SystemValue::Integer(_)))
}

pub fn get_integer_value(collection: &Collection) -> i64 {
    match sole_value(collection) {
        Some(SystemValue::Integer(i)) => i,
        _ => panic!("get_integer_value called without has_integer_value"),
    }
}

/// Integer or decimal.
pub fn has_number_value(collection: &Collection) -> bool {
    sole_value(collection).is_some_and(|v| v.is_numeric())
}

pub fn get_number_value(collection: &Collection) -> Decimal {
    match sole_value(collection).and_then(|v| v.as_decimal()) {
        Some(d) => d,
        None => panic!("get_number_value called without has_number_value"),
    }
}

pub fn has_string_value(collection: &Collection) -> bool {
    matches!(sole_value(collection), Some(SystemValue::String(_)))
}

pub fn get_string_value(collection: &Collection) -> String {
    match sole_value(collection) {
        Some(SystemValue::String(s)) => s,
        _ => panic!("get_string_value called without has_string_value"),
    }
}

/// Date, DateTime or Time.
pub fn has_temporal_value(collection: &Collection) -> bool {
    sole_value(collection).is_some_and(|v| v.is_temporal())
}

pub fn has_date_value(collection: &Collection) -> bool {
    match sole_value(collection) {
        Some(SystemValue::Date(_)) => true,
        Some(SystemValue::String(s)) => string_to_date(&s).is_some(),
        _ => false,
    }
}

/// A date, implicitly converting a date string.
pub fn get_date_value(collection: &Collection) -> PrecisionDate {
    match sole_value(collection) {
        Some(SystemValue::Date(d)) => d,
        Some(SystemValue::String(s)) => match string_to_date(&s) {
            Some(d) => d,
            None => panic!("get_date_value called without has_date_value"),
        },
        _ => panic!("get_date_value called without has_date_value"),
    }
}

pub fn has_quantity_value(collection: &Collection) -> bool {
    matches!(sole_value(collection), Some(SystemValue::Quantity(_)))
}

pub fn get_quantity_value(collection: &Collection) -> Quantity {
    match sole_value(collection) {
        Some(SystemValue::Quantity(q)) => q,
        _ => panic!("get_quantity_value called without has_quantity_value"),
    }
}

/// Boolean reading of a single value: booleans, the strings
/// `true/false/yes/no/y/n/1/0/1.0/0.0` (any case), integers 1/0 and
/// decimals 1.0/0.0.
pub fn to_boolean(value: &SystemValue) -> Option<bool> {
    match value {
        SystemValue::Boolean(b) => Some(*b),
        SystemValue::String(s) => match s.to_lowercase().as_str() {
            "true" | "yes" | "y" | "1" | "1.0" => Some(true),
            "false" | "no" | "n" | "0" | "0.0" => Some(false),
            _ => None,
        },
        SystemValue::Integer(1) => Some(true),
        SystemValue::Integer(0) => Some(false),
        SystemValue::Decimal(d) if *d == Decimal::ONE => Some(true),
        SystemValue::Decimal(d) if d.is_zero() => Some(false),
        _ => None,
    }
}

/// A singleton whose value converts to a boolean.
pub fn evaluates_to_boolean(collection: &Collection) -> bool {
    sole_value(collection).is_some_and(|v| to_boolean(&v).is_some())
}

pub fn is_true(collection: &Collection) -> bool {
    sole_value(collection).and_then(|v| to_boolean(&v)) == Some(true)
}

pub fn is_false(collection: &Collection) -> bool {
    sole_value(collection).and_then(|v| to_boolean(&v)) == Some(false)
}

/// Truthiness used by filters and `iif`: a convertible singleton is its
/// boolean, any other singleton is true, and every other cardinality is false.
pub fn evaluates_to_true(collection: &Collection) -> bool {
    match collection.len() {
        1 => sole_value(collection)
            .and_then(|v| to_boolean(&v))
            .unwrap_or(true),
        _ => false,
    }
}

/// Operand of a boolean operator: `None` when empty, an error when the
/// collection holds several items.
pub fn singleton_boolean(collection: &Collection) -> Result<Option<bool>, EvaluationError> {
    match collection.len() {
        0 => Ok(None),
        1 => Ok(Some(evaluates_to_true(collection))),
        n => Err(EvaluationError::not_singleton(n)),
    }
}

pub fn string_to_date(text: &str) -> Option<PrecisionDate> {
    PrecisionDate::parse(text)
}

/// Accepts full date-times and bare dates.
pub fn string_to_date_time(text: &str) -> Option<PrecisionDateTime> {
    PrecisionDateTime::parse(text)
}

pub fn string_to_time(text: &str) -> Option<PrecisionTime> {
    PrecisionTime::parse(text.strip_prefix('T').unwrap_or(text))
}

/// Decimal literal syntax only: optional sign, digits, optional fraction.
pub fn string_to_decimal(text: &str) -> Option<Decimal> {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, Some(fraction)),
        None => (unsigned, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());
    if !all_digits(whole) || fraction.is_some_and(|f| !all_digits(f)) {
        return None;
    }
    text.parse().ok()
}

pub fn string_to_integer(text: &str) -> Option<i64> {
    let unsigned = text.strip_prefix(['+', '-']).unwrap_or(text);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}
