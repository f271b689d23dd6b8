//! # FHIRPath Type Conversion Functions
//!
//! Implements `toBoolean()`, `toInteger()`, `toDecimal()`, `toString()`,
//! `toDate()`, `toDateTime()`, `toTime()`, `toQuantity()` and the matching
//! `convertsTo*()` checks.
//!
//! Every conversion takes a singleton (several items are an error), yields
//! empty for an empty input, and yields empty when the value does not
//! convert. A `convertsTo*()` check answers whether the conversion would
//! produce a value.

use atrius_fhir_model::PrecisionDateTime;
use atrius_fhirpath_support::conversion::{
    string_to_date, string_to_date_time, string_to_decimal, string_to_integer, string_to_time,
    to_boolean,
};
use atrius_fhirpath_support::{Collection, EvaluationError, Node, Quantity, SystemValue};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use crate::context::EvaluationContext;
use crate::registry::{FhirPathFunction, FunctionDescriptor, FunctionRegistry, string_value};

type Converter = fn(&SystemValue) -> Option<SystemValue>;

const CONVERSIONS: &[(&str, &str, Converter)] = &[
    ("toBoolean", "convertsToBoolean", convert_boolean),
    ("toInteger", "convertsToInteger", convert_integer),
    ("toDecimal", "convertsToDecimal", convert_decimal),
    ("toString", "convertsToString", convert_string),
    ("toDate", "convertsToDate", convert_date),
    ("toDateTime", "convertsToDateTime", convert_date_time),
    ("toTime", "convertsToTime", convert_time),
];

/// A conversion or its `convertsTo*` check, backed by a [`Converter`].
struct Conversion {
    descriptor: FunctionDescriptor,
    converter: Converter,
    check_only: bool,
}

impl FhirPathFunction for Conversion {
    fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    fn apply(
        &self,
        _context: &mut EvaluationContext,
        input: &Collection,
        _arguments: &[Collection],
    ) -> Result<Collection, EvaluationError> {
        if self.check_only {
            converts(input, self.converter)
        } else {
            convert(input, self.converter)
        }
    }
}

pub fn register(registry: &mut FunctionRegistry) {
    for (to, converts_to, converter) in CONVERSIONS {
        for (name, check_only) in [(to, false), (converts_to, true)] {
            registry.register(Conversion {
                descriptor: FunctionDescriptor::new(*name, 0, 0),
                converter: *converter,
                check_only,
            });
        }
    }
    registry.register_fn("toQuantity", 0, 1, to_quantity_function);
    registry.register_fn("convertsToQuantity", 0, 1, converts_to_quantity_function);
}

fn sole_value(input: &Collection) -> Result<Option<SystemValue>, EvaluationError> {
    Ok(input.optional_single()?.and_then(Node::system_value))
}

fn convert(input: &Collection, converter: Converter) -> Result<Collection, EvaluationError> {
    Ok(sole_value(input)?
        .and_then(|v| converter(&v))
        .map(Node::from_system_value)
        .into_iter()
        .collect())
}

fn converts(input: &Collection, converter: Converter) -> Result<Collection, EvaluationError> {
    if input.is_empty() {
        return Ok(Collection::empty());
    }
    Ok(Collection::boolean(!convert(input, converter)?.is_empty()))
}

fn convert_boolean(value: &SystemValue) -> Option<SystemValue> {
    to_boolean(value).map(SystemValue::Boolean)
}

fn convert_integer(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::Integer(_) => Some(value.clone()),
        SystemValue::String(s) => string_to_integer(s).map(SystemValue::Integer),
        SystemValue::Boolean(b) => Some(SystemValue::Integer(i64::from(*b))),
        _ => None,
    }
}

fn convert_decimal(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::Integer(_) | SystemValue::Decimal(_) => value.as_decimal().map(SystemValue::Decimal),
        SystemValue::String(s) => string_to_decimal(s).map(SystemValue::Decimal),
        SystemValue::Boolean(b) => Some(SystemValue::Decimal(if *b { Decimal::ONE } else { Decimal::ZERO })),
        _ => None,
    }
}

fn convert_string(value: &SystemValue) -> Option<SystemValue> {
    Some(SystemValue::String(value.to_display_string()))
}

fn convert_date(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::Date(_) => Some(value.clone()),
        SystemValue::DateTime(dt) => Some(SystemValue::Date(dt.date().clone())),
        SystemValue::String(s) => string_to_date(s).map(SystemValue::Date),
        _ => None,
    }
}

fn convert_date_time(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::DateTime(_) => Some(value.clone()),
        SystemValue::Date(d) => Some(SystemValue::DateTime(PrecisionDateTime::from_precision_date(d.clone()))),
        SystemValue::String(s) => string_to_date_time(s).map(SystemValue::DateTime),
        _ => None,
    }
}

fn convert_time(value: &SystemValue) -> Option<SystemValue> {
    match value {
        SystemValue::Time(_) => Some(value.clone()),
        SystemValue::String(s) => string_to_time(s).map(SystemValue::Time),
        _ => None,
    }
}

static QUANTITY_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([+-]?\d+(?:\.\d+)?)\s*(?:'([^']+)'|([a-z]+))?\s*$").unwrap()
});

/// Reads `5`, `5.5 'mg'` or `3 days` as a quantity.
pub fn parse_quantity(text: &str) -> Option<Quantity> {
    let captures = QUANTITY_TEXT.captures(text)?;
    let value: Decimal = captures.get(1)?.as_str().parse().ok()?;
    let unit = match (captures.get(2), captures.get(3)) {
        (Some(ucum), _) => ucum.as_str(),
        (None, Some(word)) if atrius_fhir_model::CalendarUnit::parse(word.as_str()).is_some() => {
            word.as_str()
        }
        (None, Some(_)) => return None,
        (None, None) => "1",
    };
    Some(Quantity::new(value, unit))
}

fn quantity_of(value: &SystemValue) -> Option<Quantity> {
    match value {
        SystemValue::Quantity(q) => Some(q.clone()),
        SystemValue::Integer(_) | SystemValue::Decimal(_) => value.as_decimal().map(|d| Quantity::new(d, "1")),
        SystemValue::Boolean(b) => Some(Quantity::new(if *b { Decimal::ONE } else { Decimal::ZERO }, "1")),
        SystemValue::String(s) => parse_quantity(s),
        _ => None,
    }
}

/// Implements the FHIRPath `toQuantity` function
///
/// Syntax: value.toQuantity([unit : String]) : Quantity
///
/// With a unit argument the value is returned only when it is already
/// expressed in that unit; unit conversion is not performed.
pub fn to_quantity_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let Some(quantity) = sole_value(input)?.as_ref().and_then(quantity_of) else {
        return Ok(Collection::empty());
    };
    if let Some(argument) = arguments.first() {
        let Some(unit) = string_value("toQuantity", argument)? else {
            return Ok(Collection::empty());
        };
        if !quantity.same_unit(&Quantity::new(quantity.value, unit)) {
            return Ok(Collection::empty());
        }
    }
    Ok(Collection::singleton(Node::from_system_value(SystemValue::Quantity(quantity))))
}

pub fn converts_to_quantity_function(
    context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    if input.is_empty() {
        return Ok(Collection::empty());
    }
    let converted = to_quantity_function(context, input, arguments)?;
    Ok(Collection::boolean(!converted.is_empty()))
}
