//! # FHIRPath Math Functions
//!
//! Implements `abs()`, `ceiling()`, `exp()`, `floor()`, `ln()`, `log()`,
//! `power()`, `round()`, `sqrt()` and `truncate()`.
//!
//! Each function takes a singleton number (or a quantity for `abs()`) and
//! yields empty for an empty input. Results outside the real numbers, such
//! as the square root of a negative value, are empty as well.
//!
//! Roots, logarithms and exponentials go through `f64` and back.

use atrius_fhirpath_support::{Collection, EvaluationError, Node, Quantity, SystemValue};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

use crate::context::EvaluationContext;
use crate::registry::{FunctionRegistry, integer_value, singleton_value};

pub fn register(registry: &mut FunctionRegistry) {
    registry.register_fn("abs", 0, 0, abs_function);
    registry.register_fn("ceiling", 0, 0, |_, input, _| to_integer("ceiling", input, Decimal::ceil));
    registry.register_fn("floor", 0, 0, |_, input, _| to_integer("floor", input, Decimal::floor));
    registry.register_fn("truncate", 0, 0, |_, input, _| to_integer("truncate", input, Decimal::trunc));
    registry.register_fn("exp", 0, 0, |_, input, _| through_f64("exp", input, f64::exp));
    registry.register_fn("ln", 0, 0, |_, input, _| through_f64("ln", input, f64::ln));
    registry.register_fn("sqrt", 0, 0, |_, input, _| through_f64("sqrt", input, f64::sqrt));
    registry.register_fn("log", 1, 1, log_function);
    registry.register_fn("power", 1, 1, power_function);
    registry.register_fn("round", 0, 1, round_function);
}

fn number(function: &str, collection: &Collection) -> Result<Option<SystemValue>, EvaluationError> {
    match singleton_value(function, collection)? {
        None => Ok(None),
        Some(value) if value.is_numeric() => Ok(Some(value)),
        Some(other) => Err(EvaluationError::InvalidArgument(format!(
            "Function '{}' expects a number, found {}",
            function,
            other.fhirpath_type()
        ))),
    }
}

fn decimal_result(value: Option<Decimal>) -> Collection {
    value.map(|d| Collection::singleton(Node::decimal(d.normalize()))).unwrap_or_default()
}

fn from_f64(value: f64) -> Option<Decimal> {
    if value.is_finite() {
        Decimal::from_f64(value)
    } else {
        None
    }
}

/// Implements the FHIRPath `abs` function
///
/// ```text
/// (-5).abs()        // 5
/// (-5.5 'mg').abs() // 5.5 'mg'
/// ```
pub fn abs_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    _arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let result = match singleton_value("abs", input)? {
        None => return Ok(Collection::empty()),
        Some(SystemValue::Integer(i)) => i
            .checked_abs()
            .map(SystemValue::Integer)
            .ok_or_else(|| EvaluationError::InvalidOperation("Integer overflow in abs()".to_string()))?,
        Some(SystemValue::Decimal(d)) => SystemValue::Decimal(d.abs()),
        Some(SystemValue::Quantity(q)) => SystemValue::Quantity(Quantity::new(q.value.abs(), q.unit)),
        Some(other) => {
            return Err(EvaluationError::InvalidArgument(format!(
                "Function 'abs' expects a number, found {}",
                other.fhirpath_type()
            )));
        }
    };
    Ok(Collection::singleton(Node::from_system_value(result)))
}

fn to_integer(
    function: &str,
    input: &Collection,
    op: fn(&Decimal) -> Decimal,
) -> Result<Collection, EvaluationError> {
    let Some(value) = number(function, input)? else {
        return Ok(Collection::empty());
    };
    if let SystemValue::Integer(i) = value {
        return Ok(Collection::singleton(Node::integer(i)));
    }
    let rounded = value.as_decimal().map(|d| op(&d));
    Ok(match rounded {
        Some(d) => match d.to_i64() {
            Some(i) => Collection::singleton(Node::integer(i)),
            None => Collection::singleton(Node::decimal(d)),
        },
        None => Collection::empty(),
    })
}

fn through_f64(
    function: &str,
    input: &Collection,
    op: fn(f64) -> f64,
) -> Result<Collection, EvaluationError> {
    let Some(value) = number(function, input)? else {
        return Ok(Collection::empty());
    };
    let result = value
        .as_decimal()
        .and_then(|d| d.to_f64())
        .and_then(|f| from_f64(op(f)));
    Ok(decimal_result(result))
}

/// Logarithm of the input in the given base.
pub fn log_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let (Some(value), Some(base)) = (number("log", input)?, number("log", &arguments[0])?) else {
        return Ok(Collection::empty());
    };
    let result = match (value.as_decimal().and_then(|d| d.to_f64()), base.as_decimal().and_then(|d| d.to_f64())) {
        (Some(v), Some(b)) if v > 0.0 && b > 0.0 && b != 1.0 => from_f64(v.ln() / b.ln()),
        _ => None,
    };
    Ok(decimal_result(result))
}

/// Implements the FHIRPath `power` function
///
/// Syntax: number.power(exponent : Integer | Decimal) : Integer | Decimal
///
/// Integer to a non-negative integer power stays an Integer; overflow and
/// results that are not real numbers are empty.
pub fn power_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let (Some(base), Some(exponent)) = (number("power", input)?, number("power", &arguments[0])?) else {
        return Ok(Collection::empty());
    };
    if let (SystemValue::Integer(b), SystemValue::Integer(e)) = (&base, &exponent) {
        if let Ok(e) = u32::try_from(*e) {
            return Ok(b
                .checked_pow(e)
                .map(|i| Collection::singleton(Node::integer(i)))
                .unwrap_or_default());
        }
    }
    let (Some(b), Some(e)) = (base.as_decimal(), exponent.as_decimal()) else {
        return Ok(Collection::empty());
    };
    if b.is_sign_negative() && !e.fract().is_zero() {
        return Ok(Collection::empty());
    }
    let result = match (b.to_f64(), e.to_f64()) {
        (Some(b), Some(e)) => from_f64(b.powf(e)),
        _ => None,
    };
    Ok(decimal_result(result))
}

/// Implements the FHIRPath `round` function
///
/// Syntax: number.round([precision : Integer]) : Decimal
///
/// ```text
/// 3.14159.round(3)  // 3.142
/// 2.5.round()       // 3
/// ```
pub fn round_function(
    _context: &mut EvaluationContext,
    input: &Collection,
    arguments: &[Collection],
) -> Result<Collection, EvaluationError> {
    let Some(value) = number("round", input)? else {
        return Ok(Collection::empty());
    };
    let precision = match arguments.first() {
        Some(argument) => integer_value("round", argument)?.unwrap_or(0),
        None => 0,
    };
    let Ok(precision) = u32::try_from(precision) else {
        return Err(EvaluationError::InvalidArgument(
            "Function 'round' requires a non-negative precision".to_string(),
        ));
    };
    let Some(d) = value.as_decimal() else {
        return Ok(Collection::empty());
    };
    let rounded = d.round_dp_with_strategy(precision, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
    Ok(Collection::singleton(Node::decimal(rounded)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn int(i: i64) -> Collection {
        Collection::singleton(Node::integer(i))
    }

    fn dec_value(d: Decimal) -> Collection {
        Collection::singleton(Node::decimal(d))
    }

    #[test]
    fn rounding_family() {
        let mut context = EvaluationContext::new();
        assert_eq!(to_integer("floor", &dec_value(dec!(-1.5)), Decimal::floor).unwrap(), int(-2));
        assert_eq!(to_integer("ceiling", &dec_value(dec!(1.1)), Decimal::ceil).unwrap(), int(2));
        assert_eq!(to_integer("truncate", &dec_value(dec!(-1.9)), Decimal::trunc).unwrap(), int(-1));
        assert_eq!(round_function(&mut context, &dec_value(dec!(3.14159)), &[int(3)]).unwrap(), dec_value(dec!(3.142)));
        assert_eq!(round_function(&mut context, &dec_value(dec!(2.5)), &[]).unwrap(), dec_value(dec!(3)));
        assert!(round_function(&mut context, &dec_value(dec!(2.5)), &[int(-1)]).is_err());
    }

    #[test]
    fn powers_and_roots() {
        let mut context = EvaluationContext::new();
        assert_eq!(power_function(&mut context, &int(2), &[int(10)]).unwrap(), int(1024));
        assert_eq!(power_function(&mut context, &int(-1), &[dec_value(dec!(0.5))]).unwrap(), Collection::empty());
        assert_eq!(through_f64("sqrt", &int(81), f64::sqrt).unwrap(), dec_value(dec!(9)));
        assert_eq!(through_f64("sqrt", &int(-1), f64::sqrt).unwrap(), Collection::empty());
        assert_eq!(log_function(&mut context, &int(100), &[int(10)]).unwrap().len(), 1);
        assert_eq!(abs_function(&mut context, &int(-5), &[]).unwrap(), int(5));
    }

    #[test]
    fn non_numbers_are_rejected() {
        let string = Collection::singleton(Node::string("1"));
        assert!(through_f64("exp", &string, f64::exp).is_err());
        assert_eq!(through_f64("exp", &Collection::empty(), f64::exp).unwrap(), Collection::empty());
    }
}
