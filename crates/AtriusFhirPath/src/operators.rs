//! # FHIRPath Operators
//!
//! Equality, ordering, arithmetic, boolean and collection operators applied to
//! already evaluated operand collections. The evaluator decides evaluation
//! order and short-circuiting; everything here is a pure function of its
//! operands.

use std::cmp::Ordering;

use atrius_fhirpath_support::conversion::{string_to_date, string_to_date_time, string_to_time};
use atrius_fhirpath_support::{Collection, EvaluationError, Node, Quantity, SystemValue};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

fn empty() -> Collection {
    Collection::empty()
}

fn from_value(value: Option<SystemValue>) -> Collection {
    value.map(Node::from_system_value).into_iter().collect()
}

fn from_bool(value: Option<bool>) -> Collection {
    value.map(Collection::boolean).unwrap_or_default()
}

/// The value of a singleton operand.
fn operand(collection: &Collection, operator: &str) -> Result<SystemValue, EvaluationError> {
    collection.single()?.system_value().ok_or_else(|| {
        EvaluationError::InvalidOperation(format!(
            "Operator '{}' requires a primitive operand",
            operator
        ))
    })
}

fn unsupported(operator: &str, left: &SystemValue, right: &SystemValue) -> EvaluationError {
    EvaluationError::InvalidOperation(format!(
        "Operator '{}' cannot be applied to {} and {}",
        operator,
        left.fhirpath_type(),
        right.fhirpath_type()
    ))
}

/// `=` over collections: empty when either side is empty or when some pair
/// has no determinate answer.
pub fn equals(left: &Collection, right: &Collection) -> Option<bool> {
    if left.is_empty() || right.is_empty() {
        return None;
    }
    if left.len() != right.len() {
        return Some(false);
    }
    let mut result = Some(true);
    for (a, b) in left.iter().zip(right.iter()) {
        match a.equals(b) {
            Some(true) => {}
            Some(false) => return Some(false),
            None => result = None,
        }
    }
    result
}

/// `~` over collections: order-insensitive, never empty.
pub fn equivalent(left: &Collection, right: &Collection) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().all(|a| right.iter().any(|b| a.equivalent(b)))
        && right.iter().all(|b| left.iter().any(|a| a.equivalent(b)))
}

pub fn equality(operator: &str, left: &Collection, right: &Collection) -> Result<Collection, EvaluationError> {
    match operator {
        "=" => Ok(from_bool(equals(left, right))),
        "!=" => Ok(from_bool(equals(left, right).map(|b| !b))),
        "~" => Ok(Collection::boolean(equivalent(left, right))),
        "!~" => Ok(Collection::boolean(!equivalent(left, right))),
        _ => Err(EvaluationError::InvalidOperation(format!(
            "Unknown equality operator '{}'",
            operator
        ))),
    }
}

/// A string compared with a temporal value is read as that temporal kind.
fn coerce_temporal(a: SystemValue, b: SystemValue) -> (SystemValue, SystemValue) {
    let convert = |s: &str, like: &SystemValue| match like {
        SystemValue::Date(_) => string_to_date(s).map(SystemValue::Date),
        SystemValue::DateTime(_) => string_to_date_time(s).map(SystemValue::DateTime),
        SystemValue::Time(_) => string_to_time(s).map(SystemValue::Time),
        _ => None,
    };
    let left = match &a {
        SystemValue::String(s) if b.is_temporal() => convert(s, &b),
        _ => None,
    };
    let right = match &b {
        SystemValue::String(s) if a.is_temporal() => convert(s, &a),
        _ => None,
    };
    (left.unwrap_or(a), right.unwrap_or(b))
}

/// `<`, `<=`, `>` and `>=`.
pub fn comparison(operator: &str, left: &Collection, right: &Collection) -> Result<Collection, EvaluationError> {
    if !left.is_singleton() || !right.is_singleton() {
        return Ok(Collection::boolean(false));
    }
    let values = (left.nodes()[0].system_value(), right.nodes()[0].system_value());
    let (Some(a), Some(b)) = values else {
        return Err(EvaluationError::TypeError(format!(
            "Operator '{}' requires primitive operands",
            operator
        )));
    };
    let (a, b) = coerce_temporal(a, b);
    if !a.is_compatible_with(&b) {
        return Err(EvaluationError::TypeError(format!(
            "Cannot compare {} with {}",
            a.fhirpath_type(),
            b.fhirpath_type()
        )));
    }
    let Some(ordering) = a.compare(&b) else {
        return Ok(empty());
    };
    let result = match operator {
        "<" => ordering == Ordering::Less,
        "<=" => ordering != Ordering::Greater,
        ">" => ordering == Ordering::Greater,
        ">=" => ordering != Ordering::Less,
        _ => {
            return Err(EvaluationError::InvalidOperation(format!(
                "Unknown comparison operator '{}'",
                operator
            )));
        }
    };
    Ok(Collection::boolean(result))
}

fn concat_operand(collection: &Collection) -> Result<String, EvaluationError> {
    match collection.optional_single()? {
        None => Ok(String::new()),
        Some(node) => match node.system_value() {
            Some(SystemValue::String(s)) => Ok(s),
            _ => Err(EvaluationError::InvalidOperation(
                "Operator '&' requires string operands".to_string(),
            )),
        },
    }
}

fn shift_temporal(value: &SystemValue, quantity: &Quantity, negate: bool) -> Result<Option<SystemValue>, EvaluationError> {
    let unit = quantity.calendar_unit().ok_or_else(|| {
        EvaluationError::InvalidOperation(format!(
            "'{}' is not a calendar duration",
            quantity.unit
        ))
    })?;
    let Some(mut amount) = quantity.value.trunc().to_i64() else {
        return Ok(None);
    };
    if negate {
        amount = -amount;
    }
    Ok(match value {
        SystemValue::Date(d) => d.add_duration(amount, unit).map(SystemValue::Date),
        SystemValue::DateTime(dt) => dt.add_duration(amount, unit).map(SystemValue::DateTime),
        SystemValue::Time(t) => t.add_duration(amount, unit).map(SystemValue::Time),
        _ => None,
    })
}

/// `+`, `-` and `&`. Overflow yields empty.
pub fn additive(operator: &str, left: &Collection, right: &Collection) -> Result<Collection, EvaluationError> {
    if operator == "&" {
        let text = concat_operand(left)? + &concat_operand(right)?;
        return Ok(Collection::singleton(Node::string(text)));
    }
    if left.is_empty() || right.is_empty() {
        return Ok(empty());
    }
    let a = operand(left, operator)?;
    let b = operand(right, operator)?;
    let subtract = operator == "-";
    let value = match (&a, &b) {
        (SystemValue::Integer(x), SystemValue::Integer(y)) => {
            (if subtract { x.checked_sub(*y) } else { x.checked_add(*y) }).map(SystemValue::Integer)
        }
        (x, y) if x.is_numeric() && y.is_numeric() => {
            let (x, y) = (x.as_decimal(), y.as_decimal());
            match (x, y) {
                (Some(x), Some(y)) => {
                    (if subtract { x.checked_sub(y) } else { x.checked_add(y) }).map(SystemValue::Decimal)
                }
                _ => None,
            }
        }
        (SystemValue::String(x), SystemValue::String(y)) if !subtract => {
            Some(SystemValue::String(format!("{}{}", x, y)))
        }
        (SystemValue::Quantity(x), SystemValue::Quantity(y)) => {
            if !x.same_unit(y) {
                return Err(EvaluationError::InvalidOperation(format!(
                    "Cannot combine quantities in '{}' and '{}'",
                    x.unit, y.unit
                )));
            }
            (if subtract { x.checked_sub(y) } else { x.checked_add(y) }).map(SystemValue::Quantity)
        }
        (temporal, SystemValue::Quantity(q)) if temporal.is_temporal() => {
            shift_temporal(temporal, q, subtract)?
        }
        _ => return Err(unsupported(operator, &a, &b)),
    };
    Ok(from_value(value))
}

fn scale_quantity(q: &Quantity, factor: Decimal, divide: bool) -> Option<SystemValue> {
    let value = if divide {
        if factor.is_zero() {
            return None;
        }
        q.value.checked_div(factor)?
    } else {
        q.value.checked_mul(factor)?
    };
    Some(SystemValue::Quantity(Quantity::new(value, q.unit.clone())))
}

/// `*`, `/`, `div` and `mod`. Division by zero and overflow yield empty.
pub fn multiplicative(operator: &str, left: &Collection, right: &Collection) -> Result<Collection, EvaluationError> {
    if left.is_empty() || right.is_empty() {
        return Ok(empty());
    }
    let a = operand(left, operator)?;
    let b = operand(right, operator)?;
    let value = match (operator, &a, &b) {
        ("*", SystemValue::Integer(x), SystemValue::Integer(y)) => {
            x.checked_mul(*y).map(SystemValue::Integer)
        }
        ("div", SystemValue::Integer(x), SystemValue::Integer(y)) => {
            x.checked_div(*y).map(SystemValue::Integer)
        }
        ("mod", SystemValue::Integer(x), SystemValue::Integer(y)) => {
            x.checked_rem(*y).map(SystemValue::Integer)
        }
        (_, x, y) if x.is_numeric() && y.is_numeric() => {
            let (Some(x), Some(y)) = (x.as_decimal(), y.as_decimal()) else {
                return Err(unsupported(operator, &a, &b));
            };
            match operator {
                "*" => x.checked_mul(y).map(SystemValue::Decimal),
                "/" => x.checked_div(y).map(|d| SystemValue::Decimal(d.normalize())),
                "div" => x
                    .checked_div(y)
                    .and_then(|d| d.trunc().to_i64())
                    .map(SystemValue::Integer),
                "mod" => x.checked_rem(y).map(SystemValue::Decimal),
                _ => return Err(unsupported(operator, &a, &b)),
            }
        }
        ("*", SystemValue::Quantity(q), n) | ("*", n, SystemValue::Quantity(q)) if n.is_numeric() => {
            n.as_decimal().and_then(|factor| scale_quantity(q, factor, false))
        }
        ("/", SystemValue::Quantity(q), n) if n.is_numeric() => {
            n.as_decimal().and_then(|factor| scale_quantity(q, factor, true))
        }
        ("/", SystemValue::Quantity(x), SystemValue::Quantity(y)) => {
            if !x.same_unit(y) {
                return Err(unsupported(operator, &a, &b));
            }
            if y.value.is_zero() {
                None
            } else {
                x.value
                    .checked_div(y.value)
                    .map(|d| SystemValue::Quantity(Quantity::new(d.normalize(), "1")))
            }
        }
        _ => return Err(unsupported(operator, &a, &b)),
    };
    Ok(from_value(value))
}

/// Unary `+` and `-`.
pub fn polarity(operator: char, operand_collection: &Collection) -> Result<Collection, EvaluationError> {
    if operand_collection.is_empty() {
        return Ok(empty());
    }
    let value = operand(operand_collection, &operator.to_string())?;
    if operator == '+' {
        return match value {
            SystemValue::Integer(_) | SystemValue::Decimal(_) | SystemValue::Quantity(_) => {
                Ok(from_value(Some(value)))
            }
            other => Err(EvaluationError::InvalidOperation(format!(
                "Unary '+' cannot be applied to {}",
                other.fhirpath_type()
            ))),
        };
    }
    let negated = match value {
        SystemValue::Integer(i) => i.checked_neg().map(SystemValue::Integer),
        SystemValue::Decimal(d) => Some(SystemValue::Decimal(-d)),
        SystemValue::Quantity(q) => Some(SystemValue::Quantity(Quantity::new(-q.value, q.unit))),
        other => {
            return Err(EvaluationError::InvalidOperation(format!(
                "Unary '-' cannot be applied to {}",
                other.fhirpath_type()
            )));
        }
    };
    Ok(from_value(negated))
}

pub fn and(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

pub fn or(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

pub fn xor(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    Some(left? != right?)
}

pub fn implies(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(true), r) => r,
        (Some(false), _) => Some(true),
        (None, Some(true)) => Some(true),
        (None, _) => None,
    }
}

pub fn boolean_result(value: Option<bool>) -> Collection {
    from_bool(value)
}

/// `in` and `contains`: the searched item must be a singleton; an empty item
/// yields empty.
pub fn membership(operator: &str, left: &Collection, right: &Collection) -> Result<Collection, EvaluationError> {
    let (item, container) = match operator {
        "in" => (left, right),
        "contains" => (right, left),
        _ => {
            return Err(EvaluationError::InvalidOperation(format!(
                "Unknown membership operator '{}'",
                operator
            )));
        }
    };
    match item.optional_single()? {
        None => Ok(empty()),
        Some(node) => Ok(Collection::boolean(container.contains_node(node))),
    }
}

/// `|`: both operands, duplicates removed.
pub fn union(left: &Collection, right: &Collection) -> Collection {
    let mut combined = left.clone();
    combined.extend(right.clone());
    combined.distinct()
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhir_model::PrecisionDate;
    use rust_decimal_macros::dec;

    fn int(i: i64) -> Collection {
        Collection::singleton(Node::integer(i))
    }

    fn date(s: &str) -> Collection {
        Collection::singleton(Node::from_system_value(SystemValue::Date(
            PrecisionDate::parse(s).unwrap(),
        )))
    }

    #[test]
    fn equality_with_empty_and_precision() {
        assert_eq!(equality("=", &int(1), &empty()).unwrap(), empty());
        assert_eq!(equality("=", &int(1), &int(1)).unwrap(), Collection::boolean(true));
        assert_eq!(equality("=", &date("2019"), &date("2019-06")).unwrap(), empty());
        assert_eq!(equality("~", &empty(), &empty()).unwrap(), Collection::boolean(true));
    }

    #[test]
    fn comparisons() {
        assert_eq!(comparison("<", &int(1), &int(2)).unwrap(), Collection::boolean(true));
        assert_eq!(comparison(">=", &date("2019"), &date("2019-06")).unwrap(), empty());
        assert_eq!(comparison(">", &date("2020"), &date("2019-06")).unwrap(), Collection::boolean(true));
        let many = Collection::from_nodes(vec![Node::integer(1), Node::integer(2)]);
        assert_eq!(comparison("<", &many, &int(3)).unwrap(), Collection::boolean(false));
        assert_eq!(comparison("<", &empty(), &int(1)).unwrap(), Collection::boolean(false));
        assert_eq!(comparison(">=", &date("2019"), &empty()).unwrap(), Collection::boolean(false));
        let text = Collection::singleton(Node::string("a"));
        assert!(matches!(
            comparison("<", &text, &int(3)),
            Err(EvaluationError::TypeError(_))
        ));
    }

    #[test]
    fn arithmetic() {
        assert_eq!(additive("+", &int(2), &int(3)).unwrap(), int(5));
        assert_eq!(additive("+", &int(i64::MAX), &int(1)).unwrap(), empty());
        assert_eq!(
            additive("&", &Collection::singleton(Node::string("a")), &empty()).unwrap(),
            Collection::singleton(Node::string("a"))
        );
        assert_eq!(multiplicative("/", &int(1), &int(0)).unwrap(), empty());
        assert_eq!(multiplicative("div", &int(7), &int(2)).unwrap(), int(3));
        assert_eq!(multiplicative("mod", &int(7), &int(2)).unwrap(), int(1));
        assert_eq!(
            multiplicative("/", &int(3), &int(2)).unwrap(),
            Collection::singleton(Node::decimal(dec!(1.5)))
        );
        let shifted = additive(
            "+",
            &date("2019-01-31"),
            &Collection::singleton(Node::quantity(dec!(1), "month")),
        )
        .unwrap();
        assert_eq!(shifted, date("2019-02-28"));
    }

    #[test]
    fn quantity_units_must_match() {
        let mg = Collection::singleton(Node::quantity(dec!(1), "mg"));
        let g = Collection::singleton(Node::quantity(dec!(1), "g"));
        assert!(additive("+", &mg, &g).is_err());
        assert_eq!(
            additive("+", &mg, &mg).unwrap(),
            Collection::singleton(Node::quantity(dec!(2), "mg"))
        );
    }

    #[test]
    fn three_valued_logic() {
        assert_eq!(and(Some(false), None), Some(false));
        assert_eq!(and(Some(true), None), None);
        assert_eq!(or(None, Some(true)), Some(true));
        assert_eq!(xor(Some(true), None), None);
        assert_eq!(implies(Some(false), None), Some(true));
        assert_eq!(implies(None, Some(false)), None);
    }

    #[test]
    fn membership_and_union() {
        let list = Collection::from_nodes(vec![Node::integer(1), Node::integer(2)]);
        assert_eq!(membership("in", &int(2), &list).unwrap(), Collection::boolean(true));
        assert_eq!(membership("contains", &list, &empty()).unwrap(), empty());
        assert_eq!(union(&list, &int(2)).len(), 2);
    }
}
