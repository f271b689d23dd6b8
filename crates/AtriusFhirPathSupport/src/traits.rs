use std::sync::Arc;

use atrius_fhir_model::{Element, PrecisionDate, PrecisionDateTime, PrecisionTime};
use rust_decimal::Decimal;

use crate::collection::Collection;
use crate::node::Node;
use crate::system_value::{Quantity, SystemValue};

/// Conversion of host values into FHIRPath collections.
///
/// Used by the evaluator for literal results and by callers that bind
/// external constants (`%name`) from plain Rust values.
///
/// ```rust
/// use atrius_fhirpath_support::{Collection, IntoCollection, Node};
///
/// assert_eq!("hello".to_collection(), Collection::singleton(Node::string("hello")));
/// assert_eq!(None::<i64>.to_collection(), Collection::empty());
/// assert_eq!(vec![1_i64, 2, 3].to_collection().len(), 3);
/// ```
pub trait IntoCollection {
    fn to_collection(&self) -> Collection;
}

macro_rules! system_value_conversion {
    ($ty:ty, |$v:ident| $value:expr) => {
        impl IntoCollection for $ty {
            fn to_collection(&self) -> Collection {
                let $v = self;
                Collection::singleton(Node::from_system_value($value))
            }
        }
    };
}

system_value_conversion!(bool, |v| SystemValue::Boolean(*v));
system_value_conversion!(i32, |v| SystemValue::Integer(i64::from(*v)));
system_value_conversion!(i64, |v| SystemValue::Integer(*v));
system_value_conversion!(Decimal, |v| SystemValue::Decimal(*v));
system_value_conversion!(str, |v| SystemValue::String(v.to_string()));
system_value_conversion!(String, |v| SystemValue::String(v.clone()));
system_value_conversion!(PrecisionDate, |v| SystemValue::Date(v.clone()));
system_value_conversion!(PrecisionDateTime, |v| SystemValue::DateTime(v.clone()));
system_value_conversion!(PrecisionTime, |v| SystemValue::Time(v.clone()));
system_value_conversion!(Quantity, |v| SystemValue::Quantity(v.clone()));
system_value_conversion!(SystemValue, |v| v.clone());

impl IntoCollection for Node {
    fn to_collection(&self) -> Collection {
        Collection::singleton(self.clone())
    }
}

impl IntoCollection for Collection {
    fn to_collection(&self) -> Collection {
        self.clone()
    }
}

/// A record bound as a constant becomes the root of its own tree.
impl IntoCollection for Arc<Element> {
    fn to_collection(&self) -> Collection {
        Collection::singleton(Node::root(self.clone()))
    }
}

impl<T> IntoCollection for Option<T>
where
    T: IntoCollection,
{
    fn to_collection(&self) -> Collection {
        match self {
            Some(value) => value.to_collection(),
            None => Collection::empty(),
        }
    }
}

impl<T> IntoCollection for Vec<T>
where
    T: IntoCollection,
{
    fn to_collection(&self) -> Collection {
        let mut out = Collection::empty();
        for item in self {
            out.extend(item.to_collection());
        }
        out
    }
}

impl<T> IntoCollection for &T
where
    T: IntoCollection + ?Sized,
{
    fn to_collection(&self) -> Collection {
        (*self).to_collection()
    }
}

/// Formats a unit for `toString()`: calendar keywords bare, UCUM codes quoted.
pub(crate) fn format_unit_for_display(unit: &str) -> String {
    const CALENDAR_WORDS: &[&str] = &[
        "year",
        "years",
        "month",
        "months",
        "week",
        "weeks",
        "day",
        "days",
        "hour",
        "hours",
        "minute",
        "minutes",
        "second",
        "seconds",
        "millisecond",
        "milliseconds",
    ];

    if CALENDAR_WORDS.contains(&unit) {
        unit.to_string()
    } else {
        format!("'{}'", unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_display_like_literals() {
        assert_eq!(format_unit_for_display("days"), "days");
        assert_eq!(format_unit_for_display("mg"), "'mg'");
        let q = Quantity::new(Decimal::new(25, 1), "mg");
        assert_eq!(q.to_string(), "2.5 'mg'");
        assert_eq!(Quantity::new(Decimal::from(3), "weeks").to_string(), "3 weeks");
    }

    #[test]
    fn nested_options_flatten() {
        let values = vec![Some(1_i64), None, Some(3)];
        assert_eq!(values.to_collection().len(), 2);
    }
}
