//! Primitive values of the expression language.

use std::cmp::Ordering;
use std::fmt;

use atrius_fhir_model::{
    CalendarUnit, PrecisionDate, PrecisionDateTime, PrecisionTime, PrimitiveValue,
    TemporalPrecision,
};
use rust_decimal::prelude::*;

use crate::traits::format_unit_for_display;
use crate::type_info::FhirPathType;

/// A decimal value with a unit: a UCUM code or a calendar keyword.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: Decimal, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    /// Calendar keywords are singular/plural insensitive; `1` is the UCUM unity.
    fn normalized_unit(&self) -> &str {
        match self.unit.as_str() {
            "years" => "year",
            "months" => "month",
            "weeks" => "week",
            "days" => "day",
            "hours" => "hour",
            "minutes" => "minute",
            "seconds" => "second",
            "milliseconds" => "millisecond",
            "" => "1",
            unit => unit,
        }
    }

    pub fn same_unit(&self, other: &Quantity) -> bool {
        self.normalized_unit() == other.normalized_unit()
    }

    /// Compares quantities expressed in the same unit.
    pub fn compare(&self, other: &Quantity) -> Option<Ordering> {
        self.same_unit(other).then(|| self.value.cmp(&other.value))
    }

    pub fn checked_add(&self, other: &Quantity) -> Option<Quantity> {
        if !self.same_unit(other) {
            return None;
        }
        Some(Quantity::new(self.value.checked_add(other.value)?, self.unit.clone()))
    }

    pub fn checked_sub(&self, other: &Quantity) -> Option<Quantity> {
        self.checked_add(&Quantity::new(-other.value, other.unit.clone()))
    }

    pub fn calendar_unit(&self) -> Option<CalendarUnit> {
        CalendarUnit::parse(&self.unit)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, format_unit_for_display(&self.unit))
    }
}

/// The kind of a [`SystemValue`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemValueKind {
    Boolean,
    Integer,
    Decimal,
    String,
    Date,
    DateTime,
    Time,
    Quantity,
}

impl SystemValueKind {
    pub const ALL: [SystemValueKind; 8] = [
        SystemValueKind::Boolean,
        SystemValueKind::Integer,
        SystemValueKind::Decimal,
        SystemValueKind::String,
        SystemValueKind::Date,
        SystemValueKind::DateTime,
        SystemValueKind::Time,
        SystemValueKind::Quantity,
    ];

    /// Kinds that may be implicitly promoted to each other for comparison.
    pub fn compatible_kinds(self) -> &'static [SystemValueKind] {
        use SystemValueKind::*;
        match self {
            Boolean => &[Boolean],
            Integer => &[Integer, Decimal],
            Decimal => &[Decimal, Integer, Quantity],
            Quantity => &[Quantity, Decimal],
            String => &[String],
            Date => &[Date, DateTime],
            DateTime => &[DateTime, Date],
            Time => &[Time],
        }
    }

    pub fn is_compatible_with(self, other: SystemValueKind) -> bool {
        self.compatible_kinds().contains(&other)
    }

    pub fn fhirpath_type(self) -> FhirPathType {
        match self {
            SystemValueKind::Boolean => FhirPathType::SYSTEM_BOOLEAN,
            SystemValueKind::Integer => FhirPathType::SYSTEM_INTEGER,
            SystemValueKind::Decimal => FhirPathType::SYSTEM_DECIMAL,
            SystemValueKind::String => FhirPathType::SYSTEM_STRING,
            SystemValueKind::Date => FhirPathType::SYSTEM_DATE,
            SystemValueKind::DateTime => FhirPathType::SYSTEM_DATE_TIME,
            SystemValueKind::Time => FhirPathType::SYSTEM_TIME,
            SystemValueKind::Quantity => FhirPathType::SYSTEM_QUANTITY,
        }
    }
}

/// A primitive value not tied to a position in a record tree.
#[derive(Debug, Clone, PartialEq)]
pub enum SystemValue {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    String(String),
    Date(PrecisionDate),
    DateTime(PrecisionDateTime),
    Time(PrecisionTime),
    Quantity(Quantity),
}

impl SystemValue {
    pub fn kind(&self) -> SystemValueKind {
        match self {
            SystemValue::Boolean(_) => SystemValueKind::Boolean,
            SystemValue::Integer(_) => SystemValueKind::Integer,
            SystemValue::Decimal(_) => SystemValueKind::Decimal,
            SystemValue::String(_) => SystemValueKind::String,
            SystemValue::Date(_) => SystemValueKind::Date,
            SystemValue::DateTime(_) => SystemValueKind::DateTime,
            SystemValue::Time(_) => SystemValueKind::Time,
            SystemValue::Quantity(_) => SystemValueKind::Quantity,
        }
    }

    pub fn fhirpath_type(&self) -> FhirPathType {
        self.kind().fhirpath_type()
    }

    pub fn from_primitive(value: &PrimitiveValue) -> Self {
        match value {
            PrimitiveValue::Boolean(b) => SystemValue::Boolean(*b),
            PrimitiveValue::Integer(i) => SystemValue::Integer(*i),
            PrimitiveValue::Decimal(d) => SystemValue::Decimal(*d),
            PrimitiveValue::String(s) => SystemValue::String(s.clone()),
            PrimitiveValue::Date(d) => SystemValue::Date(d.clone()),
            PrimitiveValue::DateTime(dt) => SystemValue::DateTime(dt.clone()),
            PrimitiveValue::Time(t) => SystemValue::Time(t.clone()),
        }
    }

    pub fn is_compatible_with(&self, other: &SystemValue) -> bool {
        self.kind().is_compatible_with(other.kind())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, SystemValue::Integer(_) | SystemValue::Decimal(_))
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            SystemValue::Date(_) | SystemValue::DateTime(_) | SystemValue::Time(_)
        )
    }

    /// Numeric value as a decimal.
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            SystemValue::Integer(i) => Some(Decimal::from(*i)),
            SystemValue::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SystemValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn temporal_precision(&self) -> Option<TemporalPrecision> {
        match self {
            SystemValue::Date(d) => Some(d.temporal_precision()),
            SystemValue::DateTime(dt) => Some(dt.temporal_precision()),
            SystemValue::Time(t) => Some(t.temporal_precision()),
            _ => None,
        }
    }

    /// Orders two values. `None` means the pair is not comparable, either
    /// because the kinds differ or because temporal precision leaves the
    /// answer open.
    pub fn compare(&self, other: &SystemValue) -> Option<Ordering> {
        use SystemValue::*;
        match (self, other) {
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Integer(_) | Decimal(_), Integer(_) | Decimal(_)) => {
                Some(self.as_decimal()?.cmp(&other.as_decimal()?))
            }
            (String(a), String(b)) => Some(a.cmp(b)),
            (Date(a), Date(b)) => a.compare(b),
            (DateTime(a), DateTime(b)) => a.compare(b),
            (Date(a), DateTime(b)) => PrecisionDateTime::from_precision_date(a.clone()).compare(b),
            (DateTime(a), Date(b)) => a.compare(&PrecisionDateTime::from_precision_date(b.clone())),
            (Time(a), Time(b)) => a.compare(b),
            (Quantity(a), Quantity(b)) => a.compare(b),
            (Decimal(d), Quantity(q)) if q.normalized_unit() == "1" => Some(d.cmp(&q.value)),
            (Quantity(q), Decimal(d)) if q.normalized_unit() == "1" => Some(q.value.cmp(d)),
            _ => None,
        }
    }

    /// Equality for `=`. `None` means the result is unknown because the
    /// operands have different temporal precision.
    pub fn equals(&self, other: &SystemValue) -> Option<bool> {
        if let (Some(a), Some(b)) = (self.temporal_precision(), other.temporal_precision()) {
            if !a.is_comparable_with(b) {
                return None;
            }
            return self.compare(other).map(|o| o == Ordering::Equal);
        }
        match (self, other) {
            (SystemValue::Boolean(a), SystemValue::Boolean(b)) => Some(a == b),
            (SystemValue::Quantity(a), SystemValue::Quantity(b)) => {
                Some(a.same_unit(b) && a.value == b.value)
            }
            _ => Some(self.compare(other) == Some(Ordering::Equal)),
        }
    }

    /// Equivalence for `~`: case- and whitespace-insensitive strings, decimals
    /// compared at the precision of the less precise operand, and `false`
    /// rather than unknown for temporals of different precision.
    pub fn equivalent(&self, other: &SystemValue) -> bool {
        match (self, other) {
            (SystemValue::String(a), SystemValue::String(b)) => {
                normalize_whitespace(a).to_lowercase() == normalize_whitespace(b).to_lowercase()
            }
            (SystemValue::Decimal(_), SystemValue::Decimal(_) | SystemValue::Integer(_))
            | (SystemValue::Integer(_), SystemValue::Decimal(_)) => {
                match (self.as_decimal(), other.as_decimal()) {
                    (Some(a), Some(b)) => {
                        let scale = a.scale().min(b.scale());
                        a.round_dp(scale) == b.round_dp(scale)
                    }
                    _ => false,
                }
            }
            _ => self.equals(other).unwrap_or(false),
        }
    }

    /// Text used by `toString()` and string concatenation.
    pub fn to_display_string(&self) -> String {
        match self {
            SystemValue::Boolean(b) => b.to_string(),
            SystemValue::Integer(i) => i.to_string(),
            SystemValue::Decimal(d) => d.to_string(),
            SystemValue::String(s) => s.clone(),
            SystemValue::Date(d) => d.to_string(),
            SystemValue::DateTime(dt) => dt.to_string(),
            SystemValue::Time(t) => t.to_string(),
            SystemValue::Quantity(q) => q.to_string(),
        }
    }
}

impl fmt::Display for SystemValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn mixed_numbers_compare_as_decimals() {
        let one = SystemValue::Integer(1);
        let one_point_five = SystemValue::Decimal(dec!(1.5));
        assert_eq!(one.compare(&one_point_five), Some(Ordering::Less));
        assert_eq!(SystemValue::Decimal(dec!(1.0)).equals(&one), Some(true));
    }

    #[test]
    fn temporal_equality_needs_matching_precision() {
        let year = SystemValue::Date(PrecisionDate::parse("2019").unwrap());
        let month = SystemValue::Date(PrecisionDate::parse("2019-06").unwrap());
        assert_eq!(year.equals(&month), None);
        assert_eq!(year.compare(&month), None);
        assert!(!year.equivalent(&month));
    }

    #[test]
    fn quantities_need_matching_units() {
        let kg = SystemValue::Quantity(Quantity::new(dec!(4), "kg"));
        let g = SystemValue::Quantity(Quantity::new(dec!(4), "g"));
        assert_eq!(kg.compare(&g), None);
        assert_eq!(kg.equals(&g), Some(false));
        let days = Quantity::new(dec!(3), "days");
        assert!(days.same_unit(&Quantity::new(dec!(1), "day")));
    }

    #[test]
    fn string_equivalence_ignores_case_and_spacing() {
        let a = SystemValue::String("Hello   World".into());
        let b = SystemValue::String("hello world".into());
        assert!(a.equivalent(&b));
        assert_eq!(a.equals(&b), Some(false));
    }
}
