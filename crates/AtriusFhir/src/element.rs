use std::sync::Arc;

use rust_decimal::Decimal;

use crate::catalog::{self, TypeDescriptor};
use crate::date_time::{PrecisionDate, PrecisionDateTime, PrecisionTime};

/// The value carried by a primitive element.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveValue {
    Boolean(bool),
    Integer(i64),
    Decimal(Decimal),
    /// Every string-like type: `string`, `code`, `uri`, `id`, `markdown`, ...
    String(String),
    Date(PrecisionDate),
    DateTime(PrecisionDateTime),
    Time(PrecisionTime),
}

impl PrimitiveValue {
    /// Parses the lexical form of a primitive type.
    pub fn parse(type_name: &str, text: &str) -> Option<Self> {
        let value = match type_name {
            "boolean" => match text {
                "true" => PrimitiveValue::Boolean(true),
                "false" => PrimitiveValue::Boolean(false),
                _ => return None,
            },
            "integer" | "positiveInt" | "unsignedInt" => {
                PrimitiveValue::Integer(text.parse().ok()?)
            }
            "decimal" => PrimitiveValue::Decimal(
                text.parse()
                    .ok()
                    .or_else(|| Decimal::from_scientific(text).ok())?,
            ),
            "date" => PrimitiveValue::Date(PrecisionDate::parse(text)?),
            "dateTime" | "instant" => PrimitiveValue::DateTime(PrecisionDateTime::parse(text)?),
            "time" => PrimitiveValue::Time(PrecisionTime::parse(text)?),
            _ => PrimitiveValue::String(text.to_string()),
        };
        Some(value)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PrimitiveValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PrimitiveValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            PrimitiveValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            PrimitiveValue::Decimal(d) => Some(*d),
            PrimitiveValue::Integer(i) => Some(Decimal::from(*i)),
            _ => None,
        }
    }

    /// The lexical form used in JSON and string conversion.
    pub fn to_text(&self) -> String {
        match self {
            PrimitiveValue::Boolean(b) => b.to_string(),
            PrimitiveValue::Integer(i) => i.to_string(),
            PrimitiveValue::Decimal(d) => d.to_string(),
            PrimitiveValue::String(s) => s.clone(),
            PrimitiveValue::Date(d) => d.to_string(),
            PrimitiveValue::DateTime(dt) => dt.to_string(),
            PrimitiveValue::Time(t) => t.to_string(),
        }
    }
}

/// A named list of child elements.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    name: String,
    values: Vec<Arc<Element>>,
}

impl Field {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[Arc<Element>] {
        &self.values
    }
}

/// One node of a record tree.
///
/// Children are held behind `Arc` so that an edited copy of a tree can share
/// every subtree it did not touch with the original. Fields are kept in the
/// catalog's declaration order, which makes structural equality independent
/// of the order in which children were added.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    type_name: String,
    value: Option<PrimitiveValue>,
    fields: Vec<Field>,
}

impl Element {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            value: None,
            fields: Vec::new(),
        }
    }

    pub fn primitive(type_name: impl Into<String>, value: PrimitiveValue) -> Self {
        Self {
            type_name: type_name.into(),
            value: Some(value),
            fields: Vec::new(),
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::primitive("string", PrimitiveValue::String(value.into()))
    }

    pub fn code(value: impl Into<String>) -> Self {
        Self::primitive("code", PrimitiveValue::String(value.into()))
    }

    pub fn uri(value: impl Into<String>) -> Self {
        Self::primitive("uri", PrimitiveValue::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::primitive("boolean", PrimitiveValue::Boolean(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::primitive("integer", PrimitiveValue::Integer(value))
    }

    pub fn decimal(value: Decimal) -> Self {
        Self::primitive("decimal", PrimitiveValue::Decimal(value))
    }

    pub fn date(value: PrecisionDate) -> Self {
        Self::primitive("date", PrimitiveValue::Date(value))
    }

    pub fn date_time(value: PrecisionDateTime) -> Self {
        Self::primitive("dateTime", PrimitiveValue::DateTime(value))
    }

    /// Builder form of [`Element::push_child`].
    pub fn with(mut self, name: &str, child: Element) -> Self {
        self.push_child(name, Arc::new(child));
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn descriptor(&self) -> Option<&'static TypeDescriptor> {
        catalog::type_descriptor(&self.type_name)
    }

    pub fn is_resource(&self) -> bool {
        catalog::is_resource_type(&self.type_name)
    }

    pub fn value(&self) -> Option<&PrimitiveValue> {
        self.value.as_ref()
    }

    pub fn set_value(&mut self, value: Option<PrimitiveValue>) {
        self.value = value;
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Children stored under `name`; empty when the field is absent.
    pub fn children(&self, name: &str) -> &[Arc<Element>] {
        self.field(name).map(Field::values).unwrap_or(&[])
    }

    pub fn child(&self, name: &str) -> Option<&Arc<Element>> {
        self.children(name).first()
    }

    /// String-like primitive value of the first child named `name`.
    pub fn child_str(&self, name: &str) -> Option<&str> {
        self.child(name)?.value()?.as_str()
    }

    pub fn id(&self) -> Option<&str> {
        self.child_str("id")
    }

    fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    fn field_mut(&mut self, name: &str) -> &mut Field {
        let position = match self.fields.iter().position(|f| f.name == name) {
            Some(position) => position,
            None => {
                let order = catalog::element_order(&self.type_name, name);
                let position = self
                    .fields
                    .iter()
                    .position(|f| catalog::element_order(&self.type_name, &f.name) > order)
                    .unwrap_or(self.fields.len());
                self.fields.insert(
                    position,
                    Field {
                        name: name.to_string(),
                        values: Vec::new(),
                    },
                );
                position
            }
        };
        &mut self.fields[position]
    }

    fn prune(&mut self, name: &str) {
        self.fields.retain(|f| f.name != name || !f.values.is_empty());
    }

    pub fn push_child(&mut self, name: &str, child: Arc<Element>) {
        self.field_mut(name).values.push(child);
    }

    /// Inserts at `index`; fails when `index` is past the end of the list.
    pub fn insert_child(&mut self, name: &str, index: usize, child: Arc<Element>) -> bool {
        if index > self.children(name).len() {
            return false;
        }
        self.field_mut(name).values.insert(index, child);
        true
    }

    pub fn replace_child(
        &mut self,
        name: &str,
        index: usize,
        child: Arc<Element>,
    ) -> Option<Arc<Element>> {
        let field = self.fields.iter_mut().find(|f| f.name == name)?;
        let slot = field.values.get_mut(index)?;
        Some(std::mem::replace(slot, child))
    }

    /// Removes one child, dropping the field once it is empty.
    pub fn remove_child(&mut self, name: &str, index: usize) -> Option<Arc<Element>> {
        let field = self.fields.iter_mut().find(|f| f.name == name)?;
        if index >= field.values.len() {
            return None;
        }
        let removed = field.values.remove(index);
        self.prune(name);
        Some(removed)
    }
}
