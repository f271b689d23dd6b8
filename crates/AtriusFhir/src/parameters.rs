//! Helpers for the `Parameters` resource.
//!
//! Parameters carry operation inputs and outputs (FHIRPath Patch documents,
//! terminology results). A parameter holds a `name`, at most one of
//! `value[x]` or `resource`, and nested `part` parameters.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::element::Element;

/// Typed access to the value of a parameter.
pub trait ParameterValueAccessor {
    fn as_string(&self) -> Option<&str>;

    fn as_boolean(&self) -> Option<bool>;

    fn as_integer(&self) -> Option<i64>;

    fn as_decimal(&self) -> Option<Decimal>;
}

impl ParameterValueAccessor for Element {
    fn as_string(&self) -> Option<&str> {
        self.value()?.as_str()
    }

    fn as_boolean(&self) -> Option<bool> {
        self.value()?.as_bool()
    }

    fn as_integer(&self) -> Option<i64> {
        self.value()?.as_integer()
    }

    fn as_decimal(&self) -> Option<Decimal> {
        self.value()?.as_decimal()
    }
}

/// The parameter's name.
pub fn parameter_name(parameter: &Element) -> Option<&str> {
    parameter.child_str("name")
}

/// The `value[x]` of a parameter, falling back to its `resource`.
pub fn parameter_value(parameter: &Element) -> Option<&Arc<Element>> {
    parameter.child("value").or_else(|| parameter.child("resource"))
}

/// Top-level parameters (or parts of a parameter) named `name`.
pub fn named<'a>(container: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Arc<Element>> {
    let field = if container.type_name() == "Parameters" {
        "parameter"
    } else {
        "part"
    };
    container
        .children(field)
        .iter()
        .filter(move |p| parameter_name(p) == Some(name))
}

/// Value of the first part named `name`.
pub fn part_value<'a>(container: &'a Element, name: &'a str) -> Option<&'a Arc<Element>> {
    named(container, name).find_map(|p| parameter_value(p))
}

/// Builds a `Parameters` resource.
#[derive(Debug, Default)]
pub struct ParametersBuilder {
    parameters: Vec<Element>,
}

impl ParametersBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(mut self, name: &str, value: Element) -> Self {
        self.parameters.push(
            Element::new("Parameters.parameter")
                .with("name", Element::string(name))
                .with("value", value),
        );
        self
    }

    pub fn boolean(self, name: &str, value: bool) -> Self {
        self.value(name, Element::boolean(value))
    }

    pub fn string(self, name: &str, value: impl Into<String>) -> Self {
        self.value(name, Element::string(value))
    }

    pub fn build(self) -> Element {
        self.parameters
            .into_iter()
            .fold(Element::new("Parameters"), |parameters, parameter| {
                parameters.with("parameter", parameter)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_and_reads_parameters() {
        let parameters = ParametersBuilder::new()
            .boolean("result", true)
            .string("message", "ok")
            .build();
        assert_eq!(parameters.children("parameter").len(), 2);
        let result = part_value(&parameters, "result").unwrap();
        assert_eq!(result.as_boolean(), Some(true));
        assert_eq!(
            part_value(&parameters, "message").and_then(|m| m.as_string()),
            Some("ok")
        );
        assert!(part_value(&parameters, "missing").is_none());
    }
}
