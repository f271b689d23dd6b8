//! FHIR JSON reading and writing driven by the type catalog.

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::catalog::{self, ElementDescriptor, TypeKind};
use crate::element::{Element, PrimitiveValue};
use crate::error::ModelError;

static NULL: Value = Value::Null;

impl Element {
    /// Reads a resource from FHIR JSON text.
    pub fn from_json_str(text: &str) -> Result<Arc<Element>, ModelError> {
        let value: Value = serde_json::from_str(text)?;
        Element::from_json(&value)
    }

    /// Reads a resource; the type comes from `resourceType`.
    pub fn from_json(value: &Value) -> Result<Arc<Element>, ModelError> {
        read_resource(value).map(Arc::new)
    }

    /// Reads a value of a known type, e.g. a `HumanName` object or a `code` string.
    pub fn from_json_typed(type_name: &str, value: &Value) -> Result<Element, ModelError> {
        read_value(type_name, value, None)
    }

    pub fn to_json(&self) -> Value {
        if self.value().is_some() && self.fields().is_empty() {
            return self.value().map(primitive_json).unwrap_or(Value::Null);
        }
        let mut object = Map::new();
        if self.is_resource() {
            object.insert(
                "resourceType".to_string(),
                Value::String(self.type_name().to_string()),
            );
        }
        if let Some(value) = self.value() {
            object.insert("value".to_string(), primitive_json(value));
        }
        for field in self.fields() {
            let descriptor = catalog::element_descriptor(self.type_name(), field.name());
            let repeating = descriptor.is_some_and(|d| d.repeating) || field.values().len() > 1;
            let key_for = |child: &Element| match descriptor {
                Some(d) => d.json_key(child.type_name()),
                None => field.name().to_string(),
            };
            let Some(first) = field.values().first() else {
                continue;
            };
            let key = key_for(first);
            if catalog::is_primitive_type(first.type_name()) {
                let (values, shadows): (Vec<Value>, Vec<Value>) = field
                    .values()
                    .iter()
                    .map(|child| {
                        let value = child.value().map(primitive_json).unwrap_or(Value::Null);
                        (value, shadow_json(child))
                    })
                    .unzip();
                let has_shadow = shadows.iter().any(|s| !s.is_null());
                if repeating {
                    object.insert(key.clone(), Value::Array(values));
                    if has_shadow {
                        object.insert(format!("_{}", key), Value::Array(shadows));
                    }
                } else {
                    if let Some(value) = values.into_iter().next() {
                        object.insert(key.clone(), value);
                    }
                    if has_shadow {
                        if let Some(shadow) = shadows.into_iter().next() {
                            object.insert(format!("_{}", key), shadow);
                        }
                    }
                }
            } else if repeating {
                let values = field.values().iter().map(|c| c.to_json()).collect();
                object.insert(key, Value::Array(values));
            } else {
                object.insert(key, first.to_json());
            }
        }
        Value::Object(object)
    }
}

fn read_resource(value: &Value) -> Result<Element, ModelError> {
    let object = value
        .as_object()
        .ok_or_else(|| ModelError::ExpectedObject("Resource".to_string()))?;
    let resource_type = object
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or(ModelError::MissingResourceType)?;
    if !catalog::is_resource_type(resource_type) {
        return Err(ModelError::UnknownResourceType(resource_type.to_string()));
    }
    read_complex(resource_type, object)
}

fn read_value(type_name: &str, value: &Value, shadow: Option<&Value>) -> Result<Element, ModelError> {
    if type_name == "Resource" {
        return read_resource(value);
    }
    let descriptor = catalog::type_descriptor(type_name)
        .ok_or_else(|| ModelError::UnknownType(type_name.to_string()))?;
    match descriptor.kind {
        TypeKind::Primitive => read_primitive(type_name, value, shadow),
        _ => {
            let object = value
                .as_object()
                .ok_or_else(|| ModelError::ExpectedObject(type_name.to_string()))?;
            read_complex(type_name, object)
        }
    }
}

fn read_primitive(type_name: &str, value: &Value, shadow: Option<&Value>) -> Result<Element, ModelError> {
    let mut element = match shadow.and_then(Value::as_object) {
        Some(extras) => read_complex(type_name, extras)?,
        None => Element::new(type_name),
    };
    let text = match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => {
            return Err(ModelError::InvalidPrimitive {
                type_name: type_name.to_string(),
                text: value.to_string(),
            })
        }
    };
    if let Some(text) = text {
        let parsed = PrimitiveValue::parse(type_name, &text).ok_or_else(|| {
            ModelError::InvalidPrimitive {
                type_name: type_name.to_string(),
                text: text.clone(),
            }
        })?;
        element.set_value(Some(parsed));
    }
    Ok(element)
}

fn read_complex(type_name: &str, object: &Map<String, Value>) -> Result<Element, ModelError> {
    let descriptor = catalog::type_descriptor(type_name)
        .ok_or_else(|| ModelError::UnknownType(type_name.to_string()))?;
    let elements = descriptor.all_elements();
    let mut element = Element::new(type_name);

    for (key, value) in object {
        if key == "resourceType" && descriptor.is_resource() {
            continue;
        }
        // Primitive types keep their value in `value` when read from a `_x` object.
        if key == "value" && descriptor.kind == TypeKind::Primitive {
            continue;
        }
        let (base_key, value, shadow) = match key.strip_prefix('_') {
            // `_x` alone carries id/extension for a primitive without a value.
            Some(stripped) if !object.contains_key(stripped) => (stripped, &NULL, Some(value)),
            Some(_) => continue,
            None => (key.as_str(), value, object.get(&format!("_{}", key))),
        };
        let (element_descriptor, child_type) = resolve_key(&elements, base_key).ok_or_else(|| {
            ModelError::UnknownElement {
                type_name: type_name.to_string(),
                element: base_key.to_string(),
            }
        })?;
        read_field(&mut element, element_descriptor, child_type, value, shadow)?;
    }
    Ok(element)
}

fn resolve_key(
    elements: &[&'static ElementDescriptor],
    key: &str,
) -> Option<(&'static ElementDescriptor, &'static str)> {
    elements
        .iter()
        .find_map(|d| d.type_for_key(key).map(|t| (*d, t)))
}

fn read_field(
    parent: &mut Element,
    descriptor: &ElementDescriptor,
    type_name: &str,
    value: &Value,
    shadow: Option<&Value>,
) -> Result<(), ModelError> {
    match value {
        Value::Array(items) => {
            let shadows = shadow.and_then(Value::as_array);
            for (index, item) in items.iter().enumerate() {
                let item_shadow = shadows.and_then(|s| s.get(index)).filter(|s| !s.is_null());
                if item.is_null() && item_shadow.is_none() {
                    continue;
                }
                let child = read_value(type_name, item, item_shadow)?;
                parent.push_child(descriptor.name, Arc::new(child));
            }
        }
        Value::Null if shadow.is_some_and(Value::is_array) => {
            let nulls = vec![Value::Null; shadow.and_then(Value::as_array).map_or(0, Vec::len)];
            read_field(parent, descriptor, type_name, &Value::Array(nulls), shadow)?;
        }
        _ => {
            let child = read_value(type_name, value, shadow)?;
            parent.push_child(descriptor.name, Arc::new(child));
        }
    }
    Ok(())
}

fn primitive_json(value: &PrimitiveValue) -> Value {
    match value {
        PrimitiveValue::Boolean(b) => Value::Bool(*b),
        PrimitiveValue::Integer(i) => Value::from(*i),
        PrimitiveValue::Decimal(d) => serde_json::from_str::<Value>(&d.to_string())
            .unwrap_or_else(|_| Value::String(d.to_string())),
        other => Value::String(other.to_text()),
    }
}

/// The `_x` companion object holding a primitive's id and extensions.
fn shadow_json(element: &Element) -> Value {
    if element.fields().is_empty() {
        return Value::Null;
    }
    let mut bare = element.clone();
    bare.set_value(None);
    bare.to_json()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reads_choice_and_primitive_extensions() {
        let observation = Element::from_json(&json!({
            "resourceType": "Observation",
            "status": "final",
            "valueQuantity": { "value": 185, "unit": "lbs", "system": "http://unitsofmeasure.org", "code": "[lb_av]" },
            "_status": { "extension": [{ "url": "http://example.org/ext", "valueString": "x" }] }
        }))
        .unwrap();

        let value = observation.child("value").unwrap();
        assert_eq!(value.type_name(), "Quantity");
        let status = observation.child("status").unwrap();
        assert_eq!(status.value().and_then(PrimitiveValue::as_str), Some("final"));
        assert_eq!(status.children("extension").len(), 1);
    }

    #[test]
    fn round_trips_through_json() {
        let source = json!({
            "resourceType": "Patient",
            "id": "example",
            "active": true,
            "name": [{ "family": "Chalmers", "given": ["Peter", "James"] }],
            "birthDate": "1974-12-25",
            "contained": [{ "resourceType": "Organization", "id": "org1", "name": "Acme" }]
        });
        let patient = Element::from_json(&source).unwrap();
        assert_eq!(patient.to_json(), source);
    }

    #[test]
    fn rejects_unknown_elements() {
        let err = Element::from_json(&json!({ "resourceType": "Patient", "colour": "blue" }))
            .unwrap_err();
        assert!(matches!(err, ModelError::UnknownElement { .. }));
        assert!(matches!(
            Element::from_json(&json!({ "resourceType": "Spaceship" })).unwrap_err(),
            ModelError::UnknownResourceType(_)
        ));
    }
}
