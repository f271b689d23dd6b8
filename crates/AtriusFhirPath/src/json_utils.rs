//! JSON conversion utilities for FHIRPath results
//!
//! This module provides the functions used to render evaluation results as
//! JSON, for the CLI output and the diagnostics tree, ensuring consistent
//! handling of special types like Quantity.

use atrius_fhirpath_support::{Collection, Node, SystemValue, TypeInfo};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Map, Value, json};

const UCUM_SYSTEM: &str = "http://unitsofmeasure.org";

/// Calendar duration keywords are not UCUM codes.
fn is_calendar_keyword(unit: &str) -> bool {
    matches!(
        unit.trim_end_matches('s'),
        "year" | "month" | "week" | "day" | "hour" | "minute" | "second" | "millisecond"
    )
}

fn decimal_to_json(value: &Decimal) -> Value {
    match value.to_f64() {
        Some(f) if value.scale() > 0 || value.fract() != Decimal::ZERO => json!(f),
        Some(_) => value.to_i64().map(Value::from).unwrap_or_else(|| json!(value.to_string())),
        None => json!(value.to_string()),
    }
}

/// Converts a FHIRPath Quantity to a JSON object with proper FHIR formatting.
///
/// UCUM units carry the UCUM system and code; calendar keywords such as
/// `days` only carry `value` and `unit`.
pub fn quantity_to_json(value: &Decimal, unit: &str) -> Value {
    let numeric_value = value.to_f64().map(Value::from).unwrap_or_else(|| json!(value.to_string()));
    if is_calendar_keyword(unit) {
        json!({
            "value": numeric_value,
            "unit": unit
        })
    } else {
        json!({
            "value": numeric_value,
            "unit": unit,
            "system": UCUM_SYSTEM,
            "code": unit
        })
    }
}

pub fn system_value_to_json(value: &SystemValue) -> Value {
    match value {
        SystemValue::Boolean(b) => Value::Bool(*b),
        SystemValue::Integer(i) => Value::from(*i),
        SystemValue::Decimal(d) => decimal_to_json(d),
        SystemValue::Quantity(q) => quantity_to_json(&q.value, &q.unit),
        other => Value::String(other.to_display_string()),
    }
}

fn type_info_to_json(info: &TypeInfo) -> Value {
    let elements = |elements: &[atrius_fhirpath_support::TypeInfoElement]| {
        elements
            .iter()
            .map(|e| json!({ "name": e.name, "type": e.type_name, "isOneBased": e.is_one_based }))
            .collect::<Vec<_>>()
    };
    match info {
        TypeInfo::Simple { namespace, name, base_type } => {
            json!({ "namespace": namespace.as_str(), "name": name, "baseType": base_type })
        }
        TypeInfo::Class { namespace, name, base_type, elements: members } => json!({
            "namespace": namespace.as_str(),
            "name": name,
            "baseType": base_type,
            "element": elements(members)
        }),
        TypeInfo::Tuple { elements: members } => json!({ "element": elements(members) }),
    }
}

/// Converts a single result node.
///
/// Tree elements are serialized in FHIR JSON form; primitive elements
/// collapse to their value.
pub fn node_to_json(node: &Node) -> Value {
    if let Some(value) = node.system_value() {
        return system_value_to_json(&value);
    }
    match node {
        Node::Element(e) => e.element.to_json(),
        Node::Resource(r) => match &r.resource {
            Some(resource) => resource.to_json(),
            None => json!({ "resourceType": r.resource_type.name() }),
        },
        Node::TypeInfo(t) => type_info_to_json(&t.info),
        Node::TerminologyService => Value::String("%terminologies".to_string()),
        Node::System(s) => system_value_to_json(&s.value),
    }
}

pub fn collection_to_json(collection: &Collection) -> Value {
    Value::Array(collection.iter().map(node_to_json).collect())
}

/// Like [`collection_to_json`], annotating each item with its type and,
/// for tree nodes, its location.
pub fn typed_collection_to_json(collection: &Collection) -> Value {
    let items = collection
        .iter()
        .map(|node| {
            let mut item = Map::new();
            item.insert("type".to_string(), Value::String(node.fhirpath_type().qualified_name()));
            if let Some(path) = node.path() {
                item.insert("path".to_string(), Value::String(path.to_string()));
            }
            item.insert("value".to_string(), node_to_json(node));
            Value::Object(item)
        })
        .collect();
    Value::Array(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use atrius_fhir_model::Element;
    use std::str::FromStr;
    use std::sync::Arc;

    #[test]
    fn test_quantity_to_json_ucum() {
        let value = Decimal::from_str("1.5865").unwrap();
        let json = quantity_to_json(&value, "cm");

        assert_eq!(json["value"], 1.5865);
        assert_eq!(json["unit"], "cm");
        assert_eq!(json["system"], UCUM_SYSTEM);
        assert_eq!(json["code"], "cm");
        assert!(json["value"].is_f64());
    }

    #[test]
    fn test_quantity_to_json_calendar_unit() {
        let value = Decimal::from_str("3").unwrap();
        let json = quantity_to_json(&value, "days");

        assert_eq!(json["unit"], "days");
        assert!(json.get("system").is_none());
        assert!(json.get("code").is_none());
    }

    #[test]
    fn test_collection_to_json() {
        let patient = Arc::new(Element::new("Patient").with("active", Element::boolean(true)));
        let collection: Collection = vec![
            Node::integer(3),
            Node::decimal(Decimal::from_str("2.5").unwrap()),
            Node::string("x"),
            Node::root(patient),
        ]
        .into_iter()
        .collect();
        let json = collection_to_json(&collection);
        assert_eq!(json[0], 3);
        assert_eq!(json[1], 2.5);
        assert_eq!(json[2], "x");
        assert_eq!(json[3]["resourceType"], "Patient");
        assert_eq!(json[3]["active"], true);

        let typed = typed_collection_to_json(&Collection::singleton(Node::boolean(false)));
        assert_eq!(typed[0]["type"], "System.Boolean");
        assert_eq!(typed[0]["value"], false);
    }
}
