#![allow(dead_code)]

use std::sync::Arc;

use atrius_fhir_model::Element;
use atrius_fhir_path::EvaluationContext;
use atrius_fhir_path::evaluator::evaluate;
use atrius_fhir_path::parser::parse;
use atrius_fhirpath_support::{Collection, EvaluationError, SystemValue};
use serde_json::json;

// Helper function to parse and evaluate
pub fn eval(input: &str, context: &mut EvaluationContext) -> Result<Collection, EvaluationError> {
    let parsed = parse(input).unwrap_or_else(|e| {
        panic!("Parser error for input '{}': {}", input, e);
    });
    evaluate(&parsed, context)
}

pub fn eval_empty(input: &str) -> Result<Collection, EvaluationError> {
    eval(input, &mut EvaluationContext::new())
}

pub fn patient_json() -> serde_json::Value {
    json!({
        "resourceType": "Patient",
        "id": "example",
        "active": true,
        "name": [
            {
                "use": "official",
                "family": "Chalmers",
                "given": ["Peter", "James"]
            },
            {
                "use": "usual",
                "given": ["Jim"]
            }
        ],
        "gender": "male",
        "birthDate": "1974-12-25",
        "telecom": [
            { "system": "phone", "value": "(03) 5555 6473", "use": "work" },
            { "system": "email", "value": "peter@example.com", "use": "home" }
        ],
        "managingOrganization": { "reference": "#org1" },
        "contained": [
            { "resourceType": "Organization", "id": "org1", "name": "Acme Healthcare" }
        ]
    })
}

pub fn patient() -> Arc<Element> {
    Element::from_json(&patient_json()).expect("patient fixture")
}

pub fn observation() -> Arc<Element> {
    Element::from_json(&json!({
        "resourceType": "Observation",
        "id": "bp",
        "status": "final",
        "code": {
            "coding": [{ "system": "http://loinc.org", "code": "8480-6", "display": "Systolic blood pressure" }]
        },
        "subject": { "reference": "Patient/example" },
        "valueQuantity": { "value": 120.5, "unit": "mm[Hg]", "system": "http://unitsofmeasure.org", "code": "mm[Hg]" }
    }))
    .expect("observation fixture")
}

/// A transaction bundle holding the patient fixture and an observation
/// pointing at it by relative reference.
pub fn bundle() -> Arc<Element> {
    Element::from_json(&json!({
        "resourceType": "Bundle",
        "entry": [
            {
                "fullUrl": "http://example.org/fhir/Patient/example",
                "resource": patient_json()
            },
            {
                "fullUrl": "http://example.org/fhir/Observation/bp",
                "resource": {
                    "resourceType": "Observation",
                    "id": "bp",
                    "status": "final",
                    "code": { "text": "blood pressure" },
                    "subject": { "reference": "Patient/example" }
                }
            }
        ]
    }))
    .expect("bundle fixture")
}

pub fn strings(collection: &Collection) -> Vec<String> {
    collection
        .iter()
        .filter_map(|n| n.system_value())
        .map(|v| v.to_display_string())
        .collect()
}

pub fn boolean(collection: &Collection) -> Option<bool> {
    match collection.nodes() {
        [node] => match node.system_value() {
            Some(SystemValue::Boolean(b)) => Some(b),
            _ => None,
        },
        _ => None,
    }
}
