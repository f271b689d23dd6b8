mod common;

use std::sync::Arc;

use atrius_fhir_model::Element;
use atrius_fhir_path::{EngineConfig, EvaluationContext, FhirPathEngine, FhirPathError};
use atrius_fhirpath_support::EvaluationError;
use common::*;
use serde_json::json;

#[test]
fn test_resolve_contained_reference() {
    let mut context = EvaluationContext::from_resource(patient());
    let result = eval("managingOrganization.resolve().name", &mut context).unwrap();
    assert_eq!(strings(&result), ["Acme Healthcare"]);
}

#[test]
fn test_resolve_within_bundle() {
    let mut context = EvaluationContext::from_resource(bundle());
    let family = eval(
        "entry.resource.ofType(Observation).subject.resolve().name.family",
        &mut context,
    )
    .unwrap();
    assert_eq!(strings(&family), ["Chalmers"]);

    // Contained references stay inside the entry's own resource.
    let organization = eval(
        "entry.resource.ofType(Patient).managingOrganization.resolve().name",
        &mut context,
    )
    .unwrap();
    assert_eq!(strings(&organization), ["Acme Healthcare"]);
}

#[test]
fn test_unresolved_reference_yields_typed_placeholder() {
    let mut context = EvaluationContext::from_resource(observation());
    let resolved = eval("subject.resolve()", &mut context).unwrap();
    assert_eq!(resolved.len(), 1);
    assert_eq!(boolean(&eval("subject.resolve() is Patient", &mut context).unwrap()), Some(true));
    assert!(eval("subject.resolve().id", &mut context).unwrap().is_empty());
}

#[test]
fn test_relative_reference_through_resolver() {
    let target = patient();
    let resolver = move |resource_type: &str, id: &str, _version: Option<&str>| {
        (resource_type == "Patient" && id == "example").then(|| target.clone())
    };
    let engine = FhirPathEngine::with_config(EngineConfig::new().with_reference_resolver(Arc::new(resolver)));

    let result = engine
        .evaluate("subject.resolve().name.where(use = 'official').family", &observation())
        .unwrap();
    assert_eq!(strings(&result), ["Chalmers"]);
}

#[test]
fn test_resolver_ignored_for_foreign_base() {
    let calls = Arc::new(parking_lot::Mutex::new(0));
    let counter = calls.clone();
    let resolver = move |_: &str, _: &str, _: Option<&str>| {
        *counter.lock() += 1;
        None::<Arc<Element>>
    };
    let engine = FhirPathEngine::with_config(
        EngineConfig::new()
            .with_service_base_url("http://example.org/fhir")
            .with_reference_resolver(Arc::new(resolver)),
    );
    let observation = Element::from_json(&json!({
        "resourceType": "Observation",
        "status": "final",
        "code": { "text": "weight" },
        "subject": { "reference": "http://elsewhere.org/fhir/Patient/example" }
    }))
    .unwrap();

    let result = engine.evaluate("subject.resolve().id", &observation).unwrap();
    assert!(result.is_empty());
    assert_eq!(*calls.lock(), 0);
}

#[test]
fn test_reference_type_mismatch() {
    let observation = Element::from_json(&json!({
        "resourceType": "Observation",
        "status": "final",
        "code": { "text": "weight" },
        "subject": { "reference": "Patient/example", "type": "Group" }
    }))
    .unwrap();
    let err = FhirPathEngine::new()
        .evaluate("subject.resolve()", &observation)
        .unwrap_err();
    assert!(matches!(
        err,
        FhirPathError::Evaluation(EvaluationError::InvalidArgument(_))
    ));
}
