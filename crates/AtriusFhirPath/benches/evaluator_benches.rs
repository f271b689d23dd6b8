use std::sync::Arc;

use atrius_fhir_model::Element;
use atrius_fhir_path::patch::{delete, move_element};
use atrius_fhir_path::{EvaluationContext, FhirPathEngine, evaluate_expression};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

fn create_patient() -> Arc<Element> {
    Element::from_json(&json!({
        "resourceType": "Patient",
        "id": "complex",
        "active": true,
        "name": [
            { "use": "official", "family": "Chalmers", "given": ["Peter", "James"] },
            { "use": "usual", "family": "Chalmers", "given": ["Jim"] },
            { "use": "maiden", "family": "Windsor", "given": ["Peter", "James"] }
        ],
        "gender": "male",
        "birthDate": "1974-12-25",
        "telecom": [
            { "system": "phone", "value": "(03) 5555 6473", "use": "work" },
            { "system": "phone", "value": "(03) 3410 5613", "use": "mobile" },
            { "system": "email", "value": "peter@example.com", "use": "home" }
        ],
        "managingOrganization": { "reference": "#org1" },
        "contained": [
            { "resourceType": "Organization", "id": "org1", "name": "Acme Healthcare" }
        ]
    }))
    .unwrap()
}

fn bench_navigation(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator/navigation");
    let engine = FhirPathEngine::new();
    let patient = create_patient();

    group.bench_function("single_field", |b| {
        b.iter(|| engine.evaluate(black_box("Patient.active"), &patient))
    });

    group.bench_function("nested_field", |b| {
        b.iter(|| engine.evaluate(black_box("Patient.name.family"), &patient))
    });

    group.bench_function("indexed_access", |b| {
        b.iter(|| engine.evaluate(black_box("Patient.name[0].given[1]"), &patient))
    });

    group.bench_function("resolve_contained", |b| {
        b.iter(|| engine.evaluate(black_box("managingOrganization.resolve().name"), &patient))
    });

    group.finish();
}

fn bench_parse_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator/parse_cache");
    let engine = FhirPathEngine::new();
    let patient = create_patient();
    let expression = "telecom.where(system = 'phone' and use = 'mobile').value.exists()";

    group.bench_function("cached", |b| b.iter(|| engine.evaluate(black_box(expression), &patient)));

    group.bench_function("uncached", |b| {
        b.iter(|| {
            let mut context = EvaluationContext::from_resource(patient.clone());
            evaluate_expression(black_box(expression), &mut context)
        })
    });

    group.finish();
}

fn bench_invariants(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator/invariants");
    let engine = FhirPathEngine::new();
    let patient = create_patient();

    group.bench_function("eval_bool", |b| {
        b.iter(|| {
            engine.eval_bool(
                black_box("name.exists() implies name.where(use = 'official').family.exists()"),
                &patient,
            )
        })
    });

    group.bench_function("with_diagnostics", |b| {
        b.iter(|| {
            let mut context = engine.context_for(patient.clone());
            engine.evaluate_with_diagnostics(
                black_box("active and gender = 'female' and birthDate > @2000-01-01"),
                &mut context,
            )
        })
    });

    group.finish();
}

fn bench_patch(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluator/patch");
    let patient = create_patient();

    group.bench_function("delete", |b| {
        b.iter(|| delete(&patient, black_box("Patient.telecom.where(system = 'email')")))
    });

    group.bench_function("move", |b| {
        b.iter(|| move_element(&patient, black_box("Patient.name"), 2, 0))
    });

    group.finish();
}

criterion_group!(benches, bench_navigation, bench_parse_cache, bench_invariants, bench_patch);
criterion_main!(benches);
