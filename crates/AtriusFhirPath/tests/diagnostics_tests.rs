mod common;

use atrius_fhir_path::diagnostics::{DiagnosticsBuilder, Outcome};
use atrius_fhir_path::evaluator::{EvaluationListener, evaluate_with_listener};
use atrius_fhir_path::parser::{Expression, parse};
use atrius_fhir_path::{EvaluationContext, FhirPathEngine};
use atrius_fhirpath_support::{Collection, EvaluationError};
use common::*;

#[derive(Default)]
struct CountingListener {
    before: usize,
    after: usize,
    depth: i64,
    max_depth: i64,
    min_depth: i64,
    errors: usize,
}

impl EvaluationListener for CountingListener {
    fn before_evaluation(&mut self, _expression: &Expression, _input: &Collection) {
        self.before += 1;
        self.depth += 1;
        self.max_depth = self.max_depth.max(self.depth);
    }

    fn after_evaluation(
        &mut self,
        _expression: &Expression,
        output: Result<&Collection, &EvaluationError>,
    ) {
        self.after += 1;
        self.depth -= 1;
        self.min_depth = self.min_depth.min(self.depth);
        if output.is_err() {
            self.errors += 1;
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

fn listen(expression: &str) -> (CountingListener, Result<Collection, EvaluationError>) {
    let parsed = parse(expression).unwrap();
    let mut listener = CountingListener::default();
    let mut context = EvaluationContext::from_resource(patient());
    let result = evaluate_with_listener(&parsed, &mut context, Some(&mut listener));
    (listener, result)
}

#[test]
fn test_listener_calls_are_balanced() {
    let (listener, result) = listen("name.where(use = 'official').given.count() > 1 and active");
    assert!(result.is_ok());
    assert!(listener.before > 5);
    assert_eq!(listener.before, listener.after);
    assert_eq!(listener.depth, 0);
    assert_eq!(listener.min_depth, 0);
    assert!(listener.max_depth > 2);
}

#[test]
fn test_listener_closes_nodes_on_error() {
    let (listener, result) = listen("name.given.single() = 'Peter'");
    assert!(matches!(result, Err(EvaluationError::SingletonEvaluationError(_))));
    assert_eq!(listener.before, listener.after);
    assert_eq!(listener.depth, 0);
    assert!(listener.errors >= 2);
}

#[test]
fn test_causes_for_false_invariant() {
    let engine = FhirPathEngine::new();
    let mut context = engine.context_for(patient());
    let diagnosed = engine
        .evaluate_with_diagnostics("active and gender = 'female'", &mut context)
        .unwrap();
    assert_eq!(boolean(&diagnosed.result.unwrap()), Some(false));

    let causes: Vec<&str> = diagnosed
        .diagnostics
        .causes()
        .iter()
        .map(|n| n.text.as_str())
        .collect();
    assert_eq!(causes, ["gender = 'female'"]);
}

#[test]
fn test_causes_for_failed_evaluation() {
    let engine = FhirPathEngine::new();
    let mut context = engine.context_for(patient());
    let diagnosed = engine
        .evaluate_with_diagnostics("name.given.single() = 'Peter'", &mut context)
        .unwrap();
    assert!(diagnosed.result.is_err());

    let causes = diagnosed.diagnostics.causes();
    assert_eq!(causes.len(), 1);
    assert!(causes[0].is_error());
    assert!(causes[0].text.ends_with("single()"));
}

#[test]
fn test_filter_results_are_not_causes() {
    let parsed = parse("telecom.where(system = 'email').exists() and gender = 'female'").unwrap();
    let mut builder = DiagnosticsBuilder::new(&parsed);
    let mut context = EvaluationContext::from_resource(patient());
    evaluate_with_listener(&parsed, &mut context, Some(&mut builder)).unwrap();
    let tree = builder.finish();

    let causes: Vec<&str> = tree.causes().iter().map(|n| n.text.as_str()).collect();
    assert_eq!(causes, ["gender = 'female'"]);
    assert!(tree.nodes().iter().all(|n| n.outcome != Outcome::Pending));
}

#[test]
fn test_diagnostics_json() {
    let engine = FhirPathEngine::new();
    let mut context = engine.context_for(patient());
    let diagnosed = engine
        .evaluate_with_diagnostics("birthDate > @2000-01-01", &mut context)
        .unwrap();
    let json = diagnosed.diagnostics.to_json();
    assert_eq!(json["expression"], "birthDate > @2000-01-01");
    assert_eq!(json["causes"][0], "birthDate > @2000-01-01");
    assert_eq!(json["tree"][0]["kind"], "Inequality");
    assert_eq!(json["tree"][0]["children"].as_array().map(Vec::len), Some(2));
}
