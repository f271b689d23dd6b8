mod common;

use std::fs;
use std::path::Path;

use atrius_fhir_path::cli::{Cli, run_cli};
use atrius_fhir_path::FhirPathError;
use clap::Parser;
use serde_json::{Value, json};
use tempfile::TempDir;

fn run(args: &[&str]) -> Result<(), FhirPathError> {
    let mut argv = vec!["fhirpath-cli"];
    argv.extend_from_slice(args);
    run_cli(Cli::try_parse_from(argv).unwrap())
}

fn write_json(dir: &TempDir, name: &str, value: &Value) -> String {
    let path = dir.path().join(name);
    fs::write(&path, value.to_string()).unwrap();
    path.to_string_lossy().into_owned()
}

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_eval_round_trip() {
    let dir = TempDir::new().unwrap();
    let resource = write_json(&dir, "patient.json", &common::patient_json());
    let output = dir.path().join("out.json");

    run(&[
        "eval",
        "-e",
        "name.given",
        "-r",
        &resource,
        "-o",
        output.to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(read_json(&output), json!(["Peter", "James", "Jim"]));
}

#[test]
fn test_eval_with_context_and_variable() {
    let dir = TempDir::new().unwrap();
    let resource = write_json(&dir, "patient.json", &common::patient_json());
    let output = dir.path().join("out.json");

    run(&[
        "eval",
        "-c",
        "Patient.telecom",
        "-e",
        "system = %wanted",
        "--var",
        "wanted=email",
        "-r",
        &resource,
        "-o",
        output.to_str().unwrap(),
    ])
    .unwrap();
    assert_eq!(read_json(&output), json!([false, true]));
}

#[test]
fn test_patch_round_trip() {
    let dir = TempDir::new().unwrap();
    let resource = write_json(&dir, "patient.json", &common::patient_json());
    let patch = write_json(
        &dir,
        "patch.json",
        &json!({
            "resourceType": "Parameters",
            "parameter": [{
                "name": "operation",
                "part": [
                    { "name": "type", "valueCode": "add" },
                    { "name": "path", "valueString": "Patient.name.where(use = 'usual')" },
                    { "name": "name", "valueString": "family" },
                    { "name": "value", "valueString": "Chalmers" }
                ]
            }]
        }),
    );
    let output = dir.path().join("patched.json");

    run(&["patch", "-r", &resource, "-p", &patch, "-o", output.to_str().unwrap()]).unwrap();

    let patched = read_json(&output);
    assert_eq!(patched["name"][1]["family"], json!("Chalmers"));
    assert_eq!(patched["name"][1]["given"], json!(["Jim"]));
    assert_eq!(patched["contained"][0]["id"], json!("org1"));
}

#[test]
fn test_failing_patch_reports_path() {
    let dir = TempDir::new().unwrap();
    let resource = write_json(&dir, "patient.json", &common::patient_json());
    let patch = write_json(
        &dir,
        "patch.json",
        &json!({
            "resourceType": "Parameters",
            "parameter": [{
                "name": "operation",
                "part": [
                    { "name": "type", "valueCode": "insert" },
                    { "name": "path", "valueString": "Patient.name" },
                    { "name": "index", "valueInteger": 9 },
                    { "name": "value", "valueHumanName": { "family": "Doe" } }
                ]
            }]
        }),
    );

    let err = run(&["patch", "-r", &resource, "-p", &patch]).unwrap_err();
    match err {
        FhirPathError::Patch(patch_error) => assert_eq!(patch_error.path(), "Patient.name"),
        other => panic!("unexpected error {:?}", other),
    }
}
