//! # FHIRPath CLI Tool
//!
//! This module provides a command-line interface for evaluating FHIRPath
//! expressions against FHIR resources and for applying FHIRPath Patch
//! documents.
//!
//! ## Command Line Options
//!
//! ```text
//! fhirpath-cli [--log-level <LEVEL>] <COMMAND>
//!
//! eval
//!   -e, --expression <EXPRESSION>   FHIRPath expression to evaluate
//!   -r, --resource <RESOURCE>       FHIR resource JSON file ('-' for stdin)
//!   -c, --context <CONTEXT>         Context expression to evaluate first
//!   -v, --variables <VARIABLES>     Variables JSON file
//!       --var <KEY=VALUE>           Set a variable directly
//!   -o, --output <OUTPUT>           Output file path (defaults to stdout)
//!       --diagnostics               Include the diagnostics tree and issues
//!       --trace                     Print trace() output to stderr
//!       --service-base-url <URL>    Base URL of the local server
//!
//! patch
//!   -r, --resource <RESOURCE>       FHIR resource JSON file ('-' for stdin)
//!   -p, --patch <PATCH>             FHIRPath Patch Parameters JSON file
//!   -o, --output <OUTPUT>           Output file path (defaults to stdout)
//! ```
//!
//! ## Usage Examples
//!
//! ```bash
//! fhirpath-cli eval -e "Patient.name.family" -r patient.json
//! fhirpath-cli eval -c "Patient.name" -e "family" -r patient.json
//! fhirpath-cli eval -e "value > %threshold" -r observation.json --var threshold=5.0
//! cat patient.json | fhirpath-cli eval -e "active and gender = 'male'" -r - --diagnostics
//! fhirpath-cli patch -r patient.json -p patch.json -o patched.json
//! ```

use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use atrius_fhir_model::Element;
use atrius_fhirpath_support::{Collection, Node};
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::context::EvaluationContext;
use crate::engine::{EngineConfig, FhirPathEngine};
use crate::error::{FhirPathError, FhirPathResult};
use crate::json_utils::collection_to_json;
use crate::patch_parameters::FhirPathPatch;

#[derive(Parser, Debug)]
#[command(name = "fhirpath-cli")]
#[command(about = "FHIRPath CLI tool for evaluating expressions against FHIR resources")]
#[command(version)]
pub struct Cli {
    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, env = "FHIRPATH_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate an expression
    Eval(EvalArgs),
    /// Apply a FHIRPath Patch document
    Patch(PatchArgs),
}

#[derive(Args, Debug, Default)]
pub struct EvalArgs {
    /// FHIRPath expression to evaluate
    #[arg(short, long)]
    pub expression: String,

    /// Path to FHIR resource JSON file (use '-' for stdin)
    #[arg(short, long)]
    pub resource: Option<PathBuf>,

    /// Context expression; the main expression is evaluated on each of its results
    #[arg(short, long)]
    pub context: Option<String>,

    /// Path to variables JSON file
    #[arg(short = 'v', long)]
    pub variables: Option<PathBuf>,

    /// Set a variable directly (format: key=value)
    #[arg(long = "var", value_parser = parse_var)]
    pub var: Vec<(String, String)>,

    /// Output file path (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Include the diagnostics tree, its causes and any issues in the output
    #[arg(long)]
    pub diagnostics: bool,

    /// Print trace() output to stderr
    #[arg(long)]
    pub trace: bool,

    /// Base URL of the local server, for resolving relative references
    #[arg(long, env = "FHIRPATH_SERVICE_BASE_URL")]
    pub service_base_url: Option<String>,
}

#[derive(Args, Debug)]
pub struct PatchArgs {
    /// Path to FHIR resource JSON file (use '-' for stdin)
    #[arg(short, long)]
    pub resource: PathBuf,

    /// Path to the FHIRPath Patch Parameters JSON file
    #[arg(short, long)]
    pub patch: PathBuf,

    /// Output file path (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Installs a stderr fmt subscriber; `RUST_LOG` wins over `level`.
pub fn init_logging(level: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(io::stderr)
        .try_init();
}

/// Parse a key=value pair
fn parse_var(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid variable format: {}", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

/// Main CLI execution function
pub fn run_cli(cli: Cli) -> FhirPathResult<()> {
    match cli.command {
        Command::Eval(args) => run_eval(&args),
        Command::Patch(args) => run_patch(&args),
    }
}

pub fn run_eval(args: &EvalArgs) -> FhirPathResult<()> {
    let mut config = EngineConfig::new();
    if let Some(url) = &args.service_base_url {
        config = config.with_service_base_url(url.clone());
    }
    let engine = FhirPathEngine::with_config(config);

    let resource = match &args.resource {
        Some(path) => Some(Element::from_json_str(&read_input(path)?)?),
        None => None,
    };
    let mut variables = Vec::new();
    if let Some(path) = &args.variables {
        variables.extend(load_variables_from_file(path)?);
    }
    for (key, value) in &args.var {
        variables.push((key.clone(), variable_value(value)?));
    }

    let contexts = match (&args.context, &resource) {
        (Some(context_expression), Some(root)) => {
            let focus = engine.evaluate(context_expression, root)?;
            focus
                .iter()
                .map(|node| {
                    let path = node.path().ok_or_else(|| {
                        FhirPathError::InvalidInput(format!(
                            "context expression '{}' must select elements of the resource",
                            context_expression
                        ))
                    })?;
                    Ok(EvaluationContext::from_element(root.clone(), path)?)
                })
                .collect::<FhirPathResult<Vec<_>>>()?
        }
        (Some(_), None) => {
            return Err(FhirPathError::InvalidInput(
                "a context expression needs a resource".to_string(),
            ));
        }
        (None, Some(root)) => vec![EvaluationContext::from_resource(root.clone())],
        (None, None) => vec![EvaluationContext::new()],
    };

    let mut results = Collection::empty();
    let mut trees = Vec::new();
    let mut issues = Vec::new();
    for context in contexts {
        let mut context = engine.configure(context);
        for (name, value) in &variables {
            context.set_constant(name, value.clone());
        }
        if args.diagnostics {
            let diagnosed = engine.evaluate_with_diagnostics(&args.expression, &mut context)?;
            trees.push(diagnosed.diagnostics.to_json());
            issues.extend(diagnosed.issues);
            results.extend(diagnosed.result?);
        } else {
            results.extend(engine.evaluate_with_context(&args.expression, &mut context)?);
            issues.extend(context.take_issues());
        }
        if args.trace {
            for (name, collection) in context.trace_outputs() {
                eprintln!("{}: {}", name, collection_to_json(&collection));
            }
        }
    }
    debug!(count = results.len(), issues = issues.len(), "evaluation finished");

    let output = if args.diagnostics {
        json!({
            "result": collection_to_json(&results),
            "diagnostics": trees,
            "issues": issues,
        })
    } else {
        result_to_json(&results)
    };
    write_output(&args.output, &serde_json::to_string_pretty(&output)?)
}

pub fn run_patch(args: &PatchArgs) -> FhirPathResult<()> {
    let resource = Element::from_json_str(&read_input(&args.resource)?)?;
    let document = Element::from_json_str(&fs::read_to_string(&args.patch)?)?;
    let patch = FhirPathPatch::from_parameters(&document)?;
    debug!(operations = patch.operations().len(), "applying patch");
    let patched = patch.apply(&resource)?;
    write_output(&args.output, &serde_json::to_string_pretty(&patched.to_json())?)
}

/// Read input from file or stdin
fn read_input(path: &Path) -> FhirPathResult<String> {
    if path.to_str() == Some("-") {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(path)?)
    }
}

/// Write output to file or stdout
fn write_output(path: &Option<PathBuf>, content: &str) -> FhirPathResult<()> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle.write_all(content.as_bytes())?;
            handle.write_all(b"\n")?;
        }
    }
    Ok(())
}

/// Load variables from JSON file
fn load_variables_from_file(path: &Path) -> FhirPathResult<Vec<(String, Collection)>> {
    let content = fs::read_to_string(path)?;
    let variables: HashMap<String, Value> = serde_json::from_str(&content)?;
    variables
        .into_iter()
        .map(|(key, value)| Ok((key, json_to_collection(&value)?)))
        .collect()
}

/// A `--var` value: JSON when it parses as JSON, a plain string otherwise.
fn variable_value(value: &str) -> FhirPathResult<Collection> {
    match serde_json::from_str::<Value>(value) {
        Ok(json_value) => json_to_collection(&json_value),
        Err(_) => Ok(Collection::singleton(Node::string(value))),
    }
}

/// Convert a JSON value to a collection. Objects with a `resourceType` are
/// loaded as resources; other objects are kept as their JSON text.
fn json_to_collection(value: &Value) -> FhirPathResult<Collection> {
    let node = match value {
        Value::Null => return Ok(Collection::empty()),
        Value::Bool(b) => Node::boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Node::integer(i),
            None => Node::decimal(Decimal::from_str(&n.to_string()).or_else(|_| {
                Decimal::from_scientific(&n.to_string())
                    .map_err(|e| FhirPathError::InvalidInput(format!("Invalid decimal value: {}", e)))
            })?),
        },
        Value::String(s) => Node::string(s.clone()),
        Value::Array(items) => {
            let mut collection = Collection::empty();
            for item in items {
                collection.extend(json_to_collection(item)?);
            }
            return Ok(collection);
        }
        Value::Object(object) if object.contains_key("resourceType") => {
            Node::root(Element::from_json(value)?)
        }
        Value::Object(_) => Node::string(value.to_string()),
    };
    Ok(Collection::singleton(node))
}

/// Single results are printed bare, everything else as an array.
fn result_to_json(result: &Collection) -> Value {
    match collection_to_json(result) {
        Value::Array(mut values) if values.len() == 1 => values.remove(0),
        other => other,
    }
}

/// Loads a resource from a JSON file; used by the integration tests.
pub fn load_resource(path: &Path) -> FhirPathResult<Arc<Element>> {
    Ok(Element::from_json_str(&read_input(path)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_resource() -> Value {
        json!({
            "resourceType": "Patient",
            "id": "example",
            "name": [{
                "family": "Doe",
                "given": ["John", "James"]
            }],
            "birthDate": "1990-01-01",
            "active": true
        })
    }

    fn write_resource(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("patient.json");
        fs::write(&path, create_test_resource().to_string()).unwrap();
        path
    }

    fn eval_args(expression: &str, resource: Option<PathBuf>, output: PathBuf) -> EvalArgs {
        EvalArgs {
            expression: expression.to_string(),
            resource,
            output: Some(output),
            ..EvalArgs::default()
        }
    }

    fn read_json(path: &Path) -> Value {
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_var() {
        assert_eq!(
            parse_var("key=value").unwrap(),
            ("key".to_string(), "value".to_string())
        );
        assert_eq!(
            parse_var("complex=value=with=equals").unwrap(),
            ("complex".to_string(), "value=with=equals".to_string())
        );
        assert!(parse_var("invalid").is_err());
    }

    #[test]
    fn test_basic_expression_evaluation() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out.json");
        let args = eval_args("Patient.name.family", Some(write_resource(&temp_dir)), output.clone());
        run_eval(&args).unwrap();
        assert_eq!(read_json(&output), json!("Doe"));
    }

    #[test]
    fn test_context_expression() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out.json");
        let mut args = eval_args("given", Some(write_resource(&temp_dir)), output.clone());
        args.context = Some("Patient.name".to_string());
        run_eval(&args).unwrap();
        assert_eq!(read_json(&output), json!(["John", "James"]));
    }

    #[test]
    fn test_variables() {
        let temp_dir = TempDir::new().unwrap();
        let vars_path = temp_dir.path().join("vars.json");
        fs::write(&vars_path, json!({ "threshold": 5, "testString": "hello" }).to_string()).unwrap();
        let output = temp_dir.path().join("out.json");

        let mut args = eval_args("%testString & %myVar", None, output.clone());
        args.variables = Some(vars_path);
        args.var = vec![("myVar".to_string(), "-world".to_string())];
        run_eval(&args).unwrap();
        assert_eq!(read_json(&output), json!("hello-world"));
    }

    #[test]
    fn test_diagnostics_output() {
        let temp_dir = TempDir::new().unwrap();
        let output = temp_dir.path().join("out.json");
        let mut args = eval_args("active and birthDate > @2000-01-01", Some(write_resource(&temp_dir)), output.clone());
        args.diagnostics = true;
        run_eval(&args).unwrap();
        let json = read_json(&output);
        assert_eq!(json["result"], json!([false]));
        assert_eq!(json["diagnostics"][0]["causes"], json!(["birthDate > @2000-01-01"]));
    }

    #[test]
    fn test_patch_command() {
        let temp_dir = TempDir::new().unwrap();
        let patch_path = temp_dir.path().join("patch.json");
        fs::write(
            &patch_path,
            json!({
                "resourceType": "Parameters",
                "parameter": [{
                    "name": "operation",
                    "part": [
                        { "name": "type", "valueCode": "replace" },
                        { "name": "path", "valueString": "Patient.active" },
                        { "name": "value", "valueBoolean": false }
                    ]
                }]
            })
            .to_string(),
        )
        .unwrap();
        let output = temp_dir.path().join("patched.json");
        run_patch(&PatchArgs {
            resource: write_resource(&temp_dir),
            patch: patch_path,
            output: Some(output.clone()),
        })
        .unwrap();
        let patched = read_json(&output);
        assert_eq!(patched["active"], json!(false));
        assert_eq!(patched["name"][0]["family"], json!("Doe"));
    }

    #[test]
    fn test_invalid_resource_file() {
        let temp_dir = TempDir::new().unwrap();
        let args = eval_args(
            "Patient.name",
            Some(PathBuf::from("/nonexistent/file.json")),
            temp_dir.path().join("out.json"),
        );
        assert!(matches!(run_eval(&args), Err(FhirPathError::Io(_))));
    }

    #[test]
    fn test_json_to_collection() {
        assert!(json_to_collection(&Value::Null).unwrap().is_empty());
        assert_eq!(json_to_collection(&json!(42)).unwrap(), Collection::singleton(Node::integer(42)));
        assert_eq!(
            json_to_collection(&json!(1.5)).unwrap(),
            Collection::singleton(Node::decimal(Decimal::from_str("1.5").unwrap()))
        );
        assert_eq!(json_to_collection(&json!([1, "a"])).unwrap().len(), 2);
        let patient = json_to_collection(&json!({ "resourceType": "Patient", "active": true })).unwrap();
        assert!(patient.single().unwrap().is_resource());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["fhirpath-cli", "eval", "-e", "1 + 1", "--var", "a=1"]).unwrap();
        match cli.command {
            Command::Eval(args) => {
                assert_eq!(args.expression, "1 + 1");
                assert_eq!(args.var, vec![("a".to_string(), "1".to_string())]);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(Cli::try_parse_from(["fhirpath-cli", "patch", "-r", "-"]).is_err());
    }
}
