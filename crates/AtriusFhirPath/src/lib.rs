//! # FHIRPath Expression Engine
//!
//! This crate evaluates [FHIRPath](https://hl7.org/fhirpath/) expressions
//! against FHIR record trees, explains why constraints evaluated false, and
//! applies FHIRPath Patch operations.
//!
//! ## Overview
//!
//! FHIRPath is a path-based navigation and extraction language for FHIR
//! resources. With this crate you can:
//! - **Navigate resources** with path expressions (e.g. `Patient.name.family`)
//! - **Filter collections** with predicates (e.g. `telecom.where(system = 'email')`)
//! - **Check invariants** as singleton booleans (`FhirPathEngine::eval_bool`)
//! - **Explain failures** through a diagnostics tree of every sub-expression
//! - **Patch resources** with add, delete, replace, insert and move
//!
//! ## Architecture
//!
//! - **Parser** (`parser.rs`): chumsky grammar producing a spanned [`parser::Expression`] tree
//! - **Context** (`context.rs`): the source tree, constants, providers and issue sinks of one evaluation
//! - **Evaluator** (`evaluator.rs`): walks the tree; lazily evaluated functions live here
//! - **Registry** (`registry.rs`): every other function, looked up by name with arity checks
//! - **Function modules**: existence, subsetting, conversion, string, math,
//!   navigation, type, utility, reference resolution and terminology functions
//! - **Diagnostics** (`diagnostics.rs`): listener building an explanation tree
//! - **Patch** (`patch.rs`, `patch_parameters.rs`): copy-on-write structural edits
//! - **Engine** (`engine.rs`): configured facade with a parse cache
//!
//! ## Usage Examples
//!
//! ### Basic Navigation
//!
//! ```rust
//! use std::sync::Arc;
//! use atrius_fhir_model::Element;
//! use atrius_fhir_path::{EvaluationContext, evaluate_expression};
//!
//! let patient = Element::from_json_str(
//!     r#"{"resourceType": "Patient", "name": [{"family": "Chalmers", "given": ["Peter", "James"]}]}"#,
//! )?;
//! let mut context = EvaluationContext::from_resource(patient);
//!
//! let result = evaluate_expression("Patient.name.given.first()", &mut context)?;
//! assert_eq!(result.single()?.system_value().and_then(|v| v.as_str().map(str::to_string)),
//!            Some("Peter".to_string()));
//!
//! let count = evaluate_expression("name.given.count()", &mut context)?;
//! assert_eq!(count, 2.to_collection());
//! # use atrius_fhirpath_support::IntoCollection;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Invariants
//!
//! ```rust
//! use std::sync::Arc;
//! use atrius_fhir_model::Element;
//! use atrius_fhir_path::FhirPathEngine;
//!
//! let engine = FhirPathEngine::new();
//! let patient = Arc::new(Element::new("Patient").with("active", Element::boolean(true)));
//! assert!(engine.eval_bool("active.exists() implies active", &patient)?);
//! # Ok::<(), atrius_fhir_path::FhirPathError>(())
//! ```
//!
//! ### Variables and Constants
//!
//! ```rust
//! use atrius_fhir_path::{EvaluationContext, evaluate_expression};
//! use atrius_fhirpath_support::IntoCollection;
//!
//! let mut context = EvaluationContext::new().with_constant("threshold", 5);
//! let result = evaluate_expression("%threshold * 2 > 8", &mut context)?;
//! assert_eq!(result, true.to_collection());
//! # Ok::<(), atrius_fhir_path::FhirPathError>(())
//! ```
//!
//! ## Concurrency
//!
//! An [`EvaluationContext`] serves one evaluation on one thread. The
//! function registry and the engine are immutable after construction and can
//! be shared freely.

pub mod boolean_functions;
pub mod context;
pub mod conversion_functions;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod existence_functions;
pub mod json_utils;
pub mod math_functions;
pub mod navigation_functions;
pub mod operators;
pub mod parser;
pub mod patch;
pub mod patch_parameters;
pub mod profile_functions;
pub mod registry;
pub mod resolve_function;
pub mod string_functions;
pub mod subset_functions;
pub mod terminology;
pub mod terminology_functions;
pub mod type_function;
pub mod utility_functions;

pub mod cli;

pub use context::EvaluationContext;
pub use diagnostics::{DiagnosticsBuilder, DiagnosticsTree};
pub use engine::{EngineConfig, FhirPathEngine};
pub use error::{FhirPathError, FhirPathResult};
pub use evaluator::EvaluationListener;
pub use patch::PatchError;
pub use patch_parameters::{FhirPathPatch, PatchOperation};
pub use registry::{FhirPathFunction, FunctionRegistry};
pub use resolve_function::ReferenceResolver;
pub use terminology::{InMemoryTerminologyProvider, TerminologyProvider};

use atrius_fhirpath_support::Collection;

/// Evaluates a FHIRPath expression against a given context.
///
/// Combines parsing and evaluation into a single call. Use
/// [`FhirPathEngine`] when the same expressions are evaluated repeatedly.
///
/// # Arguments
///
/// * `expression` - The FHIRPath expression string to evaluate
/// * `context` - The evaluation context; warnings and errors recorded during
///   evaluation stay on it
///
/// # Returns
///
/// * `Ok(Collection)` - The result of the expression
/// * `Err(FhirPathError)` - A parse or evaluation error
pub fn evaluate_expression(
    expression: &str,
    context: &mut EvaluationContext,
) -> FhirPathResult<Collection> {
    let parsed = parser::parse(expression)?;
    Ok(evaluator::evaluate(&parsed, context)?)
}
