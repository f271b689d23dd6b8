//! Error types for the FHIRPath engine and its command line front end.

use atrius_fhir_model::ModelError;
use atrius_fhirpath_support::EvaluationError;
use thiserror::Error;

use crate::patch::PatchError;

pub type FhirPathResult<T> = Result<T, FhirPathError>;

#[derive(Debug, Error)]
pub enum FhirPathError {
    #[error("Parse error in '{expression}': {message}")]
    Parse { expression: String, message: String },

    #[error("Evaluation error: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<String> for FhirPathError {
    fn from(err: String) -> Self {
        FhirPathError::InvalidInput(err)
    }
}
