//! FHIRPath Patch documents.
//!
//! A patch is a `Parameters` resource with one `operation` parameter per
//! step. Each operation has a `type` part (`add`, `insert`, `delete`,
//! `replace`, `move`), a `path` part and, depending on the type, `name`,
//! `value`, `index`, `source` and `destination` parts. Operations are
//! applied in order with the functions of [`crate::patch`]; the first
//! failure aborts the whole patch.

use std::sync::Arc;

use atrius_fhir_model::Element;
use atrius_fhir_model::parameters::{ParameterValueAccessor, named, part_value};
use tracing::debug;

use crate::patch::{self, PatchError};

/// One step of a FHIRPath Patch.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchOperation {
    Add { path: String, name: String, value: Element },
    Insert { path: String, index: usize, value: Element },
    Delete { path: String },
    Replace { path: String, value: Element },
    Move { path: String, source: usize, destination: usize },
}

impl PatchOperation {
    pub fn path(&self) -> &str {
        match self {
            PatchOperation::Add { path, .. }
            | PatchOperation::Insert { path, .. }
            | PatchOperation::Delete { path }
            | PatchOperation::Replace { path, .. }
            | PatchOperation::Move { path, .. } => path,
        }
    }

    pub fn apply(&self, root: &Arc<Element>) -> Result<Arc<Element>, PatchError> {
        match self {
            PatchOperation::Add { path, name, value } => patch::add(root, path, name, value.clone()),
            PatchOperation::Insert { path, index, value } => patch::insert(root, path, *index, value.clone()),
            PatchOperation::Delete { path } => patch::delete(root, path),
            PatchOperation::Replace { path, value } => patch::replace(root, path, value.clone()),
            PatchOperation::Move {
                path,
                source,
                destination,
            } => patch::move_element(root, path, *source, *destination),
        }
    }
}

/// An ordered list of patch operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FhirPathPatch {
    operations: Vec<PatchOperation>,
}

impl FhirPathPatch {
    pub fn new(operations: Vec<PatchOperation>) -> Self {
        Self { operations }
    }

    pub fn operations(&self) -> &[PatchOperation] {
        &self.operations
    }

    /// Reads a patch from a `Parameters` resource.
    pub fn from_parameters(parameters: &Element) -> Result<Self, PatchError> {
        if parameters.type_name() != "Parameters" {
            return Err(PatchError::Invalid {
                path: String::new(),
                message: format!("a FHIRPath Patch is a Parameters resource, found {}", parameters.type_name()),
            });
        }
        let operations = named(parameters, "operation")
            .enumerate()
            .map(|(position, operation)| read_operation(position, operation))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { operations })
    }

    /// Applies every operation in order and returns the patched root.
    pub fn apply(&self, root: &Arc<Element>) -> Result<Arc<Element>, PatchError> {
        self.operations.iter().try_fold(root.clone(), |current, operation| {
            debug!(path = operation.path(), "applying patch operation");
            operation.apply(&current)
        })
    }
}

fn read_operation(position: usize, operation: &Element) -> Result<PatchOperation, PatchError> {
    let string_part = |name: &str| part_value(operation, name).and_then(|v| v.as_string()).map(str::to_string);
    let path = string_part("path").ok_or_else(|| PatchError::Invalid {
        path: format!("operation[{}]", position),
        message: "the operation has no path".to_string(),
    })?;
    let missing = |part: &str| PatchError::Invalid {
        path: path.clone(),
        message: format!("the operation has no {}", part),
    };
    let value = || part_value(operation, "value").map(|v| Element::clone(v)).ok_or_else(|| missing("value"));
    let index = |part: &str| {
        let value = part_value(operation, part)
            .and_then(|v| v.as_integer())
            .ok_or_else(|| missing(part))?;
        usize::try_from(value).map_err(|_| PatchError::Invalid {
            path: path.clone(),
            message: format!("{} must not be negative, found {}", part, value),
        })
    };

    let kind = string_part("type").ok_or_else(|| missing("type"))?;
    let operation = match kind.as_str() {
        "add" => PatchOperation::Add {
            name: string_part("name").ok_or_else(|| missing("name"))?,
            value: value()?,
            path: path.clone(),
        },
        "insert" => PatchOperation::Insert {
            index: index("index")?,
            value: value()?,
            path: path.clone(),
        },
        "delete" => PatchOperation::Delete { path: path.clone() },
        "replace" => PatchOperation::Replace {
            value: value()?,
            path: path.clone(),
        },
        "move" => PatchOperation::Move {
            source: index("source")?,
            destination: index("destination")?,
            path: path.clone(),
        },
        other => {
            return Err(PatchError::Invalid {
                path: path.clone(),
                message: format!("unknown operation type '{}'", other),
            });
        }
    };
    Ok(operation)
}
