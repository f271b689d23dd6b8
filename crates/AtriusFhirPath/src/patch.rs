//! # Structural Patch
//!
//! The five FHIRPath Patch operations over a record tree: [`add`],
//! [`delete`], [`replace`], [`insert`] and [`move_element`].
//!
//! Every operation evaluates its path expression against the root, then
//! rebuilds only the spine from the root down to the edited element. All
//! other subtrees are shared with the input by `Arc`, and the input tree is
//! never modified. An operation that changes nothing returns the input root
//! itself. Any [`PatchError`] leaves the caller with the untouched original.
//!
//! ```rust
//! use std::sync::Arc;
//! use atrius_fhir_model::Element;
//! use atrius_fhir_path::patch;
//!
//! let patient = Arc::new(Element::new("Patient").with("active", Element::boolean(false)));
//! let patched = patch::replace(&patient, "Patient.active", Element::boolean(true)).unwrap();
//! assert_eq!(patched.child("active").and_then(|a| a.value()).and_then(|v| v.as_bool()), Some(true));
//! assert_eq!(patient.child("active").and_then(|a| a.value()).and_then(|v| v.as_bool()), Some(false));
//! ```

use std::sync::Arc;

use atrius_fhir_model::catalog::{self, ElementDescriptor};
use atrius_fhir_model::{Element, PrimitiveValue};
use atrius_fhirpath_support::Node;
use thiserror::Error;
use tracing::debug;

use crate::context::{EvaluationContext, parent_path};
use crate::evaluator::evaluate;
use crate::parser::parse;

/// Why a patch operation was refused. Every variant carries the path
/// expression of the operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("'{path}': add cannot replace an existing value of '{name}'")]
    ExistingValue { path: String, name: String },

    #[error("'{path}': the target has no parent element")]
    NoParent { path: String },

    #[error("'{path}': expected exactly one match, found {count}")]
    NotSingle { path: String, count: usize },

    #[error("'{path}': index {index} is out of range for a list of {len}")]
    IndexOutOfRange { path: String, index: usize, len: usize },

    #[error("'{path}': the list is empty, use add instead")]
    EmptyList { path: String },

    #[error("'{path}': matches do not share a single parent and element name")]
    AmbiguousParent { path: String },

    #[error("'{path}': '{name}' is not an element of {type_name}")]
    UnknownElement { path: String, type_name: String, name: String },

    #[error("'{path}': {message}")]
    Evaluation { path: String, message: String },

    #[error("'{path}': {message}")]
    Invalid { path: String, message: String },
}

impl PatchError {
    /// The path expression of the failed operation.
    pub fn path(&self) -> &str {
        match self {
            PatchError::ExistingValue { path, .. }
            | PatchError::NoParent { path }
            | PatchError::NotSingle { path, .. }
            | PatchError::IndexOutOfRange { path, .. }
            | PatchError::EmptyList { path }
            | PatchError::AmbiguousParent { path }
            | PatchError::UnknownElement { path, .. }
            | PatchError::Evaluation { path, .. }
            | PatchError::Invalid { path, .. } => path,
        }
    }

    fn invalid(path: &str, message: impl Into<String>) -> Self {
        PatchError::Invalid {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

/// One step below the root: a field name and the position in its list.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    name: String,
    index: usize,
}

/// Splits a node location such as `Patient.name[1].given[0]` into steps
/// below the root.
fn steps(location: &str) -> Result<Vec<Step>, PatchError> {
    location
        .split('.')
        .skip(1)
        .map(|segment| match segment.strip_suffix(']').and_then(|s| s.split_once('[')) {
            Some((name, index)) => {
                let index = index.parse::<usize>().map_err(|_| {
                    PatchError::invalid(location, format!("malformed index in segment '{}'", segment))
                })?;
                Ok(Step {
                    name: name.to_string(),
                    index,
                })
            }
            None => Ok(Step {
                name: segment.to_string(),
                index: 0,
            }),
        })
        .collect()
}

/// Outcome of rebuilding a subtree.
enum Rebuild {
    Unchanged,
    Mutated(Arc<Element>),
}

/// Rebuilds the spine from `element` down to the element at `steps`,
/// applying `edit` there. `edit` returns whether it changed anything.
fn rebuild(
    element: &Arc<Element>,
    steps: &[Step],
    edit: &mut dyn FnMut(&mut Element) -> Result<bool, PatchError>,
) -> Result<Rebuild, PatchError> {
    let Some((step, rest)) = steps.split_first() else {
        let mut copy = Element::clone(element);
        return Ok(if edit(&mut copy)? {
            Rebuild::Mutated(Arc::new(copy))
        } else {
            Rebuild::Unchanged
        });
    };
    let Some(child) = element.children(&step.name).get(step.index) else {
        return Ok(Rebuild::Unchanged);
    };
    match rebuild(child, rest, edit)? {
        Rebuild::Unchanged => Ok(Rebuild::Unchanged),
        Rebuild::Mutated(new_child) => {
            let mut copy = Element::clone(element);
            copy.replace_child(&step.name, step.index, new_child);
            Ok(Rebuild::Mutated(Arc::new(copy)))
        }
    }
}

fn apply_at(
    root: &Arc<Element>,
    location: &str,
    mut edit: impl FnMut(&mut Element) -> Result<bool, PatchError>,
) -> Result<Arc<Element>, PatchError> {
    match rebuild(root, &steps(location)?, &mut edit)? {
        Rebuild::Unchanged => Ok(root.clone()),
        Rebuild::Mutated(new_root) => Ok(new_root),
    }
}

/// Evaluates `path` on `root` and returns the location of every match.
fn locate(root: &Arc<Element>, path: &str) -> Result<Vec<String>, PatchError> {
    let parsed = parse(path).map_err(|e| PatchError::Evaluation {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    let mut context = EvaluationContext::from_resource(root.clone());
    let matches = evaluate(&parsed, &mut context).map_err(|e| PatchError::Evaluation {
        path: path.to_string(),
        message: e.to_string(),
    })?;
    matches
        .iter()
        .map(|node: &Node| {
            node.path()
                .map(str::to_string)
                .ok_or_else(|| PatchError::invalid(path, "the path must select elements of the tree"))
        })
        .collect()
}

fn locate_single(root: &Arc<Element>, path: &str) -> Result<String, PatchError> {
    let mut locations = locate(root, path)?;
    match locations.len() {
        1 => Ok(locations.remove(0)),
        count => Err(PatchError::NotSingle {
            path: path.to_string(),
            count,
        }),
    }
}

/// Parent location, field name and index of a located element.
fn split_location<'a>(path: &str, location: &'a str) -> Result<(&'a str, Step), PatchError> {
    let parent = parent_path(location).ok_or_else(|| PatchError::NoParent {
        path: path.to_string(),
    })?;
    let step = steps(location)?
        .pop()
        .ok_or_else(|| PatchError::NoParent { path: path.to_string() })?;
    Ok((parent, step))
}

fn element_at<'a>(root: &'a Arc<Element>, location: &str) -> Result<Option<&'a Arc<Element>>, PatchError> {
    Ok(steps(location)?
        .iter()
        .try_fold(root, |element, step| element.children(&step.name).get(step.index)))
}

/// The catalog entry of `name` in `type_name`; a choice element may also be
/// named by its typed form, e.g. `valueString`.
fn descriptor_for(type_name: &str, name: &str) -> Option<&'static ElementDescriptor> {
    catalog::element_descriptor(type_name, name).or_else(|| {
        catalog::type_descriptor(type_name)?
            .all_elements()
            .into_iter()
            .find(|d| d.is_choice() && d.type_for_key(name).is_some())
    })
}

/// Retypes a primitive value to the single primitive type an element
/// allows, so that e.g. a `string` can be written into a `code` element.
fn fit_value(path: &str, descriptor: &ElementDescriptor, value: Element) -> Result<Element, PatchError> {
    if descriptor.allows(value.type_name()) {
        return Ok(value);
    }
    let retyped = match (descriptor.types, value.value()) {
        ([target], Some(primitive)) if catalog::is_primitive_type(target) => {
            PrimitiveValue::parse(target, &primitive.to_text()).map(|p| Element::primitive(*target, p))
        }
        _ => None,
    };
    retyped.ok_or_else(|| {
        PatchError::invalid(
            path,
            format!(
                "a {} value cannot be stored in '{}' ({})",
                value.type_name(),
                descriptor.name,
                descriptor.types.join(" | ")
            ),
        )
    })
}

/// Adds `value` as the element `name` of the single node selected by `path`.
///
/// A repeating element gets the value appended; a non-repeating element must
/// not already hold a value.
pub fn add(root: &Arc<Element>, path: &str, name: &str, value: Element) -> Result<Arc<Element>, PatchError> {
    let location = locate(root, path)?;
    let location = match location.as_slice() {
        [single] => single,
        [] => return Err(PatchError::NoParent { path: path.to_string() }),
        many => {
            return Err(PatchError::NotSingle {
                path: path.to_string(),
                count: many.len(),
            });
        }
    };
    let Some(parent) = element_at(root, location)? else {
        return Err(PatchError::NoParent { path: path.to_string() });
    };
    let descriptor = descriptor_for(parent.type_name(), name).ok_or_else(|| PatchError::UnknownElement {
        path: path.to_string(),
        type_name: parent.type_name().to_string(),
        name: name.to_string(),
    })?;
    if !descriptor.repeating && !parent.children(descriptor.name).is_empty() {
        return Err(PatchError::ExistingValue {
            path: path.to_string(),
            name: name.to_string(),
        });
    }
    let value = Arc::new(fit_value(path, descriptor, value)?);
    debug!(path, name, "patch add");
    apply_at(root, location, |parent| {
        parent.push_child(descriptor.name, value.clone());
        Ok(true)
    })
}

/// Removes the element selected by `path`. Selecting nothing is not an
/// error and returns the input unchanged.
pub fn delete(root: &Arc<Element>, path: &str) -> Result<Arc<Element>, PatchError> {
    let locations = locate(root, path)?;
    let location = match locations.as_slice() {
        [] => return Ok(root.clone()),
        [single] => single,
        many => {
            return Err(PatchError::NotSingle {
                path: path.to_string(),
                count: many.len(),
            });
        }
    };
    let (parent, step) = split_location(path, location)?;
    debug!(path, location = %location, "patch delete");
    apply_at(root, parent, |parent| Ok(parent.remove_child(&step.name, step.index).is_some()))
}

/// Replaces the single element selected by `path` with `value`.
pub fn replace(root: &Arc<Element>, path: &str, value: Element) -> Result<Arc<Element>, PatchError> {
    let location = locate_single(root, path)?;
    let (parent_location, step) = split_location(path, &location)?;
    let value = match element_at(root, parent_location)?
        .and_then(|parent| descriptor_for(parent.type_name(), &step.name))
    {
        Some(descriptor) => fit_value(path, descriptor, value)?,
        None => value,
    };
    let value = Arc::new(value);
    debug!(path, location = %location, "patch replace");
    apply_at(root, parent_location, |parent| {
        Ok(parent.replace_child(&step.name, step.index, value.clone()).is_some())
    })
}

/// The list the matches of `path` belong to: parent location, element name
/// and current length.
fn locate_list(root: &Arc<Element>, path: &str) -> Result<(String, String, usize), PatchError> {
    let locations = locate(root, path)?;
    let Some(first) = locations.first() else {
        return Err(PatchError::EmptyList { path: path.to_string() });
    };
    let (parent, step) = split_location(path, first)?;
    for other in &locations[1..] {
        let (other_parent, other_step) = split_location(path, other)?;
        if other_parent != parent || other_step.name != step.name {
            return Err(PatchError::AmbiguousParent { path: path.to_string() });
        }
    }
    let len = element_at(root, parent)?
        .map(|p| p.children(&step.name).len())
        .unwrap_or(0);
    Ok((parent.to_string(), step.name, len))
}

/// Inserts `value` at `index` of the list selected by `path`.
///
/// The list must already exist; `index` may equal its length to append.
pub fn insert(root: &Arc<Element>, path: &str, index: usize, value: Element) -> Result<Arc<Element>, PatchError> {
    let (parent_location, name, len) = locate_list(root, path)?;
    if index > len {
        return Err(PatchError::IndexOutOfRange {
            path: path.to_string(),
            index,
            len,
        });
    }
    let value = match element_at(root, &parent_location)?.and_then(|p| descriptor_for(p.type_name(), &name)) {
        Some(descriptor) => fit_value(path, descriptor, value)?,
        None => value,
    };
    let value = Arc::new(value);
    debug!(path, index, "patch insert");
    apply_at(root, &parent_location, |parent| Ok(parent.insert_child(&name, index, value.clone())))
}

/// Moves the item at `source` of the list selected by `path` to
/// `destination`. Equal indexes leave the tree unchanged without being
/// range checked.
pub fn move_element(
    root: &Arc<Element>,
    path: &str,
    source: usize,
    destination: usize,
) -> Result<Arc<Element>, PatchError> {
    let (parent_location, name, len) = locate_list(root, path)?;
    if source == destination {
        return Ok(root.clone());
    }
    for index in [source, destination] {
        if index >= len {
            return Err(PatchError::IndexOutOfRange {
                path: path.to_string(),
                index,
                len,
            });
        }
    }
    debug!(path, source, destination, "patch move");
    apply_at(root, &parent_location, |parent| {
        let Some(item) = parent.remove_child(&name, source) else {
            return Ok(false);
        };
        Ok(parent.insert_child(&name, destination, item))
    })
}
