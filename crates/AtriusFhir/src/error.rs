use thiserror::Error;

/// Errors raised while reading or building record trees.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("resource JSON has no resourceType")]
    MissingResourceType,
    #[error("unknown resource type '{0}'")]
    UnknownResourceType(String),
    #[error("unknown type '{0}'")]
    UnknownType(String),
    #[error("'{element}' is not an element of {type_name}")]
    UnknownElement { type_name: String, element: String },
    #[error("expected a JSON object for {0}")]
    ExpectedObject(String),
    #[error("invalid {type_name} value: {text}")]
    InvalidPrimitive { type_name: String, text: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
