//! # Atrius FHIR Model
//!
//! A dynamically typed FHIR record tree backed by a static type catalog.
//!
//! Records are trees of [`Element`] values. Each element names its catalog
//! type, optionally carries a [`PrimitiveValue`], and holds its children in
//! named fields behind `Arc`, so edited copies of a tree share every subtree
//! they leave untouched.
//!
//! ```rust
//! use atrius_fhir_model::Element;
//!
//! let patient = Element::from_json_str(
//!     r#"{"resourceType": "Patient", "name": [{"family": "Chalmers"}]}"#,
//! )?;
//! assert_eq!(patient.type_name(), "Patient");
//! assert_eq!(patient.children("name").len(), 1);
//! # Ok::<(), atrius_fhir_model::ModelError>(())
//! ```

pub mod catalog;
pub mod date_time;
mod element;
mod error;
mod json;
pub mod parameters;

pub use date_time::{
    CalendarUnit, DatePrecision, DateTimePrecision, PrecisionDate, PrecisionDateTime,
    PrecisionTime, TemporalPrecision, TimePrecision,
};
pub use element::{Element, Field, PrimitiveValue};
pub use error::ModelError;
