//! # FHIRPath Support Types
//!
//! The value and node model shared by the FHIRPath parser, evaluator and
//! patch operations:
//!
//! - [`SystemValue`] and [`Node`]: closed tagged unions for primitive values
//!   and for everything an expression can yield (tree positions, type
//!   descriptors, system values).
//! - [`Collection`]: the ordered (or explicitly unordered) result of every
//!   expression.
//! - [`conversion`]: singleton evaluation and implicit conversion rules.
//! - [`FhirPathType`] and [`TypeInfo`]: the two-namespace type system.
//! - [`EvaluationError`] and [`Issue`]: hard failures and soft findings.
//!
//! ## Usage Example
//!
//! ```rust
//! use atrius_fhirpath_support::{conversion, Collection, IntoCollection, Node};
//!
//! let result = true.to_collection();
//! assert!(conversion::is_true(&result));
//!
//! let words = Collection::singleton(Node::string("hello"));
//! assert!(conversion::evaluates_to_true(&words));
//! assert!(!conversion::is_true(&words));
//! ```

pub mod collection;
pub mod conversion;
pub mod evaluation_error;
pub mod issue;
pub mod node;
pub mod system_value;
pub mod traits;
pub mod type_info;

pub use collection::Collection;
pub use evaluation_error::EvaluationError;
pub use issue::{Issue, IssueSeverity, IssueType};
pub use node::{ElementNode, Node, ResourceNode, SystemNode, TypeInfoNode};
pub use system_value::{Quantity, SystemValue, SystemValueKind};
pub use traits::IntoCollection;
pub use type_info::{FhirPathType, Namespace, TypeInfo, TypeInfoElement};
