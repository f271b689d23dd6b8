//! # Nodes
//!
//! Everything an expression can produce is a [`Node`]: a free-standing
//! system value, a position inside a record tree (element or resource), a
//! type descriptor returned by `type()`, or the `%terminologies` service
//! object. Element and resource nodes hold an `Arc` into the source tree and
//! the path that locates them; they never copy the record.

use std::sync::Arc;

use atrius_fhir_model::catalog;
use atrius_fhir_model::{Element, PrimitiveValue};
use rust_decimal::Decimal;

use crate::system_value::{Quantity, SystemValue};
use crate::type_info::{FhirPathType, TypeInfo};

/// A primitive value not located in a record tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemNode {
    pub value: SystemValue,
    /// Set when the value is a named member of a type descriptor.
    pub name: Option<Arc<str>>,
}

/// A non-resource element inside a record tree.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementNode {
    pub element: Arc<Element>,
    pub path: Arc<str>,
    pub name: Arc<str>,
}

/// A resource, either located in the tree or produced by `resolve()`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceNode {
    /// `None` for a placeholder standing in for an unresolvable target.
    pub resource: Option<Arc<Element>>,
    pub resource_type: FhirPathType,
    pub path: Option<Arc<str>>,
    pub name: Option<Arc<str>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeInfoNode {
    pub info: TypeInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    System(SystemNode),
    Element(ElementNode),
    Resource(ResourceNode),
    TypeInfo(TypeInfoNode),
    /// The `%terminologies` object, target of `validateVS()` and friends.
    TerminologyService,
}

impl Node {
    pub fn boolean(value: bool) -> Self {
        Self::from_system_value(SystemValue::Boolean(value))
    }

    pub fn integer(value: i64) -> Self {
        Self::from_system_value(SystemValue::Integer(value))
    }

    pub fn decimal(value: Decimal) -> Self {
        Self::from_system_value(SystemValue::Decimal(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::from_system_value(SystemValue::String(value.into()))
    }

    pub fn quantity(value: Decimal, unit: impl Into<String>) -> Self {
        Self::from_system_value(SystemValue::Quantity(Quantity::new(value, unit)))
    }

    pub fn from_system_value(value: SystemValue) -> Self {
        Node::System(SystemNode { value, name: None })
    }

    pub fn type_info(info: TypeInfo) -> Self {
        Node::TypeInfo(TypeInfoNode { info })
    }

    /// The root node of a tree; its path is the root's type name.
    pub fn root(element: Arc<Element>) -> Self {
        let name: Arc<str> = Arc::from(element.type_name());
        Self::from_element(element, name.clone(), name)
    }

    /// Wraps a tree position, choosing the resource variant for resources.
    pub fn from_element(element: Arc<Element>, path: Arc<str>, name: Arc<str>) -> Self {
        if element.is_resource() {
            let resource_type = FhirPathType::for_element_type(element.type_name());
            Node::Resource(ResourceNode {
                resource: Some(element),
                resource_type,
                path: Some(path),
                name: Some(name),
            })
        } else {
            Node::Element(ElementNode {
                element,
                path,
                name,
            })
        }
    }

    /// A resource with no tree position, as returned by a reference resolver.
    pub fn detached_resource(resource: Arc<Element>) -> Self {
        let resource_type = FhirPathType::for_element_type(resource.type_name());
        Node::Resource(ResourceNode {
            resource: Some(resource),
            resource_type,
            path: None,
            name: None,
        })
    }

    pub fn placeholder_resource(resource_type: FhirPathType) -> Self {
        Node::Resource(ResourceNode {
            resource: None,
            resource_type,
            path: None,
            name: None,
        })
    }

    pub fn fhirpath_type(&self) -> FhirPathType {
        match self {
            Node::System(n) => n.value.fhirpath_type(),
            Node::Element(n) => FhirPathType::for_element_type(n.element.type_name()),
            Node::Resource(n) => n.resource_type,
            Node::TypeInfo(n) => n.info.descriptor_type(),
            Node::TerminologyService => FhirPathType::SYSTEM_ANY,
        }
    }

    pub fn path(&self) -> Option<&str> {
        match self {
            Node::Element(n) => Some(&n.path),
            Node::Resource(n) => n.path.as_deref(),
            _ => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Node::System(n) => n.name.as_deref(),
            Node::Element(n) => Some(&n.name),
            Node::Resource(n) => n.name.as_deref(),
            _ => None,
        }
    }

    /// The record element behind an element or resource node.
    pub fn element(&self) -> Option<&Arc<Element>> {
        match self {
            Node::Element(n) => Some(&n.element),
            Node::Resource(n) => n.resource.as_ref(),
            _ => None,
        }
    }

    /// Catalog type name of the underlying element.
    pub fn element_type(&self) -> Option<&str> {
        self.element().map(|e| e.type_name())
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Node::Resource(_))
    }

    /// The primitive value of this node. FHIR primitives yield their value and
    /// FHIR `Quantity` elements convert to a system quantity.
    pub fn system_value(&self) -> Option<SystemValue> {
        match self {
            Node::System(n) => Some(n.value.clone()),
            Node::Element(n) => element_system_value(&n.element),
            _ => None,
        }
    }

    pub fn has_value(&self) -> bool {
        match self {
            Node::System(_) => true,
            Node::Element(n) => n.element.value().is_some(),
            _ => false,
        }
    }

    /// Direct children in document order.
    pub fn children(&self) -> Vec<Node> {
        match self {
            Node::Element(n) => element_children(&n.element, &n.path),
            Node::Resource(ResourceNode {
                resource: Some(resource),
                path,
                ..
            }) => {
                let path = path
                    .clone()
                    .unwrap_or_else(|| Arc::from(resource.type_name()));
                element_children(resource, &path)
            }
            Node::TypeInfo(n) => type_info_children(&n.info),
            _ => Vec::new(),
        }
    }

    /// Children named `name`.
    pub fn members(&self, name: &str) -> Vec<Node> {
        self.children()
            .into_iter()
            .filter(|c| c.name() == Some(name))
            .collect()
    }

    /// All descendants, depth first.
    pub fn descendants(&self) -> Vec<Node> {
        let mut out = Vec::new();
        let mut stack: Vec<Node> = self.children().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            stack.extend(node.children().into_iter().rev());
            out.push(node);
        }
        out
    }

    /// Equality for `=`. `None` when the answer is unknown because temporal
    /// precisions differ.
    pub fn equals(&self, other: &Node) -> Option<bool> {
        if let (Some(a), Some(b)) = (self.system_value(), other.system_value()) {
            return a.equals(&b);
        }
        match (self, other) {
            (Node::TypeInfo(a), Node::TypeInfo(b)) => Some(a == b),
            (Node::TerminologyService, Node::TerminologyService) => Some(true),
            _ => match (self.element(), other.element()) {
                (Some(a), Some(b)) => Some(Arc::ptr_eq(a, b) || a == b),
                _ => Some(false),
            },
        }
    }

    /// Equivalence for `~`.
    pub fn equivalent(&self, other: &Node) -> bool {
        if let (Some(a), Some(b)) = (self.system_value(), other.system_value()) {
            return a.equivalent(&b);
        }
        self.equals(other).unwrap_or(false)
    }
}

fn element_system_value(element: &Element) -> Option<SystemValue> {
    if let Some(value) = element.value() {
        return Some(SystemValue::from_primitive(value));
    }
    if element.type_name() == "Quantity" {
        let value = element.child("value")?.value()?.as_decimal()?;
        let unit = element
            .child_str("code")
            .or_else(|| element.child_str("unit"))
            .unwrap_or("1");
        return Some(SystemValue::Quantity(Quantity::new(value, unit)));
    }
    None
}

fn element_children(element: &Element, path: &str) -> Vec<Node> {
    let mut out = Vec::new();
    for field in element.fields() {
        let repeating = catalog::element_descriptor(element.type_name(), field.name())
            .map_or(field.values().len() > 1, |d| d.repeating);
        let name: Arc<str> = Arc::from(field.name());
        for (index, child) in field.values().iter().enumerate() {
            let child_path: Arc<str> = if repeating {
                Arc::from(format!("{}.{}[{}]", path, field.name(), index))
            } else {
                Arc::from(format!("{}.{}", path, field.name()))
            };
            out.push(Node::from_element(child.clone(), child_path, name.clone()));
        }
    }
    out
}

fn type_info_children(info: &TypeInfo) -> Vec<Node> {
    let named = |name: &str, value: String| {
        Node::System(SystemNode {
            value: SystemValue::String(value),
            name: Some(Arc::from(name)),
        })
    };
    match info {
        TypeInfo::Simple {
            namespace,
            name,
            base_type,
        }
        | TypeInfo::Class {
            namespace,
            name,
            base_type,
            ..
        } => vec![
            named("namespace", namespace.to_string()),
            named("name", name.clone()),
            named("baseType", base_type.clone()),
        ],
        TypeInfo::Tuple { elements } => elements
            .iter()
            .map(|e| named("element", e.name.clone()))
            .collect(),
    }
}

impl From<SystemValue> for Node {
    fn from(value: SystemValue) -> Self {
        Node::from_system_value(value)
    }
}

/// Primitive value of a node, if it is a FHIR primitive with a value.
pub fn primitive_value(node: &Node) -> Option<&PrimitiveValue> {
    match node {
        Node::Element(n) => n.element.value(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> Arc<Element> {
        Arc::new(
            Element::new("Patient")
                .with("active", Element::boolean(true))
                .with(
                    "name",
                    Element::new("HumanName")
                        .with("family", Element::string("Chalmers"))
                        .with("given", Element::string("Peter"))
                        .with("given", Element::string("James")),
                ),
        )
    }

    #[test]
    fn children_carry_unique_paths() {
        let root = Node::root(patient());
        assert_eq!(root.path(), Some("Patient"));
        let paths: Vec<String> = root
            .descendants()
            .iter()
            .filter_map(|n| n.path().map(str::to_string))
            .collect();
        assert_eq!(
            paths,
            [
                "Patient.active",
                "Patient.name[0]",
                "Patient.name[0].family",
                "Patient.name[0].given[0]",
                "Patient.name[0].given[1]",
            ]
        );
    }

    #[test]
    fn primitives_expose_system_values() {
        let root = Node::root(patient());
        let active = root.members("active");
        assert_eq!(active[0].system_value(), Some(SystemValue::Boolean(true)));
        assert_eq!(active[0].fhirpath_type().qualified_name(), "FHIR.boolean");
        assert!(root.system_value().is_none());
        assert_eq!(root.fhirpath_type().qualified_name(), "FHIR.Patient");
    }

    #[test]
    fn quantity_elements_convert() {
        let quantity = Element::new("Quantity")
            .with("value", Element::decimal(Decimal::new(185, 0)))
            .with("code", Element::code("[lb_av]"));
        let node = Node::from_element(Arc::new(quantity), Arc::from("q"), Arc::from("q"));
        assert_eq!(
            node.system_value(),
            Some(SystemValue::Quantity(Quantity::new(Decimal::new(185, 0), "[lb_av]")))
        );
    }

    #[test]
    fn element_string_equals_system_string() {
        let root = Node::root(patient());
        let family = root.members("name")[0].members("family").remove(0);
        assert_eq!(family.equals(&Node::string("Chalmers")), Some(true));
        assert_eq!(family.equals(&Node::string("chalmers")), Some(false));
        assert!(family.equivalent(&Node::string("chalmers")));
    }
}
