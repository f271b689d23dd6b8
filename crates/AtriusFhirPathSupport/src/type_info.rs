//! # FHIRPath Type System
//!
//! Types live in one of two namespaces: `System` for the primitive values of
//! the expression language and the reflection types returned by `type()`,
//! and `FHIR` for the record model. FHIR types and their base types come from
//! the model catalog; backbone structures are typed as `FHIR.BackboneElement`.

use std::fmt;

use atrius_fhir_model::catalog::{self, TypeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    System,
    Fhir,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::System => "System",
            Namespace::Fhir => "FHIR",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const SYSTEM_NAMES: &[&str] = &[
    "Any",
    "Boolean",
    "Integer",
    "Decimal",
    "String",
    "Date",
    "DateTime",
    "Time",
    "Quantity",
    "TypeInfo",
    "SimpleTypeInfo",
    "ClassInfo",
    "TupleTypeInfo",
    "ListTypeInfo",
];

/// A namespace-qualified type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FhirPathType {
    namespace: Namespace,
    name: &'static str,
}

impl FhirPathType {
    pub const SYSTEM_ANY: Self = Self::system_type("Any");
    pub const SYSTEM_BOOLEAN: Self = Self::system_type("Boolean");
    pub const SYSTEM_INTEGER: Self = Self::system_type("Integer");
    pub const SYSTEM_DECIMAL: Self = Self::system_type("Decimal");
    pub const SYSTEM_STRING: Self = Self::system_type("String");
    pub const SYSTEM_DATE: Self = Self::system_type("Date");
    pub const SYSTEM_DATE_TIME: Self = Self::system_type("DateTime");
    pub const SYSTEM_TIME: Self = Self::system_type("Time");
    pub const SYSTEM_QUANTITY: Self = Self::system_type("Quantity");
    pub const SYSTEM_TYPE_INFO: Self = Self::system_type("TypeInfo");
    pub const SYSTEM_SIMPLE_TYPE_INFO: Self = Self::system_type("SimpleTypeInfo");
    pub const SYSTEM_CLASS_INFO: Self = Self::system_type("ClassInfo");
    pub const SYSTEM_TUPLE_TYPE_INFO: Self = Self::system_type("TupleTypeInfo");
    pub const SYSTEM_LIST_TYPE_INFO: Self = Self::system_type("ListTypeInfo");

    pub const FHIR_ANY: Self = Self::fhir_type("Any");
    pub const FHIR_ELEMENT: Self = Self::fhir_type("Element");
    pub const FHIR_BACKBONE_ELEMENT: Self = Self::fhir_type("BackboneElement");
    pub const FHIR_RESOURCE: Self = Self::fhir_type("Resource");
    /// Stands in for the target of a reference whose type cannot be inferred.
    pub const FHIR_UNKNOWN_RESOURCE_TYPE: Self = Self::fhir_type("UnknownResourceType");

    const fn system_type(name: &'static str) -> Self {
        Self {
            namespace: Namespace::System,
            name,
        }
    }

    const fn fhir_type(name: &'static str) -> Self {
        Self {
            namespace: Namespace::Fhir,
            name,
        }
    }

    pub fn system(name: &str) -> Option<Self> {
        SYSTEM_NAMES
            .iter()
            .find(|candidate| **candidate == name)
            .map(|candidate| Self::system_type(*candidate))
    }

    /// Looks up a FHIR type by catalog name. Backbone structures have no public name.
    pub fn fhir(name: &str) -> Option<Self> {
        match name {
            "Any" => Some(Self::FHIR_ANY),
            "UnknownResourceType" => Some(Self::FHIR_UNKNOWN_RESOURCE_TYPE),
            _ => catalog::type_descriptor(name)
                .filter(|d| d.kind != TypeKind::Backbone)
                .map(|d| Self::fhir_type(d.name)),
        }
    }

    /// Resolves a type specifier. Qualified names are looked up in their
    /// namespace; bare names try FHIR before System.
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(rest) = name.strip_prefix("FHIR.") {
            return Self::fhir(rest);
        }
        if let Some(rest) = name.strip_prefix("System.") {
            return Self::system(rest);
        }
        Self::fhir(name).or_else(|| Self::system(name))
    }

    /// Type of an element whose catalog type is `type_name`.
    pub fn for_element_type(type_name: &str) -> Self {
        match catalog::type_descriptor(type_name) {
            Some(d) if d.kind == TypeKind::Backbone => Self::FHIR_BACKBONE_ELEMENT,
            Some(d) => Self::fhir_type(d.name),
            None => Self::FHIR_ANY,
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn is_system_type(&self) -> bool {
        self.namespace == Namespace::System
    }

    pub fn base_type(&self) -> Option<Self> {
        match self.namespace {
            Namespace::System => match self.name {
                "Any" => None,
                "SimpleTypeInfo" | "ClassInfo" | "TupleTypeInfo" | "ListTypeInfo" => {
                    Some(Self::SYSTEM_TYPE_INFO)
                }
                _ => Some(Self::SYSTEM_ANY),
            },
            Namespace::Fhir => match self.name {
                "Any" => None,
                "UnknownResourceType" => Some(Self::FHIR_RESOURCE),
                name => Some(
                    catalog::type_descriptor(name)
                        .and_then(|d| d.base)
                        .and_then(Self::fhir)
                        .unwrap_or(Self::FHIR_ANY),
                ),
            },
        }
    }

    /// True when a value of type `other` may be used where `self` is expected.
    pub fn is_assignable_from(&self, other: &FhirPathType) -> bool {
        if self == other {
            return true;
        }
        if *other == Self::FHIR_UNKNOWN_RESOURCE_TYPE && self.is_resource_type() {
            return true;
        }
        if self.name == "Any" && self.namespace == other.namespace {
            return true;
        }
        let mut current = other.base_type();
        while let Some(ancestor) = current {
            if ancestor == *self {
                return true;
            }
            current = ancestor.base_type();
        }
        false
    }

    pub fn is_subtype_of(&self, other: &FhirPathType) -> bool {
        other.is_assignable_from(self)
    }

    pub fn is_resource_type(&self) -> bool {
        self.namespace == Namespace::Fhir
            && (*self == Self::FHIR_RESOURCE
                || *self == Self::FHIR_UNKNOWN_RESOURCE_TYPE
                || catalog::type_descriptor(self.name).is_some_and(|d| d.is_subtype_of("Resource")))
    }

    /// Names of this FHIR type and all its bases below `Any`.
    pub fn closure(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.namespace != Namespace::Fhir {
            return names;
        }
        let mut current = Some(*self);
        while let Some(t) = current {
            if t == Self::FHIR_ANY {
                break;
            }
            names.push(t.name);
            current = t.base_type();
        }
        names
    }
}

impl fmt::Display for FhirPathType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.namespace, self.name)
    }
}

/// An element entry of a `ClassInfo` or `TupleTypeInfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeInfoElement {
    pub name: String,
    /// Qualified type, wrapped as `List<...>` for repeating elements.
    pub type_name: String,
    pub is_one_based: bool,
}

/// Reflection result returned by `type()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInfo {
    Simple {
        namespace: Namespace,
        name: String,
        base_type: String,
    },
    Class {
        namespace: Namespace,
        name: String,
        base_type: String,
        elements: Vec<TypeInfoElement>,
    },
    Tuple {
        elements: Vec<TypeInfoElement>,
    },
}

impl TypeInfo {
    /// The reflection type describing this descriptor.
    pub fn descriptor_type(&self) -> FhirPathType {
        match self {
            TypeInfo::Simple { .. } => FhirPathType::SYSTEM_SIMPLE_TYPE_INFO,
            TypeInfo::Class { .. } => FhirPathType::SYSTEM_CLASS_INFO,
            TypeInfo::Tuple { .. } => FhirPathType::SYSTEM_TUPLE_TYPE_INFO,
        }
    }

    pub fn simple(described: FhirPathType) -> Self {
        TypeInfo::Simple {
            namespace: described.namespace(),
            name: described.name().to_string(),
            base_type: described
                .base_type()
                .map(|b| b.qualified_name())
                .unwrap_or_default(),
        }
    }

    /// Describes a catalog type: primitives are simple, backbones are tuples,
    /// everything else is a class with its element list.
    pub fn for_catalog_type(type_name: &str) -> Option<Self> {
        let descriptor = catalog::type_descriptor(type_name)?;
        let elements = || {
            descriptor
                .all_elements()
                .into_iter()
                .map(|e| {
                    let base = e
                        .types
                        .first()
                        .map(|t| FhirPathType::for_element_type(t).qualified_name())
                        .unwrap_or_default();
                    TypeInfoElement {
                        name: e.name.to_string(),
                        type_name: if e.repeating { format!("List<{}>", base) } else { base },
                        is_one_based: false,
                    }
                })
                .collect()
        };
        let described = FhirPathType::for_element_type(type_name);
        let info = match descriptor.kind {
            TypeKind::Primitive => Self::simple(described),
            TypeKind::Backbone => TypeInfo::Tuple {
                elements: elements(),
            },
            _ => TypeInfo::Class {
                namespace: described.namespace(),
                name: described.name().to_string(),
                base_type: described
                    .base_type()
                    .map(|b| b.qualified_name())
                    .unwrap_or_default(),
                elements: elements(),
            },
        };
        Some(info)
    }
}
