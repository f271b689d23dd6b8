//! Static type catalog for the record model.
//!
//! Each structural type lists its declared elements with their allowed types
//! and cardinality. Loaders, the FHIRPath type system and the patch
//! operations all read this table; nothing inspects types at runtime.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// How a type participates in the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Carries a primitive value (`string`, `dateTime`, ...).
    Primitive,
    /// Reusable structure (`HumanName`, `Quantity`, ...).
    Complex,
    /// Anonymous structure nested in one resource (`Patient.contact`).
    Backbone,
    Resource,
    /// Base types that are never instantiated directly.
    Abstract,
}

/// One declared element of a type.
#[derive(Debug, PartialEq, Eq)]
pub struct ElementDescriptor {
    pub name: &'static str,
    /// Allowed types. More than one marks a choice element (`value[x]`).
    pub types: &'static [&'static str],
    pub repeating: bool,
}

impl ElementDescriptor {
    pub fn is_choice(&self) -> bool {
        self.types.len() > 1
    }

    /// JSON property name for a value of `type_name`. Choice elements append the type.
    pub fn json_key(&self, type_name: &str) -> String {
        if self.is_choice() {
            format!("{}{}", self.name, capitalize(type_name))
        } else {
            self.name.to_string()
        }
    }

    /// Resolves the type named by a JSON property, e.g. `valueQuantity` -> `Quantity`.
    pub fn type_for_key(&self, key: &str) -> Option<&'static str> {
        if !self.is_choice() {
            return (key == self.name).then(|| self.types[0]);
        }
        let suffix = key.strip_prefix(self.name)?;
        self.types
            .iter()
            .copied()
            .find(|candidate| capitalize(candidate) == suffix)
    }

    pub fn allows(&self, type_name: &str) -> bool {
        self.types.iter().any(|t| {
            *t == type_name || (*t == "Resource" && is_resource_type(type_name))
        })
    }
}

#[derive(Debug)]
pub struct TypeDescriptor {
    pub name: &'static str,
    pub kind: TypeKind,
    pub base: Option<&'static str>,
    pub elements: &'static [ElementDescriptor],
}

impl TypeDescriptor {
    pub fn base_descriptor(&self) -> Option<&'static TypeDescriptor> {
        self.base.and_then(type_descriptor)
    }

    /// Finds a declared or inherited element.
    pub fn element(&self, name: &str) -> Option<&'static ElementDescriptor> {
        let mut current = type_descriptor(self.name);
        while let Some(descriptor) = current {
            if let Some(found) = descriptor.elements.iter().find(|e| e.name == name) {
                return Some(found);
            }
            current = descriptor.base_descriptor();
        }
        None
    }

    /// All elements in declaration order, inherited ones first.
    pub fn all_elements(&self) -> Vec<&'static ElementDescriptor> {
        let mut chain = Vec::new();
        let mut current = type_descriptor(self.name);
        while let Some(descriptor) = current {
            chain.push(descriptor);
            current = descriptor.base_descriptor();
        }
        chain
            .into_iter()
            .rev()
            .flat_map(|descriptor| descriptor.elements.iter())
            .collect()
    }

    pub fn is_subtype_of(&self, ancestor: &str) -> bool {
        let mut current = Some(self.name);
        while let Some(name) = current {
            if name == ancestor {
                return true;
            }
            current = type_descriptor(name).and_then(|d| d.base);
        }
        false
    }

    pub fn is_resource(&self) -> bool {
        self.kind == TypeKind::Resource
    }
}

pub fn type_descriptor(name: &str) -> Option<&'static TypeDescriptor> {
    INDEX.get(name).copied()
}

pub fn element_descriptor(type_name: &str, element: &str) -> Option<&'static ElementDescriptor> {
    type_descriptor(type_name)?.element(element)
}

pub fn is_resource_type(name: &str) -> bool {
    type_descriptor(name).is_some_and(TypeDescriptor::is_resource)
}

pub fn is_primitive_type(name: &str) -> bool {
    type_descriptor(name).is_some_and(|d| d.kind == TypeKind::Primitive)
}

/// Position of an element within its owner's declaration order.
pub fn element_order(type_name: &str, element: &str) -> usize {
    type_descriptor(type_name)
        .and_then(|d| d.all_elements().iter().position(|e| e.name == element))
        .unwrap_or(usize::MAX)
}

pub fn types() -> impl Iterator<Item = &'static TypeDescriptor> {
    TYPES.iter()
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

static INDEX: Lazy<HashMap<&'static str, &'static TypeDescriptor>> =
    Lazy::new(|| TYPES.iter().map(|d| (d.name, d)).collect());

macro_rules! el {
    ($name:literal, $types:expr) => {
        ElementDescriptor { name: $name, types: $types, repeating: false }
    };
    ($name:literal, $types:expr, many) => {
        ElementDescriptor { name: $name, types: $types, repeating: true }
    };
}

macro_rules! primitive {
    ($name:literal, $base:literal) => {
        TypeDescriptor { name: $name, kind: TypeKind::Primitive, base: Some($base), elements: &[] }
    };
}

/// Types allowed for open choice elements such as `Extension.value[x]`.
pub const OPEN_TYPES: &[&str] = &[
    "base64Binary", "boolean", "canonical", "code", "date", "dateTime", "decimal", "id",
    "instant", "integer", "markdown", "oid", "positiveInt", "string", "time", "unsignedInt",
    "uri", "url", "uuid", "Address", "Annotation", "CodeableConcept", "Coding", "ContactPoint",
    "HumanName", "Identifier", "Meta", "Period", "Quantity", "Range", "Reference",
];

const OBSERVATION_VALUE: &[&str] = &[
    "Quantity", "CodeableConcept", "string", "boolean", "integer", "Range", "time", "dateTime",
    "Period",
];

static TYPES: &[TypeDescriptor] = &[
    // Abstract bases
    TypeDescriptor {
        name: "Element",
        kind: TypeKind::Abstract,
        base: None,
        elements: &[el!("id", &["string"]), el!("extension", &["Extension"], many)],
    },
    TypeDescriptor {
        name: "BackboneElement",
        kind: TypeKind::Abstract,
        base: Some("Element"),
        elements: &[el!("modifierExtension", &["Extension"], many)],
    },
    TypeDescriptor {
        name: "Resource",
        kind: TypeKind::Abstract,
        base: None,
        elements: &[
            el!("id", &["id"]),
            el!("meta", &["Meta"]),
            el!("implicitRules", &["uri"]),
            el!("language", &["code"]),
        ],
    },
    TypeDescriptor {
        name: "DomainResource",
        kind: TypeKind::Abstract,
        base: Some("Resource"),
        elements: &[
            el!("text", &["Narrative"]),
            el!("contained", &["Resource"], many),
            el!("extension", &["Extension"], many),
            el!("modifierExtension", &["Extension"], many),
        ],
    },
    // Primitives
    primitive!("boolean", "Element"),
    primitive!("integer", "Element"),
    primitive!("positiveInt", "integer"),
    primitive!("unsignedInt", "integer"),
    primitive!("decimal", "Element"),
    primitive!("string", "Element"),
    primitive!("code", "string"),
    primitive!("id", "string"),
    primitive!("markdown", "string"),
    primitive!("uri", "Element"),
    primitive!("url", "uri"),
    primitive!("canonical", "uri"),
    primitive!("oid", "uri"),
    primitive!("uuid", "uri"),
    primitive!("base64Binary", "Element"),
    primitive!("date", "Element"),
    primitive!("dateTime", "Element"),
    primitive!("instant", "Element"),
    primitive!("time", "Element"),
    primitive!("xhtml", "Element"),
    // Data types
    TypeDescriptor {
        name: "Extension",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[el!("url", &["uri"]), el!("value", OPEN_TYPES)],
    },
    TypeDescriptor {
        name: "Coding",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[
            el!("system", &["uri"]),
            el!("version", &["string"]),
            el!("code", &["code"]),
            el!("display", &["string"]),
            el!("userSelected", &["boolean"]),
        ],
    },
    TypeDescriptor {
        name: "CodeableConcept",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[el!("coding", &["Coding"], many), el!("text", &["string"])],
    },
    TypeDescriptor {
        name: "Identifier",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[
            el!("use", &["code"]),
            el!("type", &["CodeableConcept"]),
            el!("system", &["uri"]),
            el!("value", &["string"]),
            el!("period", &["Period"]),
            el!("assigner", &["Reference"]),
        ],
    },
    TypeDescriptor {
        name: "HumanName",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[
            el!("use", &["code"]),
            el!("text", &["string"]),
            el!("family", &["string"]),
            el!("given", &["string"], many),
            el!("prefix", &["string"], many),
            el!("suffix", &["string"], many),
            el!("period", &["Period"]),
        ],
    },
    TypeDescriptor {
        name: "Reference",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[
            el!("reference", &["string"]),
            el!("type", &["uri"]),
            el!("identifier", &["Identifier"]),
            el!("display", &["string"]),
        ],
    },
    TypeDescriptor {
        name: "Quantity",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[
            el!("value", &["decimal"]),
            el!("comparator", &["code"]),
            el!("unit", &["string"]),
            el!("system", &["uri"]),
            el!("code", &["code"]),
        ],
    },
    TypeDescriptor {
        name: "Period",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[el!("start", &["dateTime"]), el!("end", &["dateTime"])],
    },
    TypeDescriptor {
        name: "Range",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[el!("low", &["Quantity"]), el!("high", &["Quantity"])],
    },
    TypeDescriptor {
        name: "ContactPoint",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[
            el!("system", &["code"]),
            el!("value", &["string"]),
            el!("use", &["code"]),
            el!("rank", &["positiveInt"]),
            el!("period", &["Period"]),
        ],
    },
    TypeDescriptor {
        name: "Address",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[
            el!("use", &["code"]),
            el!("type", &["code"]),
            el!("text", &["string"]),
            el!("line", &["string"], many),
            el!("city", &["string"]),
            el!("district", &["string"]),
            el!("state", &["string"]),
            el!("postalCode", &["string"]),
            el!("country", &["string"]),
            el!("period", &["Period"]),
        ],
    },
    TypeDescriptor {
        name: "Meta",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[
            el!("versionId", &["id"]),
            el!("lastUpdated", &["instant"]),
            el!("source", &["uri"]),
            el!("profile", &["canonical"], many),
            el!("security", &["Coding"], many),
            el!("tag", &["Coding"], many),
        ],
    },
    TypeDescriptor {
        name: "Narrative",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[el!("status", &["code"]), el!("div", &["xhtml"])],
    },
    TypeDescriptor {
        name: "Annotation",
        kind: TypeKind::Complex,
        base: Some("Element"),
        elements: &[
            el!("author", &["Reference", "string"]),
            el!("time", &["dateTime"]),
            el!("text", &["markdown"]),
        ],
    },
    // Resources
    TypeDescriptor {
        name: "Patient",
        kind: TypeKind::Resource,
        base: Some("DomainResource"),
        elements: &[
            el!("identifier", &["Identifier"], many),
            el!("active", &["boolean"]),
            el!("name", &["HumanName"], many),
            el!("telecom", &["ContactPoint"], many),
            el!("gender", &["code"]),
            el!("birthDate", &["date"]),
            el!("deceased", &["boolean", "dateTime"]),
            el!("address", &["Address"], many),
            el!("maritalStatus", &["CodeableConcept"]),
            el!("multipleBirth", &["boolean", "integer"]),
            el!("contact", &["Patient.contact"], many),
            el!("generalPractitioner", &["Reference"], many),
            el!("managingOrganization", &["Reference"]),
            el!("link", &["Patient.link"], many),
        ],
    },
    TypeDescriptor {
        name: "Patient.contact",
        kind: TypeKind::Backbone,
        base: Some("BackboneElement"),
        elements: &[
            el!("relationship", &["CodeableConcept"], many),
            el!("name", &["HumanName"]),
            el!("telecom", &["ContactPoint"], many),
            el!("address", &["Address"]),
            el!("gender", &["code"]),
            el!("organization", &["Reference"]),
            el!("period", &["Period"]),
        ],
    },
    TypeDescriptor {
        name: "Patient.link",
        kind: TypeKind::Backbone,
        base: Some("BackboneElement"),
        elements: &[el!("other", &["Reference"]), el!("type", &["code"])],
    },
    TypeDescriptor {
        name: "Observation",
        kind: TypeKind::Resource,
        base: Some("DomainResource"),
        elements: &[
            el!("identifier", &["Identifier"], many),
            el!("status", &["code"]),
            el!("category", &["CodeableConcept"], many),
            el!("code", &["CodeableConcept"]),
            el!("subject", &["Reference"]),
            el!("encounter", &["Reference"]),
            el!("effective", &["dateTime", "Period", "instant"]),
            el!("issued", &["instant"]),
            el!("performer", &["Reference"], many),
            el!("value", OBSERVATION_VALUE),
            el!("dataAbsentReason", &["CodeableConcept"]),
            el!("interpretation", &["CodeableConcept"], many),
            el!("note", &["Annotation"], many),
            el!("bodySite", &["CodeableConcept"]),
            el!("method", &["CodeableConcept"]),
            el!("referenceRange", &["Observation.referenceRange"], many),
            el!("hasMember", &["Reference"], many),
            el!("derivedFrom", &["Reference"], many),
            el!("component", &["Observation.component"], many),
        ],
    },
    TypeDescriptor {
        name: "Observation.referenceRange",
        kind: TypeKind::Backbone,
        base: Some("BackboneElement"),
        elements: &[
            el!("low", &["Quantity"]),
            el!("high", &["Quantity"]),
            el!("type", &["CodeableConcept"]),
            el!("text", &["string"]),
        ],
    },
    TypeDescriptor {
        name: "Observation.component",
        kind: TypeKind::Backbone,
        base: Some("BackboneElement"),
        elements: &[
            el!("code", &["CodeableConcept"]),
            el!("value", OBSERVATION_VALUE),
            el!("dataAbsentReason", &["CodeableConcept"]),
            el!("interpretation", &["CodeableConcept"], many),
        ],
    },
    TypeDescriptor {
        name: "Organization",
        kind: TypeKind::Resource,
        base: Some("DomainResource"),
        elements: &[
            el!("identifier", &["Identifier"], many),
            el!("active", &["boolean"]),
            el!("type", &["CodeableConcept"], many),
            el!("name", &["string"]),
            el!("alias", &["string"], many),
            el!("telecom", &["ContactPoint"], many),
            el!("address", &["Address"], many),
            el!("partOf", &["Reference"]),
        ],
    },
    TypeDescriptor {
        name: "Practitioner",
        kind: TypeKind::Resource,
        base: Some("DomainResource"),
        elements: &[
            el!("identifier", &["Identifier"], many),
            el!("active", &["boolean"]),
            el!("name", &["HumanName"], many),
            el!("telecom", &["ContactPoint"], many),
            el!("address", &["Address"], many),
            el!("gender", &["code"]),
            el!("birthDate", &["date"]),
        ],
    },
    TypeDescriptor {
        name: "Condition",
        kind: TypeKind::Resource,
        base: Some("DomainResource"),
        elements: &[
            el!("identifier", &["Identifier"], many),
            el!("clinicalStatus", &["CodeableConcept"]),
            el!("verificationStatus", &["CodeableConcept"]),
            el!("category", &["CodeableConcept"], many),
            el!("severity", &["CodeableConcept"]),
            el!("code", &["CodeableConcept"]),
            el!("subject", &["Reference"]),
            el!("onset", &["dateTime", "string", "Period"]),
            el!("recordedDate", &["dateTime"]),
            el!("note", &["Annotation"], many),
        ],
    },
    TypeDescriptor {
        name: "Basic",
        kind: TypeKind::Resource,
        base: Some("DomainResource"),
        elements: &[
            el!("identifier", &["Identifier"], many),
            el!("code", &["CodeableConcept"]),
            el!("subject", &["Reference"]),
            el!("created", &["date"]),
            el!("author", &["Reference"]),
        ],
    },
    TypeDescriptor {
        name: "Bundle",
        kind: TypeKind::Resource,
        base: Some("Resource"),
        elements: &[
            el!("identifier", &["Identifier"]),
            el!("type", &["code"]),
            el!("timestamp", &["instant"]),
            el!("total", &["unsignedInt"]),
            el!("link", &["Bundle.link"], many),
            el!("entry", &["Bundle.entry"], many),
        ],
    },
    TypeDescriptor {
        name: "Bundle.link",
        kind: TypeKind::Backbone,
        base: Some("BackboneElement"),
        elements: &[el!("relation", &["string"]), el!("url", &["uri"])],
    },
    TypeDescriptor {
        name: "Bundle.entry",
        kind: TypeKind::Backbone,
        base: Some("BackboneElement"),
        elements: &[
            el!("link", &["Bundle.link"], many),
            el!("fullUrl", &["uri"]),
            el!("resource", &["Resource"]),
            el!("request", &["Bundle.entry.request"]),
        ],
    },
    TypeDescriptor {
        name: "Bundle.entry.request",
        kind: TypeKind::Backbone,
        base: Some("BackboneElement"),
        elements: &[el!("method", &["code"]), el!("url", &["uri"])],
    },
    TypeDescriptor {
        name: "Parameters",
        kind: TypeKind::Resource,
        base: Some("Resource"),
        elements: &[el!("parameter", &["Parameters.parameter"], many)],
    },
    TypeDescriptor {
        name: "Parameters.parameter",
        kind: TypeKind::Backbone,
        base: Some("BackboneElement"),
        elements: &[
            el!("name", &["string"]),
            el!("value", OPEN_TYPES),
            el!("resource", &["Resource"]),
            el!("part", &["Parameters.parameter"], many),
        ],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inherited_elements_come_first() {
        let patient = type_descriptor("Patient").unwrap();
        let names: Vec<_> = patient.all_elements().iter().map(|e| e.name).collect();
        assert_eq!(&names[..4], &["id", "meta", "implicitRules", "language"]);
        assert!(names.contains(&"contained"));
        assert!(patient.element("birthDate").is_some());
    }

    #[test]
    fn choice_keys_resolve_to_types() {
        let value = element_descriptor("Observation", "value").unwrap();
        assert!(value.is_choice());
        assert_eq!(value.type_for_key("valueQuantity"), Some("Quantity"));
        assert_eq!(value.type_for_key("valueDateTime"), Some("dateTime"));
        assert_eq!(value.type_for_key("valueFoo"), None);
        assert_eq!(value.json_key("CodeableConcept"), "valueCodeableConcept");
    }

    #[test]
    fn subtype_chain() {
        let code = type_descriptor("code").unwrap();
        assert!(code.is_subtype_of("string"));
        assert!(type_descriptor("Patient").unwrap().is_subtype_of("Resource"));
        assert!(is_resource_type("Bundle"));
        assert!(!is_resource_type("DomainResource"));
    }
}
