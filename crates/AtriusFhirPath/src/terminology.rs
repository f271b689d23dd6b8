//! Terminology providers consulted by `memberOf()`, `subsumes()`,
//! `subsumedBy()` and `%terminologies.validateVS()`.

use std::collections::{HashMap, HashSet, VecDeque};

use once_cell::sync::Lazy;
use regex::Regex;

/// Value set holding every syntactically valid BCP-47 language tag.
pub const ALL_LANGUAGES_VALUE_SET: &str = "http://hl7.org/fhir/ValueSet/all-languages";

pub const BCP47_SYSTEM: &str = "urn:ietf:bcp:47";

static LANGUAGE_TAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z]{2,3}(?:-[A-Za-z]{3}){0,3}(?:-[A-Za-z]{4})?(?:-(?:[A-Za-z]{2}|[0-9]{3}))?(?:-(?:[A-Za-z0-9]{5,8}|[0-9][A-Za-z0-9]{3}))*(?:-[A-WY-Za-wy-z0-9](?:-[A-Za-z0-9]{2,8})+)*(?:-[Xx](?:-[A-Za-z0-9]{1,8})+)?$",
    )
    .unwrap()
});

/// Terminology lookups used by the evaluator.
///
/// Answers are tri-state:
/// - `Some(true)`  => confirmed
/// - `Some(false)` => confirmed NOT
/// - `None`        => cannot decide (unknown value set, service unavailable, ...)
pub trait TerminologyProvider: Send + Sync {
    /// Whether `system|code` (at `version`, when given) is in the value set
    /// identified by `valueset_url`.
    fn validate_in_valueset(
        &self,
        valueset_url: &str,
        system: &str,
        version: Option<&str>,
        code: &str,
    ) -> Option<bool>;

    /// Whether `ancestor` subsumes `descendant` within `system`.
    fn subsumes(&self, system: &str, ancestor: &str, descendant: &str) -> Option<bool> {
        let _ = (system, ancestor, descendant);
        None
    }
}

/// Whether `tag` is a well-formed BCP-47 language tag.
pub fn is_language_tag(tag: &str) -> bool {
    LANGUAGE_TAG.is_match(tag)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Concept {
    system: String,
    code: String,
}

impl Concept {
    fn new(system: &str, code: &str) -> Self {
        Self {
            system: system.to_string(),
            code: code.to_string(),
        }
    }
}

/// Provider backed by explicitly listed value sets and code hierarchies.
///
/// ```rust
/// use atrius_fhir_path::terminology::{InMemoryTerminologyProvider, TerminologyProvider};
///
/// let provider = InMemoryTerminologyProvider::new()
///     .with_value_set("http://example.org/vs", [("http://loinc.org", "1234-5")]);
/// assert_eq!(
///     provider.validate_in_valueset("http://example.org/vs", "http://loinc.org", None, "1234-5"),
///     Some(true)
/// );
/// assert_eq!(provider.validate_in_valueset("http://example.org/other", "", None, "x"), None);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryTerminologyProvider {
    value_sets: HashMap<String, HashSet<Concept>>,
    parents: HashMap<Concept, Vec<String>>,
}

impl InMemoryTerminologyProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or extends) a value set with `(system, code)` pairs.
    pub fn with_value_set<'a>(
        mut self,
        url: &str,
        codes: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let concepts = self.value_sets.entry(url.to_string()).or_default();
        concepts.extend(codes.into_iter().map(|(system, code)| Concept::new(system, code)));
        self
    }

    /// Records that `child` is directly subsumed by `parent` in `system`.
    pub fn with_parent(mut self, system: &str, child: &str, parent: &str) -> Self {
        self.parents
            .entry(Concept::new(system, child))
            .or_default()
            .push(parent.to_string());
        self
    }

    fn knows_system(&self, system: &str) -> bool {
        self.parents.keys().any(|c| c.system == system)
    }
}

impl TerminologyProvider for InMemoryTerminologyProvider {
    fn validate_in_valueset(
        &self,
        valueset_url: &str,
        system: &str,
        _version: Option<&str>,
        code: &str,
    ) -> Option<bool> {
        if let Some(concepts) = self.value_sets.get(valueset_url) {
            let found = concepts
                .iter()
                .any(|c| c.code == code && (system.is_empty() || c.system == system));
            return Some(found);
        }
        if valueset_url == ALL_LANGUAGES_VALUE_SET {
            let system_ok = system.is_empty() || system == BCP47_SYSTEM;
            return Some(system_ok && is_language_tag(code));
        }
        None
    }

    fn subsumes(&self, system: &str, ancestor: &str, descendant: &str) -> Option<bool> {
        if ancestor == descendant {
            return Some(true);
        }
        if !self.knows_system(system) {
            return None;
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([descendant.to_string()]);
        while let Some(code) = queue.pop_front() {
            if !seen.insert(code.clone()) {
                continue;
            }
            for parent in self.parents.get(&Concept::new(system, &code)).into_iter().flatten() {
                if parent == ancestor {
                    return Some(true);
                }
                queue.push_back(parent.clone());
            }
        }
        Some(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_tags() {
        for tag in ["en", "en-US", "zh-Hant-TW", "de-CH-1996", "x-klingon"] {
            assert_eq!(is_language_tag(tag), tag != "x-klingon", "{}", tag);
        }
        let provider = InMemoryTerminologyProvider::new();
        assert_eq!(
            provider.validate_in_valueset(ALL_LANGUAGES_VALUE_SET, BCP47_SYSTEM, None, "en-AU"),
            Some(true)
        );
        assert_eq!(
            provider.validate_in_valueset(ALL_LANGUAGES_VALUE_SET, "", None, "english please"),
            Some(false)
        );
    }

    #[test]
    fn hierarchy() {
        let sct = "http://snomed.info/sct";
        let provider = InMemoryTerminologyProvider::new()
            .with_parent(sct, "child", "parent")
            .with_parent(sct, "parent", "root");
        assert_eq!(provider.subsumes(sct, "root", "child"), Some(true));
        assert_eq!(provider.subsumes(sct, "child", "root"), Some(false));
        assert_eq!(provider.subsumes("http://loinc.org", "a", "b"), None);
    }
}
