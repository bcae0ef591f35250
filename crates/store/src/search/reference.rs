//! Reference normalization.
//!
//! The same target can be written several ways: `Patient/123`,
//! `http://example.org/fhir/Patient/123/_history/2`, `urn:uuid:123`, or a
//! bare `123`. Indexing and querying both reduce a reference to a
//! [`ReferenceKey`] so that every form compares equal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A normalized reference target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceKey {
    /// Target type; `None` when neither the reference nor the parameter names one.
    pub resource_type: Option<String>,
    /// Target logical id.
    pub id: String,
}

impl ReferenceKey {
    /// Creates a typed key.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            id: id.into(),
        }
    }

    /// Returns `(type, id)` when the type is known.
    pub fn typed(&self) -> Option<(&str, &str)> {
        self.resource_type
            .as_deref()
            .map(|rt| (rt, self.id.as_str()))
    }
}

impl fmt::Display for ReferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource_type {
            Some(rt) => write!(f, "{}/{}", rt, self.id),
            None => f.write_str(&self.id),
        }
    }
}

/// Normalizes a reference string.
///
/// `default_type` is used when the reference itself carries no type (bare
/// ids and `urn:uuid:` placeholders). Local references (`#contained`) and
/// strings with no usable id yield `None`.
///
/// ```
/// use helios_store::search::{normalize_reference, ReferenceKey};
///
/// let expected = Some(ReferenceKey::new("Patient", "123"));
/// assert_eq!(normalize_reference("Patient/123", None), expected);
/// assert_eq!(normalize_reference("urn:uuid:123", Some("Patient")), expected);
/// assert_eq!(normalize_reference("http://x/Patient/123", None), expected);
/// ```
pub fn normalize_reference(reference: &str, default_type: Option<&str>) -> Option<ReferenceKey> {
    let reference = reference.trim();
    if reference.is_empty() || reference.starts_with('#') {
        return None;
    }

    for scheme in ["urn:uuid:", "urn:oid:"] {
        if let Some(id) = reference.strip_prefix(scheme) {
            return valid_id(id).then(|| ReferenceKey {
                resource_type: default_type.map(str::to_string),
                id: id.to_string(),
            });
        }
    }

    // Canonical version suffix and history suffix do not change the target.
    let reference = reference
        .split_once('|')
        .map_or(reference, |(url, _)| url);
    let reference = match reference.find("/_history/") {
        Some(pos) => &reference[..pos],
        None => reference,
    };

    let absolute = reference.contains("://");
    let path = match reference.split_once("://") {
        Some((_, rest)) => rest,
        None => reference,
    };
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    match segments.as_slice() {
        [] => None,
        [id] if !absolute => valid_id(id).then(|| ReferenceKey {
            resource_type: default_type.map(str::to_string),
            id: id.to_string(),
        }),
        [.., rt, id] if is_resource_type_name(rt) && valid_id(id) => {
            Some(ReferenceKey::new(*rt, *id))
        }
        _ => None,
    }
}

/// Returns `true` for a syntactically valid resource type name.
pub fn is_resource_type_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

/// Returns `true` for a syntactically valid logical id.
pub fn valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_forms_normalize_to_same_key() {
        let expected = Some(ReferenceKey::new("Patient", "123"));
        assert_eq!(normalize_reference("Patient/123", None), expected);
        assert_eq!(normalize_reference("urn:uuid:123", Some("Patient")), expected);
        assert_eq!(normalize_reference("http://x/Patient/123", None), expected);
        assert_eq!(
            normalize_reference("https://fhir.example.org/r4/Patient/123/_history/4", None),
            expected
        );
        assert_eq!(normalize_reference("123", Some("Patient")), expected);
    }

    #[test]
    fn test_untyped_reference_without_default() {
        let key = normalize_reference("123", None).unwrap();
        assert_eq!(key.resource_type, None);
        assert_eq!(key.typed(), None);
        assert_eq!(key.to_string(), "123");
    }

    #[test]
    fn test_explicit_type_wins_over_default() {
        assert_eq!(
            normalize_reference("Group/g1", Some("Patient")),
            Some(ReferenceKey::new("Group", "g1"))
        );
    }

    #[test]
    fn test_unusable_references() {
        assert_eq!(normalize_reference("", None), None);
        assert_eq!(normalize_reference("#contained-1", Some("Patient")), None);
        assert_eq!(normalize_reference("http://example.org", None), None);
        assert_eq!(normalize_reference("patient/123", None), None);
        assert_eq!(normalize_reference("Patient/bad id", None), None);
    }

    #[test]
    fn test_canonical_version_is_ignored() {
        assert_eq!(
            normalize_reference("http://hl7.org/fhir/ValueSet/abc|4.0.1", None),
            Some(ReferenceKey::new("ValueSet", "abc"))
        );
    }
}
