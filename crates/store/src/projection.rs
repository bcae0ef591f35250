//! Resource subsetting for `_summary` and `_elements`.
//!
//! Projection is a pass over the selected documents; it never changes what
//! a search matches. Any subsetted result carries the `SUBSETTED` tag in
//! `meta.tag` so clients do not mistake it for the full resource.
//!
//! See: https://hl7.org/fhir/search.html#summary

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::catalog::path::is_choice_of;
use crate::catalog::{ParamCatalog, ENVELOPE_ELEMENTS};
use crate::types::SummaryMode;

/// Code system of the `SUBSETTED` tag.
pub const SUBSETTED_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/v3-ObservationValue";

/// Applies `_summary` and `_elements` using the catalog's summary lists.
#[derive(Debug, Clone)]
pub struct Projector {
    catalog: Arc<ParamCatalog>,
}

impl Projector {
    /// Creates a projector over a catalog.
    pub fn new(catalog: Arc<ParamCatalog>) -> Self {
        Self { catalog }
    }

    /// Projects a resource. `_elements` wins when both are given.
    pub fn apply(&self, resource: &Value, summary: Option<SummaryMode>, elements: &[String]) -> Value {
        if !elements.is_empty() {
            return self.select_elements(resource, elements);
        }
        match summary {
            Some(mode) => self.summarize(resource, mode),
            None => resource.clone(),
        }
    }

    /// Returns `true` when the projection would change the resource.
    pub fn is_subsetting(summary: Option<SummaryMode>, elements: &[String]) -> bool {
        !elements.is_empty()
            || matches!(
                summary,
                Some(SummaryMode::True | SummaryMode::Text | SummaryMode::Data)
            )
    }

    /// Applies a `_summary` mode.
    pub fn summarize(&self, resource: &Value, mode: SummaryMode) -> Value {
        match mode {
            SummaryMode::False => resource.clone(),
            SummaryMode::Count => keep_paths(resource, &envelope_paths()),
            SummaryMode::Text => {
                let mut paths = envelope_paths();
                paths.push(vec!["text"]);
                tag_subsetted(keep_paths(resource, &paths))
            }
            SummaryMode::Data => {
                let mut projected = resource.clone();
                if let Some(obj) = projected.as_object_mut() {
                    obj.remove("text");
                }
                tag_subsetted(projected)
            }
            SummaryMode::True => {
                let Some(resource_type) = resource.get("resourceType").and_then(Value::as_str) else {
                    return resource.clone();
                };
                let mut paths = envelope_paths();
                paths.extend(
                    self.catalog
                        .summary_elements(resource_type)
                        .iter()
                        .map(|e| vec![e.as_str()]),
                );
                tag_subsetted(keep_paths(resource, &paths))
            }
        }
    }

    /// Keeps the named elements (`name`, `name.family`) plus the envelope.
    pub fn select_elements(&self, resource: &Value, elements: &[String]) -> Value {
        let mut paths = envelope_paths();
        paths.extend(
            elements
                .iter()
                .map(|e| e.split('.').filter(|s| !s.is_empty()).collect::<Vec<_>>())
                .filter(|p| !p.is_empty()),
        );
        tag_subsetted(keep_paths(resource, &paths))
    }
}

fn envelope_paths() -> Vec<Vec<&'static str>> {
    ENVELOPE_ELEMENTS.iter().map(|e| vec![*e]).collect()
}

/// Keeps only the given paths, rebuilding the minimal nested structure.
///
/// Arrays are preserved: a path through an array applies to each element,
/// and elements that end up empty are dropped.
fn keep_paths(value: &Value, paths: &[Vec<&str>]) -> Value {
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| keep_paths(item, paths))
                .filter(|item| !is_empty_object(item))
                .collect(),
        ),
        Value::Object(obj) => {
            let mut result = Map::new();
            for (key, child) in obj {
                let matching: Vec<&Vec<&str>> = paths
                    .iter()
                    .filter(|p| p.first().is_some_and(|head| key_matches(key, head)))
                    .collect();
                if matching.is_empty() {
                    continue;
                }
                if matching.iter().any(|p| p.len() == 1) {
                    result.insert(key.clone(), child.clone());
                    continue;
                }
                let rest: Vec<Vec<&str>> = matching.iter().map(|p| p[1..].to_vec()).collect();
                let projected = keep_paths(child, &rest);
                if !is_empty_object(&projected) && projected != Value::Array(Vec::new()) {
                    result.insert(key.clone(), projected);
                }
            }
            Value::Object(result)
        }
        other => other.clone(),
    }
}

fn key_matches(key: &str, element: &str) -> bool {
    key == element || is_choice_of(key, element)
}

fn is_empty_object(value: &Value) -> bool {
    value.as_object().is_some_and(Map::is_empty)
}

fn tag_subsetted(mut resource: Value) -> Value {
    add_subsetted_tag(&mut resource);
    resource
}

fn add_subsetted_tag(resource: &mut Value) {
    let Some(obj) = resource.as_object_mut() else {
        return;
    };
    let meta = obj.entry("meta").or_insert_with(|| json!({}));
    let Some(tags) = meta
        .as_object_mut()
        .map(|meta| meta.entry("tag").or_insert_with(|| json!([])))
        .and_then(Value::as_array_mut)
    else {
        return;
    };
    let present = tags
        .iter()
        .any(|t| t.get("code").and_then(Value::as_str) == Some("SUBSETTED"));
    if !present {
        tags.push(json!({"system": SUBSETTED_SYSTEM, "code": "SUBSETTED"}));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projector() -> Projector {
        Projector::new(Arc::new(ParamCatalog::builtin()))
    }

    fn patient() -> Value {
        json!({
            "resourceType": "Patient",
            "id": "123",
            "meta": {"versionId": "1"},
            "text": {"status": "generated", "div": "<div>Patient</div>"},
            "name": [{"family": "Smith", "given": ["John"]}, {"text": "Johnny"}],
            "birthDate": "1990-01-01",
            "deceasedBoolean": false,
            "communication": [{"language": {"text": "English"}}],
            "photo": [{"data": "aGVsbG8="}]
        })
    }

    fn has_subsetted_tag(resource: &Value) -> bool {
        resource["meta"]["tag"]
            .as_array()
            .is_some_and(|tags| tags.iter().any(|t| t["code"] == "SUBSETTED"))
    }

    #[test]
    fn test_summary_false_is_identity() {
        assert_eq!(projector().summarize(&patient(), SummaryMode::False), patient());
    }

    #[test]
    fn test_summary_true_keeps_catalog_elements() {
        let result = projector().summarize(&patient(), SummaryMode::True);
        assert_eq!(result["id"], "123");
        assert!(result.get("name").is_some());
        assert!(result.get("birthDate").is_some());
        // choice element `deceased[x]`
        assert_eq!(result["deceasedBoolean"], false);
        assert!(result.get("communication").is_none());
        assert!(result.get("photo").is_none());
        assert!(result.get("text").is_none());
        assert!(has_subsetted_tag(&result));
        assert_eq!(result["meta"]["versionId"], "1");
    }

    #[test]
    fn test_summary_text_and_data() {
        let text = projector().summarize(&patient(), SummaryMode::Text);
        assert!(text.get("text").is_some());
        assert!(text.get("name").is_none());
        assert!(has_subsetted_tag(&text));

        let data = projector().summarize(&patient(), SummaryMode::Data);
        assert!(data.get("text").is_none());
        assert!(data.get("photo").is_some());
    }

    #[test]
    fn test_elements_rebuilds_nested_structure() {
        let result = projector().select_elements(&patient(), &["name.family".to_string()]);
        assert_eq!(result["name"], json!([{"family": "Smith"}]));
        assert!(result.get("birthDate").is_none());
        assert_eq!(result["resourceType"], "Patient");
        assert!(has_subsetted_tag(&result));
    }

    #[test]
    fn test_elements_wins_over_summary() {
        let result = projector().apply(
            &patient(),
            Some(SummaryMode::True),
            &["photo".to_string()],
        );
        assert!(result.get("photo").is_some());
        assert!(result.get("name").is_none());
    }

    #[test]
    fn test_subsetted_tag_is_added_once() {
        let once = projector().select_elements(&patient(), &["name".to_string()]);
        let twice = projector().select_elements(&once, &["name".to_string()]);
        assert_eq!(twice["meta"]["tag"].as_array().map(Vec::len), Some(1));
    }

    #[test]
    fn test_is_subsetting() {
        assert!(!Projector::is_subsetting(None, &[]));
        assert!(!Projector::is_subsetting(Some(SummaryMode::False), &[]));
        assert!(Projector::is_subsetting(Some(SummaryMode::True), &[]));
        assert!(Projector::is_subsetting(None, &["id".to_string()]));
    }
}
