//! FHIR version negotiation and document transforms.
//!
//! Documents are stored in R4 form. A request may name another version
//! through the `fhirVersion` media-type parameter; inbound bodies are
//! brought to R4 before storage and outbound bodies are rewritten for the
//! negotiated version. Only the renames between R4 and R5 that touch
//! indexed elements are handled; anything else passes through untouched.
//!
//! See: <https://hl7.org/fhir/http.html#version-parameter>

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value, json};

/// A supported FHIR version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FhirVersion {
    /// FHIR R4 (4.0.1), the stored form.
    #[default]
    R4,
    /// FHIR R4B (4.3.0).
    R4B,
    /// FHIR R5 (5.0.0).
    R5,
}

impl FhirVersion {
    /// All supported versions.
    pub const ALL: [FhirVersion; 3] = [FhirVersion::R4, FhirVersion::R4B, FhirVersion::R5];

    /// The `fhirVersion` media-type parameter value.
    pub fn as_mime_param(&self) -> &'static str {
        match self {
            FhirVersion::R4 => "4.0",
            FhirVersion::R4B => "4.3",
            FhirVersion::R5 => "5.0",
        }
    }

    /// The full version number, as used in a CapabilityStatement.
    pub fn full_version(&self) -> &'static str {
        match self {
            FhirVersion::R4 => "4.0.1",
            FhirVersion::R4B => "4.3.0",
            FhirVersion::R5 => "5.0.0",
        }
    }

    /// Parses a `fhirVersion` parameter. Accepts `4.0` as well as `4.0.1`.
    pub fn from_mime_param(value: &str) -> Option<Self> {
        let value = value.trim().trim_matches('"');
        let mut parts = value.split('.');
        let major_minor = (parts.next()?, parts.next()?);
        match major_minor {
            ("4", "0") => Some(FhirVersion::R4),
            ("4", "3") => Some(FhirVersion::R4B),
            ("5", "0") => Some(FhirVersion::R5),
            _ => None,
        }
    }

    /// The release label (`R4`, `R4B`, `R5`).
    pub fn label(&self) -> &'static str {
        match self {
            FhirVersion::R4 => "R4",
            FhirVersion::R4B => "R4B",
            FhirVersion::R5 => "R5",
        }
    }
}

impl fmt::Display for FhirVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FhirVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "R4" => Ok(FhirVersion::R4),
            "R4B" => Ok(FhirVersion::R4B),
            "R5" => Ok(FhirVersion::R5),
            other => FhirVersion::from_mime_param(other)
                .ok_or_else(|| format!("unsupported FHIR version: {}", s)),
        }
    }
}

/// Rewrites a document received in `from` into the stored (R4) form.
pub fn to_canonical(resource: Value, from: FhirVersion) -> Value {
    match from {
        FhirVersion::R4 | FhirVersion::R4B => resource,
        FhirVersion::R5 => map_resource(resource, &r5_to_r4),
    }
}

/// Rewrites a stored document for a client that negotiated `to`.
pub fn from_canonical(resource: Value, to: FhirVersion) -> Value {
    match to {
        FhirVersion::R4 | FhirVersion::R4B => resource,
        FhirVersion::R5 => map_resource(resource, &r4_to_r5),
    }
}

/// Applies `f` to a resource, or to every entry resource of a Bundle.
fn map_resource(mut resource: Value, f: &dyn Fn(&str, &mut Map<String, Value>)) -> Value {
    let Some(obj) = resource.as_object_mut() else {
        return resource;
    };
    let resource_type = obj
        .get("resourceType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    if resource_type == "Bundle" {
        if let Some(entries) = obj.get_mut("entry").and_then(Value::as_array_mut) {
            for entry in entries {
                if let Some(inner) = entry.get_mut("resource") {
                    let taken = inner.take();
                    *inner = map_resource(taken, f);
                }
            }
        }
    } else {
        f(&resource_type, obj);
    }
    resource
}

fn r4_to_r5(resource_type: &str, obj: &mut Map<String, Value>) {
    match resource_type {
        "Encounter" => {
            rename(obj, "period", "actualPeriod");
            if let Some(class) = obj.remove("class") {
                let concept = if class.is_object() {
                    json!([{ "coding": [class] }])
                } else {
                    class
                };
                obj.insert("class".to_string(), concept);
            }
        }
        "MedicationRequest" => {
            if let Some(concept) = obj.remove("medicationCodeableConcept") {
                obj.insert("medication".to_string(), json!({ "concept": concept }));
            } else if let Some(reference) = obj.remove("medicationReference") {
                obj.insert("medication".to_string(), json!({ "reference": reference }));
            }
        }
        _ => {}
    }
}

fn r5_to_r4(resource_type: &str, obj: &mut Map<String, Value>) {
    match resource_type {
        "Encounter" => {
            rename(obj, "actualPeriod", "period");
            if let Some(class) = obj.remove("class") {
                // R4 allows a single Coding; the first one wins.
                let coding = class
                    .as_array()
                    .and_then(|concepts| concepts.first())
                    .and_then(|concept| concept.get("coding"))
                    .and_then(Value::as_array)
                    .and_then(|codings| codings.first())
                    .cloned();
                match coding {
                    Some(coding) => {
                        obj.insert("class".to_string(), coding);
                    }
                    None if class.is_object() => {
                        obj.insert("class".to_string(), class);
                    }
                    None => {}
                }
            }
        }
        "MedicationRequest" => {
            if let Some(mut medication) = obj.remove("medication") {
                if let Some(concept) = medication.get_mut("concept").map(Value::take) {
                    obj.insert("medicationCodeableConcept".to_string(), concept);
                } else if let Some(reference) = medication.get_mut("reference").map(Value::take) {
                    obj.insert("medicationReference".to_string(), reference);
                }
            }
        }
        _ => {}
    }
}

fn rename(obj: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(value) = obj.remove(from) {
        obj.insert(to.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_param_round_trip() {
        for version in FhirVersion::ALL {
            assert_eq!(
                FhirVersion::from_mime_param(version.as_mime_param()),
                Some(version)
            );
        }
        assert_eq!(FhirVersion::from_mime_param("4.0.1"), Some(FhirVersion::R4));
        assert_eq!(FhirVersion::from_mime_param("3.0"), None);
        assert_eq!(FhirVersion::from_mime_param("6.0"), None);
        assert_eq!(FhirVersion::from_mime_param("garbage"), None);
    }

    #[test]
    fn test_from_str_accepts_labels_and_numbers() {
        assert_eq!("r4b".parse::<FhirVersion>().unwrap(), FhirVersion::R4B);
        assert_eq!("5.0".parse::<FhirVersion>().unwrap(), FhirVersion::R5);
        assert!("R6".parse::<FhirVersion>().is_err());
    }

    #[test]
    fn test_encounter_r5_renames() {
        let stored = json!({
            "resourceType": "Encounter",
            "id": "e1",
            "meta": {"source": "urn:lab"},
            "class": {"system": "http://terminology.hl7.org/CodeSystem/v3-ActCode", "code": "AMB"},
            "period": {"start": "2024-01-01"},
            "status": "finished"
        });

        let r5 = from_canonical(stored.clone(), FhirVersion::R5);
        assert_eq!(r5["actualPeriod"]["start"], "2024-01-01");
        assert!(r5.get("period").is_none());
        assert_eq!(r5["class"][0]["coding"][0]["code"], "AMB");
        assert_eq!(r5["meta"]["source"], "urn:lab");
        assert_eq!(r5["status"], "finished");

        assert_eq!(to_canonical(r5, FhirVersion::R5), stored);
    }

    #[test]
    fn test_medication_request_r5_renames() {
        let stored = json!({
            "resourceType": "MedicationRequest",
            "medicationReference": {"reference": "Medication/m1"}
        });
        let r5 = from_canonical(stored.clone(), FhirVersion::R5);
        assert_eq!(r5["medication"]["reference"]["reference"], "Medication/m1");
        assert_eq!(to_canonical(r5, FhirVersion::R5), stored);

        let coded = json!({
            "resourceType": "MedicationRequest",
            "medication": {"concept": {"text": "aspirin"}}
        });
        let r4 = to_canonical(coded, FhirVersion::R5);
        assert_eq!(r4["medicationCodeableConcept"]["text"], "aspirin");
    }

    #[test]
    fn test_bundle_entries_are_transformed() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "searchset",
            "entry": [
                {"resource": {"resourceType": "Encounter", "period": {"start": "2024"}}},
                {"resource": {"resourceType": "Patient", "id": "p"}}
            ]
        });
        let r5 = from_canonical(bundle, FhirVersion::R5);
        assert_eq!(r5["entry"][0]["resource"]["actualPeriod"]["start"], "2024");
        assert_eq!(r5["entry"][1]["resource"]["id"], "p");
    }

    #[test]
    fn test_r4b_is_identity() {
        let doc = json!({"resourceType": "Encounter", "period": {"start": "2024"}});
        assert_eq!(from_canonical(doc.clone(), FhirVersion::R4B), doc);
        assert_eq!(to_canonical(doc.clone(), FhirVersion::R4B), doc);
    }
}
