//! FHIR documents used across the REST tests.

use serde_json::{Value, json};

/// A patient with a family name and optional birth date.
pub fn patient(id: &str, family: &str, birth_date: Option<&str>) -> Value {
    let mut body = json!({
        "resourceType": "Patient",
        "id": id,
        "name": [{"family": family}]
    });
    if let Some(birth_date) = birth_date {
        body["birthDate"] = json!(birth_date);
    }
    body
}

/// An organization.
pub fn organization(id: &str, name: &str) -> Value {
    json!({
        "resourceType": "Organization",
        "id": id,
        "name": name,
        "active": true
    })
}

/// A LOINC-coded observation about a patient.
pub fn observation(id: &str, patient_id: &str, code: &str, value: f64) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": "final",
        "code": {"coding": [{"system": "http://loinc.org", "code": code}]},
        "subject": {"reference": format!("Patient/{patient_id}")},
        "valueQuantity": {
            "value": value,
            "unit": "mg/dL",
            "system": "http://unitsofmeasure.org",
            "code": "mg/dL"
        }
    })
}

/// An encounter for a patient with an R4 `period`.
pub fn encounter(id: &str, patient_id: &str, start: &str) -> Value {
    json!({
        "resourceType": "Encounter",
        "id": id,
        "status": "finished",
        "class": {"system": "http://terminology.hl7.org/CodeSystem/v3-ActCode", "code": "AMB"},
        "subject": {"reference": format!("Patient/{patient_id}")},
        "period": {"start": start}
    })
}
