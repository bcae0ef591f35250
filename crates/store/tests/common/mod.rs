//! Shared setup for the store integration tests.

#![allow(dead_code)]

use serde_json::{json, Value};

use helios_store::backends::sqlite::SqliteBackend;
use helios_store::core::{ResourceStorage, SearchProvider, SearchResults};

/// Creates an in-memory backend with the schema installed.
pub fn create_backend() -> SqliteBackend {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to initialize schema");
    backend
}

/// A patient document.
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

/// A glucose observation for a patient.
pub fn glucose(id: &str, patient_id: &str, value: f64) -> Value {
    json!({
        "resourceType": "Observation",
        "id": id,
        "status": "final",
        "code": {"coding": [{"system": "http://loinc.org", "code": "2339-0", "display": "Glucose"}], "text": "glucose"},
        "subject": {"reference": format!("Patient/{patient_id}")},
        "valueQuantity": {"value": value, "unit": "mg/dL", "system": "http://unitsofmeasure.org", "code": "mg/dL"}
    })
}

/// Stores every document, panicking on the first failure.
pub async fn seed(backend: &SqliteBackend, documents: Vec<Value>) {
    for document in documents {
        let resource_type = document["resourceType"]
            .as_str()
            .expect("fixture has a resourceType")
            .to_string();
        backend
            .create(&resource_type, document)
            .await
            .expect("Failed to seed resource");
    }
}

/// Translates and runs a query string.
pub async fn search(backend: &SqliteBackend, resource_type: &str, query: &str) -> SearchResults {
    let query = backend
        .translator()
        .translate_query_string(resource_type, query)
        .expect("query should translate");
    backend.search(&query).await.expect("search should succeed")
}

/// Logical ids of the matches, in order.
pub fn ids(results: &SearchResults) -> Vec<String> {
    results
        .resources
        .items
        .iter()
        .map(|r| r.id().to_string())
        .collect()
}
