//! Response bodies.
//!
//! Every body leaves the server through [`fhir_json`], which rewrites the
//! stored form for the negotiated version and sets `Content-Type`.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use helios_store::error::{OutcomeIssue, ValidationSeverity, operation_outcome};
use helios_store::types::StoredResource;
use serde_json::Value;

use crate::middleware::content_type::content_type_header;
use crate::middleware::prefer::ReturnPreference;
use crate::responses::headers::ResourceHeaders;
use crate::version::{self, FhirVersion};

/// A JSON response in `version`.
pub fn fhir_json(status: StatusCode, mut headers: HeaderMap, body: Value, version: FhirVersion) -> Response {
    if let Ok(value) = HeaderValue::from_str(&content_type_header(version)) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    let body = version::from_canonical(body, version);
    (status, headers, Json(body)).into_response()
}

/// Response for a write, honoring `Prefer: return=`.
pub fn write_response(
    status: StatusCode,
    stored: &StoredResource,
    headers: ResourceHeaders,
    preference: ReturnPreference,
    version: FhirVersion,
    message: &str,
) -> Response {
    let header_map = headers.to_header_map();
    match preference {
        ReturnPreference::Minimal => (status, header_map).into_response(),
        ReturnPreference::OperationOutcome => {
            let issue = OutcomeIssue {
                severity: ValidationSeverity::Information,
                code: "informational".to_string(),
                diagnostics: format!("{}: {}", message, stored.versioned_url()),
                expression: Vec::new(),
            };
            fhir_json(status, header_map, operation_outcome(&[issue]), version)
        }
        ReturnPreference::Representation => {
            fhir_json(status, header_map, stored.content().clone(), version)
        }
    }
}
