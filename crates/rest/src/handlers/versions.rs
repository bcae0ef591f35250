//! FHIR $versions operation handler.
//!
//! Implements the `$versions` operation:
//! <https://build.fhir.org/capabilitystatement-operation-versions.html>

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::RestResult;
use crate::state::AppState;
use crate::version::FhirVersion;

/// Handler for the $versions operation.
///
/// # Example Response
///
/// ```json
/// {
///   "resourceType": "Parameters",
///   "parameter": [
///     { "name": "version", "valueCode": "4.0" },
///     { "name": "version", "valueCode": "4.3" },
///     { "name": "version", "valueCode": "5.0" },
///     { "name": "default", "valueCode": "4.0" }
///   ]
/// }
/// ```
pub async fn versions_handler<S>(State(state): State<AppState<S>>) -> RestResult<Response>
where
    S: Send + Sync,
{
    debug!("Processing $versions request");

    let response = versions_parameters(state.default_fhir_version());
    Ok((StatusCode::OK, Json(response)).into_response())
}

fn versions_parameters(default_version: FhirVersion) -> Value {
    let mut parameters: Vec<Value> = FhirVersion::ALL
        .iter()
        .map(|v| json!({ "name": "version", "valueCode": v.as_mime_param() }))
        .collect();
    parameters.push(json!({
        "name": "default",
        "valueCode": default_version.as_mime_param()
    }));

    json!({
        "resourceType": "Parameters",
        "parameter": parameters
    })
}
