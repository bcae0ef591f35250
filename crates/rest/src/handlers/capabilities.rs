//! Capabilities (CapabilityStatement) handler.
//!
//! Implements the FHIR [capabilities interaction](https://hl7.org/fhir/http.html#capabilities):
//! `GET [base]/metadata`
//!
//! CapabilityStatement.fhirVersion is 1..1, so the statement describes the
//! version negotiated from the `Accept` header.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use helios_store::catalog::ParamCatalog;
use helios_store::core::SearchProvider;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::RestResult;
use crate::extractors::AcceptVersion;
use crate::responses::fhir_json;
use crate::state::AppState;
use crate::version::FhirVersion;

/// Handler for the capabilities interaction.
///
/// The resource list and each type's search parameters come from the
/// parameter catalog the backend indexes with.
pub async fn capabilities_handler<S>(
    State(state): State<AppState<S>>,
    AcceptVersion(version): AcceptVersion,
) -> RestResult<Response>
where
    S: SearchProvider + Send + Sync,
{
    debug!(fhir_version = %version, "Processing capabilities request");

    let catalog = state.storage().param_catalog();
    let statement = build_capability_statement(&state, &catalog, version);

    Ok(fhir_json(StatusCode::OK, HeaderMap::new(), statement, version))
}

fn build_capability_statement<S>(
    state: &AppState<S>,
    catalog: &ParamCatalog,
    version: FhirVersion,
) -> Value
where
    S: SearchProvider,
{
    let resources: Vec<Value> = catalog
        .resource_types()
        .into_iter()
        .map(|rt| build_resource_capability(catalog, rt))
        .collect();

    json!({
        "resourceType": "CapabilityStatement",
        "status": "active",
        "date": chrono::Utc::now().to_rfc3339(),
        "kind": "instance",
        "fhirVersion": version.full_version(),
        "format": ["json", "application/fhir+json"],
        "patchFormat": ["application/json-patch+json"],
        "implementation": {
            "description": format!("Helios Clinical Store ({})", state.storage().backend_name()),
            "url": state.base_url()
        },
        "rest": [{
            "mode": "server",
            "security": {
                "cors": state.config().enable_cors
            },
            "resource": resources,
            "interaction": [
                { "code": "transaction" },
                { "code": "batch" }
            ],
            "operation": [
                {
                    "name": "versions",
                    "definition": "http://hl7.org/fhir/OperationDefinition/CapabilityStatement-versions"
                },
                {
                    "name": "reindex",
                    "definition": format!("{}/OperationDefinition/reindex", state.base_url())
                }
            ]
        }]
    })
}

fn build_resource_capability(catalog: &ParamCatalog, resource_type: &str) -> Value {
    let search_params: Vec<Value> = catalog
        .params_for(resource_type)
        .map(|def| {
            json!({
                "name": def.code,
                "type": def.param_type.as_str(),
            })
        })
        .collect();

    let mut capability = json!({
        "type": resource_type,
        "interaction": [
            { "code": "read" },
            { "code": "vread" },
            { "code": "update" },
            { "code": "patch" },
            { "code": "delete" },
            { "code": "history-instance" },
            { "code": "create" },
            { "code": "search-type" }
        ],
        "versioning": "versioned",
        "readHistory": true,
        "updateCreate": true,
        "conditionalCreate": true,
        "searchInclude": ["*"],
        "searchRevInclude": ["*"],
        "searchParam": search_params
    });
    if catalog.compartment(resource_type).is_some() {
        capability["operation"] = json!([{
            "name": "everything",
            "definition": "http://hl7.org/fhir/OperationDefinition/Patient-everything"
        }]);
    }
    capability
}
