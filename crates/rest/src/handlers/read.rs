//! Read interaction handler.
//!
//! Implements the FHIR [read interaction](https://hl7.org/fhir/http.html#read):
//! `GET [base]/[type]/[id]`

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use helios_store::core::ResourceStorage;
use helios_store::error::{ResourceError, StorageError};
use helios_store::types::SummaryMode;
use std::collections::HashMap;
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::AcceptVersion;
use crate::middleware::ConditionalHeaders;
use crate::responses::{ResourceHeaders, fhir_json};
use crate::state::AppState;

/// Handler for the read interaction.
///
/// `_summary` and `_elements` are honored as on search.
///
/// # Response
///
/// - `200 OK` - the current version
/// - `304 Not Modified` - `If-None-Match` / `If-Modified-Since` matched
/// - `404 Not Found` - the resource never existed
/// - `410 Gone` - the resource was deleted
pub async fn read_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id)): Path<(String, String)>,
    AcceptVersion(version): AcceptVersion,
    conditional: ConditionalHeaders,
    Query(params): Query<HashMap<String, String>>,
) -> RestResult<Response>
where
    S: ResourceStorage + Send + Sync,
{
    debug!(
        resource_type = %resource_type,
        id = %id,
        fhir_version = %version,
        "Processing read request"
    );

    let stored = state
        .storage()
        .read(&resource_type, &id)
        .await?
        .ok_or_else(|| {
            RestError::from(StorageError::from(ResourceError::NotFound {
                resource_type: resource_type.clone(),
                id: id.clone(),
            }))
        })?;

    if conditional.is_not_modified(&stored) {
        debug!(etag = %stored.etag(), "Returning 304 Not Modified");
        return Ok(StatusCode::NOT_MODIFIED.into_response());
    }

    let summary: Option<SummaryMode> = params
        .get("_summary")
        .map(|raw| raw.parse())
        .transpose()
        .map_err(|message| RestError::BadRequest { message })?;
    let elements: Vec<String> = params
        .get("_elements")
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(String::from)
                .collect()
        })
        .unwrap_or_default();

    let body = state.projector().apply(stored.content(), summary, &elements);
    let headers = ResourceHeaders::from_stored(&stored, version).to_header_map();
    Ok(fhir_json(StatusCode::OK, headers, body, version))
}
