//! Update interaction handler.
//!
//! Implements the FHIR [update interaction](https://hl7.org/fhir/http.html#update):
//! `PUT [base]/[type]/[id]`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use helios_store::core::ResourceStorage;
use tracing::debug;

use crate::error::RestResult;
use crate::extractors::{AcceptVersion, FhirResource};
use crate::middleware::{ConditionalHeaders, PreferHeader};
use crate::responses::{ResourceHeaders, write_response};
use crate::state::AppState;

/// Handler for the update interaction.
///
/// Creates the resource with the client id when it does not exist
/// (update-as-create). A deleted resource comes back as a new version.
///
/// # Response
///
/// - `200 OK` - updated
/// - `201 Created` - created with the client id
/// - `400 Bad Request` - invalid body or id mismatch
/// - `409 Conflict` - `If-Match` names a version that is not current
pub async fn update_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id)): Path<(String, String)>,
    AcceptVersion(version): AcceptVersion,
    conditional: ConditionalHeaders,
    prefer: PreferHeader,
    body: FhirResource,
) -> RestResult<Response>
where
    S: ResourceStorage + Send + Sync,
{
    debug!(
        resource_type = %resource_type,
        id = %id,
        if_match = ?conditional.if_match(),
        "Processing update request"
    );

    let (stored, created) = state
        .storage()
        .create_or_update(&resource_type, &id, body.resource, conditional.if_match())
        .await?;

    let mut headers = ResourceHeaders::from_stored(&stored, version);
    let status = if created {
        headers = headers.with_location_of(state.base_url(), &stored);
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    debug!(
        resource_type = %resource_type,
        id = %id,
        version = stored.version_id(),
        created,
        "Resource stored"
    );

    Ok(write_response(
        status,
        &stored,
        headers,
        prefer.return_preference(),
        version,
        if created { "Created" } else { "Updated" },
    ))
}
