//! Version read handler.
//!
//! Implements the FHIR [vread interaction](https://hl7.org/fhir/http.html#vread):
//! `GET [base]/[type]/[id]/_history/[vid]`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use helios_store::core::VersionedStorage;
use helios_store::error::{ResourceError, StorageError};
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::AcceptVersion;
use crate::responses::{ResourceHeaders, fhir_json};
use crate::state::AppState;

/// Handler for the vread interaction.
///
/// # Response
///
/// - `200 OK` - the requested version
/// - `404 Not Found` - no such resource or version
/// - `410 Gone` - the requested version is a deletion marker
pub async fn vread_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id, version_id)): Path<(String, String, String)>,
    AcceptVersion(version): AcceptVersion,
) -> RestResult<Response>
where
    S: VersionedStorage + Send + Sync,
{
    debug!(
        resource_type = %resource_type,
        id = %id,
        version_id = %version_id,
        "Processing vread request"
    );

    let not_found = || {
        RestError::from(StorageError::from(ResourceError::VersionNotFound {
            resource_type: resource_type.clone(),
            id: id.clone(),
            version_id: version_id.clone(),
        }))
    };
    let number: u64 = version_id.parse().map_err(|_| not_found())?;

    let stored = state.storage().vread(&resource_type, &id, number).await?;
    if stored.is_deleted() {
        return Err(StorageError::from(ResourceError::Gone {
            resource_type,
            id,
            deleted_at: Some(stored.last_updated()),
        })
        .into());
    }

    let headers = ResourceHeaders::from_stored(&stored, version).to_header_map();
    Ok(fhir_json(StatusCode::OK, headers, stored.into_content(), version))
}
