//! Delete interaction handler.
//!
//! Implements the FHIR [delete interaction](https://hl7.org/fhir/http.html#delete):
//! `DELETE [base]/[type]/[id]`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use helios_store::core::ResourceStorage;
use tracing::debug;

use crate::error::RestResult;
use crate::state::AppState;

/// Handler for the delete interaction.
///
/// Writes a deletion marker version. Deleting an already deleted resource
/// succeeds again without a new version.
///
/// # Response
///
/// - `204 No Content` - deleted
/// - `404 Not Found` - the resource never existed
pub async fn delete_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id)): Path<(String, String)>,
) -> RestResult<Response>
where
    S: ResourceStorage + Send + Sync,
{
    debug!(
        resource_type = %resource_type,
        id = %id,
        "Processing delete request"
    );

    state.storage().delete(&resource_type, &id).await?;

    debug!(resource_type = %resource_type, id = %id, "Resource deleted");
    Ok(StatusCode::NO_CONTENT.into_response())
}
