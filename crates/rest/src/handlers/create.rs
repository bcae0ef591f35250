//! Create interaction handler.
//!
//! Implements the FHIR [create interaction](https://hl7.org/fhir/http.html#create):
//! `POST [base]/[type]`

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use helios_store::core::{ConditionalCreateResult, ConditionalStorage, ResourceStorage};
use tracing::debug;

use crate::error::RestResult;
use crate::extractors::{AcceptVersion, FhirResource};
use crate::middleware::{ConditionalHeaders, PreferHeader};
use crate::responses::{ResourceHeaders, write_response};
use crate::state::AppState;

/// Handler for the create interaction.
///
/// # Headers
///
/// - `Content-Type` - JSON, optionally with `fhirVersion`
/// - `If-None-Exist` - conditional create search criteria
/// - `Prefer` - `return=minimal|representation|OperationOutcome`
///
/// # Response
///
/// - `201 Created` - resource created, `Location` points at version 1
/// - `200 OK` - conditional create matched one existing resource
/// - `400 Bad Request` - invalid resource or criteria
/// - `412 Precondition Failed` - conditional create matched several resources
pub async fn create_handler<S>(
    State(state): State<AppState<S>>,
    Path(resource_type): Path<String>,
    AcceptVersion(version): AcceptVersion,
    conditional: ConditionalHeaders,
    prefer: PreferHeader,
    body: FhirResource,
) -> RestResult<Response>
where
    S: ResourceStorage + ConditionalStorage + Send + Sync,
{
    debug!(
        resource_type = %resource_type,
        content_version = %body.version,
        conditional = ?conditional.if_none_exist(),
        "Processing create request"
    );

    let (status, stored) = match conditional.if_none_exist() {
        Some(criteria) => {
            match state
                .storage()
                .conditional_create(&resource_type, body.resource, criteria)
                .await?
            {
                ConditionalCreateResult::Created(stored) => (StatusCode::CREATED, stored),
                ConditionalCreateResult::Exists(stored) => {
                    debug!(id = %stored.id(), "Existing resource matched conditional create");
                    (StatusCode::OK, stored)
                }
            }
        }
        None => (
            StatusCode::CREATED,
            state.storage().create(&resource_type, body.resource).await?,
        ),
    };

    let mut headers = ResourceHeaders::from_stored(&stored, version);
    if status == StatusCode::CREATED {
        headers = headers.with_location_of(state.base_url(), &stored);
        debug!(resource_type = %resource_type, id = %stored.id(), "Resource created");
    }

    Ok(write_response(
        status,
        &stored,
        headers,
        prefer.return_preference(),
        version,
        if status == StatusCode::CREATED {
            "Created"
        } else {
            "Matched existing"
        },
    ))
}
