//! Batch and transaction processing handler.
//!
//! Implements the FHIR [batch/transaction interaction](https://hl7.org/fhir/http.html#transaction):
//! `POST [base]` with a Bundle of type "batch" or "transaction"

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Response,
};
use helios_store::core::{BundleProvider, parse_bundle};
use helios_store::error::StorageError;
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::{AcceptVersion, FhirResource};
use crate::responses::fhir_json;
use crate::state::AppState;

/// Handler for batch/transaction processing.
///
/// # Batch vs Transaction
///
/// - **Batch**: each entry is processed independently and reports its own
///   status in the `batch-response`.
/// - **Transaction**: all entries are one unit of work. Any failure rolls
///   back every write and the response is an `OperationOutcome` listing
///   each failed entry.
///
/// # Response
///
/// - `200 OK` - a `batch-response` or `transaction-response` bundle
/// - `400 Bad Request` - malformed bundle or aborted transaction
pub async fn batch_handler<S>(
    State(state): State<AppState<S>>,
    AcceptVersion(version): AcceptVersion,
    body: FhirResource,
) -> RestResult<Response>
where
    S: BundleProvider + Send + Sync,
{
    if body.resource_type() != Some("Bundle") {
        return Err(RestError::BadRequest {
            message: format!(
                "Expected Bundle, got {}",
                body.resource_type().unwrap_or("nothing")
            ),
        });
    }

    let (bundle_type, entries) =
        parse_bundle(&body.resource).map_err(|e| RestError::from(StorageError::from(e)))?;

    debug!(
        bundle_type = ?bundle_type,
        entries = entries.len(),
        "Processing bundle"
    );

    let result = state.storage().process_bundle(bundle_type, entries).await?;

    debug!(
        bundle_type = ?bundle_type,
        succeeded = result.entries.iter().filter(|e| e.is_success()).count(),
        failed = result.entries.iter().filter(|e| !e.is_success()).count(),
        "Bundle processed"
    );

    Ok(fhir_json(
        StatusCode::OK,
        HeaderMap::new(),
        result.to_json(),
        version,
    ))
}
