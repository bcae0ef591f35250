//! Patch interaction handler.
//!
//! Implements the FHIR [patch interaction](https://hl7.org/fhir/http.html#patch)
//! with JSON Patch (RFC 6902) documents: `PATCH [base]/[type]/[id]`
//!
//! Patches apply to the stored (R4) form regardless of `fhirVersion`.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode, header},
    response::Response,
};
use helios_store::core::ResourceStorage;
use helios_store::error::{StorageError, ValidationError};
use serde_json::Value;
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::AcceptVersion;
use crate::middleware::content_type::MediaType;
use crate::middleware::{ConditionalHeaders, PreferHeader};
use crate::responses::{ResourceHeaders, write_response};
use crate::state::AppState;

/// Handler for the patch interaction.
///
/// # Headers
///
/// - `Content-Type` - `application/json-patch+json` (or `application/json`)
/// - `If-Match` - optimistic locking
///
/// # Response
///
/// - `200 OK` - patched
/// - `400 Bad Request` - not a JSON Patch document
/// - `409 Conflict` - `If-Match` mismatch
/// - `415 Unsupported Media Type` - other patch formats
/// - `422 Unprocessable Entity` - the patch does not apply to the resource
pub async fn patch_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id)): Path<(String, String)>,
    AcceptVersion(version): AcceptVersion,
    conditional: ConditionalHeaders,
    prefer: PreferHeader,
    headers: HeaderMap,
    body: Bytes,
) -> RestResult<Response>
where
    S: ResourceStorage + Send + Sync,
{
    debug!(
        resource_type = %resource_type,
        id = %id,
        if_match = ?conditional.if_match(),
        "Processing patch request"
    );

    let patch = parse_json_patch(&headers, &body)?;

    let stored = state
        .storage()
        .patch(&resource_type, &id, &patch, conditional.if_match())
        .await
        .map_err(|e| match e {
            // The document was well-formed, so a failure here is about this resource.
            StorageError::Validation(ValidationError::InvalidResource { message, .. }) => {
                RestError::UnprocessableEntity { message }
            }
            other => other.into(),
        })?;

    debug!(
        resource_type = %resource_type,
        id = %id,
        version = stored.version_id(),
        "Resource patched"
    );

    Ok(write_response(
        StatusCode::OK,
        &stored,
        ResourceHeaders::from_stored(&stored, version),
        prefer.return_preference(),
        version,
        "Patched",
    ))
}

/// Checks the media type and that the body is a JSON Patch document.
fn parse_json_patch(headers: &HeaderMap, body: &[u8]) -> RestResult<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json-patch+json");
    let media_type = MediaType::parse(content_type);
    if !matches!(
        media_type.essence.as_str(),
        "application/json-patch+json" | "application/json"
    ) {
        return Err(RestError::UnsupportedMediaType {
            content_type: content_type.to_string(),
        });
    }

    let value: Value = serde_json::from_slice(body).map_err(|e| RestError::BadRequest {
        message: format!("Invalid JSON: {}", e),
    })?;
    serde_json::from_value::<json_patch::Patch>(value.clone()).map_err(|e| {
        RestError::BadRequest {
            message: format!("Invalid JSON Patch document: {}", e),
        }
    })?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_patch_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            "application/json-patch+json".parse().unwrap(),
        );
        headers
    }

    #[test]
    fn test_parse_json_patch() {
        let body = br#"[{"op": "replace", "path": "/gender", "value": "male"}]"#;
        let patch = parse_json_patch(&json_patch_headers(), body).unwrap();
        assert_eq!(patch[0]["op"], "replace");
    }

    #[test]
    fn test_rejects_non_patch_documents() {
        let err = parse_json_patch(&json_patch_headers(), br#"{"op": "replace"}"#).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let mut merge = HeaderMap::new();
        merge.insert(
            header::CONTENT_TYPE,
            "application/merge-patch+json".parse().unwrap(),
        );
        let err = parse_json_patch(&merge, b"{}").unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
