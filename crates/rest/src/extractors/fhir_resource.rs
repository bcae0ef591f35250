//! Request body extractor for resources.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde_json::Value;

use crate::error::RestError;
use crate::middleware::content_type::request_content_version;
use crate::state::AppState;
use crate::version::{self, FhirVersion};

/// A JSON resource body, already converted to the stored form.
///
/// The `Content-Type` must be JSON; its `fhirVersion` parameter (or the
/// server default) names the version the body is written in.
///
/// Rejects with 415 for other media types or unknown versions and with
/// 400 for bodies that are not a JSON object carrying `resourceType`.
#[derive(Debug)]
pub struct FhirResource {
    /// The body in stored (R4) form.
    pub resource: Value,
    /// The version the client sent.
    pub version: FhirVersion,
}

impl FhirResource {
    /// Returns the body's `resourceType`.
    pub fn resource_type(&self) -> Option<&str> {
        self.resource.get("resourceType").and_then(Value::as_str)
    }

    /// Consumes the extractor and returns the body.
    pub fn into_inner(self) -> Value {
        self.resource
    }
}

/// Parses a JSON body that must be an object with a `resourceType`.
pub(crate) fn parse_resource_body(bytes: &[u8]) -> Result<Value, RestError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|e| RestError::BadRequest {
        message: format!("Invalid JSON: {}", e),
    })?;
    match value.get("resourceType").and_then(Value::as_str) {
        Some(rt) if !rt.is_empty() => Ok(value),
        _ => Err(RestError::BadRequest {
            message: "Resource must contain resourceType".to_string(),
        }),
    }
}

impl<S> FromRequest<AppState<S>> for FhirResource
where
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request(req: Request, state: &AppState<S>) -> Result<Self, Self::Rejection> {
        let version = request_content_version(req.headers(), state.default_fhir_version())?;

        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| RestError::BadRequest {
                message: format!("Unreadable body: {}", e),
            })?;

        let resource = parse_resource_body(&bytes)?;
        Ok(FhirResource {
            resource: version::to_canonical(resource, version),
            version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_resource_body() {
        let value = parse_resource_body(br#"{"resourceType":"Patient"}"#).unwrap();
        assert_eq!(value["resourceType"], "Patient");

        assert!(parse_resource_body(b"not json").is_err());
        assert!(parse_resource_body(br#"{"id":"1"}"#).is_err());
        assert!(parse_resource_body(b"[]").is_err());
    }
}
