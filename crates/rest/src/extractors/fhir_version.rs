//! Response version extractor.

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::error::RestError;
use crate::middleware::content_type::negotiate_accept_version;
use crate::state::AppState;
use crate::version::FhirVersion;

/// The FHIR version the client accepts, from the `Accept` header's
/// `fhirVersion` parameter or the server default.
///
/// Rejects with 406 when the client only accepts unsupported versions.
///
/// ```rust,ignore
/// async fn handler(AcceptVersion(version): AcceptVersion) {
///     let body = version::from_canonical(stored, version);
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceptVersion(pub FhirVersion);

impl<S> FromRequestParts<AppState<S>> for AcceptVersion
where
    S: Send + Sync,
{
    type Rejection = RestError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState<S>,
    ) -> Result<Self, Self::Rejection> {
        negotiate_accept_version(&parts.headers, state.default_fhir_version()).map(AcceptVersion)
    }
}
