//! `Prefer` header handling.
//!
//! See: https://hl7.org/fhir/http.html#ops

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

/// What a write should return in its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnPreference {
    /// The stored resource.
    #[default]
    Representation,
    /// No body, headers only.
    Minimal,
    /// An OperationOutcome describing the result.
    OperationOutcome,
}

/// Parsed `Prefer` header.
#[derive(Debug, Default)]
pub struct PreferHeader {
    return_preference: ReturnPreference,
}

impl PreferHeader {
    /// Reads the `Prefer` header. Unknown directives are ignored.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let prefer = headers
            .get("prefer")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        let mut result = Self::default();
        for directive in prefer.split(',').map(str::trim) {
            if let Some(value) = directive.strip_prefix("return=") {
                result.return_preference = match value.trim_matches('"') {
                    "minimal" => ReturnPreference::Minimal,
                    "OperationOutcome" => ReturnPreference::OperationOutcome,
                    _ => ReturnPreference::Representation,
                };
            }
        }
        result
    }

    /// The requested return preference.
    pub fn return_preference(&self) -> ReturnPreference {
        self.return_preference
    }
}

impl<S> FromRequestParts<S> for PreferHeader
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PreferHeader::from_headers(&parts.headers))
    }
}
