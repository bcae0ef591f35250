//! Conditional request headers.
//!
//! - `If-Match` guards updates, patches and deletes against lost updates
//! - `If-None-Match` / `If-Modified-Since` turn a read into a 304
//! - `If-None-Exist` makes a create conditional on a search

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use chrono::{DateTime, Utc};
use helios_store::types::{StoredResource, parse_etag};

/// Conditional headers of a request.
#[derive(Debug, Default)]
pub struct ConditionalHeaders {
    if_match: Option<String>,
    if_none_match: Option<String>,
    if_modified_since: Option<DateTime<Utc>>,
    if_none_exist: Option<String>,
}

impl ConditionalHeaders {
    /// Reads the conditional headers from a header map.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .map(String::from)
        };

        let if_modified_since = headers
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Self {
            if_match: text(header::IF_MATCH.as_str()),
            if_none_match: text(header::IF_NONE_MATCH.as_str()),
            if_modified_since,
            // FHIR-specific, no constant in `http`
            if_none_exist: text("if-none-exist"),
        }
    }

    /// The `If-Match` value, e.g. `W/"3"`.
    pub fn if_match(&self) -> Option<&str> {
        self.if_match.as_deref()
    }

    /// The `If-None-Match` value.
    pub fn if_none_match(&self) -> Option<&str> {
        self.if_none_match.as_deref()
    }

    /// The parsed `If-Modified-Since` value.
    pub fn if_modified_since(&self) -> Option<DateTime<Utc>> {
        self.if_modified_since
    }

    /// The `If-None-Exist` search criteria.
    pub fn if_none_exist(&self) -> Option<&str> {
        self.if_none_exist.as_deref()
    }

    /// Returns `true` when a read of `stored` can be answered with 304.
    ///
    /// `If-None-Match` wins over `If-Modified-Since` when both are sent.
    pub fn is_not_modified(&self, stored: &StoredResource) -> bool {
        if let Some(etag) = self.if_none_match() {
            return etag == "*"
                || etag
                    .split(',')
                    .any(|tag| parse_etag(tag) == Some(stored.version_id()));
        }
        match self.if_modified_since {
            // HTTP dates have second precision
            Some(since) => stored.last_updated().timestamp() <= since.timestamp(),
            None => false,
        }
    }
}

impl<S> FromRequestParts<S> for ConditionalHeaders
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ConditionalHeaders::from_headers(&parts.headers))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};
    use serde_json::json;

    fn stored_v2() -> StoredResource {
        StoredResource::from_storage(
            "Patient",
            "1",
            2,
            json!({"resourceType": "Patient", "id": "1"}),
            DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            false,
            helios_store::types::ResourceMethod::Put,
        )
    }

    #[test]
    fn test_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_MATCH, HeaderValue::from_static("W/\"1\""));
        headers.insert(
            HeaderName::from_static("if-none-exist"),
            HeaderValue::from_static("identifier=12345"),
        );
        let conditional = ConditionalHeaders::from_headers(&headers);
        assert_eq!(conditional.if_match(), Some("W/\"1\""));
        assert_eq!(conditional.if_none_exist(), Some("identifier=12345"));
        assert!(conditional.if_none_match().is_none());
    }

    #[test]
    fn test_if_none_match_against_version() {
        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("W/\"2\""));
        assert!(ConditionalHeaders::from_headers(&headers).is_not_modified(&stored_v2()));

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("W/\"1\""));
        assert!(!ConditionalHeaders::from_headers(&headers).is_not_modified(&stored_v2()));
    }

    #[test]
    fn test_if_modified_since() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Fri, 01 Mar 2024 10:00:00 GMT"),
        );
        assert!(ConditionalHeaders::from_headers(&headers).is_not_modified(&stored_v2()));

        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Thu, 29 Feb 2024 10:00:00 GMT"),
        );
        assert!(!ConditionalHeaders::from_headers(&headers).is_not_modified(&stored_v2()));
    }
}
