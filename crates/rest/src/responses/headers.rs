//! Response headers for single-resource responses.

use axum::http::{HeaderMap, HeaderValue, header};
use helios_store::types::StoredResource;

use crate::middleware::content_type::content_type_header;
use crate::version::FhirVersion;

/// Builder for `ETag`, `Last-Modified`, `Location` and `Content-Type`.
#[derive(Debug, Default)]
pub struct ResourceHeaders {
    etag: Option<String>,
    last_modified: Option<String>,
    location: Option<String>,
    content_type: String,
}

impl ResourceHeaders {
    /// Creates headers carrying only the `Content-Type` for `version`.
    pub fn new(version: FhirVersion) -> Self {
        Self {
            content_type: content_type_header(version),
            ..Default::default()
        }
    }

    /// Creates the headers describing one stored version.
    pub fn from_stored(stored: &StoredResource, version: FhirVersion) -> Self {
        Self {
            etag: Some(stored.etag()),
            last_modified: Some(
                stored
                    .last_updated()
                    .format("%a, %d %b %Y %H:%M:%S GMT")
                    .to_string(),
            ),
            ..Self::new(version)
        }
    }

    /// Sets `Location` to the versioned URL of `stored` under `base_url`.
    pub fn with_location_of(mut self, base_url: &str, stored: &StoredResource) -> Self {
        self.location = Some(format!("{}/{}", base_url, stored.versioned_url()));
        self
    }

    /// Returns the ETag value.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// Returns the Location value.
    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    /// Converts to a header map, skipping values that are not valid header text.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let mut put = |name: header::HeaderName, value: Option<&str>| {
            if let Some(value) = value.and_then(|v| HeaderValue::from_str(v).ok()) {
                headers.insert(name, value);
            }
        };
        put(header::CONTENT_TYPE, Some(&self.content_type));
        put(header::ETAG, self.etag.as_deref());
        put(header::LAST_MODIFIED, self.last_modified.as_deref());
        put(header::LOCATION, self.location.as_deref());
        headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use helios_store::types::ResourceMethod;
    use serde_json::json;

    fn stored() -> StoredResource {
        StoredResource::from_storage(
            "Patient",
            "123",
            3,
            json!({"resourceType": "Patient", "id": "123"}),
            DateTime::parse_from_rfc3339("2024-03-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            false,
            ResourceMethod::Put,
        )
    }

    #[test]
    fn test_from_stored() {
        let headers = ResourceHeaders::from_stored(&stored(), FhirVersion::R4)
            .with_location_of("http://example.com", &stored());
        assert_eq!(headers.etag(), Some("W/\"3\""));
        assert_eq!(
            headers.location(),
            Some("http://example.com/Patient/123/_history/3")
        );

        let map = headers.to_header_map();
        assert_eq!(map[header::LAST_MODIFIED], "Fri, 01 Mar 2024 10:00:00 GMT");
        assert_eq!(
            map[header::CONTENT_TYPE],
            "application/fhir+json; fhirVersion=4.0"
        );
    }

    #[test]
    fn test_new_has_only_content_type() {
        let map = ResourceHeaders::new(FhirVersion::R5).to_header_map();
        assert_eq!(map.len(), 1);
        assert!(map.contains_key(header::CONTENT_TYPE));
    }
}
