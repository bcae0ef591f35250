//! Content negotiation.
//!
//! Only JSON is served. The `fhirVersion` media-type parameter selects the
//! document version; a version this server does not know is rejected with
//! 406 on `Accept` and 415 on `Content-Type`.

use axum::http::{HeaderMap, header};

use crate::error::{RestError, RestResult};
use crate::version::FhirVersion;

/// The JSON FHIR media type.
pub const FHIR_JSON: &str = "application/fhir+json";

/// A parsed media type with its `fhirVersion` parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    /// `type/subtype`, lowercased.
    pub essence: String,
    /// Raw `fhirVersion` parameter, if present.
    pub fhir_version: Option<String>,
}

impl MediaType {
    /// Parses `application/fhir+json; fhirVersion=4.0`.
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split(';').map(str::trim);
        let essence = parts.next().unwrap_or_default().to_ascii_lowercase();
        let fhir_version = parts.find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("fhirVersion")
                .then(|| value.trim().trim_matches('"').to_string())
        });
        Self {
            essence,
            fhir_version,
        }
    }

    /// Returns `true` for JSON media types and wildcards.
    pub fn is_json_compatible(&self) -> bool {
        matches!(
            self.essence.as_str(),
            "application/fhir+json" | "application/json" | "application/*" | "*/*" | "json"
        )
    }

    /// Resolves the version, falling back to `default` when none is named.
    ///
    /// Returns `Err` with the raw value when the version is unsupported.
    pub fn version_or(&self, default: FhirVersion) -> Result<FhirVersion, String> {
        match &self.fhir_version {
            None => Ok(default),
            Some(raw) => FhirVersion::from_mime_param(raw).ok_or_else(|| raw.clone()),
        }
    }
}

/// Picks the response version from the `Accept` header.
///
/// The first JSON-compatible media range with a supported (or no)
/// `fhirVersion` wins. A missing header yields `default`.
pub fn negotiate_accept_version(headers: &HeaderMap, default: FhirVersion) -> RestResult<FhirVersion> {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return Ok(default);
    };

    let mut rejected = Vec::new();
    for media_type in accept.split(',').map(MediaType::parse) {
        if !media_type.is_json_compatible() {
            continue;
        }
        match media_type.version_or(default) {
            Ok(version) => return Ok(version),
            Err(raw) => rejected.push(raw),
        }
    }

    if accept.trim().is_empty() {
        return Ok(default);
    }
    Err(RestError::NotAcceptable {
        message: if rejected.is_empty() {
            format!("no supported media type in Accept '{}'", accept)
        } else {
            format!("unsupported fhirVersion {}", rejected.join(", "))
        },
    })
}

/// Determines the version of a request body from `Content-Type`.
pub fn request_content_version(headers: &HeaderMap, default: FhirVersion) -> RestResult<FhirVersion> {
    let Some(content_type) = headers.get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return Ok(default);
    };
    let media_type = MediaType::parse(content_type);
    if !matches!(
        media_type.essence.as_str(),
        "application/fhir+json" | "application/json" | "application/json-patch+json"
    ) {
        return Err(RestError::UnsupportedMediaType {
            content_type: content_type.to_string(),
        });
    }
    media_type
        .version_or(default)
        .map_err(|_| RestError::UnsupportedMediaType {
            content_type: content_type.to_string(),
        })
}

/// The `Content-Type` header value for a response in `version`.
pub fn content_type_header(version: FhirVersion) -> String {
    format!("{}; fhirVersion={}", FHIR_JSON, version.as_mime_param())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn headers(name: header::HeaderName, value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(name, value.parse().unwrap());
        headers
    }

    #[test]
    fn test_parse_media_type() {
        let mt = MediaType::parse("application/fhir+json; fhirVersion=4.0");
        assert_eq!(mt.essence, "application/fhir+json");
        assert_eq!(mt.fhir_version.as_deref(), Some("4.0"));

        let plain = MediaType::parse("Application/JSON");
        assert_eq!(plain.essence, "application/json");
        assert!(plain.fhir_version.is_none());
    }

    #[test]
    fn test_accept_defaults() {
        assert_eq!(
            negotiate_accept_version(&HeaderMap::new(), FhirVersion::R4).unwrap(),
            FhirVersion::R4
        );
        let h = headers(header::ACCEPT, "text/html, */*;q=0.8");
        assert_eq!(
            negotiate_accept_version(&h, FhirVersion::R4B).unwrap(),
            FhirVersion::R4B
        );
    }

    #[test]
    fn test_accept_selects_version() {
        let h = headers(header::ACCEPT, "application/fhir+json; fhirVersion=5.0");
        assert_eq!(
            negotiate_accept_version(&h, FhirVersion::R4).unwrap(),
            FhirVersion::R5
        );
    }

    #[test]
    fn test_accept_unsupported_version_is_406() {
        let h = headers(header::ACCEPT, "application/fhir+json; fhirVersion=3.0");
        let err = negotiate_accept_version(&h, FhirVersion::R4).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_ACCEPTABLE);

        let xml = headers(header::ACCEPT, "application/fhir+xml");
        let err = negotiate_accept_version(&xml, FhirVersion::R4).unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_ACCEPTABLE);
    }

    #[test]
    fn test_content_type_version() {
        let h = headers(header::CONTENT_TYPE, "application/fhir+json; fhirVersion=4.3");
        assert_eq!(
            request_content_version(&h, FhirVersion::R4).unwrap(),
            FhirVersion::R4B
        );

        let bad = headers(header::CONTENT_TYPE, "application/fhir+json; fhirVersion=1.0");
        let err = request_content_version(&bad, FhirVersion::R4).unwrap_err();
        assert_eq!(err.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let text = headers(header::CONTENT_TYPE, "text/plain");
        assert!(request_content_version(&text, FhirVersion::R4).is_err());
    }

    #[test]
    fn test_content_type_header() {
        assert_eq!(
            content_type_header(FhirVersion::R5),
            "application/fhir+json; fhirVersion=5.0"
        );
    }
}
