//! Stored resource types.
//!
//! [`StoredResource`] is one version of a resource document: the canonical
//! JSON body plus the persistence envelope (type, id, version, timestamp,
//! deletion marker).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One version of a resource document.
///
/// # Examples
///
/// ```
/// use helios_store::types::{ResourceMethod, StoredResource};
/// use serde_json::json;
///
/// let resource = StoredResource::new(
///     "Patient",
///     "123",
///     json!({"resourceType": "Patient", "id": "123"}),
/// );
///
/// assert_eq!(resource.url(), "Patient/123");
/// assert_eq!(resource.version_id(), 1);
/// assert_eq!(resource.etag(), "W/\"1\"");
/// assert_eq!(resource.method(), ResourceMethod::Post);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredResource {
    resource_type: String,
    id: String,
    version_id: u64,
    content: Value,
    last_updated: DateTime<Utc>,
    deleted: bool,
    method: ResourceMethod,
}

/// HTTP method that produced a resource version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResourceMethod {
    /// Resource was created via POST.
    Post,
    /// Resource was created/updated via PUT.
    Put,
    /// Resource was updated via PATCH.
    Patch,
    /// Resource was deleted via DELETE.
    Delete,
}

impl ResourceMethod {
    /// Returns the method as stored in the history table.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceMethod::Post => "POST",
            ResourceMethod::Put => "PUT",
            ResourceMethod::Patch => "PATCH",
            ResourceMethod::Delete => "DELETE",
        }
    }

    /// Parses a stored method, falling back to PUT for unknown values.
    pub fn parse(value: &str) -> Self {
        match value {
            "POST" => ResourceMethod::Post,
            "PATCH" => ResourceMethod::Patch,
            "DELETE" => ResourceMethod::Delete,
            _ => ResourceMethod::Put,
        }
    }
}

impl std::fmt::Display for ResourceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StoredResource {
    /// Creates the first version of a resource, stamped with the current time.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>, content: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version_id: 1,
            content,
            last_updated: Utc::now(),
            deleted: false,
            method: ResourceMethod::Post,
        }
    }

    /// Creates a stored resource from a database row.
    pub fn from_storage(
        resource_type: impl Into<String>,
        id: impl Into<String>,
        version_id: u64,
        content: Value,
        last_updated: DateTime<Utc>,
        deleted: bool,
        method: ResourceMethod,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            version_id,
            content,
            last_updated,
            deleted,
            method,
        }
    }

    /// Returns the FHIR resource type.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    /// Returns the resource's logical ID.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the version number.
    pub fn version_id(&self) -> u64 {
        self.version_id
    }

    /// Returns the resource content as JSON.
    pub fn content(&self) -> &Value {
        &self.content
    }

    /// Consumes self and returns the content.
    pub fn into_content(self) -> Value {
        self.content
    }

    /// Returns when this version was written.
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Returns `true` if this version is a deletion marker.
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Returns the HTTP method that created this version.
    pub fn method(&self) -> ResourceMethod {
        self.method
    }

    /// Returns the weak ETag for this version.
    pub fn etag(&self) -> String {
        format!("W/\"{}\"", self.version_id)
    }

    /// Returns the relative URL (e.g. `Patient/123`).
    pub fn url(&self) -> String {
        format!("{}/{}", self.resource_type, self.id)
    }

    /// Returns the versioned URL (e.g. `Patient/123/_history/1`).
    pub fn versioned_url(&self) -> String {
        format!(
            "{}/{}/_history/{}",
            self.resource_type, self.id, self.version_id
        )
    }

    /// Returns `lastUpdated` formatted the way it is stored and indexed.
    pub fn last_updated_string(&self) -> String {
        format_instant(self.last_updated)
    }

    /// Checks an `If-Match` value against this version.
    ///
    /// Accepts `W/"3"`, `"3"` and `3`.
    pub fn matches_etag(&self, etag: &str) -> bool {
        parse_etag(etag) == Some(self.version_id)
    }
}

/// Extracts the version number from an ETag or `If-Match` header value.
pub fn parse_etag(etag: &str) -> Option<u64> {
    etag.trim()
        .trim_start_matches("W/")
        .trim_matches('"')
        .parse()
        .ok()
}

/// Formats a timestamp the way `meta.lastUpdated` and the index store it.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_resource_starts_at_version_one() {
        let resource = StoredResource::new("Patient", "1", json!({"resourceType": "Patient"}));
        assert_eq!(resource.version_id(), 1);
        assert!(!resource.is_deleted());
        assert_eq!(resource.versioned_url(), "Patient/1/_history/1");
    }

    #[test]
    fn test_matches_etag_forms() {
        let resource = StoredResource::from_storage(
            "Patient",
            "1",
            3,
            json!({}),
            Utc::now(),
            false,
            ResourceMethod::Put,
        );
        assert!(resource.matches_etag("W/\"3\""));
        assert!(resource.matches_etag("\"3\""));
        assert!(resource.matches_etag("3"));
        assert!(!resource.matches_etag("W/\"2\""));
        assert!(!resource.matches_etag("garbage"));
    }

    #[test]
    fn test_method_round_trip() {
        for method in [
            ResourceMethod::Post,
            ResourceMethod::Put,
            ResourceMethod::Patch,
            ResourceMethod::Delete,
        ] {
            assert_eq!(ResourceMethod::parse(method.as_str()), method);
        }
    }

    #[test]
    fn test_format_instant_is_utc_with_z() {
        let instant = DateTime::parse_from_rfc3339("2024-03-01T10:00:00+02:00")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(format_instant(instant), "2024-03-01T08:00:00.000000Z");
    }
}
