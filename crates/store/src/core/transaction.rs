//! Transaction and batch bundles.
//!
//! A bundle is a list of [`BundleEntry`] operations. In a `transaction` the
//! entries form one unit of work; in a `batch` each entry succeeds or fails
//! on its own and reports its own status.

use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{StorageResult, TransactionError};
use crate::types::{format_instant, StoredResource};

use super::storage::ResourceStorage;

/// One operation inside a transaction or batch bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleEntry {
    /// HTTP method.
    pub method: BundleMethod,
    /// Relative URL (`Patient`, `Patient/1`, `Patient?name=x`).
    pub url: String,
    /// The entry's `fullUrl`, used as the placeholder for created resources.
    pub full_url: Option<String>,
    /// Request body (resource or JSON Patch).
    pub resource: Option<Value>,
    /// `If-Match` precondition.
    pub if_match: Option<String>,
    /// Conditional create query.
    pub if_none_exist: Option<String>,
}

/// HTTP method of a bundle entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BundleMethod {
    /// Read or search.
    Get,
    /// Create.
    Post,
    /// Update or create with a client id.
    Put,
    /// JSON Patch.
    Patch,
    /// Delete.
    Delete,
}

impl BundleMethod {
    /// Execution order inside a transaction: deletes, creates, updates, reads.
    pub fn transaction_order(&self) -> u8 {
        match self {
            BundleMethod::Delete => 0,
            BundleMethod::Post => 1,
            BundleMethod::Put | BundleMethod::Patch => 2,
            BundleMethod::Get => 3,
        }
    }
}

impl std::fmt::Display for BundleMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BundleMethod::Get => write!(f, "GET"),
            BundleMethod::Post => write!(f, "POST"),
            BundleMethod::Put => write!(f, "PUT"),
            BundleMethod::Patch => write!(f, "PATCH"),
            BundleMethod::Delete => write!(f, "DELETE"),
        }
    }
}

impl FromStr for BundleMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(BundleMethod::Get),
            "POST" => Ok(BundleMethod::Post),
            "PUT" => Ok(BundleMethod::Put),
            "PATCH" => Ok(BundleMethod::Patch),
            "DELETE" => Ok(BundleMethod::Delete),
            other => Err(format!("unsupported method: {other}")),
        }
    }
}

/// Kind of bundle being processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleType {
    /// All entries succeed or none are written.
    Transaction,
    /// Entries are independent.
    Batch,
}

impl BundleType {
    /// Returns the type of the response bundle.
    pub fn response_type(&self) -> &'static str {
        match self {
            BundleType::Transaction => "transaction-response",
            BundleType::Batch => "batch-response",
        }
    }
}

impl FromStr for BundleType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transaction" => Ok(BundleType::Transaction),
            "batch" => Ok(BundleType::Batch),
            other => Err(format!("bundle type must be transaction or batch, got '{other}'")),
        }
    }
}

/// Outcome of one entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleEntryResult {
    /// HTTP status code.
    pub status: u16,
    /// Location of a created or updated resource.
    pub location: Option<String>,
    /// ETag of the resulting version.
    pub etag: Option<String>,
    /// `lastModified` of the resulting version.
    pub last_modified: Option<String>,
    /// Resulting resource (or search bundle for a GET search).
    pub resource: Option<Value>,
    /// OperationOutcome for failures.
    pub outcome: Option<Value>,
}

impl BundleEntryResult {
    /// 201 Created.
    pub fn created(resource: StoredResource) -> Self {
        Self::with_resource(201, resource, true)
    }

    /// 200 OK.
    pub fn ok(resource: StoredResource) -> Self {
        Self::with_resource(200, resource, false)
    }

    /// 200 OK for an updated resource (carries its location).
    pub fn updated(resource: StoredResource) -> Self {
        Self::with_resource(200, resource, true)
    }

    fn with_resource(status: u16, resource: StoredResource, location: bool) -> Self {
        Self {
            status,
            location: location.then(|| resource.versioned_url()),
            etag: Some(resource.etag()),
            last_modified: Some(format_instant(resource.last_updated())),
            resource: Some(resource.into_content()),
            outcome: None,
        }
    }

    /// 200 OK with a non-resource body (search results).
    pub fn ok_body(body: Value) -> Self {
        Self {
            status: 200,
            location: None,
            etag: None,
            last_modified: None,
            resource: Some(body),
            outcome: None,
        }
    }

    /// 204 No Content.
    pub fn deleted() -> Self {
        Self {
            status: 204,
            location: None,
            etag: None,
            last_modified: None,
            resource: None,
            outcome: None,
        }
    }

    /// A failed entry.
    pub fn error(status: u16, outcome: Value) -> Self {
        Self {
            status,
            location: None,
            etag: None,
            last_modified: None,
            resource: None,
            outcome: Some(outcome),
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Renders the response entry.
    pub fn to_json(&self) -> Value {
        let mut response = json!({"status": status_line(self.status)});
        if let Some(location) = &self.location {
            response["location"] = json!(location);
        }
        if let Some(etag) = &self.etag {
            response["etag"] = json!(etag);
        }
        if let Some(last_modified) = &self.last_modified {
            response["lastModified"] = json!(last_modified);
        }
        if let Some(outcome) = &self.outcome {
            response["outcome"] = outcome.clone();
        }
        let mut entry = json!({"response": response});
        if let Some(resource) = &self.resource {
            entry["resource"] = resource.clone();
        }
        entry
    }
}

fn status_line(status: u16) -> String {
    let reason = match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        409 => "Conflict",
        410 => "Gone",
        412 => "Precondition Failed",
        422 => "Unprocessable Entity",
        _ => "",
    };
    format!("{status} {reason}").trim_end().to_string()
}

/// The processed bundle.
#[derive(Debug, Clone)]
pub struct BundleResult {
    /// Transaction or batch.
    pub bundle_type: BundleType,
    /// One result per request entry, in request order.
    pub entries: Vec<BundleEntryResult>,
}

impl BundleResult {
    /// Renders the response bundle.
    pub fn to_json(&self) -> Value {
        json!({
            "resourceType": "Bundle",
            "type": self.bundle_type.response_type(),
            "entry": self.entries.iter().map(BundleEntryResult::to_json).collect::<Vec<_>>(),
        })
    }
}

/// Parses a transaction or batch bundle.
pub fn parse_bundle(bundle: &Value) -> Result<(BundleType, Vec<BundleEntry>), TransactionError> {
    let invalid = |message: String| TransactionError::InvalidBundle { message };

    if bundle.get("resourceType").and_then(Value::as_str) != Some("Bundle") {
        return Err(invalid("resourceType must be Bundle".to_string()));
    }
    let bundle_type = bundle
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing bundle type".to_string()))?
        .parse::<BundleType>()
        .map_err(invalid)?;

    let entries = match bundle.get("entry") {
        None => Vec::new(),
        Some(Value::Array(entries)) => entries
            .iter()
            .enumerate()
            .map(|(index, entry)| parse_entry(index, entry))
            .collect::<Result<_, _>>()?,
        Some(_) => return Err(invalid("entry must be an array".to_string())),
    };

    Ok((bundle_type, entries))
}

fn parse_entry(index: usize, entry: &Value) -> Result<BundleEntry, TransactionError> {
    let invalid = |message: &str| TransactionError::InvalidBundle {
        message: format!("entry {index}: {message}"),
    };

    let request = entry
        .get("request")
        .ok_or_else(|| invalid("missing request"))?;
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .ok_or_else(|| invalid("missing request.method"))?
        .parse::<BundleMethod>()
        .map_err(|e| invalid(&e))?;
    let url = request
        .get("url")
        .and_then(Value::as_str)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| invalid("missing request.url"))?;
    let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

    Ok(BundleEntry {
        method,
        url: url.trim_start_matches('/').to_string(),
        full_url: text(entry, "fullUrl"),
        resource: entry.get("resource").cloned(),
        if_match: text(request, "ifMatch"),
        if_none_exist: text(request, "ifNoneExist"),
    })
}

/// Bundle processing.
#[async_trait]
pub trait BundleProvider: ResourceStorage {
    /// Runs every entry in one unit of work.
    ///
    /// # Errors
    ///
    /// * `TransactionError::Aborted` - one or more entries failed; nothing was written
    async fn process_transaction(&self, entries: Vec<BundleEntry>) -> StorageResult<BundleResult>;

    /// Runs every entry independently.
    async fn process_batch(&self, entries: Vec<BundleEntry>) -> StorageResult<BundleResult>;

    /// Dispatches on the bundle type.
    async fn process_bundle(
        &self,
        bundle_type: BundleType,
        entries: Vec<BundleEntry>,
    ) -> StorageResult<BundleResult> {
        match bundle_type {
            BundleType::Transaction => self.process_transaction(entries).await,
            BundleType::Batch => self.process_batch(entries).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bundle() {
        let bundle = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "urn:uuid:61ebe359-bfdc-4613-8bf2-c5e300945f0a",
                    "resource": {"resourceType": "Patient"},
                    "request": {"method": "POST", "url": "Patient", "ifNoneExist": "identifier=x|1"}
                },
                {"request": {"method": "DELETE", "url": "/Observation/o1"}}
            ]
        });

        let (bundle_type, entries) = parse_bundle(&bundle).unwrap();
        assert_eq!(bundle_type, BundleType::Transaction);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].method, BundleMethod::Post);
        assert_eq!(entries[0].if_none_exist.as_deref(), Some("identifier=x|1"));
        assert_eq!(entries[1].url, "Observation/o1");
        assert!(entries[1].resource.is_none());
    }

    #[test]
    fn test_parse_bundle_rejects_bad_input() {
        assert!(parse_bundle(&json!({"resourceType": "Patient"})).is_err());
        assert!(parse_bundle(&json!({"resourceType": "Bundle", "type": "searchset"})).is_err());
        let missing_request = json!({
            "resourceType": "Bundle",
            "type": "batch",
            "entry": [{"resource": {"resourceType": "Patient"}}]
        });
        let err = parse_bundle(&missing_request).unwrap_err();
        assert!(err.to_string().contains("entry 0"));
    }

    #[test]
    fn test_entry_result_json() {
        let stored = StoredResource::new("Patient", "1", json!({"resourceType": "Patient", "id": "1"}));
        let entry = BundleEntryResult::created(stored).to_json();
        assert_eq!(entry["response"]["status"], "201 Created");
        assert_eq!(entry["response"]["location"], "Patient/1/_history/1");
        assert_eq!(entry["response"]["etag"], "W/\"1\"");
        assert_eq!(entry["resource"]["id"], "1");

        let deleted = BundleEntryResult::deleted().to_json();
        assert_eq!(deleted["response"]["status"], "204 No Content");
        assert!(deleted.get("resource").is_none());
    }

    #[test]
    fn test_transaction_order() {
        let mut methods = vec![
            BundleMethod::Get,
            BundleMethod::Put,
            BundleMethod::Post,
            BundleMethod::Delete,
        ];
        methods.sort_by_key(BundleMethod::transaction_order);
        assert_eq!(methods[0], BundleMethod::Delete);
        assert_eq!(methods[3], BundleMethod::Get);
    }
}
