//! Error types for the store.
//!
//! Errors are organized in a small hierarchy: [`StorageError`] is what every
//! public operation returns, and it wraps one category enum per concern
//! (resource state, concurrency, validation, search, transactions, backend).
//!
//! Every error can be rendered as a list of [`OutcomeIssue`]s, the
//! machine-readable shape (severity, code, path) that callers turn into an
//! OperationOutcome.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The primary error type for all storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Resource state errors
    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Concurrency and versioning errors
    #[error(transparent)]
    Concurrency(#[from] ConcurrencyError),

    /// Validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Search operation errors
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Transaction errors
    #[error(transparent)]
    Transaction(#[from] TransactionError),

    /// Backend-specific errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Errors related to resource state.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The requested resource was not found.
    #[error("resource not found: {resource_type}/{id}")]
    NotFound { resource_type: String, id: String },

    /// A resource with the given ID already exists.
    #[error("resource already exists: {resource_type}/{id}")]
    AlreadyExists { resource_type: String, id: String },

    /// The resource has been deleted (HTTP 410 Gone).
    #[error("resource deleted: {resource_type}/{id}")]
    Gone {
        resource_type: String,
        id: String,
        deleted_at: Option<chrono::DateTime<chrono::Utc>>,
    },

    /// The requested version of the resource was not found.
    #[error("version not found: {resource_type}/{id}/_history/{version_id}")]
    VersionNotFound {
        resource_type: String,
        id: String,
        version_id: String,
    },
}

/// Errors related to concurrency control.
#[derive(Error, Debug)]
pub enum ConcurrencyError {
    /// The version named by `If-Match` is not the current one.
    #[error("version conflict on {resource_type}/{id}: expected {expected_version}, found {actual_version}")]
    VersionConflict {
        resource_type: String,
        id: String,
        expected_version: String,
        actual_version: String,
    },

    /// A conditional operation matched more than one resource.
    #[error("conditional {operation} matched {count} resources, expected at most 1")]
    MultipleMatches { operation: String, count: usize },
}

/// Errors related to resource validation.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The resource failed structural or business-rule checks.
    #[error("invalid resource: {message}")]
    InvalidResource {
        message: String,
        details: Vec<ValidationDetail>,
    },

    /// The resource type is not known to the parameter catalog.
    #[error("unsupported resource type: {resource_type}")]
    UnsupportedResourceType { resource_type: String },

    /// Missing required field.
    #[error("missing required field: {field}")]
    MissingRequiredField { field: String },

    /// Invalid reference format.
    #[error("invalid reference: {reference}")]
    InvalidReference { reference: String, message: String },
}

impl ValidationError {
    /// Builds an `InvalidResource` error carrying a single error-level detail.
    pub fn invalid_field(path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        ValidationError::InvalidResource {
            message: message.clone(),
            details: vec![ValidationDetail {
                path: path.into(),
                message,
                severity: ValidationSeverity::Error,
            }],
        }
    }
}

/// Detailed validation error information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationDetail {
    /// The path to the field with the error (e.g. `Patient.birthDate`).
    pub path: String,
    /// A human-readable error message.
    pub message: String,
    /// The severity of the problem.
    pub severity: ValidationSeverity,
}

/// Severity level for validation errors and outcome issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    /// Operation cannot proceed.
    Fatal,
    /// Operation cannot proceed for this item.
    Error,
    /// Operation can proceed but with concerns.
    Warning,
    /// No action required.
    Information,
}

impl fmt::Display for ValidationSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationSeverity::Fatal => write!(f, "fatal"),
            ValidationSeverity::Error => write!(f, "error"),
            ValidationSeverity::Warning => write!(f, "warning"),
            ValidationSeverity::Information => write!(f, "information"),
        }
    }
}

/// Errors related to search operations.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The parameter is not declared for the resource type.
    #[error("unknown search parameter '{name}' for {resource_type}")]
    UnknownParameter { resource_type: String, name: String },

    /// The search modifier is not supported for this parameter type.
    #[error("unsupported modifier '{modifier}' for parameter type '{param_type}'")]
    UnsupportedModifier {
        modifier: String,
        param_type: String,
    },

    /// The comparison prefix is not valid for this parameter type.
    #[error("prefix '{prefix}' is not valid for parameter type '{param_type}'")]
    InvalidPrefix { prefix: String, param_type: String },

    /// A value could not be parsed for the parameter's type.
    #[error("invalid value '{value}' for parameter '{name}': {message}")]
    InvalidValue {
        name: String,
        value: String,
        message: String,
    },

    /// An `_include`/`_revinclude` directive is malformed or names a non-reference parameter.
    #[error("invalid {directive} '{value}': {message}")]
    InvalidInclude {
        directive: String,
        value: String,
        message: String,
    },

    /// A chained parameter is malformed or cannot be resolved.
    #[error("invalid chain '{chain}': {message}")]
    InvalidChain { chain: String, message: String },

    /// Invalid `_sort` expression.
    #[error("invalid sort parameter '{value}'")]
    InvalidSort { value: String },

    /// Search query parsing failed.
    #[error("failed to parse search query: {message}")]
    QueryParseError { message: String },

    /// Composite search parameter error.
    #[error("invalid composite search parameter: {message}")]
    InvalidComposite { message: String },
}

/// A failed entry inside an aborted transaction bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFailure {
    /// Zero-based position of the entry in the bundle.
    pub index: usize,
    /// HTTP-style status the entry would have produced.
    pub status: u16,
    /// Description of the failure.
    pub message: String,
}

/// Errors related to transactions.
#[derive(Error, Debug)]
pub enum TransactionError {
    /// An entry of an atomic bundle failed; nothing was persisted.
    #[error("transaction aborted: {}", summarize_failures(.failures))]
    Aborted { failures: Vec<EntryFailure> },

    /// The bundle itself is malformed.
    #[error("invalid bundle: {message}")]
    InvalidBundle { message: String },

    /// An entry refers to a placeholder that no earlier entry defines.
    #[error("unresolved placeholder reference '{placeholder}' at entry {index}")]
    UnresolvedPlaceholder { index: usize, placeholder: String },

    /// Transaction timed out.
    #[error("transaction timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

fn summarize_failures(failures: &[EntryFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("entry {} ({}): {}", f.index, f.status, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors originating from the database backend.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// Connection pool exhausted.
    #[error("connection pool exhausted for {backend_name}")]
    PoolExhausted { backend_name: String },

    /// Schema migration error.
    #[error("schema migration failed: {message}")]
    MigrationError { message: String },

    /// A batched sub-fetch failed.
    #[error("upstream fetch '{branch}' failed: {message}")]
    Upstream { branch: String, message: String },

    /// A batched sub-fetch exceeded its deadline.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// Result type alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for search parsing.
pub type SearchResult<T> = Result<T, SearchError>;

/// One machine-readable problem, in the shape of an OperationOutcome issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeIssue {
    /// Issue severity.
    pub severity: ValidationSeverity,
    /// Issue type code (`not-found`, `invalid`, `conflict`, ...).
    pub code: String,
    /// Human-readable diagnostics.
    pub diagnostics: String,
    /// Paths of the offending elements, if any.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression: Vec<String>,
}

impl OutcomeIssue {
    /// Creates an error-level issue.
    pub fn error(code: impl Into<String>, diagnostics: impl Into<String>) -> Self {
        Self {
            severity: ValidationSeverity::Error,
            code: code.into(),
            diagnostics: diagnostics.into(),
            expression: Vec::new(),
        }
    }

    /// Adds an element path.
    pub fn with_expression(mut self, path: impl Into<String>) -> Self {
        self.expression.push(path.into());
        self
    }

    /// Renders the issue as an OperationOutcome `issue` element.
    pub fn to_json(&self) -> serde_json::Value {
        let mut issue = serde_json::json!({
            "severity": self.severity.to_string(),
            "code": self.code,
            "diagnostics": self.diagnostics,
        });
        if !self.expression.is_empty() {
            issue["expression"] = serde_json::json!(self.expression);
        }
        issue
    }
}

/// Wraps issues in an OperationOutcome resource.
pub fn operation_outcome(issues: &[OutcomeIssue]) -> serde_json::Value {
    serde_json::json!({
        "resourceType": "OperationOutcome",
        "issue": issues.iter().map(OutcomeIssue::to_json).collect::<Vec<_>>(),
    })
}

impl StorageError {
    /// Returns the OperationOutcome issue type code for this error.
    pub fn issue_code(&self) -> &'static str {
        match self {
            StorageError::Resource(ResourceError::NotFound { .. })
            | StorageError::Resource(ResourceError::VersionNotFound { .. }) => "not-found",
            StorageError::Resource(ResourceError::Gone { .. }) => "deleted",
            StorageError::Resource(ResourceError::AlreadyExists { .. }) => "duplicate",
            StorageError::Concurrency(ConcurrencyError::VersionConflict { .. }) => "conflict",
            StorageError::Concurrency(ConcurrencyError::MultipleMatches { .. }) => {
                "multiple-matches"
            }
            StorageError::Validation(ValidationError::UnsupportedResourceType { .. }) => {
                "not-supported"
            }
            StorageError::Validation(_) => "invalid",
            StorageError::Search(SearchError::UnsupportedModifier { .. }) => "not-supported",
            StorageError::Search(_) => "invalid",
            StorageError::Transaction(TransactionError::Aborted { .. }) => "processing",
            StorageError::Transaction(TransactionError::Timeout { .. }) => "timeout",
            StorageError::Transaction(_) => "invalid",
            StorageError::Backend(BackendError::Timeout { .. }) => "timeout",
            StorageError::Backend(BackendError::Unavailable { .. })
            | StorageError::Backend(BackendError::PoolExhausted { .. }) => "transient",
            StorageError::Backend(_) => "exception",
        }
    }

    /// Returns the HTTP status this error maps to.
    pub fn http_status(&self) -> u16 {
        match self {
            StorageError::Resource(ResourceError::NotFound { .. })
            | StorageError::Resource(ResourceError::VersionNotFound { .. }) => 404,
            StorageError::Resource(ResourceError::Gone { .. }) => 410,
            StorageError::Resource(ResourceError::AlreadyExists { .. }) => 409,
            StorageError::Concurrency(ConcurrencyError::VersionConflict { .. }) => 409,
            StorageError::Concurrency(ConcurrencyError::MultipleMatches { .. }) => 412,
            StorageError::Validation(_) | StorageError::Search(_) => 400,
            StorageError::Transaction(TransactionError::Timeout { .. }) => 504,
            StorageError::Transaction(_) => 400,
            StorageError::Backend(BackendError::Timeout { .. }) => 504,
            StorageError::Backend(BackendError::Unavailable { .. })
            | StorageError::Backend(BackendError::PoolExhausted { .. }) => 503,
            StorageError::Backend(_) => 500,
        }
    }

    /// Expands the error into OperationOutcome issues.
    ///
    /// Validation errors produce one issue per offending path; aborted
    /// transactions produce one issue per failed entry.
    pub fn to_issues(&self) -> Vec<OutcomeIssue> {
        match self {
            StorageError::Validation(ValidationError::InvalidResource { message, details })
                if !details.is_empty() =>
            {
                details
                    .iter()
                    .map(|d| OutcomeIssue {
                        severity: d.severity,
                        code: "invalid".to_string(),
                        diagnostics: if d.message.is_empty() {
                            message.clone()
                        } else {
                            d.message.clone()
                        },
                        expression: vec![d.path.clone()],
                    })
                    .collect()
            }
            StorageError::Validation(ValidationError::MissingRequiredField { field }) => {
                vec![OutcomeIssue::error("required", self.to_string()).with_expression(field)]
            }
            StorageError::Transaction(TransactionError::Aborted { failures }) => failures
                .iter()
                .map(|f| {
                    OutcomeIssue::error("processing", f.message.clone())
                        .with_expression(format!("Bundle.entry[{}]", f.index))
                })
                .collect(),
            _ => vec![OutcomeIssue::error(self.issue_code(), self.to_string())],
        }
    }

    /// Builds the internal error the SQLite backend reports for driver failures.
    pub(crate) fn internal(backend_name: &str, message: impl Into<String>) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: backend_name.to_string(),
            message: message.into(),
            source: None,
        })
    }
}

// Implement conversions from common error types

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(BackendError::Internal {
            backend_name: "sqlite".to_string(),
            message: err.to_string(),
            source: Some(Box::new(err)),
        })
    }
}

#[cfg(feature = "sqlite")]
impl From<r2d2::Error> for StorageError {
    fn from(_err: r2d2::Error) -> Self {
        StorageError::Backend(BackendError::PoolExhausted {
            backend_name: "sqlite".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Resource(ResourceError::NotFound {
            resource_type: "Patient".to_string(),
            id: "123".to_string(),
        });
        assert_eq!(err.to_string(), "resource not found: Patient/123");
        assert_eq!(err.issue_code(), "not-found");
        assert_eq!(err.http_status(), 404);
    }

    #[test]
    fn test_concurrency_error_display() {
        let err = ConcurrencyError::VersionConflict {
            resource_type: "Patient".to_string(),
            id: "1".to_string(),
            expected_version: "1".to_string(),
            actual_version: "2".to_string(),
        };
        assert!(err.to_string().contains("expected 1, found 2"));
    }

    #[test]
    fn test_validation_error_expands_to_one_issue_per_path() {
        let err = StorageError::Validation(ValidationError::InvalidResource {
            message: "two problems".to_string(),
            details: vec![
                ValidationDetail {
                    path: "Patient.birthDate".to_string(),
                    message: "not a date".to_string(),
                    severity: ValidationSeverity::Error,
                },
                ValidationDetail {
                    path: "Patient.gender".to_string(),
                    message: "unknown code".to_string(),
                    severity: ValidationSeverity::Warning,
                },
            ],
        });

        let issues = err.to_issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].expression, vec!["Patient.birthDate"]);
        assert_eq!(issues[1].severity, ValidationSeverity::Warning);
    }

    #[test]
    fn test_aborted_transaction_lists_every_failure() {
        let err = StorageError::Transaction(TransactionError::Aborted {
            failures: vec![EntryFailure {
                index: 2,
                status: 400,
                message: "bad".to_string(),
            }],
        });
        assert!(err.to_string().contains("entry 2 (400): bad"));

        let outcome = operation_outcome(&err.to_issues());
        assert_eq!(outcome["issue"][0]["expression"][0], "Bundle.entry[2]");
        assert_eq!(outcome["issue"][0]["severity"], "error");
    }

    #[test]
    fn test_validation_severity_display() {
        assert_eq!(ValidationSeverity::Error.to_string(), "error");
        assert_eq!(ValidationSeverity::Warning.to_string(), "warning");
        assert_eq!(ValidationSeverity::Information.to_string(), "information");
    }
}
