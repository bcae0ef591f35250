//! Error types for the REST API.
//!
//! Every error renders as an OperationOutcome with a matching HTTP status.
//! Storage errors keep their own mapping (see
//! [`StorageError::http_status`](helios_store::StorageError::http_status)),
//! so an aborted transaction reports one issue per failed entry.
//!
//! | Error | HTTP Status | Issue Code |
//! |-------|-------------|------------|
//! | NotFound / VersionNotFound | 404 | not-found |
//! | Gone | 410 | deleted |
//! | VersionConflict / AlreadyExists | 409 | conflict / duplicate |
//! | MultipleMatches | 412 | multiple-matches |
//! | Validation / Search / bad bundle | 400 | invalid |
//! | Unsupported `Accept` version | 406 | not-supported |
//! | Unsupported `Content-Type` | 415 | not-supported |
//! | Unprocessable patch | 422 | processing |
//! | Timeout | 504 | timeout |
//! | Internal | 500 | exception |

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use helios_store::error::{OutcomeIssue, SearchError, operation_outcome};
use helios_store::StorageError;
use thiserror::Error;
use tracing::error;

/// The error type for REST handlers.
#[derive(Debug, Error)]
pub enum RestError {
    /// Any error raised by the store.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Malformed request (HTTP 400).
    #[error("bad request: {message}")]
    BadRequest {
        /// What was wrong.
        message: String,
    },

    /// No acceptable representation (HTTP 406).
    #[error("not acceptable: {message}")]
    NotAcceptable {
        /// What was requested.
        message: String,
    },

    /// Request body media type or version not supported (HTTP 415).
    #[error("unsupported media type: {content_type}")]
    UnsupportedMediaType {
        /// The offending `Content-Type`.
        content_type: String,
    },

    /// Well-formed but semantically unusable request (HTTP 422).
    #[error("unprocessable entity: {message}")]
    UnprocessableEntity {
        /// What could not be processed.
        message: String,
    },

    /// Unexpected failure (HTTP 500).
    #[error("internal error: {message}")]
    InternalError {
        /// Details for the log and the outcome.
        message: String,
    },
}

impl From<SearchError> for RestError {
    fn from(err: SearchError) -> Self {
        RestError::Storage(StorageError::Search(err))
    }
}

impl RestError {
    /// Returns the HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            RestError::Storage(e) => {
                StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            RestError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            RestError::NotAcceptable { .. } => StatusCode::NOT_ACCEPTABLE,
            RestError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            RestError::UnprocessableEntity { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            RestError::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the OperationOutcome issues describing this error.
    pub fn issues(&self) -> Vec<OutcomeIssue> {
        let code = match self {
            RestError::Storage(e) => return e.to_issues(),
            RestError::BadRequest { .. } => "invalid",
            RestError::NotAcceptable { .. } | RestError::UnsupportedMediaType { .. } => {
                "not-supported"
            }
            RestError::UnprocessableEntity { .. } => "processing",
            RestError::InternalError { .. } => "exception",
        };
        vec![OutcomeIssue::error(code, self.to_string())]
    }
}

impl IntoResponse for RestError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        }
        let outcome = operation_outcome(&self.issues());
        (status, Json(outcome)).into_response()
    }
}

/// Result type for REST handlers.
pub type RestResult<T> = Result<T, RestError>;

#[cfg(test)]
mod tests {
    use super::*;
    use helios_store::error::{
        ConcurrencyError, EntryFailure, ResourceError, TransactionError, ValidationError,
    };

    #[test]
    fn test_storage_error_statuses() {
        let not_found: RestError = StorageError::from(ResourceError::NotFound {
            resource_type: "Patient".to_string(),
            id: "1".to_string(),
        })
        .into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let gone: RestError = StorageError::from(ResourceError::Gone {
            resource_type: "Patient".to_string(),
            id: "1".to_string(),
            deleted_at: None,
        })
        .into();
        assert_eq!(gone.status(), StatusCode::GONE);

        let conflict: RestError = StorageError::from(ConcurrencyError::VersionConflict {
            resource_type: "Patient".to_string(),
            id: "1".to_string(),
            expected_version: "1".to_string(),
            actual_version: "2".to_string(),
        })
        .into();
        assert_eq!(conflict.status(), StatusCode::CONFLICT);

        let multiple: RestError = StorageError::from(ConcurrencyError::MultipleMatches {
            operation: "create".to_string(),
            count: 2,
        })
        .into();
        assert_eq!(multiple.status(), StatusCode::PRECONDITION_FAILED);
    }

    #[test]
    fn test_validation_issues_carry_paths() {
        let err: RestError = StorageError::from(ValidationError::invalid_field(
            "resourceType",
            "does not match the URL",
        ))
        .into();
        let issues = err.issues();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].expression, vec!["resourceType".to_string()]);
    }

    #[test]
    fn test_aborted_transaction_lists_each_entry() {
        let err: RestError = StorageError::from(TransactionError::Aborted {
            failures: vec![
                EntryFailure {
                    index: 1,
                    status: 404,
                    message: "missing".to_string(),
                },
                EntryFailure {
                    index: 3,
                    status: 400,
                    message: "bad id".to_string(),
                },
            ],
        })
        .into();
        let issues = err.issues();
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[1].expression, vec!["Bundle.entry[3]".to_string()]);
    }

    #[test]
    fn test_negotiation_statuses() {
        let not_acceptable = RestError::NotAcceptable {
            message: "fhirVersion=3.0".to_string(),
        };
        assert_eq!(not_acceptable.status(), StatusCode::NOT_ACCEPTABLE);
        assert_eq!(not_acceptable.issues()[0].code, "not-supported");

        let unsupported = RestError::UnsupportedMediaType {
            content_type: "text/plain".to_string(),
        };
        assert_eq!(unsupported.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}
