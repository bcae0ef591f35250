//! Instance history handler.
//!
//! Implements the FHIR [history interaction](https://hl7.org/fhir/http.html#history)
//! for one resource: `GET [base]/[type]/[id]/_history`

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use chrono::{DateTime, Utc};
use helios_store::core::{HistoryParams, VersionedStorage};
use serde::Deserialize;
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::AcceptVersion;
use crate::responses::{fhir_json, history_bundle};
use crate::state::AppState;

/// Query parameters for history requests.
#[derive(Debug, Deserialize, Default)]
pub struct HistoryQuery {
    /// Page size.
    #[serde(rename = "_count")]
    pub count: Option<u32>,

    /// Index of the first version returned.
    #[serde(rename = "_offset")]
    pub offset: Option<u32>,

    /// Only versions written at or after this instant.
    #[serde(rename = "_since")]
    pub since: Option<String>,
}

/// Handler for instance history.
///
/// Returns a `history` bundle, newest version first, deletion markers
/// included.
pub async fn history_instance_handler<S>(
    State(state): State<AppState<S>>,
    Path((resource_type, id)): Path<(String, String)>,
    AcceptVersion(version): AcceptVersion,
    Query(query): Query<HistoryQuery>,
) -> RestResult<Response>
where
    S: VersionedStorage + Send + Sync,
{
    debug!(
        resource_type = %resource_type,
        id = %id,
        params = ?query,
        "Processing instance history request"
    );

    let mut params = HistoryParams::new()
        .count(
            query
                .count
                .unwrap_or(state.default_page_size())
                .min(state.max_page_size()),
        )
        .offset(query.offset.unwrap_or(0));
    if let Some(since) = query.since.as_deref() {
        params = params.since(parse_instant("_since", since)?);
    }

    let page = state
        .storage()
        .history(&resource_type, &id, &params)
        .await?;

    let url = format!("{}/{}/{}/_history", state.base_url(), resource_type, id);
    let bundle = history_bundle(state.base_url(), &url, &page);
    Ok(fhir_json(StatusCode::OK, HeaderMap::new(), bundle, version))
}

/// Parses an instant query parameter such as `_since`.
pub(crate) fn parse_instant(name: &str, value: &str) -> RestResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RestError::BadRequest {
            message: format!("{} must be an instant: {}", name, e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_instant() {
        assert!(parse_instant("_since", "2024-01-01T00:00:00Z").is_ok());
        assert!(parse_instant("_since", "2024-01-01T00:00:00+02:00").is_ok());
        let err = parse_instant("_since", "yesterday").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
