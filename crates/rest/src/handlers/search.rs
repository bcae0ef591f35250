//! Search interaction handler.
//!
//! Implements the FHIR [search interaction](https://hl7.org/fhir/http.html#search):
//! - `GET [base]/[type]?params` - Type-level search
//! - `POST [base]/[type]/_search` - Type-level search with a form body
//!
//! The query string is translated against the parameter catalog; unknown
//! parameters and malformed values are rejected with `400 Bad Request`.

use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use helios_store::core::{IncludeProvider, SearchProvider};
use helios_store::search::parse_query_string;
use tracing::debug;

use crate::error::RestResult;
use crate::extractors::AcceptVersion;
use crate::responses::{base_query_without_paging, fhir_json};
use crate::state::AppState;

/// Handler for GET search.
///
/// # Response
///
/// Returns a Bundle of type "searchset" with `self`, `first` and, where
/// they exist, `previous`/`next` links.
pub async fn search_get_handler<S>(
    State(state): State<AppState<S>>,
    Path(resource_type): Path<String>,
    AcceptVersion(version): AcceptVersion,
    RawQuery(query): RawQuery,
) -> RestResult<Response>
where
    S: SearchProvider + IncludeProvider + Send + Sync,
{
    let pairs = parse_query_string(query.as_deref().unwrap_or(""));
    execute_search(&state, &resource_type, pairs, version).await
}

/// Handler for POST search.
///
/// Parameters come from the `application/x-www-form-urlencoded` body and
/// the URL query string combined.
pub async fn search_post_handler<S>(
    State(state): State<AppState<S>>,
    Path(resource_type): Path<String>,
    AcceptVersion(version): AcceptVersion,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> RestResult<Response>
where
    S: SearchProvider + IncludeProvider + Send + Sync,
{
    let mut pairs = parse_query_string(query.as_deref().unwrap_or(""));
    pairs.extend(parse_query_string(&String::from_utf8_lossy(&body)));
    execute_search(&state, &resource_type, pairs, version).await
}

async fn execute_search<S>(
    state: &AppState<S>,
    resource_type: &str,
    pairs: Vec<(String, String)>,
    version: crate::version::FhirVersion,
) -> RestResult<Response>
where
    S: SearchProvider + IncludeProvider + Send + Sync,
{
    debug!(
        resource_type = %resource_type,
        params = ?pairs,
        "Processing search request"
    );

    let query = state.translator().translate(resource_type, &pairs)?;
    let results = state.storage().search(&query).await?;

    debug!(
        resource_type = %resource_type,
        matches = results.resources.len(),
        included = results.included.len(),
        total = ?results.total,
        "Search complete"
    );

    let search_url = format!("{}/{}", state.base_url(), resource_type);
    let projector = state.projector();
    let bundle = results.to_bundle(
        state.base_url(),
        &search_url,
        &base_query_without_paging(&pairs),
        |resource| projector.apply(resource, query.summary, &query.elements),
    );

    Ok(fhir_json(
        StatusCode::OK,
        HeaderMap::new(),
        bundle.to_json(),
        version,
    ))
}
