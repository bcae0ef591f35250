//! Compartment `$everything` handler.
//!
//! Implements the [`$everything`](https://hl7.org/fhir/patient-operation-everything.html)
//! operation: `GET [base]/[compartment-type]/[id]/$everything`
//!
//! The subject comes first, followed by every resource in its compartment
//! and the resources those reference through the compartment's linked
//! types.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};
use helios_store::core::{CompartmentProvider, EverythingParams};
use helios_store::types::{BundleEntry, SearchBundle};
use serde::Deserialize;
use tracing::debug;

use crate::error::{RestError, RestResult};
use crate::extractors::AcceptVersion;
use crate::handlers::history::parse_instant;
use crate::responses::fhir_json;
use crate::state::AppState;

/// Query parameters for `$everything`.
#[derive(Debug, Deserialize, Default)]
pub struct EverythingQuery {
    /// Only members updated strictly after this instant.
    #[serde(rename = "_since")]
    pub since: Option<String>,

    /// Comma-separated resource types to keep.
    #[serde(rename = "_type")]
    pub types: Option<String>,

    /// Page size.
    #[serde(rename = "_count")]
    pub count: Option<u32>,

    /// Index of the first entry.
    #[serde(rename = "_offset")]
    pub offset: Option<u32>,
}

impl EverythingQuery {
    /// Re-encodes the filters for paging links.
    fn base_query(&self) -> String {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        if let Some(since) = &self.since {
            serializer.append_pair("_since", since);
        }
        if let Some(types) = &self.types {
            serializer.append_pair("_type", types);
        }
        serializer.finish()
    }
}

/// Handler for `$everything`.
///
/// # Response
///
/// - `200 OK` - a `searchset` bundle
/// - `400 Bad Request` - the type has no compartment definition
/// - `404 Not Found` - the subject does not exist
pub async fn everything_handler<S>(
    State(state): State<AppState<S>>,
    Path((compartment_type, id)): Path<(String, String)>,
    AcceptVersion(version): AcceptVersion,
    Query(query): Query<EverythingQuery>,
) -> RestResult<Response>
where
    S: CompartmentProvider + Send + Sync,
{
    debug!(
        compartment_type = %compartment_type,
        id = %id,
        params = ?query,
        "Processing $everything request"
    );

    if state.storage().param_catalog().compartment(&compartment_type).is_none() {
        return Err(RestError::BadRequest {
            message: format!("{} has no compartment definition", compartment_type),
        });
    }

    let params = EverythingParams {
        since: query
            .since
            .as_deref()
            .map(|s| parse_instant("_since", s))
            .transpose()?,
        types: query
            .types
            .as_deref()
            .map(|t| {
                t.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default(),
        count: Some(
            query
                .count
                .unwrap_or(state.default_page_size())
                .min(state.max_page_size()),
        ),
        offset: query.offset.unwrap_or(0),
    };

    let page = state
        .storage()
        .everything(&compartment_type, &id, &params)
        .await?;

    debug!(
        compartment_type = %compartment_type,
        id = %id,
        returned = page.len(),
        total = ?page.page_info.total,
        "$everything complete"
    );

    let url = format!(
        "{}/{}/{}/$everything",
        state.base_url(),
        compartment_type,
        id
    );
    let mut bundle =
        SearchBundle::new().with_paging_links(&url, &query.base_query(), &page.page_info);
    if let Some(total) = page.page_info.total {
        bundle = bundle.with_total(total);
    }
    for resource in page.items {
        let full_url = format!("{}/{}", state.base_url(), resource.url());
        bundle = bundle.with_entry(BundleEntry::match_entry(full_url, resource.into_content()));
    }

    Ok(fhir_json(
        StatusCode::OK,
        HeaderMap::new(),
        bundle.to_json(),
        version,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_query_keeps_filters() {
        let query = EverythingQuery {
            since: Some("2024-01-01T00:00:00Z".to_string()),
            types: Some("Observation,Encounter".to_string()),
            count: Some(5),
            offset: None,
        };
        let encoded = query.base_query();
        assert!(encoded.contains("_since=2024-01-01T00%3A00%3A00Z"));
        assert!(encoded.contains("_type=Observation%2CEncounter"));
        assert!(!encoded.contains("_count"));
    }
}
