//! `$reindex` operation handler.
//!
//! Rebuilds the search index from stored documents:
//! - `POST [base]/$reindex` - every type
//! - `POST [base]/[type]/$reindex` - one type

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use helios_store::core::ResourceStorage;
use serde_json::json;
use tracing::info;

use crate::error::RestResult;
use crate::state::AppState;

/// Handler for system-level `$reindex`.
pub async fn reindex_all_handler<S>(State(state): State<AppState<S>>) -> RestResult<Response>
where
    S: ResourceStorage + Send + Sync,
{
    reindex(&state, None).await
}

/// Handler for type-level `$reindex`.
pub async fn reindex_type_handler<S>(
    State(state): State<AppState<S>>,
    Path(resource_type): Path<String>,
) -> RestResult<Response>
where
    S: ResourceStorage + Send + Sync,
{
    reindex(&state, Some(&resource_type)).await
}

async fn reindex<S>(state: &AppState<S>, resource_type: Option<&str>) -> RestResult<Response>
where
    S: ResourceStorage + Send + Sync,
{
    let reindexed = state.storage().reindex(resource_type).await?;
    info!(resource_type = ?resource_type, reindexed, "Reindex complete");

    Ok((
        StatusCode::OK,
        Json(json!({
            "resourceType": "Parameters",
            "parameter": [{ "name": "reindexed", "valueInteger": reindexed }]
        })),
    )
        .into_response())
}
