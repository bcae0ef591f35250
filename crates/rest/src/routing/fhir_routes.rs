//! FHIR route configuration.
//!
//! Defines all routes for the FHIR RESTful API.

use axum::{
    Router,
    routing::{get, post},
};
use helios_store::core::{
    BundleProvider, CompartmentProvider, ConditionalStorage, IncludeProvider, ResourceStorage,
    SearchProvider, VersionedStorage,
};

use crate::handlers;
use crate::state::AppState;

/// Everything a backend must provide to serve the full API.
pub trait FhirBackend:
    ResourceStorage
    + VersionedStorage
    + ConditionalStorage
    + SearchProvider
    + IncludeProvider
    + CompartmentProvider
    + BundleProvider
    + Send
    + Sync
    + 'static
{
}

impl<T> FhirBackend for T where
    T: ResourceStorage
        + VersionedStorage
        + ConditionalStorage
        + SearchProvider
        + IncludeProvider
        + CompartmentProvider
        + BundleProvider
        + Send
        + Sync
        + 'static
{
}

/// Creates all FHIR REST API routes.
///
/// # Routes
///
/// ## System-level
/// - `GET /metadata` - CapabilityStatement
/// - `GET /health`, `/_liveness`, `/_readiness` - Health checks
/// - `GET /$versions` - Supported FHIR versions
/// - `POST /$reindex` - Rebuild every index
/// - `POST /` - Batch/Transaction
///
/// ## Type-level
/// - `GET /{type}` - Search
/// - `POST /{type}` - Create
/// - `POST /{type}/_search` - Search (POST)
/// - `POST /{type}/$reindex` - Rebuild one type's index
///
/// ## Instance-level
/// - `GET /{type}/{id}` - Read
/// - `PUT /{type}/{id}` - Update
/// - `PATCH /{type}/{id}` - Patch
/// - `DELETE /{type}/{id}` - Delete
/// - `GET /{type}/{id}/_history` - Instance history
/// - `GET /{type}/{id}/_history/{vid}` - Version read
/// - `GET /{type}/{id}/$everything` - Compartment contents
pub fn create_routes<S>(state: AppState<S>) -> Router
where
    S: FhirBackend,
{
    Router::new()
        // System-level routes
        .route("/metadata", get(handlers::capabilities_handler::<S>))
        .route("/health", get(handlers::health_handler::<S>))
        .route("/_liveness", get(handlers::liveness_handler))
        .route("/_readiness", get(handlers::readiness_handler::<S>))
        .route("/$versions", get(handlers::versions_handler::<S>))
        .route("/$reindex", post(handlers::reindex_all_handler::<S>))
        .route("/", post(handlers::batch_handler::<S>))
        // Type-level routes
        .route(
            "/{resource_type}",
            get(handlers::search_get_handler::<S>).post(handlers::create_handler::<S>),
        )
        .route(
            "/{resource_type}/_search",
            post(handlers::search_post_handler::<S>),
        )
        .route(
            "/{resource_type}/$reindex",
            post(handlers::reindex_type_handler::<S>),
        )
        // Instance-level routes
        .route(
            "/{resource_type}/{id}",
            get(handlers::read_handler::<S>)
                .put(handlers::update_handler::<S>)
                .patch(handlers::patch_handler::<S>)
                .delete(handlers::delete_handler::<S>),
        )
        .route(
            "/{resource_type}/{id}/_history",
            get(handlers::history_instance_handler::<S>),
        )
        .route(
            "/{resource_type}/{id}/_history/{version_id}",
            get(handlers::vread_handler::<S>),
        )
        .route(
            "/{resource_type}/{id}/$everything",
            get(handlers::everything_handler::<S>),
        )
        .with_state(state)
}
