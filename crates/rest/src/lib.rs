//! # helios-store-rest - FHIR RESTful API over the Helios clinical store
//!
//! This crate serves a [`helios_store`] backend through the
//! [FHIR RESTful API](https://hl7.org/fhir/http.html): CRUD with version
//! history, catalog-driven search with includes, compartment `$everything`,
//! and batch/transaction bundles.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use helios_store::backends::sqlite::SqliteBackend;
//! use helios_store_rest::{ServerConfig, create_app_with_config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::open("hcs.db")?;
//!     backend.init_schema()?;
//!
//!     let app = create_app_with_config(backend, ServerConfig::default());
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8080").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## API Endpoints
//!
//! | Interaction | HTTP Method | URL Pattern |
//! |------------|-------------|-------------|
//! | read | GET | `/[type]/[id]` |
//! | vread | GET | `/[type]/[id]/_history/[vid]` |
//! | update | PUT | `/[type]/[id]` |
//! | patch | PATCH | `/[type]/[id]` |
//! | delete | DELETE | `/[type]/[id]` |
//! | create | POST | `/[type]` |
//! | search | GET/POST | `/[type]?params` or `/[type]/_search` |
//! | history (instance) | GET | `/[type]/[id]/_history` |
//! | $everything | GET | `/[type]/[id]/$everything` |
//! | batch/transaction | POST | `/` |
//! | capabilities | GET | `/metadata` |
//! | $versions | GET | `/$versions` |
//! | $reindex | POST | `/$reindex` or `/[type]/$reindex` |
//!
//! ## FHIR Versions
//!
//! Documents are stored in R4 form. Clients pick R4, R4B or R5 with the
//! `fhirVersion` media-type parameter; see [`version`]. An `Accept`
//! version the server does not support is `406`, an unsupported
//! `Content-Type` version is `415`.
//!
//! ## Error Handling
//!
//! All errors are returned as FHIR [OperationOutcome](https://hl7.org/fhir/operationoutcome.html)
//! resources:
//!
//! | HTTP Status | FHIR Issue Code | Description |
//! |-------------|-----------------|-------------|
//! | 400 | invalid | Bad request, bad search parameter, aborted transaction |
//! | 404 | not-found | Resource or version not found |
//! | 406 | not-supported | Unsupported `Accept` |
//! | 409 | conflict | `If-Match` names a stale version |
//! | 410 | deleted | Resource was deleted |
//! | 412 | multiple-matches | Conditional create matched several resources |
//! | 415 | not-supported | Unsupported media type |
//! | 422 | processing | Patch does not apply |
//! | 500 | exception | Internal server error |
//! | 504 | timeout | Request timed out |
//!
//! ## Configuration
//!
//! See [`ServerConfig`]; every option has an `HCS_` environment variable.
//!
//! ## Architecture
//!
//! - [`error`] - Error types and OperationOutcome generation
//! - [`config`] - Server configuration
//! - [`state`] - Application state (storage, configuration, translator)
//! - [`version`] - FHIR version negotiation and transforms
//! - [`handlers`] - HTTP request handlers for each interaction
//! - [`middleware`] - Content negotiation, conditional and `Prefer` headers
//! - [`extractors`] - Axum extractors for FHIR-specific data
//! - [`responses`] - Response formatting and header generation
//! - [`routing`] - Route configuration

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routing;
pub mod state;
pub mod version;

pub use config::ServerConfig;
pub use error::{RestError, RestResult};
pub use routing::FhirBackend;
pub use state::AppState;
pub use version::FhirVersion;

use std::sync::Arc;

use axum::{Router, extract::DefaultBodyLimit, http::StatusCode};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::info;

/// Creates the Axum application with default configuration.
///
/// For more control, use [`create_app_with_config`].
pub fn create_app<S>(storage: S) -> Router
where
    S: FhirBackend,
{
    create_app_with_config(storage, ServerConfig::default())
}

/// Creates the Axum application with custom configuration.
///
/// Sets up every route with request tracing, request ids, the body size
/// limit, the request timeout and, when enabled, CORS.
pub fn create_app_with_config<S>(storage: S, config: ServerConfig) -> Router
where
    S: FhirBackend,
{
    info!(
        backend = storage.backend_name(),
        base_url = %config.base_url(),
        default_fhir_version = %config.default_fhir_version,
        "Creating REST API server"
    );

    let state = AppState::new(Arc::new(storage), config.clone());
    let router = routing::fhir_routes::create_routes(state)
        .layer(DefaultBodyLimit::max(config.max_body_size));

    let service_builder = ServiceBuilder::new()
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            std::time::Duration::from_secs(config.request_timeout),
        ));

    let router = if config.enable_cors {
        router.layer(build_cors_layer(&config))
    } else {
        router
    };

    router.layer(service_builder)
}

/// Builds the CORS layer based on configuration.
fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    let mut cors = CorsLayer::new();

    if config.cors_origins == "*" {
        cors = cors.allow_origin(Any);
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_origin(origins);
    }

    if config.cors_methods == "*" {
        cors = cors.allow_methods(Any);
    } else {
        let methods: Vec<_> = config
            .cors_methods
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_methods(methods);
    }

    if config.cors_headers == "*" {
        cors = cors.allow_headers(Any);
    } else {
        let headers: Vec<_> = config
            .cors_headers
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        cors = cors.allow_headers(headers);
    }

    cors
}

/// Initializes the tracing subscriber for logging.
///
/// Call once at startup. `RUST_LOG` overrides `level` when set.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "helios_store={level},helios_store_rest={level},tower_http=debug"
        ))
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();
}
