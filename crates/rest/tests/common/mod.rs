//! Common test utilities for REST API testing.
//!
//! - [`fixtures`] - FHIR documents used across tests

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;

use axum::http::HeaderName;
use axum_test::TestServer;
use helios_store::backends::sqlite::SqliteBackend;
use helios_store::core::ResourceStorage;
use serde_json::Value;

use helios_store_rest::{AppState, ServerConfig};

pub const CONTENT_TYPE: HeaderName = HeaderName::from_static("content-type");
pub const ACCEPT: HeaderName = HeaderName::from_static("accept");
pub const IF_MATCH: HeaderName = HeaderName::from_static("if-match");
pub const IF_NONE_MATCH: HeaderName = HeaderName::from_static("if-none-match");
pub const IF_NONE_EXIST: HeaderName = HeaderName::from_static("if-none-exist");
pub const PREFER: HeaderName = HeaderName::from_static("prefer");

/// Creates a test server over a fresh in-memory backend.
pub fn create_test_server() -> (TestServer, Arc<SqliteBackend>) {
    create_test_server_with(ServerConfig::for_testing())
}

/// Creates a test server with a custom configuration.
pub fn create_test_server_with(config: ServerConfig) -> (TestServer, Arc<SqliteBackend>) {
    let backend = SqliteBackend::in_memory().expect("Failed to create SQLite backend");
    backend.init_schema().expect("Failed to init schema");
    let backend = Arc::new(backend);

    let state = AppState::new(Arc::clone(&backend), config);
    let app = helios_store_rest::routing::create_routes(state);
    let server = TestServer::new(app).expect("Failed to create test server");

    (server, backend)
}

/// Stores every document, keeping the ids the fixtures carry.
pub async fn seed(backend: &SqliteBackend, documents: Vec<Value>) {
    for document in documents {
        let resource_type = document["resourceType"]
            .as_str()
            .expect("fixture has a resourceType")
            .to_string();
        backend
            .create(&resource_type, document)
            .await
            .unwrap_or_else(|e| panic!("Failed to seed {}: {}", resource_type, e));
    }
}

/// Logical ids of the resources in a bundle, in entry order.
pub fn entry_ids(bundle: &Value) -> Vec<String> {
    bundle["entry"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e["resource"]["id"].as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// `Type/id` of the resources in a bundle, in entry order.
pub fn entry_refs(bundle: &Value) -> Vec<String> {
    bundle["entry"]
        .as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| {
                    let resource = &e["resource"];
                    Some(format!(
                        "{}/{}",
                        resource["resourceType"].as_str()?,
                        resource["id"].as_str()?
                    ))
                })
                .collect()
        })
        .unwrap_or_default()
}

/// The URL of a bundle link relation.
pub fn link<'a>(bundle: &'a Value, relation: &str) -> Option<&'a str> {
    bundle["link"]
        .as_array()?
        .iter()
        .find(|l| l["relation"] == relation)
        .and_then(|l| l["url"].as_str())
}
