//! SQLite backend integration tests: resource lifecycle and versioning.

mod common;

use serde_json::json;

use helios_store::backends::sqlite::SqliteBackend;
use helios_store::core::{HistoryParams, ResourceStorage, VersionedStorage};
use helios_store::error::{ConcurrencyError, ResourceError, StorageError};
use helios_store::types::ResourceMethod;

use common::{create_backend, patient, search};

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_full_lifecycle_keeps_every_version() {
    let backend = create_backend();

    let created = backend
        .create("Patient", patient("lifecycle", "Smith", Some("1970-01-01")))
        .await
        .unwrap();
    assert_eq!(created.version_id(), 1);
    assert_eq!(created.content()["meta"]["versionId"], "1");

    let updated = backend
        .update(
            "Patient",
            "lifecycle",
            patient("lifecycle", "Smythe", Some("1970-01-01")),
            Some(&created.etag()),
        )
        .await
        .unwrap();
    assert_eq!(updated.version_id(), 2);

    backend.delete("Patient", "lifecycle").await.unwrap();

    let err = backend.read("Patient", "lifecycle").await.unwrap_err();
    assert!(matches!(err, StorageError::Resource(ResourceError::Gone { .. })));

    let history = backend
        .history("Patient", "lifecycle", &HistoryParams::new())
        .await
        .unwrap();
    let methods: Vec<ResourceMethod> = history.items.iter().map(|r| r.method()).collect();
    assert_eq!(
        methods,
        vec![ResourceMethod::Delete, ResourceMethod::Put, ResourceMethod::Post]
    );

    let first = backend.vread("Patient", "lifecycle", 1).await.unwrap();
    assert_eq!(first.content()["name"][0]["family"], "Smith");
}

#[tokio::test]
async fn test_stale_if_match_is_a_conflict() {
    let backend = create_backend();
    backend
        .create("Patient", patient("p", "Smith", None))
        .await
        .unwrap();
    backend
        .update("Patient", "p", patient("p", "Jones", None), None)
        .await
        .unwrap();

    let err = backend
        .update("Patient", "p", patient("p", "Brown", None), Some("W/\"1\""))
        .await
        .unwrap_err();
    match err {
        StorageError::Concurrency(ConcurrencyError::VersionConflict { .. }) => {}
        other => panic!("expected a version conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_deleted_resource_leaves_the_index() {
    let backend = create_backend();
    backend
        .create("Patient", patient("gone", "Vanish", None))
        .await
        .unwrap();
    assert_eq!(search(&backend, "Patient", "family=vanish").await.total, Some(1));

    backend.delete("Patient", "gone").await.unwrap();
    assert_eq!(search(&backend, "Patient", "family=vanish").await.total, Some(0));
}

#[tokio::test]
async fn test_patch_records_patch_version() {
    let backend = create_backend();
    backend
        .create("Patient", patient("pt", "Smith", None))
        .await
        .unwrap();

    let patched = backend
        .patch(
            "Patient",
            "pt",
            &json!([{"op": "add", "path": "/gender", "value": "female"}]),
            Some("W/\"1\""),
        )
        .await
        .unwrap();
    assert_eq!(patched.version_id(), 2);
    assert_eq!(patched.method(), ResourceMethod::Patch);
    assert_eq!(search(&backend, "Patient", "gender=female").await.total, Some(1));
}

// ============================================================================
// File-backed database
// ============================================================================

#[tokio::test]
async fn test_file_database_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");

    {
        let backend = SqliteBackend::open(&path).unwrap();
        backend.init_schema().unwrap();
        backend
            .create("Patient", patient("durable", "Stone", Some("1960-02-02")))
            .await
            .unwrap();
    }

    let reopened = SqliteBackend::open(&path).unwrap();
    reopened.init_schema().unwrap();
    let read = reopened.read("Patient", "durable").await.unwrap().unwrap();
    assert_eq!(read.content()["name"][0]["family"], "Stone");
    assert_eq!(
        search(&reopened, "Patient", "birthdate=1960").await.total,
        Some(1)
    );
}

#[tokio::test]
async fn test_reindex_preserves_search_results() {
    let backend = create_backend();
    for (id, family) in [("a", "Adams"), ("b", "Baker"), ("c", "Carter")] {
        backend
            .create("Patient", patient(id, family, None))
            .await
            .unwrap();
    }
    let before = search(&backend, "Patient", "family=a,b&_sort=family").await;

    let reindexed = backend.reindex(None).await.unwrap();
    assert_eq!(reindexed, 3);

    let after = search(&backend, "Patient", "family=a,b&_sort=family").await;
    assert_eq!(common::ids(&before), common::ids(&after));
    assert_eq!(common::ids(&after), vec!["a", "b"]);
}
