//! REST API conformance tests.
//!
//! Tests standard FHIR REST behaviors:
//! - HTTP status codes (200, 201, 204, 304, 400, 404, 406, 409, 410, 412, 415, 422)
//! - Response headers (ETag, Last-Modified, Location, Content-Type)
//! - Conditional operations (If-Match, If-None-Match, If-None-Exist)
//! - Version history and vread
//! - FHIR version negotiation

mod common;

use axum::body::Bytes;
use axum::http::{HeaderValue, StatusCode};
use helios_store::core::ResourceStorage;
use serde_json::{Value, json};

use common::fixtures::{encounter, patient};
use common::{
    ACCEPT, IF_MATCH, IF_NONE_EXIST, IF_NONE_MATCH, PREFER, create_test_server, seed,
};

fn json_bytes(value: &Value) -> Bytes {
    Bytes::from(serde_json::to_vec(value).unwrap())
}

mod crud {
    use super::*;

    #[tokio::test]
    async fn test_create_returns_201_with_headers() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .json(&json!({"resourceType": "Patient", "name": [{"family": "Created"}]}))
            .await;

        response.assert_status(StatusCode::CREATED);
        assert_eq!(response.header("etag"), "W/\"1\"");
        let location = response.header("location");
        let location = location.to_str().unwrap();
        assert!(location.starts_with("http://localhost:8080/Patient/"));
        assert!(location.ends_with("/_history/1"));
        assert!(
            response
                .header("content-type")
                .to_str()
                .unwrap()
                .starts_with("application/fhir+json")
        );

        let body: Value = response.json();
        assert_eq!(body["meta"]["versionId"], "1");
        assert!(body["id"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_create_with_mismatched_type_is_400() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .json(&json!({"resourceType": "Observation", "status": "final"}))
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let outcome: Value = response.json();
        assert_eq!(outcome["resourceType"], "OperationOutcome");
    }

    #[tokio::test]
    async fn test_create_with_return_minimal_has_no_body() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .add_header(PREFER, HeaderValue::from_static("return=minimal"))
            .json(&json!({"resourceType": "Patient"}))
            .await;

        response.assert_status(StatusCode::CREATED);
        assert!(response.as_bytes().is_empty());
        assert!(response.headers().contains_key("location"));
    }

    #[tokio::test]
    async fn test_read_returns_current_version() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        let response = server.get("/Patient/p1").await;

        response.assert_status_ok();
        assert_eq!(response.header("etag"), "W/\"1\"");
        assert!(response.headers().contains_key("last-modified"));
        let body: Value = response.json();
        assert_eq!(body["name"][0]["family"], "Smith");
    }

    #[tokio::test]
    async fn test_read_missing_is_404() {
        let (server, _backend) = create_test_server();

        let response = server.get("/Patient/nobody").await;

        response.assert_status(StatusCode::NOT_FOUND);
        let outcome: Value = response.json();
        assert_eq!(outcome["issue"][0]["code"], "not-found");
    }

    #[tokio::test]
    async fn test_read_with_matching_etag_is_304() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        let response = server
            .get("/Patient/p1")
            .add_header(IF_NONE_MATCH, HeaderValue::from_static("W/\"1\""))
            .await;

        response.assert_status(StatusCode::NOT_MODIFIED);
    }

    #[tokio::test]
    async fn test_read_with_summary_and_elements() {
        let (server, backend) = create_test_server();
        let mut body = patient("p1", "Smith", Some("1980-01-15"));
        body["text"] = json!({"status": "generated", "div": "<div>Smith</div>"});
        seed(&backend, vec![body]).await;

        let elements: Value = server
            .get("/Patient/p1")
            .add_query_param("_elements", "birthDate")
            .await
            .json();
        assert_eq!(elements["birthDate"], "1980-01-15");
        assert!(elements.get("name").is_none());
        assert_eq!(elements["id"], "p1");

        let response = server
            .get("/Patient/p1")
            .add_query_param("_summary", "bogus")
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_update_returns_200_and_bumps_version() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        let response = server
            .put("/Patient/p1")
            .json(&patient("p1", "Jones", None))
            .await;

        response.assert_status_ok();
        assert_eq!(response.header("etag"), "W/\"2\"");
        let body: Value = response.json();
        assert_eq!(body["meta"]["versionId"], "2");
        assert_eq!(body["name"][0]["family"], "Jones");
    }

    #[tokio::test]
    async fn test_update_creates_with_client_id() {
        let (server, _backend) = create_test_server();

        let response = server
            .put("/Patient/client-chosen")
            .json(&patient("client-chosen", "New", None))
            .await;

        response.assert_status(StatusCode::CREATED);
        assert!(
            response
                .header("location")
                .to_str()
                .unwrap()
                .contains("/Patient/client-chosen/_history/1")
        );
    }

    #[tokio::test]
    async fn test_update_with_stale_if_match_is_409() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;
        backend
            .update("Patient", "p1", patient("p1", "Second", None), None)
            .await
            .unwrap();

        let response = server
            .put("/Patient/p1")
            .add_header(IF_MATCH, HeaderValue::from_static("W/\"1\""))
            .json(&patient("p1", "Third", None))
            .await;

        response.assert_status(StatusCode::CONFLICT);

        let current = backend.read("Patient", "p1").await.unwrap().unwrap();
        assert_eq!(current.version_id(), 2);
    }

    #[tokio::test]
    async fn test_delete_then_read_is_410() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        server
            .delete("/Patient/p1")
            .await
            .assert_status(StatusCode::NO_CONTENT);

        let response = server.get("/Patient/p1").await;
        response.assert_status(StatusCode::GONE);
        let outcome: Value = response.json();
        assert_eq!(outcome["issue"][0]["code"], "deleted");

        // A second delete is accepted without a new version.
        server
            .delete("/Patient/p1")
            .await
            .assert_status(StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_delete_missing_is_404() {
        let (server, _backend) = create_test_server();

        server
            .delete("/Patient/never-existed")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invalid_json_is_400() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .bytes(Bytes::from_static(b"{not json"))
            .content_type("application/fhir+json")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
    }
}

mod conditional_create {
    use super::*;

    #[tokio::test]
    async fn test_no_match_creates() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .add_header(IF_NONE_EXIST, HeaderValue::from_static("family=Unique"))
            .json(&json!({"resourceType": "Patient", "name": [{"family": "Unique"}]}))
            .await;

        response.assert_status(StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_single_match_returns_existing() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("existing", "Unique", None)]).await;

        let response = server
            .post("/Patient")
            .add_header(IF_NONE_EXIST, HeaderValue::from_static("family=Unique"))
            .json(&json!({"resourceType": "Patient", "name": [{"family": "Unique"}]}))
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["id"], "existing");
        assert_eq!(backend.count(Some("Patient")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_multiple_matches_is_412() {
        let (server, backend) = create_test_server();
        seed(
            &backend,
            vec![patient("a", "Twin", None), patient("b", "Twin", None)],
        )
        .await;

        let response = server
            .post("/Patient")
            .add_header(IF_NONE_EXIST, HeaderValue::from_static("family=Twin"))
            .json(&json!({"resourceType": "Patient", "name": [{"family": "Twin"}]}))
            .await;

        response.assert_status(StatusCode::PRECONDITION_FAILED);
        assert_eq!(backend.count(Some("Patient")).await.unwrap(), 2);
    }
}

mod patch {
    use super::*;

    #[tokio::test]
    async fn test_json_patch_applies() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        let response = server
            .patch("/Patient/p1")
            .bytes(json_bytes(&json!([
                {"op": "add", "path": "/gender", "value": "female"}
            ])))
            .content_type("application/json-patch+json")
            .await;

        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["gender"], "female");
        assert_eq!(body["meta"]["versionId"], "2");
    }

    #[tokio::test]
    async fn test_failed_patch_is_422() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        let response = server
            .patch("/Patient/p1")
            .bytes(json_bytes(&json!([
                {"op": "test", "path": "/gender", "value": "male"}
            ])))
            .content_type("application/json-patch+json")
            .await;

        response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
        let current = backend.read("Patient", "p1").await.unwrap().unwrap();
        assert_eq!(current.version_id(), 1);
    }

    #[tokio::test]
    async fn test_merge_patch_is_415() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        let response = server
            .patch("/Patient/p1")
            .bytes(json_bytes(&json!({"gender": "male"})))
            .content_type("application/merge-patch+json")
            .await;

        response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }
}

mod versioning {
    use super::*;

    async fn seed_three_versions(backend: &helios_store::backends::sqlite::SqliteBackend) {
        seed(backend, vec![patient("p1", "First", None)]).await;
        backend
            .update("Patient", "p1", patient("p1", "Second", None), None)
            .await
            .unwrap();
        backend.delete("Patient", "p1").await.unwrap();
    }

    #[tokio::test]
    async fn test_vread_returns_old_version() {
        let (server, backend) = create_test_server();
        seed_three_versions(&backend).await;

        let response = server.get("/Patient/p1/_history/1").await;

        response.assert_status_ok();
        assert_eq!(response.header("etag"), "W/\"1\"");
        let body: Value = response.json();
        assert_eq!(body["name"][0]["family"], "First");
    }

    #[tokio::test]
    async fn test_vread_of_deletion_is_410() {
        let (server, backend) = create_test_server();
        seed_three_versions(&backend).await;

        server
            .get("/Patient/p1/_history/3")
            .await
            .assert_status(StatusCode::GONE);
    }

    #[tokio::test]
    async fn test_vread_unknown_version_is_404() {
        let (server, backend) = create_test_server();
        seed_three_versions(&backend).await;

        server
            .get("/Patient/p1/_history/9")
            .await
            .assert_status(StatusCode::NOT_FOUND);
        server
            .get("/Patient/p1/_history/latest")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_history_is_newest_first_with_deletion_marker() {
        let (server, backend) = create_test_server();
        seed_three_versions(&backend).await;

        let response = server.get("/Patient/p1/_history").await;

        response.assert_status_ok();
        let bundle: Value = response.json();
        assert_eq!(bundle["type"], "history");
        assert_eq!(bundle["total"], 3);

        let entries = bundle["entry"].as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["request"]["method"], "DELETE");
        assert!(entries[0].get("resource").is_none());
        assert_eq!(entries[1]["request"]["method"], "PUT");
        assert_eq!(entries[1]["resource"]["name"][0]["family"], "Second");
        assert_eq!(entries[2]["request"]["method"], "POST");
        assert_eq!(entries[2]["response"]["status"], "201 Created");
    }

    #[tokio::test]
    async fn test_history_pages() {
        let (server, backend) = create_test_server();
        seed_three_versions(&backend).await;

        let bundle: Value = server
            .get("/Patient/p1/_history")
            .add_query_param("_count", "2")
            .await
            .json();

        assert_eq!(bundle["entry"].as_array().unwrap().len(), 2);
        let next = common::link(&bundle, "next").unwrap();
        assert!(next.contains("_count=2&_offset=2"));
    }

    #[tokio::test]
    async fn test_history_bad_since_is_400() {
        let (server, backend) = create_test_server();
        seed_three_versions(&backend).await;

        server
            .get("/Patient/p1/_history")
            .add_query_param("_since", "last-tuesday")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}

mod negotiation {
    use super::*;

    #[tokio::test]
    async fn test_default_content_type_names_version() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        let response = server.get("/Patient/p1").await;

        assert_eq!(
            response.header("content-type"),
            "application/fhir+json; fhirVersion=4.0"
        );
    }

    #[tokio::test]
    async fn test_unsupported_accept_version_is_406() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        let response = server
            .get("/Patient/p1")
            .add_header(
                ACCEPT,
                HeaderValue::from_static("application/fhir+json; fhirVersion=3.0"),
            )
            .await;
        response.assert_status(StatusCode::NOT_ACCEPTABLE);

        let response = server
            .get("/Patient/p1")
            .add_header(ACCEPT, HeaderValue::from_static("application/fhir+xml"))
            .await;
        response.assert_status(StatusCode::NOT_ACCEPTABLE);
    }

    #[tokio::test]
    async fn test_unsupported_content_type_version_is_415() {
        let (server, _backend) = create_test_server();

        let response = server
            .post("/Patient")
            .bytes(json_bytes(&json!({"resourceType": "Patient"})))
            .content_type("application/fhir+json; fhirVersion=3.0")
            .await;
        response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let response = server
            .post("/Patient")
            .bytes(Bytes::from_static(b"<Patient/>"))
            .content_type("application/fhir+xml")
            .await;
        response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_r5_read_renames_elements() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![encounter("e1", "p1", "2024-03-01T10:00:00Z")]).await;

        let response = server
            .get("/Encounter/e1")
            .add_header(
                ACCEPT,
                HeaderValue::from_static("application/fhir+json; fhirVersion=5.0"),
            )
            .await;

        response.assert_status_ok();
        assert_eq!(
            response.header("content-type"),
            "application/fhir+json; fhirVersion=5.0"
        );
        let body: Value = response.json();
        assert_eq!(body["actualPeriod"]["start"], "2024-03-01T10:00:00Z");
        assert!(body.get("period").is_none());
        assert_eq!(body["class"][0]["coding"][0]["code"], "AMB");
    }

    #[tokio::test]
    async fn test_r5_write_is_stored_in_r4_form() {
        let (server, backend) = create_test_server();

        let r5 = json!({
            "resourceType": "Encounter",
            "id": "e5",
            "status": "completed",
            "class": [{"coding": [{"code": "IMP"}]}],
            "actualPeriod": {"start": "2024-05-01", "end": "2024-05-01"}
        });
        server
            .put("/Encounter/e5")
            .bytes(json_bytes(&r5))
            .content_type("application/fhir+json; fhirVersion=5.0")
            .await
            .assert_status(StatusCode::CREATED);

        let stored = backend.read("Encounter", "e5").await.unwrap().unwrap();
        assert_eq!(stored.content()["period"]["start"], "2024-05-01");
        assert_eq!(stored.content()["class"]["code"], "IMP");

        let bundle: Value = server
            .get("/Encounter")
            .add_query_param("date", "2024-05-01")
            .await
            .json();
        assert_eq!(common::entry_ids(&bundle), vec!["e5"]);
    }
}

mod system {
    use super::*;

    #[tokio::test]
    async fn test_metadata_follows_accept_version() {
        let (server, _backend) = create_test_server();

        let statement: Value = server.get("/metadata").await.json();
        assert_eq!(statement["resourceType"], "CapabilityStatement");
        assert_eq!(statement["fhirVersion"], "4.0.1");
        let resources = statement["rest"][0]["resource"].as_array().unwrap();
        assert!(resources.iter().any(|r| r["type"] == "Patient"));

        let r5: Value = server
            .get("/metadata")
            .add_header(
                ACCEPT,
                HeaderValue::from_static("application/fhir+json; fhirVersion=5.0"),
            )
            .await
            .json();
        assert_eq!(r5["fhirVersion"], "5.0.0");
    }

    #[tokio::test]
    async fn test_versions_operation() {
        let (server, _backend) = create_test_server();

        let params: Value = server.get("/$versions").await.json();
        let codes: Vec<&str> = params["parameter"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|p| p["name"] == "version")
            .filter_map(|p| p["valueCode"].as_str())
            .collect();
        assert_eq!(codes, vec!["4.0", "4.3", "5.0"]);
    }

    #[tokio::test]
    async fn test_health_endpoints() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("p1", "Smith", None)]).await;

        let health: Value = server.get("/health").await.json();
        assert_eq!(health["status"], "healthy");
        assert_eq!(health["backend"], "sqlite");

        let ready: Value = server.get("/_readiness").await.json();
        assert_eq!(ready["resources"], 1);

        server.get("/_liveness").await.assert_status_ok();
    }

    #[tokio::test]
    async fn test_reindex_reports_count() {
        let (server, backend) = create_test_server();
        seed(
            &backend,
            vec![patient("p1", "Smith", None), patient("p2", "Jones", None)],
        )
        .await;

        let params: Value = server.post("/Patient/$reindex").await.json();
        assert_eq!(params["parameter"][0]["valueInteger"], 2);

        let bundle: Value = server
            .get("/Patient")
            .add_query_param("family", "jones")
            .await
            .json();
        assert_eq!(common::entry_ids(&bundle), vec!["p2"]);
    }
}
