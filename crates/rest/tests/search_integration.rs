//! Integration tests for search, `$everything` and bundles.
//!
//! Covers the search handler over the SQLite backend:
//! - Basic parameters (string, token, quantity, reference chains)
//! - Pagination links (_count, _offset)
//! - Sorting (_sort)
//! - Include/revinclude (_include, _revinclude)
//! - Subsetting (_summary, _elements)
//! - Compartment `$everything`
//! - Batch and transaction bundles

mod common;

use axum::body::Bytes;
use axum::http::StatusCode;
use helios_store::backends::sqlite::SqliteBackend;
use helios_store::core::ResourceStorage;
use serde_json::{Value, json};

use common::fixtures::{encounter, observation, organization, patient};
use common::{create_test_server, entry_ids, entry_refs, link, seed};

/// Seeds patients, an organization and observations used by most tests.
async fn seed_search_test_data(backend: &SqliteBackend) {
    let mut smith = patient("patient-1", "Smith", Some("1980-01-15"));
    smith["managingOrganization"] = json!({"reference": "Organization/org-1"});
    smith["gender"] = json!("male");

    seed(
        backend,
        vec![
            organization("org-1", "General Hospital"),
            smith,
            patient("patient-2", "Jones", Some("1990-05-20")),
            patient("patient-3", "Smithson", None),
            observation("obs-1", "patient-1", "2339-0", 180.0),
            observation("obs-2", "patient-1", "2339-0", 95.0),
            observation("obs-3", "patient-2", "8867-4", 72.0),
            encounter("enc-1", "patient-1", "2024-03-01T10:00:00Z"),
        ],
    )
    .await;
}

mod basic {
    use super::*;

    #[tokio::test]
    async fn test_string_search_returns_searchset() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let response = server
            .get("/Patient")
            .add_query_param("family", "smith")
            .await;

        response.assert_status_ok();
        let bundle: Value = response.json();
        assert_eq!(bundle["resourceType"], "Bundle");
        assert_eq!(bundle["type"], "searchset");
        assert_eq!(bundle["total"], 2);

        let mut ids = entry_ids(&bundle);
        ids.sort();
        assert_eq!(ids, vec!["patient-1", "patient-3"]);

        let self_link = link(&bundle, "self").unwrap();
        assert!(self_link.starts_with("http://localhost:8080/Patient?family=smith"));
        for entry in bundle["entry"].as_array().unwrap() {
            assert_eq!(entry["search"]["mode"], "match");
            assert!(
                entry["fullUrl"]
                    .as_str()
                    .unwrap()
                    .starts_with("http://localhost:8080/Patient/")
            );
        }
    }

    #[tokio::test]
    async fn test_exact_modifier() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Patient")
            .add_query_param("family:exact", "Smith")
            .await
            .json();

        assert_eq!(entry_ids(&bundle), vec!["patient-1"]);
    }

    #[tokio::test]
    async fn test_token_and_quantity_search() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Observation")
            .add_query_param("code", "http://loinc.org|2339-0")
            .add_query_param("value-quantity", "gt100")
            .await
            .json();

        assert_eq!(entry_ids(&bundle), vec!["obs-1"]);
    }

    #[tokio::test]
    async fn test_chained_reference_search() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Observation")
            .add_query_param("patient.family", "jones")
            .await
            .json();

        assert_eq!(entry_ids(&bundle), vec!["obs-3"]);
    }

    #[tokio::test]
    async fn test_sort_by_birthdate() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Patient")
            .add_query_param("_sort", "-birthdate")
            .await
            .json();

        assert_eq!(
            entry_ids(&bundle),
            vec!["patient-2", "patient-1", "patient-3"]
        );
    }

    #[tokio::test]
    async fn test_unknown_parameter_is_400() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let response = server
            .get("/Patient")
            .add_query_param("shoe-size", "42")
            .await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let outcome: Value = response.json();
        assert_eq!(outcome["resourceType"], "OperationOutcome");
    }

    #[tokio::test]
    async fn test_deleted_resources_do_not_match() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;
        backend.delete("Patient", "patient-3").await.unwrap();

        let bundle: Value = server
            .get("/Patient")
            .add_query_param("family", "smith")
            .await
            .json();

        assert_eq!(entry_ids(&bundle), vec!["patient-1"]);
    }

    #[tokio::test]
    async fn test_post_search_reads_form_body() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let response = server
            .post("/Patient/_search")
            .bytes(Bytes::from_static(b"family=jones"))
            .content_type("application/x-www-form-urlencoded")
            .await;

        response.assert_status_ok();
        let bundle: Value = response.json();
        assert_eq!(entry_ids(&bundle), vec!["patient-2"]);
    }
}

mod paging {
    use super::*;

    #[tokio::test]
    async fn test_next_link_walks_all_pages() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let first: Value = server
            .get("/Patient")
            .add_query_param("_sort", "birthdate")
            .add_query_param("_count", "2")
            .await
            .json();
        assert_eq!(first["entry"].as_array().unwrap().len(), 2);
        assert!(link(&first, "previous").is_none());

        let next = link(&first, "next").unwrap();
        assert!(next.contains("_sort=birthdate"));
        assert!(next.contains("_count=2&_offset=2"));

        let path = next.trim_start_matches("http://localhost:8080");
        let second: Value = server.get(path).await.json();
        assert_eq!(second["entry"].as_array().unwrap().len(), 1);
        assert!(link(&second, "next").is_none());
        assert!(link(&second, "previous").is_some());

        let mut all = entry_ids(&first);
        all.extend(entry_ids(&second));
        assert_eq!(all, vec!["patient-1", "patient-2", "patient-3"]);
    }

    #[tokio::test]
    async fn test_count_is_capped() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Patient")
            .add_query_param("_count", "5000")
            .await
            .json();

        let self_link = link(&bundle, "self").unwrap();
        assert!(self_link.contains("_count=100"));
    }
}

mod includes {
    use super::*;

    #[tokio::test]
    async fn test_include_adds_referenced_patient() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Observation")
            .add_query_param("code", "2339-0")
            .add_query_param("_include", "Observation:subject")
            .await
            .json();

        let entries = bundle["entry"].as_array().unwrap();
        let included: Vec<&Value> = entries
            .iter()
            .filter(|e| e["search"]["mode"] == "include")
            .collect();
        assert_eq!(included.len(), 1);
        assert_eq!(included[0]["resource"]["id"], "patient-1");
        assert_eq!(bundle["total"], 2);
    }

    #[tokio::test]
    async fn test_revinclude_adds_referring_observations() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Patient")
            .add_query_param("_id", "patient-1")
            .add_query_param("_revinclude", "Observation:subject")
            .await
            .json();

        let mut refs = entry_refs(&bundle);
        refs.sort();
        assert_eq!(
            refs,
            vec!["Observation/obs-1", "Observation/obs-2", "Patient/patient-1"]
        );
    }
}

mod subsetting {
    use super::*;

    #[tokio::test]
    async fn test_summary_count_has_no_entries() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Observation")
            .add_query_param("_summary", "count")
            .await
            .json();

        assert_eq!(bundle["total"], 3);
        assert!(bundle.get("entry").is_none());
    }

    #[tokio::test]
    async fn test_elements_trims_entries() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Patient")
            .add_query_param("_id", "patient-1")
            .add_query_param("_elements", "gender")
            .await
            .json();

        let resource = &bundle["entry"][0]["resource"];
        assert_eq!(resource["gender"], "male");
        assert!(resource.get("name").is_none());
        assert!(resource.get("birthDate").is_none());
    }
}

mod everything {
    use super::*;

    #[tokio::test]
    async fn test_everything_starts_with_subject() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let response = server.get("/Patient/patient-1/$everything").await;

        response.assert_status_ok();
        let bundle: Value = response.json();
        assert_eq!(bundle["type"], "searchset");

        let refs = entry_refs(&bundle);
        assert_eq!(refs[0], "Patient/patient-1");
        for expected in ["Observation/obs-1", "Observation/obs-2", "Encounter/enc-1"] {
            assert!(refs.contains(&expected.to_string()), "missing {expected}");
        }
        assert!(!refs.contains(&"Observation/obs-3".to_string()));
    }

    #[tokio::test]
    async fn test_everything_type_filter_and_paging() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        let bundle: Value = server
            .get("/Patient/patient-1/$everything")
            .add_query_param("_type", "Observation")
            .add_query_param("_count", "2")
            .await
            .json();

        assert_eq!(bundle["total"], 3);
        assert_eq!(bundle["entry"].as_array().unwrap().len(), 2);
        let next = link(&bundle, "next").unwrap();
        assert!(next.contains("_type=Observation"));
        assert!(next.contains("_offset=2"));
    }

    #[tokio::test]
    async fn test_everything_missing_subject_is_404() {
        let (server, _backend) = create_test_server();

        server
            .get("/Patient/nobody/$everything")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_everything_without_compartment_is_400() {
        let (server, backend) = create_test_server();
        seed_search_test_data(&backend).await;

        server
            .get("/Observation/obs-1/$everything")
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}

mod bundles {
    use super::*;

    #[tokio::test]
    async fn test_transaction_creates_and_links() {
        let (server, backend) = create_test_server();

        let bundle = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "fullUrl": "urn:uuid:a0c2b8f1-4f57-4a33-9d6c-3f0e5b1c7d21",
                    "resource": {"resourceType": "Patient", "name": [{"family": "Bundled"}]},
                    "request": {"method": "POST", "url": "Patient"}
                },
                {
                    "resource": {
                        "resourceType": "Observation",
                        "status": "final",
                        "code": {"text": "weight"},
                        "subject": {"reference": "urn:uuid:a0c2b8f1-4f57-4a33-9d6c-3f0e5b1c7d21"}
                    },
                    "request": {"method": "POST", "url": "Observation"}
                }
            ]
        });

        let response = server.post("/").json(&bundle).await;

        response.assert_status_ok();
        let result: Value = response.json();
        assert_eq!(result["type"], "transaction-response");
        let entries = result["entry"].as_array().unwrap();
        assert_eq!(entries[0]["response"]["status"], "201 Created");
        assert_eq!(entries[1]["response"]["status"], "201 Created");

        let patient_id = entries[0]["resource"]["id"].as_str().unwrap();
        assert_eq!(
            entries[1]["resource"]["subject"]["reference"],
            format!("Patient/{patient_id}")
        );
        assert_eq!(backend.count(None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_transaction_writes_nothing() {
        let (server, backend) = create_test_server();

        let bundle = json!({
            "resourceType": "Bundle",
            "type": "transaction",
            "entry": [
                {
                    "resource": {"resourceType": "Patient", "id": "kept-out"},
                    "request": {"method": "PUT", "url": "Patient/kept-out"}
                },
                {
                    "request": {"method": "DELETE", "url": "Patient/never-existed"}
                }
            ]
        });

        let response = server.post("/").json(&bundle).await;

        response.assert_status(StatusCode::BAD_REQUEST);
        let outcome: Value = response.json();
        assert_eq!(outcome["resourceType"], "OperationOutcome");
        assert!(!outcome["issue"].as_array().unwrap().is_empty());
        assert!(backend.read("Patient", "kept-out").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batch_reports_each_entry() {
        let (server, backend) = create_test_server();
        seed(&backend, vec![patient("existing", "Smith", None)]).await;

        let bundle = json!({
            "resourceType": "Bundle",
            "type": "batch",
            "entry": [
                {
                    "request": {"method": "GET", "url": "Patient/existing"}
                },
                {
                    "request": {"method": "GET", "url": "Patient/missing"}
                },
                {
                    "resource": {"resourceType": "Patient", "id": "new"},
                    "request": {"method": "PUT", "url": "Patient/new"}
                }
            ]
        });

        let response = server.post("/").json(&bundle).await;

        response.assert_status_ok();
        let result: Value = response.json();
        assert_eq!(result["type"], "batch-response");
        let statuses: Vec<&str> = result["entry"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["response"]["status"].as_str())
            .collect();
        assert_eq!(statuses, vec!["200 OK", "404 Not Found", "201 Created"]);
    }

    #[tokio::test]
    async fn test_non_bundle_body_is_400() {
        let (server, _backend) = create_test_server();

        server
            .post("/")
            .json(&json!({"resourceType": "Patient"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        server
            .post("/")
            .json(&json!({"resourceType": "Bundle", "type": "searchset"}))
            .await
            .assert_status(StatusCode::BAD_REQUEST);
    }
}
