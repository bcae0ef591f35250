//! Bundles built at the REST layer.
//!
//! Searchset bundles come from the store
//! ([`SearchResults::to_bundle`](helios_store::core::SearchResults::to_bundle));
//! this module adds the query re-encoding for their links and the
//! `history` bundle.

use helios_store::types::{Page, ResourceMethod, SearchBundle, StoredResource};
use serde_json::{Value, json};

/// Re-encodes query pairs for paging links, dropping `_count` and `_offset`.
pub fn base_query_without_paging(pairs: &[(String, String)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (name, value) in pairs {
        if name != "_count" && name != "_offset" {
            serializer.append_pair(name, value);
        }
    }
    serializer.finish()
}

/// Builds a `history` bundle, newest version first.
///
/// Deletion markers carry a `request` and `response` but no `resource`.
pub fn history_bundle(base_url: &str, history_url: &str, page: &Page<StoredResource>) -> Value {
    let links = SearchBundle::new()
        .with_paging_links(history_url, "", &page.page_info)
        .link;

    let entries: Vec<Value> = page
        .items
        .iter()
        .map(|version| {
            let method = version.method();
            let (request_url, status) = match method {
                ResourceMethod::Post => (version.resource_type().to_string(), "201 Created"),
                ResourceMethod::Delete => (version.url(), "204 No Content"),
                ResourceMethod::Put | ResourceMethod::Patch => (version.url(), "200 OK"),
            };
            let mut entry = json!({
                "fullUrl": format!("{}/{}", base_url, version.url()),
                "request": {"method": method.as_str(), "url": request_url},
                "response": {
                    "status": status,
                    "etag": version.etag(),
                    "lastModified": version.last_updated_string(),
                },
            });
            if !version.is_deleted() {
                entry["resource"] = version.content().clone();
            }
            entry
        })
        .collect();

    let mut bundle = json!({
        "resourceType": "Bundle",
        "type": "history",
        "link": links,
        "entry": entries,
    });
    if let Some(total) = page.page_info.total {
        bundle["total"] = json!(total);
    }
    bundle
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_base_query_drops_paging() {
        let pairs = vec![
            ("name".to_string(), "Smith & Co".to_string()),
            ("_count".to_string(), "10".to_string()),
            ("_offset".to_string(), "20".to_string()),
            ("_sort".to_string(), "-birthdate".to_string()),
        ];
        assert_eq!(
            base_query_without_paging(&pairs),
            "name=Smith+%26+Co&_sort=-birthdate"
        );
    }

    #[test]
    fn test_history_bundle_shape() {
        let now = Utc::now();
        let versions = vec![
            StoredResource::from_storage(
                "Patient",
                "1",
                2,
                json!({"resourceType": "Patient", "id": "1"}),
                now,
                true,
                ResourceMethod::Delete,
            ),
            StoredResource::from_storage(
                "Patient",
                "1",
                1,
                json!({"resourceType": "Patient", "id": "1"}),
                now,
                false,
                ResourceMethod::Post,
            ),
        ];
        let page = Page::from_slice(versions, 0, 10);
        let bundle = history_bundle("http://h", "http://h/Patient/1/_history", &page);

        assert_eq!(bundle["type"], "history");
        assert_eq!(bundle["total"], 2);
        assert_eq!(bundle["entry"][0]["request"]["method"], "DELETE");
        assert!(bundle["entry"][0].get("resource").is_none());
        assert_eq!(bundle["entry"][1]["response"]["status"], "201 Created");
        assert_eq!(bundle["entry"][1]["resource"]["id"], "1");
    }
}
