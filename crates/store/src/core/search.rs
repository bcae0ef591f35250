//! Search provider traits.
//!
//! - [`SearchProvider`] - single-type search through the index tables
//! - [`IncludeProvider`] - `_include` / `_revinclude` resolution
//! - [`CompartmentProvider`] - `$everything` over a compartment
//! - [`FacetProvider`] - distinct indexed values

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::catalog::ParamCatalog;
use crate::error::StorageResult;
use crate::types::{
    BundleEntry, IncludeDirective, Page, SearchBundle, SearchQuery, StoredResource,
};

use super::storage::ResourceStorage;

/// Result of a search: one page of matches plus included resources.
#[derive(Debug, Clone)]
pub struct SearchResults {
    /// The page of matching resources.
    pub resources: Page<StoredResource>,
    /// Resources added by `_include` / `_revinclude`.
    pub included: Vec<StoredResource>,
    /// Total number of matches, when requested.
    pub total: Option<u64>,
}

impl SearchResults {
    /// Creates search results from a page of matches.
    pub fn new(resources: Page<StoredResource>) -> Self {
        Self {
            resources,
            included: Vec::new(),
            total: None,
        }
    }

    /// Adds included resources.
    pub fn with_included(mut self, included: Vec<StoredResource>) -> Self {
        self.included = included;
        self
    }

    /// Sets the total.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Builds a `searchset` bundle.
    ///
    /// `search_url` is the absolute URL searched (e.g. `http://host/Patient`)
    /// and `base_query` the request query without `_count`/`_offset`.
    /// `project` is applied to every entry, match and include alike.
    pub fn to_bundle<F>(
        &self,
        base_url: &str,
        search_url: &str,
        base_query: &str,
        project: F,
    ) -> SearchBundle
    where
        F: Fn(&Value) -> Value,
    {
        let mut bundle = SearchBundle::new().with_paging_links(
            search_url,
            base_query,
            &self.resources.page_info,
        );
        if let Some(total) = self.total {
            bundle = bundle.with_total(total);
        }

        for resource in &self.resources.items {
            bundle = bundle.with_entry(BundleEntry::match_entry(
                format!("{}/{}", base_url, resource.url()),
                project(resource.content()),
            ));
        }
        for resource in &self.included {
            bundle = bundle.with_entry(BundleEntry::include_entry(
                format!("{}/{}", base_url, resource.url()),
                project(resource.content()),
            ));
        }

        bundle
    }
}

/// Basic search.
#[async_trait]
pub trait SearchProvider: ResourceStorage {
    /// Returns the catalog this backend indexes with.
    fn param_catalog(&self) -> Arc<ParamCatalog>;

    /// Executes a search query, resolving its include directives.
    async fn search(&self, query: &SearchQuery) -> StorageResult<SearchResults>;

    /// Counts matches without fetching documents.
    async fn search_count(&self, query: &SearchQuery) -> StorageResult<u64>;
}

/// `_include` and `_revinclude` resolution.
#[async_trait]
pub trait IncludeProvider: SearchProvider {
    /// Returns the resources the directives add to `matches`.
    ///
    /// Each `(type, id)` appears once and never duplicates a match. A failed
    /// lookup for one type is logged and contributes nothing.
    async fn resolve_includes(
        &self,
        matches: &[StoredResource],
        directives: &[IncludeDirective],
    ) -> StorageResult<Vec<StoredResource>>;
}

/// Parameters for `$everything`.
#[derive(Debug, Clone, Default)]
pub struct EverythingParams {
    /// Only members updated after this instant (the subject is always returned).
    pub since: Option<DateTime<Utc>>,
    /// Restricts members to these resource types.
    pub types: Vec<String>,
    /// Page size.
    pub count: Option<u32>,
    /// Index of the first entry.
    pub offset: u32,
}

/// Compartment traversal.
#[async_trait]
pub trait CompartmentProvider: SearchProvider {
    /// Returns the subject followed by every resource in its compartment.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - the subject does not exist
    async fn everything(
        &self,
        compartment_type: &str,
        id: &str,
        params: &EverythingParams,
    ) -> StorageResult<Page<StoredResource>>;
}

/// Distinct values for facets.
#[async_trait]
pub trait FacetProvider: Send + Sync {
    /// Returns up to `limit` distinct string or code values indexed for a parameter.
    async fn distinct_values(
        &self,
        resource_type: &str,
        param: &str,
        limit: usize,
    ) -> StorageResult<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PageInfo;
    use serde_json::json;

    #[test]
    fn test_to_bundle_projects_every_entry() {
        let matched = StoredResource::new("Patient", "1", json!({"resourceType": "Patient", "id": "1", "gender": "male"}));
        let included = StoredResource::new("Organization", "o", json!({"resourceType": "Organization", "id": "o"}));
        let results = SearchResults::new(Page::new(vec![matched], PageInfo::new(0, 10, 1, Some(1))))
            .with_included(vec![included])
            .with_total(1);

        let bundle = results.to_bundle("http://h", "http://h/Patient", "", |r| {
            json!({"resourceType": r["resourceType"], "id": r["id"]})
        });

        assert_eq!(bundle.total, Some(1));
        assert_eq!(bundle.entry.len(), 2);
        assert_eq!(bundle.entry[0].full_url.as_deref(), Some("http://h/Patient/1"));
        assert!(bundle.entry[0].resource.as_ref().is_some_and(|r| r.get("gender").is_none()));
        assert_eq!(bundle.entry[1].mode(), Some(crate::types::SearchEntryMode::Include));
        assert!(bundle.link_url("next").is_none());
    }
}
