//! Pagination and search bundle types.
//!
//! Paging is offset based: a page is `(offset, count)` over a result list
//! with a stable order (every sort ends with a tiebreak on the logical id),
//! so concatenating consecutive pages yields the unpaged result.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position of a page within a result list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageInfo {
    /// Index of the first item of this page.
    pub offset: u32,
    /// Requested page size.
    pub count: u32,
    /// Total number of matches, when computed.
    pub total: Option<u64>,
    /// Whether results exist after this page.
    pub has_next: bool,
}

impl PageInfo {
    /// Creates page info for a page that returned `returned` items.
    ///
    /// When the total is unknown, a full page is taken to mean there may be more.
    pub fn new(offset: u32, count: u32, returned: usize, total: Option<u64>) -> Self {
        let has_next = match total {
            Some(total) => u64::from(offset) + (returned as u64) < total,
            None => count > 0 && returned >= count as usize,
        };
        Self {
            offset,
            count,
            total,
            has_next,
        }
    }

    /// Returns `true` if this is not the first page.
    pub fn has_previous(&self) -> bool {
        self.offset > 0
    }

    /// Offset of the next page.
    pub fn next_offset(&self) -> Option<u32> {
        self.has_next.then(|| self.offset.saturating_add(self.count))
    }

    /// Offset of the previous page.
    pub fn previous_offset(&self) -> Option<u32> {
        self.has_previous()
            .then(|| self.offset.saturating_sub(self.count))
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    /// The items in this page.
    pub items: Vec<T>,
    /// Pagination information.
    pub page_info: PageInfo,
}

impl<T> Page<T> {
    /// Creates a page.
    pub fn new(items: Vec<T>, page_info: PageInfo) -> Self {
        Self { items, page_info }
    }

    /// Slices one page out of a complete, ordered list.
    pub fn from_slice(all: Vec<T>, offset: u32, count: u32) -> Self {
        let total = all.len() as u64;
        let items: Vec<T> = all
            .into_iter()
            .skip(offset as usize)
            .take(count as usize)
            .collect();
        let page_info = PageInfo::new(offset, count, items.len(), Some(total));
        Self { items, page_info }
    }

    /// Returns the number of items in this page.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if this page has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A FHIR Bundle of search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchBundle {
    /// Always `Bundle`.
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    /// Bundle type, `searchset` unless stated otherwise.
    #[serde(rename = "type")]
    pub bundle_type: String,
    /// Total number of matches.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Paging links.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link: Vec<BundleLink>,
    /// Entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
}

/// A link in a FHIR Bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLink {
    /// `self`, `first`, `previous` or `next`.
    pub relation: String,
    /// The URL.
    pub url: String,
}

/// An entry in a search Bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    /// Absolute URL of the resource.
    #[serde(rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    /// The resource.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<Value>,
    /// Search information.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<BundleEntrySearch>,
}

/// Search information for a bundle entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntrySearch {
    /// Why this entry is in the bundle.
    pub mode: SearchEntryMode,
}

/// Why an entry is in a search bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEntryMode {
    /// Matched the search parameters.
    Match,
    /// Added by `_include`, `_revinclude` or a compartment walk.
    Include,
    /// An OperationOutcome about the search.
    Outcome,
}

impl SearchBundle {
    /// Creates an empty `searchset` bundle.
    pub fn new() -> Self {
        Self {
            resource_type: "Bundle".to_string(),
            bundle_type: "searchset".to_string(),
            total: None,
            link: Vec::new(),
            entry: Vec::new(),
        }
    }

    /// Sets the total count.
    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Adds a link.
    pub fn with_link(mut self, relation: impl Into<String>, url: impl Into<String>) -> Self {
        self.link.push(BundleLink {
            relation: relation.into(),
            url: url.into(),
        });
        self
    }

    /// Adds an entry.
    pub fn with_entry(mut self, entry: BundleEntry) -> Self {
        self.entry.push(entry);
        self
    }

    /// Adds `self`, `first`, `previous` and `next` links for an offset page.
    ///
    /// `base_query` is the request query string without `_offset`/`_count`.
    pub fn with_paging_links(mut self, url: &str, base_query: &str, page: &PageInfo) -> Self {
        let link = |offset: u32| {
            let paging = format!("_count={}&_offset={}", page.count, offset);
            if base_query.is_empty() {
                format!("{url}?{paging}")
            } else {
                format!("{url}?{base_query}&{paging}")
            }
        };
        self = self.with_link("self", link(page.offset));
        self = self.with_link("first", link(0));
        if let Some(previous) = page.previous_offset() {
            self = self.with_link("previous", link(previous));
        }
        if let Some(next) = page.next_offset() {
            self = self.with_link("next", link(next));
        }
        self
    }

    /// Returns the URL of a link relation.
    pub fn link_url(&self, relation: &str) -> Option<&str> {
        self.link
            .iter()
            .find(|l| l.relation == relation)
            .map(|l| l.url.as_str())
    }

    /// Serializes the bundle to JSON.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl Default for SearchBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl BundleEntry {
    /// Creates a match entry.
    pub fn match_entry(full_url: impl Into<String>, resource: Value) -> Self {
        Self::with_mode(full_url, resource, SearchEntryMode::Match)
    }

    /// Creates an include entry.
    pub fn include_entry(full_url: impl Into<String>, resource: Value) -> Self {
        Self::with_mode(full_url, resource, SearchEntryMode::Include)
    }

    fn with_mode(full_url: impl Into<String>, resource: Value, mode: SearchEntryMode) -> Self {
        Self {
            full_url: Some(full_url.into()),
            resource: Some(resource),
            search: Some(BundleEntrySearch { mode }),
        }
    }

    /// Returns the entry's search mode.
    pub fn mode(&self) -> Option<SearchEntryMode> {
        self.search.as_ref().map(|s| s.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_info_with_total() {
        let first = PageInfo::new(0, 10, 10, Some(25));
        assert!(first.has_next);
        assert!(!first.has_previous());
        assert_eq!(first.next_offset(), Some(10));

        let last = PageInfo::new(20, 10, 5, Some(25));
        assert!(!last.has_next);
        assert_eq!(last.previous_offset(), Some(10));
    }

    #[test]
    fn test_page_info_without_total() {
        assert!(PageInfo::new(0, 10, 10, None).has_next);
        assert!(!PageInfo::new(0, 10, 3, None).has_next);
    }

    #[test]
    fn test_page_from_slice() {
        let page = Page::from_slice((0..7).collect::<Vec<_>>(), 5, 5);
        assert_eq!(page.items, vec![5, 6]);
        assert_eq!(page.page_info.total, Some(7));
        assert!(!page.page_info.has_next);
    }

    #[test]
    fn test_paging_links() {
        let page = PageInfo::new(10, 10, 10, Some(30));
        let bundle = SearchBundle::new().with_paging_links(
            "http://localhost/Patient",
            "name=smith",
            &page,
        );
        assert_eq!(
            bundle.link_url("next"),
            Some("http://localhost/Patient?name=smith&_count=10&_offset=20")
        );
        assert_eq!(
            bundle.link_url("previous"),
            Some("http://localhost/Patient?name=smith&_count=10&_offset=0")
        );
        assert!(bundle.link_url("first").is_some());
    }

    #[test]
    fn test_bundle_json_shape() {
        let bundle = SearchBundle::new().with_total(1).with_entry(BundleEntry::match_entry(
            "http://localhost/Patient/1",
            serde_json::json!({"resourceType": "Patient", "id": "1"}),
        ));
        let json = bundle.to_json();
        assert_eq!(json["resourceType"], "Bundle");
        assert_eq!(json["type"], "searchset");
        assert_eq!(json["total"], 1);
        assert_eq!(json["entry"][0]["search"]["mode"], "match");
        assert!(json.get("link").is_none());
    }
}
