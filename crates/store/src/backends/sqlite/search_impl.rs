//! SearchProvider and FacetProvider for SQLite.

use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::catalog::ParamCatalog;
use crate::core::{FacetProvider, IncludeProvider, SearchProvider, SearchResults};
use crate::error::StorageResult;
use crate::search::MAX_DISTINCT_VALUES;
use crate::types::{Page, PageInfo, SearchQuery, StoredResource, TotalMode};

use super::backend::SqliteBackend;
use super::search::{QueryBuilder, SqlFragment};
use super::storage::collect_resources;

/// Page size when a query carries no `_count`.
pub(crate) const DEFAULT_COUNT: u32 = 20;

fn count_matches(conn: &Connection, count: &SqlFragment) -> StorageResult<u64> {
    let total: i64 = conn.query_row(
        &count.sql,
        rusqlite::params_from_iter(count.params.iter()),
        |row| row.get(0),
    )?;
    Ok(u64::try_from(total).unwrap_or_default())
}

/// Runs one page of a search on an open connection.
///
/// The total is computed unless `_total=none`.
pub(crate) fn execute_search_in(
    conn: &Connection,
    catalog: &ParamCatalog,
    query: &SearchQuery,
) -> StorageResult<(Vec<StoredResource>, Option<u64>)> {
    let count = query.count.unwrap_or(DEFAULT_COUNT);
    let offset = query.offset.unwrap_or(0);
    let built = QueryBuilder::new(catalog).build(query, count, offset)?;

    let mut stmt = conn.prepare(&built.select.sql)?;
    let resources = collect_resources(
        &mut stmt,
        rusqlite::params_from_iter(built.select.params.iter()),
    )?;

    let total = match query.total {
        Some(TotalMode::None) => None,
        _ => Some(count_matches(conn, &built.count)?),
    };

    debug!(
        resource_type = %query.resource_type,
        returned = resources.len(),
        total = ?total,
        "Executed search"
    );
    Ok((resources, total))
}

/// Counts the matches of a search on an open connection.
pub(crate) fn count_search_in(
    conn: &Connection,
    catalog: &ParamCatalog,
    query: &SearchQuery,
) -> StorageResult<u64> {
    let filter = QueryBuilder::new(catalog).build_filter(query)?;
    let count = SqlFragment::with_params(
        format!("SELECT COUNT(*) FROM resources r WHERE {}", filter.sql),
        filter.params,
    );
    count_matches(conn, &count)
}

#[async_trait]
impl SearchProvider for SqliteBackend {
    fn param_catalog(&self) -> Arc<ParamCatalog> {
        Arc::clone(SqliteBackend::catalog(self))
    }

    async fn search(&self, query: &SearchQuery) -> StorageResult<SearchResults> {
        let count = query.count.unwrap_or(DEFAULT_COUNT);
        let offset = query.offset.unwrap_or(0);

        if query.is_count_only() {
            let total = self.search_count(query).await?;
            let page = Page::new(Vec::new(), PageInfo::new(offset, 0, 0, Some(total)));
            return Ok(SearchResults::new(page).with_total(total));
        }

        let (resources, total) = {
            let conn = self.get_connection()?;
            execute_search_in(&conn, self.catalog(), query)?
        };

        let included = if query.includes.is_empty() || resources.is_empty() {
            Vec::new()
        } else {
            self.resolve_includes(&resources, &query.includes).await?
        };

        let info = PageInfo::new(offset, count, resources.len(), total);
        let mut results = SearchResults::new(Page::new(resources, info)).with_included(included);
        if let Some(total) = total {
            results = results.with_total(total);
        }
        Ok(results)
    }

    async fn search_count(&self, query: &SearchQuery) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        count_search_in(&conn, self.catalog(), query)
    }
}

#[async_trait]
impl FacetProvider for SqliteBackend {
    async fn distinct_values(
        &self,
        resource_type: &str,
        param: &str,
        limit: usize,
    ) -> StorageResult<Vec<String>> {
        let rt = resource_type.to_string();
        let name = param.to_string();
        self.value_cache()
            .get_or_load(resource_type, param, limit, || {
                self.fetch_branch(format!("distinct:{rt}.{name}"), move |conn| {
                    let mut stmt = conn.prepare_cached(
                        "SELECT DISTINCT COALESCE(si.value_string, si.token_code, si.value_uri) AS v
                         FROM search_index si
                         JOIN resources r ON r.resource_type = si.resource_type AND r.id = si.resource_id
                         WHERE si.resource_type = ?1 AND si.param_name = ?2 AND r.is_deleted = 0
                           AND COALESCE(si.value_string, si.token_code, si.value_uri) IS NOT NULL
                         ORDER BY v
                         LIMIT ?3",
                    )?;
                    let values = stmt
                        .query_map(params![rt, name, MAX_DISTINCT_VALUES as i64], |row| {
                            row.get::<_, String>(0)
                        })?
                        .collect::<Result<Vec<_>, _>>()?;
                    Ok(values)
                })
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ResourceStorage;
    use crate::search::QueryTranslator;
    use serde_json::json;

    async fn seeded() -> SqliteBackend {
        let backend = SqliteBackend::in_memory().unwrap();
        backend.init_schema().unwrap();
        for (id, family, gender, birth) in [
            ("p1", "Smith", "male", Some("1970-05-01")),
            ("p2", "Smythe", "female", Some("1985-01-20")),
            ("p3", "Jones", "female", None),
        ] {
            let mut body = json!({
                "resourceType": "Patient",
                "id": id,
                "gender": gender,
                "name": [{"family": family}]
            });
            if let Some(birth) = birth {
                body["birthDate"] = json!(birth);
            }
            backend.create("Patient", body).await.unwrap();
        }
        backend
    }

    fn query(backend: &SqliteBackend, qs: &str) -> SearchQuery {
        QueryTranslator::new(Arc::clone(backend.catalog()))
            .translate_query_string("Patient", qs)
            .unwrap()
    }

    fn ids(results: &SearchResults) -> Vec<&str> {
        results.resources.items.iter().map(StoredResource::id).collect()
    }

    #[tokio::test]
    async fn test_string_prefix_search() {
        let backend = seeded().await;
        let results = backend.search(&query(&backend, "family=sm&_sort=_id")).await.unwrap();
        assert_eq!(ids(&results), vec!["p1", "p2"]);
        assert_eq!(results.total, Some(2));
    }

    #[tokio::test]
    async fn test_token_or_values() {
        let backend = seeded().await;
        let results = backend
            .search(&query(&backend, "gender=male,female&_sort=_id"))
            .await
            .unwrap();
        assert_eq!(results.total, Some(3));
    }

    #[tokio::test]
    async fn test_sort_descending_puts_missing_last() {
        let backend = seeded().await;
        let results = backend.search(&query(&backend, "_sort=-birthdate")).await.unwrap();
        assert_eq!(ids(&results), vec!["p2", "p1", "p3"]);
    }

    #[tokio::test]
    async fn test_missing_modifier() {
        let backend = seeded().await;
        let results = backend
            .search(&query(&backend, "birthdate:missing=true"))
            .await
            .unwrap();
        assert_eq!(ids(&results), vec!["p3"]);
    }

    #[tokio::test]
    async fn test_summary_count_returns_total_only() {
        let backend = seeded().await;
        let results = backend.search(&query(&backend, "_summary=count")).await.unwrap();
        assert!(results.resources.items.is_empty());
        assert_eq!(results.total, Some(3));
    }

    #[tokio::test]
    async fn test_total_none_omits_total() {
        let backend = seeded().await;
        let results = backend.search(&query(&backend, "_total=none")).await.unwrap();
        assert_eq!(results.total, None);
        assert_eq!(results.resources.items.len(), 3);
    }

    #[tokio::test]
    async fn test_pages_do_not_overlap() {
        let backend = seeded().await;
        let first = backend
            .search(&query(&backend, "_count=2&_sort=gender"))
            .await
            .unwrap();
        let second = backend
            .search(&query(&backend, "_count=2&_offset=2&_sort=gender"))
            .await
            .unwrap();
        assert!(first.resources.page_info.has_next);
        assert_eq!(first.resources.items.len(), 2);
        assert_eq!(second.resources.items.len(), 1);
        for r in &second.resources.items {
            assert!(!ids(&first).contains(&r.id()));
        }
    }

    #[tokio::test]
    async fn test_distinct_values() {
        let backend = seeded().await;
        let values = backend.distinct_values("Patient", "gender", 10).await.unwrap();
        assert_eq!(values, vec!["female", "male"]);
    }
}
