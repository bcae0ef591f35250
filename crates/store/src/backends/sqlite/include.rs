//! `_include` / `_revinclude` resolution for SQLite.
//!
//! Each round first collects the referenced keys, one branch per forward
//! directive, then fetches every target type as its own branch and joins
//! the branches. A branch that fails or times out is logged and
//! contributes nothing.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::core::IncludeProvider;
use crate::error::StorageResult;
use crate::types::{IncludeDirective, IncludeType, StoredResource};

use super::backend::SqliteBackend;
use super::search::{SqlFragment, SqlParam, RESOURCE_COLUMNS};
use super::storage::{collect_resources, fetch_current_batch, ID_CHUNK_SIZE};

type ResourceKey = (String, String);

/// Referenced ids grouped by target type.
type TargetIds = BTreeMap<String, BTreeSet<String>>;

fn key_of(resource: &StoredResource) -> ResourceKey {
    (resource.resource_type().to_string(), resource.id().to_string())
}

/// Groups resource ids by type.
fn ids_by_type(resources: &[StoredResource]) -> BTreeMap<String, Vec<String>> {
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for resource in resources {
        grouped
            .entry(resource.resource_type().to_string())
            .or_default()
            .push(resource.id().to_string());
    }
    grouped
}

/// Restricts index rows to one reference parameter, or to every reference
/// parameter for `*`.
fn param_filter(alias: &str, directive: &IncludeDirective) -> SqlFragment {
    if directive.is_wildcard() {
        SqlFragment::new(format!(
            "{alias}.param_type = 'reference' AND {alias}.composite_group IS NULL"
        ))
    } else {
        SqlFragment::with_params(
            format!("{alias}.param_name = ?"),
            vec![SqlParam::string(&directive.search_param)],
        )
    }
}

fn id_list(ids: &[String]) -> SqlFragment {
    SqlFragment::with_params(
        vec!["?"; ids.len()].join(", "),
        ids.iter().map(SqlParam::string).collect(),
    )
}

/// Keeps the output of the branches that succeeded.
fn successful<T>(results: Vec<StorageResult<T>>) -> Vec<T> {
    results
        .into_iter()
        .filter_map(|result| match result {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Include branch failed; skipping");
                None
            }
        })
        .collect()
}

/// Collects the `(type, id)` targets that `sources` reference through one
/// forward directive.
fn forward_targets(
    conn: &Connection,
    directive: &IncludeDirective,
    sources: &[String],
) -> StorageResult<TargetIds> {
    let mut targets = TargetIds::new();
    for chunk in sources.chunks(ID_CHUNK_SIZE) {
        let ids = id_list(chunk);
        let mut filter = SqlFragment::with_params(
            format!(
                "si.resource_type = ? AND si.ref_type IS NOT NULL AND si.ref_id IS NOT NULL \
                 AND si.resource_id IN ({})",
                ids.sql
            ),
            std::iter::once(SqlParam::string(&directive.source_type))
                .chain(ids.params)
                .collect(),
        )
        .and(param_filter("si", directive));
        if let Some(target) = &directive.target_type {
            filter = filter.and(SqlFragment::with_params(
                "si.ref_type = ?",
                vec![SqlParam::string(target)],
            ));
        }
        let fragment = SqlFragment::with_params(
            format!(
                "SELECT DISTINCT si.ref_type, si.ref_id FROM search_index si WHERE {}",
                filter.sql
            ),
            filter.params,
        );

        let mut stmt = conn.prepare(&fragment.sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(fragment.params.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (target_type, target_id) = row?;
            targets.entry(target_type).or_default().insert(target_id);
        }
    }
    Ok(targets)
}

/// Selects resources of `directive.source_type` that reference any of `targets`.
fn reverse_sources(
    conn: &Connection,
    directive: &IncludeDirective,
    targets: &BTreeMap<String, Vec<String>>,
) -> StorageResult<Vec<StoredResource>> {
    let mut found = Vec::new();
    for (target_type, ids) in targets {
        if directive
            .target_type
            .as_deref()
            .is_some_and(|t| t != target_type)
        {
            continue;
        }
        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let list = id_list(chunk);
            let refs = SqlFragment::with_params(
                format!(
                    "si.resource_type = ? AND si.ref_type = ? AND si.ref_id IN ({})",
                    list.sql
                ),
                [
                    SqlParam::string(&directive.source_type),
                    SqlParam::string(target_type),
                ]
                .into_iter()
                .chain(list.params)
                .collect(),
            )
            .and(param_filter("si", directive));

            let sql = format!(
                "SELECT {RESOURCE_COLUMNS} FROM resources r \
                 WHERE r.resource_type = ? AND r.is_deleted = 0 \
                 AND r.id IN (SELECT si.resource_id FROM search_index si WHERE {}) \
                 ORDER BY r.id",
                refs.sql
            );
            let params = std::iter::once(SqlParam::string(&directive.source_type))
                .chain(refs.params)
                .collect::<Vec<_>>();
            let mut stmt = conn.prepare(&sql)?;
            found.extend(collect_resources(
                &mut stmt,
                rusqlite::params_from_iter(params.iter()),
            )?);
        }
    }
    Ok(found)
}

impl SqliteBackend {
    /// Resolves one round of directives against `frontier`.
    async fn include_round(
        &self,
        frontier: &[StoredResource],
        directives: &[&IncludeDirective],
    ) -> StorageResult<Vec<StoredResource>> {
        let by_type = ids_by_type(frontier);

        let mut collections: Vec<BoxFuture<'_, StorageResult<TargetIds>>> = Vec::new();
        for directive in directives
            .iter()
            .filter(|d| d.include_type == IncludeType::Include)
        {
            let Some(sources) = by_type.get(&directive.source_type) else {
                continue;
            };
            let directive = (*directive).clone();
            let sources = sources.clone();
            let branch = format!("_include:{}:{}", directive.source_type, directive.search_param);
            collections.push(
                self.fetch_branch(branch, move |conn| {
                    forward_targets(conn, &directive, &sources)
                })
                .boxed(),
            );
        }
        let mut targets = TargetIds::new();
        for collected in successful(join_all(collections).await) {
            for (target_type, ids) in collected {
                targets.entry(target_type).or_default().extend(ids);
            }
        }

        let mut branches: Vec<BoxFuture<'_, StorageResult<Vec<StoredResource>>>> = Vec::new();
        for (target_type, ids) in targets {
            let ids: Vec<String> = ids.into_iter().collect();
            let branch = format!("_include:{target_type}");
            branches.push(
                self.fetch_branch(branch, move |conn| {
                    fetch_current_batch(conn, &target_type, &ids)
                })
                .boxed(),
            );
        }
        for directive in directives
            .iter()
            .filter(|d| d.include_type == IncludeType::Revinclude)
        {
            let directive = (*directive).clone();
            let targets = by_type.clone();
            let branch = format!("_revinclude:{}:{}", directive.source_type, directive.search_param);
            branches.push(
                self.fetch_branch(branch, move |conn| {
                    reverse_sources(conn, &directive, &targets)
                })
                .boxed(),
            );
        }

        Ok(successful(join_all(branches).await)
            .into_iter()
            .flatten()
            .collect())
    }
}

#[async_trait]
impl IncludeProvider for SqliteBackend {
    async fn resolve_includes(
        &self,
        matches: &[StoredResource],
        directives: &[IncludeDirective],
    ) -> StorageResult<Vec<StoredResource>> {
        let mut seen: HashSet<ResourceKey> = matches.iter().map(key_of).collect();
        let mut included = Vec::new();
        let mut frontier = matches.to_vec();

        let all: Vec<&IncludeDirective> = directives.iter().collect();
        let iterating: Vec<&IncludeDirective> = directives.iter().filter(|d| d.iterate).collect();
        let max_depth = self.config().max_include_depth;

        for round in 0..=max_depth {
            let active = if round == 0 { &all } else { &iterating };
            if active.is_empty() || frontier.is_empty() {
                break;
            }

            let found = self.include_round(&frontier, active).await?;
            let fresh: Vec<StoredResource> = found
                .into_iter()
                .filter(|r| seen.insert(key_of(r)))
                .collect();
            debug!(round, added = fresh.len(), "Resolved include round");

            included.extend(fresh.iter().cloned());
            frontier = fresh;
        }

        Ok(included)
    }
}
