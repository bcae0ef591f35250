//! `$everything` over the compartment membership table.
//!
//! The subject comes first, then the members of each compartment type
//! (one branch per type), then the linked resources those members point
//! at. Failed branches yield nothing for their type.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use futures::future::join_all;
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::core::{CompartmentProvider, EverythingParams};
use crate::error::{ResourceError, StorageResult, ValidationError};
use crate::types::{format_instant, Page, StoredResource};

use super::backend::SqliteBackend;
use super::search::RESOURCE_COLUMNS;
use super::search_impl::DEFAULT_COUNT;
use super::storage::{collect_resources, fetch_current_batch, load_current, ID_CHUNK_SIZE};

/// Current members of one type in a compartment.
fn members_of_type(
    conn: &Connection,
    compartment_type: &str,
    compartment_id: &str,
    resource_type: &str,
    since: Option<&str>,
) -> StorageResult<Vec<StoredResource>> {
    let sql = format!(
        "SELECT {RESOURCE_COLUMNS} FROM resources r
         JOIN compartment_membership m
           ON m.resource_type = r.resource_type AND m.resource_id = r.id
         WHERE m.compartment_type = ?1 AND m.compartment_id = ?2 AND m.resource_type = ?3
           AND r.is_deleted = 0 AND (?4 IS NULL OR r.last_updated > ?4)
         ORDER BY r.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    collect_resources(
        &mut stmt,
        params![compartment_type, compartment_id, resource_type, since],
    )
}

/// Targets of `linked_types` referenced from `members`, grouped by type.
fn linked_targets(
    conn: &Connection,
    members: &[(String, String)],
    linked_types: &[String],
) -> StorageResult<BTreeMap<String, BTreeSet<String>>> {
    let mut targets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    if linked_types.is_empty() {
        return Ok(targets);
    }
    let mut stmt = conn.prepare_cached(
        "SELECT target_type, target_id FROM reference_edges
         WHERE source_type = ?1 AND source_id = ?2",
    )?;
    for (source_type, source_id) in members {
        let rows = stmt.query_map(params![source_type, source_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (target_type, target_id) = row?;
            if linked_types.contains(&target_type) {
                targets.entry(target_type).or_default().insert(target_id);
            }
        }
    }
    Ok(targets)
}

#[async_trait]
impl CompartmentProvider for SqliteBackend {
    async fn everything(
        &self,
        compartment_type: &str,
        id: &str,
        params: &EverythingParams,
    ) -> StorageResult<Page<StoredResource>> {
        let compartment = self.catalog().compartment(compartment_type).ok_or_else(|| {
            ValidationError::UnsupportedResourceType {
                resource_type: compartment_type.to_string(),
            }
        })?;

        let subject = {
            let conn = self.get_connection()?;
            load_current(&conn, compartment_type, id)?
        };
        let subject = match subject {
            Some(subject) if subject.is_deleted() => {
                return Err(ResourceError::Gone {
                    resource_type: compartment_type.to_string(),
                    id: id.to_string(),
                    deleted_at: Some(subject.last_updated()),
                }
                .into())
            }
            Some(subject) => subject,
            None => {
                return Err(ResourceError::NotFound {
                    resource_type: compartment_type.to_string(),
                    id: id.to_string(),
                }
                .into())
            }
        };

        let wanted = |resource_type: &str| {
            params.types.is_empty() || params.types.iter().any(|t| t == resource_type)
        };
        let since = params.since.map(format_instant);

        let member_types: Vec<String> = compartment
            .members
            .keys()
            .filter(|rt| wanted(rt))
            .cloned()
            .collect();
        let branches = member_types.iter().map(|member_type| {
            let ct = compartment_type.to_string();
            let cid = id.to_string();
            let rt = member_type.clone();
            let since = since.clone();
            self.fetch_branch(format!("$everything:{member_type}"), move |conn| {
                members_of_type(conn, &ct, &cid, &rt, since.as_deref())
            })
        });

        let mut seen: HashSet<(String, String)> = HashSet::new();
        seen.insert((compartment_type.to_string(), id.to_string()));
        let mut all = vec![subject];

        for (member_type, result) in member_types.iter().zip(join_all(branches).await) {
            match result {
                Ok(resources) => {
                    for resource in resources {
                        let key = (resource.resource_type().to_string(), resource.id().to_string());
                        if seen.insert(key) {
                            all.push(resource);
                        }
                    }
                }
                Err(e) => {
                    warn!(resource_type = %member_type, error = %e, "Compartment search failed; treating as empty")
                }
            }
        }

        // One more hop to the linked resources members point at.
        let linked: Vec<String> = compartment
            .linked_types
            .iter()
            .filter(|rt| wanted(rt))
            .cloned()
            .collect();
        let member_keys: Vec<(String, String)> = all
            .iter()
            .skip(1)
            .map(|r| (r.resource_type().to_string(), r.id().to_string()))
            .collect();
        let targets = match self.get_connection() {
            Ok(conn) => linked_targets(&conn, &member_keys, &linked).unwrap_or_else(|e| {
                warn!(error = %e, "Secondary reference lookup failed; skipping");
                BTreeMap::new()
            }),
            Err(e) => {
                warn!(error = %e, "Secondary reference lookup failed; skipping");
                BTreeMap::new()
            }
        };

        let hops = targets.into_iter().map(|(target_type, ids)| {
            let ids: Vec<String> = ids
                .into_iter()
                .filter(|tid| !seen.contains(&(target_type.clone(), tid.clone())))
                .collect();
            let branch = format!("$everything:linked:{target_type}");
            self.fetch_branch(branch, move |conn| {
                let mut found = Vec::new();
                for chunk in ids.chunks(ID_CHUNK_SIZE) {
                    found.extend(fetch_current_batch(conn, &target_type, chunk)?);
                }
                Ok(found)
            })
        });
        for result in join_all(hops.collect::<Vec<_>>()).await {
            match result {
                Ok(resources) => {
                    for resource in resources {
                        let key = (resource.resource_type().to_string(), resource.id().to_string());
                        if seen.insert(key) {
                            all.push(resource);
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Linked resource fetch failed; skipping"),
            }
        }

        debug!(compartment_type, id, entries = all.len(), "Assembled $everything");
        Ok(Page::from_slice(
            all,
            params.offset,
            params.count.unwrap_or(DEFAULT_COUNT),
        ))
    }
}
