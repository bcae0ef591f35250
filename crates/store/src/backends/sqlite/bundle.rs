//! Transaction and batch bundles for SQLite.
//!
//! A transaction runs every entry on one connection inside one `IMMEDIATE`
//! transaction. Entries execute in method order (deletes, creates,
//! updates, reads) while `urn:uuid:` placeholders are assigned up front in
//! bundle order. A conditional create may resolve its placeholder to an
//! existing resource, so every entry that mentions such a placeholder runs
//! after it. Every failure is collected; if there is any, the transaction
//! rolls back and the failures are reported together.
//!
//! A batch runs each entry in its own transaction and reports a status per
//! entry.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::{
    BundleEntry, BundleEntryResult, BundleMethod, BundleProvider, BundleResult, BundleType,
    SearchResults,
};
use crate::error::{
    operation_outcome, ConcurrencyError, EntryFailure, ResourceError, StorageError, StorageResult,
    TransactionError, ValidationError,
};
use crate::search::{is_resource_type_name, parse_query_string};
use crate::types::{Page, PageInfo, StoredResource};

use super::backend::SqliteBackend;
use super::search_impl::{execute_search_in, DEFAULT_COUNT};
use super::storage::{load_current, load_version};

const PLACEHOLDER_PREFIX: &str = "urn:uuid:";

/// What an entry URL addresses.
#[derive(Debug, Clone, PartialEq)]
struct EntryTarget {
    resource_type: String,
    id: Option<String>,
    version: Option<u64>,
    query: Option<String>,
}

impl EntryTarget {
    fn parse(url: &str) -> StorageResult<Self> {
        let invalid = |message: &str| {
            StorageError::Validation(ValidationError::InvalidReference {
                reference: url.to_string(),
                message: message.to_string(),
            })
        };

        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (url, None),
        };
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        let (resource_type, id, version) = match segments.as_slice() {
            [rt] => (*rt, None, None),
            [rt, id] => (*rt, Some(*id), None),
            [rt, id, "_history", version] => {
                let version = version
                    .parse::<u64>()
                    .map_err(|_| invalid("version must be a number"))?;
                (*rt, Some(*id), Some(version))
            }
            _ => return Err(invalid("expected Type, Type/id or Type/id/_history/version")),
        };
        if !is_resource_type_name(resource_type) {
            return Err(invalid("unknown resource type"));
        }
        Ok(Self {
            resource_type: resource_type.to_string(),
            id: id.map(str::to_string),
            version,
            query,
        })
    }

    fn require_id(&self) -> StorageResult<&str> {
        self.id.as_deref().ok_or_else(|| {
            StorageError::Validation(ValidationError::InvalidReference {
                reference: self.resource_type.clone(),
                message: "this operation needs Type/id".to_string(),
            })
        })
    }
}

/// Replaces placeholder strings anywhere in a document.
fn substitute(value: &mut Value, placeholders: &HashMap<String, String>) {
    match value {
        Value::String(s) => {
            if let Some(resolved) = placeholders.get(s.as_str()) {
                *s = resolved.clone();
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute(v, placeholders)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute(v, placeholders)),
        _ => {}
    }
}

/// Finds a `reference` that is still a placeholder.
fn unresolved_reference(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(unresolved_reference),
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("reference") {
                if reference.starts_with(PLACEHOLDER_PREFIX) {
                    return Some(reference.clone());
                }
            }
            map.values().find_map(unresolved_reference)
        }
        _ => None,
    }
}

fn missing_resource() -> StorageError {
    StorageError::Validation(ValidationError::MissingRequiredField {
        field: "resource".to_string(),
    })
}

/// The result of one entry plus the key of the resource it produced.
struct EntryOutcome {
    result: BundleEntryResult,
    produced: Option<(String, String)>,
}

impl EntryOutcome {
    fn with_resource(result: BundleEntryResult, resource: &StoredResource) -> Self {
        Self {
            result,
            produced: Some((resource.resource_type().to_string(), resource.id().to_string())),
        }
    }

    fn plain(result: BundleEntryResult) -> Self {
        Self {
            result,
            produced: None,
        }
    }
}

impl SqliteBackend {
    /// Executes one entry on an open connection.
    fn execute_entry(&self, conn: &Connection, entry: &BundleEntry) -> StorageResult<EntryOutcome> {
        let target = EntryTarget::parse(&entry.url)?;
        match entry.method {
            BundleMethod::Get => self.execute_read(conn, &target),
            BundleMethod::Post => {
                let body = entry.resource.clone().ok_or_else(missing_resource)?;
                if let Some(criteria) = entry.if_none_exist.as_deref() {
                    if let Some(existing) =
                        self.find_conditional_match(conn, &target.resource_type, criteria)?
                    {
                        return Ok(EntryOutcome::with_resource(
                            BundleEntryResult::ok(existing.clone()),
                            &existing,
                        ));
                    }
                }
                let created = self.create_in(conn, &target.resource_type, body)?;
                Ok(EntryOutcome::with_resource(
                    BundleEntryResult::created(created.clone()),
                    &created,
                ))
            }
            BundleMethod::Put => {
                let id = target.require_id()?;
                let body = entry.resource.clone().ok_or_else(missing_resource)?;
                let (stored, created) = self.create_or_update_in(
                    conn,
                    &target.resource_type,
                    id,
                    body,
                    entry.if_match.as_deref(),
                )?;
                let result = if created {
                    BundleEntryResult::created(stored.clone())
                } else {
                    BundleEntryResult::updated(stored.clone())
                };
                Ok(EntryOutcome::with_resource(result, &stored))
            }
            BundleMethod::Patch => {
                let id = target.require_id()?;
                let patch = entry.resource.as_ref().ok_or_else(missing_resource)?;
                let stored = self.patch_in(
                    conn,
                    &target.resource_type,
                    id,
                    patch,
                    entry.if_match.as_deref(),
                )?;
                Ok(EntryOutcome::with_resource(
                    BundleEntryResult::updated(stored.clone()),
                    &stored,
                ))
            }
            BundleMethod::Delete => {
                let id = target.require_id()?;
                self.delete_in(conn, &target.resource_type, id)?;
                Ok(EntryOutcome::plain(BundleEntryResult::deleted()))
            }
        }
    }

    fn execute_read(&self, conn: &Connection, target: &EntryTarget) -> StorageResult<EntryOutcome> {
        match (&target.id, target.version) {
            (Some(id), Some(version)) => {
                let stored = load_version(conn, &target.resource_type, id, version)?;
                Ok(EntryOutcome::plain(BundleEntryResult::ok(stored)))
            }
            (Some(id), None) => match load_current(conn, &target.resource_type, id)? {
                Some(stored) if stored.is_deleted() => Err(ResourceError::Gone {
                    resource_type: target.resource_type.clone(),
                    id: id.clone(),
                    deleted_at: Some(stored.last_updated()),
                }
                .into()),
                Some(stored) => Ok(EntryOutcome::plain(BundleEntryResult::ok(stored))),
                None => Err(ResourceError::NotFound {
                    resource_type: target.resource_type.clone(),
                    id: id.clone(),
                }
                .into()),
            },
            (None, _) => {
                let query_string = target.query.as_deref().unwrap_or_default();
                let query = self
                    .translator()
                    .translate_query_string(&target.resource_type, query_string)?;
                let (resources, total) = execute_search_in(conn, self.catalog(), &query)?;
                let offset = query.offset.unwrap_or(0);
                let count = query.count.unwrap_or(DEFAULT_COUNT);
                let info = PageInfo::new(offset, count, resources.len(), total);
                let mut results = SearchResults::new(Page::new(resources, info));
                if let Some(total) = total {
                    results = results.with_total(total);
                }
                let bundle = results.to_bundle(
                    "",
                    &target.resource_type,
                    query_string,
                    Value::clone,
                );
                Ok(EntryOutcome::plain(BundleEntryResult::ok_body(bundle.to_json())))
            }
        }
    }

    /// Returns the single match of a conditional create, or `None` when
    /// nothing matches.
    fn find_conditional_match(
        &self,
        conn: &Connection,
        resource_type: &str,
        criteria: &str,
    ) -> StorageResult<Option<StoredResource>> {
        if parse_query_string(criteria).is_empty() {
            return Err(ValidationError::invalid_field(
                "ifNoneExist",
                "conditional create needs search criteria",
            )
            .into());
        }
        let mut query = self.translator().translate_query_string(resource_type, criteria)?;
        query.count = Some(2);
        query.offset = None;
        let (mut matches, _) = execute_search_in(conn, self.catalog(), &query)?;
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches.remove(0))),
            count => Err(ConcurrencyError::MultipleMatches {
                operation: "create".to_string(),
                count,
            }
            .into()),
        }
    }
}

/// Assigns a server id to every POST entry with a placeholder `fullUrl`.
fn assign_placeholders(entries: &[BundleEntry]) -> StorageResult<HashMap<String, String>> {
    let mut placeholders = HashMap::new();
    for (index, entry) in entries.iter().enumerate() {
        let Some(full_url) = entry.full_url.as_deref() else {
            continue;
        };
        if entry.method != BundleMethod::Post || !full_url.starts_with(PLACEHOLDER_PREFIX) {
            continue;
        }
        let target = EntryTarget::parse(&entry.url)?;
        let id = uuid::Uuid::new_v4().to_string();
        if placeholders
            .insert(full_url.to_string(), format!("{}/{id}", target.resource_type))
            .is_some()
        {
            return Err(TransactionError::InvalidBundle {
                message: format!("entry {index}: duplicate fullUrl {full_url}"),
            }
            .into());
        }
    }
    Ok(placeholders)
}

/// Returns `true` if any string in the document equals `placeholder`.
fn mentions(value: &Value, placeholder: &str) -> bool {
    match value {
        Value::String(s) => s == placeholder,
        Value::Array(items) => items.iter().any(|v| mentions(v, placeholder)),
        Value::Object(map) => map.values().any(|v| mentions(v, placeholder)),
        _ => false,
    }
}

fn entry_mentions(entry: &BundleEntry, placeholder: &str) -> bool {
    entry.url.contains(placeholder)
        || entry
            .if_none_exist
            .as_deref()
            .is_some_and(|criteria| criteria.contains(placeholder))
        || entry
            .resource
            .as_ref()
            .is_some_and(|body| mentions(body, placeholder))
}

/// Orders transaction entries for execution.
///
/// Method order, then bundle order, except that an entry mentioning the
/// placeholder of a conditional create waits until that create has run.
fn execution_order(entries: &[BundleEntry]) -> StorageResult<Vec<usize>> {
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
    let mut pending = vec![0usize; entries.len()];
    for (owner, entry) in entries.iter().enumerate() {
        if entry.method != BundleMethod::Post || entry.if_none_exist.is_none() {
            continue;
        }
        let Some(full_url) = entry
            .full_url
            .as_deref()
            .filter(|url| url.starts_with(PLACEHOLDER_PREFIX))
        else {
            continue;
        };
        for (index, other) in entries.iter().enumerate() {
            if index != owner && entry_mentions(other, full_url) {
                dependents[owner].push(index);
                pending[index] += 1;
            }
        }
    }

    let key = |i: usize| (entries[i].method.transaction_order(), i);
    let mut ready: BTreeSet<(u8, usize)> = (0..entries.len())
        .filter(|&i| pending[i] == 0)
        .map(key)
        .collect();
    let mut order = Vec::with_capacity(entries.len());
    while let Some((_, index)) = ready.pop_first() {
        order.push(index);
        for &dependent in &dependents[index] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(key(dependent));
            }
        }
    }

    if order.len() < entries.len() {
        let cycle: Vec<String> = (0..entries.len())
            .filter(|&i| pending[i] > 0)
            .map(|i| i.to_string())
            .collect();
        return Err(TransactionError::InvalidBundle {
            message: format!(
                "conditional creates at entries {} refer to each other's placeholders",
                cycle.join(", ")
            ),
        }
        .into());
    }
    Ok(order)
}

/// Rewrites an entry with every known placeholder resolved.
fn resolve_entry(
    index: usize,
    entry: &BundleEntry,
    placeholders: &HashMap<String, String>,
) -> StorageResult<BundleEntry> {
    let mut resolved = entry.clone();
    for (placeholder, reference) in placeholders {
        if resolved.url.contains(placeholder.as_str()) {
            resolved.url = resolved.url.replace(placeholder.as_str(), reference);
        }
    }
    if let Some(criteria) = resolved.if_none_exist.as_mut() {
        for (placeholder, reference) in placeholders {
            *criteria = criteria.replace(placeholder.as_str(), reference);
        }
    }

    if let Some(body) = resolved.resource.as_mut() {
        substitute(body, placeholders);
        if let Some(placeholder) = unresolved_reference(body) {
            return Err(TransactionError::UnresolvedPlaceholder { index, placeholder }.into());
        }
        // A created entry takes the id its placeholder was assigned.
        if entry.method == BundleMethod::Post {
            let assigned = entry
                .full_url
                .as_deref()
                .and_then(|full_url| placeholders.get(full_url))
                .and_then(|reference| reference.split_once('/'))
                .map(|(_, id)| id.to_string());
            if let (Some(id), Some(object)) = (assigned, body.as_object_mut()) {
                object.insert("id".to_string(), Value::String(id));
            }
        }
    }
    Ok(resolved)
}

fn entry_error(error: &StorageError) -> BundleEntryResult {
    BundleEntryResult::error(error.http_status(), operation_outcome(&error.to_issues()))
}

#[async_trait]
impl BundleProvider for SqliteBackend {
    async fn process_transaction(&self, entries: Vec<BundleEntry>) -> StorageResult<BundleResult> {
        let mut placeholders = assign_placeholders(&entries)?;
        let order = execution_order(&entries)?;

        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut results: Vec<Option<BundleEntryResult>> = vec![None; entries.len()];
        let mut failures = Vec::new();

        for index in order {
            let outcome = resolve_entry(index, &entries[index], &placeholders)
                .and_then(|entry| self.execute_entry(&tx, &entry));
            match outcome {
                Ok(outcome) => {
                    // A conditional create that found a match repoints its placeholder.
                    if let (Some(full_url), Some((rt, id))) =
                        (entries[index].full_url.as_deref(), outcome.produced.as_ref())
                    {
                        if let Some(reference) = placeholders.get_mut(full_url) {
                            *reference = format!("{rt}/{id}");
                        }
                    }
                    results[index] = Some(outcome.result);
                }
                Err(e) => failures.push(EntryFailure {
                    index,
                    status: e.http_status(),
                    message: e.to_string(),
                }),
            }
        }

        if !failures.is_empty() {
            failures.sort_by_key(|f| f.index);
            tx.rollback()?;
            warn!(failed = failures.len(), "Transaction bundle rolled back");
            return Err(TransactionError::Aborted { failures }.into());
        }

        tx.commit()?;
        info!(entries = entries.len(), "Transaction bundle committed");

        Ok(BundleResult {
            bundle_type: BundleType::Transaction,
            entries: results.into_iter().flatten().collect(),
        })
    }

    async fn process_batch(&self, entries: Vec<BundleEntry>) -> StorageResult<BundleResult> {
        let mut results = Vec::with_capacity(entries.len());
        for (index, entry) in entries.iter().enumerate() {
            let result = match self.with_transaction(|conn| self.execute_entry(conn, entry)) {
                Ok(outcome) => outcome.result,
                Err(e) => {
                    debug!(index, error = %e, "Batch entry failed");
                    entry_error(&e)
                }
            };
            results.push(result);
        }

        Ok(BundleResult {
            bundle_type: BundleType::Batch,
            entries: results,
        })
    }
}
