//! ResourceStorage, VersionedStorage and ConditionalStorage for SQLite.
//!
//! Each write runs in one `IMMEDIATE` transaction: the current row, the
//! history row and the index rows change together. The `*_in` helpers take
//! an open connection so bundle processing can run many of them inside a
//! single transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::{
    ConditionalCreateResult, ConditionalStorage, HistoryParams, ResourceStorage, SearchProvider,
    VersionedStorage,
};
use crate::error::{
    ConcurrencyError, ResourceError, StorageError, StorageResult, ValidationError,
};
use crate::search::valid_id;
use crate::types::{format_instant, parse_etag, Page, PageInfo, ResourceMethod, StoredResource};

use super::backend::{SqliteBackend, BACKEND_NAME};
use super::search::RESOURCE_COLUMNS;
use super::writer::{clear_index, write_index};

/// Largest number of ids bound into one `IN (...)` list.
pub(crate) const ID_CHUNK_SIZE: usize = 500;

const DEFAULT_HISTORY_COUNT: u32 = 20;

/// A resource row as read from the database, before its body is parsed.
struct RawResource {
    resource_type: String,
    id: String,
    version_id: i64,
    data: String,
    last_updated: String,
    is_deleted: bool,
    method: Option<String>,
}

impl RawResource {
    /// Reads the columns selected by [`RESOURCE_COLUMNS`] (or the history
    /// equivalent), in that order.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            resource_type: row.get(0)?,
            id: row.get(1)?,
            version_id: row.get(2)?,
            data: row.get(3)?,
            last_updated: row.get(4)?,
            is_deleted: row.get::<_, i64>(5)? != 0,
            method: row.get(6)?,
        })
    }

    fn into_stored(self) -> StorageResult<StoredResource> {
        let content: Value = serde_json::from_str(&self.data)?;
        let last_updated = parse_timestamp(&self.last_updated)?;
        let method = match self.method.as_deref() {
            Some(method) => ResourceMethod::parse(method),
            None if self.version_id == 1 => ResourceMethod::Post,
            None => ResourceMethod::Put,
        };
        Ok(StoredResource::from_storage(
            self.resource_type,
            self.id,
            u64::try_from(self.version_id).unwrap_or_default(),
            content,
            last_updated,
            self.is_deleted,
            method,
        ))
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::internal(BACKEND_NAME, format!("bad timestamp '{value}': {e}")))
}

/// Maps a statement's rows to stored resources.
pub(crate) fn collect_resources(
    stmt: &mut rusqlite::Statement<'_>,
    params: impl rusqlite::Params,
) -> StorageResult<Vec<StoredResource>> {
    let raw = stmt
        .query_map(params, RawResource::from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    raw.into_iter().map(RawResource::into_stored).collect()
}

/// Loads the current row of a resource, deletion markers included.
pub(crate) fn load_current(
    conn: &Connection,
    resource_type: &str,
    id: &str,
) -> StorageResult<Option<StoredResource>> {
    let sql = format!(
        "SELECT {RESOURCE_COLUMNS} FROM resources r WHERE r.resource_type = ?1 AND r.id = ?2"
    );
    let raw = conn
        .query_row(&sql, params![resource_type, id], RawResource::from_row)
        .optional()?;
    raw.map(RawResource::into_stored).transpose()
}

/// Loads one historical version.
///
/// Fails with `VersionNotFound` when the resource exists without that
/// version and `NotFound` when it never existed.
pub(crate) fn load_version(
    conn: &Connection,
    resource_type: &str,
    id: &str,
    version_id: u64,
) -> StorageResult<StoredResource> {
    let raw = conn
        .query_row(
            "SELECT resource_type, id, version_id, data, last_updated, is_deleted, method
             FROM resource_history WHERE resource_type = ?1 AND id = ?2 AND version_id = ?3",
            params![resource_type, id, i64::try_from(version_id).unwrap_or(i64::MAX)],
            RawResource::from_row,
        )
        .optional()?;

    match raw {
        Some(raw) => raw.into_stored(),
        None if load_current(conn, resource_type, id)?.is_some() => {
            Err(ResourceError::VersionNotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                version_id: version_id.to_string(),
            }
            .into())
        }
        None => Err(not_found(resource_type, id)),
    }
}

/// Loads current, non-deleted resources of one type, in the order of `ids`.
pub(crate) fn fetch_current_batch(
    conn: &Connection,
    resource_type: &str,
    ids: &[String],
) -> StorageResult<Vec<StoredResource>> {
    let mut found = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(ID_CHUNK_SIZE) {
        let placeholders = vec!["?"; chunk.len()].join(", ");
        let sql = format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources r \
             WHERE r.resource_type = ? AND r.is_deleted = 0 AND r.id IN ({placeholders})"
        );
        let mut stmt = conn.prepare(&sql)?;
        let bound = std::iter::once(resource_type).chain(chunk.iter().map(String::as_str));
        found.extend(collect_resources(
            &mut stmt,
            rusqlite::params_from_iter(bound),
        )?);
    }

    let mut ordered = Vec::with_capacity(found.len());
    for id in ids {
        if let Some(pos) = found.iter().position(|r| r.id() == id) {
            ordered.push(found.swap_remove(pos));
        }
    }
    Ok(ordered)
}

/// Checks a body before it is written under `resource_type`.
pub(crate) fn validate_body(resource_type: &str, body: &Value) -> StorageResult<()> {
    let object = body.as_object().ok_or_else(|| {
        ValidationError::invalid_field(resource_type, "resource must be a JSON object")
    })?;
    match object.get("resourceType").and_then(Value::as_str) {
        Some(found) if found == resource_type => {}
        Some(found) => {
            return Err(ValidationError::invalid_field(
                "resourceType",
                format!("resourceType '{found}' does not match '{resource_type}'"),
            )
            .into())
        }
        None => {
            return Err(
                ValidationError::invalid_field("resourceType", "resourceType is required").into(),
            )
        }
    }
    if let Some(id) = object.get("id") {
        match id.as_str() {
            Some(id) if valid_id(id) => {}
            _ => {
                return Err(ValidationError::invalid_field(
                    format!("{resource_type}.id"),
                    format!("invalid id {id}"),
                )
                .into())
            }
        }
    }
    Ok(())
}

fn check_body_id(resource_type: &str, id: &str, body: &Value) -> StorageResult<()> {
    match body.get("id").and_then(Value::as_str) {
        Some(body_id) if body_id != id => Err(ValidationError::invalid_field(
            format!("{resource_type}.id"),
            format!("body id '{body_id}' does not match '{id}'"),
        )
        .into()),
        _ => Ok(()),
    }
}

fn check_if_match(current: &StoredResource, if_match: Option<&str>) -> StorageResult<()> {
    let Some(expected) = if_match else {
        return Ok(());
    };
    if current.matches_etag(expected) {
        return Ok(());
    }
    Err(ConcurrencyError::VersionConflict {
        resource_type: current.resource_type().to_string(),
        id: current.id().to_string(),
        expected_version: parse_etag(expected)
            .map(|v| v.to_string())
            .unwrap_or_else(|| expected.to_string()),
        actual_version: current.version_id().to_string(),
    }
    .into())
}

fn not_found(resource_type: &str, id: &str) -> StorageError {
    ResourceError::NotFound {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
    }
    .into()
}

impl SqliteBackend {
    /// Writes `body` as `version` of a resource and rebuilds its index.
    fn store_version(
        &self,
        conn: &Connection,
        resource_type: &str,
        id: &str,
        version: u64,
        mut body: Value,
        method: ResourceMethod,
    ) -> StorageResult<StoredResource> {
        let now = Utc::now();
        let last_updated = format_instant(now);

        if let Some(object) = body.as_object_mut() {
            object.insert("id".to_string(), Value::String(id.to_string()));
            let meta = object
                .entry("meta")
                .or_insert_with(|| Value::Object(Default::default()));
            if !meta.is_object() {
                *meta = Value::Object(Default::default());
            }
            if let Some(meta) = meta.as_object_mut() {
                meta.insert("versionId".to_string(), Value::String(version.to_string()));
                meta.insert("lastUpdated".to_string(), Value::String(last_updated.clone()));
            }
        }

        let data = serde_json::to_string(&body)?;
        let version_i64 = i64::try_from(version)
            .map_err(|_| StorageError::internal(BACKEND_NAME, "version overflow"))?;

        conn.execute(
            "INSERT INTO resources (resource_type, id, version_id, data, last_updated, is_deleted, deleted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL)
             ON CONFLICT (resource_type, id) DO UPDATE SET
                 version_id = excluded.version_id,
                 data = excluded.data,
                 last_updated = excluded.last_updated,
                 is_deleted = 0,
                 deleted_at = NULL",
            params![resource_type, id, version_i64, data, last_updated],
        )?;
        conn.execute(
            "INSERT INTO resource_history (resource_type, id, version_id, data, last_updated, is_deleted, method)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
            params![resource_type, id, version_i64, data, last_updated, method.as_str()],
        )?;

        self.index_document(conn, resource_type, id, &body)?;

        debug!(resource_type, id, version, method = %method, "Stored resource version");
        Ok(StoredResource::from_storage(
            resource_type,
            id,
            version,
            body,
            now,
            false,
            method,
        ))
    }

    /// Replaces the index rows, edges and memberships of one resource.
    pub(crate) fn index_document(
        &self,
        conn: &Connection,
        resource_type: &str,
        id: &str,
        body: &Value,
    ) -> StorageResult<()> {
        clear_index(conn, resource_type, id)?;
        let document = self.extractor().extract(resource_type, body).map_err(|e| {
            StorageError::Validation(ValidationError::InvalidResource {
                message: e.to_string(),
                details: Vec::new(),
            })
        })?;
        write_index(conn, resource_type, id, &document)
    }

    /// Creates a resource on an open connection.
    pub(crate) fn create_in(
        &self,
        conn: &Connection,
        resource_type: &str,
        body: Value,
    ) -> StorageResult<StoredResource> {
        validate_body(resource_type, &body)?;
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if load_current(conn, resource_type, &id)?.is_some() {
            return Err(ResourceError::AlreadyExists {
                resource_type: resource_type.to_string(),
                id,
            }
            .into());
        }

        self.store_version(conn, resource_type, &id, 1, body, ResourceMethod::Post)
    }

    /// Updates (or resurrects) a resource on an open connection.
    pub(crate) fn update_in(
        &self,
        conn: &Connection,
        resource_type: &str,
        id: &str,
        body: Value,
        if_match: Option<&str>,
    ) -> StorageResult<StoredResource> {
        validate_body(resource_type, &body)?;
        check_body_id(resource_type, id, &body)?;
        let current =
            load_current(conn, resource_type, id)?.ok_or_else(|| not_found(resource_type, id))?;
        check_if_match(&current, if_match)?;
        self.store_version(
            conn,
            resource_type,
            id,
            current.version_id() + 1,
            body,
            ResourceMethod::Put,
        )
    }

    /// PUT semantics on an open connection. Returns `true` when created.
    pub(crate) fn create_or_update_in(
        &self,
        conn: &Connection,
        resource_type: &str,
        id: &str,
        body: Value,
        if_match: Option<&str>,
    ) -> StorageResult<(StoredResource, bool)> {
        validate_body(resource_type, &body)?;
        check_body_id(resource_type, id, &body)?;
        if !valid_id(id) {
            return Err(ValidationError::invalid_field(
                format!("{resource_type}.id"),
                format!("invalid id '{id}'"),
            )
            .into());
        }
        match load_current(conn, resource_type, id)? {
            Some(current) => {
                check_if_match(&current, if_match)?;
                let stored = self.store_version(
                    conn,
                    resource_type,
                    id,
                    current.version_id() + 1,
                    body,
                    ResourceMethod::Put,
                )?;
                Ok((stored, false))
            }
            None => {
                let stored =
                    self.store_version(conn, resource_type, id, 1, body, ResourceMethod::Put)?;
                Ok((stored, true))
            }
        }
    }

    /// Applies a JSON Patch on an open connection.
    pub(crate) fn patch_in(
        &self,
        conn: &Connection,
        resource_type: &str,
        id: &str,
        patch: &Value,
        if_match: Option<&str>,
    ) -> StorageResult<StoredResource> {
        let current =
            load_current(conn, resource_type, id)?.ok_or_else(|| not_found(resource_type, id))?;
        if current.is_deleted() {
            return Err(ResourceError::Gone {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                deleted_at: Some(current.last_updated()),
            }
            .into());
        }
        check_if_match(&current, if_match)?;

        let operations: json_patch::Patch = serde_json::from_value(patch.clone()).map_err(|e| {
            ValidationError::invalid_field("Parameters", format!("invalid JSON Patch: {e}"))
        })?;
        let mut patched = current.content().clone();
        json_patch::patch(&mut patched, &operations).map_err(|e| {
            ValidationError::invalid_field("Parameters", format!("patch failed: {e}"))
        })?;

        if patched.get("resourceType") != current.content().get("resourceType") {
            return Err(
                ValidationError::invalid_field("resourceType", "patch may not change resourceType")
                    .into(),
            );
        }
        if patched.get("id").and_then(Value::as_str) != Some(id) {
            return Err(ValidationError::invalid_field(
                format!("{resource_type}.id"),
                "patch may not change id",
            )
            .into());
        }

        self.store_version(
            conn,
            resource_type,
            id,
            current.version_id() + 1,
            patched,
            ResourceMethod::Patch,
        )
    }

    /// Writes a deletion marker on an open connection.
    ///
    /// Returns `false` when the resource was already deleted.
    pub(crate) fn delete_in(
        &self,
        conn: &Connection,
        resource_type: &str,
        id: &str,
    ) -> StorageResult<bool> {
        let current =
            load_current(conn, resource_type, id)?.ok_or_else(|| not_found(resource_type, id))?;
        if current.is_deleted() {
            return Ok(false);
        }

        let version = i64::try_from(current.version_id() + 1)
            .map_err(|_| StorageError::internal(BACKEND_NAME, "version overflow"))?;
        let now = format_instant(Utc::now());
        let data = serde_json::to_string(current.content())?;

        conn.execute(
            "UPDATE resources SET version_id = ?3, last_updated = ?4, is_deleted = 1, deleted_at = ?4
             WHERE resource_type = ?1 AND id = ?2",
            params![resource_type, id, version, now],
        )?;
        conn.execute(
            "INSERT INTO resource_history (resource_type, id, version_id, data, last_updated, is_deleted, method)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, 'DELETE')",
            params![resource_type, id, version, data, now],
        )?;
        clear_index(conn, resource_type, id)?;

        debug!(resource_type, id, version, "Wrote deletion marker");
        Ok(true)
    }

    /// Runs `work` inside one IMMEDIATE transaction, committing on success.
    pub(crate) fn with_transaction<T>(
        &self,
        work: impl FnOnce(&Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = work(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

#[async_trait]
impl ResourceStorage for SqliteBackend {
    fn backend_name(&self) -> &'static str {
        BACKEND_NAME
    }

    async fn create(&self, resource_type: &str, resource: Value) -> StorageResult<StoredResource> {
        self.with_transaction(|conn| self.create_in(conn, resource_type, resource))
    }

    async fn create_or_update(
        &self,
        resource_type: &str,
        id: &str,
        resource: Value,
        if_match: Option<&str>,
    ) -> StorageResult<(StoredResource, bool)> {
        self.with_transaction(|conn| {
            self.create_or_update_in(conn, resource_type, id, resource, if_match)
        })
    }

    async fn read(&self, resource_type: &str, id: &str) -> StorageResult<Option<StoredResource>> {
        let conn = self.get_connection()?;
        match load_current(&conn, resource_type, id)? {
            Some(resource) if resource.is_deleted() => Err(ResourceError::Gone {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
                deleted_at: Some(resource.last_updated()),
            }
            .into()),
            found => Ok(found),
        }
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        resource: Value,
        if_match: Option<&str>,
    ) -> StorageResult<StoredResource> {
        self.with_transaction(|conn| self.update_in(conn, resource_type, id, resource, if_match))
    }

    async fn patch(
        &self,
        resource_type: &str,
        id: &str,
        patch: &Value,
        if_match: Option<&str>,
    ) -> StorageResult<StoredResource> {
        self.with_transaction(|conn| self.patch_in(conn, resource_type, id, patch, if_match))
    }

    async fn delete(&self, resource_type: &str, id: &str) -> StorageResult<()> {
        let deleted = self.with_transaction(|conn| self.delete_in(conn, resource_type, id))?;
        if !deleted {
            debug!(resource_type, id, "Resource already deleted");
        }
        Ok(())
    }

    async fn read_batch(
        &self,
        resource_type: &str,
        ids: &[String],
    ) -> StorageResult<Vec<StoredResource>> {
        let conn = self.get_connection()?;
        fetch_current_batch(&conn, resource_type, ids)
    }

    async fn count(&self, resource_type: Option<&str>) -> StorageResult<u64> {
        let conn = self.get_connection()?;
        let count: i64 = match resource_type {
            Some(rt) => conn.query_row(
                "SELECT COUNT(*) FROM resources WHERE resource_type = ?1 AND is_deleted = 0",
                params![rt],
                |row| row.get(0),
            )?,
            None => conn.query_row(
                "SELECT COUNT(*) FROM resources WHERE is_deleted = 0",
                [],
                |row| row.get(0),
            )?,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn reindex(&self, resource_type: Option<&str>) -> StorageResult<u64> {
        let reindexed = self.with_transaction(|conn| {
            let sql = format!(
                "SELECT {RESOURCE_COLUMNS} FROM resources r \
                 WHERE r.is_deleted = 0 AND (?1 IS NULL OR r.resource_type = ?1)"
            );
            let mut stmt = conn.prepare(&sql)?;
            let resources = collect_resources(&mut stmt, params![resource_type])?;
            for resource in &resources {
                self.index_document(conn, resource.resource_type(), resource.id(), resource.content())?;
            }
            Ok(resources.len() as u64)
        })?;
        self.value_cache().clear();
        info!(resource_type = ?resource_type, reindexed, "Reindexed resources");
        Ok(reindexed)
    }
}

#[async_trait]
impl VersionedStorage for SqliteBackend {
    async fn vread(
        &self,
        resource_type: &str,
        id: &str,
        version_id: u64,
    ) -> StorageResult<StoredResource> {
        let conn = self.get_connection()?;
        load_version(&conn, resource_type, id, version_id)
    }

    async fn history(
        &self,
        resource_type: &str,
        id: &str,
        params: &HistoryParams,
    ) -> StorageResult<Page<StoredResource>> {
        let conn = self.get_connection()?;
        if load_current(&conn, resource_type, id)?.is_none() {
            return Err(not_found(resource_type, id));
        }

        let since = params.since.map(format_instant);
        let count = params.count.unwrap_or(DEFAULT_HISTORY_COUNT);

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM resource_history
             WHERE resource_type = ?1 AND id = ?2 AND (?3 IS NULL OR last_updated >= ?3)",
            params![resource_type, id, since],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT resource_type, id, version_id, data, last_updated, is_deleted, method
             FROM resource_history
             WHERE resource_type = ?1 AND id = ?2 AND (?3 IS NULL OR last_updated >= ?3)
             ORDER BY version_id DESC
             LIMIT ?4 OFFSET ?5",
        )?;
        let versions = collect_resources(
            &mut stmt,
            params![resource_type, id, since, count, params.offset],
        )?;

        let total = u64::try_from(total).unwrap_or_default();
        let info = PageInfo::new(params.offset, count, versions.len(), Some(total));
        Ok(Page::new(versions, info))
    }
}

#[async_trait]
impl ConditionalStorage for SqliteBackend {
    async fn conditional_create(
        &self,
        resource_type: &str,
        resource: Value,
        search_params: &str,
    ) -> StorageResult<ConditionalCreateResult> {
        if search_params.trim().is_empty() {
            return Err(ValidationError::invalid_field(
                "If-None-Exist",
                "conditional create needs search criteria",
            )
            .into());
        }

        let mut query = self
            .translator()
            .translate_query_string(resource_type, search_params)?;
        query.count = Some(2);
        query.offset = None;
        query.includes.clear();

        let results = self.search(&query).await?;
        let mut matches = results.resources.items;
        match matches.len() {
            0 => self
                .create(resource_type, resource)
                .await
                .map(ConditionalCreateResult::Created),
            1 => Ok(ConditionalCreateResult::Exists(matches.remove(0))),
            count => {
                warn!(resource_type, search_params, count, "Conditional create matched several resources");
                Err(ConcurrencyError::MultipleMatches {
                    operation: "create".to_string(),
                    count,
                }
                .into())
            }
        }
    }
}
