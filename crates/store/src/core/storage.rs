//! Core resource storage trait.
//!
//! This module defines the [`ResourceStorage`] trait, which provides the
//! fundamental CRUD operations. Every write is one unit of work: the document,
//! its history row and its index rows are committed together or not at all.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;
use crate::types::StoredResource;

/// Storage trait for resource CRUD.
///
/// # Example
///
/// ```ignore
/// use helios_store::core::ResourceStorage;
/// use serde_json::json;
///
/// async fn example<S: ResourceStorage>(storage: &S) -> helios_store::error::StorageResult<()> {
///     let created = storage
///         .create("Patient", json!({"resourceType": "Patient", "name": [{"family": "Smith"}]}))
///         .await?;
///     println!("Created: {}", created.url());
///
///     if let Some(read) = storage.read("Patient", created.id()).await? {
///         println!("Read version {}", read.version_id());
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ResourceStorage: Send + Sync {
    /// Returns a name for this backend, used in logs and errors.
    fn backend_name(&self) -> &'static str;

    /// Creates a resource at version 1.
    ///
    /// A server id is assigned when the body has none. `meta.versionId` and
    /// `meta.lastUpdated` are set on the stored body.
    ///
    /// # Errors
    ///
    /// * `ValidationError::InvalidResource` - body is not an object or its
    ///   `resourceType` differs from `resource_type`
    /// * `ResourceError::AlreadyExists` - the id is taken
    async fn create(&self, resource_type: &str, resource: Value) -> StorageResult<StoredResource>;

    /// Creates the resource with the given id, or updates it if it exists.
    ///
    /// Returns the stored resource and `true` if it was created.
    async fn create_or_update(
        &self,
        resource_type: &str,
        id: &str,
        resource: Value,
        if_match: Option<&str>,
    ) -> StorageResult<(StoredResource, bool)>;

    /// Reads the current version.
    ///
    /// Returns `Ok(None)` when the resource never existed.
    ///
    /// # Errors
    ///
    /// * `ResourceError::Gone` - the current version is a deletion marker
    async fn read(&self, resource_type: &str, id: &str) -> StorageResult<Option<StoredResource>>;

    /// Writes a new version of an existing resource.
    ///
    /// Updating a deleted resource brings it back as a new version.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - the resource never existed
    /// * `ConcurrencyError::VersionConflict` - `if_match` names another version
    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        resource: Value,
        if_match: Option<&str>,
    ) -> StorageResult<StoredResource>;

    /// Applies a JSON Patch document to the current version.
    async fn patch(
        &self,
        resource_type: &str,
        id: &str,
        patch: &Value,
        if_match: Option<&str>,
    ) -> StorageResult<StoredResource>;

    /// Writes a deletion marker.
    ///
    /// Deleting an already deleted resource succeeds without a new version.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - the resource never existed
    async fn delete(&self, resource_type: &str, id: &str) -> StorageResult<()>;

    /// Returns `true` if a current, non-deleted version exists.
    async fn exists(&self, resource_type: &str, id: &str) -> StorageResult<bool> {
        match self.read(resource_type, id).await {
            Ok(found) => Ok(found.is_some()),
            Err(crate::error::StorageError::Resource(crate::error::ResourceError::Gone {
                ..
            })) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Reads several resources of one type in one lookup.
    ///
    /// Missing and deleted ids are skipped; order follows `ids`.
    async fn read_batch(
        &self,
        resource_type: &str,
        ids: &[String],
    ) -> StorageResult<Vec<StoredResource>>;

    /// Counts current, non-deleted resources.
    async fn count(&self, resource_type: Option<&str>) -> StorageResult<u64>;

    /// Rebuilds the index rows of every current resource (optionally of one
    /// type). Returns the number of resources reindexed.
    async fn reindex(&self, resource_type: Option<&str>) -> StorageResult<u64>;
}

/// Result of a conditional create.
#[derive(Debug, Clone)]
pub enum ConditionalCreateResult {
    /// No match; the resource was created.
    Created(StoredResource),
    /// Exactly one resource matched; nothing was written.
    Exists(StoredResource),
}

impl ConditionalCreateResult {
    /// Returns the stored resource either way.
    pub fn resource(&self) -> &StoredResource {
        match self {
            ConditionalCreateResult::Created(r) | ConditionalCreateResult::Exists(r) => r,
        }
    }
}

/// Conditional interactions driven by a search query.
#[async_trait]
pub trait ConditionalStorage: ResourceStorage {
    /// Creates the resource unless `search_params` already matches one.
    ///
    /// # Errors
    ///
    /// * `ConcurrencyError::MultipleMatches` - more than one resource matched
    async fn conditional_create(
        &self,
        resource_type: &str,
        resource: Value,
        search_params: &str,
    ) -> StorageResult<ConditionalCreateResult>;
}
