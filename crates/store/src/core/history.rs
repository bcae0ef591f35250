//! Version-aware reads.
//!
//! Every write appends an immutable history row. [`VersionedStorage`] reads
//! them back: one version by number (`vread`) or the instance history,
//! newest first, deletion markers included.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StorageResult;
use crate::types::{Page, StoredResource};

use super::storage::ResourceStorage;

/// Parameters for an instance history read.
#[derive(Debug, Clone, Default)]
pub struct HistoryParams {
    /// Only versions written at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Page size (defaults to 20 when `None`).
    pub count: Option<u32>,
    /// Index of the first version returned.
    pub offset: u32,
}

impl HistoryParams {
    /// Creates default history parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `since` filter.
    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    /// Sets the page size.
    pub fn count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }

    /// Sets the offset.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }
}

/// Storage that keeps and serves prior versions.
#[async_trait]
pub trait VersionedStorage: ResourceStorage {
    /// Reads a specific version, including deletion markers.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - the resource never existed
    /// * `ResourceError::VersionNotFound` - no such version
    async fn vread(
        &self,
        resource_type: &str,
        id: &str,
        version_id: u64,
    ) -> StorageResult<StoredResource>;

    /// Returns the versions of one resource, newest first.
    ///
    /// # Errors
    ///
    /// * `ResourceError::NotFound` - the resource never existed
    async fn history(
        &self,
        resource_type: &str,
        id: &str,
        params: &HistoryParams,
    ) -> StorageResult<Page<StoredResource>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_params_builder() {
        let since = Utc::now();
        let params = HistoryParams::new().since(since).count(5).offset(10);
        assert_eq!(params.since, Some(since));
        assert_eq!(params.count, Some(5));
        assert_eq!(params.offset, 10);
    }
}
