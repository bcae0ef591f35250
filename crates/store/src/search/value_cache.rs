//! Read-through cache of distinct indexed values.
//!
//! Used for facets: the distinct string and code values indexed for one
//! `(resource type, parameter)` pair. Entries expire after a TTL and are
//! never invalidated by writes, so callers may see stale values.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tracing::debug;

use crate::error::StorageResult;

/// Upper bound on values loaded for one key.
pub const MAX_DISTINCT_VALUES: usize = 1000;

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct ValueKey {
    resource_type: String,
    param: String,
}

/// TTL-bounded cache of distinct values per resource type and parameter.
#[derive(Clone)]
pub struct ValueCache {
    values: Cache<ValueKey, Arc<Vec<String>>>,
}

impl std::fmt::Debug for ValueCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueCache")
            .field("entries", &self.values.entry_count())
            .finish()
    }
}

impl ValueCache {
    /// Creates a cache holding up to `capacity` keys for `ttl`.
    pub fn new(capacity: u64, ttl: Duration) -> Self {
        Self {
            values: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Returns cached values for the key, calling `load` on a miss.
    ///
    /// `load` should return at most [`MAX_DISTINCT_VALUES`] values; the
    /// result is truncated to `limit`. Load errors are not cached.
    pub async fn get_or_load<F, Fut>(
        &self,
        resource_type: &str,
        param: &str,
        limit: usize,
        load: F,
    ) -> StorageResult<Vec<String>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StorageResult<Vec<String>>>,
    {
        let key = ValueKey {
            resource_type: resource_type.to_string(),
            param: param.to_string(),
        };

        let values = match self.values.get(&key).await {
            Some(values) => values,
            None => {
                debug!(resource_type, param, "Loading distinct values");
                let loaded = Arc::new(load().await?);
                self.values.insert(key, Arc::clone(&loaded)).await;
                loaded
            }
        };

        Ok(values.iter().take(limit).cloned().collect())
    }

    /// Drops every cached entry.
    pub fn clear(&self) {
        self.values.invalidate_all();
    }
}
