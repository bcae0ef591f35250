//! SQLite backend: connection pool, configuration and shared services.

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::ParamCatalog;
use crate::error::{BackendError, StorageError, StorageResult};
use crate::search::{QueryTranslator, SearchParameterExtractor, ValueCache};

use super::schema;

pub(crate) const BACKEND_NAME: &str = "sqlite";

/// SQLite backend for FHIR resource storage.
pub struct SqliteBackend {
    pool: Pool<SqliteConnectionManager>,
    config: SqliteBackendConfig,
    is_memory: bool,
    catalog: Arc<ParamCatalog>,
    extractor: SearchParameterExtractor,
    translator: QueryTranslator,
    value_cache: ValueCache,
}

impl Debug for SqliteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteBackend")
            .field("config", &self.config)
            .field("is_memory", &self.is_memory)
            .field("value_cache", &self.value_cache)
            .finish_non_exhaustive()
    }
}

/// Configuration for the SQLite backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqliteBackendConfig {
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of idle connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u32,

    /// Enable WAL mode for file databases.
    #[serde(default = "default_true")]
    pub enable_wal: bool,

    /// Deadline for each branch of a batched include or compartment fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Maximum rounds of `:iterate` include resolution.
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// Lifetime of cached distinct values.
    #[serde(default = "default_value_cache_ttl_secs")]
    pub value_cache_ttl_secs: u64,

    /// Number of `(type, parameter)` keys the value cache holds.
    #[serde(default = "default_value_cache_capacity")]
    pub value_cache_capacity: u64,
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout_ms() -> u64 {
    30000
}

fn default_busy_timeout_ms() -> u32 {
    5000
}

fn default_true() -> bool {
    true
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_max_include_depth() -> usize {
    3
}

fn default_value_cache_ttl_secs() -> u64 {
    30
}

fn default_value_cache_capacity() -> u64 {
    1000
}

impl Default for SqliteBackendConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout_ms: default_connection_timeout_ms(),
            busy_timeout_ms: default_busy_timeout_ms(),
            enable_wal: true,
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_include_depth: default_max_include_depth(),
            value_cache_ttl_secs: default_value_cache_ttl_secs(),
            value_cache_capacity: default_value_cache_capacity(),
        }
    }
}

impl SqliteBackend {
    /// Creates a new in-memory SQLite backend.
    ///
    /// Every call gets its own database, shared by the pooled connections.
    pub fn in_memory() -> StorageResult<Self> {
        Self::with_config(":memory:", SqliteBackendConfig::default())
    }

    /// Opens or creates a file-based SQLite database.
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(path, SqliteBackendConfig::default())
    }

    /// Creates a backend with custom configuration and the builtin catalog.
    pub fn with_config<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
    ) -> StorageResult<Self> {
        Self::with_catalog(path, config, Arc::new(ParamCatalog::builtin()))
    }

    /// Creates a backend over an explicitly constructed parameter catalog.
    pub fn with_catalog<P: AsRef<Path>>(
        path: P,
        config: SqliteBackendConfig,
        catalog: Arc<ParamCatalog>,
    ) -> StorageResult<Self> {
        let path_str = path.as_ref().to_string_lossy();
        let is_memory = path_str == ":memory:";

        let busy_timeout = Duration::from_millis(u64::from(config.busy_timeout_ms));
        let enable_wal = config.enable_wal && !is_memory;

        let manager = if is_memory {
            // A named memdb database is shared by every pooled connection and
            // stays private to this backend. Unlike shared cache it keeps
            // file locking, so readers never see uncommitted writes.
            let uri = format!("file:/hcs_{}?vfs=memdb", uuid::Uuid::new_v4().simple());
            SqliteConnectionManager::file(uri).with_flags(
                OpenFlags::SQLITE_OPEN_READ_WRITE
                    | OpenFlags::SQLITE_OPEN_CREATE
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        } else {
            SqliteConnectionManager::file(path.as_ref())
        };
        let manager = manager.with_init(move |conn: &mut Connection| {
            configure_connection(conn, busy_timeout, enable_wal)
        });

        let mut builder = Pool::builder()
            .max_size(config.max_connections.max(1))
            .min_idle(Some(config.min_connections))
            .connection_timeout(Duration::from_millis(config.connection_timeout_ms));
        if is_memory {
            // The database lives only while a connection is open.
            builder = builder
                .min_idle(Some(config.min_connections.max(1)))
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = builder.build(manager).map_err(|e| {
            StorageError::Backend(BackendError::Unavailable {
                backend_name: BACKEND_NAME.to_string(),
                message: e.to_string(),
            })
        })?;

        let extractor = SearchParameterExtractor::new(Arc::clone(&catalog));
        let translator = QueryTranslator::new(Arc::clone(&catalog));
        let value_cache = ValueCache::new(
            config.value_cache_capacity,
            Duration::from_secs(config.value_cache_ttl_secs),
        );

        info!(
            path = %path_str,
            is_memory,
            max_connections = config.max_connections,
            "Opened SQLite backend"
        );

        Ok(Self {
            pool,
            config,
            is_memory,
            catalog,
            extractor,
            translator,
            value_cache,
        })
    }

    /// Initialize the database schema.
    pub fn init_schema(&self) -> StorageResult<()> {
        let conn = self.get_connection()?;
        schema::initialize_schema(&conn)
    }

    /// Get a connection from the pool.
    pub(crate) fn get_connection(
        &self,
    ) -> StorageResult<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Runs one branch of a fan-out on its own pooled connection.
    ///
    /// The closure runs on the blocking thread pool and is bounded by
    /// `fetch_timeout_ms`. A panic or timeout comes back as an error for
    /// this branch only.
    pub(crate) async fn fetch_branch<T, F>(&self, branch: String, fetch: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StorageResult<T> + Send + 'static,
    {
        let pool = self.pool.clone();
        let timeout_ms = self.config.fetch_timeout_ms;
        let task = tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            fetch(&conn)
        });

        match tokio::time::timeout(Duration::from_millis(timeout_ms), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(StorageError::Backend(BackendError::Upstream {
                branch,
                message: join_error.to_string(),
            })),
            Err(_) => {
                warn!(branch = %branch, timeout_ms, "Batched fetch timed out");
                Err(StorageError::Backend(BackendError::Timeout {
                    operation: branch,
                    timeout_ms,
                }))
            }
        }
    }

    /// Returns whether this is an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.is_memory
    }

    /// Returns the backend configuration.
    pub fn config(&self) -> &SqliteBackendConfig {
        &self.config
    }

    /// Returns the parameter catalog.
    pub fn catalog(&self) -> &Arc<ParamCatalog> {
        &self.catalog
    }

    /// Returns the search parameter extractor.
    pub fn extractor(&self) -> &SearchParameterExtractor {
        &self.extractor
    }

    /// Returns the query translator used for conditional operations.
    pub fn translator(&self) -> &QueryTranslator {
        &self.translator
    }

    /// Returns the distinct-value cache.
    pub fn value_cache(&self) -> &ValueCache {
        &self.value_cache
    }
}

fn configure_connection(
    conn: &mut Connection,
    busy_timeout: Duration,
    enable_wal: bool,
) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(busy_timeout)?;
    if enable_wal {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    }
    Ok(())
}
