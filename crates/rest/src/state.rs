//! Application state shared by every handler.

use std::sync::Arc;

use helios_store::core::SearchProvider;
use helios_store::search::QueryTranslator;
use helios_store::Projector;

use crate::config::ServerConfig;
use crate::version::FhirVersion;

/// Shared application state.
///
/// Holds the storage backend, the configuration, and the query translator
/// and projector built over the backend's parameter catalog.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use helios_store::backends::sqlite::SqliteBackend;
/// use helios_store_rest::{AppState, ServerConfig};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = SqliteBackend::in_memory()?;
/// backend.init_schema()?;
/// let state = AppState::new(Arc::new(backend), ServerConfig::default());
/// # Ok(())
/// # }
/// ```
pub struct AppState<S> {
    storage: Arc<S>,
    config: Arc<ServerConfig>,
    translator: Arc<QueryTranslator>,
    projector: Arc<Projector>,
}

// S sits behind an Arc and need not be Clone.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            config: Arc::clone(&self.config),
            translator: Arc::clone(&self.translator),
            projector: Arc::clone(&self.projector),
        }
    }
}

impl<S: SearchProvider> AppState<S> {
    /// Creates the state, sizing search pages from `config`.
    pub fn new(storage: Arc<S>, config: ServerConfig) -> Self {
        let catalog = storage.param_catalog();
        let translator = QueryTranslator::new(Arc::clone(&catalog))
            .with_page_limits(config.default_page_size, config.max_page_size);
        Self {
            storage,
            config: Arc::new(config),
            translator: Arc::new(translator),
            projector: Arc::new(Projector::new(catalog)),
        }
    }
}

impl<S> AppState<S> {
    /// Returns the storage backend.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Returns a clone of the storage Arc.
    pub fn storage_arc(&self) -> Arc<S> {
        Arc::clone(&self.storage)
    }

    /// Returns the server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the translator for query strings.
    pub fn translator(&self) -> &QueryTranslator {
        &self.translator
    }

    /// Returns the `_summary` / `_elements` projector.
    pub fn projector(&self) -> &Projector {
        &self.projector
    }

    /// Returns the base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.config.base_url()
    }

    /// Returns the version used when a request names none.
    pub fn default_fhir_version(&self) -> FhirVersion {
        self.config.default_fhir_version
    }

    /// Returns the default page size.
    pub fn default_page_size(&self) -> u32 {
        self.config.default_page_size
    }

    /// Returns the maximum page size.
    pub fn max_page_size(&self) -> u32 {
        self.config.max_page_size
    }
}
