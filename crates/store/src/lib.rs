//! Helios Clinical Store
//!
//! A versioned FHIR document store with catalog-driven search indexing.
//! Every write extracts search values from the document into index tables,
//! so searches, `_include`/`_revinclude` and `$everything` never scan raw
//! JSON.
//!
//! # Architecture
//!
//! - [`catalog`] - search parameter and compartment definitions
//! - [`search`] - value extraction and query-string translation
//! - [`types`] - stored resources, search queries and pagination
//! - [`core`] - storage traits
//! - [`projection`] - `_summary` / `_elements` subsetting
//! - [`error`] - error types and `OperationOutcome` rendering
//! - [`backends`] - backend implementations (SQLite)
//!
//! # Quick Start
//!
//! ```no_run
//! use helios_store::backends::sqlite::SqliteBackend;
//! use helios_store::core::{ResourceStorage, SearchProvider};
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema()?;
//!
//! backend
//!     .create("Patient", json!({"resourceType": "Patient", "gender": "female"}))
//!     .await?;
//!
//! let query = backend.translator().translate_query_string("Patient", "gender=female")?;
//! let results = backend.search(&query).await?;
//! assert_eq!(results.total, Some(1));
//! # Ok(())
//! # }
//! ```
//!
//! # Search
//!
//! Queries can also be built directly:
//!
//! ```
//! use helios_store::types::{
//!     IncludeDirective, IncludeType, SearchModifier, SearchParamType, SearchParameter,
//!     SearchQuery, SortDirective,
//! };
//!
//! let query = SearchQuery::new("Patient")
//!     .with_parameter(
//!         SearchParameter::new("family", SearchParamType::String, "Smith")
//!             .with_modifier(SearchModifier::Exact),
//!     )
//!     .with_sort(SortDirective::parse("-birthdate"))
//!     .with_include(IncludeDirective {
//!         include_type: IncludeType::Include,
//!         source_type: "Patient".to_string(),
//!         search_param: "organization".to_string(),
//!         target_type: None,
//!         iterate: false,
//!     })
//!     .with_count(20);
//! assert_eq!(query.count, Some(20));
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod catalog;
pub mod core;
pub mod error;
pub mod projection;
pub mod search;
pub mod types;

pub use catalog::ParamCatalog;
pub use error::{StorageError, StorageResult};
pub use projection::Projector;
pub use types::{SearchQuery, StoredResource};

pub use core::{
    BundleProvider, CompartmentProvider, ConditionalStorage, IncludeProvider, ResourceStorage,
    SearchProvider, VersionedStorage,
};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
