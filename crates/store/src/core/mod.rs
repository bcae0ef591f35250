//! Core storage traits and abstractions.
//!
//! - [`ResourceStorage`] - CRUD as one unit of work per write
//! - [`VersionedStorage`] - `vread` and instance history
//! - [`SearchProvider`], [`IncludeProvider`], [`CompartmentProvider`] - search
//! - [`BundleProvider`] - transaction and batch bundles
//!
//! # Trait Hierarchy
//!
//! ```text
//! ResourceStorage
//!     ├── VersionedStorage
//!     ├── ConditionalStorage
//!     ├── BundleProvider
//!     └── SearchProvider
//!             ├── IncludeProvider
//!             └── CompartmentProvider
//! ```

pub mod history;
pub mod search;
pub mod storage;
pub mod transaction;

pub use history::{HistoryParams, VersionedStorage};
pub use search::{
    CompartmentProvider, EverythingParams, FacetProvider, IncludeProvider, SearchProvider,
    SearchResults,
};
pub use storage::{ConditionalCreateResult, ConditionalStorage, ResourceStorage};
pub use transaction::{
    parse_bundle, BundleEntry, BundleEntryResult, BundleMethod, BundleProvider, BundleResult,
    BundleType,
};
