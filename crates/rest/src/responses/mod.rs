//! Response building.
//!
//! - [`headers`] - `ETag`, `Last-Modified`, `Location`, `Content-Type`
//! - [`format`] - version-aware JSON bodies and `Prefer` handling
//! - [`bundle`] - history bundles and paging-link queries

pub mod bundle;
pub mod format;
pub mod headers;

pub use bundle::{base_query_without_paging, history_bundle};
pub use format::{fhir_json, write_response};
pub use headers::ResourceHeaders;
