//! SQLite backend implementation.
//!
//! Implements every storage trait over a pooled SQLite database, either
//! in-memory (a `memdb` database per backend instance) or
//! file-based.
//!
//! # Example
//!
//! ```no_run
//! use helios_store::backends::sqlite::SqliteBackend;
//! use helios_store::core::ResourceStorage;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = SqliteBackend::in_memory()?;
//! backend.init_schema()?;
//!
//! let patient = backend
//!     .create("Patient", json!({"resourceType": "Patient", "gender": "female"}))
//!     .await?;
//! assert_eq!(patient.version_id(), 1);
//! # Ok(())
//! # }
//! ```
//!
//! # Schema
//!
//! ```sql
//! -- Current version of every resource (deletion markers included)
//! CREATE TABLE resources (
//!     resource_type TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     version_id INTEGER NOT NULL,
//!     data TEXT NOT NULL,
//!     last_updated TEXT NOT NULL,
//!     is_deleted INTEGER NOT NULL DEFAULT 0,
//!     deleted_at TEXT,
//!     PRIMARY KEY (resource_type, id)
//! );
//!
//! -- Every version ever written
//! CREATE TABLE resource_history (
//!     resource_type TEXT NOT NULL,
//!     id TEXT NOT NULL,
//!     version_id INTEGER NOT NULL,
//!     data TEXT NOT NULL,
//!     last_updated TEXT NOT NULL,
//!     is_deleted INTEGER NOT NULL DEFAULT 0,
//!     method TEXT NOT NULL,
//!     PRIMARY KEY (resource_type, id, version_id)
//! );
//! ```
//!
//! The `search_index`, `reference_edges` and `compartment_membership`
//! tables hold only what the extractor derives from current documents and
//! can be rebuilt with [`ResourceStorage::reindex`](crate::core::ResourceStorage::reindex).

mod backend;
mod bundle;
mod everything;
mod include;
mod schema;
mod search;
mod search_impl;
mod storage;
mod writer;

pub use backend::{SqliteBackend, SqliteBackendConfig};
