//! HTTP request handlers for FHIR interactions.
//!
//! - [`read`] - Read a resource by ID
//! - [`vread`] - Read a specific version of a resource
//! - [`create`] - Create a new resource
//! - [`update`] - Update or create a resource by ID
//! - [`patch`] - JSON Patch a resource
//! - [`delete`] - Delete a resource
//! - [`search`] - Search for resources
//! - [`history`] - Get resource history
//! - [`compartment`] - `$everything` over a compartment
//! - [`batch`] - Process a batch/transaction bundle
//! - [`capabilities`] - Get server capabilities (CapabilityStatement)
//! - [`versions`] - Get supported FHIR versions ($versions operation)
//! - [`reindex`] - Rebuild the search index ($reindex operation)
//! - [`health`] - Health check endpoints

pub mod batch;
pub mod capabilities;
pub mod compartment;
pub mod create;
pub mod delete;
pub mod health;
pub mod history;
pub mod patch;
pub mod read;
pub mod reindex;
pub mod search;
pub mod update;
pub mod versions;
pub mod vread;

pub use batch::batch_handler;
pub use capabilities::capabilities_handler;
pub use compartment::everything_handler;
pub use create::create_handler;
pub use delete::delete_handler;
pub use health::{health_handler, liveness_handler, readiness_handler};
pub use history::history_instance_handler;
pub use patch::patch_handler;
pub use read::read_handler;
pub use reindex::{reindex_all_handler, reindex_type_handler};
pub use search::{search_get_handler, search_post_handler};
pub use update::update_handler;
pub use versions::versions_handler;
pub use vread::vread_handler;
