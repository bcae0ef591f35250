//! SQLite search implementation.
//!
//! - [`QueryBuilder`] turns a translated query into index subqueries
//! - [`parameter_handlers`] generate the per-type value conditions

pub mod parameter_handlers;
pub mod query_builder;

pub use query_builder::{BuiltQuery, QueryBuilder, SqlFragment, SqlParam};
pub(crate) use query_builder::RESOURCE_COLUMNS;
