//! Search indexing and query translation.
//!
//! - [`SearchParameterExtractor`] turns a document into typed index rows,
//!   reference edges and compartment memberships
//! - [`QueryTranslator`] turns query-string pairs into a [`SearchQuery`](crate::types::SearchQuery)
//! - [`ValueCache`] serves distinct indexed values for facets
//!
//! The SQL side of search lives with the backend.

pub mod converters;
pub mod errors;
pub mod extractor;
pub mod reference;
pub mod translator;
pub mod value_cache;

pub use converters::{
    normalize_string, parse_decimal, shift_to_fixed_point, to_fixed_point, IndexValue,
    ValueConverter, FIXED_POINT_SCALE,
};
pub use errors::ExtractionError;
pub use extractor::{
    CompartmentMembership, ExtractedDocument, IndexRow, ReferenceEdge, SearchParameterExtractor,
};
pub use reference::{is_resource_type_name, normalize_reference, valid_id, ReferenceKey};
pub use translator::{parse_query_string, QueryTranslator, DEFAULT_MAX_CHAIN_DEPTH};
pub use value_cache::{ValueCache, MAX_DISTINCT_VALUES};
