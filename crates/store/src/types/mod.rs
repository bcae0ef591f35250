//! Core types for the store.
//!
//! - [`StoredResource`] - one version of a resource with its envelope
//! - [`SearchQuery`], [`SearchParameter`] - typed search predicates
//! - [`DateRange`] - the covering interval of a date value
//! - [`Page`], [`SearchBundle`] - paging and result bundles
//!
//! # Building a Search Query
//!
//! ```
//! use helios_store::types::{SearchParamType, SearchParameter, SearchQuery, SortDirective};
//!
//! let query = SearchQuery::new("Patient")
//!     .with_parameter(SearchParameter::new("family", SearchParamType::String, "smith"))
//!     .with_sort(SortDirective::parse("-birthdate"))
//!     .with_count(20);
//!
//! assert_eq!(query.parameters.len(), 1);
//! ```

mod date_range;
mod pagination;
mod search_params;
mod stored_resource;

pub use date_range::{DateParseError, DatePrecision, DateRange};

pub use pagination::{
    BundleEntry, BundleEntrySearch, BundleLink, Page, PageInfo, SearchBundle, SearchEntryMode,
};

pub use search_params::{
    ChainedParameter, CompositeValue, IncludeDirective, IncludeType, ReverseChainedParameter,
    SearchModifier, SearchParamType, SearchParameter, SearchPrefix, SearchQuery, SearchValue,
    SortDirection, SortDirective, SummaryMode, TotalMode,
};

pub use stored_resource::{format_instant, parse_etag, ResourceMethod, StoredResource};
