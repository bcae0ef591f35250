//! Request header handling.
//!
//! - [`conditional`] - `If-Match`, `If-None-Match`, `If-Modified-Since`, `If-None-Exist`
//! - [`content_type`] - media types and `fhirVersion` negotiation
//! - [`prefer`] - the `Prefer: return=` directive

pub mod conditional;
pub mod content_type;
pub mod prefer;

pub use conditional::ConditionalHeaders;
pub use content_type::{FHIR_JSON, content_type_header, negotiate_accept_version};
pub use prefer::{PreferHeader, ReturnPreference};
