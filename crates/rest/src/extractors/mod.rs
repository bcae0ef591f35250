//! Axum extractors for FHIR requests.

pub mod fhir_resource;
pub mod fhir_version;

pub use fhir_resource::FhirResource;
pub use fhir_version::AcceptVersion;
