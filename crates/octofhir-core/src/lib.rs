pub mod canonical;
pub mod error;
pub mod fhir;

pub use canonical::{ResourceIdentifier, conformance_key};
pub use error::CoreError;
pub use fhir::{CONFORMANCE_RESOURCE_TYPES, ResourceKind, is_valid_resource_type_name};
