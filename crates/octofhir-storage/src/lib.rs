//! # octofhir-storage
//!
//! Storage abstraction for imported conformance resources.
//!
//! This crate defines the contract the package importer persists through. It
//! does not contain any implementations - those are provided by separate
//! crates such as `octofhir-db-memory`.
//!
//! ## Overview
//!
//! The main trait is [`ConformanceStorage`], which defines:
//! - upsert by canonical identity (`url` + optional `version`)
//! - exact reads by identity
//! - CodeSystem / ValueSet lookups used during terminology expansion
//!
//! ## Example
//!
//! ```ignore
//! use octofhir_core::{ResourceIdentifier, ResourceKind};
//! use octofhir_storage::{ConformanceStorage, StoreError};
//!
//! async fn store_code_system(
//!     storage: &dyn ConformanceStorage,
//!     content: serde_json::Value,
//! ) -> Result<(), StoreError> {
//!     let id = ResourceIdentifier::new("http://example.org/cs", Some("1.0.0".into()))
//!         .map_err(|e| StoreError::invalid_resource(e.to_string()))?;
//!     storage.upsert(ResourceKind::CodeSystem, id, content).await?;
//!     Ok(())
//! }
//! ```

mod error;
mod traits;
mod types;

pub use error::{ErrorCategory, StoreError};
pub use traits::{ConformanceChangeEvent, ConformanceChangeOp, ConformanceStorage};
pub use types::{StoredConformance, UpsertAction, UpsertResult};

/// Type alias for a storage result.
pub type StoreResult<T> = Result<T, StoreError>;

/// Type alias for a shareable storage trait object.
pub type DynConformanceStorage = std::sync::Arc<dyn ConformanceStorage>;
