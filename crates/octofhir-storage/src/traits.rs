//! Storage traits for the conformance storage abstraction layer.

use async_trait::async_trait;
use octofhir_core::{ResourceIdentifier, ResourceKind};
use serde_json::Value;

use crate::error::StoreError;
use crate::types::{StoredConformance, UpsertResult};

/// Storage for conformance resources imported from packages.
///
/// Resources are keyed by their canonical identity (`url` + optional
/// `version`, see [`octofhir_core::conformance_key`]). Implementations must be
/// thread-safe (`Send + Sync`), must allow concurrent upserts to distinct keys,
/// and must serialize concurrent upserts to the same key so the last write is
/// deterministic.
///
/// # Example
///
/// ```ignore
/// use octofhir_storage::ConformanceStorage;
///
/// async fn code_system_known(storage: &dyn ConformanceStorage, url: &str) -> bool {
///     matches!(storage.find_code_system(url, None).await, Ok(Some(_)))
/// }
/// ```
#[async_trait]
pub trait ConformanceStorage: Send + Sync {
    /// Inserts or replaces the resource stored under `identifier`.
    ///
    /// The content is taken by value and persisted unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::KindMismatch` if the canonical URL is already stored
    /// as a different resource kind.
    async fn upsert(
        &self,
        kind: ResourceKind,
        identifier: ResourceIdentifier,
        content: Value,
    ) -> Result<UpsertResult, StoreError>;

    /// Reads a resource by its exact identity.
    ///
    /// Returns `None` if nothing is stored under that `(url, version)` pair.
    async fn get(
        &self,
        identifier: &ResourceIdentifier,
    ) -> Result<Option<StoredConformance>, StoreError>;

    /// Finds a CodeSystem by canonical URL.
    ///
    /// When `version` is `None`, the most recently written version is returned.
    async fn find_code_system(
        &self,
        url: &str,
        version: Option<&str>,
    ) -> Result<Option<Value>, StoreError>;

    /// Finds a ValueSet by canonical URL.
    ///
    /// When `version` is `None`, the most recently written version is returned.
    async fn find_value_set(
        &self,
        url: &str,
        version: Option<&str>,
    ) -> Result<Option<Value>, StoreError>;

    /// Lists every stored resource of a kind.
    async fn list(&self, kind: &ResourceKind) -> Result<Vec<StoredConformance>, StoreError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}

/// Notification about a conformance resource change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConformanceChangeEvent {
    /// The kind of conformance resource.
    pub kind: ResourceKind,
    /// The operation that was performed
    pub operation: ConformanceChangeOp,
    /// Storage key of the resource.
    pub key: String,
    /// The canonical URL of the resource.
    pub url: String,
}

/// Type of conformance change operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConformanceChangeOp {
    /// Resource was created
    Insert,
    /// Resource was updated
    Update,
}
