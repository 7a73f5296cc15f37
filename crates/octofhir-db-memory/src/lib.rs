//! In-memory conformance storage backend.
//!
//! This crate provides an in-memory implementation of the `ConformanceStorage`
//! trait from `octofhir-storage`, using a papaya lock-free HashMap for record
//! reads and a per-URL dashmap entry for write serialization.
//!
//! # Example
//!
//! ```ignore
//! use octofhir_db_memory::InMemoryConformanceStorage;
//! use octofhir_storage::ConformanceStorage;
//!
//! let storage = InMemoryConformanceStorage::new();
//! let mut changes = storage.subscribe();
//! storage.upsert(kind, identifier, content).await?;
//! let event = changes.recv().await?;
//! ```

pub mod storage;

pub use octofhir_storage::{ConformanceStorage, StoreError, StoredConformance};
pub use storage::{DEFAULT_EVENT_CAPACITY, InMemoryConformanceStorage};

/// Type alias for a shareable ConformanceStorage instance.
pub type DynConformanceStorage = std::sync::Arc<dyn ConformanceStorage>;

/// Creates a new in-memory ConformanceStorage instance.
pub fn create_conformance_storage() -> DynConformanceStorage {
    std::sync::Arc::new(InMemoryConformanceStorage::new())
}
