//! Storage types for the conformance storage abstraction layer.

use octofhir_core::{ResourceIdentifier, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// A conformance resource as stored in the storage backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConformance {
    /// Storage key derived from the identifier.
    pub key: String,
    /// Kind of the resource.
    pub kind: ResourceKind,
    /// Canonical identity.
    pub identifier: ResourceIdentifier,
    /// Store revision of this write.
    pub version_id: String,
    /// The resource content exactly as it was upserted.
    pub resource: Value,
    /// When this revision was written.
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
    /// When the key was first written.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl StoredConformance {
    /// Creates a first revision for `identifier`.
    #[must_use]
    pub fn new(
        kind: ResourceKind,
        identifier: ResourceIdentifier,
        version_id: impl Into<String>,
        resource: Value,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            key: identifier.key(),
            kind,
            identifier,
            version_id: version_id.into(),
            resource,
            last_updated: now,
            created_at: now,
        }
    }

    /// Creates the next revision of this record with replaced content.
    #[must_use]
    pub fn new_version(&self, version_id: impl Into<String>, resource: Value) -> Self {
        Self {
            key: self.key.clone(),
            kind: self.kind.clone(),
            identifier: self.identifier.clone(),
            version_id: version_id.into(),
            resource,
            last_updated: OffsetDateTime::now_utc(),
            created_at: self.created_at,
        }
    }
}

/// Whether an upsert created a new key or replaced an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
}

impl std::fmt::Display for UpsertAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
        }
    }
}

/// Result of a successful upsert.
#[derive(Debug, Clone)]
pub struct UpsertResult {
    pub action: UpsertAction,
    pub record: StoredConformance,
}
