//! Kind-specific validation run between parsing and persistence.

use octofhir_storage::DynConformanceStorage;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::error::ValidationError;
use crate::expand::ValueSetExpander;
use crate::parser::ParsedResource;

/// What validation established about a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationPass {
    /// Structure was already guaranteed by parsing.
    Structural,
    /// A test-mode ValueSet expanded to this many codes.
    Expanded { codes: usize },
}

impl ValidationPass {
    pub fn expanded_codes(&self) -> Option<usize> {
        match self {
            Self::Structural => None,
            Self::Expanded { codes } => Some(*codes),
        }
    }
}

/// Read-only validator; never writes to storage.
#[derive(Clone)]
pub struct ResourceValidator {
    storage: DynConformanceStorage,
    config: ValidationConfig,
}

impl ResourceValidator {
    pub fn new(storage: DynConformanceStorage, config: ValidationConfig) -> Self {
        Self { storage, config }
    }

    /// Validates a parsed resource.
    ///
    /// Only ValueSets in test mode do real work: they must expand against the
    /// code systems currently in storage within the configured timeout.
    pub async fn validate(
        &self,
        resource: &ParsedResource,
        test_mode: bool,
    ) -> Result<ValidationPass, ValidationError> {
        let Some(value_set) = resource.value_set() else {
            return Ok(ValidationPass::Structural);
        };
        if !test_mode {
            return Ok(ValidationPass::Structural);
        }

        let expander = ValueSetExpander::new(self.storage.as_ref(), self.config.max_expansion_codes);
        let expansion = tokio::time::timeout(self.config.expansion_timeout(), expander.expand(value_set))
            .await
            .map_err(|_| ValidationError::Timeout {
                timeout_ms: self.config.expansion_timeout_ms,
            })??;

        debug!(
            url = %resource.identifier.url,
            codes = expansion.len(),
            "value set expansion check passed"
        );
        Ok(ValidationPass::Expanded {
            codes: expansion.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveEntry, MediaType};
    use crate::parser::ResourceParser;
    use async_trait::async_trait;
    use octofhir_core::{ResourceIdentifier, ResourceKind};
    use octofhir_db_memory::InMemoryConformanceStorage;
    use octofhir_storage::{ConformanceStorage, StoreError, StoredConformance, UpsertResult};
    use serde_json::{Value, json};
    use std::sync::Arc;
    use std::time::Duration;

    fn parsed(value: Value) -> ParsedResource {
        let bytes = serde_json::to_vec(&value).unwrap();
        let entry = ArchiveEntry {
            position: 0,
            path: "package/test.json".into(),
            media_type: MediaType::sniff(&bytes),
            bytes,
        };
        ResourceParser::new().parse(&entry).unwrap()
    }

    fn value_set() -> ParsedResource {
        parsed(json!({
            "resourceType": "ValueSet",
            "url": "http://example.org/vs",
            "compose": {"include": [{"system": "http://example.org/cs"}]}
        }))
    }

    #[tokio::test]
    async fn non_value_sets_pass_structurally() {
        let validator = ResourceValidator::new(
            Arc::new(InMemoryConformanceStorage::new()),
            ValidationConfig::default(),
        );
        let cs = parsed(json!({
            "resourceType": "CodeSystem",
            "url": "http://example.org/cs",
            "content": "complete"
        }));
        assert_eq!(validator.validate(&cs, true).await.unwrap(), ValidationPass::Structural);
    }

    #[tokio::test]
    async fn test_mode_controls_expansion() {
        let validator = ResourceValidator::new(
            Arc::new(InMemoryConformanceStorage::new()),
            ValidationConfig::default(),
        );
        let vs = value_set();

        assert_eq!(validator.validate(&vs, false).await.unwrap(), ValidationPass::Structural);
        assert!(matches!(
            validator.validate(&vs, true).await.unwrap_err(),
            ValidationError::UnknownCodeSystem { .. }
        ));
    }

    #[tokio::test]
    async fn expands_against_stored_code_system() {
        let storage = Arc::new(InMemoryConformanceStorage::new());
        storage
            .upsert(
                ResourceKind::CodeSystem,
                ResourceIdentifier::unversioned("http://example.org/cs").unwrap(),
                json!({
                    "resourceType": "CodeSystem",
                    "url": "http://example.org/cs",
                    "content": "complete",
                    "concept": [{"code": "a"}, {"code": "b"}]
                }),
            )
            .await
            .unwrap();
        let validator = ResourceValidator::new(storage, ValidationConfig::default());

        let pass = validator.validate(&value_set(), true).await.unwrap();
        assert_eq!(pass.expanded_codes(), Some(2));
    }

    /// Storage whose lookups never complete.
    struct StalledStorage;

    #[async_trait]
    impl ConformanceStorage for StalledStorage {
        async fn upsert(
            &self,
            _kind: ResourceKind,
            _identifier: ResourceIdentifier,
            _content: Value,
        ) -> Result<UpsertResult, StoreError> {
            Err(StoreError::internal("read-only"))
        }

        async fn get(
            &self,
            _identifier: &ResourceIdentifier,
        ) -> Result<Option<StoredConformance>, StoreError> {
            Ok(None)
        }

        async fn find_code_system(
            &self,
            _url: &str,
            _version: Option<&str>,
        ) -> Result<Option<Value>, StoreError> {
            std::future::pending().await
        }

        async fn find_value_set(
            &self,
            _url: &str,
            _version: Option<&str>,
        ) -> Result<Option<Value>, StoreError> {
            std::future::pending().await
        }

        async fn list(&self, _kind: &ResourceKind) -> Result<Vec<StoredConformance>, StoreError> {
            Ok(Vec::new())
        }

        fn backend_name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn expansion_is_bounded_by_timeout() {
        let config = ValidationConfig {
            expansion_timeout_ms: 20,
            ..ValidationConfig::default()
        };
        let validator = ResourceValidator::new(Arc::new(StalledStorage), config);

        let started = std::time::Instant::now();
        let err = validator.validate(&value_set(), true).await.unwrap_err();
        assert_eq!(err, ValidationError::Timeout { timeout_ms: 20 });
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
