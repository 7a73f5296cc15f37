use async_trait::async_trait;
use dashmap::DashMap;
use octofhir_core::{ResourceIdentifier, ResourceKind, conformance_key};
use octofhir_storage::{
    ConformanceChangeEvent, ConformanceChangeOp, ConformanceStorage, StoreError,
    StoredConformance, UpsertAction, UpsertResult,
};
use papaya::HashMap as PapayaHashMap;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;

/// Capacity of the change notification channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Per canonical URL bookkeeping.
///
/// A URL is bound to one resource kind for its whole lifetime in the store.
#[derive(Debug)]
struct CanonicalSlot {
    kind: ResourceKind,
    /// Key of the most recently written version of this URL.
    latest_key: String,
}

/// In-memory conformance storage.
///
/// This storage implementation provides:
/// - Lock-free reads via papaya::HashMap keyed by [`conformance_key`]
/// - Writes serialized per canonical URL through a dashmap entry guard, so
///   upserts to distinct URLs run concurrently and upserts to the same key
///   are applied one after another
/// - A monotonically increasing store revision on every write
/// - Change notifications over a broadcast channel
#[derive(Debug)]
pub struct InMemoryConformanceStorage {
    /// Records keyed by `url|version`
    records: Arc<PapayaHashMap<String, StoredConformance>>,
    /// Canonical URL -> kind and latest key
    canonicals: DashMap<String, CanonicalSlot>,
    /// Atomic counter for generating version IDs
    version_counter: AtomicU64,
    events: broadcast::Sender<ConformanceChangeEvent>,
}

impl Default for InMemoryConformanceStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryConformanceStorage {
    /// Creates a new empty storage.
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Creates a new empty storage with a custom notification buffer size.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            records: Arc::new(PapayaHashMap::new()),
            canonicals: DashMap::new(),
            version_counter: AtomicU64::new(1),
            events,
        }
    }

    /// Subscribes to change notifications for subsequent writes.
    pub fn subscribe(&self) -> broadcast::Receiver<ConformanceChangeEvent> {
        self.events.subscribe()
    }

    /// Number of stored records across all kinds.
    pub fn len(&self) -> usize {
        self.records.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Generates the next version ID.
    fn next_version(&self) -> String {
        self.version_counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
    }

    /// Resolves a record for a URL, optionally pinned to a version, of the given kind.
    fn find_content(&self, kind: &ResourceKind, url: &str, version: Option<&str>) -> Option<Value> {
        let key = {
            let slot = self.canonicals.get(url)?;
            if &slot.kind != kind {
                return None;
            }
            match version {
                Some(version) => conformance_key(url, Some(version)),
                None => slot.latest_key.clone(),
            }
        };
        let guard = self.records.pin();
        guard.get(&key).map(|stored| stored.resource.clone())
    }

    fn notify(&self, kind: ResourceKind, operation: ConformanceChangeOp, key: String, url: String) {
        // No receivers is not an error.
        let _ = self.events.send(ConformanceChangeEvent {
            kind,
            operation,
            key,
            url,
        });
    }
}

#[async_trait]
impl ConformanceStorage for InMemoryConformanceStorage {
    async fn upsert(
        &self,
        kind: ResourceKind,
        identifier: ResourceIdentifier,
        content: Value,
    ) -> Result<UpsertResult, StoreError> {
        if !content.is_object() {
            return Err(StoreError::invalid_resource(
                "conformance content must be a JSON object",
            ));
        }

        let key = identifier.key();
        let url = identifier.url.clone();

        // The entry guard is held until the record is published, which
        // serializes writers of the same canonical URL.
        let mut slot = self
            .canonicals
            .entry(url.clone())
            .or_insert_with(|| CanonicalSlot {
                kind: kind.clone(),
                latest_key: key.clone(),
            });

        if slot.kind != kind {
            return Err(StoreError::kind_mismatch(
                &url,
                slot.kind.to_string(),
                kind.to_string(),
            ));
        }

        let version_id = self.next_version();
        let guard = self.records.pin();
        let (action, record) = match guard.get(&key) {
            Some(existing) => (UpsertAction::Updated, existing.new_version(version_id, content)),
            None => (
                UpsertAction::Created,
                StoredConformance::new(kind.clone(), identifier, version_id, content),
            ),
        };
        guard.insert(key.clone(), record.clone());

        slot.latest_key = key.clone();
        drop(slot);

        tracing::debug!(
            backend = self.backend_name(),
            key = %key,
            kind = %kind,
            version_id = %record.version_id,
            action = %action,
            "conformance resource stored"
        );

        let operation = match action {
            UpsertAction::Created => ConformanceChangeOp::Insert,
            UpsertAction::Updated => ConformanceChangeOp::Update,
        };
        self.notify(kind, operation, key, url);

        Ok(UpsertResult { action, record })
    }

    async fn get(
        &self,
        identifier: &ResourceIdentifier,
    ) -> Result<Option<StoredConformance>, StoreError> {
        let guard = self.records.pin();
        Ok(guard.get(&identifier.key()).cloned())
    }

    async fn find_code_system(
        &self,
        url: &str,
        version: Option<&str>,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.find_content(&ResourceKind::CodeSystem, url, version))
    }

    async fn find_value_set(
        &self,
        url: &str,
        version: Option<&str>,
    ) -> Result<Option<Value>, StoreError> {
        Ok(self.find_content(&ResourceKind::ValueSet, url, version))
    }

    async fn list(&self, kind: &ResourceKind) -> Result<Vec<StoredConformance>, StoreError> {
        let guard = self.records.pin();
        let mut records: Vec<StoredConformance> = guard
            .iter()
            .filter(|(_, stored)| &stored.kind == kind)
            .map(|(_, stored)| stored.clone())
            .collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
