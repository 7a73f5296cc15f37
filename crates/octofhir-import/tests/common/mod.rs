#![allow(dead_code)]

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use octofhir_core::{ResourceIdentifier, ResourceKind};
use octofhir_db_memory::InMemoryConformanceStorage;
use octofhir_storage::{ConformanceStorage, StoreError, StoredConformance, UpsertResult};
use serde_json::{Value, json};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Builds `.tgz` packages in memory.
#[derive(Default)]
pub struct PackageBuilder {
    files: Vec<(String, Vec<u8>)>,
}

impl PackageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `package/package.json`.
    pub fn manifest(self, name: &str, version: &str) -> Self {
        self.raw(
            "package/package.json",
            serde_json::to_vec(&json!({
                "name": name,
                "version": version,
                "fhirVersions": ["4.0.1"]
            }))
            .unwrap(),
        )
    }

    /// Adds a JSON resource under `package/`.
    pub fn resource(self, name: &str, resource: Value) -> Self {
        self.raw(
            &format!("package/{name}"),
            serde_json::to_vec(&resource).unwrap(),
        )
    }

    pub fn raw(mut self, path: &str, bytes: impl Into<Vec<u8>>) -> Self {
        self.files.push((path.to_string(), bytes.into()));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, data) in &self.files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(tar::EntryType::Regular);
            header.set_cksum();
            builder
                .append_data(&mut header, path, data.as_slice())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }
}

/// Storage wrapper counting every call that reaches the backend.
#[derive(Default)]
pub struct RecordingStorage {
    inner: InMemoryConformanceStorage,
    upserts: Mutex<Vec<String>>,
    lookups: AtomicUsize,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys passed to `upsert`, in call order.
    pub fn upserted_keys(&self) -> Vec<String> {
        self.upserts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.upserts.lock().unwrap().len() + self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConformanceStorage for RecordingStorage {
    async fn upsert(
        &self,
        kind: ResourceKind,
        identifier: ResourceIdentifier,
        content: Value,
    ) -> Result<UpsertResult, StoreError> {
        self.upserts.lock().unwrap().push(identifier.key());
        self.inner.upsert(kind, identifier, content).await
    }

    async fn get(
        &self,
        identifier: &ResourceIdentifier,
    ) -> Result<Option<StoredConformance>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get(identifier).await
    }

    async fn find_code_system(
        &self,
        url: &str,
        version: Option<&str>,
    ) -> Result<Option<Value>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_code_system(url, version).await
    }

    async fn find_value_set(
        &self,
        url: &str,
        version: Option<&str>,
    ) -> Result<Option<Value>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.find_value_set(url, version).await
    }

    async fn list(&self, kind: &ResourceKind) -> Result<Vec<StoredConformance>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.list(kind).await
    }

    fn backend_name(&self) -> &'static str {
        "recording"
    }
}

pub fn code_system(url: &str, codes: &[&str]) -> Value {
    json!({
        "resourceType": "CodeSystem",
        "url": url,
        "version": "1.0.0",
        "status": "active",
        "content": "complete",
        "concept": codes.iter().map(|c| json!({"code": c, "display": c})).collect::<Vec<_>>()
    })
}

pub fn value_set(url: &str, system: &str) -> Value {
    json!({
        "resourceType": "ValueSet",
        "url": url,
        "status": "active",
        "compose": {"include": [{"system": system}]}
    })
}

pub fn structure_definition(url: &str, name: &str) -> Value {
    json!({
        "resourceType": "StructureDefinition",
        "url": url,
        "name": name,
        "status": "active",
        "kind": "resource",
        "abstract": false,
        "type": "Patient",
        "baseDefinition": "http://hl7.org/fhir/StructureDefinition/Patient",
        "derivation": "constraint"
    })
}
