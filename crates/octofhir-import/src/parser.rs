//! Parses archive entries into typed conformance resources.

use octofhir_core::{ResourceIdentifier, ResourceKind, is_valid_resource_type_name};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::archive::{ArchiveEntry, MediaType};
use crate::error::{ParseError, ParseFailure};
use crate::resources::{
    CODE_SYSTEM_CONTENT_MODES, CodeSystemModel, ConceptDefinition, PUBLICATION_STATUSES,
    ResourceModel, StructureDefinitionModel, ValueSetModel,
};

/// A resource owned by the pipeline between parsing and persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResource {
    pub kind: ResourceKind,
    pub identifier: ResourceIdentifier,
    /// Set by the coordinator once validation passed.
    pub validated: bool,
    /// The document exactly as found in the archive.
    pub content: Value,
    pub model: ResourceModel,
}

impl ParsedResource {
    pub fn value_set(&self) -> Option<&ValueSetModel> {
        match &self.model {
            ResourceModel::ValueSet(vs) => Some(vs),
            _ => None,
        }
    }
}

/// Structural parser for package entries.
///
/// Stateless; constructed once per coordinator and shared across entries.
#[derive(Debug, Clone, Default)]
pub struct ResourceParser {
    _private: (),
}

impl ResourceParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(&self, entry: &ArchiveEntry) -> Result<ParsedResource, ParseError> {
        self.parse_bytes(&entry.bytes, entry.media_type)
            .map_err(|cause| ParseError::new(&entry.path, cause))
    }

    fn parse_bytes(&self, bytes: &[u8], media_type: MediaType) -> Result<ParsedResource, ParseFailure> {
        match media_type {
            MediaType::FhirJson => {}
            MediaType::FhirXml => {
                return Err(ParseFailure::UnsupportedFormat(media_type.to_string()));
            }
            MediaType::OctetStream => {
                return Err(ParseFailure::UnsupportedFormat(
                    "payload is not a FHIR resource".into(),
                ));
            }
        }

        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let content: Value =
            serde_json::from_slice(bytes).map_err(|e| ParseFailure::InvalidJson(e.to_string()))?;
        let object = content
            .as_object()
            .ok_or_else(|| ParseFailure::InvalidJson("top-level value is not an object".into()))?;

        // Kind comes from the payload itself; entry names are not reliable.
        let resource_type = match object.get("resourceType") {
            None => return Err(ParseFailure::MissingElement("resourceType")),
            Some(Value::String(s)) => s.as_str(),
            Some(_) => {
                return Err(ParseFailure::invalid_element(
                    "resourceType",
                    "must be a string",
                ));
            }
        };
        if !is_valid_resource_type_name(resource_type) {
            return Err(ParseFailure::invalid_element(
                "resourceType",
                format!("'{resource_type}' is not a resource type name"),
            ));
        }
        let kind = ResourceKind::recognize(resource_type)
            .ok_or_else(|| ParseFailure::UnsupportedResourceType(resource_type.to_string()))?;

        let url = required_string(object, "url")?;
        validate_canonical_url(url)?;
        let version = optional_string(object, "version")?;
        if let Some(status) = optional_string(object, "status")? {
            if !PUBLICATION_STATUSES.contains(&status.as_str()) {
                return Err(ParseFailure::invalid_element(
                    "status",
                    format!("'{status}' is not one of {PUBLICATION_STATUSES:?}"),
                ));
            }
        }

        let identifier = ResourceIdentifier::new(url, version)
            .map_err(|e| ParseFailure::invalid_element("url", e.to_string()))?;

        let model = match &kind {
            ResourceKind::StructureDefinition => {
                let sd: StructureDefinitionModel = typed_view(&content)?;
                check_structure_definition(&sd)?;
                ResourceModel::StructureDefinition(sd)
            }
            ResourceKind::ValueSet => {
                let vs: ValueSetModel = typed_view(&content)?;
                check_value_set(&vs)?;
                ResourceModel::ValueSet(vs)
            }
            ResourceKind::CodeSystem => {
                let cs: CodeSystemModel = typed_view(&content)?;
                check_code_system(&cs)?;
                ResourceModel::CodeSystem(cs)
            }
            ResourceKind::Other(_) => ResourceModel::Other,
        };

        Ok(ParsedResource {
            kind,
            identifier,
            validated: false,
            content,
            model,
        })
    }
}

type JsonObject = serde_json::Map<String, Value>;

fn required_string<'a>(object: &'a JsonObject, element: &'static str) -> Result<&'a str, ParseFailure> {
    match object.get(element) {
        None | Some(Value::Null) => Err(ParseFailure::MissingElement(element)),
        Some(Value::String(s)) if s.trim().is_empty() => Err(ParseFailure::MissingElement(element)),
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ParseFailure::invalid_element(element, "must be a string")),
    }
}

fn optional_string(object: &JsonObject, element: &'static str) -> Result<Option<String>, ParseFailure> {
    match object.get(element) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(ParseFailure::invalid_element(element, "must be a string")),
    }
}

fn validate_canonical_url(url: &str) -> Result<(), ParseFailure> {
    if url.contains('|') {
        return Err(ParseFailure::invalid_element(
            "url",
            "must not carry a version suffix",
        ));
    }
    url::Url::parse(url)
        .map(|_| ())
        .map_err(|e| ParseFailure::invalid_element("url", format!("'{url}' is not an absolute URI: {e}")))
}

fn typed_view<T: DeserializeOwned>(content: &Value) -> Result<T, ParseFailure> {
    T::deserialize(content).map_err(|e| ParseFailure::invalid_element("content", e.to_string()))
}

fn check_structure_definition(sd: &StructureDefinitionModel) -> Result<(), ParseFailure> {
    if sd.name.as_deref().is_none_or(str::is_empty) {
        return Err(ParseFailure::MissingElement("name"));
    }
    if sd.type_.as_deref().is_none_or(str::is_empty) {
        return Err(ParseFailure::MissingElement("type"));
    }
    Ok(())
}

fn check_value_set(vs: &ValueSetModel) -> Result<(), ParseFailure> {
    let Some(compose) = &vs.compose else {
        return Ok(());
    };
    if compose.include.is_empty() {
        return Err(ParseFailure::MissingElement("compose.include"));
    }
    for (index, set) in compose.include.iter().chain(&compose.exclude).enumerate() {
        if set.system.is_none() && set.value_set.is_empty() {
            return Err(ParseFailure::invalid_element(
                format!("compose set {index}"),
                "must declare a system or a valueSet",
            ));
        }
        if set.system.is_none() && (!set.concept.is_empty() || !set.filter.is_empty()) {
            return Err(ParseFailure::invalid_element(
                format!("compose set {index}"),
                "concepts and filters require a system",
            ));
        }
        if !set.concept.is_empty() && !set.filter.is_empty() {
            return Err(ParseFailure::invalid_element(
                format!("compose set {index}"),
                "cannot combine concept and filter",
            ));
        }
    }
    Ok(())
}

fn check_code_system(cs: &CodeSystemModel) -> Result<(), ParseFailure> {
    match cs.content.as_deref() {
        None => return Err(ParseFailure::MissingElement("content")),
        Some(content) if !CODE_SYSTEM_CONTENT_MODES.contains(&content) => {
            return Err(ParseFailure::invalid_element(
                "content",
                format!("'{content}' is not one of {CODE_SYSTEM_CONTENT_MODES:?}"),
            ));
        }
        Some(_) => {}
    }
    fn walk(concepts: &[ConceptDefinition]) -> Result<(), ParseFailure> {
        for concept in concepts {
            if concept.code.as_deref().is_none_or(str::is_empty) {
                return Err(ParseFailure::MissingElement("concept.code"));
            }
            walk(&concept.concept)?;
        }
        Ok(())
    }
    walk(&cs.concept)
}
