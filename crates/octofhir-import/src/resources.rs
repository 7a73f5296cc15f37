//! Typed views over the conformance resources the pipeline inspects.
//!
//! Only the elements used by parsing checks and terminology expansion are
//! modelled. The full JSON is always kept alongside and persisted unchanged.

use serde::Deserialize;

/// Publication status codes shared by all canonical resources.
pub const PUBLICATION_STATUSES: &[&str] = &["draft", "active", "retired", "unknown"];

/// `CodeSystem.content` codes.
pub const CODE_SYSTEM_CONTENT_MODES: &[&str] =
    &["not-present", "example", "fragment", "complete", "supplement"];

/// Typed view of the elements of a resource the parser inspects.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceModel {
    StructureDefinition(StructureDefinitionModel),
    ValueSet(ValueSetModel),
    CodeSystem(CodeSystemModel),
    /// Canonical resources with no kind-specific checks.
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureDefinitionModel {
    pub url: String,
    pub version: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub type_: Option<String>,
    pub kind: Option<String>,
    #[serde(rename = "abstract")]
    pub is_abstract: Option<bool>,
    pub base_definition: Option<String>,
    pub derivation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetModel {
    pub url: Option<String>,
    pub version: Option<String>,
    pub name: Option<String>,
    pub compose: Option<ValueSetCompose>,
    /// Pre-computed expansion shipped with the package, if any.
    pub expansion: Option<ValueSetExpansion>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSetCompose {
    #[serde(default)]
    pub include: Vec<ConceptSet>,
    #[serde(default)]
    pub exclude: Vec<ConceptSet>,
}

/// One `compose.include` or `compose.exclude` element.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSet {
    pub system: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub concept: Vec<ConceptReference>,
    #[serde(default)]
    pub filter: Vec<ConceptFilter>,
    #[serde(default)]
    pub value_set: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConceptReference {
    pub code: String,
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ValueSetExpansion {
    #[serde(default)]
    pub contains: Vec<ExpansionContains>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExpansionContains {
    pub system: Option<String>,
    pub version: Option<String>,
    pub code: Option<String>,
    pub display: Option<String>,
    #[serde(default)]
    pub contains: Vec<ExpansionContains>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConceptFilter {
    pub property: String,
    pub op: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSystemModel {
    pub url: Option<String>,
    pub version: Option<String>,
    pub content: Option<String>,
    #[serde(default)]
    pub concept: Vec<ConceptDefinition>,
}

impl CodeSystemModel {
    /// Whether the resource lists every code of the system.
    ///
    /// Resources without `content` are treated as complete.
    pub fn is_complete(&self) -> bool {
        matches!(self.content.as_deref(), None | Some("complete"))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConceptDefinition {
    pub code: Option<String>,
    pub display: Option<String>,
    #[serde(default)]
    pub property: Vec<ConceptProperty>,
    #[serde(default)]
    pub concept: Vec<ConceptDefinition>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptProperty {
    pub code: String,
    pub value_code: Option<String>,
    pub value_string: Option<String>,
    pub value_boolean: Option<bool>,
    pub value_integer: Option<i64>,
    pub value_decimal: Option<f64>,
    pub value_date_time: Option<String>,
}

impl ConceptProperty {
    /// Property value rendered as text for filter comparison.
    pub fn value_text(&self) -> Option<String> {
        if let Some(v) = &self.value_code {
            return Some(v.clone());
        }
        if let Some(v) = &self.value_string {
            return Some(v.clone());
        }
        if let Some(v) = self.value_boolean {
            return Some(v.to_string());
        }
        if let Some(v) = self.value_integer {
            return Some(v.to_string());
        }
        if let Some(v) = self.value_decimal {
            return Some(v.to_string());
        }
        self.value_date_time.clone()
    }
}
