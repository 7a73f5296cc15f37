//! ValueSet expansion against stored code systems.
//!
//! Used by test-mode validation to prove a ValueSet resolves to a non-empty
//! set of codes before it is persisted.

use octofhir_core::ResourceIdentifier;
use octofhir_storage::ConformanceStorage;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use crate::error::ValidationError;
use crate::resources::{
    CodeSystemModel, ConceptDefinition, ConceptFilter, ConceptProperty, ConceptSet,
    ExpansionContains, ValueSetModel,
};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A code in the expansion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpansionCode {
    pub system: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Ordered, de-duplicated code list with a size cap.
#[derive(Debug, Default)]
struct CodeList {
    codes: Vec<ExpansionCode>,
    seen: HashSet<(String, String)>,
}

impl CodeList {
    fn push(&mut self, code: ExpansionCode, limit: usize) -> Result<(), ValidationError> {
        if !self.seen.insert((code.system.clone(), code.code.clone())) {
            return Ok(());
        }
        if self.codes.len() >= limit {
            return Err(ValidationError::TooLarge { limit });
        }
        self.codes.push(code);
        Ok(())
    }

    fn contains(&self, system: &str, code: &str) -> bool {
        self.seen.contains(&(system.to_string(), code.to_string()))
    }

    fn retain_common(&mut self, other: &CodeList) {
        self.codes.retain(|c| other.contains(&c.system, &c.code));
        self.seen = self
            .codes
            .iter()
            .map(|c| (c.system.clone(), c.code.clone()))
            .collect();
    }
}

/// Expands ValueSets by resolving code systems and imports through storage.
pub struct ValueSetExpander<'a> {
    storage: &'a dyn ConformanceStorage,
    max_codes: usize,
}

impl<'a> ValueSetExpander<'a> {
    pub fn new(storage: &'a dyn ConformanceStorage, max_codes: usize) -> Self {
        Self { storage, max_codes }
    }

    /// Computes the expansion of `value_set`.
    ///
    /// # Errors
    ///
    /// Fails when a referenced code system or imported value set is unknown,
    /// when a listed code does not exist, when imports form a cycle, when the
    /// result exceeds the code cap, or when the expansion is empty.
    pub async fn expand(
        &self,
        value_set: &ValueSetModel,
    ) -> Result<Vec<ExpansionCode>, ValidationError> {
        let mut visiting: Vec<String> = value_set.url.iter().cloned().collect();
        let list = self.expand_value_set(value_set, &mut visiting).await?;
        if list.codes.is_empty() {
            return Err(ValidationError::EmptyExpansion);
        }
        Ok(list.codes)
    }

    fn expand_value_set<'b>(
        &'b self,
        value_set: &'b ValueSetModel,
        visiting: &'b mut Vec<String>,
    ) -> BoxFuture<'b, Result<CodeList, ValidationError>> {
        Box::pin(async move {
            let Some(compose) = &value_set.compose else {
                // Packages may ship value sets with only a pre-computed expansion.
                let mut list = CodeList::default();
                if let Some(expansion) = &value_set.expansion {
                    collect_contains(&expansion.contains, &mut list, self.max_codes)?;
                }
                return Ok(list);
            };

            // Process compose.exclude first to build exclusion set
            let mut excluded: HashSet<(String, String)> = HashSet::new();
            for set in &compose.exclude {
                let list = self.expand_set(set, visiting).await?;
                excluded.extend(list.seen);
            }

            let mut result = CodeList::default();
            for set in &compose.include {
                let list = self.expand_set(set, visiting).await?;
                for code in list.codes {
                    if excluded.contains(&(code.system.clone(), code.code.clone())) {
                        continue;
                    }
                    result.push(code, self.max_codes)?;
                }
            }
            Ok(result)
        })
    }

    /// Codes selected by one include/exclude element.
    ///
    /// System-based codes and each imported value set are intersected.
    async fn expand_set(
        &self,
        set: &ConceptSet,
        visiting: &mut Vec<String>,
    ) -> Result<CodeList, ValidationError> {
        let mut sources: Vec<CodeList> = Vec::new();

        if let Some(system) = &set.system {
            let code_system = self.load_code_system(system, set.version.as_deref()).await?;
            let version = set.version.clone().or_else(|| code_system.version.clone());
            let list = if !set.concept.is_empty() {
                self.listed_concepts(system, version, set, &code_system)?
            } else if !set.filter.is_empty() {
                self.filtered_concepts(system, version, &set.filter, &code_system)?
            } else {
                self.all_concepts(system, version, &code_system)?
            };
            sources.push(list);
        }

        for canonical in &set.value_set {
            let imported = self.expand_import(canonical, visiting).await?;
            sources.push(imported);
        }

        // Keep long expansions responsive to the caller's timeout.
        tokio::task::yield_now().await;

        let mut sources = sources.into_iter();
        let Some(mut list) = sources.next() else {
            return Ok(CodeList::default());
        };
        for other in sources {
            list.retain_common(&other);
        }
        Ok(list)
    }

    async fn expand_import(
        &self,
        canonical: &str,
        visiting: &mut Vec<String>,
    ) -> Result<CodeList, ValidationError> {
        let reference = ResourceIdentifier::parse_canonical(canonical)
            .map_err(|_| ValidationError::UnresolvableValueSet(canonical.to_string()))?;
        let url = reference.url.as_str();
        if visiting.iter().any(|v| v == url) {
            return Err(ValidationError::CyclicValueSet(url.to_string()));
        }

        let content = self
            .storage
            .find_value_set(url, reference.version.as_deref())
            .await?
            .ok_or_else(|| ValidationError::UnresolvableValueSet(canonical.to_string()))?;
        let imported: ValueSetModel = serde_json::from_value(content).map_err(|e| {
            ValidationError::Lookup(format!("stored value set {canonical} is unreadable: {e}"))
        })?;

        visiting.push(url.to_string());
        let result = self.expand_value_set(&imported, visiting).await;
        visiting.pop();
        result
    }

    /// Load a CodeSystem by URL.
    async fn load_code_system(
        &self,
        system: &str,
        version: Option<&str>,
    ) -> Result<CodeSystemModel, ValidationError> {
        let content = self
            .storage
            .find_code_system(system, version)
            .await?
            .ok_or_else(|| ValidationError::UnknownCodeSystem {
                system: system.to_string(),
                version: version.map(String::from),
            })?;
        serde_json::from_value(content).map_err(|e| {
            ValidationError::Lookup(format!("stored code system {system} is unreadable: {e}"))
        })
    }

    /// Explicit concept list; codes must exist when the system is complete.
    fn listed_concepts(
        &self,
        system: &str,
        version: Option<String>,
        set: &ConceptSet,
        code_system: &CodeSystemModel,
    ) -> Result<CodeList, ValidationError> {
        let known: HashMap<&str, Option<&str>> = flatten(&code_system.concept)
            .iter()
            .map(|c| (c.code, c.display))
            .collect();

        let mut list = CodeList::default();
        for concept in &set.concept {
            let known_display = match known.get(concept.code.as_str()) {
                Some(display) => *display,
                None if code_system.is_complete() => {
                    return Err(ValidationError::UnknownCode {
                        system: system.to_string(),
                        code: concept.code.clone(),
                    });
                }
                None => None,
            };
            let display = concept
                .display
                .clone()
                .or_else(|| known_display.map(String::from));
            list.push(
                ExpansionCode {
                    system: system.to_string(),
                    code: concept.code.clone(),
                    display,
                    version: version.clone(),
                },
                self.max_codes,
            )?;
        }
        Ok(list)
    }

    fn filtered_concepts(
        &self,
        system: &str,
        version: Option<String>,
        filters: &[ConceptFilter],
        code_system: &CodeSystemModel,
    ) -> Result<CodeList, ValidationError> {
        let compiled = filters
            .iter()
            .map(CompiledFilter::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let concepts = flatten(&code_system.concept);
        let hierarchy = Hierarchy::new(&concepts);

        let mut list = CodeList::default();
        for concept in &concepts {
            if compiled.iter().all(|f| f.matches(concept, &hierarchy)) {
                list.push(concept.to_code(system, &version), self.max_codes)?;
            }
        }
        Ok(list)
    }

    /// Include all codes from a CodeSystem, nested concepts included.
    fn all_concepts(
        &self,
        system: &str,
        version: Option<String>,
        code_system: &CodeSystemModel,
    ) -> Result<CodeList, ValidationError> {
        let mut list = CodeList::default();
        for concept in flatten(&code_system.concept) {
            list.push(concept.to_code(system, &version), self.max_codes)?;
        }
        Ok(list)
    }
}

fn collect_contains(
    contains: &[ExpansionContains],
    list: &mut CodeList,
    limit: usize,
) -> Result<(), ValidationError> {
    for item in contains {
        if let (Some(system), Some(code)) = (&item.system, &item.code) {
            list.push(
                ExpansionCode {
                    system: system.clone(),
                    code: code.clone(),
                    display: item.display.clone(),
                    version: item.version.clone(),
                },
                limit,
            )?;
        }
        collect_contains(&item.contains, list, limit)?;
    }
    Ok(())
}

/// A concept with its position in the CodeSystem hierarchy.
#[derive(Debug)]
struct FlatConcept<'a> {
    code: &'a str,
    display: Option<&'a str>,
    properties: &'a [ConceptProperty],
    parents: Vec<&'a str>,
}

impl FlatConcept<'_> {
    fn to_code(&self, system: &str, version: &Option<String>) -> ExpansionCode {
        ExpansionCode {
            system: system.to_string(),
            code: self.code.to_string(),
            display: self.display.map(String::from),
            version: version.clone(),
        }
    }

    fn property_values<'p>(&'p self, property: &'p str) -> impl Iterator<Item = String> + 'p {
        self.properties
            .iter()
            .filter(move |p| p.code == property)
            .filter_map(ConceptProperty::value_text)
    }
}

/// Depth-first flattening; parents come from nesting and `parent` properties.
fn flatten(concepts: &[ConceptDefinition]) -> Vec<FlatConcept<'_>> {
    fn walk<'a>(concepts: &'a [ConceptDefinition], parent: Option<&'a str>, out: &mut Vec<FlatConcept<'a>>) {
        for concept in concepts {
            let Some(code) = concept.code.as_deref() else {
                continue;
            };
            let mut parents: Vec<&str> = parent.into_iter().collect();
            for property in &concept.property {
                if property.code == "parent" {
                    if let Some(value) = property.value_code.as_deref() {
                        parents.push(value);
                    }
                }
            }
            out.push(FlatConcept {
                code,
                display: concept.display.as_deref(),
                properties: &concept.property,
                parents,
            });
            walk(&concept.concept, Some(code), out);
        }
    }

    let mut out = Vec::new();
    walk(concepts, None, &mut out);
    out
}

/// Parent links of a CodeSystem for subsumption filters.
struct Hierarchy<'a> {
    parents: HashMap<&'a str, Vec<&'a str>>,
}

impl<'a> Hierarchy<'a> {
    fn new(concepts: &[FlatConcept<'a>]) -> Self {
        let mut parents: HashMap<&'a str, Vec<&'a str>> = HashMap::new();
        for concept in concepts {
            parents
                .entry(concept.code)
                .or_default()
                .extend(concept.parents.iter().copied());
        }
        Self { parents }
    }

    /// True when `code` is a strict descendant of `ancestor`.
    fn descends_from(&self, code: &str, ancestor: &str) -> bool {
        let mut stack: Vec<&str> = vec![code];
        let mut visited: HashSet<&str> = HashSet::new();
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            for parent in self.parents.get(current).into_iter().flatten() {
                if *parent == ancestor {
                    return true;
                }
                stack.push(*parent);
            }
        }
        false
    }
}

/// A `compose.include.filter` ready to evaluate.
#[derive(Debug)]
enum CompiledFilter {
    IsA(String),
    DescendentOf(String),
    IsNotA(String),
    CodeEquals(String),
    CodeIn(HashSet<String>),
    CodeRegex(Regex),
    DisplayEquals(String),
    PropertyEquals { property: String, value: String },
    PropertyIn { property: String, values: HashSet<String> },
    PropertyRegex { property: String, regex: Regex },
    PropertyExists { property: String, exists: bool },
}

impl CompiledFilter {
    fn compile(filter: &ConceptFilter) -> Result<Self, ValidationError> {
        let property = filter.property.as_str();
        let value = filter.value.clone();
        let compiled = match (property, filter.op.as_str()) {
            ("concept", "is-a") => Self::IsA(value),
            ("concept", "descendent-of") => Self::DescendentOf(value),
            ("concept", "is-not-a") => Self::IsNotA(value),
            ("concept" | "code", "=") => Self::CodeEquals(value),
            ("concept" | "code", "in") => Self::CodeIn(split_list(&value)),
            ("concept" | "code", "regex") => Self::CodeRegex(anchored_regex(&value)?),
            ("display", "=") => Self::DisplayEquals(value),
            (_, "=") => Self::PropertyEquals {
                property: property.to_string(),
                value,
            },
            (_, "in") => Self::PropertyIn {
                property: property.to_string(),
                values: split_list(&value),
            },
            (_, "regex") => Self::PropertyRegex {
                property: property.to_string(),
                regex: anchored_regex(&value)?,
            },
            (_, "exists") => Self::PropertyExists {
                property: property.to_string(),
                exists: match value.as_str() {
                    "true" => true,
                    "false" => false,
                    other => {
                        return Err(ValidationError::InvalidFilter(format!(
                            "exists filter value must be true or false, got '{other}'"
                        )));
                    }
                },
            },
            (_, op) => {
                return Err(ValidationError::InvalidFilter(format!(
                    "unsupported filter {property} {op}"
                )));
            }
        };
        Ok(compiled)
    }

    fn matches(&self, concept: &FlatConcept<'_>, hierarchy: &Hierarchy<'_>) -> bool {
        match self {
            Self::IsA(code) => concept.code == code || hierarchy.descends_from(concept.code, code),
            Self::DescendentOf(code) => {
                concept.code != code && hierarchy.descends_from(concept.code, code)
            }
            Self::IsNotA(code) => {
                concept.code != code && !hierarchy.descends_from(concept.code, code)
            }
            Self::CodeEquals(code) => concept.code == code,
            Self::CodeIn(codes) => codes.contains(concept.code),
            Self::CodeRegex(regex) => regex.is_match(concept.code),
            Self::DisplayEquals(display) => concept.display == Some(display.as_str()),
            Self::PropertyEquals { property, value } => {
                concept.property_values(property).any(|v| &v == value)
            }
            Self::PropertyIn { property, values } => {
                concept.property_values(property).any(|v| values.contains(&v))
            }
            Self::PropertyRegex { property, regex } => {
                concept.property_values(property).any(|v| regex.is_match(&v))
            }
            Self::PropertyExists { property, exists } => {
                concept.property_values(property).next().is_some() == *exists
            }
        }
    }
}

fn split_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn anchored_regex(pattern: &str) -> Result<Regex, ValidationError> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| ValidationError::InvalidFilter(format!("invalid regex '{pattern}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use octofhir_core::{ResourceIdentifier, ResourceKind};
    use octofhir_db_memory::InMemoryConformanceStorage;
    use serde_json::{Value, json};

    const CS_URL: &str = "http://example.org/cs/animals";

    async fn storage_with(resources: Vec<(ResourceKind, Value)>) -> InMemoryConformanceStorage {
        let storage = InMemoryConformanceStorage::new();
        for (kind, content) in resources {
            let identifier = ResourceIdentifier::new(
                content["url"].as_str().unwrap(),
                content["version"].as_str().map(String::from),
            )
            .unwrap();
            storage.upsert(kind, identifier, content).await.unwrap();
        }
        storage
    }

    fn animals() -> (ResourceKind, Value) {
        (
            ResourceKind::CodeSystem,
            json!({
                "resourceType": "CodeSystem",
                "url": CS_URL,
                "version": "1.0.0",
                "content": "complete",
                "concept": [
                    {"code": "animal", "display": "Animal", "concept": [
                        {"code": "mammal", "display": "Mammal", "concept": [
                            {"code": "dog", "display": "Dog", "property": [{"code": "legs", "valueInteger": 4}]},
                            {"code": "cat", "display": "Cat", "property": [{"code": "legs", "valueInteger": 4}]}
                        ]},
                        {"code": "bird", "display": "Bird", "property": [{"code": "legs", "valueInteger": 2}]}
                    ]},
                    {"code": "plant", "display": "Plant"},
                    {"code": "fern", "display": "Fern", "property": [{"code": "parent", "valueCode": "plant"}]}
                ]
            }),
        )
    }

    fn value_set(compose: Value) -> ValueSetModel {
        serde_json::from_value(json!({
            "resourceType": "ValueSet",
            "url": "http://example.org/vs/test",
            "compose": compose
        }))
        .unwrap()
    }

    fn codes(expansion: &[ExpansionCode]) -> Vec<&str> {
        expansion.iter().map(|c| c.code.as_str()).collect()
    }

    #[tokio::test]
    async fn includes_all_concepts_of_system() {
        let storage = storage_with(vec![animals()]).await;
        let expander = ValueSetExpander::new(&storage, 100);
        let vs = value_set(json!({"include": [{"system": CS_URL}]}));

        let expansion = expander.expand(&vs).await.unwrap();
        assert_eq!(
            codes(&expansion),
            vec!["animal", "mammal", "dog", "cat", "bird", "plant", "fern"]
        );
        assert_eq!(expansion[0].version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn unknown_code_system_fails() {
        let storage = InMemoryConformanceStorage::new();
        let expander = ValueSetExpander::new(&storage, 100);
        let vs = value_set(json!({"include": [{"system": "http://example.org/missing"}]}));

        let err = expander.expand(&vs).await.unwrap_err();
        assert!(matches!(err, ValidationError::UnknownCodeSystem { .. }));
    }

    #[tokio::test]
    async fn concept_list_codes_must_exist() {
        let storage = storage_with(vec![animals()]).await;
        let expander = ValueSetExpander::new(&storage, 100);

        let vs = value_set(json!({"include": [{"system": CS_URL, "concept": [
            {"code": "dog"}, {"code": "cat", "display": "Kitty"}
        ]}]}));
        let expansion = expander.expand(&vs).await.unwrap();
        assert_eq!(codes(&expansion), vec!["dog", "cat"]);
        assert_eq!(expansion[0].display.as_deref(), Some("Dog"));
        assert_eq!(expansion[1].display.as_deref(), Some("Kitty"));

        let vs = value_set(json!({"include": [{"system": CS_URL, "concept": [{"code": "unicorn"}]}]}));
        let err = expander.expand(&vs).await.unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownCode {
                system: CS_URL.into(),
                code: "unicorn".into()
            }
        );
    }

    #[tokio::test]
    async fn hierarchy_filters() {
        let storage = storage_with(vec![animals()]).await;
        let expander = ValueSetExpander::new(&storage, 100);

        let is_a = value_set(json!({"include": [{"system": CS_URL, "filter": [
            {"property": "concept", "op": "is-a", "value": "mammal"}
        ]}]}));
        assert_eq!(codes(&expander.expand(&is_a).await.unwrap()), vec!["mammal", "dog", "cat"]);

        let descendants = value_set(json!({"include": [{"system": CS_URL, "filter": [
            {"property": "concept", "op": "descendent-of", "value": "animal"}
        ]}]}));
        assert_eq!(
            codes(&expander.expand(&descendants).await.unwrap()),
            vec!["mammal", "dog", "cat", "bird"]
        );

        // `parent` properties count as hierarchy links too.
        let plants = value_set(json!({"include": [{"system": CS_URL, "filter": [
            {"property": "concept", "op": "descendent-of", "value": "plant"}
        ]}]}));
        assert_eq!(codes(&expander.expand(&plants).await.unwrap()), vec!["fern"]);
    }

    #[tokio::test]
    async fn property_filters_and_exclusions() {
        let storage = storage_with(vec![animals()]).await;
        let expander = ValueSetExpander::new(&storage, 100);

        let vs = value_set(json!({
            "include": [{"system": CS_URL, "filter": [{"property": "legs", "op": "=", "value": "4"}]}],
            "exclude": [{"system": CS_URL, "concept": [{"code": "cat"}]}]
        }));
        assert_eq!(codes(&expander.expand(&vs).await.unwrap()), vec!["dog"]);

        let vs = value_set(json!({"include": [{"system": CS_URL, "filter": [
            {"property": "code", "op": "regex", "value": "[bc].*"}
        ]}]}));
        assert_eq!(codes(&expander.expand(&vs).await.unwrap()), vec!["cat", "bird"]);

        let vs = value_set(json!({"include": [{"system": CS_URL, "filter": [
            {"property": "legs", "op": "generalizes", "value": "x"}
        ]}]}));
        assert!(matches!(
            expander.expand(&vs).await.unwrap_err(),
            ValidationError::InvalidFilter(_)
        ));
    }

    #[tokio::test]
    async fn empty_expansion_fails() {
        let storage = storage_with(vec![animals()]).await;
        let expander = ValueSetExpander::new(&storage, 100);
        let vs = value_set(json!({
            "include": [{"system": CS_URL, "concept": [{"code": "dog"}]}],
            "exclude": [{"system": CS_URL, "concept": [{"code": "dog"}]}]
        }));
        assert_eq!(expander.expand(&vs).await.unwrap_err(), ValidationError::EmptyExpansion);
    }

    #[tokio::test]
    async fn code_cap_is_enforced() {
        let storage = storage_with(vec![animals()]).await;
        let expander = ValueSetExpander::new(&storage, 3);
        let vs = value_set(json!({"include": [{"system": CS_URL}]}));
        assert_eq!(
            expander.expand(&vs).await.unwrap_err(),
            ValidationError::TooLarge { limit: 3 }
        );
    }

    #[tokio::test]
    async fn value_set_imports_resolve_through_storage() {
        let mammals = (
            ResourceKind::ValueSet,
            json!({
                "resourceType": "ValueSet",
                "url": "http://example.org/vs/mammals",
                "compose": {"include": [{"system": CS_URL, "filter": [
                    {"property": "concept", "op": "is-a", "value": "mammal"}
                ]}]}
            }),
        );
        let storage = storage_with(vec![animals(), mammals]).await;
        let expander = ValueSetExpander::new(&storage, 100);

        let vs = value_set(json!({"include": [{"valueSet": ["http://example.org/vs/mammals"]}]}));
        assert_eq!(codes(&expander.expand(&vs).await.unwrap()), vec!["mammal", "dog", "cat"]);

        // System and import together intersect.
        let vs = value_set(json!({"include": [{
            "system": CS_URL,
            "concept": [{"code": "dog"}, {"code": "bird"}],
            "valueSet": ["http://example.org/vs/mammals"]
        }]}));
        assert_eq!(codes(&expander.expand(&vs).await.unwrap()), vec!["dog"]);

        let vs = value_set(json!({"include": [{"valueSet": ["http://example.org/vs/missing"]}]}));
        assert!(matches!(
            expander.expand(&vs).await.unwrap_err(),
            ValidationError::UnresolvableValueSet(_)
        ));
    }

    #[tokio::test]
    async fn import_cycles_are_detected() {
        let a = (
            ResourceKind::ValueSet,
            json!({
                "resourceType": "ValueSet",
                "url": "http://example.org/vs/a",
                "compose": {"include": [{"valueSet": ["http://example.org/vs/b"]}]}
            }),
        );
        let b = (
            ResourceKind::ValueSet,
            json!({
                "resourceType": "ValueSet",
                "url": "http://example.org/vs/b",
                "compose": {"include": [{"valueSet": ["http://example.org/vs/a"]}]}
            }),
        );
        let storage = storage_with(vec![a, b]).await;
        let expander = ValueSetExpander::new(&storage, 100);

        let vs: ValueSetModel = serde_json::from_value(json!({
            "url": "http://example.org/vs/a",
            "compose": {"include": [{"valueSet": ["http://example.org/vs/b"]}]}
        }))
        .unwrap();
        assert_eq!(
            expander.expand(&vs).await.unwrap_err(),
            ValidationError::CyclicValueSet("http://example.org/vs/a".into())
        );
    }

    #[tokio::test]
    async fn pre_expanded_value_set_without_compose() {
        let storage = InMemoryConformanceStorage::new();
        let expander = ValueSetExpander::new(&storage, 100);
        let vs: ValueSetModel = serde_json::from_value(json!({
            "url": "http://example.org/vs/pre",
            "expansion": {"contains": [
                {"system": "http://x", "code": "a", "contains": [{"system": "http://x", "code": "b"}]}
            ]}
        }))
        .unwrap();
        assert_eq!(codes(&expander.expand(&vs).await.unwrap()), vec!["a", "b"]);
    }
}
