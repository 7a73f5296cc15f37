use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use crate::error::CoreError;

/// Canonical conformance resource types other than the three terminology
/// kinds that get first-class handling. All of these carry a `url` element.
pub const CONFORMANCE_RESOURCE_TYPES: &[&str] = &[
    "ActivityDefinition",
    "CapabilityStatement",
    "CompartmentDefinition",
    "ConceptMap",
    "ExampleScenario",
    "GraphDefinition",
    "ImplementationGuide",
    "Library",
    "Measure",
    "MessageDefinition",
    "NamingSystem",
    "OperationDefinition",
    "PlanDefinition",
    "Questionnaire",
    "SearchParameter",
    "StructureMap",
    "TerminologyCapabilities",
];

/// Kind of a conformance resource found in a package.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    StructureDefinition,
    ValueSet,
    CodeSystem,
    /// Any other canonical conformance resource, keyed by its `resourceType`.
    #[serde(untagged)]
    Other(String),
}

impl ResourceKind {
    /// Returns the kind for a `resourceType` value, or `None` when the type is
    /// not a canonical conformance resource this pipeline can import.
    pub fn recognize(resource_type: &str) -> Option<Self> {
        match resource_type {
            "StructureDefinition" => Some(Self::StructureDefinition),
            "ValueSet" => Some(Self::ValueSet),
            "CodeSystem" => Some(Self::CodeSystem),
            other if CONFORMANCE_RESOURCE_TYPES.contains(&other) => {
                Some(Self::Other(other.to_string()))
            }
            _ => None,
        }
    }

    /// The FHIR `resourceType` string for this kind.
    pub fn resource_type(&self) -> &str {
        match self {
            Self::StructureDefinition => "StructureDefinition",
            Self::ValueSet => "ValueSet",
            Self::CodeSystem => "CodeSystem",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource_type())
    }
}

impl FromStr for ResourceKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::recognize(s).ok_or_else(|| CoreError::unsupported_resource_type(s))
    }
}

/// Validate if a string is a valid FHIR resource type name
pub fn is_valid_resource_type_name(name: &str) -> bool {
    // FHIR resource type names must start with uppercase letter and contain only letters
    !name.is_empty()
        && name.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphabetic())
}
