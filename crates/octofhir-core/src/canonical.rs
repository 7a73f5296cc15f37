//! Canonical identity of conformance resources.
//!
//! A conformance resource is identified by its canonical `url` plus an
//! optional business `version`. The same pair is the selection key callers
//! use and the primary key the storage layer persists under.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Separator used by FHIR canonical references (`url|version`).
const VERSION_SEPARATOR: char = '|';

/// Canonical URL plus optional version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceIdentifier {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ResourceIdentifier {
    /// Creates an identifier, rejecting empty URLs.
    ///
    /// Blank versions are normalized to `None`.
    pub fn new(url: impl Into<String>, version: Option<String>) -> Result<Self, CoreError> {
        let url = url.into();
        let url = url.trim();
        if url.is_empty() {
            return Err(CoreError::invalid_canonical("canonical url must not be empty"));
        }
        let version = version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());
        Ok(Self {
            url: url.to_string(),
            version,
        })
    }

    /// Identifier carrying only a URL.
    pub fn unversioned(url: impl Into<String>) -> Result<Self, CoreError> {
        Self::new(url, None)
    }

    /// Parses the `url|version` canonical reference form.
    pub fn parse_canonical(reference: &str) -> Result<Self, CoreError> {
        match reference.split_once(VERSION_SEPARATOR) {
            Some((url, version)) => Self::new(url, Some(version.to_string())),
            None => Self::new(reference, None),
        }
    }

    /// Storage key for this identifier. See [`conformance_key`].
    pub fn key(&self) -> String {
        conformance_key(&self.url, self.version.as_deref())
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}{}{}", self.url, VERSION_SEPARATOR, version),
            None => write!(f, "{}", self.url),
        }
    }
}

/// Builds the persistence key for a conformance resource.
///
/// The key is derived only from the canonical URL and version so any backend
/// computes the same identity for the same resource.
pub fn conformance_key(url: &str, version: Option<&str>) -> String {
    match version {
        Some(version) if !version.is_empty() => format!("{url}{VERSION_SEPARATOR}{version}"),
        _ => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rejects_empty_url() {
        assert!(ResourceIdentifier::new("", None).is_err());
        assert!(ResourceIdentifier::new("   ", Some("1.0".into())).is_err());
    }

    #[test]
    fn test_identifier_normalizes_blank_version() {
        let id = ResourceIdentifier::new("http://example.org/vs", Some(" ".into())).unwrap();
        assert_eq!(id.version, None);
        assert_eq!(id.to_string(), "http://example.org/vs");
    }

    #[test]
    fn test_parse_canonical_reference() {
        let id = ResourceIdentifier::parse_canonical("http://example.org/cs|2.1.0").unwrap();
        assert_eq!(id.url, "http://example.org/cs");
        assert_eq!(id.version.as_deref(), Some("2.1.0"));
        assert_eq!(id.to_string(), "http://example.org/cs|2.1.0");

        let id = ResourceIdentifier::parse_canonical("http://example.org/cs").unwrap();
        assert_eq!(id.version, None);
    }

    #[test]
    fn test_conformance_key() {
        assert_eq!(
            conformance_key("http://example.org/vs", Some("1.0.0")),
            "http://example.org/vs|1.0.0"
        );
        assert_eq!(conformance_key("http://example.org/vs", None), "http://example.org/vs");
        assert_eq!(conformance_key("http://example.org/vs", Some("")), "http://example.org/vs");

        let id = ResourceIdentifier::new("http://example.org/vs", Some("1.0.0".into())).unwrap();
        assert_eq!(id.key(), conformance_key("http://example.org/vs", Some("1.0.0")));
    }

    #[test]
    fn test_identifier_serialization_skips_missing_version() {
        let id = ResourceIdentifier::unversioned("http://example.org/sd").unwrap();
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({"url": "http://example.org/sd"}));
    }
}
