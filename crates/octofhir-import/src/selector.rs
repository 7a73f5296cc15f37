//! Decides which archive entries an import request materializes.

use octofhir_core::{ResourceIdentifier, ResourceKind};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;

use crate::archive::{ArchiveEntry, MediaType};

/// Request token selecting every recognized resource in the package.
pub const WILDCARD: &str = "*";

/// Identity fields read from an entry without building the full document.
///
/// Elements of the wrong JSON type read as absent; the full parse reports
/// them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceHeader {
    pub resource_type: Option<String>,
    pub url: Option<String>,
    pub version: Option<String>,
}

#[derive(Deserialize)]
struct RawHeader {
    #[serde(rename = "resourceType")]
    resource_type: Option<Value>,
    url: Option<Value>,
    version: Option<Value>,
}

fn string_value(value: Option<Value>) -> Option<String> {
    match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    }
}

impl ResourceHeader {
    /// Lightweight pre-parse of a JSON payload.
    ///
    /// Returns `None` only when the payload is not a JSON object.
    pub fn peek(bytes: &[u8]) -> Option<Self> {
        if MediaType::sniff(bytes) != MediaType::FhirJson {
            return None;
        }
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let raw: RawHeader = serde_json::from_slice(bytes).ok()?;
        Some(Self {
            resource_type: string_value(raw.resource_type),
            url: string_value(raw.url),
            version: string_value(raw.version),
        })
    }

    pub fn kind(&self) -> Option<ResourceKind> {
        self.resource_type.as_deref().and_then(ResourceKind::recognize)
    }

    pub fn identifier(&self) -> Option<ResourceIdentifier> {
        let url = self.url.as_deref()?;
        ResourceIdentifier::new(url, self.version.clone()).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("at least one resource URL or '*' must be requested")]
    Empty,
}

/// The caller's requested identifiers, normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Urls(BTreeSet<String>),
}

impl Selection {
    /// Builds a selection from raw request fields.
    ///
    /// Blank values are dropped. A single `*` anywhere selects everything.
    /// A `url|version` request matches on its URL part.
    pub fn from_requested<I, S>(requested: I) -> Result<Self, SelectionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let urls: BTreeSet<String> = requested
            .into_iter()
            .filter_map(|s| {
                let url = s.as_ref().split('|').next().unwrap_or_default().trim();
                (!url.is_empty()).then(|| url.to_string())
            })
            .collect();

        if urls.is_empty() {
            return Err(SelectionError::Empty);
        }
        if urls.contains(WILDCARD) {
            return Ok(Self::All);
        }
        Ok(Self::Urls(urls))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// Matches archive entries against a [`Selection`].
#[derive(Debug, Clone)]
pub struct ResourceSelector {
    selection: Selection,
}

impl ResourceSelector {
    pub fn new(selection: Selection) -> Self {
        Self { selection }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// True when resources were requested by URL rather than by wildcard.
    pub fn is_explicit(&self) -> bool {
        !self.selection.is_wildcard()
    }

    /// URLs requested explicitly, empty for wildcard selections.
    pub fn requested_urls(&self) -> impl Iterator<Item = &str> {
        let urls = match &self.selection {
            Selection::All => None,
            Selection::Urls(urls) => Some(urls),
        };
        urls.into_iter().flatten().map(String::as_str)
    }

    /// Decides whether a pre-parsed entry is selected.
    ///
    /// Wildcard selects every recognized kind; explicit selection matches the
    /// declared URL exactly and ignores the version.
    pub fn matches(&self, header: &ResourceHeader) -> bool {
        match &self.selection {
            Selection::All => header.kind().is_some(),
            Selection::Urls(urls) => header.url.as_ref().is_some_and(|url| urls.contains(url)),
        }
    }

    /// Pre-parses `entry` and returns its header when selected.
    pub fn select(&self, entry: &ArchiveEntry) -> Option<ResourceHeader> {
        ResourceHeader::peek(&entry.bytes).filter(|header| self.matches(header))
    }
}
