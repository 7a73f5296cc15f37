//! Error types for the package import pipeline.
//!
//! [`ImportError`] is the only request-level failure. Every other error in
//! this module is confined to one archive entry and ends up as an
//! [`EntryDiagnostic`] inside the import report.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::outcome::OperationOutcome;

/// Machine-readable issue classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    NotSupported,
    Invalid,
    NotFound,
    Processing,
}

impl IssueKind {
    /// FHIR `OperationOutcome.issue.code` for this kind.
    pub fn fhir_code(&self) -> &'static str {
        match self {
            Self::NotSupported => "not-supported",
            Self::Invalid => "invalid",
            Self::NotFound => "not-found",
            Self::Processing => "processing",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotSupported => "NOT_SUPPORTED",
            Self::Invalid => "INVALID",
            Self::NotFound => "NOT_FOUND",
            Self::Processing => "PROCESSING",
        };
        write!(f, "{s}")
    }
}

/// Request-level failure: the whole import is rejected before any persistence.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
#[serde(rename_all = "camelCase")]
pub struct ImportError {
    pub status_code: u16,
    pub issue_kind: IssueKind,
    pub message: String,
}

impl ImportError {
    pub fn new(status_code: u16, issue_kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            status_code,
            issue_kind,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl fmt::Display) -> Self {
        Self::new(400, IssueKind::Invalid, format!("bad request: {message}"))
    }

    pub fn unsupported_media_type(message: impl fmt::Display) -> Self {
        Self::new(
            400,
            IssueKind::NotSupported,
            format!("unsupported media type: {message}"),
        )
    }

    pub fn malformed_package(message: impl fmt::Display) -> Self {
        Self::new(400, IssueKind::Invalid, format!("malformed package: {message}"))
    }

    pub fn internal(message: impl fmt::Display) -> Self {
        Self::new(500, IssueKind::Processing, format!("internal error: {message}"))
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code)
    }

    pub fn to_operation_outcome(&self) -> OperationOutcome {
        let severity = if self.is_client_error() { "error" } else { "fatal" };
        OperationOutcome::single(severity, self.issue_kind.fhir_code(), self.message.clone())
    }
}

/// Failures while spooling or reading the package archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("archive exceeds the maximum size of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("archive has more than {limit} entries")]
    TooManyEntries { limit: usize },

    #[error("entry {path} is {size} bytes, exceeding the limit of {limit} bytes")]
    EntryTooLarge { path: String, size: u64, limit: u64 },

    #[error("{0}")]
    Malformed(String),

    #[error("upload could not be read: {0}")]
    UnreadableUpload(String),

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    /// Maps a failure reading the caller's byte stream onto a request error.
    pub(crate) fn unreadable_upload(err: std::io::Error) -> Self {
        Self::UnreadableUpload(err.to_string())
    }

    /// Maps a tar/gzip read failure onto a format error.
    pub(crate) fn read_failure(err: std::io::Error) -> Self {
        Self::Malformed(format!("unreadable archive: {err}"))
    }
}

impl From<ArchiveError> for ImportError {
    fn from(err: ArchiveError) -> Self {
        match err {
            ArchiveError::UnsupportedMediaType(msg) => ImportError::unsupported_media_type(msg),
            ArchiveError::Io(e) => ImportError::internal(e),
            other => ImportError::malformed_package(other),
        }
    }
}

/// Why an entry could not be parsed into a resource.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseFailure {
    #[error("unsupported resource type: {0}")]
    UnsupportedResourceType(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("missing required element '{0}'")]
    MissingElement(&'static str),

    #[error("invalid element '{element}': {message}")]
    InvalidElement { element: String, message: String },
}

impl ParseFailure {
    pub fn invalid_element(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidElement {
            element: element.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to parse {entry}: {cause}")]
pub struct ParseError {
    pub entry: String,
    pub cause: ParseFailure,
}

impl ParseError {
    pub fn new(entry: impl Into<String>, cause: ParseFailure) -> Self {
        Self {
            entry: entry.into(),
            cause,
        }
    }

    /// Unsupported kinds are skipped in wildcard mode rather than failed.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self.cause,
            ParseFailure::UnsupportedResourceType(_) | ParseFailure::UnsupportedFormat(_)
        )
    }

    pub fn issue_kind(&self) -> IssueKind {
        if self.is_unsupported() {
            IssueKind::NotSupported
        } else {
            IssueKind::Invalid
        }
    }
}

/// Kind-specific validation failures, including test-mode expansion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("unknown code system {system}{}", version_suffix(.version))]
    UnknownCodeSystem {
        system: String,
        version: Option<String>,
    },

    #[error("code '{code}' is not defined in code system {system}")]
    UnknownCode { system: String, code: String },

    #[error("expansion is empty")]
    EmptyExpansion,

    #[error("expansion exceeds {limit} codes")]
    TooLarge { limit: usize },

    #[error("expansion did not finish within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("imported value set {0} cannot be resolved")]
    UnresolvableValueSet(String),

    #[error("value set import cycle through {0}")]
    CyclicValueSet(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("terminology lookup failed: {0}")]
    Lookup(String),
}

fn version_suffix(version: &Option<String>) -> String {
    version.as_ref().map(|v| format!("|{v}")).unwrap_or_default()
}

impl ValidationError {
    pub fn issue_kind(&self) -> IssueKind {
        match self {
            Self::UnknownCodeSystem { .. } | Self::UnresolvableValueSet(_) => IssueKind::NotFound,
            Self::TooLarge { .. } | Self::Timeout { .. } | Self::Lookup(_) => IssueKind::Processing,
            Self::UnknownCode { .. }
            | Self::EmptyExpansion
            | Self::CyclicValueSet(_)
            | Self::InvalidFilter(_) => IssueKind::Invalid,
        }
    }
}

impl From<octofhir_storage::StoreError> for ValidationError {
    fn from(err: octofhir_storage::StoreError) -> Self {
        Self::Lookup(err.to_string())
    }
}

/// Pipeline stage an entry failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticStage {
    Archive,
    Selection,
    Parse,
    Validation,
    Persistence,
}

impl fmt::Display for DiagnosticStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Archive => "archive",
            Self::Selection => "selection",
            Self::Parse => "parse",
            Self::Validation => "validation",
            Self::Persistence => "persistence",
        };
        write!(f, "{s}")
    }
}

/// Explanation attached to every failed entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDiagnostic {
    pub stage: DiagnosticStage,
    pub issue_kind: IssueKind,
    pub message: String,
}

impl EntryDiagnostic {
    pub fn new(stage: DiagnosticStage, issue_kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            issue_kind,
            message: message.into(),
        }
    }

    pub fn not_found_in_package() -> Self {
        Self::new(
            DiagnosticStage::Selection,
            IssueKind::NotFound,
            "not found in package",
        )
    }
}

impl From<ParseError> for EntryDiagnostic {
    fn from(err: ParseError) -> Self {
        Self::new(DiagnosticStage::Parse, err.issue_kind(), err.cause.to_string())
    }
}

impl From<ValidationError> for EntryDiagnostic {
    fn from(err: ValidationError) -> Self {
        Self::new(DiagnosticStage::Validation, err.issue_kind(), err.to_string())
    }
}

impl From<octofhir_storage::StoreError> for EntryDiagnostic {
    fn from(err: octofhir_storage::StoreError) -> Self {
        let issue_kind = match err.category() {
            octofhir_storage::ErrorCategory::Validation => IssueKind::Invalid,
            _ => IssueKind::Processing,
        };
        Self::new(DiagnosticStage::Persistence, issue_kind, err.to_string())
    }
}

impl From<ArchiveError> for EntryDiagnostic {
    fn from(err: ArchiveError) -> Self {
        Self::new(DiagnosticStage::Archive, IssueKind::Invalid, err.to_string())
    }
}
