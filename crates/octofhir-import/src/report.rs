//! Per-entry outcomes and the aggregated import report.

use octofhir_core::{ResourceIdentifier, ResourceKind};
use octofhir_storage::UpsertAction;
use serde::Serialize;
use std::fmt;

use crate::archive::PackageManifest;
use crate::error::EntryDiagnostic;
use crate::outcome::{OperationOutcome, OperationOutcomeIssue};

/// Why a selected entry was not imported without counting as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    /// A later entry declares the same canonical URL.
    #[serde(rename = "superseded")]
    Superseded,
    /// Wildcard selection hit an entry that is not an importable resource.
    #[serde(rename = "unsupported resource type")]
    UnsupportedResourceType,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Superseded => write!(f, "superseded"),
            Self::UnsupportedResourceType => write!(f, "unsupported resource type"),
        }
    }
}

/// Terminal state of one archive entry or requested URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ImportOutcome {
    Imported {
        identifier: ResourceIdentifier,
        kind: ResourceKind,
        entry: String,
        action: UpsertAction,
        /// Size of the test-mode expansion, for ValueSets checked in test mode.
        #[serde(skip_serializing_if = "Option::is_none")]
        expanded_codes: Option<usize>,
    },
    Skipped {
        #[serde(skip_serializing_if = "Option::is_none")]
        identifier: Option<ResourceIdentifier>,
        entry: String,
        reason: SkipReason,
    },
    Failed {
        /// `None` when the entry failed before its URL could be read.
        #[serde(skip_serializing_if = "Option::is_none")]
        identifier: Option<ResourceIdentifier>,
        /// `None` for requested URLs no entry declared.
        #[serde(skip_serializing_if = "Option::is_none")]
        entry: Option<String>,
        diagnostic: EntryDiagnostic,
    },
}

impl ImportOutcome {
    pub fn identifier(&self) -> Option<&ResourceIdentifier> {
        match self {
            Self::Imported { identifier, .. } => Some(identifier),
            Self::Skipped { identifier, .. } | Self::Failed { identifier, .. } => {
                identifier.as_ref()
            }
        }
    }

    pub fn entry(&self) -> Option<&str> {
        match self {
            Self::Imported { entry, .. } | Self::Skipped { entry, .. } => Some(entry),
            Self::Failed { entry, .. } => entry.as_deref(),
        }
    }

    pub fn is_imported(&self) -> bool {
        matches!(self, Self::Imported { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    fn to_issue(&self) -> OperationOutcomeIssue {
        let issue = match self {
            Self::Imported {
                identifier,
                kind,
                action,
                ..
            } => OperationOutcomeIssue::new(
                "information",
                "informational",
                format!("{kind} {identifier} {action}"),
            ),
            Self::Skipped {
                identifier, reason, ..
            } => {
                let subject = identifier
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "entry".to_string());
                OperationOutcomeIssue::new(
                    "information",
                    "informational",
                    format!("{subject} skipped: {reason}"),
                )
            }
            Self::Failed {
                identifier,
                diagnostic,
                ..
            } => {
                let message = match identifier {
                    Some(id) => format!("{id}: {}", diagnostic.message),
                    None => diagnostic.message.clone(),
                };
                OperationOutcomeIssue::new("error", diagnostic.issue_kind.fhir_code(), message)
            }
        };
        match self.entry() {
            Some(entry) => issue.at(entry),
            None => issue,
        }
    }
}

/// Outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReportSummary {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl fmt::Display for ReportSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} imported, {} skipped, {} failed",
            self.imported, self.skipped, self.failed
        )
    }
}

/// Result of one import request.
///
/// Every selected entry and every explicitly requested URL is accounted for
/// by exactly one outcome, in archive order, followed by not-found outcomes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub package: Option<PackageManifest>,
    pub test_mode: bool,
    /// The request was cancelled before the archive was fully read.
    pub cancelled: bool,
    pub outcomes: Vec<ImportOutcome>,
}

impl ImportReport {
    pub fn new(filename: impl Into<String>, test_mode: bool) -> Self {
        Self {
            filename: filename.into(),
            package: None,
            test_mode,
            cancelled: false,
            outcomes: Vec::new(),
        }
    }

    pub fn push(&mut self, outcome: ImportOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn imported(&self) -> impl Iterator<Item = &ImportOutcome> {
        self.outcomes.iter().filter(|o| o.is_imported())
    }

    pub fn skipped(&self) -> impl Iterator<Item = &ImportOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }

    pub fn failed(&self) -> impl Iterator<Item = &ImportOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(ImportOutcome::is_failed)
    }

    /// Outcomes recorded for a canonical URL, in report order.
    pub fn outcomes_for<'a>(&'a self, url: &'a str) -> impl Iterator<Item = &'a ImportOutcome> {
        self.outcomes
            .iter()
            .filter(move |o| o.identifier().is_some_and(|id| id.url == url))
    }

    pub fn summary(&self) -> ReportSummary {
        self.outcomes
            .iter()
            .fold(ReportSummary::default(), |mut summary, outcome| {
                match outcome {
                    ImportOutcome::Imported { .. } => summary.imported += 1,
                    ImportOutcome::Skipped { .. } => summary.skipped += 1,
                    ImportOutcome::Failed { .. } => summary.failed += 1,
                }
                summary
            })
    }

    /// Renders the report as an OperationOutcome with one issue per outcome.
    pub fn to_operation_outcome(&self) -> OperationOutcome {
        let mut issues: Vec<OperationOutcomeIssue> =
            self.outcomes.iter().map(ImportOutcome::to_issue).collect();
        if self.cancelled {
            issues.push(OperationOutcomeIssue::new(
                "warning",
                "processing",
                "import cancelled before the package was fully read",
            ));
        }
        if issues.is_empty() {
            issues.push(OperationOutcomeIssue::new(
                "information",
                "informational",
                format!("no resources selected from {}", self.filename),
            ));
        }
        OperationOutcome::new(issues)
    }
}
