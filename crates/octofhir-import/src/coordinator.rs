//! Drives one package import from upload bytes to an [`ImportReport`].
//!
//! Entries are processed one at a time in archive order. A request is either
//! rejected as a whole with an [`ImportError`] before anything is written, or
//! it produces a report in which every selected entry and every explicitly
//! requested URL has exactly one outcome.

use octofhir_core::ResourceIdentifier;
use octofhir_storage::DynConformanceStorage;
use std::collections::HashSet;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::archive::{ArchiveEntry, PackageArchive};
use crate::config::{ArchiveConfig, ImportConfig};
use crate::error::{ArchiveError, EntryDiagnostic, ImportError};
use crate::parser::ResourceParser;
use crate::report::{ImportOutcome, ImportReport, SkipReason};
use crate::selector::{ResourceHeader, ResourceSelector, Selection};
use crate::validator::ResourceValidator;

/// Caller-supplied parameters of one import.
#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    /// Canonical URLs to import, or `*` for every recognized resource.
    pub requested: Vec<String>,
    /// Original name of the uploaded archive.
    pub filename: String,
    /// Expand ValueSets against stored code systems before persisting them.
    pub test_mode: bool,
    /// Cancelled when the caller abandons the upload.
    pub cancel: CancellationToken,
}

impl ImportRequest {
    pub fn new<I, S>(requested: I, filename: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            requested: requested.into_iter().map(Into::into).collect(),
            filename: filename.into(),
            test_mode: false,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_test_mode(mut self, test_mode: bool) -> Self {
        self.test_mode = test_mode;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

enum Step {
    Entry(ArchiveEntry),
    ReadFailed(ArchiveError),
    Finished,
    Cancelled,
}

/// Orchestrates selection, parsing, validation and persistence.
///
/// Cheap to clone; concurrent imports share only the storage backend.
#[derive(Clone)]
pub struct ImportCoordinator {
    storage: DynConformanceStorage,
    parser: ResourceParser,
    validator: ResourceValidator,
    archive_config: ArchiveConfig,
}

impl ImportCoordinator {
    pub fn new(storage: DynConformanceStorage, config: ImportConfig) -> Self {
        let validator = ResourceValidator::new(storage.clone(), config.validation);
        Self {
            storage,
            parser: ResourceParser::new(),
            validator,
            archive_config: config.archive,
        }
    }

    pub fn storage(&self) -> &DynConformanceStorage {
        &self.storage
    }

    /// Imports the requested resources from a package upload.
    ///
    /// # Errors
    ///
    /// Returns an [`ImportError`] when nothing was requested or when the
    /// upload is not a readable package. In both cases storage is untouched.
    /// Failures of individual entries are reported in the [`ImportReport`].
    pub async fn import_package<R>(
        &self,
        source: R,
        request: ImportRequest,
    ) -> Result<ImportReport, ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let span = info_span!(
            "package_import",
            filename = %request.filename,
            test_mode = request.test_mode
        );
        self.run(source, request).instrument(span).await
    }

    async fn run<R>(&self, source: R, request: ImportRequest) -> Result<ImportReport, ImportError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let selection = Selection::from_requested(&request.requested).map_err(|e| {
            warn!(error = %e, "rejecting import request");
            ImportError::bad_request(e)
        })?;
        let selector = ResourceSelector::new(selection);
        let mut report = ImportReport::new(&request.filename, request.test_mode);

        let opened = tokio::select! {
            biased;
            _ = request.cancel.cancelled() => None,
            opened = PackageArchive::open(source, &request.filename, &self.archive_config) => Some(opened),
        };
        let archive = match opened {
            Some(Ok(archive)) => archive,
            Some(Err(err)) => {
                warn!(error = %err, "rejecting package archive");
                return Err(err.into());
            }
            None => {
                info!("import cancelled while receiving the package");
                report.cancelled = true;
                return Ok(report);
            }
        };
        report.package = archive.manifest().cloned();

        let mut matched: HashSet<String> = HashSet::new();
        let mut entries = archive.entries();
        let stream_completed = loop {
            let step = tokio::select! {
                biased;
                _ = request.cancel.cancelled() => Step::Cancelled,
                next = entries.next() => match next {
                    Some(Ok(entry)) => Step::Entry(entry),
                    Some(Err(err)) => Step::ReadFailed(err),
                    None => Step::Finished,
                },
            };

            let entry = match step {
                Step::Entry(entry) => entry,
                Step::Finished => break true,
                Step::Cancelled => {
                    info!(outcomes = report.outcomes.len(), "import cancelled, stopping archive read");
                    report.cancelled = true;
                    break false;
                }
                Step::ReadFailed(err) => {
                    warn!(error = %err, "archive read failed mid-stream");
                    report.push(ImportOutcome::Failed {
                        identifier: None,
                        entry: None,
                        diagnostic: err.into(),
                    });
                    break false;
                }
            };

            let Some(header) = selector.select(&entry) else {
                debug!(entry = %entry.path, "entry not selected");
                continue;
            };
            if let Some(url) = &header.url {
                matched.insert(url.clone());
            }

            let superseded = header
                .url
                .as_deref()
                .is_some_and(|url| entries.is_superseded(url, entry.position));
            if superseded {
                info!(entry = %entry.path, url = ?header.url, "skipping superseded entry");
                report.push(ImportOutcome::Skipped {
                    identifier: header.identifier(),
                    entry: entry.path,
                    reason: SkipReason::Superseded,
                });
                continue;
            }

            let outcome = self
                .import_entry(entry, header, selector.is_explicit(), request.test_mode)
                .await;
            report.push(outcome);
        };
        // Stops the background reader and releases the spool file.
        drop(entries);

        // Unmatched URLs are only reported when every entry was seen.
        if stream_completed {
            for url in selector.requested_urls() {
                if matched.contains(url) {
                    continue;
                }
                warn!(url = %url, "requested resource not found in package");
                report.push(ImportOutcome::Failed {
                    identifier: ResourceIdentifier::unversioned(url).ok(),
                    entry: None,
                    diagnostic: EntryDiagnostic::not_found_in_package(),
                });
            }
        }

        let summary = report.summary();
        info!(
            imported = summary.imported,
            skipped = summary.skipped,
            failed = summary.failed,
            cancelled = report.cancelled,
            "package import finished"
        );
        Ok(report)
    }

    /// Parse, validate and persist one selected entry.
    async fn import_entry(
        &self,
        entry: ArchiveEntry,
        header: ResourceHeader,
        explicit: bool,
        test_mode: bool,
    ) -> ImportOutcome {
        let mut parsed = match self.parser.parse(&entry) {
            Ok(parsed) => parsed,
            Err(err) if err.is_unsupported() && !explicit => {
                info!(entry = %entry.path, error = %err, "skipping unsupported entry");
                return ImportOutcome::Skipped {
                    identifier: header.identifier(),
                    entry: entry.path,
                    reason: SkipReason::UnsupportedResourceType,
                };
            }
            Err(err) => {
                warn!(entry = %entry.path, error = %err, "entry failed to parse");
                return ImportOutcome::Failed {
                    identifier: header.identifier(),
                    entry: Some(entry.path),
                    diagnostic: err.into(),
                };
            }
        };
        debug!(
            entry = %entry.path,
            kind = %parsed.kind,
            identifier = %parsed.identifier,
            "entry parsed"
        );

        let pass = match self.validator.validate(&parsed, test_mode).await {
            Ok(pass) => pass,
            Err(err) => {
                warn!(
                    entry = %entry.path,
                    identifier = %parsed.identifier,
                    error = %err,
                    "entry failed validation"
                );
                return ImportOutcome::Failed {
                    identifier: Some(parsed.identifier),
                    entry: Some(entry.path),
                    diagnostic: err.into(),
                };
            }
        };
        parsed.validated = true;

        let kind = parsed.kind.clone();
        let identifier = parsed.identifier.clone();
        match self
            .storage
            .upsert(parsed.kind, parsed.identifier, parsed.content)
            .await
        {
            Ok(result) => {
                debug!(
                    entry = %entry.path,
                    identifier = %identifier,
                    action = %result.action,
                    version_id = %result.record.version_id,
                    "entry persisted"
                );
                ImportOutcome::Imported {
                    identifier,
                    kind,
                    entry: entry.path,
                    action: result.action,
                    expanded_codes: pass.expanded_codes(),
                }
            }
            Err(err) => {
                warn!(
                    entry = %entry.path,
                    identifier = %identifier,
                    backend = self.storage.backend_name(),
                    error = %err,
                    "entry failed to persist"
                );
                ImportOutcome::Failed {
                    identifier: Some(identifier),
                    entry: Some(entry.path),
                    diagnostic: err.into(),
                }
            }
        }
    }
}
