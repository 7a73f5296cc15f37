//! # octofhir-import
//!
//! Selective import of conformance resources from FHIR package archives.
//!
//! An upload is spooled and checked by [`archive`], filtered by
//! [`selector`], parsed by [`parser`], checked by [`validator`] (ValueSets in
//! test mode are expanded by [`expand`]), and persisted through an
//! [`octofhir_storage::ConformanceStorage`]. [`ImportCoordinator`] runs the
//! whole pipeline and returns an [`ImportReport`].
//!
//! ```ignore
//! use std::sync::Arc;
//! use octofhir_db_memory::InMemoryConformanceStorage;
//! use octofhir_import::{ImportConfig, ImportCoordinator, ImportRequest};
//!
//! let coordinator = ImportCoordinator::new(
//!     Arc::new(InMemoryConformanceStorage::new()),
//!     ImportConfig::default(),
//! );
//! let file = tokio::fs::File::open("package.tgz").await?;
//! let report = coordinator
//!     .import_package(file, ImportRequest::new(["*"], "package.tgz"))
//!     .await?;
//! println!("{}", report.summary());
//! ```

pub mod archive;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod expand;
pub mod observability;
pub mod outcome;
pub mod parser;
pub mod report;
pub mod resources;
pub mod selector;
pub mod validator;

pub use archive::{ArchiveEntry, EntryStream, MediaType, PackageArchive, PackageManifest};
pub use config::ImportConfig;
pub use coordinator::{ImportCoordinator, ImportRequest};
pub use error::{
    ArchiveError, DiagnosticStage, EntryDiagnostic, ImportError, IssueKind, ParseError,
    ParseFailure, ValidationError,
};
pub use outcome::{OperationOutcome, OperationOutcomeIssue};
pub use parser::{ParsedResource, ResourceParser};
pub use report::{ImportOutcome, ImportReport, ReportSummary, SkipReason};
pub use selector::{ResourceSelector, Selection, WILDCARD};
pub use validator::{ResourceValidator, ValidationPass};
