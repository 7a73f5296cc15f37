mod cli;
mod output;

use anyhow::{Context, Result};
use clap::Parser;
use octofhir_import::config::loader;
use octofhir_import::observability;
use octofhir_import::{
    ArchiveEntry, ImportConfig, ImportCoordinator, ImportReport, ImportRequest, MediaType,
    ResourceParser,
};
use octofhir_storage::ConformanceStorage;
use serde_json::Value;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;

use cli::Cli;
use output::print_error;

/// Exit code for requests rejected before import and for setup failures.
const EXIT_REJECTED: i32 = 2;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    observability::init_tracing();

    let config = match loader::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            print_error(&format!("configuration error: {e}"));
            std::process::exit(EXIT_REJECTED);
        }
    };
    if std::env::var_os("RUST_LOG").is_none() {
        observability::apply_logging_level(&config.logging.level);
    }

    match run(&cli, config).await {
        Ok(report) if report.has_failures() || report.cancelled => std::process::exit(1),
        Ok(_) => {}
        Err(e) => {
            print_error(&format!("{e:#}"));
            std::process::exit(EXIT_REJECTED);
        }
    }
}

async fn run(cli: &Cli, config: ImportConfig) -> Result<ImportReport> {
    let storage = octofhir_db_memory::create_conformance_storage();
    for path in &cli.seed {
        let count = seed_storage(storage.as_ref(), path)
            .await
            .with_context(|| format!("failed to seed from {}", path.display()))?;
        info!(file = %path.display(), resources = count, "seeded storage");
    }

    let file = tokio::fs::File::open(&cli.archive)
        .await
        .with_context(|| format!("cannot open {}", cli.archive.display()))?;
    let filename = cli
        .archive
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let coordinator = ImportCoordinator::new(storage, config);
    let request = ImportRequest::new(cli.resources.clone(), filename)
        .with_test_mode(cli.test)
        .with_cancellation(cancel);
    let report = coordinator.import_package(file, request).await?;

    output::print_report(&report, cli.format)?;
    Ok(report)
}

/// Loads a resource, an array of resources, or a Bundle into storage.
async fn seed_storage(storage: &dyn ConformanceStorage, path: &Path) -> Result<usize> {
    let bytes = tokio::fs::read(path).await?;
    let value: Value = serde_json::from_slice(&bytes)?;
    let resources = match value {
        Value::Array(items) => items,
        bundle if bundle["resourceType"] == "Bundle" => bundle
            .get("entry")
            .and_then(Value::as_array)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|entry| entry.get("resource").cloned())
                    .collect()
            })
            .unwrap_or_default(),
        single => vec![single],
    };

    let parser = ResourceParser::new();
    let count = resources.len();
    for (position, resource) in resources.into_iter().enumerate() {
        let entry = ArchiveEntry {
            position,
            path: format!("{}#{position}", path.display()),
            bytes: serde_json::to_vec(&resource)?,
            media_type: MediaType::FhirJson,
        };
        let parsed = parser.parse(&entry)?;
        storage
            .upsert(parsed.kind, parsed.identifier, parsed.content)
            .await?;
    }
    Ok(count)
}
