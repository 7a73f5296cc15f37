use crate::cli::OutputFormat;
use anyhow::Result;
use colored::Colorize;
use octofhir_import::{ImportOutcome, ImportReport};
use tabled::builder::Builder;
use tabled::settings::Style;

pub fn print_report(report: &ImportReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Summary => print_summary(report),
    }
    Ok(())
}

pub fn print_success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

pub fn print_error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

fn print_summary(report: &ImportReport) {
    if let Some(package) = &report.package {
        println!(
            "{} {}#{}",
            "Package:".cyan(),
            package.name.cyan(),
            package.version.cyan()
        );
    }

    if report.outcomes.is_empty() {
        println!("No resources selected from {}.", report.filename);
    } else {
        let mut builder = Builder::default();
        builder.push_record(["Outcome", "Resource", "Entry", "Detail"]);
        for outcome in &report.outcomes {
            let resource = outcome
                .identifier()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string());
            let entry = outcome.entry().unwrap_or("-").to_string();
            let (label, detail) = match outcome {
                ImportOutcome::Imported {
                    kind,
                    action,
                    expanded_codes,
                    ..
                } => {
                    let detail = match expanded_codes {
                        Some(codes) => format!("{kind} {action}, {codes} codes"),
                        None => format!("{kind} {action}"),
                    };
                    ("imported".green().to_string(), detail)
                }
                ImportOutcome::Skipped { reason, .. } => {
                    ("skipped".yellow().to_string(), reason.to_string())
                }
                ImportOutcome::Failed { diagnostic, .. } => (
                    "failed".red().to_string(),
                    format!("[{}] {}", diagnostic.stage, diagnostic.message),
                ),
            };
            builder.push_record([label, resource, entry, detail]);
        }
        let table = builder.build().with(Style::rounded()).to_string();
        println!("{table}");
    }

    let summary = report.summary();
    if report.cancelled {
        print_error(&format!("import cancelled: {summary}"));
    } else if report.has_failures() {
        print_error(&summary.to_string());
    } else {
        print_success(&summary.to_string());
    }
}
