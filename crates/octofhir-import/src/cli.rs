use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "octofhir-import")]
#[command(about = "Import conformance resources from a FHIR package archive")]
#[command(version)]
pub struct Cli {
    /// Package archive (.tgz)
    pub archive: PathBuf,

    /// Canonical URL to import; repeatable. Use '*' to import everything
    #[arg(short = 'r', long = "resource", value_name = "URL", required = true)]
    pub resources: Vec<String>,

    /// Expand ValueSets against known code systems before storing them
    #[arg(long)]
    pub test: bool,

    /// JSON file with CodeSystems/ValueSets to load before importing; repeatable
    #[arg(long, value_name = "FILE")]
    pub seed: Vec<PathBuf>,

    /// Config file (defaults to ./octofhir-import.toml when present)
    #[arg(short, long, env = "OCTOFHIR_IMPORT_CONFIG")]
    pub config: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "summary")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Summary,
}
