use serde::{Deserialize, Serialize};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ImportConfig {
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ImportConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Archive validations
        if self.archive.max_archive_bytes == 0 {
            return Err("archive.max_archive_bytes must be > 0".into());
        }
        if self.archive.max_entry_bytes == 0 {
            return Err("archive.max_entry_bytes must be > 0".into());
        }
        if self.archive.max_entry_bytes > self.archive.max_archive_bytes {
            return Err("archive.max_entry_bytes must be <= archive.max_archive_bytes".into());
        }
        if self.archive.max_entries == 0 {
            return Err("archive.max_entries must be > 0".into());
        }
        if self.archive.read_ahead == 0 {
            return Err("archive.read_ahead must be > 0".into());
        }
        // Validation validations
        if self.validation.expansion_timeout_ms == 0 {
            return Err("validation.expansion_timeout_ms must be > 0".into());
        }
        if self.validation.max_expansion_codes == 0 {
            return Err("validation.max_expansion_codes must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

/// Limits applied while spooling and reading a package archive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// Maximum size of the compressed upload.
    #[serde(default = "default_max_archive_bytes")]
    pub max_archive_bytes: u64,
    /// Maximum uncompressed size of a single entry.
    #[serde(default = "default_max_entry_bytes")]
    pub max_entry_bytes: u64,
    /// Maximum number of tar entries, of any type.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Entries buffered between the blocking tar reader and the pipeline.
    #[serde(default = "default_read_ahead")]
    pub read_ahead: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_archive_bytes: default_max_archive_bytes(),
            max_entry_bytes: default_max_entry_bytes(),
            max_entries: default_max_entries(),
            read_ahead: default_read_ahead(),
        }
    }
}

fn default_max_archive_bytes() -> u64 {
    256 * MIB
}

fn default_max_entry_bytes() -> u64 {
    32 * MIB
}

fn default_max_entries() -> usize {
    50_000
}

fn default_read_ahead() -> usize {
    16
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Upper bound on a single test-mode ValueSet expansion.
    #[serde(default = "default_expansion_timeout_ms")]
    pub expansion_timeout_ms: u64,
    #[serde(default = "default_max_expansion_codes")]
    pub max_expansion_codes: usize,
}

impl ValidationConfig {
    pub fn expansion_timeout(&self) -> Duration {
        Duration::from_millis(self.expansion_timeout_ms)
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            expansion_timeout_ms: default_expansion_timeout_ms(),
            max_expansion_codes: default_max_expansion_codes(),
        }
    }
}

fn default_expansion_timeout_ms() -> u64 {
    10_000
}

fn default_max_expansion_codes() -> usize {
    100_000
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

pub mod loader {
    use super::ImportConfig;
    use config::{Config, Environment, File};
    use std::path::{Path, PathBuf};

    /// Default configuration file looked up in the working directory.
    pub const DEFAULT_CONFIG_FILE: &str = "octofhir-import.toml";

    /// Prefix for environment overrides, e.g. `OCTOFHIR_IMPORT__ARCHIVE__MAX_ENTRIES=10`.
    pub const ENV_PREFIX: &str = "OCTOFHIR_IMPORT";

    pub fn load_config(path: Option<&str>) -> Result<ImportConfig, String> {
        let mut builder = Config::builder();
        let pathbuf = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));
        if pathbuf.exists() {
            builder = builder.add_source(File::from(pathbuf));
        } else if path.is_some() {
            return Err(format!("config file not found: {}", pathbuf.display()));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: ImportConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }

    pub fn load_config_with_default_path<P: AsRef<Path>>(
        path: Option<P>,
    ) -> Result<ImportConfig, String> {
        let p = path
            .as_ref()
            .map(|p| p.as_ref().to_string_lossy().to_string());
        load_config(p.as_deref())
    }
}
