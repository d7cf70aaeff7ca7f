//! Configuration management for schema emission
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (schema-emit.toml)
//! - Environment variables (SCHEMA_EMIT__*)
//!
//! ## Example config file (schema-emit.toml):
//! ```toml
//! [generator]
//! format_cache_capacity = 64
//! emit_unused = true
//!
//! [generator.filter]
//! include_tags = ["pets"]
//! exclude_deprecated = true
//!
//! [generator.custom_formats]
//! sku = "^[A-Z]{3}-\\d{4}$"
//!
//! [batch]
//! mode = "concurrent"
//! concurrency = 4
//!
//! [[jobs]]
//! input = "specs/petstore.yaml"
//! output = "out/petstore.json"
//!
//! [[jobs]]
//! input = "specs/billing.json"
//! output = "out/billing.json"
//! emit_unused = false
//! [jobs.custom_formats]
//! sku = "^SKU\\d+$"
//! ```

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::batch::ExecutionMode;
use crate::emit::DEFAULT_FORMAT_CACHE_CAPACITY;
use crate::error::{EmitError, Result};
use crate::filter::OperationFilterSpec;

/// Config files picked up from the working directory, lowest precedence first
pub const CONFIG_LOCATIONS: &[&str] = &[
    "schema-emit.toml",
    ".schema-emit.toml",
    "config/schema-emit.toml",
];

/// Prefix for environment overrides; nested keys are joined with `__`
/// (`SCHEMA_EMIT__BATCH__CONCURRENCY=8`)
pub const ENV_PREFIX: &str = "SCHEMA_EMIT";
const ENV_SEPARATOR: &str = "__";

/// `schema-emit.toml` under the platform's per-user config directory
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "schema-emit", "schema-emit")
        .map(|dirs| dirs.config_dir().join("schema-emit.toml"))
}

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmitConfig {
    /// Defaults applied to every job
    #[serde(default)]
    pub generator: GeneratorOptions,

    /// Batch scheduling
    #[serde(default)]
    pub batch: BatchSettings,

    /// Jobs run by `schema-emit batch`
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

/// Options for one generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorOptions {
    /// Capacity of the job's compiled-format cache
    #[serde(default = "default_cache_capacity")]
    pub format_cache_capacity: usize,

    /// Emit schemas no surviving operation reaches
    #[serde(default = "default_true")]
    pub emit_unused: bool,

    /// Operation filter
    #[serde(default)]
    pub filter: OperationFilterSpec,

    /// Format name -> regex, shadowing the built-in table for this job only
    #[serde(default)]
    pub custom_formats: BTreeMap<String, String>,
}

/// Batch scheduling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSettings {
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Maximum jobs in flight (concurrent mode only)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// One `{input, output, options}` batch record.
///
/// Unset fields fall back to `[generator]`; `custom_formats` entries are
/// merged key by key over the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub input: PathBuf,
    pub output: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emit_unused: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_cache_capacity: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<OperationFilterSpec>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_formats: BTreeMap<String, String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    DEFAULT_FORMAT_CACHE_CAPACITY
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            format_cache_capacity: default_cache_capacity(),
            emit_unused: true,
            filter: OperationFilterSpec::default(),
            custom_formats: BTreeMap::new(),
        }
    }
}

impl GeneratorOptions {
    /// Reject option values no job could run with
    pub fn validate(&self) -> Result<()> {
        if self.format_cache_capacity == 0 {
            return Err(EmitError::InvalidOption(
                "format_cache_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            concurrency: default_concurrency(),
        }
    }
}

impl BatchSettings {
    pub fn validate(&self) -> Result<()> {
        if self.mode == ExecutionMode::Concurrent && self.concurrency == 0 {
            return Err(EmitError::InvalidOption(
                "batch concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl JobSpec {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            emit_unused: None,
            format_cache_capacity: None,
            filter: None,
            custom_formats: BTreeMap::new(),
        }
    }
}

impl EmitConfig {
    /// Load configuration from default locations
    pub fn load() -> std::result::Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration from a specific file.
    ///
    /// Sources, lowest precedence first: `CONFIG_LOCATIONS` in the working
    /// directory, the per-user file, `config_path` (must exist), then
    /// `SCHEMA_EMIT__*` variables.
    pub fn load_from(config_path: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let user_file = user_config_path().filter(|path| path.exists());

        let files = CONFIG_LOCATIONS
            .iter()
            .map(|location| File::with_name(location).required(false))
            .chain(user_file.map(|path| File::from(path).required(false)))
            .chain(config_path.map(|path| File::with_name(path).required(true)));

        files
            .fold(Config::builder(), |builder, file| builder.add_source(file))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Save configuration to a file
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// Check batch-scoped settings and the shared generator defaults
    pub fn validate(&self) -> Result<()> {
        self.batch.validate()?;
        self.generator.validate()
    }

    /// Effective options of one job: its own fields over `[generator]`
    pub fn job_options(&self, job: &JobSpec) -> GeneratorOptions {
        let mut options = self.generator.clone();
        if let Some(emit_unused) = job.emit_unused {
            options.emit_unused = emit_unused;
        }
        if let Some(capacity) = job.format_cache_capacity {
            options.format_cache_capacity = capacity;
        }
        if let Some(filter) = &job.filter {
            options.filter = filter.clone();
        }
        options.custom_formats.extend(
            job.custom_formats
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        options
    }
}
