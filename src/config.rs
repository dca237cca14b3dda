//! YAML configuration file support for the srcdup pipeline.
//!
//! All stage configurations (extract, sketch, index, query, report) can be
//! defined in one YAML file and loaded at runtime. Every field has a serde
//! default, so a partial file configures only what it names.
//!
//! ## Example
//!
//! ```yaml
//! version: "1.0"
//!
//! extract:
//!   version: 1
//!   min_token_len: 2
//!   split_compound: true
//!
//! sketch:
//!   version: 1
//!   bands: 32
//!   rows_per_band: 4
//!   seed: 6835540670947371974
//!
//! index:
//!   backend: "redb"
//!   path: "srcdup.redb"
//!   compression: "zstd"
//!
//! query:
//!   similarity_floor: 0.5
//!
//! report:
//!   similarity_floor: 0.5
//!   max_bucket: 64
//! ```

use std::fs;
use std::path::Path;

use extract::ExtractConfig;
use index::{BackendConfig, CompressionCodec, CompressionConfig, IndexConfig};
use matcher::QueryConfig;
use report::ReportConfig;
use serde::{Deserialize, Serialize};
use sketch::SketchConfig;
use thiserror::Error;

/// Errors that can occur when loading a pipeline configuration file.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level YAML configuration for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    /// Configuration format version.
    #[serde(default = "default_format_version")]
    pub version: String,

    /// Optional configuration name/description.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub extract: ExtractConfig,

    #[serde(default)]
    pub sketch: SketchConfig,

    #[serde(default)]
    pub index: IndexYamlConfig,

    #[serde(default)]
    pub query: QueryConfig,

    #[serde(default)]
    pub report: ReportConfig,
}

impl PipelineConfig {
    /// Load a YAML configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration across all stages.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" | "" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.extract
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
        self.sketch
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
        self.index.validate()?;
        self.query
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
        self.report
            .validate()
            .map_err(|e| ConfigLoadError::Validation(e.to_string()))?;
        Ok(())
    }
}

fn default_format_version() -> String {
    "1.0".to_string()
}

/// Index storage YAML configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexYamlConfig {
    /// `"redb"` or `"in_memory"`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Database file path; required for the redb backend.
    #[serde(default)]
    pub path: Option<String>,

    /// `"zstd"` or `"none"`.
    #[serde(default = "default_compression")]
    pub compression: String,

    /// Zstd compression level.
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,
}

impl IndexYamlConfig {
    fn validate(&self) -> Result<(), ConfigLoadError> {
        let valid_backends = ["in_memory", "redb"];
        if !valid_backends.contains(&self.backend.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "index.backend must be one of: {valid_backends:?}"
            )));
        }
        if self.backend == "redb" && self.path.is_none() {
            return Err(ConfigLoadError::Validation(
                "index.path is required when backend is 'redb'".to_string(),
            ));
        }
        let valid_compression = ["zstd", "none"];
        if !valid_compression.contains(&self.compression.as_str()) {
            return Err(ConfigLoadError::Validation(format!(
                "index.compression must be one of: {valid_compression:?}"
            )));
        }
        Ok(())
    }

    /// Lower into the index crate's runtime configuration.
    pub fn to_index_config(&self) -> IndexConfig {
        let backend = match self.backend.as_str() {
            "redb" => BackendConfig::redb(self.path.clone().unwrap_or_default()),
            _ => BackendConfig::in_memory(),
        };
        let codec = match self.compression.as_str() {
            "none" => CompressionCodec::None,
            _ => CompressionCodec::Zstd,
        };
        IndexConfig::new()
            .with_backend(backend)
            .with_compression(CompressionConfig::new(codec, self.compression_level))
    }
}

impl Default for IndexYamlConfig {
    fn default() -> Self {
        Self {
            backend: "redb".to_string(),
            path: Some("srcdup.redb".to_string()),
            compression: "zstd".to_string(),
            compression_level: 3,
        }
    }
}

fn default_backend() -> String {
    "redb".to_string()
}
fn default_compression() -> String {
    "zstd".to_string()
}
fn default_compression_level() -> i32 {
    3
}
