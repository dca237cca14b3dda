//! Configuration and error types for feature extraction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for the built-in token extractor.
///
/// The extractor is a pure function of `(bytes, config)`: no I/O, no
/// randomness. Any change that can alter the emitted features for the same
/// input must bump `version`, because features feed the corpus vocabulary
/// and therefore the entire sketch space.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtractConfig {
    /// Configuration schema version.
    pub version: u32,
    /// Minimum length of an emitted token; shorter fragments are dropped.
    pub min_token_len: usize,
    /// Split compound identifiers (`snake_case`, `camelCase`) into their
    /// parts in addition to skipping separators.
    pub split_compound: bool,
}

impl ExtractConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_token_len(mut self, min_token_len: usize) -> Self {
        self.min_token_len = min_token_len;
        self
    }

    pub fn with_split_compound(mut self, split_compound: bool) -> Self {
        self.split_compound = split_compound;
        self
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.version == 0 {
            return Err(ExtractError::InvalidConfig(
                "version must be >= 1".to_string(),
            ));
        }
        if self.min_token_len == 0 {
            return Err(ExtractError::InvalidConfig(
                "min_token_len must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            version: 1,
            min_token_len: 2,
            split_compound: true,
        }
    }
}

/// Errors produced by a feature extractor.
///
/// The two payload-bearing variants map onto the engine's propagation
/// policy: `Skipped` is a per-document failure that is counted and reported
/// but never aborts a job; `Unavailable` is an infrastructure failure that
/// is fatal to the current verb.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// This document could not be processed; counted, not fatal.
    #[error("document skipped: {0}")]
    Skipped(String),
    /// The extractor itself is unusable; fatal.
    #[error("extractor unavailable: {0}")]
    Unavailable(String),
    #[error("invalid extract config: {0}")]
    InvalidConfig(String),
}
