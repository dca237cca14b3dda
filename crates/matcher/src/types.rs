//! Request configuration and result types for the query engine.

use extract::ExtractError;
use index::{DocumentLocation, IndexError};
use serde::{Deserialize, Serialize};
use sketch::SketchError;
use thiserror::Error;

/// Configuration for similarity queries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryConfig {
    /// Configuration schema version.
    pub version: u32,
    /// Minimum estimated generalized Jaccard for a candidate to be reported
    /// as similar.
    pub similarity_floor: f64,
}

impl QueryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_similarity_floor(mut self, similarity_floor: f64) -> Self {
        self.similarity_floor = similarity_floor;
        self
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), MatchError> {
        if self.version == 0 {
            return Err(MatchError::InvalidConfig(
                "version must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.similarity_floor) {
            return Err(MatchError::InvalidConfig(format!(
                "similarity_floor must be within [0, 1], got {}",
                self.similarity_floor
            )));
        }
        Ok(())
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            version: 1,
            similarity_floor: 0.5,
        }
    }
}

/// One exact duplicate of the query input: a site where byte-identical
/// content is already indexed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateHit {
    pub blob_id: String,
    pub location: DocumentLocation,
}

/// One near-duplicate of the query input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarHit {
    pub blob_id: String,
    /// Estimated generalized Jaccard: the sketch row-agreement rate.
    pub estimate: f64,
    /// Every site the candidate content is indexed at.
    pub locations: Vec<DocumentLocation>,
}

/// The two result sets of one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    /// Blob id of the query input.
    pub blob_id: String,
    pub duplicates: Vec<DuplicateHit>,
    pub similar: Vec<SimilarHit>,
}

/// Errors produced by the query path.
#[derive(Debug, Error)]
pub enum MatchError {
    /// No DocFreq or sketch parameters in the store: nothing was indexed.
    #[error("index not built; run `hash` before `query`")]
    IndexNotBuilt,
    #[error("invalid query config: {0}")]
    InvalidConfig(String),
    #[error("feature extraction failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("sketch error: {0}")]
    Sketch(#[from] SketchError),
    #[error("function {name:?} at line {line} not found in input")]
    FunctionNotFound { name: String, line: u32 },
}
