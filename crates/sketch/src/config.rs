//! Configuration, persisted parameter artifact, and error types for the
//! sketching layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default seed for the parameter matrices. Documented here because the
/// seed is part of an index's identity: re-seeding invalidates every sketch
/// and band value in it.
pub const DEFAULT_SEED: u64 = 0x5EED_C0DE_5EED_C0DE;

/// Bump when the persisted parameter artifact layout changes.
pub const SKETCH_ARTIFACT_VERSION: u16 = 1;

/// Fixed parameters of one sketch space.
///
/// A sketch has `bands × rows_per_band` hash rows. Two sketches are only
/// comparable when they were produced under the same configuration and
/// seed; the [`SketchArtifact`] stored with an index records that identity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SketchConfig {
    /// Configuration schema version.
    pub version: u32,
    /// Number of LSH bands (B).
    pub bands: usize,
    /// Hash rows per band (R).
    pub rows_per_band: usize,
    /// Seed all parameter rows derive from.
    pub seed: u64,
}

impl SketchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of bands. More bands raise recall at a given row
    /// count; fewer raise precision.
    pub fn with_bands(mut self, bands: usize) -> Self {
        self.bands = bands;
        self
    }

    /// Set the rows per band. More rows sharpen the banding threshold.
    pub fn with_rows_per_band(mut self, rows_per_band: usize) -> Self {
        self.rows_per_band = rows_per_band;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Total hash rows per sketch (K = B × R).
    pub fn hash_rows(&self) -> usize {
        self.bands * self.rows_per_band
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), SketchError> {
        if self.version == 0 {
            return Err(SketchError::InvalidConfigVersion {
                version: self.version,
            });
        }
        if self.bands == 0 {
            return Err(SketchError::InvalidConfigBands { bands: self.bands });
        }
        if self.rows_per_band == 0 {
            return Err(SketchError::InvalidConfigRows {
                rows: self.rows_per_band,
            });
        }
        if self.bands.checked_mul(self.rows_per_band).is_none() {
            return Err(SketchError::LengthOverflow {
                bands: self.bands,
                rows: self.rows_per_band,
            });
        }
        Ok(())
    }
}

impl Default for SketchConfig {
    fn default() -> Self {
        Self {
            version: 1,
            bands: 32,
            rows_per_band: 4,
            seed: DEFAULT_SEED,
        }
    }
}

/// The persisted identity of a sketch space.
///
/// Parameter rows regenerate deterministically from `(seed, hash rows)`, so
/// storing this artifact with an index is equivalent to storing the full
/// Gamma/Uniform matrices verbatim. An index whose stored artifact
/// disagrees with the configured one must be rebuilt, never mixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SketchArtifact {
    pub schema_version: u16,
    pub seed: u64,
    pub bands: usize,
    pub rows_per_band: usize,
}

impl SketchArtifact {
    pub fn of(cfg: &SketchConfig) -> Self {
        Self {
            schema_version: SKETCH_ARTIFACT_VERSION,
            seed: cfg.seed,
            bands: cfg.bands,
            rows_per_band: cfg.rows_per_band,
        }
    }

    /// Whether sketches produced under `cfg` live in this artifact's space.
    pub fn matches(&self, cfg: &SketchConfig) -> bool {
        self.seed == cfg.seed
            && self.bands == cfg.bands
            && self.rows_per_band == cfg.rows_per_band
    }

    /// Reconstruct the configuration this artifact was written under.
    pub fn to_config(&self) -> SketchConfig {
        SketchConfig {
            version: 1,
            bands: self.bands,
            rows_per_band: self.rows_per_band,
            seed: self.seed,
        }
    }
}

/// Errors produced by the sketching layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SketchError {
    #[error("invalid config: bands must be >= 1 (got {bands})")]
    InvalidConfigBands { bands: usize },

    #[error("invalid config: rows_per_band must be >= 1 (got {rows})")]
    InvalidConfigRows { rows: usize },

    #[error("invalid config version {version}; expected >= 1")]
    InvalidConfigVersion { version: u32 },

    #[error("invalid config: hash row count overflow for bands={bands} rows={rows}")]
    LengthOverflow { bands: usize, rows: usize },

    #[error("sketch has {got} rows where {expected} were expected")]
    RowCountMismatch { expected: usize, got: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = SketchConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.bands, 32);
        assert_eq!(cfg.rows_per_band, 4);
        assert_eq!(cfg.hash_rows(), 128);
        assert_eq!(cfg.seed, DEFAULT_SEED);
    }

    #[test]
    fn builder_chain() {
        let cfg = SketchConfig::new()
            .with_bands(16)
            .with_rows_per_band(8)
            .with_seed(7);
        assert_eq!(cfg.hash_rows(), 128);
        assert_eq!(cfg.seed, 7);
    }

    #[test]
    fn zero_parameters_rejected() {
        assert!(matches!(
            SketchConfig::new().with_bands(0).validate(),
            Err(SketchError::InvalidConfigBands { bands: 0 })
        ));
        assert!(matches!(
            SketchConfig::new().with_rows_per_band(0).validate(),
            Err(SketchError::InvalidConfigRows { rows: 0 })
        ));
        let cfg = SketchConfig {
            version: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(SketchError::InvalidConfigVersion { version: 0 })
        ));
    }

    #[test]
    fn row_count_overflow_rejected() {
        let cfg = SketchConfig::new()
            .with_bands(usize::MAX)
            .with_rows_per_band(2);
        assert!(matches!(
            cfg.validate(),
            Err(SketchError::LengthOverflow { .. })
        ));
    }

    #[test]
    fn artifact_round_trips_config_identity() {
        let cfg = SketchConfig::new().with_seed(99).with_bands(8);
        let artifact = SketchArtifact::of(&cfg);
        assert!(artifact.matches(&cfg));
        assert_eq!(artifact.to_config().hash_rows(), cfg.hash_rows());

        let other = SketchConfig::new().with_seed(100).with_bands(8);
        assert!(!artifact.matches(&other));
    }

    #[test]
    fn artifact_serde_roundtrip() {
        let artifact = SketchArtifact::of(&SketchConfig::default());
        let json = serde_json::to_string(&artifact).unwrap();
        let back: SketchArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(artifact, back);
    }
}
