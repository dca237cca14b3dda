//! LSH banding over sketches.
//!
//! A sketch's K rows split into B contiguous bands of R rows; each band
//! hashes to a single opaque value. Two documents are banded-equal at band
//! `b` iff their values at `b` match, which happens with probability
//! `J^R` per band and `1 − (1 − J^R)^B` for at least one band. The default
//! B = 32, R = 4 parameters place that curve steeply around J ≈ 0.5.

use serde::{Deserialize, Serialize};

use crate::config::{SketchConfig, SketchError};
use crate::wmh::Sketch;

/// The B band values of one sketch, in band order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandedSketch {
    pub values: Vec<String>,
}

impl BandedSketch {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate (band index, band value) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.values.iter().enumerate().map(|(i, v)| (i, v.as_str()))
    }
}

/// Partition a sketch into band values.
///
/// The sketch must have exactly `bands × rows_per_band` rows.
pub fn band_sketch(sketch: &Sketch, cfg: &SketchConfig) -> Result<BandedSketch, SketchError> {
    let expected = cfg.hash_rows();
    if sketch.len() != expected {
        return Err(SketchError::RowCountMismatch {
            expected,
            got: sketch.len(),
        });
    }

    let values = sketch
        .rows
        .chunks_exact(cfg.rows_per_band)
        .map(identity::band_value)
        .collect();
    Ok(BandedSketch { values })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::SketchParams;
    use crate::wmh::{sketch_bag, Bag};

    fn cfg() -> SketchConfig {
        SketchConfig::default()
    }

    fn sample_sketch(seed_entry: u64) -> Sketch {
        let bag = Bag::from_entries(vec![(seed_entry, 1.0), (seed_entry + 3, 2.0)]);
        sketch_bag(&bag, &SketchParams::new(&cfg()))
    }

    #[test]
    fn band_count_matches_config() {
        let banded = band_sketch(&sample_sketch(1), &cfg()).unwrap();
        assert_eq!(banded.len(), cfg().bands);
        assert!(banded.values.iter().all(|v| v.len() == 40));
    }

    #[test]
    fn identical_sketches_band_identically() {
        let a = band_sketch(&sample_sketch(5), &cfg()).unwrap();
        let b = band_sketch(&sample_sketch(5), &cfg()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn different_sketches_band_differently() {
        let a = band_sketch(&sample_sketch(1), &cfg()).unwrap();
        let b = band_sketch(&sample_sketch(100), &cfg()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn banding_rejects_wrong_row_count() {
        let short = Sketch::sentinel(7);
        assert!(matches!(
            band_sketch(&short, &cfg()),
            Err(SketchError::RowCountMismatch { .. })
        ));
    }

    #[test]
    fn iter_yields_indexed_values() {
        let banded = band_sketch(&sample_sketch(2), &cfg()).unwrap();
        let collected: Vec<(usize, &str)> = banded.iter().collect();
        assert_eq!(collected.len(), cfg().bands);
        assert_eq!(collected[0].0, 0);
        assert_eq!(collected.last().unwrap().0, cfg().bands - 1);
    }
}
