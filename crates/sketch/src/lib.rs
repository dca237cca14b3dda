//! Weighted MinHash sketching and LSH banding, the similarity core of
//! srcdup.
//!
//! Given a document's weighted feature bag and the corpus vocabulary, this
//! crate produces a fixed-length integer sketch whose per-row collision
//! probability equals the generalized Jaccard similarity between bags, then
//! partitions the sketch into band values for near-constant-time candidate
//! lookup.
//!
//! ## What you need to know
//!
//! - Pure functions: same bag, same seed, same sketch. No I/O, no ambient
//!   randomness; the seed lives in [`SketchConfig`] and its identity is
//!   persisted as a [`SketchArtifact`] with the index.
//! - The pipeline is TF-IDF weighting ([`tfidf_bag`]) → Ioffe sketching
//!   ([`sketch_bag`]) → banding ([`band_sketch`]).
//!
//! ## Quick example
//!
//! ```
//! use docfreq::DocFreqBuilder;
//! use extract::Feature;
//! use sketch::{band_sketch, sketch_bag, tfidf_bag, SketchConfig, SketchParams};
//!
//! let mut builder = DocFreqBuilder::new();
//! builder.add_document("d1", ["loop", "index"]);
//! builder.add_document("d2", ["loop", "shard"]);
//! let df = builder.build();
//!
//! let cfg = SketchConfig::default();
//! let params = SketchParams::new(&cfg);
//! let features = vec![Feature { token: "index".into(), weight: 2 }];
//!
//! let sketch = sketch_bag(&tfidf_bag(&features, &df), &params);
//! let banded = band_sketch(&sketch, &cfg).unwrap();
//! assert_eq!(banded.len(), cfg.bands);
//! ```

mod bands;
mod config;
mod params;
mod wmh;

pub use crate::bands::{band_sketch, BandedSketch};
pub use crate::config::{
    SketchArtifact, SketchConfig, SketchError, DEFAULT_SEED, SKETCH_ARTIFACT_VERSION,
};
pub use crate::params::SketchParams;
pub use crate::wmh::{sketch_bag, tfidf_bag, Bag, Sketch};
