//! The query engine: one input document against the whole index.

use std::sync::Arc;

use extract::FeatureExtractor;
use hashbrown::HashSet;
use index::CorpusIndex;
use sketch::{band_sketch, sketch_bag, tfidf_bag, SketchParams};
use tracing::debug;

use crate::types::{DuplicateHit, MatchError, QueryConfig, QueryOutcome, SimilarHit};

#[cfg(test)]
mod tests;

/// Finds duplicates and near-duplicates of a single input document.
///
/// The engine reproduces the write-path transform for the input (TF-IDF
/// against the stored DocFreq, sketching under the stored parameter
/// artifact, banding), then probes the band buckets for candidates and
/// scores them by sketch row agreement. The stored artifact is
/// authoritative: sketches are only comparable within one sketch space, so
/// the engine never substitutes a locally configured seed.
pub struct QueryEngine {
    index: Arc<CorpusIndex>,
    extractor: Arc<dyn FeatureExtractor>,
    cfg: QueryConfig,
}

impl QueryEngine {
    /// Construct an engine owning its index.
    pub fn new(
        index: CorpusIndex,
        extractor: Arc<dyn FeatureExtractor>,
        cfg: QueryConfig,
    ) -> Result<Self, MatchError> {
        Self::with_index_arc(Arc::new(index), extractor, cfg)
    }

    /// Construct an engine over a shared index handle.
    pub fn with_index_arc(
        index: Arc<CorpusIndex>,
        extractor: Arc<dyn FeatureExtractor>,
        cfg: QueryConfig,
    ) -> Result<Self, MatchError> {
        cfg.validate()?;
        Ok(Self {
            index,
            extractor,
            cfg,
        })
    }

    /// Query a whole file's bytes.
    pub fn query_file(&self, bytes: &[u8]) -> Result<QueryOutcome, MatchError> {
        let blob_id = identity::blob_id(bytes);
        let features = self.extractor.extract_file(bytes)?;
        self.query_features(blob_id, &features)
    }

    /// Query one function inside a file, addressed by name and optionally
    /// by definition line (required when the name is ambiguous).
    pub fn query_function(
        &self,
        bytes: &[u8],
        name: &str,
        line: Option<u32>,
    ) -> Result<QueryOutcome, MatchError> {
        let functions = self.extractor.extract_functions(bytes)?;
        let found = functions
            .iter()
            .find(|f| f.name == name && line.map_or(true, |l| f.line == l))
            .ok_or_else(|| MatchError::FunctionNotFound {
                name: name.to_string(),
                line: line.unwrap_or(0),
            })?;
        let blob_id = identity::blob_id(found.text.as_bytes());
        self.query_features(blob_id, &found.features)
    }

    /// Query an already-extracted feature bag under a known blob id.
    pub fn query_features(
        &self,
        blob_id: String,
        features: &[extract::Feature],
    ) -> Result<QueryOutcome, MatchError> {
        // Exact duplicates come straight from meta, before any sketching.
        let duplicates: Vec<DuplicateHit> = self
            .index
            .locations(&blob_id)?
            .into_iter()
            .map(|location| DuplicateHit {
                blob_id: blob_id.clone(),
                location,
            })
            .collect();

        let df = self.index.doc_freq()?.ok_or(MatchError::IndexNotBuilt)?;
        let artifact = self.index.artifact()?.ok_or(MatchError::IndexNotBuilt)?;
        let sketch_cfg = artifact.to_config();
        let params = SketchParams::new(&sketch_cfg);

        let bag = tfidf_bag(features, &df);
        if bag.is_empty() {
            // Nothing to sketch; the input still matches byte-identical
            // content.
            return Ok(QueryOutcome {
                blob_id,
                duplicates,
                similar: Vec::new(),
            });
        }

        let sketch = sketch_bag(&bag, &params);
        let banded = band_sketch(&sketch, &sketch_cfg)?;

        let mut candidates: HashSet<String> = HashSet::new();
        for (band, value) in banded.iter() {
            for candidate in self.index.bucket(band, value)? {
                candidates.insert(candidate);
            }
        }
        candidates.remove(&blob_id);
        debug!(
            blob = %blob_id,
            candidates = candidates.len(),
            "band probe complete"
        );

        // Sorted iteration keeps scoring order (and therefore any log
        // output) deterministic.
        let mut ordered: Vec<String> = candidates.into_iter().collect();
        ordered.sort();

        let mut similar = Vec::new();
        for candidate in ordered {
            let Some(candidate_sketch) = self.index.sketch(&candidate)? else {
                continue;
            };
            let estimate = sketch.agreement(&candidate_sketch)?;
            if estimate >= self.cfg.similarity_floor {
                let locations = self.index.locations(&candidate)?;
                similar.push(SimilarHit {
                    blob_id: candidate,
                    estimate,
                    locations,
                });
            }
        }

        similar.sort_by(|a, b| {
            b.estimate
                .partial_cmp(&a.estimate)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.blob_id.cmp(&b.blob_id))
        });

        Ok(QueryOutcome {
            blob_id,
            duplicates,
            similar,
        })
    }
}
