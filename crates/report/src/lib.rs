//! Corpus-wide duplicate and similarity reports.
//!
//! The report path never sketches anything: it works entirely from what the
//! index already holds.
//!
//! - **Duplicate clusters** fall straight out of the meta table: every blob
//!   observed at two or more sites is a cluster of exact duplicates.
//! - **Similar components** come from the band graph: the vertices are all
//!   sketched blobs, and every (band index, band value) bucket with at
//!   least two members connects its blobs. Connected components of size
//!   two or more are candidate clone groups, optionally re-verified
//!   pairwise against the similarity floor using the stored sketches.
//!
//! Bucket scans stream through the store; all-pairs edges are never
//! materialized. A popular token family can still make one bucket huge;
//! such buckets are skipped, counted, and reported so the sampling bias is
//! visible in the output.

mod union_find;

use std::collections::HashMap;

use index::{CorpusIndex, DocumentLocation, IndexError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::union_find::UnionFind;

/// Configuration for the report path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportConfig {
    /// Configuration schema version.
    pub version: u32,
    /// When set, a component survives only if every intra-component pair's
    /// estimated similarity meets this floor.
    pub similarity_floor: Option<f64>,
    /// Buckets with more members than this are skipped (and counted)
    /// instead of contributing edges.
    pub max_bucket: usize,
}

impl ReportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_similarity_floor(mut self, floor: Option<f64>) -> Self {
        self.similarity_floor = floor;
        self
    }

    pub fn with_max_bucket(mut self, max_bucket: usize) -> Self {
        self.max_bucket = max_bucket;
        self
    }

    /// Validate configuration parameters.
    pub fn validate(&self) -> Result<(), ReportError> {
        if self.version == 0 {
            return Err(ReportError::InvalidConfig(
                "version must be >= 1".to_string(),
            ));
        }
        if self.max_bucket < 2 {
            return Err(ReportError::InvalidConfig(
                "max_bucket must be >= 2".to_string(),
            ));
        }
        if let Some(floor) = self.similarity_floor {
            if !(0.0..=1.0).contains(&floor) {
                return Err(ReportError::InvalidConfig(format!(
                    "similarity_floor must be within [0, 1], got {floor}"
                )));
            }
        }
        Ok(())
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            version: 1,
            similarity_floor: Some(0.5),
            max_bucket: 64,
        }
    }
}

/// Errors produced by the report path.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid report config: {0}")]
    InvalidConfig(String),
    #[error("index error: {0}")]
    Index(#[from] IndexError),
    #[error("sketch error: {0}")]
    Sketch(#[from] sketch::SketchError),
}

/// One group of byte-identical documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateCluster {
    pub blob_id: String,
    pub locations: Vec<DocumentLocation>,
}

/// One connected component of the similar-document graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarComponent {
    /// Member blob ids, sorted.
    pub blobs: Vec<String>,
    /// The smallest pairwise estimate within the component, when the
    /// post-filter computed it.
    pub min_estimate: Option<f64>,
}

/// The full all-pairs report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub duplicates: Vec<DuplicateCluster>,
    pub components: Vec<SimilarComponent>,
    /// Band buckets skipped for exceeding `max_bucket`.
    pub skipped_buckets: usize,
}

/// Build the duplicate clusters and similar components of the entire index.
pub fn build_report(index: &CorpusIndex, cfg: &ReportConfig) -> Result<Report, ReportError> {
    cfg.validate()?;

    let duplicates = duplicate_clusters(index)?;
    let (components, skipped_buckets) = similar_components(index, cfg)?;

    Ok(Report {
        duplicates,
        components,
        skipped_buckets,
    })
}

/// Group meta rows by blob id and keep groups of two or more sites.
fn duplicate_clusters(index: &CorpusIndex) -> Result<Vec<DuplicateCluster>, ReportError> {
    let mut clusters = Vec::new();
    index.scan_locations(&mut |blob_id, locations| {
        if locations.len() >= 2 {
            clusters.push(DuplicateCluster {
                blob_id: blob_id.to_string(),
                locations: locations.to_vec(),
            });
        }
        Ok(())
    })?;
    // Scan order is backend key order already, but make it explicit.
    clusters.sort_by(|a, b| a.blob_id.cmp(&b.blob_id));
    Ok(clusters)
}

/// Connected components of the band graph, post-filtered by pairwise
/// estimates when a floor is configured.
fn similar_components(
    index: &CorpusIndex,
    cfg: &ReportConfig,
) -> Result<(Vec<SimilarComponent>, usize), ReportError> {
    // Dense remap: blob id → small integer.
    let mut blob_of: Vec<String> = Vec::new();
    let mut id_of: HashMap<String, usize> = HashMap::new();
    index.scan_sketched_blobs(&mut |blob_id| {
        id_of.insert(blob_id.to_string(), blob_of.len());
        blob_of.push(blob_id.to_string());
        Ok(())
    })?;

    let mut uf = UnionFind::new(blob_of.len());
    let mut skipped_buckets = 0usize;

    index.scan_buckets(&mut |band, value, blobs| {
        if blobs.len() < 2 {
            return Ok(());
        }
        if blobs.len() > cfg.max_bucket {
            skipped_buckets += 1;
            warn!(band, value, members = blobs.len(), "skipping oversized band bucket");
            return Ok(());
        }
        // Star unions: connecting everything to the first member spans the
        // bucket without emitting all pairs.
        let mut members = blobs.iter().filter_map(|b| id_of.get(b).copied());
        if let Some(first) = members.next() {
            for other in members {
                uf.union(first, other);
            }
        }
        Ok(())
    })?;

    let mut components = Vec::new();
    for group in uf.components() {
        if group.len() < 2 {
            continue;
        }
        let mut blobs: Vec<String> = group.iter().map(|&i| blob_of[i].clone()).collect();
        blobs.sort();

        let min_estimate = match cfg.similarity_floor {
            None => None,
            Some(floor) => {
                let estimate = min_pairwise_estimate(index, &blobs)?;
                if estimate < floor {
                    continue;
                }
                Some(estimate)
            }
        };

        components.push(SimilarComponent {
            blobs,
            min_estimate,
        });
    }
    components.sort_by(|a, b| a.blobs.cmp(&b.blobs));
    Ok((components, skipped_buckets))
}

/// Smallest pairwise sketch agreement within a component.
fn min_pairwise_estimate(index: &CorpusIndex, blobs: &[String]) -> Result<f64, ReportError> {
    let mut sketches = Vec::with_capacity(blobs.len());
    for blob in blobs {
        match index.sketch(blob)? {
            Some(sketch) => sketches.push(sketch),
            // A component member without a sketch cannot be verified.
            None => return Ok(0.0),
        }
    }
    let mut min = 1.0f64;
    for i in 0..sketches.len() {
        for j in (i + 1)..sketches.len() {
            let estimate = sketches[i].agreement(&sketches[j])?;
            if estimate < min {
                min = estimate;
            }
        }
    }
    Ok(min)
}
