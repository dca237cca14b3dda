//! srcdup: duplicate and near-duplicate source-code detection.
//!
//! The umbrella crate wires the member crates into the full pipeline and
//! re-exports their public surfaces so applications can depend on one
//! crate:
//!
//! ```text
//! walker → features → DocFreq → TF-IDF bag → Weighted MinHash → bands → store
//! ```
//!
//! Indexing ([`index_corpus`]) walks one or more repositories, extracts a
//! weighted feature bag per document, builds the corpus-wide
//! [`OrderedDocFreq`], sketches every document under the configured
//! parameters, and persists metadata, feature bags, sketches, and band
//! rows. Running `hash` again against a populated store folds the stored
//! documents into the batch first: the vocabulary is rebuilt over the
//! union, the stale sketch and band tables are dropped, and every
//! document, old and new, is re-sketched under the new token ordering
//! (growing the corpus shifts token positions, so sketches from the old
//! ordering are not comparable with new ones). Documents the extractor
//! cannot process are counted per reason and reported in the
//! [`IndexSummary`]; they never abort the job. Queries and reports run
//! through the [`QueryEngine`] and [`build_report`] re-exports against the
//! same store.
//!
//! ```no_run
//! use srcdup::{index_corpus, CancellationToken, PipelineConfig};
//! use srcdup::{CorpusIndex, FsRepoWalker, RepoWalker, TokenExtractor};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), srcdup::PipelineError> {
//! let cfg = PipelineConfig::default();
//! let index = Arc::new(CorpusIndex::new(cfg.index.to_index_config())?);
//! let extractor = TokenExtractor::new(cfg.extract.clone())?;
//! let walker = FsRepoWalker::new("./my-repo").unwrap();
//! let walkers: Vec<&dyn RepoWalker> = vec![&walker];
//!
//! let summary = index_corpus(&walkers, &extractor, &index, &cfg, &CancellationToken::new())?;
//! println!("sketched {} documents", summary.sketched);
//! # Ok(())
//! # }
//! ```

pub mod config;

pub use config::{ConfigLoadError, PipelineConfig};
pub use docfreq::{DocFreqBuilder, DocFreqError, OrderedDocFreq};
pub use extract::{ExtractConfig, ExtractError, Feature, FeatureExtractor, TokenExtractor};
pub use identity::{blob_id, DocumentKey};
pub use index::{
    BackendConfig, CorpusIndex, DocumentLocation, IndexConfig, IndexEntry, IndexError,
    IndexWriter,
};
pub use matcher::{MatchError, QueryConfig, QueryEngine, QueryOutcome};
pub use report::{build_report, Report, ReportConfig, ReportError};
pub use sketch::{SketchArtifact, SketchConfig, SketchError, SketchParams};
pub use walk::{FsRepoWalker, MemoryWalker, RepoWalker, WalkError, WalkEvent, WalkedBlob};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use sketch::{band_sketch, sketch_bag, tfidf_bag};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur while running a pipeline verb.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("walk failure: {0}")]
    Walk(#[from] WalkError),
    #[error("extractor failure: {0}")]
    Extract(#[from] ExtractError),
    #[error("docfreq failure: {0}")]
    DocFreq(#[from] DocFreqError),
    #[error("sketch failure: {0}")]
    Sketch(#[from] SketchError),
    #[error("store failure: {0}")]
    Index(#[from] IndexError),
    #[error("query failure: {0}")]
    Match(#[from] MatchError),
    #[error("report failure: {0}")]
    Report(#[from] ReportError),
    #[error(
        "index was built under different sketch parameters (seed/bands/rows); \
         rebuild it from scratch or restore the original configuration"
    )]
    ParamsMismatch,
    #[error("job cancelled")]
    Cancelled,
}

/// Which unit of source the pipeline indexes and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Granularity {
    /// Whole files.
    #[default]
    File,
    /// Individual functions, keyed `repo//path@blob:name:line`.
    Func,
}

/// Per-reason counters for documents that were skipped, not failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipSummary {
    counts: BTreeMap<String, usize>,
}

impl SkipSummary {
    pub fn record(&mut self, reason: &str) {
        *self.counts.entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &SkipSummary) {
        for (reason, count) in &other.counts {
            *self.counts.entry(reason.clone()).or_insert(0) += count;
        }
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(reason, count)| (reason.as_str(), *count))
    }
}

/// Cooperative cancellation flag, checked at document boundaries: a
/// cancelled job dispatches no new documents, lets in-flight ones finish,
/// and writes no partial sketches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Outcome of one indexing run.
#[derive(Debug, Clone, Default)]
pub struct IndexSummary {
    /// Distinct blobs sketched by this run, including previously stored
    /// documents folded back in for the vocabulary rebuild.
    pub documents: usize,
    /// Blobs written with a sketch and band rows.
    pub sketched: usize,
    /// Blobs whose bag was empty (meta row only).
    pub empty: usize,
    /// Per-reason skipped documents.
    pub skipped: SkipSummary,
    /// Whether the job was cancelled before completing.
    pub cancelled: bool,
}

/// One document collected from the walkers, ready to sketch.
struct PendingDocument {
    blob_id: String,
    locations: Vec<DocumentLocation>,
    features: Vec<Feature>,
}

/// Index a corpus of repositories into the store.
///
/// The walk and extraction pass is sequential (it is I/O-bound and must
/// deduplicate by blob id); sketching and writing fan out over the rayon
/// pool, since every document is independent once the DocFreq and the
/// parameter artifact are fixed.
pub fn index_corpus(
    walkers: &[&dyn RepoWalker],
    extractor: &dyn FeatureExtractor,
    index: &Arc<CorpusIndex>,
    cfg: &PipelineConfig,
    cancel: &CancellationToken,
) -> Result<IndexSummary, PipelineError> {
    index_corpus_with_granularity(walkers, extractor, index, cfg, Granularity::File, cancel)
}

/// [`index_corpus`] with an explicit document granularity.
pub fn index_corpus_with_granularity(
    walkers: &[&dyn RepoWalker],
    extractor: &dyn FeatureExtractor,
    index: &Arc<CorpusIndex>,
    cfg: &PipelineConfig,
    granularity: Granularity,
    cancel: &CancellationToken,
) -> Result<IndexSummary, PipelineError> {
    let mut summary = IndexSummary::default();

    // The stored parameter artifact is the sketch space's identity; mixing
    // spaces would corrupt every comparison.
    let artifact = SketchArtifact::of(&cfg.sketch);
    if let Some(existing) = index.artifact()? {
        if existing != artifact {
            return Err(PipelineError::ParamsMismatch);
        }
    }

    let mut pending = collect_documents(walkers, extractor, granularity, &mut summary.skipped)?;
    merge_stored_documents(index, &mut pending, &mut summary.skipped)?;
    summary.documents = pending.len();
    if pending.is_empty() {
        info!("no indexable documents found");
        return Ok(summary);
    }

    // The DocFreq spans every document key in the union of this batch and
    // the documents already indexed, including multiple sites of the same
    // content.
    let mut builder = DocFreqBuilder::new();
    for doc in &pending {
        for location in &doc.locations {
            let key = location.document_key(&doc.blob_id).to_string();
            builder.add_document(&key, doc.features.iter().map(|f| f.token.as_str()));
        }
    }
    let df = builder.build();
    info!(documents = df.docs, tokens = df.tokens.len(), "docfreq built");

    index.put_doc_freq(&df)?;
    index.put_artifact(&artifact)?;
    // Sketch rows are keyed to token positions in the previous vocabulary;
    // they are all recomputed below, so drop them wholesale.
    index.clear_sketches()?;

    let params = SketchParams::new(&cfg.sketch);
    let writer = IndexWriter::new(index.clone());

    enum DocOutcome {
        Sketched,
        Empty,
        Cancelled,
        Failed(PipelineError),
    }

    let outcomes: Vec<DocOutcome> = pending
        .par_iter()
        .map(|doc| {
            if cancel.is_cancelled() {
                return DocOutcome::Cancelled;
            }
            let bag = tfidf_bag(&doc.features, &df);
            let sketch = sketch_bag(&bag, &params);
            let empty = sketch.is_sentinel();
            let bands = if empty {
                None
            } else {
                match band_sketch(&sketch, &cfg.sketch) {
                    Ok(banded) => Some(banded),
                    Err(err) => return DocOutcome::Failed(err.into()),
                }
            };

            for location in &doc.locations {
                let entry = IndexEntry {
                    blob_id: doc.blob_id.clone(),
                    location: location.clone(),
                    features: doc.features.clone(),
                    sketch: Some(sketch.clone()),
                    bands: bands.clone(),
                };
                if let Err(err) = writer.write(&entry) {
                    return DocOutcome::Failed(err.into());
                }
            }
            if empty {
                DocOutcome::Empty
            } else {
                DocOutcome::Sketched
            }
        })
        .collect();

    for outcome in outcomes {
        match outcome {
            DocOutcome::Sketched => summary.sketched += 1,
            DocOutcome::Empty => {
                summary.empty += 1;
                summary.skipped.record("sketch-empty");
            }
            DocOutcome::Cancelled => summary.cancelled = true,
            DocOutcome::Failed(err) => return Err(err),
        }
    }

    index.flush()?;
    info!(
        documents = summary.documents,
        sketched = summary.sketched,
        empty = summary.empty,
        skipped = summary.skipped.total(),
        cancelled = summary.cancelled,
        "indexing complete"
    );
    Ok(summary)
}

/// Fold every document already in the store into the batch, so the
/// vocabulary rebuild and the re-sketch pass cover the union. Stored
/// locations of a blob that was walked again merge into its pending entry;
/// stored blobs absent from the batch are revived from their persisted
/// feature bags.
fn merge_stored_documents(
    index: &CorpusIndex,
    pending: &mut Vec<PendingDocument>,
    skipped: &mut SkipSummary,
) -> Result<(), PipelineError> {
    let mut slot_of: BTreeMap<String, usize> = pending
        .iter()
        .enumerate()
        .map(|(slot, doc)| (doc.blob_id.clone(), slot))
        .collect();

    let mut stored: Vec<(String, Vec<DocumentLocation>)> = Vec::new();
    index.scan_locations(&mut |blob_id, locations| {
        stored.push((blob_id.to_string(), locations.to_vec()));
        Ok(())
    })?;

    for (blob_id, locations) in stored {
        match slot_of.get(&blob_id) {
            Some(&slot) => {
                let doc = &mut pending[slot];
                for location in locations {
                    if !doc.locations.iter().any(|known| known.same_site(&location)) {
                        doc.locations.push(location);
                    }
                }
            }
            None => match index.features(&blob_id)? {
                Some(features) => {
                    slot_of.insert(blob_id.clone(), pending.len());
                    pending.push(PendingDocument {
                        blob_id,
                        locations,
                        features,
                    });
                }
                None => {
                    // Meta without a feature record cannot be re-sketched.
                    warn!(blob = %blob_id, "stored document has no feature record");
                    skipped.record("missing-features");
                }
            },
        }
    }
    Ok(())
}

/// Walk all repositories, extract features, and deduplicate by blob id.
fn collect_documents(
    walkers: &[&dyn RepoWalker],
    extractor: &dyn FeatureExtractor,
    granularity: Granularity,
    skipped: &mut SkipSummary,
) -> Result<Vec<PendingDocument>, PipelineError> {
    let mut order: Vec<String> = Vec::new();
    let mut by_blob: BTreeMap<String, PendingDocument> = BTreeMap::new();
    // Fatal extractor failures abort the walk from inside the visitor.
    let mut fatal: Option<ExtractError> = None;

    for walker in walkers {
        let walk_result = walker.walk(&mut |event: WalkEvent| {
            let blob = match event {
                WalkEvent::Blob(blob) => blob,
                WalkEvent::Unreadable { path, reason } => {
                    warn!(%path, %reason, "unreadable input");
                    skipped.record("unreadable");
                    return Ok(());
                }
            };
            if blob.is_binary {
                skipped.record("binary");
                return Ok(());
            }

            match granularity {
                Granularity::File => {
                    let blob_id = identity::blob_id(&blob.bytes);
                    let location =
                        DocumentLocation::file(&*blob.repo, &*blob.commit, &*blob.path)
                            .with_timestamp(chrono_now());
                    if let Some(existing) = by_blob.get_mut(&blob_id) {
                        existing.locations.push(location);
                        return Ok(());
                    }
                    match extractor.extract_file(&blob.bytes) {
                        Ok(features) => {
                            order.push(blob_id.clone());
                            by_blob.insert(
                                blob_id.clone(),
                                PendingDocument {
                                    blob_id,
                                    locations: vec![location],
                                    features,
                                },
                            );
                        }
                        Err(ExtractError::Skipped(reason)) => {
                            warn!(path = %blob.path, %reason, "extractor skipped document");
                            skipped.record(&reason);
                        }
                        Err(err) => {
                            fatal = Some(err);
                            return Err(WalkError::Aborted("extractor unavailable".into()));
                        }
                    }
                }
                Granularity::Func => match extractor.extract_functions(&blob.bytes) {
                    Ok(functions) if functions.is_empty() => {
                        skipped.record("no-functions");
                    }
                    Ok(functions) => {
                        for function in functions {
                            let blob_id = identity::blob_id(function.text.as_bytes());
                            let location = DocumentLocation::function(
                                &*blob.repo,
                                &*blob.commit,
                                &*blob.path,
                                &*function.name,
                                function.line,
                            )
                            .with_timestamp(chrono_now());
                            if let Some(existing) = by_blob.get_mut(&blob_id) {
                                existing.locations.push(location);
                                continue;
                            }
                            order.push(blob_id.clone());
                            by_blob.insert(
                                blob_id.clone(),
                                PendingDocument {
                                    blob_id,
                                    locations: vec![location],
                                    features: function.features,
                                },
                            );
                        }
                    }
                    Err(ExtractError::Skipped(reason)) => {
                        warn!(path = %blob.path, %reason, "extractor skipped document");
                        skipped.record(&reason);
                    }
                    Err(err) => {
                        fatal = Some(err);
                        return Err(WalkError::Aborted("extractor unavailable".into()));
                    }
                },
            }
            Ok(())
        });

        // A fatal extractor error aborts the walk from inside the visitor;
        // report it as the cause rather than the aborted walk.
        if let Some(err) = fatal.take() {
            return Err(err.into());
        }
        walk_result?;
    }

    // Keep walk order: workers shard over this list, and a stable order
    // keeps logs and summaries reproducible.
    Ok(order
        .into_iter()
        .filter_map(|blob| by_blob.remove(&blob))
        .collect())
}

fn chrono_now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}
