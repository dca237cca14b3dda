use std::sync::Arc;

use extract::{ExtractConfig, FeatureExtractor, TokenExtractor};
use index::{
    BackendConfig, CorpusIndex, DocumentLocation, IndexConfig, IndexEntry, IndexWriter,
};
use sketch::{band_sketch, sketch_bag, tfidf_bag, SketchArtifact, SketchConfig, SketchParams};

use super::QueryEngine;
use crate::types::{MatchError, QueryConfig};

const SHARED_SOURCE: &str = "\
fn accumulate_totals(ledger: &[Transaction]) -> Summary {
    let mut running_balance = 0i64;
    let mut largest_deposit = 0i64;
    let mut withdrawal_count = 0usize;
    for transaction in ledger {
        running_balance += transaction.amount;
        if transaction.amount > largest_deposit {
            largest_deposit = transaction.amount;
        }
        if transaction.amount < 0 {
            withdrawal_count += 1;
        }
    }
    Summary { running_balance, largest_deposit, withdrawal_count }
}
";

/// The shared source with a short trailing comment appended.
const TWEAKED_SOURCE: &str = "\
fn accumulate_totals(ledger: &[Transaction]) -> Summary {
    let mut running_balance = 0i64;
    let mut largest_deposit = 0i64;
    let mut withdrawal_count = 0usize;
    for transaction in ledger {
        running_balance += transaction.amount;
        if transaction.amount > largest_deposit {
            largest_deposit = transaction.amount;
        }
        if transaction.amount < 0 {
            withdrawal_count += 1;
        }
    }
    Summary { running_balance, largest_deposit, withdrawal_count }
}
// audited manually
";

/// A small two-repo corpus: a shared file, a near-duplicate of it, and an
/// unrelated file. Returns the index with DocFreq and parameters stored.
fn seeded_index() -> (Arc<CorpusIndex>, Arc<TokenExtractor>) {
    let extractor = Arc::new(TokenExtractor::new(ExtractConfig::default()).unwrap());
    let index = Arc::new(
        CorpusIndex::new(IndexConfig::new().with_backend(BackendConfig::in_memory())).unwrap(),
    );

    let docs: Vec<(&str, &str, &str)> = vec![
        ("repo-a", "src/sum.rs", SHARED_SOURCE),
        ("repo-b", "lib/sum.rs", TWEAKED_SOURCE),
        (
            "repo-b",
            "README.md",
            "unrelated prose about shipping schedules and museum visits",
        ),
    ];

    let mut builder = docfreq::DocFreqBuilder::new();
    let mut extracted = Vec::new();
    for (repo, path, text) in &docs {
        let blob = identity::blob_id(text.as_bytes());
        let features = extractor.extract_file(text.as_bytes()).unwrap();
        let key = identity::DocumentKey::file(*repo, *path, blob.clone()).to_string();
        builder.add_document(&key, features.iter().map(|f| f.token.as_str()));
        extracted.push((repo.to_string(), path.to_string(), blob, features));
    }
    let df = builder.build();

    let cfg = SketchConfig::default();
    let params = SketchParams::new(&cfg);
    index.put_doc_freq(&df).unwrap();
    index.put_artifact(&SketchArtifact::of(&cfg)).unwrap();

    let writer = IndexWriter::new(index.clone());
    for (repo, path, blob, features) in extracted {
        let sketch = sketch_bag(&tfidf_bag(&features, &df), &params);
        let bands = (!sketch.is_sentinel())
            .then(|| band_sketch(&sketch, &cfg).unwrap());
        writer
            .write(&IndexEntry {
                blob_id: blob,
                location: DocumentLocation::file(repo, "WORKDIR", path),
                features,
                sketch: Some(sketch),
                bands,
            })
            .unwrap();
    }

    (index, extractor)
}

fn engine(index: Arc<CorpusIndex>, extractor: Arc<TokenExtractor>) -> QueryEngine {
    QueryEngine::with_index_arc(index, extractor, QueryConfig::default()).unwrap()
}

#[test]
fn exact_duplicate_is_reported_from_meta() {
    let (index, extractor) = seeded_index();
    let engine = engine(index, extractor);

    let outcome = engine.query_file(SHARED_SOURCE.as_bytes()).unwrap();

    assert_eq!(outcome.duplicates.len(), 1);
    assert_eq!(outcome.duplicates[0].location.repo, "repo-a");
    // The duplicate blob never shows up again as a similar hit.
    assert!(outcome
        .similar
        .iter()
        .all(|hit| hit.blob_id != outcome.blob_id));
}

#[test]
fn near_duplicate_surfaces_as_similar() {
    let (index, extractor) = seeded_index();
    let engine = engine(index, extractor);

    // The repo-b variant differs only by a trailing comment.
    let outcome = engine.query_file(SHARED_SOURCE.as_bytes()).unwrap();

    assert!(
        outcome
            .similar
            .iter()
            .any(|hit| hit.locations.iter().any(|l| l.path == "lib/sum.rs")),
        "expected the near-duplicate to be reported: {:?}",
        outcome.similar
    );
    for hit in &outcome.similar {
        assert!(hit.estimate >= 0.5);
    }
}

#[test]
fn unrelated_content_matches_nothing() {
    let (index, extractor) = seeded_index();
    let engine = engine(index, extractor);

    let outcome = engine
        .query_file(b"completely different topic entirely: orbital mechanics homework")
        .unwrap();

    assert!(outcome.duplicates.is_empty());
    assert!(outcome.similar.is_empty());
}

#[test]
fn empty_store_fails_with_index_not_built() {
    let extractor = Arc::new(TokenExtractor::new(ExtractConfig::default()).unwrap());
    let index = Arc::new(
        CorpusIndex::new(IndexConfig::new().with_backend(BackendConfig::in_memory())).unwrap(),
    );
    let engine = engine(index, extractor);

    let err = engine.query_file(b"anything at all").unwrap_err();
    assert!(matches!(err, MatchError::IndexNotBuilt));
}

#[test]
fn results_are_ordered_and_deterministic() {
    let (index, extractor) = seeded_index();
    let engine = engine(index, extractor);
    let input = TWEAKED_SOURCE.as_bytes();

    let first = engine.query_file(input).unwrap();
    let second = engine.query_file(input).unwrap();

    let ids = |outcome: &crate::types::QueryOutcome| {
        outcome
            .similar
            .iter()
            .map(|h| (h.blob_id.clone(), h.estimate))
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
    for window in first.similar.windows(2) {
        assert!(window[0].estimate >= window[1].estimate);
    }
}

#[test]
fn missing_function_is_an_error() {
    let (index, extractor) = seeded_index();
    let engine = engine(index, extractor);

    let err = engine
        .query_function(b"fn other() {}", "absent", None)
        .unwrap_err();
    assert!(matches!(err, MatchError::FunctionNotFound { .. }));
}
