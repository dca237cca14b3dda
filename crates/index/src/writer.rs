//! Idempotent, retrying writes of complete index entries.
//!
//! One [`IndexEntry`] carries everything the engine produced for a document:
//! its location, its sketch (absent for empty-bag documents), and its band
//! values. The writer serializes read-modify-write merges behind one lock
//! and retries conflicted writes with bounded backoff; deterministic keys
//! make a replayed write overwrite equivalent data.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use extract::Feature;
use sketch::{BandedSketch, Sketch};

use crate::{CorpusIndex, DocumentLocation, IndexError};

/// Everything to persist for one document.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub blob_id: String,
    pub location: DocumentLocation,
    /// The extracted feature bag, stored so the document can be re-sketched
    /// when the corpus (and therefore the vocabulary) grows.
    pub features: Vec<Feature>,
    /// `None` for documents whose bag was empty: meta is still written so
    /// exact-duplicate lookups work, but no sketch or band rows exist.
    pub sketch: Option<Sketch>,
    pub bands: Option<BandedSketch>,
}

/// Writer over a shared index handle.
pub struct IndexWriter {
    index: Arc<CorpusIndex>,
    max_retries: u32,
    backoff: Duration,
    write_lock: Mutex<()>,
}

impl IndexWriter {
    pub fn new(index: Arc<CorpusIndex>) -> Self {
        Self {
            index,
            max_retries: 3,
            backoff: Duration::from_millis(50),
            write_lock: Mutex::new(()),
        }
    }

    /// Tune conflict-retry behavior.
    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    /// Persist one entry: the meta row, the feature bag, then (when
    /// present) the sketch row and the band rows. Safe to call again for
    /// the same document.
    pub fn write(&self, entry: &IndexEntry) -> Result<(), IndexError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| IndexError::backend("poisoned writer lock"))?;

        self.retrying(|| self.index.add_location(&entry.blob_id, &entry.location).map(|_| ()))?;
        self.retrying(|| self.index.put_features(&entry.blob_id, &entry.features))?;

        if let Some(sketch) = &entry.sketch {
            // A sentinel sketch never reaches the hashes table.
            if !sketch.is_sentinel() {
                self.retrying(|| self.index.put_sketch(&entry.blob_id, sketch))?;
                if let Some(bands) = &entry.bands {
                    self.retrying(|| self.index.add_band_entries(&entry.blob_id, bands))?;
                }
            }
        }
        Ok(())
    }

    fn retrying<F>(&self, mut op: F) -> Result<(), IndexError>
    where
        F: FnMut() -> Result<(), IndexError>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(()) => return Ok(()),
                Err(IndexError::Conflict(reason)) => {
                    if attempt >= self.max_retries {
                        return Err(IndexError::Conflict(reason));
                    }
                    attempt += 1;
                    std::thread::sleep(self.backoff * attempt);
                }
                Err(other) => return Err(other),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BackendConfig, IndexConfig};
    use sketch::{band_sketch, sketch_bag, Bag, SketchConfig, SketchParams};

    fn writer() -> (Arc<CorpusIndex>, IndexWriter) {
        let index = Arc::new(
            CorpusIndex::new(IndexConfig::new().with_backend(BackendConfig::in_memory())).unwrap(),
        );
        (index.clone(), IndexWriter::new(index))
    }

    fn entry(blob: &str) -> IndexEntry {
        let cfg = SketchConfig::default();
        let sketch = sketch_bag(
            &Bag::from_entries(vec![(2, 1.0), (5, 2.0)]),
            &SketchParams::new(&cfg),
        );
        let bands = band_sketch(&sketch, &cfg).unwrap();
        IndexEntry {
            blob_id: blob.to_string(),
            location: DocumentLocation::file("repo", "commit", "path.rs"),
            features: vec![Feature {
                token: "token".to_string(),
                weight: 1,
            }],
            sketch: Some(sketch),
            bands: Some(bands),
        }
    }

    #[test]
    fn write_persists_every_table() {
        let (index, writer) = writer();
        let e = entry("blob");
        writer.write(&e).unwrap();

        assert_eq!(index.locations("blob").unwrap().len(), 1);
        assert!(index.has_sketch("blob").unwrap());
        assert_eq!(index.features("blob").unwrap().unwrap(), e.features);
        let banded = e.bands.unwrap();
        assert_eq!(index.bucket(0, &banded.values[0]).unwrap(), ["blob"]);
    }

    #[test]
    fn write_is_idempotent() {
        let (index, writer) = writer();
        let e = entry("blob");
        writer.write(&e).unwrap();
        writer.write(&e).unwrap();

        assert_eq!(index.locations("blob").unwrap().len(), 1);
        let banded = e.bands.unwrap();
        assert_eq!(index.bucket(0, &banded.values[0]).unwrap().len(), 1);
    }

    #[test]
    fn empty_bag_entry_writes_meta_only() {
        let (index, writer) = writer();
        let cfg = SketchConfig::default();
        let e = IndexEntry {
            blob_id: "empty".to_string(),
            location: DocumentLocation::file("repo", "commit", "empty.rs"),
            features: Vec::new(),
            sketch: Some(Sketch::sentinel(cfg.hash_rows())),
            bands: None,
        };
        writer.write(&e).unwrap();

        assert_eq!(index.locations("empty").unwrap().len(), 1);
        assert!(!index.has_sketch("empty").unwrap());
        // The empty bag is still recorded so a later rebuild can see it.
        assert_eq!(index.features("empty").unwrap().unwrap(), Vec::<Feature>::new());
    }
}
