//! # srcdup index
//!
//! Persistent storage for the similarity engine: per-document metadata,
//! Weighted MinHash sketches, and LSH band rows, plus the index-wide
//! artifacts (the authoritative DocFreq and the sketch-parameter identity).
//!
//! ## Core features
//!
//! - **Pluggable backends** behind the [`IndexBackend`] trait: an in-memory
//!   map for tests and an embedded redb database for persistence (the
//!   `backend-redb` feature, on by default).
//! - **Three logical tables** mirroring the engine's data model:
//!   - `meta`: blob-id → every (repo, commit, path) the content was seen at;
//!   - `hashes`: blob-id → sketch rows;
//!   - `hashtables`: (band index, band value) → blob-ids.
//!   A `features` table keeps each blob's extracted feature bag so the
//!   corpus can be re-sketched when the vocabulary grows, and a `config`
//!   table holds the DocFreq row and the sketch-parameter artifact, so an
//!   index is self-describing.
//! - **Deterministic keys**: every row is keyed by content, so re-indexing
//!   a document overwrites equivalent data and retries are idempotent.
//! - **Compact encoding**: records are bincode-serialized and zstd
//!   compressed, with a schema version checked on decode.
//!
//! ## Example
//!
//! ```
//! use index::{BackendConfig, CorpusIndex, DocumentLocation, IndexConfig};
//! use sketch::{SketchConfig, SketchParams, sketch_bag, Bag};
//!
//! let index = CorpusIndex::new(IndexConfig::new().with_backend(BackendConfig::in_memory())).unwrap();
//!
//! let sketch = sketch_bag(&Bag::from_entries(vec![(0, 1.0)]), &SketchParams::new(&SketchConfig::default()));
//! index.add_location("blob-1", &DocumentLocation::file("repo", "COMMIT", "src/a.rs")).unwrap();
//! index.put_sketch("blob-1", &sketch).unwrap();
//! assert!(index.sketch("blob-1").unwrap().is_some());
//! ```

mod backend;
mod writer;

#[cfg(feature = "backend-redb")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, InMemoryBackend, IndexBackend, Table};
pub use writer::{IndexEntry, IndexWriter};

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use chrono::{DateTime, Utc};
use docfreq::OrderedDocFreq;
use extract::Feature;
use serde::{Deserialize, Serialize};
use sketch::{BandedSketch, Sketch, SketchArtifact};
use thiserror::Error;
use zstd::{decode_all, encode_all};

/// Bump whenever the on-disk record layout changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

/// Config-table key of the authoritative DocFreq row.
const DOCFREQ_KEY: &str = "docfreq";
/// Config-table key of the sketch-parameter artifact.
const PARAMS_KEY: &str = "sketch_params";

/// One place a blob's content was observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentLocation {
    pub repo: String,
    pub commit: String,
    pub path: String,
    /// Present for function-granularity documents.
    pub function: Option<FunctionLocation>,
    /// When this location was written; not part of the location's identity.
    pub indexed_at: Option<DateTime<Utc>>,
}

/// Function coordinates within a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionLocation {
    pub name: String,
    pub line: u32,
}

impl DocumentLocation {
    pub fn file(repo: impl Into<String>, commit: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            commit: commit.into(),
            path: path.into(),
            function: None,
            indexed_at: None,
        }
    }

    pub fn function(
        repo: impl Into<String>,
        commit: impl Into<String>,
        path: impl Into<String>,
        name: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            repo: repo.into(),
            commit: commit.into(),
            path: path.into(),
            function: Some(FunctionLocation {
                name: name.into(),
                line,
            }),
            indexed_at: None,
        }
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.indexed_at = Some(at);
        self
    }

    /// Identity comparison: the (repo, commit, path, function) site,
    /// ignoring the write timestamp.
    pub fn same_site(&self, other: &DocumentLocation) -> bool {
        self.repo == other.repo
            && self.commit == other.commit
            && self.path == other.path
            && self.function == other.function
    }

    /// Render the document key for this location at the given blob.
    pub fn document_key(&self, blob_id: &str) -> identity::DocumentKey {
        match &self.function {
            None => identity::DocumentKey::file(&*self.repo, &*self.path, blob_id),
            Some(f) => {
                identity::DocumentKey::function(&*self.repo, &*self.path, blob_id, &*f.name, f.line)
            }
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MetaRecord {
    schema_version: u16,
    locations: Vec<DocumentLocation>,
}

#[derive(Serialize, Deserialize)]
struct SketchRecord {
    schema_version: u16,
    rows: Vec<(u64, i64)>,
}

#[derive(Serialize, Deserialize)]
struct BucketRecord {
    schema_version: u16,
    blobs: Vec<String>,
}

#[derive(Serialize, Deserialize)]
struct FeatureRecord {
    schema_version: u16,
    features: Vec<Feature>,
}

/// Compression codec options for stored records.
#[derive(Clone, Debug, Default)]
pub enum CompressionCodec {
    None,
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Zstd level; ignored for `None`.
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }
}

/// Config for initializing the index.
#[derive(Clone, Debug, Default)]
pub struct IndexConfig {
    pub backend: BackendConfig,
    pub compression: CompressionConfig,
}

impl IndexConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }
}

/// Errors produced by the index layer.
#[derive(Error, Debug, Clone)]
pub enum IndexError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization encode error: {0}")]
    Encode(String),
    #[error("serialization decode error: {0}")]
    Decode(String),
    #[error("compression error: {0}")]
    Compression(String),
    /// A concurrent writer won; callers retry, which is safe because every
    /// key is deterministic in the content.
    #[error("write conflict: {0}")]
    Conflict(String),
    #[error("unsupported record schema version {found}")]
    SchemaVersion { found: u16 },
}

impl From<EncodeError> for IndexError {
    fn from(e: EncodeError) -> Self {
        IndexError::Encode(e.to_string())
    }
}

impl From<DecodeError> for IndexError {
    fn from(e: DecodeError) -> Self {
        IndexError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Compression(e.to_string())
    }
}

impl IndexError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

/// The persistent sketch index.
pub struct CorpusIndex {
    backend: Box<dyn IndexBackend>,
    cfg: IndexConfig,
}

impl CorpusIndex {
    /// Initialize or open an index using the configured backend.
    pub fn new(cfg: IndexConfig) -> Result<Self, IndexError> {
        let backend = cfg.backend.build()?;
        Ok(Self::with_backend(cfg, backend))
    }

    /// Build an index over a custom backend (e.g. in-memory for tests).
    pub fn with_backend(cfg: IndexConfig, backend: Box<dyn IndexBackend>) -> Self {
        Self { backend, cfg }
    }

    // ---- meta ----

    /// Record that `blob_id`'s content was observed at `location`. Returns
    /// whether the site was new for this blob.
    pub fn add_location(&self, blob_id: &str, location: &DocumentLocation) -> Result<bool, IndexError> {
        let mut locations = self.locations(blob_id)?;
        if locations.iter().any(|known| known.same_site(location)) {
            return Ok(false);
        }
        locations.push(location.clone());
        let record = MetaRecord {
            schema_version: INDEX_SCHEMA_VERSION,
            locations,
        };
        self.backend
            .put(Table::Meta, blob_id, &self.encode(&record)?)?;
        Ok(true)
    }

    /// All sites a blob's content was observed at; empty if unknown.
    pub fn locations(&self, blob_id: &str) -> Result<Vec<DocumentLocation>, IndexError> {
        match self.backend.get(Table::Meta, blob_id)? {
            None => Ok(Vec::new()),
            Some(data) => {
                let record: MetaRecord = self.decode(&data)?;
                check_version(record.schema_version)?;
                Ok(record.locations)
            }
        }
    }

    /// Visit every meta row as (blob-id, locations).
    pub fn scan_locations(
        &self,
        visitor: &mut dyn FnMut(&str, &[DocumentLocation]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        self.backend.scan(Table::Meta, &mut |key, data| {
            let record: MetaRecord = self.decode(data)?;
            check_version(record.schema_version)?;
            visitor(key, &record.locations)
        })
    }

    // ---- hashes ----

    pub fn put_sketch(&self, blob_id: &str, sketch: &Sketch) -> Result<(), IndexError> {
        let record = SketchRecord {
            schema_version: INDEX_SCHEMA_VERSION,
            rows: sketch.rows.clone(),
        };
        self.backend
            .put(Table::Hashes, blob_id, &self.encode(&record)?)
    }

    pub fn sketch(&self, blob_id: &str) -> Result<Option<Sketch>, IndexError> {
        match self.backend.get(Table::Hashes, blob_id)? {
            None => Ok(None),
            Some(data) => {
                let record: SketchRecord = self.decode(&data)?;
                check_version(record.schema_version)?;
                Ok(Some(Sketch { rows: record.rows }))
            }
        }
    }

    pub fn has_sketch(&self, blob_id: &str) -> Result<bool, IndexError> {
        Ok(self.backend.get(Table::Hashes, blob_id)?.is_some())
    }

    /// Visit every sketched blob id.
    pub fn scan_sketched_blobs(
        &self,
        visitor: &mut dyn FnMut(&str) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        self.backend
            .scan(Table::Hashes, &mut |key, _| visitor(key))
    }

    /// Drop every sketch and band row. Called when the vocabulary changes:
    /// stored sketches are keyed to token positions in the old ordering and
    /// must all be recomputed.
    pub fn clear_sketches(&self) -> Result<(), IndexError> {
        self.backend.clear(Table::Hashes)?;
        self.backend.clear(Table::HashTables)
    }

    // ---- features ----

    /// Store a blob's extracted feature bag (possibly empty).
    pub fn put_features(&self, blob_id: &str, features: &[Feature]) -> Result<(), IndexError> {
        let record = FeatureRecord {
            schema_version: INDEX_SCHEMA_VERSION,
            features: features.to_vec(),
        };
        self.backend
            .put(Table::Features, blob_id, &self.encode(&record)?)
    }

    /// The feature bag a blob was indexed with, if one was stored.
    pub fn features(&self, blob_id: &str) -> Result<Option<Vec<Feature>>, IndexError> {
        match self.backend.get(Table::Features, blob_id)? {
            None => Ok(None),
            Some(data) => {
                let record: FeatureRecord = self.decode(&data)?;
                check_version(record.schema_version)?;
                Ok(Some(record.features))
            }
        }
    }

    // ---- hashtables ----

    /// Add `blob_id` to every band bucket of `banded`.
    pub fn add_band_entries(&self, blob_id: &str, banded: &BandedSketch) -> Result<(), IndexError> {
        for (band, value) in banded.iter() {
            let key = bucket_key(band, value);
            let mut blobs = self.bucket_by_key(&key)?;
            if blobs.iter().any(|known| known == blob_id) {
                continue;
            }
            blobs.push(blob_id.to_string());
            blobs.sort();
            let record = BucketRecord {
                schema_version: INDEX_SCHEMA_VERSION,
                blobs,
            };
            self.backend
                .put(Table::HashTables, &key, &self.encode(&record)?)?;
        }
        Ok(())
    }

    /// All blob ids banded-equal at (band, value); empty if the bucket is
    /// unknown.
    pub fn bucket(&self, band: usize, value: &str) -> Result<Vec<String>, IndexError> {
        self.bucket_by_key(&bucket_key(band, value))
    }

    fn bucket_by_key(&self, key: &str) -> Result<Vec<String>, IndexError> {
        match self.backend.get(Table::HashTables, key)? {
            None => Ok(Vec::new()),
            Some(data) => {
                let record: BucketRecord = self.decode(&data)?;
                check_version(record.schema_version)?;
                Ok(record.blobs)
            }
        }
    }

    /// Visit every band bucket as (band index, band value, members).
    pub fn scan_buckets(
        &self,
        visitor: &mut dyn FnMut(usize, &str, &[String]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        self.backend.scan(Table::HashTables, &mut |key, data| {
            let (band, value) = parse_bucket_key(key)?;
            let record: BucketRecord = self.decode(data)?;
            check_version(record.schema_version)?;
            visitor(band, value, &record.blobs)
        })
    }

    // ---- config ----

    /// Store the authoritative DocFreq row (JSON, uncompressed: the row is
    /// read by external tooling as well).
    pub fn put_doc_freq(&self, df: &OrderedDocFreq) -> Result<(), IndexError> {
        let json = df
            .to_json()
            .map_err(|e| IndexError::Encode(e.to_string()))?;
        self.backend
            .put(Table::Config, DOCFREQ_KEY, json.as_bytes())
    }

    pub fn doc_freq(&self) -> Result<Option<OrderedDocFreq>, IndexError> {
        match self.backend.get(Table::Config, DOCFREQ_KEY)? {
            None => Ok(None),
            Some(data) => {
                let json = std::str::from_utf8(&data)
                    .map_err(|e| IndexError::Decode(e.to_string()))?;
                let df = OrderedDocFreq::from_json(json)
                    .map_err(|e| IndexError::Decode(e.to_string()))?;
                Ok(Some(df))
            }
        }
    }

    pub fn put_artifact(&self, artifact: &SketchArtifact) -> Result<(), IndexError> {
        self.backend
            .put(Table::Config, PARAMS_KEY, &self.encode(artifact)?)
    }

    pub fn artifact(&self) -> Result<Option<SketchArtifact>, IndexError> {
        match self.backend.get(Table::Config, PARAMS_KEY)? {
            None => Ok(None),
            Some(data) => Ok(Some(self.decode(&data)?)),
        }
    }

    pub fn flush(&self) -> Result<(), IndexError> {
        self.backend.flush()
    }

    fn encode<T: Serialize>(&self, record: &T) -> Result<Vec<u8>, IndexError> {
        let encoded = encode_to_vec(record, standard())?;
        self.cfg.compression.compress(&encoded)
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, data: &[u8]) -> Result<T, IndexError> {
        let decompressed = self.cfg.compression.decompress(data)?;
        let (record, _) = decode_from_slice(&decompressed, standard())?;
        Ok(record)
    }
}

fn check_version(found: u16) -> Result<(), IndexError> {
    if found != INDEX_SCHEMA_VERSION {
        return Err(IndexError::SchemaVersion { found });
    }
    Ok(())
}

/// Bucket keys sort by band index first; the width-4 zero padding keeps the
/// textual order equal to the numeric one.
fn bucket_key(band: usize, value: &str) -> String {
    format!("{band:04}:{value}")
}

fn parse_bucket_key(key: &str) -> Result<(usize, &str), IndexError> {
    let (band, value) = key
        .split_once(':')
        .ok_or_else(|| IndexError::Decode(format!("malformed bucket key {key:?}")))?;
    let band = band
        .parse()
        .map_err(|_| IndexError::Decode(format!("malformed bucket key {key:?}")))?;
    Ok((band, value))
}
