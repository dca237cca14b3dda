//! Storage backend abstraction for the sketch index.
//!
//! The index needs four logical tables and a handful of primitive
//! operations: keyed upsert, point lookup, batch write, and an ordered full
//! scan. Anything that can do that can back the index; the engine holds no
//! other assumption about the store beyond last-write-wins on primary key.

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::IndexError;

/// The logical tables of one index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    /// blob-id → document locations.
    Meta,
    /// blob-id → sketch rows.
    Hashes,
    /// (band index, band value) → blob-ids.
    HashTables,
    /// blob-id → extracted feature bag, kept so the corpus can be
    /// re-sketched when the vocabulary grows.
    Features,
    /// Index-wide artifacts: the DocFreq row and the sketch parameters.
    Config,
}

impl Table {
    pub const ALL: [Table; 5] = [
        Table::Meta,
        Table::Hashes,
        Table::HashTables,
        Table::Features,
        Table::Config,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::Meta => "meta",
            Table::Hashes => "hashes",
            Table::HashTables => "hashtables",
            Table::Features => "features",
            Table::Config => "config",
        }
    }
}

/// Trait for a key-value storage backend with named tables.
pub trait IndexBackend: Send + Sync {
    /// Insert or update a key-value pair.
    fn put(&self, table: Table, key: &str, value: &[u8]) -> Result<(), IndexError>;
    /// Retrieve a value by key.
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, IndexError>;
    /// Insert or update multiple pairs in a batch.
    fn batch_put(&self, table: Table, entries: Vec<(String, Vec<u8>)>) -> Result<(), IndexError>;
    /// Scan all rows of a table in key order.
    fn scan(
        &self,
        table: Table,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError>;
    /// Remove every row of a table.
    fn clear(&self, table: Table) -> Result<(), IndexError>;
    /// Flush any buffered writes.
    fn flush(&self) -> Result<(), IndexError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// Redb, a pure Rust embedded ACID store. The recommended persistent
    /// backend; requires the `backend-redb` feature (on by default).
    Redb { path: String },
    /// An in-memory map, for tests and ephemeral runs.
    #[default]
    InMemory,
}

impl BackendConfig {
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend this configuration describes.
    pub fn build(&self) -> Result<Box<dyn IndexBackend>, IndexError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "backend-redb")]
                {
                    Ok(Box::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "backend-redb"))]
                {
                    let _ = path;
                    Err(IndexError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

/// An in-memory backend over `RwLock`-guarded ordered maps, one per table.
pub struct InMemoryBackend {
    tables: [RwLock<BTreeMap<String, Vec<u8>>>; 5],
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: [
                RwLock::new(BTreeMap::new()),
                RwLock::new(BTreeMap::new()),
                RwLock::new(BTreeMap::new()),
                RwLock::new(BTreeMap::new()),
                RwLock::new(BTreeMap::new()),
            ],
        }
    }

    fn slot(&self, table: Table) -> &RwLock<BTreeMap<String, Vec<u8>>> {
        let idx = Table::ALL.iter().position(|t| *t == table).unwrap_or(0);
        &self.tables[idx]
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexBackend for InMemoryBackend {
    fn put(&self, table: Table, key: &str, value: &[u8]) -> Result<(), IndexError> {
        self.slot(table)
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        let guard = self
            .slot(table)
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        Ok(guard.get(key).cloned())
    }

    fn batch_put(&self, table: Table, entries: Vec<(String, Vec<u8>)>) -> Result<(), IndexError> {
        let mut guard = self
            .slot(table)
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        for (key, value) in entries {
            guard.insert(key, value);
        }
        Ok(())
    }

    fn scan(
        &self,
        table: Table,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        let guard = self
            .slot(table)
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;
        for (key, value) in guard.iter() {
            visitor(key, value)?;
        }
        Ok(())
    }

    fn clear(&self, table: Table) -> Result<(), IndexError> {
        self.slot(table)
            .write()
            .map_err(|_| IndexError::backend("poisoned lock"))?
            .clear();
        Ok(())
    }
}

#[cfg(feature = "backend-redb")]
pub mod redb;

#[cfg(feature = "backend-redb")]
pub use self::redb::RedbBackend;
