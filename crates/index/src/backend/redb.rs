//! Redb backend for the sketch index.
//!
//! Redb is a pure Rust embedded key-value store with ACID transactions and
//! MVCC; commits are synchronous, so every write the engine acknowledges is
//! durable. The four logical tables map onto four redb tables in one
//! database file.

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};

use crate::backend::{IndexBackend, Table};
use crate::IndexError;

const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");
const HASHES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("hashes");
const HASHTABLES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("hashtables");
const FEATURES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("features");
const CONFIG_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("config");

fn definition(table: Table) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match table {
        Table::Meta => META_TABLE,
        Table::Hashes => HASHES_TABLE,
        Table::HashTables => HASHTABLES_TABLE,
        Table::Features => FEATURES_TABLE,
        Table::Config => CONFIG_TABLE,
    }
}

/// Persistent backend over a single redb database file.
///
/// `Arc<Database>` makes the handle cheap to share across the worker pool;
/// redb handles its own locking internally.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create the database at `path` and ensure all tables exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IndexError> {
        let db = Database::create(path).map_err(IndexError::backend)?;

        let write_txn = db.begin_write().map_err(IndexError::backend)?;
        {
            for table in Table::ALL {
                write_txn
                    .open_table(definition(table))
                    .map_err(IndexError::backend)?;
            }
        }
        write_txn.commit().map_err(IndexError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl IndexBackend for RedbBackend {
    fn put(&self, table: Table, key: &str, value: &[u8]) -> Result<(), IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        {
            let mut t = write_txn
                .open_table(definition(table))
                .map_err(IndexError::backend)?;
            t.insert(key, value).map_err(IndexError::backend)?;
        }
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(())
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let t = read_txn
            .open_table(definition(table))
            .map_err(IndexError::backend)?;
        match t.get(key).map_err(IndexError::backend)? {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn batch_put(&self, table: Table, entries: Vec<(String, Vec<u8>)>) -> Result<(), IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        {
            let mut t = write_txn
                .open_table(definition(table))
                .map_err(IndexError::backend)?;
            for (key, value) in entries {
                t.insert(key.as_str(), value.as_slice())
                    .map_err(IndexError::backend)?;
            }
        }
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(())
    }

    fn scan(
        &self,
        table: Table,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), IndexError>,
    ) -> Result<(), IndexError> {
        let read_txn = self.db.begin_read().map_err(IndexError::backend)?;
        let t = read_txn
            .open_table(definition(table))
            .map_err(IndexError::backend)?;
        for item in t.iter().map_err(IndexError::backend)? {
            let (key, value) = item.map_err(IndexError::backend)?;
            visitor(key.value(), value.value())?;
        }
        Ok(())
    }

    fn clear(&self, table: Table) -> Result<(), IndexError> {
        let write_txn = self.db.begin_write().map_err(IndexError::backend)?;
        write_txn
            .delete_table(definition(table))
            .map_err(IndexError::backend)?;
        {
            // Recreate so later opens find the table.
            write_txn
                .open_table(definition(table))
                .map_err(IndexError::backend)?;
        }
        write_txn.commit().map_err(IndexError::backend)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), IndexError> {
        // Redb commits synchronously; nothing is buffered.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn open_backend() -> (NamedTempFile, RedbBackend) {
        let file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(file.path()).unwrap();
        (file, backend)
    }

    #[test]
    fn roundtrip_put_get() {
        let (_file, backend) = open_backend();
        backend.put(Table::Meta, "key1", b"value1").unwrap();
        assert_eq!(
            backend.get(Table::Meta, "key1").unwrap(),
            Some(b"value1".to_vec())
        );
        assert_eq!(backend.get(Table::Meta, "missing").unwrap(), None);
    }

    #[test]
    fn tables_do_not_leak_into_each_other() {
        let (_file, backend) = open_backend();
        backend.put(Table::Hashes, "blob", b"sketch").unwrap();
        assert_eq!(backend.get(Table::Meta, "blob").unwrap(), None);
        assert_eq!(backend.get(Table::HashTables, "blob").unwrap(), None);
    }

    #[test]
    fn batch_put_and_scan() {
        let (_file, backend) = open_backend();
        backend
            .batch_put(
                Table::HashTables,
                vec![
                    ("0001:aa".to_string(), b"x".to_vec()),
                    ("0000:bb".to_string(), b"y".to_vec()),
                ],
            )
            .unwrap();

        let mut seen = Vec::new();
        backend
            .scan(Table::HashTables, &mut |key, value| {
                seen.push((key.to_string(), value.to_vec()));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.len(), 2);
        // Key order.
        assert_eq!(seen[0].0, "0000:bb");
        assert_eq!(seen[1].0, "0001:aa");
    }

    #[test]
    fn clear_drops_rows_and_keeps_table_usable() {
        let (_file, backend) = open_backend();
        backend.put(Table::Hashes, "blob", b"sketch").unwrap();
        backend.put(Table::Meta, "blob", b"meta").unwrap();

        backend.clear(Table::Hashes).unwrap();

        assert_eq!(backend.get(Table::Hashes, "blob").unwrap(), None);
        assert_eq!(backend.get(Table::Meta, "blob").unwrap(), Some(b"meta".to_vec()));

        backend.put(Table::Hashes, "blob", b"resketched").unwrap();
        assert_eq!(
            backend.get(Table::Hashes, "blob").unwrap(),
            Some(b"resketched".to_vec())
        );
    }

    #[test]
    fn reopen_preserves_data() {
        let file = NamedTempFile::new().unwrap();
        {
            let backend = RedbBackend::open(file.path()).unwrap();
            backend.put(Table::Config, "docfreq", b"{}").unwrap();
        }
        let backend = RedbBackend::open(file.path()).unwrap();
        assert_eq!(
            backend.get(Table::Config, "docfreq").unwrap(),
            Some(b"{}".to_vec())
        );
    }
}
