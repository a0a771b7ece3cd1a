//! Contains a concrete implementation of the [KeyValueStore] trait that stores data on disk
//! using [rocksdb].

use super::{KeyValueStore, WriteBatch, WriteOp};
use crate::errors::DbResult;
use rocksdb::{Options, DB};
use std::path::{Path, PathBuf};

/// A simple, synchronous key-value store that stores data on disk.
#[derive(Debug)]
pub struct DiskKeyValueStore {
    data_directory: PathBuf,
    db: DB,
}

impl DiskKeyValueStore {
    /// Opens the store in `data_directory`, creating it if missing.
    pub fn open(data_directory: impl AsRef<Path>) -> DbResult<Self> {
        let data_directory = data_directory.as_ref().to_path_buf();
        let db = DB::open(&Self::get_db_options(), data_directory.as_path())?;
        debug!(target: "mel-db", "Opened database at {}", data_directory.display());
        Ok(Self { data_directory, db })
    }

    /// Returns the directory the store lives in.
    pub fn data_directory(&self) -> &Path {
        &self.data_directory
    }

    /// Gets the [Options] for the underlying RocksDB instance.
    fn get_db_options() -> Options {
        let mut options = Options::default();
        options.set_compression_type(rocksdb::DBCompressionType::Snappy);
        options.create_if_missing(true);
        options
    }
}

impl KeyValueStore for DiskKeyValueStore {
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn write(&mut self, batch: WriteBatch) -> DbResult<()> {
        let mut rocks_batch = rocksdb::WriteBatch::default();
        for op in batch.into_ops() {
            match op {
                WriteOp::Put(key, value) => rocks_batch.put(key, value),
                WriteOp::Delete(key) => rocks_batch.delete(key),
            }
        }
        Ok(self.db.write(rocks_batch)?)
    }
}
