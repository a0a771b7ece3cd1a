//! Errors of the MEL database.

use alloy_primitives::B256;
use mel_extraction::errors::{MelError, MelErrorKind};
use thiserror::Error;

/// A result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// An error raised by the database.
#[derive(Error, Debug)]
pub enum DbError {
    /// The key-value store failed.
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    /// A stored value could not be decoded.
    #[error("Failed to decode {key}: {source}")]
    Decode {
        /// The key of the value.
        key: String,
        /// The decoder's error.
        #[source]
        source: alloy_rlp::Error,
    },
    /// No head state has been saved.
    #[error("no head mel state in database")]
    MissingHead,
    /// The head state was built from a different block than requested.
    #[error("head mel state's parent chain block hash {got} does not match {expected}")]
    HeadHashMismatch {
        /// The requested block hash.
        expected: B256,
        /// The head state's block hash.
        got: B256,
    },
    /// A state claims fewer items than are being saved against it.
    #[error("cannot save {count} {item} below count {total}")]
    CountUnderflow {
        /// What is being saved.
        item: &'static str,
        /// The number of items.
        count: usize,
        /// The count the state carries.
        total: u64,
    },
    /// Verifying a stored value failed.
    #[error(transparent)]
    Extraction(#[from] MelErrorKind),
}

impl From<DbError> for MelErrorKind {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Extraction(kind) => kind,
            other => MelError::Database(other.to_string()).temp(),
        }
    }
}
