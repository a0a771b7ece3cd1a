//! This module contains the [KeyValueStore] trait and concrete implementations of it.

use crate::errors::DbResult;

mod mem;
pub use mem::MemoryKeyValueStore;

mod disk;
pub use disk::DiskKeyValueStore;

/// Describes the interface of a simple, synchronous key-value store.
pub trait KeyValueStore: Send + Sync {
    /// Get the value associated with the given key.
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>>;

    /// Applies every operation of `batch`, or none of them.
    fn write(&mut self, batch: WriteBatch) -> DbResult<()>;
}

/// One operation of a [WriteBatch].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Set a key.
    Put(Vec<u8>, Vec<u8>),
    /// Remove a key.
    Delete(Vec<u8>),
}

/// An ordered set of writes applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Creates an empty batch.
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Queues setting `key` to `value`.
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push(WriteOp::Put(key, value));
    }

    /// Queues removing `key`.
    pub fn delete(&mut self, key: Vec<u8>) {
        self.ops.push(WriteOp::Delete(key));
    }

    /// Returns the number of queued operations.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Consumes the batch, returning its operations in order.
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
