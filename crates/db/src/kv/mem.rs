//! Contains a concrete implementation of the [KeyValueStore] trait that stores data in memory.

use super::{KeyValueStore, WriteBatch, WriteOp};
use crate::errors::DbResult;
use std::collections::HashMap;

/// A simple, synchronous key-value store that stores data in memory. This is useful for testing and
/// development purposes.
#[derive(Default, Clone, Debug, Eq, PartialEq)]
pub struct MemoryKeyValueStore {
    store: HashMap<Vec<u8>, Vec<u8>>,
}

impl MemoryKeyValueStore {
    /// Create a new [MemoryKeyValueStore] with an empty store.
    pub fn new() -> Self {
        Self { store: HashMap::new() }
    }

    /// Returns the number of stored keys.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        Ok(self.store.get(key).cloned())
    }

    fn write(&mut self, batch: WriteBatch) -> DbResult<()> {
        for op in batch.into_ops() {
            match op {
                WriteOp::Put(key, value) => {
                    self.store.insert(key, value);
                }
                WriteOp::Delete(key) => {
                    self.store.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_applies_in_order() {
        let mut kv = MemoryKeyValueStore::new();
        let mut batch = WriteBatch::new();
        batch.put(b"a".to_vec(), b"1".to_vec());
        batch.put(b"b".to_vec(), b"2".to_vec());
        batch.delete(b"a".to_vec());
        batch.put(b"b".to_vec(), b"3".to_vec());
        kv.write(batch).unwrap();

        assert_eq!(kv.get(b"a").unwrap(), None);
        assert_eq!(kv.get(b"b").unwrap(), Some(b"3".to_vec()));
        assert_eq!(kv.len(), 1);
    }
}
