//! The [Database] persisting [MelState]s, delayed messages and batch metadata.

use crate::{
    errors::{DbError, DbResult},
    keys::{batch_metadata_key, delayed_message_key, state_key, HEAD_MEL_STATE_BLOCK_NUM_KEY},
    kv::{KeyValueStore, WriteBatch},
};
use alloy_primitives::{hex, B256};
use alloy_rlp::{Decodable, Encodable};
use async_trait::async_trait;
use lru::LruCache;
use mel_extraction::{
    extract::ExtractedBlock,
    state::MelState,
    traits::{DelayedMessageDatabase, StateDatabase, StateFetcher},
};
use mel_primitives::{BatchMetadata, DelayedInboxMessage};
use spin::Mutex;
use std::num::NonZeroUsize;

/// The number of decoded states kept in memory.
pub const STATE_CACHE_SIZE: usize = 64;

/// Stores MEL data in a [KeyValueStore].
///
/// Every save is a single [WriteBatch], so a crash never leaves a state without the delayed
/// messages and batch metadata it counts.
#[derive(Debug)]
pub struct Database<KV> {
    store: KV,
    states: Mutex<LruCache<u64, MelState>>,
}

impl<KV: KeyValueStore> Database<KV> {
    /// Wraps `store`.
    pub fn new(store: KV) -> Self {
        let capacity = NonZeroUsize::new(STATE_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self { store, states: Mutex::new(LruCache::new(capacity)) }
    }

    /// Returns the underlying store.
    pub const fn store(&self) -> &KV {
        &self.store
    }

    /// Returns the underlying store mutably. Writes made through it bypass the state cache.
    pub fn store_mut(&mut self) -> &mut KV {
        self.states.lock().clear();
        &mut self.store
    }

    fn get_decoded<T: Decodable>(&self, key: &[u8]) -> DbResult<Option<T>> {
        let Some(raw) = self.store.get(key)? else {
            return Ok(None);
        };
        T::decode(&mut raw.as_slice())
            .map(Some)
            .map_err(|source| DbError::Decode { key: hex::encode(key), source })
    }

    /// Returns the parent chain block number of the head state.
    pub fn head_block_number(&self) -> DbResult<Option<u64>> {
        self.get_decoded(HEAD_MEL_STATE_BLOCK_NUM_KEY)
    }

    /// Returns the state built from block `block_number`.
    pub fn get_state(&self, block_number: u64) -> DbResult<Option<MelState>> {
        if let Some(state) = self.states.lock().get(&block_number) {
            return Ok(Some(state.clone()));
        }
        let state: Option<MelState> = self.get_decoded(&state_key(block_number))?;
        if let Some(state) = &state {
            self.states.lock().put(block_number, state.clone());
        }
        Ok(state)
    }

    /// Returns the head state.
    pub fn get_head_state(&self) -> DbResult<Option<MelState>> {
        match self.head_block_number()? {
            Some(number) => self.get_state(number),
            None => Ok(None),
        }
    }

    /// Returns the stored delayed message at `index` without verifying it.
    pub fn get_delayed_message(&self, index: u64) -> DbResult<Option<DelayedInboxMessage>> {
        self.get_decoded(&delayed_message_key(index))
    }

    /// Returns the metadata of batch `seq`.
    pub fn get_batch_metadata(&self, seq: u64) -> DbResult<Option<BatchMetadata>> {
        self.get_decoded(&batch_metadata_key(seq))
    }

    fn put_state(batch: &mut WriteBatch, state: &MelState) {
        let number = state.parent_chain_block_number;
        batch.put(state_key(number), alloy_rlp::encode(state));
        let mut head = Vec::with_capacity(number.length());
        number.encode(&mut head);
        batch.put(HEAD_MEL_STATE_BLOCK_NUM_KEY.to_vec(), head);
    }

    fn put_delayed_messages(
        batch: &mut WriteBatch,
        state: &MelState,
        messages: &[DelayedInboxMessage],
    ) -> DbResult<()> {
        let first = first_index("delayed messages", messages.len(), state.delayed_messages_seen)?;
        for (index, message) in (first..).zip(messages) {
            batch.put(delayed_message_key(index), alloy_rlp::encode(message));
        }
        Ok(())
    }

    fn put_batch_metas(
        batch: &mut WriteBatch,
        state: &MelState,
        metas: &[BatchMetadata],
    ) -> DbResult<()> {
        let first = first_index("batch metadata", metas.len(), state.batch_count)?;
        for (seq, meta) in (first..).zip(metas) {
            batch.put(batch_metadata_key(seq), alloy_rlp::encode(meta));
        }
        Ok(())
    }

    /// Writes `batch` and evicts the written states. Cached states are always decoded ones, so
    /// they never carry a live state's working data.
    fn write_states(&mut self, batch: WriteBatch, states: &[u64]) -> DbResult<()> {
        self.store.write(batch)?;
        let mut cache = self.states.lock();
        for number in states {
            cache.pop(number);
        }
        Ok(())
    }

    /// Persists `state` and moves the head to it.
    pub fn put_head_state(&mut self, state: &MelState) -> DbResult<()> {
        let mut batch = WriteBatch::new();
        Self::put_state(&mut batch, state);
        self.write_states(batch, &[state.parent_chain_block_number])
    }

    /// Persists everything one extracted block produced and moves the head to its state.
    pub fn save_extracted_block(&mut self, block: &ExtractedBlock) -> DbResult<()> {
        let mut batch = WriteBatch::new();
        Self::put_delayed_messages(&mut batch, &block.state, &block.delayed_messages)?;
        Self::put_batch_metas(&mut batch, &block.state, &block.batch_metas)?;
        Self::put_state(&mut batch, &block.state);
        self.write_states(batch, &[block.state.parent_chain_block_number])?;
        debug!(
            target: "mel-db",
            "Saved state of block {} with {} delayed messages and {} batches",
            block.state.parent_chain_block_number,
            block.delayed_messages.len(),
            block.batch_metas.len()
        );
        Ok(())
    }

    /// Moves the head back to `previous`.
    ///
    /// States after `previous` are deleted, together with the delayed messages and batch
    /// metadata only they counted.
    pub fn revert_head_to(&mut self, previous: &MelState) -> DbResult<()> {
        let head = self.get_head_state()?.ok_or(DbError::MissingHead)?;
        let mut batch = WriteBatch::new();
        (previous.parent_chain_block_number + 1..=head.parent_chain_block_number)
            .for_each(|number| batch.delete(state_key(number)));
        (previous.delayed_messages_seen..head.delayed_messages_seen)
            .for_each(|index| batch.delete(delayed_message_key(index)));
        (previous.batch_count..head.batch_count)
            .for_each(|seq| batch.delete(batch_metadata_key(seq)));
        Self::put_state(&mut batch, previous);
        let evicted: Vec<u64> =
            (previous.parent_chain_block_number..=head.parent_chain_block_number).collect();
        self.write_states(batch, &evicted)?;

        info!(
            target: "mel-db",
            "Reverted head from block {} to block {}",
            head.parent_chain_block_number,
            previous.parent_chain_block_number
        );
        Ok(())
    }

    /// Returns the head state, provided it was built from block `parent_chain_block_hash`.
    pub fn initial_state(&self, parent_chain_block_hash: B256) -> DbResult<MelState> {
        let state = self.get_head_state()?.ok_or(DbError::MissingHead)?;
        if state.parent_chain_block_hash != parent_chain_block_hash {
            return Err(DbError::HeadHashMismatch {
                expected: parent_chain_block_hash,
                got: state.parent_chain_block_hash,
            });
        }
        Ok(state)
    }
}

fn first_index(item: &'static str, count: usize, total: u64) -> DbResult<u64> {
    total.checked_sub(count as u64).ok_or(DbError::CountUnderflow { item, count, total })
}

#[async_trait]
impl<KV: KeyValueStore> StateDatabase for Database<KV> {
    type Error = DbError;

    async fn state(&self, block_number: u64) -> Result<Option<MelState>, Self::Error> {
        self.get_state(block_number)
    }

    async fn head_state(&self) -> Result<Option<MelState>, Self::Error> {
        self.get_head_state()
    }

    async fn delayed_message(
        &self,
        index: u64,
    ) -> Result<Option<DelayedInboxMessage>, Self::Error> {
        self.get_delayed_message(index)
    }

    async fn save_state(&mut self, state: &MelState) -> Result<(), Self::Error> {
        self.put_head_state(state)
    }

    async fn save_delayed_messages(
        &mut self,
        state: &MelState,
        messages: &[DelayedInboxMessage],
    ) -> Result<(), Self::Error> {
        let mut batch = WriteBatch::new();
        Self::put_delayed_messages(&mut batch, state, messages)?;
        self.store.write(batch)
    }

    async fn save_batch_metas(
        &mut self,
        state: &MelState,
        metas: &[BatchMetadata],
    ) -> Result<(), Self::Error> {
        let mut batch = WriteBatch::new();
        Self::put_batch_metas(&mut batch, state, metas)?;
        self.store.write(batch)
    }
}

#[async_trait]
impl<KV: KeyValueStore> DelayedMessageDatabase for Database<KV> {
    type Error = DbError;

    async fn read_delayed_message(
        &self,
        state: &mut MelState,
        index: u64,
    ) -> Result<Option<DelayedInboxMessage>, Self::Error> {
        if index == 0 {
            if let Some(init) = state.seen_unread_delayed_meta_deque().init_message() {
                return Ok(Some(init.clone()));
            }
        }
        let Some(message) = self.get_delayed_message(index)? else {
            return Ok(None);
        };
        state.check_against_accumulator(self, index, &message).await?;
        Ok(Some(message))
    }
}

#[async_trait]
impl<KV: KeyValueStore> StateFetcher for Database<KV> {
    type Error = DbError;

    async fn fetch_initial_state(
        &self,
        parent_chain_block_hash: B256,
    ) -> Result<MelState, Self::Error> {
        self.initial_state(parent_chain_block_hash)
    }
}
