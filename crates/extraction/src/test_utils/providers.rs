//! In-memory implementations of the extraction collaborators.

use crate::{
    errors::{MelError, MelErrorKind},
    state::MelState,
    traits::{
        BlobReader, DapReader, DelayedMessageDatabase, KeysetValidationMode, ReceiptFetcher,
        StateDatabase,
    },
};
use alloy_consensus::Receipt;
use alloy_eips::eip4844::Blob;
use alloy_primitives::{Bytes, B256};
use alloy_rlp::Decodable;
use async_trait::async_trait;
use mel_primitives::{BatchMetadata, DelayedInboxMessage};
use std::collections::HashMap;
use thiserror::Error;

/// An error of the test providers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TestProviderError(pub String);

impl From<TestProviderError> for MelErrorKind {
    fn from(err: TestProviderError) -> Self {
        MelError::Provider(err.0).temp()
    }
}

/// An error of the test databases.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TestDatabaseError(pub String);

impl From<TestDatabaseError> for MelErrorKind {
    fn from(err: TestDatabaseError) -> Self {
        MelError::Database(err.0).temp()
    }
}

/// Serves the receipts of one block by transaction index.
#[derive(Debug, Clone, Default)]
pub struct TestReceiptFetcher {
    /// Receipts, indexed by transaction index.
    pub receipts: Vec<Receipt>,
}

impl TestReceiptFetcher {
    /// Creates a fetcher serving `receipts`.
    pub const fn new(receipts: Vec<Receipt>) -> Self {
        Self { receipts }
    }
}

#[async_trait]
impl ReceiptFetcher for TestReceiptFetcher {
    type Error = TestProviderError;

    async fn receipt_for_transaction_index(&self, tx_index: u64) -> Result<Receipt, Self::Error> {
        self.receipts
            .get(tx_index as usize)
            .cloned()
            .ok_or_else(|| TestProviderError(format!("no receipt for transaction {tx_index}")))
    }
}

/// Serves stored delayed messages without verifying them.
#[derive(Debug, Clone, Default)]
pub struct TestDelayedMessageDatabase {
    messages: HashMap<u64, DelayedInboxMessage>,
    error: Option<&'static str>,
}

impl TestDelayedMessageDatabase {
    /// Returns a database whose every read fails with `error`.
    pub fn failing(error: &'static str) -> Self {
        Self { messages: HashMap::new(), error: Some(error) }
    }

    /// Stores `message` at `index`.
    pub fn insert(&mut self, index: u64, message: DelayedInboxMessage) {
        self.messages.insert(index, message);
    }
}

#[async_trait]
impl DelayedMessageDatabase for TestDelayedMessageDatabase {
    type Error = TestDatabaseError;

    async fn read_delayed_message(
        &self,
        _: &mut MelState,
        index: u64,
    ) -> Result<Option<DelayedInboxMessage>, Self::Error> {
        if let Some(error) = self.error {
            return Err(TestDatabaseError(error.to_string()));
        }
        Ok(self.messages.get(&index).cloned())
    }
}

/// A [StateDatabase] over hash maps.
///
/// States pass through their RLP encoding when stored, so the working state a live [MelState]
/// carries is dropped as it would be on disk.
#[derive(Debug, Clone, Default)]
pub struct TestStateDatabase {
    states: HashMap<u64, MelState>,
    head: Option<u64>,
    delayed: HashMap<u64, DelayedInboxMessage>,
    batch_metas: HashMap<u64, BatchMetadata>,
}

impl TestStateDatabase {
    /// Stores `state` and moves the head to it.
    pub fn insert_state(&mut self, state: MelState) {
        let encoded = alloy_rlp::encode(&state);
        let stored = MelState::decode(&mut encoded.as_slice()).expect("state round trips");
        self.head = Some(stored.parent_chain_block_number);
        self.states.insert(stored.parent_chain_block_number, stored);
    }

    /// Returns the stored state of block `number`.
    pub fn state_at(&self, number: u64) -> MelState {
        self.states.get(&number).cloned().expect("state is stored")
    }

    /// Drops the state of block `number`.
    pub fn remove_state(&mut self, number: u64) {
        self.states.remove(&number);
    }

    /// Stores the delayed message at `index`.
    pub fn insert_delayed(&mut self, index: u64, message: DelayedInboxMessage) {
        self.delayed.insert(index, message);
    }

    /// Returns the stored metadata of batch `seq`.
    pub fn batch_meta(&self, seq: u64) -> Option<BatchMetadata> {
        self.batch_metas.get(&seq).copied()
    }
}

#[async_trait]
impl StateDatabase for TestStateDatabase {
    type Error = TestDatabaseError;

    async fn state(&self, block_number: u64) -> Result<Option<MelState>, Self::Error> {
        Ok(self.states.get(&block_number).cloned())
    }

    async fn head_state(&self) -> Result<Option<MelState>, Self::Error> {
        Ok(self.head.and_then(|number| self.states.get(&number).cloned()))
    }

    async fn delayed_message(
        &self,
        index: u64,
    ) -> Result<Option<DelayedInboxMessage>, Self::Error> {
        Ok(self.delayed.get(&index).cloned())
    }

    async fn save_state(&mut self, state: &MelState) -> Result<(), Self::Error> {
        self.insert_state(state.clone());
        Ok(())
    }

    async fn save_delayed_messages(
        &mut self,
        state: &MelState,
        messages: &[DelayedInboxMessage],
    ) -> Result<(), Self::Error> {
        let first = state.delayed_messages_seen - messages.len() as u64;
        for (offset, message) in messages.iter().enumerate() {
            self.delayed.insert(first + offset as u64, message.clone());
        }
        Ok(())
    }

    async fn save_batch_metas(
        &mut self,
        state: &MelState,
        metas: &[BatchMetadata],
    ) -> Result<(), Self::Error> {
        let first = state.batch_count - metas.len() as u64;
        for (offset, meta) in metas.iter().enumerate() {
            self.batch_metas.insert(first + offset as u64, *meta);
        }
        Ok(())
    }
}

/// A [DapReader] claiming one header byte and returning a fixed payload.
#[derive(Debug, Clone)]
pub struct TestDapReader {
    header_byte: u8,
    payload: Option<Bytes>,
    fail: bool,
}

impl TestDapReader {
    /// Creates a reader for `header_byte` that recovers `payload`.
    pub const fn new(header_byte: u8, payload: Option<Bytes>) -> Self {
        Self { header_byte, payload, fail: false }
    }

    /// Creates a reader for `header_byte` that always fails.
    pub const fn failing(header_byte: u8) -> Self {
        Self { header_byte, payload: None, fail: true }
    }
}

#[async_trait]
impl DapReader for TestDapReader {
    fn is_valid_header_byte(&self, header_byte: u8) -> bool {
        header_byte == self.header_byte
    }

    async fn recover_payload(
        &self,
        batch_num: u64,
        _: B256,
        _: &[u8],
        _: KeysetValidationMode,
    ) -> Result<Option<Bytes>, String> {
        if self.fail {
            return Err(format!("certificate of batch {batch_num} rejected"));
        }
        Ok(self.payload.clone())
    }
}

/// A [BlobReader] over a hash map.
#[derive(Debug, Clone, Default)]
pub struct TestBlobReader {
    blobs: HashMap<B256, Blob>,
}

impl TestBlobReader {
    /// Stores `blob` under `hash`.
    pub fn insert(&mut self, hash: B256, blob: Blob) {
        self.blobs.insert(hash, blob);
    }
}

#[async_trait]
impl BlobReader for TestBlobReader {
    type Error = TestProviderError;

    async fn get_blobs(
        &self,
        _: B256,
        versioned_hashes: &[B256],
    ) -> Result<Vec<Blob>, Self::Error> {
        versioned_hashes
            .iter()
            .map(|hash| {
                self.blobs
                    .get(hash)
                    .copied()
                    .ok_or_else(|| TestProviderError(format!("blob {hash} not found")))
            })
            .collect()
    }
}
