//! Test utilities for the [crate::MessageExtractor].

use crate::traits::{MessageConsumer, ParentChainReader};
use alloy_consensus::{Header, Receipt};
use alloy_primitives::B256;
use async_trait::async_trait;
use mel_extraction::{test_utils::TestReceiptFetcher, ParentChainBlock};
use mel_primitives::MessageWithMetadata;
use spin::Mutex;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

/// An error of the test reader and consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TestRunnerError(pub String);

#[derive(Debug, Default)]
struct ChainData {
    blocks: HashMap<u64, ParentChainBlock>,
    receipts: HashMap<B256, Receipt>,
    finalized: Option<u64>,
    failing: bool,
}

/// An in-memory parent chain. Clones share the chain, so a test can keep extending it after
/// handing a clone to the extractor.
#[derive(Debug, Clone, Default)]
pub struct TestParentChainReader {
    chain: Arc<Mutex<ChainData>>,
}

impl TestParentChainReader {
    /// Adds `block`, replacing any block with the same number. `receipts` serves its
    /// transactions in order.
    pub fn insert_block(&self, block: ParentChainBlock, receipts: TestReceiptFetcher) {
        let mut chain = self.chain.lock();
        for (tx, receipt) in block.body.transactions.iter().zip(receipts.receipts) {
            chain.receipts.insert(*tx.tx_hash(), receipt);
        }
        chain.blocks.insert(block.header.number, block);
    }

    /// Removes the block at `number`.
    pub fn remove_block(&self, number: u64) {
        self.chain.lock().blocks.remove(&number);
    }

    /// Sets the finalized block number.
    pub fn set_finalized(&self, number: Option<u64>) {
        self.chain.lock().finalized = number;
    }

    /// Makes every call fail while `failing` is set.
    pub fn set_failing(&self, failing: bool) {
        self.chain.lock().failing = failing;
    }

    fn check(&self) -> Result<(), TestRunnerError> {
        if self.chain.lock().failing {
            return Err(TestRunnerError("parent chain unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ParentChainReader for TestParentChainReader {
    type Error = TestRunnerError;

    async fn block_by_number(&self, number: u64) -> Result<Option<ParentChainBlock>, Self::Error> {
        self.check()?;
        Ok(self.chain.lock().blocks.get(&number).cloned())
    }

    async fn header_by_hash(&self, hash: B256) -> Result<Option<Header>, Self::Error> {
        self.check()?;
        let chain = self.chain.lock();
        Ok(chain
            .blocks
            .values()
            .find(|block| block.header.hash_slow() == hash)
            .map(|block| block.header.clone()))
    }

    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, Self::Error> {
        self.check()?;
        Ok(self.chain.lock().receipts.get(&tx_hash).cloned())
    }

    async fn finalized_block_number(&self) -> Result<Option<u64>, Self::Error> {
        self.check()?;
        Ok(self.chain.lock().finalized)
    }
}

/// Records pushed messages by index.
#[derive(Debug, Clone, Default)]
pub struct TestMessageConsumer {
    messages: Arc<Mutex<Vec<MessageWithMetadata>>>,
    error: Arc<Mutex<Option<String>>>,
}

impl TestMessageConsumer {
    /// Returns every message pushed so far, in index order.
    pub fn messages(&self) -> Vec<MessageWithMetadata> {
        self.messages.lock().clone()
    }

    /// Makes pushes fail with `error` until cleared with [None].
    pub fn set_error(&self, error: Option<&str>) {
        *self.error.lock() = error.map(ToString::to_string);
    }
}

#[async_trait]
impl MessageConsumer for TestMessageConsumer {
    type Error = TestRunnerError;

    async fn push_messages(
        &mut self,
        first_msg_idx: u64,
        messages: &[MessageWithMetadata],
    ) -> Result<(), Self::Error> {
        if let Some(error) = self.error.lock().clone() {
            return Err(TestRunnerError(error));
        }
        let mut stored = self.messages.lock();
        stored.truncate(first_msg_idx as usize);
        if stored.len() as u64 != first_msg_idx {
            return Err(TestRunnerError(format!(
                "push at {first_msg_idx} leaves a gap after {} messages",
                stored.len()
            )));
        }
        stored.extend_from_slice(messages);
        Ok(())
    }
}
