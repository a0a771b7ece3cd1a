//! Contracts of the parent chain and of the consumer of extracted messages.

use alloy_consensus::{Header, Receipt};
use alloy_primitives::B256;
use async_trait::async_trait;
use core::fmt::Display;
use mel_extraction::ParentChainBlock;
use mel_primitives::MessageWithMetadata;

/// Reads the parent chain.
#[async_trait]
pub trait ParentChainReader: Send + Sync {
    /// The error type for the [ParentChainReader].
    type Error: Display;

    /// Returns the block at `number`, or [None] if the chain has not reached it yet.
    async fn block_by_number(&self, number: u64) -> Result<Option<ParentChainBlock>, Self::Error>;

    /// Returns the header of the block with `hash`, or [None] if it is unknown.
    async fn header_by_hash(&self, hash: B256) -> Result<Option<Header>, Self::Error>;

    /// Returns the receipt of the transaction with `tx_hash`, or [None] if it is unknown.
    async fn transaction_receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, Self::Error>;

    /// Returns the number of the latest finalized block, if the chain reports one.
    async fn finalized_block_number(&self) -> Result<Option<u64>, Self::Error>;
}

/// Receives extracted messages in order.
#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// The error type for the [MessageConsumer].
    type Error: Display;

    /// Accepts `messages`, the first of which has index `first_msg_idx`. A block may be pushed
    /// again after a failed save, so pushes must be idempotent.
    async fn push_messages(
        &mut self,
        first_msg_idx: u64,
        messages: &[MessageWithMetadata],
    ) -> Result<(), Self::Error>;
}
