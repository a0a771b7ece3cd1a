//! Storage contracts for states and delayed messages.

use crate::{errors::MelErrorKind, state::MelState};
use alloy_primitives::B256;
use async_trait::async_trait;
use core::fmt::Display;
use mel_primitives::{BatchMetadata, DelayedInboxMessage};

/// Durable storage of [MelState]s and the data observed alongside them.
#[async_trait]
pub trait StateDatabase: Send + Sync {
    /// The error type for the [StateDatabase].
    type Error: Display + Into<MelErrorKind>;

    /// Returns the state built from the parent chain block `block_number`.
    async fn state(&self, block_number: u64) -> Result<Option<MelState>, Self::Error>;

    /// Returns the state the head pointer refers to.
    async fn head_state(&self) -> Result<Option<MelState>, Self::Error>;

    /// Returns the stored delayed message at `index` without verifying it.
    async fn delayed_message(
        &self,
        index: u64,
    ) -> Result<Option<DelayedInboxMessage>, Self::Error>;

    /// Persists `state` and moves the head pointer to it.
    async fn save_state(&mut self, state: &MelState) -> Result<(), Self::Error>;

    /// Persists the delayed messages `state` was the first to see. They occupy the indices
    /// directly below `state.delayed_messages_seen`.
    async fn save_delayed_messages(
        &mut self,
        state: &MelState,
        messages: &[DelayedInboxMessage],
    ) -> Result<(), Self::Error>;

    /// Persists the metadata of the batches `state` processed. They occupy the sequence numbers
    /// directly below `state.batch_count`.
    async fn save_batch_metas(
        &mut self,
        state: &MelState,
        metas: &[BatchMetadata],
    ) -> Result<(), Self::Error>;
}

/// Serves delayed messages to extraction, verified against the accumulator.
#[async_trait]
pub trait DelayedMessageDatabase: Send + Sync {
    /// The error type for the [DelayedMessageDatabase].
    type Error: Display + Into<MelErrorKind>;

    /// Returns the delayed message at `index`. Index 0 is the chain initialization message held
    /// by the state's deque.
    async fn read_delayed_message(
        &self,
        state: &mut MelState,
        index: u64,
    ) -> Result<Option<DelayedInboxMessage>, Self::Error>;
}

/// Resolves the state extraction starts from.
#[async_trait]
pub trait StateFetcher: Send + Sync {
    /// The error type for the [StateFetcher].
    type Error: Display + Into<MelErrorKind>;

    /// Returns the state built from the parent chain block `parent_chain_block_hash`.
    async fn fetch_initial_state(&self, parent_chain_block_hash: B256)
        -> Result<MelState, Self::Error>;
}
