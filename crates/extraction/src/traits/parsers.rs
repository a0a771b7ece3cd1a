//! Decoders for the events and calldata of the inbox contracts.

use crate::errors::EventDecodingError;
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use mel_primitives::TimeBounds;

/// A decoded `SequencerBatchDelivered` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDeliveredEvent {
    /// The batch sequence number.
    pub sequence_number: u64,
    /// Sequencer inbox accumulator before the batch.
    pub before_acc: B256,
    /// Sequencer inbox accumulator after the batch.
    pub after_acc: B256,
    /// Delayed inbox accumulator at the batch's delayed read count.
    pub delayed_acc: B256,
    /// Delayed messages read once the batch is applied.
    pub after_delayed_messages_read: u64,
    /// Declared bounds.
    pub time_bounds: TimeBounds,
    /// Raw data location code.
    pub data_location: u8,
}

/// A decoded `MessageDelivered` event of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDeliveredEvent {
    /// The delayed message index.
    pub message_index: u64,
    /// Bridge inbox accumulator before the message.
    pub before_inbox_acc: B256,
    /// The inbox that delivered the message.
    pub inbox: Address,
    /// Raw message kind.
    pub kind: u8,
    /// The sender.
    pub sender: Address,
    /// Keccak of the payload.
    pub message_data_hash: B256,
    /// Parent chain base fee.
    pub base_fee_l1: U256,
    /// Timestamp of delivery.
    pub timestamp: u64,
}

/// Where an inbox log says the payload of a delayed message lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboxMessageData {
    /// The payload is in the log.
    Inline {
        /// The delayed message index.
        message_index: u64,
        /// The payload.
        data: Bytes,
    },
    /// The payload is the argument of `sendL2MessageFromOrigin` in the transaction calldata.
    FromOrigin {
        /// The delayed message index.
        message_index: u64,
    },
}

impl InboxMessageData {
    /// Returns the delayed message index.
    pub const fn message_index(&self) -> u64 {
        match self {
            Self::Inline { message_index, .. } | Self::FromOrigin { message_index } => {
                *message_index
            }
        }
    }
}

/// Decodes sequencer inbox logs and calldata.
///
/// Every `parse_*` method returns `Ok(None)` for logs that are not the event it decodes.
pub trait BatchEventParser: Send + Sync {
    /// Decodes a `SequencerBatchDelivered` log.
    fn parse_batch_delivered(&self, log: &Log)
        -> Result<Option<BatchDeliveredEvent>, EventDecodingError>;

    /// Decodes a `SequencerBatchData` log into its sequence number and data.
    fn parse_batch_data(&self, log: &Log) -> Result<Option<(u64, Bytes)>, EventDecodingError>;

    /// Extracts the batch data from `addSequencerL2BatchFromOrigin` calldata.
    fn decode_batch_calldata(&self, input: &[u8]) -> Result<Bytes, EventDecodingError>;
}

/// Decodes bridge and delayed inbox logs and calldata.
pub trait BridgeEventParser: Send + Sync {
    /// Decodes a `MessageDelivered` log.
    fn parse_message_delivered(
        &self,
        log: &Log,
    ) -> Result<Option<MessageDeliveredEvent>, EventDecodingError>;

    /// Decodes an `InboxMessageDelivered` or `InboxMessageDeliveredFromOrigin` log.
    fn parse_inbox_message(&self, log: &Log)
        -> Result<Option<InboxMessageData>, EventDecodingError>;

    /// Extracts the message from `sendL2MessageFromOrigin` calldata.
    fn decode_l2_message_from_origin_calldata(
        &self,
        input: &[u8],
    ) -> Result<Bytes, EventDecodingError>;
}
