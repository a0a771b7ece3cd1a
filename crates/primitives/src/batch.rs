//! Sequencer inbox batches and their persisted metadata.

use alloy_primitives::{Address, Bytes, Log, B256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use core::fmt;

/// The bounds a sequencer batch declares for the messages it carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct TimeBounds {
    /// Minimum timestamp.
    pub min_timestamp: u64,
    /// Maximum timestamp.
    pub max_timestamp: u64,
    /// Minimum parent chain block number.
    pub min_block_number: u64,
    /// Maximum parent chain block number.
    pub max_block_number: u64,
}

/// Where the data of a batch lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatchDataLocation {
    /// In the calldata of the posting transaction.
    TxInput,
    /// In a separate batch data event.
    SeparateEvent,
    /// Nowhere. The batch only forces inclusion of delayed messages.
    None,
    /// In blobs referenced by the posting transaction.
    BlobHashes,
}

impl TryFrom<u8> for BatchDataLocation {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::TxInput),
            1 => Ok(Self::SeparateEvent),
            2 => Ok(Self::None),
            3 => Ok(Self::BlobHashes),
            other => Err(other),
        }
    }
}

impl fmt::Display for BatchDataLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TxInput => write!(f, "tx-input"),
            Self::SeparateEvent => write!(f, "separate-event"),
            Self::None => write!(f, "none"),
            Self::BlobHashes => write!(f, "blob-hashes"),
        }
    }
}

/// A batch delivered to the sequencer inbox, as observed in a parent chain block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerInboxBatch {
    /// Hash of the parent chain block.
    pub block_hash: B256,
    /// Number of the parent chain block.
    pub parent_chain_block_number: u64,
    /// The batch sequence number.
    pub sequence_number: u64,
    /// Sequencer inbox accumulator before the batch.
    pub before_inbox_acc: B256,
    /// Sequencer inbox accumulator after the batch.
    pub after_inbox_acc: B256,
    /// Delayed inbox accumulator at the batch's delayed read count.
    pub after_delayed_acc: B256,
    /// Delayed messages read once the batch is applied.
    pub after_delayed_count: u64,
    /// Declared bounds.
    pub time_bounds: TimeBounds,
    /// The log that delivered the batch.
    pub raw_log: Log,
    /// Index of the posting transaction in the block.
    pub tx_index: u64,
    /// Address of the contract that emitted the delivery log.
    pub bridge_address: Address,
    /// Where the batch data lives.
    pub data_location: BatchDataLocation,
    /// Memoized serialized form.
    pub serialized: Option<Bytes>,
}

/// What is persisted per batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct BatchMetadata {
    /// Sequencer inbox accumulator after the batch.
    pub accumulator: B256,
    /// Message count after the batch.
    pub message_count: u64,
    /// Delayed message count after the batch.
    pub delayed_message_count: u64,
    /// Parent chain block the batch was posted in.
    pub parent_chain_block: u64,
}
