//! The message envelope produced for the execution layer.

use crate::rlp::{
    check_list_consumed, decode_list_header, decode_optional, encode_optional, optional_length,
};
use alloy_primitives::{address, keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{BufMut, Decodable, Encodable, Header, RlpDecodable, RlpEncodable};

/// The poster of every message that came through the sequencer inbox.
pub const BATCH_POSTER_ADDRESS: Address = address!("A4B000000000000000000073657175656e636572");

/// The maximum size of a decompressed L2 message.
pub const MAX_L2_MESSAGE_SIZE: usize = 256 * 1024;

/// The kind of an [L1IncomingMessage].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum L1MessageKind {
    /// A signed or unsigned L2 transaction.
    L2Message,
    /// Marks the end of an L2 block.
    EndOfBlock,
    /// An L2 message funded by a deposit on the parent chain.
    L2FundedByL1,
    /// A rollup event.
    RollupEvent,
    /// A retryable ticket submission.
    SubmitRetryable,
    /// A batch submitted for gas estimation.
    BatchForGasEstimation,
    /// The chain initialization message.
    Initialize,
    /// An ether deposit.
    EthDeposit,
    /// A report of a posted sequencer batch.
    BatchPostingReport,
    /// The synthetic invalid message.
    #[default]
    Invalid,
    /// A kind this crate does not know.
    Unknown(u8),
}

impl From<u8> for L1MessageKind {
    fn from(value: u8) -> Self {
        match value {
            3 => Self::L2Message,
            6 => Self::EndOfBlock,
            7 => Self::L2FundedByL1,
            8 => Self::RollupEvent,
            9 => Self::SubmitRetryable,
            10 => Self::BatchForGasEstimation,
            11 => Self::Initialize,
            12 => Self::EthDeposit,
            13 => Self::BatchPostingReport,
            0xFF => Self::Invalid,
            other => Self::Unknown(other),
        }
    }
}

impl From<L1MessageKind> for u8 {
    fn from(kind: L1MessageKind) -> Self {
        match kind {
            L1MessageKind::L2Message => 3,
            L1MessageKind::EndOfBlock => 6,
            L1MessageKind::L2FundedByL1 => 7,
            L1MessageKind::RollupEvent => 8,
            L1MessageKind::SubmitRetryable => 9,
            L1MessageKind::BatchForGasEstimation => 10,
            L1MessageKind::Initialize => 11,
            L1MessageKind::EthDeposit => 12,
            L1MessageKind::BatchPostingReport => 13,
            L1MessageKind::Invalid => 0xFF,
            L1MessageKind::Unknown(other) => other,
        }
    }
}

impl Encodable for L1MessageKind {
    fn encode(&self, out: &mut dyn BufMut) {
        u8::from(*self).encode(out)
    }

    fn length(&self) -> usize {
        u8::from(*self).length()
    }
}

impl Decodable for L1MessageKind {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        u8::decode(buf).map(Self::from)
    }
}

/// The header of an [L1IncomingMessage].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct L1IncomingMessageHeader {
    /// The message kind.
    pub kind: L1MessageKind,
    /// The account that posted the message.
    pub poster: Address,
    /// The parent chain block number.
    pub block_number: u64,
    /// The timestamp.
    pub timestamp: u64,
    /// The request id. Delayed messages carry their index here.
    pub request_id: Option<B256>,
    /// The parent chain base fee.
    pub l1_base_fee: Option<U256>,
}

impl L1IncomingMessageHeader {
    fn fields_len(&self) -> usize {
        self.kind.length()
            + self.poster.length()
            + self.block_number.length()
            + self.timestamp.length()
            + optional_length(&self.request_id)
            + optional_length(&self.l1_base_fee)
    }
}

impl Encodable for L1IncomingMessageHeader {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.fields_len() }.encode(out);
        self.kind.encode(out);
        self.poster.encode(out);
        self.block_number.encode(out);
        self.timestamp.encode(out);
        encode_optional(&self.request_id, out);
        encode_optional(&self.l1_base_fee, out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for L1IncomingMessageHeader {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let payload_length = decode_list_header(buf)?;
        let started = buf.len();
        let this = Self {
            kind: Decodable::decode(buf)?,
            poster: Decodable::decode(buf)?,
            block_number: Decodable::decode(buf)?,
            timestamp: Decodable::decode(buf)?,
            request_id: decode_optional(buf)?,
            l1_base_fee: decode_optional(buf)?,
        };
        check_list_consumed(payload_length, started, buf.len())?;
        Ok(this)
    }
}

/// Size statistics of a serialized batch, used to price its posting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct BatchDataStats {
    /// The number of bytes.
    pub length: u64,
    /// The number of non-zero bytes.
    pub non_zeros: u64,
}

impl BatchDataStats {
    /// Computes the stats of `data`.
    pub fn from_data(data: &[u8]) -> Self {
        Self {
            length: data.len() as u64,
            non_zeros: data.iter().filter(|b| **b != 0).count() as u64,
        }
    }
}

/// A message on its way to the execution layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct L1IncomingMessage {
    /// The header.
    pub header: L1IncomingMessageHeader,
    /// The payload.
    pub l2_msg: Bytes,
    /// The legacy gas cost of the batch a posting report refers to.
    pub legacy_batch_gas_cost: Option<u64>,
    /// The stats of the batch a posting report refers to.
    pub batch_data_stats: Option<BatchDataStats>,
}

impl L1IncomingMessage {
    /// Returns the synthetic invalid message.
    pub fn invalid() -> Self {
        Self {
            header: L1IncomingMessageHeader { kind: L1MessageKind::Invalid, ..Default::default() },
            ..Default::default()
        }
    }

    fn fields_len(&self) -> usize {
        self.header.length()
            + self.l2_msg.length()
            + optional_length(&self.legacy_batch_gas_cost)
            + optional_length(&self.batch_data_stats)
    }
}

impl Encodable for L1IncomingMessage {
    fn encode(&self, out: &mut dyn BufMut) {
        Header { list: true, payload_length: self.fields_len() }.encode(out);
        self.header.encode(out);
        self.l2_msg.encode(out);
        encode_optional(&self.legacy_batch_gas_cost, out);
        encode_optional(&self.batch_data_stats, out);
    }

    fn length(&self) -> usize {
        let payload_length = self.fields_len();
        payload_length + alloy_rlp::length_of_length(payload_length)
    }
}

impl Decodable for L1IncomingMessage {
    fn decode(buf: &mut &[u8]) -> alloy_rlp::Result<Self> {
        let payload_length = decode_list_header(buf)?;
        let started = buf.len();
        let this = Self {
            header: Decodable::decode(buf)?,
            l2_msg: Decodable::decode(buf)?,
            legacy_batch_gas_cost: decode_optional(buf)?,
            batch_data_stats: decode_optional(buf)?,
        };
        check_list_consumed(payload_length, started, buf.len())?;
        Ok(this)
    }
}

/// An extracted message together with the delayed message count after it.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct MessageWithMetadata {
    /// The message.
    pub message: L1IncomingMessage,
    /// The number of delayed messages read once this message is applied.
    pub delayed_messages_read: u64,
}

impl MessageWithMetadata {
    /// Returns the hash that is appended to the message accumulator.
    pub fn hash(&self) -> B256 {
        keccak256(alloy_rlp::encode(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    #[test]
    fn test_kind_roundtrips_through_u8() {
        for raw in 0..=u8::MAX {
            assert_eq!(u8::from(L1MessageKind::from(raw)), raw);
        }
        assert_eq!(L1MessageKind::from(13), L1MessageKind::BatchPostingReport);
        assert_eq!(L1MessageKind::from(0x42), L1MessageKind::Unknown(0x42));
    }

    #[test]
    fn test_invalid_message() {
        let invalid = L1IncomingMessage::invalid();
        assert_eq!(u8::from(invalid.header.kind), 0xFF);
        assert!(invalid.l2_msg.is_empty());
        assert_eq!(invalid.header.poster, Address::ZERO);
    }

    #[test]
    fn test_message_decode_preserves_optionals() {
        let message = L1IncomingMessage {
            header: L1IncomingMessageHeader {
                kind: L1MessageKind::BatchPostingReport,
                poster: Address::repeat_byte(0x11),
                block_number: 42,
                timestamp: 1_700_000_000,
                request_id: Some(b256!(
                    "0000000000000000000000000000000000000000000000000000000000000007"
                )),
                l1_base_fee: None,
            },
            l2_msg: Bytes::from_static(b"report"),
            legacy_batch_gas_cost: Some(40_123),
            batch_data_stats: Some(BatchDataStats { length: 10, non_zeros: 3 }),
        };
        let encoded = alloy_rlp::encode(&message);
        assert_eq!(encoded.len(), message.length());
        assert_eq!(L1IncomingMessage::decode(&mut encoded.as_slice()).unwrap(), message);
    }

    #[test]
    fn test_message_hash_depends_on_read_count() {
        let a = MessageWithMetadata { message: L1IncomingMessage::invalid(), delayed_messages_read: 0 };
        let b = MessageWithMetadata { delayed_messages_read: 1, ..a.clone() };
        assert_ne!(a.hash(), b.hash());
        assert_eq!(a.hash(), a.clone().hash());
    }

    #[test]
    fn test_batch_data_stats() {
        let stats = BatchDataStats::from_data(&[0, 1, 0, 2, 3]);
        assert_eq!(stats, BatchDataStats { length: 5, non_zeros: 3 });
    }
}
