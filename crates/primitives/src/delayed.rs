//! Delayed inbox messages.

use crate::message::L1IncomingMessage;
use alloy_primitives::{keccak256, B256, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};

/// A message submitted to the bridge and incorporated into the L2 stream later.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct DelayedInboxMessage {
    /// The hash of the parent chain block the message was delivered in.
    pub block_hash: B256,
    /// The bridge inbox accumulator before this message.
    pub before_inbox_acc: B256,
    /// The message.
    pub message: L1IncomingMessage,
}

impl DelayedInboxMessage {
    /// Returns the bridge inbox accumulator after this message.
    ///
    /// Only the fields the bridge commits to take part, so filling in the gas fields of a batch
    /// posting report does not change it.
    pub fn after_inbox_acc(&self) -> B256 {
        let header = &self.message.header;
        let mut preimage = [0u8; 1 + 20 + 32 + 32 + 32 + 32 + 32];
        preimage[0] = header.kind.into();
        preimage[1..21].copy_from_slice(header.poster.as_slice());
        preimage[21..53].copy_from_slice(&U256::from(header.block_number).to_be_bytes::<32>());
        preimage[53..85].copy_from_slice(&U256::from(header.timestamp).to_be_bytes::<32>());
        preimage[85..117].copy_from_slice(header.request_id.unwrap_or_default().as_slice());
        preimage[117..149]
            .copy_from_slice(&header.l1_base_fee.unwrap_or_default().to_be_bytes::<32>());
        preimage[149..].copy_from_slice(keccak256(&self.message.l2_msg).as_slice());
        let message_hash = keccak256(preimage);

        let mut acc = [0u8; 64];
        acc[..32].copy_from_slice(self.before_inbox_acc.as_slice());
        acc[32..].copy_from_slice(message_hash.as_slice());
        keccak256(acc)
    }

    /// Returns the hash appended to the delayed message accumulator.
    pub fn hash(&self) -> B256 {
        self.after_inbox_acc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{BatchDataStats, L1IncomingMessageHeader, L1MessageKind};
    use alloy_primitives::{Address, Bytes};
    use alloy_rlp::Decodable;

    fn delayed() -> DelayedInboxMessage {
        DelayedInboxMessage {
            block_hash: B256::repeat_byte(0xbb),
            before_inbox_acc: B256::repeat_byte(0xaa),
            message: L1IncomingMessage {
                header: L1IncomingMessageHeader {
                    kind: L1MessageKind::BatchPostingReport,
                    poster: Address::repeat_byte(0x01),
                    block_number: 9,
                    timestamp: 99,
                    request_id: Some(B256::with_last_byte(3)),
                    l1_base_fee: Some(U256::from(7)),
                },
                l2_msg: Bytes::from_static(b"payload"),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_hash_ignores_gas_fields() {
        let msg = delayed();
        let mut priced = msg.clone();
        priced.message.legacy_batch_gas_cost = Some(1);
        priced.message.batch_data_stats = Some(BatchDataStats { length: 1, non_zeros: 1 });
        assert_eq!(msg.hash(), priced.hash());
    }

    #[test]
    fn test_hash_commits_to_before_acc_and_payload() {
        let msg = delayed();
        let mut other = msg.clone();
        other.before_inbox_acc = B256::ZERO;
        assert_ne!(msg.hash(), other.hash());

        let mut other = msg.clone();
        other.message.l2_msg = Bytes::from_static(b"corrupt");
        assert_ne!(msg.hash(), other.hash());
    }

    #[test]
    fn test_rlp_decode() {
        let msg = delayed();
        let encoded = alloy_rlp::encode(&msg);
        assert_eq!(DelayedInboxMessage::decode(&mut encoded.as_slice()).unwrap(), msg);
    }
}
