//! [BatchEventParser] and [BridgeEventParser] backed by `alloy-sol-types`.

use crate::{
    errors::EventDecodingError,
    traits::{
        BatchDeliveredEvent, BatchEventParser, BridgeEventParser, InboxMessageData,
        MessageDeliveredEvent,
    },
};
use alloy_primitives::{Bytes, Log, U256};
use alloy_sol_types::{SolCall, SolEvent};
use mel_primitives::TimeBounds;

/// Contract interfaces of the sequencer inbox, the bridge and the delayed inbox.
pub mod abi {
    alloy_sol_types::sol! {
        #[derive(Debug, Default, PartialEq, Eq)]
        struct TimeBounds {
            uint64 minTimestamp;
            uint64 maxTimestamp;
            uint64 minBlockNumber;
            uint64 maxBlockNumber;
        }

        #[derive(Debug, PartialEq, Eq)]
        event SequencerBatchDelivered(
            uint256 indexed batchSequenceNumber,
            bytes32 indexed beforeAcc,
            bytes32 indexed afterAcc,
            bytes32 delayedAcc,
            uint256 afterDelayedMessagesRead,
            TimeBounds timeBounds,
            uint8 dataLocation
        );

        #[derive(Debug, PartialEq, Eq)]
        event SequencerBatchData(uint256 indexed batchSequenceNumber, bytes data);

        #[derive(Debug, PartialEq, Eq)]
        event MessageDelivered(
            uint256 indexed messageIndex,
            bytes32 indexed beforeInboxAcc,
            address inbox,
            uint8 kind,
            address sender,
            bytes32 messageDataHash,
            uint256 baseFeeL1,
            uint64 timestamp
        );

        #[derive(Debug, PartialEq, Eq)]
        event InboxMessageDelivered(uint256 indexed messageNum, bytes data);

        #[derive(Debug, PartialEq, Eq)]
        event InboxMessageDeliveredFromOrigin(uint256 indexed messageNum);

        function addSequencerL2BatchFromOrigin(
            uint256 sequenceNumber,
            bytes calldata data,
            uint256 afterDelayedMessagesRead,
            address gasRefunder,
            uint256 prevMessageCount,
            uint256 newMessageCount
        ) external;

        function sendL2MessageFromOrigin(bytes calldata messageData) external returns (uint256);
    }
}

const SELECTOR_LEN: usize = 4;

/// Decodes the inbox contract ABI.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolEventParser;

impl SolEventParser {
    fn matches<E: SolEvent>(log: &Log) -> bool {
        log.topics().first() == Some(&E::SIGNATURE_HASH)
    }

    fn decode<E: SolEvent>(log: &Log) -> Result<Option<E>, EventDecodingError> {
        if !Self::matches::<E>(log) {
            return Ok(None);
        }
        E::decode_log_data(&log.data)
            .map(Some)
            .map_err(|e| EventDecodingError::new(E::SIGNATURE, e))
    }

    fn strip_selector<'a>(
        item: &'static str,
        input: &'a [u8],
    ) -> Result<&'a [u8], EventDecodingError> {
        input
            .get(SELECTOR_LEN..)
            .ok_or_else(|| EventDecodingError::new(item, "calldata shorter than a selector"))
    }
}

fn to_u64(item: &'static str, value: U256) -> Result<u64, EventDecodingError> {
    u64::try_from(value).map_err(|_| EventDecodingError::new(item, "value overflows u64"))
}

impl From<abi::TimeBounds> for TimeBounds {
    fn from(bounds: abi::TimeBounds) -> Self {
        Self {
            min_timestamp: bounds.minTimestamp,
            max_timestamp: bounds.maxTimestamp,
            min_block_number: bounds.minBlockNumber,
            max_block_number: bounds.maxBlockNumber,
        }
    }
}

impl BatchEventParser for SolEventParser {
    fn parse_batch_delivered(
        &self,
        log: &Log,
    ) -> Result<Option<BatchDeliveredEvent>, EventDecodingError> {
        let Some(event) = Self::decode::<abi::SequencerBatchDelivered>(log)? else {
            return Ok(None);
        };
        Ok(Some(BatchDeliveredEvent {
            sequence_number: to_u64("batchSequenceNumber", event.batchSequenceNumber)?,
            before_acc: event.beforeAcc,
            after_acc: event.afterAcc,
            delayed_acc: event.delayedAcc,
            after_delayed_messages_read: to_u64(
                "afterDelayedMessagesRead",
                event.afterDelayedMessagesRead,
            )?,
            time_bounds: event.timeBounds.into(),
            data_location: event.dataLocation,
        }))
    }

    fn parse_batch_data(&self, log: &Log) -> Result<Option<(u64, Bytes)>, EventDecodingError> {
        let Some(event) = Self::decode::<abi::SequencerBatchData>(log)? else {
            return Ok(None);
        };
        Ok(Some((to_u64("batchSequenceNumber", event.batchSequenceNumber)?, event.data)))
    }

    fn decode_batch_calldata(&self, input: &[u8]) -> Result<Bytes, EventDecodingError> {
        let item = abi::addSequencerL2BatchFromOriginCall::SIGNATURE;
        let args = Self::strip_selector(item, input)?;
        abi::addSequencerL2BatchFromOriginCall::abi_decode_raw(args)
            .map(|call| call.data)
            .map_err(|e| EventDecodingError::new(item, e))
    }
}

impl BridgeEventParser for SolEventParser {
    fn parse_message_delivered(
        &self,
        log: &Log,
    ) -> Result<Option<MessageDeliveredEvent>, EventDecodingError> {
        let Some(event) = Self::decode::<abi::MessageDelivered>(log)? else {
            return Ok(None);
        };
        Ok(Some(MessageDeliveredEvent {
            message_index: to_u64("messageIndex", event.messageIndex)?,
            before_inbox_acc: event.beforeInboxAcc,
            inbox: event.inbox,
            kind: event.kind,
            sender: event.sender,
            message_data_hash: event.messageDataHash,
            base_fee_l1: event.baseFeeL1,
            timestamp: event.timestamp,
        }))
    }

    fn parse_inbox_message(
        &self,
        log: &Log,
    ) -> Result<Option<InboxMessageData>, EventDecodingError> {
        if let Some(event) = Self::decode::<abi::InboxMessageDelivered>(log)? {
            return Ok(Some(InboxMessageData::Inline {
                message_index: to_u64("messageNum", event.messageNum)?,
                data: event.data,
            }));
        }
        if let Some(event) = Self::decode::<abi::InboxMessageDeliveredFromOrigin>(log)? {
            return Ok(Some(InboxMessageData::FromOrigin {
                message_index: to_u64("messageNum", event.messageNum)?,
            }));
        }
        Ok(None)
    }

    fn decode_l2_message_from_origin_calldata(
        &self,
        input: &[u8],
    ) -> Result<Bytes, EventDecodingError> {
        let item = abi::sendL2MessageFromOriginCall::SIGNATURE;
        let args = Self::strip_selector(item, input)?;
        abi::sendL2MessageFromOriginCall::abi_decode_raw(args)
            .map(|call| call.messageData)
            .map_err(|e| EventDecodingError::new(item, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{b256, Address, B256};

    fn log<E: SolEvent>(event: &E) -> Log {
        Log { address: Address::repeat_byte(0x11), data: event.encode_log_data() }
    }

    #[test]
    fn test_signature_hashes() {
        assert_eq!(
            abi::SequencerBatchDelivered::SIGNATURE_HASH,
            b256!("7394f4a19a13c7b92b5bb71033245305946ef78452f7b4986ac1390b5df4ebd7")
        );
        assert_eq!(
            abi::SequencerBatchData::SIGNATURE_HASH,
            b256!("ff64905f73a67fb594e0f940a8075a860db489ad991e032f48c81123eb52d60b")
        );
    }

    #[test]
    fn test_parse_batch_delivered() {
        let event = abi::SequencerBatchDelivered {
            batchSequenceNumber: U256::from(7),
            beforeAcc: B256::repeat_byte(1),
            afterAcc: B256::repeat_byte(2),
            delayedAcc: B256::repeat_byte(3),
            afterDelayedMessagesRead: U256::from(4),
            timeBounds: abi::TimeBounds {
                minTimestamp: 1,
                maxTimestamp: 2,
                minBlockNumber: 3,
                maxBlockNumber: 4,
            },
            dataLocation: 1,
        };
        let parsed = SolEventParser.parse_batch_delivered(&log(&event)).unwrap().unwrap();
        assert_eq!(parsed.sequence_number, 7);
        assert_eq!(parsed.after_acc, B256::repeat_byte(2));
        assert_eq!(parsed.after_delayed_messages_read, 4);
        assert_eq!(parsed.time_bounds.max_block_number, 4);
        assert_eq!(parsed.data_location, 1);
    }

    #[test]
    fn test_other_events_are_skipped() {
        let data = abi::SequencerBatchData {
            batchSequenceNumber: U256::from(3),
            data: Bytes::from_static(b"batch"),
        };
        let data_log = log(&data);
        assert!(SolEventParser.parse_batch_delivered(&data_log).unwrap().is_none());
        assert!(SolEventParser.parse_message_delivered(&data_log).unwrap().is_none());
        assert!(SolEventParser.parse_inbox_message(&data_log).unwrap().is_none());
        assert_eq!(
            SolEventParser.parse_batch_data(&data_log).unwrap(),
            Some((3, Bytes::from_static(b"batch")))
        );
    }

    #[test]
    fn test_parse_inbox_messages() {
        let inline = abi::InboxMessageDelivered {
            messageNum: U256::from(9),
            data: Bytes::from_static(b"payload"),
        };
        assert_eq!(
            SolEventParser.parse_inbox_message(&log(&inline)).unwrap(),
            Some(InboxMessageData::Inline {
                message_index: 9,
                data: Bytes::from_static(b"payload")
            })
        );
        let origin = abi::InboxMessageDeliveredFromOrigin { messageNum: U256::from(10) };
        assert_eq!(
            SolEventParser.parse_inbox_message(&log(&origin)).unwrap(),
            Some(InboxMessageData::FromOrigin { message_index: 10 })
        );
    }

    #[test]
    fn test_sequence_number_overflow() {
        let data = abi::SequencerBatchData { batchSequenceNumber: U256::MAX, data: Bytes::new() };
        let err = SolEventParser.parse_batch_data(&log(&data)).unwrap_err();
        assert_eq!(err.item, "batchSequenceNumber");
    }

    #[test]
    fn test_decode_calldata() {
        let call = abi::sendL2MessageFromOriginCall { messageData: Bytes::from_static(b"hi") };
        let input = call.abi_encode();
        assert_eq!(
            SolEventParser.decode_l2_message_from_origin_calldata(&input).unwrap(),
            Bytes::from_static(b"hi")
        );
        assert!(SolEventParser.decode_l2_message_from_origin_calldata(&input[..3]).is_err());

        let call = abi::addSequencerL2BatchFromOriginCall {
            sequenceNumber: U256::from(1),
            data: Bytes::from_static(b"batch"),
            afterDelayedMessagesRead: U256::ZERO,
            gasRefunder: Address::ZERO,
            prevMessageCount: U256::ZERO,
            newMessageCount: U256::ZERO,
        };
        assert_eq!(
            SolEventParser.decode_batch_calldata(&call.abi_encode()).unwrap(),
            Bytes::from_static(b"batch")
        );
    }
}
