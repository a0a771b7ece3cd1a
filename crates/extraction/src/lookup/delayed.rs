//! Delayed message lookup.

use crate::{
    errors::{MelError, MelErrorKind, MelResult},
    state::MelState,
    traits::{BridgeEventParser, InboxMessageData, MessageDeliveredEvent, ReceiptFetcher},
    ParentChainBlock,
};
use alloy_consensus::Transaction;
use alloy_primitives::{keccak256, Address, Bytes, B256};
use mel_primitives::{DelayedInboxMessage, L1IncomingMessage, L1IncomingMessageHeader};
use std::collections::HashMap;

/// Collects the delayed messages delivered to the bridge in `block`, ordered by request id.
pub async fn parse_delayed_messages_from_block<P, R>(
    state: &MelState,
    block: &ParentChainBlock,
    block_hash: B256,
    parser: &P,
    receipts: &R,
) -> MelResult<Vec<DelayedInboxMessage>>
where
    P: BridgeEventParser + ?Sized,
    R: ReceiptFetcher + ?Sized,
{
    let target = state.delayed_message_posting_target_address;
    let txs = &block.body.transactions;

    let mut events: Vec<MessageDeliveredEvent> = Vec::new();
    for (tx_index, tx) in txs.iter().enumerate() {
        if tx.to() != Some(target) {
            continue;
        }
        let receipt = receipts
            .receipt_for_transaction_index(tx_index as u64)
            .await
            .map_err(Into::<MelErrorKind>::into)?;
        for log in &receipt.logs {
            if let Some(event) = parser.parse_message_delivered(log)? {
                events.push(event);
            }
        }
    }
    if events.is_empty() {
        return Ok(Vec::new());
    }

    let inboxes: Vec<Address> = events.iter().map(|e| e.inbox).collect();
    let mut payloads: HashMap<u64, Bytes> = HashMap::new();
    for (tx_index, tx) in txs.iter().enumerate() {
        let Some(to) = tx.to() else {
            continue;
        };
        if to != target && !inboxes.contains(&to) {
            continue;
        }
        let receipt = receipts
            .receipt_for_transaction_index(tx_index as u64)
            .await
            .map_err(Into::<MelErrorKind>::into)?;
        for log in &receipt.logs {
            match parser.parse_inbox_message(log)? {
                Some(InboxMessageData::Inline { message_index, data }) => {
                    payloads.insert(message_index, data);
                }
                Some(InboxMessageData::FromOrigin { message_index }) => {
                    if tx.input().len() < 4 {
                        return Err(
                            MelError::CalldataTooShort("sendL2MessageFromOrigin").crit()
                        );
                    }
                    let data = parser.decode_l2_message_from_origin_calldata(tx.input())?;
                    payloads.insert(message_index, data);
                }
                None => {}
            }
        }
    }

    let mut messages = Vec::with_capacity(events.len());
    for event in events {
        let index = event.message_index;
        let data =
            payloads.remove(&index).ok_or(MelError::DelayedMessageDataNotFound(index).crit())?;
        let data_hash = keccak256(&data);
        if data_hash != event.message_data_hash {
            return Err(MelError::DelayedMessageHashMismatch {
                index,
                expected: event.message_data_hash,
                got: data_hash,
            }
            .crit());
        }
        messages.push(DelayedInboxMessage {
            block_hash,
            before_inbox_acc: event.before_inbox_acc,
            message: L1IncomingMessage {
                header: L1IncomingMessageHeader {
                    kind: event.kind.into(),
                    poster: event.sender,
                    block_number: block.header.number,
                    timestamp: event.timestamp,
                    request_id: Some(B256::from(alloy_primitives::U256::from(index))),
                    l1_base_fee: Some(event.base_fee_l1),
                },
                l2_msg: data,
                ..Default::default()
            },
        });
    }
    messages.sort_by_key(|m| m.message.header.request_id);
    debug!(
        target: "mel-extraction",
        "Found {} delayed messages in block {}",
        messages.len(),
        block.header.number
    );
    Ok(messages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        parser::{abi, SolEventParser},
        test_utils::{block_with_txs, call_tx, event_log, receipt, TestReceiptFetcher},
    };
    use alloy_primitives::U256;
    use alloy_sol_types::SolCall;
    use mel_primitives::L1MessageKind;

    const BRIDGE: Address = Address::repeat_byte(0x61);
    const INBOX: Address = Address::repeat_byte(0x62);

    fn delivered(index: u64, data: &[u8]) -> abi::MessageDelivered {
        abi::MessageDelivered {
            messageIndex: U256::from(index),
            beforeInboxAcc: B256::with_last_byte(index as u8),
            inbox: INBOX,
            kind: 13,
            sender: Address::repeat_byte(0x77),
            messageDataHash: keccak256(data),
            baseFeeL1: U256::from(100),
            timestamp: 1_000 + index,
        }
    }

    fn state() -> MelState {
        MelState::new(1, 0, B256::ZERO, Address::repeat_byte(0x51), BRIDGE)
    }

    async fn lookup(
        txs: Vec<alloy_consensus::TxEnvelope>,
        receipts: Vec<alloy_consensus::Receipt>,
    ) -> MelResult<Vec<DelayedInboxMessage>> {
        let block = block_with_txs(12, B256::ZERO, txs);
        let fetcher = TestReceiptFetcher::new(receipts);
        parse_delayed_messages_from_block(
            &state(),
            &block,
            B256::repeat_byte(0xbb),
            &SolEventParser,
            &fetcher,
        )
        .await
    }

    fn inline(index: u64, data: &'static [u8]) -> abi::InboxMessageDelivered {
        abi::InboxMessageDelivered { messageNum: U256::from(index), data: Bytes::from_static(data) }
    }

    #[tokio::test]
    async fn test_inline_payloads_sorted_by_request_id() {
        let txs = vec![call_tx(BRIDGE, Bytes::new()), call_tx(INBOX, Bytes::new())];
        let receipts = vec![
            receipt(vec![
                event_log(BRIDGE, &delivered(4, b"four")),
                event_log(BRIDGE, &delivered(3, b"three")),
            ]),
            receipt(vec![
                event_log(INBOX, &inline(3, b"three")),
                event_log(INBOX, &inline(4, b"four")),
            ]),
        ];
        let messages = lookup(txs, receipts).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message.l2_msg, Bytes::from_static(b"three"));
        assert_eq!(messages[1].message.l2_msg, Bytes::from_static(b"four"));

        let header = &messages[0].message.header;
        assert_eq!(header.kind, L1MessageKind::BatchPostingReport);
        assert_eq!(header.block_number, 12);
        assert_eq!(header.timestamp, 1_003);
        assert_eq!(header.request_id, Some(B256::with_last_byte(3)));
        assert_eq!(header.l1_base_fee, Some(U256::from(100)));
        assert_eq!(messages[0].block_hash, B256::repeat_byte(0xbb));
        assert_eq!(messages[0].before_inbox_acc, B256::with_last_byte(3));
    }

    #[tokio::test]
    async fn test_payload_from_origin_calldata() {
        let call = abi::sendL2MessageFromOriginCall { messageData: Bytes::from_static(b"origin") };
        let txs = vec![call_tx(BRIDGE, Bytes::new()), call_tx(INBOX, call.abi_encode().into())];
        let origin = abi::InboxMessageDeliveredFromOrigin { messageNum: U256::from(1) };
        let receipts = vec![
            receipt(vec![event_log(BRIDGE, &delivered(1, b"origin"))]),
            receipt(vec![event_log(INBOX, &origin)]),
        ];
        let messages = lookup(txs, receipts).await.unwrap();
        assert_eq!(messages[0].message.l2_msg, Bytes::from_static(b"origin"));
    }

    #[tokio::test]
    async fn test_origin_calldata_too_short() {
        let txs = vec![call_tx(BRIDGE, Bytes::new()), call_tx(INBOX, Bytes::from_static(&[1, 2]))];
        let origin = abi::InboxMessageDeliveredFromOrigin { messageNum: U256::from(1) };
        let receipts = vec![
            receipt(vec![event_log(BRIDGE, &delivered(1, b"origin"))]),
            receipt(vec![event_log(INBOX, &origin)]),
        ];
        let err = lookup(txs, receipts).await.unwrap_err();
        assert!(err.to_string().contains("too short"));
    }

    #[tokio::test]
    async fn test_missing_payload() {
        let txs = vec![call_tx(BRIDGE, Bytes::new())];
        let receipts = vec![receipt(vec![event_log(BRIDGE, &delivered(1, b"data"))])];
        let err = lookup(txs, receipts).await.unwrap_err();
        assert_eq!(err.to_string(), "Critical error: message 1 data not found");
    }

    #[tokio::test]
    async fn test_payload_hash_mismatch() {
        let txs = vec![call_tx(BRIDGE, Bytes::new()), call_tx(INBOX, Bytes::new())];
        let receipts = vec![
            receipt(vec![event_log(BRIDGE, &delivered(2, b"expected"))]),
            receipt(vec![event_log(INBOX, &inline(2, b"tampered"))]),
        ];
        let err = lookup(txs, receipts).await.unwrap_err();
        assert!(err.to_string().contains("mismatched hash"));
    }

    #[tokio::test]
    async fn test_no_target_transactions() {
        let txs = vec![call_tx(INBOX, Bytes::new())];
        let messages = lookup(txs, vec![]).await.unwrap();
        assert!(messages.is_empty());
    }
}
